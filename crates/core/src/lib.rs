pub mod cancel;
pub mod config;
pub mod error;
pub mod normalize;
pub mod page;
pub mod types;

pub use cancel::CancelFlag;
pub use config::AppConfig;
pub use error::CrawlError;
pub use normalize::UrlNormalizer;
pub use page::{Browser, DomElement, Page, PageResponse};
pub use types::{
    CrawlEntry, CrawlStats, DiscoveredPdf, DiscoveryMode, ExtractionMethod, LinkStatus, PdfEvent,
    SessionStatus, ValidationOutcome,
};
