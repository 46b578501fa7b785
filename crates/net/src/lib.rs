pub mod proxy;
pub mod rate_limit;
pub mod ua;
pub mod validator;

pub use proxy::{ProxyPool, ProxyRecord, ProxyStats, SelectionStrategy};
pub use rate_limit::AdaptiveRateLimiter;
pub use ua::UserAgentPool;
pub use validator::UrlValidator;
