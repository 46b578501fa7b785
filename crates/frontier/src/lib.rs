use std::collections::{HashSet, VecDeque};
use std::str::FromStr;

use tracing::{debug, warn};

use juriscrape_core::types::{CrawlEntry, CrawlStats, ExtractionMethod};
use juriscrape_core::UrlNormalizer;

pub mod checkpoint;

pub use checkpoint::Checkpoint;

/// FIFO crawl frontier with an exact visited set. Owned by the single
/// crawl loop, so there is no lock: sequential dequeue is what the BFS
/// ordering and rate-limit guarantees rest on.
///
/// A URL enters `visited` only after its page closed successfully, which
/// keeps failed URLs eligible for retry on resume.
pub struct Frontier {
    queue: VecDeque<CrawlEntry>,
    visited: HashSet<String>,
    pub stats: CrawlStats,
    normalizer: UrlNormalizer,
}

impl Frontier {
    pub fn new(normalizer: UrlNormalizer) -> Self {
        Self {
            queue: VecDeque::new(),
            visited: HashSet::new(),
            stats: CrawlStats::default(),
            normalizer,
        }
    }

    pub fn pop(&mut self) -> Option<CrawlEntry> {
        self.queue.pop_front()
    }

    /// Enqueue unless the normalized form has already been processed.
    /// Returns whether the entry was queued.
    pub fn push_if_unvisited(&mut self, entry: CrawlEntry) -> bool {
        if self.is_visited(&entry.url) {
            return false;
        }
        self.queue.push_back(entry);
        true
    }

    /// Put an entry back at the head of the queue, e.g. when cancellation
    /// lands after it was popped but before it was processed.
    pub fn push_front(&mut self, entry: CrawlEntry) {
        self.queue.push_front(entry);
    }

    pub fn seed_all(&mut self, entries: impl IntoIterator<Item = CrawlEntry>) -> usize {
        let mut added = 0;
        for entry in entries {
            if self.push_if_unvisited(entry) {
                added += 1;
            }
        }
        debug!(added, "seeds queued");
        added
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(&self.normalizer.normalize(url))
    }

    /// Only call after the page has been fully processed and closed.
    pub fn mark_visited(&mut self, url: &str) {
        self.visited.insert(self.normalizer.normalize(url));
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn visited_len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Snapshot the crawl state. Visited URLs are sorted so that saving a
    /// freshly loaded checkpoint reproduces it byte for byte.
    pub fn to_checkpoint(&self, session_id: &str) -> Checkpoint {
        let mut visited: Vec<String> = self.visited.iter().cloned().collect();
        visited.sort();
        Checkpoint {
            session_id: session_id.to_string(),
            visited,
            queue: self
                .queue
                .iter()
                .map(|e| {
                    (
                        e.url.clone(),
                        e.depth,
                        e.source_url.clone(),
                        e.method.as_str().to_string(),
                    )
                })
                .collect(),
            stats: self.stats,
            saved_at: String::new(),
        }
        .stamp_now()
    }

    /// Replace queue, visited set and counters with a checkpoint's state.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.visited = checkpoint.visited.into_iter().collect();
        self.queue = checkpoint
            .queue
            .into_iter()
            .filter_map(|(url, depth, source_url, method)| {
                match ExtractionMethod::from_str(&method) {
                    Ok(method) => Some(CrawlEntry {
                        url,
                        depth,
                        source_url,
                        method,
                    }),
                    Err(_) => {
                        warn!(url = %url, method = %method, "dropping checkpoint entry with unknown method");
                        None
                    }
                }
            })
            .collect();
        self.stats = checkpoint.stats;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frontier() -> Frontier {
        Frontier::new(UrlNormalizer::default())
    }

    fn entry(url: &str, depth: u32) -> CrawlEntry {
        CrawlEntry {
            url: url.to_string(),
            depth,
            source_url: None,
            method: ExtractionMethod::Seed,
        }
    }

    #[test]
    fn pops_in_fifo_order() {
        let mut f = frontier();
        f.push_if_unvisited(entry("https://site/a", 0));
        f.push_if_unvisited(entry("https://site/b", 0));
        assert_eq!(f.pop().unwrap().url, "https://site/a");
        assert_eq!(f.pop().unwrap().url, "https://site/b");
        assert!(f.pop().is_none());
    }

    #[test]
    fn visited_urls_are_not_requeued() {
        let mut f = frontier();
        f.mark_visited("https://site/a");
        // Normalization decides identity, not the raw string.
        assert!(!f.push_if_unvisited(entry("https://SITE/a#frag", 1)));
        assert_eq!(f.queue_len(), 0);
    }

    #[test]
    fn checkpoint_round_trip_preserves_state() {
        let mut f = frontier();
        f.mark_visited("https://site/a");
        f.mark_visited("https://site/b");
        f.push_if_unvisited(entry("https://site/c", 2));
        f.stats.pages_visited = 2;
        f.stats.pdfs_found = 5;

        let checkpoint = f.to_checkpoint("session-1");

        let mut restored = frontier();
        restored.restore(checkpoint);
        assert_eq!(restored.visited_len(), 2);
        assert_eq!(restored.queue_len(), 1);
        assert_eq!(restored.stats.pages_visited, 2);
        assert_eq!(restored.stats.pdfs_found, 5);
        assert!(restored.is_visited("https://site/a"));
        assert!(!restored.is_visited("https://site/c"));
        assert_eq!(restored.pop().unwrap().depth, 2);
    }

    #[test]
    fn checkpoint_visited_order_is_deterministic() {
        let mut f = frontier();
        f.mark_visited("https://site/z");
        f.mark_visited("https://site/a");
        f.mark_visited("https://site/m");
        let visited = f.to_checkpoint("s").visited;
        let mut sorted = visited.clone();
        sorted.sort();
        assert_eq!(visited, sorted);
    }
}
