// src/session/cache.rs — Time-bounded memoization of the user's session list
//
// Uses tokio's clock so expiry follows a paused/advanced runtime in tests.

use std::time::Duration;
use tokio::time::Instant;

use crate::backend::HistorySummary;

#[derive(Debug)]
struct CachedHistory {
    snapshot: Vec<HistorySummary>,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct HistoryCache {
    duration: Duration,
    entry: Option<CachedHistory>,
}

impl HistoryCache {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            entry: None,
        }
    }

    /// The cached snapshot, if it has not expired yet.
    pub fn get(&self) -> Option<&[HistorySummary]> {
        let entry = self.entry.as_ref()?;
        if Instant::now() < entry.expires_at {
            Some(&entry.snapshot)
        } else {
            tracing::debug!("History cache expired");
            None
        }
    }

    pub fn store(&mut self, snapshot: Vec<HistorySummary>) {
        tracing::debug!(sessions = snapshot.len(), "Caching history");
        self.entry = Some(CachedHistory {
            snapshot,
            expires_at: Instant::now() + self.duration,
        });
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.entry.as_ref().map(|e| e.expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str) -> HistorySummary {
        HistorySummary {
            session_id: id.into(),
            started_at: None,
            message_count: 1,
            preview: None,
            messages: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_is_served() {
        let mut cache = HistoryCache::new(Duration::from_secs(30));
        assert!(cache.get().is_none());

        cache.store(vec![summary("s1")]);
        assert_eq!(cache.get().unwrap().len(), 1);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cache.get().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires() {
        let mut cache = HistoryCache::new(Duration::from_secs(30));
        cache.store(vec![summary("s1")]);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.get().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_clears_snapshot_and_expiry() {
        let mut cache = HistoryCache::new(Duration::from_secs(30));
        cache.store(vec![summary("s1")]);
        assert!(cache.expires_at().is_some());

        cache.invalidate();
        assert!(cache.get().is_none());
        assert!(cache.expires_at().is_none());
    }
}
