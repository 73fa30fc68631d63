//! Summarization cooldown per service

use std::time::Duration;
use tokio::time::Instant;

/// Default minimum spacing between summaries (10 minutes)
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(600);

/// Tracks when a service last triggered a summary
#[derive(Debug, Clone)]
pub struct CooldownRecord {
    window: Duration,
    last_llm_query_time: Option<Instant>,
}

impl CooldownRecord {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_llm_query_time: None,
        }
    }

    /// True if no summary was recorded or the window has fully elapsed
    pub fn is_ready(&self) -> bool {
        match self.last_llm_query_time {
            Some(last) => last.elapsed() >= self.window,
            None => true,
        }
    }

    /// Remaining time before the next summary is allowed
    pub fn remaining(&self) -> Duration {
        self.last_llm_query_time
            .map(|last| self.window.saturating_sub(last.elapsed()))
            .unwrap_or_default()
    }

    pub fn stamp(&mut self) {
        self.last_llm_query_time = Some(Instant::now());
    }
}

impl Default for CooldownRecord {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_window() {
        let mut record = CooldownRecord::default();
        assert!(record.is_ready());

        record.stamp();
        assert!(!record.is_ready());

        tokio::time::advance(Duration::from_secs(599)).await;
        assert!(!record.is_ready());
        assert_eq!(record.remaining(), Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(record.is_ready());
        assert_eq!(record.remaining(), Duration::ZERO);
    }
}
