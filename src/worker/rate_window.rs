//! Rolling-window rate limiting for job starts.
//!
//! The worker caps sustained throughput at a fixed number of job starts per
//! rolling window (5 per 60 seconds by default), independently of the
//! concurrency semaphore that caps peak resource usage.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Rolling window of job-start timestamps shared across worker loops
///
/// `acquire` admits a start immediately while fewer than `max_starts`
/// happened inside the window, otherwise it sleeps until the oldest recorded
/// start ages out. Timestamps are pruned lazily on each call.
#[derive(Clone)]
pub struct StartWindow {
    max_starts: usize,
    window: Duration,
    starts: Arc<Mutex<VecDeque<Instant>>>,
}

impl StartWindow {
    /// Create a window admitting `max_starts` starts per `window`
    pub fn new(max_starts: usize, window: Duration) -> Self {
        Self {
            max_starts,
            window,
            starts: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Wait until a start slot is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut starts = self.starts.lock().await;
                let now = Instant::now();

                while let Some(oldest) = starts.front() {
                    if now.duration_since(*oldest) >= self.window {
                        starts.pop_front();
                    } else {
                        break;
                    }
                }

                if starts.len() < self.max_starts {
                    starts.push_back(now);
                    return;
                }

                // Full window: sleep until the oldest start ages out
                match starts.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };

            tokio::time::sleep(wait.max(Duration::from_millis(10))).await;
        }
    }

    /// Number of starts currently inside the window
    pub async fn in_flight(&self) -> usize {
        let mut starts = self.starts.lock().await;
        let now = Instant::now();
        while let Some(oldest) = starts.front() {
            if now.duration_since(*oldest) >= self.window {
                starts.pop_front();
            } else {
                break;
            }
        }
        starts.len()
    }
}
