//! Buffer for screen content that could not be delivered.
//!
//! Voice-only devices still trigger display-worthy output; it is parked
//! here until a screen device drains it, bounded by count and by TTL. A
//! background loop prunes expired items so the buffer never serves stale
//! content after a long idle stretch.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, info};

use valet_core::config::schema::DisplayConfig;

/// One parked piece of screen content.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayItem {
    pub session_id: String,
    pub content: String,
    pub queued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Bounded, TTL-pruned display buffer. Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct DisplayQueue {
    config: DisplayConfig,
    items: Arc<Mutex<VecDeque<DisplayItem>>>,
    shutdown: Arc<Notify>,
}

impl DisplayQueue {
    pub fn new(config: DisplayConfig) -> Self {
        DisplayQueue {
            config,
            items: Arc::new(Mutex::new(VecDeque::new())),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Park content. Oldest item is dropped once the buffer is full.
    pub fn enqueue(&self, session_id: &str, content: &str) {
        let now = Utc::now();
        let item = DisplayItem {
            session_id: session_id.to_string(),
            content: content.to_string(),
            queued_at: now,
            expires_at: now + chrono::Duration::seconds(self.config.ttl_s as i64),
        };

        let mut items = self.items.lock().unwrap();
        Self::prune_locked(&mut items);
        while items.len() >= self.config.max_items {
            items.pop_front();
            debug!("display buffer full, dropping oldest item");
        }
        items.push_back(item);
    }

    /// Take everything still fresh, oldest first.
    pub fn drain(&self) -> Vec<DisplayItem> {
        let mut items = self.items.lock().unwrap();
        Self::prune_locked(&mut items);
        items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        let mut items = self.items.lock().unwrap();
        Self::prune_locked(&mut items);
        items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the periodic prune loop until [`destroy`](Self::destroy) is called.
    pub async fn run_prune_loop(&self) {
        info!(
            interval_s = self.config.prune_interval_s,
            "display prune loop started"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(self.config.prune_interval_s)) => {
                    let removed = {
                        let mut items = self.items.lock().unwrap();
                        let before = items.len();
                        Self::prune_locked(&mut items);
                        before - items.len()
                    };
                    if removed > 0 {
                        debug!(removed, "pruned expired display items");
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("display prune loop stopped");
                    return;
                }
            }
        }
    }

    /// Stop the prune loop. Safe to call before the loop starts; the
    /// notification is held until it is observed.
    pub fn destroy(&self) {
        self.shutdown.notify_one();
    }

    fn prune_locked(items: &mut VecDeque<DisplayItem>) {
        let now = Utc::now();
        items.retain(|i| i.expires_at > now);
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
