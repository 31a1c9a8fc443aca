//! Five-tier priority queue for pending speech.
//!
//! Tiers (highest first): critical, acknowledgment, response, proactive,
//! ambient. FIFO within a tier. Ambient items are shed when the queue is
//! full; higher tiers are never shed.

use std::collections::VecDeque;

use tracing::warn;

use valet_core::types::SpeechPriority;

/// One queued utterance awaiting synthesis.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeechItem {
    pub session_id: String,
    pub text: String,
    pub priority: SpeechPriority,
}

pub struct SpeechPriorityQueue {
    buckets: [VecDeque<SpeechItem>; 5],
    max_depth: usize,
}

impl SpeechPriorityQueue {
    pub fn new(max_depth: usize) -> Self {
        SpeechPriorityQueue {
            buckets: Default::default(),
            max_depth,
        }
    }

    /// Queue an item. Returns `false` if it was shed (ambient only).
    pub fn enqueue(&mut self, item: SpeechItem) -> bool {
        if item.priority == SpeechPriority::Ambient && self.len() >= self.max_depth {
            warn!(session_id = %item.session_id, "speech queue full, shedding ambient item");
            return false;
        }
        self.buckets[item.priority.index()].push_back(item);
        true
    }

    /// Remove and return the highest-priority item (FIFO within a tier).
    pub fn dequeue(&mut self) -> Option<SpeechItem> {
        self.buckets.iter_mut().find_map(|b| b.pop_front())
    }

    /// The item `dequeue` would return, without removing it.
    pub fn peek(&self) -> Option<&SpeechItem> {
        self.buckets.iter().find_map(|b| b.front())
    }

    /// Remove the highest-priority item belonging to one session.
    pub fn dequeue_for_session(&mut self, session_id: &str) -> Option<SpeechItem> {
        for bucket in self.buckets.iter_mut() {
            if let Some(pos) = bucket.iter().position(|i| i.session_id == session_id) {
                return bucket.remove(pos);
            }
        }
        None
    }

    /// Drop every item at or below the given priority.
    pub fn clear_below(&mut self, priority: SpeechPriority) {
        for bucket in self.buckets.iter_mut().skip(priority.index()) {
            bucket.clear();
        }
    }

    /// Drop every queued item for one session, all tiers.
    pub fn clear_session(&mut self, session_id: &str) {
        for bucket in self.buckets.iter_mut() {
            bucket.retain(|i| i.session_id != session_id);
        }
    }

    pub fn clear_all(&mut self) {
        for bucket in self.buckets.iter_mut() {
            bucket.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(VecDeque::is_empty)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn item(session: &str, text: &str, priority: SpeechPriority) -> SpeechItem {
        SpeechItem {
            session_id: session.to_string(),
            text: text.to_string(),
            priority,
        }
    }

    #[test]
    fn test_priority_ordering() {
        let mut q = SpeechPriorityQueue::new(10);
        q.enqueue(item("s", "later", SpeechPriority::Ambient));
        q.enqueue(item("s", "answer", SpeechPriority::Response));
        q.enqueue(item("s", "now", SpeechPriority::Critical));

        assert_eq!(q.dequeue().unwrap().text, "now");
        assert_eq!(q.dequeue().unwrap().text, "answer");
        assert_eq!(q.dequeue().unwrap().text, "later");
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn test_fifo_within_tier() {
        let mut q = SpeechPriorityQueue::new(10);
        q.enqueue(item("s", "first", SpeechPriority::Response));
        q.enqueue(item("s", "second", SpeechPriority::Response));

        assert_eq!(q.dequeue().unwrap().text, "first");
        assert_eq!(q.dequeue().unwrap().text, "second");
    }

    #[test]
    fn test_ambient_shed_when_full() {
        let mut q = SpeechPriorityQueue::new(2);
        assert!(q.enqueue(item("s", "a", SpeechPriority::Response)));
        assert!(q.enqueue(item("s", "b", SpeechPriority::Response)));
        assert!(!q.enqueue(item("s", "c", SpeechPriority::Ambient)));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_high_priority_never_shed() {
        let mut q = SpeechPriorityQueue::new(1);
        assert!(q.enqueue(item("s", "a", SpeechPriority::Ambient)));
        assert!(q.enqueue(item("s", "b", SpeechPriority::Critical)));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_peek_does_not_remove() {
        let mut q = SpeechPriorityQueue::new(10);
        q.enqueue(item("s", "hello", SpeechPriority::Proactive));
        assert_eq!(q.peek().unwrap().text, "hello");
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_clear_below() {
        let mut q = SpeechPriorityQueue::new(10);
        q.enqueue(item("s", "a", SpeechPriority::Critical));
        q.enqueue(item("s", "b", SpeechPriority::Response));
        q.enqueue(item("s", "c", SpeechPriority::Proactive));
        q.enqueue(item("s", "d", SpeechPriority::Ambient));

        // Inclusive: the named tier empties along with everything below it.
        q.clear_below(SpeechPriority::Response);
        assert_eq!(q.len(), 1);
        assert_eq!(q.dequeue().unwrap().text, "a");
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn test_clear_session() {
        let mut q = SpeechPriorityQueue::new(10);
        q.enqueue(item("s-1", "mine", SpeechPriority::Response));
        q.enqueue(item("s-2", "theirs", SpeechPriority::Response));
        q.enqueue(item("s-1", "also mine", SpeechPriority::Ambient));

        q.clear_session("s-1");
        assert_eq!(q.len(), 1);
        assert_eq!(q.dequeue().unwrap().text, "theirs");
    }

    #[test]
    fn test_dequeue_for_session_respects_priority() {
        let mut q = SpeechPriorityQueue::new(10);
        q.enqueue(item("s-1", "low", SpeechPriority::Ambient));
        q.enqueue(item("s-2", "other", SpeechPriority::Critical));
        q.enqueue(item("s-1", "high", SpeechPriority::Proactive));

        assert_eq!(q.dequeue_for_session("s-1").unwrap().text, "high");
        assert_eq!(q.dequeue_for_session("s-1").unwrap().text, "low");
        assert!(q.dequeue_for_session("s-1").is_none());
        assert_eq!(q.len(), 1);
    }
}
