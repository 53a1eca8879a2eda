//! Broadcast rate buffer.
//!
//! Backend broadcast pushes are queued per name and drained by a fixed
//! tick, one value per name per tick. Values are never coalesced or
//! dropped; a burst is simply spread over consecutive ticks in FIFO
//! order. The buffer owns no timer itself, the runtime ticks it, so
//! tests can drive time explicitly.

use std::collections::VecDeque;

use dashmap::DashMap;
use serde_json::Value;
use std::time::Duration;

/// Drain cadence for buffered broadcasts.
pub const BROADCAST_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Default)]
pub struct BroadcastBuffer {
    queues: DashMap<String, VecDeque<Value>>,
}

impl BroadcastBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one broadcast value for `name`.
    pub fn stack(&self, name: &str, value: Value) {
        self.queues.entry(name.to_owned()).or_default().push_back(value);
    }

    /// Pop at most one value per name, in per-name FIFO order.
    /// Exhausted queues are removed so an idle buffer stays empty.
    pub fn drain_one_round(&self) -> Vec<(String, Value)> {
        let mut round = Vec::new();
        let mut exhausted = Vec::new();
        for mut entry in self.queues.iter_mut() {
            if let Some(value) = entry.value_mut().pop_front() {
                round.push((entry.key().clone(), value));
            }
            if entry.value().is_empty() {
                exhausted.push(entry.key().clone());
            }
        }
        for name in exhausted {
            // Re-check under the entry lock; a push may have raced in.
            self.queues.remove_if(&name, |_, queue| queue.is_empty());
        }
        round
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn one_value_per_name_per_round() {
        let buffer = BroadcastBuffer::new();
        buffer.stack("n", json!(1));
        buffer.stack("n", json!(2));
        buffer.stack("m", json!("a"));

        let mut round = buffer.drain_one_round();
        round.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(round, vec![("m".to_owned(), json!("a")), ("n".to_owned(), json!(1))]);

        assert_eq!(buffer.drain_one_round(), vec![("n".to_owned(), json!(2))]);
        assert!(buffer.drain_one_round().is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn per_name_order_is_fifo() {
        let buffer = BroadcastBuffer::new();
        for i in 0..5 {
            buffer.stack("n", json!(i));
        }
        for i in 0..5 {
            assert_eq!(buffer.drain_one_round(), vec![("n".to_owned(), json!(i))]);
        }
    }
}
