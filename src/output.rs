//! Outgoing line queue.
//!
//! The engine hands every outgoing line to an [`OutputQueue`] with a
//! [`Priority`]; the queue decides when it reaches the wire.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::trace;

/// Maximum payload of an outgoing line, terminator excluded.
pub const MAX_PAYLOAD_LEN: usize = 510;

/// Priority of an outgoing line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Liveness and protocol replies (`PONG`).
    Immediate,
    /// Handshake and state-changing commands.
    High,
    /// Ordinary commands and messages.
    Normal,
    /// Bulk or background traffic.
    Low,
}

impl Priority {
    const ALL: [Priority; 4] = [
        Priority::Immediate,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Accepts outgoing lines.
pub trait OutputQueue: Send + Sync {
    /// Queue `line` (without terminator).
    fn enqueue(&self, line: String, priority: Priority);

    /// Drop everything queued.
    fn clear(&self);
}

/// Cut `line` to at most [`MAX_PAYLOAD_LEN`] bytes on a UTF-8 boundary and
/// strip any CR or LF.
pub fn truncate_line(line: &str) -> String {
    let line: String = line.chars().filter(|&c| c != '\r' && c != '\n').collect();
    if line.len() <= MAX_PAYLOAD_LEN {
        return line;
    }
    let mut end = MAX_PAYLOAD_LEN;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    line[..end].to_string()
}

#[derive(Debug, Default)]
struct Lanes {
    lanes: [VecDeque<String>; 4],
    closed: bool,
}

impl Lanes {
    fn pop(&mut self) -> Option<String> {
        self.lanes.iter_mut().find_map(VecDeque::pop_front)
    }
}

/// Priority queue feeding the connection writer.
///
/// Lines are delivered highest priority first, in arrival order within a
/// priority. While [`discarding`](Self::set_discarding) is set, new lines
/// are dropped.
#[derive(Debug, Default)]
pub struct ChannelOutputQueue {
    lanes: Mutex<Lanes>,
    discarding: Mutex<bool>,
    #[cfg(feature = "tokio")]
    notify: tokio::sync::Notify,
}

impl ChannelOutputQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop new lines instead of queueing them.
    pub fn set_discarding(&self, discarding: bool) {
        *self.discarding.lock() = discarding;
    }

    /// Take the next line without waiting.
    pub fn try_next(&self) -> Option<String> {
        self.lanes.lock().pop()
    }

    /// Take every queued line, in delivery order.
    pub fn drain(&self) -> Vec<String> {
        let mut lanes = self.lanes.lock();
        std::iter::from_fn(|| lanes.pop()).collect()
    }

    /// Number of queued lines.
    pub fn len(&self) -> usize {
        self.lanes.lock().lanes.iter().map(VecDeque::len).sum()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop delivering; [`next`](Self::next) returns `None` once drained.
    pub fn close(&self) {
        self.lanes.lock().closed = true;
        #[cfg(feature = "tokio")]
        self.notify.notify_waiters();
    }

    /// Wait for the next line. `None` once closed and empty.
    #[cfg(feature = "tokio")]
    pub async fn next(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            {
                let mut lanes = self.lanes.lock();
                if let Some(line) = lanes.pop() {
                    return Some(line);
                }
                if lanes.closed {
                    return None;
                }
            }
            notified.await;
        }
    }
}

impl OutputQueue for ChannelOutputQueue {
    fn enqueue(&self, line: String, priority: Priority) {
        if *self.discarding.lock() {
            trace!(%line, "discarding outgoing line");
            return;
        }
        let line = truncate_line(&line);
        self.lanes.lock().lanes[priority.index()].push_back(line);
        #[cfg(feature = "tokio")]
        self.notify.notify_one();
    }

    fn clear(&self) {
        let mut lanes = self.lanes.lock();
        for priority in Priority::ALL {
            lanes.lanes[priority.index()].clear();
        }
    }
}
