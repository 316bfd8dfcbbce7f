// src/logbuf/mod.rs

//! Bounded per-stream log ring buffers plus lossy live fan-out.
//!
//! Each shell task owns one [`TaskLogs`]: a fixed-capacity line ring buffer
//! per output stream, written only by that task's reader task, plus a
//! broadcast channel for live subscribers (e.g. a UI console). Writers never
//! block: ring pushes evict the oldest line, and the broadcast send drops
//! output for lagged or disconnected subscribers rather than backpressuring
//! the producing reader.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::task::LogTails;

/// Broadcast channel depth for live subscribers. A subscriber further behind
/// than this skips ahead (tokio broadcast lag semantics).
const FANOUT_CAPACITY: usize = 256;

/// Which output stream a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// A single line fanned out to live subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct LogChunk {
    pub stream: StreamKind,
    pub text: String,
}

/// Fixed-capacity line ring buffer; oldest line evicted first.
#[derive(Debug)]
pub struct LogBuffer {
    capacity: usize,
    lines: VecDeque<String>,
    /// Total lines ever pushed, including evicted ones.
    total: u64,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: VecDeque::with_capacity(capacity.min(256)),
            total: 0,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        self.total += 1;
    }

    /// Last `n` lines in original emission order.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total_lines(&self) -> u64 {
        self.total
    }
}

/// Per-task log state: one ring per stream plus the fan-out channel.
#[derive(Debug)]
pub struct TaskLogs {
    stdout: Mutex<LogBuffer>,
    stderr: Mutex<LogBuffer>,
    fanout: broadcast::Sender<LogChunk>,
}

impl TaskLogs {
    pub fn new(capacity: usize) -> Self {
        let (fanout, _) = broadcast::channel(FANOUT_CAPACITY);
        Self {
            stdout: Mutex::new(LogBuffer::new(capacity)),
            stderr: Mutex::new(LogBuffer::new(capacity)),
            fanout,
        }
    }

    /// Append one line; called only from the owning reader task.
    pub fn push(&self, stream: StreamKind, line: String) {
        {
            let mut buf = match stream {
                StreamKind::Stdout => self.stdout.lock().unwrap(),
                StreamKind::Stderr => self.stderr.lock().unwrap(),
            };
            buf.push(line.clone());
        }
        // Lossy: send fails only when there are no subscribers.
        let _ = self.fanout.send(LogChunk { stream, text: line });
    }

    /// Last `n` lines of each stream, cloned out under the buffer locks.
    pub fn tails(&self, n: usize) -> LogTails {
        LogTails {
            stdout_tail: self.stdout.lock().unwrap().tail(n),
            stderr_tail: self.stderr.lock().unwrap().tail(n),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogChunk> {
        self.fanout.subscribe()
    }
}
