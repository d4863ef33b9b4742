//! Bounded multi-producer command queue.
//!
//! Request handlers (any context) enqueue; the render loop is the only
//! consumer and drains once per frame. The queue is lossy by contract:
//! when full, new commands are dropped and the producer is not told —
//! the next control-surface write supersedes anyway.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::debug;

use crate::app::Command;
use crate::config::CMD_QUEUE_DEPTH;

/// Fixed-depth MPSC queue of [`Command`] values.
///
/// Enqueue is atomic per command: a command is either fully enqueued or
/// fully dropped, never partially visible. Commands from a single
/// producer drain in the order that producer enqueued them.
pub struct CommandQueue {
    channel: Channel<CriticalSectionRawMutex, Command, CMD_QUEUE_DEPTH>,
}

impl CommandQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Enqueue without blocking. Returns `false` when the queue was full
    /// and the command was dropped.
    pub fn enqueue(&self, cmd: Command) -> bool {
        match self.channel.try_send(cmd) {
            Ok(()) => true,
            Err(_) => {
                debug!("command queue full; dropping");
                false
            }
        }
    }

    /// Pop every queued command and hand each to `apply`, FIFO within
    /// this drain. Returns the number of commands applied.
    ///
    /// Must only be called from the consumer context.
    pub fn drain<F: FnMut(Command)>(&self, mut apply: F) -> usize {
        let mut applied = 0;
        while let Ok(cmd) = self.channel.try_receive() {
            apply(cmd);
            applied += 1;
        }
        applied
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_up_to_depth_then_drops() {
        let q = CommandQueue::new();
        for i in 0..CMD_QUEUE_DEPTH {
            assert!(q.enqueue(Command::SetBrightness(i as u8)), "slot {i}");
        }
        assert!(!q.enqueue(Command::SetBrightness(99)), "depth+1 must drop");
    }

    #[test]
    fn drain_is_fifo_and_empties() {
        let q = CommandQueue::new();
        q.enqueue(Command::SetBrightness(1));
        q.enqueue(Command::SetExpression(2));
        q.enqueue(Command::ToggleTimeOverlay);

        let mut seen = Vec::new();
        let n = q.drain(|cmd| seen.push(cmd));
        assert_eq!(n, 3);
        assert_eq!(
            seen,
            vec![
                Command::SetBrightness(1),
                Command::SetExpression(2),
                Command::ToggleTimeOverlay,
            ]
        );
        assert!(q.is_empty());
        assert_eq!(q.drain(|_| panic!("queue should be empty")), 0);
    }

    #[test]
    fn queue_usable_again_after_drain() {
        let q = CommandQueue::new();
        for _ in 0..CMD_QUEUE_DEPTH {
            assert!(q.enqueue(Command::SetAutoCycle(true)));
        }
        assert!(!q.enqueue(Command::SetAutoCycle(false)));

        q.drain(|_| {});
        assert!(q.enqueue(Command::SetAutoCycle(false)));
    }

    #[test]
    fn producers_on_threads_all_land_or_drop_atomically() {
        use std::sync::Arc;

        let q = Arc::new(CommandQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let q = Arc::clone(&q);
                std::thread::spawn(move || {
                    let mut accepted = 0;
                    for _ in 0..4 {
                        if q.enqueue(Command::SetExpression(t)) {
                            accepted += 1;
                        }
                    }
                    accepted
                })
            })
            .collect();

        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        let drained = q.drain(|_| {});
        // Every accepted enqueue is visible exactly once; drops vanish.
        assert_eq!(accepted, drained);
        assert!(drained <= CMD_QUEUE_DEPTH);
    }
}
