//! Outbound message queue
//!
//! Holds envelopes sent while the connection isn't open. Drained in
//! insertion order once the connection opens.

use std::collections::VecDeque;

use crate::message::Envelope;

/// Unbounded FIFO of envelopes awaiting delivery
#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: VecDeque<Envelope>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, envelope: Envelope) {
        self.pending.push_back(envelope);
    }

    /// Drain the queue front to back through `send`
    ///
    /// Stops at the first failure; the failed envelope and everything
    /// behind it stay queued in their original order. Returns how many
    /// envelopes were sent.
    pub fn flush<F, E>(&mut self, mut send: F) -> Result<usize, E>
    where
        F: FnMut(&Envelope) -> Result<(), E>,
    {
        let mut sent = 0;
        while let Some(front) = self.pending.front() {
            send(front)?;
            self.pending.pop_front();
            sent += 1;
        }
        Ok(sent)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flush_in_fifo_order() {
        let mut queue = OutboundQueue::new();
        for n in 0..5 {
            queue.enqueue(Envelope::application("chat", json!(n)));
        }

        let mut seen = Vec::new();
        let sent = queue
            .flush(|env| {
                seen.push(env.data().cloned());
                Ok::<_, ()>(())
            })
            .unwrap();

        assert_eq!(sent, 5);
        assert!(queue.is_empty());
        let expected: Vec<_> = (0..5).map(|n| Some(json!(n))).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_flush_drains_once() {
        let mut queue = OutboundQueue::new();
        queue.enqueue(Envelope::application("chat", json!("a")));

        let mut calls = 0;
        for _ in 0..2 {
            queue
                .flush(|_| {
                    calls += 1;
                    Ok::<_, ()>(())
                })
                .unwrap();
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_flush_failure_keeps_rest() {
        let mut queue = OutboundQueue::new();
        for n in 0..3 {
            queue.enqueue(Envelope::application("chat", json!(n)));
        }

        let mut attempts = 0;
        let result = queue.flush(|_| {
            attempts += 1;
            if attempts == 2 {
                Err("writer gone")
            } else {
                Ok(())
            }
        });

        assert_eq!(result, Err("writer gone"));
        assert_eq!(queue.len(), 2);

        let mut rest = Vec::new();
        queue
            .flush(|env| {
                rest.push(env.data().cloned());
                Ok::<_, ()>(())
            })
            .unwrap();
        assert_eq!(rest, vec![Some(json!(1)), Some(json!(2))]);
    }
}
