//! Publish/subscribe (spec.md §4.K).
//!
//! The teacher has no pub/sub. Grounded on the same fan-out shape as
//! `events::EventBus`: a registry of per-client outbound channels keyed by
//! channel name, plus a second list of pattern subscribers checked with the
//! same glob matcher `KEYS` uses (`util::glob_match`).

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;

use crate::protocol::Frame;
use crate::util::glob_match;

struct Subscriber {
    client_id: u64,
    sender: UnboundedSender<Frame>,
}

#[derive(Default)]
pub struct PubSubHub {
    channels: Mutex<HashMap<Vec<u8>, Vec<Subscriber>>>,
    patterns: Mutex<HashMap<Vec<u8>, Vec<Subscriber>>>,
}

impl PubSubHub {
    pub fn new() -> Self {
        PubSubHub {
            channels: Mutex::new(HashMap::new()),
            patterns: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, channel: Vec<u8>, client_id: u64, sender: UnboundedSender<Frame>) {
        self.channels
            .lock()
            .unwrap()
            .entry(channel)
            .or_default()
            .push(Subscriber { client_id, sender });
    }

    pub fn psubscribe(&self, pattern: Vec<u8>, client_id: u64, sender: UnboundedSender<Frame>) {
        self.patterns
            .lock()
            .unwrap()
            .entry(pattern)
            .or_default()
            .push(Subscriber { client_id, sender });
    }

    pub fn unsubscribe(&self, channel: &[u8], client_id: u64) {
        let mut channels = self.channels.lock().unwrap();
        if let Some(subs) = channels.get_mut(channel) {
            subs.retain(|s| s.client_id != client_id);
            if subs.is_empty() {
                channels.remove(channel);
            }
        }
    }

    pub fn punsubscribe(&self, pattern: &[u8], client_id: u64) {
        let mut patterns = self.patterns.lock().unwrap();
        if let Some(subs) = patterns.get_mut(pattern) {
            subs.retain(|s| s.client_id != client_id);
            if subs.is_empty() {
                patterns.remove(pattern);
            }
        }
    }

    pub fn unsubscribe_all(&self, client_id: u64) {
        let mut channels = self.channels.lock().unwrap();
        channels.retain(|_, subs| {
            subs.retain(|s| s.client_id != client_id);
            !subs.is_empty()
        });
        let mut patterns = self.patterns.lock().unwrap();
        patterns.retain(|_, subs| {
            subs.retain(|s| s.client_id != client_id);
            !subs.is_empty()
        });
    }

    /// Publishes `payload` to direct subscribers of `channel` plus every
    /// pattern subscriber whose pattern matches it. Returns the number of
    /// clients the message was delivered to.
    pub fn publish(&self, channel: &[u8], payload: &[u8]) -> usize {
        let mut delivered = 0;
        if let Some(subs) = self.channels.lock().unwrap().get(channel) {
            for s in subs {
                let frame = Frame::from_bulk_strs(vec![
                    b"message".to_vec(),
                    channel.to_vec(),
                    payload.to_vec(),
                ]);
                if s.sender.send(frame).is_ok() {
                    delivered += 1;
                }
            }
        }
        for (pattern, subs) in self.patterns.lock().unwrap().iter() {
            if glob_match(pattern, channel) {
                for s in subs {
                    let frame = Frame::from_bulk_strs(vec![
                        b"pmessage".to_vec(),
                        pattern.clone(),
                        channel.to_vec(),
                        payload.to_vec(),
                    ]);
                    if s.sender.send(frame).is_ok() {
                        delivered += 1;
                    }
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_reaches_direct_subscriber() {
        let hub = PubSubHub::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        hub.subscribe(b"ch".to_vec(), 1, tx);
        assert_eq!(hub.publish(b"ch", b"hi"), 1);
        let frame = rx.try_recv().unwrap();
        assert_eq!(
            frame,
            Frame::from_bulk_strs(vec![b"message".to_vec(), b"ch".to_vec(), b"hi".to_vec()])
        );
    }

    #[test]
    fn publish_reaches_matching_pattern_subscriber() {
        let hub = PubSubHub::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        hub.psubscribe(b"ch.*".to_vec(), 1, tx);
        assert_eq!(hub.publish(b"ch.news", b"hi"), 1);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn unsubscribe_all_removes_from_both_registries() {
        let hub = PubSubHub::new();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        hub.subscribe(b"ch".to_vec(), 1, tx.clone());
        hub.psubscribe(b"ch.*".to_vec(), 1, tx);
        hub.unsubscribe_all(1);
        assert_eq!(hub.publish(b"ch", b"hi"), 0);
        assert_eq!(hub.publish(b"ch.news", b"hi"), 0);
    }
}
