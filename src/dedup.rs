// Copyright 2019 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

use crate::message::Message;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Result of checking an inbound message against the deduplicator.
#[derive(Debug)]
pub(crate) enum DedupOutcome {
    /// First sighting of this `(peer, message-id)`; the exchange should be
    /// processed and its reply recorded with [`Deduplicator::save`].
    New,

    /// The exchange is still being processed; the duplicate must be dropped.
    Pending,

    /// The exchange already completed; replay the recorded reply (which can
    /// be `None` when the exchange produced nothing).
    Replay(Option<Message>),
}

#[derive(Debug, Default)]
struct PeerRecord {
    entries: HashMap<u16, DedupEntry>,
    expires_at: Option<Instant>,
}

#[derive(Debug)]
struct DedupEntry {
    pending: bool,
    response: Option<Message>,
}

/// At-most-once admission of confirmable and non-confirmable exchanges,
/// keyed by `(peer, message-id)`.
///
/// Whole peer records expire after `dedup_expiration` of inactivity; the
/// janitor calls [`sweep`](Deduplicator::sweep) periodically.
#[derive(Debug)]
pub(crate) struct Deduplicator {
    peers: Mutex<HashMap<String, PeerRecord>>,
    expiration: Duration,
}

impl Deduplicator {
    pub fn new(expiration: Duration) -> Deduplicator {
        Deduplicator {
            peers: Mutex::new(HashMap::new()),
            expiration,
        }
    }

    /// Atomically looks up the `(peer, msg_id)` pair, admitting it as pending
    /// on first sight. Every call refreshes the peer's expiry.
    pub fn check(&self, peer: &str, msg_id: u16) -> DedupOutcome {
        let mut peers = self.peers.lock().expect("dedup lock");
        let record = peers.entry(peer.to_string()).or_default();
        record.expires_at = Some(Instant::now() + self.expiration);

        match record.entries.get(&msg_id) {
            Some(entry) if entry.pending => DedupOutcome::Pending,
            Some(entry) => DedupOutcome::Replay(entry.response.clone()),
            None => {
                record.entries.insert(
                    msg_id,
                    DedupEntry {
                        pending: true,
                        response: None,
                    },
                );
                DedupOutcome::New
            }
        }
    }

    /// Records the reply produced for an admitted exchange so later
    /// duplicates replay it.
    pub fn save(&self, peer: &str, msg_id: u16, response: Option<&Message>) {
        let mut peers = self.peers.lock().expect("dedup lock");
        if let Some(entry) = peers
            .get_mut(peer)
            .and_then(|record| record.entries.get_mut(&msg_id))
        {
            entry.pending = false;
            entry.response = response.cloned();
        }
    }

    /// Evicts peer records whose expiry has passed.
    pub fn sweep(&self, now: Instant) {
        let mut peers = self.peers.lock().expect("dedup lock");
        peers.retain(|_, record| match record.expires_at {
            Some(expires_at) => expires_at > now,
            None => false,
        });
    }

    #[cfg(test)]
    fn peer_count(&self) -> usize {
        self.peers.lock().expect("dedup lock").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MsgCode;

    #[test]
    fn admits_then_replays() {
        let dedup = Deduplicator::new(Duration::from_secs(600));

        assert!(matches!(dedup.check("peer", 42), DedupOutcome::New));
        assert!(matches!(dedup.check("peer", 42), DedupOutcome::Pending));

        let mut reply = Message::new();
        reply.msg_code = MsgCode::CONTENT;
        dedup.save("peer", 42, Some(&reply));

        match dedup.check("peer", 42) {
            DedupOutcome::Replay(Some(cached)) => assert_eq!(MsgCode::CONTENT, cached.msg_code),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn replays_absent_reply() {
        let dedup = Deduplicator::new(Duration::from_secs(600));
        assert!(matches!(dedup.check("peer", 1), DedupOutcome::New));
        dedup.save("peer", 1, None);
        assert!(matches!(
            dedup.check("peer", 1),
            DedupOutcome::Replay(None)
        ));
    }

    #[test]
    fn peers_are_independent() {
        let dedup = Deduplicator::new(Duration::from_secs(600));
        assert!(matches!(dedup.check("a", 7), DedupOutcome::New));
        assert!(matches!(dedup.check("b", 7), DedupOutcome::New));
    }

    #[test]
    fn sweep_evicts_expired_peers() {
        let dedup = Deduplicator::new(Duration::from_millis(0));
        dedup.check("peer", 1);
        assert_eq!(1, dedup.peer_count());
        dedup.sweep(Instant::now() + Duration::from_millis(1));
        assert_eq!(0, dedup.peer_count());
        assert!(matches!(dedup.check("peer", 1), DedupOutcome::New));
    }
}
