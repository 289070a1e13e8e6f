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

use crate::block::BlockInfo;
use crate::message::Message;
use crate::Error;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How long a finished assembly lingers after its final block is read.
const DRAIN_TTL: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct CacheEntry {
    message: Message,
    // Next Block1 fragment number `append`/`assembled` will accept. Dormant
    // for response-side (Block2) entries, which are read by offset.
    next_num: u32,
    expires_at: Instant,
}

/// Keyed storage for in-flight blockwise transfers.
///
/// Holds both directions: request payloads being reassembled from `Block1`
/// fragments, and oversized responses being sliced out through `Block2`.
/// Entries expire after `inactivity` without traffic; a janitor calls
/// [`sweep`](BlockCache::sweep) every couple of seconds.
#[derive(Debug)]
pub(crate) struct BlockCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    inactivity: Duration,
}

impl BlockCache {
    pub fn new(inactivity: Duration) -> BlockCache {
        BlockCache {
            entries: Mutex::new(HashMap::new()),
            inactivity,
        }
    }

    /// Stores (or replaces) an assembly under the given key. The stored
    /// message is fragment zero; `append` expects fragment one next.
    pub fn put(&self, key: String, message: Message) {
        let mut entries = self.entries.lock().expect("block cache lock");
        entries.insert(
            key,
            CacheEntry {
                message,
                next_num: 1,
                expires_at: Instant::now() + self.inactivity,
            },
        );
    }

    /// Appends fragment `num` to an assembly, refreshing its expiry.
    ///
    /// Fragments must arrive in sequence; a gap or repeat is rejected
    /// without touching the assembly.
    pub fn append(&self, key: &str, num: u32, payload: &[u8]) -> Result<(), Error> {
        let mut entries = self.entries.lock().expect("block cache lock");
        let entry = entries.get_mut(key).ok_or(Error::BlockNotFound)?;
        if num != entry.next_num {
            return Err(Error::BlockOutOfOrder);
        }
        entry.message.payload.extend_from_slice(payload);
        entry.next_num += 1;
        entry.expires_at = Instant::now() + self.inactivity;
        Ok(())
    }

    /// Returns the cached message with its payload sliced down to block
    /// `num`, with the matching `Block2` descriptor attached and `Size2` on
    /// block zero. Reading the final slice shortens the entry's life to a
    /// short drain window.
    pub fn get(&self, key: &str, num: u32, size: usize) -> Result<Message, Error> {
        let mut entries = self.entries.lock().expect("block cache lock");
        let entry = entries.get_mut(key).ok_or(Error::BlockNotFound)?;

        let total = entry.message.payload.len();
        let offset = num as usize * size;
        if offset > total {
            return Err(Error::InvalidArgument);
        }

        let more = offset + size < total;
        entry.expires_at = if more {
            Instant::now() + self.inactivity
        } else {
            Instant::now() + DRAIN_TTL
        };

        let end = total.min(offset + size);
        let mut slice = entry.message.clone();
        slice.payload = entry.message.payload[offset..end].to_vec();
        if num == 0 {
            slice.with_size2(total as u32);
        }
        if let Some(block) = BlockInfo::new(num, more, size) {
            slice.with_block2(block);
        }
        Ok(slice)
    }

    /// Returns the fully assembled message with `tail` appended, for the
    /// final fragment (number `num`) of a request-side (`Block1`)
    /// reassembly. The final fragment must be the next one in sequence. The
    /// entry is kept for a short drain window in case the final exchange is
    /// repeated.
    pub fn assembled(&self, key: &str, num: u32, tail: &[u8]) -> Result<Message, Error> {
        let mut entries = self.entries.lock().expect("block cache lock");
        let entry = entries.get_mut(key).ok_or(Error::BlockNotFound)?;
        if num != entry.next_num {
            return Err(Error::BlockOutOfOrder);
        }
        entry.expires_at = Instant::now() + DRAIN_TTL;

        let mut message = entry.message.clone();
        message.payload.extend_from_slice(tail);
        Ok(message)
    }

    /// Evicts entries whose expiry has passed.
    pub fn sweep(&self, now: Instant) {
        let mut entries = self.entries.lock().expect("block cache lock");
        entries.retain(|_, entry| entry.expires_at > now);
    }

    /// Total payload bytes and entry count currently cached.
    pub fn stats(&self) -> (u64, u64) {
        let entries = self.entries.lock().expect("block cache lock");
        let bytes = entries
            .values()
            .map(|entry| entry.message.payload.len() as u64)
            .sum();
        (bytes, entries.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_with_payload(len: usize) -> Message {
        let mut msg = Message::new();
        msg.payload = (0..len).map(|i| i as u8).collect();
        msg
    }

    #[test]
    fn slices_with_block2_and_size2() {
        let cache = BlockCache::new(Duration::from_secs(120));
        cache.put("k".to_string(), message_with_payload(3000));

        let first = cache.get("k", 0, 1024).unwrap();
        assert_eq!(1024, first.payload.len());
        assert_eq!(Some(3000), first.size2());
        let block = first.block2().unwrap();
        assert_eq!((0, true, 1024), (block.num, block.more, block.size));

        let last = cache.get("k", 2, 1024).unwrap();
        assert_eq!(3000 - 2048, last.payload.len());
        assert_eq!(None, last.size2());
        let block = last.block2().unwrap();
        assert_eq!((2, false, 1024), (block.num, block.more, block.size));
    }

    #[test]
    fn exact_multiple_final_block() {
        let cache = BlockCache::new(Duration::from_secs(120));
        cache.put("k".to_string(), message_with_payload(2048));

        let block = cache.get("k", 1, 1024).unwrap().block2().unwrap();
        assert_eq!(false, block.more);

        // Offset exactly at the end yields an empty final slice.
        let empty = cache.get("k", 2, 1024).unwrap();
        assert!(empty.payload.is_empty());
    }

    #[test]
    fn overflow_is_an_error() {
        let cache = BlockCache::new(Duration::from_secs(120));
        cache.put("k".to_string(), message_with_payload(100));
        assert_eq!(
            Err(Error::InvalidArgument),
            cache.get("k", 5, 1024).map(|_| ())
        );
    }

    #[test]
    fn append_and_assemble() {
        let cache = BlockCache::new(Duration::from_secs(120));
        let mut msg = Message::new();
        msg.payload = vec![1; 10];
        cache.put("k".to_string(), msg);

        cache.append("k", 1, &[2; 10]).unwrap();
        let assembled = cache.assembled("k", 2, &[3; 5]).unwrap();
        assert_eq!(25, assembled.payload.len());
        assert_eq!(&[3; 5], &assembled.payload[20..]);
    }

    #[test]
    fn out_of_sequence_fragments_rejected() {
        let cache = BlockCache::new(Duration::from_secs(120));
        let mut msg = Message::new();
        msg.payload = vec![1; 10];
        cache.put("k".to_string(), msg);

        // Gap and repeat are both refused without touching the assembly.
        assert_eq!(Err(Error::BlockOutOfOrder), cache.append("k", 2, &[2; 10]));
        assert_eq!(Err(Error::BlockOutOfOrder), cache.append("k", 0, &[2; 10]));
        cache.append("k", 1, &[2; 10]).unwrap();
        assert_eq!(Err(Error::BlockOutOfOrder), cache.append("k", 1, &[2; 10]));

        // The final fragment is held to the sequence too.
        assert_eq!(
            Err(Error::BlockOutOfOrder),
            cache.assembled("k", 3, &[3; 5]).map(|_| ())
        );
        let assembled = cache.assembled("k", 2, &[3; 5]).unwrap();
        assert_eq!(25, assembled.payload.len());
    }

    #[test]
    fn missing_key_not_found() {
        let cache = BlockCache::new(Duration::from_secs(120));
        assert_eq!(Err(Error::BlockNotFound), cache.append("nope", 1, &[1]));
        assert_eq!(
            Err(Error::BlockNotFound),
            cache.get("nope", 0, 16).map(|_| ())
        );
    }

    #[test]
    fn sweep_honors_ttl() {
        let cache = BlockCache::new(Duration::from_millis(0));
        cache.put("k".to_string(), message_with_payload(1));
        cache.sweep(Instant::now() + Duration::from_millis(1));
        let (bytes, count) = cache.stats();
        assert_eq!((0, 0), (bytes, count));
    }

    #[test]
    fn stats_counts_payload_bytes() {
        let cache = BlockCache::new(Duration::from_secs(120));
        cache.put("a".to_string(), message_with_payload(10));
        cache.put("b".to_string(), message_with_payload(20));
        assert_eq!((30, 2), cache.stats());
    }
}
