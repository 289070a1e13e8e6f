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

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::Notify;

/// Per-peer gate bounding the number of outstanding confirmable messages, as
/// required by RFC 7252 §4.7 (`NSTART`).
///
/// `acquire` waits until the peer's count drops below the limit; `release`
/// decrements and wakes waiters. Slots whose count returns to zero are
/// dropped on the spot so the map does not grow with every peer ever talked
/// to; [`clear`](NstartGate::clear) remains the explicit purge.
#[derive(Debug, Default)]
pub(crate) struct NstartGate {
    slots: Mutex<HashMap<String, u32>>,
    notify: Notify,
}

/// Held slot in the gate; releasing happens on drop, so a cancelled send
/// cannot strand its slot.
#[derive(Debug)]
pub(crate) struct NstartSlot<'a> {
    gate: &'a NstartGate,
    addr: String,
}

impl Drop for NstartSlot<'_> {
    fn drop(&mut self) {
        self.gate.release(&self.addr);
    }
}

impl NstartGate {
    pub fn new() -> NstartGate {
        Default::default()
    }

    /// Takes a slot for the given peer, waiting while `limit` messages are
    /// already outstanding. A limit of zero disables the gate.
    pub async fn acquire<'a>(&'a self, addr: &str, limit: u32) -> Option<NstartSlot<'a>> {
        if limit == 0 {
            return None;
        }
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Arm the waiter before checking, so a release between the check
            // and the await cannot be missed.
            notified.as_mut().enable();

            {
                let mut slots = self.slots.lock().expect("nstart lock");
                let count = slots.entry(addr.to_string()).or_insert(0);
                if *count < limit {
                    *count += 1;
                    return Some(NstartSlot {
                        gate: self,
                        addr: addr.to_string(),
                    });
                }
            }

            notified.await;
        }
    }

    /// Returns a slot for the given peer and wakes any waiters.
    pub fn release(&self, addr: &str) {
        let mut slots = self.slots.lock().expect("nstart lock");
        if let Some(count) = slots.get_mut(addr) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                slots.remove(addr);
            }
        }
        drop(slots);
        self.notify.notify_waiters();
    }

    /// Forgets all state for the given peer and wakes any waiters.
    pub fn clear(&self, addr: &str) {
        self.slots.lock().expect("nstart lock").remove(addr);
        self.notify.notify_waiters();
    }

    #[cfg(test)]
    fn count(&self, addr: &str) -> u32 {
        self.slots
            .lock()
            .expect("nstart lock")
            .get(addr)
            .copied()
            .unwrap_or(0)
    }
}
