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

use crate::message::{Message, MsgToken};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;

/// One-shot response slots for in-flight outbound exchanges.
///
/// Each slot is indexed twice: by token for normal replies, and by message-id
/// for empty acknowledgements, which carry no token worth matching (the
/// delayed-ACK pattern). Delivery consumes the slot; the reliable-send loop
/// re-registers when it keeps waiting for a separate response.
#[derive(Debug, Default)]
pub(crate) struct PendingTable {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    by_token: HashMap<MsgToken, oneshot::Sender<Message>>,
    by_msg_id: HashMap<u16, MsgToken>,
}

impl PendingTable {
    pub fn new() -> PendingTable {
        Default::default()
    }

    /// Registers a slot for the given token and message id, returning the
    /// receiving half. A stale slot under the same token is displaced.
    pub fn register(&self, token: MsgToken, msg_id: u16) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock().expect("pending lock");
        inner.by_token.insert(token, tx);
        inner.by_msg_id.insert(msg_id, token);
        rx
    }

    /// Attempts to deliver an inbound reply to its waiting sender.
    ///
    /// Empty-code messages match by message-id; everything else matches by
    /// token. Returns true if a waiter existed, even if it has since given up
    /// (the send on a dropped receiver is discarded, per the rendezvous
    /// contract).
    pub fn deliver(&self, msg: &Message) -> bool {
        let mut inner = self.inner.lock().expect("pending lock");

        let token = if msg.msg_code.is_empty() {
            match inner.by_msg_id.get(&msg.msg_id) {
                Some(token) => *token,
                None => return false,
            }
        } else {
            msg.token
        };

        let tx = match inner.by_token.remove(&token) {
            Some(tx) => tx,
            None => return false,
        };
        inner.by_msg_id.remove(&msg.msg_id);
        let _ = tx.send(msg.clone());
        true
    }

    /// Removes a slot without delivering to it.
    pub fn remove(&self, token: MsgToken, msg_id: u16) {
        let mut inner = self.inner.lock().expect("pending lock");
        inner.by_token.remove(&token);
        inner.by_msg_id.remove(&msg_id);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().expect("pending lock").by_token.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MsgCode, MsgType};

    fn reply(token: &[u8], msg_id: u16, code: MsgCode) -> Message {
        let mut msg = Message::new();
        msg.msg_type = MsgType::Ack;
        msg.msg_code = code;
        msg.msg_id = msg_id;
        msg.token = MsgToken::new(token).unwrap();
        msg
    }

    #[tokio::test]
    async fn matches_by_token() {
        let table = PendingTable::new();
        let token = MsgToken::new(b"tok").unwrap();
        let rx = table.register(token, 9);

        assert!(table.deliver(&reply(b"tok", 9, MsgCode::CONTENT)));
        assert_eq!(MsgCode::CONTENT, rx.await.unwrap().msg_code);
        assert_eq!(0, table.len());
    }

    #[tokio::test]
    async fn empty_code_matches_by_msg_id() {
        let table = PendingTable::new();
        let token = MsgToken::new(b"tok").unwrap();
        let rx = table.register(token, 77);

        // Empty ACKs carry no token.
        assert!(table.deliver(&reply(b"", 77, MsgCode::EMPTY)));
        let delivered = rx.await.unwrap();
        assert!(delivered.msg_code.is_empty());
    }

    #[tokio::test]
    async fn unmatched_reply_reports_false() {
        let table = PendingTable::new();
        assert!(!table.deliver(&reply(b"zz", 5, MsgCode::CONTENT)));
        assert!(!table.deliver(&reply(b"", 5, MsgCode::EMPTY)));
    }

    #[tokio::test]
    async fn delivery_to_cancelled_waiter_is_discarded() {
        let table = PendingTable::new();
        let token = MsgToken::new(b"tok").unwrap();
        let rx = table.register(token, 1);
        drop(rx);

        // The slot existed, so this still counts as matched.
        assert!(table.deliver(&reply(b"tok", 1, MsgCode::CONTENT)));
    }

    #[tokio::test]
    async fn remove_clears_both_indexes() {
        let table = PendingTable::new();
        let token = MsgToken::new(b"tok").unwrap();
        let _rx = table.register(token, 3);
        table.remove(token, 3);
        assert!(!table.deliver(&reply(b"tok", 3, MsgCode::CONTENT)));
        assert!(!table.deliver(&reply(b"", 3, MsgCode::EMPTY)));
    }
}
