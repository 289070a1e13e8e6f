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

//! Classification and handling of inbound messages.
//!
//! Every decoded datagram flows through [`Endpoint::handle_message`], which
//! sorts it into one of: new request, duplicate, acknowledgement,
//! notification, reset, or block-transfer fragment, and composes the reply
//! (if any) the transport should carry back.

use crate::block::BlockInfo;
use crate::dedup::DedupOutcome;
use crate::endpoint::Endpoint;
use crate::message::{Message, MsgCode, MsgType};
use crate::observe::Observation;
use crate::route::KEEPALIVE_ROUTE;
use crate::send::SendOptions;
use crate::transport::DatagramTransport;
use std::sync::Arc;

fn empty_ack(msg_id: u16) -> Message {
    let mut msg = Message::new();
    msg.msg_type = MsgType::Ack;
    msg.msg_code = MsgCode::EMPTY;
    msg.msg_id = msg_id;
    msg
}

fn reset(msg_id: u16) -> Message {
    let mut msg = Message::new();
    msg.msg_type = MsgType::Rst;
    msg.msg_code = MsgCode::EMPTY;
    msg.msg_id = msg_id;
    msg
}

impl<T: DatagramTransport> Endpoint<T> {
    /// Processes one inbound message and returns the reply to transmit, if
    /// any.
    pub(crate) async fn handle_message(self: &Arc<Self>, mut req: Message) -> Option<Message> {
        let peer = req.meta.remote_addr.clone();

        // Admission: CON and NON exchanges are deduplicated symmetrically.
        let mut dedup_key = None;
        if req.msg_type.is_con() || req.msg_type.is_non() {
            match self.dedup.check(&peer, req.msg_id) {
                DedupOutcome::New => dedup_key = Some((peer, req.msg_id)),
                DedupOutcome::Pending => {
                    debug!("duplicate {} mid={:04X} still pending, dropped", req.msg_type, req.msg_id);
                    return None;
                }
                DedupOutcome::Replay(cached) => {
                    debug!("duplicate {} mid={:04X}, replaying cached reply", req.msg_type, req.msg_id);
                    return cached;
                }
            }
        }

        // Request fragmentation: reassemble Block1 uploads.
        if req.msg_code.is_request() {
            if let Some(block) = req.block1() {
                match self.absorb_block1(&mut req, block) {
                    Some(rsp) => return self.finish(dedup_key, Some(rsp)),
                    None => {} // final fragment absorbed, fall through
                }
            }
        }

        // Acknowledgement correlation. Unmatched ACKs fall through to the
        // notification path as stray notifications.
        if req.msg_type.is_ack() && self.pending.deliver(&req) {
            return None;
        }

        // Response fragmentation: serve follow-up Block2 reads out of the
        // response cache.
        if req.msg_code.is_request() {
            if let Some(block) = req.block2() {
                if block.num > 0 {
                    let rsp = self.serve_block2(&req, block);
                    return self.finish(dedup_key, Some(rsp));
                }
            }
        }

        let rsp = match req.msg_type {
            MsgType::Con => {
                if req.msg_code.is_empty() {
                    // CoAP ping. Invoke the keepalive hook, then reset.
                    self.invoke_keepalive(&req);
                    Some(reset(req.msg_id))
                } else if req.msg_code.is_request() {
                    Some(self.handle_request(&mut req))
                } else if req.observe().is_some() {
                    self.handle_notify(&req)
                } else {
                    // A response code arriving as CON: the separate-response
                    // pattern. Confirm it if someone is waiting.
                    if self.pending.deliver(&req) {
                        Some(empty_ack(req.msg_id))
                    } else {
                        Some(req.make_reply(MsgCode::NOT_FOUND, Vec::new()))
                    }
                }
            }
            MsgType::Non => {
                if req.msg_code.is_request() {
                    let mut rsp = self.handle_request(&mut req);
                    rsp.msg_type = MsgType::Non;
                    rsp.msg_id = self.next_msg_id();
                    Some(rsp)
                } else {
                    self.handle_notify(&req)
                }
            }
            MsgType::Ack => {
                // Already failed pending correlation above; treat as a stray
                // notification, but never reset an acknowledgement.
                let _ = self.handle_notify(&req);
                None
            }
            MsgType::Rst => {
                if !req.token.is_empty() {
                    if self.observations.remove(&req.token).is_some() {
                        debug!("observation cancelled by peer reset");
                    }
                }
                None
            }
        };

        let rsp = rsp.map(|rsp| self.fragment_reply(&req, rsp));
        self.finish(dedup_key, rsp)
    }

    fn finish(&self, dedup_key: Option<(String, u16)>, rsp: Option<Message>) -> Option<Message> {
        if let Some((peer, msg_id)) = dedup_key {
            self.dedup.save(&peer, msg_id, rsp.as_ref());
        }
        rsp
    }

    /// Folds a Block1 fragment into the per-exchange assembly.
    ///
    /// Returns the intermediate reply (2.31 Continue, or 5.00 when the
    /// assembly is missing or the fragment is out of sequence), or `None`
    /// once the final fragment has been absorbed and the request carries the
    /// complete payload.
    fn absorb_block1(&self, req: &mut Message, block: BlockInfo) -> Option<Message> {
        let key = req.block_key(true);

        if block.more {
            if block.num == 0 {
                self.block_cache.put(key, req.clone());
            } else if let Err(err) = self.block_cache.append(&key, block.num, &req.payload) {
                warn!("block1 append failed for {}: {}", req.meta.remote_addr, err);
                return Some(req.make_reply(MsgCode::INTERNAL_SERVER_ERROR, Vec::new()));
            }
            let mut rsp = req.make_reply(MsgCode::CONTINUE, Vec::new());
            rsp.with_block1(block);
            return Some(rsp);
        }

        if block.num > 0 {
            match self.block_cache.assembled(&key, block.num, &req.payload) {
                Ok(assembled) => req.payload = assembled.payload,
                Err(err) => {
                    warn!("block1 assembly failed for {}: {}", req.meta.remote_addr, err);
                    return Some(req.make_reply(MsgCode::INTERNAL_SERVER_ERROR, Vec::new()));
                }
            }
        }
        None
    }

    /// Serves block `num > 0` of a fragmented response out of the cache.
    fn serve_block2(&self, req: &Message, block: BlockInfo) -> Message {
        match self
            .block_cache
            .get(&req.block_key(false), block.num, block.size)
        {
            Ok(mut slice) => {
                slice.msg_type = if req.msg_type.is_non() {
                    MsgType::Non
                } else {
                    MsgType::Ack
                };
                slice.msg_id = req.msg_id;
                slice.token = req.token;
                slice.meta = Default::default();
                slice
            }
            Err(err) => {
                warn!(
                    "block2 read {} from {} failed: {}",
                    block, req.meta.remote_addr, err
                );
                req.make_reply(MsgCode::INTERNAL_SERVER_ERROR, Vec::new())
            }
        }
    }

    /// Routes a request to its handler and normalizes the reply envelope.
    fn handle_request(&self, req: &mut Message) -> Message {
        match self.routes.lookup(req) {
            Some(handler) => match handler(req) {
                Ok(mut rsp) => {
                    rsp.msg_type = MsgType::Ack;
                    rsp.msg_id = req.msg_id;
                    rsp.token = req.token;
                    rsp
                }
                Err(err) => {
                    warn!("handler for /{} failed: {}", req.path_string(), err);
                    req.make_reply(MsgCode::INTERNAL_SERVER_ERROR, Vec::new())
                }
            },
            None => req.make_reply(MsgCode::NOT_FOUND, Vec::new()),
        }
    }

    /// Delivers a notification to its observation callback.
    ///
    /// Confirmable notifications are answered with an empty ACK on success
    /// and a reset on failure or when no observation matches. Fragmented
    /// notifications are acknowledged immediately while the remaining blocks
    /// are retrieved in the background.
    fn handle_notify(self: &Arc<Self>, req: &Message) -> Option<Message> {
        let observation = match self.lookup_observation(req) {
            Some(observation) => observation,
            None => {
                debug!("observation not found for token {}", req.token);
                return Some(reset(req.msg_id));
            }
        };

        if let Some(block) = req.block2() {
            if block.more && block.num == 0 {
                let endpoint = self.clone();
                let first = req.clone();
                tokio::spawn(async move {
                    endpoint.retrieve_notification(observation, first).await;
                });
                return if req.msg_type.is_con() {
                    Some(empty_ack(req.msg_id))
                } else {
                    None
                };
            }
        }

        match (observation.callback)(req) {
            Ok(()) => {
                if req.msg_type.is_con() {
                    Some(empty_ack(req.msg_id))
                } else {
                    None
                }
            }
            Err(err) => {
                warn!("error processing notification: {}", err);
                Some(reset(req.msg_id))
            }
        }
    }

    /// Collects the remaining blocks of a fragmented notification and hands
    /// the assembled message to the callback exactly once.
    async fn retrieve_notification(self: Arc<Self>, observation: Observation, first: Message) {
        let addr = first.meta.remote_addr.clone();
        let req = Message::request(MsgType::Con, MsgCode::GET, &observation.path);
        let options = SendOptions::new();

        match self.collect_blocks(&addr, &req, first, &options).await {
            Ok(assembled) => {
                if let Err(err) = (observation.callback)(&assembled) {
                    warn!("error processing assembled notification: {}", err);
                }
            }
            Err(err) => {
                warn!("notification block retrieval from {} failed: {}", addr, err);
            }
        }
    }

    fn invoke_keepalive(&self, req: &Message) {
        let mut probe = req.clone();
        probe.with_path_string(KEEPALIVE_ROUTE);
        if let Some(handler) = self.routes.lookup(&mut probe) {
            if let Err(err) = handler(&mut probe) {
                warn!("keepalive hook failed: {}", err);
            }
        }
    }

    /// Installs an oversized reply in the response cache and swaps it for its
    /// first block. The effective block size is the reply's own override,
    /// else the size the peer suggested, else the configured default.
    fn fragment_reply(&self, req: &Message, rsp: Message) -> Message {
        if !req.msg_code.is_request() {
            return rsp;
        }
        let size = rsp
            .meta
            .block_size
            .or_else(|| req.block2().map(|block| block.size))
            .unwrap_or(self.config.block_default_size);
        if size == 0 || rsp.packet_size() <= size {
            return rsp;
        }

        let msg_type = rsp.msg_type;
        let msg_id = rsp.msg_id;
        let token = rsp.token;
        let key = req.block_key(false);
        self.block_cache.put(key.clone(), rsp);
        match self.block_cache.get(&key, 0, size) {
            Ok(mut first) => {
                first.msg_type = msg_type;
                first.msg_id = msg_id;
                first.token = token;
                first.meta = Default::default();
                first
            }
            Err(err) => {
                warn!("block2 fragmentation failed: {}", err);
                let mut rsp = empty_ack(msg_id);
                rsp.msg_code = MsgCode::INTERNAL_SERVER_ERROR;
                rsp.token = token;
                rsp
            }
        }
    }
}

// Dispatcher behavior is exercised end-to-end in `tests/`, which drives two
// endpoints over the in-memory channel transport.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MsgToken;

    #[test]
    fn empty_ack_shape() {
        let ack = empty_ack(0x1234);
        assert_eq!(MsgType::Ack, ack.msg_type);
        assert!(ack.msg_code.is_empty());
        assert_eq!(0x1234, ack.msg_id);
        assert!(ack.token.is_empty());
        assert!(ack.payload.is_empty());
    }

    #[test]
    fn reset_shape() {
        let rst = reset(7);
        assert_eq!(MsgType::Rst, rst.msg_type);
        assert!(rst.msg_code.is_empty());
        assert_eq!(7, rst.msg_id);
        assert_eq!(MsgToken::EMPTY, rst.token);
    }
}
