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

//! Outbound message transmission: retransmission with exponential backoff,
//! response correlation, and client-side blockwise transfers.

use crate::block::BlockInfo;
use crate::endpoint::Endpoint;
use crate::message::{codec, Message, MsgCode, MsgToken, MsgType};
use crate::option::OptionNumber;
use crate::transport::DatagramTransport;
use crate::Error;
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Per-send knobs. Everything defaults to the RFC 7252 recommended values or
/// to the endpoint configuration.
#[derive(Debug, Clone)]
pub struct SendOptions {
    /// Maximum number of retransmissions after the initial transmit. `-1`
    /// disables retries entirely (a single transmission with a bounded wait).
    pub max_retransmit: i32,

    /// Base acknowledgement timeout for the first transmission.
    pub ack_timeout: Duration,

    /// Jitter factor: the initial timeout is drawn uniformly from
    /// `[ack_timeout, ack_timeout * random_factor)`.
    pub random_factor: f64,

    /// Block size for outbound fragmentation; `None` uses the endpoint
    /// default.
    pub block_size: Option<usize>,

    /// Datagram size cap; `None` uses the endpoint default.
    pub max_message_size: Option<usize>,

    /// NSTART override; `None` uses the endpoint default, `Some(0)` disables
    /// the gate.
    pub nstart: Option<u32>,
}

impl Default for SendOptions {
    fn default() -> SendOptions {
        SendOptions {
            max_retransmit: 3,
            ack_timeout: Duration::from_secs(5),
            random_factor: 1.5,
            block_size: None,
            max_message_size: None,
            nstart: None,
        }
    }
}

impl SendOptions {
    /// Creates options with the default values.
    pub fn new() -> SendOptions {
        Default::default()
    }

    /// Sets the retry count and the base acknowledgement timeout.
    pub fn with_retry(mut self, count: i32, timeout: Duration) -> SendOptions {
        self.max_retransmit = count;
        self.ack_timeout = timeout;
        self
    }

    /// Disables retransmission: one transmit, one bounded wait.
    pub fn no_retry(mut self) -> SendOptions {
        self.max_retransmit = -1;
        self
    }

    /// Sets the blockwise fragmentation size.
    pub fn with_block_size(mut self, size: usize) -> SendOptions {
        self.block_size = Some(size);
        self
    }

    /// Sets the outstanding-confirmable cap for the destination peer.
    pub fn with_nstart(mut self, nstart: u32) -> SendOptions {
        self.nstart = Some(nstart);
        self
    }

    /// Sets the retransmission jitter factor.
    pub fn with_random_factor(mut self, factor: f64) -> SendOptions {
        self.random_factor = factor;
        self
    }

    /// The total budget for one confirmable exchange:
    /// `ack_timeout * (2^(max_retransmit + 1) - 1) * random_factor`.
    pub fn max_wait(&self) -> Duration {
        let k = self.max_retransmit.max(0) as u32;
        let spread = ((1u64 << (k + 1)) - 1) as f64;
        Duration::from_secs_f64(self.ack_timeout.as_secs_f64() * spread * self.random_factor)
    }

    fn initial_timeout(&self) -> Duration {
        jittered(self.ack_timeout, self.random_factor)
    }
}

fn jittered(base: Duration, factor: f64) -> Duration {
    if factor <= 1.0 {
        return base;
    }
    let low = base.as_secs_f64();
    let high = low * factor;
    Duration::from_secs_f64(rand::thread_rng().gen_range(low..high))
}

/// Allocates a fresh eight-byte alphanumeric token.
pub(crate) fn random_token() -> MsgToken {
    let bytes: Vec<u8> = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(8)
        .collect();
    MsgToken::new(&bytes).expect("token length")
}

impl<T: DatagramTransport> Endpoint<T> {
    /// Sends a message to a peer.
    ///
    /// Confirmable messages are retransmitted with exponential backoff until
    /// acknowledged, and their response is returned; both blockwise
    /// directions are driven transparently (large request payloads are
    /// uploaded in `Block1` fragments, fragmented responses are collected
    /// via `Block2`). Non-confirmable messages, acknowledgements, and resets
    /// are transmitted once and yield `None`.
    pub async fn send(
        &self,
        addr: &str,
        mut msg: Message,
        options: &SendOptions,
    ) -> Result<Option<Message>, Error> {
        let block_size = options.block_size.unwrap_or(self.config.block_default_size);
        if msg.msg_type.is_con() && msg.msg_code.is_request() && msg.payload.len() > block_size {
            return self
                .send_blockwise(addr, msg, options, block_size)
                .await
                .map(Some);
        }

        match msg.msg_type {
            MsgType::Con => {
                let collect = msg.msg_code.is_request();
                let reply = self.transmit_confirmable(addr, msg.clone(), options).await?;
                if collect {
                    if let Some(block) = reply.block2() {
                        if block.more {
                            return self.collect_blocks(addr, &msg, reply, options).await.map(Some);
                        }
                    }
                }
                Ok(Some(reply))
            }
            MsgType::Non => {
                msg.msg_id = self.next_msg_id();
                let data = self.encode_capped(&msg, options)?;
                self.send_raw(addr, &data).await?;
                Ok(None)
            }
            MsgType::Ack | MsgType::Rst => {
                // Echoes the peer's message id; nothing to correlate.
                let data = self.encode_capped(&msg, options)?;
                self.send_raw(addr, &data).await?;
                Ok(None)
            }
        }
    }

    /// Runs one confirmable exchange under the peer's NSTART gate.
    pub(crate) async fn transmit_confirmable(
        &self,
        addr: &str,
        mut msg: Message,
        options: &SendOptions,
    ) -> Result<Message, Error> {
        let nstart = options.nstart.unwrap_or(self.config.nstart);
        let _slot = self.nstart.acquire(addr, nstart).await;
        self.exchange(addr, &mut msg, options).await
    }

    async fn exchange(
        &self,
        addr: &str,
        msg: &mut Message,
        options: &SendOptions,
    ) -> Result<Message, Error> {
        if msg.token.is_empty() {
            msg.token = random_token();
        }
        msg.msg_id = self.next_msg_id();
        let token = msg.token;
        let msg_id = msg.msg_id;

        let mut rx = self.pending.register(token, msg_id);
        let data = match self.encode_capped(msg, options) {
            Ok(data) => data,
            Err(err) => {
                self.pending.remove(token, msg_id);
                return Err(err);
            }
        };

        let sending_response = msg.msg_code.is_response();
        let deadline = Instant::now() + options.max_wait();
        let mut timeout = options.initial_timeout();
        let mut attempt: u32 = 0;

        let result = 'send: loop {
            if let Err(err) = self.send_raw(addr, &data).await {
                break Err(err);
            }

            let reply = 'wait: loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break 'wait None;
                }
                match tokio::time::timeout(timeout.min(remaining), &mut rx).await {
                    Ok(Ok(reply)) => {
                        if reply.msg_code.is_empty() && reply.msg_type.is_ack() {
                            if sending_response {
                                // Empty ACK confirms delivery of our response.
                                break 'wait Some(reply);
                            }
                            // Separate-response pattern: the peer has taken
                            // the request and will answer later as a new CON.
                            // Keep waiting on the same budget.
                            debug!("got empty ack, awaiting separate response");
                            rx = self.pending.register(token, msg_id);
                            continue 'wait;
                        }
                        break 'wait Some(reply);
                    }
                    // The sender side only disappears when the slot was
                    // displaced, which means this exchange is abandoned.
                    Ok(Err(_)) => break 'send Err(Error::Cancelled),
                    Err(_) => break 'wait None,
                }
            };

            if let Some(reply) = reply {
                break Ok(reply);
            }

            if options.max_retransmit < 0 || attempt >= options.max_retransmit as u32 {
                break Err(Error::Timeout);
            }
            if deadline.saturating_duration_since(Instant::now()).is_zero() {
                break Err(Error::Timeout);
            }
            attempt += 1;
            timeout *= 2;
            debug!("retransmit {} to {} ({})", attempt, addr, msg);
        };

        self.pending.remove(token, msg_id);
        result
    }

    /// Uploads an oversized request payload as a sequence of `Block1`
    /// fragments, each acknowledged with 2.31 Continue until the final block
    /// yields the real response.
    async fn send_blockwise(
        &self,
        addr: &str,
        mut msg: Message,
        options: &SendOptions,
        block_size: usize,
    ) -> Result<Message, Error> {
        let payload = std::mem::replace(&mut msg.payload, Vec::new());
        let total = payload.len();

        // One token spans the whole upload so the server's reassembly key is
        // stable across fragments.
        if msg.token.is_empty() {
            msg.token = random_token();
        }

        let mut size = block_size;
        let mut num: u32 = 0;
        loop {
            let offset = num as usize * size;
            let end = total.min(offset + size);
            let more = end < total;

            let mut part = msg.clone();
            part.payload = payload[offset..end].to_vec();
            part.with_block1(BlockInfo::new(num, more, size).ok_or(Error::InvalidArgument)?);
            if num == 0 {
                part.with_size1(total as u32);
            }

            let rsp = self.transmit_confirmable(addr, part, options).await?;

            if !more {
                if let Some(block) = rsp.block2() {
                    if block.more {
                        return self.collect_blocks(addr, &msg, rsp, options).await;
                    }
                }
                return Ok(rsp);
            }

            if rsp.msg_code != MsgCode::CONTINUE {
                warn!(
                    "block1 upload to {} aborted: expected 2.31, got {}",
                    addr, rsp.msg_code
                );
                return Err(Error::BadResponse);
            }

            // The server may shrink the block size; resume at the boundary
            // the already-sent bytes fall on.
            if let Some(echo) = rsp.block1() {
                if echo.size < size {
                    num = (size / echo.size) as u32 * (num + 1) - 1;
                    size = echo.size;
                }
            }
            num += 1;
        }
    }

    /// Fetches the remaining blocks of a fragmented response and returns the
    /// reply with the fully reassembled payload.
    pub(crate) async fn collect_blocks(
        &self,
        addr: &str,
        req: &Message,
        mut reply: Message,
        options: &SendOptions,
    ) -> Result<Message, Error> {
        let first = match reply.block2() {
            Some(block) => block,
            None => return Ok(reply),
        };
        let code = if req.msg_code == MsgCode::FETCH {
            MsgCode::FETCH
        } else {
            MsgCode::GET
        };

        let mut assembled = std::mem::replace(&mut reply.payload, Vec::new());
        let mut num = first.num + 1;
        loop {
            let mut next = Message::new();
            next.msg_type = MsgType::Con;
            next.msg_code = code;
            for value in req.option_values(OptionNumber::URI_PATH) {
                next.push_option(OptionNumber::URI_PATH, value.clone());
            }
            for value in req.option_values(OptionNumber::URI_QUERY) {
                next.push_option(OptionNumber::URI_QUERY, value.clone());
            }
            next.with_block2(BlockInfo::new(num, false, first.size).ok_or(Error::InvalidArgument)?);

            let rsp = self.transmit_confirmable(addr, next, options).await?;
            Error::from_response_code(rsp.msg_code)?;
            assembled.extend_from_slice(&rsp.payload);

            match rsp.block2() {
                Some(block) if block.more => num = block.num + 1,
                _ => break,
            }
        }

        reply.payload = assembled;
        reply.remove_option(OptionNumber::BLOCK2);
        Ok(reply)
    }

    fn encode_capped(&self, msg: &Message, options: &SendOptions) -> Result<Vec<u8>, Error> {
        let cap = options
            .max_message_size
            .unwrap_or(self.config.max_message_size);
        let data = codec::encode(msg)?;
        if data.len() > cap {
            return Err(Error::InvalidArgument);
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_wait_matches_rfc_formula() {
        let options = SendOptions::new();
        // 5 s * (2^4 - 1) * 1.5 = 112.5 s
        assert_eq!(Duration::from_secs_f64(112.5), options.max_wait());

        let options = SendOptions::new().with_retry(2, Duration::from_secs(1));
        // 1 s * (2^3 - 1) * 1.5 = 10.5 s
        assert_eq!(Duration::from_secs_f64(10.5), options.max_wait());

        // Retries disabled: a single ack_timeout * factor budget.
        let options = SendOptions::new().with_retry(-1, Duration::from_secs(4));
        assert_eq!(Duration::from_secs_f64(6.0), options.max_wait());
    }

    #[test]
    fn jitter_stays_in_range() {
        let base = Duration::from_secs(2);
        for _ in 0..100 {
            let j = jittered(base, 1.5);
            assert!(j >= base);
            assert!(j < base * 3 / 2);
        }
        assert_eq!(base, jittered(base, 1.0));
    }

    #[test]
    fn random_tokens_are_distinct() {
        let a = random_token();
        let b = random_token();
        assert_eq!(8, a.len());
        assert_ne!(a, b);
        assert!(String::from_utf8(a.as_bytes().to_vec()).is_ok());
    }
}
