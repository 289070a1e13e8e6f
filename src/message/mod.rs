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

//! The in-memory CoAP message model and its wire codec.

use crate::block::BlockInfo;
use crate::option::{OptionNumber, OptionValue};
use crate::ContentFormat;
use std::collections::HashMap;
use std::time::Instant;

mod msg_code;
pub use msg_code::MsgCode;

mod msg_type;
pub use msg_type::MsgType;

mod token;
pub use token::MsgToken;

pub mod codec;

/// Transport-level facts attached to a received message.
///
/// Metadata never travels on the wire and is excluded from message equality.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// Name of the listener the datagram arrived on.
    pub listener: String,

    /// Address of the remote peer.
    pub remote_addr: String,

    /// PSK identity presented by the peer, for DTLS transports.
    pub dtls_identity: Option<Vec<u8>>,

    /// Raw public key presented by the peer, for DTLS transports.
    pub dtls_public_key: Option<Vec<u8>>,

    /// Certificate presented by the peer, for DTLS transports.
    pub dtls_certificate: Option<Vec<u8>>,

    /// When the datagram was received.
    pub received_at: Option<Instant>,

    /// Block-size override for the response to this message. When set on a
    /// handler's reply it takes precedence over the peer-suggested and
    /// configured block sizes.
    pub block_size: Option<usize>,
}

/// A CoAP message: header fields, an ordered option list, and a payload.
///
/// Options are kept in insertion order in memory; the encoder sorts them by
/// number (stable, so repeated numbers keep their insertion order) when the
/// message is serialized.
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// Message type (CON, NON, ACK, RST).
    pub msg_type: MsgType,

    /// Message code.
    pub msg_code: MsgCode,

    /// 16-bit message id.
    pub msg_id: u16,

    /// Request/response correlation token.
    pub token: MsgToken,

    /// Message payload.
    pub payload: Vec<u8>,

    options: Vec<(OptionNumber, OptionValue)>,

    /// Path variables captured by `{name}` route segments.
    pub path_vars: HashMap<String, String>,

    /// Transport metadata for this message.
    pub meta: Metadata,
}

impl Message {
    /// Creates a new, empty message.
    pub fn new() -> Message {
        Default::default()
    }

    /// Creates a new request with the given type, code, and path.
    pub fn request(msg_type: MsgType, msg_code: MsgCode, path: &str) -> Message {
        let mut msg = Message::new();
        msg.msg_type = msg_type;
        msg.msg_code = msg_code;
        msg.with_path_string(path);
        msg
    }

    /// Returns true if this message is confirmable.
    pub fn is_confirmable(&self) -> bool {
        self.msg_type == MsgType::Con
    }

    /// Composes a reply to this message: an acknowledgement echoing the
    /// message id and token.
    pub fn make_reply(&self, code: MsgCode, payload: Vec<u8>) -> Message {
        let mut reply = Message::new();
        reply.msg_type = MsgType::Ack;
        reply.msg_code = code;
        reply.msg_id = self.msg_id;
        reply.token = self.token;
        reply.payload = payload;
        reply
    }

    /// The size this message will occupy on the wire.
    pub fn packet_size(&self) -> usize {
        codec::encode(self).map(|buf| buf.len()).unwrap_or(0)
    }

    // --- option plumbing ---

    /// Gets the first value for the given option number.
    pub fn option(&self, number: OptionNumber) -> Option<&OptionValue> {
        self.options.iter().find(|(n, _)| *n == number).map(|(_, v)| v)
    }

    /// Iterates over all values of the given option number, in insertion order.
    pub fn option_values(&self, number: OptionNumber) -> impl Iterator<Item = &OptionValue> {
        self.options
            .iter()
            .filter(move |(n, _)| *n == number)
            .map(|(_, v)| v)
    }

    /// Gets the first value of a `uint`-format option.
    pub fn option_uint(&self, number: OptionNumber) -> Option<u32> {
        self.option(number).and_then(|v| v.as_uint())
    }

    /// Adds an option. With `replace`, all existing values for the number are
    /// removed first.
    pub fn with_option<V: Into<OptionValue>>(
        &mut self,
        number: OptionNumber,
        value: V,
        replace: bool,
    ) -> &mut Message {
        if replace {
            self.remove_option(number);
        }
        self.options.push((number, value.into()));
        self
    }

    /// Removes all values of the given option number.
    pub fn remove_option(&mut self, number: OptionNumber) {
        self.options.retain(|(n, _)| *n != number);
    }

    /// Returns the options sorted by number, stable in insertion order.
    ///
    /// This is the normalized form the encoder emits.
    pub fn sorted_options(&self) -> Vec<(OptionNumber, OptionValue)> {
        let mut sorted = self.options.clone();
        sorted.sort_by_key(|(n, _)| *n);
        sorted
    }

    pub(crate) fn push_option(&mut self, number: OptionNumber, value: OptionValue) {
        self.options.push((number, value));
    }

    // --- path and query ---

    /// The `Uri-Path` segments of this message.
    pub fn path(&self) -> Vec<String> {
        self.option_values(OptionNumber::URI_PATH)
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect()
    }

    /// The path as a `/`-separated string.
    pub fn path_string(&self) -> String {
        self.path().join("/")
    }

    /// Replaces the `Uri-Path` options with the given segments.
    pub fn with_path(&mut self, segments: &[&str]) -> &mut Message {
        self.remove_option(OptionNumber::URI_PATH);
        for segment in segments {
            self.with_option(OptionNumber::URI_PATH, *segment, false);
        }
        self
    }

    /// Replaces the `Uri-Path` options from a `/`-separated string.
    pub fn with_path_string(&mut self, path: &str) -> &mut Message {
        let segments: Vec<&str> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();
        self.with_path(&segments)
    }

    /// The `Uri-Query` components of this message.
    pub fn query(&self) -> Vec<String> {
        self.option_values(OptionNumber::URI_QUERY)
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect()
    }

    /// The query as a single `&`-joined string.
    pub fn query_string(&self) -> String {
        self.query().join("&")
    }

    /// Parses `key=value` query components into a map.
    pub fn parse_query(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        for component in self.query() {
            let mut parts = component.splitn(2, '=');
            if let Some(key) = parts.next() {
                vars.insert(key.to_string(), parts.next().unwrap_or("").to_string());
            }
        }
        vars
    }

    /// Appends a `Uri-Query` component.
    pub fn with_query(&mut self, component: &str) -> &mut Message {
        self.with_option(OptionNumber::URI_QUERY, component, false)
    }

    /// The `Location-Path` segments of this message.
    pub fn location_path(&self) -> Vec<String> {
        self.option_values(OptionNumber::LOCATION_PATH)
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect()
    }

    /// Replaces the `Location-Path` options from a `/`-separated string.
    pub fn with_location_path_string(&mut self, path: &str) -> &mut Message {
        self.remove_option(OptionNumber::LOCATION_PATH);
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            self.with_option(OptionNumber::LOCATION_PATH, segment, false);
        }
        self
    }

    // --- typed option accessors ---

    /// The `Content-Format` of the payload, if present.
    pub fn content_format(&self) -> Option<ContentFormat> {
        self.option_uint(OptionNumber::CONTENT_FORMAT)
            .map(|v| ContentFormat(v as u16))
    }

    /// Sets the `Content-Format` option.
    pub fn with_content_format(&mut self, format: ContentFormat) -> &mut Message {
        self.with_option(OptionNumber::CONTENT_FORMAT, u32::from(format.0), true)
    }

    /// The `Accept` option, if present.
    pub fn accept(&self) -> Option<ContentFormat> {
        self.option_uint(OptionNumber::ACCEPT)
            .map(|v| ContentFormat(v as u16))
    }

    /// Sets the `Accept` option.
    pub fn with_accept(&mut self, format: ContentFormat) -> &mut Message {
        self.with_option(OptionNumber::ACCEPT, u32::from(format.0), true)
    }

    /// The `Observe` option value, if present.
    pub fn observe(&self) -> Option<u32> {
        self.option_uint(OptionNumber::OBSERVE)
    }

    /// Sets the `Observe` option.
    pub fn with_observe(&mut self, value: u32) -> &mut Message {
        self.with_option(OptionNumber::OBSERVE, value, true)
    }

    /// The decoded `Block1` descriptor, if present and well-formed.
    pub fn block1(&self) -> Option<BlockInfo> {
        self.option(OptionNumber::BLOCK1)
            .and_then(|v| v.as_bytes())
            .and_then(|buf| BlockInfo::decode(buf).ok())
    }

    /// Sets the `Block1` option.
    pub fn with_block1(&mut self, block: BlockInfo) -> &mut Message {
        self.with_option(OptionNumber::BLOCK1, block.encode(), true)
    }

    /// The decoded `Block2` descriptor, if present and well-formed.
    pub fn block2(&self) -> Option<BlockInfo> {
        self.option(OptionNumber::BLOCK2)
            .and_then(|v| v.as_bytes())
            .and_then(|buf| BlockInfo::decode(buf).ok())
    }

    /// Sets the `Block2` option.
    pub fn with_block2(&mut self, block: BlockInfo) -> &mut Message {
        self.with_option(OptionNumber::BLOCK2, block.encode(), true)
    }

    /// The `Size1` option value, if present.
    pub fn size1(&self) -> Option<u32> {
        self.option_uint(OptionNumber::SIZE1)
    }

    /// Sets the `Size1` option.
    pub fn with_size1(&mut self, size: u32) -> &mut Message {
        self.with_option(OptionNumber::SIZE1, size, true)
    }

    /// The `Size2` option value, if present.
    pub fn size2(&self) -> Option<u32> {
        self.option_uint(OptionNumber::SIZE2)
    }

    /// Sets the `Size2` option.
    pub fn with_size2(&mut self, size: u32) -> &mut Message {
        self.with_option(OptionNumber::SIZE2, size, true)
    }

    // --- builder conveniences ---

    /// Sets the message code.
    pub fn with_code(&mut self, code: MsgCode) -> &mut Message {
        self.msg_code = code;
        self
    }

    /// Sets the payload.
    pub fn with_payload(&mut self, payload: Vec<u8>) -> &mut Message {
        self.payload = payload;
        self
    }

    /// Sets the token.
    pub fn with_token(&mut self, token: MsgToken) -> &mut Message {
        self.token = token;
        self
    }

    /// Key under which blockwise state for this exchange is cached. The peer
    /// address is always part of the key; request-side (Block1) assembly also
    /// folds in the token so interleaved uploads from one peer stay separate.
    pub(crate) fn block_key(&self, with_token: bool) -> String {
        let mut key = format!(
            "{}|{}|{}|{}",
            self.meta.remote_addr,
            self.msg_code,
            self.path_string(),
            self.query_string()
        );
        if with_token {
            key.push('|');
            key.push_str(&self.token.to_string());
        }
        key
    }
}

impl PartialEq for Message {
    /// Messages compare equal on their wire-visible content with options in
    /// normalized (sorted) order; metadata and path variables are excluded.
    fn eq(&self, other: &Message) -> bool {
        self.msg_type == other.msg_type
            && self.msg_code == other.msg_code
            && self.msg_id == other.msg_id
            && self.token == other.token
            && self.payload == other.payload
            && self.sorted_options() == other.sorted_options()
    }
}

impl Eq for Message {}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} mid={:04X} tok={}",
            self.msg_type, self.msg_code, self.msg_id, self.token
        )?;
        let path = self.path_string();
        if !path.is_empty() {
            write!(f, " /{}", path)?;
        }
        if !self.payload.is_empty() {
            write!(f, " [{} bytes]", self.payload.len())?;
        }
        Ok(())
    }
}
