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

//! An asynchronous CoAP endpoint library (RFC 7252) for datagram transports.
//!
//! This crate turns a pair of datagram sockets into a reliable, ordered
//! CoAP endpoint suitable for gateway workloads that mediate many
//! simultaneous constrained-device conversations. One [`Endpoint`] provides
//! both sides of the protocol:
//!
//! * **serving**: requests are routed through a path trie (with `{name}`
//!   wildcard captures) to application handlers, duplicates are suppressed
//!   and replayed, and oversized replies are fragmented per
//!   [RFC 7959](https://tools.ietf.org/html/rfc7959);
//! * **requesting**: confirmable messages are retransmitted with exponential
//!   backoff under per-peer NSTART limits, responses are correlated by token
//!   (including the separate-response pattern), and both blockwise transfer
//!   directions are driven transparently;
//! * **observing**: subscriptions ([RFC 7641](https://tools.ietf.org/html/rfc7641))
//!   bind server notifications back to registered callbacks, with large
//!   notifications collected blockwise before delivery.
//!
//! The transport is abstract: anything implementing
//! [`transport::DatagramTransport`] works — the included Tokio
//! [`UdpTransport`](transport::UdpTransport), a DTLS listener, or the
//! in-memory [`ChannelNetwork`](transport::ChannelNetwork) used by the test
//! suite.
//!
//! ## Serving
//!
//! ```no_run
//! # async fn example() -> Result<(), coap_endpoint::Error> {
//! use coap_endpoint::{Endpoint, MsgCode};
//! use coap_endpoint::transport::UdpTransport;
//! use std::sync::Arc;
//!
//! let transport = UdpTransport::bind("udp", "0.0.0.0:5683").await?;
//! let endpoint = Arc::new(Endpoint::new(transport));
//!
//! endpoint.add_route("/sensors/{id}/temp", |req| {
//!     let id = req.path_vars["id"].clone();
//!     Ok(req.make_reply(MsgCode::CONTENT, id.into_bytes()))
//! });
//!
//! endpoint.clone().run().await
//! # }
//! ```
//!
//! ## Requesting
//!
//! ```no_run
//! # async fn example(endpoint: std::sync::Arc<coap_endpoint::Endpoint<coap_endpoint::transport::UdpTransport>>) -> Result<(), coap_endpoint::Error> {
//! use coap_endpoint::{Message, MsgCode, MsgType, SendOptions};
//!
//! let req = Message::request(MsgType::Con, MsgCode::GET, "/hello");
//! let rsp = endpoint
//!     .send("203.0.113.7:5683", req, &SendOptions::new())
//!     .await?;
//! println!("got {:?}", rsp.map(|m| m.msg_code));
//! # Ok(())
//! # }
//! ```

#![warn(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(missing_docs)]

#[macro_use]
extern crate log;

mod block;
pub use block::BlockInfo;

mod config;
pub use config::{Config, ObserveNotFoundCallback};

mod content_format;
pub use content_format::ContentFormat;

mod error;
pub use error::Error;

pub mod message;
pub use message::{Message, Metadata, MsgCode, MsgToken, MsgType};

pub mod option;

pub mod transport;

mod block_cache;
mod dedup;
mod dispatcher;
mod nstart;
mod pending;

mod endpoint;
pub use endpoint::{Endpoint, ProxyFunction};

mod observe;
pub use observe::ObserveCallback;

mod route;
pub use route::{RouteHandler, KEEPALIVE_ROUTE};

mod send;
pub use send::SendOptions;

/// The most commonly used items, for glob import.
pub mod prelude {
    pub use super::message::{Message, MsgCode, MsgToken, MsgType};
    pub use super::transport::{DatagramTransport, PeerHandle};
    pub use super::{BlockInfo, ContentFormat, Endpoint, Error, SendOptions};
    pub use super::{ObserveCallback, RouteHandler};
}
