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

//! The datagram transport contract consumed by the endpoint.
//!
//! The endpoint core is transport-agnostic: anything that can hand it raw
//! datagrams tagged with a peer handle works, be it UDP, DTLS, or an
//! in-memory channel. Secure transports keep their own session state and
//! surface it through [`PeerHandle::find_peer`](DatagramTransport::find_peer)
//! and the identity accessors.

use crate::Error;
use futures::future::BoxFuture;

mod udp;
pub use udp::{UdpPeer, UdpTransport};

mod channel;
pub use channel::{ChannelNetwork, ChannelPeer, ChannelTransport};

/// Handle representing the remote end of a single datagram conversation.
pub trait PeerHandle: Clone + Send + Sync + 'static {
    /// The address of the remote peer, as a routing string.
    fn remote_addr(&self) -> String;

    /// The name of the listener this peer was seen on.
    fn listener(&self) -> &str;

    /// Sends a datagram back to this peer over its established session.
    fn send<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<(), Error>>;

    /// The PSK identity the peer authenticated with, if any.
    fn identity(&self) -> Option<Vec<u8>> {
        None
    }

    /// The raw public key the peer authenticated with, if any.
    fn public_key(&self) -> Option<Vec<u8>> {
        None
    }

    /// The certificate the peer authenticated with, if any.
    fn certificate(&self) -> Option<Vec<u8>> {
        None
    }
}

/// A datagram reader/writer the endpoint can run on.
pub trait DatagramTransport: Send + Sync + 'static {
    /// Peer handle type produced by this transport.
    type Peer: PeerHandle;

    /// Waits for the next inbound datagram.
    fn recv(&self) -> BoxFuture<'_, Result<(Vec<u8>, Self::Peer), Error>>;

    /// Sends a raw datagram to the given address.
    fn send<'a>(&'a self, addr: &'a str, data: &'a [u8]) -> BoxFuture<'a, Result<(), Error>>;

    /// Looks up an established session for the given address, if the
    /// transport keeps sessions (DTLS does; plain UDP does not).
    fn find_peer(&self, addr: &str) -> Option<Self::Peer>;

    /// Tears down any session state held for the given address. Called when a
    /// peer reappears on a different listener.
    fn close_peer(&self, addr: &str) {
        let _ = addr;
    }
}
