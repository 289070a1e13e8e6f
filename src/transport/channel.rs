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

use super::{DatagramTransport, PeerHandle};
use crate::Error;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

type Frame = (Vec<u8>, String);
type Switchboard = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Frame>>>>;

/// An in-memory datagram network connecting any number of transports by
/// address string. Intended for tests and loopback use: datagrams are
/// delivered instantly and in order, and each transport can be told to drop
/// outbound datagrams to exercise retransmission.
#[derive(Debug, Clone, Default)]
pub struct ChannelNetwork {
    switchboard: Switchboard,
}

impl ChannelNetwork {
    /// Creates an empty network.
    pub fn new() -> ChannelNetwork {
        Default::default()
    }

    /// Attaches a new transport to the network under the given listener name
    /// and address.
    pub fn join(&self, name: &str, addr: &str) -> ChannelTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        self.switchboard
            .lock()
            .expect("switchboard lock")
            .insert(addr.to_string(), tx);
        ChannelTransport {
            name: Arc::from(name),
            addr: addr.to_string(),
            switchboard: self.switchboard.clone(),
            rx: tokio::sync::Mutex::new(rx),
            drop_outbound: AtomicUsize::new(0),
            sent: AtomicUsize::new(0),
        }
    }
}

/// One endpoint of a [`ChannelNetwork`].
#[derive(Debug)]
pub struct ChannelTransport {
    name: Arc<str>,
    addr: String,
    switchboard: Switchboard,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,
    drop_outbound: AtomicUsize,
    sent: AtomicUsize,
}

impl ChannelTransport {
    /// The address this transport receives on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Silently discards the next `count` outbound datagrams.
    pub fn drop_next(&self, count: usize) {
        self.drop_outbound.store(count, Ordering::SeqCst);
    }

    /// Number of datagrams handed to `send` so far, dropped ones included.
    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    fn deliver(&self, addr: &str, data: &[u8]) -> Result<(), Error> {
        self.sent.fetch_add(1, Ordering::SeqCst);

        let pending_drops = self.drop_outbound.load(Ordering::SeqCst);
        if pending_drops > 0 {
            self.drop_outbound.store(pending_drops - 1, Ordering::SeqCst);
            debug!("channel: dropping outbound datagram to {}", addr);
            return Ok(());
        }

        let tx = self
            .switchboard
            .lock()
            .expect("switchboard lock")
            .get(addr)
            .cloned()
            .ok_or(Error::PeerNotFound)?;
        tx.send((data.to_vec(), self.addr.clone()))
            .map_err(|_| Error::IOError)
    }
}

/// Peer handle for datagrams received over a [`ChannelTransport`].
#[derive(Debug, Clone)]
pub struct ChannelPeer {
    addr: String,
    local_addr: String,
    name: Arc<str>,
    switchboard: Switchboard,
}

impl PeerHandle for ChannelPeer {
    fn remote_addr(&self) -> String {
        self.addr.clone()
    }

    fn listener(&self) -> &str {
        &self.name
    }

    fn send<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<(), Error>> {
        async move {
            let tx = self
                .switchboard
                .lock()
                .expect("switchboard lock")
                .get(&self.addr)
                .cloned()
                .ok_or(Error::PeerNotFound)?;
            tx.send((data.to_vec(), self.local_addr.clone()))
                .map_err(|_| Error::IOError)
        }
        .boxed()
    }
}

impl DatagramTransport for ChannelTransport {
    type Peer = ChannelPeer;

    fn recv(&self) -> BoxFuture<'_, Result<(Vec<u8>, Self::Peer), Error>> {
        async move {
            let (data, from) = self
                .rx
                .lock()
                .await
                .recv()
                .await
                .ok_or(Error::Cancelled)?;
            let peer = ChannelPeer {
                addr: from,
                local_addr: self.addr.clone(),
                name: self.name.clone(),
                switchboard: self.switchboard.clone(),
            };
            Ok((data, peer))
        }
        .boxed()
    }

    fn send<'a>(&'a self, addr: &'a str, data: &'a [u8]) -> BoxFuture<'a, Result<(), Error>> {
        futures::future::ready(self.deliver(addr, data)).boxed()
    }

    fn find_peer(&self, _addr: &str) -> Option<Self::Peer> {
        None
    }
}
