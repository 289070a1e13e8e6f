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
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// A named, Tokio-backed UDP implementation of the transport contract.
#[derive(Debug)]
pub struct UdpTransport {
    name: Arc<str>,
    socket: Arc<UdpSocket>,
    max_message_size: usize,
}

impl UdpTransport {
    /// Binds a UDP socket on `addr` under the given listener name, with the
    /// standard 8192-byte receive buffer.
    pub async fn bind(name: &str, addr: &str) -> Result<UdpTransport, Error> {
        Self::bind_with_max_size(name, addr, 8192).await
    }

    /// Binds a UDP socket with a caller-chosen maximum datagram size.
    pub async fn bind_with_max_size(
        name: &str,
        addr: &str,
        max_message_size: usize,
    ) -> Result<UdpTransport, Error> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(UdpTransport {
            name: Arc::from(name),
            socket: Arc::new(socket),
            max_message_size,
        })
    }

    /// The local address this transport is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }
}

/// Peer handle for datagrams received over [`UdpTransport`].
#[derive(Debug, Clone)]
pub struct UdpPeer {
    addr: SocketAddr,
    name: Arc<str>,
    socket: Arc<UdpSocket>,
}

impl PeerHandle for UdpPeer {
    fn remote_addr(&self) -> String {
        self.addr.to_string()
    }

    fn listener(&self) -> &str {
        &self.name
    }

    fn send<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<(), Error>> {
        async move {
            self.socket.send_to(data, self.addr).await?;
            Ok(())
        }
        .boxed()
    }
}

impl DatagramTransport for UdpTransport {
    type Peer = UdpPeer;

    fn recv(&self) -> BoxFuture<'_, Result<(Vec<u8>, Self::Peer), Error>> {
        async move {
            let mut buffer = vec![0u8; self.max_message_size];
            let (len, from) = self.socket.recv_from(&mut buffer).await?;
            buffer.truncate(len);
            let peer = UdpPeer {
                addr: from,
                name: self.name.clone(),
                socket: self.socket.clone(),
            };
            Ok((buffer, peer))
        }
        .boxed()
    }

    fn send<'a>(&'a self, addr: &'a str, data: &'a [u8]) -> BoxFuture<'a, Result<(), Error>> {
        async move {
            let dest: SocketAddr = addr.parse().map_err(|_| Error::PeerNotFound)?;
            self.socket.send_to(data, dest).await?;
            Ok(())
        }
        .boxed()
    }

    fn find_peer(&self, _addr: &str) -> Option<Self::Peer> {
        // Plain UDP keeps no sessions.
        None
    }
}
