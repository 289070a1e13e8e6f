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

use crate::block_cache::BlockCache;
use crate::config::Config;
use crate::dedup::Deduplicator;
use crate::message::{codec, Message, Metadata};
use crate::nstart::NstartGate;
use crate::observe::ObserveTable;
use crate::pending::PendingTable;
use crate::route::RouteTable;
use crate::transport::{DatagramTransport, PeerHandle};
use crate::Error;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Outbound hook for a proxy bridge: receives the raw reply datagram and the
/// unprefixed peer address.
pub type ProxyFunction = Arc<dyn Fn(&[u8], &str) -> Result<(), Error> + Send + Sync>;

/// How often finished blockwise assemblies are checked for expiry.
const BLOCK_SWEEP_INTERVAL: Duration = Duration::from_secs(2);

/// A CoAP endpoint: the protocol engine running on top of one datagram
/// transport, serving requests through registered routes and issuing
/// client-side requests and observations.
///
/// All protocol state (deduplication, blockwise assemblies, in-flight
/// exchanges, observations) is owned by the endpoint instance; two endpoints
/// in one process never share state.
///
/// Wrap it in an [`Arc`] and spawn [`run`](Endpoint::run) to start serving:
///
/// ```no_run
/// # async fn example() -> Result<(), coap_endpoint::Error> {
/// use coap_endpoint::{Endpoint, MsgCode};
/// use coap_endpoint::transport::UdpTransport;
/// use std::sync::Arc;
///
/// let transport = UdpTransport::bind("udp", "0.0.0.0:5683").await?;
/// let endpoint = Arc::new(Endpoint::new(transport));
/// endpoint.add_route("/hello", |req| {
///     Ok(req.make_reply(MsgCode::CONTENT, b"hi".to_vec()))
/// });
/// endpoint.clone().run().await
/// # }
/// ```
pub struct Endpoint<T: DatagramTransport> {
    pub(crate) transport: T,
    pub(crate) config: Config,
    pub(crate) routes: RouteTable,
    pub(crate) dedup: Deduplicator,
    pub(crate) block_cache: BlockCache,
    pub(crate) pending: PendingTable,
    pub(crate) nstart: NstartGate,
    pub(crate) observations: ObserveTable,
    next_msg_id: AtomicU16,
    listeners: Mutex<HashMap<String, String>>,
    proxy: Mutex<Option<(String, ProxyFunction)>>,
    janitors_started: AtomicBool,
}

impl<T: DatagramTransport> std::fmt::Debug for Endpoint<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("config", &self.config)
            .finish()
    }
}

impl<T: DatagramTransport> Endpoint<T> {
    /// Creates an endpoint with the default configuration.
    pub fn new(transport: T) -> Endpoint<T> {
        Self::with_config(transport, Config::default())
    }

    /// Creates an endpoint with the given configuration.
    pub fn with_config(transport: T, config: Config) -> Endpoint<T> {
        Endpoint {
            dedup: Deduplicator::new(config.dedup_expiration),
            block_cache: BlockCache::new(config.block_inactivity_timeout),
            pending: PendingTable::new(),
            nstart: NstartGate::new(),
            observations: ObserveTable::new(),
            routes: RouteTable::new(),
            // Start the message-id sequence at a random point so a restart
            // does not collide with ids still in peers' dedup windows.
            next_msg_id: AtomicU16::new(rand::random()),
            listeners: Mutex::new(HashMap::new()),
            proxy: Mutex::new(None),
            janitors_started: AtomicBool::new(false),
            transport,
            config,
        }
    }

    /// Borrows the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Registers a request handler under a `/`-separated path. Segments of
    /// the form `{name}` match any value and bind it into
    /// [`Message::path_vars`].
    ///
    /// Routes are expected to be registered before [`run`](Endpoint::run) is
    /// started.
    pub fn add_route<F>(&self, path: &str, handler: F)
    where
        F: Fn(&mut Message) -> Result<Message, Error> + Send + Sync + 'static,
    {
        self.routes.add(path, Arc::new(handler));
    }

    /// Registers the proxy bridge for a scheme. Outbound datagrams addressed
    /// as `"<scheme>:<addr>"` are handed to `f` instead of the transport;
    /// inbound datagrams from the bridge enter through
    /// [`proxy_inbound`](Endpoint::proxy_inbound).
    pub fn set_proxy(&self, scheme: &str, f: ProxyFunction) {
        *self.proxy.lock().expect("proxy lock") = Some((scheme.to_string(), f));
    }

    /// Feeds a datagram that arrived over the proxy bridge through the
    /// dispatcher, returning the raw reply to carry back, if any.
    pub async fn proxy_inbound(
        self: &Arc<Self>,
        data: &[u8],
        from: &str,
    ) -> Result<Option<Vec<u8>>, Error> {
        let scheme = {
            let proxy = self.proxy.lock().expect("proxy lock");
            let (scheme, _) = proxy.as_ref().ok_or(Error::ProxyNotRegistered)?;
            scheme.clone()
        };

        let mut msg = codec::decode(data)?;
        msg.meta = Metadata {
            listener: scheme.clone(),
            remote_addr: format!("{}:{}", scheme, from),
            received_at: Some(Instant::now()),
            ..Default::default()
        };

        match self.handle_message(msg).await {
            Some(rsp) => Ok(Some(codec::encode(&rsp)?)),
            None => Ok(None),
        }
    }

    /// Runs the endpoint: spawns the janitor tasks and then loops receiving
    /// datagrams, handling each on its own task so one slow handler never
    /// delays the next datagram. Resolves only on transport failure.
    pub async fn run(self: Arc<Self>) -> Result<(), Error> {
        self.spawn_janitors();
        loop {
            let (data, peer) = self.transport.recv().await?;
            let endpoint = self.clone();
            tokio::spawn(async move {
                endpoint.handle_datagram(data, peer).await;
            });
        }
    }

    async fn handle_datagram(self: Arc<Self>, data: Vec<u8>, peer: T::Peer) {
        let addr = peer.remote_addr();

        let mut msg = match codec::decode(&data) {
            Ok(msg) => msg,
            Err(err) => {
                // Malformed datagrams are dropped without a reply
                // (RFC 7252 §4.2).
                warn!("discarding malformed datagram from {}: {}", addr, err);
                return;
            }
        };

        self.pin_listener(&addr, peer.listener());

        msg.meta = Metadata {
            listener: peer.listener().to_string(),
            remote_addr: addr.clone(),
            dtls_identity: peer.identity(),
            dtls_public_key: peer.public_key(),
            dtls_certificate: peer.certificate(),
            received_at: Some(Instant::now()),
            block_size: None,
        };
        debug!("inbound: {} {}", addr, msg);

        if let Some(rsp) = self.handle_message(msg).await {
            match codec::encode(&rsp) {
                Ok(data) => {
                    debug!("outbound: {} {}", addr, rsp);
                    if let Err(err) = peer.send(&data).await {
                        error!("send to {} failed: {}", addr, err);
                    }
                }
                Err(err) => error!("encoding reply for {} failed: {}", addr, err),
            }
        }
    }

    /// Remembers which listener each peer talks through. A peer hopping to a
    /// different listener invalidates its old transport session.
    fn pin_listener(&self, addr: &str, listener: &str) {
        let mut listeners = self.listeners.lock().expect("listener lock");
        match listeners.get(addr) {
            Some(previous) if previous != listener => {
                debug!(
                    "peer {} moved from listener {} to {}, closing old session",
                    addr, previous, listener
                );
                self.transport.close_peer(addr);
                listeners.insert(addr.to_string(), listener.to_string());
            }
            Some(_) => {}
            None => {
                listeners.insert(addr.to_string(), listener.to_string());
            }
        }
    }

    /// Hands raw bytes to the right egress: the proxy bridge for
    /// scheme-prefixed addresses, an established transport session when one
    /// exists, the plain transport otherwise.
    pub(crate) async fn send_raw(&self, addr: &str, data: &[u8]) -> Result<(), Error> {
        let proxy = self.proxy.lock().expect("proxy lock").clone();
        if let Some((scheme, f)) = proxy {
            if let Some(rest) = addr.strip_prefix(scheme.as_str()) {
                if let Some(rest) = rest.strip_prefix(':') {
                    return f(data, rest);
                }
            }
        }

        match self.transport.find_peer(addr) {
            Some(peer) => peer.send(data).await,
            None => self.transport.send(addr, data).await,
        }
    }

    pub(crate) fn next_msg_id(&self) -> u16 {
        self.next_msg_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Forgets all NSTART accounting for a peer.
    pub fn nstart_clear(&self, addr: &str) {
        self.nstart.clear(addr);
    }

    /// Total payload bytes and entry count held in the blockwise cache.
    pub fn block_cache_stats(&self) -> (u64, u64) {
        self.block_cache.stats()
    }

    fn spawn_janitors(self: &Arc<Self>) {
        if self.janitors_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let weak = Arc::downgrade(self);
        let period = self.config.dedup_interval;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            loop {
                tick.tick().await;
                match weak.upgrade() {
                    Some(endpoint) => endpoint.dedup.sweep(Instant::now()),
                    None => break,
                }
            }
        });

        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(BLOCK_SWEEP_INTERVAL);
            loop {
                tick.tick().await;
                match weak.upgrade() {
                    Some(endpoint) => endpoint.block_cache.sweep(Instant::now()),
                    None => break,
                }
            }
        });
    }
}
