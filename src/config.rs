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

use crate::message::Message;
use std::sync::Arc;
use std::time::Duration;

/// Hook consulted when a notification arrives with a token that has no
/// registered observation, giving the application a chance to register one
/// lazily. Returning `true` causes the observation lookup to be retried.
pub type ObserveNotFoundCallback = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Endpoint configuration. All fields have defaults; construct with
/// `Config::default()` and override what you need.
#[derive(Clone)]
pub struct Config {
    /// How long a `(peer, message-id)` pair replays its cached reply.
    pub dedup_expiration: Duration,

    /// Sweep cadence of the deduplication janitor.
    pub dedup_interval: Duration,

    /// Block size used when fragmenting payloads, unless overridden per
    /// message or suggested by the peer.
    pub block_default_size: usize,

    /// How long an idle blockwise assembly is retained.
    pub block_inactivity_timeout: Duration,

    /// Maximum number of outstanding confirmable messages per peer. Zero
    /// disables the gate.
    pub nstart: u32,

    /// Maximum datagram size accepted or produced.
    pub max_message_size: usize,

    /// Invoked on unknown-token notifications to allow lazy registration.
    pub observe_not_found: Option<ObserveNotFoundCallback>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            dedup_expiration: Duration::from_secs(600),
            dedup_interval: Duration::from_secs(20),
            block_default_size: 1024,
            block_inactivity_timeout: Duration::from_secs(120),
            nstart: 1,
            max_message_size: 8192,
            observe_not_found: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("dedup_expiration", &self.dedup_expiration)
            .field("dedup_interval", &self.dedup_interval)
            .field("block_default_size", &self.block_default_size)
            .field("block_inactivity_timeout", &self.block_inactivity_timeout)
            .field("nstart", &self.nstart)
            .field("max_message_size", &self.max_message_size)
            .field(
                "observe_not_found",
                &self.observe_not_found.as_ref().map(|_| "…"),
            )
            .finish()
    }
}
