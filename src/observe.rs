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

//! Client-side resource observation (RFC 7641).

use crate::endpoint::Endpoint;
use crate::message::{Message, MsgCode, MsgToken, MsgType};
use crate::send::SendOptions;
use crate::transport::DatagramTransport;
use crate::{ContentFormat, Error};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Callback invoked for the initial response and every notification of an
/// observed resource. An `Err` causes the endpoint to RST the notification.
pub type ObserveCallback = Arc<dyn Fn(&Message) -> Result<(), Error> + Send + Sync>;

/// A registered observation: the observed path and the notification callback.
#[derive(Clone)]
pub(crate) struct Observation {
    pub path: String,
    pub callback: ObserveCallback,
}

impl std::fmt::Debug for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observation").field("path", &self.path).finish()
    }
}

/// Token-indexed table of live observations.
#[derive(Debug, Default)]
pub(crate) struct ObserveTable {
    inner: Mutex<HashMap<MsgToken, Observation>>,
}

impl ObserveTable {
    pub fn new() -> ObserveTable {
        Default::default()
    }

    pub fn insert(&self, token: MsgToken, observation: Observation) {
        self.inner.lock().expect("observe lock").insert(token, observation);
    }

    pub fn remove(&self, token: &MsgToken) -> Option<Observation> {
        self.inner.lock().expect("observe lock").remove(token)
    }

    pub fn get(&self, token: &MsgToken) -> Option<Observation> {
        self.inner.lock().expect("observe lock").get(token).cloned()
    }

    pub fn tokens(&self, mut visit: impl FnMut(&str)) {
        for token in self.inner.lock().expect("observe lock").keys() {
            visit(&String::from_utf8_lossy(token.as_bytes()));
        }
    }
}

impl<T: DatagramTransport> Endpoint<T> {
    /// Subscribes to a resource on a peer.
    ///
    /// Issues a confirmable request with `Observe: 0`, registers the
    /// callback under the request token, invokes it once with the initial
    /// response, and returns the token identifying the subscription.
    pub async fn observe(
        &self,
        addr: &str,
        code: MsgCode,
        path: &str,
        payload: Vec<u8>,
        accept: Option<ContentFormat>,
        callback: ObserveCallback,
        options: &SendOptions,
    ) -> Result<String, Error> {
        let mut req = Message::request(MsgType::Con, code, path);
        req.with_observe(0).with_payload(payload);
        if let Some(accept) = accept {
            req.with_accept(accept);
        }
        let token = crate::send::random_token();
        req.token = token;

        let rsp = self
            .send(addr, req, options)
            .await?
            .ok_or(Error::BadResponse)?;
        Error::from_response_code(rsp.msg_code)?;

        self.observations.insert(
            token,
            Observation {
                path: path.to_string(),
                callback: callback.clone(),
            },
        );

        if let Err(err) = callback(&rsp) {
            warn!("observe callback rejected initial response: {}", err);
        }

        Ok(String::from_utf8_lossy(token.as_bytes()).into_owned())
    }

    /// Cancels a subscription previously returned by [`observe`](Self::observe).
    ///
    /// The local registration is removed first, then a confirmable request
    /// with `Observe: 1` and the subscription token informs the peer.
    pub async fn observe_cancel(
        &self,
        addr: &str,
        path: &str,
        token: &str,
        options: &SendOptions,
    ) -> Result<(), Error> {
        let token = MsgToken::new(token.as_bytes())?;
        self.observations.remove(&token);

        let mut req = Message::request(MsgType::Con, MsgCode::GET, path);
        req.with_observe(1);
        req.token = token;

        let rsp = self
            .send(addr, req, options)
            .await?
            .ok_or(Error::BadResponse)?;
        Error::from_response_code(rsp.msg_code)
    }

    /// Registers a notification callback for a token without performing the
    /// subscription exchange. Used to restore observations across restarts,
    /// typically from the `observe_not_found` hook.
    pub fn observe_register(
        &self,
        token: &str,
        path: &str,
        callback: ObserveCallback,
    ) -> Result<(), Error> {
        let token = MsgToken::new(token.as_bytes())?;
        self.observations.insert(
            token,
            Observation {
                path: path.to_string(),
                callback,
            },
        );
        Ok(())
    }

    /// Visits the token of every live observation.
    pub fn observe_tokens(&self, visit: impl FnMut(&str)) {
        self.observations.tokens(visit);
    }

    /// Looks up the observation for a notification, giving the
    /// `observe_not_found` hook one chance to register it lazily.
    pub(crate) fn lookup_observation(&self, msg: &Message) -> Option<Observation> {
        if let Some(observation) = self.observations.get(&msg.token) {
            return Some(observation);
        }
        if let Some(hook) = &self.config.observe_not_found {
            if hook(msg) {
                return self.observations.get(&msg.token);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_round_trip() {
        let table = ObserveTable::new();
        let token = MsgToken::new(b"tok").unwrap();
        table.insert(
            token,
            Observation {
                path: "temp".to_string(),
                callback: Arc::new(|_| Ok(())),
            },
        );

        assert_eq!("temp", table.get(&token).unwrap().path);

        let mut seen = Vec::new();
        table.tokens(|t| seen.push(t.to_string()));
        assert_eq!(vec!["tok".to_string()], seen);

        assert!(table.remove(&token).is_some());
        assert!(table.get(&token).is_none());
    }
}
