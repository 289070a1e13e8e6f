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
use crate::Error;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Application handler invoked for a matched request. The handler receives
/// the request (with path variables bound) and produces the reply; an `Err`
/// is translated into a 5.00 response by the dispatcher.
pub type RouteHandler = Arc<dyn Fn(&mut Message) -> Result<Message, Error> + Send + Sync>;

/// Reserved route invoked when an empty CON (CoAP ping) arrives.
pub const KEEPALIVE_ROUTE: &str = "~keepalive";

#[derive(Default)]
struct RouteNode {
    children: HashMap<String, RouteNode>,
    capture: Option<String>,
    handler: Option<RouteHandler>,
}

/// Path-segment trie mapping request paths to handlers.
///
/// A `{name}` segment matches any single segment and binds it under `name` in
/// the message's path-variable map. Exact segments win over wildcards; the
/// deepest handler reached along the walk wins, so partial matches resolve to
/// an ancestor. The table is expected to be populated before the endpoint
/// starts serving.
#[derive(Default)]
pub(crate) struct RouteTable {
    root: RwLock<RouteNode>,
}

impl RouteTable {
    pub fn new() -> RouteTable {
        Default::default()
    }

    /// Registers a handler under the given `/`-separated path.
    pub fn add(&self, path: &str, handler: RouteHandler) {
        info!("adding route for: {}", path);
        let mut root = self.root.write().expect("route lock");
        let mut node = &mut *root;
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            let (key, capture) = if segment.starts_with('{') {
                let name = segment.trim_start_matches('{').trim_end_matches('}');
                ("*".to_string(), Some(name.to_string()))
            } else {
                (segment.to_string(), None)
            };
            node = node.children.entry(key).or_default();
            if capture.is_some() {
                node.capture = capture;
            }
        }
        node.handler = Some(handler);
    }

    /// Walks the trie with the message's path, binding wildcard captures into
    /// `msg.path_vars`, and returns the deepest handler reached.
    pub fn lookup(&self, msg: &mut Message) -> Option<RouteHandler> {
        let root = self.root.read().expect("route lock");
        let mut node = &*root;
        let mut deepest = None;

        for segment in msg.path() {
            let next = match node.children.get(&segment) {
                Some(next) => next,
                None => match node.children.get("*") {
                    Some(next) => {
                        if let Some(name) = &next.capture {
                            msg.path_vars.insert(name.clone(), segment.clone());
                        }
                        next
                    }
                    None => break,
                },
            };
            if next.handler.is_some() {
                deepest = next.handler.clone();
            }
            node = next;
        }

        deepest
    }
}

impl std::fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RouteTable")
    }
}
