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

/// Type representing a CoAP content format, from the IANA "CoAP Content-Formats"
/// registry.
///
/// There is no "unset" sentinel value: a message without a `Content-Format`
/// (or `Accept`) option surfaces as `None` from the accessors on
/// [`Message`](crate::message::Message).
#[derive(Copy, Eq, PartialEq, Hash, Clone, Ord, PartialOrd)]
pub struct ContentFormat(pub u16);

impl ContentFormat {
    /// `text/plain;charset=utf-8`
    pub const TEXT_PLAIN: ContentFormat = ContentFormat(0);

    /// `application/link-format`
    pub const LINK_FORMAT: ContentFormat = ContentFormat(40);

    /// `application/xml`
    pub const XML: ContentFormat = ContentFormat(41);

    /// `application/octet-stream`
    pub const OCTET_STREAM: ContentFormat = ContentFormat(42);

    /// `application/exi`
    pub const EXI: ContentFormat = ContentFormat(47);

    /// `application/json`
    pub const JSON: ContentFormat = ContentFormat(50);

    /// `application/cbor`
    pub const CBOR: ContentFormat = ContentFormat(60);

    /// `application/senml+cbor`
    pub const SENML_CBOR: ContentFormat = ContentFormat(112);

    /// `application/vnd.oma.lwm2m+tlv`
    pub const LWM2M_TLV: ContentFormat = ContentFormat(11542);

    /// `application/vnd.oma.lwm2m+json`
    pub const LWM2M_JSON: ContentFormat = ContentFormat(11543);

    /// Attempts to return the registered MIME name of this content format.
    pub fn static_name(self) -> Option<&'static str> {
        match self {
            ContentFormat::TEXT_PLAIN => Some("text/plain;charset=utf-8"),
            ContentFormat::LINK_FORMAT => Some("application/link-format"),
            ContentFormat::XML => Some("application/xml"),
            ContentFormat::OCTET_STREAM => Some("application/octet-stream"),
            ContentFormat::EXI => Some("application/exi"),
            ContentFormat::JSON => Some("application/json"),
            ContentFormat::CBOR => Some("application/cbor"),
            ContentFormat::SENML_CBOR => Some("application/senml+cbor"),
            ContentFormat::LWM2M_TLV => Some("application/vnd.oma.lwm2m+tlv"),
            ContentFormat::LWM2M_JSON => Some("application/vnd.oma.lwm2m+json"),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.static_name() {
            Some(name) => f.write_str(name),
            None => write!(f, "application/x-coap-{}", self.0),
        }
    }
}

impl std::fmt::Debug for ContentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentFormat({}, {})", self.0, self)
    }
}
