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

/// Type representing a CoAP message code: a 3-bit class and a 5-bit detail.
///
/// Codes are carried verbatim from the wire, so values this library does not
/// have a name for still round-trip unchanged.
#[derive(Copy, Eq, PartialEq, Hash, Clone, Ord, PartialOrd)]
pub struct MsgCode(pub u8);

impl MsgCode {
    /// Empty message code, used for ping requests, resets, and empty acknowledgements.
    pub const EMPTY: MsgCode = MsgCode(0);

    /// CoAP GET method.
    pub const GET: MsgCode = MsgCode(1);

    /// CoAP POST method.
    pub const POST: MsgCode = MsgCode(2);

    /// CoAP PUT method.
    pub const PUT: MsgCode = MsgCode(3);

    /// CoAP DELETE method.
    pub const DELETE: MsgCode = MsgCode(4);

    /// CoAP FETCH method.
    pub const FETCH: MsgCode = MsgCode(5);

    /// CoAP PATCH method.
    pub const PATCH: MsgCode = MsgCode(6);

    /// CoAP iPATCH method.
    pub const IPATCH: MsgCode = MsgCode(7);

    /// 2.01 Created.
    pub const CREATED: MsgCode = MsgCode::new(2, 1);

    /// 2.02 Deleted.
    pub const DELETED: MsgCode = MsgCode::new(2, 2);

    /// 2.03 Valid.
    pub const VALID: MsgCode = MsgCode::new(2, 3);

    /// 2.04 Changed.
    pub const CHANGED: MsgCode = MsgCode::new(2, 4);

    /// 2.05 Content.
    pub const CONTENT: MsgCode = MsgCode::new(2, 5);

    /// 2.31 Continue, acknowledging an intermediate block of a Block1 transfer.
    pub const CONTINUE: MsgCode = MsgCode::new(2, 31);

    /// 4.00 Bad Request.
    pub const BAD_REQUEST: MsgCode = MsgCode::new(4, 0);

    /// 4.01 Unauthorized.
    pub const UNAUTHORIZED: MsgCode = MsgCode::new(4, 1);

    /// 4.02 Bad Option.
    pub const BAD_OPTION: MsgCode = MsgCode::new(4, 2);

    /// 4.03 Forbidden.
    pub const FORBIDDEN: MsgCode = MsgCode::new(4, 3);

    /// 4.04 Not Found.
    pub const NOT_FOUND: MsgCode = MsgCode::new(4, 4);

    /// 4.05 Method Not Allowed.
    pub const METHOD_NOT_ALLOWED: MsgCode = MsgCode::new(4, 5);

    /// 4.06 Not Acceptable.
    pub const NOT_ACCEPTABLE: MsgCode = MsgCode::new(4, 6);

    /// 4.12 Precondition Failed.
    pub const PRECONDITION_FAILED: MsgCode = MsgCode::new(4, 12);

    /// 4.13 Request Entity Too Large.
    pub const REQUEST_ENTITY_TOO_LARGE: MsgCode = MsgCode::new(4, 13);

    /// 4.15 Unsupported Media Type.
    pub const UNSUPPORTED_MEDIA_TYPE: MsgCode = MsgCode::new(4, 15);

    /// 5.00 Internal Server Error.
    pub const INTERNAL_SERVER_ERROR: MsgCode = MsgCode::new(5, 0);

    /// 5.01 Not Implemented.
    pub const NOT_IMPLEMENTED: MsgCode = MsgCode::new(5, 1);

    /// 5.02 Bad Gateway.
    pub const BAD_GATEWAY: MsgCode = MsgCode::new(5, 2);

    /// 5.03 Service Unavailable.
    pub const SERVICE_UNAVAILABLE: MsgCode = MsgCode::new(5, 3);

    /// 5.04 Gateway Timeout.
    pub const GATEWAY_TIMEOUT: MsgCode = MsgCode::new(5, 4);

    /// 5.05 Proxying Not Supported.
    pub const PROXYING_NOT_SUPPORTED: MsgCode = MsgCode::new(5, 5);

    /// Constructs a code from its class and detail parts.
    pub const fn new(class: u8, detail: u8) -> MsgCode {
        MsgCode(((class & 0x7) << 5) | (detail & 0x1F))
    }

    /// The 3-bit class of this code.
    pub fn class(self) -> u8 {
        self.0 >> 5
    }

    /// The 5-bit detail of this code.
    pub fn detail(self) -> u8 {
        self.0 & 0x1F
    }

    /// Returns true if this is the empty code.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if this code is a request method.
    pub fn is_request(self) -> bool {
        self.class() == 0 && self.0 != 0
    }

    /// Returns true if this code is a response code of any class.
    pub fn is_response(self) -> bool {
        self.class() >= 2
    }

    /// Returns true if this code indicates success.
    pub fn is_success(self) -> bool {
        self.class() == 2
    }

    /// Returns true if this code is a client error.
    pub fn is_client_error(self) -> bool {
        self.class() == 4
    }

    /// Returns true if this code is a server error.
    pub fn is_server_error(self) -> bool {
        self.class() == 5
    }

    /// Returns true if this code is any sort of error.
    pub fn is_error(self) -> bool {
        self.is_client_error() || self.is_server_error()
    }

    /// Parses the dotted `"c.dd"` rendering of a code, e.g. `"2.05"`.
    pub fn from_dotted(s: &str) -> Option<MsgCode> {
        let mut parts = s.splitn(2, '.');
        let class: u8 = parts.next()?.parse().ok()?;
        let detail: u8 = parts.next()?.parse().ok()?;
        if class > 7 || detail > 31 {
            return None;
        }
        Some(MsgCode::new(class, detail))
    }

    /// Attempts to return the well-known name of this code.
    pub fn static_name(self) -> Option<&'static str> {
        match self {
            MsgCode::GET => Some("GET"),
            MsgCode::POST => Some("POST"),
            MsgCode::PUT => Some("PUT"),
            MsgCode::DELETE => Some("DELETE"),
            MsgCode::FETCH => Some("FETCH"),
            MsgCode::PATCH => Some("PATCH"),
            MsgCode::IPATCH => Some("iPATCH"),
            MsgCode::CREATED => Some("Created"),
            MsgCode::DELETED => Some("Deleted"),
            MsgCode::VALID => Some("Valid"),
            MsgCode::CHANGED => Some("Changed"),
            MsgCode::CONTENT => Some("Content"),
            MsgCode::CONTINUE => Some("Continue"),
            MsgCode::BAD_REQUEST => Some("BadRequest"),
            MsgCode::UNAUTHORIZED => Some("Unauthorized"),
            MsgCode::BAD_OPTION => Some("BadOption"),
            MsgCode::FORBIDDEN => Some("Forbidden"),
            MsgCode::NOT_FOUND => Some("NotFound"),
            MsgCode::METHOD_NOT_ALLOWED => Some("MethodNotAllowed"),
            MsgCode::NOT_ACCEPTABLE => Some("NotAcceptable"),
            MsgCode::PRECONDITION_FAILED => Some("PreconditionFailed"),
            MsgCode::REQUEST_ENTITY_TOO_LARGE => Some("RequestEntityTooLarge"),
            MsgCode::UNSUPPORTED_MEDIA_TYPE => Some("UnsupportedMediaType"),
            MsgCode::INTERNAL_SERVER_ERROR => Some("InternalServerError"),
            MsgCode::NOT_IMPLEMENTED => Some("NotImplemented"),
            MsgCode::BAD_GATEWAY => Some("BadGateway"),
            MsgCode::SERVICE_UNAVAILABLE => Some("ServiceUnavailable"),
            MsgCode::GATEWAY_TIMEOUT => Some("GatewayTimeout"),
            MsgCode::PROXYING_NOT_SUPPORTED => Some("ProxyingNotSupported"),
            _ => None,
        }
    }
}

impl Default for MsgCode {
    fn default() -> Self {
        MsgCode::EMPTY
    }
}

impl std::convert::From<MsgCode> for u8 {
    fn from(code: MsgCode) -> Self {
        code.0
    }
}

impl std::convert::From<u8> for MsgCode {
    fn from(code: u8) -> Self {
        MsgCode(code)
    }
}

impl std::fmt::Display for MsgCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

impl std::fmt::Debug for MsgCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.static_name() {
            Some(name) => write!(f, "{}({})", self, name),
            None => write!(f, "{}", self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        assert!(MsgCode::GET.is_request());
        assert!(!MsgCode::GET.is_response());
        assert!(MsgCode::CONTENT.is_success());
        assert!(MsgCode::NOT_FOUND.is_client_error());
        assert!(MsgCode::INTERNAL_SERVER_ERROR.is_server_error());
        assert!(MsgCode::EMPTY.is_empty());
        assert!(!MsgCode::EMPTY.is_request());
    }

    #[test]
    fn dotted() {
        assert_eq!("2.05", MsgCode::CONTENT.to_string());
        assert_eq!("2.31", MsgCode::CONTINUE.to_string());
        assert_eq!("0.01", MsgCode::GET.to_string());
        assert_eq!(Some(MsgCode::CONTENT), MsgCode::from_dotted("2.05"));
        assert_eq!(Some(MsgCode::CONTINUE), MsgCode::from_dotted("2.31"));
        assert_eq!(None, MsgCode::from_dotted("2"));
        assert_eq!(None, MsgCode::from_dotted("9.00"));
    }

    #[test]
    fn wire_values() {
        assert_eq!(0x45, MsgCode::CONTENT.0);
        assert_eq!(0x5F, MsgCode::CONTINUE.0);
        assert_eq!(0x84, MsgCode::NOT_FOUND.0);
        assert_eq!(0xA0, MsgCode::INTERNAL_SERVER_ERROR.0);
    }
}
