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

use crate::message::MsgCode;
use std::fmt::{Debug, Display, Formatter};

/// Type for errors encountered while encoding, decoding, sending, or receiving
/// CoAP messages.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub enum Error {
    /// One or more of the supplied arguments are not valid for the given operation.
    InvalidArgument,

    /// An error was encountered while attempting to parse the datagram.
    ParseFailure,

    /// The token length field of a message was larger than eight bytes.
    InvalidTokenLen,

    /// An option carried an illegal delta/length nibble or a value outside of
    /// the length bounds for its number.
    BadOption,

    /// An option value was too long to be encoded.
    OptionTooLong,

    /// The gap between two consecutive option numbers was too large to encode.
    OptionGapTooLarge,

    /// Operation timed out waiting for a response.
    Timeout,

    /// The response was well-formed, but not appropriate for the given request.
    BadResponse,

    /// A blockwise transfer referenced an assembly that is not in the cache.
    BlockNotFound,

    /// A blockwise fragment arrived with a number other than the next one
    /// expected by its assembly.
    BlockOutOfOrder,

    /// An I/O error occurred while performing this operation.
    IOError,

    /// This operation has been cancelled.
    Cancelled,

    /// The destination address did not resolve to a known peer or listener.
    PeerNotFound,

    /// No proxy function has been registered for the requested scheme.
    ProxyNotRegistered,

    /// The response indicated that the request was malformed.
    BadRequest,

    /// The response indicated that the request was unauthorized.
    Unauthorized,

    /// The response indicated that the given resource was not found.
    NotFound,

    /// The response indicated that the method was not allowed on the resource.
    MethodNotAllowed,

    /// The response indicated that no acceptable content encoding was available.
    NotAcceptable,

    /// The peer answered with an error code not covered by a more specific
    /// variant.
    ResponseCode(MsgCode),
}

impl Error {
    /// Translates a response code into a caller-facing error.
    ///
    /// Codes below the error classes (methods and 2.xx successes) yield
    /// `Ok(())`; everything at or above 4.00 becomes an `Err`.
    pub fn from_response_code(code: MsgCode) -> Result<(), Error> {
        if !code.is_error() {
            return Ok(());
        }
        match code {
            MsgCode::BAD_REQUEST => Err(Error::BadRequest),
            MsgCode::UNAUTHORIZED => Err(Error::Unauthorized),
            MsgCode::NOT_FOUND => Err(Error::NotFound),
            MsgCode::METHOD_NOT_ALLOWED => Err(Error::MethodNotAllowed),
            MsgCode::NOT_ACCEPTABLE => Err(Error::NotAcceptable),
            other => Err(Error::ResponseCode(other)),
        }
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(_: std::io::Error) -> Self {
        Error::IOError
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        <Self as Debug>::fmt(self, f)
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_code_translation() {
        assert_eq!(Ok(()), Error::from_response_code(MsgCode::CONTENT));
        assert_eq!(Ok(()), Error::from_response_code(MsgCode::EMPTY));
        assert_eq!(
            Err(Error::NotFound),
            Error::from_response_code(MsgCode::NOT_FOUND)
        );
        assert_eq!(
            Err(Error::ResponseCode(MsgCode::SERVICE_UNAVAILABLE)),
            Error::from_response_code(MsgCode::SERVICE_UNAVAILABLE)
        );
    }
}
