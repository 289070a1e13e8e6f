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

//! Types related to interpreting and handling CoAP options.

use crate::Error;

/// Type representing a CoAP option number.
#[derive(Copy, Eq, PartialEq, Hash, Clone, Ord, PartialOrd)]
pub struct OptionNumber(pub u16);

impl OptionNumber {
    /// IF_MATCH option.
    pub const IF_MATCH: OptionNumber = OptionNumber(1);

    /// URI_HOST option.
    pub const URI_HOST: OptionNumber = OptionNumber(3);

    /// ETAG option.
    pub const ETAG: OptionNumber = OptionNumber(4);

    /// IF_NONE_MATCH option.
    pub const IF_NONE_MATCH: OptionNumber = OptionNumber(5);

    /// OBSERVE option (RFC 7641).
    pub const OBSERVE: OptionNumber = OptionNumber(6);

    /// URI_PORT option.
    pub const URI_PORT: OptionNumber = OptionNumber(7);

    /// LOCATION_PATH option.
    pub const LOCATION_PATH: OptionNumber = OptionNumber(8);

    /// URI_PATH option.
    pub const URI_PATH: OptionNumber = OptionNumber(11);

    /// CONTENT_FORMAT option.
    pub const CONTENT_FORMAT: OptionNumber = OptionNumber(12);

    /// MAX_AGE option.
    pub const MAX_AGE: OptionNumber = OptionNumber(14);

    /// URI_QUERY option.
    pub const URI_QUERY: OptionNumber = OptionNumber(15);

    /// ACCEPT option.
    pub const ACCEPT: OptionNumber = OptionNumber(17);

    /// LOCATION_QUERY option.
    pub const LOCATION_QUERY: OptionNumber = OptionNumber(20);

    /// BLOCK2 option (RFC 7959).
    pub const BLOCK2: OptionNumber = OptionNumber(23);

    /// BLOCK1 option (RFC 7959).
    pub const BLOCK1: OptionNumber = OptionNumber(27);

    /// SIZE2 option (RFC 7959).
    pub const SIZE2: OptionNumber = OptionNumber(28);

    /// PROXY_URI option.
    pub const PROXY_URI: OptionNumber = OptionNumber(35);

    /// PROXY_SCHEME option.
    pub const PROXY_SCHEME: OptionNumber = OptionNumber(39);

    /// SIZE1 option.
    pub const SIZE1: OptionNumber = OptionNumber(60);

    /// Returns true if this option number is critical, false if it is elective.
    pub fn is_critical(self) -> bool {
        self.0 & 1 == 1
    }

    /// Returns the static descriptor for this option number, or `None` if the
    /// number is not recognized by this library.
    ///
    /// Unrecognized options are silently dropped during decoding
    /// (RFC 7252 §5.4.1).
    pub fn definition(self) -> Option<OptionDef> {
        let def = match self {
            OptionNumber::IF_MATCH => OptionDef::new(OptionFormat::Opaque, 0, 8),
            OptionNumber::URI_HOST => OptionDef::new(OptionFormat::String, 1, 255),
            OptionNumber::ETAG => OptionDef::new(OptionFormat::Opaque, 1, 8),
            OptionNumber::IF_NONE_MATCH => OptionDef::new(OptionFormat::Empty, 0, 0),
            OptionNumber::OBSERVE => OptionDef::new(OptionFormat::Uint, 0, 3),
            OptionNumber::URI_PORT => OptionDef::new(OptionFormat::Uint, 0, 2),
            OptionNumber::LOCATION_PATH => OptionDef::new(OptionFormat::String, 0, 255),
            OptionNumber::URI_PATH => OptionDef::new(OptionFormat::String, 0, 255),
            OptionNumber::CONTENT_FORMAT => OptionDef::new(OptionFormat::Uint, 0, 2),
            OptionNumber::MAX_AGE => OptionDef::new(OptionFormat::Uint, 0, 4),
            OptionNumber::URI_QUERY => OptionDef::new(OptionFormat::String, 0, 255),
            OptionNumber::ACCEPT => OptionDef::new(OptionFormat::Uint, 0, 2),
            OptionNumber::LOCATION_QUERY => OptionDef::new(OptionFormat::String, 0, 255),
            OptionNumber::BLOCK2 => OptionDef::new(OptionFormat::Opaque, 0, 3),
            OptionNumber::BLOCK1 => OptionDef::new(OptionFormat::Opaque, 0, 3),
            OptionNumber::SIZE2 => OptionDef::new(OptionFormat::Uint, 0, 4),
            OptionNumber::PROXY_URI => OptionDef::new(OptionFormat::String, 1, 1034),
            OptionNumber::PROXY_SCHEME => OptionDef::new(OptionFormat::String, 1, 255),
            OptionNumber::SIZE1 => OptionDef::new(OptionFormat::Uint, 0, 4),
            _ => return None,
        };
        Some(def)
    }

    /// Attempts to return a `Some(&'static str)` containing the name of the option.
    pub fn static_name(self) -> Option<&'static str> {
        match self {
            OptionNumber::IF_MATCH => Some("If-Match"),
            OptionNumber::URI_HOST => Some("Uri-Host"),
            OptionNumber::ETAG => Some("ETag"),
            OptionNumber::IF_NONE_MATCH => Some("If-None-Match"),
            OptionNumber::OBSERVE => Some("Observe"),
            OptionNumber::URI_PORT => Some("Uri-Port"),
            OptionNumber::LOCATION_PATH => Some("Location-Path"),
            OptionNumber::URI_PATH => Some("Uri-Path"),
            OptionNumber::CONTENT_FORMAT => Some("Content-Format"),
            OptionNumber::MAX_AGE => Some("Max-Age"),
            OptionNumber::URI_QUERY => Some("Uri-Query"),
            OptionNumber::ACCEPT => Some("Accept"),
            OptionNumber::LOCATION_QUERY => Some("Location-Query"),
            OptionNumber::BLOCK2 => Some("Block2"),
            OptionNumber::BLOCK1 => Some("Block1"),
            OptionNumber::SIZE2 => Some("Size2"),
            OptionNumber::PROXY_URI => Some("Proxy-Uri"),
            OptionNumber::PROXY_SCHEME => Some("Proxy-Scheme"),
            OptionNumber::SIZE1 => Some("Size1"),
            _ => None,
        }
    }
}

impl std::fmt::Display for OptionNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.static_name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Opt-{}", self.0),
        }
    }
}

impl std::fmt::Debug for OptionNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.0, self)
    }
}

/// The value format of an option (RFC 7252 §3.2).
#[derive(Debug, Copy, Eq, PartialEq, Hash, Clone)]
pub enum OptionFormat {
    /// Option value is determined by the presence or absence of the option.
    Empty,

    /// Opaque option value.
    Opaque,

    /// Non-negative integer value, shortest-form big-endian.
    Uint,

    /// UTF-8 string value.
    String,
}

/// Static descriptor of an option number: its value format and length bounds.
#[derive(Debug, Copy, Eq, PartialEq, Hash, Clone)]
pub struct OptionDef {
    /// Value format.
    pub format: OptionFormat,

    /// Minimum permitted value length, in bytes.
    pub min_len: usize,

    /// Maximum permitted value length, in bytes.
    pub max_len: usize,
}

impl OptionDef {
    const fn new(format: OptionFormat, min_len: usize, max_len: usize) -> OptionDef {
        OptionDef {
            format,
            min_len,
            max_len,
        }
    }
}

/// A decoded option value, tagged with its format.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum OptionValue {
    /// Value of an `Empty`-format option.
    Empty,

    /// Opaque byte-string value.
    Opaque(Vec<u8>),

    /// Unsigned integer value.
    Uint(u32),

    /// UTF-8 string value.
    String(String),
}

impl OptionValue {
    /// Interprets raw wire bytes according to the given format.
    ///
    /// The caller is responsible for having checked the length bounds.
    pub fn from_wire(format: OptionFormat, buf: &[u8]) -> OptionValue {
        match format {
            OptionFormat::Empty => OptionValue::Empty,
            OptionFormat::Opaque => OptionValue::Opaque(buf.to_vec()),
            OptionFormat::Uint => OptionValue::Uint(decode_uint(buf)),
            OptionFormat::String => {
                OptionValue::String(String::from_utf8_lossy(buf).into_owned())
            }
        }
    }

    /// Serializes this value into its wire form.
    pub fn to_wire(&self) -> Vec<u8> {
        match self {
            OptionValue::Empty => Vec::new(),
            OptionValue::Opaque(bytes) => bytes.clone(),
            OptionValue::Uint(value) => encode_uint(*value),
            OptionValue::String(s) => s.as_bytes().to_vec(),
        }
    }

    /// Returns the integer value, if this is a `Uint`.
    pub fn as_uint(&self) -> Option<u32> {
        match self {
            OptionValue::Uint(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the string value, if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the opaque bytes, if this is an `Opaque` value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            OptionValue::Opaque(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl From<u32> for OptionValue {
    fn from(value: u32) -> Self {
        OptionValue::Uint(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::String(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::String(value)
    }
}

impl From<&[u8]> for OptionValue {
    fn from(value: &[u8]) -> Self {
        OptionValue::Opaque(value.to_vec())
    }
}

impl From<Vec<u8>> for OptionValue {
    fn from(value: Vec<u8>) -> Self {
        OptionValue::Opaque(value)
    }
}

/// Encodes a non-negative integer as the shortest big-endian byte sequence.
///
/// Zero encodes as the empty sequence (RFC 7252 §3.2).
pub fn encode_uint(value: u32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    bytes[skip..].to_vec()
}

/// Decodes a big-endian byte sequence of up to four bytes into an integer.
pub fn decode_uint(buf: &[u8]) -> u32 {
    buf.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

/// Validates an option value length against the option's descriptor.
pub(crate) fn check_len(def: OptionDef, len: usize) -> Result<(), Error> {
    if len < def.min_len || len > def.max_len {
        Err(Error::BadOption)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint_shortest_form() {
        assert_eq!(Vec::<u8>::new(), encode_uint(0));
        assert_eq!(vec![1], encode_uint(1));
        assert_eq!(vec![0xFF], encode_uint(255));
        assert_eq!(vec![0x01, 0x00], encode_uint(256));
        assert_eq!(vec![0x01, 0x00, 0x00], encode_uint(65536));
        assert_eq!(vec![0x01, 0x00, 0x00, 0x00], encode_uint(16777216));
    }

    #[test]
    fn uint_round_trip() {
        for &value in &[0u32, 1, 255, 256, 65535, 65536, 16777215, 16777216, !0] {
            assert_eq!(value, decode_uint(&encode_uint(value)));
        }
    }

    #[test]
    fn unknown_numbers_have_no_definition() {
        assert!(OptionNumber(9999).definition().is_none());
        assert!(OptionNumber::URI_PATH.definition().is_some());
    }

    #[test]
    fn empty_format_bounds() {
        let def = OptionNumber::IF_NONE_MATCH.definition().unwrap();
        assert_eq!(Ok(()), check_len(def, 0));
        assert_eq!(Err(Error::BadOption), check_len(def, 1));
    }
}
