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

use crate::Error;
use std::fmt::{Debug, Display, Formatter};

/// Type for interpreting `Block1` and `Block2` option values (RFC 7959).
///
/// A block descriptor is a block number (up to 2^20 - 1), a "more blocks
/// follow" flag, and a block size that must be a power of two between 16 and
/// 2048 bytes. On the wire it occupies one, two, or three bytes depending on
/// the magnitude of the block number.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct BlockInfo {
    /// Block number.
    pub num: u32,

    /// More flag. If set, there are more blocks to follow.
    pub more: bool,

    /// Block size in bytes.
    pub size: usize,
}

impl BlockInfo {
    /// Maximum legal value for `num`.
    pub const NUM_MAX: u32 = (1 << 20) - 1;

    /// Constructs a new `BlockInfo`, validating the number and size.
    pub fn new(num: u32, more: bool, size: usize) -> Option<BlockInfo> {
        if num > Self::NUM_MAX || szx_for_size(size).is_none() {
            None
        } else {
            Some(BlockInfo { num, more, size })
        }
    }

    /// Block size exponent field value (`size == 1 << (szx + 4)`).
    pub fn szx(&self) -> u8 {
        szx_for_size(self.size).unwrap_or(0)
    }

    /// The offset (in bytes) that this block starts at.
    pub fn offset(&self) -> usize {
        self.num as usize * self.size
    }

    /// Decodes a one- to three-byte block option value.
    pub fn decode(buf: &[u8]) -> Result<BlockInfo, Error> {
        let (num, tail) = match buf.len() {
            1 => (u32::from(buf[0] >> 4), buf[0]),
            2 => ((u32::from(buf[0]) << 4) + u32::from(buf[1] >> 4), buf[1]),
            3 => (
                (u32::from(buf[0]) << 12) + (u32::from(buf[1]) << 4) + u32::from(buf[2] >> 4),
                buf[2],
            ),
            _ => return Err(Error::BadOption),
        };
        Ok(BlockInfo {
            num,
            more: tail & 0x08 == 0x08,
            size: 1usize << ((tail & 0x07) + 4),
        })
    }

    /// Encodes this descriptor into its wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = if self.num <= 7 {
            vec![(self.num << 4) as u8]
        } else if self.num <= 4095 {
            vec![(self.num >> 4) as u8, (self.num << 4) as u8]
        } else {
            vec![
                (self.num >> 12) as u8,
                (self.num >> 4) as u8,
                (self.num << 4) as u8,
            ]
        };
        let last = buf.last_mut().unwrap();
        *last |= self.szx();
        if self.more {
            *last |= 0x08;
        }
        buf
    }
}

fn szx_for_size(size: usize) -> Option<u8> {
    match size {
        16 => Some(0),
        32 => Some(1),
        64 => Some(2),
        128 => Some(3),
        256 => Some(4),
        512 => Some(5),
        1024 => Some(6),
        2048 => Some(7),
        _ => None,
    }
}

impl Default for BlockInfo {
    /// Returns a block descriptor for block zero at the 1024-byte block size.
    fn default() -> Self {
        BlockInfo {
            num: 0,
            more: false,
            size: 1024,
        }
    }
}

impl Display for BlockInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}/{}/{}", self.num, self.more as u8, self.size)
    }
}

impl Debug for BlockInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "BlockInfo({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let block = BlockInfo::default();
        assert_eq!(false, block.more);
        assert_eq!(6, block.szx());
        assert_eq!(0, block.num);
        assert_eq!(1024, block.size);
        assert_eq!(0, block.offset());
    }

    #[test]
    fn validity() {
        assert!(BlockInfo::new(0, false, 16).is_some());
        assert!(BlockInfo::new(BlockInfo::NUM_MAX, true, 2048).is_some());
        assert_eq!(None, BlockInfo::new(BlockInfo::NUM_MAX + 1, false, 16));
        assert_eq!(None, BlockInfo::new(0, false, 100));
        assert_eq!(None, BlockInfo::new(0, false, 4096));
    }

    #[test]
    fn single_byte() {
        let block = BlockInfo::new(5, true, 64).unwrap();
        let buf = block.encode();
        assert_eq!(vec![0x5A], buf);
        assert_eq!(block, BlockInfo::decode(&buf).unwrap());
    }

    #[test]
    fn two_byte_boundary() {
        // 7 is the largest single-byte number, 8 the smallest two-byte one.
        let block = BlockInfo::new(7, false, 1024).unwrap();
        let buf = block.encode();
        assert_eq!(1, buf.len());
        assert_eq!(block, BlockInfo::decode(&buf).unwrap());

        let block = BlockInfo::new(8, false, 1024).unwrap();
        let buf = block.encode();
        assert_eq!(2, buf.len());
        assert_eq!(block, BlockInfo::decode(&buf).unwrap());
    }

    #[test]
    fn three_byte_boundary() {
        let block = BlockInfo::new(4095, true, 512).unwrap();
        let buf = block.encode();
        assert_eq!(2, buf.len());
        assert_eq!(block, BlockInfo::decode(&buf).unwrap());

        let block = BlockInfo::new(4096, true, 512).unwrap();
        let buf = block.encode();
        assert_eq!(3, buf.len());
        assert_eq!(block, BlockInfo::decode(&buf).unwrap());
    }

    #[test]
    fn round_trip_all_sizes() {
        for &size in &[16usize, 32, 64, 128, 256, 512, 1024, 2048] {
            for &num in &[0u32, 1, 7, 8, 100, 4095, 4096, BlockInfo::NUM_MAX] {
                for &more in &[false, true] {
                    let block = BlockInfo::new(num, more, size).unwrap();
                    assert_eq!(block, BlockInfo::decode(&block.encode()).unwrap());
                }
            }
        }
    }

    #[test]
    fn decode_rejects_bad_lengths() {
        assert_eq!(Err(Error::BadOption), BlockInfo::decode(&[]));
        assert_eq!(Err(Error::BadOption), BlockInfo::decode(&[0, 0, 0, 0]));
    }
}
