// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of monitor-output.
//
// monitor-output is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// monitor-output is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See
// the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with monitor-output.  If
// not, see <http://www.gnu.org/licenses/>.

//! Zabbix trapper protocol framing
//! ===============================
//!
//! Every message exchanged with a Zabbix server or proxy, in either direction, is wrapped in the
//! same envelope:
//!
//! ```text
//! bytes[0..4]   = "ZBXD"
//! byte[4]       = 0x01 (protocol version)
//! bytes[5..13]  = payload length, little-endian unsigned 64-bit
//! bytes[13..]   = payload
//! ```
//!
//! There is no padding & nothing follows the payload. [`encode`] produces such a buffer;
//! [`Frame::decode`] parses one, refusing to silently truncate: if the prefix promises more bytes
//! than are available, that's an [`Error::ShortFrame`].

use crate::error::{Error, Result};

use backtrace::Backtrace;
use bytes::{Buf, BufMut};

/// Magic bytes + protocol version
pub const HEADER: &[u8; 5] = b"ZBXD\x01";
/// Header + eight-byte length
pub const PREFIX_LEN: usize = 13;

/// Wrap `payload` in a trapper frame.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(PREFIX_LEN + payload.len());
    buf.put_slice(HEADER);
    buf.put_u64_le(payload.len() as u64);
    buf.put_slice(payload);
    buf
}

/// If `buf` begins with a well-formed prefix, the total size of the frame it announces.
///
/// Used when reading a reply off the wire to know when we've got all of it.
pub fn announced_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < PREFIX_LEN || &buf[..HEADER.len()] != HEADER {
        return None;
    }
    let mut len = &buf[HEADER.len()..PREFIX_LEN];
    usize::try_from(len.get_u64_le())
        .ok()
        .and_then(|n| n.checked_add(PREFIX_LEN))
}

/// A decoded view of a trapper frame.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame<'a> {
    payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Parse the frame at the start of `buf`.
    ///
    /// Bytes after the announced payload are not part of the frame; see [`Frame::len`].
    pub fn decode(buf: &'a [u8]) -> Result<Frame<'a>> {
        if buf.len() < PREFIX_LEN {
            // Can't even read the length, so report what we know: nothing was declared.
            return if buf.len() >= HEADER.len() && &buf[..HEADER.len()] != HEADER {
                Err(Error::BadFrameHeader {
                    header: buf[..HEADER.len()].to_vec(),
                    back: Backtrace::new(),
                })
            } else {
                Err(Error::ShortFrame {
                    declared: 0,
                    available: buf.len(),
                    back: Backtrace::new(),
                })
            };
        }
        if &buf[..HEADER.len()] != HEADER {
            return Err(Error::BadFrameHeader {
                header: buf[..HEADER.len()].to_vec(),
                back: Backtrace::new(),
            });
        }

        let mut rest = &buf[HEADER.len()..];
        let declared = rest.get_u64_le();
        let available = rest.remaining();
        match usize::try_from(declared) {
            Ok(n) if n <= available => Ok(Frame {
                payload: &rest[..n],
            }),
            _ => Err(Error::ShortFrame {
                declared,
                available,
                back: Backtrace::new(),
            }),
        }
    }
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
    /// The payload, if it's valid UTF-8
    pub fn text(&self) -> Option<&'a str> {
        std::str::from_utf8(self.payload).ok()
    }
    /// Size of the whole frame on the wire, prefix included
    pub fn len(&self) -> usize {
        PREFIX_LEN + self.payload.len()
    }
    /// Never true: even an empty payload has a prefix
    pub fn is_empty(&self) -> bool {
        false
    }
}
