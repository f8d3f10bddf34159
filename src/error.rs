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
//! [monitor-output](crate) errors

use backtrace::Backtrace;

/// [monitor-output](crate) error type
///
/// [monitor-output](crate) eschews libraries like [thiserror], [anyhow] & [Snafu] in favor of
/// a straightforward enumeration with a few match arms chosen on the basis what the caller will
/// need to respond.
///
/// Roughly, the variants fall into four groups:
///
/// - configuration problems ([`Error::MissingSetting`], [`Error::BadSetting`]); these are
///   fatal when constructing an output, which never becomes active
/// - connection problems ([`Error::Connection`]); the offending socket has already been torn
///   down by the time the caller sees one of these, and the next send will reconnect
/// - framing problems ([`Error::BadFrameHeader`], [`Error::ShortFrame`]); fatal to a single
///   exchange
/// - everything else
///
/// Note that a trapper server refusing our data is *not* an error; see
/// [`Delivery`](crate::response::Delivery).
///
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
/// [Snafu]: https://docs.rs/snafu/latest/snafu
#[non_exhaustive]
pub enum Error {
    /// A required configuration setting was absent (or empty)
    MissingSetting { key: String, back: Backtrace },
    /// A configuration setting was present, but unusable
    BadSetting {
        key: String,
        value: String,
        back: Backtrace,
    },
    /// Connect, write or read failure
    Connection {
        source: std::io::Error,
        back: Backtrace,
    },
    /// The first five bytes of a frame were not `ZBXD\x01`
    BadFrameHeader { header: Vec<u8>, back: Backtrace },
    /// A frame was truncated: fewer bytes were available than the prefix promised
    ShortFrame {
        declared: u64,
        available: usize,
        back: Backtrace,
    },
    /// Failed to serialize (or parse) JSON
    Serialization {
        source: serde_json::Error,
        back: Backtrace,
    },
    /// The output has been stopped
    Stopped { back: Backtrace },
}

impl Error {
    /// True if this error came from the socket (and so the connection has been reset)
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }
    /// True if this error denotes a malformed trapper frame
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Error::BadFrameHeader { .. } | Error::ShortFrame { .. }
        )
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Connection {
            source: err,
            back: Backtrace::new(),
        }
    }
}

impl std::convert::From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization {
            source: err,
            back: Backtrace::new(),
        }
    }
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::MissingSetting { key, .. } => write!(f, "{} must not be empty", key),
            Error::BadSetting { key, value, .. } => {
                write!(f, "{} is not a valid value for {}", value, key)
            }
            Error::Connection { source, .. } => write!(f, "Connection error: {}", source),
            Error::BadFrameHeader { header, .. } => {
                write!(f, "{:?} is not a trapper protocol header", header)
            }
            Error::ShortFrame {
                declared,
                available,
                ..
            } => write!(
                f,
                "Frame declared {} payload bytes, but only {} were available",
                declared, available
            ),
            Error::Serialization { source, .. } => {
                write!(f, "While serializing a payload, got {}", source)
            }
            Error::Stopped { .. } => write!(f, "The output has been stopped"),
            _ => write!(f, "Other monitor-output error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::MissingSetting { key: _, back } => write!(f, "{}\n{:#?}", self, back),
            Error::BadSetting { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::Connection { source: _, back } => write!(f, "{}\n{:#?}", self, back),
            Error::BadFrameHeader { header: _, back } => write!(f, "{}\n{:#?}", self, back),
            Error::ShortFrame { back, .. } => write!(f, "{}\n{:#?}", self, back),
            Error::Serialization { source: _, back } => write!(f, "{}\n{:#?}", self, back),
            Error::Stopped { back } => write!(f, "{}\n{:#?}", self, back),
            err => write!(f, "monitor-output error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    #[allow(unreachable_patterns)]
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connection { source, .. } => Some(source),
            Error::Serialization { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
