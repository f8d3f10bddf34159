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

//! Trapper server acknowledgements.
//!
//! A Zabbix server answers "sender data" with a frame whose body reads something like:
//!
//! ```text
//! {"response":"success","info":"processed: 1; failed: 0; total: 1; seconds spent: 0.000055"}
//! ```
//!
//! Acknowledgements are best-effort telemetry: nothing here ever fails a send. Problems are
//! logged & reported to the caller as a [`Delivery`] value so that they can be acted upon (or
//! ignored) without having to scrape logs.

use crate::frame::PREFIX_LEN;

use tracing::{debug, error, warn};

/// Why an acknowledgement was not a clean success
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AckProblem {
    /// The reply was no longer than the frame prefix, so there was nothing to inspect
    Malformed { len: usize },
    /// The server reported `failed: 1`
    Rejected { body: String },
    /// The server did not report `processed: 1`
    NotProcessed { body: String },
}

impl std::fmt::Display for AckProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AckProblem::Malformed { len } => {
                write!(f, "malformed acknowledgement ({} bytes)", len)
            }
            AckProblem::Rejected { body } => write!(f, "server rejected the item: {}", body),
            AckProblem::NotProcessed { body } => {
                write!(f, "server did not process the item: {}", body)
            }
        }
    }
}

/// The outcome of a single send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the receiver & (where the protocol has acknowledgements) acknowledged
    Delivered,
    /// Reached the network, but we can't say what became of it
    DeliveredUnconfirmed(AckProblem),
    /// The receiver told us it did not accept the data
    Failed(AckProblem),
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

/// The counters in an acknowledgement's `info` string
#[derive(Clone, Debug, PartialEq)]
pub struct AckInfo {
    pub processed: u64,
    pub failed: u64,
    pub total: Option<u64>,
    pub seconds_spent: Option<f64>,
}

impl AckInfo {
    /// Parse `processed: 1; failed: 0; total: 1; seconds spent: 0.000055`. Both `processed` &
    /// `failed` must be present; anything unrecognized is skipped.
    pub fn parse(info: &str) -> Option<AckInfo> {
        let mut processed = None;
        let mut failed = None;
        let mut total = None;
        let mut seconds_spent = None;
        for part in info.split(';') {
            let (name, value) = match part.split_once(':') {
                Some((name, value)) => (name.trim(), value.trim()),
                None => continue,
            };
            match name {
                "processed" => processed = value.parse().ok(),
                "failed" => failed = value.parse().ok(),
                "total" => total = value.parse().ok(),
                "seconds spent" => seconds_spent = value.parse().ok(),
                _ => (),
            }
        }
        Some(AckInfo {
            processed: processed?,
            failed: failed?,
            total,
            seconds_spent,
        })
    }
}

/// What we made of a trapper server's reply.
#[derive(Clone, Debug, PartialEq)]
pub struct Acknowledgement {
    pub delivery: Delivery,
    /// Parsed counters, if the body carried any
    pub info: Option<AckInfo>,
}

#[derive(serde::Deserialize)]
struct Body {
    info: String,
}

/// Inspect the raw reply to a "sender data" request.
///
/// Replies no longer than the 13-byte frame prefix are logged as malformed & reported as
/// [`Delivery::DeliveredUnconfirmed`]. Otherwise the prefix is stripped (without otherwise
/// checking it) & the body searched for `processed: 1` & `failed: 1`.
pub fn validate(response: &[u8]) -> Acknowledgement {
    if response.len() <= PREFIX_LEN {
        warn!(
            "Malformed trapper response ({} bytes): {:?}",
            response.len(),
            response
        );
        return Acknowledgement {
            delivery: Delivery::DeliveredUnconfirmed(AckProblem::Malformed {
                len: response.len(),
            }),
            info: None,
        };
    }

    let body = String::from_utf8_lossy(&response[PREFIX_LEN..]).into_owned();
    let info = match serde_json::from_str::<Body>(&body) {
        Ok(parsed) => AckInfo::parse(&parsed.info),
        Err(_) => AckInfo::parse(&body),
    };

    let delivery = if body.contains("failed: 1") {
        error!("Trapper server rejected the item: {}", body);
        Delivery::Failed(AckProblem::Rejected { body })
    } else if !body.contains("processed: 1") {
        error!("Trapper server did not process the item: {}", body);
        Delivery::Failed(AckProblem::NotProcessed { body })
    } else {
        debug!("Trapper server acknowledged: {}", body);
        Delivery::Delivered
    };

    Acknowledgement { delivery, info }
}
