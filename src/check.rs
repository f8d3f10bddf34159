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

//! Sensu check results.
//!
//! A Sensu client agent listens on localhost:3030 for externally-computed check results: small
//! JSON documents like
//!
//! ```text
//! {"name":"disk_check","output":"disk full","status":2}
//! ```
//!
//! [`CheckEncoder`] turns an [`Event`] into a [`CheckResult`]; the status comes from the event's
//! severity (see [`Status::from_level`]).

use crate::error::Result;
use crate::event::Event;
use crate::severity::Status;

use serde::Serialize;

/// A named health assertion with a tri-state status & free-text output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub output: String,
    pub status: Status,
}

impl CheckResult {
    /// Compact, UTF-8 JSON; keys in the order `name`, `output`, `status`
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Produces a [`CheckResult`] for each [`Event`].
#[derive(Clone, Debug)]
pub struct CheckEncoder {
    check_name: String,
    alert_per_line: bool,
}

impl CheckEncoder {
    /// When `alert_per_line` is set, each event's id is appended to `check_name` so that every
    /// line raises a distinct alert rather than updating the same one.
    pub fn new<S: Into<String>>(check_name: S, alert_per_line: bool) -> CheckEncoder {
        CheckEncoder {
            check_name: check_name.into(),
            alert_per_line,
        }
    }
    pub fn check_name(&self) -> &str {
        &self.check_name
    }
    pub fn encode(&self, event: &Event) -> CheckResult {
        let name = if self.alert_per_line {
            format!("{}{}", self.check_name, event.id())
        } else {
            self.check_name.clone()
        };
        CheckResult {
            name,
            output: event.message().to_string(),
            status: event.status(),
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn disk_full() {
        let event = Event::builder("42", "disk full").level(1).build();
        let encoder = CheckEncoder::new("disk_check", false);
        let result = encoder.encode(&event);
        assert_eq!(result.status, Status::Critical);
        assert_eq!(
            std::str::from_utf8(&result.to_json().unwrap()).unwrap(),
            r#"{"name":"disk_check","output":"disk full","status":2}"#
        );
    }

    #[test]
    fn alert_per_line() {
        let event = Event::builder("42", "disk full").level(3).build();
        let result = CheckEncoder::new("disk_check", true).encode(&event);
        assert_eq!(result.name, "disk_check42");
        assert_eq!(result.status, Status::Warning);
    }

    #[test]
    fn escaping() {
        let event = Event::builder("1", "said \"hi\"\n\tto 世界")
            .level(5)
            .build();
        let json = CheckEncoder::new("c", false).encode(&event).to_json().unwrap();
        assert_eq!(
            std::str::from_utf8(&json).unwrap(),
            "{\"name\":\"c\",\"output\":\"said \\\"hi\\\"\\n\\tto 世界\",\"status\":0}"
        );
        let back: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(back["output"], "said \"hi\"\n\tto 世界");
    }
}
