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

//! Zabbix trapper "sender data" requests.
//!
//! A trapper item is reported by sending the server a JSON body like
//!
//! ```text
//! {"request":"sender data","data":[{"host":"web01","key":"app.errors","value":"disk full"}]}
//! ```
//!
//! wrapped in a [frame](crate::frame). The `host` must name a host configured in Zabbix, & the
//! `key` one of its trapper items. [`PayloadBuilder`] renders the key & value for each event from
//! configured [`Template`]s.

use crate::error::Result;
use crate::event::Event;
use crate::frame::{self, Frame};
use crate::template::Template;

use chrono::prelude::*;
use serde::{Deserialize, Serialize};

/// The `request` tag for pushing item values
pub const SENDER_DATA: &str = "sender data";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapperItem {
    pub host: String,
    pub key: String,
    pub value: String,
    /// Unix time at which the value was observed; the server uses its own clock if absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapperRequest {
    pub request: String,
    pub data: Vec<TrapperItem>,
}

impl TrapperRequest {
    pub fn new(data: Vec<TrapperItem>) -> TrapperRequest {
        TrapperRequest {
            request: SENDER_DATA.to_string(),
            data,
        }
    }
    /// Compact, UTF-8 JSON
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
    /// The complete wire buffer: prefix & JSON body
    pub fn to_frame(&self) -> Result<Vec<u8>> {
        Ok(frame::encode(&self.to_json()?))
    }
    /// Parse a request back out of a wire buffer (what a trapper server does with it).
    pub fn from_frame(buf: &[u8]) -> Result<TrapperRequest> {
        let frame = Frame::decode(buf)?;
        Ok(serde_json::from_slice(frame.payload())?)
    }
}

/// Builds one [`TrapperRequest`] per [`Event`].
#[derive(Clone, Debug)]
pub struct PayloadBuilder {
    host: String,
    key: Template,
    value: Template,
    include_clock: bool,
}

impl PayloadBuilder {
    /// `host` is the name under which Zabbix knows the reporting host.
    pub fn new<H: Into<String>>(host: H, key: Template, value: Template) -> PayloadBuilder {
        PayloadBuilder {
            host: host.into(),
            key,
            value,
            include_clock: false,
        }
    }
    /// Stamp each item with the event's timestamp (or the current time, for events without one)
    pub fn include_clock(mut self, include_clock: bool) -> Self {
        self.include_clock = include_clock;
        self
    }
    pub fn host(&self) -> &str {
        &self.host
    }
    pub fn key(&self) -> &Template {
        &self.key
    }
    pub fn value(&self) -> &Template {
        &self.value
    }
    pub fn item(&self, event: &Event) -> TrapperItem {
        TrapperItem {
            host: self.host.clone(),
            key: self.key.render(event),
            value: self.value.render(event),
            clock: if self.include_clock {
                Some(event.timestamp().unwrap_or_else(Utc::now).timestamp())
            } else {
                None
            },
        }
    }
    pub fn build(&self, event: &Event) -> TrapperRequest {
        TrapperRequest::new(vec![self.item(event)])
    }
}
