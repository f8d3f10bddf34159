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

//! The log events we forward.
//!
//! An [`Event`] is whatever the host pipeline hands us: an opaque id, a message, a numeric
//! severity on the syslog scale and an open-ended set of named fields. Outputs only ever borrow
//! one.

use crate::severity::{Level, Status};
use crate::template::Lookup;

use chrono::prelude::*;

use std::borrow::Cow;
use std::collections::BTreeMap;

/// A single log event.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    id: String,
    message: String,
    level: i64,
    fields: BTreeMap<String, String>,
    timestamp: Option<DateTime<Utc>>,
}

impl Event {
    /// Start building an event with the given id & message, at [`Level::LOG_INFO`]
    pub fn builder<I: ToString, M: Into<String>>(id: I, message: M) -> EventBuilder {
        EventBuilder {
            imp: Event {
                id: id.to_string(),
                message: message.into(),
                level: Level::LOG_INFO.into(),
                fields: BTreeMap::new(),
                timestamp: None,
            },
        }
    }
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn message(&self) -> &str {
        &self.message
    }
    pub fn level(&self) -> i64 {
        self.level
    }
    pub fn status(&self) -> Status {
        Status::from_level(self.level)
    }
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
}

/// Template lookups against an [`Event`] see its fields, plus `message`, `level` & `id` for
/// events that don't carry fields by those names themselves.
impl Lookup for Event {
    fn lookup(&self, name: &str) -> Option<Cow<'_, str>> {
        if let Some(value) = self.fields.get(name) {
            return Some(Cow::Borrowed(value.as_str()));
        }
        match name {
            "message" => Some(Cow::Borrowed(self.message.as_str())),
            "level" => Some(Cow::Owned(self.level.to_string())),
            "id" => Some(Cow::Borrowed(self.id.as_str())),
            _ => None,
        }
    }
}

pub struct EventBuilder {
    imp: Event,
}

impl EventBuilder {
    pub fn level<L: Into<i64>>(mut self, level: L) -> Self {
        self.imp.level = level.into();
        self
    }
    pub fn field<K: Into<String>, V: ToString>(mut self, name: K, value: V) -> Self {
        self.imp.fields.insert(name.into(), value.to_string());
        self
    }
    pub fn fields<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.imp
            .fields
            .extend(fields.into_iter().map(|(k, v)| (k.into(), v.to_string())));
        self
    }
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.imp.timestamp = Some(timestamp);
        self
    }
    pub fn build(self) -> Event {
        self.imp
    }
}
