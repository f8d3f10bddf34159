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

//! A [`tracing-subscriber`] [`Layer`] that forwards [`tracing`] events to an [`Output`].
//!
//! Each [`tracing::Event`] becomes an [`Event`]:
//!
//! - the `message` field is the event's message
//! - every other field lands in the event's field map, formatted as a string
//! - `target`, `file` & `line` are added from the callsite metadata (unless the event itself
//!   carries fields of those names)
//! - the [`tracing::Level`] is mapped to a syslog severity ([`default_level_mapping`] unless you
//!   say otherwise)
//! - ids are assigned in order, starting at one
//!
//! ```rust,no_run
//! use monitor_output::{config::CheckOutputConfig, layer::Layer, output::CheckResultOutput};
//! use tracing_subscriber::layer::SubscriberExt;
//! let output = CheckResultOutput::new(&CheckOutputConfig::new("my_app").unwrap()).unwrap();
//! let subscriber = tracing_subscriber::Registry::default().with(Layer::new(output));
//! let _guard = tracing::subscriber::set_default(subscriber);
//! tracing::error!(facility = "disk", "disk full");
//! ```
//!
//! Events emitted by this crate are never forwarded, so that a failing output can't feed on its
//! own complaints.
//!
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html

use crate::event::Event;
use crate::output::Output;
use crate::severity::{default_level_mapping, Level};

use chrono::prelude::*;
use tracing_subscriber::layer::Context;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

// When the tracing-log feature is enabled, use NormalizeEvent to recover the file/line metadata of
// events that originated from the `log` crate.
#[cfg(feature = "tracing-log")]
use tracing_log::NormalizeEvent;

const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

/// Collects an event's fields as strings.
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: BTreeMap<String, String>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &tracing::field::Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            // bookkeeping fields added by tracing-log; we get these from the normalized metadata
            name if name.starts_with("log.") => (),
            name => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.insert(field, value.to_string());
    }
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        // The tracing macros "pre-format" the `message` field so that `value` refers to a
        // `std::fmt::Arguments`, whose debug format carries no enclosing double-quotes.
        self.insert(field, format!("{:?}", value));
    }
}

/// Forwards [`tracing`] events to an [`Output`].
///
/// The output is guarded by a mutex; events are forwarded one at a time in the order in which
/// they're recorded.
///
/// That lock is held for the whole of each write, so a slow output stalls every thread that
/// emits an event meanwhile. A [`TrapperOutput`](crate::output::TrapperOutput) can take up to its
/// connect timeout plus its read timeout (ten seconds, by default) against an unresponsive
/// server; prefer [`CheckResultOutput`](crate::output::CheckResultOutput), whose writes are a
/// single datagram, or configure short timeouts.
pub struct Layer<O: Output> {
    output: Mutex<O>,
    map_level: Box<dyn Fn(&tracing::Level) -> Level + Send + Sync>,
    next_id: AtomicU64,
}

impl<O: Output> Layer<O> {
    pub fn new(output: O) -> Layer<O> {
        Layer {
            output: Mutex::new(output),
            map_level: Box::new(default_level_mapping),
            next_id: AtomicU64::new(1),
        }
    }
    /// Replace the default mapping from [`tracing::Level`] to syslog severity
    pub fn with_level_mapping<F>(mut self, map_level: F) -> Self
    where
        F: Fn(&tracing::Level) -> Level + Send + Sync + 'static,
    {
        self.map_level = Box::new(map_level);
        self
    }
    /// Stop the underlying output; subsequent events are dropped (with a complaint).
    pub fn stop(&self) {
        self.output
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .stop();
    }

    fn to_event(&self, event: &tracing::Event<'_>) -> Event {
        // For native tracing events, normalized_metadata() returns None & we use the event's own.
        #[cfg(feature = "tracing-log")]
        let normalized_meta = event.normalized_metadata();
        #[cfg(feature = "tracing-log")]
        let meta = normalized_meta.as_ref().unwrap_or_else(|| event.metadata());
        #[cfg(not(feature = "tracing-log"))]
        let meta = event.metadata();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let mut fields = visitor.fields;
        fields
            .entry("target".to_string())
            .or_insert_with(|| meta.target().to_string());
        if let Some(file) = meta.file() {
            fields
                .entry("file".to_string())
                .or_insert_with(|| file.to_string());
        }
        if let Some(line) = meta.line() {
            fields
                .entry("line".to_string())
                .or_insert_with(|| line.to_string());
        }

        Event::builder(
            self.next_id.fetch_add(1, Ordering::Relaxed),
            visitor.message.unwrap_or_default(),
        )
        .level((self.map_level)(meta.level()))
        .fields(fields)
        .timestamp(Utc::now())
        .build()
    }
}

fn is_own(target: &str) -> bool {
    target == OWN_TARGET
        || target
            .strip_prefix(OWN_TARGET)
            .map_or(false, |rest| rest.starts_with("::"))
}

impl<S, O> tracing_subscriber::layer::Layer<S> for Layer<O>
where
    S: tracing::Subscriber,
    O: Output + Send + 'static,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if is_own(event.metadata().target()) {
            return;
        }
        let event = self.to_event(event);
        let result = self
            .output
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .write(&event);
        // The lock is released; safe to complain.
        if let Err(err) = result {
            tracing::error!("Failed to forward event {}: {}", event.id(), err);
        }
    }
}
