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

//! Forward log events to a monitoring system: a [Sensu] client agent or a [Zabbix] server.
//!
//! [Sensu]: https://docs.sensu.io/sensu-core/latest/reference/clients/#client-socket-input
//! [Zabbix]: https://www.zabbix.com/documentation/current/en/manual/appendix/protocols/zabbix_sender
//!
//! # Introduction
//!
//! Log pipelines are good at collecting & searching events, but the people who need to *act* on
//! them tend to be watching a monitoring dashboard. This crate bridges the two: hand it an
//! [`Event`](event::Event) & it will turn up as either
//!
//! - a Sensu check result, sent as a JSON datagram to the client agent on localhost:3030, whose
//!   status is derived from the event's syslog severity, or
//! - a Zabbix trapper item value, whose key & value are rendered from `%(field)` templates & sent
//!   over TCP in the Zabbix "sender" framing
//!
//! Both are [`Output`](output::Output)s. They may be driven directly, or plugged in behind the
//! [`Layer`](layer::Layer) to pick up events from [`tracing`].
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//!
//! # Usage
//!
//! ```rust,no_run
//! use monitor_output::{config::{Configuration, TrapperOutputConfig}, event::Event};
//! use monitor_output::output::{Output, TrapperOutput};
//!
//! let config = Configuration::from_json(r#"{
//!     "zabbix_host": "zabbix.local",
//!     "zabbix_key_pattern": "app.%(facility)",
//!     "zabbix_value_pattern": "%(message)"
//! }"#).unwrap();
//! let mut output = TrapperOutput::new(&TrapperOutputConfig::try_from(&config).unwrap());
//! let event = Event::builder(1, "disk full").field("facility", "storage").build();
//! // connects to zabbix.local:10051 & sends {"request":"sender data","data":[{"host":...,
//! // "key":"app.storage","value":"disk full"}]}
//! println!("{:?}", output.write(&event));
//! ```
//!
//! Connections are made lazily, & remade on the next write after any failure. Nothing is ever
//! retried within a write; errors are returned to the caller & logged via [`tracing`].

pub mod check;
pub mod config;
pub mod error;
pub mod event;
pub mod frame;
pub mod layer;
pub mod output;
pub mod response;
pub mod severity;
pub mod template;
pub mod transport;
pub mod trapper;
