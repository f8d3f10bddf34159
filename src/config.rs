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

//! Output configuration.
//!
//! # Introduction
//!
//! The host pipeline owns configuration: it declares the settings, presents them to the
//! operator, stores them, & hands them to us as a [`Configuration`]-- a bag of named JSON values.
//! We read what we need out of that into one of two typed configurations:
//!
//! - [`CheckOutputConfig`] for Sensu check results
//! - [`TrapperOutputConfig`] for Zabbix trapper items
//!
//! either via [`TryFrom`], or by building one directly:
//!
//! ```rust
//! use monitor_output::config::TrapperOutputConfig;
//! let cfg = TrapperOutputConfig::builder("app.%(facility)", "%(message)")
//!     .zabbix_host("zabbix.local")
//!     .reporter_host("web01")
//!     .build()
//!     .unwrap();
//! assert_eq!(cfg.address(), "zabbix.local:10051");
//! ```
//!
//! As with the host's own convention, an empty string is the same as an absent setting.

use crate::error::{Error, Result};
use crate::template::Template;
use crate::transport::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT, DEFAULT_TRAPPER_PORT};

use backtrace::Backtrace;
use serde_json::Value;

use std::collections::BTreeMap;
use std::time::Duration;

type StdResult<T, E> = std::result::Result<T, E>;

pub const CK_CHECK_NAME: &str = "check_name";
pub const CK_NEW_ALERT_EVERY_LINE: &str = "new_alert_every_line";
pub const CK_ZABBIX_HOST: &str = "zabbix_host";
pub const CK_ZABBIX_PORT: &str = "zabbix_port";
pub const CK_KEY_PATTERN: &str = "zabbix_key_pattern";
pub const CK_VALUE_PATTERN: &str = "zabbix_value_pattern";
pub const CK_REPORTER_HOST: &str = "reporter_host";
pub const CK_CONNECT_TIMEOUT_MS: &str = "connect_timeout_ms";
pub const CK_READ_TIMEOUT_MS: &str = "read_timeout_ms";
pub const CK_INCLUDE_CLOCK: &str = "include_clock";

pub const DEFAULT_ZABBIX_HOST: &str = "localhost";

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      host configuration                                        //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Settings as handed to us by the host.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Configuration {
    values: BTreeMap<String, Value>,
}

impl Configuration {
    pub fn new() -> Configuration {
        Configuration::default()
    }
    /// Parse a JSON object of settings
    pub fn from_json(text: &str) -> Result<Configuration> {
        Ok(Configuration {
            values: serde_json::from_str(text)?,
        })
    }
    pub fn set<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
    /// True if `key` is present, non-null & (if a string) non-empty
    pub fn string_is_set(&self, key: &str) -> bool {
        match self.values.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
    /// The setting `key` as a string (numbers & booleans are rendered); `None` if unset
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
    /// Required string setting
    pub fn require_string(&self, key: &str) -> Result<String> {
        self.get_string(key).ok_or_else(|| Error::MissingSetting {
            key: key.to_string(),
            back: Backtrace::new(),
        })
    }
    /// The setting `key` as a boolean; unset is `Ok(None)`, anything not boolean-like an error.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) if s == "true" => Ok(Some(true)),
            Some(Value::String(s)) if s == "false" => Ok(Some(false)),
            Some(other) => Err(bad_setting(key, other)),
        }
    }
    /// The setting `key` as an unsigned integer; unset is `Ok(None)`.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| bad_setting(key, n)),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| bad_setting(key, s)),
            Some(other) => Err(bad_setting(key, other)),
        }
    }
}

fn bad_setting<V: std::fmt::Display + ?Sized>(key: &str, value: &V) -> Error {
    Error::BadSetting {
        key: key.to_string(),
        value: value.to_string(),
        back: Backtrace::new(),
    }
}

/// Attempt to figure-out the name under which Zabbix knows this host.
///
/// This will first simply try [gethostname()], then fall back to this host's IP address, & if
/// all else fails, "localhost".
///
/// [gethostname()]: https://man7.org/linux/man-pages/man2/gethostname.2.html
pub fn default_reporter_host() -> String {
    hostname::get()
        .ok()
        .and_then(|hn| hn.into_string().ok())
        .filter(|hn| !hn.is_empty())
        .or_else(|| local_ip_address::local_ip().ok().map(|ip| ip.to_string()))
        .unwrap_or_else(|| "localhost".to_string())
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       Sensu check results                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckOutputConfig {
    check_name: String,
    alert_per_line: bool,
}

impl CheckOutputConfig {
    pub fn new<S: Into<String>>(check_name: S) -> Result<CheckOutputConfig> {
        let check_name = check_name.into();
        if check_name.is_empty() {
            return Err(Error::MissingSetting {
                key: CK_CHECK_NAME.to_string(),
                back: Backtrace::new(),
            });
        }
        Ok(CheckOutputConfig {
            check_name,
            alert_per_line: false,
        })
    }
    /// Raise a distinct alert for every event, rather than updating a single check
    pub fn alert_per_line(mut self, alert_per_line: bool) -> Self {
        self.alert_per_line = alert_per_line;
        self
    }
    pub fn check_name(&self) -> &str {
        &self.check_name
    }
    pub fn is_alert_per_line(&self) -> bool {
        self.alert_per_line
    }
}

impl std::convert::TryFrom<&Configuration> for CheckOutputConfig {
    type Error = Error;
    fn try_from(x: &Configuration) -> StdResult<Self, Self::Error> {
        Ok(CheckOutputConfig::new(x.require_string(CK_CHECK_NAME)?)?
            .alert_per_line(x.get_bool(CK_NEW_ALERT_EVERY_LINE)?.unwrap_or(false)))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      Zabbix trapper items                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Clone, Debug)]
pub struct TrapperOutputConfig {
    zabbix_host: String,
    zabbix_port: u16,
    key_pattern: Template,
    value_pattern: Template,
    reporter_host: String,
    connect_timeout: Duration,
    read_timeout: Duration,
    include_clock: bool,
}

impl TrapperOutputConfig {
    pub fn builder<K: Into<String>, V: Into<String>>(
        key_pattern: K,
        value_pattern: V,
    ) -> TrapperOutputConfigBuilder {
        TrapperOutputConfigBuilder {
            key_pattern: key_pattern.into(),
            value_pattern: value_pattern.into(),
            zabbix_host: DEFAULT_ZABBIX_HOST.to_string(),
            zabbix_port: DEFAULT_TRAPPER_PORT,
            reporter_host: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            include_clock: false,
        }
    }
    /// `host:port` of the trapper server
    pub fn address(&self) -> String {
        if self.zabbix_host.contains(':') && !self.zabbix_host.starts_with('[') {
            format!("[{}]:{}", self.zabbix_host, self.zabbix_port)
        } else {
            format!("{}:{}", self.zabbix_host, self.zabbix_port)
        }
    }
    pub fn zabbix_host(&self) -> &str {
        &self.zabbix_host
    }
    pub fn zabbix_port(&self) -> u16 {
        self.zabbix_port
    }
    pub fn key_pattern(&self) -> &Template {
        &self.key_pattern
    }
    pub fn value_pattern(&self) -> &Template {
        &self.value_pattern
    }
    pub fn reporter_host(&self) -> &str {
        &self.reporter_host
    }
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
    pub fn include_clock(&self) -> bool {
        self.include_clock
    }
}

pub struct TrapperOutputConfigBuilder {
    key_pattern: String,
    value_pattern: String,
    zabbix_host: String,
    zabbix_port: u16,
    reporter_host: Option<String>,
    connect_timeout: Duration,
    read_timeout: Duration,
    include_clock: bool,
}

impl TrapperOutputConfigBuilder {
    pub fn zabbix_host<S: Into<String>>(mut self, host: S) -> Self {
        self.zabbix_host = host.into();
        self
    }
    pub fn zabbix_port(mut self, port: u16) -> Self {
        self.zabbix_port = port;
        self
    }
    pub fn reporter_host<S: Into<String>>(mut self, host: S) -> Self {
        self.reporter_host = Some(host.into());
        self
    }
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
    pub fn include_clock(mut self, include_clock: bool) -> Self {
        self.include_clock = include_clock;
        self
    }
    pub fn build(self) -> Result<TrapperOutputConfig> {
        if self.key_pattern.is_empty() {
            return Err(Error::MissingSetting {
                key: CK_KEY_PATTERN.to_string(),
                back: Backtrace::new(),
            });
        }
        if self.value_pattern.is_empty() {
            return Err(Error::MissingSetting {
                key: CK_VALUE_PATTERN.to_string(),
                back: Backtrace::new(),
            });
        }
        if self.zabbix_host.is_empty() {
            return Err(Error::MissingSetting {
                key: CK_ZABBIX_HOST.to_string(),
                back: Backtrace::new(),
            });
        }
        if self.zabbix_port == 0 {
            return Err(bad_setting(CK_ZABBIX_PORT, &0));
        }
        if self.connect_timeout.is_zero() {
            return Err(bad_setting(CK_CONNECT_TIMEOUT_MS, &0));
        }
        Ok(TrapperOutputConfig {
            zabbix_host: self.zabbix_host,
            zabbix_port: self.zabbix_port,
            key_pattern: Template::new(self.key_pattern),
            value_pattern: Template::new(self.value_pattern),
            reporter_host: self
                .reporter_host
                .filter(|h| !h.is_empty())
                .unwrap_or_else(default_reporter_host),
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            include_clock: self.include_clock,
        })
    }
}

impl std::convert::TryFrom<&Configuration> for TrapperOutputConfig {
    type Error = Error;
    fn try_from(x: &Configuration) -> StdResult<Self, Self::Error> {
        let mut builder = TrapperOutputConfig::builder(
            x.require_string(CK_KEY_PATTERN)?,
            x.require_string(CK_VALUE_PATTERN)?,
        );
        if let Some(host) = x.get_string(CK_ZABBIX_HOST) {
            builder = builder.zabbix_host(host);
        }
        if let Some(port) = x.get_u64(CK_ZABBIX_PORT)? {
            builder = builder.zabbix_port(
                u16::try_from(port).map_err(|_| bad_setting(CK_ZABBIX_PORT, &port))?,
            );
        }
        if let Some(host) = x.get_string(CK_REPORTER_HOST) {
            builder = builder.reporter_host(host);
        }
        if let Some(ms) = x.get_u64(CK_CONNECT_TIMEOUT_MS)? {
            builder = builder.connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = x.get_u64(CK_READ_TIMEOUT_MS)? {
            builder = builder.read_timeout(Duration::from_millis(ms));
        }
        if let Some(include_clock) = x.get_bool(CK_INCLUDE_CLOCK)? {
            builder = builder.include_clock(include_clock);
        }
        builder.build()
    }
}
