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
//! Severity levels & health statuses.
//!
//! Events arrive carrying a numeric severity on the syslog scale: zero is the most severe
//! ("system is unusable"), seven the least ("debug-level message"). [`Level`] replicates the
//! names used in `<syslog.h>` for convenience; nothing requires a level to be one of them, and
//! the mapping to a [`Status`] is total over all integers.

type StdResult<T, E> = std::result::Result<T, E>;

/// RFCs [5424] & [3164] define eight severity levels for messages. The enumeration values
/// duplicate the constants documented as per the `syslog()` manual [page] & defined in
/// `<syslog.h>`.
///
/// [5424]: https://datatracker.ietf.org/doc/html/rfc5424
/// [3164]: https://datatracker.ietf.org/doc/html/rfc3164
/// [page]: https://man7.org/linux/man-pages/man3/syslog.3.html
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Level {
    /// system is unusable
    LOG_EMERG,
    /// action must be take immediately
    LOG_ALERT,
    /// critical conditions
    LOG_CRIT,
    /// error conditions
    LOG_ERR,
    /// warning conditions
    LOG_WARNING,
    /// normal, but significant condition
    LOG_NOTICE,
    /// informational message
    LOG_INFO,
    /// debug-level message
    LOG_DEBUG,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                Level::LOG_EMERG => "LOG_EMERG",
                Level::LOG_ALERT => "LOG_ALERT",
                Level::LOG_CRIT => "LOG_CRIT",
                Level::LOG_ERR => "LOG_ERR",
                Level::LOG_WARNING => "LOG_WARNING",
                Level::LOG_NOTICE => "LOG_NOTICE",
                Level::LOG_INFO => "LOG_INFO",
                Level::LOG_DEBUG => "LOG_DEBUG",
            }
        )
    }
}

impl std::convert::From<Level> for i64 {
    fn from(level: Level) -> Self {
        level as i64
    }
}

/// Map a [`tracing`] level to its nearest syslog severity
///
/// [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
pub fn default_level_mapping(level: &tracing::Level) -> Level {
    match *level {
        tracing::Level::TRACE | tracing::Level::DEBUG => Level::LOG_DEBUG,
        tracing::Level::INFO => Level::LOG_INFO,
        tracing::Level::WARN => Level::LOG_WARNING,
        tracing::Level::ERROR => Level::LOG_ERR,
    }
}

/// The tri-state health status understood by check-result receivers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Ok = 0,
    Warning = 1,
    Critical = 2,
}

impl Status {
    /// Derive a [`Status`] from a syslog-style severity level.
    ///
    /// Anything more severe than [`Level::LOG_CRIT`] (i.e. < 2) is critical, anything more
    /// severe than [`Level::LOG_WARNING`] (i.e. < 4) is a warning, everything else is OK.
    pub fn from_level(level: i64) -> Status {
        if level < 2 {
            Status::Critical
        } else if level < 4 {
            Status::Warning
        } else {
            Status::Ok
        }
    }
    /// The integer code check-result receivers expect
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl std::convert::From<Level> for Status {
    fn from(level: Level) -> Self {
        Status::from_level(level.into())
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                Status::Ok => "OK",
                Status::Warning => "WARNING",
                Status::Critical => "CRITICAL",
            }
        )
    }
}

impl serde::Serialize for Status {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> StdResult<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

#[cfg(test)]
mod severity_tests {
    use super::*;

    #[test]
    fn thresholds() {
        assert_eq!(Status::from_level(i64::MIN), Status::Critical);
        assert_eq!(Status::from_level(-1), Status::Critical);
        assert_eq!(Status::from_level(0), Status::Critical);
        assert_eq!(Status::from_level(1), Status::Critical);
        assert_eq!(Status::from_level(2), Status::Warning);
        assert_eq!(Status::from_level(3), Status::Warning);
        assert_eq!(Status::from_level(4), Status::Ok);
        assert_eq!(Status::from_level(7), Status::Ok);
        assert_eq!(Status::from_level(i64::MAX), Status::Ok);
    }

    #[test]
    fn every_level_in_range() {
        for level in -16..16 {
            let status = Status::from_level(level);
            assert_eq!(status == Status::Critical, level < 2);
            assert_eq!(status == Status::Warning, (2..4).contains(&level));
            assert_eq!(status == Status::Ok, level >= 4);
        }
    }

    #[test]
    fn syslog_names() {
        assert_eq!(Status::from(Level::LOG_ALERT), Status::Critical);
        assert_eq!(Status::from(Level::LOG_ERR), Status::Warning);
        assert_eq!(Status::from(Level::LOG_WARNING), Status::Ok);
        assert_eq!(i64::from(Level::LOG_DEBUG), 7);
        assert_eq!(format!("{}", Level::LOG_CRIT), "LOG_CRIT");
        assert_eq!(
            default_level_mapping(&tracing::Level::ERROR),
            Level::LOG_ERR
        );
    }

    #[test]
    fn serializes_as_code() {
        assert_eq!(serde_json::to_string(&Status::Ok).unwrap(), "0");
        assert_eq!(serde_json::to_string(&Status::Warning).unwrap(), "1");
        assert_eq!(serde_json::to_string(&Status::Critical).unwrap(), "2");
        assert_eq!(format!("{}", Status::Critical), "CRITICAL");
    }
}
