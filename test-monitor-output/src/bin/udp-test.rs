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

//! Send a few check results to the Sensu client agent listening on localhost:3030.

use monitor_output::{
    config::CheckOutputConfig,
    event::Event,
    output::{CheckResultOutput, Output},
    severity::Level,
};

pub fn main() {
    tracing_subscriber::fmt::init();

    let config = CheckOutputConfig::new("monitor_output_udp_test")
        .unwrap()
        .alert_per_line(true);
    let mut output = CheckResultOutput::new(&config).unwrap();

    let events: Vec<Event> = [
        (Level::LOG_INFO, "Hello, 世界!"),
        (Level::LOG_WARNING, "Hello, 世界!"),
        (Level::LOG_ERR, "Hello, 世界!"),
        (Level::LOG_ALERT, "Hello, 世界!"),
    ]
    .into_iter()
    .enumerate()
    .map(|(i, (level, msg))| Event::builder(i, msg).level(level).build())
    .collect();

    for result in output.write_batch(&events) {
        println!("{:?}", result.unwrap());
    }
    output.stop();
}
