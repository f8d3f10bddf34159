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

//! Send a few item values to the Zabbix server listening on localhost:10051.
//!
//! The server must know this host (or the one named by `reporter_host`) & have a trapper item
//! keyed `monitor_output.test`.

use monitor_output::{
    config::{Configuration, TrapperOutputConfig},
    event::Event,
    output::{Output, TrapperOutput},
};

pub fn main() {
    tracing_subscriber::fmt::init();

    let config = Configuration::from_json(
        &serde_json::json!({
            "zabbix_key_pattern": "monitor_output.%(facility)",
            "zabbix_value_pattern": "%(message) (%(level))",
            "include_clock": true,
        })
        .to_string(),
    )
    .unwrap();
    let config = TrapperOutputConfig::try_from(&config).unwrap();
    let mut output = TrapperOutput::new(&config);

    for i in 0..3 {
        let event = Event::builder(i, format!("你好, Zabbix #{}", i))
            .level(3)
            .field("facility", "test")
            .build();
        match output.write(&event) {
            Ok(delivery) => println!("{:?}", delivery),
            Err(err) => println!("{}", err),
        }
    }
    output.stop();
}
