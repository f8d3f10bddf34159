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

//! Forward `tracing` events to both a Sensu client agent & a Zabbix server on this host.

use monitor_output::{
    config::{CheckOutputConfig, TrapperOutputConfig},
    layer::Layer,
    output::{CheckResultOutput, TrapperOutput},
};

use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{
    layer::SubscriberExt, // Needed to get `with()`
    registry::Registry,
};

pub fn main() {
    let check = CheckResultOutput::new(&CheckOutputConfig::new("monitor_output_layer_test").unwrap())
        .unwrap();
    let trapper = TrapperOutput::new(
        &TrapperOutputConfig::builder("monitor_output.%(target)", "%(message)")
            .build()
            .unwrap(),
    );
    // Setup the real subsriber...
    let subscriber = Registry::default()
        .with(Layer::new(check))
        .with(Layer::new(trapper));
    // and install it.
    let _guard = tracing::subscriber::set_default(subscriber);

    trace!("Hello, 世界!");
    debug!("Hello, 世界!");
    info!("Hello, 世界!");
    warn!(facility = "test", "Hello, 世界!");
    error!(facility = "test", "Hello, 世界!");
}
