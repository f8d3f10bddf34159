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

//! Outputs: forwarding [`Event`]s to a monitoring system.
//!
//! # Introduction
//!
//! An [`Output`] ties together an encoder & a transport. Two are provided:
//!
//! - [`CheckResultOutput`]: Sensu check results, as JSON datagrams to the local client agent
//! - [`TrapperOutput`]: Zabbix trapper items, as framed JSON over a (lazily re-established) TCP
//!   connection to the Zabbix server
//!
//! Both are generic over their transport so that they can be tested (or re-purposed) without a
//! real agent or server.
//!
//! ```rust,no_run
//! use monitor_output::{config::CheckOutputConfig, event::Event, output::{CheckResultOutput, Output}};
//! let mut output = CheckResultOutput::new(&CheckOutputConfig::new("log_errors").unwrap()).unwrap();
//! output.write(&Event::builder(1, "disk full").level(1).build()).unwrap();
//! ```
//!
//! Per-event failures are returned, never panicked upon; [`Output::write_batch`] carries on past
//! them so that one bad event can't hold up the rest.

use crate::check::CheckEncoder;
use crate::config::{CheckOutputConfig, Configuration, TrapperOutputConfig};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::response::{validate, Delivery};
use crate::transport::{Exchange, ShutdownHandle, TcpTransport, Transport, UdpTransport};
use crate::trapper::PayloadBuilder;

use backtrace::Backtrace;
use tracing::{debug, error, info};

/// Operations common to all outputs.
pub trait Output {
    /// Forward a single event.
    fn write(&mut self, event: &Event) -> Result<Delivery>;
    /// Forward each of `events` in turn; a failure is logged & recorded, then we move on to the
    /// next event.
    fn write_batch(&mut self, events: &[Event]) -> Vec<Result<Delivery>> {
        events
            .iter()
            .map(|event| {
                let result = self.write(event);
                if let Err(err) = &result {
                    error!("Failed to forward event {}: {}", event.id(), err);
                }
                result
            })
            .collect()
    }
    /// Release this output's socket; subsequent writes fail with [`Error::Stopped`].
    fn stop(&mut self);
    fn is_running(&self) -> bool;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       Sensu check results                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Forwards events as Sensu check results.
pub struct CheckResultOutput<T: Transport = UdpTransport> {
    encoder: CheckEncoder,
    transport: Option<T>,
}

impl CheckResultOutput<UdpTransport> {
    /// Send check results to the Sensu client agent on localhost:3030
    pub fn new(config: &CheckOutputConfig) -> Result<CheckResultOutput<UdpTransport>> {
        Ok(CheckResultOutput::with_transport(
            config,
            UdpTransport::local()?,
        ))
    }
    pub fn from_configuration(config: &Configuration) -> Result<CheckResultOutput<UdpTransport>> {
        CheckResultOutput::new(&CheckOutputConfig::try_from(config)?)
    }
}

impl<T: Transport> CheckResultOutput<T> {
    pub fn with_transport(config: &CheckOutputConfig, transport: T) -> CheckResultOutput<T> {
        info!(
            "Forwarding events as check results under {} (new alert every line: {})",
            config.check_name(),
            config.is_alert_per_line()
        );
        CheckResultOutput {
            encoder: CheckEncoder::new(config.check_name(), config.is_alert_per_line()),
            transport: Some(transport),
        }
    }
}

impl<T: Transport> Output for CheckResultOutput<T> {
    /// Check results are sent as datagrams; there's no acknowledgement, so a successful send is
    /// [`Delivery::Delivered`].
    fn write(&mut self, event: &Event) -> Result<Delivery> {
        let transport = self.transport.as_ref().ok_or_else(|| Error::Stopped {
            back: Backtrace::new(),
        })?;
        let buf = self.encoder.encode(event).to_json()?;
        transport.send(&buf)?;
        debug!("Sent check result for event {}", event.id());
        Ok(Delivery::Delivered)
    }
    fn stop(&mut self) {
        if self.transport.take().is_some() {
            info!("Check result output {} stopped", self.encoder.check_name());
        }
    }
    fn is_running(&self) -> bool {
        self.transport.is_some()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      Zabbix trapper items                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Forwards events as Zabbix trapper item values.
pub struct TrapperOutput<T: Exchange = TcpTransport> {
    payload: PayloadBuilder,
    transport: Option<T>,
}

impl TrapperOutput<TcpTransport> {
    /// Send items to the trapper server named in `config`. No connection is made until the first
    /// write.
    pub fn new(config: &TrapperOutputConfig) -> TrapperOutput<TcpTransport> {
        let transport = TcpTransport::new(config.address())
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout());
        TrapperOutput::with_transport(config, transport)
    }
    pub fn from_configuration(config: &Configuration) -> Result<TrapperOutput<TcpTransport>> {
        Ok(TrapperOutput::new(&TrapperOutputConfig::try_from(config)?))
    }
    /// A handle that stops this output from another thread, interrupting any write blocked on
    /// the server. Writes after that fail with [`Error::Stopped`].
    pub fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        self.transport.as_ref().map(TcpTransport::shutdown_handle)
    }
}

impl<T: Exchange> TrapperOutput<T> {
    pub fn with_transport(config: &TrapperOutputConfig, transport: T) -> TrapperOutput<T> {
        info!(
            "Forwarding events to trapper server {} as host {} (key: {}, value: {})",
            config.address(),
            config.reporter_host(),
            config.key_pattern(),
            config.value_pattern()
        );
        TrapperOutput {
            payload: PayloadBuilder::new(
                config.reporter_host(),
                config.key_pattern().clone(),
                config.value_pattern().clone(),
            )
            .include_clock(config.include_clock()),
            transport: Some(transport),
        }
    }
}

impl<T: Exchange> Output for TrapperOutput<T> {
    /// Send one "sender data" request & inspect the server's acknowledgement. I/O failures are
    /// errors (the connection will be re-established on the next write); a negative or garbled
    /// acknowledgement is not, & is reported through the returned [`Delivery`].
    fn write(&mut self, event: &Event) -> Result<Delivery> {
        let transport = self.transport.as_mut().ok_or_else(|| Error::Stopped {
            back: Backtrace::new(),
        })?;
        let request = self.payload.build(event).to_frame()?;
        let response = transport.exchange(&request)?;
        Ok(validate(&response).delivery)
    }
    fn stop(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
            info!("Trapper output for host {} stopped", self.payload.host());
        }
    }
    /// False once stopped, whether through [`Output::stop`] or a [`ShutdownHandle`]
    fn is_running(&self) -> bool {
        self.transport
            .as_ref()
            .map_or(false, |transport| !transport.is_stopped())
    }
}

#[cfg(test)]
mod test {

    use super::*;

    use crate::frame;
    use crate::response::AckProblem;
    use crate::trapper::TrapperRequest;

    use std::cell::{Cell, RefCell};
    use std::io::{Read, Write};
    use std::net::{TcpListener, UdpSocket};
    use std::thread;
    use std::time::Duration;

    const ACK: &[u8] =
        br#"{"response":"success","info":"processed: 1; failed: 0; total: 1; seconds spent: 0.000055"}"#;

    /// Records datagrams, failing the n-th send
    struct FlakyDatagrams {
        fail_on: usize,
        calls: Cell<usize>,
        sent: RefCell<Vec<Vec<u8>>>,
    }

    impl Transport for FlakyDatagrams {
        fn send(&self, buf: &[u8]) -> Result<usize> {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() == self.fail_on {
                return Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into());
            }
            self.sent.borrow_mut().push(buf.to_vec());
            Ok(buf.len())
        }
    }

    /// Acknowledges every request, failing the n-th exchange
    struct FlakyServer {
        fail_on: usize,
        calls: usize,
        requests: Vec<TrapperRequest>,
        closed: bool,
    }

    impl Exchange for FlakyServer {
        fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>> {
            self.calls += 1;
            if self.calls == self.fail_on {
                return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into());
            }
            self.requests.push(TrapperRequest::from_frame(request)?);
            Ok(frame::encode(ACK))
        }
        fn close(&mut self) {
            self.closed = true;
        }
    }

    fn events() -> Vec<Event> {
        (1..=3)
            .map(|i| {
                Event::builder(i, format!("line {}", i))
                    .level(3)
                    .field("facility", "app")
                    .build()
            })
            .collect()
    }

    fn trapper_config(address: Option<&str>) -> TrapperOutputConfig {
        let mut builder =
            TrapperOutputConfig::builder("log.%(facility)", "%(message)").reporter_host("web01");
        if let Some(address) = address {
            let (host, port) = address.rsplit_once(':').unwrap();
            builder = builder
                .zabbix_host(host)
                .zabbix_port(port.parse().unwrap())
                .read_timeout(Duration::from_secs(2));
        }
        builder.build().unwrap()
    }

    #[test]
    fn check_result_datagram() {
        let agent = UdpSocket::bind("127.0.0.1:0").unwrap();
        agent
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let config = CheckOutputConfig::new("disk_check").unwrap();
        let transport = UdpTransport::new(agent.local_addr().unwrap()).unwrap();
        let mut output = CheckResultOutput::with_transport(&config, transport);
        assert!(output.is_running());
        let delivery = output
            .write(&Event::builder(42, "disk full").level(1).build())
            .unwrap();
        assert_eq!(delivery, Delivery::Delivered);

        let mut buf = [0u8; 1024];
        let n = agent.recv(&mut buf).unwrap();
        assert_eq!(
            &buf[..n],
            br#"{"name":"disk_check","output":"disk full","status":2}"#
        );
    }

    #[test]
    fn check_result_batch_continues_past_failure() {
        let config = CheckOutputConfig::new("c").unwrap().alert_per_line(true);
        let mut output = CheckResultOutput::with_transport(
            &config,
            FlakyDatagrams {
                fail_on: 2,
                calls: Cell::new(0),
                sent: RefCell::new(Vec::new()),
            },
        );
        let results = output.write_batch(&events());
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].as_ref().unwrap_err().is_connection());
        assert!(results[2].is_ok());

        let sent = output.transport.as_ref().unwrap().sent.borrow();
        assert_eq!(sent.len(), 2);
        let names: Vec<String> = sent
            .iter()
            .map(|buf| {
                serde_json::from_slice::<serde_json::Value>(buf).unwrap()["name"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(names, vec!["c1", "c3"]);
    }

    #[test]
    fn trapper_batch_continues_past_failure() {
        let mut output = TrapperOutput::with_transport(
            &trapper_config(None),
            FlakyServer {
                fail_on: 2,
                calls: 0,
                requests: Vec::new(),
                closed: false,
            },
        );
        let results = output.write_batch(&events());
        assert_eq!(results[0].as_ref().unwrap(), &Delivery::Delivered);
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap(), &Delivery::Delivered);

        let server = output.transport.as_ref().unwrap();
        let values: Vec<&str> = server
            .requests
            .iter()
            .map(|r| r.data[0].value.as_str())
            .collect();
        assert_eq!(values, vec!["line 1", "line 3"]);
        assert_eq!(server.requests[0].data[0].key, "log.app");
        assert_eq!(server.requests[0].data[0].host, "web01");
    }

    #[test]
    fn trapper_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let mut requests = Vec::new();
            let (mut conn, _) = listener.accept().unwrap();
            for i in 0..2 {
                let mut prefix = [0u8; 13];
                conn.read_exact(&mut prefix).unwrap();
                let len = frame::announced_len(&prefix).unwrap();
                let mut buf = prefix.to_vec();
                buf.resize(len, 0);
                conn.read_exact(&mut buf[13..]).unwrap();
                requests.push(TrapperRequest::from_frame(&buf).unwrap());
                let rsp = if i == 0 {
                    frame::encode(ACK)
                } else {
                    frame::encode(
                        br#"{"response":"success","info":"processed: 0; failed: 1; total: 1"}"#,
                    )
                };
                conn.write_all(&rsp).unwrap();
            }
            requests
        });

        let mut output = TrapperOutput::new(&trapper_config(Some(&address)));
        assert!(output.shutdown_handle().is_some());
        let events = events();
        assert_eq!(output.write(&events[0]).unwrap(), Delivery::Delivered);
        assert!(matches!(
            output.write(&events[1]).unwrap(),
            Delivery::Failed(AckProblem::Rejected { .. })
        ));

        let requests = server.join().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].data[0].value, "line 2");
    }

    #[test]
    fn shutdown_handle_stops_the_output() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut prefix = [0u8; 13];
            conn.read_exact(&mut prefix).unwrap();
            let mut body = vec![0u8; frame::announced_len(&prefix).unwrap() - 13];
            conn.read_exact(&mut body).unwrap();
            conn.write_all(&frame::encode(ACK)).unwrap();
            conn
        });

        let mut output = TrapperOutput::new(&trapper_config(Some(&address)));
        let events = events();
        assert_eq!(output.write(&events[0]).unwrap(), Delivery::Delivered);
        let _conn = server.join().unwrap();

        // With the server gone, a reconnect would fail with a connection error instead.
        output.shutdown_handle().unwrap().close();
        assert!(!output.is_running());
        assert!(matches!(
            output.write(&events[1]),
            Err(Error::Stopped { .. })
        ));
        assert!(output
            .write_batch(&events[1..])
            .iter()
            .all(|r| matches!(r, Err(Error::Stopped { .. }))));
    }

    #[test]
    fn unreachable_trapper_server() {
        // Grab a port nobody's listening on.
        let address = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let mut output = TrapperOutput::new(&trapper_config(Some(&address)));
        let err = output.write(&events()[0]).unwrap_err();
        assert!(err.is_connection());
        // ...but we're still up.
        assert!(output.is_running());
    }

    #[test]
    fn stopped() {
        let mut output = TrapperOutput::with_transport(
            &trapper_config(None),
            FlakyServer {
                fail_on: 0,
                calls: 0,
                requests: Vec::new(),
                closed: false,
            },
        );
        output.stop();
        assert!(!output.is_running());
        assert!(matches!(
            output.write(&events()[0]),
            Err(Error::Stopped { .. })
        ));
        output.stop();

        let mut output = CheckResultOutput::with_transport(
            &CheckOutputConfig::new("c").unwrap(),
            UdpTransport::local().unwrap(),
        );
        output.stop();
        assert!(matches!(
            output.write(&events()[0]),
            Err(Error::Stopped { .. })
        ));
        assert!(output.write_batch(&events()).iter().all(|r| r.is_err()));
    }

    #[test]
    fn configuration_errors() {
        let config = Configuration::new().set("zabbix_key_pattern", "k");
        assert!(matches!(
            TrapperOutput::from_configuration(&config),
            Err(Error::MissingSetting { .. })
        ));
        assert!(matches!(
            CheckResultOutput::from_configuration(&Configuration::new()),
            Err(Error::MissingSetting { .. })
        ));
    }
}
