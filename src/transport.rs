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

//! The transport layer.
//!
//! This module defines two traits, one per delivery style:
//!
//! - [`Transport`]: fire-and-forget datagrams (Sensu check results over UDP)
//! - [`Exchange`]: request/response over a stream (the Zabbix trapper protocol over TCP)
//!
//! along with their socket implementations, [`UdpTransport`] & [`TcpTransport`]. Each owns
//! exactly one socket; nothing is shared between instances.
//!
//! # Examples
//!
//! To send check results to a Sensu client agent on localhost:
//!
//! ```rust
//! use monitor_output::transport::UdpTransport;
//! let transpo = UdpTransport::local().unwrap();
//! ```
//!
//! To talk to a Zabbix server. Nothing happens on the network until the first exchange:
//!
//! ```rust
//! use monitor_output::transport::TcpTransport;
//! use std::time::Duration;
//! let transpo = TcpTransport::new("zabbix.example.com:10051")
//!     .connect_timeout(Duration::from_secs(2));
//! assert!(!transpo.is_connected());
//! ```

use crate::error::{Error, Result};

use backtrace::Backtrace;

use tracing::{debug, warn};

use std::{
    io::{ErrorKind, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

/// Where a Sensu client agent listens for check results
pub const SENSU_CLIENT_ADDR: &str = "127.0.0.1:3030";
/// The Zabbix server's default trapper port
pub const DEFAULT_TRAPPER_PORT: u16 = 10051;
/// Default bound on connecting to a trapper server
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default bound on waiting for a trapper server's reply
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
/// Largest reply we'll accept from a trapper server; acknowledgements run to a few dozen bytes
pub const MAX_RESPONSE_LEN: usize = 16 * 1024;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      transport mechanisms                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Operations all fire-and-forget transports must support.
pub trait Transport {
    /// Send a slice of bytes as a single message on this transport mechanism.
    ///
    /// No response is read; the only failures observable are local ones.
    fn send(&self, buf: &[u8]) -> Result<usize>;
}

/// Operations all request/response transports must support.
pub trait Exchange {
    /// Send `request` & return the peer's complete response.
    ///
    /// Implementations must tear down their connection on any I/O failure before returning the
    /// error, & re-establish it on the following call. They shall *not* retry within a call.
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>>;
    /// Release any connection currently held
    fn close(&mut self) {}
    /// True once this transport has been shut down for good
    fn is_stopped(&self) -> bool {
        false
    }
}

fn resolve(addr: &str) -> std::io::Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
    if addrs.is_empty() {
        Err(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("{} did not resolve to any address", addr),
        ))
    } else {
        Ok(addrs)
    }
}

/// Sending check results via UDP datagrams.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Construct a [`Transport`] implementation via UDP at `addr`.
    pub fn new<A: ToSocketAddrs>(addr: A) -> Result<UdpTransport> {
        let dest = addr.to_socket_addrs()?.next().ok_or_else(|| {
            std::io::Error::new(ErrorKind::InvalidInput, "no destination address")
        })?;
        // Bind to any available port in the destination's address family...
        let socket = UdpSocket::bind(match dest {
            SocketAddr::V4(_) => "0.0.0.0:0",
            SocketAddr::V6(_) => "[::]:0",
        })?;
        // and connect to the agent at `dest`:
        socket.connect(dest)?;
        Ok(UdpTransport { socket })
    }
    /// Construct a [`Transport`] implementation via UDP at localhost:3030
    pub fn local() -> Result<UdpTransport> {
        UdpTransport::new(SENSU_CLIENT_ADDR)
    }
}

impl Transport for UdpTransport {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        Ok(self.socket.send(buf)?)
    }
}

/// State shared between a [`TcpTransport`] & its [`ShutdownHandle`]s
#[derive(Default)]
struct Shared {
    stream: Mutex<Option<TcpStream>>,
    stopped: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Option<TcpStream>> {
        self.stream
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
    /// Make a freshly-connected `stream` reachable from [`ShutdownHandle::close`].
    ///
    /// `stopped` is only ever set under the lock, so either the handle sees this stream & shuts
    /// it down, or we see `stopped` here & refuse the stream.
    fn publish(&self, stream: &TcpStream) -> Result<()> {
        let mut guard = self.lock();
        if self.is_stopped() {
            let _ = stream.shutdown(Shutdown::Both);
            return Err(stopped());
        }
        *guard = Some(stream.try_clone()?);
        Ok(())
    }
    fn clear(&self) {
        *self.lock() = None;
    }
}

fn stopped() -> Error {
    Error::Stopped {
        back: Backtrace::new(),
    }
}

/// Permanently closes a [`TcpTransport`], possibly from another thread.
///
/// A read blocked on the socket when [`ShutdownHandle::close`] is called returns immediately,
/// & whatever had been received so far is taken as the response. Every exchange after that fails
/// with [`Error::Stopped`]; the transport never reconnects.
#[derive(Clone)]
pub struct ShutdownHandle {
    shared: Arc<Shared>,
}

impl ShutdownHandle {
    pub fn close(&self) {
        let mut guard = self.shared.lock();
        self.shared.stopped.store(true, Ordering::SeqCst);
        if let Some(stream) = guard.take() {
            debug!("Shutting down trapper connection to {:?}", stream.peer_addr());
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
    pub fn is_closed(&self) -> bool {
        self.shared.is_stopped()
    }
}

/// Request/response over TCP, connecting lazily & reconnecting after failures.
///
/// At most one connection is open at any time. It's opened on the first [`Exchange::exchange`],
/// & re-opened by the first call after it's been lost, whether due to an I/O error on our side or
/// the server hanging-up (the Zabbix server closes each connection after replying). Once closed
/// through a [`ShutdownHandle`], it stays closed.
pub struct TcpTransport {
    addr: String,
    connect_timeout: Duration,
    read_timeout: Duration,
    stream: Option<TcpStream>,
    shared: Arc<Shared>,
}

impl TcpTransport {
    /// Construct a [`TcpTransport`] that will connect to `addr` (e.g. "zabbix:10051") when first
    /// used. `addr` is resolved on each connect.
    pub fn new<A: Into<String>>(addr: A) -> TcpTransport {
        TcpTransport {
            addr: addr.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            stream: None,
            shared: Arc::new(Shared::default()),
        }
    }
    /// Construct a [`TcpTransport`] for localhost:10051
    pub fn default_local() -> TcpTransport {
        TcpTransport::new(format!("localhost:{}", DEFAULT_TRAPPER_PORT))
    }
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
    pub fn addr(&self) -> &str {
        &self.addr
    }
    /// True if we hold a connection that hasn't been shut down (the server may still have hung
    /// up on it; we find out on the next exchange).
    pub fn is_connected(&self) -> bool {
        self.stream.is_some() && !self.shared.is_stopped()
    }
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shared: self.shared.clone(),
        }
    }

    fn connect(&mut self) -> Result<()> {
        let mut last_err = None;
        for addr in resolve(&self.addr)? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    // A zero timeout means "block forever" to us, but is an error to `std`.
                    let timeout = Some(self.read_timeout).filter(|d| !d.is_zero());
                    stream.set_read_timeout(timeout)?;
                    stream.set_write_timeout(timeout)?;
                    stream.set_nodelay(true)?;
                    self.shared.publish(&stream)?;
                    debug!("Connected to trapper server {} ({})", self.addr, addr);
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(err) => {
                    debug!("Failed to connect to {} ({}): {}", self.addr, addr, err);
                    last_err = Some(err);
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| std::io::Error::new(ErrorKind::NotConnected, "no address"))
            .into())
    }

    fn teardown(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.shared.clear();
    }

    /// True if the server hung-up on us (or left something unsolicited on the wire) since our
    /// last exchange.
    fn is_stale(stream: &TcpStream) -> bool {
        if stream.set_nonblocking(true).is_err() {
            return true;
        }
        let mut byte = [0u8; 1];
        let stale = !matches!(stream.peek(&mut byte), Err(ref err) if err.kind() == ErrorKind::WouldBlock);
        stale || stream.set_nonblocking(false).is_err()
    }

    /// Read until the peer closes, a complete frame has arrived, or the read times out (having
    /// read something). Returns the bytes read & whether the peer closed the connection.
    ///
    /// Replies longer than [`MAX_RESPONSE_LEN`] (announced or actual) are refused.
    fn read_response(stream: &TcpStream, stopped: &AtomicBool) -> std::io::Result<(Vec<u8>, bool)> {
        fn too_long(len: usize) -> std::io::Error {
            std::io::Error::new(
                ErrorKind::InvalidData,
                format!(
                    "response of {} bytes exceeds the {}-byte limit",
                    len, MAX_RESPONSE_LEN
                ),
            )
        }

        // Same trick as `write_all()` in `Exchange::exchange`, below.
        let mut reader: &TcpStream = stream;
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let mut peer_closed = false;
        loop {
            if let Some(len) = crate::frame::announced_len(&buf) {
                if len > MAX_RESPONSE_LEN {
                    return Err(too_long(len));
                }
                if buf.len() >= len {
                    buf.truncate(len);
                    break;
                }
            }
            match reader.read(&mut chunk) {
                Ok(0) => {
                    peer_closed = true;
                    break;
                }
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    if buf.len() > MAX_RESPONSE_LEN {
                        return Err(too_long(buf.len()));
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                // If we're being shut down, this is the end of the response; not an error.
                Err(_) if stopped.load(Ordering::SeqCst) => break,
                Err(err)
                    if !buf.is_empty()
                        && matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    break
                }
                Err(err) => return Err(err),
            }
        }
        if buf.is_empty() && !stopped.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                "connection closed before any response",
            ));
        }
        Ok((buf, peer_closed))
    }
}

impl Exchange for TcpTransport {
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        if self.shared.is_stopped() {
            self.teardown();
            return Err(stopped());
        }
        if let Some(stream) = &self.stream {
            if TcpTransport::is_stale(stream) {
                debug!("Trapper connection to {} went away; reconnecting", self.addr);
                self.teardown();
            }
        }
        if self.stream.is_none() {
            self.connect()?;
        }

        let result = match &self.stream {
            Some(stream) => {
                // `std::io::Write()` takes a `&mut self` and `stream` is a `&TcpStream`. `Write`
                // is implemented both on `TcpStream` and `&TcpStream`, however, so I declare a
                // mutable variable `writer` whose type is `&TcpStream`...
                let mut writer: &TcpStream = stream;
                // and invoke `write_all()` on _that_ receiver, whose type is `&mut &TcpStream`.
                writer
                    .write_all(request)
                    .and_then(|_| writer.flush())
                    .and_then(|_| TcpTransport::read_response(stream, &self.shared.stopped))
            }
            None => Err(std::io::Error::from(ErrorKind::NotConnected)),
        };

        match result {
            Ok((response, peer_closed)) => {
                if self.shared.is_stopped() {
                    debug!("Trapper connection to {} shut down", self.addr);
                    self.teardown();
                } else if peer_closed {
                    debug!("Trapper server {} closed the connection", self.addr);
                    self.teardown();
                }
                Ok(response)
            }
            Err(_) if self.shared.is_stopped() => {
                self.teardown();
                Err(stopped())
            }
            Err(err) => {
                warn!(
                    "Exchange with {} failed ({}); dropping the connection",
                    self.addr, err
                );
                self.teardown();
                Err(err.into())
            }
        }
    }
    fn close(&mut self) {
        self.teardown();
    }
    fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod test {

    use super::*;

    use crate::frame;

    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    fn listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    /// Read one trapper frame off `stream`, the way a server would.
    fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
        let mut buf = vec![0u8; frame::PREFIX_LEN];
        stream.read_exact(&mut buf).unwrap();
        let len = frame::announced_len(&buf).unwrap();
        buf.resize(len, 0);
        stream.read_exact(&mut buf[frame::PREFIX_LEN..]).unwrap();
        buf
    }

    const ACK: &[u8] = b"processed: 1; failed: 0; total: 1";

    #[test]
    fn udp() {
        let agent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let transpo = UdpTransport::new(agent.local_addr().unwrap()).unwrap();
        assert_eq!(transpo.send(b"{\"status\":0}").unwrap(), 12);
        let mut buf = [0u8; 64];
        let n = agent.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"{\"status\":0}");
        let _ = UdpTransport::local().unwrap(); // at least exercise it
    }

    #[test]
    fn default_local() {
        let transpo = TcpTransport::default_local();
        assert_eq!(transpo.addr(), "localhost:10051");
        assert!(!transpo.is_connected());
        assert!(!transpo.is_stopped());
    }

    #[test]
    fn persistent_connection() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            for _ in 0..2 {
                let req = read_frame(&mut conn);
                assert_eq!(frame::Frame::decode(&req).unwrap().payload(), b"ping");
                conn.write_all(&frame::encode(ACK)).unwrap();
            }
            // One accept only: anything else would hang the test
        });

        let mut transpo = TcpTransport::new(addr);
        assert!(!transpo.is_connected());
        for _ in 0..2 {
            let rsp = transpo.exchange(&frame::encode(b"ping")).unwrap();
            assert_eq!(rsp, frame::encode(ACK));
            assert!(transpo.is_connected());
        }
        server.join().unwrap();
    }

    #[test]
    fn server_hangs_up_after_each_reply() {
        let (listener, addr) = listener();
        let (tx, rx) = mpsc::channel();
        let server = thread::spawn(move || {
            for _ in 0..2 {
                let (mut conn, _) = listener.accept().unwrap();
                read_frame(&mut conn);
                conn.write_all(&frame::encode(ACK)).unwrap();
                drop(conn);
                tx.send(()).unwrap();
            }
        });

        let mut transpo = TcpTransport::new(addr);
        for _ in 0..2 {
            assert_eq!(
                transpo.exchange(&frame::encode(b"x")).unwrap(),
                frame::encode(ACK)
            );
            rx.recv().unwrap();
        }
        server.join().unwrap();
    }

    #[test]
    fn reconnects_after_failure() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            // First connection: swallow the request & hang up without a word.
            let (mut conn, _) = listener.accept().unwrap();
            read_frame(&mut conn);
            drop(conn);
            // Exactly one reconnect
            let (mut conn, _) = listener.accept().unwrap();
            let req = read_frame(&mut conn);
            assert_eq!(frame::Frame::decode(&req).unwrap().payload(), b"second");
            conn.write_all(&frame::encode(ACK)).unwrap();
        });

        let mut transpo = TcpTransport::new(addr);
        let err = transpo.exchange(&frame::encode(b"first")).unwrap_err();
        assert!(err.is_connection(), "{:?}", err);
        assert!(!transpo.is_connected());

        let rsp = transpo.exchange(&frame::encode(b"second")).unwrap();
        assert_eq!(rsp, frame::encode(ACK));
        server.join().unwrap();
    }

    #[test]
    fn connect_failure() {
        let (listener, addr) = listener();
        drop(listener);
        let mut transpo = TcpTransport::new(addr).connect_timeout(Duration::from_millis(500));
        let err = transpo.exchange(b"anything").unwrap_err();
        assert!(err.is_connection());
        assert!(!transpo.is_connected());
    }

    #[test]
    fn silent_server_times_out() {
        let (listener, addr) = listener();
        let (tx, rx) = mpsc::channel::<()>();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            read_frame(&mut conn);
            let _ = rx.recv();
        });

        let mut transpo = TcpTransport::new(addr).read_timeout(Duration::from_millis(100));
        let err = transpo.exchange(&frame::encode(b"x")).unwrap_err();
        assert!(err.is_connection());
        assert!(!transpo.is_connected());
        tx.send(()).unwrap();
        server.join().unwrap();
    }

    #[test]
    fn shutdown_ends_a_blocked_read() {
        let (listener, addr) = listener();
        let (tx, rx) = mpsc::channel::<()>();
        let (got_tx, got_rx) = mpsc::channel::<()>();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            read_frame(&mut conn);
            got_tx.send(()).unwrap();
            let _ = rx.recv();
        });

        let mut transpo = TcpTransport::new(addr).read_timeout(Duration::from_secs(30));
        let handle = transpo.shutdown_handle();
        let client = thread::spawn(move || {
            let rsp = transpo.exchange(&frame::encode(b"x"));
            (rsp, transpo)
        });

        got_rx.recv().unwrap();
        thread::sleep(Duration::from_millis(50));
        handle.close();

        let (rsp, mut transpo) = client.join().unwrap();
        assert!(rsp.unwrap().is_empty());
        assert!(!transpo.is_connected());
        assert!(matches!(
            transpo.exchange(&frame::encode(b"y")),
            Err(Error::Stopped { .. })
        ));
        tx.send(()).unwrap();
        server.join().unwrap();
    }

    #[test]
    fn shutdown_is_final() {
        let (listener, addr) = listener();
        let (tx, rx) = mpsc::channel::<()>();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            read_frame(&mut conn);
            conn.write_all(&frame::encode(ACK)).unwrap();
            // Any reconnect would be sitting in the backlog by now.
            rx.recv().unwrap();
            listener.set_nonblocking(true).unwrap();
            matches!(listener.accept(), Err(ref err) if err.kind() == ErrorKind::WouldBlock)
        });

        let mut transpo = TcpTransport::new(addr);
        transpo.exchange(&frame::encode(b"1")).unwrap();
        let handle = transpo.shutdown_handle();
        handle.close();
        assert!(handle.is_closed());
        assert!(transpo.is_stopped());
        assert!(!transpo.is_connected());
        for _ in 0..2 {
            assert!(matches!(
                transpo.exchange(&frame::encode(b"2")),
                Err(Error::Stopped { .. })
            ));
        }
        tx.send(()).unwrap();
        assert!(server.join().unwrap(), "the transport reconnected after shutdown");
    }

    #[test]
    fn shutdown_before_first_exchange() {
        let (listener, addr) = listener();
        listener.set_nonblocking(true).unwrap();
        let mut transpo = TcpTransport::new(addr);
        transpo.shutdown_handle().close();
        assert!(matches!(
            transpo.exchange(b"anything"),
            Err(Error::Stopped { .. })
        ));
        assert!(matches!(listener.accept(), Err(ref err) if err.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn shutdown_during_connect_is_not_lost() {
        let (listener, addr) = listener();
        let transpo = TcpTransport::new(addr.clone());
        let handle = transpo.shutdown_handle();
        // A connect has completed, but its stream has not yet been published...
        let stream = TcpStream::connect(&addr).unwrap();
        let (mut peer, _) = listener.accept().unwrap();
        handle.close();
        // ...so publishing it must fail, & take the stream down with it.
        assert!(matches!(
            transpo.shared.publish(&stream),
            Err(Error::Stopped { .. })
        ));
        peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(peer.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn oversized_responses_are_refused() {
        // One reply announcing a huge frame, one that's just huge.
        let (listener, addr) = listener();
        let (tx, rx) = mpsc::channel::<()>();
        let server = thread::spawn(move || {
            let mut huge = frame::HEADER.to_vec();
            huge.extend_from_slice(&(1u64 << 30).to_le_bytes());
            huge.extend_from_slice(b"processed: 1");
            let junk = vec![b'x'; MAX_RESPONSE_LEN + 1];
            let mut conns = Vec::new();
            for reply in [huge, junk] {
                let (mut conn, _) = listener.accept().unwrap();
                read_frame(&mut conn);
                conn.write_all(&reply).unwrap();
                conns.push(conn);
            }
            let _ = rx.recv();
        });

        let mut transpo = TcpTransport::new(addr).read_timeout(Duration::from_secs(5));
        for _ in 0..2 {
            let err = transpo.exchange(&frame::encode(b"x")).unwrap_err();
            assert!(err.is_connection(), "{:?}", err);
            assert!(!transpo.is_connected());
        }
        tx.send(()).unwrap();
        server.join().unwrap();
    }
}
