//! The connection engine: a single-threaded, cooperative `mio` event loop
//! driving one DCP TCP connection.
//!
//! State transitions and incoming data only happen on the caller's stack,
//! either directly via [`Connection::pump`] or indirectly via one of the
//! `wait_for_*` helpers; there is no background thread. Outgoing messages
//! are the one exception: queuing a message attempts to write it
//! immediately (see `queue_message`), since `mio`'s edge-triggered
//! writable events give the engine no other reliable way to learn that a
//! previously-idle, already-writable socket is ready for more data.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use mio_timerfd::{ClockId, TimerFd};
use thiserror::Error;

use crate::message::Message;
use crate::packet::{decode_frame, encode_packet, FrameResult};
use crate::wire::{timeout_left, DEFAULT_PORT, FULL_HEADER_SIZE};

const SOCKET: Token = Token(0);
const TIMER: Token = Token(1);

const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 30_000;
const READ_CHUNK_SIZE: usize = 8192;

/// Observable connection state.
///
/// `HostLookup` from the original design is folded into `Connecting`: `mio`
/// (like `std::net`) resolves hostnames synchronously before issuing the
/// non-blocking connect, so there is no separate async resolution phase to
/// model (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No socket is open and no connect is in flight.
    Unconnected,
    /// A non-blocking connect has been issued and has not yet completed.
    Connecting,
    /// The TCP handshake completed and device registration has been sent.
    Connected,
    /// A graceful shutdown has been initiated.
    Closing,
}

/// The transport-error taxonomy from the wire, mapped off
/// [`std::io::ErrorKind`] the way the original mapped a socket toolkit's
/// own `SocketError` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The peer actively refused the connection.
    ConnectionRefused,
    /// The remote host closed the connection (EOF, reset, or a broken pipe).
    RemoteHostClosed,
    /// The server name did not resolve to any address.
    HostNotFound,
    /// The operating system denied the operation.
    AccessDenied,
    /// A system resource (memory, file descriptors, ...) was exhausted.
    ResourceExhausted,
    /// The operation timed out.
    Timeout,
    /// A general network error not covered by a more specific kind.
    Network,
    /// The platform does not support the attempted operation.
    UnsupportedOperation,
    /// None of the above; the underlying `io::ErrorKind` was not recognized.
    Unknown,
}

impl TransportErrorKind {
    fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe => Self::RemoteHostClosed,
            io::ErrorKind::NotFound => Self::HostNotFound,
            io::ErrorKind::PermissionDenied => Self::AccessDenied,
            io::ErrorKind::OutOfMemory => Self::ResourceExhausted,
            io::ErrorKind::TimedOut => Self::Timeout,
            io::ErrorKind::Unsupported => Self::UnsupportedOperation,
            io::ErrorKind::Other => Self::Network,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::ConnectionRefused => "connection refused",
            TransportErrorKind::RemoteHostClosed => "remote host closed the connection",
            TransportErrorKind::HostNotFound => "host not found",
            TransportErrorKind::AccessDenied => "access denied",
            TransportErrorKind::ResourceExhausted => "resource exhausted",
            TransportErrorKind::Timeout => "timed out",
            TransportErrorKind::Network => "network error",
            TransportErrorKind::UnsupportedOperation => "unsupported operation",
            TransportErrorKind::Unknown => "unknown error",
        };
        f.write_str(s)
    }
}

/// Errors raised directly by a [`Connection`] method, as opposed to
/// transport errors, which are surfaced through
/// [`ConnectionHandler::on_error`] and [`Connection::error`].
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Setting up the `mio` poller, timer, or socket failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Notifications delivered by the engine while it is pumped.
///
/// All methods have no-op default implementations; implement only the ones
/// you care about. Ordering guarantees: [`Self::on_state_changed`] fires
/// before [`Self::on_connected`]; [`Self::on_message_received`] fires once
/// per message enqueued into `in_queue`.
pub trait ConnectionHandler {
    /// The connection entered a new state.
    fn on_state_changed(&mut self, _state: State) {}
    /// The TCP handshake completed and registration was sent.
    fn on_connected(&mut self) {}
    /// The connection was closed, either by the peer or locally.
    fn on_disconnected(&mut self) {}
    /// A transport error occurred.
    fn on_error(&mut self, _kind: TransportErrorKind, _message: &str) {}
    /// A message was enqueued into `in_queue`.
    fn on_message_received(&mut self) {}
}

/// A [`ConnectionHandler`] that ignores every notification.
#[derive(Debug, Default)]
pub struct NullHandler;

impl ConnectionHandler for NullHandler {}

/// One DCP TCP connection: socket lifecycle, state machine, inbound queue,
/// device registration and auto-reconnect.
///
/// A `Connection` owns its socket exclusively and is not `Clone`. Multiple
/// connections may coexist in the same process and are fully independent.
pub struct Connection {
    poll: Poll,
    events: Events,
    socket: Option<TcpStream>,
    timer: TimerFd,
    timer_armed: bool,

    state: State,
    server_name: String,
    server_port: u16,
    device_name: Vec<u8>,
    auto_reconnect: bool,
    reconnect_interval: Duration,
    connection_requested: bool,

    snr_counter: u32,
    in_queue: VecDeque<Message>,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,

    last_error: Option<(TransportErrorKind, String)>,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
}

impl Connection {
    /// Creates a new, unconnected engine. Allocates the `mio::Poll` and the
    /// reconnect timer, but opens no socket.
    pub fn new() -> crate::Result<Connection> {
        let poll = Poll::new()?;
        let reconnect_interval = Duration::from_millis(DEFAULT_RECONNECT_INTERVAL_MS);

        let mut timer = TimerFd::new(ClockId::Monotonic)?;
        timer.set_timeout_interval(&reconnect_interval)?;
        poll.registry()
            .register(&mut timer, TIMER, Interest::READABLE)?;

        Ok(Connection {
            poll,
            events: Events::with_capacity(16),
            socket: None,
            timer,
            timer_armed: false,
            state: State::Unconnected,
            server_name: String::new(),
            server_port: DEFAULT_PORT,
            device_name: Vec::new(),
            auto_reconnect: false,
            reconnect_interval,
            connection_requested: false,
            snr_counter: 0,
            in_queue: VecDeque::new(),
            read_buf: Vec::new(),
            write_buf: Vec::new(),
            last_error: None,
            local_addr: None,
            peer_addr: None,
        })
    }

    // --- public operations -------------------------------------------------

    /// Records the connection parameters, marks a connect as requested, and
    /// initiates a non-blocking TCP connect.
    pub fn connect_to_server(
        &mut self,
        server_name: impl Into<String>,
        server_port: u16,
        device_name: impl AsRef<[u8]>,
        handler: &mut dyn ConnectionHandler,
    ) -> crate::Result<()> {
        self.server_name = server_name.into();
        self.server_port = server_port;
        self.device_name = truncate_device_name(device_name.as_ref());
        self.connection_requested = true;
        self.start_connect(handler)
    }

    /// Marks the connection as no longer requested and initiates a
    /// graceful close. Disarms the reconnect timer.
    pub fn disconnect_from_server(&mut self, handler: &mut dyn ConnectionHandler) {
        self.connection_requested = false;
        if self.socket.is_none() {
            self.disarm_timer();
            return;
        }
        self.set_state(State::Closing, handler);
        if let Some(socket) = self.socket.as_ref() {
            let _ = socket.shutdown(Shutdown::Both);
        }
        self.handle_disconnect(handler, None);
    }

    /// Stamps `data` with the next auto-assigned serial number and queues
    /// it for sending to `destination` with the given 16-bit flags word.
    /// Returns the message actually sent (so the caller can recover its
    /// `snr`).
    pub fn send_message(
        &mut self,
        destination: impl AsRef<[u8]>,
        data: impl Into<Vec<u8>>,
        flags: u16,
    ) -> Message {
        let snr = self.take_next_snr();
        let msg = Message::new(snr, self.device_name.clone(), destination, data, flags);
        self.queue_message(&msg);
        msg
    }

    /// Like [`Self::send_message`], but takes the DCP and user flag bytes
    /// separately.
    pub fn send_message_with_split_flags(
        &mut self,
        destination: impl AsRef<[u8]>,
        data: impl Into<Vec<u8>>,
        dcp_flags: u8,
        user_flags: u8,
    ) -> Message {
        let flags = u16::from(dcp_flags) | (u16::from(user_flags) << 8);
        self.send_message(destination, data, flags)
    }

    /// Like [`Self::send_message`], but stamps the message with an
    /// explicit serial number instead of the auto-assigned one. Does not
    /// advance the serial number counter.
    pub fn send_message_with_snr(
        &mut self,
        destination: impl AsRef<[u8]>,
        data: impl Into<Vec<u8>>,
        flags: u16,
        snr: u32,
    ) -> Message {
        let msg = Message::new(snr, self.device_name.clone(), destination, data, flags);
        self.queue_message(&msg);
        msg
    }

    /// Queues a fully-formed [`Message`] as-is: no field is stamped or
    /// rewritten, and the serial number counter is not advanced.
    pub fn send(&mut self, message: Message) -> Message {
        self.queue_message(&message);
        message
    }

    /// Dequeues and returns the oldest received message, or a null-message
    /// if `in_queue` is empty.
    pub fn read_message(&mut self) -> Message {
        self.in_queue.pop_front().unwrap_or_default()
    }

    /// Returns the number of messages currently queued for reading.
    pub fn messages_available(&self) -> usize {
        self.in_queue.len()
    }

    /// Returns the next serial number that will be auto-assigned.
    pub fn next_snr(&self) -> u32 {
        self.snr_counter
    }

    /// Overrides the next serial number that will be auto-assigned.
    pub fn set_next_snr(&mut self, snr: u32) {
        self.snr_counter = snr;
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == State::Connected
    }

    pub fn is_unconnected(&self) -> bool {
        self.state == State::Unconnected
    }

    /// Returns the kind of the most recent transport error, if any.
    pub fn error(&self) -> Option<TransportErrorKind> {
        self.last_error.as_ref().map(|(kind, _)| *kind)
    }

    /// Returns a human-readable description of the most recent transport
    /// error, or an empty string if none has occurred.
    pub fn error_string(&self) -> &str {
        self.last_error.as_ref().map_or("", |(_, msg)| msg.as_str())
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    pub fn device_name(&self) -> &[u8] {
        &self.device_name
    }

    /// Returns the remote address once connected.
    pub fn server_address(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Returns the local address once connected.
    pub fn local_address(&self) -> Option<IpAddr> {
        self.local_addr.map(|addr| addr.ip())
    }

    /// Returns the local port once connected.
    pub fn local_port(&self) -> Option<u16> {
        self.local_addr.map(|addr| addr.port())
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    pub fn set_auto_reconnect(&mut self, enabled: bool) {
        self.auto_reconnect = enabled;
    }

    pub fn reconnect_interval(&self) -> u64 {
        self.reconnect_interval.as_millis() as u64
    }

    pub fn set_reconnect_interval(&mut self, ms: u64) {
        self.reconnect_interval = Duration::from_millis(ms);
        if self.timer_armed {
            let _ = self.timer.set_timeout_interval(&self.reconnect_interval);
        }
    }

    /// Polls the event loop once, blocking for at most `timeout` (or
    /// indefinitely if `None`), and dispatches whatever events come back:
    /// socket-readable drives receive-framing, socket-writable drains the
    /// outgoing buffer (and completes a pending connect), and a timer
    /// firing while `Unconnected` retries the connection.
    pub fn pump(
        &mut self,
        timeout: Option<Duration>,
        handler: &mut dyn ConnectionHandler,
    ) -> io::Result<()> {
        self.poll.poll(&mut self.events, timeout)?;

        let mut socket_readable = false;
        let mut socket_writable = false;
        let mut socket_closed = false;
        let mut timer_fired = false;

        for event in self.events.iter() {
            match event.token() {
                SOCKET => {
                    if event.is_readable() {
                        socket_readable = true;
                    }
                    if event.is_writable() {
                        socket_writable = true;
                    }
                    if event.is_read_closed() || event.is_error() {
                        socket_closed = true;
                    }
                }
                TIMER => timer_fired = true,
                _ => {}
            }
        }

        if timer_fired {
            let _ = self.timer.read();
            if self.timer_armed && self.state == State::Unconnected {
                log::debug!(
                    "reconnect timer fired, retrying connection to {}:{}",
                    self.server_name,
                    self.server_port
                );
                self.start_connect(handler)?;
            }
        }

        if socket_writable && self.state == State::Connecting {
            self.complete_connect(handler)?;
        }

        if socket_writable {
            self.flush_write_buf(handler);
        }

        if socket_readable {
            self.recv(handler);
        }

        if socket_closed && self.socket.is_some() {
            self.handle_disconnect(
                handler,
                Some((
                    TransportErrorKind::RemoteHostClosed,
                    "remote host closed the connection".to_string(),
                )),
            );
        }

        Ok(())
    }

    /// Blocks (pumping the event loop) until [`State::Connected`] is
    /// reached or `timeout_ms` elapses. `-1` means no timeout.
    pub fn wait_for_connected(
        &mut self,
        timeout_ms: i64,
        handler: &mut dyn ConnectionHandler,
    ) -> bool {
        self.wait_until(timeout_ms, handler, |c| c.state == State::Connected)
    }

    /// Blocks until [`State::Unconnected`] is reached or `timeout_ms`
    /// elapses.
    pub fn wait_for_disconnected(
        &mut self,
        timeout_ms: i64,
        handler: &mut dyn ConnectionHandler,
    ) -> bool {
        self.wait_until(timeout_ms, handler, |c| c.state == State::Unconnected)
    }

    /// Blocks until at least one message is available to read or
    /// `timeout_ms` elapses. Pumps receive-framing each loop iteration, so
    /// buffered bytes are converted into queued messages before the
    /// condition is re-checked.
    pub fn wait_for_ready_read(
        &mut self,
        timeout_ms: i64,
        handler: &mut dyn ConnectionHandler,
    ) -> bool {
        self.wait_until(timeout_ms, handler, |c| c.messages_available() > 0)
    }

    /// Blocks until every queued outgoing byte has been handed to the
    /// transport or `timeout_ms` elapses.
    pub fn wait_for_messages_written(
        &mut self,
        timeout_ms: i64,
        handler: &mut dyn ConnectionHandler,
    ) -> bool {
        self.wait_until(timeout_ms, handler, |c| c.write_buf.is_empty())
    }

    // --- internals -----------------------------------------------------

    fn wait_until(
        &mut self,
        timeout_ms: i64,
        handler: &mut dyn ConnectionHandler,
        mut condition: impl FnMut(&Connection) -> bool,
    ) -> bool {
        let start = Instant::now();
        loop {
            if condition(self) {
                return true;
            }

            let elapsed = start.elapsed().as_millis() as i64;
            let left = timeout_left(timeout_ms, elapsed);
            let poll_timeout = if left == -1 {
                None
            } else {
                Some(Duration::from_millis(left.max(0) as u64))
            };

            if self.pump(poll_timeout, handler).is_err() {
                return false;
            }

            if condition(self) {
                return true;
            }

            if left == 0 {
                return false;
            }
        }
    }

    fn take_next_snr(&mut self) -> u32 {
        let cur = self.snr_counter;
        self.snr_counter = if cur < u32::MAX { cur + 1 } else { 1 };
        cur
    }

    fn queue_message(&mut self, msg: &Message) {
        if msg.is_null() {
            log::warn!("refusing to send a null message");
            return;
        }

        match encode_packet(msg) {
            Some(bytes) => {
                log::debug!("queuing message for send: {msg}");
                self.write_buf.extend_from_slice(&bytes);
                // `mio` is edge-triggered: the writable edge that follows
                // `complete_connect` is consumed by the registration flush,
                // and no further writable event arrives for an otherwise
                // idle, already-writable socket. Attempt the write here
                // instead of waiting for `pump` to see one.
                if self.socket.is_some() {
                    self.flush_write_buf(&mut NullHandler);
                }
            }
            None => {
                log::warn!(
                    "refusing to send oversized message ({} bytes of data)",
                    msg.data().len()
                );
            }
        }
    }

    fn start_connect(&mut self, handler: &mut dyn ConnectionHandler) -> crate::Result<()> {
        self.close_socket();
        self.disarm_timer();

        let addr = (self.server_name.as_str(), self.server_port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                ConnectionError::Io(io::Error::new(io::ErrorKind::NotFound, "no addresses found"))
            })?;

        let mut socket = TcpStream::connect(addr)?;
        self.poll
            .registry()
            .register(&mut socket, SOCKET, Interest::READABLE | Interest::WRITABLE)?;
        self.socket = Some(socket);

        self.set_state(State::Connecting, handler);
        Ok(())
    }

    fn complete_connect(&mut self, handler: &mut dyn ConnectionHandler) -> io::Result<()> {
        let pending_err = match self.socket.as_ref() {
            Some(socket) => socket.take_error()?,
            None => return Ok(()),
        };

        if let Some(err) = pending_err {
            self.fail(handler, &err);
            return Ok(());
        }

        if let Some(socket) = self.socket.as_ref() {
            self.local_addr = socket.local_addr().ok();
            self.peer_addr = socket.peer_addr().ok();
        }

        self.set_state(State::Connected, handler);
        self.register_device_name();
        handler.on_connected();
        Ok(())
    }

    fn register_device_name(&mut self) {
        let snr = self.take_next_snr();
        let msg = Message::new(snr, self.device_name.clone(), Vec::new(), b"HELO".to_vec(), 0);
        log::debug!("registering device name: {msg}");
        self.queue_message(&msg);
    }

    fn recv(&mut self, handler: &mut dyn ConnectionHandler) {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let socket = match self.socket.as_mut() {
                Some(socket) => socket,
                None => return,
            };

            match socket.read(&mut chunk) {
                Ok(0) => {
                    self.handle_disconnect(
                        handler,
                        Some((
                            TransportErrorKind::RemoteHostClosed,
                            "remote host closed the connection".to_string(),
                        )),
                    );
                    return;
                }
                Ok(n) => {
                    self.read_buf.extend_from_slice(&chunk[..n]);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.fail(handler, &e);
                    return;
                }
            }
        }

        self.drain_frames(handler);
    }

    fn drain_frames(&mut self, handler: &mut dyn ConnectionHandler) {
        loop {
            if self.read_buf.len() < FULL_HEADER_SIZE {
                break;
            }

            match decode_frame(&self.read_buf) {
                FrameResult::Incomplete => break,
                FrameResult::Invalid => {
                    log::warn!("closing connection after an invalid frame");
                    self.handle_disconnect(
                        handler,
                        Some((TransportErrorKind::Network, "protocol framing error".to_string())),
                    );
                    break;
                }
                FrameResult::Frame { message, consumed } => {
                    self.read_buf.drain(..consumed);
                    if message.is_null() {
                        log::warn!("dropping frame with an undecodable message body");
                    } else {
                        log::debug!("received message: {message}");
                        self.in_queue.push_back(message);
                        handler.on_message_received();
                    }
                }
            }
        }
    }

    fn flush_write_buf(&mut self, handler: &mut dyn ConnectionHandler) {
        loop {
            if self.write_buf.is_empty() {
                return;
            }

            let socket = match self.socket.as_mut() {
                Some(socket) => socket,
                None => return,
            };

            match socket.write(&self.write_buf) {
                Ok(0) => return,
                Ok(n) => {
                    self.write_buf.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.fail(handler, &e);
                    return;
                }
            }
        }
    }

    fn fail(&mut self, handler: &mut dyn ConnectionHandler, err: &io::Error) {
        let kind = TransportErrorKind::from_io(err);
        self.handle_disconnect(handler, Some((kind, err.to_string())));
    }

    fn set_state(&mut self, state: State, handler: &mut dyn ConnectionHandler) {
        if self.state != state {
            self.state = state;
            handler.on_state_changed(state);
        }
    }

    fn close_socket(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = self.poll.registry().deregister(&mut socket);
        }
        self.read_buf.clear();
        self.write_buf.clear();
    }

    fn handle_disconnect(
        &mut self,
        handler: &mut dyn ConnectionHandler,
        error: Option<(TransportErrorKind, String)>,
    ) {
        let was_connected = matches!(self.state, State::Connected | State::Closing);
        self.close_socket();

        if let Some((kind, message)) = error {
            log::warn!("transport error: {message}");
            self.last_error = Some((kind, message.clone()));
            handler.on_error(kind, &message);
        }

        self.set_state(State::Unconnected, handler);
        if was_connected {
            handler.on_disconnected();
        }

        if self.auto_reconnect && self.connection_requested {
            self.arm_timer();
        } else {
            self.disarm_timer();
        }
    }

    fn arm_timer(&mut self) {
        if !self.timer_armed {
            let _ = self.timer.set_timeout_interval(&self.reconnect_interval);
            self.timer_armed = true;
        }
    }

    fn disarm_timer(&mut self) {
        self.timer_armed = false;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close_socket();
    }
}

fn truncate_device_name(name: &[u8]) -> Vec<u8> {
    crate::wire::strip_trailing_nul(&name[..name.len().min(16)]).to_vec()
}
