//! Connection transport.
//!
//! A [`Transport`] owns one TCP connection. The socket is driven by a
//! dedicated thread running a single-threaded tokio runtime: it writes queued
//! request frames, decodes inbound frames and dispatches each one either to
//! the push handler (frames whose `method` names a server push) or to the
//! answer queue that blocked callers wait on.
//!
//! Only one call can be in flight at a time across the whole process: every
//! transport locks the same call gate unless configured with its own. The
//! next frame that is not a push is taken to be the answer to the call.

use crate::error::ClientError;
use crate::gate::Gate;
use bytes::BytesMut;
use htsp_protocol::{Decoder, Encoder, Message, PushMethod};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::net::{SocketAddr, TcpStream as StdTcpStream, ToSocketAddrs};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default time a call waits for its answer.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Returns the call gate shared by every transport in the process.
pub fn process_gate() -> Arc<Gate> {
    static CALL_GATE: OnceLock<Arc<Gate>> = OnceLock::new();
    CALL_GATE.get_or_init(|| Arc::new(Gate::new())).clone()
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Time a call waits for its answer.
    pub call_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
    /// Gate serializing calls. `None` uses [`process_gate`].
    pub gate: Option<Arc<Gate>>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            gate: None,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    /// Serializes calls through `gate` instead of the process-wide one.
    pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }
}

/// Transport lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Closed,
    Connecting,
    Open,
    /// The socket loop stopped on an I/O or protocol error.
    ErrorClosed,
}

/// Receives server push messages on the transport thread.
///
/// The `method` field has already been stripped from `message`.
pub trait PushHandler: Send + Sync + 'static {
    fn handle_push(&self, method: PushMethod, message: Message);
}

impl<F> PushHandler for F
where
    F: Fn(PushMethod, Message) + Send + Sync + 'static,
{
    fn handle_push(&self, method: PushMethod, message: Message) {
        self(method, message)
    }
}

impl<T: PushHandler + ?Sized> PushHandler for Arc<T> {
    fn handle_push(&self, method: PushMethod, message: Message) {
        (**self).handle_push(method, message)
    }
}

/// State shared between callers and the socket thread.
struct Shared {
    state: Mutex<TransportState>,
    answers: Mutex<VecDeque<Message>>,
    answer_ready: Condvar,
    push_handler: Box<dyn PushHandler>,
}

impl Shared {
    fn set_state(&self, state: TransportState) {
        *self.state.lock() = state;
    }

    /// Routes one decoded frame. Runs on the socket thread only.
    fn dispatch(&self, mut message: Message) {
        if let Some(method) = message.method().and_then(PushMethod::from_name) {
            message.remove(Message::METHOD);
            tracing::debug!("push {} ({} fields)", method, message.len());
            self.push_handler.handle_push(method, message);
            return;
        }

        tracing::debug!("answer received ({} fields)", message.len());
        self.answers.lock().push_back(message);
        self.answer_ready.notify_one();
    }
}

/// A connection to an HTSP server.
pub struct Transport {
    config: TransportConfig,
    peer: SocketAddr,
    shared: Arc<Shared>,
    /// Serializes send+wait across threads.
    gate: Arc<Gate>,
    /// Request frames for the socket thread to write.
    outbound: Mutex<Option<mpsc::UnboundedSender<BytesMut>>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    io_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Transport {
    /// Connects to `host:port` and starts the socket thread.
    pub fn open(
        host: &str,
        port: u16,
        config: TransportConfig,
        push_handler: impl PushHandler,
    ) -> Result<Self, ClientError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(TransportState::Connecting),
            answers: Mutex::new(VecDeque::new()),
            answer_ready: Condvar::new(),
            push_handler: Box::new(push_handler),
        });

        let stream = connect(host, port, config.connect_timeout)?;
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true).ok();
        stream.set_nonblocking(true)?;
        tracing::debug!("TCP connected to {}", peer);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        shared.set_state(TransportState::Open);
        let io_thread = {
            let shared = shared.clone();
            let read_buffer_size = config.read_buffer_size;
            thread::Builder::new()
                .name("htsp-io".to_string())
                .spawn(move || {
                    run_io_thread(stream, shared, outbound_rx, shutdown_rx, read_buffer_size)
                })
        }
        .inspect_err(|_| shared.set_state(TransportState::ErrorClosed))?;

        let gate = config.gate.clone().unwrap_or_else(process_gate);
        Ok(Self {
            config,
            peer,
            shared,
            gate,
            outbound: Mutex::new(Some(outbound_tx)),
            shutdown: Mutex::new(Some(shutdown_tx)),
            io_thread: Mutex::new(Some(io_thread)),
        })
    }

    /// Sends `message` and blocks until the next answer frame arrives.
    ///
    /// Fails with [`ClientError::Timeout`] if nothing arrives within the call
    /// timeout. The connection stays usable after a timeout, but a late
    /// answer will be handed to whichever call comes next.
    pub fn call(&self, message: &Message) -> Result<Message, ClientError> {
        let _guard = self.gate.lock();

        match self.state() {
            TransportState::Open => {}
            TransportState::ErrorClosed => return Err(ClientError::ConnectionClosed),
            TransportState::Closed | TransportState::Connecting => {
                return Err(ClientError::NotConnected)
            }
        }

        let frame = Encoder::encode_message(message)?;
        tracing::debug!(
            "sending {} ({} bytes)",
            message.method().unwrap_or("<no method>"),
            frame.len()
        );
        self.send(frame)?;
        self.wait_for_answer()
    }

    fn send(&self, frame: BytesMut) -> Result<(), ClientError> {
        let outbound = self.outbound.lock();
        let tx = outbound.as_ref().ok_or(ClientError::NotConnected)?;
        tx.send(frame).map_err(|_| ClientError::ConnectionClosed)
    }

    fn wait_for_answer(&self) -> Result<Message, ClientError> {
        let timeout = self.config.call_timeout;
        let deadline = Instant::now() + timeout;
        let mut answers = self.shared.answers.lock();
        loop {
            if let Some(answer) = answers.pop_front() {
                return Ok(answer);
            }
            if self
                .shared
                .answer_ready
                .wait_until(&mut answers, deadline)
                .timed_out()
            {
                return answers.pop_front().ok_or_else(|| {
                    tracing::debug!("no answer within {:?}", timeout);
                    ClientError::Timeout(timeout)
                });
            }
        }
    }

    /// Returns the transport state.
    pub fn state(&self) -> TransportState {
        *self.shared.state.lock()
    }

    /// Returns whether the connection is open.
    pub fn is_open(&self) -> bool {
        self.state() == TransportState::Open
    }

    /// Returns the remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Returns the number of answers queued with no caller to take them.
    pub fn queued_answers(&self) -> usize {
        self.shared.answers.lock().len()
    }

    /// Stops the socket thread and releases the connection.
    ///
    /// Idempotent. A caller already blocked in [`call`](Self::call) is not
    /// woken; it runs into its own timeout.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            if matches!(*state, TransportState::Open | TransportState::Connecting) {
                *state = TransportState::Closed;
            }
        }

        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(());
        }
        self.outbound.lock().take();

        if let Some(handle) = self.io_thread.lock().take() {
            // A push handler closing its own transport cannot join itself.
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::warn!("socket thread panicked");
            }
            tracing::debug!("connection to {} closed", self.peer);
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

fn connect(host: &str, port: u16, timeout: Duration) -> Result<StdTcpStream, ClientError> {
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
    if addrs.is_empty() {
        return Err(ClientError::Resolve(format!("{}:{}", host, port)));
    }

    let mut last_err = None;
    for addr in addrs {
        tracing::debug!("connecting to {}...", addr);
        match StdTcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!("connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.map_or(ClientError::NotConnected, ClientError::Io))
}

fn run_io_thread(
    stream: StdTcpStream,
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedReceiver<BytesMut>,
    shutdown: oneshot::Receiver<()>,
    read_buffer_size: usize,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("failed to start socket runtime: {}", e);
            shared.set_state(TransportState::ErrorClosed);
            return;
        }
    };

    let _panic_guard = ErrorOnPanic(&*shared);
    let result = runtime.block_on(io_loop(
        stream,
        &shared,
        outbound,
        shutdown,
        read_buffer_size,
    ));

    match result {
        Ok(()) => {
            tracing::debug!("socket loop stopped");
            shared.set_state(TransportState::Closed);
        }
        Err(e) => {
            tracing::warn!("connection lost: {}", e);
            shared.set_state(TransportState::ErrorClosed);
        }
    }
}

/// Marks the connection failed if the socket thread unwinds.
struct ErrorOnPanic<'a>(&'a Shared);

impl Drop for ErrorOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::error!("socket thread panicked");
            self.0.set_state(TransportState::ErrorClosed);
        }
    }
}

async fn io_loop(
    stream: StdTcpStream,
    shared: &Shared,
    mut outbound: mpsc::UnboundedReceiver<BytesMut>,
    mut shutdown: oneshot::Receiver<()>,
    read_buffer_size: usize,
) -> Result<(), ClientError> {
    let stream = TcpStream::from_std(stream)?;
    let (mut reader, mut writer) = stream.into_split();
    let mut decoder = Decoder::new();
    let mut buf = vec![0u8; read_buffer_size];

    loop {
        tokio::select! {
            _ = &mut shutdown => return Ok(()),

            frame = outbound.recv() => match frame {
                Some(frame) => writer.write_all(&frame).await?,
                None => return Ok(()),
            },

            n = reader.read(&mut buf) => {
                let n = n?;
                if n == 0 {
                    return Err(ClientError::ConnectionClosed);
                }
                decoder.extend(&buf[..n]);
                while let Some(message) = decoder.decode_message()? {
                    shared.dispatch(message);
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Loopback fake server helpers.

    use bytes::BytesMut;
    use htsp_protocol::field::encode_field;
    use htsp_protocol::{Encoder, Message, Value};
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};

    pub fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    pub fn read_message(stream: &mut TcpStream) -> Message {
        let mut prefix = [0u8; 4];
        stream.read_exact(&mut prefix).unwrap();
        let mut frame = prefix.to_vec();
        frame.resize(4 + u32::from_be_bytes(prefix) as usize, 0);
        stream.read_exact(&mut frame[4..]).unwrap();
        Encoder::decode_frame(&frame).unwrap()
    }

    pub fn write_message(stream: &mut TcpStream, message: &Message) {
        let frame = Encoder::encode_message(message).unwrap();
        stream.write_all(&frame).unwrap();
    }

    pub fn push(method: &str, message: Message) -> Message {
        message.with(Message::METHOD, method)
    }

    /// Builds a raw list field of strings, which the encoder refuses to write.
    pub fn string_list_field(name: &str, items: &[&str]) -> Vec<u8> {
        let mut elements = BytesMut::new();
        for item in items {
            encode_field(&mut elements, "", &Value::from(*item)).unwrap();
        }
        let mut out = vec![5, name.len() as u8];
        out.extend_from_slice(&(elements.len() as u32).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&elements);
        out
    }

    /// Writes `message` with extra pre-encoded fields appended to its body.
    pub fn write_message_with_raw(stream: &mut TcpStream, message: &Message, raw: &[u8]) {
        let mut frame = Encoder::encode_message(message).unwrap().to_vec();
        frame.extend_from_slice(raw);
        let body_len = (frame.len() - 4) as u32;
        frame[..4].copy_from_slice(&body_len.to_be_bytes());
        stream.write_all(&frame).unwrap();
    }
}
