use crate::config::ClientOptions;
use crate::error::{KefError, Result};
use crate::poll::{PollSequencer, SingleFlight, INTER_QUERY_DELAY};
use crate::protocol::{self, Command, InboundFrame};
use crate::state::DeviceState;
use crate::subscription::KefEvent;
use crate::timer::{Fired, Scheduler, TimerKind};
use crate::types::{ConnectionState, DeviceSnapshot};
use futures_util::future::BoxFuture;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Wait before re-checking a speaker that reported it is powering on
const SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// The speaker never reports power-off by itself; its source is re-read this
/// long after an off command
const POST_OFF_DELAY: Duration = Duration::from_secs(5);

const READ_BUFFER_SIZE: usize = 64;

/// Opens the byte stream a session talks over
///
/// [`TcpConnector`] is used in production; tests substitute in-memory streams.
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    fn connect(&self) -> BoxFuture<'static, io::Result<Self::Stream>>;
}

/// Plain TCP connection to the speaker
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self) -> BoxFuture<'static, io::Result<TcpStream>> {
        let address = self.address.clone();
        Box::pin(async move {
            let stream = TcpStream::connect(&address).await?;
            // Frames are a handful of bytes; don't let Nagle hold them back.
            let _ = stream.set_nodelay(true);
            Ok(stream)
        })
    }
}

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

/// Request from a client handle to its session
pub(crate) enum Request {
    Connect,
    End,
    CheckState(Reply<()>),
    Send(Command, Reply<()>),
    TurnOff(Reply<()>),
    SetVolume(i32, Reply<()>),
    ChangeVolume(i32, Reply<()>),
    MuteToggle(Reply<()>),
    Snapshot(oneshot::Sender<DeviceSnapshot>),
}

/// Socket activity, tagged with the connection generation it belongs to
enum SocketEvent<S> {
    Connected { generation: u64, stream: S },
    ConnectFailed { generation: u64, error: io::Error },
    Data { generation: u64, bytes: Vec<u8> },
    Closed { generation: u64, error: Option<io::Error> },
}

impl<S> SocketEvent<S> {
    fn generation(&self) -> u64 {
        match self {
            SocketEvent::Connected { generation, .. }
            | SocketEvent::ConnectFailed { generation, .. }
            | SocketEvent::Data { generation, .. }
            | SocketEvent::Closed { generation, .. } => *generation,
        }
    }
}

/// Start a session task and return the channel that drives it
pub(crate) fn spawn<C: Connector>(
    connector: C,
    options: ClientOptions,
    events: broadcast::Sender<KefEvent>,
) -> mpsc::UnboundedSender<Request> {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (socket_tx, socket_rx) = mpsc::unbounded_channel();
    let (timer_tx, timer_rx) = mpsc::unbounded_channel();

    let session = Session {
        connector,
        device: DeviceState::new(options.emit_unchanged_state),
        retry_enabled: options.retry_enabled,
        options,
        state: ConnectionState::Disconnected,
        poll: PollSequencer::default(),
        reconnect: SingleFlight::default(),
        generation: 0,
        writer: None,
        io_task: None,
        scheduler: Scheduler::new(timer_tx),
        events,
        socket_tx,
    };
    tokio::spawn(session.run(request_rx, socket_rx, timer_rx));

    request_tx
}

/// Owns the socket and every piece of mutable client state
///
/// All work happens on this one task, so the single-flight guards need no
/// locking: they are checked and set before anything is awaited.
struct Session<C: Connector> {
    connector: C,
    options: ClientOptions,
    state: ConnectionState,
    device: DeviceState,
    poll: PollSequencer,
    reconnect: SingleFlight,
    retry_enabled: bool,
    /// Bumped whenever the current socket (or attempt) is abandoned
    generation: u64,
    writer: Option<WriteHalf<C::Stream>>,
    /// Connect attempt or read loop of the current generation
    io_task: Option<JoinHandle<()>>,
    scheduler: Scheduler,
    events: broadcast::Sender<KefEvent>,
    socket_tx: mpsc::UnboundedSender<SocketEvent<C::Stream>>,
}

impl<C: Connector> Session<C> {
    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut socket_rx: mpsc::UnboundedReceiver<SocketEvent<C::Stream>>,
        mut timer_rx: mpsc::UnboundedReceiver<Fired>,
    ) {
        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => break,
                },
                Some(event) = socket_rx.recv() => self.handle_socket(event).await,
                Some(fired) = timer_rx.recv() => self.handle_timer(fired).await,
            }
        }

        tracing::debug!("Client dropped, stopping session");
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
        self.teardown();
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Connect => self.connect(),
            Request::End => self.end().await,
            Request::CheckState(reply) => self.check_state(Some(reply)).await,
            Request::Send(command, reply) => {
                let _ = reply.send(self.send(command).await);
            }
            Request::TurnOff(reply) => {
                let _ = reply.send(self.turn_off().await);
            }
            Request::SetVolume(value, reply) => {
                let _ = reply.send(self.set_volume(value).await);
            }
            Request::ChangeVolume(delta, reply) => {
                let _ = reply.send(self.change_volume(delta).await);
            }
            Request::MuteToggle(reply) => {
                let _ = reply.send(self.mute_toggle().await);
            }
            Request::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn handle_socket(&mut self, event: SocketEvent<C::Stream>) {
        if event.generation() != self.generation {
            tracing::trace!("Ignoring socket event from an abandoned connection");
            return;
        }

        match event {
            SocketEvent::Connected { stream, .. } => self.on_connected(stream).await,
            SocketEvent::ConnectFailed { error, .. } => {
                tracing::warn!("Failed to connect to {}: {}", self.options.address(), error);
                self.on_closed(Some(error));
            }
            SocketEvent::Data { bytes, .. } => self.on_data(bytes).await,
            SocketEvent::Closed { error, .. } => self.on_closed(error),
        }
    }

    async fn handle_timer(&mut self, fired: Fired) {
        if !self.scheduler.is_current(&fired) {
            tracing::trace!("Ignoring stale {:?} timer", fired.kind);
            return;
        }

        match fired.kind {
            TimerKind::Reconnect => {
                self.reconnect.complete();
                self.connect();
            }
            TimerKind::PollSecondStep => {
                if !self.poll.second_step() {
                    return;
                }
                let result = self.send(Command::GetSource).await;
                self.poll.finish(result);
            }
            TimerKind::SettleRecheck | TimerKind::PeriodicPoll => self.check_state(None).await,
            TimerKind::PostOffQuery => {
                if let Err(e) = self.send(Command::GetSource).await {
                    tracing::debug!("Post power-off source query not sent: {}", e);
                }
            }
        }
    }

    // ========== Lifecycle ==========

    fn connect(&mut self) {
        self.retry_enabled = true;
        self.reconnect.finish();

        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            tracing::debug!("Already {}, ignoring connect", self.state);
            return;
        }

        // A pending reconnect is superseded by this attempt.
        self.scheduler.cancel_all();
        self.generation += 1;
        let generation = self.generation;

        tracing::info!("Connecting to {}", self.options.address());
        self.set_state(ConnectionState::Connecting, None);

        let attempt = self.connector.connect();
        let socket_tx = self.socket_tx.clone();
        self.io_task = Some(tokio::spawn(async move {
            let event = match attempt.await {
                Ok(stream) => SocketEvent::Connected { generation, stream },
                Err(error) => SocketEvent::ConnectFailed { generation, error },
            };
            let _ = socket_tx.send(event);
        }));
    }

    async fn on_connected(&mut self, stream: C::Stream) {
        let (reader, writer) = tokio::io::split(stream);
        self.writer = Some(writer);
        self.io_task = Some(tokio::spawn(read_loop(
            reader,
            self.generation,
            self.socket_tx.clone(),
        )));

        self.device.reset();
        tracing::info!("Connected to {}", self.options.address());
        self.set_state(ConnectionState::Connected, None);

        match self.options.check_state_interval() {
            Some(period) => self.scheduler.repeat(TimerKind::PeriodicPoll, period),
            None => self.check_state(None).await,
        }
    }

    fn on_closed(&mut self, error: Option<io::Error>) {
        let cause = error.as_ref().map(|e| e.to_string());
        if let Some(error) = error {
            tracing::warn!("Socket error: {}", error);
            self.emit(KefEvent::TransportError(Arc::new(error)));
        }

        self.teardown();
        tracing::info!("Connection to {} closed", self.options.address());
        self.set_state(ConnectionState::Closed, cause);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if !self.retry_enabled {
            return;
        }
        if !self.reconnect.try_begin() {
            tracing::debug!("Reconnect already scheduled");
            return;
        }
        let delay = self.options.retry_interval();
        tracing::info!("Reconnecting in {:?}", delay);
        self.scheduler.schedule(TimerKind::Reconnect, delay);
    }

    /// Close for good: no reconnect follows until `connect` is called again
    async fn end(&mut self) {
        self.retry_enabled = false;
        self.reconnect.finish();

        match self.state {
            ConnectionState::Connected | ConnectionState::Connecting => {
                if let Some(mut writer) = self.writer.take() {
                    let _ = writer.shutdown().await;
                }
                self.teardown();
                self.set_state(
                    ConnectionState::Closed,
                    Some("connection ended by client".to_string()),
                );
                self.set_state(ConnectionState::Disconnected, None);
            }
            ConnectionState::Closed => {
                self.scheduler.cancel_all();
                self.set_state(ConnectionState::Disconnected, None);
            }
            ConnectionState::Disconnected => {}
        }
    }

    /// Drop the current socket and everything scheduled against it
    fn teardown(&mut self) {
        self.generation += 1;
        self.writer = None;
        if let Some(task) = self.io_task.take() {
            task.abort();
        }
        self.scheduler.cancel_all();
        self.poll.abort();
    }

    fn set_state(&mut self, state: ConnectionState, cause: Option<String>) {
        self.state = state;
        tracing::debug!(%state, "Connection state changed");
        self.emit(KefEvent::Lifecycle { state, cause });
    }

    fn emit(&self, event: KefEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    fn snapshot(&self) -> DeviceSnapshot {
        self.device.snapshot(self.state)
    }

    // ========== Inbound ==========

    async fn on_data(&mut self, bytes: Vec<u8>) {
        tracing::debug!("Received: {:02x?}", bytes);

        for data in protocol::split_frames(&bytes) {
            match protocol::decode(data) {
                Ok(frame) => self.on_frame(frame).await,
                Err(e) => tracing::warn!("Unparsed data {:02x?}: {}", data, e),
            }
        }
    }

    async fn on_frame(&mut self, frame: InboundFrame) {
        if frame == InboundFrame::Ack {
            self.check_state(None).await;
            return;
        }

        let applied = self.device.apply(&frame);
        if applied.needs_settle_recheck {
            tracing::debug!("Speaker is powering on, re-checking in {:?}", SETTLE_DELAY);
            self.scheduler.schedule(TimerKind::SettleRecheck, SETTLE_DELAY);
        }
        if applied.dirty {
            self.emit(KefEvent::State(self.snapshot()));
        }
    }

    // ========== Commands ==========

    /// Start the volume-then-source query. Refusals are reported immediately.
    async fn check_state(&mut self, reply: Option<Reply<()>>) {
        if self.state != ConnectionState::Connected {
            refuse(reply, KefError::NotConnected);
            return;
        }
        if let Err(waiter) = self.poll.begin(reply) {
            tracing::debug!(phase = ?self.poll.phase(), "State check already in flight, ignoring");
            refuse(waiter, KefError::PollInProgress);
            return;
        }

        match self.send(Command::GetVolume).await {
            Ok(()) => self
                .scheduler
                .schedule(TimerKind::PollSecondStep, INTER_QUERY_DELAY),
            Err(e) => self.poll.finish(Err(e)),
        }
    }

    /// Write a frame. Success means flushed to the socket, not applied.
    /// A failed write closes the connection.
    async fn send(&mut self, command: Command) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(KefError::NotConnected);
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(KefError::NotConnected);
        };

        let frame = command.encode();
        tracing::debug!("Sending {:?}: {:02x?}", command, frame);
        let written = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            tracing::error!("Failed to send {:?}: {}", command, e);
            let reported = io::Error::new(e.kind(), e.to_string());
            // A socket that can't be written is closed, whatever the read half says.
            self.on_closed(Some(e));
            return Err(reported.into());
        }
        Ok(())
    }

    async fn turn_off(&mut self) -> Result<()> {
        self.send(Command::Off).await?;
        self.scheduler.schedule(TimerKind::PostOffQuery, POST_OFF_DELAY);
        Ok(())
    }

    async fn set_volume(&mut self, value: i32) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(KefError::NotConnected);
        }
        let command = protocol::set_volume(value, self.options.max_volume)?;
        self.send(command).await
    }

    async fn change_volume(&mut self, delta: i32) -> Result<()> {
        let volume = self.device.volume().ok_or(KefError::UnknownVolume)?;
        let value = i32::from(volume)
            .checked_add(delta)
            .ok_or(KefError::VolumeOutOfRange {
                value: i32::MAX,
                max_volume: self.options.max_volume,
            })?;
        self.set_volume(value).await
    }

    async fn mute_toggle(&mut self) -> Result<()> {
        let (Some(muted), Some(volume)) = (self.device.muted(), self.device.volume()) else {
            return Err(KefError::UnknownMuteState);
        };
        let volume = i32::from(volume);
        if muted {
            self.set_volume(volume).await
        } else {
            self.set_volume(volume + i32::from(protocol::MUTE_FLAG)).await
        }
    }
}

fn refuse(reply: Option<Reply<()>>, error: KefError) {
    match reply {
        Some(reply) => {
            let _ = reply.send(Err(error));
        }
        None => tracing::debug!("State check skipped: {}", error),
    }
}

/// Forward everything read from the socket to the session
async fn read_loop<S>(
    mut reader: ReadHalf<S>,
    generation: u64,
    socket_tx: mpsc::UnboundedSender<SocketEvent<S>>,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        let event = match reader.read(&mut buf).await {
            Ok(0) => SocketEvent::Closed {
                generation,
                error: None,
            },
            Ok(n) => SocketEvent::Data {
                generation,
                bytes: buf[..n].to_vec(),
            },
            Err(error) => SocketEvent::Closed {
                generation,
                error: Some(error),
            },
        };
        let done = matches!(event, SocketEvent::Closed { .. });
        if socket_tx.send(event).is_err() || done {
            break;
        }
    }
}
