use crate::config::ClientOptions;
use crate::connection::{self, Connector, Reply, Request, TcpConnector};
use crate::error::{KefError, Result};
use crate::protocol::Command;
use crate::subscription::{EventReceiver, KefEvent};
use crate::types::{ConnectionState, DeviceSnapshot, Source};
use tokio::sync::{broadcast, mpsc, oneshot};

/// Broadcast channel capacity for event subscribers
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Client for a KEF wireless speaker
///
/// The client keeps a persistent TCP connection to the speaker, reconnecting
/// after every close until [`KefClient::end`] is called, and publishes
/// lifecycle and state events to subscribers.
///
/// Command methods resolve once the frame has been flushed to the socket. The
/// speaker's reaction arrives later as a [`KefEvent::State`].
///
/// Dropping the client stops its background session.
pub struct KefClient {
    requests: mpsc::UnboundedSender<Request>,
    events: broadcast::Sender<KefEvent>,
    options: ClientOptions,
}

impl KefClient {
    /// Create a client talking TCP to `options.host:options.port`
    ///
    /// Must be called from within a Tokio runtime. With
    /// `connect_on_construction` set, the first connection attempt starts
    /// immediately; turn it off and call [`KefClient::connect`] after
    /// subscribing to observe every lifecycle event.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use kef_wireless::{ClientOptions, KefClient, KefEvent, Source};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = KefClient::new(
    ///         ClientOptions::new("192.168.1.40").with_connect_on_construction(false),
    ///     )?;
    ///     let mut events = client.subscribe();
    ///     client.connect()?;
    ///
    ///     while let Ok(event) = events.recv().await {
    ///         if let KefEvent::State(state) = event {
    ///             println!("volume {:?}, source {:?}", state.volume, state.source);
    ///             client.turn_on_or_switch_source(Source::Aux).await?;
    ///             break;
    ///         }
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub fn new(options: ClientOptions) -> Result<Self> {
        let connector = TcpConnector::new(options.address());
        Self::with_connector(options, connector)
    }

    /// Create a client over a custom transport
    pub fn with_connector<C: Connector>(options: ClientOptions, connector: C) -> Result<Self> {
        options.validate()?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let requests = connection::spawn(connector, options.clone(), events.clone());
        let client = Self {
            requests,
            events,
            options,
        };

        if client.options.connect_on_construction {
            client.connect()?;
        }
        Ok(client)
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Subscribe to lifecycle, transport error and state events
    ///
    /// Multiple subscriptions can be active simultaneously.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.events.subscribe())
    }

    /// Connect and keep reconnecting after every close
    pub fn connect(&self) -> Result<()> {
        self.submit(Request::Connect)
    }

    /// Close the connection and stop reconnecting
    pub fn end(&self) -> Result<()> {
        self.submit(Request::End)
    }

    /// Query volume, then source 300ms later
    ///
    /// Resolves once both queries are written. Fails straight away with
    /// [`KefError::PollInProgress`] if a check is already running.
    pub async fn check_state(&self) -> Result<()> {
        self.call(Request::CheckState).await
    }

    /// Switch input, powering the speaker on if needed
    pub async fn turn_on_or_switch_source(&self, source: Source) -> Result<()> {
        self.call(|reply| Request::Send(Command::Select(source), reply))
            .await
    }

    /// Put the speaker into standby
    ///
    /// The source is re-queried five seconds later so the off state shows up
    /// as a state event.
    pub async fn turn_off(&self) -> Result<()> {
        self.call(Request::TurnOff).await
    }

    /// Set the raw volume value
    ///
    /// `0..=max_volume` sets an unmuted level; `128 + level` sets the level
    /// muted. Values between `max_volume` and 128 are rejected.
    pub async fn set_volume(&self, value: i32) -> Result<()> {
        self.call(|reply| Request::SetVolume(value, reply)).await
    }

    /// Change volume relative to the last reported level
    pub async fn change_volume(&self, delta: i32) -> Result<()> {
        self.call(|reply| Request::ChangeVolume(delta, reply)).await
    }

    /// Flip mute, keeping the last reported level
    pub async fn mute_toggle(&self) -> Result<()> {
        self.call(Request::MuteToggle).await
    }

    pub async fn get_volume(&self) -> Result<()> {
        self.call(|reply| Request::Send(Command::GetVolume, reply))
            .await
    }

    pub async fn get_source(&self) -> Result<()> {
        self.call(|reply| Request::Send(Command::GetSource, reply))
            .await
    }

    /// Current view of the speaker
    pub async fn snapshot(&self) -> Result<DeviceSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.submit(Request::Snapshot(tx))?;
        rx.await.map_err(|_| KefError::ConnectionClosed)
    }

    pub async fn connection_state(&self) -> Result<ConnectionState> {
        Ok(self.snapshot().await?.connection_state)
    }

    async fn call(&self, request: impl FnOnce(Reply<()>) -> Request) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.submit(request(tx))?;
        rx.await.map_err(|_| KefError::ConnectionClosed)?
    }

    fn submit(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| KefError::ConnectionClosed)
    }
}
