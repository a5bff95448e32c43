//! Broker connection lifecycle with a statum state machine.
//!
//! One link per process: `spawn` starts a tokio task that walks the
//! machine through its states and then serializes all vehicle-state
//! mutation inside a single select loop.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ──► Connecting ──► Connected ──► Subscribed ──► (loop)
//!                      ▲                                          │
//!                      └──── transport error / auto-reconnect ────┘
//! ```
//!
//! Transport errors never escape the loop; rumqttc reconnects on the
//! next poll and the observable [`LinkStatus`] reports the gap. Shutdown
//! is reachable from any state and terminal.

use std::fmt;
use std::time::Duration;

use chrono::{Local, Utc};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish, QoS};
use statum::{machine, state};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::codec::{self, Command};
use super::command::{CommandPublisher, OutboundCommand};
use super::error::TelemetryError;
use crate::config::{BrokerConfig, TopicConfig};
use crate::state::{StateStore, VehicleState};

/// Pause between poll attempts after a transport error. rumqttc retries
/// the connection itself; this only keeps the loop from spinning.
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// Request-channel capacity between client handle and event loop.
const CLIENT_CAPACITY: usize = 100;

/// Observable connection state, mirrored into [`LinkStatus`].
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Subscribed => write!(f, "subscribed"),
        }
    }
}

/// Link health as seen from outside the task.
#[derive(Clone, Debug, Default)]
pub struct LinkStatus {
    pub connection_state: ConnectionState,
    pub last_error: Option<String>,
    pub messages_received: usize,
    pub messages_sent: usize,
    pub last_activity: Option<chrono::DateTime<Local>>,
}

/// Lifecycle states for the telemetry link using statum
#[state]
#[derive(Debug, Clone)]
pub enum TelemetryLinkState {
    Disconnected, // No client yet, configuration only
    Connecting,   // Client built, waiting for the broker handshake
    Connected,    // Handshake acknowledged
    Subscribed,   // Telemetry subscription issued, main loop may run
}

/// Telemetry link with compile-time state safety via statum
#[machine]
pub struct TelemetryLink<S: TelemetryLinkState> {
    broker: BrokerConfig,
    topics: TopicConfig,
    client: Option<AsyncClient>,
    events: Option<EventLoop>,
    store: StateStore,
    commands: mpsc::Receiver<OutboundCommand>,
    status: watch::Sender<LinkStatus>,
}

impl<S: TelemetryLinkState> TelemetryLink<S> {
    fn set_state(&self, state: ConnectionState) {
        self.status
            .send_modify(|status| status.connection_state = state);
    }

    fn record_error(&self, message: &str) {
        self.status
            .send_modify(|status| status.last_error = Some(message.to_string()));
    }
}

impl TelemetryLink<Disconnected> {
    pub fn create(
        broker: BrokerConfig,
        topics: TopicConfig,
        store: StateStore,
        commands: mpsc::Receiver<OutboundCommand>,
        status: watch::Sender<LinkStatus>,
    ) -> Self {
        Self::new(
            broker, topics, None, // client
            None, // events
            store, commands, status,
        )
    }

    /// Builds the MQTT client and transitions to Connecting. The actual
    /// network handshake happens once the event loop is polled.
    pub fn connect(mut self) -> TelemetryLink<Connecting> {
        let mut options = MqttOptions::new(
            self.broker.client_id.clone(),
            self.broker.host.clone(),
            self.broker.port,
        );
        options.set_keep_alive(Duration::from_secs(self.broker.keep_alive_secs));
        if let (Some(user), Some(password)) = (&self.broker.username, &self.broker.password) {
            options.set_credentials(user.clone(), password.clone());
        }

        let (client, events) = AsyncClient::new(options, CLIENT_CAPACITY);
        self.client = Some(client);
        self.events = Some(events);

        info!(
            host = %self.broker.host,
            port = self.broker.port,
            "connecting to broker"
        );
        self.set_state(ConnectionState::Connecting);
        self.transition()
    }
}

impl TelemetryLink<Connecting> {
    /// Polls until the broker acknowledges the connection, retrying
    /// failed attempts indefinitely. Dropping the returned future (e.g.
    /// when shutdown wins a select) releases the transport.
    pub async fn await_broker(mut self) -> Result<TelemetryLink<Connected>, TelemetryError> {
        let mut events = self
            .events
            .take()
            .ok_or_else(|| TelemetryError::Transport("event loop missing".to_string()))?;

        loop {
            match events.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("broker acknowledged connection");
                    self.events = Some(events);
                    self.set_state(ConnectionState::Connected);
                    return Ok(self.transition());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("broker connect attempt failed: {}", e);
                    self.record_error(&e.to_string());
                    tokio::time::sleep(RECONNECT_PAUSE).await;
                }
            }
        }
    }
}

impl TelemetryLink<Connected> {
    /// Issues the single telemetry subscription and transitions to
    /// Subscribed. The SubAck is observed later by the running loop.
    pub async fn subscribe(self) -> Result<TelemetryLink<Subscribed>, TelemetryError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| TelemetryError::Transport("client missing".to_string()))?;

        client
            .subscribe(self.topics.telemetry.clone(), QoS::AtMostOnce)
            .await
            .map_err(|e| TelemetryError::Transport(e.to_string()))?;

        info!(topic = %self.topics.telemetry, "subscribed to telemetry");
        self.set_state(ConnectionState::Subscribed);
        Ok(self.transition())
    }
}

impl TelemetryLink<Subscribed> {
    /// Main ingestion loop with graceful shutdown support.
    ///
    /// Inbound publishes and outbound commands are serialized through
    /// this single loop, so the state store needs no locking. Runs until
    /// the shutdown signal fires or the command channel closes.
    pub async fn run_until_shutdown(
        mut self,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> Result<(), TelemetryError> {
        let mut events = self
            .events
            .take()
            .ok_or_else(|| TelemetryError::Transport("event loop missing".to_string()))?;

        info!("telemetry loop running");
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("shutdown signal received");
                    break;
                }

                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        warn!("command channel closed, stopping link");
                        break;
                    }
                },

                event = events.poll() => match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        self.handle_publish(publish);
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("reconnected to broker");
                        self.set_state(ConnectionState::Connected);
                        let resub = self
                            .client
                            .as_ref()
                            .map(|c| (c.clone(), self.topics.telemetry.clone()));
                        if let Some((client, topic)) = resub {
                            Self::resubscribe(client, topic).await;
                        }
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        debug!("subscription acknowledged");
                        self.set_state(ConnectionState::Subscribed);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("transport error, waiting for reconnect: {}", e);
                        self.record_error(&e.to_string());
                        self.set_state(ConnectionState::Disconnected);
                        tokio::time::sleep(RECONNECT_PAUSE).await;
                    }
                },
            }
        }

        self.teardown().await;
        Ok(())
    }

    /// Decodes one inbound publish and reconciles it. A malformed
    /// payload is logged and dropped; the store stays untouched.
    fn handle_publish(&mut self, publish: Publish) {
        if publish.topic != self.topics.telemetry {
            debug!(topic = %publish.topic, "ignoring publish on unexpected topic");
            return;
        }

        self.status.send_modify(|status| {
            status.messages_received += 1;
            status.last_activity = Some(Local::now());
        });

        match codec::decode(&publish.payload) {
            Ok(delta) => self.store.reconcile(delta, Utc::now()),
            Err(e) => warn!("dropping malformed telemetry message: {}", e),
        }
    }

    /// Encode, publish fire-and-forget, then apply the optimistic local
    /// update. The local step runs regardless of transport outcome.
    async fn handle_command(&mut self, command: OutboundCommand) {
        match command {
            OutboundCommand::ClearDtcs { at } => {
                let payload = codec::encode_command(Command::ClearDtcs);

                if let Some(client) = &self.client {
                    match client
                        .publish(self.topics.commands.clone(), QoS::AtMostOnce, false, payload)
                        .await
                    {
                        Ok(()) => {
                            info!(topic = %self.topics.commands, "published clear_dtcs");
                            self.status.send_modify(|status| {
                                status.messages_sent += 1;
                                status.last_activity = Some(Local::now());
                            });
                        }
                        Err(e) => warn!("clear_dtcs publish failed, no rollback: {}", e),
                    }
                }

                self.store.apply_optimistic_clear(at);
            }
        }
    }

    async fn resubscribe(client: AsyncClient, topic: String) {
        if let Err(e) = client.subscribe(topic, QoS::AtMostOnce).await {
            warn!("resubscribe failed: {}", e);
        }
    }

    /// Unsubscribes and disconnects. Dropping the event loop afterwards
    /// closes the socket even if the broker never answers.
    async fn teardown(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.unsubscribe(self.topics.telemetry.clone()).await {
                debug!("unsubscribe during teardown: {}", e);
            }
            if let Err(e) = client.disconnect().await {
                debug!("disconnect during teardown: {}", e);
            }
        }
        self.set_state(ConnectionState::Disconnected);
        info!("telemetry link closed");
    }
}

/// Handle for the telemetry link task.
///
/// Spawns the machine lifecycle in a background task and provides the
/// teardown path the dashboard calls on every exit route.
pub struct TelemetryHandle {
    status: watch::Receiver<LinkStatus>,
    task_handle: Option<JoinHandle<Result<(), TelemetryError>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TelemetryHandle {
    /// Starts the link and returns the handle plus the two consumer-side
    /// endpoints: the snapshot channel and the command publisher.
    pub fn spawn(
        broker: BrokerConfig,
        topics: TopicConfig,
        history_window: chrono::Duration,
    ) -> (Self, watch::Receiver<VehicleState>, CommandPublisher) {
        let (store, snapshots) = StateStore::new(history_window);
        let (command_tx, command_rx) = mpsc::channel(16);
        let (status_tx, status_rx) = watch::channel(LinkStatus::default());
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let task_handle = tokio::spawn(async move {
            let link =
                TelemetryLink::create(broker, topics, store, command_rx, status_tx).connect();

            let link = tokio::select! {
                connected = link.await_broker() => connected?,
                _ = &mut shutdown_rx => {
                    info!("shutdown before broker handshake");
                    return Ok(());
                }
            };

            let link = link.subscribe().await?;
            link.run_until_shutdown(shutdown_rx).await
        });

        let handle = Self {
            status: status_rx,
            task_handle: Some(task_handle),
            shutdown_tx: Some(shutdown_tx),
        };
        (handle, snapshots, CommandPublisher::new(command_tx))
    }

    /// Watch endpoint for connection observability.
    pub fn status(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    /// Signals the link task and waits for it to finish tearing down.
    pub async fn shutdown(&mut self) -> Result<(), TelemetryError> {
        debug!("sending shutdown signal to telemetry link");
        if let Some(tx) = self.shutdown_tx.take() {
            if tx.send(()).is_err() {
                warn!("telemetry task already terminated");
            }
        }

        if let Some(handle) = self.task_handle.take() {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!("telemetry task panicked: {}", e);
                    Err(TelemetryError::Task(format!(
                        "telemetry task panicked: {e}"
                    )))
                }
            }
        } else {
            debug!("telemetry link already shut down");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DashConfig;

    fn test_parts() -> (
        BrokerConfig,
        TopicConfig,
        StateStore,
        mpsc::Receiver<OutboundCommand>,
        watch::Sender<LinkStatus>,
        watch::Receiver<LinkStatus>,
    ) {
        let config = DashConfig::default();
        let (store, _snapshots) = StateStore::new(chrono::Duration::seconds(60));
        let (_command_tx, command_rx) = mpsc::channel(16);
        let (status_tx, status_rx) = watch::channel(LinkStatus::default());
        (
            config.broker,
            config.topics,
            store,
            command_rx,
            status_tx,
            status_rx,
        )
    }

    #[tokio::test]
    async fn connect_reports_connecting_state() {
        let (broker, topics, store, commands, status_tx, status_rx) = test_parts();
        let link = TelemetryLink::create(broker, topics, store, commands, status_tx);
        assert_eq!(
            status_rx.borrow().connection_state,
            ConnectionState::Disconnected
        );

        let _link = link.connect();
        assert_eq!(
            status_rx.borrow().connection_state,
            ConnectionState::Connecting
        );
    }

    #[tokio::test]
    async fn shutdown_before_handshake_is_clean() {
        let config = DashConfig {
            broker: BrokerConfig {
                host: "127.0.0.1".to_string(),
                port: 1, // nothing listens here
                ..BrokerConfig::default()
            },
            ..DashConfig::default()
        };

        let (mut handle, _snapshots, _publisher) = TelemetryHandle::spawn(
            config.broker,
            config.topics,
            chrono::Duration::seconds(60),
        );
        assert!(handle.shutdown().await.is_ok());
        assert_eq!(
            handle.status().borrow().connection_state,
            ConnectionState::Connecting
        );
    }
}
