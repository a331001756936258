//! Connection coordinator.
//!
//! [`RemoraClient`] owns the session and the torrent catalog behind a single
//! async mutex. Every mutation happens inside that lock after checking the
//! epoch the triggering request was issued under.

use std::sync::Arc;

use async_trait::async_trait;
use remora_events::{Event, EventBus};
use remora_rpc::request::{session_get, session_set, torrent_get};
use remora_rpc::{HttpTransport, RpcError, TORRENT_FIELDS, Transport, methods};
use remora_telemetry::Metrics;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::dispatch::ActionDispatcher;
use crate::error::ClientError;
use crate::model::{TorrentFilter, TorrentSnapshot};
use crate::poll::{PollPhase, PollScheduler, PollStep, PollTarget};
use crate::reconcile::TorrentCatalog;
use crate::session::{ConnectionState, Epoch, FailureOutcome, MAX_POLL_FAILURES, Session};
use crate::shared::Shared;

/// Status line published while connecting.
pub const STATUS_CONNECTING: &str = "Connecting...";
/// Status line published after a disconnect.
pub const STATUS_DISCONNECTED: &str = "Disconnected.";

/// Copy of the session bookkeeping for front ends.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Lifecycle state.
    pub state: ConnectionState,
    /// Consecutive failed polls.
    pub fail_count: u8,
    /// Successful reconciliations so far.
    pub update_serial: u64,
    /// Current epoch.
    pub epoch: Epoch,
    /// Server settings from the last `session-get`.
    pub settings: Option<Map<String, Value>>,
}

#[derive(Default)]
struct ClientState {
    session: Session,
    catalog: TorrentCatalog,
}

struct ClientInner {
    config: ClientConfig,
    shared: Shared,
    state: Mutex<ClientState>,
    connection: watch::Sender<ConnectionState>,
    scheduler: PollScheduler,
    dispatcher: ActionDispatcher,
}

/// Headless client for one daemon.
///
/// Must be created inside a Tokio runtime: the batch-add worker is spawned
/// on construction.
#[derive(Clone)]
pub struct RemoraClient {
    inner: Arc<ClientInner>,
}

impl RemoraClient {
    /// Client talking HTTP to the daemon described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for unusable settings and
    /// [`ClientError::Rpc`] if the HTTP client cannot be built.
    pub fn http(config: ClientConfig, events: EventBus, metrics: Metrics) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(config.transport_config()?).map_err(|source| {
            ClientError::Rpc {
                operation: "connect",
                source,
            }
        })?;
        Ok(Self::with_transport(config, Arc::new(transport), events, metrics))
    }

    /// Client using a caller-supplied transport.
    #[must_use]
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        events: EventBus,
        metrics: Metrics,
    ) -> Self {
        let shared = Shared::new(transport, events, metrics);
        let (connection, connection_rx) = watch::channel(ConnectionState::Disconnected);
        let dispatcher = ActionDispatcher::new(shared.clone(), connection_rx);
        let scheduler = PollScheduler::new(config.poll_interval);
        Self {
            inner: Arc::new(ClientInner {
                config,
                shared,
                state: Mutex::new(ClientState::default()),
                connection,
                scheduler,
                dispatcher,
            }),
        }
    }

    /// Settings this client was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Event bus the client publishes to.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        self.inner.shared.events()
    }

    /// Metrics registry the client records into.
    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        self.inner.shared.metrics()
    }

    /// Action dispatcher bound to this client's session.
    #[must_use]
    pub fn actions(&self) -> &ActionDispatcher {
        &self.inner.dispatcher
    }

    /// Receiver tracking the connection state.
    #[must_use]
    pub fn connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.subscribe()
    }

    /// Receiver tracking the poll scheduler phase.
    #[must_use]
    pub fn poll_phase(&self) -> watch::Receiver<PollPhase> {
        self.inner.scheduler.subscribe()
    }

    /// Open a session: validate settings, fetch `session-get`, start polling.
    ///
    /// An existing session is torn down first. The first poll after a
    /// successful connect is treated as the first snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] without sending a request when the
    /// settings are invalid, [`ClientError::Rpc`] when `session-get` fails and
    /// [`ClientError::Superseded`] when a disconnect or newer connect
    /// overtook this attempt. Failures are also published as error events.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let inner = &self.inner;
        if let Err(source) = inner.config.validate() {
            let err = ClientError::Config { source };
            inner.shared.error(err.user_message());
            return Err(err);
        }

        let epoch = {
            let mut state = inner.state.lock().await;
            inner.teardown(&mut state);
            let epoch = state.session.begin_connect();
            inner.connection.send_replace(ConnectionState::Connecting);
            inner.shared.status(STATUS_CONNECTING);
            epoch
        };
        info!(epoch, endpoint = %inner.endpoint_label(), "connecting to daemon");

        let result = inner.shared.call(session_get()).await;

        let mut state = inner.state.lock().await;
        match result {
            Ok(response) => {
                if !state.session.complete_connect(epoch, response.arguments) {
                    debug!(epoch, "discarding stale session-get response");
                    return Err(ClientError::Superseded);
                }
                let version = state.session.version().map(str::to_string);
                inner.connection.send_replace(ConnectionState::Connected);
                inner.shared.metrics().set_connected(true);
                inner.shared.metrics().set_poll_fail_count(0);
                inner.shared.emit(Event::ConnectionChanged { connected: true });
                inner.shared.status(version.as_deref().map_or_else(
                    || "Connected.".to_string(),
                    |version| format!("Connected to {version}"),
                ));
                inner.shared.emit(Event::SettingsRefreshed { version });
                inner.scheduler.start(Arc::downgrade(inner), epoch);
                drop(state);

                info!(epoch, "session established");
                Ok(())
            }
            Err(source) => {
                if !state.session.abort_connect(epoch) {
                    return Err(ClientError::Superseded);
                }
                inner.connection.send_replace(ConnectionState::Disconnected);
                let err = ClientError::Rpc {
                    operation: methods::SESSION_GET,
                    source,
                };
                inner.shared.error(err.user_message());
                inner.shared.status(STATUS_DISCONNECTED);
                Err(err)
            }
        }
    }

    /// Tear down the session. Does nothing when already disconnected.
    pub async fn disconnect(&self) {
        let mut state = self.inner.state.lock().await;
        if self.inner.teardown(&mut state) {
            info!("disconnected from daemon");
        }
    }

    /// Re-fetch server settings, replacing the stored copy wholesale.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] without a session and
    /// [`ClientError::Rpc`] when `session-get` fails.
    pub async fn refresh_settings(&self) -> Result<(), ClientError> {
        let inner = &self.inner;
        let epoch = inner.connected_epoch().await?;

        let response = match inner.shared.call(session_get()).await {
            Ok(response) => response,
            Err(source) => return Err(inner.report(methods::SESSION_GET, source)),
        };

        let mut state = inner.state.lock().await;
        if !state.session.replace_settings(epoch, response.arguments) {
            debug!(epoch, "discarding stale settings refresh");
            return Err(ClientError::NotConnected);
        }
        let version = state.session.version().map(str::to_string);
        inner.shared.emit(Event::SettingsRefreshed { version });
        Ok(())
    }

    /// Push settings with `session-set`, then refresh the local copy.
    ///
    /// The refresh also runs when the daemon rejected the change, so the
    /// stored settings always reflect what the daemon reports.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] without a session and
    /// [`ClientError::Rpc`] when either request fails.
    pub async fn update_settings(&self, settings: Map<String, Value>) -> Result<(), ClientError> {
        let inner = &self.inner;
        inner.connected_epoch().await?;

        match inner.shared.call(session_set(settings)).await {
            Ok(_) => self.refresh_settings().await,
            Err(source @ RpcError::Protocol { .. }) => {
                let err = inner.report(methods::SESSION_SET, source);
                if let Err(refresh) = self.refresh_settings().await {
                    warn!(error = %refresh, "settings refresh after rejected update failed");
                }
                Err(err)
            }
            Err(source) => Err(inner.report(methods::SESSION_SET, source)),
        }
    }

    /// Copy of the catalog for presentation.
    pub async fn snapshot(&self) -> TorrentSnapshot {
        let state = self.inner.state.lock().await;
        TorrentSnapshot {
            records: state.catalog.list(),
            stats: state.catalog.stats(),
            update_serial: state.session.update_serial(),
        }
    }

    /// Copy of the catalog restricted to records passing `filter`.
    /// Aggregates still cover every torrent.
    pub async fn filtered_snapshot(&self, filter: &TorrentFilter) -> TorrentSnapshot {
        let state = self.inner.state.lock().await;
        TorrentSnapshot {
            records: state.catalog.filtered(filter),
            stats: state.catalog.stats(),
            update_serial: state.session.update_serial(),
        }
    }

    /// Copy of the session bookkeeping.
    pub async fn session_info(&self) -> SessionInfo {
        let state = self.inner.state.lock().await;
        SessionInfo {
            state: state.session.state(),
            fail_count: state.session.fail_count(),
            update_serial: state.session.update_serial(),
            epoch: state.session.epoch(),
            settings: state.session.server_settings().cloned(),
        }
    }
}

impl ClientInner {
    fn endpoint_label(&self) -> String {
        self.config
            .rpc_url()
            .map_or_else(|_| self.config.host.clone(), |url| url.to_string())
    }

    async fn connected_epoch(&self) -> Result<Epoch, ClientError> {
        let state = self.state.lock().await;
        if state.session.state() == ConnectionState::Connected {
            Ok(state.session.epoch())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    fn report(&self, operation: &'static str, source: RpcError) -> ClientError {
        let err = ClientError::Rpc { operation, source };
        self.shared.error(err.user_message());
        err
    }

    /// Drop the session and catalog. Returns `false` if already disconnected.
    fn teardown(&self, state: &mut ClientState) -> bool {
        if !state.session.disconnect() {
            return false;
        }
        self.after_disconnect(state);
        true
    }

    fn after_disconnect(&self, state: &mut ClientState) {
        state.catalog.clear();
        self.scheduler.stop();
        self.connection.send_replace(ConnectionState::Disconnected);
        let metrics = self.shared.metrics();
        metrics.set_connected(false);
        metrics.set_tracked_torrents(0);
        self.shared
            .emit(Event::ConnectionChanged { connected: false });
        self.shared.status(STATUS_DISCONNECTED);
    }

    fn poll_failed(&self, state: &mut ClientState, epoch: Epoch, reason: &str) -> PollStep {
        self.shared.metrics().inc_poll(false);
        match state.session.record_poll_failure(epoch) {
            FailureOutcome::Stale => PollStep::Stop,
            FailureOutcome::Retry { attempt } => {
                self.shared.metrics().set_poll_fail_count(attempt);
                warn!(epoch, attempt, reason, "poll failed");
                self.shared
                    .status(format!("Request {attempt}/{MAX_POLL_FAILURES} failed: {reason}"));
                PollStep::Failed
            }
            FailureOutcome::Disconnect => {
                self.shared.metrics().set_poll_fail_count(MAX_POLL_FAILURES);
                warn!(epoch, reason, "poll failure limit reached; disconnecting");
                self.shared.status(format!(
                    "Request {MAX_POLL_FAILURES}/{MAX_POLL_FAILURES} failed: {reason}"
                ));
                self.after_disconnect(state);
                self.shared.error(reason);
                PollStep::Stop
            }
        }
    }
}

#[async_trait]
impl PollTarget for ClientInner {
    async fn poll_once(&self, epoch: Epoch, first: bool) -> PollStep {
        if !self.state.lock().await.session.accepts(epoch) {
            return PollStep::Stop;
        }

        let result = self.shared.call(torrent_get(TORRENT_FIELDS)).await;

        let mut state = self.state.lock().await;
        if !state.session.accepts(epoch) {
            debug!(epoch, "discarding stale poll response");
            return PollStep::Stop;
        }

        let response = match result {
            Ok(response) => response,
            Err(err) => return self.poll_failed(&mut state, epoch, &err.user_message()),
        };
        let reconciliation = match state.catalog.reconcile(&response.arguments, first) {
            Ok(reconciliation) => reconciliation,
            Err(err) => {
                warn!(epoch, error = ?err, "torrent list rejected");
                return self.poll_failed(&mut state, epoch, "Malformed torrent list.");
            }
        };
        let Some(update_serial) = state.session.record_snapshot(epoch) else {
            return PollStep::Stop;
        };

        let metrics = self.shared.metrics();
        metrics.inc_poll(true);
        metrics.set_poll_fail_count(0);
        metrics.set_tracked_torrents(state.catalog.len());
        debug!(
            epoch,
            update_serial,
            added = reconciliation.added,
            removed = reconciliation.removed,
            "torrent list reconciled"
        );
        self.shared.emit(Event::TorrentsUpdated {
            stats: reconciliation.stats,
            update_serial,
        });
        for completed in reconciliation.completed {
            info!(torrent_id = completed.id, name = %completed.name, "torrent completed");
            self.shared.emit(Event::TorrentCompleted {
                torrent_id: completed.id,
                name: completed.name,
            });
        }
        PollStep::Applied
    }
}
