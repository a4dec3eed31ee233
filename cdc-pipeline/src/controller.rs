use std::sync::Arc;
use std::time::Duration;

use cdc_common::{CResult, HealthCheck, HealthState, Metrics, MetricsSnapshot, Position, ReError};
use cdc_config::{ConfigChanged, ConfigurationAggregate};
use cdc_offsets::OffsetStore;
use cdc_publish::Publisher;
use cdc_schema::SchemaTracker;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::adapter::PipelineWorker;
use crate::factory::build_strategy;

const INITIAL_RETRY_BACKOFF: Duration = Duration::from_millis(200);
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

/// The pipeline's run state (spec §4.4/§4.7). One source runs at a time:
/// `STOPPED -> STARTING -> RUNNING -> STOPPING -> STOPPED`, or `FAILED` on a
/// fatal driver error (`ReError::DriverFatal`/`ReError::Bug`) that the run
/// loop cannot retry past.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub state: EngineState,
    pub started_at: Option<DateTime<Utc>>,
    pub current_position: Option<Position>,
    pub last_error: Option<String>,
}

struct RunningWorker {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

struct SharedStatus {
    state: RwLock<EngineState>,
    started_at: RwLock<Option<DateTime<Utc>>>,
    current_position: RwLock<Option<Position>>,
    last_error: RwLock<Option<String>>,
    /// Set when the most recent tick failed on the driver side
    /// (`DriverTransient`/`DriverFatal`); cleared on the next successful tick.
    database_error: RwLock<Option<String>>,
    /// Set when the most recent tick failed on the publish side
    /// (`BrokerUnavailable`); cleared on the next successful tick.
    broker_error: RwLock<Option<String>>,
}

/// Owns the single active `PipelineWorker` and enforces the state-machine
/// contract: calls outside it return `ReError::EngineBusy` rather than
/// queuing or silently no-oping (spec §4.4).
pub struct PipelineController {
    status: Arc<SharedStatus>,
    running: RwLock<Option<RunningWorker>>,
    schema: Arc<SchemaTracker>,
    offsets: Arc<dyn OffsetStore>,
    publisher: Arc<dyn Publisher>,
    metrics: Arc<Metrics>,
}

impl PipelineController {
    pub fn new(schema: Arc<SchemaTracker>, offsets: Arc<dyn OffsetStore>, publisher: Arc<dyn Publisher>, metrics: Arc<Metrics>) -> Self {
        PipelineController {
            status: Arc::new(SharedStatus {
                state: RwLock::new(EngineState::Stopped),
                started_at: RwLock::new(None),
                current_position: RwLock::new(None),
                last_error: RwLock::new(None),
                database_error: RwLock::new(None),
                broker_error: RwLock::new(None),
            }),
            running: RwLock::new(None),
            schema,
            offsets,
            publisher,
            metrics,
        }
    }

    pub async fn state(&self) -> EngineState {
        *self.status.state.read().await
    }

    pub async fn status(&self) -> EngineStatus {
        EngineStatus {
            state: *self.status.state.read().await,
            started_at: *self.status.started_at.read().await,
            current_position: self.status.current_position.read().await.clone(),
            last_error: self.status.last_error.read().await.clone(),
        }
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Engine component health (spec §6 `HealthProbe.checkEngine()`):
    /// `Running` is up, `Starting`/`Stopping` are degraded (in transit),
    /// `Stopped` is unknown (no opinion), `Failed` is down.
    pub async fn check_engine(&self) -> HealthCheck {
        match *self.status.state.read().await {
            EngineState::Running => HealthCheck::up("pipeline running"),
            EngineState::Starting | EngineState::Stopping => HealthCheck::degraded("pipeline transitioning"),
            EngineState::Stopped => unknown_health("pipeline stopped"),
            EngineState::Failed => {
                let error = self.status.last_error.read().await.clone().unwrap_or_default();
                HealthCheck::down("pipeline failed", error)
            }
        }
    }

    /// Database connectivity (spec §6 `HealthProbe.checkDatabase()`),
    /// derived from the most recent tick rather than a separate probe
    /// connection — the run loop's own poll already is the liveness check.
    pub async fn check_database(&self) -> HealthCheck {
        if *self.status.state.read().await == EngineState::Stopped {
            return unknown_health("no source connected");
        }
        match self.status.database_error.read().await.clone() {
            Some(error) => HealthCheck::down("database connection unhealthy", error),
            None => HealthCheck::up("database connection healthy"),
        }
    }

    /// Broker connectivity (spec §6 `HealthProbe.checkBroker()`), derived
    /// from the most recent publish attempt.
    pub async fn check_broker(&self) -> HealthCheck {
        if *self.status.state.read().await == EngineState::Stopped {
            return unknown_health("no broker in use");
        }
        match self.status.broker_error.read().await.clone() {
            Some(error) => HealthCheck::down("broker unreachable", error),
            None => HealthCheck::up("broker reachable"),
        }
    }

    /// Aggregate health across all three components (spec §3/§7). A broker
    /// outage alone reports the aggregate as `DEGRADED`, not `DOWN`: the
    /// source keeps capturing into the in-flight window and nothing is
    /// lost until that window fills, so the service is degraded rather than
    /// dead. Every other combination follows `HealthState::aggregate()`.
    pub async fn health(&self) -> HealthCheck {
        let engine = self.check_engine().await;
        let database = self.check_database().await;
        let broker = self.check_broker().await;

        if engine.state == HealthState::Down || database.state == HealthState::Down {
            let state = HealthState::aggregate([engine.state, database.state, broker.state]);
            return HealthCheck { state, message: "pipeline unhealthy".to_string(), checked_at: Utc::now(), extras: None, error_message: None };
        }
        if broker.state == HealthState::Down {
            return HealthCheck::degraded("broker unavailable, events buffering in the in-flight window");
        }

        let state = HealthState::aggregate([engine.state, database.state, broker.state]);
        HealthCheck { state, message: "pipeline healthy".to_string(), checked_at: Utc::now(), extras: None, error_message: None }
    }

    /// Starts capture for `aggregate`. Only legal from `Stopped` or
    /// `Failed`; any other state is `ReError::EngineBusy`.
    pub async fn start(&self, aggregate: ConfigurationAggregate) -> CResult<()> {
        {
            let mut state = self.status.state.write().await;
            if !matches!(*state, EngineState::Stopped | EngineState::Failed) {
                return Err(ReError::EngineBusy(format!("cannot start engine in state {:?}", *state)));
            }
            *state = EngineState::Starting;
        }

        let strategy = build_strategy(&aggregate);
        let mut worker =
            PipelineWorker::new(strategy, &aggregate, self.schema.clone(), self.offsets.clone(), self.publisher.clone(), self.metrics.clone());

        if let Err(err) = worker.connect().await {
            *self.status.state.write().await = EngineState::Failed;
            *self.status.last_error.write().await = Some(err.to_string());
            return Err(err);
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let status = self.status.clone();
        let handle = tokio::spawn(run_worker(worker, status.clone(), shutdown_rx));

        *self.running.write().await = Some(RunningWorker { shutdown: shutdown_tx, handle });
        *status.started_at.write().await = Some(Utc::now());
        *status.last_error.write().await = None;
        *status.state.write().await = EngineState::Running;

        Ok(())
    }

    /// Stops the running worker, if any, waiting up to 30 seconds for it to
    /// exit cleanly. A no-op when already stopped; `ReError::EngineBusy`
    /// when a start/stop is already in flight.
    pub async fn stop(&self) -> CResult<()> {
        {
            let mut state = self.status.state.write().await;
            match *state {
                EngineState::Stopped => return Ok(()),
                EngineState::Starting | EngineState::Stopping => {
                    return Err(ReError::EngineBusy(format!("cannot stop engine in state {:?}", *state)));
                }
                EngineState::Running | EngineState::Failed => *state = EngineState::Stopping,
            }
        }

        if let Some(running) = self.running.write().await.take() {
            let _ = running.shutdown.send(());
            match tokio::time::timeout(SHUTDOWN_DEADLINE, running.handle).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => error!(error = %join_err, "pipeline worker task panicked"),
                Err(_) => warn!("pipeline worker did not stop within the shutdown deadline"),
            }
        }

        *self.status.state.write().await = EngineState::Stopped;
        Ok(())
    }

    /// Stops the current source, if any, and starts `aggregate` in its
    /// place. Driven by `ConfigChanged` (spec §4.1): a config edit takes
    /// effect by restarting capture against the new aggregate.
    pub async fn restart(&self, aggregate: ConfigurationAggregate) -> CResult<()> {
        self.stop().await?;
        self.start(aggregate).await
    }

    /// Forwards every `ConfigChanged` from a `cdc_config::ConfigWatcher`
    /// into a restart. Intended to be spawned alongside `ConfigWatcher::watch`
    /// (spec §5).
    pub async fn handle_config_changes(self: Arc<Self>, mut changes: UnboundedReceiver<ConfigChanged>) {
        while let Some(changed) = changes.recv().await {
            info!(added = changed.added.len(), removed = changed.removed.len(), "configuration changed, restarting pipeline");
            if let Err(err) = self.restart(changed.new_aggregate).await {
                error!(error = %err, "failed to restart pipeline after configuration change");
            }
        }
    }
}

/// Attributes a tick failure to the database or broker component so
/// `check_database`/`check_broker` can report it without a second probe
/// connection. `BrokerUnavailable` comes from the publish step; everything
/// else a tick can fail with originates from the driver's `poll`.
async fn record_component_error(status: &SharedStatus, err: &ReError) {
    if matches!(err, ReError::BrokerUnavailable(_)) {
        *status.broker_error.write().await = Some(err.to_string());
    } else {
        *status.database_error.write().await = Some(err.to_string());
    }
}

fn unknown_health(message: &str) -> HealthCheck {
    HealthCheck { state: HealthState::Unknown, message: message.to_string(), checked_at: Utc::now(), extras: None, error_message: None }
}

/// The run loop spawned by `start`. Transient errors (`DriverTransient`,
/// `BrokerUnavailable`) back off and retry in place; fatal errors move the
/// engine to `FAILED` and end the loop.
async fn run_worker(mut worker: PipelineWorker, status: Arc<SharedStatus>, mut shutdown: oneshot::Receiver<()>) {
    let mut backoff = INITIAL_RETRY_BACKOFF;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            result = worker.tick() => match result {
                Ok(Some(position)) => {
                    backoff = INITIAL_RETRY_BACKOFF;
                    *status.current_position.write().await = Some(position);
                    *status.database_error.write().await = None;
                    *status.broker_error.write().await = None;
                }
                Ok(None) => {
                    tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                }
                Err(err) if err.is_transient() => {
                    warn!(error = %err, backoff_ms = backoff.as_millis(), "transient error, retrying");
                    record_component_error(&status, &err).await;
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_RETRY_BACKOFF);
                }
                Err(err) => {
                    error!(error = %err, "unrecoverable error, pipeline entering FAILED state");
                    record_component_error(&status, &err).await;
                    *status.last_error.write().await = Some(err.to_string());
                    *status.state.write().await = EngineState::Failed;
                    break;
                }
            },
        }
    }

    if let Err(err) = worker.disconnect().await {
        warn!(error = %err, "error disconnecting source strategy during shutdown");
    }
}
