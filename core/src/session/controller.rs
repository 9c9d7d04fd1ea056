use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::task::{AbortHandle, JoinHandle};

use crate::config::AppConfig;
use crate::error::{GatewayError, RunError, TransportError};
use crate::event::{decode_stream, EventDecoder};
use crate::gateway::{self, ManualAction};
use crate::state::{Applied, RunConfiguration, RunState, RunStatus};

use super::traits::{ByteStream, RunBackend};

/// Change notification for observers. Carries no state; read a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum RunNotice {
    /// A fresh run replaced whatever was there.
    Reset { revision: u64 },
    Updated { revision: u64 },
    StatusChanged {
        revision: u64,
        from: RunStatus,
        to: RunStatus,
    },
    ActionFailed { revision: u64, message: String },
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub require_credential: bool,
    pub max_frame_bytes: usize,
    pub notice_capacity: usize,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl ControllerOptions {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            require_credential: cfg.backend.require_credential,
            max_frame_bytes: cfg.stream.max_frame_bytes,
            notice_capacity: cfg.stream.notice_capacity.max(1),
        }
    }
}

/// Owns the one live stream of a run and folds its events into `RunState`.
///
/// Every stream read loop is bound to the epoch it was opened under. `start`,
/// `continue_run` and `cancel` bump the epoch, and a loop re-checks it under
/// the store lock before each apply, so a superseded or cancelled stream can
/// never mutate state again.
#[derive(Clone)]
pub struct RunController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    backend: Arc<dyn RunBackend>,
    options: ControllerOptions,
    shared: Arc<Shared>,
    active: Mutex<Option<ActiveStream>>,
}

struct Shared {
    store: Mutex<Store>,
    notices: broadcast::Sender<RunNotice>,
}

#[derive(Default)]
struct Store {
    state: RunState,
    epoch: u64,
    revision: u64,
    action_in_flight: bool,
}

struct ActiveStream {
    abort: AbortHandle,
    task: Option<JoinHandle<()>>,
}

enum Step {
    Continue,
    Settled,
    Stale,
}

impl Store {
    fn bump(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, store: &mut Store, applied: Applied) {
        let notice = match applied {
            Applied::Ignored => return,
            Applied::Updated => RunNotice::Updated {
                revision: store.bump(),
            },
            Applied::StatusChanged { from, to } => RunNotice::StatusChanged {
                revision: store.bump(),
                from,
                to,
            },
        };
        self.send(notice);
    }

    fn send(&self, notice: RunNotice) {
        // No receivers is fine.
        let _ = self.notices.send(notice);
    }

    fn record_action_error(&self, store: &mut Store, err: &GatewayError) {
        let message = err.to_string();
        store.state.action_error = Some(message.clone());
        let revision = store.bump();
        self.send(RunNotice::ActionFailed { revision, message });
    }
}

impl ControllerInner {
    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveStream>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn abort_active(&self) {
        if let Some(active) = self.lock_active().take() {
            active.abort.abort();
        }
    }

    /// Bind an opened stream to `epoch`, or record the open failure.
    fn attach(
        &self,
        epoch: u64,
        opened: Result<ByteStream, TransportError>,
    ) -> Result<(), TransportError> {
        // Held until the task is registered so a concurrent cancel either
        // sees the new task or makes us skip spawning it.
        let mut store = self.shared.lock();
        if store.epoch != epoch {
            tracing::debug!(
                target: "arcscope.session",
                stage = "stream.superseded",
                epoch,
                "stream opened after the run was replaced; dropping it"
            );
            return Ok(());
        }

        match opened {
            Ok(bytes) => {
                let decoder = EventDecoder::with_max_frame_bytes(self.options.max_frame_bytes);
                let task = tokio::spawn(pump(self.shared.clone(), epoch, bytes, decoder));
                let previous = self.lock_active().replace(ActiveStream {
                    abort: task.abort_handle(),
                    task: Some(task),
                });
                if let Some(previous) = previous {
                    previous.abort.abort();
                }
                tracing::debug!(target: "arcscope.session", stage = "stream.attached", epoch);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    target: "arcscope.session",
                    stage = "stream.open",
                    error = %err,
                    "failed to open event stream"
                );
                let applied = store.state.fail(format!("failed to open event stream: {err}"));
                self.shared.publish(&mut store, applied);
                Err(err)
            }
        }
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        self.abort_active();
    }
}

/// Read loop for one stream.
async fn pump(shared: Arc<Shared>, epoch: u64, bytes: ByteStream, decoder: EventDecoder) {
    let events = decode_stream(bytes, decoder);
    futures::pin_mut!(events);

    while let Some(item) = events.next().await {
        let step = {
            let mut store = shared.lock();
            if store.epoch != epoch {
                Step::Stale
            } else {
                let applied = match item {
                    Ok(event) => {
                        store.state.last_event_at = Some(Utc::now());
                        store.state.apply(&event)
                    }
                    Err(err) => {
                        tracing::warn!(
                            target: "arcscope.session",
                            stage = "stream.read",
                            error = %err,
                            "event stream failed"
                        );
                        store.state.fail(err.to_string())
                    }
                };
                shared.publish(&mut store, applied);
                match store.state.status {
                    RunStatus::Idle | RunStatus::Running => Step::Continue,
                    _ => Step::Settled,
                }
            }
        };

        match step {
            Step::Continue => {}
            Step::Stale => {
                tracing::debug!(target: "arcscope.session", stage = "stream.stale", epoch);
                return;
            }
            Step::Settled => {
                let status = shared.lock().state.status;
                tracing::info!(
                    target: "arcscope.session",
                    stage = "stream.settled",
                    status = %status,
                    "closing event stream"
                );
                return;
            }
        }
    }

    let mut store = shared.lock();
    if store.epoch == epoch {
        let applied = store.state.end_of_stream();
        shared.publish(&mut store, applied);
        tracing::info!(
            target: "arcscope.session",
            stage = "stream.closed",
            status = %store.state.status,
            "event stream ended"
        );
    }
}

impl RunController {
    pub fn new(backend: Arc<dyn RunBackend>, options: ControllerOptions) -> Self {
        let (notices, _) = broadcast::channel(options.notice_capacity.max(1));
        let shared = Arc::new(Shared {
            store: Mutex::new(Store::default()),
            notices,
        });
        Self {
            inner: Arc::new(ControllerInner {
                backend,
                options,
                shared,
                active: Mutex::new(None),
            }),
        }
    }

    pub fn from_config(backend: Arc<dyn RunBackend>, cfg: &AppConfig) -> Self {
        Self::new(backend, ControllerOptions::from_config(cfg))
    }

    pub fn backend_name(&self) -> &str {
        self.inner.backend.name()
    }

    /// Validate, reset to a fresh state and open the stream.
    ///
    /// An active run is cancelled first. Validation failures leave the
    /// current state untouched and make no request.
    pub async fn start(&self, config: RunConfiguration) -> Result<(), RunError> {
        config.validate(self.inner.options.require_credential)?;

        let epoch = {
            let mut store = self.inner.shared.lock();
            store.epoch += 1;
            store.action_in_flight = false;
            store.state = RunState::fresh(&config);
            let revision = store.bump();
            self.inner.shared.send(RunNotice::Reset { revision });
            store.epoch
        };
        self.inner.abort_active();

        tracing::info!(
            target: "arcscope.session",
            stage = "run.start",
            backend = self.inner.backend.name(),
            puzzle = %config.target,
            agent = %config.agent,
            max_turns = config.max_turns,
            epoch,
        );

        let opened = self.inner.backend.start_run(&config).await;
        self.inner.attach(epoch, opened)?;
        Ok(())
    }

    /// Stop the active stream. Idempotent; a no-op once the run has settled.
    pub fn cancel(&self) {
        {
            let mut store = self.inner.shared.lock();
            store.epoch += 1;
            store.action_in_flight = false;
            let applied = store.state.cancel();
            if applied.changed() {
                tracing::info!(target: "arcscope.session", stage = "run.cancel", epoch = store.epoch);
            }
            self.inner.shared.publish(&mut store, applied);
        }
        self.inner.abort_active();
    }

    /// Resume a paused run with an operator message on a new stream.
    pub async fn continue_run(&self, message: &str) -> Result<(), RunError> {
        let (epoch, handle) = {
            let mut store = self.inner.shared.lock();
            if store.action_in_flight {
                return Err(GatewayError::ActionInFlight.into());
            }
            if store.state.status != RunStatus::Paused {
                return Err(RunError::NotResumable(format!(
                    "run is {}",
                    store.state.status
                )));
            }
            let handle = store
                .state
                .session_handle
                .clone()
                .ok_or_else(|| RunError::NotResumable("no session handle".to_string()))?;

            let applied = store.state.resume(message)?;
            store.epoch += 1;
            self.inner.shared.publish(&mut store, applied);
            (store.epoch, handle)
        };
        self.inner.abort_active();

        tracing::info!(
            target: "arcscope.session",
            stage = "run.continue",
            session = %handle,
            epoch,
        );

        let opened = self.inner.backend.continue_run(&handle, message).await;
        self.inner.attach(epoch, opened)?;
        Ok(())
    }

    /// Send one operator action and fold its result like a streamed tool result.
    ///
    /// Failures land in `action_error` and never change the run status.
    pub async fn manual_action(&self, action: ManualAction) -> Result<(), GatewayError> {
        let (epoch, handle) = {
            let mut store = self.inner.shared.lock();
            let checked = if store.action_in_flight {
                Err(GatewayError::ActionInFlight)
            } else {
                gateway::check(&store.state, &action)
            };
            match checked {
                Ok(handle) => {
                    store.action_in_flight = true;
                    (store.epoch, handle)
                }
                Err(err) => {
                    self.inner.shared.record_action_error(&mut store, &err);
                    return Err(err);
                }
            }
        };

        tracing::debug!(
            target: "arcscope.gateway",
            stage = "action.send",
            session = %handle,
            action = %action.label(),
        );
        let result = self
            .inner
            .backend
            .manual_action(&handle, &action.to_request())
            .await;

        let mut store = self.inner.shared.lock();
        if store.epoch != epoch {
            tracing::debug!(
                target: "arcscope.gateway",
                stage = "action.superseded",
                action = %action.label(),
                "dropping action result for a replaced run"
            );
            return Err(GatewayError::Superseded);
        }
        store.action_in_flight = false;

        match result {
            Ok(mut tool_result) => {
                if tool_result.name.trim().is_empty() {
                    tool_result.name = action.label();
                }
                store.state.action_error = None;
                store.state.last_event_at = Some(Utc::now());
                let applied = store.state.apply_action_result(&tool_result);
                // Clearing a previous error is a visible change on its own.
                let applied = if applied.changed() {
                    applied
                } else {
                    Applied::Updated
                };
                self.inner.shared.publish(&mut store, applied);
                Ok(())
            }
            Err(err) => {
                let err = GatewayError::from(err);
                tracing::warn!(
                    target: "arcscope.gateway",
                    stage = "action.failed",
                    action = %action.label(),
                    error = %err,
                );
                self.inner.shared.record_action_error(&mut store, &err);
                Err(err)
            }
        }
    }

    /// Wait for the active stream's read loop to finish.
    pub async fn wait(&self) {
        let task = self
            .inner
            .lock_active()
            .as_mut()
            .and_then(|active| active.task.take());
        if let Some(task) = task {
            // Cancellation surfaces as a JoinError; nothing to report.
            let _ = task.await;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunNotice> {
        self.inner.shared.notices.subscribe()
    }

    pub fn snapshot(&self) -> RunState {
        self.inner.shared.lock().state.clone()
    }

    /// Borrowing read without cloning the whole state.
    pub fn read<R>(&self, f: impl FnOnce(&RunState) -> R) -> R {
        f(&self.inner.shared.lock().state)
    }

    pub fn status(&self) -> RunStatus {
        self.read(|s| s.status)
    }

    pub fn revision(&self) -> u64 {
        self.inner.shared.lock().revision
    }

    pub fn action_in_flight(&self) -> bool {
        self.inner.shared.lock().action_in_flight
    }

    /// Scrub the frame view. Out-of-range indices clamp to the last frame.
    pub fn select_frame(&self, index: usize) -> Option<usize> {
        let mut store = self.inner.shared.lock();
        let before = store.state.current_frame_index;
        let selected = store.state.select_frame(index);
        if selected.is_some_and(|i| i != before) {
            self.inner.shared.publish(&mut store, Applied::Updated);
        }
        selected
    }

    pub fn dismiss_action_error(&self) {
        let mut store = self.inner.shared.lock();
        if store.state.action_error.take().is_some() {
            self.inner.shared.publish(&mut store, Applied::Updated);
        }
    }
}
