//! Execution control: sequences run/pause/step/stop against the remote
//! machine and republishes every result to the session.

use crate::machine::Machine;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::{Mutex, RwLock};
use sicide_core::protocol::ServerMessage;
use sicide_core::{
    CompileError, Error, ErrorOrigin, ExecutionState, LoadReport, LoadRequest, MachineMode,
    MemoryWindow, Result, Session, StepVerdict,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, MutexGuard, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_DELAY_MS: f64 = 1000.0;
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub mode: MachineMode,
    pub request: LoadRequest,
    pub delay_ms: f64,
    pub project_root: Option<PathBuf>,
    pub memory: MemoryWindow,
}

/// Accepts delays that are non-negative and fit in a [`Duration`].
pub fn validate_delay(ms: f64) -> Result<f64> {
    match Duration::try_from_secs_f64(ms / 1000.0) {
        Ok(_) => Ok(ms),
        Err(_) => Err(Error::InvalidDelay(ms)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Pause = 1,
    Stop = 2,
}

/// Cooperative cancellation for one continuous run.
#[derive(Debug, Default)]
struct RunSignal {
    requested: AtomicU8,
    wake: Notify,
}

impl RunSignal {
    fn request(&self, halt: Halt) {
        // a stop is never downgraded to a pause
        self.requested.fetch_max(halt as u8, Ordering::AcqRel);
        self.wake.notify_one();
    }

    fn requested(&self) -> Option<Halt> {
        match self.requested.load(Ordering::Acquire) {
            1 => Some(Halt::Pause),
            2 => Some(Halt::Stop),
            _ => None,
        }
    }
}

struct RunHandle {
    signal: Arc<RunSignal>,
    task: JoinHandle<()>,
}

pub struct Controller<M: Machine> {
    machine: M,
    mode: MachineMode,
    request: LoadRequest,
    session: RwLock<Session>,
    state: Mutex<ExecutionState>,
    /// Held while a load, step or reset is outstanding.
    in_flight: tokio::sync::Mutex<()>,
    delay_ms: AtomicU64,
    run: Mutex<Option<RunHandle>>,
    events: broadcast::Sender<ServerMessage>,
}

impl<M: Machine> Controller<M> {
    pub fn new(machine: M, settings: ControllerSettings) -> Result<Self> {
        let delay_ms = validate_delay(settings.delay_ms)?;
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            machine,
            mode: settings.mode,
            request: settings.request,
            session: RwLock::new(Session::new(settings.project_root, settings.memory)),
            state: Mutex::new(ExecutionState::Idle),
            in_flight: tokio::sync::Mutex::new(()),
            delay_ms: AtomicU64::new(delay_ms.to_bits()),
            run: Mutex::new(None),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ExecutionState {
        *self.state.lock()
    }

    /// Read-only access for views.
    pub fn with_session<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        f(&self.session.read())
    }

    pub fn snapshot(&self) -> Vec<ServerMessage> {
        let state = self.state();
        self.with_session(|session| ServerMessage::snapshot(state, session))
    }

    pub fn delay(&self) -> Duration {
        let ms = f64::from_bits(self.delay_ms.load(Ordering::Acquire));
        Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::MAX)
    }

    /// Changes the continuous-run delay; the running loop picks it up on its
    /// next iteration.
    pub fn set_delay(&self, ms: f64) -> Result<()> {
        let ms = validate_delay(ms)?;
        self.delay_ms.store(ms.to_bits(), Ordering::Release);
        info!(ms, "step delay changed");
        Ok(())
    }

    fn publish(&self, message: ServerMessage) {
        let _ = self.events.send(message);
    }

    fn publish_with(&self, build: impl FnOnce(&Session) -> ServerMessage) {
        let message = self.with_session(build);
        self.publish(message);
    }

    fn set_state(&self, next: ExecutionState) {
        let previous = std::mem::replace(&mut *self.state.lock(), next);
        if previous != next {
            info!(from = %previous, to = %next, "execution state");
        }
        self.publish(ServerMessage::State { state: next });
    }

    fn notice(&self, err: &Error) {
        self.publish(ServerMessage::Notice {
            message: err.to_string(),
        });
    }

    fn begin_call(&self) -> Result<MutexGuard<'_, ()>> {
        self.in_flight.try_lock().map_err(|_| Error::Busy)
    }

    /// Starts continuous execution, loading the program first if needed.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        let _call = self.begin_call()?;
        match self.state() {
            ExecutionState::Running | ExecutionState::Loading => return Err(Error::Busy),
            ExecutionState::Idle | ExecutionState::Stopped => {
                if !self.load_program().await? {
                    return Ok(());
                }
            }
            ExecutionState::Ready | ExecutionState::Paused => {}
        }

        self.set_state(ExecutionState::Running);
        let signal = Arc::new(RunSignal::default());
        let task = tokio::spawn(Arc::clone(self).drive(Arc::clone(&signal)));
        *self.run.lock() = Some(RunHandle { signal, task });
        Ok(())
    }

    /// Executes one instruction, or loads the program when nothing is loaded.
    pub async fn step(&self) -> Result<()> {
        let _call = self.begin_call()?;
        match self.state() {
            ExecutionState::Running | ExecutionState::Loading => Err(Error::Busy),
            ExecutionState::Idle | ExecutionState::Stopped => {
                self.load_program().await?;
                Ok(())
            }
            ExecutionState::Ready | ExecutionState::Paused => {
                self.set_state(ExecutionState::Running);
                match self.step_and_refresh().await {
                    Ok(StepVerdict::Finished) => {
                        info!("program finished");
                        self.reset("program finished").await;
                        Ok(())
                    }
                    Ok(_) => {
                        self.set_state(ExecutionState::Paused);
                        Ok(())
                    }
                    Err(err) => {
                        error!(error = %err, "step failed");
                        self.notice(&err);
                        self.reset("step failure").await;
                        Err(err)
                    }
                }
            }
        }
    }

    /// Asks the running loop to pause and waits until it has.
    pub async fn pause(&self) -> Result<()> {
        let handle = self.run.lock().take();
        match handle {
            Some(handle) if !handle.task.is_finished() => {
                handle.signal.request(Halt::Pause);
                if let Err(err) = handle.task.await {
                    warn!(error = %err, "run loop ended abnormally");
                }
                Ok(())
            }
            _ => match self.state() {
                ExecutionState::Ready | ExecutionState::Paused => Ok(()),
                ExecutionState::Running | ExecutionState::Loading => Err(Error::Busy),
                state => Err(Error::InvalidTransition {
                    state: state.as_str(),
                    action: "pause",
                }),
            },
        }
    }

    /// Stops the loop (after any in-flight step is applied), resets the
    /// remote machine and clears the session.
    pub async fn stop(&self) -> Result<()> {
        let handle = self.run.lock().take();
        if let Some(handle) = handle {
            handle.signal.request(Halt::Stop);
            if let Err(err) = handle.task.await {
                warn!(error = %err, "run loop ended abnormally");
            }
        }
        let _call = self.begin_call()?;
        self.reset("stop requested").await;
        Ok(())
    }

    pub fn toggle_breakpoint(&self, file: &str, row: usize) -> bool {
        let now_set = self.session.write().listings.toggle_breakpoint(file, row);
        debug!(file, row, now_set, "breakpoint toggled");
        self.publish_with(ServerMessage::listings);
        now_set
    }

    pub fn select_listing(&self, file: &str) -> bool {
        let selected = self.session.write().listings.select(file);
        if selected {
            self.publish(ServerMessage::ActiveListing {
                file: file.to_string(),
            });
        }
        selected
    }

    /// Moves the memory window; reads it right away when the machine is idle
    /// between steps, otherwise the next step refreshes it.
    pub async fn set_memory_window(&self, start: u32, end: u32) -> Result<()> {
        self.session.write().set_memory_window(start, end)?;
        let idle_between_steps = matches!(
            self.state(),
            ExecutionState::Ready | ExecutionState::Paused
        );
        if idle_between_steps {
            if let Ok(_call) = self.begin_call() {
                self.refresh_memory(start, end).await;
            }
        }
        self.publish_with(ServerMessage::memory);
        Ok(())
    }

    /// Live diagnostics: replaces `syntax` errors per checked file and never
    /// touches `load` errors.
    pub async fn check_syntax(&self, texts: Vec<String>, file_names: Vec<String>) -> Result<()> {
        if texts.is_empty() || texts.len() != file_names.len() {
            return Err(Error::MismatchedSources {
                texts: texts.len(),
                files: file_names.len(),
            });
        }
        let results = self.machine.syntax_check(texts, file_names).await?;
        {
            let mut session = self.session.write();
            for result in results {
                let errors = result
                    .compile_errors
                    .iter()
                    .map(|e| CompileError::from_assembler(e, ErrorOrigin::Syntax))
                    .collect();
                session
                    .errors
                    .replace_origin(&result.file_name, ErrorOrigin::Syntax, errors);
            }
        }
        self.publish_with(ServerMessage::errors);
        Ok(())
    }

    /// begin + load. Returns whether a program is now loaded.
    async fn load_program(&self) -> Result<bool> {
        if self.request.file_paths.is_empty() {
            return Err(Error::NoProject);
        }
        self.set_state(ExecutionState::Loading);
        info!(files = self.request.file_paths.len(), mode = %self.mode, "loading program");

        let outcome = match self.begin_and_load().await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "load failed");
                self.notice(&err);
                self.set_state(ExecutionState::Idle);
                return Err(err);
            }
        };

        let report = self.session.write().apply_load(outcome);
        self.publish_with(ServerMessage::errors);
        match report {
            LoadReport::Failed { reveal } => {
                warn!("program did not assemble");
                if let Some(location) = reveal {
                    self.publish(ServerMessage::Reveal {
                        file: location.file,
                        row: location.row,
                        col: location.col,
                    });
                }
                self.set_state(ExecutionState::Idle);
                Ok(false)
            }
            LoadReport::Loaded => {
                self.publish_with(ServerMessage::registers);
                self.publish_with(ServerMessage::listings);
                self.refresh_views().await;
                self.set_state(ExecutionState::Ready);
                Ok(true)
            }
        }
    }

    async fn begin_and_load(&self) -> Result<sicide_core::LoadOutcome> {
        self.machine.begin(self.mode).await?;
        self.machine.load(&self.request).await
    }

    /// One remote step, applied to the session, followed by the view refresh.
    async fn step_and_refresh(&self) -> Result<StepVerdict> {
        let snapshot = self.machine.step().await?;
        let report = self.session.write().apply_step(snapshot);
        debug!(verdict = ?report.verdict, changed = ?report.changed, "stepped");

        self.publish_with(ServerMessage::registers);
        if let Some(file) = report.focused {
            self.publish(ServerMessage::ActiveListing { file });
        }
        if report.verdict != StepVerdict::Finished {
            self.refresh_views().await;
        }
        Ok(report.verdict)
    }

    /// Memory window and every watch, read concurrently.
    async fn refresh_views(&self) {
        let (start, end, reads) = self.with_session(|session| {
            let window = session.memory();
            (window.start, window.end, session.watches.reads())
        });

        let watches = async {
            let mut pending: FuturesUnordered<_> = reads
                .into_iter()
                .map(|read| async move { (read, self.machine.memory(read.start, read.end).await) })
                .collect();
            while let Some((read, result)) = pending.next().await {
                match result {
                    Ok(bytes) => {
                        self.session.read().watches.store(read.address, bytes);
                    }
                    Err(err) => warn!(address = read.address, error = %err, "watch refresh failed"),
                }
            }
        };

        tokio::join!(self.refresh_memory(start, end), watches);
        self.publish_with(ServerMessage::memory);
        self.publish_with(ServerMessage::watches);
    }

    async fn refresh_memory(&self, start: u32, end: u32) {
        match self.machine.memory(start, end).await {
            Ok(values) => {
                self.session.write().store_memory(start, end, values);
            }
            Err(err) => warn!(start, end, error = %err, "memory window refresh failed"),
        }
    }

    /// Shared cleanup of stop, halt and transport failure.
    async fn reset(&self, reason: &str) {
        self.set_state(ExecutionState::Stopped);
        if let Err(err) = self.machine.begin(self.mode).await {
            warn!(error = %err, reason, "simulator reset failed");
        }
        self.session.write().clear();
        self.publish_with(ServerMessage::registers);
        self.publish_with(ServerMessage::listings);
        self.publish_with(ServerMessage::watches);
        self.publish_with(ServerMessage::memory);
        self.set_state(ExecutionState::Idle);
    }

    /// The continuous-run loop. Halt requests are checked before the delay
    /// and again after waking; a step already sent is always applied.
    async fn drive(self: Arc<Self>, signal: Arc<RunSignal>) {
        info!(delay = ?self.delay(), "run loop started");
        loop {
            if signal.requested().is_some() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.delay()) => {}
                _ = signal.wake.notified() => {}
            }
            if signal.requested().is_some() {
                break;
            }
            // user transitions are excluded by `Running`; this only waits out
            // a caller that is still returning
            let _call = self.in_flight.lock().await;
            if signal.requested().is_some() {
                break;
            }

            match self.step_and_refresh().await {
                Ok(StepVerdict::Continue) => {}
                Ok(StepVerdict::BreakpointHit { file, row }) => {
                    info!(%file, row, "breakpoint hit");
                    self.set_state(ExecutionState::Paused);
                    return;
                }
                Ok(StepVerdict::Finished) => {
                    info!("program finished");
                    self.reset("program finished").await;
                    return;
                }
                Err(err) => {
                    error!(error = %err, "step failed, stopping");
                    self.notice(&err);
                    self.reset("step failure").await;
                    return;
                }
            }
        }

        match signal.requested() {
            Some(Halt::Pause) => {
                info!("run loop paused");
                self.set_state(ExecutionState::Paused);
            }
            // the stopping caller resets once this task has ended
            Some(Halt::Stop) | None => info!("run loop stopped"),
        }
    }
}
