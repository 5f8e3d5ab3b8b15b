//! Periodic reporting scheduler.
//!
//! Runs a report function at a fixed interval on a single task, for
//! recurring sends such as location updates. The scheduler supports:
//! - Immediate reports on request
//! - Pause and resume
//! - Explicit stop, which hosts must call on teardown
//!
//! Failed reports are logged and counted; the next attempt still waits for
//! the next tick.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct ReportingConfig {
    /// Time between reports.
    pub interval: Duration,
    /// Report once as soon as the scheduler starts.
    pub report_on_start: bool,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            report_on_start: true,
        }
    }
}

impl ReportingConfig {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Builder: skip the initial report.
    pub fn without_initial_report(mut self) -> Self {
        self.report_on_start = false;
        self
    }
}

/// Commands that can be sent to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportingCommand {
    ReportNow,
    Pause,
    Resume,
    Stop,
}

/// Scheduler counters.
#[derive(Debug, Clone, Default)]
pub struct ReportingState {
    pub paused: bool,
    pub reports: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub last_report: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ReportingState {
    /// Records a successful report.
    pub fn record_success(&mut self) {
        self.reports += 1;
        self.consecutive_failures = 0;
        self.last_report = Some(Utc::now());
        self.last_error = None;
    }

    /// Records a failed report.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.failures += 1;
        self.consecutive_failures += 1;
        self.last_error = Some(error.into());
    }
}

type SharedState = Arc<RwLock<ReportingState>>;

/// Fixed-interval report loop.
pub struct ReportingScheduler {
    config: ReportingConfig,
    state: SharedState,
    command_tx: mpsc::Sender<ReportingCommand>,
    command_rx: mpsc::Receiver<ReportingCommand>,
}

impl ReportingScheduler {
    pub fn new(config: ReportingConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        Self {
            config,
            state: Arc::new(RwLock::new(ReportingState::default())),
            command_tx,
            command_rx,
        }
    }

    /// Returns a handle for controlling the scheduler.
    pub fn handle(&self) -> ReportingHandle {
        ReportingHandle {
            command_tx: self.command_tx.clone(),
            state: self.state.clone(),
        }
    }

    /// Spawns the loop on the current runtime and returns a handle to it.
    pub fn spawn<F, Fut, E>(self, report: F) -> (ReportingHandle, JoinHandle<()>)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: std::fmt::Display + 'static,
    {
        let handle = self.handle();
        let task = tokio::spawn(self.run(report));
        (handle, task)
    }

    /// Runs the loop until stopped or until every handle is dropped.
    pub async fn run<F, Fut, E>(self, report: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        let Self {
            config,
            state,
            command_tx,
            mut command_rx,
        } = self;
        // only external handles keep the loop alive
        drop(command_tx);

        info!(interval_secs = config.interval.as_secs(), "reporting started");

        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !config.report_on_start {
            ticker.tick().await;
        }

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if state.read().await.paused {
                        debug!("reporting paused, skipping tick");
                        continue;
                    }
                    do_report(&state, &report).await;
                }
                command = command_rx.recv() => match command {
                    Some(ReportingCommand::ReportNow) => {
                        debug!("report requested");
                        do_report(&state, &report).await;
                    }
                    Some(ReportingCommand::Pause) => {
                        info!("reporting paused");
                        state.write().await.paused = true;
                    }
                    Some(ReportingCommand::Resume) => {
                        info!("reporting resumed");
                        state.write().await.paused = false;
                    }
                    Some(ReportingCommand::Stop) | None => {
                        info!("reporting stopped");
                        break;
                    }
                },
            }
        }
    }
}

async fn do_report<F, Fut, E>(state: &SharedState, report: &F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    match report().await.map_err(|e| e.to_string()) {
        Ok(()) => {
            debug!("report sent");
            state.write().await.record_success();
        }
        Err(e) => {
            let mut state = state.write().await;
            warn!(
                error = %e,
                consecutive_failures = state.consecutive_failures + 1,
                "report failed"
            );
            state.record_failure(e);
        }
    }
}

/// Handle for controlling a running scheduler.
#[derive(Clone, Debug)]
pub struct ReportingHandle {
    command_tx: mpsc::Sender<ReportingCommand>,
    state: SharedState,
}

type CommandResult = Result<(), mpsc::error::SendError<ReportingCommand>>;

impl ReportingHandle {
    /// Triggers an immediate report.
    pub async fn report_now(&self) -> CommandResult {
        self.command_tx.send(ReportingCommand::ReportNow).await
    }

    pub async fn pause(&self) -> CommandResult {
        self.command_tx.send(ReportingCommand::Pause).await
    }

    pub async fn resume(&self) -> CommandResult {
        self.command_tx.send(ReportingCommand::Resume).await
    }

    /// Stops the scheduler. Succeeds if it already stopped.
    pub async fn stop(&self) {
        let _ = self.command_tx.send(ReportingCommand::Stop).await;
    }

    /// Returns a snapshot of the counters.
    pub async fn state(&self) -> ReportingState {
        self.state.read().await.clone()
    }

    pub async fn is_paused(&self) -> bool {
        self.state.read().await.paused
    }
}
