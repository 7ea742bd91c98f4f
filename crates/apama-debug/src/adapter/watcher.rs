//! Background pause notification.
//!
//! After every resume-type command the session arms the watcher, which
//! blocks in the correlator's long-poll until some context pauses and then
//! reports it. The thread lives as long as the session; teardown cancels the
//! in-flight wait instead of joining it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use apama_correlator::{CancelToken, ContextStatus, CorrelatorClient, EngineEndpoint, EngineError};
use crossbeam_channel::{unbounded, Sender};
use tracing::{debug, info, warn};

use crate::protocol::{StoppedEventBody, TerminatedEventBody};

use super::protocol_io::ProtocolWriter;
use super::{SessionState, StateCell, StopGate};

pub(super) struct PauseWatcher {
    arm: Sender<()>,
    armed: Arc<AtomicBool>,
    cancel: CancelToken,
}

pub(super) struct PauseWatcherConfig {
    pub client: CorrelatorClient,
    pub endpoint: EngineEndpoint,
    pub writer: ProtocolWriter,
    pub state: StateCell,
    pub stop_gate: StopGate,
}

/// What one await resolved to.
#[derive(Debug)]
enum WatchOutcome {
    Stopped(StoppedEventBody),
    NotPaused,
    EngineLost(String),
    Failed(String),
    Cancelled,
}

impl PauseWatcher {
    pub(super) fn spawn(config: PauseWatcherConfig) -> Self {
        let (arm, armed_rx) = unbounded::<()>();
        let armed = Arc::new(AtomicBool::new(false));
        let cancel = CancelToken::new();
        let thread_armed = Arc::clone(&armed);
        let thread_cancel = cancel.clone();
        thread::spawn(move || {
            while armed_rx.recv().is_ok() {
                let outcome = classify(config.client.await_pause(&thread_cancel));
                thread_armed.store(false, Ordering::SeqCst);
                config.stop_gate.wait_clear();
                if thread_cancel.is_cancelled() {
                    break;
                }
                if !report(&config, outcome) {
                    break;
                }
            }
            debug!("pause watcher exited");
        });
        Self { arm, armed, cancel }
    }

    /// Starts one await unless one is already pending.
    pub(super) fn arm(&self) {
        if self.armed.swap(true, Ordering::SeqCst) {
            debug!("pause watcher already armed");
            return;
        }
        if self.arm.send(()).is_err() {
            self.armed.store(false, Ordering::SeqCst);
            warn!("pause watcher is gone");
        }
    }

    /// Cancels the pending await; the thread exits without reporting.
    pub(super) fn cancel(self) {
        self.cancel.cancel();
    }
}

impl Drop for PauseWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn classify(result: Result<ContextStatus, EngineError>) -> WatchOutcome {
    match result {
        Ok(ContextStatus::Paused(paused)) => {
            let reason = if paused.reason.is_empty() {
                "pause".to_string()
            } else {
                paused.reason
            };
            WatchOutcome::Stopped(StoppedEventBody {
                reason,
                thread_id: Some(paused.context_id),
                all_threads_stopped: Some(true),
            })
        }
        Ok(ContextStatus::Running { .. }) => WatchOutcome::NotPaused,
        Err(EngineError::Cancelled) => WatchOutcome::Cancelled,
        Err(err) if err.is_connect() => WatchOutcome::EngineLost(err.to_string()),
        Err(err) => WatchOutcome::Failed(err.to_string()),
    }
}

/// Emits the events for `outcome`; `false` ends the watcher.
fn report(config: &PauseWatcherConfig, outcome: WatchOutcome) -> bool {
    let written = match outcome {
        WatchOutcome::Stopped(body) => {
            info!(reason = %body.reason, context = ?body.thread_id, "correlator paused");
            config.state.advance(SessionState::Running, SessionState::Paused);
            config.writer.send_event("stopped", Some(body))
        }
        WatchOutcome::NotPaused => {
            debug!("wait returned a running context, nothing to report");
            Ok(())
        }
        WatchOutcome::EngineLost(err) => {
            warn!(endpoint = %config.endpoint, error = %err, "lost correlator");
            config.writer.notify_output(
                format!("[apama-debug] lost connection to correlator on {}: {err}", config.endpoint),
                "console",
            );
            config
                .writer
                .notify_event("terminated", Some(TerminatedEventBody { restart: None }));
            return false;
        }
        WatchOutcome::Failed(err) => {
            warn!(error = %err, "waiting for pause failed");
            config.writer.send_output(
                format!("[apama-debug] waiting for the correlator to pause failed: {err}"),
                "console",
            )
        }
        WatchOutcome::Cancelled => return false,
    };
    written.is_ok()
}
