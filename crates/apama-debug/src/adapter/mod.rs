//! Debug adapter module map.
//! - core: main loop, dispatch, protocol events
//! - handlers: DAP request handlers by area
//! - launch: launch/attach planning and engine bring-up
//! - watcher: background await-pause loop
//! - listener: live breakpoint change consumer
//! - variables: variable filtering and naming
//! - protocol_io: message framing, shared writer, logging
//! - util: small shared helpers
//! - tests: adapter unit tests

mod core;
mod handlers;
mod launch;
mod listener;
mod protocol_io;
mod util;
mod variables;
mod watcher;

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use apama_correlator::{CorrelatorClient, EngineConfig, EngineEndpoint, EngineLifecycle};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use tracing::debug;

use crate::reconciler::{BreakpointChange, Reconciler};
use crate::runtime::{EngineHost, PortLease, PortRegistry};

use self::listener::BreakpointListener;
use self::protocol_io::ProtocolWriter;
use self::watcher::PauseWatcher;

/// Where a session is in the initialize/launch/configure/run/disconnect sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initialized,
    Launching,
    WaitingForConfiguration,
    Running,
    Paused,
    Terminating,
    Terminated,
}

use SessionState::{
    Idle, Initialized, Launching, Paused, Running, Terminated, Terminating, WaitingForConfiguration,
};

const CONFIGURED: &[SessionState] = &[WaitingForConfiguration, Running, Paused];
const ANY_STATE: &[SessionState] = &[
    Idle,
    Initialized,
    Launching,
    WaitingForConfiguration,
    Running,
    Paused,
    Terminating,
    Terminated,
];

/// Every request the adapter answers, with the states that accept it.
const DISPATCH_TABLE: &[(&str, &[SessionState])] = &[
    ("initialize", &[Idle]),
    ("launch", &[Initialized]),
    ("attach", &[Initialized]),
    ("setBreakpoints", CONFIGURED),
    ("setExceptionBreakpoints", CONFIGURED),
    ("apamaBreakpointsChanged", CONFIGURED),
    ("configurationDone", &[WaitingForConfiguration]),
    ("continue", &[Running, Paused]),
    ("next", &[Running, Paused]),
    ("stepIn", &[Running, Paused]),
    ("stepOut", &[Running, Paused]),
    ("pause", CONFIGURED),
    ("threads", CONFIGURED),
    ("stackTrace", CONFIGURED),
    ("scopes", CONFIGURED),
    ("variables", CONFIGURED),
    ("disconnect", ANY_STATE),
];

impl SessionState {
    /// States accepting `command`, or `None` for commands the adapter does not implement.
    fn accepting(command: &str) -> Option<&'static [SessionState]> {
        DISPATCH_TABLE
            .iter()
            .find(|(name, _)| *name == command)
            .map(|(_, states)| *states)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Idle => "idle",
            Initialized => "initialized",
            Launching => "launching",
            WaitingForConfiguration => "waiting for configuration",
            Running => "running",
            Paused => "paused",
            Terminating => "terminating",
            Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// Session state shared with the pause watcher.
#[derive(Debug, Clone)]
struct StateCell(Arc<Mutex<SessionState>>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(Idle)))
    }

    fn get(&self) -> SessionState {
        *self.0.lock()
    }

    fn set(&self, next: SessionState) {
        let mut state = self.0.lock();
        if *state != next {
            debug!(from = %*state, to = %next, "session state");
            *state = next;
        }
    }

    /// Moves to `next` only from `from`; returns whether it did.
    fn advance(&self, from: SessionState, next: SessionState) -> bool {
        let mut state = self.0.lock();
        if *state != from {
            return false;
        }
        debug!(from = %*state, to = %next, "session state");
        *state = next;
        true
    }
}

#[derive(Debug, Clone, Copy)]
struct CoordinateConverter {
    lines_start_at1: bool,
    columns_start_at1: bool,
}

impl CoordinateConverter {
    fn new(lines_start_at1: bool, columns_start_at1: bool) -> Self {
        Self {
            lines_start_at1,
            columns_start_at1,
        }
    }

    /// Correlator lines are 1-based.
    fn to_client_line(self, line: u32) -> u32 {
        if self.lines_start_at1 {
            line
        } else {
            line.saturating_sub(1)
        }
    }

    fn to_engine_line(self, line: u32) -> Option<u32> {
        if self.lines_start_at1 {
            (line > 0).then_some(line)
        } else {
            line.checked_add(1)
        }
    }

    fn default_column(self) -> u32 {
        u32::from(self.columns_start_at1)
    }
}

/// Everything a launched or attached session owns on the engine side.
struct EngineSession {
    endpoint: EngineEndpoint,
    client: CorrelatorClient,
    reconciler: Reconciler,
    /// `None` when attached to a correlator this adapter did not start.
    lifecycle: Option<EngineLifecycle>,
    debugging_enabled: bool,
    shutdown_patience: Option<Duration>,
    watcher: PauseWatcher,
    listener: BreakpointListener,
    _lease: PortLease,
}

/// DAP server for one frontend connection, driving one correlator.
pub struct DebugAdapter {
    host: Arc<dyn EngineHost>,
    ports: PortRegistry,
    defaults: EngineConfig,
    state: StateCell,
    writer: ProtocolWriter,
    coordinate: CoordinateConverter,
    stop_gate: StopGate,
    engine: Option<EngineSession>,
    changes_tx: Sender<BreakpointChange>,
    changes_rx: Receiver<BreakpointChange>,
}

#[derive(Debug, Default)]
struct DispatchOutcome {
    responses: Vec<Value>,
    events: Vec<Value>,
    should_exit: bool,
    stop_gate: Option<StopGateToken>,
}

/// Holds background stop events back until the response that caused them is written.
#[derive(Debug, Clone)]
struct StopGate {
    inner: Arc<StopGateInner>,
}

#[derive(Debug)]
struct StopGateInner {
    count: Mutex<usize>,
    cvar: Condvar,
}

#[derive(Debug)]
struct StopGateToken {
    inner: Arc<StopGateInner>,
}

impl StopGate {
    fn new() -> Self {
        Self {
            inner: Arc::new(StopGateInner {
                count: Mutex::new(0),
                cvar: Condvar::new(),
            }),
        }
    }

    fn enter(&self) -> StopGateToken {
        let mut count = self.inner.count.lock();
        *count = count.saturating_add(1);
        StopGateToken {
            inner: Arc::clone(&self.inner),
        }
    }

    fn wait_clear(&self) {
        let mut count = self.inner.count.lock();
        while *count > 0 {
            self.inner.cvar.wait(&mut count);
        }
    }
}

impl Drop for StopGateToken {
    fn drop(&mut self) {
        let mut count = self.inner.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.inner.cvar.notify_all();
        }
    }
}
