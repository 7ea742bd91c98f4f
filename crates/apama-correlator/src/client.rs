//! Remote engine client.
//! - CorrelatorClient: one method per debug capability of the REST surface
//! - CancelToken: stops an in-progress `await_pause` loop between polls

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, trace};

use crate::config::{ClientSettings, EngineEndpoint};
use crate::error::{EngineError, TransportError};
use crate::transport::{EngineCall, EngineTransport, UreqTransport};
use crate::types::{ContextStatus, EngineVariable, RemoteBreakpoint, StackTrace};
use crate::xml::{self, RequestBody};

const BREAKPOINTS: &str = "/correlator/debug/breakpoint";
const BREAKPOINT_LOCATION: &str = "/correlator/debug/breakpoint/location";
const BREAK_ON_ERRORS: &str = "/correlator/debug/breakpoint/errors";
const DEBUG_STATE: &str = "/correlator/debug/state";
const PROGRESS: &str = "/correlator/debug/progress";
const PROGRESS_WAIT: &str = "/correlator/debug/progress/wait";

/// Concurrent value fetches per batch in [`CorrelatorClient::monitor_variables`].
pub const MONITOR_FETCH_WORKERS: usize = 8;

/// Shared cancellation flag for long-running client loops.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress commands accepted by `/correlator/debug/progress/<command>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressCommand {
    Pause,
    Resume,
    StepIn,
    StepOver,
    StepOut,
}

impl ProgressCommand {
    fn resource(self) -> &'static str {
        match self {
            Self::Pause => "stop",
            Self::Resume => "run",
            Self::StepIn => "step",
            Self::StepOver => "stepover",
            Self::StepOut => "stepout",
        }
    }
}

/// Client for one correlator. Clones share the transport.
#[derive(Clone)]
pub struct CorrelatorClient {
    transport: Arc<dyn EngineTransport>,
}

impl fmt::Debug for CorrelatorClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelatorClient").finish_non_exhaustive()
    }
}

impl CorrelatorClient {
    #[must_use]
    pub fn new(transport: Arc<dyn EngineTransport>) -> Self {
        Self { transport }
    }

    /// Client over HTTP for `endpoint`.
    #[must_use]
    pub fn connect(endpoint: &EngineEndpoint, settings: ClientSettings) -> Self {
        Self::new(Arc::new(UreqTransport::new(endpoint, settings)))
    }

    fn send(&self, call: EngineCall<'_>) -> Result<String, TransportError> {
        let result = self.transport.send(call);
        if let Err(err) = &result {
            trace!(method = %call.method, path = call.path, error = %err, "correlator call failed");
        }
        result
    }

    /// Creates a breakpoint and returns its engine id.
    pub fn set_breakpoint(&self, filename: &str, line: u32) -> Result<String, EngineError> {
        let body = RequestBody::new()
            .prop("filename", filename)
            .prop("line", line)
            .prop("breakonce", false)
            .finish();
        let response = self.send(EngineCall::put(BREAKPOINT_LOCATION, &body))?;
        let doc = xml::parse(&response)?;
        let id = xml::path(xml::envelope(&doc), &[("list", "ids")])
            .map(|ids| xml::prop_text(ids, "id"))
            .unwrap_or_default();
        if id.is_empty() {
            return Err(EngineError::MissingField("id"));
        }
        debug!(filename, line, %id, "breakpoint set");
        Ok(id)
    }

    /// Best-effort delete; failures are logged and dropped.
    pub fn delete_breakpoint(&self, id: &str) {
        let path = format!("{BREAKPOINT_LOCATION}/{}", urlencoding::encode(id));
        match self.send(EngineCall::delete(&path)) {
            Ok(_) => debug!(%id, "breakpoint deleted"),
            Err(err) => debug!(%id, error = %err, "ignoring failed breakpoint delete"),
        }
    }

    pub fn list_breakpoints(&self) -> Result<Vec<RemoteBreakpoint>, EngineError> {
        let response = self.send(EngineCall::get(BREAKPOINTS))?;
        let doc = xml::parse(&response)?;
        let Some(list) = xml::path(xml::envelope(&doc), &[("list", "breakpoints")]) else {
            return Ok(Vec::new());
        };
        Ok(xml::children(list, "map", "filebreakpoint")
            .map(RemoteBreakpoint::from_node)
            .collect())
    }

    pub fn enable_debugging(&self) -> Result<(), EngineError> {
        let body = xml::empty_request();
        self.send(EngineCall::put(DEBUG_STATE, &body))?;
        Ok(())
    }

    pub fn disable_debugging(&self) -> Result<(), EngineError> {
        self.send(EngineCall::delete(DEBUG_STATE))?;
        Ok(())
    }

    /// Issues a progress command; returns once the engine acknowledges it.
    pub fn progress(&self, command: ProgressCommand) -> Result<(), EngineError> {
        let path = format!("{PROGRESS}/{}", command.resource());
        let body = xml::empty_request();
        self.send(EngineCall::put(&path, &body))?;
        debug!(?command, "progress command acknowledged");
        Ok(())
    }

    pub fn pause(&self) -> Result<(), EngineError> {
        self.progress(ProgressCommand::Pause)
    }

    pub fn resume(&self) -> Result<(), EngineError> {
        self.progress(ProgressCommand::Resume)
    }

    pub fn step_in(&self) -> Result<(), EngineError> {
        self.progress(ProgressCommand::StepIn)
    }

    pub fn step_over(&self) -> Result<(), EngineError> {
        self.progress(ProgressCommand::StepOver)
    }

    pub fn step_out(&self) -> Result<(), EngineError> {
        self.progress(ProgressCommand::StepOut)
    }

    /// Blocks until some context reports progress.
    ///
    /// Each long-poll that expires client-side is reissued. Any other
    /// failure, or cancellation observed between polls, ends the wait.
    pub fn await_pause(&self, cancel: &CancelToken) -> Result<ContextStatus, EngineError> {
        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            match self.send(EngineCall::get(PROGRESS_WAIT).long_poll()) {
                Ok(response) => {
                    if cancel.is_cancelled() {
                        return Err(EngineError::Cancelled);
                    }
                    let doc = xml::parse(&response)?;
                    let node = xml::path(xml::envelope(&doc), &[("map", "contextprogress")])
                        .ok_or(EngineError::MissingField("contextprogress"))?;
                    return Ok(ContextStatus::from_node(node));
                }
                Err(err) if err.is_timeout() => {
                    trace!("progress wait expired, polling again");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn context_statuses(&self) -> Result<Vec<ContextStatus>, EngineError> {
        let response = self.send(EngineCall::get(PROGRESS))?;
        let doc = xml::parse(&response)?;
        let Some(list) = xml::path(xml::envelope(&doc), &[("list", "progress")]) else {
            return Ok(Vec::new());
        };
        Ok(xml::children(list, "map", "contextprogress")
            .map(ContextStatus::from_node)
            .collect())
    }

    pub fn stack_trace(&self, context_id: u32) -> Result<StackTrace, EngineError> {
        let path = format!("{PROGRESS}/stack/id:{context_id}");
        let response = self.send(EngineCall::get(&path))?;
        let doc = xml::parse(&response)?;
        Ok(xml::path(xml::envelope(&doc), &[("list", "stack")])
            .map(StackTrace::from_node)
            .unwrap_or_default())
    }

    pub fn local_variables(
        &self,
        context_id: u32,
        frame_index: u32,
    ) -> Result<Vec<EngineVariable>, EngineError> {
        let path = format!("{PROGRESS}/locals/id:{context_id};{frame_index}");
        let response = self.send(EngineCall::get(&path))?;
        let doc = xml::parse(&response)?;
        let Some(list) = xml::path(xml::envelope(&doc), &[("list", "locals")]) else {
            return Ok(Vec::new());
        };
        Ok(xml::children(list, "map", "variable")
            .map(EngineVariable::from_node)
            .collect())
    }

    /// Variables of a monitor instance.
    ///
    /// The listing carries names and types only; each value is fetched with
    /// its own request. Those requests run concurrently, at most
    /// [`MONITOR_FETCH_WORKERS`] at a time, and the result keeps the listing
    /// order.
    pub fn monitor_variables(
        &self,
        context_id: u32,
        instance: u32,
    ) -> Result<Vec<EngineVariable>, EngineError> {
        let path = format!("/correlator/contexts/id:{context_id}/{instance}");
        let response = self.send(EngineCall::get(&path))?;
        let doc = xml::parse(&response)?;
        let listing: Vec<(String, String)> =
            match xml::path(xml::envelope(&doc), &[("list", "mthread")]) {
                Some(list) => xml::children(list, "map", "variable")
                    .map(|node| (xml::prop_text(node, "name"), xml::prop_text(node, "type")))
                    .collect(),
                None => Vec::new(),
            };

        let mut values: Vec<Result<String, EngineError>> = Vec::with_capacity(listing.len());
        for batch in listing.chunks(MONITOR_FETCH_WORKERS) {
            thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|(name, _)| {
                        scope.spawn(move || self.monitor_variable_value(context_id, instance, name))
                    })
                    .collect();
                values.extend(handles.into_iter().map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(EngineError::Transport(TransportError::Io(
                            "variable fetch panicked".to_string(),
                        )))
                    })
                }));
            });
        }

        listing
            .into_iter()
            .zip(values)
            .map(|((name, kind), value)| {
                Ok(EngineVariable {
                    name,
                    kind,
                    value: value?,
                })
            })
            .collect()
    }

    pub fn monitor_variable_value(
        &self,
        context_id: u32,
        instance: u32,
        name: &str,
    ) -> Result<String, EngineError> {
        let path = format!(
            "/correlator/contexts/id:{context_id}/{instance}/{}",
            urlencoding::encode(name)
        );
        let response = self.send(EngineCall::get(&path))?;
        let doc = xml::parse(&response)?;
        Ok(xml::prop_text(xml::envelope(&doc), "value"))
    }

    /// PUT to enable, DELETE to disable.
    pub fn set_break_on_errors(&self, enabled: bool) -> Result<(), EngineError> {
        if enabled {
            let body = xml::empty_request();
            self.send(EngineCall::put(BREAK_ON_ERRORS, &body))?;
        } else {
            self.send(EngineCall::delete(BREAK_ON_ERRORS))?;
        }
        Ok(())
    }
}
