//! Adapter core loop + request dispatch.
//! - DebugAdapter::new/state accessors
//! - run/run_stdio: protocol loop
//! - dispatch_request: state check, then route DAP requests
//! - response/event helpers
//! - end_session: ordered teardown of the engine side

use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;

use apama_correlator::EngineConfig;
use crossbeam_channel::{unbounded, Sender};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::protocol::{MessageType, Request, Response};
use crate::reconciler::BreakpointChange;
use crate::runtime::{EngineHost, PortRegistry};

use super::launch::SHUTDOWN_REASON;
use super::protocol_io::{open_protocol_log, read_message, ProtocolWriter};
use super::util::{env_flag, PROTOCOL_LOG_ENV, VERBOSE_ENV};
use super::{
    CoordinateConverter, DebugAdapter, DispatchOutcome, SessionState, StateCell, StopGate,
};

impl DebugAdapter {
    #[must_use]
    pub fn new(host: Arc<dyn EngineHost>, ports: PortRegistry, defaults: EngineConfig) -> Self {
        let (changes_tx, changes_rx) = unbounded();
        Self {
            host,
            ports,
            defaults,
            state: StateCell::new(),
            writer: ProtocolWriter::new(Box::new(io::stdout())),
            coordinate: CoordinateConverter::new(true, true),
            stop_gate: StopGate::new(),
            engine: None,
            changes_tx,
            changes_rx,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Sender for live breakpoint notifications, in correlator line numbers.
    ///
    /// Changes queue until a session is launched or attached.
    #[must_use]
    pub fn breakpoint_changes(&self) -> Sender<BreakpointChange> {
        self.changes_tx.clone()
    }

    /// Run a blocking stdio loop that processes DAP requests.
    pub fn run_stdio(&mut self) -> io::Result<()> {
        let stdin = io::stdin();
        self.run(BufReader::new(stdin.lock()), io::stdout())
    }

    /// Serves one frontend connection until it disconnects or the input ends.
    pub fn run<R, W>(&mut self, mut reader: R, output: W) -> io::Result<()>
    where
        R: BufRead,
        W: Write + Send + 'static,
    {
        self.writer.set_output(Box::new(output));
        let dap_log_path = std::env::var(PROTOCOL_LOG_ENV).ok();
        self.writer
            .set_logger(dap_log_path.as_deref().and_then(open_protocol_log));
        let dap_verbose = env_flag(VERBOSE_ENV);
        if dap_verbose {
            let hint = match dap_log_path.as_deref() {
                Some(path) => format!("[apama-debug] DAP verbose logging enabled; raw log: {path}"),
                None => format!(
                    "[apama-debug] DAP verbose logging enabled (set {PROTOCOL_LOG_ENV}=/path for raw)"
                ),
            };
            self.writer.send_output(hint, "console")?;
        }

        let result = self.serve(&mut reader, dap_verbose);
        if self.engine.is_some() {
            info!("frontend went away, ending session");
            if let Err(err) = self.end_session() {
                warn!(error = %err, "teardown after frontend exit failed");
            }
        }
        result
    }

    fn serve<R: BufRead>(&mut self, reader: &mut R, dap_verbose: bool) -> io::Result<()> {
        loop {
            let Some(payload) = read_message(reader)? else {
                if dap_verbose {
                    self.writer
                        .send_output("[apama-debug][dap] input closed", "console")?;
                }
                return Ok(());
            };
            self.writer.log_inbound(&payload);
            if dap_verbose {
                self.writer.send_output(
                    format!("[apama-debug][dap<-] len={} payload={payload}", payload.len()),
                    "console",
                )?;
            }

            let request: Request<Value> = match serde_json::from_str(&payload) {
                Ok(request) => request,
                Err(err) => {
                    warn!(error = %err, "ignoring malformed DAP message");
                    if dap_verbose {
                        self.writer.send_output(
                            format!("[apama-debug][dap] invalid json: {err} payload={payload}"),
                            "console",
                        )?;
                    }
                    continue;
                }
            };

            let mut outcome = self.dispatch_request(request);
            let stop_gate = outcome.stop_gate.take();
            if dap_verbose {
                self.writer.send_output(
                    format!(
                        "[apama-debug][dap] outcome: responses={} events={} should_exit={} state={}",
                        outcome.responses.len(),
                        outcome.events.len(),
                        outcome.should_exit,
                        self.state.get()
                    ),
                    "console",
                )?;
            }
            for response in &outcome.responses {
                self.writer.send(response)?;
            }
            for event in &outcome.events {
                self.writer.send(event)?;
            }
            drop(stop_gate);
            if outcome.should_exit {
                return Ok(());
            }
        }
    }

    pub(super) fn dispatch_request(&mut self, request: Request<Value>) -> DispatchOutcome {
        if request.message_type != MessageType::Request {
            return DispatchOutcome::default();
        }
        let state = self.state.get();
        debug!(seq = request.seq, command = %request.command, %state, "dispatch");

        let Some(accepting) = SessionState::accepting(&request.command) else {
            return self.fail(&request, &format!("unsupported command: {}", request.command));
        };
        if !accepting.contains(&state) {
            return self.fail(
                &request,
                &format!("{} is not valid while the session is {state}", request.command),
            );
        }

        match request.command.as_str() {
            "initialize" => self.handle_initialize(request),
            "launch" => self.handle_launch(request),
            "attach" => self.handle_attach(request),
            "configurationDone" => self.handle_configuration_done(request),
            "disconnect" => self.handle_disconnect(request),
            "setBreakpoints" => self.handle_set_breakpoints(request),
            "setExceptionBreakpoints" => self.handle_set_exception_breakpoints(request),
            "apamaBreakpointsChanged" => self.handle_breakpoints_changed(request),
            "threads" => self.handle_threads(request),
            "stackTrace" => self.handle_stack_trace(request),
            "scopes" => self.handle_scopes(request),
            "variables" => self.handle_variables(request),
            "continue" => self.handle_continue(request),
            "pause" => self.handle_pause(request),
            "next" => self.handle_next(request),
            "stepIn" => self.handle_step_in(request),
            "stepOut" => self.handle_step_out(request),
            _ => self.fail(&request, &format!("unsupported command: {}", request.command)),
        }
    }

    /// Tears the engine side down: cancel the watcher, release the listener,
    /// hand control back to the correlator, then stop a process we started.
    pub(super) fn end_session(&mut self) -> Result<(), String> {
        let Some(engine) = self.engine.take() else {
            return Ok(());
        };
        engine.watcher.cancel();
        engine.listener.stop();
        if let Err(err) = engine.client.resume() {
            debug!(error = %err, "ignoring failed resume during teardown");
        }
        if engine.debugging_enabled {
            if let Err(err) = engine.client.disable_debugging() {
                debug!(error = %err, "ignoring failed disable during teardown");
            }
        }
        let Some(mut lifecycle) = engine.lifecycle else {
            info!(endpoint = %engine.endpoint, "detached from correlator");
            return Ok(());
        };
        lifecycle
            .stop(SHUTDOWN_REASON, engine.shutdown_patience)
            .map_err(|err| format!("Error stopping correlator on {}: {err}", engine.endpoint))
    }

    pub(super) fn ok_response<T>(&self, request: &Request<Value>, body: Option<T>) -> Value
    where
        T: Serialize,
    {
        let body = body
            .map(|payload| serde_json::to_value(payload))
            .transpose()
            .unwrap_or(None);
        let response = Response {
            seq: self.writer.next_seq(),
            message_type: MessageType::Response,
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        };
        serde_json::to_value(response).unwrap_or(Value::Null)
    }

    pub(super) fn error_response(&self, request: &Request<Value>, message: &str) -> Value {
        let response: Response<Value> = Response {
            seq: self.writer.next_seq(),
            message_type: MessageType::Response,
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(message.to_string()),
            body: None,
        };
        serde_json::to_value(response).unwrap_or(Value::Null)
    }

    pub(super) fn event<T>(&self, name: &str, body: Option<T>) -> Value
    where
        T: Serialize,
    {
        self.writer.event(name, body)
    }

    pub(super) fn debug_output_message(&self, message: impl Into<String>) -> Value {
        self.writer.output_event(message.into(), "console")
    }

    pub(super) fn reply<T>(&self, request: &Request<Value>, body: Option<T>) -> DispatchOutcome
    where
        T: Serialize,
    {
        DispatchOutcome {
            responses: vec![self.ok_response(request, body)],
            ..DispatchOutcome::default()
        }
    }

    pub(super) fn fail(&self, request: &Request<Value>, message: &str) -> DispatchOutcome {
        debug!(command = %request.command, message, "request failed");
        DispatchOutcome {
            responses: vec![self.error_response(request, message)],
            ..DispatchOutcome::default()
        }
    }
}
