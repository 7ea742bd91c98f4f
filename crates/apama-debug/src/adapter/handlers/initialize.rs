//! Initialize/launch/configuration handlers.
//! - handle_initialize: client coordinates + advertised capabilities
//! - handle_launch: start, load and pause a correlator
//! - handle_attach: take over a running correlator
//! - handle_configuration_done: release the engine and start watching for pauses

use serde_json::Value;
use tracing::{info, warn};

use crate::protocol::{
    AttachArguments, Capabilities, ExceptionBreakpointsFilter, InitializeArguments,
    InitializeResponseBody, LaunchArguments, Request,
};

use super::super::launch::{attach_config, LaunchPlan};
use super::super::{CoordinateConverter, DebugAdapter, DispatchOutcome, SessionState};

pub(in crate::adapter) const UNCAUGHT_FILTER: &str = "uncaught";

impl DebugAdapter {
    pub(in crate::adapter) fn handle_initialize(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let args = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<InitializeArguments>(value).ok())
            .unwrap_or_default();

        self.coordinate = CoordinateConverter::new(
            args.lines_start_at1.unwrap_or(true),
            args.columns_start_at1.unwrap_or(true),
        );
        self.state.set(SessionState::Initialized);

        let capabilities = Capabilities {
            supports_configuration_done_request: Some(true),
            supports_function_breakpoints: Some(false),
            exception_breakpoint_filters: Some(vec![ExceptionBreakpointsFilter {
                filter: UNCAUGHT_FILTER.to_string(),
                label: "Uncaught Exceptions".to_string(),
                default: Some(true),
            }]),
        };
        info!(client = args.client_id.as_deref().unwrap_or("<unknown>"), "initialize");
        self.reply(&request, Some(InitializeResponseBody { capabilities }))
    }

    pub(in crate::adapter) fn handle_launch(&mut self, request: Request<Value>) -> DispatchOutcome {
        let Some(args) = request
            .arguments
            .clone()
            .map_or(Some(LaunchArguments::default()), |value| {
                serde_json::from_value::<LaunchArguments>(value).ok()
            })
        else {
            return self.fail(&request, "invalid launch args");
        };
        self.state.set(SessionState::Launching);

        let host = std::sync::Arc::clone(&self.host);
        let plan = LaunchPlan::resolve(&self.defaults, args, |folders| host.pick_folder(folders));
        let endpoint = plan
            .as_ref()
            .map_or_else(|_| self.defaults.endpoint(), |plan| plan.config.endpoint());
        match plan.and_then(|plan| self.start_engine(plan)) {
            Ok(()) => self.ready_for_configuration(&request),
            Err(err) => {
                warn!(%endpoint, error = %err, "launch failed");
                self.state.set(SessionState::Terminated);
                let message = format!("Error starting correlator on {endpoint}: {err}");
                DispatchOutcome {
                    responses: vec![self.error_response(&request, &message)],
                    events: vec![self.debug_output_message(format!("[apama-debug] {message}"))],
                    ..DispatchOutcome::default()
                }
            }
        }
    }

    pub(in crate::adapter) fn handle_attach(&mut self, request: Request<Value>) -> DispatchOutcome {
        let Some(args) = request
            .arguments
            .clone()
            .map_or(Some(AttachArguments::default()), |value| {
                serde_json::from_value::<AttachArguments>(value).ok()
            })
        else {
            return self.fail(&request, "invalid attach args");
        };
        self.state.set(SessionState::Launching);

        let (config, sync) = attach_config(&self.defaults, args);
        let endpoint = config.endpoint();
        match self.attach_engine(&config, sync) {
            Ok(()) => self.ready_for_configuration(&request),
            Err(err) => {
                warn!(%endpoint, error = %err, "attach failed");
                self.state.set(SessionState::Terminated);
                let message = format!("Error attaching to correlator on {endpoint}: {err}");
                DispatchOutcome {
                    responses: vec![self.error_response(&request, &message)],
                    events: vec![self.debug_output_message(format!("[apama-debug] {message}"))],
                    ..DispatchOutcome::default()
                }
            }
        }
    }

    /// The engine is paused and loaded; breakpoints may now be set.
    fn ready_for_configuration(&mut self, request: &Request<Value>) -> DispatchOutcome {
        self.state.set(SessionState::WaitingForConfiguration);
        let endpoint = self
            .engine
            .as_ref()
            .map(|engine| engine.endpoint.to_string())
            .unwrap_or_default();
        DispatchOutcome {
            responses: vec![self.ok_response::<Value>(request, None)],
            events: vec![
                self.debug_output_message(format!(
                    "[apama-debug] correlator on {endpoint} is paused, waiting for breakpoints"
                )),
                self.event("initialized", Option::<Value>::None),
            ],
            ..DispatchOutcome::default()
        }
    }

    pub(in crate::adapter) fn handle_configuration_done(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(engine) = self.engine.as_ref() else {
            return self.fail(&request, "no correlator session");
        };
        let stop_gate = self.stop_gate.enter();
        if let Err(err) = engine.client.resume() {
            return self.fail(&request, &format!("failed to resume correlator: {err}"));
        }
        self.state.set(SessionState::Running);
        engine.watcher.arm();
        DispatchOutcome {
            responses: vec![self.ok_response::<Value>(&request, None)],
            stop_gate: Some(stop_gate),
            ..DispatchOutcome::default()
        }
    }
}
