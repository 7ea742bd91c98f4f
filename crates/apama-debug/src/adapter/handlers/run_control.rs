//! Continue/pause/step handlers.
//! - handle_continue: resume execution
//! - handle_pause: request pause
//! - handle_next/step_in/step_out: stepping commands
//!
//! Each command is acknowledged once the correlator accepts it; the pause
//! watcher reports the stop that follows.

use apama_correlator::ProgressCommand;
use serde_json::Value;
use tracing::info;

use crate::protocol::{
    ContinueArguments, ContinueResponseBody, PauseArguments, Request, StepArguments,
};

use super::super::{DebugAdapter, DispatchOutcome, SessionState};

impl DebugAdapter {
    pub(in crate::adapter) fn handle_continue(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(_args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<ContinueArguments>(value).ok())
        else {
            return self.fail(&request, "invalid continue args");
        };
        self.resume_with(
            &request,
            ProgressCommand::Resume,
            Some(ContinueResponseBody {
                all_threads_continued: Some(true),
            }),
        )
    }

    pub(in crate::adapter) fn handle_pause(&mut self, request: Request<Value>) -> DispatchOutcome {
        let Some(args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<PauseArguments>(value).ok())
        else {
            return self.fail(&request, "invalid pause args");
        };
        let Some(engine) = self.engine.as_ref() else {
            return self.fail(&request, "no correlator session");
        };
        let stop_gate = self.stop_gate.enter();
        if let Err(err) = engine.client.pause() {
            return self.fail(&request, &format!("failed to pause correlator: {err}"));
        }
        info!(thread = args.thread_id, "pause requested");
        engine.watcher.arm();
        DispatchOutcome {
            responses: vec![self.ok_response::<Value>(&request, None)],
            events: vec![self.debug_output_message("[apama-debug] pause requested")],
            stop_gate: Some(stop_gate),
            ..DispatchOutcome::default()
        }
    }

    pub(in crate::adapter) fn handle_next(&mut self, request: Request<Value>) -> DispatchOutcome {
        self.step(request, ProgressCommand::StepOver)
    }

    pub(in crate::adapter) fn handle_step_in(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        self.step(request, ProgressCommand::StepIn)
    }

    pub(in crate::adapter) fn handle_step_out(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        self.step(request, ProgressCommand::StepOut)
    }

    fn step(&mut self, request: Request<Value>, command: ProgressCommand) -> DispatchOutcome {
        let Some(_args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<StepArguments>(value).ok())
        else {
            return self.fail(&request, &format!("invalid {} args", request.command));
        };
        self.resume_with::<Value>(&request, command, None)
    }

    /// Issues a resume-type command, marks the session running and arms the watcher.
    fn resume_with<T>(
        &mut self,
        request: &Request<Value>,
        command: ProgressCommand,
        body: Option<T>,
    ) -> DispatchOutcome
    where
        T: serde::Serialize,
    {
        let Some(engine) = self.engine.as_ref() else {
            return self.fail(request, "no correlator session");
        };
        let stop_gate = self.stop_gate.enter();
        if let Err(err) = engine.client.progress(command) {
            return self.fail(request, &format!("{} failed: {err}", request.command));
        }
        self.state.set(SessionState::Running);
        engine.watcher.arm();
        DispatchOutcome {
            responses: vec![self.ok_response(request, body)],
            stop_gate: Some(stop_gate),
            ..DispatchOutcome::default()
        }
    }
}
