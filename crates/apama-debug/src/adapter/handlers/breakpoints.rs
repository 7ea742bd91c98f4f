//! Breakpoint handlers.
//! - handle_set_breakpoints: reconcile one file's complete line set
//! - handle_set_exception_breakpoints: map the uncaught filter to break-on-errors
//! - handle_breakpoints_changed: queue a live add/remove notification

use serde_json::Value;
use tracing::debug;

use crate::paths::{file_name, normalize_engine_path};
use crate::protocol::{
    Breakpoint, BreakpointsChangedArguments, Request, SetBreakpointsArguments,
    SetBreakpointsResponseBody, SetExceptionBreakpointsArguments, Source,
};
use crate::reconciler::{BreakpointChange, SourceLine};

use super::super::{DebugAdapter, DispatchOutcome};
use super::initialize::UNCAUGHT_FILTER;

impl DebugAdapter {
    pub(in crate::adapter) fn handle_set_breakpoints(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<SetBreakpointsArguments>(value).ok())
        else {
            return self.fail(&request, "invalid setBreakpoints args");
        };
        let Some(path) = args.source.path.as_deref() else {
            return self.fail(&request, "setBreakpoints requires a source path");
        };
        let path = normalize_engine_path(path);

        let requested: Vec<u32> = match (&args.breakpoints, &args.lines) {
            (Some(breakpoints), _) => breakpoints.iter().map(|bp| bp.line).collect(),
            (None, Some(lines)) => lines.clone(),
            (None, None) => Vec::new(),
        };
        let lines: Vec<u32> = requested
            .into_iter()
            .filter_map(|line| self.coordinate.to_engine_line(line))
            .collect();

        let Some(engine) = self.engine.as_ref() else {
            return self.fail(&request, "no correlator session");
        };
        let confirmed = match engine.reconciler.reconcile_file(&path, &lines) {
            Ok(confirmed) => confirmed,
            Err(err) => {
                return self.fail(&request, &format!("failed to set breakpoints in {path}: {err}"))
            }
        };
        debug!(%path, requested = lines.len(), confirmed = confirmed.len(), "breakpoints set");

        let source = Source {
            name: Some(file_name(&path).to_string()),
            path: Some(path.clone()),
        };
        let breakpoints = confirmed
            .iter()
            .map(|bp| {
                Breakpoint::verified(
                    &bp.id,
                    self.coordinate.to_client_line(bp.line),
                    Some(source.clone()),
                )
            })
            .collect();
        self.reply(&request, Some(SetBreakpointsResponseBody { breakpoints }))
    }

    pub(in crate::adapter) fn handle_set_exception_breakpoints(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<SetExceptionBreakpointsArguments>(value).ok())
        else {
            return self.fail(&request, "invalid setExceptionBreakpoints args");
        };
        let Some(engine) = self.engine.as_ref() else {
            return self.fail(&request, "no correlator session");
        };
        let enabled = args.filters.iter().any(|filter| filter == UNCAUGHT_FILTER);
        match engine.client.set_break_on_errors(enabled) {
            Ok(()) => self.reply::<Value>(&request, None),
            Err(err) => self.fail(&request, &format!("failed to set break on errors: {err}")),
        }
    }

    pub(in crate::adapter) fn handle_breakpoints_changed(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<BreakpointsChangedArguments>(value).ok())
        else {
            return self.fail(&request, "invalid apamaBreakpointsChanged args");
        };
        let to_engine = |sites: Vec<SourceLine>| -> Vec<SourceLine> {
            sites
                .into_iter()
                .filter_map(|site| {
                    let line = self.coordinate.to_engine_line(site.line)?;
                    Some(SourceLine::new(site.path, line))
                })
                .collect()
        };
        let change = BreakpointChange {
            added: to_engine(args.added),
            removed: to_engine(args.removed),
        };
        if change.is_empty() {
            return self.reply::<Value>(&request, None);
        }
        if self.changes_tx.send(change).is_err() {
            return self.fail(&request, "breakpoint listener is not running");
        }
        self.reply::<Value>(&request, None)
    }
}
