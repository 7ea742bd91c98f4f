//! Variable presentation.
//! - present_variables: drop placeholders and internal names, disambiguate repeats
//! - handle_variables: `variables` request for both scope kinds

use std::collections::HashMap;

use apama_correlator::{ContextStatus, EngineVariable};
use serde_json::Value;

use crate::codec::{decode_frame, decode_variables, ScopeKind};
use crate::protocol::{Request, Variable, VariablesArguments, VariablesResponseBody};

use super::{DebugAdapter, DispatchOutcome};

const UNINITIALIZED: &str = "<uninitialized>";
const INTERNAL_PREFIX: &str = "::";

/// Filters engine variables and renames the 2nd and later occurrences of a
/// name to `name#2`, `name#3`, keeping listing order.
pub(super) fn present_variables(variables: Vec<EngineVariable>) -> Vec<Variable> {
    let mut seen: HashMap<String, u32> = HashMap::new();
    variables
        .into_iter()
        .filter(|var| var.value != UNINITIALIZED && !var.name.starts_with(INTERNAL_PREFIX))
        .map(|var| {
            let count = seen.entry(var.name.clone()).or_insert(0);
            *count += 1;
            let name = if *count == 1 {
                var.name
            } else {
                format!("{}#{count}", var.name)
            };
            Variable {
                name,
                value: var.value,
                r#type: (!var.kind.is_empty()).then_some(var.kind),
                variables_reference: 0,
            }
        })
        .collect()
}

impl DebugAdapter {
    pub(in crate::adapter) fn handle_variables(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<VariablesArguments>(value).ok())
        else {
            return self.fail(&request, "invalid variables args");
        };
        let (frame_id, kind) = match decode_variables(args.variables_reference) {
            Ok(decoded) => decoded,
            Err(err) => return self.fail(&request, &err.to_string()),
        };
        let frame = decode_frame(frame_id);
        let Some(engine) = self.engine.as_ref() else {
            return self.fail(&request, "no correlator session");
        };

        let statuses = match engine.client.context_statuses() {
            Ok(statuses) => statuses,
            Err(err) => return self.fail(&request, &format!("failed to read contexts: {err}")),
        };
        let Some(status) = statuses
            .iter()
            .find(|status| status.context_id() == frame.context_id)
        else {
            return self.fail(&request, &format!("unknown context {}", frame.context_id));
        };
        let ContextStatus::Paused(paused) = status else {
            return self.fail(&request, &format!("context {} is not paused", frame.context_id));
        };

        let listing = match kind {
            ScopeKind::Local => engine
                .client
                .local_variables(frame.context_id, frame.frame_index),
            ScopeKind::Monitor => engine
                .client
                .monitor_variables(frame.context_id, paused.instance),
        };
        match listing {
            Ok(variables) => {
                let body = VariablesResponseBody {
                    variables: present_variables(variables),
                };
                self.reply(&request, Some(body))
            }
            Err(err) => self.fail(
                &request,
                &format!("failed to read {} variables: {err}", kind.label().to_lowercase()),
            ),
        }
    }
}
