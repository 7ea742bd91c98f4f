//! Scope requests.
//! - handle_scopes: "Local" and "Monitor" for every frame

use serde_json::Value;

use crate::codec::{encode_variables, ScopeKind};
use crate::protocol::{Request, Scope, ScopesArguments, ScopesResponseBody};

use super::super::{DebugAdapter, DispatchOutcome};

impl DebugAdapter {
    pub(in crate::adapter) fn handle_scopes(&mut self, request: Request<Value>) -> DispatchOutcome {
        let Some(args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<ScopesArguments>(value).ok())
        else {
            return self.fail(&request, "invalid scopes args");
        };

        let mut scopes = Vec::with_capacity(2);
        for kind in [ScopeKind::Local, ScopeKind::Monitor] {
            match encode_variables(args.frame_id, kind) {
                Ok(reference) => scopes.push(Scope {
                    name: kind.label().to_string(),
                    variables_reference: reference,
                    expensive: false,
                }),
                Err(err) => return self.fail(&request, &err.to_string()),
            }
        }
        self.reply(&request, Some(ScopesResponseBody { scopes }))
    }
}
