//! Thread requests.
//! - handle_threads: one thread per correlator context

use serde_json::Value;

use crate::protocol::{Request, Thread, ThreadsResponseBody};

use super::super::{DebugAdapter, DispatchOutcome};

impl DebugAdapter {
    pub(in crate::adapter) fn handle_threads(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(engine) = self.engine.as_ref() else {
            return self.fail(&request, "no correlator session");
        };
        let statuses = match engine.client.context_statuses() {
            Ok(statuses) => statuses,
            Err(err) => return self.fail(&request, &format!("failed to read contexts: {err}")),
        };
        let threads = statuses
            .iter()
            .map(|status| Thread {
                id: status.context_id(),
                name: status.name().to_string(),
            })
            .collect();
        self.reply(&request, Some(ThreadsResponseBody { threads }))
    }
}
