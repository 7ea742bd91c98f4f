//! Stack trace requests.
//! - handle_stack_trace: frames of one context, ids from the reference codec

use serde_json::Value;

use crate::codec::encode_frame;
use crate::paths::{file_name, normalize_engine_path};
use crate::protocol::{Request, Source, StackFrame, StackTraceArguments, StackTraceResponseBody};

use super::super::{DebugAdapter, DispatchOutcome};

impl DebugAdapter {
    pub(in crate::adapter) fn handle_stack_trace(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let Some(args) = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<StackTraceArguments>(value).ok())
        else {
            return self.fail(&request, "invalid stackTrace args");
        };
        let Some(engine) = self.engine.as_ref() else {
            return self.fail(&request, "no correlator session");
        };
        let context_id = args.thread_id;
        let trace = match engine.client.stack_trace(context_id) {
            Ok(trace) => trace,
            Err(err) => {
                return self.fail(
                    &request,
                    &format!("failed to read stack of context {context_id}: {err}"),
                )
            }
        };

        let total = trace.frames.len();
        let start = args.start_frame.map_or(0, |start| start as usize).min(total);
        let end = match args.levels {
            Some(levels) if levels > 0 => start.saturating_add(levels as usize).min(total),
            _ => total,
        };
        let mut stack_frames = Vec::with_capacity(end - start);
        for (index, frame) in trace.frames.iter().enumerate().take(end).skip(start) {
            let Ok(index) = u32::try_from(index) else {
                break;
            };
            let id = match encode_frame(context_id, index) {
                Ok(id) => id,
                Err(err) => return self.fail(&request, &err.to_string()),
            };
            let path = normalize_engine_path(&frame.filename);
            stack_frames.push(StackFrame {
                id,
                name: frame.action.clone(),
                source: Some(Source {
                    name: Some(file_name(&path).to_string()),
                    path: Some(path.clone()),
                }),
                line: self.coordinate.to_client_line(frame.line),
                column: self.coordinate.default_column(),
            });
        }
        let body = StackTraceResponseBody {
            stack_frames,
            total_frames: u32::try_from(total).ok(),
        };
        self.reply(&request, Some(body))
    }
}
