//! Request handlers grouped by DAP area.
//! - initialize: initialize/launch/attach/configurationDone
//! - breakpoints: per-file sync, exception filter, live changes
//! - lifecycle: disconnect
//! - threads: context list
//! - stack_trace: stackTrace request
//! - scopes: scope enumeration
//! - run_control: continue/pause/step

mod breakpoints;
mod initialize;
mod lifecycle;
mod run_control;
mod scopes;
mod stack_trace;
mod threads;
