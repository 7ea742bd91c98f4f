//! Breakpoint reconciliation between the frontend and the correlator.
//! - BreakpointMirror: `path:line` -> engine breakpoint id cache
//! - Reconciler::reconcile_file: per-file setBreakpoints algorithm
//! - Reconciler::apply: live add/remove notifications
//!
//! Every operation holds the mirror lock from first engine call to last, so
//! a per-file request and a live change never interleave.

use std::collections::HashMap;
use std::sync::Arc;

use apama_correlator::{CorrelatorClient, EngineError, RemoteBreakpoint};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::paths::normalize_engine_path;

/// Mirror value for a breakpoint whose creation is in flight.
pub const PENDING_ID: &str = "-1";

/// How a per-file request is reconciled with the engine's breakpoint list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncMode {
    /// Recreate the requested lines only when the engine reports no breakpoints at all.
    #[default]
    RecoverEmpty,
    /// Create missing lines and delete stale ones for the requested file.
    PerFile,
}

/// A source location as the frontend names it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLine {
    pub path: String,
    pub line: u32,
}

impl SourceLine {
    #[must_use]
    pub fn new(path: impl Into<String>, line: u32) -> Self {
        Self {
            path: path.into(),
            line,
        }
    }

    fn key(&self) -> String {
        mirror_key(&normalize_engine_path(&self.path), self.line)
    }
}

/// One out-of-band breakpoint notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointChange {
    #[serde(default)]
    pub added: Vec<SourceLine>,
    #[serde(default)]
    pub removed: Vec<SourceLine>,
}

impl BreakpointChange {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// A requested line the engine reports as set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedBreakpoint {
    pub id: String,
    pub path: String,
    pub line: u32,
}

#[derive(Debug, Default)]
pub struct BreakpointMirror {
    entries: HashMap<String, String>,
}

impl BreakpointMirror {
    #[must_use]
    pub fn get(&self, path: &str, line: u32) -> Option<&str> {
        self.entries.get(&mirror_key(path, line)).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn mirror_key(path: &str, line: u32) -> String {
    format!("{path}:{line}")
}

/// Keeps one session's mirror consistent with the engine.
#[derive(Debug, Clone)]
pub struct Reconciler {
    client: CorrelatorClient,
    mirror: Arc<Mutex<BreakpointMirror>>,
    mode: SyncMode,
}

impl Reconciler {
    #[must_use]
    pub fn new(client: CorrelatorClient, mode: SyncMode) -> Self {
        Self {
            client,
            mirror: Arc::new(Mutex::new(BreakpointMirror::default())),
            mode,
        }
    }

    #[must_use]
    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Runs `f` against the mirror under its lock.
    pub fn with_mirror<R>(&self, f: impl FnOnce(&BreakpointMirror) -> R) -> R {
        f(&self.mirror.lock())
    }

    /// Reconciles the complete desired line set for one file.
    ///
    /// `path` must already be normalized. Lines that the engine does not
    /// report are left out of the result.
    pub fn reconcile_file(
        &self,
        path: &str,
        lines: &[u32],
    ) -> Result<Vec<ConfirmedBreakpoint>, EngineError> {
        let mut mirror = self.mirror.lock();
        let mut authoritative = self.client.list_breakpoints()?;

        let changed = match self.mode {
            SyncMode::RecoverEmpty => {
                if !lines.is_empty() && authoritative.is_empty() {
                    info!(path, count = lines.len(), "engine has no breakpoints, recreating");
                    for &line in lines {
                        self.create(&mut mirror, path, line)?;
                    }
                    true
                } else {
                    false
                }
            }
            SyncMode::PerFile => self.sync_file(&mut mirror, &authoritative, path, lines)?,
        };
        if changed {
            authoritative = self.client.list_breakpoints()?;
        }

        let mut pending: Vec<u32> = lines.to_vec();
        let mut confirmed = Vec::new();
        for breakpoint in &authoritative {
            if normalize_engine_path(&breakpoint.filename) != path {
                continue;
            }
            let Some(index) = pending.iter().position(|line| *line == breakpoint.line) else {
                continue;
            };
            pending.swap_remove(index);
            mirror
                .entries
                .insert(mirror_key(path, breakpoint.line), breakpoint.id.clone());
            confirmed.push(ConfirmedBreakpoint {
                id: breakpoint.id.clone(),
                path: path.to_string(),
                line: breakpoint.line,
            });
        }
        if !pending.is_empty() {
            debug!(path, ?pending, "lines not confirmed by engine");
        }
        Ok(confirmed)
    }

    /// Creates missing requested lines and deletes stale ones in `path`.
    fn sync_file(
        &self,
        mirror: &mut BreakpointMirror,
        authoritative: &[RemoteBreakpoint],
        path: &str,
        lines: &[u32],
    ) -> Result<bool, EngineError> {
        let in_file: Vec<&RemoteBreakpoint> = authoritative
            .iter()
            .filter(|bp| normalize_engine_path(&bp.filename) == path)
            .collect();
        let mut changed = false;
        for stale in in_file.iter().filter(|bp| !lines.contains(&bp.line)) {
            self.client.delete_breakpoint(&stale.id);
            mirror.entries.remove(&mirror_key(path, stale.line));
            changed = true;
        }
        for &line in lines {
            if !in_file.iter().any(|bp| bp.line == line) {
                self.create(mirror, path, line)?;
                changed = true;
            }
        }
        Ok(changed)
    }

    fn create(
        &self,
        mirror: &mut BreakpointMirror,
        path: &str,
        line: u32,
    ) -> Result<String, EngineError> {
        let key = mirror_key(path, line);
        mirror.entries.insert(key.clone(), PENDING_ID.to_string());
        match self.client.set_breakpoint(path, line) {
            Ok(id) => {
                mirror.entries.insert(key, id.clone());
                Ok(id)
            }
            Err(err) => {
                mirror.entries.remove(&key);
                Err(err)
            }
        }
    }

    /// Applies one live notification: additions first, then removals.
    ///
    /// Every entry is attempted; the first failure is returned.
    pub fn apply(&self, change: &BreakpointChange) -> Result<(), EngineError> {
        let mut mirror = self.mirror.lock();
        let mut first_error = None;
        for added in &change.added {
            let path = normalize_engine_path(&added.path);
            match self.create(&mut mirror, &path, added.line) {
                Ok(id) => debug!(key = %added.key(), %id, "breakpoint added"),
                Err(err) => {
                    warn!(key = %added.key(), error = %err, "failed to add breakpoint");
                    first_error.get_or_insert(err);
                }
            }
        }
        for removed in &change.removed {
            let key = removed.key();
            match mirror.entries.remove(&key) {
                Some(id) if id != PENDING_ID => {
                    self.client.delete_breakpoint(&id);
                    debug!(%key, %id, "breakpoint removed");
                }
                _ => debug!(%key, "no engine breakpoint to remove"),
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
