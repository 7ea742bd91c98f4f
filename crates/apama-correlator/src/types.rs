//! Typed records decoded from correlator responses.

use roxmltree::Node;

use crate::xml::{children, prop_bool, prop_int, prop_text};

/// A breakpoint as the correlator reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBreakpoint {
    pub filename: String,
    pub filehash: String,
    pub action: String,
    pub owner: String,
    pub line: u32,
    pub id: String,
    pub break_once: bool,
}

impl RemoteBreakpoint {
    pub(crate) fn from_node(node: Node<'_, '_>) -> Self {
        Self {
            filename: prop_text(node, "filename"),
            filehash: prop_text(node, "filehash"),
            action: prop_text(node, "action"),
            owner: prop_text(node, "owner"),
            line: prop_int(node, "line"),
            id: prop_text(node, "id"),
            break_once: prop_bool(node, "breakonce"),
        }
    }
}

/// Where a paused context stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PausedContext {
    pub context_id: u32,
    pub name: String,
    pub owner: String,
    /// Declared type of the executing entity (the engine's `type` field).
    pub kind: String,
    pub action: String,
    pub instance: u32,
    pub monitor: String,
    pub filename: String,
    pub filehash: String,
    pub reason: String,
    pub line: u32,
}

/// One entry of the engine's progress listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextStatus {
    Running { context_id: u32, name: String },
    Paused(PausedContext),
}

impl ContextStatus {
    pub(crate) fn from_node(node: Node<'_, '_>) -> Self {
        let context_id = prop_int(node, "contextid");
        let name = prop_text(node, "context");
        if !prop_bool(node, "paused") {
            return Self::Running { context_id, name };
        }
        Self::Paused(PausedContext {
            context_id,
            name,
            owner: prop_text(node, "owner"),
            kind: prop_text(node, "type"),
            action: prop_text(node, "action"),
            instance: prop_int(node, "instance"),
            monitor: prop_text(node, "monitor"),
            filename: prop_text(node, "filename"),
            filehash: prop_text(node, "filehash"),
            reason: prop_text(node, "reason"),
            line: prop_int(node, "line"),
        })
    }

    #[must_use]
    pub fn context_id(&self) -> u32 {
        match self {
            Self::Running { context_id, .. } => *context_id,
            Self::Paused(paused) => paused.context_id,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Running { name, .. } => name,
            Self::Paused(paused) => &paused.name,
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused(_))
    }

    #[must_use]
    pub fn as_paused(&self) -> Option<&PausedContext> {
        match self {
            Self::Paused(paused) => Some(paused),
            Self::Running { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFrame {
    pub owner: String,
    pub kind: String,
    pub action: String,
    pub line: u32,
    pub filename: String,
    pub filehash: String,
}

impl EngineFrame {
    pub(crate) fn from_node(node: Node<'_, '_>) -> Self {
        Self {
            owner: prop_text(node, "owner"),
            kind: prop_text(node, "type"),
            action: prop_text(node, "action"),
            line: prop_int(node, "lineno"),
            filename: prop_text(node, "filename"),
            filehash: prop_text(node, "filehash"),
        }
    }
}

/// Call stack of one context, innermost frame first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackTrace {
    pub context_id: u32,
    pub monitor: String,
    pub frames: Vec<EngineFrame>,
}

impl StackTrace {
    pub(crate) fn from_node(node: Node<'_, '_>) -> Self {
        Self {
            context_id: prop_int(node, "contextid"),
            monitor: prop_text(node, "monitor"),
            frames: children(node, "map", "stackframe")
                .map(EngineFrame::from_node)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineVariable {
    pub name: String,
    /// Declared EPL type.
    pub kind: String,
    pub value: String,
}

impl EngineVariable {
    pub(crate) fn from_node(node: Node<'_, '_>) -> Self {
        Self {
            name: prop_text(node, "name"),
            kind: prop_text(node, "type"),
            value: prop_text(node, "value"),
        }
    }
}
