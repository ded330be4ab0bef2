// src/watch/event.rs

use notify::event::{EventKind, ModifyKind};

use crate::types::{Op, OpMask};
use crate::watch::rule::VIRTUAL_EVENT_PREFIX;

/// A change notification: a slash-normalised absolute path (or a virtual
/// `:name` identifier) plus the operations it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: String,
    pub ops: OpMask,
}

impl FsEvent {
    pub fn new(path: impl Into<String>, ops: impl Into<OpMask>) -> Self {
        Self {
            path: path.into(),
            ops: ops.into(),
        }
    }

    /// A synthesised event addressed to rules whose match source is `name`.
    pub fn virtual_event(name: impl Into<String>) -> Self {
        Self {
            path: name.into(),
            ops: OpMask::EMPTY,
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.path.starts_with(VIRTUAL_EVENT_PREFIX)
    }
}

/// Map a `notify` event kind onto our operation mask. Access events and
/// unclassified kinds map to an empty mask and are dropped by the watcher.
pub fn ops_from_kind(kind: &EventKind) -> OpMask {
    match kind {
        EventKind::Create(_) => Op::Create.into(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Op::Chmod.into(),
        EventKind::Modify(ModifyKind::Name(_)) => Op::Rename.into(),
        EventKind::Modify(_) | EventKind::Any => Op::Write.into(),
        EventKind::Remove(_) => Op::Remove.into(),
        EventKind::Access(_) | EventKind::Other => OpMask::EMPTY,
    }
}
