// src/watch/rule.rs

//! A single watch rule: match/ignore patterns, an operation filter, the
//! ordered command list and the rule's single-flight flag.

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::exec::Command;
use crate::types::OpMask;
use crate::watch::patterns::Pattern;

/// Event identifiers starting with this character are virtual events
/// (synthesised internally, e.g. by `:event`) rather than filesystem paths.
pub const VIRTUAL_EVENT_PREFIX: char = ':';

pub struct Rule {
    match_source: String,
    ignore_source: Option<String>,
    matcher: Option<Pattern>,
    ignore: Option<Pattern>,
    ops: OpMask,
    commands: Vec<Command>,
    in_flight: Mutex<bool>,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("match", &self.match_source)
            .field("ignore", &self.ignore_source)
            .field("ops", &self.ops)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl Rule {
    /// Build a rule, compiling its patterns relative to `base`.
    ///
    /// A rule whose match (or ignore) pattern is empty or fails to compile is
    /// kept but inert: it never matches anything.
    pub fn new(
        match_source: impl Into<String>,
        ignore_source: Option<String>,
        ops: OpMask,
        commands: Vec<Command>,
        base: &Path,
    ) -> Self {
        let match_source = match_source.into();
        let ignore_source = ignore_source.filter(|s| !s.is_empty());

        let mut matcher = if match_source.is_empty() {
            debug!("rule has no match pattern; inactive");
            None
        } else {
            match Pattern::compile_in(&match_source, base) {
                Ok(p) => Some(p),
                Err(err) => {
                    warn!(pattern = %match_source, error = %err, "rule disabled: bad match pattern");
                    None
                }
            }
        };

        let ignore = match ignore_source.as_deref().map(|s| Pattern::compile_in(s, base)) {
            Some(Ok(p)) => Some(p),
            Some(Err(err)) => {
                warn!(pattern = %match_source, error = %err, "rule disabled: bad ignore pattern");
                matcher = None;
                None
            }
            None => None,
        };

        Self {
            match_source,
            ignore_source,
            matcher,
            ignore,
            ops,
            commands,
            in_flight: Mutex::new(false),
        }
    }

    pub fn match_source(&self) -> &str {
        &self.match_source
    }

    pub fn ignore_source(&self) -> Option<&str> {
        self.ignore_source.as_deref()
    }

    pub fn ops(&self) -> OpMask {
        self.ops
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn matcher(&self) -> Option<&Pattern> {
        self.matcher.as_ref()
    }

    /// Whether the rule can match anything at all.
    pub fn is_active(&self) -> bool {
        self.matcher.is_some()
    }

    /// True iff the match pattern accepts `path` and the ignore pattern (if
    /// any) rejects it.
    pub fn matches(&self, path: &str) -> bool {
        let Some(matcher) = &self.matcher else {
            return false;
        };
        matcher.is_match(path) && !self.ignore.as_ref().is_some_and(|i| i.is_match(path))
    }

    /// Like [`matches`](Self::matches), ignoring the ignore pattern. Used when
    /// computing the watch set, where any potential match is enough.
    pub fn may_match(&self, path: &str) -> bool {
        self.matcher.as_ref().is_some_and(|m| m.is_match(path))
    }

    /// Match an event identifier: virtual identifiers (`:name`) compare
    /// verbatim against the match source, everything else goes through
    /// [`matches`](Self::matches).
    pub fn matches_event(&self, id: &str) -> bool {
        if id.starts_with(VIRTUAL_EVENT_PREFIX) {
            self.is_active() && self.match_source == id
        } else {
            self.matches(id)
        }
    }

    /// True if the rule has no operation filter, or the event carries at
    /// least one of the filtered operations. Events often carry several
    /// flags at once (`WRITE|CHMOD`), so a `WRITE` rule must still fire.
    pub fn matches_op(&self, ops: OpMask) -> bool {
        self.ops.is_empty() || self.ops.intersects(ops)
    }

    /// Single-flight test-and-set. Returns `true` if the caller now owns the
    /// rule's execution slot and must call [`finish`](Self::finish) later.
    pub fn try_begin(&self) -> bool {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if *in_flight {
            return false;
        }
        *in_flight = true;
        true
    }

    /// Release the execution slot taken by [`try_begin`](Self::try_begin).
    pub fn finish(&self) {
        *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    pub fn is_in_flight(&self) -> bool {
        *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
