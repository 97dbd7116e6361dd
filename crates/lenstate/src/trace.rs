#![forbid(unsafe_code)]

//! Structural change tracing.
//!
//! [`trace`] compares two values and describes exactly where they differ:
//! a [`Trace::Leaf`] for an atomic transition, or a [`Trace::Node`] whose
//! `subs` map holds one sub-trace per key that changed.
//!
//! # Invariants
//!
//! 1. A `Node` never contains a key whose before/after values are equal.
//! 2. A `Node` is never empty. If nothing differs, no trace is produced.
//! 3. [`post_trace`] is idempotent.
//!
//! A writer that replaces a whole subtree only knows "this went from X to
//! Y". [`post_trace`] re-diffs such leaf transitions on delivery so that
//! readers of untouched sub-keys are not notified.

use std::collections::{BTreeMap, BTreeSet};

use crate::value::{Key, Traceable};

/// Structural descriptor of one transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Trace<T> {
    /// Atomic transition, `None` standing for an absent value.
    Leaf { from: Option<T>, to: Option<T> },
    /// Per-key transitions of a composite.
    Node { subs: BTreeMap<Key, Trace<T>> },
}

impl<T> Trace<T> {
    /// Atomic transition from `from` to `to`.
    #[must_use]
    pub const fn leaf(from: Option<T>, to: Option<T>) -> Self {
        Self::Leaf { from, to }
    }

    /// Single-key node addressing `inner` at `key`.
    #[must_use]
    pub fn wrap(key: Key, inner: Trace<T>) -> Self {
        Self::Node {
            subs: BTreeMap::from([(key, inner)]),
        }
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf { .. })
    }

    /// Sub-trace at `key`. Always `None` for leaves.
    #[must_use]
    pub fn sub(&self, key: &Key) -> Option<&Trace<T>> {
        match self {
            Self::Node { subs } => subs.get(key),
            Self::Leaf { .. } => None,
        }
    }
}

/// A new value together with how it differs from the previous one.
#[derive(Debug, Clone, PartialEq)]
pub struct Change<T> {
    pub value: Option<T>,
    /// `None` when no comparison was meaningful.
    pub trace: Option<Trace<T>>,
}

impl<T> Change<T> {
    #[must_use]
    pub const fn new(value: Option<T>, trace: Option<Trace<T>>) -> Self {
        Self { value, trace }
    }

    /// Whether this change carries a leaf trace (or none), i.e. whether
    /// readers must inspect the value to learn what moved.
    #[must_use]
    pub fn is_unrefined(&self) -> bool {
        self.trace.as_ref().is_none_or(Trace::is_leaf)
    }
}

/// Diff `src` against `dest`.
///
/// Returns `None` when they are equal.
pub fn trace<T: Traceable>(src: Option<&T>, dest: Option<&T>) -> Option<Trace<T>> {
    match (src, dest) {
        (Some(s), Some(d)) if s.identical(d) => None,
        (Some(s), Some(d)) if s.is_composite() && d.is_composite() => trace_composite(s, d),
        _ if src == dest => None,
        _ => Some(Trace::Leaf {
            from: src.cloned(),
            to: dest.cloned(),
        }),
    }
}

fn trace_composite<T: Traceable>(src: &T, dest: &T) -> Option<Trace<T>> {
    let mut subs = BTreeMap::new();
    let src_keys: BTreeSet<Key> = src.keys().into_iter().collect();

    let mut visit = |key: &Key| {
        let before = src.child(key);
        let after = dest.child(key);
        if let Some(sub) = trace(before.as_deref(), after.as_deref()) {
            subs.insert(key.clone(), sub);
        }
    };

    for key in &src_keys {
        visit(key);
    }
    for key in dest.keys() {
        if !src_keys.contains(&key) {
            visit(&key);
        }
    }

    if subs.is_empty() {
        None
    } else {
        Some(Trace::Node { subs })
    }
}

/// Build a full [`Change`] to `dest`, or `None` when nothing differs.
pub fn change<T: Traceable>(src: Option<&T>, dest: Option<&T>) -> Option<Change<T>> {
    trace(src, dest).map(|t| Change {
        value: dest.cloned(),
        trace: Some(t),
    })
}

/// Refine a leaf-traced change into the most specific trace available.
///
/// Node traces and untraced changes are returned unchanged.
pub fn post_trace<T: Traceable>(change: Change<T>) -> Change<T> {
    let refined = match &change.trace {
        Some(Trace::Leaf { from, to }) => trace(from.as_ref(), to.as_ref()),
        _ => None,
    };

    match refined {
        Some(t) => Change {
            value: change.value,
            trace: Some(t),
        },
        None => change,
    }
}
