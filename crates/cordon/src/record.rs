//! Per-element node records and the resolution engine.
//!
//! A [`NodeRecord`] is the engine's bookkeeping for one element: the
//! attribute state the author had before the engine touched anything (the
//! *origin*), the value the engine currently has written (the *assigned*
//! value), and four sets of lock identities that reference-count which
//! active traps want the element reachable/unreachable and shown/hidden.
//!
//! Resolution is pure bookkeeping over that state: given the element's
//! current live attribute value, [`NodeRecord::resolve_tab_index`] and
//! [`NodeRecord::resolve_aria_hidden`] decide the single write (or no
//! write) that brings the element in line with the active locks. "No
//! operation" is always a legal answer; resolution never fails.
//!
//! Records are created lazily on first contact and never explicitly
//! destroyed; their lifetime is tied to the element's own identity key.

use cordon_core::{Document, ElementId};
use slotmap::{new_key_type, SecondaryMap};

new_key_type! {
    /// An opaque identity token for one active trap instance.
    ///
    /// Compared only by identity, never by value; unique while the trap is
    /// active and never reused for a live trap.
    pub struct LockId;
}

/// The attribute that controls keyboard reachability.
pub const ATTR_TAB_INDEX: &str = "tabindex";
/// The attribute that hides an element from assistive technology.
pub const ATTR_ARIA_HIDDEN: &str = "aria-hidden";
/// The author escape hatch: `"true"` or `"focus"` opts the element out of
/// all engine management.
pub const ATTR_OVERRIDE: &str = "data-focus-override";

/// Parse a `tabindex` attribute value.
///
/// Unparseable values behave like an absent attribute (the host's default
/// reachability applies), matching how browsers treat garbage tabindex.
pub fn parse_tab_index(value: &str) -> Option<i32> {
    value.trim().parse::<i32>().ok()
}

/// Parse an `aria-hidden` attribute value. Anything but `"true"` is
/// exposed-to-AT.
pub fn parse_aria_hidden(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Whether an override marker value opts the element out.
pub fn is_override_value(value: &str) -> bool {
    let v = value.trim();
    v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("focus")
}

/// A single attribute write the resolution engine wants applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite {
    /// Write `tabindex` on the target.
    SetTabIndex { target: ElementId, value: i32 },
    /// Remove the `tabindex` attribute entirely (restores "absent").
    RemoveTabIndex { target: ElementId },
    /// Write `aria-hidden` on the target.
    SetAriaHidden { target: ElementId, value: bool },
    /// Remove the `aria-hidden` attribute entirely.
    RemoveAriaHidden { target: ElementId },
}

/// Per-element engine state.
#[derive(Debug, Default, Clone)]
pub struct NodeRecord {
    /// `tabindex` value before engine involvement; `None` = attribute
    /// absent (or unparseable) at capture time.
    tab_index_origin: Option<i32>,
    /// `tabindex` value currently written by the engine, if any.
    tab_index_assigned: Option<i32>,
    /// `aria-hidden` state before engine involvement; `None` = absent.
    aria_hidden_origin: Option<bool>,
    /// `aria-hidden` value currently written by the engine, if any.
    aria_hidden_assigned: Option<bool>,
    /// Author opt-out via the override marker.
    override_active: bool,
    /// Reachable with no explicit tabindex, from the element's tag.
    intrinsically_focusable: bool,
    /// Locks that want this element reachable.
    focused_by: Vec<LockId>,
    /// Locks that want this element unreachable.
    unfocused_by: Vec<LockId>,
    /// Locks that want this element hidden from AT.
    hidden_by: Vec<LockId>,
    /// Locks that want this element exposed to AT.
    shown_by: Vec<LockId>,
}

static_assertions::assert_impl_all!(NodeRecord: Send, Sync);

impl NodeRecord {
    /// The effective pre-engine tab index: the captured origin, or the
    /// tag's default when no attribute was set.
    fn effective_origin(&self) -> i32 {
        self.tab_index_origin
            .unwrap_or(if self.intrinsically_focusable { 0 } else { -1 })
    }

    /// Whether the engine has forced a reachability state on this element.
    pub fn tab_index_assigned(&self) -> Option<i32> {
        self.tab_index_assigned
    }

    /// Whether the engine has forced a visibility state on this element.
    pub fn aria_hidden_assigned(&self) -> Option<bool> {
        self.aria_hidden_assigned
    }

    /// Whether, under the current lock sets, this element resolves
    /// unreachable.
    pub fn resolves_unreachable(&self, live_tab_index: Option<i32>) -> bool {
        if self.override_active {
            return false;
        }
        if !self.focused_by.is_empty() {
            return false;
        }
        if !self.unfocused_by.is_empty() {
            return true;
        }
        live_tab_index.unwrap_or_else(|| self.effective_origin()) < 0
    }

    // =========================================================================
    // Lock membership
    // =========================================================================

    /// Add `lock` to the reachable set, removing it from the unreachable
    /// set (a lock is in at most one of the two).
    pub fn add_focused(&mut self, lock: LockId) {
        self.unfocused_by.retain(|&l| l != lock);
        if !self.focused_by.contains(&lock) {
            self.focused_by.push(lock);
        }
    }

    /// Add `lock` to the unreachable set, removing it from the reachable
    /// set.
    pub fn add_unfocused(&mut self, lock: LockId) {
        self.focused_by.retain(|&l| l != lock);
        if !self.unfocused_by.contains(&lock) {
            self.unfocused_by.push(lock);
        }
    }

    /// Add `lock` to the shown set, removing it from the hidden set.
    pub fn add_shown(&mut self, lock: LockId) {
        self.hidden_by.retain(|&l| l != lock);
        if !self.shown_by.contains(&lock) {
            self.shown_by.push(lock);
        }
    }

    /// Add `lock` to the hidden set, removing it from the shown set.
    pub fn add_hidden(&mut self, lock: LockId) {
        self.shown_by.retain(|&l| l != lock);
        if !self.hidden_by.contains(&lock) {
            self.hidden_by.push(lock);
        }
    }

    /// Remove `lock` from every set.
    pub fn remove_lock(&mut self, lock: LockId) {
        self.focused_by.retain(|&l| l != lock);
        self.unfocused_by.retain(|&l| l != lock);
        self.hidden_by.retain(|&l| l != lock);
        self.shown_by.retain(|&l| l != lock);
    }

    // =========================================================================
    // Origin maintenance
    // =========================================================================

    /// Replace the tabindex origin after an externally observed edit.
    pub fn recapture_tab_index_origin(&mut self, live: Option<i32>) {
        self.tab_index_origin = live;
    }

    /// Replace the aria-hidden origin after an externally observed edit.
    pub fn recapture_aria_hidden_origin(&mut self, live: Option<bool>) {
        self.aria_hidden_origin = live;
    }

    /// Re-derive the override flag from the marker attribute's live value.
    pub fn set_override_from(&mut self, live: Option<&str>) {
        self.override_active = live.is_some_and(is_override_value);
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Decide the `tabindex` write for the current lock state.
    ///
    /// `live` is the element's current attribute value. Updates the
    /// assigned-value bookkeeping and returns the write to apply, or `None`
    /// when the live state already matches the resolved target.
    pub fn resolve_tab_index(&mut self, target: ElementId, live: Option<i32>) -> Option<PendingWrite> {
        if self.override_active {
            return None;
        }

        if !self.focused_by.is_empty() {
            // Target: reachable. Only act if the element is effectively
            // unreachable right now.
            let effective = self.tab_index_assigned.unwrap_or_else(|| self.effective_origin());
            if effective < 0 {
                self.tab_index_assigned = Some(0);
                if live != Some(0) {
                    return Some(PendingWrite::SetTabIndex { target, value: 0 });
                }
            }
            return None;
        }

        if !self.unfocused_by.is_empty() {
            // Target: unreachable. Elements that were never reachable (and
            // that the engine never made reachable) need no write.
            let was_reachable = self.effective_origin() >= 0
                || self.tab_index_assigned.is_some_and(|v| v >= 0);
            if was_reachable {
                self.tab_index_assigned = Some(-1);
                if live != Some(-1) {
                    return Some(PendingWrite::SetTabIndex { target, value: -1 });
                }
            }
            return None;
        }

        // No locks: restore the origin exactly, including absence.
        if self.tab_index_assigned.take().is_some() {
            return match self.tab_index_origin {
                None => {
                    if live.is_some() {
                        Some(PendingWrite::RemoveTabIndex { target })
                    } else {
                        None
                    }
                }
                Some(origin) => {
                    if live != Some(origin) {
                        Some(PendingWrite::SetTabIndex { target, value: origin })
                    } else {
                        None
                    }
                }
            };
        }
        None
    }

    /// Decide the `aria-hidden` write for the current lock state.
    ///
    /// `live` is the current attribute state: `None` = absent. An absent
    /// attribute counts as exposed-to-AT for the skip-write comparison, but
    /// restoration distinguishes "absent" from `"false"`.
    pub fn resolve_aria_hidden(
        &mut self,
        target: ElementId,
        live: Option<bool>,
    ) -> Option<PendingWrite> {
        if self.override_active {
            return None;
        }

        if !self.shown_by.is_empty() {
            self.aria_hidden_assigned = Some(false);
            // Absent already reads as exposed; only rewrite an explicit
            // "true".
            if live == Some(true) {
                return Some(PendingWrite::SetAriaHidden {
                    target,
                    value: false,
                });
            }
            return None;
        }

        if !self.hidden_by.is_empty() {
            self.aria_hidden_assigned = Some(true);
            if live != Some(true) {
                return Some(PendingWrite::SetAriaHidden {
                    target,
                    value: true,
                });
            }
            return None;
        }

        if self.aria_hidden_assigned.take().is_some() {
            return match self.aria_hidden_origin {
                None => {
                    if live.is_some() {
                        Some(PendingWrite::RemoveAriaHidden { target })
                    } else {
                        None
                    }
                }
                Some(origin) => {
                    if live != Some(origin) {
                        Some(PendingWrite::SetAriaHidden {
                            target,
                            value: origin,
                        })
                    } else {
                        None
                    }
                }
            };
        }
        None
    }
}

/// The engine's owned table of node records, keyed by element identity.
///
/// One table per engine instance; every lock created from the same engine
/// shares it, which is what makes multi-trap reference counting work.
#[derive(Debug, Default)]
pub struct RecordTable {
    records: SecondaryMap<ElementId, NodeRecord>,
}

impl RecordTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the record for an element, creating it on first contact.
    ///
    /// Creation captures the element's origin state: `tabindex`,
    /// `aria-hidden`, the override marker, and the tag's intrinsic
    /// focusability. Origins are captured exactly once here; afterwards
    /// they change only through the `recapture_*` methods in response to
    /// externally observed edits.
    pub fn ensure(&mut self, document: &Document, id: ElementId) -> &mut NodeRecord {
        if !self.records.contains_key(id) {
            let mut record = NodeRecord {
                tab_index_origin: document
                    .attribute(id, ATTR_TAB_INDEX)
                    .as_deref()
                    .and_then(parse_tab_index),
                aria_hidden_origin: document
                    .attribute(id, ATTR_ARIA_HIDDEN)
                    .as_deref()
                    .map(parse_aria_hidden),
                intrinsically_focusable: document.is_intrinsically_focusable(id),
                ..NodeRecord::default()
            };
            record.set_override_from(document.attribute(id, ATTR_OVERRIDE).as_deref());
            tracing::trace!(
                target: "cordon::record",
                ?id,
                origin = ?record.tab_index_origin,
                "node record created"
            );
            self.records.insert(id, record);
        }
        &mut self.records[id]
    }

    /// Get an existing record.
    pub fn get(&self, id: ElementId) -> Option<&NodeRecord> {
        self.records.get(id)
    }

    /// Get an existing record mutably.
    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut NodeRecord> {
        self.records.get_mut(id)
    }
}
