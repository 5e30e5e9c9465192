//! Lock lifecycle management.
//!
//! A *lock* is one active trap's claim on the document: the [`LockManager`]
//! walks the tree, classifies every element's containment relative to the
//! trap root, updates the shared node-record table, and commits the writes
//! the resolution engine produces, all as serialized batches on the task
//! queue.
//!
//! # Containment classification
//!
//! For a lock with trap root `T` and element `N`:
//!
//! - `N` is **reachable** under the lock when `T` is an ancestor-or-self of
//!   `N` (the trap interior) or `N` is an ancestor of `T` (the chain that
//!   keeps the trap itself in the tab sequence). Everything else is
//!   unreachable.
//! - On the visibility axis (only when the lock manages `aria-hidden`):
//!   the interior is explicitly shown, ancestors contain the trap and must
//!   never be hidden (they join the shown set too), everything else is
//!   hidden.
//!
//! # Batching
//!
//! Each operation runs as a single queued task that walks, classifies,
//! computes every pending write, and only then applies them. Computing all
//! writes before performing any prevents read-after-write skew within a
//! batch, and running the whole unit after the configured delay means a
//! deactivation arriving mid-delay queues behind the batch and computes
//! from current lock state, never from a stale snapshot. Each lock carries
//! an epoch counter; activation and deactivation both bump it, and a
//! delayed batch only runs if it still holds the current epoch, so
//! disabling a trap leaves any batch parked on its write delay inert.

use std::sync::Arc;

use cordon_core::{Delay, Document, ElementId, TaskQueue};
use parking_lot::Mutex;
use slotmap::SlotMap;

use crate::record::{
    parse_aria_hidden, parse_tab_index, PendingWrite, RecordTable, ATTR_ARIA_HIDDEN,
    ATTR_OVERRIDE, ATTR_TAB_INDEX,
};

pub use crate::record::LockId;

/// Per-lock configuration the manager needs for classification.
#[derive(Debug, Clone, Copy)]
struct LockState {
    /// The trap root element.
    root: ElementId,
    /// Whether this lock also manages `aria-hidden`.
    manage_visibility: bool,
    /// Batch validity counter. Activation bumps it and stamps the posted
    /// batch; deactivation bumps it without posting a stamped batch, which
    /// neutralizes anything still parked on a write delay.
    epoch: u64,
}

/// Shared engine state: the record table plus the lock registry.
struct Shared {
    records: RecordTable,
    locks: SlotMap<LockId, LockState>,
}

/// Owns every active lock and drives classification and resolution.
///
/// One manager per engine; all traps created from the same engine share its
/// record table, which is what makes overlapping traps reference-count
/// correctly. Cheap to clone; clones share state.
#[derive(Clone)]
pub(crate) struct LockManager {
    document: Document,
    queue: TaskQueue,
    shared: Arc<Mutex<Shared>>,
}

impl LockManager {
    /// Create a manager over the given document and queue.
    pub fn new(document: Document, queue: TaskQueue) -> Self {
        Self {
            document,
            queue,
            shared: Arc::new(Mutex::new(Shared {
                records: RecordTable::new(),
                locks: SlotMap::with_key(),
            })),
        }
    }

    /// Register a new lock identity for a trap rooted at `root`.
    pub fn create_lock(&self, root: ElementId, manage_visibility: bool) -> LockId {
        let id = self.shared.lock().locks.insert(LockState {
            root,
            manage_visibility,
            epoch: 0,
        });
        tracing::debug!(target: "cordon::lock", lock = ?id, ?root, "lock created");
        id
    }

    /// Update a lock's stored configuration. Returns `false` if the lock
    /// has been released.
    pub fn configure_lock(&self, lock: LockId, root: ElementId, manage_visibility: bool) -> bool {
        let mut shared = self.shared.lock();
        match shared.locks.get_mut(lock) {
            Some(state) => {
                state.root = root;
                state.manage_visibility = manage_visibility;
                true
            }
            None => false,
        }
    }

    /// The trap root of a live lock.
    pub fn lock_root(&self, lock: LockId) -> Option<ElementId> {
        self.shared.lock().locks.get(lock).map(|s| s.root)
    }

    /// Release a lock identity. The caller must have deactivated it first;
    /// releasing is idempotent.
    pub fn release_lock(&self, lock: LockId) {
        if self.shared.lock().locks.remove(lock).is_some() {
            tracing::debug!(target: "cordon::lock", lock = ?lock, "lock released");
        }
    }

    /// Whether `element` classifies reachable under `lock` right now.
    pub fn is_reachable_under(&self, lock: LockId, element: ElementId) -> bool {
        let Some(state) = self.shared.lock().locks.get(lock).copied() else {
            return false;
        };
        self.classify_reachable(state.root, element)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Activate (or re-activate) a lock: queue a full-document walk after
    /// `write_delay`, then invoke `on_committed` once the batch is applied.
    /// The callback does not fire if the batch went stale (the lock was
    /// deactivated, re-activated, or released mid-delay).
    ///
    /// Re-activating with identical configuration and an unchanged document
    /// commits zero writes.
    pub fn activate<F>(&self, lock: LockId, write_delay: &Delay, on_committed: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(epoch) = self.bump_epoch(lock) else {
            return;
        };
        let manager = self.clone();
        self.queue.post_after(write_delay, move || {
            if manager.run_activation(lock, epoch) {
                on_committed();
            }
        });
    }

    /// Deactivate a lock: queue a walk that removes its identity from every
    /// record it is a member of and restores what no other lock still
    /// claims.
    ///
    /// Bumps the lock's epoch, so an activation or structural batch still
    /// parked on its write delay is dead on arrival. Safe to call repeatedly
    /// or before any activation; posts at next tick so it serializes behind
    /// in-flight batches but is never delayed further.
    pub fn deactivate(&self, lock: LockId) {
        self.bump_epoch(lock);
        let manager = self.clone();
        self.queue.post(move || {
            manager.run_deactivation(lock);
        });
    }

    /// React to inserted nodes: classify each added subtree for this lock
    /// after `write_delay`. The batch carries the lock's current epoch and
    /// is dropped if the lock is deactivated or re-activated before it runs;
    /// a re-activation walks the whole document anyway.
    pub fn on_structural_change(&self, lock: LockId, added: Vec<ElementId>, write_delay: &Delay) {
        let Some(epoch) = self.shared.lock().locks.get(lock).map(|s| s.epoch) else {
            return;
        };
        let manager = self.clone();
        self.queue.post_after(write_delay, move || {
            manager.run_structural(lock, epoch, &added);
        });
    }

    /// React to an observed attribute change.
    ///
    /// Runs inline; callers are already inside a queued delivery task, so
    /// the serialization discipline holds. Events for non-elements and
    /// echoes of the engine's own writes are no-ops.
    pub fn on_attribute_change(
        &self,
        target: ElementId,
        name: &str,
        old_value: Option<&str>,
    ) {
        if !self.document.is_element(target) {
            return;
        }
        let live = self.document.attribute(target, name);
        if live.as_deref() == old_value {
            // Nothing effectively changed (or the change was already
            // superseded); prevents observation feedback loops.
            return;
        }

        let mut writes = Vec::new();
        {
            let mut shared = self.shared.lock();
            let record = shared.records.ensure(&self.document, target);
            match name {
                ATTR_TAB_INDEX => {
                    let live_value = live.as_deref().and_then(parse_tab_index);
                    if record.tab_index_assigned().is_some()
                        && record.tab_index_assigned() == live_value
                    {
                        // Our own write coming back through the feed.
                        return;
                    }
                    record.recapture_tab_index_origin(live_value);
                    writes.extend(record.resolve_tab_index(target, live_value));
                }
                ATTR_ARIA_HIDDEN => {
                    let live_value = live.as_deref().map(parse_aria_hidden);
                    if record.aria_hidden_assigned().is_some()
                        && record.aria_hidden_assigned() == live_value
                    {
                        return;
                    }
                    record.recapture_aria_hidden_origin(live_value);
                    writes.extend(record.resolve_aria_hidden(target, live_value));
                }
                ATTR_OVERRIDE => {
                    record.set_override_from(live.as_deref());
                    let live_tab = self
                        .document
                        .attribute(target, ATTR_TAB_INDEX)
                        .as_deref()
                        .and_then(parse_tab_index);
                    let live_aria = self
                        .document
                        .attribute(target, ATTR_ARIA_HIDDEN)
                        .as_deref()
                        .map(parse_aria_hidden);
                    writes.extend(record.resolve_tab_index(target, live_tab));
                    writes.extend(record.resolve_aria_hidden(target, live_aria));
                }
                _ => return,
            }
        }
        self.commit(&writes);
    }

    // =========================================================================
    // Batch internals
    // =========================================================================

    fn classify_reachable(&self, root: ElementId, element: ElementId) -> bool {
        self.document.contains(root, element) || self.document.is_ancestor_of(element, root)
    }

    fn bump_epoch(&self, lock: LockId) -> Option<u64> {
        let mut shared = self.shared.lock();
        let state = shared.locks.get_mut(lock)?;
        state.epoch += 1;
        Some(state.epoch)
    }

    /// Returns `false` when the batch was skipped as stale.
    fn run_activation(&self, lock: LockId, epoch: u64) -> bool {
        let Some(state) = self.shared.lock().locks.get(lock).copied() else {
            return false;
        };
        if state.epoch != epoch {
            tracing::debug!(target: "cordon::lock", lock = ?lock, "dropping stale activation batch");
            return false;
        }
        if !self.document.is_element(state.root) {
            tracing::warn!(target: "cordon::lock", lock = ?lock, "trap root is gone; skipping activation");
            return false;
        }

        let elements = self.document.elements();
        let mut writes = Vec::new();
        {
            let mut shared = self.shared.lock();
            for el in elements {
                let reachable = self.classify_reachable(state.root, el);
                let live_tab = self
                    .document
                    .attribute(el, ATTR_TAB_INDEX)
                    .as_deref()
                    .and_then(parse_tab_index);
                let live_aria = self
                    .document
                    .attribute(el, ATTR_ARIA_HIDDEN)
                    .as_deref()
                    .map(parse_aria_hidden);

                let record = shared.records.ensure(&self.document, el);
                if reachable {
                    record.add_focused(lock);
                } else {
                    record.add_unfocused(lock);
                }
                if state.manage_visibility {
                    if reachable {
                        record.add_shown(lock);
                    } else {
                        record.add_hidden(lock);
                    }
                }
                writes.extend(record.resolve_tab_index(el, live_tab));
                writes.extend(record.resolve_aria_hidden(el, live_aria));
            }
        }
        tracing::debug!(
            target: "cordon::lock",
            lock = ?lock,
            writes = writes.len(),
            "activation batch"
        );
        self.commit(&writes);
        true
    }

    fn run_deactivation(&self, lock: LockId) {
        // Membership is tracked by re-walking the live document, the same
        // node set an activation walk visits.
        let elements = self.document.elements();
        let mut writes = Vec::new();
        {
            let mut shared = self.shared.lock();
            for el in elements {
                let live_tab = self
                    .document
                    .attribute(el, ATTR_TAB_INDEX)
                    .as_deref()
                    .and_then(parse_tab_index);
                let live_aria = self
                    .document
                    .attribute(el, ATTR_ARIA_HIDDEN)
                    .as_deref()
                    .map(parse_aria_hidden);

                let Some(record) = shared.records.get_mut(el) else {
                    continue;
                };
                record.remove_lock(lock);
                writes.extend(record.resolve_tab_index(el, live_tab));
                writes.extend(record.resolve_aria_hidden(el, live_aria));
            }
        }
        tracing::debug!(
            target: "cordon::lock",
            lock = ?lock,
            writes = writes.len(),
            "deactivation batch"
        );
        self.commit(&writes);
    }

    fn run_structural(&self, lock: LockId, epoch: u64, added: &[ElementId]) {
        let Some(state) = self.shared.lock().locks.get(lock).copied() else {
            return;
        };
        if state.epoch != epoch {
            tracing::debug!(target: "cordon::lock", lock = ?lock, "dropping stale structural batch");
            return;
        }

        let mut writes = Vec::new();
        {
            let mut shared = self.shared.lock();
            for &root in added {
                // Re-query the live subtree: nodes may have been detached
                // again while the batch was pending.
                if !self.document.is_connected(root) {
                    continue;
                }
                for el in self.document.element_subtree(root) {
                    let reachable = self.classify_reachable(state.root, el);
                    let live_tab = self
                        .document
                        .attribute(el, ATTR_TAB_INDEX)
                        .as_deref()
                        .and_then(parse_tab_index);
                    let live_aria = self
                        .document
                        .attribute(el, ATTR_ARIA_HIDDEN)
                        .as_deref()
                        .map(parse_aria_hidden);

                    let record = shared.records.ensure(&self.document, el);
                    if reachable {
                        record.add_focused(lock);
                    } else {
                        record.add_unfocused(lock);
                    }
                    if state.manage_visibility {
                        if reachable {
                            record.add_shown(lock);
                        } else {
                            record.add_hidden(lock);
                        }
                    }
                    writes.extend(record.resolve_tab_index(el, live_tab));
                    writes.extend(record.resolve_aria_hidden(el, live_aria));
                }
            }
        }
        self.commit(&writes);
    }

    /// Apply a computed batch, then blur the live focus if it has become
    /// unreachable. The blur always lands before any subsequent focus
    /// resolution, which runs as a later queued task.
    fn commit(&self, writes: &[PendingWrite]) {
        for write in writes {
            let result = match write {
                PendingWrite::SetTabIndex { target, value } => {
                    self.document
                        .set_attribute(*target, ATTR_TAB_INDEX, &value.to_string())
                }
                PendingWrite::RemoveTabIndex { target } => {
                    self.document.remove_attribute(*target, ATTR_TAB_INDEX)
                }
                PendingWrite::SetAriaHidden { target, value } => self.document.set_attribute(
                    *target,
                    ATTR_ARIA_HIDDEN,
                    if *value { "true" } else { "false" },
                ),
                PendingWrite::RemoveAriaHidden { target } => {
                    self.document.remove_attribute(*target, ATTR_ARIA_HIDDEN)
                }
            };
            if let Err(err) = result {
                // The element left the tree between compute and commit.
                tracing::trace!(target: "cordon::lock", ?write, %err, "dropped stale write");
            }
        }
        self.blur_if_unreachable();
    }

    fn blur_if_unreachable(&self) {
        let Some(focused) = self.document.focused() else {
            return;
        };
        let live_tab = self
            .document
            .attribute(focused, ATTR_TAB_INDEX)
            .as_deref()
            .and_then(parse_tab_index);
        let unreachable = self
            .shared
            .lock()
            .records
            .get(focused)
            .is_some_and(|r| r.resolves_unreachable(live_tab));
        if unreachable {
            tracing::debug!(
                target: "cordon::lock",
                element = ?focused,
                "blurring focus on unreachable element"
            );
            self.document.blur();
        }
    }
}
