//! Public trap surface: [`FocusEngine`] and [`FocusTrap`].
//!
//! A [`FocusEngine`] binds the containment machinery to one document and one
//! task queue; every trap created from the same engine shares its node-record
//! table, which is what makes overlapping traps compose. The engine also has
//! a detached mode for hosts without a document (server-side rendering):
//! every trap operation degrades to an inert no-op rather than an error.
//!
//! # Example
//!
//! ```
//! use cordon_core::{Document, TaskQueue};
//! use cordon::{FocusEngine, TrapOptions};
//!
//! let queue = TaskQueue::new();
//! let doc = Document::new(queue.clone());
//! let dialog = doc.create_element("div");
//! doc.append_child(doc.root(), dialog).unwrap();
//!
//! let engine = FocusEngine::new(doc.clone(), queue.clone());
//! let trap = engine.trap();
//! trap.configure(dialog, TrapOptions::default());
//! queue.run_until_idle();
//!
//! trap.teardown();
//! queue.run_until_idle();
//! ```

use std::sync::Arc;

use cordon_core::{Delay, Document, ElementId, MutationRecord, SubscriptionId, TaskQueue};
use parking_lot::Mutex;
use static_assertions::assert_impl_all;

use crate::director::{DirectorState, FocusDirector, FocusPlan, FocusTarget};
use crate::lock::{LockId, LockManager};
use crate::record::{ATTR_ARIA_HIDDEN, ATTR_OVERRIDE, ATTR_TAB_INDEX};

/// Configuration for one trap instance.
#[derive(Debug, Clone)]
pub struct TrapOptions {
    /// Whether the trap is engaged. Disabling releases everything the trap
    /// holds, exactly like a teardown, but the trap can be re-enabled later.
    pub enabled: bool,
    /// Whether the trap also manages `aria-hidden` on elements outside it.
    pub manage_visibility: bool,
    /// Whether the trap root itself is a valid focus destination.
    pub must_be_focusable: bool,
    /// Where focus should land when the trap engages. `None` falls back to
    /// the first tabbable descendant.
    pub focus_target: Option<FocusTarget>,
    /// Deferral before the focus move runs.
    pub focus_delay: Delay,
    /// Deferral before attribute write batches run.
    pub write_delay: Delay,
    /// Passed through to the focus call to suppress scrolling.
    pub prevent_scroll: bool,
}

impl Default for TrapOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            manage_visibility: false,
            must_be_focusable: false,
            focus_target: None,
            focus_delay: Delay::NextTick,
            write_delay: Delay::NextTick,
            prevent_scroll: false,
        }
    }
}

/// Everything an attached engine carries.
#[derive(Clone)]
struct EngineInner {
    document: Document,
    queue: TaskQueue,
    manager: LockManager,
}

/// The focus-containment engine for one document.
///
/// Cheap to clone; clones share the record table and lock registry.
#[derive(Clone)]
pub struct FocusEngine {
    inner: Option<EngineInner>,
}

assert_impl_all!(FocusEngine: Send, Sync);
assert_impl_all!(FocusTrap: Send, Sync);

impl FocusEngine {
    /// Create an engine bound to `document`, scheduling on `queue`.
    pub fn new(document: Document, queue: TaskQueue) -> Self {
        let manager = LockManager::new(document.clone(), queue.clone());
        Self {
            inner: Some(EngineInner {
                document,
                queue,
                manager,
            }),
        }
    }

    /// Create a detached engine with no document.
    ///
    /// Every trap created from it is inert: `configure` and `teardown`
    /// succeed and do nothing. This is a supported degraded mode for hosts
    /// that sometimes run without a document, not a failure state.
    pub fn detached() -> Self {
        Self { inner: None }
    }

    /// Whether this engine is in detached mode.
    pub fn is_detached(&self) -> bool {
        self.inner.is_none()
    }

    /// Create a new trap instance on this engine.
    pub fn trap(&self) -> FocusTrap {
        FocusTrap {
            engine: self.inner.clone(),
            state: Arc::new(Mutex::new(TrapState::default())),
        }
    }
}

#[derive(Default)]
struct TrapState {
    lock: Option<LockId>,
    director: Option<FocusDirector>,
    subscription: Option<SubscriptionId>,
    root: Option<ElementId>,
    options: TrapOptions,
    active: bool,
}

/// One focus trap.
///
/// Created via [`FocusEngine::trap`]. Call [`configure`](Self::configure) to
/// engage it on an element and [`teardown`](Self::teardown) when done.
pub struct FocusTrap {
    engine: Option<EngineInner>,
    state: Arc<Mutex<TrapState>>,
}

impl FocusTrap {
    /// Engage (or reconfigure) the trap on `element`.
    ///
    /// With `enabled: true` this activates the trap's lock, subscribes to
    /// the mutation feed, and arms the focus director when the trap is newly
    /// engaging, its root changed, or its explicit focus target changed.
    /// Reconfiguring an engaged trap with the same root and target re-runs
    /// activation (idempotently, if nothing else changed) without stealing
    /// focus back.
    ///
    /// With `enabled: false` this behaves like [`teardown`](Self::teardown)
    /// with respect to released state, but keeps the trap reusable.
    pub fn configure(&self, element: ElementId, options: TrapOptions) {
        let Some(engine) = &self.engine else {
            return;
        };
        let mut state = self.state.lock();
        let was_active = state.active;
        let target_changed = state.options.focus_target != options.focus_target;
        let root_changed = state.root != Some(element);

        let lock = match state.lock {
            Some(lock) => {
                engine
                    .manager
                    .configure_lock(lock, element, options.manage_visibility);
                lock
            }
            None => {
                let lock = engine.manager.create_lock(element, options.manage_visibility);
                state.director = Some(FocusDirector::new(
                    engine.document.clone(),
                    engine.queue.clone(),
                    engine.manager.clone(),
                    lock,
                ));
                lock
            }
        };
        state.lock = Some(lock);
        state.root = Some(element);
        state.options = options.clone();

        if options.enabled {
            if state.subscription.is_none() {
                state.subscription = Some(self.subscribe(engine));
            }
            state.active = true;
            let should_arm = !was_active || target_changed || root_changed;
            let director = state.director.clone();
            drop(state);

            tracing::debug!(
                target: "cordon::lock",
                lock = ?lock,
                root = ?element,
                should_arm,
                "trap configured (enabled)"
            );
            let plan = FocusPlan {
                target: options.focus_target.clone(),
                must_be_focusable: options.must_be_focusable,
                prevent_scroll: options.prevent_scroll,
            };
            let focus_delay = options.focus_delay.clone();
            engine.manager.activate(lock, &options.write_delay, move || {
                if should_arm {
                    if let Some(director) = director {
                        director.arm(plan, &focus_delay);
                    }
                }
            });
        } else {
            state.active = false;
            if let Some(sub) = state.subscription.take() {
                engine.document.mutations().unsubscribe(sub);
            }
            if let Some(director) = &state.director {
                director.disarm();
            }
            drop(state);
            tracing::debug!(target: "cordon::lock", lock = ?lock, "trap configured (disabled)");
            engine.manager.deactivate(lock);
        }
    }

    /// Release everything the trap holds: deactivate the lock, unsubscribe
    /// from the mutation feed, release the lock identity. Idempotent.
    pub fn teardown(&self) {
        let Some(engine) = &self.engine else {
            return;
        };
        let mut state = self.state.lock();
        if let Some(sub) = state.subscription.take() {
            engine.document.mutations().unsubscribe(sub);
        }
        if let Some(director) = state.director.take() {
            director.disarm();
        }
        state.active = false;
        state.root = None;
        let lock = state.lock.take();
        drop(state);

        if let Some(lock) = lock {
            tracing::debug!(target: "cordon::lock", lock = ?lock, "trap torn down");
            // The deactivation walk does not consult the registry, so the
            // identity can be released right away.
            engine.manager.deactivate(lock);
            engine.manager.release_lock(lock);
        }
    }

    /// Whether the trap is currently engaged.
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// The focus director's state, for diagnostics.
    pub fn director_state(&self) -> DirectorState {
        self.state
            .lock()
            .director
            .as_ref()
            .map(|d| d.state())
            .unwrap_or_default()
    }

    fn subscribe(&self, engine: &EngineInner) -> SubscriptionId {
        let manager = engine.manager.clone();
        let state = self.state.clone();
        engine.document.mutations().subscribe(move |batch| {
            let (lock, write_delay, active) = {
                let state = state.lock();
                (state.lock, state.options.write_delay.clone(), state.active)
            };
            let Some(lock) = lock else {
                return;
            };
            if !active {
                return;
            }

            let mut added = Vec::new();
            for record in batch {
                match record {
                    MutationRecord::ChildrenAdded { added: roots } => {
                        added.extend(roots.iter().copied());
                    }
                    MutationRecord::AttributeChanged {
                        target,
                        name,
                        old_value,
                    } => {
                        // Only the attributes the engine manages are of
                        // interest; everything else passes through.
                        if matches!(
                            name.as_str(),
                            ATTR_TAB_INDEX | ATTR_ARIA_HIDDEN | ATTR_OVERRIDE
                        ) {
                            manager.on_attribute_change(*target, name, old_value.as_deref());
                        }
                    }
                }
            }
            if !added.is_empty() {
                manager.on_structural_change(lock, added, &write_delay);
            }
        })
    }
}

impl Drop for FocusTrap {
    fn drop(&mut self) {
        self.teardown();
    }
}
