//! Focus direction: deciding where input focus lands once a trap engages.
//!
//! The director is a small state machine, `Idle -> Armed -> Focused`. Arming
//! happens on trap activation, on reconfiguration with a changed explicit
//! target, and on disabled-to-enabled transitions. An armed director posts a
//! focus task after the trap's focus delay; the task resolves a target in
//! priority order and moves focus there. Unrelated document mutations never
//! re-arm it.
//!
//! Target priority:
//!
//! 1. the explicit target (element reference or `#id` selector), if it is
//!    reachable under the lock
//! 2. the trap root, if the trap is configured to be directly focusable and
//!    the root ended up tabbable
//! 3. the first tabbable descendant of the trap root in document order
//! 4. nobody: focus stays where it is (never an error)

use std::sync::Arc;

use cordon_core::{Delay, Document, ElementId, TaskQueue};
use parking_lot::Mutex;

use crate::error::Error;
use crate::lock::{LockId, LockManager};
use crate::record::{parse_tab_index, ATTR_TAB_INDEX};

/// Where a trap should move focus when it engages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusTarget {
    /// A direct element reference.
    Element(ElementId),
    /// An id selector of the form `#some-id`, resolved against the document
    /// at focus time.
    Selector(String),
}

/// Director state, visible for tests and debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectorState {
    /// No focus work pending.
    #[default]
    Idle,
    /// A focus task has been posted and has not yet run.
    Armed,
    /// The last resolution moved focus into the trap.
    Focused,
}

/// The per-arm snapshot of everything target resolution needs.
#[derive(Debug, Clone)]
pub(crate) struct FocusPlan {
    pub target: Option<FocusTarget>,
    pub must_be_focusable: bool,
    pub prevent_scroll: bool,
}

struct DirectorInner {
    state: DirectorState,
    /// Bumped on every arm/disarm; a pending focus task whose generation no
    /// longer matches is stale and does nothing.
    generation: u64,
}

/// Drives input focus for one trap.
#[derive(Clone)]
pub(crate) struct FocusDirector {
    document: Document,
    queue: TaskQueue,
    manager: LockManager,
    lock: LockId,
    inner: Arc<Mutex<DirectorInner>>,
}

impl FocusDirector {
    pub(crate) fn new(
        document: Document,
        queue: TaskQueue,
        manager: LockManager,
        lock: LockId,
    ) -> Self {
        Self {
            document,
            queue,
            manager,
            lock,
            inner: Arc::new(Mutex::new(DirectorInner {
                state: DirectorState::Idle,
                generation: 0,
            })),
        }
    }

    pub(crate) fn state(&self) -> DirectorState {
        self.inner.lock().state
    }

    /// Arm the director: post a focus task after `focus_delay`. Supersedes
    /// any earlier pending task.
    pub(crate) fn arm(&self, plan: FocusPlan, focus_delay: &Delay) {
        let generation = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.state = DirectorState::Armed;
            inner.generation
        };
        tracing::debug!(target: "cordon::director", lock = ?self.lock, "armed");
        let director = self.clone();
        self.queue.post_after(focus_delay, move || {
            director.run_focus(generation, &plan);
        });
    }

    /// Cancel any pending focus work and return to idle.
    pub(crate) fn disarm(&self) {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.state = DirectorState::Idle;
    }

    fn run_focus(&self, generation: u64, plan: &FocusPlan) {
        {
            let inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
        }

        let candidate = self.pick_target(plan);
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }
        match candidate {
            Some(target) => {
                match self.document.focus(target, plan.prevent_scroll) {
                    Ok(()) => {
                        inner.state = DirectorState::Focused;
                        tracing::debug!(
                            target: "cordon::director",
                            lock = ?self.lock,
                            element = ?target,
                            "focus moved"
                        );
                    }
                    Err(err) => {
                        // Target vanished between pick and focus.
                        inner.state = DirectorState::Idle;
                        tracing::warn!(target: "cordon::director", %err, "focus target lost");
                    }
                }
            }
            None => {
                inner.state = DirectorState::Idle;
                tracing::debug!(
                    target: "cordon::director",
                    lock = ?self.lock,
                    "no focusable target; leaving focus in place"
                );
            }
        }
    }

    fn pick_target(&self, plan: &FocusPlan) -> Option<ElementId> {
        // 1. The explicit target, when it resolves and sits inside the trap.
        if let Some(target) = &plan.target {
            if let Some(el) = self.resolve_explicit(target) {
                if self.manager.is_reachable_under(self.lock, el) {
                    return Some(el);
                }
                tracing::debug!(
                    target: "cordon::director",
                    element = ?el,
                    "explicit target not reachable under trap; falling through"
                );
            }
        }

        let root = self.manager.lock_root(self.lock)?;

        // 2. The trap root itself, when configured focusable and tabbable.
        if plan.must_be_focusable && self.is_tabbable(root) {
            return Some(root);
        }

        // 3. First tabbable descendant in document order.
        self.document
            .element_subtree(root)
            .into_iter()
            .filter(|&el| el != root)
            .find(|&el| self.is_tabbable(el))
    }

    fn resolve_explicit(&self, target: &FocusTarget) -> Option<ElementId> {
        match target {
            FocusTarget::Element(el) => self.document.is_element(*el).then_some(*el),
            FocusTarget::Selector(selector) => match resolve_selector(&self.document, selector) {
                Ok(found) => found,
                Err(err) => {
                    // Demoted to "no explicit target".
                    tracing::warn!(target: "cordon::director", %err, "ignoring focus target");
                    None
                }
            },
        }
    }

    fn is_tabbable(&self, el: ElementId) -> bool {
        let effective = self
            .document
            .attribute(el, ATTR_TAB_INDEX)
            .as_deref()
            .and_then(parse_tab_index)
            .unwrap_or_else(|| {
                if self.document.is_intrinsically_focusable(el) {
                    0
                } else {
                    -1
                }
            });
        effective >= 0
    }
}

/// Resolve a `#id` selector against the document.
///
/// Only the id-selector grammar is supported; anything else is an
/// [`Error::InvalidSelector`].
pub(crate) fn resolve_selector(
    document: &Document,
    selector: &str,
) -> Result<Option<ElementId>, Error> {
    let Some(id) = selector.strip_prefix('#') else {
        return Err(Error::invalid_selector(selector, "expected an id selector"));
    };
    if id.is_empty() {
        return Err(Error::invalid_selector(selector, "empty id"));
    }
    if id.chars().any(|c| c.is_whitespace() || c == '#') {
        return Err(Error::invalid_selector(selector, "malformed id"));
    }
    Ok(document.element_by_id(id))
}
