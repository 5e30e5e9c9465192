//! End-to-end containment behavior through the public surface.

use std::sync::Arc;

use cordon::{FocusEngine, FocusTarget, FocusTrap, TrapOptions};
use cordon_core::{Delay, Document, ElementId, TaskQueue};
use parking_lot::Mutex;

struct World {
    queue: TaskQueue,
    doc: Document,
    engine: FocusEngine,
}

fn world() -> World {
    let queue = TaskQueue::new();
    let doc = Document::new(queue.clone());
    let engine = FocusEngine::new(doc.clone(), queue.clone());
    World { queue, doc, engine }
}

impl World {
    fn element(&self, tag: &str, parent: ElementId) -> ElementId {
        let el = self.doc.create_element(tag);
        self.doc.append_child(parent, el).unwrap();
        el
    }

    fn trap_on(&self, root: ElementId) -> FocusTrap {
        let trap = self.engine.trap();
        trap.configure(root, TrapOptions::default());
        self.queue.run_until_idle();
        trap
    }

    fn tabindex(&self, el: ElementId) -> Option<String> {
        self.doc.attribute(el, "tabindex")
    }

    fn aria_hidden(&self, el: ElementId) -> Option<String> {
        self.doc.attribute(el, "aria-hidden")
    }
}

/// body > div#a[tabindex=3], div#trap > button#b, div#c[tabindex=-1]
fn abc_scenario(w: &World) -> (ElementId, ElementId, ElementId, ElementId) {
    let a = w.element("div", w.doc.root());
    let trap = w.element("div", w.doc.root());
    let b = w.element("button", trap);
    let c = w.element("div", w.doc.root());
    w.doc.set_attribute(a, "tabindex", "3").unwrap();
    w.doc.set_attribute(c, "tabindex", "-1").unwrap();
    w.queue.run_until_idle();
    (a, trap, b, c)
}

#[test]
fn test_activation_scenario_writes_exactly_what_changes() {
    let w = world();
    let (a, trap_root, b, c) = abc_scenario(&w);

    let trap = w.trap_on(trap_root);

    // #a was reachable outside: forced out.
    assert_eq!(w.tabindex(a), Some("-1".into()));
    // #b is inside and intrinsically focusable: untouched, attribute stays absent.
    assert_eq!(w.tabindex(b), None);
    // #c was already unreachable: untouched.
    assert_eq!(w.tabindex(c), Some("-1".into()));

    trap.teardown();
    w.queue.run_until_idle();
    assert_eq!(w.tabindex(a), Some("3".into()));
    assert_eq!(w.tabindex(b), None);
    assert_eq!(w.tabindex(c), Some("-1".into()));
}

#[test]
fn test_reactivation_is_idempotent() {
    let w = world();
    let (_, trap_root, _, _) = abc_scenario(&w);

    let trap = w.engine.trap();
    trap.configure(trap_root, TrapOptions::default());
    w.queue.run_until_idle();

    let writes = Arc::new(Mutex::new(Vec::new()));
    let writes_clone = writes.clone();
    w.doc.mutations().subscribe(move |batch| {
        writes_clone.lock().extend_from_slice(batch);
    });

    trap.configure(trap_root, TrapOptions::default());
    w.queue.run_until_idle();
    assert!(writes.lock().is_empty(), "second activation must write nothing");
}

#[test]
fn test_restoration_preserves_attribute_presence() {
    let w = world();
    let trap_root = w.element("div", w.doc.root());
    w.element("button", trap_root);
    let absent = w.element("button", w.doc.root());
    let explicit_zero = w.element("div", w.doc.root());
    w.doc.set_attribute(explicit_zero, "tabindex", "0").unwrap();
    w.queue.run_until_idle();

    let trap = w.trap_on(trap_root);
    assert_eq!(w.tabindex(absent), Some("-1".into()));
    assert_eq!(w.tabindex(explicit_zero), Some("-1".into()));

    trap.teardown();
    w.queue.run_until_idle();
    // "absent" and "present with value 0" restore differently.
    assert_eq!(w.tabindex(absent), None);
    assert_eq!(w.tabindex(explicit_zero), Some("0".into()));
}

#[test]
fn test_two_traps_reference_count_release_in_creation_order() {
    let w = world();
    let first_root = w.element("div", w.doc.root());
    w.element("button", first_root);
    let second_root = w.element("div", w.doc.root());
    w.element("button", second_root);
    let outside = w.element("button", w.doc.root());
    w.queue.run_until_idle();

    let first = w.trap_on(first_root);
    let second = w.trap_on(second_root);

    // Outside is locked out by both traps.
    assert_eq!(w.tabindex(outside), Some("-1".into()));

    // Releasing the first trap must not restore: the second still holds a claim.
    first.teardown();
    w.queue.run_until_idle();
    assert_eq!(w.tabindex(outside), Some("-1".into()));

    second.teardown();
    w.queue.run_until_idle();
    assert_eq!(w.tabindex(outside), None);
}

#[test]
fn test_two_traps_reference_count_release_in_reverse_order() {
    let w = world();
    let first_root = w.element("div", w.doc.root());
    w.element("button", first_root);
    let second_root = w.element("div", w.doc.root());
    w.element("button", second_root);
    let outside = w.element("button", w.doc.root());
    w.doc.set_attribute(outside, "tabindex", "5").unwrap();
    w.queue.run_until_idle();

    let first = w.trap_on(first_root);
    let second = w.trap_on(second_root);

    second.teardown();
    w.queue.run_until_idle();
    assert_eq!(w.tabindex(outside), Some("-1".into()));

    first.teardown();
    w.queue.run_until_idle();
    assert_eq!(w.tabindex(outside), Some("5".into()));
}

#[test]
fn test_override_marker_is_never_touched() {
    let w = world();
    let trap_root = w.element("div", w.doc.root());
    w.element("button", trap_root);
    let opted_out = w.element("button", w.doc.root());
    w.doc
        .set_attribute(opted_out, "data-focus-override", "true")
        .unwrap();
    w.doc.set_attribute(opted_out, "tabindex", "2").unwrap();
    w.queue.run_until_idle();

    let trap = w.trap_on(trap_root);
    assert_eq!(w.tabindex(opted_out), Some("2".into()));

    trap.teardown();
    w.queue.run_until_idle();
    assert_eq!(w.tabindex(opted_out), Some("2".into()));
}

#[test]
fn test_override_focus_value_also_opts_out() {
    let w = world();
    let trap_root = w.element("div", w.doc.root());
    w.element("button", trap_root);
    let opted_out = w.element("button", w.doc.root());
    w.doc
        .set_attribute(opted_out, "data-focus-override", "focus")
        .unwrap();
    w.queue.run_until_idle();

    let _trap = w.trap_on(trap_root);
    assert_eq!(w.tabindex(opted_out), None);
}

#[test]
fn test_inserted_outside_element_gets_locked_out() {
    let w = world();
    let trap_root = w.element("div", w.doc.root());
    w.element("button", trap_root);
    w.queue.run_until_idle();

    let _trap = w.trap_on(trap_root);

    let late = w.element("button", w.doc.root());
    w.queue.run_until_idle();
    assert_eq!(w.tabindex(late), Some("-1".into()));
}

#[test]
fn test_inserted_descendant_stays_reachable() {
    let w = world();
    let trap_root = w.element("div", w.doc.root());
    w.element("button", trap_root);
    w.queue.run_until_idle();

    let _trap = w.trap_on(trap_root);

    let late_inside = w.element("button", trap_root);
    w.queue.run_until_idle();
    assert_eq!(w.tabindex(late_inside), None);
}

#[test]
fn test_visibility_management_end_to_end() {
    let w = world();
    let trap_root = w.element("div", w.doc.root());
    let inside = w.element("button", trap_root);
    let outside = w.element("div", w.doc.root());
    let already_hidden = w.element("div", w.doc.root());
    w.doc
        .set_attribute(already_hidden, "aria-hidden", "true")
        .unwrap();
    w.queue.run_until_idle();

    let trap = w.engine.trap();
    trap.configure(
        trap_root,
        TrapOptions {
            manage_visibility: true,
            ..TrapOptions::default()
        },
    );
    w.queue.run_until_idle();

    assert_eq!(w.aria_hidden(outside), Some("true".into()));
    // Absent already reads as exposed: no write on the interior or ancestors.
    assert_eq!(w.aria_hidden(inside), None);
    assert_eq!(w.aria_hidden(trap_root), None);
    assert_eq!(w.aria_hidden(w.doc.root()), None);
    // Already hidden: no write needed, and presence restores.
    assert_eq!(w.aria_hidden(already_hidden), Some("true".into()));

    trap.teardown();
    w.queue.run_until_idle();
    assert_eq!(w.aria_hidden(outside), None);
    assert_eq!(w.aria_hidden(already_hidden), Some("true".into()));
}

#[test]
fn test_focus_moves_into_trap_and_blurs_outside() {
    let w = world();
    let outside = w.element("button", w.doc.root());
    let trap_root = w.element("div", w.doc.root());
    let inside = w.element("button", trap_root);
    w.queue.run_until_idle();
    w.doc.focus(outside, false).unwrap();

    let _trap = w.trap_on(trap_root);
    assert_eq!(w.doc.focused(), Some(inside));
}

#[test]
fn test_explicit_focus_target_by_selector() {
    let w = world();
    let trap_root = w.element("div", w.doc.root());
    let _first = w.element("button", trap_root);
    let second = w.element("button", trap_root);
    w.doc.set_attribute(second, "id", "confirm").unwrap();
    w.queue.run_until_idle();

    let trap = w.engine.trap();
    trap.configure(
        trap_root,
        TrapOptions {
            focus_target: Some(FocusTarget::Selector("#confirm".into())),
            ..TrapOptions::default()
        },
    );
    w.queue.run_until_idle();
    assert_eq!(w.doc.focused(), Some(second));
}

#[test]
fn test_unreachable_explicit_target_falls_back() {
    let w = world();
    let elsewhere = w.element("button", w.doc.root());
    let trap_root = w.element("div", w.doc.root());
    let inside = w.element("button", trap_root);
    w.queue.run_until_idle();

    let trap = w.engine.trap();
    trap.configure(
        trap_root,
        TrapOptions {
            focus_target: Some(FocusTarget::Element(elsewhere)),
            ..TrapOptions::default()
        },
    );
    w.queue.run_until_idle();
    assert_eq!(w.doc.focused(), Some(inside));
}

#[test]
fn test_external_tabindex_edit_updates_restoration_target() {
    let w = world();
    let (a, trap_root, _, _) = abc_scenario(&w);

    let trap = w.trap_on(trap_root);
    assert_eq!(w.tabindex(a), Some("-1".into()));

    // Author changes #a's tabindex while the trap holds it.
    w.doc.set_attribute(a, "tabindex", "7").unwrap();
    w.queue.run_until_idle();
    // The lock re-enforces unreachability.
    assert_eq!(w.tabindex(a), Some("-1".into()));

    trap.teardown();
    w.queue.run_until_idle();
    // Restoration targets the author's latest value, not the stale origin.
    assert_eq!(w.tabindex(a), Some("7".into()));
}

#[test]
fn test_write_delay_hook_defers_the_batch() {
    let w = world();
    let (a, trap_root, _, _) = abc_scenario(&w);

    let parked: Arc<Mutex<Vec<Box<dyn FnOnce() + Send>>>> = Arc::new(Mutex::new(Vec::new()));
    let parked_clone = parked.clone();
    let hook = Delay::Hook(Arc::new(move |cont| {
        parked_clone.lock().push(cont);
    }));

    let trap = w.engine.trap();
    trap.configure(
        trap_root,
        TrapOptions {
            write_delay: hook,
            ..TrapOptions::default()
        },
    );
    w.queue.run_until_idle();
    // The host has not released the continuation: nothing written yet.
    assert_eq!(w.tabindex(a), Some("3".into()));

    let conts: Vec<_> = parked.lock().drain(..).collect();
    for cont in conts {
        cont();
    }
    w.queue.run_until_idle();
    assert_eq!(w.tabindex(a), Some("-1".into()));
}

#[test]
fn test_disable_during_pending_activation_stays_released() {
    let w = world();
    let (a, trap_root, b, _) = abc_scenario(&w);

    let parked: Arc<Mutex<Vec<Box<dyn FnOnce() + Send>>>> = Arc::new(Mutex::new(Vec::new()));
    let parked_clone = parked.clone();
    let hook = Delay::Hook(Arc::new(move |cont| {
        parked_clone.lock().push(cont);
    }));

    let trap = w.engine.trap();
    trap.configure(
        trap_root,
        TrapOptions {
            write_delay: hook.clone(),
            ..TrapOptions::default()
        },
    );
    w.queue.run_until_idle();
    assert_eq!(w.tabindex(a), Some("3".into()));

    // Disabled while the activation batch is still parked on the hook.
    trap.configure(
        trap_root,
        TrapOptions {
            enabled: false,
            write_delay: hook,
            ..TrapOptions::default()
        },
    );
    w.queue.run_until_idle();

    // The host fires the continuation afterwards; the stale batch must not
    // re-engage the disabled trap.
    let conts: Vec<_> = parked.lock().drain(..).collect();
    for cont in conts {
        cont();
    }
    w.queue.run_until_idle();

    assert_eq!(w.tabindex(a), Some("3".into()));
    assert_eq!(w.tabindex(b), None);
    assert_eq!(w.doc.focused(), None);
    assert!(!trap.is_active());
}

#[test]
fn test_reconfigure_with_new_target_rearms_focus() {
    let w = world();
    let trap_root = w.element("div", w.doc.root());
    let first = w.element("button", trap_root);
    let second = w.element("button", trap_root);
    w.doc.set_attribute(second, "id", "confirm").unwrap();
    w.queue.run_until_idle();

    let trap = w.engine.trap();
    trap.configure(trap_root, TrapOptions::default());
    w.queue.run_until_idle();
    assert_eq!(w.doc.focused(), Some(first));

    // A changed explicit target re-arms the director.
    trap.configure(
        trap_root,
        TrapOptions {
            focus_target: Some(FocusTarget::Selector("#confirm".into())),
            ..TrapOptions::default()
        },
    );
    w.queue.run_until_idle();
    assert_eq!(w.doc.focused(), Some(second));
}

#[test]
fn test_deactivate_during_pending_activation_restores_cleanly() {
    let w = world();
    let (a, trap_root, _, _) = abc_scenario(&w);

    let trap = w.engine.trap();
    trap.configure(trap_root, TrapOptions::default());
    // Teardown before the activation batch has run: the deactivation walk
    // queues behind it and computes from the state the batch left behind.
    trap.teardown();
    w.queue.run_until_idle();

    assert_eq!(w.tabindex(a), Some("3".into()));
}
