//! Demonstrates a modal-dialog focus trap: activation, a live mutation, an
//! author override, and exact restoration on teardown.
//!
//! Run with `RUST_LOG=cordon=debug,cordon_core=debug` to watch the engine's
//! decisions.

use cordon::{FocusEngine, FocusTarget, TrapOptions};
use cordon_core::logging::DocumentTreeDebug;
use cordon_core::{Document, ElementId, TaskQueue};

fn dump(doc: &Document, label: &str) {
    println!("--- {label}");
    print!("{}", DocumentTreeDebug::new(doc).format_tree());
    println!();
}

fn add(doc: &Document, tag: &str, parent: ElementId) -> ElementId {
    let el = doc.create_element(tag);
    doc.append_child(parent, el).expect("attach element");
    el
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let queue = TaskQueue::new();
    let doc = Document::new(queue.clone());

    // A page with a toolbar, a modal dialog, and a status line.
    let toolbar = add(&doc, "div", doc.root());
    let save = add(&doc, "button", toolbar);
    doc.set_attribute(save, "id", "save").expect("set id");
    doc.set_attribute(save, "tabindex", "3").expect("set tabindex");

    let dialog = add(&doc, "div", doc.root());
    doc.set_attribute(dialog, "id", "dialog").expect("set id");
    let confirm = add(&doc, "button", dialog);
    doc.set_attribute(confirm, "id", "confirm").expect("set id");

    let status = add(&doc, "div", doc.root());
    doc.set_attribute(status, "id", "status").expect("set id");
    doc.set_attribute(status, "data-focus-override", "true")
        .expect("set override");
    doc.set_attribute(status, "tabindex", "0").expect("set tabindex");
    queue.run_until_idle();
    dump(&doc, "before trap");

    // Trap focus inside the dialog, landing on #confirm.
    let engine = FocusEngine::new(doc.clone(), queue.clone());
    let trap = engine.trap();
    trap.configure(
        dialog,
        TrapOptions {
            focus_target: Some(FocusTarget::Selector("#confirm".into())),
            ..TrapOptions::default()
        },
    );
    queue.run_until_idle();
    dump(&doc, "trap active (toolbar locked out, #status untouched)");
    println!("focused: {:?}\n", doc.focused());

    // A button inserted into the live dialog becomes reachable on its own.
    let cancel = add(&doc, "button", dialog);
    doc.set_attribute(cancel, "id", "cancel").expect("set id");
    queue.run_until_idle();
    dump(&doc, "after inserting #cancel into the dialog");

    trap.teardown();
    queue.run_until_idle();
    dump(&doc, "after teardown (everything restored)");
}
