//! Cordon: focus containment for interactive document trees.
//!
//! A focus trap keeps keyboard focus inside one subtree (a modal dialog, a
//! menu) by rewriting `tabindex` on everything outside it, optionally hiding
//! the outside from assistive technology via `aria-hidden`, and restoring
//! every touched attribute byte-for-byte (including absence) when the trap
//! releases. Multiple overlapping traps compose through per-element
//! lock-identity sets, so state restores correctly no matter the release
//! order.
//!
//! The crate is organized the way the engine works:
//!
//! - `record` (internal): per-element state records and the pure
//!   resolution rules that turn lock membership into attribute writes
//! - `lock` (internal): the lock manager, which classifies containment,
//!   walks the document, and commits write batches
//! - `director` (internal): decides where input focus lands when a trap
//!   engages
//! - `trap`: the public surface, [`FocusEngine`] and [`FocusTrap`]
//!
//! # Example
//!
//! ```
//! use cordon_core::{Document, TaskQueue};
//! use cordon::{FocusEngine, FocusTarget, TrapOptions};
//!
//! let queue = TaskQueue::new();
//! let doc = Document::new(queue.clone());
//!
//! let dialog = doc.create_element("div");
//! let confirm = doc.create_element("button");
//! doc.append_child(doc.root(), dialog).unwrap();
//! doc.append_child(dialog, confirm).unwrap();
//! doc.set_attribute(confirm, "id", "confirm").unwrap();
//!
//! let engine = FocusEngine::new(doc.clone(), queue.clone());
//! let trap = engine.trap();
//! trap.configure(
//!     dialog,
//!     TrapOptions {
//!         focus_target: Some(FocusTarget::Selector("#confirm".into())),
//!         ..TrapOptions::default()
//!     },
//! );
//! queue.run_until_idle();
//! assert_eq!(doc.focused(), Some(confirm));
//!
//! trap.teardown();
//! queue.run_until_idle();
//! ```

mod director;
mod error;
mod lock;
mod record;
mod trap;

pub use director::{DirectorState, FocusTarget};
pub use error::Error;
pub use lock::LockId;
pub use trap::{FocusEngine, FocusTrap, TrapOptions};
