//! Core systems for Cordon.
//!
//! This crate provides the host-environment primitives the Cordon
//! focus-containment engine runs against:
//!
//! - **Document Tree**: arena-allocated element tree with string attributes,
//!   presence-aware attribute access, and a live input-focus cell
//! - **Mutation Feed**: batched structural/attribute change notifications
//!   with subscribe/unsubscribe handles
//! - **Task Queue**: single-threaded cooperative scheduling with injectable
//!   delay hooks
//! - **Logging**: `tracing` targets and a document-tree debug formatter
//!
//! # Example
//!
//! ```
//! use cordon_core::{Document, TaskQueue};
//!
//! let queue = TaskQueue::new();
//! let doc = Document::new(queue.clone());
//!
//! // Build a tree and watch it mutate.
//! doc.mutations().subscribe(|batch| {
//!     println!("observed {} changes", batch.len());
//! });
//!
//! let dialog = doc.create_element("div");
//! doc.append_child(doc.root(), dialog).unwrap();
//! doc.set_attribute(dialog, "id", "dialog").unwrap();
//!
//! // Mutations are delivered at the next checkpoint.
//! queue.run_until_idle();
//! ```

mod document;
mod error;
pub mod logging;
mod mutation;
mod queue;

pub use document::{Document, ElementId};
pub use error::{CoreError, DocumentError, DocumentResult, QueueError, Result};
pub use logging::{DocumentTreeDebug, TreeFormatOptions, TreeStyle};
pub use mutation::{MutationFeed, MutationRecord, SubscriptionId};
pub use queue::{Delay, TaskId, TaskQueue};
