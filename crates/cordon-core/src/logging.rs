//! Logging and debugging facilities for Cordon.
//!
//! Cordon uses the `tracing` crate for instrumentation. To see logs, install
//! a subscriber in the host application:
//!
//! ```ignore
//! tracing_subscriber::fmt::init();
//! ```
//!
//! [`DocumentTreeDebug`] renders the document tree with the attribute state
//! the engine manages (`tabindex`, `aria-hidden`), which is the fastest way
//! to see what a trap actually wrote:
//!
//! ```
//! use cordon_core::{Document, TaskQueue};
//! use cordon_core::logging::DocumentTreeDebug;
//!
//! let doc = Document::new(TaskQueue::new());
//! let tree_debug = DocumentTreeDebug::new(&doc);
//! tracing::debug!("document state:\n{}", tree_debug.format_tree());
//! ```

use std::fmt::Write as FmtWrite;

use crate::document::{Document, ElementId};

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem, e.g.
/// `RUST_LOG=cordon::lock=trace`.
pub mod targets {
    /// Core crate target.
    pub const CORE: &str = "cordon_core";
    /// Document tree target.
    pub const DOCUMENT: &str = "cordon_core::document";
    /// Mutation feed target.
    pub const MUTATION: &str = "cordon_core::mutation";
    /// Task queue target.
    pub const QUEUE: &str = "cordon_core::queue";
    /// Lock manager target (engine crate).
    pub const LOCK: &str = "cordon::lock";
    /// Node record / resolution target (engine crate).
    pub const RECORD: &str = "cordon::record";
    /// Focus director target (engine crate).
    pub const DIRECTOR: &str = "cordon::director";
}

/// Style options for tree visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
}

/// Configuration for document tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show element IDs.
    pub show_ids: bool,
    /// Which attributes to display per element.
    pub attributes: Vec<String>,
    /// Maximum depth to traverse (`None` for unlimited).
    pub max_depth: Option<usize>,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: false,
            attributes: vec![
                "id".to_string(),
                "tabindex".to_string(),
                "aria-hidden".to_string(),
            ],
            max_depth: None,
        }
    }
}

/// Debug formatter for the document tree.
pub struct DocumentTreeDebug<'a> {
    document: &'a Document,
    options: TreeFormatOptions,
}

impl<'a> DocumentTreeDebug<'a> {
    /// Create a formatter with default options.
    pub fn new(document: &'a Document) -> Self {
        Self {
            document,
            options: TreeFormatOptions::default(),
        }
    }

    /// Create a formatter with explicit options.
    pub fn with_options(document: &'a Document, options: TreeFormatOptions) -> Self {
        Self { document, options }
    }

    /// Render the tree starting at the document root.
    pub fn format_tree(&self) -> String {
        let mut out = String::new();
        self.format_node(self.document.root(), 0, &mut out);
        out
    }

    fn format_node(&self, id: ElementId, depth: usize, out: &mut String) {
        if let Some(max) = self.options.max_depth {
            if depth > max {
                return;
            }
        }
        let branch = match self.options.style {
            TreeStyle::Ascii => "- ",
            TreeStyle::Unicode => "└ ",
        };
        let indent = |out: &mut String| {
            for _ in 0..depth {
                out.push_str("  ");
            }
            if depth > 0 {
                out.push_str(branch);
            }
        };

        let Some(tag) = self.document.tag(id) else {
            if let Some(text) = self.document.text_content(id) {
                indent(out);
                let _ = writeln!(out, "#text {text:?}");
            }
            return;
        };
        indent(out);
        out.push_str(&tag);
        if self.options.show_ids {
            let _ = write!(out, " ({id:?})");
        }
        for name in &self.options.attributes {
            if let Some(value) = self.document.attribute(id, name) {
                let _ = write!(out, " {name}={value:?}");
            }
        }
        out.push('\n');

        for child in self.document.children(id) {
            self.format_node(child, depth + 1, out);
        }
    }
}
