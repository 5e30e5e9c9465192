//! The host document tree.
//!
//! Cordon's engine operates against a live tree of elements with string
//! attributes, the stand-in for whatever document the host UI renders. The
//! tree is arena-allocated with stable [`ElementId`] keys; identity survives
//! attribute and structural edits and is never compared by value.
//!
//! Every structural insertion and attribute change is recorded and delivered
//! as a batch through the document's [`MutationFeed`] at the next queue
//! checkpoint. Mutating calls never invoke subscribers re-entrantly.
//!
//! The document also owns the live input-focus cell ([`Document::focused`],
//! [`Document::focus`], [`Document::blur`]) that the engine's focus director
//! drives.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

use crate::error::{DocumentError, DocumentResult};
use crate::mutation::{MutationFeed, MutationRecord};
use crate::queue::TaskQueue;

new_key_type! {
    /// A unique identifier for a node in the document tree.
    ///
    /// IDs are slotmap keys: stable for the node's lifetime, compared by
    /// identity only, and never reused while the node is alive.
    pub struct ElementId;
}

/// Tags that participate in keyboard navigation without an explicit
/// `tabindex` attribute. Everything else defaults to unreachable, matching
/// the effective DOM `tabIndex` property the engine's origin rules assume.
const INTRINSICALLY_FOCUSABLE_TAGS: &[&str] = &["a", "button", "input", "select", "textarea"];

/// Node payload: element or text.
#[derive(Debug)]
enum NodeData {
    Element(ElementData),
    Text(String),
}

/// Element payload: tag name and attribute list.
///
/// Attributes keep insertion order and distinguish "absent" from "present
/// with empty value"; the engine's restoration rules depend on exact
/// presence semantics.
#[derive(Debug)]
struct ElementData {
    tag: String,
    attrs: Vec<(String, String)>,
}

impl ElementData {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn set_attribute(&mut self, name: &str, value: &str) {
        for (n, v) in self.attrs.iter_mut() {
            if n == name {
                *v = value.to_string();
                return;
            }
        }
        self.attrs.push((name.to_string(), value.to_string()));
    }

    fn remove_attribute(&mut self, name: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|(n, _)| n == name)?;
        Some(self.attrs.remove(pos).1)
    }
}

/// One tree node: links plus payload.
#[derive(Debug)]
struct NodeEntry {
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    data: NodeData,
}

/// Internal document state behind the shared handle.
struct DocumentInner {
    nodes: SlotMap<ElementId, NodeEntry>,
    root: ElementId,
    focused: Option<ElementId>,
    pending: Vec<MutationRecord>,
    delivery_scheduled: bool,
}

impl DocumentInner {
    fn is_element(&self, id: ElementId) -> bool {
        matches!(
            self.nodes.get(id),
            Some(NodeEntry {
                data: NodeData::Element(_),
                ..
            })
        )
    }

    fn element(&self, id: ElementId) -> Option<&ElementData> {
        match self.nodes.get(id) {
            Some(NodeEntry {
                data: NodeData::Element(e),
                ..
            }) => Some(e),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: ElementId) -> Option<&mut ElementData> {
        match self.nodes.get_mut(id) {
            Some(NodeEntry {
                data: NodeData::Element(e),
                ..
            }) => Some(e),
            _ => None,
        }
    }

    /// Ancestor-or-self containment along the parent chain.
    fn contains(&self, ancestor: ElementId, node: ElementId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(id).and_then(|n| n.parent);
        }
        false
    }

    /// Pre-order walk collecting element IDs under (and including) `from`.
    fn collect_elements(&self, from: ElementId, out: &mut Vec<ElementId>) {
        let Some(node) = self.nodes.get(from) else {
            return;
        };
        if matches!(node.data, NodeData::Element(_)) {
            out.push(from);
        }
        for &child in &node.children {
            self.collect_elements(child, out);
        }
    }

    fn record(&mut self, record: MutationRecord) -> bool {
        self.pending.push(record);
        if self.delivery_scheduled {
            false
        } else {
            self.delivery_scheduled = true;
            true
        }
    }
}

/// A shared handle to the document tree.
///
/// Cheap to clone; all clones refer to the same tree. Structural and
/// attribute edits go through this handle so that mutation records are
/// collected and delivered consistently.
#[derive(Clone)]
pub struct Document {
    inner: Arc<Mutex<DocumentInner>>,
    feed: MutationFeed,
    queue: TaskQueue,
}

static_assertions::assert_impl_all!(Document: Send, Sync);

impl Document {
    /// Create a document with a single root element (tag `body`).
    ///
    /// Mutation batches are delivered via tasks posted to `queue`.
    pub fn new(queue: TaskQueue) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(NodeEntry {
            parent: None,
            children: Vec::new(),
            data: NodeData::Element(ElementData {
                tag: "body".to_string(),
                attrs: Vec::new(),
            }),
        });
        Self {
            inner: Arc::new(Mutex::new(DocumentInner {
                nodes,
                root,
                focused: None,
                pending: Vec::new(),
                delivery_scheduled: false,
            })),
            feed: MutationFeed::new(),
            queue,
        }
    }

    /// The root element.
    pub fn root(&self) -> ElementId {
        self.inner.lock().root
    }

    /// The mutation feed for this document.
    pub fn mutations(&self) -> &MutationFeed {
        &self.feed
    }

    /// The task queue this document delivers batches on.
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    // =========================================================================
    // Structure
    // =========================================================================

    /// Create a detached element. Nothing is recorded until it is attached.
    pub fn create_element(&self, tag: &str) -> ElementId {
        self.inner.lock().nodes.insert(NodeEntry {
            parent: None,
            children: Vec::new(),
            data: NodeData::Element(ElementData {
                tag: tag.to_ascii_lowercase(),
                attrs: Vec::new(),
            }),
        })
    }

    /// Create a detached text node.
    pub fn create_text(&self, content: &str) -> ElementId {
        self.inner.lock().nodes.insert(NodeEntry {
            parent: None,
            children: Vec::new(),
            data: NodeData::Text(content.to_string()),
        })
    }

    /// Append a detached node as the last child of `parent`.
    ///
    /// Records a structural mutation if the node ends up connected to the
    /// root.
    pub fn append_child(&self, parent: ElementId, child: ElementId) -> DocumentResult<()> {
        let schedule = {
            let mut inner = self.inner.lock();
            if !inner.nodes.contains_key(child) {
                return Err(DocumentError::NodeNotFound);
            }
            if !inner.is_element(parent) {
                return Err(DocumentError::NotAnElement);
            }
            if inner.nodes[child].parent.is_some() {
                return Err(DocumentError::AlreadyAttached);
            }
            if inner.contains(child, parent) {
                return Err(DocumentError::WouldCreateCycle);
            }

            inner.nodes[child].parent = Some(parent);
            inner.nodes[parent].children.push(child);

            if inner.contains(inner.root, parent) {
                inner.record(MutationRecord::ChildrenAdded { added: vec![child] })
            } else {
                false
            }
        };
        if schedule {
            self.schedule_delivery();
        }
        Ok(())
    }

    /// Detach `node` from its parent and drop it together with its subtree.
    ///
    /// If the live focus was inside the removed subtree it is cleared.
    pub fn remove(&self, node: ElementId) -> DocumentResult<()> {
        let mut inner = self.inner.lock();
        if !inner.nodes.contains_key(node) {
            return Err(DocumentError::NodeNotFound);
        }
        if node == inner.root {
            return Err(DocumentError::NotAnElement);
        }
        if let Some(parent) = inner.nodes[node].parent {
            let children = &mut inner.nodes[parent].children;
            children.retain(|&c| c != node);
        }
        // Drop the subtree depth-first.
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(entry) = inner.nodes.remove(id) {
                stack.extend(entry.children);
            }
            if inner.focused == Some(id) {
                inner.focused = None;
            }
        }
        Ok(())
    }

    /// Whether `node` is still connected under the document root.
    pub fn is_connected(&self, node: ElementId) -> bool {
        let inner = self.inner.lock();
        inner.contains(inner.root, node)
    }

    /// Whether `node` exists and is an element.
    pub fn is_element(&self, node: ElementId) -> bool {
        self.inner.lock().is_element(node)
    }

    /// The element's tag name.
    pub fn tag(&self, node: ElementId) -> Option<String> {
        self.inner.lock().element(node).map(|e| e.tag.clone())
    }

    /// The text node's content. `None` for elements and missing nodes.
    pub fn text_content(&self, node: ElementId) -> Option<String> {
        match self.inner.lock().nodes.get(node) {
            Some(NodeEntry {
                data: NodeData::Text(content),
                ..
            }) => Some(content.clone()),
            _ => None,
        }
    }

    /// The element's parent, if any.
    pub fn parent(&self, node: ElementId) -> Option<ElementId> {
        self.inner.lock().nodes.get(node).and_then(|n| n.parent)
    }

    /// The node's direct children, in tree order.
    pub fn children(&self, node: ElementId) -> Vec<ElementId> {
        self.inner
            .lock()
            .nodes
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Ancestor-or-self containment: is `node` inside (or equal to)
    /// `ancestor`?
    pub fn contains(&self, ancestor: ElementId, node: ElementId) -> bool {
        self.inner.lock().contains(ancestor, node)
    }

    /// Proper-ancestor test: is `node` a strict ancestor of `descendant`?
    pub fn is_ancestor_of(&self, node: ElementId, descendant: ElementId) -> bool {
        node != descendant && self.contains(node, descendant)
    }

    /// Every element in document order (pre-order, depth-first), starting
    /// at the root.
    pub fn elements(&self) -> Vec<ElementId> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        inner.collect_elements(inner.root, &mut out);
        out
    }

    /// `node` and its element descendants in document order.
    ///
    /// Empty if `node` is not an element (text nodes have no element
    /// descendants in this tree).
    pub fn element_subtree(&self, node: ElementId) -> Vec<ElementId> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        inner.collect_elements(node, &mut out);
        out
    }

    /// Whether the element is reachable by keyboard with no explicit
    /// `tabindex` attribute, based on its tag.
    pub fn is_intrinsically_focusable(&self, node: ElementId) -> bool {
        self.inner
            .lock()
            .element(node)
            .is_some_and(|e| INTRINSICALLY_FOCUSABLE_TAGS.contains(&e.tag.as_str()))
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Read an attribute value. `None` means the attribute is absent, which
    /// is distinct from `Some("")`.
    pub fn attribute(&self, node: ElementId, name: &str) -> Option<String> {
        self.inner
            .lock()
            .element(node)
            .and_then(|e| e.attribute(name).map(str::to_string))
    }

    /// Set an attribute, recording the change with its old value.
    pub fn set_attribute(&self, node: ElementId, name: &str, value: &str) -> DocumentResult<()> {
        let schedule = {
            let mut inner = self.inner.lock();
            if !inner.nodes.contains_key(node) {
                return Err(DocumentError::NodeNotFound);
            }
            let Some(element) = inner.element_mut(node) else {
                return Err(DocumentError::NotAnElement);
            };
            let old_value = element.attribute(name).map(str::to_string);
            element.set_attribute(name, value);
            inner.record(MutationRecord::AttributeChanged {
                target: node,
                name: name.to_string(),
                old_value,
            })
        };
        if schedule {
            self.schedule_delivery();
        }
        Ok(())
    }

    /// Remove an attribute. Recording happens only if it was present.
    pub fn remove_attribute(&self, node: ElementId, name: &str) -> DocumentResult<()> {
        let schedule = {
            let mut inner = self.inner.lock();
            if !inner.nodes.contains_key(node) {
                return Err(DocumentError::NodeNotFound);
            }
            let Some(element) = inner.element_mut(node) else {
                return Err(DocumentError::NotAnElement);
            };
            match element.remove_attribute(name) {
                Some(old) => inner.record(MutationRecord::AttributeChanged {
                    target: node,
                    name: name.to_string(),
                    old_value: Some(old),
                }),
                None => false,
            }
        };
        if schedule {
            self.schedule_delivery();
        }
        Ok(())
    }

    /// Find the first element in document order whose `id` attribute equals
    /// `value`.
    pub fn element_by_id(&self, value: &str) -> Option<ElementId> {
        let inner = self.inner.lock();
        let mut out = Vec::new();
        inner.collect_elements(inner.root, &mut out);
        out.into_iter()
            .find(|&id| inner.element(id).and_then(|e| e.attribute("id")) == Some(value))
    }

    // =========================================================================
    // Live focus
    // =========================================================================

    /// The element that currently holds input focus.
    pub fn focused(&self) -> Option<ElementId> {
        self.inner.lock().focused
    }

    /// Move input focus to `node`.
    ///
    /// `prevent_scroll` is a pass-through knob for the host; this in-memory
    /// tree only logs it.
    pub fn focus(&self, node: ElementId, prevent_scroll: bool) -> DocumentResult<()> {
        let mut inner = self.inner.lock();
        if !inner.is_element(node) {
            return Err(DocumentError::NotAnElement);
        }
        if !inner.contains(inner.root, node) {
            return Err(DocumentError::NodeNotFound);
        }
        tracing::debug!(
            target: "cordon_core::document",
            ?node,
            prevent_scroll,
            "focus moved"
        );
        inner.focused = Some(node);
        Ok(())
    }

    /// Clear input focus.
    pub fn blur(&self) {
        let mut inner = self.inner.lock();
        if inner.focused.take().is_some() {
            tracing::debug!(target: "cordon_core::document", "focus cleared");
        }
    }

    // =========================================================================
    // Mutation delivery
    // =========================================================================

    /// Post a delivery task for the pending batch.
    ///
    /// Called exactly once per batch, when the first record is added.
    fn schedule_delivery(&self) {
        let doc = self.clone();
        self.queue.post(move || doc.deliver_pending());
    }

    fn deliver_pending(&self) {
        let batch = {
            let mut inner = self.inner.lock();
            inner.delivery_scheduled = false;
            std::mem::take(&mut inner.pending)
        };
        // The lock is released before subscribers run; callbacks may freely
        // read and mutate the document.
        self.feed.deliver(&batch);
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Document")
            .field("nodes", &inner.nodes.len())
            .field("focused", &inner.focused)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    fn fixture() -> (TaskQueue, Document) {
        let queue = TaskQueue::new();
        let doc = Document::new(queue.clone());
        (queue, doc)
    }

    #[test]
    fn test_append_and_document_order() {
        let (_, doc) = fixture();
        let a = doc.create_element("div");
        let b = doc.create_element("button");
        let c = doc.create_element("span");
        doc.append_child(doc.root(), a).unwrap();
        doc.append_child(a, b).unwrap();
        doc.append_child(doc.root(), c).unwrap();

        assert_eq!(doc.elements(), vec![doc.root(), a, b, c]);
        assert!(doc.contains(a, b));
        assert!(doc.is_ancestor_of(a, b));
        assert!(!doc.is_ancestor_of(b, a));
        assert!(doc.contains(b, b));
    }

    #[test]
    fn test_text_nodes_excluded_from_element_walks() {
        let (_, doc) = fixture();
        let text = doc.create_text("hello");
        doc.append_child(doc.root(), text).unwrap();

        assert_eq!(doc.elements(), vec![doc.root()]);
        assert!(!doc.is_element(text));
        assert_eq!(doc.text_content(text), Some("hello".to_string()));
        assert_eq!(doc.text_content(doc.root()), None);
    }

    #[test]
    fn test_attribute_presence_semantics() {
        let (_, doc) = fixture();
        let el = doc.create_element("div");
        doc.append_child(doc.root(), el).unwrap();

        assert_eq!(doc.attribute(el, "tabindex"), None);
        doc.set_attribute(el, "tabindex", "").unwrap();
        assert_eq!(doc.attribute(el, "tabindex"), Some(String::new()));
        doc.remove_attribute(el, "tabindex").unwrap();
        assert_eq!(doc.attribute(el, "tabindex"), None);
    }

    #[test]
    fn test_mutations_delivered_in_one_batch_at_checkpoint() {
        let (queue, doc) = fixture();
        let batches = Arc::new(AtomicUsize::new(0));
        let records = Arc::new(AtomicUsize::new(0));

        let batches_clone = batches.clone();
        let records_clone = records.clone();
        doc.mutations().subscribe(move |batch| {
            batches_clone.fetch_add(1, Ordering::SeqCst);
            records_clone.fetch_add(batch.len(), Ordering::SeqCst);
        });

        let el = doc.create_element("div");
        doc.append_child(doc.root(), el).unwrap();
        doc.set_attribute(el, "tabindex", "0").unwrap();

        // Nothing delivered synchronously.
        assert_eq!(batches.load(Ordering::SeqCst), 0);

        queue.run_until_idle();
        assert_eq!(batches.load(Ordering::SeqCst), 1);
        assert_eq!(records.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_attribute_record_carries_old_value() {
        let (queue, doc) = fixture();
        let el = doc.create_element("div");
        doc.append_child(doc.root(), el).unwrap();
        doc.set_attribute(el, "tabindex", "3").unwrap();
        queue.run_until_idle();

        let seen: Arc<Mutex<Vec<MutationRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        doc.mutations().subscribe(move |batch| {
            seen_clone.lock().extend_from_slice(batch);
        });

        doc.set_attribute(el, "tabindex", "-1").unwrap();
        queue.run_until_idle();

        let records = seen.lock();
        assert_eq!(
            *records,
            vec![MutationRecord::AttributeChanged {
                target: el,
                name: "tabindex".to_string(),
                old_value: Some("3".to_string()),
            }]
        );
    }

    #[test]
    fn test_detached_subtree_records_nothing() {
        let (queue, doc) = fixture();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        doc.mutations().subscribe(move |batch| {
            seen_clone.fetch_add(batch.len(), Ordering::SeqCst);
        });

        let parent = doc.create_element("div");
        let child = doc.create_element("span");
        doc.append_child(parent, child).unwrap();
        queue.run_until_idle();
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        // Connecting the subtree root records one structural change.
        doc.append_child(doc.root(), parent).unwrap();
        queue.run_until_idle();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_append_errors() {
        let (_, doc) = fixture();
        let a = doc.create_element("div");
        let b = doc.create_element("div");
        doc.append_child(doc.root(), a).unwrap();
        doc.append_child(a, b).unwrap();

        assert_eq!(
            doc.append_child(a, b),
            Err(DocumentError::AlreadyAttached)
        );
        let text = doc.create_text("x");
        assert_eq!(
            doc.append_child(text, doc.create_element("div")),
            Err(DocumentError::NotAnElement)
        );
    }

    #[test]
    fn test_remove_clears_focus_inside_subtree() {
        let (_, doc) = fixture();
        let a = doc.create_element("div");
        let b = doc.create_element("button");
        doc.append_child(doc.root(), a).unwrap();
        doc.append_child(a, b).unwrap();

        doc.focus(b, false).unwrap();
        assert_eq!(doc.focused(), Some(b));

        doc.remove(a).unwrap();
        assert_eq!(doc.focused(), None);
        assert!(!doc.is_connected(b));
    }

    #[test]
    fn test_element_by_id() {
        let (_, doc) = fixture();
        let a = doc.create_element("div");
        let b = doc.create_element("div");
        doc.append_child(doc.root(), a).unwrap();
        doc.append_child(doc.root(), b).unwrap();
        doc.set_attribute(b, "id", "target").unwrap();

        assert_eq!(doc.element_by_id("target"), Some(b));
        assert_eq!(doc.element_by_id("missing"), None);
    }

    #[test]
    fn test_intrinsic_focusability_by_tag() {
        let (_, doc) = fixture();
        let button = doc.create_element("BUTTON");
        let div = doc.create_element("div");
        doc.append_child(doc.root(), button).unwrap();
        doc.append_child(doc.root(), div).unwrap();

        assert!(doc.is_intrinsically_focusable(button));
        assert!(!doc.is_intrinsically_focusable(div));
    }
}
