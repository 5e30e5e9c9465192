//! Error types for Cordon core.

use std::fmt;

/// The main error type for Cordon core operations.
#[derive(Debug)]
pub enum CoreError {
    /// Document-related error.
    Document(DocumentError),
    /// Task-queue-related error.
    Queue(QueueError),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(err) => write!(f, "Document error: {err}"),
            Self::Queue(err) => write!(f, "Queue error: {err}"),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Document(err) => Some(err),
            Self::Queue(err) => Some(err),
        }
    }
}

/// Document-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// The node ID is invalid or the node has been removed.
    NodeNotFound,
    /// The operation requires an element node but the target is not one.
    NotAnElement,
    /// Attaching the node would make it its own ancestor.
    WouldCreateCycle,
    /// The node already has a parent and must be detached first.
    AlreadyAttached,
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeNotFound => write!(f, "Invalid or removed node ID"),
            Self::NotAnElement => write!(f, "Target node is not an element"),
            Self::WouldCreateCycle => {
                write!(f, "Cannot attach a node as a descendant of itself")
            }
            Self::AlreadyAttached => {
                write!(f, "Node already has a parent; detach it first")
            }
        }
    }
}

impl std::error::Error for DocumentError {}

impl From<DocumentError> for CoreError {
    fn from(err: DocumentError) -> Self {
        Self::Document(err)
    }
}

/// Task-queue-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The task ID is invalid or the task has already run.
    InvalidTaskId,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTaskId => write!(f, "Invalid or completed task ID"),
        }
    }
}

impl std::error::Error for QueueError {}

impl From<QueueError> for CoreError {
    fn from(err: QueueError) -> Self {
        Self::Queue(err)
    }
}

/// A specialized Result type for Cordon core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// A specialized Result type for document operations.
pub type DocumentResult<T> = std::result::Result<T, DocumentError>;
