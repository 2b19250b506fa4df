/// Reasons a snapshot is rejected by the reconciler.
///
/// Any of these leaves the previously displayed tree untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("node {id} at {path} has no record")]
    MissingNode { id: String, path: String },

    #[error("path {path} has no node id")]
    UnmappedPath { path: String },

    #[error("invalid path {path:?}")]
    InvalidPath { path: String },

    #[error("path {path} listed more than once")]
    DuplicatePath { path: String },

    #[error("node {id} appears at more than one path")]
    DuplicateId { id: String },

    #[error("path {path} has no parent {parent} in hierarchy")]
    OrphanPath { path: String, parent: String },
}
