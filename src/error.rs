//! Error taxonomy for the half-knife tool.

use thiserror::Error;

use crate::mesh::FaceId;

/// Errors surfaced by the knife core.
///
/// User-input rejections abort before any mesh mutation. Anything the cut
/// committer cannot repair locally propagates as one of these and aborts the
/// commit; the mesh is left in whatever state the kernel's own operations
/// guarantee (rollback is the host undo system's job).
#[derive(Debug, Error)]
pub enum KnifeError {
    /// More vertices selected than a single knife gesture supports.
    #[error("too many vertices selected ({count}); the knife accepts at most {max}")]
    TooManySelected { count: usize, max: usize },

    /// Invoked without an editable mesh under the tool.
    #[error("no editable mesh target")]
    NoTarget,

    /// A ray cast was attempted against a BVH built from an older mesh
    /// revision. Callers must rebuild after every topology mutation.
    #[error("ray cast against a stale BVH (mesh revision {mesh}, tree revision {tree})")]
    StaleBvh { mesh: u64, tree: u64 },

    /// Closest-feature math produced non-finite values for this face.
    /// The face is left selected so the user can find it.
    #[error("degenerate face {face} encountered during closest-feature search")]
    DegenerateFace { face: FaceId },
}
