//! # Bevy Half Knife
//!
//! An interactive mesh-cutting tool plugin for Bevy: snap to vertices,
//! edges and faces in screen space and cut straight through the geometry
//! with a single gesture.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bevy::prelude::*;
//! use bevy_half_knife::KnifePlugin;
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(DefaultPlugins)
//!         .add_plugins(KnifePlugin)
//!         .run();
//! }
//! ```
//!
//! Mark the editable mesh entity with [`KnifeTarget`], then press `K` over
//! it to start cutting:
//!
//! - `K` invoke the knife (from the current selection, or from whatever is
//!   under the cursor)
//! - `LMB` confirm the cut, `RMB`/`Esc` cancel
//! - `Ctrl` snap to edge midpoints / face centers, `H` altitude mode,
//!   `C` angle constraint, `Z` cut through backfaces, hold `Shift` to
//!   suppress snapping

pub mod error;
pub mod knife;
pub mod mesh;
pub mod preferences;

// Re-export the plugin and the types hosts touch directly.
pub use error::KnifeError;
pub use knife::session::{CutSession, SessionAction, SessionEvent};
pub use knife::snap::{SnapMode, SnapResult};
pub use knife::{KnifePlugin, KnifeTarget, KnifeTool, MAX_START_VERTS};
pub use mesh::{FaceId, MeshEdge, PolyMesh, VertexId};
pub use preferences::KnifePreferences;
