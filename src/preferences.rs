//! Persistent knife preferences.
//!
//! Loaded once when the plugin builds and handed to the snapping and commit
//! code explicitly. The preferences *editor* is the host application's job;
//! this crate only owns the data and its on-disk format.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// RGBA preview colors, straight f32 quadruples so the ron file stays flat.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct KnifeColors {
    /// The rubber-band line from the cut start to the cursor.
    pub cutting_edge: [f32; 4],
    /// Loose vertex markers along the preview.
    pub vertex: [f32; 4],
    /// Marker when the cursor is snapped to an existing vertex.
    pub snapped_vertex: [f32; 4],
    /// Edge highlight when the cursor is snapped onto an edge.
    pub snapped_edge: [f32; 4],
    /// Hovered face tint.
    pub face: [f32; 4],
    /// Angle-constraint guide lines.
    pub constraint_axis: [f32; 4],
    /// Face framing the active constraint axis.
    pub active_constraint_face: [f32; 4],
}

impl Default for KnifeColors {
    fn default() -> Self {
        Self {
            cutting_edge: [0.95, 0.95, 0.95, 1.0],
            vertex: [1.0, 0.6, 0.1, 1.0],
            snapped_vertex: [0.2, 1.0, 0.3, 1.0],
            snapped_edge: [0.2, 0.8, 1.0, 1.0],
            face: [0.3, 0.5, 0.9, 0.25],
            constraint_axis: [0.9, 0.3, 0.9, 0.8],
            active_constraint_face: [0.9, 0.6, 0.2, 0.3],
        }
    }
}

impl KnifeColors {
    pub fn color(rgba: [f32; 4]) -> Color {
        Color::srgba(rgba[0], rgba[1], rgba[2], rgba[3])
    }
}

/// Knife preferences that persist to disk.
#[derive(Resource, Serialize, Deserialize, Clone, Debug)]
pub struct KnifePreferences {
    /// Vertex snap radius in pixels.
    pub snap_vertex_distance: f32,
    /// Edge snap radius in pixels.
    pub snap_edge_distance: f32,
    /// Repair edges that pass through (but don't end at) a cut vertex.
    #[serde(default = "default_true")]
    pub use_edge_autofix: bool,
    /// World-space tolerance for the edge autofix and the post-cut weld.
    #[serde(default = "default_weld_distance")]
    pub weld_distance: f32,
    /// Invoke-and-commit in one step when a snap target is already under
    /// the cursor.
    #[serde(default)]
    pub auto_cut: bool,
    #[serde(default)]
    pub colors: KnifeColors,
}

fn default_true() -> bool {
    true
}

fn default_weld_distance() -> f32 {
    1e-4
}

impl Default for KnifePreferences {
    fn default() -> Self {
        Self {
            snap_vertex_distance: 20.0,
            snap_edge_distance: 15.0,
            use_edge_autofix: true,
            weld_distance: 1e-4,
            auto_cut: false,
            colors: KnifeColors::default(),
        }
    }
}

impl KnifePreferences {
    fn file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("bevy_half_knife");
            p.push("preferences.ron");
            p
        })
    }

    /// Load preferences from disk, or return defaults if not found.
    pub fn load() -> Self {
        let Some(path) = Self::file_path() else {
            return Self::default();
        };

        match fs::read_to_string(&path) {
            Ok(content) => ron::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save preferences to disk.
    pub fn save(&self) {
        let Some(path) = Self::file_path() else {
            error!("Could not determine config directory");
            return;
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory: {}", e);
                return;
            }
        }

        match ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default()) {
            Ok(content) => {
                if let Err(e) = fs::write(&path, content) {
                    error!("Failed to save preferences: {}", e);
                } else {
                    info!("Preferences saved to: {:?}", path);
                }
            }
            Err(e) => {
                error!("Failed to serialize preferences: {}", e);
            }
        }
    }
}
