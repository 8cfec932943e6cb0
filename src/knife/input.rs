//! Raw input handling for the knife.
//!
//! Translates keyboard/mouse state into [`SessionEvent`]s and performs the
//! actions the session answers with. Default bindings (hosts that need
//! rebindable keys drive [`KnifeTool`] themselves):
//!
//! - `K` invoke, `LMB` confirm, `RMB`/`Esc` cancel
//! - `Ctrl` snap to center (`Alt+Ctrl` alternate), `H` altitude,
//!   `C` angle constraint, `Z` cut through, hold `Shift` to suppress snapping

use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use crate::knife::geometry::ViewContext;
use crate::knife::session::{SessionAction, SessionEvent};
use crate::knife::{KnifeTarget, KnifeTool};
use crate::mesh::{MeshBvh, PolyMesh};
use crate::preferences::KnifePreferences;

pub fn knife_input(
    mut tool: ResMut<KnifeTool>,
    prefs: Res<KnifePreferences>,
    keys: Res<ButtonInput<KeyCode>>,
    buttons: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    cameras: Query<(&Camera, &GlobalTransform), With<Camera3d>>,
    targets: Query<(Entity, &Mesh3d, &GlobalTransform), With<KnifeTarget>>,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    let Ok(window) = windows.single() else {
        return;
    };
    let Some(cursor) = window.cursor_position() else {
        return;
    };
    let Ok((camera, camera_transform)) = cameras.single() else {
        return;
    };
    let Ok((entity, mesh3d, target_transform)) = targets.single() else {
        return;
    };
    let Some(view) = ViewContext::from_camera(camera, camera_transform, target_transform) else {
        return;
    };

    // Adopt the target into the editing kernel on first sight.
    if tool.mesh.is_none() {
        let Some(mesh) = meshes.get(&mesh3d.0) else {
            return;
        };
        let Some(poly) = PolyMesh::from_mesh(mesh) else {
            warn!("knife: target mesh is not an indexed triangle list");
            return;
        };
        tool.target = Some(entity);
        tool.bvh = Some(MeshBvh::build(&poly));
        tool.mesh = Some(poly);
    }

    if tool.session.is_none() {
        if keys.just_pressed(KeyCode::KeyK) {
            match tool.begin(&view, cursor, &prefs) {
                Ok(true) => write_back(&tool, &mut meshes, mesh3d),
                Ok(false) => {}
                Err(e) => error!("knife: {e}"),
            }
        }
        return;
    }

    let alt = keys.pressed(KeyCode::AltLeft) || keys.pressed(KeyCode::AltRight);
    let shift = keys.pressed(KeyCode::ShiftLeft) || keys.pressed(KeyCode::ShiftRight);

    let mut events = Vec::new();
    if keys.just_pressed(KeyCode::Escape) || buttons.just_pressed(MouseButton::Right) {
        events.push(SessionEvent::Cancel);
    }
    if buttons.just_pressed(MouseButton::Left) {
        events.push(SessionEvent::Confirm);
    }
    if keys.just_pressed(KeyCode::ControlLeft) || keys.just_pressed(KeyCode::ControlRight) {
        events.push(SessionEvent::ToggleSnapCenter { alternate: alt });
    }
    if keys.just_pressed(KeyCode::KeyH) {
        events.push(SessionEvent::ToggleAltitude);
    }
    if keys.just_pressed(KeyCode::KeyC) {
        events.push(SessionEvent::ToggleAngleConstraint);
    }
    if keys.just_pressed(KeyCode::KeyZ) {
        events.push(SessionEvent::ToggleCutThrough);
    }
    events.push(SessionEvent::SetSnapping(!shift));
    events.push(SessionEvent::MouseMoved);

    let mut toggled = false;
    for event in events {
        let Some(action) = tool.session.as_mut().map(|s| s.handle_event(event)) else {
            return;
        };
        match action {
            SessionAction::Ignore | SessionAction::PassThrough => {}
            SessionAction::Redraw => {
                toggled |= event != SessionEvent::MouseMoved;
            }
            SessionAction::UpdateAxes => {
                toggled = true;
                tool.rebuild_axes(&view);
            }
            SessionAction::RepositionStart { to } => {
                tool.reposition_start(to, &view);
                write_back(&tool, &mut meshes, mesh3d);
            }
            SessionAction::Commit => {
                match tool.commit(&view, &prefs) {
                    Ok(true) => write_back(&tool, &mut meshes, mesh3d),
                    Ok(false) => {}
                    Err(e) => {
                        // Commit repairs what it can; past this the mesh is
                        // whatever the kernel left, so still flush it.
                        error!("knife: cut failed: {e}");
                        write_back(&tool, &mut meshes, mesh3d);
                    }
                }
                return;
            }
            SessionAction::Cancel => {
                if tool.cancel() {
                    write_back(&tool, &mut meshes, mesh3d);
                }
                info!("knife: cancelled");
                return;
            }
        }
    }

    if toggled {
        if let Some(session) = &tool.session {
            info!("knife: {}", session.helper_text());
        }
    }

    if let Err(e) = tool.refresh(&view, cursor, &prefs) {
        error!("knife: {e}");
    }
}

fn write_back(tool: &KnifeTool, meshes: &mut Assets<Mesh>, mesh3d: &Mesh3d) {
    let Some(poly) = &tool.mesh else {
        return;
    };
    if let Some(mesh) = meshes.get_mut(&mesh3d.0) {
        *mesh = poly.to_mesh();
    }
}
