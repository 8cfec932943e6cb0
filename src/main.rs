//! Standalone demo: a subdivided plane to carve up with the knife.
//!
//! For using the knife as a library in your own project, add `KnifePlugin`
//! and mark the editable mesh entity with `KnifeTarget`.

use bevy::prelude::*;
use bevy_half_knife::{KnifePlugin, KnifeTarget};

fn main() {
    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Bevy Half Knife".to_string(),
                ..default()
            }),
            ..default()
        }))
        .add_plugins(KnifePlugin)
        .add_systems(Startup, setup)
        .run();
}

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.spawn((
        Name::new("Knife Target"),
        KnifeTarget,
        Mesh3d(meshes.add(Plane3d::default().mesh().size(4.0, 4.0).subdivisions(3))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: Color::srgb(0.55, 0.6, 0.65),
            cull_mode: None,
            ..default()
        })),
    ));

    commands.spawn((
        DirectionalLight {
            illuminance: 8_000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(4.0, 8.0, 4.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(0.0, 6.0, 6.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}
