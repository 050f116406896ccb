//! End-to-end session flow: manifest on disk, spawning, simulation and disposal

use asset_engine::analysis::ColliderKind;
use asset_engine::assets::{ImageData, SpawnWarning, TextureSource};
use asset_engine::manifest::ValidationErrorKind;
use asset_engine::physics::{BodyType, ColliderShape};
use asset_engine::prelude::*;
use approx::assert_relative_eq;
use serde_json::json;
use std::fmt::Write as _;
use std::path::Path;

fn session_with_physics() -> AssetSession {
    AssetSession::new(SessionConfig::default(), Box::new(HeadlessScene::new()), Box::new(ObjModelLoader::new()))
        .unwrap()
        .with_physics(Box::new(SimplePhysicsWorld::default()))
}

/// Axis-aligned cube as an OBJ object; `first` is the number of vertices already written
fn obj_cube(out: &mut String, name: &str, half: [f32; 3], first: usize) {
    writeln!(out, "o {name}").unwrap();
    for z in [-1.0, 1.0] {
        for y in [-1.0, 1.0] {
            for x in [-1.0, 1.0] {
                writeln!(out, "v {} {} {}", x * half[0], y * half[1], z * half[2]).unwrap();
            }
        }
    }
    let faces = [
        [1, 2, 4], [1, 4, 3], [5, 7, 8], [5, 8, 6], [1, 5, 6], [1, 6, 2],
        [3, 4, 8], [3, 8, 7], [1, 3, 7], [1, 7, 5], [2, 6, 8], [2, 8, 4],
    ];
    for [a, b, c] in faces {
        writeln!(out, "f {} {} {}", a + first, b + first, c + first).unwrap();
    }
}

fn write_manifest(dir: &Path, document: &serde_json::Value) -> std::path::PathBuf {
    let path = dir.join("scene.json");
    std::fs::write(&path, serde_json::to_string_pretty(document).unwrap()).unwrap();
    path
}

#[test]
fn test_sphere_mesh_follows_body_after_step() {
    let mut session = session_with_physics();
    let request = SpawnRequest::new("sphere", Vec3::zeros())
        .with_option("radius", json!(1.0))
        .with_option("mass", json!(5.0));
    let instance = session.spawn(&request).unwrap();

    let body = instance.physics_body.unwrap();
    let snapshot = session.physics().unwrap().body_snapshot(body).unwrap();
    assert_eq!(snapshot.body_type, BodyType::Dynamic);
    assert_relative_eq!(snapshot.mass, 5.0);
    assert_eq!(snapshot.colliders, vec![ColliderShape::Ball { radius: 1.0 }]);

    assert_eq!(session.step(1.0 / 60.0), 1);
    let (translation, _) = session.physics().unwrap().body_pose(body).unwrap();
    let mesh_position = session.scene().transform(instance.mesh).unwrap().position;
    assert_relative_eq!(mesh_position, translation);
    assert!(translation.y < 0.0);
}

#[test]
fn test_manifest_from_disk_spawns_active_groups() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_manifest(
        dir.path(),
        &json!({
            "name": "yard",
            "custom_types": [
                { "name": "slab", "primitive": "box", "size": { "width": 10.0, "height": 1.0, "depth": 10.0 },
                  "physics": { "mass": 0.0 } }
            ],
            "asset_groups": [
                { "id": "ground", "name": "Ground", "assets": ["floor"], "toggle": "always" },
                { "id": "props", "name": "Props", "assets": ["ball", "crate"] },
                { "id": "later", "name": "Later", "assets": ["spare"], "active": false }
            ],
            "assets": {
                "floor": { "type": "slab", "position": { "x": 0.0, "y": -0.5, "z": 0.0 }, "group_id": "ground" },
                "ball": { "type": "sphere", "position": { "x": 0.0, "y": 4.0, "z": 0.0 }, "group_id": "props" },
                "crate": { "type": "box", "position": { "x": 2.0, "y": 1.0, "z": 0.0 }, "group_id": "props",
                           "config": { "mass": 2.0 }, "tags": ["crate"] },
                "spare": { "type": "capsule", "group_id": "later" }
            },
            "scene_data": {
                "environment": { "gravity": { "x": 0.0, "y": -20.0, "z": 0.0 } },
                "physics": { "substeps": 4 }
            }
        }),
    );

    let mut session = session_with_physics();
    let report = session.load_manifest(&path).unwrap();
    assert!(report.is_valid, "{:?}", report.errors);

    let reports = session.spawn_active_groups();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.is_complete()));
    assert_eq!(session.instance_count(), 3);
    assert!(session.instance_for_asset("spare").is_none());

    let floor = session.instance_for_asset("floor").unwrap();
    let floor_body = session.instance(floor).unwrap().physics_body.unwrap();
    let snapshot = session.physics().unwrap().body_snapshot(floor_body).unwrap();
    assert_eq!(snapshot.body_type, BodyType::Fixed);

    // Manifest gravity reached the world
    let ball = session.instance_for_asset("ball").unwrap();
    let ball_body = session.instance(ball).unwrap().physics_body.unwrap();
    session.step(0.1);
    let velocity = session.physics().unwrap().body_snapshot(ball_body).unwrap().linear_velocity;
    assert_relative_eq!(velocity.y, -2.0, epsilon = 1e-4);

    assert_eq!(session.manifest().asset_ids_with_tag("crate"), ["crate"]);
    session.dispose();
    assert_eq!(session.scene().node_count(), 0);
}

#[test]
fn test_missing_group_member_is_reported_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_manifest(
        dir.path(),
        &json!({
            "name": "broken",
            "asset_groups": [{ "id": "g1", "name": "G1", "assets": ["a1", "missing_one"] }],
            "assets": { "a1": { "type": "box" } }
        }),
    );

    let mut session = session_with_physics();
    let report = session.load_manifest(&path).unwrap();
    assert!(!report.is_valid);
    assert_eq!(report.errors.len(), 1);
    let error = &report.errors[0];
    assert_eq!(error.source_id, "g1");
    assert!(matches!(
        &error.kind,
        ValidationErrorKind::MissingReference { missing_id, .. } if missing_id == "missing_one"
    ));

    // The sound part of the group still spawns
    let group = session.spawn_group("g1").unwrap();
    assert_eq!(group.spawned.len(), 1);
    assert_eq!(group.failed.len(), 1);
}

#[test]
fn test_obj_model_collision_proxy_becomes_collider() {
    let dir = tempfile::tempdir().unwrap();
    let mut obj = String::new();
    obj_cube(&mut obj, "body", [1.0, 0.5, 2.0], 0);
    obj_cube(&mut obj, "col_body_box", [1.1, 0.6, 2.1], 8);
    std::fs::write(dir.path().join("cart.obj"), obj).unwrap();

    let mut session = session_with_physics().with_asset_root(dir.path());
    let mut cart = asset_engine::manifest::CustomType::new("cart").with_asset_path("cart.obj");
    cart.physics.mass = Some(50.0);
    session.manifest_mut().set_custom_type(cart);

    let instance = session.spawn(&SpawnRequest::new("cart", Vec3::new(0.0, 2.0, 0.0))).unwrap();
    let collision = instance.collision.clone().unwrap();
    assert!(collision.has_collision_meshes);
    assert_eq!(collision.collision_meshes[0].kind, ColliderKind::Box);
    assert_eq!(collision.total_meshes, 2);
    assert!(instance.rig.is_none());

    match &instance.colliders[..] {
        [ColliderShape::Cuboid { half_extents }] => {
            assert_relative_eq!(*half_extents, Vec3::new(1.1, 0.6, 2.1), epsilon = 1e-5);
        }
        other => panic!("unexpected colliders {other:?}"),
    }

    // Second spawn reuses the cached model and analysis
    session.spawn(&SpawnRequest::new("cart", Vec3::new(5.0, 2.0, 0.0))).unwrap();
    assert_eq!(session.handler().cached_models(), 1);
    assert_eq!(session.handler().collision_analyzer().cached_count(), 1);
}

#[test]
fn test_without_physics_world_instances_are_visual_only() {
    let mut session =
        AssetSession::new(SessionConfig::default(), Box::new(HeadlessScene::new()), Box::new(ObjModelLoader::new()))
            .unwrap();
    let instance = session.spawn(&SpawnRequest::new("box", Vec3::zeros())).unwrap();
    assert!(instance.physics_body.is_none());
    assert!(instance.warnings.contains(&SpawnWarning::NoPhysicsWorld));
    assert!(session.scene().contains(instance.mesh));
    assert_eq!(session.step(0.1), 0);
}

#[test]
fn test_atlas_through_session() {
    let mut session = session_with_physics();
    let textures = [
        TextureSource::new("stone", ImageData::solid_color(64, 64, [90, 90, 90, 255])),
        TextureSource::new("moss", ImageData::solid_color(32, 32, [20, 120, 20, 255])),
    ];
    let atlas = session.atlases_mut().create_atlas(&textures, "diffuse").unwrap();
    assert!(atlas.width().is_power_of_two());

    let moss = session.atlases().get_uvs("moss").unwrap();
    let [u, v] = session.atlases().remap_uv("moss", [0.5, 0.5]).unwrap();
    assert_relative_eq!(u, moss.x + moss.width * 0.5);
    assert_relative_eq!(v, moss.y + moss.height * 0.5);

    session.dispose();
    assert!(session.atlases().get_uvs("moss").is_none());
}

#[test]
fn test_bundled_demo_manifest_loads_cleanly() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../scene_runner/scenes/demo.json");
    let mut session = session_with_physics();
    let report = session.load_manifest(&path).unwrap();
    assert!(report.is_valid, "{:?}", report.errors);
    assert_eq!(session.manifest().manifest().manifest_version, asset_engine::manifest::MANIFEST_VERSION);

    let reports = session.spawn_active_groups();
    assert!(reports.iter().all(|r| r.is_complete()));
    assert_eq!(session.instance_count(), 5);
    assert!(session.instance_for_asset("lantern").is_none());
}
