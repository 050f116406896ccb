//! Registry of live spawned instances
//!
//! [`AssetStorage`] maps every [`InstanceId`] to the render node and physics
//! body that make up the instance. It owns neither: the render scene owns the
//! node and the physics world owns the body. Once per simulation step
//! [`AssetStorage::update`] copies simulated poses into the render scene.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::physics::{BodyHandle, PhysicsWorld};
use crate::render::{NodeId, RenderScene};

/// Globally unique, monotonically increasing instance identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Raw value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance#{}", self.0)
    }
}

/// Shared instance id source, safe to use from several threads
#[derive(Debug, Clone)]
pub struct InstanceIdGenerator {
    next: Arc<AtomicU64>,
}

impl Default for InstanceIdGenerator {
    fn default() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl InstanceIdGenerator {
    /// Generator starting at 1
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next id
    pub fn next_id(&self) -> InstanceId {
        InstanceId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handles making up one live instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedInstance {
    /// Root node in the render scene
    pub mesh: NodeId,
    /// Body in the physics world, `None` for visual-only instances
    pub body: Option<BodyHandle>,
}

/// Identity mapping of live instances
#[derive(Debug, Default)]
pub struct AssetStorage {
    ids: InstanceIdGenerator,
    instances: BTreeMap<InstanceId, TrackedInstance>,
}

impl AssetStorage {
    /// Empty storage with its own id generator
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty storage drawing ids from a shared generator
    pub fn with_generator(ids: InstanceIdGenerator) -> Self {
        Self {
            ids,
            instances: BTreeMap::new(),
        }
    }

    /// Generator used by [`Self::add`]
    pub fn id_generator(&self) -> &InstanceIdGenerator {
        &self.ids
    }

    /// Start tracking a node/body pair
    pub fn add(&mut self, mesh: NodeId, body: Option<BodyHandle>) -> InstanceId {
        let id = self.ids.next_id();
        self.instances.insert(id, TrackedInstance { mesh, body });
        log::trace!("Tracking {} (physics: {})", id, body.is_some());
        id
    }

    /// Handles of an instance
    pub fn get(&self, id: InstanceId) -> Option<&TrackedInstance> {
        self.instances.get(&id)
    }

    /// Stop tracking an instance, returning its handles
    pub fn remove(&mut self, id: InstanceId) -> Option<TrackedInstance> {
        self.instances.remove(&id)
    }

    /// Whether an instance is tracked
    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.contains_key(&id)
    }

    /// Number of tracked instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Tracked instances in id order
    pub fn iter(&self) -> impl Iterator<Item = (InstanceId, &TrackedInstance)> {
        self.instances.iter().map(|(id, tracked)| (*id, tracked))
    }

    /// Stop tracking everything, returning what was tracked
    pub fn drain(&mut self) -> Vec<(InstanceId, TrackedInstance)> {
        std::mem::take(&mut self.instances).into_iter().collect()
    }

    /// Copy every body pose into its render node
    ///
    /// Each tracked pair is visited exactly once. Returns the number of nodes
    /// updated; visual-only instances and stale handles are skipped.
    pub fn update(&self, scene: &mut dyn RenderScene, physics: &dyn PhysicsWorld) -> usize {
        let mut synced = 0;
        for (id, tracked) in &self.instances {
            let Some(body) = tracked.body else { continue };
            let Some((position, rotation)) = physics.body_pose(body) else {
                log::trace!("{} has no live body", id);
                continue;
            };
            if scene.set_pose(tracked.mesh, position, rotation) {
                synced += 1;
            }
        }
        synced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Quat, Vec3};
    use crate::physics::{RigidBodyDesc, SimplePhysicsWorld};
    use crate::render::{HeadlessScene, SceneNode};
    use approx::assert_relative_eq;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_ids_are_monotonic() {
        let mut storage = AssetStorage::new();
        let mut scene = HeadlessScene::new();
        let a = storage.add(scene.add_node(SceneNode::group("a")), None);
        let b = storage.add(scene.add_node(SceneNode::group("b")), None);
        assert!(b > a);
        assert_eq!(a.get(), 1);

        storage.remove(a);
        let c = storage.add(scene.add_node(SceneNode::group("c")), None);
        assert!(c > b);
        assert_eq!(storage.len(), 2);
    }

    #[test]
    fn test_concurrent_generation_never_duplicates() {
        let ids = InstanceIdGenerator::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = ids.clone();
                thread::spawn(move || (0..1000).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate {id}");
            }
        }
        assert_eq!(seen.len(), 8000);
    }

    #[test]
    fn test_update_copies_poses() {
        let mut storage = AssetStorage::new();
        let mut scene = HeadlessScene::new();
        let mut physics = SimplePhysicsWorld::default();

        let body = physics.create_rigid_body(&RigidBodyDesc::dynamic(Vec3::new(0.0, 10.0, 0.0), Quat::identity(), 1.0));
        let moving = storage.add(scene.add_node(SceneNode::group("ball")), Some(body));
        let still = storage.add(scene.add_node(SceneNode::group("decal")), None);

        physics.step(0.1);
        assert_eq!(storage.update(&mut scene, &physics), 1);

        let (position, _) = physics.body_pose(body).unwrap();
        let node = storage.get(moving).unwrap().mesh;
        assert_relative_eq!(scene.transform(node).unwrap().position, position);
        assert!(position.y < 10.0);

        let decal = storage.get(still).unwrap().mesh;
        assert_eq!(scene.transform(decal).unwrap().position, Vec3::zeros());
    }

    #[test]
    fn test_update_skips_removed_bodies() {
        let mut storage = AssetStorage::new();
        let mut scene = HeadlessScene::new();
        let mut physics = SimplePhysicsWorld::default();
        let body = physics.create_rigid_body(&RigidBodyDesc::fixed(Vec3::zeros(), Quat::identity()));
        storage.add(scene.add_node(SceneNode::group("x")), Some(body));
        physics.remove_rigid_body(body);
        assert_eq!(storage.update(&mut scene, &physics), 0);
    }

    #[test]
    fn test_drain_empties_storage() {
        let mut storage = AssetStorage::new();
        let mut scene = HeadlessScene::new();
        storage.add(scene.add_node(SceneNode::group("a")), None);
        storage.add(scene.add_node(SceneNode::group("b")), None);
        let drained = storage.drain();
        assert_eq!(drained.len(), 2);
        assert!(storage.is_empty());
        assert!(storage.drain().is_empty());
    }
}
