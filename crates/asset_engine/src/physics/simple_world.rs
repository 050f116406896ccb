//! Minimal rigid body world
//!
//! Integrates gravity with semi-implicit Euler and puts resting bodies to
//! sleep. There is no contact resolution: colliders are stored and validated
//! so spawn code can be exercised without a full solver.

use slotmap::SlotMap;

use super::world::{
    BodyHandle, BodySnapshot, BodyType, ColliderDesc, ColliderHandle, PhysicsError,
    PhysicsSettings, PhysicsWorld, RigidBodyDesc, SleepPolicy,
};
use crate::foundation::math::{Quat, Vec3};

const REST_SPEED: f32 = 1e-3;

struct Body {
    body_type: BodyType,
    mass: f32,
    gravity_scale: f32,
    sleep: SleepPolicy,
    translation: Vec3,
    rotation: Quat,
    linear_velocity: Vec3,
    rest_time: f32,
    sleeping: bool,
    colliders: Vec<ColliderHandle>,
}

struct Collider {
    desc: ColliderDesc,
    body: BodyHandle,
}

/// In-process physics world without contacts
pub struct SimplePhysicsWorld {
    settings: PhysicsSettings,
    bodies: SlotMap<BodyHandle, Body>,
    colliders: SlotMap<ColliderHandle, Collider>,
}

impl Default for SimplePhysicsWorld {
    fn default() -> Self {
        Self::new(PhysicsSettings::default())
    }
}

impl SimplePhysicsWorld {
    /// Create a world with the given settings
    pub fn new(settings: PhysicsSettings) -> Self {
        Self {
            settings,
            bodies: SlotMap::with_key(),
            colliders: SlotMap::with_key(),
        }
    }

    /// Current world settings
    pub fn settings(&self) -> &PhysicsSettings {
        &self.settings
    }

    /// Number of live colliders
    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    /// Overwrite the velocity of a body and wake it
    pub fn set_linear_velocity(&mut self, body: BodyHandle, velocity: Vec3) -> Result<(), PhysicsError> {
        let body_ref = self.bodies.get_mut(body).ok_or(PhysicsError::UnknownBody(body))?;
        body_ref.linear_velocity = velocity;
        body_ref.sleeping = false;
        body_ref.rest_time = 0.0;
        Ok(())
    }

    fn integrate(&mut self, dt: f32) {
        let gravity = self.settings.gravity;
        for body in self.bodies.values_mut() {
            if body.body_type == BodyType::Fixed || body.sleeping {
                continue;
            }
            body.linear_velocity += gravity * body.gravity_scale * dt;
            body.translation += body.linear_velocity * dt;

            if body.sleep.can_sleep && body.linear_velocity.norm() < REST_SPEED {
                body.rest_time += dt;
                if body.rest_time >= body.sleep.sleep_timer {
                    body.sleeping = true;
                    body.linear_velocity = Vec3::zeros();
                }
            } else {
                body.rest_time = 0.0;
            }
        }
    }
}

impl PhysicsWorld for SimplePhysicsWorld {
    fn create_rigid_body(&mut self, desc: &RigidBodyDesc) -> BodyHandle {
        let handle = self.bodies.insert(Body {
            body_type: desc.body_type,
            mass: desc.mass,
            gravity_scale: desc.gravity_scale,
            sleep: desc.sleep,
            translation: desc.translation,
            rotation: desc.rotation,
            linear_velocity: Vec3::zeros(),
            rest_time: 0.0,
            sleeping: false,
            colliders: Vec::new(),
        });
        log::trace!("Physics: created {:?} body {:?}", desc.body_type, handle);
        handle
    }

    fn create_collider(
        &mut self,
        desc: &ColliderDesc,
        body: BodyHandle,
    ) -> Result<ColliderHandle, PhysicsError> {
        if !self.bodies.contains_key(body) {
            return Err(PhysicsError::UnknownBody(body));
        }
        desc.shape.validate()?;
        let handle = self.colliders.insert(Collider { desc: desc.clone(), body });
        if let Some(body_ref) = self.bodies.get_mut(body) {
            body_ref.colliders.push(handle);
        }
        Ok(handle)
    }

    fn remove_rigid_body(&mut self, body: BodyHandle) -> bool {
        match self.bodies.remove(body) {
            Some(removed) => {
                for collider in removed.colliders {
                    self.colliders.remove(collider);
                }
                true
            }
            None => false,
        }
    }

    fn contains_body(&self, body: BodyHandle) -> bool {
        self.bodies.contains_key(body)
    }

    fn body_pose(&self, body: BodyHandle) -> Option<(Vec3, Quat)> {
        self.bodies.get(body).map(|b| (b.translation, b.rotation))
    }

    fn body_snapshot(&self, body: BodyHandle) -> Option<BodySnapshot> {
        let b = self.bodies.get(body)?;
        let colliders = b
            .colliders
            .iter()
            .filter_map(|handle| self.colliders.get(*handle))
            .filter(|collider| collider.body == body)
            .map(|collider| collider.desc.shape.clone())
            .collect();
        Some(BodySnapshot {
            body_type: b.body_type,
            mass: b.mass,
            translation: b.translation,
            rotation: b.rotation,
            linear_velocity: b.linear_velocity,
            sleeping: b.sleeping,
            colliders,
        })
    }

    fn configure(&mut self, settings: &PhysicsSettings) {
        log::debug!(
            "Physics: gravity {:?}, {} substeps, enabled={}",
            settings.gravity, settings.substeps, settings.enabled
        );
        self.settings = *settings;
        for body in self.bodies.values_mut() {
            body.sleeping = false;
            body.rest_time = 0.0;
        }
    }

    fn set_gravity(&mut self, gravity: Vec3) {
        let settings = PhysicsSettings { gravity, ..self.settings };
        self.configure(&settings);
    }

    fn step(&mut self, dt: f32) {
        if !self.settings.enabled || !dt.is_finite() || dt <= 0.0 {
            return;
        }
        let substeps = self.settings.substeps.max(1);
        let sub_dt = dt / substeps as f32;
        for _ in 0..substeps {
            self.integrate(sub_dt);
        }
    }

    fn body_count(&self) -> usize {
        self.bodies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::world::ColliderShape;
    use approx::assert_relative_eq;

    fn ball() -> ColliderDesc {
        ColliderDesc::new(ColliderShape::Ball { radius: 0.5 })
    }

    #[test]
    fn test_dynamic_body_falls() {
        let mut world = SimplePhysicsWorld::default();
        let body = world.create_rigid_body(&RigidBodyDesc::dynamic(Vec3::new(0.0, 10.0, 0.0), Quat::identity(), 1.0));
        world.step(1.0 / 60.0);
        let (position, _) = world.body_pose(body).unwrap();
        assert!(position.y < 10.0);
    }

    #[test]
    fn test_fixed_body_stays_put() {
        let mut world = SimplePhysicsWorld::default();
        let body = world.create_rigid_body(&RigidBodyDesc::fixed(Vec3::new(0.0, 1.0, 0.0), Quat::identity()));
        for _ in 0..10 {
            world.step(0.1);
        }
        assert_relative_eq!(world.body_pose(body).unwrap().0, Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_disabled_world_does_not_step() {
        let mut world = SimplePhysicsWorld::new(PhysicsSettings { enabled: false, ..Default::default() });
        let body = world.create_rigid_body(&RigidBodyDesc::dynamic(Vec3::zeros(), Quat::identity(), 1.0));
        world.step(1.0);
        assert_relative_eq!(world.body_pose(body).unwrap().0, Vec3::zeros());
    }

    #[test]
    fn test_zero_gravity_body_sleeps() {
        let mut world = SimplePhysicsWorld::new(PhysicsSettings { gravity: Vec3::zeros(), ..Default::default() });
        let body = world.create_rigid_body(&RigidBodyDesc::dynamic(Vec3::zeros(), Quat::identity(), 1.0));
        for _ in 0..12 {
            world.step(0.1);
        }
        assert!(world.body_snapshot(body).unwrap().sleeping);
    }

    #[test]
    fn test_collider_lifecycle() {
        let mut world = SimplePhysicsWorld::default();
        let body = world.create_rigid_body(&RigidBodyDesc::dynamic(Vec3::zeros(), Quat::identity(), 1.0));
        world.create_collider(&ball(), body).unwrap();
        assert_eq!(world.collider_count(), 1);
        assert_eq!(world.body_snapshot(body).unwrap().colliders.len(), 1);

        assert!(world.remove_rigid_body(body));
        assert_eq!(world.collider_count(), 0);
        assert!(!world.remove_rigid_body(body));
        assert_eq!(world.create_collider(&ball(), body), Err(PhysicsError::UnknownBody(body)));
    }

    #[test]
    fn test_invalid_shape_rejected() {
        let mut world = SimplePhysicsWorld::default();
        let body = world.create_rigid_body(&RigidBodyDesc::fixed(Vec3::zeros(), Quat::identity()));
        let bad = ColliderDesc::new(ColliderShape::Ball { radius: -1.0 });
        assert!(matches!(world.create_collider(&bad, body), Err(PhysicsError::InvalidShape(_))));
        assert_eq!(world.collider_count(), 0);
    }

    #[test]
    fn test_substeps_match_single_step_distance() {
        let settings = PhysicsSettings { substeps: 4, ..Default::default() };
        let mut world = SimplePhysicsWorld::new(settings);
        let body = world.create_rigid_body(&RigidBodyDesc::dynamic(Vec3::zeros(), Quat::identity(), 1.0));
        world.set_linear_velocity(body, Vec3::new(1.0, 0.0, 0.0)).unwrap();
        world.step(1.0);
        assert_relative_eq!(world.body_pose(body).unwrap().0.x, 1.0, epsilon = 1e-5);
    }
}
