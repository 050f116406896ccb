//! Asset session
//!
//! [`AssetSession`] owns every asset component for one loaded scene: the
//! manifest, the spawner with its analyzers and model cache, the instance
//! registry, the texture atlases, and the render scene and physics world the
//! instances live in.
//!
//! The frame order is fixed: [`AssetSession::step`] advances physics and then
//! copies body poses into the render scene. Rendering happens afterwards,
//! outside the session.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

use crate::assets::{
    AssetHandler, AssetStorage, InstanceId, ModelLoader, SpawnError, SpawnRequest, SpawnedInstance,
    TextureAtlasManager,
};
use crate::core::config::{ConfigError, SessionConfig};
use crate::manifest::{ManifestError, ManifestManager, TogglePolicy, ValidationReport};
use crate::physics::{PhysicsSettings, PhysicsWorld};
use crate::render::RenderScene;

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Manifest lookup or persistence failed
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Spawning an asset failed
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// Session configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Outcome of spawning a group
///
/// Each asset is spawned independently; failures are collected rather than
/// aborting the batch.
#[derive(Debug, Default)]
pub struct GroupSpawnReport {
    /// Group that was spawned
    pub group_id: String,
    /// Asset ids and the instances created for them
    pub spawned: Vec<(String, InstanceId)>,
    /// Asset ids that could not be spawned
    pub failed: Vec<(String, SessionError)>,
}

impl GroupSpawnReport {
    /// Whether every asset was spawned
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Owner of every asset component of a scene
pub struct AssetSession {
    config: SessionConfig,
    manifest: ManifestManager,
    handler: AssetHandler,
    storage: AssetStorage,
    atlases: TextureAtlasManager,
    scene: Box<dyn RenderScene>,
    physics: Option<Box<dyn PhysicsWorld>>,
    instances: BTreeMap<InstanceId, SpawnedInstance>,
    /// Manifest asset id to its live instance
    by_asset: BTreeMap<String, InstanceId>,
}

impl AssetSession {
    /// Create a session around a render scene and model loader
    pub fn new(
        config: SessionConfig,
        scene: Box<dyn RenderScene>,
        loader: Box<dyn ModelLoader>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        log::info!("Initializing asset session...");
        let handler = AssetHandler::new(config.spawn.clone(), &config.analysis, loader);
        Ok(Self {
            manifest: ManifestManager::new(config.manifest.clone()),
            atlases: TextureAtlasManager::new(config.atlas),
            handler,
            storage: AssetStorage::new(),
            scene,
            physics: None,
            instances: BTreeMap::new(),
            by_asset: BTreeMap::new(),
            config,
        })
    }

    /// Attach a physics world
    pub fn with_physics(mut self, physics: Box<dyn PhysicsWorld>) -> Self {
        self.physics = Some(physics);
        self
    }

    /// Resolve model paths against a directory
    pub fn with_asset_root(mut self, root: impl Into<std::path::PathBuf>) -> Self {
        self.handler.set_asset_root(root);
        self
    }

    /// Load a manifest, apply its environment and return its validation report
    ///
    /// Validation errors are reported, not raised; spawning still works for the
    /// assets that are sound.
    pub fn load_manifest(&mut self, path: impl AsRef<Path>) -> Result<ValidationReport, SessionError> {
        self.manifest.load_from_path(path)?;
        let report = self.manifest.validate();
        self.apply_environment();
        Ok(report)
    }

    /// Session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Manifest manager
    pub fn manifest(&self) -> &ManifestManager {
        &self.manifest
    }

    /// Mutable manifest manager
    pub fn manifest_mut(&mut self) -> &mut ManifestManager {
        &mut self.manifest
    }

    /// Spawner
    pub fn handler(&self) -> &AssetHandler {
        &self.handler
    }

    /// Instance registry
    pub fn storage(&self) -> &AssetStorage {
        &self.storage
    }

    /// Texture atlases
    pub fn atlases(&self) -> &TextureAtlasManager {
        &self.atlases
    }

    /// Mutable texture atlases
    pub fn atlases_mut(&mut self) -> &mut TextureAtlasManager {
        &mut self.atlases
    }

    /// Render scene
    pub fn scene(&self) -> &dyn RenderScene {
        self.scene.as_ref()
    }

    /// Physics world, if attached
    pub fn physics(&self) -> Option<&dyn PhysicsWorld> {
        self.physics.as_deref()
    }

    /// Record of a live instance
    pub fn instance(&self, id: InstanceId) -> Option<&SpawnedInstance> {
        self.instances.get(&id)
    }

    /// Live instance created for a manifest asset
    pub fn instance_for_asset(&self, asset_id: &str) -> Option<InstanceId> {
        self.by_asset.get(asset_id).copied()
    }

    /// Number of live instances
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Spawn an instance that is not tied to a manifest asset
    pub fn spawn(&mut self, request: &SpawnRequest) -> Result<SpawnedInstance, SessionError> {
        let physics = self.physics.as_mut().map(|p| &mut **p as &mut dyn PhysicsWorld);
        let instance = self.handler.spawn(
            request,
            &self.manifest.manifest().custom_types,
            self.scene.as_mut(),
            physics,
            &mut self.storage,
        )?;
        self.instances.insert(instance.instance_id, instance.clone());
        Ok(instance)
    }

    /// Spawn a manifest asset; an asset that is already live is not spawned twice
    pub fn spawn_asset(&mut self, asset_id: &str) -> Result<InstanceId, SessionError> {
        if let Some(id) = self.instance_for_asset(asset_id) {
            log::debug!("Asset '{}' already live as {}", asset_id, id);
            return Ok(id);
        }
        let entry = self
            .manifest
            .asset(asset_id)
            .ok_or_else(|| ManifestError::UnknownAsset(asset_id.to_string()))?;
        let request = SpawnRequest::from_entry(entry);
        let instance = self.spawn(&request)?;
        self.by_asset.insert(asset_id.to_string(), instance.instance_id);
        Ok(instance.instance_id)
    }

    /// Spawn every asset of a group
    pub fn spawn_group(&mut self, group_id: &str) -> Result<GroupSpawnReport, SessionError> {
        let assets = self
            .manifest
            .group(group_id)
            .ok_or_else(|| ManifestError::UnknownGroup(group_id.to_string()))?
            .assets
            .clone();

        let mut report = GroupSpawnReport {
            group_id: group_id.to_string(),
            ..GroupSpawnReport::default()
        };
        for asset_id in assets {
            match self.spawn_asset(&asset_id) {
                Ok(id) => report.spawned.push((asset_id, id)),
                Err(e) => {
                    log::warn!("Group '{}': failed to spawn '{}': {}", group_id, asset_id, e);
                    report.failed.push((asset_id, e));
                }
            }
        }
        log::info!(
            "Spawned group '{}': {} ok, {} failed",
            group_id,
            report.spawned.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Spawn every group marked active in the manifest
    pub fn spawn_active_groups(&mut self) -> Vec<GroupSpawnReport> {
        let active: Vec<String> = self
            .manifest
            .manifest()
            .asset_groups
            .iter()
            .filter(|g| g.active)
            .map(|g| g.id.clone())
            .collect();
        active.iter().filter_map(|id| self.spawn_group(id).ok()).collect()
    }

    /// Switch a group on or off according to its toggle policy
    ///
    /// Returns whether the group's state changed. Deactivating an
    /// [`TogglePolicy::Always`] group is refused. Activating an
    /// [`TogglePolicy::Exclusive`] group deactivates the other exclusive groups.
    pub fn set_group_active(&mut self, group_id: &str, active: bool) -> Result<bool, SessionError> {
        let group = self
            .manifest
            .group(group_id)
            .ok_or_else(|| ManifestError::UnknownGroup(group_id.to_string()))?;
        let policy = group.toggle;
        if policy == TogglePolicy::Always && !active {
            log::warn!("Group '{}' is always active, ignoring deactivation", group_id);
            return Ok(false);
        }
        let was_active = group.active;

        if active && policy == TogglePolicy::Exclusive {
            let rivals: Vec<String> = self
                .manifest
                .manifest()
                .asset_groups
                .iter()
                .filter(|g| g.id != group_id && g.toggle == TogglePolicy::Exclusive && g.active)
                .map(|g| g.id.clone())
                .collect();
            for rival in rivals {
                self.deactivate(&rival)?;
            }
        }

        if active {
            if let Some(group) = self.manifest.group_mut(group_id) {
                group.active = true;
            }
            self.spawn_group(group_id)?;
        } else {
            self.deactivate(group_id)?;
        }
        Ok(was_active != active)
    }

    fn deactivate(&mut self, group_id: &str) -> Result<(), SessionError> {
        if let Some(group) = self.manifest.group_mut(group_id) {
            group.active = false;
        }
        self.dispose_group(group_id)?;
        Ok(())
    }

    /// Remove an instance from the registry, the render scene and the physics world
    ///
    /// The registry entry goes first so a frame update never sees a half-removed
    /// instance. Returns `false` for unknown ids.
    pub fn dispose_instance(&mut self, id: InstanceId) -> bool {
        let Some(tracked) = self.storage.remove(id) else {
            return false;
        };
        self.scene.remove_node(tracked.mesh);
        if let (Some(body), Some(physics)) = (tracked.body, self.physics.as_mut()) {
            physics.remove_rigid_body(body);
        }
        self.instances.remove(&id);
        self.by_asset.retain(|_, live| *live != id);
        log::debug!("Disposed {}", id);
        true
    }

    /// Dispose every live instance of a group's assets, returning how many were removed
    ///
    /// Assets that another active group also lists stay spawned.
    pub fn dispose_group(&mut self, group_id: &str) -> Result<usize, SessionError> {
        let manifest = self.manifest.manifest();
        let group = self
            .manifest
            .group(group_id)
            .ok_or_else(|| ManifestError::UnknownGroup(group_id.to_string()))?;
        let shared = |asset_id: &str| {
            manifest
                .asset_groups
                .iter()
                .any(|g| g.id != group_id && g.active && g.assets.iter().any(|a| a == asset_id))
        };
        let ids: Vec<InstanceId> = group
            .assets
            .iter()
            .filter(|asset_id| {
                let keep = shared(asset_id.as_str());
                if keep {
                    log::debug!("Keeping '{}', still listed by another active group", asset_id);
                }
                !keep
            })
            .filter_map(|asset_id| self.by_asset.get(asset_id).copied())
            .collect();
        Ok(ids.into_iter().filter(|id| self.dispose_instance(*id)).count())
    }

    /// Push the manifest's gravity and physics settings into the physics world
    pub fn apply_environment(&mut self) {
        let Some(physics) = self.physics.as_mut() else {
            return;
        };
        let scene = &self.manifest.manifest().scene_data;
        let settings = PhysicsSettings {
            enabled: scene.physics.enabled,
            gravity: scene.environment.gravity.to_vec3(),
            substeps: scene.physics.substeps.max(1),
        };
        log::debug!(
            "Applying environment: gravity {:?}, {} substeps",
            settings.gravity,
            settings.substeps
        );
        physics.configure(&settings);
    }

    /// Advance one frame: physics first, then pose sync
    ///
    /// Returns the number of render nodes updated.
    pub fn step(&mut self, dt: f32) -> usize {
        let Some(physics) = self.physics.as_mut() else {
            return 0;
        };
        physics.step(dt);
        self.storage.update(self.scene.as_mut(), &**physics)
    }

    /// Fixed timestep from the engine settings
    pub fn fixed_timestep(&self) -> f32 {
        1.0 / self.config.engine.fixed_timestep_hz.max(1.0)
    }

    /// Release every instance, cache and atlas; safe to call repeatedly
    pub fn dispose(&mut self) {
        let ids: Vec<InstanceId> = self.storage.iter().map(|(id, _)| id).collect();
        let count = ids.len();
        for id in ids {
            self.dispose_instance(id);
        }
        self.instances.clear();
        self.by_asset.clear();
        self.handler.dispose();
        self.atlases.dispose();
        if count > 0 {
            log::info!("Asset session disposed ({} instances released)", count);
        }
    }
}

impl Drop for AssetSession {
    fn drop(&mut self) {
        self.dispose();
    }
}
