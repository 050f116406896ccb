//! Manifest ownership: loading, mutation and persistence

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::types::{
    AssetEntry, AssetGroup, CustomType, Environment, Manifest, ScenePhysics, Vector3Spec,
    MANIFEST_VERSION,
};
use super::validation::{validate_manifest, ValidationReport};
use crate::core::config::{ManifestSettings, StorageMode};
use crate::foundation::math::Vec3;
use crate::foundation::time::timestamp_now;

/// Manifest errors
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Manifest file does not exist
    #[error("Manifest not found: {0}")]
    NotFound(String),

    /// IO error while reading
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Document is not a valid manifest
    #[error("Parse error: {0}")]
    Parse(String),

    /// Manifest could not be serialized
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// No asset with this id
    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    /// No group with this id
    #[error("Unknown asset group: {0}")]
    UnknownGroup(String),

    /// No custom type with this name
    #[error("Unknown custom type: {0}")]
    UnknownCustomType(String),
}

/// Serialized manifest that could not be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSave {
    /// Where the save was aimed
    pub path: PathBuf,
    /// Complete JSON document
    pub payload: String,
    /// Why it was not written
    pub reason: String,
}

/// Result of [`ManifestManager::save`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Written to the given path
    Written(PathBuf),
    /// Storage unavailable; see [`ManifestManager::pending_save`]
    Pending,
}

/// Owns the session manifest
#[derive(Debug, Default)]
pub struct ManifestManager {
    manifest: Manifest,
    settings: ManifestSettings,
    source: Option<PathBuf>,
    dirty: bool,
    pending: Option<PendingSave>,
}

impl ManifestManager {
    /// Manager holding an empty manifest
    pub fn new(settings: ManifestSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Load a manifest file, replacing the current one only on success
    pub fn load_from_path(&mut self, path: impl AsRef<Path>) -> Result<&Manifest, ManifestError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ManifestError::NotFound(path.display().to_string()));
        }
        let text = fs::read_to_string(path)?;
        let manifest = Self::parse(&text)?;
        log::info!(
            "Loaded manifest '{}' from {} ({} assets)",
            manifest.name,
            path.display(),
            manifest.assets.len()
        );
        self.source = Some(path.to_path_buf());
        Ok(self.replace(manifest))
    }

    /// Load a manifest from JSON text, replacing the current one only on success
    pub fn load_from_str(&mut self, text: &str) -> Result<&Manifest, ManifestError> {
        let manifest = Self::parse(text)?;
        self.source = None;
        Ok(self.replace(manifest))
    }

    fn parse(text: &str) -> Result<Manifest, ManifestError> {
        serde_json::from_str(text).map_err(|e| ManifestError::Parse(e.to_string()))
    }

    fn replace(&mut self, manifest: Manifest) -> &Manifest {
        if manifest.manifest_version != MANIFEST_VERSION {
            log::warn!(
                "Manifest version {} differs from supported {}",
                manifest.manifest_version,
                MANIFEST_VERSION
            );
        }
        self.manifest = manifest;
        self.dirty = false;
        self.pending = None;
        &self.manifest
    }

    /// Start a fresh manifest
    pub fn create_new(&mut self, name: impl Into<String>, description: impl Into<String>) -> &Manifest {
        let now = timestamp_now();
        let manifest = Manifest {
            name: name.into(),
            description: description.into(),
            created_date: now.clone(),
            updated_date: now,
            ..Manifest::default()
        };
        self.source = None;
        self.replace(manifest);
        self.dirty = true;
        &self.manifest
    }

    /// Current manifest
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// File the manifest was loaded from
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Check every reference and range
    pub fn validate(&self) -> ValidationReport {
        let report = validate_manifest(&self.manifest);
        if !report.is_valid {
            log::warn!("Manifest '{}' has {} validation errors", self.manifest.name, report.errors.len());
            for error in &report.errors {
                log::debug!("  {}", error);
            }
        }
        report
    }

    /// Whether the manifest changed since the last load or save
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // Custom types

    /// Custom type by name
    pub fn custom_type(&self, name: &str) -> Option<&CustomType> {
        self.manifest.custom_type(name)
    }

    /// Insert or replace a custom type by name
    pub fn set_custom_type(&mut self, custom: CustomType) {
        self.dirty = true;
        match self.manifest.custom_types.iter_mut().find(|t| t.name == custom.name) {
            Some(existing) => *existing = custom,
            None => self.manifest.custom_types.push(custom),
        }
    }

    /// Remove a custom type
    pub fn remove_custom_type(&mut self, name: &str) -> Result<CustomType, ManifestError> {
        let index = self
            .manifest
            .custom_types
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| ManifestError::UnknownCustomType(name.to_string()))?;
        self.dirty = true;
        Ok(self.manifest.custom_types.remove(index))
    }

    // Groups

    /// Group by id
    pub fn group(&self, id: &str) -> Option<&AssetGroup> {
        self.manifest.group(id)
    }

    /// Mutable group by id
    pub fn group_mut(&mut self, id: &str) -> Option<&mut AssetGroup> {
        let group = self.manifest.asset_groups.iter_mut().find(|g| g.id == id);
        if group.is_some() {
            self.dirty = true;
        }
        group
    }

    /// Insert or replace a group by id
    pub fn set_group(&mut self, group: AssetGroup) {
        self.dirty = true;
        match self.manifest.asset_groups.iter_mut().find(|g| g.id == group.id) {
            Some(existing) => *existing = group,
            None => self.manifest.asset_groups.push(group),
        }
    }

    /// Remove a group and clear `group_id` on its members
    pub fn remove_group(&mut self, id: &str) -> Result<AssetGroup, ManifestError> {
        let index = self
            .manifest
            .asset_groups
            .iter()
            .position(|g| g.id == id)
            .ok_or_else(|| ManifestError::UnknownGroup(id.to_string()))?;
        let group = self.manifest.asset_groups.remove(index);
        for asset in self.manifest.assets.values_mut() {
            if asset.group_id.as_deref() == Some(id) {
                asset.group_id = None;
            }
        }
        self.dirty = true;
        Ok(group)
    }

    /// Add an existing asset to an existing group
    pub fn add_asset_to_group(&mut self, group_id: &str, asset_id: &str) -> Result<(), ManifestError> {
        let asset = self
            .manifest
            .assets
            .get_mut(asset_id)
            .ok_or_else(|| ManifestError::UnknownAsset(asset_id.to_string()))?;
        let group = self
            .manifest
            .asset_groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| ManifestError::UnknownGroup(group_id.to_string()))?;
        if !group.assets.iter().any(|id| id == asset_id) {
            group.assets.push(asset_id.to_string());
        }
        asset.group_id = Some(group_id.to_string());
        self.dirty = true;
        Ok(())
    }

    // Assets

    /// Asset entry by id
    pub fn asset(&self, id: &str) -> Option<&AssetEntry> {
        self.manifest.assets.get(id)
    }

    /// Insert or replace an asset entry
    pub fn set_asset(&mut self, id: impl Into<String>, entry: AssetEntry) {
        self.dirty = true;
        self.manifest.assets.insert(id.into(), entry);
    }

    /// Remove an asset and every group reference to it
    pub fn remove_asset(&mut self, id: &str) -> Result<AssetEntry, ManifestError> {
        let entry = self
            .manifest
            .assets
            .remove(id)
            .ok_or_else(|| ManifestError::UnknownAsset(id.to_string()))?;
        for group in &mut self.manifest.asset_groups {
            group.assets.retain(|member| member != id);
        }
        self.dirty = true;
        Ok(entry)
    }

    /// Ids of assets carrying a tag
    pub fn asset_ids_with_tag(&self, tag: &str) -> Vec<&str> {
        self.manifest
            .assets
            .iter()
            .filter(|(_, entry)| entry.tags.iter().any(|t| t == tag))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    // Scene

    /// Scene environment
    pub fn environment(&self) -> &Environment {
        &self.manifest.scene_data.environment
    }

    /// Replace the scene environment
    pub fn set_environment(&mut self, environment: Environment) {
        self.dirty = true;
        self.manifest.scene_data.environment = environment;
    }

    /// Set only the gravity vector
    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.dirty = true;
        self.manifest.scene_data.environment.gravity = Vector3Spec::from(gravity);
    }

    /// Physics parameters
    pub fn scene_physics(&self) -> &ScenePhysics {
        &self.manifest.scene_data.physics
    }

    /// Replace the physics parameters
    pub fn set_scene_physics(&mut self, physics: ScenePhysics) {
        self.dirty = true;
        self.manifest.scene_data.physics = physics;
    }

    // Persistence

    /// Serialize the current manifest
    pub fn to_json_string(&self) -> Result<String, ManifestError> {
        let result = if self.settings.pretty {
            serde_json::to_string_pretty(&self.manifest)
        } else {
            serde_json::to_string(&self.manifest)
        };
        result.map_err(|e| ManifestError::Serialize(e.to_string()))
    }

    /// Save the manifest
    ///
    /// When storage is unavailable or the write fails, the serialized document
    /// is kept as a [`PendingSave`] and [`SaveOutcome::Pending`] is returned.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<SaveOutcome, ManifestError> {
        let path = path.as_ref();
        self.manifest.updated_date = timestamp_now();
        let payload = self.to_json_string()?;

        let failure = match self.settings.storage {
            StorageMode::Unavailable => Some("storage unavailable".to_string()),
            StorageMode::Filesystem => fs::write(path, &payload).err().map(|e| e.to_string()),
        };

        match failure {
            None => {
                log::info!("Saved manifest '{}' to {}", self.manifest.name, path.display());
                self.dirty = false;
                self.pending = None;
                self.source = Some(path.to_path_buf());
                Ok(SaveOutcome::Written(path.to_path_buf()))
            }
            Some(reason) => {
                log::warn!("Manifest save to {} deferred: {}", path.display(), reason);
                self.pending = Some(PendingSave {
                    path: path.to_path_buf(),
                    payload,
                    reason,
                });
                Ok(SaveOutcome::Pending)
            }
        }
    }

    /// Payload of the last save that could not be written
    pub fn pending_save(&self) -> Option<&PendingSave> {
        self.pending.as_ref()
    }

    /// Take ownership of the pending payload
    pub fn take_pending_save(&mut self) -> Option<PendingSave> {
        self.pending.take()
    }
}
