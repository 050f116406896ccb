//! Headless scene runner
//!
//! Loads a manifest, reports validation problems, spawns the active groups
//! into an in-memory scene and the reference physics world, steps a number of
//! frames and logs where every instance ended up.
//!
//! ```text
//! scene_runner [MANIFEST] [--frames N] [--config FILE] [--asset-root DIR] [--save FILE]
//! ```

use std::path::PathBuf;

use asset_engine::foundation::logging;
use asset_engine::manifest::SaveOutcome;
use asset_engine::prelude::*;
use thiserror::Error;

const DEFAULT_MANIFEST: &str = "scene_runner/scenes/demo.json";
const DEFAULT_FRAMES: u32 = 120;

#[derive(Debug, Error)]
enum RunnerError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Config(#[from] asset_engine::core::ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Manifest(#[from] asset_engine::manifest::ManifestError),
}

#[derive(Debug)]
struct Options {
    manifest: PathBuf,
    frames: u32,
    config: Option<String>,
    asset_root: Option<PathBuf>,
    save: Option<PathBuf>,
}

impl Options {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, RunnerError> {
        let mut options = Self {
            manifest: PathBuf::from(DEFAULT_MANIFEST),
            frames: DEFAULT_FRAMES,
            config: None,
            asset_root: None,
            save: None,
        };
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| RunnerError::Usage(format!("{flag} needs a value")))
            };
            match arg.as_str() {
                "--frames" => {
                    let raw = value("--frames")?;
                    options.frames = raw
                        .parse()
                        .map_err(|_| RunnerError::Usage(format!("invalid frame count '{raw}'")))?;
                }
                "--config" => options.config = Some(value("--config")?),
                "--asset-root" => options.asset_root = Some(PathBuf::from(value("--asset-root")?)),
                "--save" => options.save = Some(PathBuf::from(value("--save")?)),
                flag if flag.starts_with("--") => {
                    return Err(RunnerError::Usage(format!("unknown flag '{flag}'")));
                }
                path => options.manifest = PathBuf::from(path),
            }
        }
        Ok(options)
    }
}

fn run(options: &Options) -> Result<(), RunnerError> {
    let config = match &options.config {
        Some(path) => SessionConfig::load_from_file(path)?,
        None => SessionConfig::default(),
    };
    logging::init_with_level(&config.engine.log_level);

    let mut session = AssetSession::new(config, Box::new(HeadlessScene::new()), Box::new(ObjModelLoader::new()))?
        .with_physics(Box::new(SimplePhysicsWorld::default()));
    if let Some(root) = &options.asset_root {
        session = session.with_asset_root(root);
    } else if let Some(parent) = options.manifest.parent() {
        session = session.with_asset_root(parent);
    }

    let report = session.load_manifest(&options.manifest)?;
    if report.is_valid {
        log::info!("Manifest '{}' is valid", session.manifest().manifest().name);
    } else {
        for error in &report.errors {
            log::warn!("{}", error);
        }
        log::warn!("Manifest has {} validation errors, spawning what is sound", report.errors.len());
    }

    for group in session.spawn_active_groups() {
        for (asset_id, error) in &group.failed {
            log::error!("Group '{}': asset '{}' failed: {}", group.group_id, asset_id, error);
        }
    }

    let dt = session.fixed_timestep();
    let mut synced = 0;
    for _ in 0..options.frames {
        synced += session.step(dt);
    }
    log::info!(
        "Simulated {} frames ({:.2}s), {} pose updates",
        options.frames,
        options.frames as f32 * dt,
        synced
    );

    let mut asset_ids: Vec<&String> = session.manifest().manifest().assets.keys().collect();
    asset_ids.sort();
    for asset_id in asset_ids {
        let Some(id) = session.instance_for_asset(asset_id) else {
            log::info!("{:>12}: not spawned", asset_id);
            continue;
        };
        let Some(instance) = session.instance(id) else { continue };
        let position = session
            .scene()
            .transform(instance.mesh)
            .map_or_else(Vec3::zeros, |t| t.position);
        log::info!(
            "{:>12}: {} '{}' at ({:.2}, {:.2}, {:.2}){}",
            asset_id,
            id,
            instance.asset_type,
            position.x,
            position.y,
            position.z,
            if instance.is_degraded() { " [visual-only]" } else { "" }
        );
    }

    if let Some(path) = &options.save {
        match session.manifest_mut().save(path)? {
            SaveOutcome::Written(path) => log::info!("Saved manifest to {}", path.display()),
            SaveOutcome::Pending => log::warn!("Manifest save deferred, storage unavailable"),
        }
    }

    session.dispose();
    Ok(())
}

fn main() {
    let result = Options::parse(std::env::args().skip(1)).and_then(|options| run(&options));
    if let Err(e) = result {
        log::error!("{}", e);
        eprintln!("scene_runner: {e}");
        std::process::exit(1);
    }
}
