//! # Fabric Fiber Demo
//!
//! Command-line host that mounts a declarative scene onto an in-memory
//! surface, waits for every queued creation to finish and reports the
//! resulting stacking order.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p fiber-demo
//! cargo run -p fiber-demo -- scenes/default.json --pixel-ratio 2 --json
//! ```
//!
//! ## Architecture
//!
//! - `CliArgs` - Command-line arguments parsed with clap
//! - `DemoConfig` - Surface size, scene location and context configuration
//! - `SceneSpec` - JSON scene description (groups and objects)
//! - `run_scene` - Mounts a scene through `fiber-core` and builds a `SceneReport`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]

mod scene;

pub use scene::{run_scene, LayerReport, SceneNode, SceneReport, SceneSpec};

use std::path::PathBuf;

use clap::Parser;
use fiber_core::ContextConfig;

/// Command-line arguments for fiber-demo.
#[derive(Debug, Clone, Parser)]
#[command(name = "fiber-demo")]
#[command(about = "Mount a declarative scene and print its stacking order")]
#[command(version)]
pub struct CliArgs {
    /// Scene file (JSON). The built-in scene is used when omitted.
    #[arg(env = "FIBER_SCENE")]
    pub scene: Option<PathBuf>,

    /// Directory image sources are resolved against
    #[arg(long, env = "FIBER_ASSETS_DIR")]
    pub assets: Option<PathBuf>,

    /// Surface width in logical pixels
    #[arg(long, default_value = "800")]
    pub width: f64,

    /// Surface height in logical pixels
    #[arg(long, default_value = "600")]
    pub height: f64,

    /// Device pixel ratio for the backing store
    #[arg(long, env = "FIBER_PIXEL_RATIO", default_value = "1")]
    pub pixel_ratio: f64,

    /// Clamp dragged objects inside the surface
    #[arg(long, env = "FIBER_CLAMP_BOUNDS")]
    pub clamp: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Demo configuration.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Surface width in logical pixels.
    pub width: f64,
    /// Surface height in logical pixels.
    pub height: f64,
    /// Scene file, or `None` for the built-in scene.
    pub scene: Option<PathBuf>,
    /// Base directory for image sources.
    pub assets: Option<PathBuf>,
    /// Root context configuration.
    pub context: ContextConfig,
    /// Emit JSON instead of text.
    pub json: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoConfig {
    /// Create a demo configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            scene: None,
            assets: None,
            context: ContextConfig::default(),
            json: false,
        }
    }
}

impl From<CliArgs> for DemoConfig {
    fn from(args: CliArgs) -> Self {
        Self {
            width: args.width,
            height: args.height,
            scene: args.scene,
            assets: args.assets,
            context: ContextConfig::default()
                .with_pixel_ratio(args.pixel_ratio)
                .with_clamp_to_bounds(args.clamp),
            json: args.json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let args = CliArgs::try_parse_from(["fiber-demo"]).expect("defaults should parse");
        let config = DemoConfig::from(args);
        assert!(config.scene.is_none());
        assert!((config.width - 800.0).abs() < f64::EPSILON);
        assert!(!config.json);
    }

    #[test]
    fn test_cli_overrides() {
        let args = CliArgs::try_parse_from([
            "fiber-demo",
            "scene.json",
            "--width",
            "320",
            "--pixel-ratio",
            "0",
            "--clamp",
            "--json",
        ])
        .expect("arguments should parse");
        let config = DemoConfig::from(args);

        assert_eq!(config.scene, Some(PathBuf::from("scene.json")));
        assert!((config.width - 320.0).abs() < f64::EPSILON);
        assert!((config.context.pixel_ratio - 1.0).abs() < f64::EPSILON);
        assert!(config.context.clamp_to_bounds);
        assert!(config.json);
    }
}
