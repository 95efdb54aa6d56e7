//! # Fabric Fiber Demo
//!
//! Mounts a scene onto an in-memory surface and prints its stacking order.

use clap::Parser;
use fiber_demo::{run_scene, CliArgs, DemoConfig, SceneSpec};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = CliArgs::parse();
    let config = DemoConfig::from(args);

    tracing::info!(
        width = config.width,
        height = config.height,
        pixel_ratio = config.context.pixel_ratio,
        "Starting fiber-demo v{}",
        fiber_core::VERSION
    );

    let spec = match &config.scene {
        Some(path) => {
            tracing::info!("Loading scene from {}", path.display());
            SceneSpec::from_file(path).await?
        }
        None => {
            tracing::debug!("No scene given, using the built-in scene");
            SceneSpec::builtin()?
        }
    };

    let report = run_scene(&config, &spec).await?;
    if !report.events.is_empty() {
        tracing::warn!(count = report.events.len(), "Scene reported diagnostics");
    }

    if config.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

/// Initialize tracing with environment-based filtering.
///
/// Set `RUST_LOG_FORMAT=json` for structured JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,fiber_demo=debug,fiber_core=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}
