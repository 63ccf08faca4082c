//! tee-canvas: replay a design session and write the settled design.

use std::collections::BTreeMap;

use anyhow::Context;
use clap::Parser;
use tee_canvas_core::SystemClock;
use tee_canvas_host::{
    script, CliArgs, DesignListener, DesignMetadata, DesignStore, DesignSubmission,
    DirectoryDesignStore, HostConfig, SceneHost, Script,
};
use tee_canvas_renderer::{ExportSnapshot, ImageSource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logs each exported design.
struct LogListener;

impl DesignListener for LogListener {
    fn on_ready(&mut self) {
        tracing::info!("Design surface ready");
    }

    fn on_design_change(&mut self, snapshot: &ExportSnapshot) {
        tracing::info!(
            "Design changed: {}x{} PNG, {} bytes, scene version {}",
            snapshot.width(),
            snapshot.height(),
            snapshot.bytes().len(),
            snapshot.scene_version()
        );
    }
}

/// Initialize tracing with optional JSON output.
///
/// Set `RUST_LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tee_canvas_host=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

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

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_tracing();

    let config = HostConfig::try_from(&args)?;
    let script = Script::from_path(&args.script)?;
    let initial = match &args.initial {
        Some(path) => Some(ImageSource::Bytes(
            tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read initial design {}", path.display()))?,
        )),
        None => None,
    };

    let mut host = SceneHost::mount(config, initial, Box::new(LogListener), Box::new(SystemClock));
    let report = script::replay(&mut host, &script).await?;
    tracing::info!("Replay finished: {}", report);

    let snapshot = match host.latest_snapshot().cloned() {
        Some(snapshot) => Some(snapshot),
        None => host.export_now(),
    };
    let layout = host.layout_json();
    host.unmount();

    let Some(snapshot) = snapshot else {
        tracing::warn!("Design is empty, nothing written");
        return Ok(());
    };
    tokio::fs::write(&args.out, snapshot.bytes())
        .await
        .with_context(|| format!("Failed to write {}", args.out.display()))?;
    tracing::info!("Wrote {}", args.out.display());

    if let Some(dir) = &args.store_dir {
        let store = DirectoryDesignStore::new(dir)?;
        let id = store.save(&DesignSubmission {
            snapshot,
            metadata: DesignMetadata {
                theme: args.theme.clone(),
                tshirt_color: args.tshirt_color,
                answers: BTreeMap::new(),
            },
            layout,
        })?;
        println!("{id}");
    }
    Ok(())
}
