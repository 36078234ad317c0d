//! hidsysd entry point.
//!
//! Wires the connection manager and the extension load loop together over a
//! HID system backend. No native backend is compiled into this build, so
//! running without `--simulate` reports the platform as unsupported; with
//! `--simulate` the daemon runs against the in-memory backend and walks
//! through a full discover → connect → post → terminate → reconnect cycle
//! while the loader retries until its simulated load succeeds.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use hidsys_core::{KeyDirection, ModifierFlags, PostKeyKind, StatusCode};
use hidsysd::application::connection_manager::ConnectionManager;
use hidsysd::application::extension_loader::{ExtensionLoader, LoadPrimitive, VersionMonitor};
use hidsysd::config::{load_config, AppConfig};
use hidsysd::infrastructure::hid::mock::MockHidSystem;
use hidsysd::infrastructure::hid::{HidError, HidPort, ServiceDiscovery};
use hidsysd::infrastructure::status_store::JsonStatusStore;

#[derive(Debug, Parser)]
#[command(name = "hidsysd", about = "HID system connection manager and extension load loop")]
struct Args {
    /// Path to the TOML config file.
    #[arg(long, env = "HIDSYSD_CONFIG", default_value = "/etc/hidsysd/config.toml")]
    config: PathBuf,

    /// Run against the in-memory HID system backend.
    #[arg(long)]
    simulate: bool,
}

/// Simulated load primitive: fails a fixed number of times, then succeeds.
struct SimulatedLoadPrimitive {
    failures_left: Mutex<u32>,
}

impl LoadPrimitive for SimulatedLoadPrimitive {
    fn load(&self, path: &std::path::Path) -> StatusCode {
        let mut left = self.failures_left.lock().expect("lock poisoned");
        if *left > 0 {
            *left -= 1;
            debug!("simulated load of {} denied", path.display());
            StatusCode(-0x2c)
        } else {
            StatusCode::SUCCESS
        }
    }
}

/// Simulated version checker: the nudge is only logged.
struct SimulatedVersionMonitor;

impl VersionMonitor for SimulatedVersionMonitor {
    fn request_manual_check(&self) {
        debug!("version monitor nudged");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    // Initialise structured logging. Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.daemon.log_level.clone())),
        )
        .init();

    info!("hidsysd starting");

    if !args.simulate {
        return Err(HidError::UnsupportedPlatform.into());
    }

    run_simulation(config).await
}

async fn run_simulation(config: AppConfig) -> anyhow::Result<()> {
    let hid = Arc::new(MockHidSystem::new());

    let manager = ConnectionManager::start(
        Arc::clone(&hid) as Arc<dyn HidPort>,
        Arc::clone(&hid) as Arc<dyn ServiceDiscovery>,
        config.service.class.clone(),
    );

    let loader = ExtensionLoader::new(
        Arc::new(SimulatedLoadPrimitive {
            failures_left: Mutex::new(2),
        }),
        Arc::new(SimulatedVersionMonitor),
        Arc::new(JsonStatusStore::new(&config.loader.state_file)),
        config.loader.extension_path(),
        config.loader.retry_period(),
    )
    .spawn();
    let mut loaded = loader.subscribe();

    // A service instance appears.
    let first = hid.publish_service();
    info!("simulation: published {first}");
    tokio::time::sleep(Duration::from_millis(100)).await;

    manager.post_key(
        PostKeyKind::Key,
        0x35,
        KeyDirection::Down,
        ModifierFlags::NONE,
        false,
    );
    manager.post_key(
        PostKeyKind::Key,
        0x35,
        KeyDirection::Up,
        ModifierFlags::NONE,
        false,
    );
    info!("simulation: caps lock is {:?}", manager.caps_lock_state());
    manager.set_caps_lock_state(true);
    info!("simulation: caps lock is {:?}", manager.caps_lock_state());

    // A replacement registers and the old instance disappears; the manager
    // re-queries and reconnects on its own.
    let second = hid.register_service();
    hid.terminate(&[first]);
    info!("simulation: terminated {first}, registered {second}");
    tokio::time::sleep(Duration::from_millis(100)).await;
    info!(
        "simulation: reconnected = {}, {} events posted so far",
        manager.is_connected(),
        hid.posted_events().len()
    );

    loaded.recv().await.ok();
    info!(
        "simulation: extension loaded, state persisted to {}",
        config.loader.state_file.display()
    );

    info!("hidsysd ready. Press Ctrl-C to exit.");
    tokio::signal::ctrl_c().await.ok();

    manager.shutdown();
    loader.shutdown().await;
    info!("hidsysd stopped");
    Ok(())
}
