//! drover — console client for dispatching device actions.
//!
//! ```text
//! drover devices                      List pairable USB devices
//! drover shell -- ls /sdcard          Run a raw shell command
//! drover tap 540 1200                 Tap at coordinates
//! drover swipe 540 1600 540 400       Swipe between two points
//! drover text "hello world"           Type text
//! drover key back                     Press a named key
//! drover screenshot -o shot.png       Capture the screen
//! drover ui-tree                      Dump the accessibility tree
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use drover_core::adb::transport::{list_devices, DeviceInfo, DeviceSummary};
use drover_core::{
    ActionData, ActionResult, AndroidDriver, DeviceAction, DeviceDriver, DeviceRegistry,
    Dispatcher, ProtocolEngine, UsbTransport,
};

use config::CliConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "drover", about = "Uniform device actions over raw USB")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "drover.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Select a device by serial number or bus id (default: first
    /// allowlisted device).
    #[arg(short, long)]
    serial: Option<String>,

    /// Print results as JSON instead of human-readable output.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List pairable USB devices.
    Devices,
    /// Run a raw shell command on the device.
    Shell {
        /// The command and its arguments.
        #[arg(trailing_var_arg = true, required = true)]
        cmd: Vec<String>,
    },
    /// Tap at screen coordinates.
    Tap { x: i32, y: i32 },
    /// Swipe from one point to another.
    Swipe {
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        /// Gesture duration in milliseconds.
        #[arg(long)]
        duration_ms: Option<u32>,
    },
    /// Type a text string.
    Text { text: String },
    /// Press a named key (e.g. `enter`, `back`, `volume_up`).
    Key { key: String },
    /// Capture the screen to a PNG file.
    Screenshot {
        #[arg(short, long, default_value = "screenshot.png")]
        output: PathBuf,
    },
    /// Dump the accessibility tree as XML.
    UiTree,
}

impl Cmd {
    fn as_action(&self) -> Option<DeviceAction> {
        match self {
            Cmd::Tap { x, y } => Some(DeviceAction::Tap { x: *x, y: *y }),
            Cmd::Swipe {
                x1,
                y1,
                x2,
                y2,
                duration_ms,
            } => Some(DeviceAction::Swipe {
                x1: *x1,
                y1: *y1,
                x2: *x2,
                y2: *y2,
                duration_ms: *duration_ms,
            }),
            Cmd::Text { text } => Some(DeviceAction::Type { text: text.clone() }),
            Cmd::Key { key } => Some(DeviceAction::Key {
                key: key.clone(),
                modifiers: Default::default(),
            }),
            Cmd::Screenshot { .. } => Some(DeviceAction::Screenshot),
            Cmd::UiTree => Some(DeviceAction::GetUiTree),
            Cmd::Devices | Cmd::Shell { .. } => None,
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&CliConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = CliConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let command = cli.command.unwrap_or(Cmd::Devices);

    // Listing needs no open transport.
    if matches!(command, Cmd::Devices) {
        let devices = list_devices(&config.usb.extra_vendor_ids)?;
        if devices.is_empty() {
            println!("no pairable devices attached");
            return Ok(());
        }
        for (summary, _) in devices {
            println!(
                "{}  {:04x}:{:04x}  {}  {}",
                summary.bus_id,
                summary.vendor_id,
                summary.product_id,
                summary.product.as_deref().unwrap_or("-"),
                summary.serial.as_deref().unwrap_or("-"),
            );
        }
        return Ok(());
    }

    let (summary, info) = pick_device(&config, cli.serial.as_deref())?;
    info!(bus_id = %summary.bus_id, "using device");

    let transport = UsbTransport::open(&info)?;
    let engine = ProtocolEngine::with_timeout(
        transport,
        Duration::from_millis(config.usb.io_timeout_ms),
    );

    // Raw shell bypasses the action contract on purpose.
    if let Cmd::Shell { cmd } = &command {
        let mut engine = engine;
        engine.connect().await?;
        let output = engine.run_shell(&cmd.join(" ")).await?;
        print!("{output}");
        return Ok(());
    }

    let device_name = summary
        .product
        .clone()
        .unwrap_or_else(|| "Android device".to_string());
    let driver = Arc::new(AndroidDriver::new(
        summary.bus_id.clone(),
        device_name,
        engine,
    ));
    driver.connect().await?;

    let registry = Arc::new(DeviceRegistry::new());
    let capabilities = driver.capabilities().await;
    registry
        .register(
            summary.bus_id.clone(),
            "local",
            driver.clone() as Arc<dyn DeviceDriver>,
            Some(capabilities),
        )
        .await;
    let dispatcher = Dispatcher::new(registry.clone());

    let action = command
        .as_action()
        .expect("non-action commands handled above");
    let result = dispatcher.dispatch(&summary.bus_id, action).await;

    let exit = render(&command, &result, cli.json)?;
    registry.close().await;
    std::process::exit(exit);
}

/// Pick the device matching `selector`, or the first allowlisted one.
fn pick_device(
    config: &CliConfig,
    selector: Option<&str>,
) -> Result<(DeviceSummary, DeviceInfo), Box<dyn std::error::Error>> {
    let mut devices = list_devices(&config.usb.extra_vendor_ids)?;
    if devices.is_empty() {
        return Err("no pairable devices attached".into());
    }
    let index = match selector {
        Some(sel) => devices
            .iter()
            .position(|(s, _)| s.serial.as_deref() == Some(sel) || s.bus_id == sel)
            .ok_or_else(|| format!("no attached device matches {sel:?}"))?,
        None => 0,
    };
    Ok(devices.swap_remove(index))
}

/// Print the result; returns the process exit code.
fn render(
    command: &Cmd,
    result: &ActionResult,
    json: bool,
) -> Result<i32, Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(if result.is_success() { 0 } else { 1 });
    }

    match result {
        ActionResult::Success { data } => {
            match data {
                Some(ActionData::Screenshot { bytes, .. }) => {
                    if let Cmd::Screenshot { output } = command {
                        std::fs::write(output, bytes)?;
                        println!("wrote {} bytes to {}", bytes.len(), output.display());
                    }
                }
                Some(ActionData::UiTree { xml }) => println!("{xml}"),
                Some(ActionData::Text { text }) => print!("{text}"),
                None => println!("ok"),
            }
            Ok(0)
        }
        ActionResult::Failure { error, code } => {
            eprintln!("error ({code}): {error}");
            Ok(1)
        }
    }
}
