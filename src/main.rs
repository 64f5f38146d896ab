use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faceverify::{classify, config, snapshot, Callbacks, FaceVerify, FaceboxClient, Verdict, Verify};
use faceverify_vision::SnapshotEncoder;
use log::{info, warn};

#[derive(Parser)]
#[command(name = "faceverify")]
#[command(
    version,
    about = "Periodic webcam face verification against a Facebox service"
)]
struct Cli {
    /// Config file (defaults to the compiled-in path)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture snapshots forever and report whether one known face is present
    Watch {
        /// Facebox base URL
        #[arg(long)]
        facebox: Option<String>,
        /// Milliseconds between snapshots
        #[arg(short, long)]
        interval: Option<u64>,
        /// Camera device path
        #[arg(short, long)]
        camera: Option<String>,
    },
    /// Submit one image file to Facebox and print the verdict
    Check {
        image: PathBuf,
        /// Facebox base URL
        #[arg(long)]
        facebox: Option<String>,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let cfg = merged_config(&cli)?;

    match &cli.command {
        Commands::Watch { .. } => watch(&cfg),
        Commands::Check { image, .. } => check(&cfg, image),
        Commands::Config => open_config(cli.config.as_deref()),
    }
}

/// Config file contents with command-line flags applied on top.
fn merged_config(cli: &Cli) -> Result<config::Config> {
    let mut cfg = config::load_config(cli.config.as_deref())?;
    match &cli.command {
        Commands::Watch {
            facebox,
            interval,
            camera,
        } => {
            if let Some(url) = facebox {
                cfg.facebox = url.clone();
            }
            if let Some(ms) = interval {
                cfg.snapshot_interval = *ms;
            }
            if let Some(camera) = camera {
                cfg.camera = camera.clone();
            }
        }
        Commands::Check { facebox, .. } => {
            if let Some(url) = facebox {
                cfg.facebox = url.clone();
            }
        }
        Commands::Config => {}
    }
    Ok(cfg)
}

fn watch(cfg: &config::Config) -> Result<()> {
    let options = cfg.options();
    info!("Verifying faces against {}", options.facebox);

    let callbacks = Callbacks::default()
        .on_secure(|name| info!("✓ secure: {}", name))
        .on_insecure(|reason| warn!("✗ insecure: {}", reason))
        .on_error(|msg| {
            if let Some(msg) = msg {
                warn!("error: {}", msg);
            }
        });

    let polling = FaceVerify::new(options, callbacks)
        .start()
        .context("Failed to start verification loop")?;

    info!("Press Ctrl+C to stop.");
    polling.run()
}

fn check(cfg: &config::Config, image: &Path) -> Result<()> {
    let options = cfg.options();
    let frame = snapshot::load_rgb(image)?;
    let (width, height) = options.constraints.fit(frame.width(), frame.height());
    let frame = if (width, height) != frame.dimensions() {
        image::imageops::resize(&frame, width, height, image::imageops::FilterType::Triangle)
    } else {
        frame
    };

    let payload = SnapshotEncoder::new(options.jpeg_quality)
        .encode_base64(&frame)
        .context("Failed to encode image")?;

    let client = FaceboxClient::with_timeout(&options.facebox, Duration::from_secs(60))?;
    info!("Submitting {} ({}x{}) to {}", image.display(), width, height, client.url());
    let resp = client.check(&payload).context("Facebox check failed")?;

    for face in &resp.faces {
        info!(
            "face: matched={} name={:?} confidence={:?}",
            face.matched, face.name, face.confidence
        );
    }

    match classify(&resp) {
        Verdict::Secure(name) => {
            info!("✓ secure: {}", name);
            Ok(())
        }
        Verdict::Insecure(reason) => {
            anyhow::bail!("insecure: {}", reason)
        }
    }
}

fn open_config(path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    if !config_path.exists() {
        config::save_config(&config::Config::default(), Some(config_path))
            .context("Failed to write default config")?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
