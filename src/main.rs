//! Binary entrypoint: headless slideshow driven by a YAML config.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use slideshow_engine::config::Configuration;
use slideshow_engine::events::ImageHandle;
use slideshow_engine::tasks::files;
use slideshow_engine::{FsImageSource, PlaybackObserver, Player};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

#[derive(Debug, Parser)]
#[command(name = "slideshow", version, about = "Randomized prefetching slideshow")]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Start paused regardless of `start-playing`
    #[arg(long)]
    paused: bool,
    /// Deterministic RNG seed (overrides `shuffle-seed`)
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

/// Logs what a display would draw.
struct LogObserver;

impl PlaybackObserver for LogObserver {
    fn set_history_length(&self, len: usize) {
        debug!(history = len, "history length");
    }

    fn displayed(&self, image: &ImageHandle) {
        info!(
            path = %image.path.display(),
            width = image.width,
            height = image.height,
            "now showing"
        );
    }
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "info,slideshow_engine=debug,slideshow=debug",
        _ => "info,slideshow_engine=trace,slideshow=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let cfg = Configuration::from_yaml_file(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config.display()))?
        .validated()
        .context("invalid configuration values")?;
    info!("Loaded configuration from {}:\n{:#?}", args.config.display(), cfg);

    let paths = files::scan_groups(&cfg.photo_directories, cfg.weight_directories_equally)
        .context("failed to scan photo directories")?;
    info!(
        groups = paths.groups().len(),
        total = paths.total(),
        "startup scan complete"
    );

    let mut builder = Player::builder(FsImageSource)
        .settings(cfg.player_settings())
        .paths(paths)
        .playing(cfg.start_playing && !args.paused)
        .timing(cfg.timing_functions.clone())
        .observer(LogObserver);
    if let Some(seed) = args.seed.or(cfg.shuffle_seed) {
        builder = builder.seed(seed);
    }
    let player = builder.build()?;

    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    #[cfg(unix)]
    {
        let cancel = cancel.clone();
        let player = player.clone();
        tokio::spawn(async move {
            match signal(SignalKind::user_defined1()) {
                Ok(mut sigusr1) => loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = sigusr1.recv() => {
                            if received.is_none() {
                                break;
                            }
                            info!("SIGUSR1 received; toggling playback");
                            player.toggle_playing();
                        }
                    }
                },
                Err(err) => warn!("failed to register SIGUSR1 handler: {err}"),
            }
        });
    }

    let mut tasks = JoinSet::new();
    tasks.spawn({
        let cfg = cfg.clone();
        let player = player.clone();
        let cancel = cancel.clone();
        async move {
            if let Err(err) = files::run(cfg, player, cancel).await {
                warn!("files task failed; live rescans disabled: {err:#}");
            }
        }
    });

    player.start();

    cancel.cancelled().await;
    player.shutdown().await;
    while let Some(res) = tasks.join_next().await {
        if let Err(err) = res {
            warn!("task join failed: {err}");
        }
    }
    info!("shutdown complete");
    Ok(())
}
