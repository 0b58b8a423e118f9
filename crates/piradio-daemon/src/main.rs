mod catalog;
mod console;
mod core;
mod http;
mod keyboard;
mod mailbox;
mod player;
mod setup;
mod speech;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use piradio_proto::channels::{Channels, ListFile};
use piradio_proto::config::Config;
use piradio_proto::platform;
use piradio_proto::state::StatusBoard;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::catalog::TvhClient;
use crate::console::{say, ConsoleLayer};
use crate::core::RadioCore;
use crate::player::Supervisor;
use crate::speech::GoogleTts;

#[derive(Parser)]
#[command(name = "piradio")]
#[command(about = "Internet and TV Headend radio appliance")]
struct Args {
    /// Raise log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Edit the settings file and exit
    #[arg(short, long)]
    setup: bool,

    /// Settings file location
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_logging(debug: u8) -> anyhow::Result<PathBuf> {
    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = platform::log_path();

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    let level = match debug {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let default_filter = format!("warn,piradio={level},piradio_proto={level}");

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(ConsoleLayer::new(debug > 0))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    Ok(log_path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let log_path = init_logging(args.debug)?;
    info!("Log file: {:?}", log_path);

    let config_path = args.config.unwrap_or_else(Config::config_path);
    let loaded = Config::load(&config_path)?;

    let config = match loaded {
        Some(config) if !args.setup => config,
        loaded => {
            if loaded.is_none() {
                say(&format!("No settings in {}, starting the settings editor", config_path.display()));
            }
            let mut config = loaded.unwrap_or_default();
            setup::run_editor(&mut config, std::io::stdin().lock(), std::io::stdout().lock())?;
            config.save(&config_path)?;
            say(&format!("Settings saved to {}", config_path.display()));
            return Ok(());
        }
    };
    info!("Config loaded from: {:?}", config_path);

    run_radio(config).await
}

async fn run_radio(config: Config) -> anyhow::Result<()> {
    let streams = ListFile::streams(&config.paths.streams_list).load();
    if !streams.is_empty() {
        say(&format!("There are {} streams", streams.len()));
    }
    let favourites_file = ListFile::favourites(&config.paths.favourites_list);
    let favourites = favourites_file.load();
    if !favourites.is_empty() {
        say(&format!("There are {} favourites", favourites.len()));
    }

    let catalog_client = TvhClient::new(config.server.clone())?;
    let catalog = catalog_client.fetch_channels().await;

    let channels = Channels::new(catalog, streams, favourites);
    say(&format!("{} mode", channels.mode()));

    let argv = config.player.argv();
    match argv.first() {
        Some(program) if platform::find_program(program).is_none() => {
            warn!("Player {} not found, playback will fail", program)
        }
        Some(_) => {}
        None => warn!("No player command configured"),
    }

    let board = Arc::new(StatusBoard::new());
    let cancel = CancellationToken::new();
    let (mailbox, mailbox_rx) = mailbox::channel();

    let mut radio = RadioCore::new(
        channels,
        Supervisor::new(argv),
        favourites_file,
        Arc::clone(&board),
        cancel.clone(),
    )
    .with_streams_path(&config.paths.streams_list)
    .with_catalog(catalog_client);
    match GoogleTts::new(&config.paths.speech_cache) {
        Ok(tts) => radio = radio.with_speech(Box::new(tts)),
        Err(e) => warn!("Speech disabled: {:#}", e),
    }

    tokio::spawn(shutdown_signal(cancel.clone()));

    let http_handle = config.http.enabled().then(|| {
        http::start_server(
            config.http.bind_address(),
            config.http.port,
            Arc::clone(&board),
            mailbox.clone(),
            &config.http.assets_dir,
            cancel.clone(),
        )
    });
    let keyboard_handle = keyboard::spawn(mailbox.clone(), cancel.clone());
    if keyboard_handle.is_some() {
        say("Press h for help");
    }

    info!("Radio initialised, running control loop");
    let result = radio.run(mailbox_rx).await;

    // The loop cancels the token on its way out; wait for the others to see it.
    if let Some(handle) = http_handle {
        say("Waiting for web service to shut down");
        if let Err(e) = handle.await {
            warn!("Remote control task failed: {}", e);
        }
    }
    if let Some(handle) = keyboard_handle {
        if let Err(e) = handle.await {
            warn!("Keyboard task failed: {}", e);
        }
    }
    info!("Radio stopped");
    result
}

/// SIGINT or SIGTERM cancels the shared token.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let term = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => say("CTRL-C QUIT"),
        _ = term => warn!("Shutdown signal received"),
        _ = cancel.cancelled() => return,
    }
    cancel.cancel();
}
