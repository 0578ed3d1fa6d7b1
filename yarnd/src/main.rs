use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yarnd::config::Config;
use yarnd::container::GameContainer;
use yarnd::dispatcher::Dispatcher;
use yarnd::io::{ChannelInputListener, Drivers};
use yarnd::net;
use yarnd::state::Formats;

/// What we return to the shell when the configuration cannot be loaded.
const EXIT_CONFIG_ERROR: i32 = 2;

#[tokio::main]
/// Loads the configuration, restores state if asked to, wires up the driver
/// registry, the container and the dispatcher, then serves NUL-framed JSON
/// requests until a termination signal arrives.
async fn main() {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(error) => {
            eprintln!("failed to load configuration: {error}");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    init_tracing(&config);

    let drivers = match Drivers::new(&config) {
        Ok(drivers) => drivers,
        Err(error) => {
            tracing::error!(%error, "Driver setup failed.");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };
    let formats = Arc::new(Formats::new());
    let container = GameContainer::new(Arc::clone(&config), Arc::clone(&drivers), formats);
    let dispatcher = Dispatcher::new(Arc::clone(&container), Arc::clone(&config));

    // An existing marker means the previous process never shut down cleanly.
    let marker = config
        .state
        .enabled
        .then(|| config.state_path().join(".running"));
    let crashed = marker.as_ref().is_some_and(|marker| marker.exists());

    if config.state.enabled
        && (config.state.auto_restore || (config.state.crash_recovery && crashed))
    {
        if crashed && !config.state.auto_restore {
            tracing::warn!("Unclean shutdown detected; recovering dumped games.");
        }
        if let Err(error) = container.restore().await {
            tracing::error!(%error, "Fleet restore failed.");
        }
    }

    if let Some(marker) = &marker {
        let write = std::fs::create_dir_all(config.state_path())
            .and_then(|_| std::fs::write(marker, b""));
        if let Err(error) = write {
            tracing::error!(?error, "Failed to write the crash marker.");
        }
    }

    // Input listeners feed externally produced commands into the buffers.
    let mut input_listeners = Vec::new();
    for name in &config.input.listeners {
        match name.as_str() {
            "channel" => {
                let listener = ChannelInputListener::new(
                    config.channel.input_channel.clone(),
                    config.channel.capacity,
                );
                listener.start(drivers.input());
                input_listeners.push(listener);
            }
            other => tracing::warn!(listener = other, "Unknown input listener."),
        }
    }

    let listeners = match net::bind(&config) {
        Ok(listeners) => listeners,
        Err(error) => {
            tracing::error!(%error, "Failed to bind.");
            std::process::exit(1);
        }
    };
    let _acceptors = net::serve(listeners, Arc::clone(&dispatcher), Arc::clone(&config));

    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(?error, "Failed to wait for the shutdown signal.");
    }
    tracing::info!("Shutting down.");

    if config.state.enabled && config.state.dump_on_shutdown {
        container.dump().await;
    }
    container.shutdown().await;
    for listener in &input_listeners {
        listener.stop();
    }
    if let Some(marker) = &marker {
        let _ = std::fs::remove_file(marker);
    }
}

/// Sends traces to stdout, stderr or a log file, as configured. A file that
/// cannot be opened falls back to stderr rather than taking the daemon down.
fn init_tracing(config: &Config) {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into())
    };

    // The fmt layer's type changes with the writer, so each branch builds
    // its own stack.
    macro_rules! init_with_writer {
        ($writer:expr) => {
            tracing_subscriber::registry()
                .with(filter())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_file(true)
                        .with_line_number(true)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_thread_names(true)
                        .with_writer($writer),
                )
                .init()
        };
    }

    match config.logging.logto.as_str() {
        "stdout" => init_with_writer!(std::io::stdout),
        "stderr" => init_with_writer!(std::io::stderr),
        path => {
            let resolved = config.resolve_path(std::path::Path::new(path));
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&resolved)
            {
                Ok(file) => init_with_writer!(Arc::new(file)),
                Err(error) => {
                    eprintln!(
                        "WARNING: failed to open {} for writing ({error}); logging to stderr.",
                        resolved.display()
                    );
                    init_with_writer!(std::io::stderr);
                }
            }
        }
    }
}
