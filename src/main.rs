// Deck bridge entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Build the coordinator client and variable store
// 4. Spawn the push-channel subscriptions
// 5. Take an initial read snapshot (tolerates an uninitialised coordinator)
// 6. Spawn the console command reader
// 7. Run the event loop until quit or Ctrl+C

use std::sync::Arc;

use anyhow::Context;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use deck_bridge::app::{self, AppState, DeckCommand};
use deck_bridge::config;
use deck_bridge::coordinator::CoordinatorClient;
use deck_bridge::model::IdentityScheme;
use deck_bridge::projection::{VariableStore, VAR_HOLE, VAR_ROUND};
use deck_bridge::subscriptions::{default_subscriptions, SubscriptionManager};
use deck_bridge::vmix::VmixSender;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing (log to file, not terminal)
    init_tracing()?;
    info!("deck bridge starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: coordinator={}, event={}, vmix={}",
        config.coordinator.http_base(),
        config.event.event_id,
        config.vmix.addr()
    );

    // 3. Coordinator client and variable store
    let coordinator = Arc::new(
        CoordinatorClient::from_config(&config.coordinator)
            .context("failed to build coordinator client")?,
    );
    let (var_tx, mut var_rx) = mpsc::unbounded_channel();
    let vars = Arc::new(VariableStore::new(var_tx));
    // Configured starting values stand until the first snapshot or push.
    vars.set(VAR_ROUND, &config.event.round.to_string());
    vars.set(VAR_HOLE, &config.event.hole.to_string());

    // Thin host boundary: a real control-surface host would push these
    // variable updates into its own store. Here they go to the debug log.
    tokio::spawn(async move {
        while let Some(update) = var_rx.recv().await {
            debug!(name = %update.name, value = %update.value, "variable published");
        }
    });

    // 4. Push-channel subscriptions
    let (channel_tx, channel_rx) = mpsc::channel(256);
    let subs = default_subscriptions(&config.coordinator.host, config.coordinator.port);
    let mut subscriptions = SubscriptionManager::new(subs, channel_tx);
    subscriptions.start_all();

    let scheme = config.coordinator.identity_scheme;
    let vmix = VmixSender::new(config.vmix.addr());
    let (snapshot_tx, snapshot_rx) = mpsc::channel(4);
    let mut state = AppState::new(scheme, coordinator, vars, subscriptions, vmix, snapshot_tx);

    // 5. Initial snapshot; an uninitialised coordinator degrades to no data.
    app::refresh_snapshot(&mut state).await;

    // 6. Console command reader
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    tokio::spawn(read_commands(cmd_tx, scheme));

    // 7. Event loop until quit or Ctrl+C
    info!("deck bridge ready");
    tokio::select! {
        result = app::run(state, cmd_rx, channel_rx, snapshot_rx) => result?,
        _ = tokio::signal::ctrl_c() => info!("interrupted, shutting down"),
    }

    info!("deck bridge shut down cleanly");
    Ok(())
}

/// Read console lines and translate them into commands until stdin closes.
async fn read_commands(tx: mpsc::Sender<DeckCommand>, scheme: IdentityScheme) {
    let stdin = tokio::io::stdin();
    let mut lines = tokio::io::BufReader::new(stdin).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        match app::parse_command(&line, scheme) {
            Some(command) => {
                if tx.send(command).await.is_err() {
                    break;
                }
            }
            None => warn!(line, "unrecognized command"),
        }
    }
    let _ = tx.send(DeckCommand::Shutdown).await;
}

/// Initialize tracing to log to a file (the terminal belongs to the console
/// command reader).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("deck-bridge.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("deck_bridge=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
