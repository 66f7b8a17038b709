// Central event loop.
//
// Coordinates operator commands and push-channel events. Commands spawn
// independent action tasks so rapid presses overlap instead of queueing;
// the projection is mutated only here, on the loop itself, so it needs no
// locking. A failed action degrades to a log line and a stale display,
// never to a refused next press.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::actions::Actions;
use crate::coordinator::Coordinator;
use crate::error::SyncError;
use crate::model::{IdentityScheme, Player, PlayerKey};
use crate::projection::{LocalProjection, VariableStore, VAR_HOLE, VAR_ROUND};
use crate::subscriptions::{
    ChannelEvent, ChannelState, PushUpdate, SubscriptionManager,
};
use crate::vmix::VmixSender;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// One operator button press (or host/console request).
#[derive(Debug, Clone, PartialEq)]
pub enum DeckCommand {
    IncreaseScore { target: Option<PlayerKey> },
    RevertScore { target: Option<PlayerKey> },
    IncreaseThrow { target: Option<PlayerKey> },
    RevertThrow { target: Option<PlayerKey> },
    RunAnimation { target: Option<PlayerKey> },
    ObAnimation,
    ChangeFocusedPlayer { target: PlayerKey },
    SetHoleInfo,
    UpdateLeaderboard,
    OtherLeaderboard { division: u32 },
    IncrementRound,
    DecrementRound,
    ReloadChannel { name: String },
    SendVmix { commands: Vec<String> },
    Refresh,
    Shutdown,
}

/// Parse one console line into a command. This is the thin host adapter
/// boundary; a richer host would construct [`DeckCommand`]s directly.
pub fn parse_command(line: &str, scheme: IdentityScheme) -> Option<DeckCommand> {
    let mut parts = line.split_whitespace();
    let verb = parts.next()?;
    let rest: Vec<&str> = parts.collect();

    let target = |args: &[&str]| -> Option<PlayerKey> {
        args.first().and_then(|raw| PlayerKey::parse(raw, scheme))
    };

    let command = match verb {
        "increase_score" => DeckCommand::IncreaseScore {
            target: target(&rest),
        },
        "revert_score" => DeckCommand::RevertScore {
            target: target(&rest),
        },
        "increase_throw" => DeckCommand::IncreaseThrow {
            target: target(&rest),
        },
        "revert_throw" => DeckCommand::RevertThrow {
            target: target(&rest),
        },
        "run_animation" => DeckCommand::RunAnimation {
            target: target(&rest),
        },
        "ob" => DeckCommand::ObAnimation,
        "focus" => DeckCommand::ChangeFocusedPlayer {
            target: target(&rest)?,
        },
        "set_hole_info" => DeckCommand::SetHoleInfo,
        "leaderboard" => DeckCommand::UpdateLeaderboard,
        "other_leaderboard" => DeckCommand::OtherLeaderboard {
            division: rest.first()?.parse().ok()?,
        },
        "increment_round" => DeckCommand::IncrementRound,
        "decrement_round" => DeckCommand::DecrementRound,
        "reload" => DeckCommand::ReloadChannel {
            name: rest.first()?.to_string(),
        },
        "vmix" => DeckCommand::SendVmix {
            commands: vec![rest.join(" ")],
        },
        "refresh" => DeckCommand::Refresh,
        "quit" => DeckCommand::Shutdown,
        _ => return None,
    };
    Some(command)
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// The complete application state.
pub struct AppState {
    pub scheme: IdentityScheme,
    pub projection: LocalProjection,
    pub vars: Arc<VariableStore>,
    pub coordinator: Arc<dyn Coordinator>,
    pub actions: Actions,
    pub subscriptions: SubscriptionManager,
    pub vmix: VmixSender,
    pub channel_states: HashMap<String, ChannelState>,
    /// Completed read passes come back to the loop through this channel.
    snapshot_tx: mpsc::Sender<Snapshot>,
}

impl AppState {
    pub fn new(
        scheme: IdentityScheme,
        coordinator: Arc<dyn Coordinator>,
        vars: Arc<VariableStore>,
        subscriptions: SubscriptionManager,
        vmix: VmixSender,
        snapshot_tx: mpsc::Sender<Snapshot>,
    ) -> Self {
        let actions = Actions::new(coordinator.clone(), vars.clone(), scheme);
        let channel_states = subscriptions
            .channel_names()
            .into_iter()
            .map(|name| (name, ChannelState::Connecting))
            .collect();
        AppState {
            scheme,
            projection: LocalProjection::new(),
            vars,
            coordinator,
            actions,
            subscriptions,
            vmix,
            channel_states,
            snapshot_tx,
        }
    }
}

// ---------------------------------------------------------------------------
// Read-path refresh
// ---------------------------------------------------------------------------

/// Results of one read pass: round state, divisions, and the selected card.
/// A field is `None` when its read failed and the cached value stands.
#[derive(Debug, Default)]
pub struct Snapshot {
    round: Option<u32>,
    rounds_total: Option<u32>,
    hole: Option<u32>,
    divisions: Option<Vec<String>>,
    players: Option<Vec<Player>>,
}

/// Gather one full read pass against the coordinator.
///
/// The reads are sequential and can take several timeouts to drain against
/// an unreachable coordinator, so the event loop never awaits this directly;
/// a `Refresh` command spawns it and the result comes back as a [`Snapshot`].
///
/// A not-yet-initialised coordinator (424) is expected and degrades to
/// "no data"; any other read failure skips just its own update. Never
/// returns an error.
pub async fn read_snapshot(coordinator: &dyn Coordinator) -> Snapshot {
    let mut snapshot = Snapshot::default();
    match coordinator.current_round().await {
        Ok(round) => snapshot.round = Some(round),
        Err(e) => log_read_failure("round", &e),
    }
    match coordinator.total_rounds().await {
        Ok(total) => snapshot.rounds_total = Some(total),
        Err(e) => log_read_failure("rounds", &e),
    }
    match coordinator.current_hole().await {
        Ok(hole) => snapshot.hole = Some(hole),
        Err(e) => log_read_failure("hole", &e),
    }
    match coordinator.divisions().await {
        Ok(divisions) => snapshot.divisions = Some(divisions),
        Err(e) => log_read_failure("divisions", &e),
    }
    match coordinator.chosen_players().await {
        Ok(players) => snapshot.players = Some(players),
        Err(e) => log_read_failure("players", &e),
    }
    snapshot
}

/// Apply a gathered read pass to the projection, each present part replaced
/// wholesale. Runs on the event loop, like push updates.
pub fn apply_snapshot(state: &mut AppState, snapshot: Snapshot) {
    if let Some(round) = snapshot.round {
        state.projection.round.round = round;
        state.vars.set(VAR_ROUND, &(round + 1).to_string());
    }
    if let Some(total) = snapshot.rounds_total {
        state.projection.round.rounds_total = total;
    }
    if let Some(hole) = snapshot.hole {
        state.projection.round.hole = hole;
        state.vars.set(VAR_HOLE, &hole.to_string());
    }
    if let Some(divisions) = &snapshot.divisions {
        state.projection.replace_divisions(divisions);
    }
    if let Some(players) = &snapshot.players {
        state.projection.replace_roster(players, state.scheme);
        state
            .projection
            .replace_focused_players(players, state.scheme, &state.vars);
    }
}

/// Gather and apply one read pass in place. Startup uses this before the
/// event loop exists; the loop itself goes through [`read_snapshot`].
pub async fn refresh_snapshot(state: &mut AppState) {
    let snapshot = read_snapshot(state.coordinator.as_ref()).await;
    apply_snapshot(state, snapshot);
}

fn log_read_failure(what: &str, err: &SyncError) {
    match err {
        SyncError::CoordinatorUninitialized => {
            info!(what, "coordinator not initialised yet, showing no data");
        }
        other => warn!(what, error = %other, "read failed, keeping stale value"),
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Run the event loop until a `Shutdown` command arrives or both input
/// channels close.
pub async fn run(
    mut state: AppState,
    mut cmd_rx: mpsc::Receiver<DeckCommand>,
    mut channel_rx: mpsc::Receiver<ChannelEvent>,
    mut snapshot_rx: mpsc::Receiver<Snapshot>,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            command = cmd_rx.recv() => {
                match command {
                    Some(DeckCommand::Shutdown) | None => break,
                    Some(command) => handle_command(&mut state, command).await,
                }
            }
            event = channel_rx.recv() => {
                match event {
                    Some(event) => handle_channel_event(&mut state, event),
                    None => break,
                }
            }
            snapshot = snapshot_rx.recv() => {
                if let Some(snapshot) = snapshot {
                    apply_snapshot(&mut state, snapshot);
                }
            }
        }
    }
    state.subscriptions.shutdown();
    info!("event loop stopped");
    Ok(())
}

/// Dispatch one command. Remote actions are spawned so overlapping button
/// presses interleave instead of queueing; loop-owned state (subscriptions,
/// projection) is handled inline.
async fn handle_command(state: &mut AppState, command: DeckCommand) {
    debug!(?command, "command received");
    match command {
        DeckCommand::ReloadChannel { name } => {
            if state.subscriptions.reload(&name).await {
                state
                    .channel_states
                    .insert(name, ChannelState::Connecting);
            }
        }
        DeckCommand::Refresh => {
            let coordinator = state.coordinator.clone();
            let tx = state.snapshot_tx.clone();
            tokio::spawn(async move {
                let snapshot = read_snapshot(coordinator.as_ref()).await;
                let _ = tx.send(snapshot).await;
            });
        }
        DeckCommand::SendVmix { commands } => {
            let vmix = state.vmix.clone();
            tokio::spawn(async move { vmix.send(&commands).await });
        }
        remote => {
            let actions = state.actions.clone();
            tokio::spawn(async move { run_action(actions, remote).await });
        }
    }
}

/// Execute one remote action to completion, logging the outcome. Failures
/// are surfaced in the log and otherwise dropped; the next press must not
/// be blocked.
async fn run_action(actions: Actions, command: DeckCommand) {
    let result = match command {
        DeckCommand::IncreaseScore { target } => {
            actions.increase_score(target).await.map(log_guard_skip)
        }
        DeckCommand::RevertScore { target } => {
            actions.revert_score(target).await.map(log_guard_skip)
        }
        DeckCommand::IncreaseThrow { target } => {
            actions.increase_throw(target).await.map(log_guard_skip)
        }
        DeckCommand::RevertThrow { target } => {
            actions.revert_throw(target).await.map(log_guard_skip)
        }
        DeckCommand::RunAnimation { target } => {
            actions.run_animation(target).await.map(log_guard_skip)
        }
        DeckCommand::ObAnimation => actions.ob_animation().await.map(log_guard_skip),
        DeckCommand::ChangeFocusedPlayer { target } => {
            actions.change_focused_player(target).await.map(|_| ())
        }
        DeckCommand::SetHoleInfo => actions.set_hole_info().await,
        DeckCommand::UpdateLeaderboard => actions.update_leaderboard().await,
        DeckCommand::OtherLeaderboard { division } => {
            actions.other_leaderboard(division).await
        }
        DeckCommand::IncrementRound => actions.increment_round().await.map(|_| ()),
        DeckCommand::DecrementRound => actions.decrement_round().await.map(|_| ()),
        // Handled inline by the event loop.
        DeckCommand::ReloadChannel { .. }
        | DeckCommand::SendVmix { .. }
        | DeckCommand::Refresh
        | DeckCommand::Shutdown => Ok(()),
    };
    if let Err(err) = result {
        warn!(error = %err, "action failed");
    }
}

fn log_guard_skip(applied: bool) {
    if !applied {
        info!("mutation skipped: player already finished the current hole");
    }
}

/// Apply one push-channel event to the projection. Loss of a channel keeps
/// the last-known values; nothing is blanked.
pub fn handle_channel_event(state: &mut AppState, event: ChannelEvent) {
    match event {
        ChannelEvent::Opened { channel } => {
            info!(channel, "push channel open");
            state.channel_states.insert(channel, ChannelState::Open);
        }
        ChannelEvent::Update { channel, updates } => {
            debug!(channel, count = updates.len(), "push update");
            for update in updates {
                apply_push_update(state, update);
            }
        }
        ChannelEvent::Closed { channel } => {
            info!(channel, "push channel closed, retaining last-known values");
            state.channel_states.insert(channel, ChannelState::Closed);
        }
        ChannelEvent::Errored { channel, error } => {
            let err = SyncError::ChannelDisconnected {
                channel: channel.clone(),
            };
            warn!(error = %err, cause = error, "retaining last-known values");
            state.channel_states.insert(channel, ChannelState::Errored);
        }
    }
}

fn apply_push_update(state: &mut AppState, update: PushUpdate) {
    match update {
        PushUpdate::SelectedPlayers(players) => {
            state
                .projection
                .replace_focused_players(&players, state.scheme, &state.vars);
        }
        PushUpdate::Variable { name, value } => {
            if name == VAR_HOLE {
                state.projection.apply_hole_value(&value);
            }
            state.vars.set(&name, &value);
        }
    }
}
