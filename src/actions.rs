// Operator action layer: one async method per button action.
//
// Concurrent button presses become concurrently in-flight calls into this
// type; nothing queues or debounces them. Every focus-sensitive action runs
// inside a FocusContext so the shared remote focus pointer returns to the
// operator's selection when the action is done, and every score/throw/
// animation mutation honors the finished-hole guard.

use std::sync::Arc;

use tracing::{debug, info};

use crate::coordinator::Coordinator;
use crate::error::SyncError;
use crate::focus::FocusContext;
use crate::model::{IdentityScheme, Player, PlayerKey};
use crate::projection::{VariableStore, VAR_PLAYER_NAME, VAR_ROUND};

/// Which remote mutation a guarded action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mutation {
    IncreaseScore,
    RevertScore,
    IncreaseThrow,
    RevertThrow,
    Animation,
    ObAnimation,
}

/// The set of operator actions, shared across concurrently spawned tasks.
#[derive(Clone)]
pub struct Actions {
    coordinator: Arc<dyn Coordinator>,
    vars: Arc<VariableStore>,
    scheme: IdentityScheme,
}

impl Actions {
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        vars: Arc<VariableStore>,
        scheme: IdentityScheme,
    ) -> Self {
        Actions {
            coordinator,
            vars,
            scheme,
        }
    }

    // -----------------------------------------------------------------------
    // Focus
    // -----------------------------------------------------------------------

    /// Explicitly change the operator's focused player. This is the only
    /// action that writes the durable intended-focus slot; every other
    /// action borrows the pointer and restores it to whatever this last
    /// wrote.
    pub async fn change_focused_player(&self, target: PlayerKey) -> Result<Player, SyncError> {
        let player = self.coordinator.set_focused_player(&target).await?;
        // Prefer the confirmed identity; the remote may have resolved the
        // request to a different player.
        let key = player.key(self.scheme).unwrap_or(target);
        self.vars.set_intended_focus(&key);
        self.vars.set(VAR_PLAYER_NAME, &player.name);
        info!(player = %player.name, "focused player changed");
        Ok(player)
    }

    // -----------------------------------------------------------------------
    // Guarded score/throw/animation mutations
    // -----------------------------------------------------------------------

    /// Returns `Ok(true)` when the mutation was applied, `Ok(false)` when
    /// the finished-hole guard skipped it.
    pub async fn increase_score(&self, target: Option<PlayerKey>) -> Result<bool, SyncError> {
        self.guarded(target, Mutation::IncreaseScore).await
    }

    pub async fn revert_score(&self, target: Option<PlayerKey>) -> Result<bool, SyncError> {
        self.guarded(target, Mutation::RevertScore).await
    }

    pub async fn increase_throw(&self, target: Option<PlayerKey>) -> Result<bool, SyncError> {
        self.guarded(target, Mutation::IncreaseThrow).await
    }

    pub async fn revert_throw(&self, target: Option<PlayerKey>) -> Result<bool, SyncError> {
        self.guarded(target, Mutation::RevertThrow).await
    }

    pub async fn run_animation(&self, target: Option<PlayerKey>) -> Result<bool, SyncError> {
        self.guarded(target, Mutation::Animation).await
    }

    /// OB animation always acts on the current remote focus.
    pub async fn ob_animation(&self) -> Result<bool, SyncError> {
        self.guarded(None, Mutation::ObAnimation).await
    }

    async fn guarded(
        &self,
        target: Option<PlayerKey>,
        mutation: Mutation,
    ) -> Result<bool, SyncError> {
        let ctx = FocusContext::begin(
            self.coordinator.as_ref(),
            &self.vars,
            self.scheme,
            target,
        )
        .await?;
        // The restore step must run even when the operation fails; the
        // outcome is decided first and returned after.
        let outcome = self.apply_mutation(&ctx, mutation).await;
        ctx.finish().await;
        outcome
    }

    async fn apply_mutation(
        &self,
        ctx: &FocusContext<'_, dyn Coordinator>,
        mutation: Mutation,
    ) -> Result<bool, SyncError> {
        if !ctx.mutation_allowed().await? {
            debug!(?mutation, "skipped by finished-hole guard");
            return Ok(false);
        }
        match mutation {
            Mutation::IncreaseScore => self.coordinator.increase_score().await?,
            Mutation::RevertScore => self.coordinator.revert_score().await?,
            Mutation::IncreaseThrow => self.coordinator.increase_throw().await?,
            Mutation::RevertThrow => self.coordinator.revert_throw().await?,
            Mutation::Animation => self.coordinator.play_animation().await?,
            Mutation::ObAnimation => self.coordinator.play_ob_animation().await?,
        }
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Unguarded commands
    // -----------------------------------------------------------------------

    pub async fn set_hole_info(&self) -> Result<(), SyncError> {
        self.coordinator.set_hole_info().await
    }

    pub async fn update_leaderboard(&self) -> Result<(), SyncError> {
        self.coordinator.update_leaderboard().await
    }

    /// Update the leaderboard for another division. `division` is the
    /// operator-facing one-based number; the coordinator takes it zero-based.
    pub async fn other_leaderboard(&self, division: u32) -> Result<(), SyncError> {
        let division = division.saturating_sub(1);
        self.coordinator.show_other_leaderboard(division).await
    }

    // -----------------------------------------------------------------------
    // Round proposals
    // -----------------------------------------------------------------------

    /// Propose advancing to the next round. The round counter is
    /// remote-authoritative, so this only republishes the one-based display
    /// value; a later read confirms or corrects it. Returns the proposed
    /// zero-based round.
    pub async fn increment_round(&self) -> Result<u32, SyncError> {
        let round = self.coordinator.current_round().await?;
        let total = self.coordinator.total_rounds().await?;
        if round + 1 >= total {
            debug!(round, total, "already at the last round");
            return Ok(round);
        }
        let next = round + 1;
        self.vars.set(VAR_ROUND, &(next + 1).to_string());
        Ok(next)
    }

    /// Propose moving back one round. See [`Actions::increment_round`].
    pub async fn decrement_round(&self) -> Result<u32, SyncError> {
        let round = self.coordinator.current_round().await?;
        if round == 0 {
            debug!("already at the first round");
            return Ok(round);
        }
        let next = round - 1;
        self.vars.set(VAR_ROUND, &(next + 1).to_string());
        Ok(next)
    }
}
