// Borrow/restore protocol for the shared remote focus pointer.
//
// Actions are parameterized by an optional target player, but every remote
// scoring/animation command acts on whichever player is focused remotely.
// The focus pointer is a shared mutable remote value with no lock, mutated
// by uncoordinated concurrent button presses, so "restore to what I
// remember" is unsafe whenever the memory is a local captured before an
// await. The restore step therefore re-reads the operator's intended focus
// from the host variable store at the last possible moment.
//
// The remaining race is accepted: when two focus-sensitive actions overlap,
// the pointer ends up wherever the later restore put it (last-write-wins,
// no ordering guarantee). Client-side locking is deliberately absent; the
// coordinator offers no compare-and-swap primitive to build on.

use tracing::{debug, warn};

use crate::coordinator::Coordinator;
use crate::error::SyncError;
use crate::model::{IdentityScheme, Player, PlayerKey};
use crate::projection::VariableStore;

/// Ephemeral context around one focus-sensitive action.
///
/// Construct with [`FocusContext::begin`] (step 1: borrow), perform the
/// remote operation, then call [`FocusContext::finish`] (step 3: restore).
/// When the action has no explicit target the context is a pass-through:
/// no borrow, no restore.
pub struct FocusContext<'a, C: Coordinator + ?Sized> {
    coordinator: &'a C,
    vars: &'a VariableStore,
    scheme: IdentityScheme,
    /// The confirmed player when a target was borrowed; `None` when the
    /// action operates on whatever is currently focused.
    active: Option<Player>,
}

impl<'a, C: Coordinator + ?Sized> FocusContext<'a, C> {
    /// Step 1: if `target` names an explicit player, switch the remote focus
    /// pointer to it and capture the confirmed player. The returned identity
    /// is the remote's answer, not the request echoed back; an invalid key
    /// can come back as a different player depending on the deployment.
    pub async fn begin(
        coordinator: &'a C,
        vars: &'a VariableStore,
        scheme: IdentityScheme,
        target: Option<PlayerKey>,
    ) -> Result<FocusContext<'a, C>, SyncError> {
        let active = match target {
            Some(key) => {
                let player = coordinator.set_focused_player(&key).await?;
                debug!(requested = %key, confirmed = %player.name, "focus borrowed");
                Some(player)
            }
            None => None,
        };
        Ok(FocusContext {
            coordinator,
            vars,
            scheme,
            active,
        })
    }

    /// The borrowed player, when an explicit target was given.
    pub fn active(&self) -> Option<&Player> {
        self.active.as_ref()
    }

    /// Guard rule shared by score/throw/animation mutations: a player who
    /// has already finished at or past the current hole must not be mutated
    /// (protects a completed card from buttons mashed after advancing
    /// holes). Resolves the remote focus when no player was borrowed.
    pub async fn mutation_allowed(&self) -> Result<bool, SyncError> {
        let hole = self.coordinator.current_hole().await?;
        let holes_finished = match &self.active {
            Some(player) => player.holes_finished,
            None => self.coordinator.focused_player().await?.holes_finished,
        };
        if holes_finished > hole {
            debug!(holes_finished, hole, "mutation skipped: player already past current hole");
            return Ok(false);
        }
        Ok(true)
    }

    /// Step 3: restore the focus pointer to the operator's intended focus.
    ///
    /// The intended focus is re-read from the variable store here, not taken
    /// from any value captured at borrow time: a concurrent "change focused
    /// player" may have landed while the primary operation was in flight,
    /// and the store is the only state guaranteed to reflect it. A failed
    /// restore is logged, never propagated; the primary operation's effect
    /// is already committed remotely and must not be reported as failed.
    pub async fn finish(self) {
        let Some(active) = self.active else {
            return;
        };
        let Some(intended) = self.vars.intended_focus(self.scheme) else {
            return;
        };
        let needs_restore = match active.key(self.scheme) {
            Some(key) => key != intended,
            // The remote did not report an identity; restore to be safe.
            None => true,
        };
        if !needs_restore {
            return;
        }
        match self.coordinator.set_focused_player(&intended).await {
            Ok(player) => {
                debug!(restored = %player.name, "focus restored to operator selection");
            }
            Err(err) => {
                warn!(error = %err, intended = %intended, "failed to restore focused player");
            }
        }
    }
}
