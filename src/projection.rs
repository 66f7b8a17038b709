// Local projection of remote state, plus the host variable store.
//
// The projection is a pure cache with a single-writer discipline: only
// coordinator read responses and push-channel messages mutate it (both
// applied from the central event loop). Action tasks read it to populate
// choice lists; they never write it.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::model::{Choice, IdentityScheme, Player, PlayerKey, RoundState};

// ---------------------------------------------------------------------------
// Variable names
// ---------------------------------------------------------------------------

/// The durable handoff slot for the operator's intended focus. Written by
/// the explicit "change focused player" action and re-read at restore time,
/// never cached across awaits.
pub const VAR_INTENDED_FOCUS: &str = "foc_player_id";
pub const VAR_PLAYER_NAME: &str = "player_name";
pub const VAR_ROUND: &str = "round";
pub const VAR_HOLE: &str = "hole";
pub const VAR_HOLE_FINISHED_ALERT: &str = "hole_finished_alert";

/// Variable name for the player in card slot `index` (zero-based): `p1`..`pN`.
pub fn slot_var(index: usize) -> String {
    format!("p{}", index + 1)
}

// ---------------------------------------------------------------------------
// VariableStore
// ---------------------------------------------------------------------------

/// A published variable change, forwarded to the host/UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableUpdate {
    pub name: String,
    pub value: String,
}

/// The host's variable table.
///
/// This is the one piece of state guaranteed to reflect the latest explicit
/// focus change, which is why the restore step of the focus protocol reads
/// it back instead of trusting a value captured before an await. Writes are
/// visible to every in-flight task immediately; the lock is only ever held
/// across a map access, never across an await.
pub struct VariableStore {
    vars: Mutex<HashMap<String, String>>,
    notify: mpsc::UnboundedSender<VariableUpdate>,
}

impl VariableStore {
    /// Create a store that reports every write on `notify`. A dropped
    /// receiver is tolerated; the store keeps working without an observer.
    pub fn new(notify: mpsc::UnboundedSender<VariableUpdate>) -> Self {
        VariableStore {
            vars: Mutex::new(HashMap::new()),
            notify,
        }
    }

    pub fn set(&self, name: &str, value: &str) {
        self.vars
            .lock()
            .expect("variable store lock poisoned")
            .insert(name.to_string(), value.to_string());
        let _ = self.notify.send(VariableUpdate {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.vars
            .lock()
            .expect("variable store lock poisoned")
            .get(name)
            .cloned()
    }

    /// The operator's last explicitly chosen focus, if any.
    pub fn intended_focus(&self, scheme: IdentityScheme) -> Option<PlayerKey> {
        self.get(VAR_INTENDED_FOCUS)
            .and_then(|raw| PlayerKey::parse(&raw, scheme))
    }

    pub fn set_intended_focus(&self, key: &PlayerKey) {
        self.set(VAR_INTENDED_FOCUS, &key.to_string());
    }
}

// ---------------------------------------------------------------------------
// LocalProjection
// ---------------------------------------------------------------------------

/// In-memory cache of players, divisions, rounds, hole, and focus index.
///
/// Roster and division lists are always replaced in full on every refresh so
/// the cache never accumulates entries the remote roster has dropped. On
/// channel loss the last-known values are retained: a stale-but-plausible
/// value beats a placeholder on a live broadcast.
#[derive(Debug, Default)]
pub struct LocalProjection {
    pub round: RoundState,
    /// Choice list over the whole roster, leading "None" sentinel first.
    pub players: Vec<Choice>,
    /// Division names, leading "None" sentinel first.
    pub divisions: Vec<Choice>,
    /// Choice list over the selected card slots, leading "None" first.
    pub focused_players: Vec<Choice>,
}

impl LocalProjection {
    pub fn new() -> Self {
        LocalProjection {
            round: RoundState::default(),
            players: vec![Choice::none()],
            divisions: vec![Choice::none()],
            focused_players: vec![Choice::none()],
        }
    }

    /// Replace the roster choice list wholesale from a read response.
    /// Identities are expected to be unique within one snapshot; a duplicate
    /// points at a coordinator bug and is logged, not repaired.
    pub fn replace_roster(&mut self, players: &[Player], scheme: IdentityScheme) {
        let mut seen = HashSet::new();
        self.players.clear();
        self.players.push(Choice::none());
        for player in players {
            let key = player.key(scheme);
            if let Some(key) = &key {
                if !seen.insert(key.clone()) {
                    warn!(%key, "duplicate player identity in roster snapshot");
                }
            }
            self.players.push(Choice {
                key,
                label: player.name.clone(),
            });
        }
    }

    /// Replace the division choice list wholesale from a read response.
    pub fn replace_divisions(&mut self, divisions: &[String]) {
        self.divisions.clear();
        self.divisions.push(Choice::none());
        for name in divisions {
            self.divisions.push(Choice {
                key: None,
                label: name.clone(),
            });
        }
    }

    /// Replace the selected-card choice list wholesale and republish each
    /// slot's display name as `p1`..`pN`.
    pub fn replace_focused_players(
        &mut self,
        players: &[Player],
        scheme: IdentityScheme,
        vars: &VariableStore,
    ) {
        self.focused_players.clear();
        self.focused_players.push(Choice::none());
        for (index, player) in players.iter().enumerate() {
            self.focused_players.push(Choice {
                key: player.key(scheme),
                label: player.name.clone(),
            });
            vars.set(&slot_var(index), &player.name);
        }
        debug!(slots = players.len(), "selected card replaced");
    }

    /// Apply a pushed scalar `hole` value. The payload is not type-validated
    /// on the wire, so a non-numeric value leaves the cached hole untouched.
    pub fn apply_hole_value(&mut self, value: &str) {
        if let Ok(hole) = value.trim().parse::<u32>() {
            self.round.hole = hole;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (VariableStore, mpsc::UnboundedReceiver<VariableUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (VariableStore::new(tx), rx)
    }

    fn player(id: &str, index: u32, name: &str, holes_finished: u32) -> Player {
        Player {
            id: Some(id.to_string()),
            index: Some(index),
            name: name.to_string(),
            image_url: None,
            focused: false,
            holes_finished,
        }
    }

    #[test]
    fn set_and_get_round_trip() {
        let (vars, mut rx) = store();
        vars.set(VAR_HOLE, "7");
        assert_eq!(vars.get(VAR_HOLE), Some("7".to_string()));
        assert_eq!(
            rx.try_recv().unwrap(),
            VariableUpdate {
                name: VAR_HOLE.into(),
                value: "7".into()
            }
        );
    }

    #[test]
    fn intended_focus_reads_latest_write() {
        let (vars, _rx) = store();
        assert_eq!(vars.intended_focus(IdentityScheme::Id), None);
        vars.set_intended_focus(&PlayerKey::Id("a".into()));
        vars.set_intended_focus(&PlayerKey::Id("b".into()));
        assert_eq!(
            vars.intended_focus(IdentityScheme::Id),
            Some(PlayerKey::Id("b".into()))
        );
    }

    #[test]
    fn store_survives_dropped_receiver() {
        let (vars, rx) = store();
        drop(rx);
        vars.set(VAR_ROUND, "2");
        assert_eq!(vars.get(VAR_ROUND), Some("2".to_string()));
    }

    #[test]
    fn roster_replaced_wholesale() {
        let mut projection = LocalProjection::new();
        projection.replace_roster(
            &[player("a", 0, "Alice", 0), player("b", 1, "Bob", 0)],
            IdentityScheme::Id,
        );
        assert_eq!(projection.players.len(), 3);
        assert_eq!(projection.players[0], Choice::none());
        assert_eq!(projection.players[2].label, "Bob");

        // A shrinking roster must not leave stale entries behind.
        projection.replace_roster(&[player("c", 0, "Cara", 0)], IdentityScheme::Id);
        assert_eq!(projection.players.len(), 2);
        assert_eq!(projection.players[1].key, Some(PlayerKey::Id("c".into())));
    }

    #[test]
    fn duplicate_identity_snapshot_is_kept_whole() {
        let mut projection = LocalProjection::new();
        // A coordinator bug can report the same identity twice; the snapshot
        // is still replaced wholesale with both entries present.
        projection.replace_roster(
            &[
                player("a", 0, "Alice", 0),
                player("a", 1, "Alicia", 0),
                player("b", 2, "Bob", 0),
            ],
            IdentityScheme::Id,
        );
        assert_eq!(projection.players.len(), 4);
        assert_eq!(projection.players[1].key, Some(PlayerKey::Id("a".into())));
        assert_eq!(projection.players[2].key, Some(PlayerKey::Id("a".into())));
        assert_eq!(projection.players[2].label, "Alicia");
    }

    #[test]
    fn focused_players_republish_slot_variables() {
        let (vars, _rx) = store();
        let mut projection = LocalProjection::new();
        projection.replace_focused_players(
            &[player("a", 0, "Alice", 3), player("b", 1, "Bob", 2)],
            IdentityScheme::Id,
            &vars,
        );
        assert_eq!(projection.focused_players[1].label, "Alice");
        assert_eq!(
            projection.focused_players[1].key,
            Some(PlayerKey::Id("a".into()))
        );
        assert_eq!(vars.get("p1"), Some("Alice".to_string()));
        assert_eq!(vars.get("p2"), Some("Bob".to_string()));
    }

    #[test]
    fn non_numeric_hole_push_leaves_cache_untouched() {
        let mut projection = LocalProjection::new();
        projection.apply_hole_value("7");
        assert_eq!(projection.round.hole, 7);
        projection.apply_hole_value("not-a-hole");
        assert_eq!(projection.round.hole, 7);
    }
}
