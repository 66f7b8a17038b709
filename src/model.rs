// Wire types shared by the coordinator client, the projection, and the
// push channels.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Player identity
// ---------------------------------------------------------------------------

/// How a deployment identifies players: a stable opaque id, or a positional
/// index into the selected card. The two schemes are not interchangeable
/// within one session, so the scheme is fixed once at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityScheme {
    Index,
    Id,
}

/// The identity of one player under the deployment's scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlayerKey {
    Index(u32),
    Id(String),
}

impl PlayerKey {
    /// Parse a key from its string form (the encoding used for the variable
    /// store and for URL path segments), under the given scheme.
    pub fn parse(raw: &str, scheme: IdentityScheme) -> Option<PlayerKey> {
        let raw = raw.trim();
        if raw.is_empty() || raw == "none" {
            return None;
        }
        match scheme {
            IdentityScheme::Index => raw.parse::<u32>().ok().map(PlayerKey::Index),
            IdentityScheme::Id => Some(PlayerKey::Id(raw.to_string())),
        }
    }

    pub fn scheme(&self) -> IdentityScheme {
        match self {
            PlayerKey::Index(_) => IdentityScheme::Index,
            PlayerKey::Id(_) => IdentityScheme::Id,
        }
    }
}

impl fmt::Display for PlayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerKey::Index(i) => write!(f, "{i}"),
            PlayerKey::Id(id) => write!(f, "{id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// One player as reported by the coordinator.
///
/// Depending on the deployment either `id` or `index` carries the identity;
/// [`Player::key`] resolves whichever the configured scheme uses. Players are
/// always replaced wholesale from a single source (a roster read or a
/// `selected_players` push), never merged field-by-field from two sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub index: Option<u32>,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub focused: bool,
    #[serde(default)]
    pub holes_finished: u32,
}

impl Player {
    /// The identity key of this player under the deployment's scheme, if the
    /// corresponding field was present on the wire.
    pub fn key(&self, scheme: IdentityScheme) -> Option<PlayerKey> {
        match scheme {
            IdentityScheme::Index => self.index.map(PlayerKey::Index),
            IdentityScheme::Id => self.id.clone().map(PlayerKey::Id),
        }
    }
}

// ---------------------------------------------------------------------------
// Rounds and holes
// ---------------------------------------------------------------------------

/// Remote-authoritative round and hole counters. Local mutations are
/// proposals, not commits, until confirmed by a subsequent read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundState {
    /// Zero-based current round.
    pub round: u32,
    /// Total number of rounds in the event.
    pub rounds_total: u32,
    /// Zero-based current hole.
    pub hole: u32,
}

// ---------------------------------------------------------------------------
// Choice lists
// ---------------------------------------------------------------------------

/// One entry in an operator-facing choice list (player or division
/// dropdowns). `key: None` is the leading "None" sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub key: Option<PlayerKey>,
    pub label: String,
}

impl Choice {
    pub fn none() -> Self {
        Choice {
            key: None,
            label: "None".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_key_respects_scheme() {
        assert_eq!(
            PlayerKey::parse("3", IdentityScheme::Index),
            Some(PlayerKey::Index(3))
        );
        assert_eq!(
            PlayerKey::parse("3", IdentityScheme::Id),
            Some(PlayerKey::Id("3".into()))
        );
        assert_eq!(PlayerKey::parse("abc", IdentityScheme::Index), None);
        assert_eq!(PlayerKey::parse("none", IdentityScheme::Id), None);
        assert_eq!(PlayerKey::parse("", IdentityScheme::Id), None);
    }

    #[test]
    fn display_round_trips_through_parse() {
        let key = PlayerKey::Id("a57b4ed6".into());
        assert_eq!(
            PlayerKey::parse(&key.to_string(), IdentityScheme::Id),
            Some(key)
        );
        let key = PlayerKey::Index(2);
        assert_eq!(
            PlayerKey::parse(&key.to_string(), IdentityScheme::Index),
            Some(key)
        );
    }

    #[test]
    fn player_key_follows_configured_scheme() {
        let player = Player {
            id: Some("a".into()),
            index: Some(0),
            name: "Alice".into(),
            image_url: None,
            focused: false,
            holes_finished: 3,
        };
        assert_eq!(
            player.key(IdentityScheme::Id),
            Some(PlayerKey::Id("a".into()))
        );
        assert_eq!(
            player.key(IdentityScheme::Index),
            Some(PlayerKey::Index(0))
        );
    }

    #[test]
    fn player_deserializes_with_missing_optionals() {
        let p: Player =
            serde_json::from_str(r#"{"name":"Bob","holes_finished":2,"index":1}"#).unwrap();
        assert_eq!(p.name, "Bob");
        assert_eq!(p.holes_finished, 2);
        assert_eq!(p.id, None);
        assert!(!p.focused);
    }
}
