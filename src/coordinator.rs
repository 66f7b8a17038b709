// HTTP client for the remote scoring authority.
//
// One async method per remote capability, each returning a strongly-typed
// result or failing with a classified `SyncError`. No built-in retry:
// score-mutating commands are not idempotent, so retry decisions belong to
// the caller.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::CoordinatorConfig;
use crate::error::SyncError;
use crate::model::{Player, PlayerKey};

// ---------------------------------------------------------------------------
// Coordinator trait
// ---------------------------------------------------------------------------

/// The remote capabilities of the scoring coordinator.
///
/// The trait exists so the focus protocol and the action layer can run
/// against an in-memory fake in tests; production code uses
/// [`CoordinatorClient`].
#[async_trait]
pub trait Coordinator: Send + Sync {
    // Reads.
    async fn current_round(&self) -> Result<u32, SyncError>;
    async fn total_rounds(&self) -> Result<u32, SyncError>;
    async fn current_hole(&self) -> Result<u32, SyncError>;
    async fn divisions(&self) -> Result<Vec<String>, SyncError>;
    /// The selected card: the players currently on the broadcast.
    async fn chosen_players(&self) -> Result<Vec<Player>, SyncError>;
    async fn focused_player(&self) -> Result<Player, SyncError>;

    // Writes. `set_focused_player` is the only write whose success response
    // carries data: the player that is now focused. The remote side is the
    // sole source of truth for whether the switch took effect, so callers
    // must check the returned identity rather than assume it equals the
    // requested one.
    async fn set_focused_player(&self, key: &PlayerKey) -> Result<Player, SyncError>;
    async fn increase_score(&self) -> Result<(), SyncError>;
    async fn revert_score(&self) -> Result<(), SyncError>;
    async fn increase_throw(&self) -> Result<(), SyncError>;
    async fn revert_throw(&self) -> Result<(), SyncError>;
    async fn play_animation(&self) -> Result<(), SyncError>;
    async fn play_ob_animation(&self) -> Result<(), SyncError>;
    async fn set_hole_info(&self) -> Result<(), SyncError>;
    async fn update_leaderboard(&self) -> Result<(), SyncError>;
    async fn show_other_leaderboard(&self, division: u32) -> Result<(), SyncError>;
}

// ---------------------------------------------------------------------------
// CoordinatorClient
// ---------------------------------------------------------------------------

/// reqwest-backed [`Coordinator`] implementation.
pub struct CoordinatorClient {
    http: reqwest::Client,
    base_url: String,
    roster_path: String,
}

impl CoordinatorClient {
    /// Build a client from the coordinator section of the config. Every
    /// request carries the configured bounded timeout; a timeout surfaces as
    /// `RemoteUnavailable`.
    pub fn from_config(config: &CoordinatorConfig) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;
        Ok(CoordinatorClient {
            http,
            base_url: config.http_base(),
            roster_path: config.roster_path.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "GET");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;
        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| SyncError::ProtocolMismatch {
                endpoint: path.to_string(),
                detail: e.to_string(),
            })
    }

    async fn post(&self, path: &str) -> Result<(), SyncError> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "POST");
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;
        match classify_status(response.status()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "POST");
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| SyncError::RemoteUnavailable(e.to_string()))?;
        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| SyncError::ProtocolMismatch {
                endpoint: path.to_string(),
                detail: e.to_string(),
            })
    }
}

/// Map a non-success status to its classified error. 424 means the remote
/// session has not been started yet and is expected, not fatal.
fn classify_status(status: StatusCode) -> Option<SyncError> {
    if status.is_success() {
        None
    } else if status == StatusCode::FAILED_DEPENDENCY {
        Some(SyncError::CoordinatorUninitialized)
    } else {
        Some(SyncError::RemoteUnavailable(format!(
            "unexpected status {status}"
        )))
    }
}

#[async_trait]
impl Coordinator for CoordinatorClient {
    async fn current_round(&self) -> Result<u32, SyncError> {
        self.get_json("/round").await
    }

    async fn total_rounds(&self) -> Result<u32, SyncError> {
        self.get_json("/rounds").await
    }

    async fn current_hole(&self) -> Result<u32, SyncError> {
        self.get_json("/hole/current").await
    }

    async fn divisions(&self) -> Result<Vec<String>, SyncError> {
        self.get_json("/divisions").await
    }

    async fn chosen_players(&self) -> Result<Vec<Player>, SyncError> {
        self.get_json(&self.roster_path).await
    }

    async fn focused_player(&self) -> Result<Player, SyncError> {
        self.get_json("/player/focused").await
    }

    async fn set_focused_player(&self, key: &PlayerKey) -> Result<Player, SyncError> {
        self.post_json(&format!("/player/focused/set/{key}")).await
    }

    async fn increase_score(&self) -> Result<(), SyncError> {
        self.post("/vmix/player/focused/score/increase").await
    }

    async fn revert_score(&self) -> Result<(), SyncError> {
        self.post("/vmix/player/focused/score/revert").await
    }

    async fn increase_throw(&self) -> Result<(), SyncError> {
        self.post("/vmix/player/focused/throw/increase").await
    }

    async fn revert_throw(&self) -> Result<(), SyncError> {
        self.post("/vmix/player/focused/revert-throw").await
    }

    async fn play_animation(&self) -> Result<(), SyncError> {
        self.post("/vmix/player/focused/animation/play").await
    }

    async fn play_ob_animation(&self) -> Result<(), SyncError> {
        self.post("/vmix/player/focused/animation/play/ob").await
    }

    async fn set_hole_info(&self) -> Result<(), SyncError> {
        self.post("/vmix/hole-info/set").await
    }

    async fn update_leaderboard(&self) -> Result<(), SyncError> {
        self.post("/vmix/leaderboard/update").await
    }

    async fn show_other_leaderboard(&self, division: u32) -> Result<(), SyncError> {
        self.post(&format!("/vmix/leaderboard/{division}/update"))
            .await
    }
}
