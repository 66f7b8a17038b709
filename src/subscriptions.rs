// Push-channel subscriptions from the coordinator.
//
// Each subscription is an independent, long-lived WebSocket channel feeding
// a named variable (and, for the selected-players channel, the projection's
// card slots). Per-channel lifecycle: Connecting -> Open -> Closed|Errored.
// There is no automatic reconnect loop; the channels are a convenience cache
// refresh, not a correctness-critical path, so recovery is an operator-
// triggered reload. On loss the projection keeps its last-known values.

use std::collections::HashMap;

use futures_util::stream::Stream;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::model::Player;

/// Channel name carrying the selected card. Frames on this channel are
/// parsed as players; every other channel is a scalar feed.
pub const SELECTED_PLAYERS_CHANNEL: &str = "selected_players";

// ---------------------------------------------------------------------------
// Subscription description
// ---------------------------------------------------------------------------

/// A named live channel. `subpath` selects which field of an inbound JSON
/// envelope feeds the variable; an empty subpath feeds the raw payload
/// verbatim (the alert/string channels).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub url: String,
    pub variable_name: String,
    pub subpath: String,
}

/// The three channels a coordinator deployment serves by default.
pub fn default_subscriptions(host: &str, port: u16) -> Vec<Subscription> {
    vec![
        Subscription {
            url: format!("ws://{host}:{port}/ws/players/selected/watch"),
            variable_name: SELECTED_PLAYERS_CHANNEL.to_string(),
            subpath: "players".to_string(),
        },
        Subscription {
            url: format!("ws://{host}:{port}/ws/hole/watch"),
            variable_name: "hole".to_string(),
            subpath: "hole".to_string(),
        },
        Subscription {
            url: format!("ws://{host}:{port}/ws/hole-finished-alert/watch"),
            variable_name: "hole_finished_alert".to_string(),
            subpath: String::new(),
        },
    ]
}

// ---------------------------------------------------------------------------
// Events and frame demultiplexing
// ---------------------------------------------------------------------------

/// Connection lifecycle of one push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
    Errored,
}

/// One parsed projection update extracted from an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PushUpdate {
    /// The selected card changed; slots are replaced positionally.
    SelectedPlayers(Vec<Player>),
    /// A named variable is replaced verbatim. No type validation: the value
    /// may be a stringified number or arbitrary text.
    Variable { name: String, value: String },
}

/// Event emitted by a channel task to the central event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Opened {
        channel: String,
    },
    Update {
        channel: String,
        updates: Vec<PushUpdate>,
    },
    Closed {
        channel: String,
    },
    Errored {
        channel: String,
        error: String,
    },
}

/// Parse one inbound frame per the subscription's declared shape.
///
/// A malformed frame is a `ProtocolMismatch` for that frame only: the caller
/// logs it and keeps the channel open, and no projection mutation happens.
pub fn demux_frame(sub: &Subscription, raw: &str) -> Result<Vec<PushUpdate>, SyncError> {
    if sub.variable_name == SELECTED_PLAYERS_CHANNEL {
        let players = parse_selected_players(sub, raw)?;
        return Ok(vec![
            PushUpdate::SelectedPlayers(players),
            PushUpdate::Variable {
                name: sub.variable_name.clone(),
                value: raw.to_string(),
            },
        ]);
    }

    // Raw channel: the whole payload feeds the variable untouched.
    if sub.subpath.is_empty() {
        return Ok(vec![PushUpdate::Variable {
            name: sub.variable_name.clone(),
            value: raw.to_string(),
        }]);
    }

    // Scalar channel: the subpath field of the JSON envelope.
    let envelope: Value = serde_json::from_str(raw).map_err(|e| SyncError::ProtocolMismatch {
        endpoint: sub.variable_name.clone(),
        detail: e.to_string(),
    })?;
    let field = envelope
        .get(&sub.subpath)
        .ok_or_else(|| SyncError::ProtocolMismatch {
            endpoint: sub.variable_name.clone(),
            detail: format!("missing field `{}`", sub.subpath),
        })?;
    let value = match field {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Ok(vec![PushUpdate::Variable {
        name: sub.variable_name.clone(),
        value,
    }])
}

/// The selected-players payload is either a bare array of players or an
/// envelope whose `subpath` field holds the array.
fn parse_selected_players(sub: &Subscription, raw: &str) -> Result<Vec<Player>, SyncError> {
    let envelope: Value = serde_json::from_str(raw).map_err(|e| SyncError::ProtocolMismatch {
        endpoint: sub.variable_name.clone(),
        detail: e.to_string(),
    })?;
    let array = if envelope.is_array() {
        envelope
    } else if !sub.subpath.is_empty() {
        envelope
            .get(&sub.subpath)
            .cloned()
            .ok_or_else(|| SyncError::ProtocolMismatch {
                endpoint: sub.variable_name.clone(),
                detail: format!("missing field `{}`", sub.subpath),
            })?
    } else {
        return Err(SyncError::ProtocolMismatch {
            endpoint: sub.variable_name.clone(),
            detail: "expected a player array".to_string(),
        });
    };
    serde_json::from_value(array).map_err(|e| SyncError::ProtocolMismatch {
        endpoint: sub.variable_name.clone(),
        detail: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Frame pump
// ---------------------------------------------------------------------------

/// Why a frame pump stopped.
#[derive(Debug, PartialEq, Eq)]
pub enum PumpEnd {
    /// The peer closed, or the stream drained.
    Closed,
    /// The transport errored.
    Errored(String),
}

/// Pump frames from a WebSocket stream into [`ChannelEvent::Update`]s.
///
/// Generic over the stream type so the demux path tests with in-memory
/// streams and no sockets. A malformed frame is logged and skipped; the
/// channel stays open. Returns how the stream ended, or `Err(())` when the
/// event receiver is gone and the caller should stop.
pub async fn pump_frames<St>(
    sub: &Subscription,
    mut stream: St,
    tx: &mpsc::Sender<ChannelEvent>,
) -> Result<PumpEnd, ()>
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                debug!(channel = %sub.variable_name, len = text.len(), "frame received");
                match demux_frame(sub, &text) {
                    Ok(updates) => {
                        let event = ChannelEvent::Update {
                            channel: sub.variable_name.clone(),
                            updates,
                        };
                        if tx.send(event).await.is_err() {
                            return Err(());
                        }
                    }
                    Err(err) => {
                        warn!(channel = %sub.variable_name, error = %err, "dropping malformed frame");
                    }
                }
            }
            Ok(Message::Close(_)) => {
                info!(channel = %sub.variable_name, "peer sent close frame");
                return Ok(PumpEnd::Closed);
            }
            Err(e) => {
                warn!(channel = %sub.variable_name, error = %e, "transport error");
                return Ok(PumpEnd::Errored(e.to_string()));
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }
    Ok(PumpEnd::Closed)
}

/// Connect one channel and pump it until it closes or errors. Lifecycle
/// transitions are reported on `tx`; the task ends with the channel.
async fn run_channel(sub: Subscription, tx: mpsc::Sender<ChannelEvent>) {
    info!(channel = %sub.variable_name, url = %sub.url, "connecting push channel");
    match connect_async(sub.url.as_str()).await {
        Ok((ws, _response)) => {
            if tx
                .send(ChannelEvent::Opened {
                    channel: sub.variable_name.clone(),
                })
                .await
                .is_err()
            {
                return;
            }
            let (_write, read) = ws.split();
            let end = match pump_frames(&sub, read, &tx).await {
                Ok(end) => end,
                Err(()) => return,
            };
            let event = match end {
                PumpEnd::Closed => ChannelEvent::Closed {
                    channel: sub.variable_name.clone(),
                },
                PumpEnd::Errored(error) => ChannelEvent::Errored {
                    channel: sub.variable_name.clone(),
                    error,
                },
            };
            let _ = tx.send(event).await;
        }
        Err(e) => {
            warn!(channel = %sub.variable_name, error = %e, "failed to connect push channel");
            let _ = tx
                .send(ChannelEvent::Errored {
                    channel: sub.variable_name.clone(),
                    error: e.to_string(),
                })
                .await;
        }
    }
}

// ---------------------------------------------------------------------------
// SubscriptionManager
// ---------------------------------------------------------------------------

/// Owns the per-channel tasks. One task per subscription; `reload` tears a
/// channel down completely before reopening it.
pub struct SubscriptionManager {
    subs: Vec<Subscription>,
    tx: mpsc::Sender<ChannelEvent>,
    handles: HashMap<String, JoinHandle<()>>,
}

impl SubscriptionManager {
    pub fn new(subs: Vec<Subscription>, tx: mpsc::Sender<ChannelEvent>) -> Self {
        SubscriptionManager {
            subs,
            tx,
            handles: HashMap::new(),
        }
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.subs.iter().map(|s| s.variable_name.clone()).collect()
    }

    /// Spawn every configured channel.
    pub fn start_all(&mut self) {
        let subs = self.subs.clone();
        for sub in subs {
            self.spawn(sub);
        }
    }

    /// Unconditionally tear down and reopen one channel. The old task is
    /// aborted and awaited first, so no further messages from the old
    /// connection can be delivered once the new one opens. Returns `false`
    /// for an unknown channel name.
    pub async fn reload(&mut self, name: &str) -> bool {
        let Some(sub) = self
            .subs
            .iter()
            .find(|s| s.variable_name == name)
            .cloned()
        else {
            warn!(channel = name, "reload requested for unknown channel");
            return false;
        };
        if let Some(handle) = self.handles.remove(name) {
            handle.abort();
            let _ = handle.await;
        }
        info!(channel = name, "reloading push channel");
        self.spawn(sub);
        true
    }

    /// Abort every channel task.
    pub fn shutdown(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }

    fn spawn(&mut self, sub: Subscription) {
        let tx = self.tx.clone();
        let name = sub.variable_name.clone();
        let handle = tokio::spawn(run_channel(sub, tx));
        self.handles.insert(name, handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn selected_sub() -> Subscription {
        Subscription {
            url: "ws://coordinator:8000/ws/players/selected/watch".into(),
            variable_name: SELECTED_PLAYERS_CHANNEL.into(),
            subpath: "players".into(),
        }
    }

    fn hole_sub() -> Subscription {
        Subscription {
            url: "ws://coordinator:8000/ws/hole/watch".into(),
            variable_name: "hole".into(),
            subpath: "hole".into(),
        }
    }

    fn alert_sub() -> Subscription {
        Subscription {
            url: "ws://coordinator:8000/ws/hole-finished-alert/watch".into(),
            variable_name: "hole_finished_alert".into(),
            subpath: String::new(),
        }
    }

    /// Helper: create a stream of Message results from a vec.
    fn mock_stream(
        messages: Vec<Result<Message, WsError>>,
    ) -> impl Stream<Item = Result<Message, WsError>> + Unpin {
        stream::iter(messages)
    }

    #[test]
    fn selected_players_frame_parses_players_and_raw_variable() {
        let raw = r#"[{"id":"a","name":"Alice","holes_finished":3,"index":0},
                      {"id":"b","name":"Bob","holes_finished":2,"index":1}]"#;
        let updates = demux_frame(&selected_sub(), raw).unwrap();
        assert_eq!(updates.len(), 2);
        match &updates[0] {
            PushUpdate::SelectedPlayers(players) => {
                assert_eq!(players.len(), 2);
                assert_eq!(players[0].name, "Alice");
                assert_eq!(players[0].holes_finished, 3);
            }
            other => panic!("unexpected update: {other:?}"),
        }
        assert_eq!(
            updates[1],
            PushUpdate::Variable {
                name: SELECTED_PLAYERS_CHANNEL.into(),
                value: raw.into()
            }
        );
    }

    #[test]
    fn selected_players_envelope_uses_subpath() {
        let raw = r#"{"players":[{"id":"a","name":"Alice","holes_finished":0}]}"#;
        let updates = demux_frame(&selected_sub(), raw).unwrap();
        match &updates[0] {
            PushUpdate::SelectedPlayers(players) => assert_eq!(players[0].name, "Alice"),
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[test]
    fn scalar_frame_extracts_subpath_field() {
        let updates = demux_frame(&hole_sub(), r#"{"hole":7}"#).unwrap();
        assert_eq!(
            updates,
            vec![PushUpdate::Variable {
                name: "hole".into(),
                value: "7".into()
            }]
        );
    }

    #[test]
    fn scalar_string_field_passes_verbatim() {
        let updates = demux_frame(&hole_sub(), r#"{"hole":"7"}"#).unwrap();
        assert_eq!(
            updates,
            vec![PushUpdate::Variable {
                name: "hole".into(),
                value: "7".into()
            }]
        );
    }

    #[test]
    fn empty_subpath_feeds_raw_payload() {
        let updates = demux_frame(&alert_sub(), "group 3 finished hole 12").unwrap();
        assert_eq!(
            updates,
            vec![PushUpdate::Variable {
                name: "hole_finished_alert".into(),
                value: "group 3 finished hole 12".into()
            }]
        );
    }

    #[test]
    fn malformed_frames_are_protocol_mismatches() {
        assert!(matches!(
            demux_frame(&hole_sub(), "not json"),
            Err(SyncError::ProtocolMismatch { .. })
        ));
        assert!(matches!(
            demux_frame(&hole_sub(), r#"{"wrong":"field"}"#),
            Err(SyncError::ProtocolMismatch { .. })
        ));
        assert!(matches!(
            demux_frame(&selected_sub(), r#"{"players":"not an array"}"#),
            Err(SyncError::ProtocolMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn pump_forwards_updates_in_order() {
        let (tx, mut rx) = mpsc::channel(64);
        let messages = vec![
            Ok(Message::Text(r#"{"hole":3}"#.into())),
            Ok(Message::Text(r#"{"hole":4}"#.into())),
        ];

        let end = pump_frames(&hole_sub(), mock_stream(messages), &tx)
            .await
            .unwrap();
        assert_eq!(end, PumpEnd::Closed);

        for expected in ["3", "4"] {
            match rx.recv().await.unwrap() {
                ChannelEvent::Update { channel, updates } => {
                    assert_eq!(channel, "hole");
                    assert_eq!(
                        updates,
                        vec![PushUpdate::Variable {
                            name: "hole".into(),
                            value: expected.into()
                        }]
                    );
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped_and_channel_stays_open() {
        let (tx, mut rx) = mpsc::channel(64);
        let messages = vec![
            Ok(Message::Text("garbage".into())),
            Ok(Message::Text(r#"{"hole":5}"#.into())),
        ];

        let end = pump_frames(&hole_sub(), mock_stream(messages), &tx)
            .await
            .unwrap();
        assert_eq!(end, PumpEnd::Closed);

        // Only the well-formed frame produced an update.
        match rx.recv().await.unwrap() {
            ChannelEvent::Update { updates, .. } => {
                assert_eq!(
                    updates,
                    vec![PushUpdate::Variable {
                        name: "hole".into(),
                        value: "5".into()
                    }]
                );
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_frame_ends_pump_before_later_messages() {
        let (tx, mut rx) = mpsc::channel(64);
        let messages = vec![
            Ok(Message::Close(None)),
            Ok(Message::Text(r#"{"hole":9}"#.into())),
        ];

        let end = pump_frames(&hole_sub(), mock_stream(messages), &tx)
            .await
            .unwrap();
        assert_eq!(end, PumpEnd::Closed);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn transport_error_reports_errored() {
        let (tx, _rx) = mpsc::channel(64);
        let messages = vec![Err(WsError::ConnectionClosed)];

        let end = pump_frames(&hole_sub(), mock_stream(messages), &tx)
            .await
            .unwrap();
        assert!(matches!(end, PumpEnd::Errored(_)));
    }

    #[tokio::test]
    async fn dropped_receiver_stops_pump() {
        let (tx, rx) = mpsc::channel(64);
        drop(rx);
        let messages = vec![Ok(Message::Text(r#"{"hole":1}"#.into()))];

        let result = pump_frames(&hole_sub(), mock_stream(messages), &tx).await;
        assert!(result.is_err());
    }

    #[test]
    fn default_subscriptions_cover_the_three_channels() {
        let subs = default_subscriptions("10.170.122.114", 8000);
        assert_eq!(subs.len(), 3);
        assert_eq!(
            subs[0].url,
            "ws://10.170.122.114:8000/ws/players/selected/watch"
        );
        assert_eq!(subs[0].variable_name, SELECTED_PLAYERS_CHANNEL);
        assert_eq!(subs[1].subpath, "hole");
        assert_eq!(subs[2].subpath, "");
    }
}
