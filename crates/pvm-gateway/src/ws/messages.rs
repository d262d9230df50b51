//! Real-time channel wire format.
//!
//! Inbound messages are tagged by `action`, outbound events by `type`.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::TransactionDto;

use crate::domain::ConnectionId;

/// Error codes carried by [`ServerEvent::Error`].
pub mod codes {
    pub const INVALID_MESSAGE: &str = "INVALID_MESSAGE";
    pub const MESSAGE_TOO_LARGE: &str = "MESSAGE_TOO_LARGE";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const STATE_UNAVAILABLE: &str = "STATE_UNAVAILABLE";
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        #[serde(rename = "tableAddress")]
        table_address: String,
        #[serde(rename = "playerId")]
        player_id: String,
        #[serde(default)]
        signature: Option<String>,
    },
    Unsubscribe {
        #[serde(rename = "tableAddress")]
        table_address: String,
        #[serde(rename = "playerId")]
        player_id: String,
    },
    SubscribeMempool,
    UnsubscribeMempool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected {
        client_id: ConnectionId,
        timestamp: String,
    },
    #[serde(rename = "subscribed", rename_all = "camelCase")]
    Subscribed {
        table_address: String,
        player_id: String,
    },
    #[serde(rename = "unsubscribed", rename_all = "camelCase")]
    Unsubscribed {
        table_address: String,
        player_id: String,
    },
    #[serde(rename = "mempool_subscribed")]
    MempoolSubscribed,
    #[serde(rename = "mempool_unsubscribed")]
    MempoolUnsubscribed,
    #[serde(rename = "gameStateUpdate", rename_all = "camelCase")]
    GameStateUpdate {
        table_address: String,
        player_id: String,
        game_state: Value,
        timestamp: String,
    },
    #[serde(rename = "mempoolUpdate")]
    MempoolUpdate {
        transactions: Vec<TransactionDto>,
        count: usize,
        timestamp: String,
    },
    #[serde(rename = "error")]
    Error { message: String, code: String },
}

/// RFC 3339 UTC timestamp with millisecond precision.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl ServerEvent {
    pub fn connected(client_id: ConnectionId) -> Self {
        Self::Connected {
            client_id,
            timestamp: timestamp(),
        }
    }

    pub fn game_state(table: &str, viewer: &str, game_state: Value) -> Self {
        Self::GameStateUpdate {
            table_address: table.to_string(),
            player_id: viewer.to_string(),
            game_state,
            timestamp: timestamp(),
        }
    }

    pub fn mempool(transactions: Vec<TransactionDto>) -> Self {
        Self::MempoolUpdate {
            count: transactions.len(),
            transactions,
            timestamp: timestamp(),
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code: code.to_string(),
        }
    }

    /// One complete JSON text frame.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
