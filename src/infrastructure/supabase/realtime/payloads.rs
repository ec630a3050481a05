//! Phoenix channel frames and `postgres_changes` records.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

use super::constants::{PHOENIX_TOPIC, SUBSCRIBED_CHANGES, events};
use super::error::{RealtimeError, RealtimeResult};
use crate::domain::entities::{
    ContentType, ConversationId, ConversationRow, Message, MessageId, ParticipantUpdate,
    ReadReceipt, UserId,
};
use crate::domain::ports::RealtimeEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    #[must_use]
    pub fn heartbeat(reference: u64) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: events::HEARTBEAT.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
            join_ref: None,
        }
    }

    /// Joins `topic` with one `postgres_changes` binding per subscribed change.
    #[must_use]
    pub fn join(topic: &str, access_token: &str, reference: u64) -> Self {
        let changes: Vec<Value> = SUBSCRIBED_CHANGES
            .iter()
            .map(|(event, table)| json!({ "event": event, "schema": "public", "table": table }))
            .collect();

        Self {
            topic: topic.to_string(),
            event: events::JOIN.to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": changes,
                },
                "access_token": access_token,
            }),
            reference: Some(reference.to_string()),
            join_ref: Some(reference.to_string()),
        }
    }

    #[must_use]
    pub fn leave(topic: &str, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: events::LEAVE.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
            join_ref: None,
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug)]
pub enum Frame {
    JoinReply { ok: bool, message: String },
    HeartbeatReply,
    Change(RealtimeEvent),
    ChannelError(String),
    ChannelClosed,
    Ignored,
}

/// Parses one text frame for the channel `topic`.
///
/// # Errors
/// Returns error if the frame is not a Phoenix message or a change record is malformed.
pub fn decode_frame(text: &str, topic: &str) -> RealtimeResult<Frame> {
    let message: PhoenixMessage =
        serde_json::from_str(text).map_err(|e| RealtimeError::serialization(e.to_string()))?;

    if message.topic == PHOENIX_TOPIC {
        return Ok(if message.event == events::REPLY {
            Frame::HeartbeatReply
        } else {
            Frame::Ignored
        });
    }
    if message.topic != topic {
        return Ok(Frame::Ignored);
    }

    match message.event.as_str() {
        events::REPLY => Ok(join_reply(&message.payload)),
        events::POSTGRES_CHANGES => decode_change(&message.payload),
        events::ERROR => Ok(Frame::ChannelError(
            message
                .payload
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("channel error")
                .to_string(),
        )),
        events::CLOSE => Ok(Frame::ChannelClosed),
        events::SYSTEM => {
            let status = message.payload.get("status").and_then(Value::as_str);
            if status == Some("error") {
                let reason = message
                    .payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("subscription error");
                Ok(Frame::ChannelError(reason.to_string()))
            } else {
                Ok(Frame::Ignored)
            }
        }
        _ => Ok(Frame::Ignored),
    }
}

fn join_reply(payload: &Value) -> Frame {
    let ok = payload.get("status").and_then(Value::as_str) == Some("ok");
    let message = payload
        .get("response")
        .and_then(|r| r.get("reason"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Frame::JoinReply { ok, message }
}

#[derive(Debug, Deserialize)]
struct ChangePayload {
    data: ChangeData,
}

#[derive(Debug, Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    kind: String,
    table: String,
    #[serde(default)]
    record: Value,
    /// Row before a `DELETE` or `UPDATE`, when replica identity exposes it.
    #[serde(default)]
    old_record: Value,
}

fn decode_change(payload: &Value) -> RealtimeResult<Frame> {
    let change = ChangePayload::deserialize(payload)
        .map_err(|e| RealtimeError::protocol(format!("malformed change: {e}")))?;
    let ChangeData {
        kind,
        table,
        record,
        old_record,
    } = change.data;

    let event = match (kind.as_str(), table.as_str()) {
        ("INSERT", "messages") => {
            RealtimeEvent::MessageInsert(record_into::<MessageRecord>(record)?.into())
        }
        ("UPDATE", "messages") => {
            RealtimeEvent::MessageUpdate(record_into::<MessageRecord>(record)?.into())
        }
        ("UPDATE", "conversations") => {
            RealtimeEvent::ConversationUpdate(record_into::<ConversationRecord>(record)?.into())
        }
        ("UPDATE", "conversation_participants") => {
            RealtimeEvent::ParticipantUpdate(record_into::<ParticipantRecord>(record)?.into())
        }
        ("INSERT", "message_reads") => {
            RealtimeEvent::ReadReceipt(record_into::<ReadRecord>(record)?.into())
        }
        (_, "message_reactions") => {
            // Deletes carry the row only in `old_record`.
            let source = if record.get("message_id").is_some() {
                record
            } else {
                old_record
            };
            RealtimeEvent::ReactionChange {
                message_id: record_into::<ReactionRecord>(source)?.message_id,
            }
        }
        _ => return Ok(Frame::Ignored),
    };
    Ok(Frame::Change(event))
}

fn record_into<T: for<'de> Deserialize<'de>>(record: Value) -> RealtimeResult<T> {
    serde_json::from_value(record)
        .map_err(|e| RealtimeError::protocol(format!("malformed record: {e}")))
}

/// Accepts RFC 3339 as well as the space-separated Postgres text format.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(at) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(at.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

fn optional_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|raw| {
        parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    })
    .transpose()
}

#[derive(Debug, Deserialize)]
struct MessageRecord {
    id: MessageId,
    conversation_id: ConversationId,
    sender_id: UserId,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    content_type: Option<ContentType>,
    #[serde(deserialize_with = "timestamp")]
    created_at: DateTime<Utc>,
    #[serde(default)]
    is_deleted: Option<bool>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    edited_at: Option<DateTime<Utc>>,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            conversation_id: record.conversation_id,
            sender_id: record.sender_id,
            content: record.content,
            content_type: record.content_type.unwrap_or_default(),
            created_at: record.created_at,
            is_deleted: record.is_deleted.unwrap_or(false),
            edited_at: record.edited_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConversationRecord {
    id: ConversationId,
    #[serde(default)]
    last_message_text: Option<String>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    last_message_sender_id: Option<UserId>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    updated_at: Option<DateTime<Utc>>,
}

impl From<ConversationRecord> for ConversationRow {
    fn from(record: ConversationRecord) -> Self {
        Self {
            id: record.id,
            last_message_text: record.last_message_text,
            last_message_at: record.last_message_at,
            last_message_sender_id: record.last_message_sender_id,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ParticipantRecord {
    conversation_id: ConversationId,
    user_id: UserId,
    #[serde(default, deserialize_with = "optional_timestamp")]
    last_read_at: Option<DateTime<Utc>>,
}

impl From<ParticipantRecord> for ParticipantUpdate {
    fn from(record: ParticipantRecord) -> Self {
        Self {
            conversation_id: record.conversation_id,
            user_id: record.user_id,
            last_read_at: record.last_read_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReadRecord {
    message_id: MessageId,
    user_id: UserId,
    #[serde(deserialize_with = "timestamp")]
    read_at: DateTime<Utc>,
}

impl From<ReadRecord> for ReadReceipt {
    fn from(record: ReadRecord) -> Self {
        Self {
            message_id: record.message_id,
            user_id: record.user_id,
            read_at: record.read_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReactionRecord {
    message_id: MessageId,
}
