//! PostgREST client for the conversation tables.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, header};
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

use super::dto::{CreatedAtRow, ErrorResponse, ProfileRow, SelfParticipantRow};
use crate::domain::entities::{
    AccessToken, ConversationId, ConversationRow, MessageId, OtherParticipant, Reaction,
    SelfParticipant, UserId, UserProfile,
};
use crate::domain::errors::SyncError;
use crate::domain::ports::ConversationBackendPort;

const REST_PATH: &str = "/rest/v1";
const DEFAULT_RETRY_AFTER_MS: u64 = 5000;
const USER_AGENT: &str = concat!("inbox-sync/", env!("CARGO_PKG_VERSION"));

const PARTICIPANTS: &str = "conversation_participants";
const CONVERSATIONS: &str = "conversations";
const MESSAGES: &str = "messages";
const USERS: &str = "users";
const MESSAGE_READS: &str = "message_reads";
const MESSAGE_REACTIONS: &str = "message_reactions";

/// Backend adapter speaking PostgREST with the signed-in user's token.
pub struct PostgrestBackend {
    client: Client,
    rest_url: String,
    anon_key: String,
    token: AccessToken,
}

impl PostgrestBackend {
    /// Creates a client for the project at `base_url`.
    ///
    /// # Errors
    /// Returns error if HTTP client creation fails.
    pub fn new(
        base_url: &str,
        anon_key: impl Into<String>,
        token: AccessToken,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            rest_url: rest_url(base_url),
            anon_key: anon_key.into(),
            token,
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{table}", self.rest_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.token.as_str())
    }

    async fn send(&self, table: &str, builder: RequestBuilder) -> Result<Response, SyncError> {
        let response = builder.send().await.map_err(|e| {
            warn!(table, error = %e, "Backend request failed");
            transport_error(&e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after_ms = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| secs.saturating_mul(1000));
        let body = response.json::<ErrorResponse>().await.ok();
        let error = status_error(status, body, retry_after_ms);
        warn!(table, status = status.as_u16(), error = %error, "Backend rejected request");
        Err(error)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, SyncError> {
        trace!(table, ?query, "Selecting rows");
        let builder = self.request(Method::GET, table).query(query);
        let response = self.send(table, builder).await?;
        response.json::<Vec<T>>().await.map_err(|e| {
            warn!(table, error = %e, "Failed to decode rows");
            SyncError::decode(format!("{table}: {e}"))
        })
    }
}

#[async_trait]
impl ConversationBackendPort for PostgrestBackend {
    async fn fetch_self_participants(
        &self,
        self_id: &UserId,
    ) -> Result<Vec<SelfParticipant>, SyncError> {
        let rows: Vec<SelfParticipantRow> = self
            .select(
                PARTICIPANTS,
                &[
                    ("select", "conversation_id,last_read_at,is_blocked,is_muted".to_string()),
                    ("user_id", eq(self_id)),
                ],
            )
            .await?;
        debug!(rows = rows.len(), "Fetched own participant rows");
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn fetch_conversations(
        &self,
        ids: &[ConversationId],
    ) -> Result<Vec<ConversationRow>, SyncError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(
            CONVERSATIONS,
            &[
                (
                    "select",
                    "id,last_message_text,last_message_at,last_message_sender_id,updated_at".to_string(),
                ),
                ("id", in_list(ids)),
            ],
        )
        .await
    }

    async fn fetch_other_participants(
        &self,
        self_id: &UserId,
        ids: &[ConversationId],
    ) -> Result<Vec<OtherParticipant>, SyncError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(
            PARTICIPANTS,
            &[
                ("select", "conversation_id,user_id,last_read_at".to_string()),
                ("conversation_id", in_list(ids)),
                ("user_id", format!("neq.{self_id}")),
            ],
        )
        .await
    }

    async fn fetch_profiles(&self, user_ids: &[UserId]) -> Result<Vec<UserProfile>, SyncError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<ProfileRow> = self
            .select(
                USERS,
                &[
                    ("select", "id,full_name,avatar_url,is_vip,last_seen_at".to_string()),
                    ("id", in_list(user_ids)),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_unread(
        &self,
        self_id: &UserId,
        conversation_id: &ConversationId,
        after: DateTime<Utc>,
    ) -> Result<u32, SyncError> {
        let builder = self
            .request(Method::HEAD, MESSAGES)
            .header("Prefer", "count=exact")
            .query(&[
                ("select", "id".to_string()),
                ("conversation_id", eq(conversation_id)),
                ("sender_id", format!("neq.{self_id}")),
                ("created_at", format!("gt.{}", timestamp(after))),
                ("is_deleted", "eq.false".to_string()),
            ]);
        let response = self.send(MESSAGES, builder).await?;

        let range = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| SyncError::decode("count response without Content-Range"))?;
        let count = parse_content_range(range)
            .ok_or_else(|| SyncError::decode(format!("unexpected Content-Range: {range}")))?;
        trace!(conversation_id = %conversation_id, count, "Counted unread messages");
        Ok(count)
    }

    async fn latest_message_at(
        &self,
        conversation_id: &ConversationId,
        sender_id: Option<&UserId>,
    ) -> Result<Option<DateTime<Utc>>, SyncError> {
        let mut query = vec![
            ("select", "created_at".to_string()),
            ("conversation_id", eq(conversation_id)),
        ];
        if let Some(sender_id) = sender_id {
            query.push(("sender_id", eq(sender_id)));
        }
        query.push(("order", "created_at.desc".to_string()));
        query.push(("limit", "1".to_string()));

        let rows: Vec<CreatedAtRow> = self.select(MESSAGES, &query).await?;
        Ok(rows.into_iter().next().map(|row| row.created_at))
    }

    async fn update_last_read(
        &self,
        self_id: &UserId,
        conversation_id: &ConversationId,
        read_at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let builder = self
            .request(Method::PATCH, PARTICIPANTS)
            .header("Prefer", "return=minimal")
            .query(&[
                ("conversation_id", eq(conversation_id)),
                ("user_id", eq(self_id)),
            ])
            .json(&serde_json::json!({ "last_read_at": timestamp(read_at) }));
        self.send(PARTICIPANTS, builder).await?;
        debug!(conversation_id = %conversation_id, %read_at, "Updated last-read marker");
        Ok(())
    }

    async fn upsert_message_reads(
        &self,
        self_id: &UserId,
        message_ids: &[MessageId],
        read_at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        if message_ids.is_empty() {
            return Ok(());
        }
        let builder = self
            .request(Method::POST, MESSAGE_READS)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .query(&[("on_conflict", "message_id,user_id")])
            .json(&message_read_rows(self_id, message_ids, read_at));
        self.send(MESSAGE_READS, builder).await?;
        debug!(count = message_ids.len(), "Recorded message reads");
        Ok(())
    }

    async fn fetch_reactions(&self, message_id: &MessageId) -> Result<Vec<Reaction>, SyncError> {
        self.select(
            MESSAGE_REACTIONS,
            &[("select", "*".to_string()), ("message_id", eq(message_id))],
        )
        .await
    }
}

fn message_read_rows(
    self_id: &UserId,
    message_ids: &[MessageId],
    read_at: DateTime<Utc>,
) -> serde_json::Value {
    let read_at = timestamp(read_at);
    message_ids
        .iter()
        .map(|id| serde_json::json!({ "message_id": id, "user_id": self_id, "read_at": read_at }))
        .collect()
}

fn rest_url(base_url: &str) -> String {
    format!("{}{REST_PATH}", base_url.trim_end_matches('/'))
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

fn in_list<T: AsRef<str>>(values: &[T]) -> String {
    let quoted: Vec<String> = values
        .iter()
        .map(|v| format!("\"{}\"", v.as_ref().replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Reads the total from a `Content-Range` value such as `0-24/130` or `*/0`.
fn parse_content_range(value: &str) -> Option<u32> {
    let (_, total) = value.trim().rsplit_once('/')?;
    total.parse().ok()
}

fn transport_error(e: &reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::network("request timed out")
    } else if e.is_connect() {
        SyncError::network("failed to connect to backend")
    } else if e.is_decode() {
        SyncError::decode(e.to_string())
    } else {
        SyncError::network(e.to_string())
    }
}

fn status_error(
    status: StatusCode,
    body: Option<ErrorResponse>,
    retry_after_ms: Option<u64>,
) -> SyncError {
    let message = body.map_or_else(
        || format!("HTTP {status}"),
        |b| match b.code {
            Some(code) => format!("{} ({code})", b.message),
            None => b.message,
        },
    );

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncError::unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS => SyncError::RateLimited {
            retry_after_ms: retry_after_ms.unwrap_or(DEFAULT_RETRY_AFTER_MS),
        },
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            SyncError::network("backend is temporarily unavailable")
        }
        _ => SyncError::backend(status.as_u16(), message),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use test_case::test_case;

    use super::*;

    #[test_case("0-24/130", Some(130) ; "partial_range")]
    #[test_case("*/0", Some(0) ; "empty_result")]
    #[test_case("*/7", Some(7) ; "head_request")]
    #[test_case("0-9/*", None ; "unknown_total")]
    #[test_case("garbage", None ; "malformed")]
    fn test_parse_content_range(value: &str, expected: Option<u32>) {
        assert_eq!(parse_content_range(value), expected);
    }

    #[test]
    fn test_in_list_quotes_values() {
        let ids = [ConversationId::from("a"), ConversationId::from("b,c")];
        assert_eq!(in_list(&ids), r#"in.("a","b,c")"#);
    }

    #[test]
    fn test_message_read_rows() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let rows = message_read_rows(
            &UserId::from("u1"),
            &[MessageId::from("m1"), MessageId::from("m2")],
            at,
        );

        assert_eq!(
            rows,
            serde_json::json!([
                { "message_id": "m1", "user_id": "u1", "read_at": "2024-05-01T12:00:00.000000Z" },
                { "message_id": "m2", "user_id": "u1", "read_at": "2024-05-01T12:00:00.000000Z" },
            ])
        );
    }

    #[test]
    fn test_rest_url_strips_trailing_slash() {
        assert_eq!(
            rest_url("https://demo.supabase.co/"),
            "https://demo.supabase.co/rest/v1"
        );
    }

    #[test]
    fn test_timestamp_is_utc_with_micros() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(timestamp(at), "2024-05-01T12:00:00.000000Z");
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, None, None),
            SyncError::Unauthorized { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, None, Some(3000)),
            SyncError::RateLimited {
                retry_after_ms: 3000
            }
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, None, None),
            SyncError::RateLimited {
                retry_after_ms: DEFAULT_RETRY_AFTER_MS
            }
        ));

        let body = ErrorResponse {
            message: "column does not exist".to_string(),
            code: Some("42703".to_string()),
        };
        match status_error(StatusCode::BAD_REQUEST, Some(body), None) {
            SyncError::Backend { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "column does not exist (42703)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_client_creation() {
        let token = AccessToken::new("token").unwrap();
        let client = PostgrestBackend::new(
            "https://demo.supabase.co",
            "anon",
            token,
            Duration::from_secs(5),
        );
        assert!(client.is_ok());
    }

    #[test]
    fn test_rows_decode_nullable_flags() {
        let rows: Vec<SelfParticipantRow> = serde_json::from_str(
            r#"[{"conversation_id":"c1","last_read_at":null,"is_blocked":null,"is_muted":true}]"#,
        )
        .unwrap();
        let participant: SelfParticipant = rows.into_iter().next().unwrap().into();
        assert!(!participant.is_blocked);
        assert!(participant.is_muted);
        assert!(participant.last_read_at.is_none());
    }
}
