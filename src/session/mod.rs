//! Session registry: durable thread identifiers and history
//!
//! Sessions are created lazily by the backend on the first message of a
//! new thread id; the client only lists, resumes, renames, and deletes
//! them. The registry is defined as a trait so command handlers and tests
//! can substitute a fake; [`HttpSessionRegistry`] is the production
//! implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::conversation::{Clarification, ConversationState, TurnRecord};
use crate::error::{DatachatError, Result};

pub mod thread;

pub use thread::ThreadStore;

/// A durable conversation thread as listed by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

/// One stored turn as returned by the history endpoint.
///
/// `kind` is the server-side turn discriminator; it maps onto message
/// roles when the conversation state is rebuilt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTurn {
    pub kind: String,
    #[serde(default)]
    pub content: String,
    /// Present on turns that proposed SQL for review.
    #[serde(default)]
    pub sql: Option<String>,
    /// Present on turns that asked a clarifying question.
    #[serde(default)]
    pub clarification: Option<Clarification>,
}

/// External collaborator contract for session management.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    async fn list(&self, project_id: Option<u64>) -> Result<Vec<Session>>;
    async fn history(&self, session_id: &str) -> Result<Vec<RawTurn>>;
    async fn delete(&self, session_id: &str) -> Result<()>;
    async fn rename(&self, session_id: &str, title: &str) -> Result<()>;
}

/// Rebuild conversation state wholesale from stored history.
///
/// Server turn kinds map to roles: `human`/`user` become user turns,
/// `ai`/`agent`/`assistant` become agent turns (SQL review cards and
/// clarifying questions keep their shape). Unknown kinds are skipped with
/// a warning so a newer server cannot break resume.
pub fn rebuild_state(thread_id: impl Into<String>, turns: &[RawTurn]) -> ConversationState {
    let mut records = Vec::with_capacity(turns.len());

    for turn in turns {
        match turn.kind.as_str() {
            "human" | "user" => {
                records.push(TurnRecord::UserTurn {
                    text: turn.content.clone(),
                });
            }
            "ai" | "agent" | "assistant" => {
                if let Some(sql) = &turn.sql {
                    records.push(TurnRecord::InterruptRequest { sql: sql.clone() });
                } else if let Some(clarification) = &turn.clarification {
                    records.push(TurnRecord::ClarificationCard {
                        clarification: clarification.clone(),
                    });
                } else {
                    records.push(TurnRecord::ResultCard {
                        text: turn.content.clone(),
                    });
                }
            }
            other => {
                tracing::warn!(kind = other, "skipping history turn of unknown kind");
            }
        }
    }

    ConversationState::from_records(thread_id, records)
}

/// Session registry over the backend HTTP API.
pub struct HttpSessionRegistry {
    http_client: reqwest::Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl HttpSessionRegistry {
    pub fn new(base_url: Url, bearer_token: Option<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .build()
            // SAFETY: Default reqwest client construction cannot fail
            // unless TLS initialisation fails, which is a fatal startup
            // condition on any supported platform.
            .expect("failed to build reqwest client");

        Self {
            http_client,
            base_url,
            bearer_token,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| DatachatError::Config(format!("invalid base url: {}", e)).into())
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Map a non-success status to the error taxonomy.
    fn check_status(status: reqwest::StatusCode, context: &str) -> Result<()> {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(
                DatachatError::Authentication(format!("{} returned 401", context)).into(),
            );
        }
        if !status.is_success() {
            return Err(
                DatachatError::Session(format!("{} returned HTTP {}", context, status)).into(),
            );
        }
        Ok(())
    }
}

#[async_trait]
impl SessionRegistry for HttpSessionRegistry {
    async fn list(&self, project_id: Option<u64>) -> Result<Vec<Session>> {
        let mut url = self.endpoint("api/sessions")?;
        if let Some(project_id) = project_id {
            url.query_pairs_mut()
                .append_pair("project_id", &project_id.to_string());
        }

        let response = self
            .authorize(self.http_client.get(url))
            .send()
            .await
            .map_err(|e| DatachatError::Session(format!("list request failed: {}", e)))?;

        Self::check_status(response.status(), "session list")?;

        let sessions = response
            .json::<Vec<Session>>()
            .await
            .map_err(|e| DatachatError::Session(format!("malformed session list: {}", e)))?;
        Ok(sessions)
    }

    async fn history(&self, session_id: &str) -> Result<Vec<RawTurn>> {
        let url = self.endpoint(&format!("api/sessions/{}/history", session_id))?;

        let response = self
            .authorize(self.http_client.get(url))
            .send()
            .await
            .map_err(|e| DatachatError::Session(format!("history request failed: {}", e)))?;

        Self::check_status(response.status(), "session history")?;

        let turns = response
            .json::<Vec<RawTurn>>()
            .await
            .map_err(|e| DatachatError::Session(format!("malformed history: {}", e)))?;
        Ok(turns)
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("api/sessions/{}", session_id))?;

        let response = self
            .authorize(self.http_client.delete(url))
            .send()
            .await
            .map_err(|e| DatachatError::Session(format!("delete request failed: {}", e)))?;

        Self::check_status(response.status(), "session delete")
    }

    async fn rename(&self, session_id: &str, title: &str) -> Result<()> {
        let url = self.endpoint(&format!("api/sessions/{}", session_id))?;

        let response = self
            .authorize(self.http_client.patch(url))
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await
            .map_err(|e| DatachatError::Session(format!("rename request failed: {}", e)))?;

        Self::check_status(response.status(), "session rename")
    }
}
