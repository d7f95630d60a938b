//! Barq GraphQL client.
//!
//! Queries are POSTed as a `query` form field with a bearer token per request,
//! so one client serves every logged-in user.

use async_trait::async_trait;
use barqing_core::config::BarqConfig;
use barqing_core::error::{BarqingError, Result};
use barqing_core::traits::ChatApi;
use barqing_core::types::{Conversation, LatestMessage};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

const SELF_ID_QUERY: &str = "{ user { profile { id } } }";
const CHATS_QUERY: &str =
    "{ chats { id lastMessage { profile { id displayName } content id } } }";

/// HTTP client for the Barq GraphQL endpoint.
pub struct BarqClient {
    api_url: String,
    client: reqwest::Client,
}

impl BarqClient {
    pub fn new(config: &BarqConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BarqingError::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_url: config.api_url.clone(),
            client,
        })
    }

    #[cfg(test)]
    fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn query<T: DeserializeOwned>(&self, credential: &str, query: &str) -> Result<T> {
        let resp = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {credential}"))
            .form(&[("query", query)])
            .send()
            .await
            .map_err(|e| BarqingError::Http(format!("Barq request failed ({}): {e}", self.api_url)))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| BarqingError::Http(format!("Barq response unreadable: {e}")))?;
        parse_response(status, &body)
    }
}

/// Classify a GraphQL response. Anything but a 200 whose body carries
/// `data` is an error holding the status and the body verbatim.
pub fn parse_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T> {
    let api_error = || BarqingError::Api {
        status,
        body: body.to_string(),
    };
    if status != 200 {
        return Err(api_error());
    }
    let envelope: GraphQlResponse<T> = serde_json::from_str(body).map_err(|_| api_error())?;
    envelope.data.ok_or_else(api_error)
}

#[async_trait]
impl ChatApi for BarqClient {
    async fn self_id(&self, credential: &str) -> Result<String> {
        let data: UserData = self.query(credential, SELF_ID_QUERY).await?;
        Ok(data.user.profile.id)
    }

    async fn conversations(&self, credential: &str) -> Result<Vec<Conversation>> {
        let data: ChatsData = self.query(credential, CHATS_QUERY).await?;
        tracing::trace!("Barq returned {} chats", data.chats.len());
        Ok(data.chats.into_iter().map(Conversation::from).collect())
    }
}

// --- Barq API Types ---

#[derive(Debug, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct UserData {
    pub user: BarqUser,
}

#[derive(Debug, Deserialize)]
pub struct BarqUser {
    pub profile: BarqProfile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarqProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatsData {
    pub chats: Vec<BarqChat>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarqChat {
    pub id: String,
    pub last_message: Option<BarqMessage>,
}

#[derive(Debug, Deserialize)]
pub struct BarqMessage {
    pub id: String,
    pub profile: BarqProfile,
    /// Null for media-only messages.
    #[serde(default)]
    pub content: Option<String>,
}

impl From<BarqChat> for Conversation {
    fn from(chat: BarqChat) -> Self {
        Conversation {
            id: chat.id,
            latest: chat.last_message.map(|msg| LatestMessage {
                id: msg.id,
                author_id: msg.profile.id,
                author_name: msg.profile.display_name.unwrap_or_default(),
                content: msg.content.unwrap_or_default(),
            }),
        }
    }
}
