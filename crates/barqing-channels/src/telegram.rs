//! Telegram Bot channel: long polling + message sending via Bot API.

use async_trait::async_trait;
use barqing_core::config::TelegramConfig;
use barqing_core::error::{BarqingError, Result};
use barqing_core::traits::Channel;
use barqing_core::types::{CommandSpec, Destination, IncomingMessage};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::watch;

/// Telegram Bot channel with polling loop.
#[derive(Clone)]
pub struct TelegramChannel {
    config: TelegramConfig,
    client: reqwest::Client,
    last_update_id: i64,
    username: Option<String>,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            last_update_id: 0,
            username: None,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{}",
            self.config.bot_token, method
        )
    }

    /// Verify the token and remember the bot's username. Fails when Telegram rejects it.
    pub async fn connect(&mut self) -> Result<TelegramUser> {
        let me = self.get_me().await?;
        tracing::info!(
            "🤖 Telegram bot: @{} ({})",
            me.username.as_deref().unwrap_or("unknown"),
            me.first_name
        );
        self.username = me.username.clone();
        Ok(me)
    }

    fn updates_query(&self, timeout_secs: u64) -> [(&'static str, String); 3] {
        [
            ("offset", (self.last_update_id + 1).to_string()),
            ("timeout", timeout_secs.to_string()),
            ("allowed_updates", "[\"message\"]".into()),
        ]
    }

    async fn fetch_updates(&self, timeout_secs: u64) -> Result<Vec<TelegramUpdate>> {
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&self.updates_query(timeout_secs))
            .timeout(Duration::from_secs(timeout_secs + 10))
            .send()
            .await
            .map_err(|e| BarqingError::Channel(format!("Telegram getUpdates failed: {e}")))?;

        let body: TelegramApiResponse<Vec<TelegramUpdate>> = response
            .json()
            .await
            .map_err(|e| BarqingError::Channel(format!("Invalid Telegram response: {e}")))?;

        Ok(body.into_result("getUpdates")?.unwrap_or_default())
    }

    /// Get updates using long polling.
    pub async fn get_updates(&mut self) -> Result<Vec<TelegramUpdate>> {
        let updates = self.fetch_updates(self.config.poll_timeout_secs).await?;
        if let Some(last) = updates.last() {
            self.last_update_id = last.update_id;
        }
        Ok(updates)
    }

    /// Confirm everything handled so far, so a restart does not replay it.
    /// Whatever this call returns stays unconfirmed and is delivered again later.
    pub async fn acknowledge(&self) -> Result<()> {
        if self.last_update_id == 0 {
            return Ok(());
        }
        self.fetch_updates(0).await?;
        tracing::debug!("Acknowledged Telegram updates up to {}", self.last_update_id);
        Ok(())
    }

    /// Send a plain-text message.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        self.call::<serde_json::Value>("sendMessage", &body).await?;
        Ok(())
    }

    /// Register the bot's command list (`setMyCommands`).
    pub async fn set_my_commands(&self, commands: &[CommandSpec]) -> Result<()> {
        let body = serde_json::json!({ "commands": commands });
        self.call::<bool>("setMyCommands", &body).await?;
        Ok(())
    }

    /// Get bot info.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| BarqingError::Channel(format!("getMe failed: {e}")))?;
        let body: TelegramApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| BarqingError::Channel(format!("Invalid getMe response: {e}")))?;
        body.into_result("getMe")?
            .ok_or_else(|| BarqingError::Channel("No bot info".into()))
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<Option<T>> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(body)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| BarqingError::Channel(format!("{method} failed: {e}")))?;

        let result: TelegramApiResponse<T> = response
            .json()
            .await
            .map_err(|e| BarqingError::Channel(format!("Invalid {method} response: {e}")))?;
        result.into_result(method)
    }

    /// Start polling loop, returns a stream of IncomingMessages.
    /// The loop ends when `shutdown` flips to true or the stream is dropped.
    pub fn start_polling(&self, mut shutdown: watch::Receiver<bool>) -> TelegramPollingStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let mut channel = self.clone();

        let task = tokio::spawn(async move {
            tracing::info!("Telegram polling loop started");

            loop {
                let updates = tokio::select! {
                    _ = shutdown.changed() => break,
                    updates = channel.get_updates() => updates,
                };

                match updates {
                    Ok(updates) => {
                        for update in updates {
                            if let Some(msg) = update.to_incoming()
                                && !addressed_elsewhere(&msg, channel.username.as_deref())
                                && tx.send(msg).is_err() {
                                    tracing::info!("Telegram polling stopped (receiver dropped)");
                                    return;
                                }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Telegram polling error: {e}");
                        tokio::select! {
                            _ = shutdown.changed() => break,
                            _ = tokio::time::sleep(Duration::from_secs(channel.config.error_backoff_secs)) => {}
                        }
                    }
                }
            }
            if let Err(e) = channel.acknowledge().await {
                tracing::warn!("⚠️ Could not acknowledge last Telegram updates: {e}");
            }
            tracing::info!("Telegram polling stopped (shutdown)");
        });

        TelegramPollingStream { rx, task }
    }
}

/// True for a `/command@name` aimed at another bot. Without a known
/// username every suffix is accepted.
fn addressed_elsewhere(msg: &IncomingMessage, username: Option<&str>) -> bool {
    let (Some(text), Some(username)) = (msg.text.as_deref(), username) else {
        return false;
    };
    let Some(head) = text.split_whitespace().next() else {
        return false;
    };
    match head.strip_prefix('/').and_then(|h| h.split_once('@')) {
        Some((_, target)) => !target.eq_ignore_ascii_case(username),
        None => false,
    }
}

/// Stream of incoming Telegram messages from polling.
pub struct TelegramPollingStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<IncomingMessage>,
    task: tokio::task::JoinHandle<()>,
}

impl TelegramPollingStream {
    /// Wait for the polling task to wind down after shutdown, including
    /// its final acknowledgement.
    pub async fn finish(self) {
        if let Err(e) = self.task.await {
            tracing::warn!("⚠️ Telegram polling task ended abnormally: {e}");
        }
    }
}

impl Stream for TelegramPollingStream {
    type Item = IncomingMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Unpin for TelegramPollingStream {}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<()> {
        self.set_my_commands(commands).await
    }

    async fn send_text(&self, destination: Destination, text: &str) -> Result<()> {
        self.send_message(destination, text).await
    }
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

impl<T> TelegramApiResponse<T> {
    fn into_result(self, method: &str) -> Result<Option<T>> {
        if !self.ok {
            return Err(BarqingError::Channel(format!(
                "Telegram {method} error: {}",
                self.description.unwrap_or_default()
            )));
        }
        Ok(self.result)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
    pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

impl TelegramUpdate {
    /// Convert to an IncomingMessage. Textless messages are kept,
    /// the command handler decides to ignore them.
    pub fn to_incoming(&self) -> Option<IncomingMessage> {
        let msg = self.message.as_ref()?;

        // Skip bot messages
        if msg.from.as_ref().is_some_and(|f| f.is_bot) {
            return None;
        }

        Some(IncomingMessage {
            destination: msg.chat.id,
            text: msg.text.clone(),
        })
    }
}
