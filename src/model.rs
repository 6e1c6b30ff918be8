use anyhow::Result;
use reqwest::Client;
use tracing::debug;

use crate::config::Config;
use crate::providers;
use crate::stream::StreamObserver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// The fixed persona followed by the user's question.
pub fn question_messages(cfg: &Config, question: &str) -> Vec<Message> {
    vec![
        Message::system(cfg.system_prompt.clone()),
        Message::user(question),
    ]
}

pub async fn chat_stream<O>(
    client: &Client,
    cfg: &Config,
    messages: &[Message],
    observer: &mut O,
) -> Result<String>
where
    O: StreamObserver + ?Sized,
{
    debug!(
        provider = "openrouter",
        model = %cfg.model,
        message_count = messages.len(),
        "dispatching streaming chat request"
    );
    providers::openrouter::stream_chat(client, cfg, messages, observer).await
}
