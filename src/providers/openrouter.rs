use anyhow::{Context, Result, bail};
use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{APP_TITLE, Config};
use crate::model::Message;
use crate::providers::http_errors::{api_request_error, api_status_error, stream_read_error};
use crate::stream::{Frame, SseDecoder, StreamObserver};

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

fn to_chat_messages(messages: &[Message]) -> Vec<ChatMessage<'_>> {
    messages
        .iter()
        .map(|msg| ChatMessage {
            role: msg.role.as_str(),
            content: &msg.content,
        })
        .collect()
}

/// HTTP client with connect and per-read timeouts; the body may stream for
/// longer than the timeout as long as bytes keep arriving.
pub fn build_client(cfg: &Config) -> Result<Client> {
    let timeout = Duration::from_secs(cfg.request_timeout_secs);
    Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .context("Failed to initialize HTTP client")
}

/// Sends the chat request with `stream: true` and returns the concatenated
/// response text once the stream ends.
pub async fn stream_chat<O>(
    client: &Client,
    cfg: &Config,
    messages: &[Message],
    observer: &mut O,
) -> Result<String>
where
    O: StreamObserver + ?Sized,
{
    let api_url = cfg.api_url.as_str();
    let body = ChatCompletionRequest {
        model: &cfg.model,
        messages: to_chat_messages(messages),
        stream: true,
    };
    debug!(
        api_url = %api_url,
        model = %cfg.model,
        message_count = messages.len(),
        "sending openrouter chat request"
    );

    let response = client
        .post(api_url)
        .bearer_auth(&cfg.api_key)
        .header("X-Title", APP_TITLE)
        .json(&body)
        .send()
        .await
        .map_err(|err| {
            observer.suspend(&mut || {
                warn!(
                    api_url = %api_url,
                    model = %cfg.model,
                    error = %err,
                    "openrouter request failed"
                )
            });
            api_request_error(err, api_url, cfg.request_timeout_secs)
        })?;

    let status = response.status();
    if !status.is_success() {
        let response_body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        observer.suspend(&mut || {
            warn!(
                api_url = %api_url,
                model = %cfg.model,
                status = %status,
                response_body_len = response_body.len(),
                "openrouter returned non-success status"
            )
        });
        return Err(api_status_error(status, &response_body));
    }

    observer.on_connected();

    let mut decoder = SseDecoder::new();
    let mut content = String::new();
    let mut frame_count = 0usize;
    let mut saw_done = false;
    let mut bytes = response.bytes_stream();

    'read: while let Some(chunk) = bytes.next().await {
        let chunk = chunk.map_err(|err| {
            let received_len = content.len();
            observer.suspend(&mut || {
                warn!(error = %err, received_len, "openrouter stream read failed")
            });
            stream_read_error(err, cfg.request_timeout_secs)
        })?;

        for frame in decoder.push(&chunk) {
            if apply_frame(frame, &mut content, &mut frame_count, &mut *observer)? {
                saw_done = true;
                break 'read;
            }
        }
    }

    if !saw_done && let Some(frame) = decoder.finish() {
        saw_done = apply_frame(frame, &mut content, &mut frame_count, &mut *observer)?;
    }

    if !saw_done {
        debug!(
            frame_count,
            "openrouter stream ended without a [DONE] marker"
        );
    }
    debug!(
        model = %cfg.model,
        frame_count,
        response_len = content.len(),
        "received openrouter chat response"
    );
    Ok(content)
}

/// Returns `true` once the end-of-stream marker is seen.
fn apply_frame<O>(
    frame: Frame,
    content: &mut String,
    frame_count: &mut usize,
    observer: &mut O,
) -> Result<bool>
where
    O: StreamObserver + ?Sized,
{
    match frame {
        Frame::Delta(delta) => {
            *frame_count += 1;
            content.push_str(&delta);
            observer.on_delta(&delta);
            Ok(false)
        }
        Frame::Done => Ok(true),
        Frame::ProviderError(message) => {
            observer.suspend(&mut || {
                warn!(error = %message, "openrouter reported an error mid-stream")
            });
            bail!("Provider error during streaming: {message}")
        }
        Frame::Malformed { payload, reason } => {
            observer.on_malformed(&payload, &reason);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatCompletionRequest, apply_frame, to_chat_messages};
    use crate::model::Message;
    use crate::stream::{Frame, StreamObserver};
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        deltas: Vec<String>,
        malformed: Vec<String>,
        suspended: usize,
    }

    impl StreamObserver for Recorder {
        fn on_delta(&mut self, delta: &str) {
            self.deltas.push(delta.to_string());
        }

        fn on_malformed(&mut self, payload: &str, _reason: &str) {
            self.malformed.push(payload.to_string());
        }

        fn suspend(&mut self, emit: &mut dyn FnMut()) {
            self.suspended += 1;
            emit();
        }
    }

    #[test]
    fn request_body_matches_chat_completions_shape() {
        let messages = vec![Message::system("Be stoic."), Message::user("2+2?")];
        let body = ChatCompletionRequest {
            model: "deepseek/deepseek-chat-v3-0324:free",
            messages: to_chat_messages(&messages),
            stream: true,
        };

        let value = serde_json::to_value(&body).expect("body should serialize");
        assert_eq!(
            value,
            json!({
                "model": "deepseek/deepseek-chat-v3-0324:free",
                "messages": [
                    {"role": "system", "content": "Be stoic."},
                    {"role": "user", "content": "2+2?"}
                ],
                "stream": true
            })
        );
    }

    #[test]
    fn apply_frame_accumulates_and_skips_malformed() {
        let mut recorder = Recorder::default();
        let mut content = String::new();
        let mut count = 0;

        let frames = [
            Frame::Delta("4".to_string()),
            Frame::Malformed {
                payload: "{oops".to_string(),
                reason: "bad json".to_string(),
            },
            Frame::Delta(" equals four.".to_string()),
        ];
        for frame in frames {
            let done = apply_frame(frame, &mut content, &mut count, &mut recorder)
                .expect("frame should apply");
            assert!(!done);
        }

        assert_eq!(content, "4 equals four.");
        assert_eq!(count, 2);
        assert_eq!(recorder.deltas, vec!["4", " equals four."]);
        assert_eq!(recorder.malformed, vec!["{oops"]);
    }

    #[test]
    fn apply_frame_stops_on_done_and_fails_on_provider_error() {
        let mut recorder = Recorder::default();
        let mut content = String::new();
        let mut count = 0;

        assert!(
            apply_frame(Frame::Done, &mut content, &mut count, &mut recorder)
                .expect("done should apply")
        );

        let err = apply_frame(
            Frame::ProviderError("Rate limit exceeded".to_string()),
            &mut content,
            &mut count,
            &mut recorder,
        )
        .expect_err("provider error should abort");
        assert!(format!("{err:#}").contains("Rate limit exceeded"));
        assert_eq!(recorder.suspended, 1);
    }
}
