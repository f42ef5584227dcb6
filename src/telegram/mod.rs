//! Telegram Bot API client (`sendMessage`, `sendDocument`)

use crate::core::error::{AppError, AppResult, UpstreamError};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const SERVICE: &str = "telegram";
const MESSAGE_TIMEOUT: Duration = Duration::from_secs(10);
const DOCUMENT_TIMEOUT: Duration = Duration::from_secs(45);

/// Every message and caption is sent as Telegram HTML
const PARSE_MODE: &str = "HTML";

#[derive(Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Escape text for `parse_mode=HTML`
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl TelegramClient {
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> AppResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("cannot build Telegram client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    fn method_url(&self, method: &str) -> AppResult<String> {
        let token = self.token.as_deref().ok_or_else(|| {
            AppError::Config(
                "Telegram bot token missing. Set TELEGRAM_BOT_TOKEN and restart the app."
                    .to_string(),
            )
        })?;
        Ok(format!("{}/bot{}/{}", self.api_base, token, method))
    }

    /// Send a text message
    ///
    /// `text` must already be HTML-escaped. `Ok(false)` means Telegram
    /// answered but refused the message.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> AppResult<bool> {
        let url = self.method_url("sendMessage")?;
        let payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": PARSE_MODE,
        });

        let request = self.client.post(url).timeout(MESSAGE_TIMEOUT).json(&payload);
        self.dispatch(chat_id, request).await
    }

    /// Upload a PDF with an HTML caption
    pub async fn send_document(
        &self,
        chat_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
        caption: &str,
    ) -> AppResult<bool> {
        let url = self.method_url("sendDocument")?;
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .map_err(|e| AppError::Internal(format!("invalid document part: {}", e)))?;
        let form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", PARSE_MODE)
            .part("document", part);

        let request = self.client.post(url).timeout(DOCUMENT_TIMEOUT).multipart(form);
        self.dispatch(chat_id, request).await
    }

    async fn dispatch(&self, chat_id: &str, request: reqwest::RequestBuilder) -> AppResult<bool> {
        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 404 {
                tracing::warn!(
                    "404 from Telegram usually means an invalid bot token. Check TELEGRAM_BOT_TOKEN and make sure the chat has started the bot."
                );
            }
            return Err(UpstreamError::from_status(SERVICE, status.as_u16(), body).into());
        }

        let reply: ApiReply = response
            .json()
            .await
            .map_err(|e| UpstreamError::invalid_payload(SERVICE, e))?;

        if reply.ok {
            tracing::debug!(chat_id = %chat_id, "telegram delivery ok");
        } else {
            tracing::warn!(
                chat_id = %chat_id,
                description = reply.description.as_deref().unwrap_or("Unknown error"),
                "telegram API refused delivery"
            );
        }
        Ok(reply.ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;

    async fn mock_telegram() -> String {
        let app = Router::new().route(
            "/{bot}/sendMessage",
            post(|Path(bot): Path<String>, Json(body): Json<Value>| async move {
                if bot == "botgood" {
                    Json(json!({ "ok": body["chat_id"] != "blocked", "description": "chat not found" }))
                        .into_response()
                } else {
                    (axum::http::StatusCode::NOT_FOUND, "Not Found").into_response()
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}", addr)
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("Q1 <results> & more"), "Q1 &lt;results&gt; &amp; more");
    }

    #[tokio::test]
    async fn test_missing_token_is_config_error() {
        let client = TelegramClient::new("http://127.0.0.1:1", None).unwrap();
        let err = client
            .send_message("1", "hi")
            .await
            .unwrap_err();
        match err {
            AppError::Config(msg) => assert!(msg.contains("Telegram bot token missing")),
            other => panic!("Expected Config, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_message_ok_and_refused() {
        let base = mock_telegram().await;
        let client = TelegramClient::new(base, Some("good".to_string())).unwrap();

        assert!(client.send_message("42", "hello").await.unwrap());
        assert!(!client.send_message("blocked", "hello").await.unwrap());
    }

    #[tokio::test]
    async fn test_bad_token_surfaces_status() {
        let base = mock_telegram().await;
        let client = TelegramClient::new(base, Some("bad".to_string())).unwrap();
        let err = client
            .send_message("42", "hello")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Upstream(UpstreamError::Status { status: 404, .. })
        ));
    }
}
