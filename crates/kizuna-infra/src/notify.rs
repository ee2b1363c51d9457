//! Notification sender.
//!
//! Delivers proactive message alerts over email (Resend-shaped API) or a
//! plain HTTPS webhook. Implements the `Notifier` port: failures come
//! back as `{sent: false, error}`, never as an Err -- a broken channel
//! must not abort the scheduler pass that triggered it.

use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use kizuna_core::notify::Notifier;
use kizuna_types::proactive::{NotificationChannel, NotificationResult};

use crate::llm::http_client;

const EMAIL_API_URL: &str = "https://api.resend.com/emails";
const CONTENT_MAX_CHARS: usize = 1000;
const SEND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

// No Debug derive: the sender must never leak the email API key.
pub struct HttpNotifier {
    client: reqwest::Client,
    email_api_key: Option<SecretString>,
    email_from: String,
}

impl HttpNotifier {
    pub fn new(email_api_key: Option<String>, email_from: Option<String>) -> Self {
        Self {
            client: http_client(),
            email_api_key: email_api_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
            email_from: email_from
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| "Kizuna <noreply@kizuna.local>".to_string()),
        }
    }

    async fn send_email(&self, target: &str, content: &str) -> NotificationResult {
        let Some(api_key) = &self.email_api_key else {
            return NotificationResult::failed("email_api_key_missing");
        };
        if !looks_like_email(target) {
            return NotificationResult::failed("invalid_email_target");
        }

        let body = serde_json::json!({
            "from": self.email_from,
            "to": target,
            "subject": "Your companion sent you a message",
            "text": format!("\u{201c}{content}\u{201d}\n\nOpen the app to see the full conversation."),
        });

        match self
            .client
            .post(EMAIL_API_URL)
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .timeout(SEND_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => NotificationResult::sent(),
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                NotificationResult::failed(format!(
                    "email_failed:{status}:{}",
                    text.chars().take(200).collect::<String>()
                ))
            }
            Err(err) => NotificationResult::failed(format!("email_error:{err}")),
        }
    }

    async fn send_webhook(&self, target: &str, content: &str) -> NotificationResult {
        if !target.starts_with("https://") {
            return NotificationResult::failed("invalid_webhook_target");
        }

        let body = serde_json::json!({
            "msgtype": "text",
            "text": { "content": format!("Companion: {content}") },
        });

        match self
            .client
            .post(target)
            .json(&body)
            .timeout(SEND_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => NotificationResult::sent(),
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                NotificationResult::failed(format!(
                    "webhook_failed:{status}:{}",
                    text.chars().take(200).collect::<String>()
                ))
            }
            Err(err) => NotificationResult::failed(format!("webhook_error:{err}")),
        }
    }
}

fn looks_like_email(target: &str) -> bool {
    let Some((local, domain)) = target.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !local.contains(char::is_whitespace)
        && domain.contains('.')
        && !domain.contains(char::is_whitespace)
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

impl Notifier for HttpNotifier {
    async fn send(
        &self,
        channel: NotificationChannel,
        target: &str,
        content: &str,
        user_id: &str,
    ) -> NotificationResult {
        let content: String = content.trim().chars().take(CONTENT_MAX_CHARS).collect();
        if content.is_empty() {
            return NotificationResult::failed("empty_content");
        }
        let target = target.trim();

        let result = match channel {
            NotificationChannel::None => NotificationResult::failed("channel_none"),
            _ if target.is_empty() => NotificationResult::failed("missing_target"),
            NotificationChannel::Email => self.send_email(target, &content).await,
            NotificationChannel::Webhook => self.send_webhook(target, &content).await,
        };

        if let Some(error) = &result.error {
            warn!(user_id, %channel, %error, "notification not sent");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier() -> HttpNotifier {
        HttpNotifier::new(None, None)
    }

    #[test]
    fn test_looks_like_email() {
        assert!(looks_like_email("a@b.example"));
        assert!(!looks_like_email("not-an-email"));
        assert!(!looks_like_email("a b@c.example"));
        assert!(!looks_like_email("a@nodot"));
        assert!(!looks_like_email("a@.example"));
    }

    #[tokio::test]
    async fn test_channel_none_never_sends() {
        let result = notifier()
            .send(NotificationChannel::None, "target", "hi", "u1")
            .await;
        assert!(!result.sent);
        assert_eq!(result.error.as_deref(), Some("channel_none"));
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let result = notifier()
            .send(NotificationChannel::Email, "a@b.example", "   ", "u1")
            .await;
        assert_eq!(result.error.as_deref(), Some("empty_content"));
    }

    #[tokio::test]
    async fn test_missing_target_rejected() {
        let result = notifier()
            .send(NotificationChannel::Webhook, "  ", "hi", "u1")
            .await;
        assert_eq!(result.error.as_deref(), Some("missing_target"));
    }

    #[tokio::test]
    async fn test_email_without_key_fails_soft() {
        let result = notifier()
            .send(NotificationChannel::Email, "a@b.example", "hi", "u1")
            .await;
        assert!(!result.sent);
        assert_eq!(result.error.as_deref(), Some("email_api_key_missing"));
    }

    #[tokio::test]
    async fn test_webhook_requires_https() {
        let result = notifier()
            .send(NotificationChannel::Webhook, "http://insecure.example/hook", "hi", "u1")
            .await;
        assert_eq!(result.error.as_deref(), Some("invalid_webhook_target"));
    }
}
