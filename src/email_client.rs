/// Best-effort email notification side-channel.
///
/// The refresh protocol fires a notification when a refresh arrives from an
/// unexpected origin. Delivery failures are logged by the dispatcher and
/// never reach the client's request path.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::NotifyError;
use crate::validators::is_valid_email;

/// Out-of-band alert dispatch, abstracted so the protocol can be tested
/// without a mail service.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

#[derive(Clone)]
pub struct EmailClient {
    http_client: reqwest::Client,
    base_url: String,
    sender: SenderEmail,
}

/// A validated sender address.
#[derive(Clone)]
pub struct SenderEmail(String);

impl SenderEmail {
    pub fn parse(s: String) -> Result<Self, String> {
        let email = is_valid_email(&s).map_err(|e| e.to_string())?;
        Ok(Self(email))
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

impl EmailClient {
    pub fn new(base_url: String, sender: SenderEmail, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            base_url,
            sender,
        }
    }
}

#[async_trait]
impl NotificationSink for EmailClient {
    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let url = format!("{}/email", self.base_url);
        let request = SendEmailRequest {
            from: self.sender.inner(),
            to: recipient,
            subject,
            body,
        };

        self.http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| NotifyError::ServiceUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| NotifyError::SendFailed(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_parse_accepts_valid_email() {
        assert!(SenderEmail::parse("alerts@example.com".to_string()).is_ok());
    }

    #[test]
    fn sender_parse_rejects_invalid_email() {
        assert!(SenderEmail::parse("not-an-email".to_string()).is_err());
    }
}
