//! Password delivery
//!
//! Generated passwords leave the process only through a [`Mailer`]. SMTP is
//! not implemented here; deployments plug in their own transport.

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;

/// Delivery failure
#[derive(Debug, Error)]
#[error("failed to send mail to {recipient}: {reason}")]
pub struct MailError {
    pub recipient: String,
    pub reason: String,
}

/// Sends account mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a freshly generated password.
    async fn send_new_password(
        &self,
        first_name: &str,
        password: &str,
        email: &str,
    ) -> Result<(), MailError>;
}

/// Logs that a password mail would have been sent. The password itself is never logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_new_password(
        &self,
        first_name: &str,
        _password: &str,
        email: &str,
    ) -> Result<(), MailError> {
        info!(recipient = %email, first_name = %first_name, "New password mail queued");
        Ok(())
    }
}

/// A password mail captured by [`MemoryMailer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub first_name: String,
    pub password: String,
    pub email: String,
}

/// Keeps mails in memory so callers can read them back.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<SentMail>>,
    fail: bool,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every delivery fails
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Everything sent so far
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().clone()
    }

    /// Most recent password sent to `email`
    pub fn last_password_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|mail| mail.email == email)
            .map(|mail| mail.password.clone())
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send_new_password(
        &self,
        first_name: &str,
        password: &str,
        email: &str,
    ) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError {
                recipient: email.to_string(),
                reason: "delivery disabled".to_string(),
            });
        }
        self.sent.lock().push(SentMail {
            first_name: first_name.to_string(),
            password: password.to_string(),
            email: email.to_string(),
        });
        Ok(())
    }
}
