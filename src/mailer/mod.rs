//! Outbound email for the verification flow.

mod smtp;
mod templates;

pub use smtp::SmtpMailer;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Builds the link embedded in verification emails.
pub fn verification_link(frontend_base_url: &str, token: &str) -> String {
    format!(
        "{}/verify-email?token={}",
        frontend_base_url.trim_end_matches('/'),
        token
    )
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send the verification email for a pending self-registration.
    /// An `Err` surfaces to the caller as a delivery failure.
    async fn send_verification_email(&self, to_email: &str, name: &str, token: &str)
        -> Result<()>;
}

/// Fallback mailer for deployments without SMTP configured: logs the
/// verification link instead of sending it. Useful in development, where the
/// operator completes the flow by opening the logged link.
pub struct LogMailer {
    frontend_base_url: String,
}

impl LogMailer {
    pub fn new(frontend_base_url: String) -> Self {
        Self { frontend_base_url }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification_email(
        &self,
        to_email: &str,
        _name: &str,
        token: &str,
    ) -> Result<()> {
        info!(
            to = %to_email,
            link = %verification_link(&self.frontend_base_url, token),
            "SMTP not configured; verification link logged instead of emailed"
        );
        Ok(())
    }
}
