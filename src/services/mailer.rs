//! Outbound mail seam.
//!
//! Actual delivery is an external collaborator; this trait is the narrow
//! interface the reset-password flow talks to. The default implementation
//! writes the message to the log, which is enough for development and tests.

use async_trait::async_trait;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> anyhow::Result<()>;
}

pub struct LogMailer {
    from_address: String,
}

impl LogMailer {
    #[must_use]
    pub const fn new(from_address: String) -> Self {
        Self { from_address }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> anyhow::Result<()> {
        tracing::info!(
            from = %self.from_address,
            to = %to,
            subject = %subject,
            body_bytes = html_body.len(),
            "Outgoing mail (log-only delivery)"
        );
        Ok(())
    }
}
