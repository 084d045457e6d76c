use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

static SPOOL_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct Newsletter {
    pub subject: String,
    pub html: String,
    pub recipients: Vec<String>,
}

/// Delivers a rendered newsletter. Batching and transport are the mailer's
/// business, not the pipeline's.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, newsletter: &Newsletter) -> Result<()>;
}

/// Spools one message file per recipient batch for the host MTA to pick up.
#[derive(Debug, Clone)]
pub struct OutboxMailer {
    dir: PathBuf,
    batch_size: usize,
}

impl OutboxMailer {
    pub fn new(dir: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            dir: dir.into(),
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, newsletter: &Newsletter) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create outbox {}", self.dir.display()))?;
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%9f");
        let pid = std::process::id();
        for (i, batch) in newsletter.recipients.chunks(self.batch_size).enumerate() {
            let seq = SPOOL_SEQUENCE.fetch_add(1, Ordering::Relaxed);
            let name = format!("{stamp}-{pid}-{seq:06}-{i:03}");
            let partial = self.dir.join(format!("{name}.eml.tmp"));
            let path = self.dir.join(format!("{name}.eml"));
            let message = format_message(&newsletter.subject, &newsletter.html, batch);
            tokio::fs::write(&partial, message)
                .await
                .with_context(|| format!("Failed to write {}", partial.display()))?;
            // Pickup only ever sees complete messages.
            tokio::fs::rename(&partial, &path)
                .await
                .with_context(|| format!("Failed to move {} into place", path.display()))?;
            info!("Spooled batch {} ({} recipients) to {}", i, batch.len(), path.display());
        }
        Ok(())
    }
}

fn format_message(subject: &str, html: &str, recipients: &[String]) -> String {
    format!(
        "Bcc: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/html; charset=utf-8\r\n\r\n{}",
        recipients.join(", "),
        subject.replace(['\r', '\n'], " "),
        html
    )
}
