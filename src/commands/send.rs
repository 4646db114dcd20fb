use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context as _;
use clap::Args;

use crate::context::Context;
use crate::error::ExitError;
use crate::store::atomic_write;

/// Extension of inbox message files; the file stem is the message id.
pub const MESSAGE_EXT: &str = "msg";

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Message text: a slash command or a new mission
    #[arg(required = true, trailing_var_arg = true)]
    pub text: Vec<String>,
}

/// Time-ordered, process-unique message id.
pub fn message_id() -> String {
    static SEQ: AtomicU32 = AtomicU32::new(0);
    format!(
        "{:013}-{}-{:04}",
        chrono::Utc::now().timestamp_millis(),
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed) % 10_000
    )
}

/// Write `text` into the inbox as one message file.
pub fn drop_message(inbox: &Path, text: &str) -> anyhow::Result<PathBuf> {
    let path = inbox.join(format!("{}.{MESSAGE_EXT}", message_id()));
    atomic_write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    tracing::debug!(path = %path.display(), "message dropped in inbox");
    Ok(path)
}

impl SendArgs {
    pub fn execute(&self, ctx: &Context) -> anyhow::Result<()> {
        let text = self.text.join(" ");
        if text.trim().is_empty() {
            return Err(ExitError::Other("message is empty".to_string()).into());
        }
        let path = drop_message(&ctx.inbox_dir(), &text)?;
        println!("Sent {}", path.file_stem().unwrap_or_default().to_string_lossy());
        Ok(())
    }
}
