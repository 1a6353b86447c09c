//! Outbound notification contract.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{error, info, warn};

use opsguard_core::BoxFuture;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Critical,
    /// Operator-initiated emergency actions; routed at highest priority.
    Emergency,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Delivers notices to operators (email, chat, pager).
pub trait Notifier: Send + Sync {
    fn notify<'a>(&'a self, notice: &'a Notice) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Writes notices to the log. Used when no external sender is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify<'a>(&'a self, notice: &'a Notice) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            match notice.level {
                NoticeLevel::Info => info!(title = %notice.title, "{}", notice.message),
                NoticeLevel::Critical => warn!(title = %notice.title, "{}", notice.message),
                NoticeLevel::Emergency => error!(title = %notice.title, "{}", notice.message),
            }
            Ok(())
        })
    }
}

/// Keeps every notice in memory; optionally fails delivery after storing.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notices: Mutex<Vec<Notice>>,
    failing: AtomicBool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent deliveries return an error (the notice is still kept).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().expect("notices lock").clone()
    }
}

impl Notifier for MemoryNotifier {
    fn notify<'a>(&'a self, notice: &'a Notice) -> BoxFuture<'a, anyhow::Result<()>> {
        self.notices
            .lock()
            .expect("notices lock")
            .push(notice.clone());
        let failing = self.failing.load(Ordering::SeqCst);
        Box::pin(async move {
            if failing {
                anyhow::bail!("notification channel unavailable");
            }
            Ok(())
        })
    }
}

/// Send a notice, logging and discarding any delivery error.
///
/// Returns whether delivery succeeded.
pub async fn notify_best_effort(notifier: &dyn Notifier, notice: &Notice) -> bool {
    match notifier.notify(notice).await {
        Ok(()) => true,
        Err(e) => {
            warn!(title = %notice.title, error = %e, "notification delivery failed");
            false
        }
    }
}
