//! Background reminders for bookmarked venues and events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bookmarks::{BookmarkStore, ReminderTargets};
use crate::config::VenueSettings;
use crate::error::{Result, VenueError};
use crate::jobs::{sleep_or_cancel, CancelToken};
use crate::ports::{Notice, NotificationSink, PageRequest, VenueAdvertisement, VenueService};

/// Longest advertisement excerpt in a reminder, ellipsis included.
pub const MAX_EXCERPT_CHARS: usize = 120;

/// What a single poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Disconnected,
    NoBookmarks,
    /// Bookmarks exist but none can match an advertisement; no fetch was made.
    NothingToMatch,
    Fired(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderTrigger {
    EventBookmark,
    VenueBookmark,
}

impl ReminderTrigger {
    fn label(self) -> &'static str {
        match self {
            ReminderTrigger::EventBookmark => "bookmarked event",
            ReminderTrigger::VenueBookmark => "bookmarked venue",
        }
    }
}

struct Inner {
    service: Arc<dyn VenueService>,
    bookmarks: BookmarkStore,
    notices: Arc<dyn NotificationSink>,
    poll_interval: Duration,
    lead: chrono::Duration,
    retention: chrono::Duration,
    page_size: u32,
    master: CancelToken,
    /// advertisement id -> start time already announced
    sent: Mutex<HashMap<String, DateTime<Utc>>>,
}

pub struct ReminderScheduler {
    inner: Arc<Inner>,
    runtime: Handle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReminderScheduler {
    pub fn new(
        service: Arc<dyn VenueService>,
        bookmarks: BookmarkStore,
        notices: Arc<dyn NotificationSink>,
        settings: &VenueSettings,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| VenueError::Runtime(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(Inner {
                service,
                bookmarks,
                notices,
                poll_interval: settings.reminder_poll_interval(),
                lead: settings.reminder_lead()?,
                retention: settings.reminder_retention()?,
                page_size: settings.registry_page_size,
                master: CancelToken::new(),
                sent: Mutex::new(HashMap::new()),
            }),
            runtime,
            task: Mutex::new(None),
        })
    }

    /// Spawn the poll loop. Calling it again while running is a no-op.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        *task = Some(self.runtime.spawn(async move {
            info!(
                target: "venue::reminders",
                interval_secs = inner.poll_interval.as_secs(),
                "reminder scheduler started"
            );
            while sleep_or_cancel(&inner.master, inner.poll_interval).await {
                match inner.poll_once(Utc::now()).await {
                    Ok(outcome) => {
                        debug!(target: "venue::reminders", ?outcome, "reminder poll finished");
                    }
                    Err(e) => {
                        warn!(target: "venue::reminders", error = %e, "reminder poll failed");
                    }
                }
            }
            info!(target: "venue::reminders", "reminder scheduler stopped");
        }));
    }

    /// Run one poll as of `now`.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> Result<PollOutcome> {
        self.inner.poll_once(now).await
    }

    /// Number of advertisements currently remembered as announced.
    pub fn sent_count(&self) -> usize {
        self.inner.sent().len()
    }

    pub async fn shutdown(&self) {
        self.inner.master.cancel();
        let handle = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Inner {
    fn sent(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn poll_once(&self, now: DateTime<Utc>) -> Result<PollOutcome> {
        if !self.service.is_connected() {
            return Ok(PollOutcome::Disconnected);
        }
        if self.bookmarks.is_empty() {
            return Ok(PollOutcome::NoBookmarks);
        }
        let targets = self.bookmarks.reminder_targets();
        if targets.is_empty() {
            return Ok(PollOutcome::NothingToMatch);
        }

        let registries = self
            .service
            .list_venue_registries(PageRequest::first(self.page_size), true)
            .await?;

        let mut due = Vec::new();
        {
            let mut sent = self.sent();
            for registry in &registries {
                for ad in &registry.advertisements {
                    let Some((start, trigger)) =
                        self.candidate(ad, &registry.venue_id, &targets, now)
                    else {
                        continue;
                    };
                    if sent.get(&ad.id) == Some(&start) {
                        continue;
                    }
                    sent.insert(ad.id.clone(), start);
                    due.push(reminder_text(&registry.name, start, trigger, &ad.text));
                }
            }
            if let Some(cutoff) = now.checked_sub_signed(self.retention) {
                sent.retain(|_, start| *start >= cutoff);
            }
        }

        for message in &due {
            info!(target: "venue::reminders", message = %message, "reminder sent");
            self.notices.notify(Notice::reminder(message.clone()));
        }
        Ok(PollOutcome::Fired(due.len()))
    }

    fn candidate(
        &self,
        ad: &VenueAdvertisement,
        venue_id: &str,
        targets: &ReminderTargets,
        now: DateTime<Utc>,
    ) -> Option<(DateTime<Utc>, ReminderTrigger)> {
        if !ad.is_active {
            return None;
        }
        let start = ad.starts_at?;
        let trigger = if targets.advertisement_ids.contains(&ad.id) {
            ReminderTrigger::EventBookmark
        } else if targets.venue_ids.contains(venue_id) {
            ReminderTrigger::VenueBookmark
        } else {
            return None;
        };
        let horizon = now.checked_add_signed(self.lead)?;
        (now < start && start <= horizon).then_some((start, trigger))
    }
}

fn reminder_text(
    venue_name: &str,
    start: DateTime<Utc>,
    trigger: ReminderTrigger,
    ad_text: &str,
) -> String {
    let local = start.with_timezone(&Local).format("%a %b %-d, %H:%M");
    let excerpt = excerpt(ad_text);
    if excerpt.is_empty() {
        format!("{venue_name} starts at {local} ({}).", trigger.label())
    } else {
        format!("{venue_name} starts at {local} ({}): {excerpt}", trigger.label())
    }
}

/// Trim to at most [`MAX_EXCERPT_CHARS`] characters, ending in an ellipsis when cut.
pub fn excerpt(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= MAX_EXCERPT_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(MAX_EXCERPT_CHARS - 1).collect();
    cut.push('…');
    cut
}
