//! Venue and event bookmarks that gate reminders.
//!
//! The list lives inside the client's larger configuration document; this module only
//! owns the in-memory copy. Every change is staged on a copy, handed to
//! [`BookmarkPersistence::persist`], and becomes visible only once that succeeds.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;

/// Key the bookmark list is stored under in the configuration document.
pub const BOOKMARKS_KEY: &str = "venueBookmarks";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookmarkScope {
    Venue,
    Event,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderBookmark {
    pub bookmark_id: Uuid,
    pub scope: BookmarkScope,
    pub venue_id: String,
    pub venue_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertisement_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at_utc: Option<DateTime<Utc>>,
    pub created_at_utc: DateTime<Utc>,
}

/// "Persist configuration" side effect of the host client.
pub trait BookmarkPersistence: Send + Sync {
    fn load(&self) -> Result<Vec<ReminderBookmark>>;
    fn persist(&self, bookmarks: &[ReminderBookmark]) -> Result<()>;
}

/// Stores bookmarks under [`BOOKMARKS_KEY`] of a JSON document, leaving other keys untouched.
#[derive(Debug, Clone)]
pub struct JsonDocumentPersistence {
    path: PathBuf,
}

impl JsonDocumentPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        if !self.path.exists() {
            return Ok(serde_json::Map::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(serde_json::Map::new());
        }
        match serde_json::from_str::<serde_json::Value>(&content)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Ok(serde_json::Map::new()),
        }
    }
}

impl BookmarkPersistence for JsonDocumentPersistence {
    fn load(&self) -> Result<Vec<ReminderBookmark>> {
        let mut document = self.read_document()?;
        match document.remove(BOOKMARKS_KEY) {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    fn persist(&self, bookmarks: &[ReminderBookmark]) -> Result<()> {
        let mut document = self.read_document()?;
        document.insert(BOOKMARKS_KEY.to_string(), serde_json::to_value(bookmarks)?);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&serde_json::Value::Object(document))?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderTargets {
    pub advertisement_ids: HashSet<String>,
    pub venue_ids: HashSet<String>,
}

impl ReminderTargets {
    pub fn is_empty(&self) -> bool {
        self.advertisement_ids.is_empty() && self.venue_ids.is_empty()
    }
}

/// Thread-safe bookmark list. Clones share the same list.
#[derive(Clone)]
pub struct BookmarkStore {
    bookmarks: Arc<Mutex<Vec<ReminderBookmark>>>,
    persistence: Arc<dyn BookmarkPersistence>,
}

impl BookmarkStore {
    /// Load the current list from `persistence`.
    pub fn open(persistence: Arc<dyn BookmarkPersistence>) -> Result<Self> {
        let mut bookmarks = persistence.load()?;
        dedup_loaded(&mut bookmarks);
        info!(target: "venue::bookmarks", count = bookmarks.len(), "bookmarks loaded");
        Ok(Self {
            bookmarks: Arc::new(Mutex::new(bookmarks)),
            persistence,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ReminderBookmark>> {
        self.bookmarks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bookmark a venue. Returns `true` if newly added, `false` if the name was updated.
    pub fn add_venue_bookmark(&self, venue_id: &str, venue_name: &str) -> Result<bool> {
        let mut list = self.lock();
        let mut next = list.clone();
        let added = match next
            .iter_mut()
            .find(|b| b.scope == BookmarkScope::Venue && b.venue_id == venue_id)
        {
            Some(existing) => {
                existing.venue_name = venue_name.to_string();
                false
            }
            None => {
                next.push(ReminderBookmark {
                    bookmark_id: Uuid::new_v4(),
                    scope: BookmarkScope::Venue,
                    venue_id: venue_id.to_string(),
                    venue_name: venue_name.to_string(),
                    advertisement_id: None,
                    event_summary: None,
                    starts_at_utc: None,
                    created_at_utc: Utc::now(),
                });
                true
            }
        };
        self.persistence.persist(&next)?;
        *list = next;
        debug!(target: "venue::bookmarks", venue_id, added, "venue bookmark saved");
        Ok(added)
    }

    /// Bookmark a scheduled event. Returns `true` if newly added, `false` if updated in place.
    pub fn add_event_bookmark(
        &self,
        venue_id: &str,
        venue_name: &str,
        advertisement_id: &str,
        event_summary: Option<&str>,
        starts_at_utc: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let mut list = self.lock();
        let mut next = list.clone();
        let added = match next.iter_mut().find(|b| {
            b.scope == BookmarkScope::Event && b.advertisement_id.as_deref() == Some(advertisement_id)
        }) {
            Some(existing) => {
                existing.venue_id = venue_id.to_string();
                existing.venue_name = venue_name.to_string();
                existing.event_summary = event_summary.map(str::to_string);
                existing.starts_at_utc = starts_at_utc;
                false
            }
            None => {
                next.push(ReminderBookmark {
                    bookmark_id: Uuid::new_v4(),
                    scope: BookmarkScope::Event,
                    venue_id: venue_id.to_string(),
                    venue_name: venue_name.to_string(),
                    advertisement_id: Some(advertisement_id.to_string()),
                    event_summary: event_summary.map(str::to_string),
                    starts_at_utc,
                    created_at_utc: Utc::now(),
                });
                true
            }
        };
        self.persistence.persist(&next)?;
        *list = next;
        debug!(target: "venue::bookmarks", advertisement_id, added, "event bookmark saved");
        Ok(added)
    }

    pub fn remove_venue_bookmark(&self, venue_id: &str) -> Result<bool> {
        self.remove_where(|b| b.scope == BookmarkScope::Venue && b.venue_id == venue_id)
    }

    pub fn remove_event_bookmark(&self, advertisement_id: &str) -> Result<bool> {
        self.remove_where(|b| {
            b.scope == BookmarkScope::Event && b.advertisement_id.as_deref() == Some(advertisement_id)
        })
    }

    /// Returns the number of bookmarks removed.
    pub fn clear_venue_bookmarks(&self) -> Result<usize> {
        self.clear_scope(BookmarkScope::Venue)
    }

    pub fn clear_event_bookmarks(&self) -> Result<usize> {
        self.clear_scope(BookmarkScope::Event)
    }

    pub fn list_venue_bookmarks(&self) -> Vec<ReminderBookmark> {
        self.list_scope(Some(BookmarkScope::Venue))
    }

    pub fn list_event_bookmarks(&self) -> Vec<ReminderBookmark> {
        self.list_scope(Some(BookmarkScope::Event))
    }

    /// Every bookmark, ordered by scope, then name (case-insensitive), then creation time.
    pub fn list_all(&self) -> Vec<ReminderBookmark> {
        self.list_scope(None)
    }

    pub fn is_venue_bookmarked(&self, venue_id: &str) -> bool {
        self.lock()
            .iter()
            .any(|b| b.scope == BookmarkScope::Venue && b.venue_id == venue_id)
    }

    pub fn is_event_bookmarked(&self, advertisement_id: &str) -> bool {
        self.lock().iter().any(|b| {
            b.scope == BookmarkScope::Event && b.advertisement_id.as_deref() == Some(advertisement_id)
        })
    }

    /// Id sets the reminder scheduler matches advertisements against.
    pub fn reminder_targets(&self) -> ReminderTargets {
        let list = self.lock();
        let mut targets = ReminderTargets::default();
        for bookmark in list.iter() {
            match bookmark.scope {
                BookmarkScope::Venue => {
                    targets.venue_ids.insert(bookmark.venue_id.clone());
                }
                BookmarkScope::Event => {
                    if let Some(id) = &bookmark.advertisement_id {
                        targets.advertisement_ids.insert(id.clone());
                    }
                }
            }
        }
        targets
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn remove_where(&self, pred: impl Fn(&ReminderBookmark) -> bool) -> Result<bool> {
        let mut list = self.lock();
        let next: Vec<ReminderBookmark> = list.iter().filter(|b| !pred(b)).cloned().collect();
        if next.len() == list.len() {
            return Ok(false);
        }
        self.persistence.persist(&next)?;
        *list = next;
        Ok(true)
    }

    fn clear_scope(&self, scope: BookmarkScope) -> Result<usize> {
        let mut list = self.lock();
        let next: Vec<ReminderBookmark> = list.iter().filter(|b| b.scope != scope).cloned().collect();
        let removed = list.len() - next.len();
        if removed > 0 {
            self.persistence.persist(&next)?;
            *list = next;
            info!(target: "venue::bookmarks", ?scope, removed, "bookmarks cleared");
        }
        Ok(removed)
    }

    fn list_scope(&self, scope: Option<BookmarkScope>) -> Vec<ReminderBookmark> {
        let mut snapshot: Vec<ReminderBookmark> = self
            .lock()
            .iter()
            .filter(|b| scope.map_or(true, |s| b.scope == s))
            .cloned()
            .collect();
        snapshot.sort_by(|a, b| {
            a.scope
                .cmp(&b.scope)
                .then_with(|| a.venue_name.to_lowercase().cmp(&b.venue_name.to_lowercase()))
                .then_with(|| a.created_at_utc.cmp(&b.created_at_utc))
        });
        snapshot
    }
}

/// Drop duplicate keys from a hand-edited or legacy document, keeping the first entry.
fn dedup_loaded(bookmarks: &mut Vec<ReminderBookmark>) {
    let mut seen = HashSet::new();
    bookmarks.retain(|b| {
        let key = match b.scope {
            BookmarkScope::Venue => (b.scope, b.venue_id.clone()),
            BookmarkScope::Event => match &b.advertisement_id {
                Some(id) => (b.scope, id.clone()),
                None => return false,
            },
        };
        seen.insert(key)
    });
}
