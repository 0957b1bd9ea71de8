//! Venue coordinator settings loaded from TOML and environment.
//!
//! | Key / Env (`VENUE__<KEY>`) | Default | Description |
//! |-----|---------|-------------|
//! | auto_join_enabled | true | Offer to join a venue's group when entering its plot. |
//! | grace_period_secs | 120 | Debounce after leaving a plot before auto-leaving its group. |
//! | placard_settle_ms | 500 | Wait after the placard opens before reading its text. |
//! | placard_addon_name | HousingSignBoard | UI element name of the placard panel. |
//! | reminder_poll_secs | 60 | Reminder scheduler cadence. |
//! | reminder_lead_minutes | 60 | Fire a reminder when an event starts within this window. |
//! | reminder_retention_hours | 2 | Keep dedup records this long after an event started. |
//! | registry_page_size | 100 | Page size for the venue registry fetch. |
//! | event_bus_capacity | 256 | Broadcast buffer per subscriber. |
//! | bookmark_file | config/venue_bookmarks.json | Configuration document holding bookmarks. |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bookmarks::JsonDocumentPersistence;
use crate::error::{Result, VenueError};
use crate::events::EventBus;

/// Default config file stem (extension resolved by the `config` crate).
const DEFAULT_CONFIG_PATH: &str = "config/venue";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueSettings {
    #[serde(default = "default_true")]
    pub auto_join_enabled: bool,
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    #[serde(default = "default_placard_settle_ms")]
    pub placard_settle_ms: u64,
    #[serde(default = "default_placard_addon_name")]
    pub placard_addon_name: String,
    #[serde(default = "default_reminder_poll_secs")]
    pub reminder_poll_secs: u64,
    #[serde(default = "default_reminder_lead_minutes")]
    pub reminder_lead_minutes: i64,
    #[serde(default = "default_reminder_retention_hours")]
    pub reminder_retention_hours: i64,
    #[serde(default = "default_registry_page_size")]
    pub registry_page_size: u32,
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
    #[serde(default = "default_bookmark_file")]
    pub bookmark_file: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_grace_period_secs() -> u64 {
    120
}

fn default_placard_settle_ms() -> u64 {
    500
}

fn default_placard_addon_name() -> String {
    "HousingSignBoard".to_string()
}

fn default_reminder_poll_secs() -> u64 {
    60
}

fn default_reminder_lead_minutes() -> i64 {
    60
}

fn default_reminder_retention_hours() -> i64 {
    2
}

fn default_registry_page_size() -> u32 {
    100
}

fn default_event_bus_capacity() -> usize {
    256
}

fn default_bookmark_file() -> PathBuf {
    PathBuf::from("config/venue_bookmarks.json")
}

impl Default for VenueSettings {
    fn default() -> Self {
        Self {
            auto_join_enabled: default_true(),
            grace_period_secs: default_grace_period_secs(),
            placard_settle_ms: default_placard_settle_ms(),
            placard_addon_name: default_placard_addon_name(),
            reminder_poll_secs: default_reminder_poll_secs(),
            reminder_lead_minutes: default_reminder_lead_minutes(),
            reminder_retention_hours: default_reminder_retention_hours(),
            registry_page_size: default_registry_page_size(),
            event_bus_capacity: default_event_bus_capacity(),
            bookmark_file: default_bookmark_file(),
        }
    }
}

impl VenueSettings {
    /// Load settings. Precedence: `VENUE__*` env > file at `$VENUE_CONFIG` (or `config/venue.*`) > defaults.
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("VENUE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load settings from an explicit file path (missing file is not an error).
    pub fn load_from(path: &Path) -> Result<Self> {
        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("auto_join_enabled", defaults.auto_join_enabled)?
            .set_default("grace_period_secs", defaults.grace_period_secs)?
            .set_default("placard_settle_ms", defaults.placard_settle_ms)?
            .set_default("placard_addon_name", defaults.placard_addon_name.clone())?
            .set_default("reminder_poll_secs", defaults.reminder_poll_secs)?
            .set_default("reminder_lead_minutes", defaults.reminder_lead_minutes)?
            .set_default("reminder_retention_hours", defaults.reminder_retention_hours)?
            .set_default("registry_page_size", defaults.registry_page_size as u64)?
            .set_default("event_bus_capacity", defaults.event_bus_capacity as u64)?
            .set_default(
                "bookmark_file",
                defaults.bookmark_file.to_string_lossy().to_string(),
            )?;

        let built = builder
            .add_source(config::File::from(path.to_path_buf()).required(false))
            .add_source(
                config::Environment::with_prefix("VENUE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Self = built.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject reminder windows that are negative or too large to add to a timestamp.
    pub fn validate(&self) -> Result<()> {
        self.reminder_lead()?;
        self.reminder_retention()?;
        Ok(())
    }

    /// Event bus sized by `event_bus_capacity`.
    pub fn event_bus(&self) -> EventBus {
        EventBus::new(self.event_bus_capacity)
    }

    /// Persistence for the configuration document at `bookmark_file`.
    pub fn bookmark_persistence(&self) -> JsonDocumentPersistence {
        JsonDocumentPersistence::new(self.bookmark_file.clone())
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn placard_settle_delay(&self) -> Duration {
        Duration::from_millis(self.placard_settle_ms)
    }

    /// Poll cadence, floored at one second.
    pub fn reminder_poll_interval(&self) -> Duration {
        Duration::from_secs(self.reminder_poll_secs.max(1))
    }

    pub fn reminder_lead(&self) -> Result<chrono::Duration> {
        window("reminder_lead_minutes", self.reminder_lead_minutes, chrono::Duration::try_minutes)
    }

    pub fn reminder_retention(&self) -> Result<chrono::Duration> {
        window(
            "reminder_retention_hours",
            self.reminder_retention_hours,
            chrono::Duration::try_hours,
        )
    }
}

/// Longest reminder window accepted: one year.
const MAX_WINDOW_DAYS: i64 = 366;

fn window(
    key: &str,
    value: i64,
    to_duration: fn(i64) -> Option<chrono::Duration>,
) -> Result<chrono::Duration> {
    to_duration(value)
        .filter(|d| *d >= chrono::Duration::zero() && d.num_days() <= MAX_WINDOW_DAYS)
        .ok_or_else(|| {
            VenueError::Config(config::ConfigError::Message(format!(
                "{key} = {value} is outside 0..={MAX_WINDOW_DAYS} days"
            )))
        })
}
