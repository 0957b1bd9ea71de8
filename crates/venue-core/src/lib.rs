//! venue-core: venue presence & lifecycle coordinator for the mod-sync client.
//!
//! Verifies plot ownership from in-world placards, joins and leaves venue groups as the
//! player crosses plot boundaries, and reminds the player about bookmarked events.
//! Rendering and transport live behind the traits in [`ports`].

mod auto_join;
mod bookmarks;
mod config;
mod error;
mod events;
mod jobs;
mod location;
mod registration;
mod reminders;
pub mod placard;
pub mod ports;

// Ambient
pub use config::VenueSettings;
pub use error::{Result, VenueError};
pub use events::{EventBus, JoinPrompt, VenueEvent};
pub use jobs::{sleep_or_cancel, CancelToken, JobTable, JobTicket};
pub use location::HousingPlotLocation;

// Placard verification
pub use placard::{
    OwnershipReport, OwnershipVerifier, PanelHandle, PlacardAccessor, PlacardSnapshot,
    SceneGraph, SceneTextExtractor,
};
pub use registration::{
    report_notices, PendingRegistration, RegistrationDeps, RegistrationFlowController,
    RegistrationState,
};

// Auto-join
pub use auto_join::{AutoJoinDeps, AutoJoinedVenue, ConfirmOutcome, ProximityAutoJoinCoordinator};

// Bookmarks & reminders
pub use bookmarks::{
    BookmarkPersistence, BookmarkScope, BookmarkStore, JsonDocumentPersistence, ReminderBookmark,
    ReminderTargets, BOOKMARKS_KEY,
};
pub use reminders::{excerpt, PollOutcome, ReminderScheduler, ReminderTrigger, MAX_EXCERPT_CHARS};
