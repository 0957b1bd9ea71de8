//! Port traits for the collaborators this subsystem talks to.
//!
//! Rendering, transport and the rest of the mod-sync client live behind these
//! boundaries. The scene-graph port sits next to its only consumer in
//! [`crate::placard::scene`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::location::HousingPlotLocation;

// =============================================================================
// Wire DTOs
// =============================================================================

/// A registered venue as returned by plot resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueDescriptor {
    pub venue_id: String,
    pub name: String,
    /// Group (syncshell) members are invited into.
    pub group_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<HousingPlotLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueAdvertisement {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueRegistry {
    pub venue_id: String,
    pub name: String,
    #[serde(default)]
    pub advertisements: Vec<VenueAdvertisement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn first(page_size: u32) -> Self {
        Self { page: 1, page_size }
    }
}

// =============================================================================
// Network
// =============================================================================

/// Network venue service (opaque RPC boundary).
#[async_trait]
pub trait VenueService: Send + Sync {
    /// Whether the client currently holds an authenticated session.
    fn is_connected(&self) -> bool;

    async fn resolve_venue_for_plot(
        &self,
        location: &HousingPlotLocation,
    ) -> Result<Option<VenueDescriptor>>;

    async fn join_group(&self, group_id: &str) -> Result<()>;

    async fn leave_group(&self, group_id: &str) -> Result<()>;

    async fn list_venue_registries(
        &self,
        page: PageRequest,
        include_advertisements: bool,
    ) -> Result<Vec<VenueRegistry>>;
}

// =============================================================================
// Local client state
// =============================================================================

/// Group/pair directory kept by the sync client.
pub trait GroupDirectory: Send + Sync {
    fn is_member(&self, group_id: &str) -> bool;
}

/// Local player identity as shown on signage.
pub trait CharacterIdentity: Send + Sync {
    fn player_name(&self) -> Option<String>;
    fn company_tag(&self) -> Option<String>;
}

/// Where the local player currently stands.
pub trait SpatialState: Send + Sync {
    /// Plot the player is standing on, if any.
    fn current_plot(&self) -> Option<HousingPlotLocation>;
    fn current_territory(&self) -> Option<u32>;
}

// =============================================================================
// Notifications
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Status,
    Diagnostic,
    Reminder,
}

/// User-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn status(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Status,
            level,
            message: message.into(),
        }
    }

    pub fn diagnostic(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Diagnostic,
            level,
            message: message.into(),
        }
    }

    pub fn reminder(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Reminder,
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }
}

pub trait NotificationSink: Send + Sync {
    fn notify(&self, notice: Notice);
}
