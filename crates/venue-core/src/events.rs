//! Typed event bus connecting the spatial trigger source, the coordinators and the UI layer.
//!
//! Inbound signals (`PlotEntered`, `PlotLeft`, `Disconnected`) are published by the
//! game-side hooks; coordinators publish the outbound variants for the UI to render.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::location::HousingPlotLocation;
use crate::ports::VenueDescriptor;

/// Pending offer to join a venue's group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPrompt {
    pub prompt_id: uuid::Uuid,
    pub venue: VenueDescriptor,
    pub location: HousingPlotLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "event", content = "data")]
pub enum VenueEvent {
    PlotEntered(HousingPlotLocation),
    PlotLeft(HousingPlotLocation),
    Disconnected,
    PromptOpened(JoinPrompt),
    #[serde(rename_all = "camelCase")]
    PromptCleared { prompt_id: uuid::Uuid },
    #[serde(rename_all = "camelCase")]
    AutoJoined {
        group_id: String,
        location: HousingPlotLocation,
    },
    #[serde(rename_all = "camelCase")]
    AutoLeft { group_id: String },
    #[serde(rename_all = "camelCase")]
    RegistrationVerified {
        location: HousingPlotLocation,
        authorized: bool,
        plot_matches: bool,
    },
}

impl VenueEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            VenueEvent::PlotEntered(_) => "plot_entered",
            VenueEvent::PlotLeft(_) => "plot_left",
            VenueEvent::Disconnected => "disconnected",
            VenueEvent::PromptOpened(_) => "prompt_opened",
            VenueEvent::PromptCleared { .. } => "prompt_cleared",
            VenueEvent::AutoJoined { .. } => "auto_joined",
            VenueEvent::AutoLeft { .. } => "auto_left",
            VenueEvent::RegistrationVerified { .. } => "registration_verified",
        }
    }
}

/// Broadcast-based bus. Cheap to clone; every clone feeds the same channel.
/// Slow receivers get `Lagged` and miss events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<VenueEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to all subscribers; dropped silently when nobody listens.
    pub fn publish(&self, event: VenueEvent) {
        tracing::debug!(
            target: "venue::events",
            event_type = event.event_type(),
            subscriber_count = self.tx.receiver_count(),
            "publish"
        );
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VenueEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
