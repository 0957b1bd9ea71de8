//! Proximity auto-join: offer a venue's group when the player walks onto its plot, and
//! leave it again after a grace period once they walk off.
//!
//! All bookkeeping (auto-joined groups, pending removals, the active prompt) lives in one
//! `AutoJoinState` behind one mutex. Network calls and timer waits happen outside it.
//! A disconnect starts a new session; results of calls issued in an older session are
//! dropped when they come back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::VenueSettings;
use crate::error::{Result, VenueError};
use crate::events::{EventBus, JoinPrompt, VenueEvent};
use crate::jobs::{sleep_or_cancel, CancelToken, JobTable, JobTicket};
use crate::location::HousingPlotLocation;
use crate::ports::{GroupDirectory, Notice, NoticeLevel, NotificationSink, VenueService};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoJoinedVenue {
    pub group_id: String,
    pub venue_id: String,
    pub venue_name: String,
    pub entered_location: HousingPlotLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Unknown or stale prompt id; nothing happened.
    Ignored,
    /// Already in the group through the directory; no join issued.
    AlreadyMember,
    Joined,
}

#[derive(Clone)]
pub struct AutoJoinDeps {
    pub service: Arc<dyn VenueService>,
    pub directory: Arc<dyn GroupDirectory>,
    pub notices: Arc<dyn NotificationSink>,
}

#[derive(Debug, Default)]
struct AutoJoinState {
    auto_joined: HashMap<String, AutoJoinedVenue>,
    removals: JobTable<String>,
    active_prompt: Option<JoinPrompt>,
    /// Bumped on every disconnect.
    session: u64,
}

impl AutoJoinState {
    fn groups_entered_at(&self, location: &HousingPlotLocation) -> Vec<String> {
        let mut groups: Vec<String> = self
            .auto_joined
            .values()
            .filter(|v| &v.entered_location == location)
            .map(|v| v.group_id.clone())
            .collect();
        groups.sort();
        groups
    }
}

struct Inner {
    deps: AutoJoinDeps,
    bus: EventBus,
    enabled: AtomicBool,
    grace_period: Duration,
    runtime: Handle,
    master: CancelToken,
    state: Mutex<AutoJoinState>,
}

pub struct ProximityAutoJoinCoordinator {
    inner: Arc<Inner>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ProximityAutoJoinCoordinator {
    /// Must be created from within a Tokio runtime; grace timers are spawned onto it.
    pub fn new(deps: AutoJoinDeps, settings: &VenueSettings, bus: EventBus) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| VenueError::Runtime(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(Inner {
                deps,
                bus,
                enabled: AtomicBool::new(settings.auto_join_enabled),
                grace_period: settings.grace_period(),
                runtime,
                master: CancelToken::new(),
                state: Mutex::new(AutoJoinState::default()),
            }),
            listener: Mutex::new(None),
        })
    }

    /// Subscribe to the bus and dispatch spatial/session events until shutdown.
    pub fn start(&self) {
        let mut listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if listener.is_some() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let mut rx = inner.bus.subscribe();
        let master = inner.master.clone();
        *listener = Some(self.inner.runtime.spawn(async move {
            info!(target: "venue::auto_join", "auto-join listener started");
            loop {
                tokio::select! {
                    _ = master.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(VenueEvent::PlotEntered(location)) => {
                            inner.on_plot_entered(location).await;
                        }
                        Ok(VenueEvent::PlotLeft(location)) => inner.on_plot_left(location),
                        Ok(VenueEvent::Disconnected) => inner.on_disconnected(),
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(target: "venue::auto_join", skipped, "event listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            info!(target: "venue::auto_join", "auto-join listener stopped");
        }));
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Player walked onto `location`. Returns the prompt published, if any.
    pub async fn on_plot_entered(&self, location: HousingPlotLocation) -> Option<JoinPrompt> {
        self.inner.on_plot_entered(location).await
    }

    pub fn on_plot_left(&self, location: HousingPlotLocation) {
        self.inner.on_plot_left(location);
    }

    pub fn on_disconnected(&self) {
        self.inner.on_disconnected();
    }

    /// Accept the prompt with `prompt_id`. A join failure leaves the prompt in place.
    pub async fn confirm(&self, prompt_id: Uuid) -> Result<ConfirmOutcome> {
        self.inner.confirm(prompt_id).await
    }

    /// Decline the prompt. Returns whether `prompt_id` was the active one.
    pub fn dismiss(&self, prompt_id: Uuid) -> bool {
        let cleared = {
            let mut state = self.inner.lock();
            let is_active = state
                .active_prompt
                .as_ref()
                .is_some_and(|p| p.prompt_id == prompt_id);
            is_active && state.active_prompt.take().is_some()
        };
        if cleared {
            self.inner.bus.publish(VenueEvent::PromptCleared { prompt_id });
        }
        cleared
    }

    pub fn active_prompt(&self) -> Option<JoinPrompt> {
        self.inner.lock().active_prompt.clone()
    }

    /// Auto-joined venues sorted by group id.
    pub fn auto_joined(&self) -> Vec<AutoJoinedVenue> {
        let state = self.inner.lock();
        let mut venues: Vec<AutoJoinedVenue> = state.auto_joined.values().cloned().collect();
        venues.sort_by(|a, b| a.group_id.cmp(&b.group_id));
        venues
    }

    /// Group ids with a grace-period leave scheduled.
    pub fn pending_removals(&self) -> Vec<String> {
        self.inner.lock().removals.keys()
    }

    /// Stop the listener and cancel every grace timer.
    pub async fn shutdown(&self) {
        self.inner.master.cancel();
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        let cancelled = self.inner.lock().removals.cancel_all();
        debug!(target: "venue::auto_join", cancelled, "auto-join coordinator shut down");
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, AutoJoinState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn on_plot_entered(&self, location: HousingPlotLocation) -> Option<JoinPrompt> {
        let session = {
            let mut state = self.lock();
            for group_id in state.groups_entered_at(&location) {
                if state.removals.cancel(&group_id) {
                    debug!(target: "venue::auto_join", group_id = %group_id, "re-entered plot; pending leave cancelled");
                }
            }
            state.session
        };

        if !self.enabled.load(Ordering::SeqCst) || !self.deps.service.is_connected() {
            return None;
        }

        let venue = match self.deps.service.resolve_venue_for_plot(&location).await {
            Ok(Some(venue)) => venue,
            Ok(None) => return None,
            Err(e) => {
                warn!(target: "venue::auto_join", location = %location, error = %e, "venue lookup failed");
                return None;
            }
        };

        if self.deps.directory.is_member(&venue.group_id) {
            debug!(target: "venue::auto_join", group_id = %venue.group_id, "already a member; no prompt");
            return None;
        }

        let prompt = {
            let mut state = self.lock();
            if state.session != session {
                debug!(target: "venue::auto_join", location = %location, "disconnected during lookup; no prompt");
                return None;
            }
            if state.auto_joined.contains_key(&venue.group_id) {
                return None;
            }
            let prompt = JoinPrompt {
                prompt_id: Uuid::new_v4(),
                venue,
                location,
            };
            state.active_prompt = Some(prompt.clone());
            prompt
        };

        info!(
            target: "venue::auto_join",
            prompt_id = %prompt.prompt_id,
            venue = %prompt.venue.name,
            group_id = %prompt.venue.group_id,
            "join prompt opened"
        );
        self.bus.publish(VenueEvent::PromptOpened(prompt.clone()));
        Some(prompt)
    }

    async fn confirm(&self, prompt_id: Uuid) -> Result<ConfirmOutcome> {
        // Taking the prompt out of the slot turns a concurrent duplicate confirm into a no-op.
        let (prompt, session) = {
            let mut state = self.lock();
            let is_active = state
                .active_prompt
                .as_ref()
                .is_some_and(|p| p.prompt_id == prompt_id);
            let prompt = if is_active {
                state.active_prompt.take()
            } else {
                None
            };
            (prompt, state.session)
        };
        let Some(prompt) = prompt else {
            debug!(target: "venue::auto_join", prompt_id = %prompt_id, "stale prompt confirmation ignored");
            return Ok(ConfirmOutcome::Ignored);
        };
        let group_id = prompt.venue.group_id.clone();

        if self.deps.directory.is_member(&group_id) {
            self.bus.publish(VenueEvent::PromptCleared { prompt_id });
            return Ok(ConfirmOutcome::AlreadyMember);
        }

        if let Err(e) = self.deps.service.join_group(&group_id).await {
            warn!(target: "venue::auto_join", group_id = %group_id, error = %e, "join failed");
            let restored = {
                let mut state = self.lock();
                let restore = state.session == session && state.active_prompt.is_none();
                if restore {
                    state.active_prompt = Some(prompt.clone());
                }
                restore
            };
            if !restored {
                self.bus.publish(VenueEvent::PromptCleared { prompt_id });
            }
            self.deps.notices.notify(Notice::status(
                NoticeLevel::Error,
                format!("Could not join {}'s syncshell: {e}", prompt.venue.name),
            ));
            return Err(e);
        }

        let tracked = {
            let mut state = self.lock();
            let current = state.session == session;
            if current {
                state.auto_joined.insert(
                    group_id.clone(),
                    AutoJoinedVenue {
                        group_id: group_id.clone(),
                        venue_id: prompt.venue.venue_id.clone(),
                        venue_name: prompt.venue.name.clone(),
                        entered_location: prompt.location,
                    },
                );
            }
            current
        };

        self.bus.publish(VenueEvent::PromptCleared { prompt_id });
        if tracked {
            info!(target: "venue::auto_join", group_id = %group_id, venue = %prompt.venue.name, "auto-joined venue group");
            self.bus.publish(VenueEvent::AutoJoined {
                group_id,
                location: prompt.location,
            });
        } else {
            warn!(target: "venue::auto_join", group_id = %group_id, "joined after a disconnect; group not tracked for auto-leave");
        }
        self.deps.notices.notify(Notice::status(
            NoticeLevel::Success,
            format!("Joined {}'s syncshell.", prompt.venue.name),
        ));
        Ok(ConfirmOutcome::Joined)
    }

    fn on_plot_left(self: &Arc<Self>, location: HousingPlotLocation) {
        let mut state = self.lock();
        for group_id in state.groups_entered_at(&location) {
            let ticket = state.removals.replace(group_id.clone());
            debug!(
                target: "venue::auto_join",
                group_id = %group_id,
                grace_secs = self.grace_period.as_secs(),
                "left plot; leave scheduled"
            );
            let inner = Arc::clone(self);
            self.runtime
                .spawn(async move { inner.leave_after_grace(group_id, ticket).await });
        }
    }

    async fn leave_after_grace(&self, group_id: String, ticket: JobTicket) {
        if !sleep_or_cancel(&ticket.token, self.grace_period).await {
            self.lock().removals.complete(&group_id, ticket.id);
            return;
        }

        if !self.deps.service.is_connected() {
            warn!(target: "venue::auto_join", group_id = %group_id, "grace period elapsed while disconnected; group left as-is");
            self.lock().removals.complete(&group_id, ticket.id);
            return;
        }

        let left = match self.deps.service.leave_group(&group_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(target: "venue::auto_join", group_id = %group_id, error = %e, "leave failed");
                false
            }
        };

        {
            let mut state = self.lock();
            if left {
                state.auto_joined.remove(&group_id);
            }
            state.removals.complete(&group_id, ticket.id);
        }

        if left {
            info!(target: "venue::auto_join", group_id = %group_id, "left venue group after grace period");
            self.bus.publish(VenueEvent::AutoLeft { group_id });
        }
    }

    fn on_disconnected(&self) {
        let (cancelled, cleared, prompt) = {
            let mut state = self.lock();
            let cancelled = state.removals.cancel_all();
            let cleared = state.auto_joined.len();
            state.auto_joined.clear();
            state.session += 1;
            (cancelled, cleared, state.active_prompt.take())
        };
        info!(target: "venue::auto_join", cancelled, cleared, "disconnected; auto-join state reset");
        if let Some(prompt) = prompt {
            self.bus.publish(VenueEvent::PromptCleared {
                prompt_id: prompt.prompt_id,
            });
        }
    }
}
