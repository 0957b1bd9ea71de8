//! Venue registration check: confirm from the in-world placard that the local player owns
//! (or shares a free company with the owner of) the plot they want to register.
//!
//! ## Flow
//!
//! ```text
//! Idle ──begin()──▶ Tracking ──placard opens (edge)──▶ Evaluating ──▶ Idle
//!                     ▲  │                                 │
//!                     │  └── territory changed / cancel ──▶ Idle
//!                     └──── placard closed early / unreadable
//! ```
//!
//! `poll()` is driven by the game's frame pump. Evaluation runs on the Tokio runtime after
//! a short settle delay so the placard has time to render its text.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::VenueSettings;
use crate::error::{Result, VenueError};
use crate::events::{EventBus, VenueEvent};
use crate::jobs::{sleep_or_cancel, CancelToken};
use crate::location::HousingPlotLocation;
use crate::placard::{
    OwnershipReport, OwnershipVerifier, PanelHandle, PlacardAccessor, PlacardSnapshot,
    SceneTextExtractor,
};
use crate::ports::{CharacterIdentity, Notice, NoticeLevel, NotificationSink, SpatialState};

/// Panel indices probed for the placard; the UI sometimes mounts a second instance.
const PLACARD_INDICES: [usize; 2] = [0, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationState {
    Idle,
    Tracking,
    Evaluating,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRegistration {
    pub tracked_plot: HousingPlotLocation,
    pub is_placard_open: bool,
    pub has_logged_missing_placard: bool,
    /// Panel index the placard was last found at.
    pub active_placard_key: Option<usize>,
    pub evaluating: bool,
}

impl PendingRegistration {
    fn new(tracked_plot: HousingPlotLocation) -> Self {
        Self {
            tracked_plot,
            is_placard_open: false,
            has_logged_missing_placard: false,
            active_placard_key: None,
            evaluating: false,
        }
    }
}

/// Collaborators the flow reads from and reports to.
#[derive(Clone)]
pub struct RegistrationDeps {
    pub placards: Arc<dyn PlacardAccessor>,
    pub spatial: Arc<dyn SpatialState>,
    pub identity: Arc<dyn CharacterIdentity>,
    pub notices: Arc<dyn NotificationSink>,
}

struct Evaluation {
    token: CancelToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct FlowState {
    pending: Option<PendingRegistration>,
    /// Bumped on every `begin`; evaluations from an older flow are ignored.
    generation: u64,
    evaluation: Option<Evaluation>,
}

impl FlowState {
    fn cancel_evaluation(&mut self) -> Option<JoinHandle<()>> {
        self.evaluation.take().map(|eval| {
            eval.token.cancel();
            eval.handle
        })
    }
}

struct Inner {
    deps: RegistrationDeps,
    bus: EventBus,
    placard_name: String,
    settle_delay: std::time::Duration,
    runtime: Handle,
    state: Mutex<FlowState>,
}

pub struct RegistrationFlowController {
    inner: Arc<Inner>,
}

impl RegistrationFlowController {
    /// Must be created from within a Tokio runtime; evaluations are spawned onto it.
    pub fn new(deps: RegistrationDeps, settings: &VenueSettings, bus: EventBus) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| VenueError::Runtime(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(Inner {
                deps,
                bus,
                placard_name: settings.placard_addon_name.clone(),
                settle_delay: settings.placard_settle_delay(),
                runtime,
                state: Mutex::new(FlowState::default()),
            }),
        })
    }

    /// Start tracking the plot the player stands on. Replaces any flow in progress.
    pub fn begin(&self) -> Result<()> {
        let inner = &self.inner;
        let Some(plot) = inner.deps.spatial.current_plot() else {
            let msg = "You must be standing on a housing plot to verify a venue.";
            inner.notify(Notice::status(NoticeLevel::Error, msg));
            return Err(VenueError::UserInput(msg.to_string()));
        };

        {
            let mut state = inner.lock();
            state.cancel_evaluation();
            state.generation += 1;
            state.pending = Some(PendingRegistration::new(plot));
        }

        info!(target: "venue::registration", plot = %plot, "registration tracking started");
        inner.notify(Notice::status(
            NoticeLevel::Info,
            format!(
                "Tracking Ward {} Plot {}. Open the placard outside the plot to verify ownership.",
                plot.ward_id, plot.plot_id
            ),
        ));
        Ok(())
    }

    /// Abort the flow. Returns whether one was active.
    pub fn cancel(&self) -> bool {
        let had_pending = {
            let mut state = self.inner.lock();
            state.cancel_evaluation();
            state.pending.take().is_some()
        };
        if had_pending {
            info!(target: "venue::registration", "registration cancelled by user");
            self.inner
                .notify(Notice::status(NoticeLevel::Info, "Venue verification cancelled."));
        }
        had_pending
    }

    /// Frame tick. Watches the territory and the placard's open/closed edge.
    pub fn poll(&self) {
        let inner = &self.inner;
        let current_territory = inner.deps.spatial.current_territory();
        let mut state = inner.lock();
        let Some(pending) = state.pending.as_mut() else {
            return;
        };

        if current_territory != Some(pending.tracked_plot.territory_id) {
            let plot = pending.tracked_plot;
            state.pending = None;
            state.cancel_evaluation();
            drop(state);
            info!(target: "venue::registration", plot = %plot, "area changed; registration cancelled");
            inner.notify(Notice::status(
                NoticeLevel::Warning,
                "You left the area. Venue verification was cancelled.",
            ));
            return;
        }

        let Some((index, panel)) = inner.find_placard() else {
            if !pending.has_logged_missing_placard {
                info!(target: "venue::registration", addon = %inner.placard_name, "placard not found");
                pending.has_logged_missing_placard = true;
            }
            pending.is_placard_open = false;
            pending.active_placard_key = None;
            return;
        };

        pending.has_logged_missing_placard = false;
        pending.active_placard_key = Some(index);
        if !panel.visible {
            pending.is_placard_open = false;
            return;
        }
        if pending.is_placard_open {
            return;
        }

        pending.is_placard_open = true;
        pending.evaluating = true;
        let generation = state.generation;
        state.cancel_evaluation();

        debug!(target: "venue::registration", index, "placard opened; scheduling evaluation");
        let token = CancelToken::new();
        let handle = Inner::spawn_evaluation(Arc::clone(inner), generation, token.clone());
        state.evaluation = Some(Evaluation { token, handle });
    }

    pub fn state(&self) -> RegistrationState {
        match self.inner.lock().pending.as_ref() {
            None => RegistrationState::Idle,
            Some(p) if p.evaluating => RegistrationState::Evaluating,
            Some(_) => RegistrationState::Tracking,
        }
    }

    pub fn pending(&self) -> Option<PendingRegistration> {
        self.inner.lock().pending.clone()
    }

    /// Cancel any scheduled evaluation and wait for it to wind down.
    pub async fn shutdown(&self) {
        let handle = {
            let mut state = self.inner.lock();
            state.pending = None;
            state.cancel_evaluation()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, FlowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notice: Notice) {
        self.deps.notices.notify(notice);
    }

    /// First visible instance of the placard, else the first mounted one.
    fn find_placard(&self) -> Option<(usize, PanelHandle)> {
        let found: Vec<(usize, PanelHandle)> = PLACARD_INDICES
            .iter()
            .filter_map(|&i| self.deps.placards.find_panel(&self.placard_name, i).map(|p| (i, p)))
            .collect();
        found
            .iter()
            .find(|(_, p)| p.visible)
            .or_else(|| found.first())
            .copied()
    }

    /// Runs the evaluation in a worker task supervised by a second task, so a panic in
    /// the scene accessor still resets the open flag.
    fn spawn_evaluation(inner: Arc<Inner>, generation: u64, token: CancelToken) -> JoinHandle<()> {
        let runtime = inner.runtime.clone();
        runtime.spawn(async move {
            let worker = {
                let inner = Arc::clone(&inner);
                let token = token.clone();
                inner.runtime.clone().spawn(async move {
                    if !sleep_or_cancel(&token, inner.settle_delay).await {
                        return;
                    }
                    inner.evaluate(generation, &token);
                })
            };
            if let Err(e) = worker.await {
                if e.is_panic() {
                    warn!(target: "venue::registration", error = %e, "placard evaluation panicked");
                    inner.reset_after_failure(generation);
                }
            }
        })
    }

    fn reset_after_failure(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        if let Some(pending) = state.pending.as_mut() {
            pending.is_placard_open = false;
            pending.evaluating = false;
        }
    }

    fn evaluate(&self, generation: u64, token: &CancelToken) {
        let tracked = {
            let state = self.lock();
            match state.pending.as_ref() {
                Some(p) if state.generation == generation && !token.is_cancelled() => p.tracked_plot,
                _ => return,
            }
        };

        let panel = self.find_placard().map(|(_, p)| p).filter(|p| p.visible);
        let Some(panel) = panel else {
            self.update_pending(generation, |p| {
                p.is_placard_open = false;
                p.evaluating = false;
            });
            self.notify(Notice::status(
                NoticeLevel::Warning,
                "The placard closed before its details loaded. Open it again to retry.",
            ));
            return;
        };

        let lines = SceneTextExtractor::extract(self.deps.placards.as_ref(), panel.root);
        if lines.is_empty() {
            self.update_pending(generation, |p| p.evaluating = false);
            warn!(target: "venue::registration", "placard visible but no text extracted");
            self.notify(Notice::status(
                NoticeLevel::Warning,
                "Could not read the placard. Close and reopen it to try again.",
            ));
            return;
        }

        let snapshot = PlacardSnapshot {
            lines,
            player_name: self.deps.identity.player_name(),
            player_company_tag: self.deps.identity.company_tag(),
            is_visible: panel.visible,
        };
        let report = OwnershipVerifier::verify(&snapshot, &tracked);

        {
            let mut state = self.lock();
            if state.generation != generation || token.is_cancelled() {
                return;
            }
            state.pending = None;
            state.evaluation = None;
        }

        info!(
            target: "venue::registration",
            plot = %tracked,
            authorized = report.authorized,
            plot_matches = report.plot_matches,
            line_count = snapshot.lines.len(),
            "placard evaluated"
        );
        for notice in report_notices(&report, &tracked) {
            self.notify(notice);
        }
        self.bus.publish(VenueEvent::RegistrationVerified {
            location: tracked,
            authorized: report.authorized,
            plot_matches: report.plot_matches,
        });
    }

    fn update_pending(&self, generation: u64, f: impl FnOnce(&mut PendingRegistration)) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        if let Some(pending) = state.pending.as_mut() {
            f(pending);
        }
    }
}

fn or_unknown(value: Option<&str>) -> &str {
    value.unwrap_or("not found")
}

/// User-facing diagnostics for one evaluation, in display order.
pub fn report_notices(report: &OwnershipReport, tracked: &HousingPlotLocation) -> Vec<Notice> {
    let mut notices = Vec::with_capacity(4);

    if report.has_address() {
        let shown = format!(
            "Ward {} Plot {}",
            report.ward.map_or("?".to_string(), |w| w.to_string()),
            report.plot.map_or("?".to_string(), |p| p.to_string())
        );
        notices.push(if report.plot_matches {
            Notice::diagnostic(NoticeLevel::Success, format!("Placard address matches: {shown}."))
        } else {
            Notice::diagnostic(
                NoticeLevel::Warning,
                format!(
                    "Placard shows {shown}, but you are verifying Ward {} Plot {}.",
                    tracked.ward_id, tracked.plot_id
                ),
            )
        });
    }

    notices.push(if report.matches_owner {
        Notice::diagnostic(
            NoticeLevel::Success,
            format!("Owner matches your character ({}).", or_unknown(report.owner_value.as_deref())),
        )
    } else if report.matches_free_company {
        Notice::diagnostic(
            NoticeLevel::Success,
            format!(
                "Free Company matches your tag ({}).",
                or_unknown(report.company_value.as_deref())
            ),
        )
    } else {
        Notice::diagnostic(
            NoticeLevel::Warning,
            format!(
                "Neither the owner ({}) nor the free company ({}) matches your character.",
                or_unknown(report.owner_value.as_deref()),
                or_unknown(report.company_value.as_deref())
            ),
        )
    });

    notices.push(if report.authorized {
        Notice::status(
            NoticeLevel::Success,
            format!(
                "Ownership verified for Ward {} Plot {}. You can register this venue.",
                tracked.ward_id, tracked.plot_id
            ),
        )
    } else {
        Notice::status(
            NoticeLevel::Error,
            "Ownership could not be verified. Run the command again to retry.",
        )
    });

    if !report.authorized && !report.plot_matches {
        notices.push(Notice::status(
            NoticeLevel::Warning,
            "This placard may belong to a different plot. Open the placard of the plot you are standing on.",
        ));
    }

    notices
}
