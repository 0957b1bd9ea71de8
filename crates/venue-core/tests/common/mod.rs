//! In-memory fakes for the venue coordinator's collaborators.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use venue_core::ports::{
    CharacterIdentity, GroupDirectory, Notice, NoticeKind, NoticeLevel, NotificationSink,
    PageRequest, SpatialState, VenueDescriptor, VenueRegistry, VenueService,
};
use venue_core::placard::{NodeId, NodeKind};
use venue_core::{
    BookmarkPersistence, HousingPlotLocation, PanelHandle, PlacardAccessor, ReminderBookmark,
    SceneGraph, VenueError,
};

pub const TERRITORY: u32 = 339;

pub fn plot(ward: u32, plot: u32) -> HousingPlotLocation {
    HousingPlotLocation::plot(1, TERRITORY, ward, plot)
}

pub fn venue(id: &str, name: &str, group: &str) -> VenueDescriptor {
    VenueDescriptor {
        venue_id: id.to_string(),
        name: name.to_string(),
        group_id: group.to_string(),
        location: None,
    }
}

// -----------------------------------------------------------------------------
// Venue service
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeVenueService {
    pub connected: AtomicBool,
    pub fail_join: AtomicBool,
    pub fail_leave: AtomicBool,
    pub fail_resolve: AtomicBool,
    pub venues: Mutex<HashMap<HousingPlotLocation, VenueDescriptor>>,
    pub registries: Mutex<Vec<VenueRegistry>>,
    pub joins: Mutex<Vec<String>>,
    pub leaves: Mutex<Vec<String>>,
    pub registry_fetches: AtomicUsize,
    pub last_page: Mutex<Option<(PageRequest, bool)>>,
    /// Latency added to venue lookups and joins.
    pub rpc_delay: Mutex<Option<Duration>>,
}

impl FakeVenueService {
    pub fn connected() -> Arc<Self> {
        let service = Self::default();
        service.connected.store(true, Ordering::SeqCst);
        Arc::new(service)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn add_venue(&self, location: HousingPlotLocation, venue: VenueDescriptor) {
        self.venues.lock().unwrap().insert(location, venue);
    }

    pub fn set_registries(&self, registries: Vec<VenueRegistry>) {
        *self.registries.lock().unwrap() = registries;
    }

    pub fn joins(&self) -> Vec<String> {
        self.joins.lock().unwrap().clone()
    }

    pub fn leaves(&self) -> Vec<String> {
        self.leaves.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> usize {
        self.registry_fetches.load(Ordering::SeqCst)
    }

    pub fn set_rpc_delay(&self, delay: Duration) {
        *self.rpc_delay.lock().unwrap() = Some(delay);
    }

    async fn simulate_latency(&self) {
        let delay = *self.rpc_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl VenueService for FakeVenueService {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn resolve_venue_for_plot(
        &self,
        location: &HousingPlotLocation,
    ) -> venue_core::Result<Option<VenueDescriptor>> {
        self.simulate_latency().await;
        if self.fail_resolve.load(Ordering::SeqCst) {
            return Err(VenueError::Network("resolve timed out".into()));
        }
        Ok(self.venues.lock().unwrap().get(location).cloned())
    }

    async fn join_group(&self, group_id: &str) -> venue_core::Result<()> {
        self.simulate_latency().await;
        if self.fail_join.load(Ordering::SeqCst) {
            return Err(VenueError::Network("join timed out".into()));
        }
        self.joins.lock().unwrap().push(group_id.to_string());
        Ok(())
    }

    async fn leave_group(&self, group_id: &str) -> venue_core::Result<()> {
        if self.fail_leave.load(Ordering::SeqCst) {
            return Err(VenueError::Network("leave timed out".into()));
        }
        self.leaves.lock().unwrap().push(group_id.to_string());
        Ok(())
    }

    async fn list_venue_registries(
        &self,
        page: PageRequest,
        include_advertisements: bool,
    ) -> venue_core::Result<Vec<VenueRegistry>> {
        self.registry_fetches.fetch_add(1, Ordering::SeqCst);
        *self.last_page.lock().unwrap() = Some((page, include_advertisements));
        Ok(self.registries.lock().unwrap().clone())
    }
}

// -----------------------------------------------------------------------------
// Local client state
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeDirectory {
    pub members: Mutex<HashSet<String>>,
}

impl FakeDirectory {
    pub fn add(&self, group_id: &str) {
        self.members.lock().unwrap().insert(group_id.to_string());
    }
}

impl GroupDirectory for FakeDirectory {
    fn is_member(&self, group_id: &str) -> bool {
        self.members.lock().unwrap().contains(group_id)
    }
}

#[derive(Default)]
pub struct FakeIdentity {
    pub name: Mutex<Option<String>>,
    pub company: Mutex<Option<String>>,
}

impl FakeIdentity {
    pub fn new(name: &str, company: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            name: Mutex::new(Some(name.to_string())),
            company: Mutex::new(company.map(str::to_string)),
        })
    }
}

impl CharacterIdentity for FakeIdentity {
    fn player_name(&self) -> Option<String> {
        self.name.lock().unwrap().clone()
    }

    fn company_tag(&self) -> Option<String> {
        self.company.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct FakeSpatial {
    pub plot: Mutex<Option<HousingPlotLocation>>,
    pub territory: Mutex<Option<u32>>,
}

impl FakeSpatial {
    pub fn standing_on(location: HousingPlotLocation) -> Arc<Self> {
        Arc::new(Self {
            plot: Mutex::new(Some(location)),
            territory: Mutex::new(Some(location.territory_id)),
        })
    }

    /// Step off the plot but stay in the same territory.
    pub fn step_off(&self) {
        *self.plot.lock().unwrap() = None;
    }

    pub fn move_to_territory(&self, territory: u32) {
        *self.plot.lock().unwrap() = None;
        *self.territory.lock().unwrap() = Some(territory);
    }
}

impl SpatialState for FakeSpatial {
    fn current_plot(&self) -> Option<HousingPlotLocation> {
        *self.plot.lock().unwrap()
    }

    fn current_territory(&self) -> Option<u32> {
        *self.territory.lock().unwrap()
    }
}

// -----------------------------------------------------------------------------
// Placard scene
// -----------------------------------------------------------------------------

#[derive(Default)]
struct PlacardScene {
    /// Line `i` is text node `i + 2`, a child of container node 1.
    lines: Vec<String>,
    panels: HashMap<usize, PanelHandle>,
}

/// Placard panel whose root is a container holding one text node per line.
#[derive(Default)]
pub struct FakePlacards {
    scene: Mutex<PlacardScene>,
    pub lookups: AtomicUsize,
    /// The next panel lookup panics, like a scene accessor reading freed UI memory.
    pub fault_next_lookup: AtomicBool,
}

const ROOT: u64 = 1;

impl FakePlacards {
    pub fn set_lines(&self, lines: &[&str]) {
        self.scene.lock().unwrap().lines = lines.iter().map(|l| l.to_string()).collect();
    }

    /// Mount the panel at `index`.
    pub fn show(&self, index: usize) {
        self.scene.lock().unwrap().panels.insert(
            index,
            PanelHandle {
                visible: true,
                root: Some(NodeId(ROOT)),
            },
        );
    }

    /// Keep the panel mounted but hidden.
    pub fn hide(&self, index: usize) {
        if let Some(panel) = self.scene.lock().unwrap().panels.get_mut(&index) {
            panel.visible = false;
        }
    }

    pub fn unmount_all(&self) {
        self.scene.lock().unwrap().panels.clear();
    }

    fn line_index(&self, node: NodeId) -> Option<usize> {
        let count = self.scene.lock().unwrap().lines.len() as u64;
        (node.0 >= 2 && node.0 < 2 + count).then(|| (node.0 - 2) as usize)
    }
}

impl SceneGraph for FakePlacards {
    fn kind(&self, node: NodeId) -> Option<NodeKind> {
        if node.0 == ROOT {
            return Some(NodeKind::Container);
        }
        self.line_index(node).map(|_| NodeKind::Text)
    }

    fn text(&self, node: NodeId) -> Option<String> {
        let index = self.line_index(node)?;
        self.scene.lock().unwrap().lines.get(index).cloned()
    }

    fn raw_text(&self, _node: NodeId) -> Option<Vec<u8>> {
        None
    }

    fn first_child(&self, node: NodeId) -> Option<NodeId> {
        let has_lines = !self.scene.lock().unwrap().lines.is_empty();
        (node.0 == ROOT && has_lines).then_some(NodeId(2))
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.line_index(node)?;
        let next = NodeId(node.0 + 1);
        self.line_index(next).map(|_| next)
    }

    fn component_root(&self, _node: NodeId) -> Option<NodeId> {
        None
    }

    fn component_nodes(&self, _node: NodeId) -> Vec<NodeId> {
        Vec::new()
    }
}

impl PlacardAccessor for FakePlacards {
    fn find_panel(&self, _name: &str, index: usize) -> Option<PanelHandle> {
        if self.fault_next_lookup.swap(false, Ordering::SeqCst) {
            panic!("placard panel {index} read after it was freed");
        }
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.scene.lock().unwrap().panels.get(&index).copied()
    }
}

// -----------------------------------------------------------------------------
// Notifications and persistence
// -----------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    pub notices: Mutex<Vec<Notice>>,
}

impl RecordingSink {
    pub fn all(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn of_kind(&self, kind: NoticeKind) -> Vec<Notice> {
        self.all().into_iter().filter(|n| n.kind == kind).collect()
    }

    pub fn contains(&self, level: NoticeLevel, fragment: &str) -> bool {
        self.all()
            .iter()
            .any(|n| n.level == level && n.message.contains(fragment))
    }

    pub fn clear(&self) {
        self.notices.lock().unwrap().clear();
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

#[derive(Default)]
pub struct MemoryPersistence {
    pub initial: Vec<ReminderBookmark>,
    pub writes: AtomicUsize,
    pub last: Mutex<Vec<ReminderBookmark>>,
    /// Reject every write as if the disk were full.
    pub fail_writes: AtomicBool,
}

impl BookmarkPersistence for MemoryPersistence {
    fn load(&self) -> venue_core::Result<Vec<ReminderBookmark>> {
        Ok(self.initial.clone())
    }

    fn persist(&self, bookmarks: &[ReminderBookmark]) -> venue_core::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(VenueError::Io(std::io::Error::other("disk full")));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = bookmarks.to_vec();
        Ok(())
    }
}

/// Install a test-writer subscriber once so `RUST_LOG=venue=debug` shows coordinator logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
