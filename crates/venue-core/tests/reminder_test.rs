//! Reminder scheduler: bookmark gating, firing window, dedup and pruning.
//!
//! Run with: `cargo test --test reminder_test`

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use common::{FakeVenueService, MemoryPersistence, RecordingSink};
use venue_core::ports::{NoticeKind, VenueAdvertisement, VenueRegistry};
use venue_core::{BookmarkStore, PollOutcome, ReminderScheduler, VenueSettings};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap()
}

fn ad(id: &str, text: &str, starts_in_minutes: Option<i64>, active: bool) -> VenueAdvertisement {
    VenueAdvertisement {
        id: id.to_string(),
        text: text.to_string(),
        starts_at: starts_in_minutes.map(|m| now() + chrono::Duration::minutes(m)),
        is_active: active,
    }
}

fn registry(venue_id: &str, name: &str, ads: Vec<VenueAdvertisement>) -> VenueRegistry {
    VenueRegistry {
        venue_id: venue_id.to_string(),
        name: name.to_string(),
        advertisements: ads,
    }
}

struct Harness {
    service: Arc<FakeVenueService>,
    bookmarks: BookmarkStore,
    notices: Arc<RecordingSink>,
    scheduler: ReminderScheduler,
}

fn harness() -> Harness {
    common::init_tracing();
    let service = FakeVenueService::connected();
    let bookmarks =
        BookmarkStore::open(Arc::new(MemoryPersistence::default())).expect("open bookmarks");
    let notices = Arc::new(RecordingSink::default());
    let scheduler = ReminderScheduler::new(
        service.clone(),
        bookmarks.clone(),
        notices.clone(),
        &VenueSettings::default(),
    )
    .expect("runtime available");
    Harness {
        service,
        bookmarks,
        notices,
        scheduler,
    }
}

#[tokio::test]
async fn test_empty_bookmarks_skip_fetch() {
    let h = harness();
    h.service
        .set_registries(vec![registry("v-1", "Lounge", vec![ad("a-1", "Party", Some(30), true)])]);

    assert_eq!(h.scheduler.poll_once(now()).await.expect("poll"), PollOutcome::NoBookmarks);
    assert_eq!(h.service.fetches(), 0);
    assert!(h.notices.all().is_empty());
}

#[tokio::test]
async fn test_disconnected_skips_fetch() {
    let h = harness();
    h.bookmarks.add_venue_bookmark("v-1", "Lounge").expect("bookmark");
    h.service.set_connected(false);

    assert_eq!(h.scheduler.poll_once(now()).await.expect("poll"), PollOutcome::Disconnected);
    assert_eq!(h.service.fetches(), 0);
}

#[tokio::test]
async fn test_venue_bookmark_fires_once_per_start_time() {
    let h = harness();
    h.bookmarks.add_venue_bookmark("v-1", "Lounge").expect("bookmark");
    h.service
        .set_registries(vec![registry("v-1", "Moonlit Lounge", vec![ad("a-1", "Open mic", Some(30), true)])]);

    assert_eq!(h.scheduler.poll_once(now()).await.expect("poll"), PollOutcome::Fired(1));
    let last_page = *h.service.last_page.lock().unwrap();
    let (page, include_ads) = last_page.expect("fetched");
    assert_eq!(page.page, 1);
    assert_eq!(page.page_size, 100);
    assert!(include_ads);

    let reminders = h.notices.of_kind(NoticeKind::Reminder);
    assert_eq!(reminders.len(), 1);
    assert!(reminders[0].message.starts_with("Moonlit Lounge starts at "));
    assert!(reminders[0].message.contains("(bookmarked venue): Open mic"));

    // Same ad, same start: deduplicated.
    let later = now() + chrono::Duration::minutes(1);
    assert_eq!(h.scheduler.poll_once(later).await.expect("poll"), PollOutcome::Fired(0));

    // Rescheduled: exactly one more.
    h.service
        .set_registries(vec![registry("v-1", "Moonlit Lounge", vec![ad("a-1", "Open mic", Some(45), true)])]);
    assert_eq!(h.scheduler.poll_once(later).await.expect("poll"), PollOutcome::Fired(1));
    assert_eq!(h.scheduler.poll_once(later).await.expect("poll"), PollOutcome::Fired(0));
    assert_eq!(h.notices.of_kind(NoticeKind::Reminder).len(), 2);
}

#[tokio::test]
async fn test_event_bookmark_takes_precedence_and_gates_other_ads() {
    let h = harness();
    h.bookmarks
        .add_event_bookmark("v-1", "Lounge", "a-2", Some("DJ set"), None)
        .expect("bookmark");
    h.bookmarks.add_venue_bookmark("v-1", "Lounge").expect("bookmark");
    h.service.set_registries(vec![
        registry("v-1", "Lounge", vec![ad("a-2", "DJ set", Some(10), true)]),
        registry("v-9", "Elsewhere", vec![ad("a-9", "Not bookmarked", Some(10), true)]),
    ]);

    assert_eq!(h.scheduler.poll_once(now()).await.expect("poll"), PollOutcome::Fired(1));
    let reminders = h.notices.of_kind(NoticeKind::Reminder);
    assert!(reminders[0].message.contains("(bookmarked event)"));
}

#[tokio::test]
async fn test_firing_window_and_inactive_ads() {
    let h = harness();
    h.bookmarks.add_venue_bookmark("v-1", "Lounge").expect("bookmark");
    h.service.set_registries(vec![registry(
        "v-1",
        "Lounge",
        vec![
            ad("started", "Already running", Some(0), true),
            ad("past", "Earlier", Some(-10), true),
            ad("edge", "Exactly one hour out", Some(60), true),
            ad("far", "Tomorrow", Some(61), true),
            ad("inactive", "Hidden", Some(15), false),
            ad("unscheduled", "Whenever", None, true),
        ],
    )]);

    assert_eq!(h.scheduler.poll_once(now()).await.expect("poll"), PollOutcome::Fired(1));
    let reminders = h.notices.of_kind(NoticeKind::Reminder);
    assert!(reminders[0].message.contains("Exactly one hour out"));
}

#[tokio::test]
async fn test_long_text_is_truncated() {
    let h = harness();
    h.bookmarks.add_venue_bookmark("v-1", "Lounge").expect("bookmark");
    let long = "x".repeat(300);
    h.service
        .set_registries(vec![registry("v-1", "Lounge", vec![ad("a-1", &long, Some(5), true)])]);

    h.scheduler.poll_once(now()).await.expect("poll");
    let message = &h.notices.of_kind(NoticeKind::Reminder)[0].message;
    let excerpt = message.rsplit(": ").next().expect("excerpt");
    assert_eq!(excerpt.chars().count(), 120);
    assert!(excerpt.ends_with('…'));
}

#[tokio::test]
async fn test_records_pruned_after_retention() {
    let h = harness();
    h.bookmarks.add_venue_bookmark("v-1", "Lounge").expect("bookmark");
    h.service
        .set_registries(vec![registry("v-1", "Lounge", vec![ad("a-1", "Open mic", Some(30), true)])]);
    h.scheduler.poll_once(now()).await.expect("poll");
    assert_eq!(h.scheduler.sent_count(), 1);

    // Start was 30 min after `now`; three hours later it is 2.5 h in the past.
    let much_later = now() + chrono::Duration::hours(3);
    assert_eq!(h.scheduler.poll_once(much_later).await.expect("poll"), PollOutcome::Fired(0));
    assert_eq!(h.scheduler.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_background_loop_polls_and_stops() {
    let h = harness();
    h.bookmarks.add_venue_bookmark("v-1", "Lounge").expect("bookmark");
    h.scheduler.start();

    tokio::time::sleep(Duration::from_secs(185)).await;
    assert_eq!(h.service.fetches(), 3);

    h.scheduler.shutdown().await;
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(h.service.fetches(), 3);
}

#[tokio::test]
async fn test_out_of_range_lead_is_a_config_error() {
    let settings = VenueSettings {
        reminder_lead_minutes: i64::MAX,
        ..VenueSettings::default()
    };
    let bookmarks =
        BookmarkStore::open(Arc::new(MemoryPersistence::default())).expect("open bookmarks");
    let result = ReminderScheduler::new(
        FakeVenueService::connected(),
        bookmarks,
        Arc::new(RecordingSink::default()),
        &settings,
    );
    assert!(matches!(result, Err(venue_core::VenueError::Config(_))));
}

#[tokio::test]
async fn test_poll_near_end_of_time_does_not_overflow() {
    let h = harness();
    h.bookmarks.add_venue_bookmark("v-1", "Lounge").expect("bookmark");
    h.service
        .set_registries(vec![registry("v-1", "Lounge", vec![ad("a-1", "Open mic", Some(30), true)])]);

    let outcome = h.scheduler.poll_once(DateTime::<Utc>::MAX_UTC).await.expect("poll");
    assert_eq!(outcome, PollOutcome::Fired(0));
}
