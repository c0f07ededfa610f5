//! Subscription set behaviour
//!
//! The switcher's subscription set must always be derivable from the slots:
//! republishing is idempotent, pins exist before their streams do, and no
//! pin outlives its slot.


use segue::engine::{
    MediaEngine, OutputSpec, PinSubscription, SwitcherConfig,
};
use segue::playlist::switcher::SwitcherBinding;
use segue::{Playlist, PlaylistConfig, PlaylistItem, PlaylistSource};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use test_engine::MockEngine;

fn rtmp(port: u16, app: &str, stream: &str) -> PlaylistSource {
    PlaylistSource::Rtmp {
        port,
        app: Some(app.to_string()),
        stream: Some(stream.to_string()),
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}

#[tokio::test]
async fn republishing_identical_subs_is_idempotent() {
    test_engine::init_tracing();
    let engine = MockEngine::new();
    let switcher = engine
        .create_smooth_switcher(SwitcherConfig {
            transition_duration_ms: 300,
            output: OutputSpec::default(),
        })
        .await
        .unwrap();
    let binding = SwitcherBinding::new(switcher);

    let subs = vec![
        PinSubscription {
            pin: "0".to_string(),
            source: "input-0".to_string(),
            selector: Arc::new(|_| None),
        },
        PinSubscription {
            pin: "1".to_string(),
            source: "input-1".to_string(),
            selector: Arc::new(|_| None),
        },
    ];

    binding.refresh(subs.clone()).await;
    let first = engine.switcher().pins();

    binding.refresh(subs).await;
    assert_eq!(engine.switcher().pins(), first);
}

#[tokio::test(start_paused = true)]
async fn pins_are_subscribed_before_streams_exist() {
    test_engine::init_tracing();
    let engine = MockEngine::new();
    let items = vec![PlaylistItem::new(rtmp(1_935, "a", "1"))];
    let playlist = Playlist::create(
        Arc::clone(&engine) as Arc<dyn MediaEngine>,
        items,
        PlaylistConfig::default(),
    )
    .await
    .unwrap();

    playlist.start().unwrap();
    settle().await;

    // The pin exists the moment the slot does, with nothing routed to it
    // until a publisher shows up; no switch is issued either
    assert_eq!(engine.switcher().pins(), vec!["0"]);
    assert!(engine.resolved_assignments().is_empty());
    assert!(engine.switcher().switches().is_empty());

    engine.node("listener-rtmp-1935").publish("a", "1");
    settle().await;
    let assignments = engine.resolved_assignments();
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].pin, "0");
    assert_eq!(assignments[0].keys.len(), 2);
    assert_eq!(engine.switcher().switches(), vec!["0"]);
}

#[tokio::test(start_paused = true)]
async fn no_pin_outlives_its_slot() {
    test_engine::init_tracing();
    let engine = MockEngine::new();
    let items = vec![
        PlaylistItem::with_duration(
            PlaylistSource::TsFile {
                file_name: PathBuf::from("a.ts"),
            },
            1_000,
        ),
        PlaylistItem::new(PlaylistSource::TsFile {
            file_name: PathBuf::from("b.ts"),
        }),
    ];
    let playlist = Playlist::create(
        Arc::clone(&engine) as Arc<dyn MediaEngine>,
        items,
        PlaylistConfig::default(),
    )
    .await
    .unwrap();

    playlist.start().unwrap();
    settle().await;
    assert_eq!(engine.switcher().pins(), vec!["0"]);

    // Advance at 700 ms; during the crossfade window both pins coexist
    tokio::time::sleep(Duration::from_millis(800)).await;
    let mut pins = engine.switcher().pins();
    pins.sort();
    assert_eq!(pins, vec!["0", "1"]);

    // Once the outgoing node closes, its pin leaves the set
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    settle().await;
    assert!(engine.node("input-0").is_closed());
    assert_eq!(engine.switcher().pins(), vec!["1"]);
}

#[tokio::test(start_paused = true)]
async fn evicted_prev_pin_leaves_switcher_on_promoted_advance() {
    test_engine::init_tracing();
    let engine = MockEngine::new();
    // Three live items on one listener: every advance promotes a prewarmed
    // slot, and listener handles never report a node close, so eviction
    // from prev is the only thing that can retire their pins
    let items = vec![
        PlaylistItem::new(rtmp(1_935, "a", "1")),
        PlaylistItem::new(rtmp(1_935, "a", "2")),
        PlaylistItem::new(rtmp(1_935, "a", "3")),
    ];
    let playlist = Playlist::create(
        Arc::clone(&engine) as Arc<dyn MediaEngine>,
        items,
        PlaylistConfig::default(),
    )
    .await
    .unwrap();

    let listener = engine.node("listener-rtmp-1935");
    listener.publish("a", "1");
    listener.publish("a", "2");
    listener.publish("a", "3");

    playlist.start().unwrap();
    settle().await;
    assert_eq!(engine.switcher().switches(), vec!["0"]);

    listener.disconnect_publisher("a/1");
    settle().await;
    assert_eq!(engine.switcher().switches(), vec!["0", "1"]);
    // Item 0 lingers in prev for the crossfade; item 2 is prewarmed
    let mut pins = engine.switcher().pins();
    pins.sort();
    assert_eq!(pins, vec!["0", "1", "2"]);

    // The next advance evicts item 0 from prev; its pin must go with it
    listener.disconnect_publisher("a/2");
    settle().await;
    assert_eq!(engine.switcher().switches(), vec!["0", "1", "2"]);
    let mut pins = engine.switcher().pins();
    pins.sort();
    assert_eq!(pins, vec!["1", "2"]);
}
