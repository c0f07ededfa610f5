//! End-to-end playlist controller scenarios
//!
//! Drives the controller against the mock engine and asserts the observable
//! behaviour on the switcher: which pins get subscribed, which switch
//! commands are issued, and when nodes are torn down. Timer-sensitive
//! scenarios run under a paused clock so timings are exact.


use segue::engine::{ImageFormat, MediaEngine};
use segue::{
    Playlist, PlaylistConfig, PlaylistEvent, PlaylistItem, PlaylistSource, SrtMode,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use test_engine::MockEngine;

fn ts(name: &str) -> PlaylistSource {
    PlaylistSource::TsFile {
        file_name: PathBuf::from(name),
    }
}

fn mp4(name: &str) -> PlaylistSource {
    PlaylistSource::Mp4File {
        file_name: PathBuf::from(name),
    }
}

fn image(name: &str) -> PlaylistSource {
    PlaylistSource::Image {
        file_name: PathBuf::from(name),
        image_format: ImageFormat::Png,
    }
}

fn rtmp(port: u16, app: &str, stream: &str) -> PlaylistSource {
    PlaylistSource::Rtmp {
        port,
        app: Some(app.to_string()),
        stream: Some(stream.to_string()),
    }
}

async fn create(engine: &Arc<MockEngine>, items: Vec<PlaylistItem>) -> Playlist {
    test_engine::init_tracing();
    Playlist::create(
        Arc::clone(engine) as Arc<dyn MediaEngine>,
        items,
        PlaylistConfig::default(),
    )
    .await
    .expect("playlist creation failed")
}

/// Let queued commands, arm delays and fan-outs drain. Advances the paused
/// clock by 25 ms, past the 10 ms switch arm delay.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}

#[tokio::test(start_paused = true)]
async fn file_sequence_advances_on_duration_and_closes_outgoing() {
    let engine = MockEngine::new();
    let items = vec![
        PlaylistItem::with_duration(mp4("a.mp4"), 5_000),
        PlaylistItem::new(mp4("b.mp4")),
    ];
    let playlist = create(&engine, items).await;

    playlist.start().unwrap();
    settle().await;
    assert_eq!(engine.switcher().switches(), vec!["0"]);
    assert_eq!(engine.created_inputs(), vec!["input-0"]);

    // The advance fires one transition (300 ms) before the 5000 ms bound
    tokio::time::sleep(Duration::from_millis(4_600)).await;
    assert_eq!(engine.switcher().switches(), vec!["0"]);
    assert!(engine.try_node("input-1").is_none());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(engine.switcher().switches(), vec!["0", "1"]);
    assert!(
        !engine.node("input-0").is_closed(),
        "outgoing node must survive the crossfade"
    );

    // Grace delay (1 s after the timer) tears the outgoing node down, and
    // its pin leaves the subscription set with it
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert!(engine.node("input-0").is_closed());
    assert!(!engine.node("input-1").is_closed());
    settle().await;
    assert_eq!(engine.switcher().pins(), vec!["1"]);
}

#[tokio::test(start_paused = true)]
async fn srt_listener_binds_and_advances_on_disconnect() {
    let engine = MockEngine::new();
    let items = vec![
        PlaylistItem::new(PlaylistSource::Srt {
            mode: SrtMode::Listener,
            ip: "0.0.0.0".to_string(),
            port: 5_000,
        }),
        PlaylistItem::new(ts("c.ts")),
    ];
    let playlist = create(&engine, items).await;

    // The listener exists before start(), with a publisher already connected
    let listener = engine.node("listener-srt-5000");
    listener.connect_av("cam");

    playlist.start().unwrap();
    settle().await;
    assert_eq!(engine.switcher().switches(), vec!["0"]);
    // The file item is not live, so nothing is prewarmed
    assert_eq!(engine.created_inputs(), vec!["listener-srt-5000"]);

    listener.disconnect();
    settle().await;
    assert_eq!(engine.switcher().switches(), vec!["0", "1"]);
    assert_eq!(
        engine.created_inputs(),
        vec!["listener-srt-5000", "input-1"]
    );
    assert!(
        !listener.is_closed(),
        "shared listener node outlives the item that used it"
    );
}

#[tokio::test(start_paused = true)]
async fn image_gets_silence_and_rtmp_prewarms() {
    let engine = MockEngine::new();
    let items = vec![
        PlaylistItem::with_duration(image("logo.png"), 2_000),
        PlaylistItem::new(rtmp(1_935, "live", "x")),
    ];
    let playlist = create(&engine, items).await;

    playlist.start().unwrap();
    settle().await;
    assert_eq!(engine.switcher().switches(), vec!["0"]);

    // Pin "0" carries the image's video plus the silent audio feed
    let assignments = engine.resolved_assignments();
    let pin0: Vec<_> = assignments.iter().filter(|a| a.pin == "0").collect();
    assert_eq!(pin0.len(), 2);
    assert!(pin0
        .iter()
        .any(|a| a.keys.iter().any(|k| k.source_name == "silence")));
    assert!(pin0
        .iter()
        .any(|a| a.keys.iter().any(|k| k.source_name == "logo")));

    // The live item is prewarmed: its pin is subscribed from the start,
    // with nothing routed until a publisher appears
    assert!(engine.switcher().pins().contains(&"1".to_string()));
    assert!(assignments.iter().all(|a| a.pin != "1"));

    // Timer fires at 1700 ms; slot 1 has no publisher, so the switch holds
    tokio::time::sleep(Duration::from_millis(1_800)).await;
    assert_eq!(engine.switcher().switches(), vec!["0"]);

    // Publisher live/x arrives; readiness triggers the held switch
    engine.node("listener-rtmp-1935").publish("live", "x");
    settle().await;
    assert_eq!(engine.switcher().switches(), vec!["0", "1"]);
    assert_eq!(playlist.playing().await, Some(1));
}

#[tokio::test(start_paused = true)]
async fn shared_rtmp_listener_demultiplexes_two_items() {
    let engine = MockEngine::new();
    let items = vec![
        PlaylistItem::new(rtmp(1_935, "a", "1")),
        PlaylistItem::new(rtmp(1_935, "a", "2")),
    ];
    let playlist = create(&engine, items).await;

    // Both items share a single listener node
    assert_eq!(engine.created_inputs(), vec!["listener-rtmp-1935"]);

    playlist.start().unwrap();
    settle().await;
    assert!(engine.switcher().switches().is_empty());

    let listener = engine.node("listener-rtmp-1935");
    listener.publish("a", "1");
    settle().await;
    assert_eq!(engine.switcher().switches(), vec!["0"]);
    assert_eq!(playlist.playing().await, Some(0));

    // a/2 disconnecting before slot 1 is active has no effect
    listener.disconnect_publisher("a/2");
    settle().await;
    assert_eq!(engine.switcher().switches(), vec!["0"]);

    // a/2 publishing readies the prewarmed slot without stealing the air
    listener.publish("a", "2");
    settle().await;
    assert_eq!(engine.switcher().switches(), vec!["0"]);

    // a/1 disconnecting advances from slot 0; slot 1 is ready and wins the
    // air instantly
    listener.disconnect_publisher("a/1");
    settle().await;
    assert_eq!(engine.switcher().switches(), vec!["0", "1"]);
    assert!(!listener.is_closed());

    // Shutdown is what finally releases the shared listener
    playlist.shutdown();
    settle().await;
    assert!(listener.is_closed());
}

#[tokio::test(start_paused = true)]
async fn manual_switch_twice_advances_two_items_and_cancels_timer() {
    let engine = MockEngine::new();
    let items = vec![
        PlaylistItem::with_duration(ts("a.ts"), 10_000),
        PlaylistItem::new(ts("b.ts")),
        PlaylistItem::new(ts("c.ts")),
    ];
    let playlist = create(&engine, items).await;

    playlist.start().unwrap();
    settle().await;
    assert_eq!(engine.switcher().switches(), vec!["0"]);

    playlist.switch().unwrap();
    playlist.switch().unwrap();
    settle().await;
    assert_eq!(engine.switcher().switches(), vec!["0", "1", "2"]);
    assert_eq!(playlist.playing().await, Some(2));

    // Item 0's duration timer was cancelled by the first manual advance
    tokio::time::sleep(Duration::from_millis(12_000)).await;
    assert_eq!(engine.switcher().switches(), vec!["0", "1", "2"]);
    assert_eq!(playlist.playing().await, Some(2));
}

#[tokio::test(start_paused = true)]
async fn empty_playlist_exhausts_immediately() -> anyhow::Result<()> {
    let engine = MockEngine::new();
    let playlist = create(&engine, Vec::new()).await;
    let mut events = playlist.subscribe_events();

    playlist.start()?;
    let event = tokio::time::timeout(Duration::from_secs(1), events.recv()).await??;
    assert!(matches!(event, PlaylistEvent::PlaylistExhausted { .. }));
    assert!(engine.switcher().switches().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn single_item_playlist_never_prewarms_and_exhausts() {
    let engine = MockEngine::new();
    let items = vec![PlaylistItem::with_duration(mp4("a.mp4"), 1_000)];
    let playlist = create(&engine, items).await;
    let mut events = playlist.subscribe_events();

    playlist.start().unwrap();
    settle().await;
    assert_eq!(engine.switcher().switches(), vec!["0"]);
    assert_eq!(engine.switcher().pins(), vec!["0"]);

    // Timer at 700 ms exhausts the playlist; no next slot ever appears
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(engine.created_inputs(), vec!["input-0"]);

    let mut saw_exhausted = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, PlaylistEvent::PlaylistExhausted { .. }) {
            saw_exhausted = true;
        }
    }
    assert!(saw_exhausted);

    // The final item's node still gets its delayed teardown
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert!(engine.node("input-0").is_closed());
}

#[tokio::test(start_paused = true)]
async fn duration_shorter_than_transition_still_advances() {
    let engine = MockEngine::new();
    let items = vec![
        PlaylistItem::with_duration(ts("a.ts"), 100),
        PlaylistItem::new(ts("b.ts")),
    ];
    let playlist = create(&engine, items).await;

    // 100 ms bound < 300 ms transition: the timer clamps to zero and the
    // advance happens immediately
    playlist.start().unwrap();
    settle().await;
    assert_eq!(engine.switcher().switches(), vec!["0", "1"]);
}

#[tokio::test(start_paused = true)]
async fn engine_rejection_surfaces_failed_event() {
    let engine = MockEngine::new();
    engine.fail_input("input-0");
    let items = vec![PlaylistItem::new(ts("a.ts"))];
    let playlist = create(&engine, items).await;
    let mut events = playlist.subscribe_events();

    playlist.start().unwrap();
    settle().await;

    let mut saw_failed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, PlaylistEvent::Failed { .. }) {
            saw_failed = true;
        }
    }
    assert!(saw_failed);
    assert!(engine.switcher().switches().is_empty());
}

#[tokio::test(start_paused = true)]
async fn lifecycle_events_arrive_in_order() -> anyhow::Result<()> {
    let engine = MockEngine::new();
    let items = vec![PlaylistItem::with_duration(mp4("a.mp4"), 5_000)];
    let playlist = create(&engine, items).await;
    let mut events = playlist.subscribe_events();

    playlist.start()?;
    settle().await;

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen[0], PlaylistEvent::ItemStarted { index: 0, .. }));
    assert!(seen
        .iter()
        .any(|e| matches!(e, PlaylistEvent::ItemReady { index: 0, .. })));
    assert!(seen
        .iter()
        .any(|e| matches!(e, PlaylistEvent::Switched { index: 0, .. })));
    Ok(())
}
