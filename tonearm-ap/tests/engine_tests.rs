//! Playback engine integration tests
//!
//! Drive the engine through the player with a manual pipeline and check what
//! it resolves, plays and records.

mod helpers;

use helpers::{harness, harness_with, locations, uri};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tonearm_ap::pipeline::BusMessageKind;
use tonearm_common::db::{playbacks, playlists, queues, Perspective, TrackRef};
use tonearm_common::events::{Delivery, Event, LastEvent, PipelineState, Topic};

#[tokio::test]
async fn test_plays_queue_in_order_and_records_history() {
    let mut h = harness().await;
    h.player
        .enqueue(Perspective::Music, &locations(&["/music/a.mp3", "/music/b.mp3"]), &[])
        .await
        .unwrap();

    let a = h.next_playing().await;
    assert_eq!(a.uri(), uri("/music/a.mp3"));
    a.finish();

    let b = h.next_playing().await;
    assert_eq!(b.uri(), uri("/music/b.mp3"));
    assert_eq!(a.state(), PipelineState::Null);

    let history = h.wait_for_history(1).await;
    assert_eq!(history[0].location, "/music/a.mp3");
    assert_eq!(history[0].duration_played_ms, 180_000);
    assert!(h.player.queue_list(Perspective::Music).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_forced_play_interrupts_and_keeps_one_pending() {
    let mut h = harness().await;
    h.player
        .play_streams(true, &locations(&["/music/a.mp3"]), &[])
        .await
        .unwrap();
    let a = h.next_playing().await;
    a.set_position(2_000);

    h.player
        .play_streams(
            true,
            &locations(&["/music/b.mp3", "/music/c.mp3", "/music/d.mp3"]),
            &[],
        )
        .await
        .unwrap();
    assert!(playbacks::pending_count(&h.pool).await.unwrap() <= 1);

    let b = h.next_playing().await;
    assert_eq!(b.uri(), uri("/music/b.mp3"));
    assert_eq!(playbacks::pending_count(&h.pool).await.unwrap(), 0);

    let queue = queues::list(&h.pool, Perspective::Music).await.unwrap();
    let queued: Vec<_> = queue.iter().map(|q| q.location.as_str()).collect();
    assert_eq!(queued, vec!["/music/c.mp3", "/music/d.mp3"]);

    // the interrupted stream counts as played up to where it stopped
    let history = h.wait_for_history(1).await;
    assert_eq!(history[0].location, "/music/a.mp3");
    assert_eq!(history[0].duration_played_ms, 2_000);
}

#[tokio::test]
async fn test_at_most_one_pending_playback() {
    let mut h = harness().await;
    h.player
        .enqueue(Perspective::Music, &locations(&["/music/q1.mp3", "/music/q2.mp3"]), &[])
        .await
        .unwrap();
    let _ = h.next_playing().await;

    for path in ["/music/x.mp3", "/music/y.mp3", "/music/z.mp3"] {
        h.player.play_streams(true, &locations(&[path]), &[]).await.unwrap();
        assert!(playbacks::pending_count(&h.pool).await.unwrap() <= 1);
        h.player.next_stream().await;
        assert!(playbacks::pending_count(&h.pool).await.unwrap() <= 1);
        h.player.previous_stream().await;
        assert!(playbacks::pending_count(&h.pool).await.unwrap() <= 1);
        sleep(Duration::from_millis(20)).await;
        assert!(playbacks::pending_count(&h.pool).await.unwrap() <= 1);
    }
}

#[tokio::test]
async fn test_previous_near_start_goes_back_in_history() {
    let mut h = harness().await;
    h.player
        .enqueue(Perspective::Music, &locations(&["/music/a.mp3", "/music/b.mp3"]), &[])
        .await
        .unwrap();

    h.next_playing().await.finish();
    let b = h.next_playing().await;
    b.set_position(1_000);

    assert!(h.player.previous_stream().await);
    let again = h.next_playing().await;
    assert_eq!(again.uri(), uri("/music/a.mp3"));

    // going back does not record the stream it left
    assert_eq!(h.history_locations().await, vec!["/music/a.mp3"]);
    let snapshot = h.player.get_state().await;
    assert_eq!(snapshot.last_event, LastEvent::Previous);
}

#[tokio::test]
async fn test_previous_walks_back_through_history() {
    let mut h = harness().await;
    h.player
        .enqueue(
            Perspective::Music,
            &locations(&["/music/a.mp3", "/music/b.mp3", "/music/c.mp3"]),
            &[],
        )
        .await
        .unwrap();

    h.next_playing().await.finish();
    h.next_playing().await.finish();
    let _c = h.next_playing().await;

    h.player.previous_stream().await;
    assert_eq!(h.next_playing().await.uri(), uri("/music/b.mp3"));
    h.player.previous_stream().await;
    assert_eq!(h.next_playing().await.uri(), uri("/music/a.mp3"));
}

#[tokio::test]
async fn test_previous_past_threshold_restarts_stream() {
    let mut h = harness().await;
    h.player
        .play_streams(true, &locations(&["/music/a.mp3"]), &[])
        .await
        .unwrap();
    let a = h.next_playing().await;
    a.set_position(6_000);
    h.wait_for("position", |s| s.position_ms >= 6_000).await;

    assert!(h.player.previous_stream().await);
    timeout(Duration::from_secs(3), async {
        while a.seeks().is_empty() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("seek to start");

    assert_eq!(a.seeks(), vec![0]);
    assert_eq!(a.state(), PipelineState::Playing);
    h.assert_no_pipeline().await;
    assert!(h.history().await.is_empty());
}

#[tokio::test]
async fn test_stop_all_idles_until_resumed() {
    let mut h = harness().await;
    h.player
        .enqueue(Perspective::Music, &locations(&["/music/a.mp3", "/music/b.mp3"]), &[])
        .await
        .unwrap();
    let a = h.next_playing().await;

    assert!(h.player.stop_all().await);
    h.wait_until_stopped().await;
    assert_eq!(a.state(), PipelineState::Null);
    assert!(h.player.is_stopped().await);

    h.assert_no_pipeline().await;
    assert_eq!(queues::len(&h.pool, Perspective::Music).await.unwrap(), 1);
    assert!(h.player.has_next_stream().await.unwrap());

    assert!(h.player.pause_stream(true).await);
    let b = h.next_playing().await;
    assert_eq!(b.uri(), uri("/music/b.mp3"));
}

#[tokio::test]
async fn test_stop_all_then_play_request_resumes() {
    let mut h = harness().await;
    h.player
        .play_streams(true, &locations(&["/music/a.mp3"]), &[])
        .await
        .unwrap();
    let _ = h.next_playing().await;
    h.player.stop_all().await;
    h.wait_until_stopped().await;

    h.player
        .play_streams(false, &locations(&["/music/b.mp3"]), &[])
        .await
        .unwrap();
    assert_eq!(h.next_playing().await.uri(), uri("/music/b.mp3"));
}

#[tokio::test]
async fn test_pipeline_error_is_never_recorded() {
    let mut h = harness().await;
    h.player
        .enqueue(Perspective::Music, &locations(&["/music/a.mp3", "/music/b.mp3"]), &[])
        .await
        .unwrap();

    let a = h.next_playing().await;
    a.set_position(3_000);
    a.post(BusMessageKind::Warning("buffering".to_string()));
    a.fail("decoder exploded");

    let b = h.next_playing().await;
    assert_eq!(b.uri(), uri("/music/b.mp3"));
    b.finish();

    let history = h.wait_for_history(1).await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].location, "/music/b.mp3");
}

#[tokio::test]
async fn test_failed_creation_moves_on() {
    let mut h = harness().await;
    h.control.fail_create(&uri("/music/broken.mp3"));
    h.player
        .enqueue(
            Perspective::Music,
            &locations(&["/music/broken.mp3", "/music/good.mp3"]),
            &[],
        )
        .await
        .unwrap();

    let good = h.next_playing().await;
    assert_eq!(good.uri(), uri("/music/good.mp3"));
    assert_eq!(playbacks::pending_count(&h.pool).await.unwrap(), 0);
    assert!(h.history().await.is_empty());
}

#[tokio::test]
async fn test_pause_and_resume() {
    let mut h = harness().await;
    h.player
        .play_streams(true, &locations(&["/music/a.mp3"]), &[])
        .await
        .unwrap();
    let a = h.next_playing().await;

    assert!(h.player.pause_stream(false).await);
    h.wait_for("paused", |s| s.state == PipelineState::Paused).await;
    assert_eq!(a.state(), PipelineState::Paused);
    assert!(h.player.is_paused().await);

    // seeking only applies while playing
    assert!(!h.player.seek_in_stream(10_000).await.unwrap());

    assert!(h.player.pause_stream(true).await);
    h.wait_for("playing", |s| s.state == PipelineState::Playing).await;

    assert!(h.player.seek_in_stream(10_000).await.unwrap());
    timeout(Duration::from_secs(3), async {
        while a.seeks().is_empty() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("seek applied");
    assert_eq!(a.seeks(), vec![10_000]);
}

#[tokio::test]
async fn test_unseekable_stream_ignores_seek() {
    let mut h = harness().await;
    h.control.set_seekable(None);
    h.control.set_duration(None);
    h.player
        .play_streams(true, &locations(&["https://radio.example/live"]), &[])
        .await
        .unwrap();
    let live = h.next_playing().await;

    assert!(!h.player.seek_in_stream(5_000).await.unwrap());
    assert!(live.seeks().is_empty());
    assert!(!h.player.get_state().await.seekable);
}

#[tokio::test]
async fn test_skip_offset_applied_on_first_play() {
    let mut h = harness().await;
    playbacks::create(&h.pool, &TrackRef::location("/podcasts/ep1.mp3"), 30_000)
        .await
        .unwrap();
    h.engine.wake();

    let episode = h.next_playing().await;
    timeout(Duration::from_secs(3), async {
        while episode.seeks().is_empty() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("skip applied");
    assert_eq!(episode.seeks(), vec![30_000]);
}

#[tokio::test]
async fn test_next_and_commands_without_stream() {
    let h = harness().await;
    assert!(!h.player.next_stream().await);
    assert!(!h.player.previous_stream().await);
    assert!(!h.player.stop_stream().await);
    assert!(!h.player.pause_stream(false).await);
    assert!(!h.player.seek_in_stream(0).await.unwrap());
    assert!(h.player.is_stopped().await);
    assert!(!h.player.has_next_stream().await.unwrap());
    assert!(h.player.get_playback().await.is_none());
}

#[tokio::test]
async fn test_playlist_from_bar_plays_to_end() {
    let mut h = harness().await;
    let playlist = h
        .player
        .create_playlist("Evening", Perspective::Music)
        .await
        .unwrap();
    h.player
        .playlist_add(
            playlist.id,
            &locations(&["/music/p1.mp3", "/music/p2.mp3", "/music/p3.mp3"]),
            &[],
            false,
        )
        .await
        .unwrap();

    h.player.try_playing_from_bar(playlist.id, 2).await.unwrap();
    let p2 = h.next_playing().await;
    assert_eq!(p2.uri(), uri("/music/p2.mp3"));
    let snapshot = h.player.get_state().await;
    assert_eq!(snapshot.playlist_id, Some(playlist.id));
    assert_eq!(snapshot.playlist_position, Some(2));

    assert!(h.player.next_stream().await);
    let p3 = h.next_playing().await;
    assert_eq!(p3.uri(), uri("/music/p3.mp3"));
    assert!(!h.player.has_next_stream().await.unwrap());

    p3.finish();
    h.wait_until_stopped().await;
    h.assert_no_pipeline().await;
    assert!(playlists::active(&h.pool, Perspective::Music).await.unwrap().is_none());
    assert_eq!(h.player.get_state().await.playlist_id, None);
}

#[tokio::test]
async fn test_previous_in_playlist() {
    let mut h = harness().await;
    let playlist = h.player.create_playlist("Mix", Perspective::Music).await.unwrap();
    h.player
        .playlist_add(playlist.id, &locations(&["/music/p1.mp3", "/music/p2.mp3"]), &[], false)
        .await
        .unwrap();

    h.player.try_playing_from_bar(playlist.id, 2).await.unwrap();
    h.next_playing().await;

    assert!(h.player.previous_stream().await);
    assert_eq!(h.next_playing().await.uri(), uri("/music/p1.mp3"));
    assert_eq!(h.player.get_state().await.playlist_position, Some(1));
}

#[tokio::test]
async fn test_quit_playing_from_bar_falls_back_to_queue() {
    let mut h = harness().await;
    let playlist = h.player.create_playlist("Mix", Perspective::Music).await.unwrap();
    h.player
        .playlist_add(playlist.id, &locations(&["/music/p1.mp3", "/music/p2.mp3"]), &[], false)
        .await
        .unwrap();
    h.player.try_playing_from_bar(playlist.id, 1).await.unwrap();
    h.next_playing().await;

    h.player
        .enqueue(Perspective::Music, &locations(&["/music/q.mp3"]), &[])
        .await
        .unwrap();
    assert!(h.player.quit_playing_from_bar(playlist.id).await.unwrap());

    assert_eq!(h.next_playing().await.uri(), uri("/music/q.mp3"));
    assert_eq!(h.player.get_state().await.playlist_id, None);
    assert!(!h.player.quit_playing_from_bar(playlist.id).await.unwrap());
}

#[tokio::test]
async fn test_progress_events_while_playing() {
    let mut h = harness().await;
    let mut events = h.player.subscribe(Topic::Playback);
    h.player
        .play_streams(true, &locations(&["/music/a.mp3"]), &[])
        .await
        .unwrap();
    let a = h.next_playing().await;
    a.set_position(1_234);

    let progress = timeout(Duration::from_secs(3), async {
        loop {
            match events.recv().await {
                Some(Delivery::Payload(Event::PlaybackProgress {
                    location,
                    position_ms,
                    ..
                })) if position_ms == 1_234 => return location,
                Some(_) => continue,
                None => panic!("bus closed"),
            }
        }
    })
    .await
    .expect("progress event");
    assert_eq!(progress, "/music/a.mp3");
}

#[tokio::test]
async fn test_idle_requested_after_timeout() {
    let h = harness_with(|config| config.engine.idle_timeout_secs = 1).await;
    timeout(Duration::from_secs(3), h.keepalive.idle_requested())
        .await
        .expect("idle should be requested");
}

#[tokio::test]
async fn test_no_idle_while_streaming() {
    let mut h = harness_with(|config| config.engine.idle_timeout_secs = 1).await;
    h.player
        .play_streams(true, &locations(&["/music/long.mp3"]), &[])
        .await
        .unwrap();
    let _ = h.next_playing().await;

    sleep(Duration::from_millis(1_500)).await;
    assert!(!h.keepalive.is_idle_requested());
}

#[tokio::test]
async fn test_shutdown_stops_without_recording() {
    let mut h = harness().await;
    h.player
        .play_streams(true, &locations(&["/music/a.mp3"]), &[])
        .await
        .unwrap();
    let a = h.next_playing().await;
    a.set_position(42_000);

    timeout(Duration::from_secs(3), h.engine.shutdown())
        .await
        .expect("shutdown is bounded");

    assert_eq!(a.state(), PipelineState::Null);
    assert!(!h.player.is_streaming().await);
    assert!(h.history().await.is_empty());
}

#[tokio::test]
async fn test_start_twice_fails() {
    let h = harness().await;
    assert!(h.engine.start().await.is_err());
}

#[tokio::test]
async fn test_stop_all_during_resolution_starts_nothing() {
    let mut h = harness_with(|config| config.engine.idle_tick_ms = 60_000).await;
    sleep(Duration::from_millis(50)).await;
    queues::enqueue(&h.pool, Perspective::Music, vec![TrackRef::location("/music/a.mp3")])
        .await
        .unwrap();

    // The pool has one connection: holding it parks the worker mid-resolution
    let conn = h.pool.acquire().await.unwrap();
    h.engine.wake();
    sleep(Duration::from_millis(50)).await;
    assert!(!h.player.stop_all().await);
    drop(conn);

    h.assert_no_pipeline().await;
    assert!(h.player.is_stopped().await);
    assert_eq!(playbacks::pending_count(&h.pool).await.unwrap(), 1);

    assert!(h.player.pause_stream(true).await);
    assert_eq!(h.next_playing().await.uri(), uri("/music/a.mp3"));
}

#[tokio::test]
async fn test_forced_play_survives_next_in_playlist() {
    let mut h = harness().await;
    let playlist = h.player.create_playlist("Mix", Perspective::Music).await.unwrap();
    h.player
        .playlist_add(
            playlist.id,
            &locations(&["/music/p1.mp3", "/music/p2.mp3", "/music/p3.mp3"]),
            &[],
            false,
        )
        .await
        .unwrap();
    h.player.try_playing_from_bar(playlist.id, 1).await.unwrap();
    assert_eq!(h.next_playing().await.uri(), uri("/music/p1.mp3"));

    h.player
        .play_streams(true, &locations(&["/music/x.mp3"]), &[])
        .await
        .unwrap();
    assert!(h.player.next_stream().await);

    let x = h.next_playing().await;
    assert_eq!(x.uri(), uri("/music/x.mp3"));
    assert_eq!(playbacks::pending_count(&h.pool).await.unwrap(), 0);

    // the playlist step waits behind the forced item
    x.finish();
    assert_eq!(h.next_playing().await.uri(), uri("/music/p2.mp3"));
    assert_eq!(h.player.get_state().await.playlist_position, Some(2));
}

#[tokio::test]
async fn test_stop_stream_records_and_moves_on() {
    let mut h = harness().await;
    h.player
        .enqueue(Perspective::Music, &locations(&["/music/a.mp3", "/music/b.mp3"]), &[])
        .await
        .unwrap();
    let a = h.next_playing().await;
    a.set_position(7_000);

    assert!(h.player.stop_stream().await);
    let b = h.next_playing().await;
    assert_eq!(b.uri(), uri("/music/b.mp3"));
    assert_eq!(a.state(), PipelineState::Null);

    let history = h.wait_for_history(1).await;
    assert_eq!(history[0].location, "/music/a.mp3");
    assert_eq!(history[0].duration_played_ms, 7_000);
}

#[tokio::test]
async fn test_duration_change_is_picked_up() {
    let mut h = harness().await;
    h.player
        .play_streams(true, &locations(&["/music/live-set.mp3"]), &[])
        .await
        .unwrap();
    let set = h.next_playing().await;
    h.wait_for("probed duration", |s| s.duration_ms == Some(180_000)).await;

    set.set_duration(Some(240_000));
    h.wait_for("updated duration", |s| s.duration_ms == Some(240_000)).await;
}

#[tokio::test]
async fn test_wakes_do_not_hasten_idle() {
    let h = harness_with(|config| config.engine.idle_timeout_secs = 1).await;
    for _ in 0..100 {
        h.engine.wake();
        sleep(Duration::from_millis(2)).await;
    }
    assert!(!h.keepalive.is_idle_requested());

    timeout(Duration::from_secs(3), h.keepalive.idle_requested())
        .await
        .expect("idle should be requested");
}
