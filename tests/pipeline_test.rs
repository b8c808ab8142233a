// Integration tests for the full polling pipeline
//
// Each test drives Pipeline directly through scripted telemetry frames and
// asserts on the notifications recorded by the mock transport:
// 1. Identical consecutive snapshots never send twice
// 2. Race-control flags outrank positional changes within a cycle
// 3. The start-hidden flag fires once per connection
// 4. Reconnecting clears all de-duplication state
// 5. Transport failures retry instead of losing the payload

use std::sync::mpsc;
use std::time::Duration;

use pitboard::Driver;
use pitboard::classifier::{FLAG_START_HIDDEN, FLAG_TABLE};
use pitboard::config::AppConfig;
use pitboard::notifier::{
    Coalescer, MockNotificationTransport, Notification, Priority,
};
use pitboard::pipeline::{ConnectionState, DisplayUpdate, Pipeline};
use pitboard::telemetry::producer::{MockTelemetrySource, SourceFrame};

type TestPipeline = Pipeline<MockTelemetrySource, MockNotificationTransport>;

fn flag_bit(name: &str) -> u32 {
    FLAG_TABLE.iter().find(|flag| flag.name == name).unwrap().bit
}

fn rated_driver() -> Driver {
    Driver {
        car_index: 7,
        name: "Test Driver".to_string(),
        customer_id: 123456,
        i_rating: 5429,
        license_class: "A".to_string(),
        safety_rating: 4.11,
    }
}

fn racing_frame() -> SourceFrame {
    SourceFrame {
        position: Some(5),
        cars_in_field: Some(20),
        laps_completed: Some(5),
        laps_remaining_raw: Some(12),
        best_lap_time_s: None,
        ..Default::default()
    }
}

fn create_pipeline(
    frames: Vec<SourceFrame>,
) -> (TestPipeline, mpsc::Receiver<DisplayUpdate>) {
    let source = MockTelemetrySource::from_frames(frames).with_driver(rated_driver());
    let (tx, rx) = mpsc::channel();
    let pipeline = Pipeline::new(
        source,
        MockNotificationTransport::new(),
        AppConfig::default(),
        tx,
    )
    .with_coalescer(Coalescer::with_dismiss_pacing(Duration::ZERO));
    (pipeline, rx)
}

fn connect(pipeline: &mut TestPipeline) {
    pipeline.check_connection();
    assert_eq!(pipeline.connection_state(), ConnectionState::Connected);
}

fn frame_texts(notification: &Notification) -> Vec<&str> {
    notification
        .model
        .frames
        .iter()
        .map(|frame| frame.text.as_str())
        .collect()
}

#[test]
fn test_identical_snapshots_send_nothing_twice() {
    let (mut pipeline, _rx) = create_pipeline(vec![racing_frame(), racing_frame()]);
    connect(&mut pipeline);

    pipeline.cycle();
    let sends_after_first = pipeline.transport().sent.len();

    pipeline.cycle();
    assert_eq!(pipeline.transport().sent.len(), sends_after_first);
}

#[test]
fn test_flags_drop_positional_frames_from_the_cycle() {
    let checkered = SourceFrame {
        session_flags: flag_bit("checkered"),
        position: Some(3),
        best_lap_time_s: Some(70.5),
        ..racing_frame()
    };
    let (mut pipeline, _rx) = create_pipeline(vec![racing_frame(), checkered]);
    connect(&mut pipeline);

    // baseline cycle, then the checkered-flag cycle where position and best
    // lap changed as well
    pipeline.cycle();
    pipeline.cycle();

    let notification = pipeline.transport().sent.last().unwrap();
    assert_eq!(notification.priority, Priority::Critical);
    assert_eq!(notification.model.cycles, 0);
    assert_eq!(frame_texts(notification), vec!["Finish"]);
    assert_eq!(notification.model.frames[0].icon, "a43490");
}

#[test]
fn test_start_hidden_fires_once_per_connection() {
    let gridded = SourceFrame {
        session_flags: FLAG_START_HIDDEN,
        ..SourceFrame::default()
    };
    let (mut pipeline, _rx) =
        create_pipeline(vec![gridded.clone(), gridded.clone(), gridded.clone()]);
    connect(&mut pipeline);

    pipeline.cycle();
    pipeline.cycle();
    pipeline.cycle();

    let start_frames = pipeline
        .transport()
        .sent
        .iter()
        .filter(|n| frame_texts(n).contains(&"Start"))
        .count();
    assert_eq!(start_frames, 1);
}

#[test]
fn test_best_lap_and_position_gain_share_one_notification() {
    let improved = SourceFrame {
        position: Some(3),
        best_lap_time_s: Some(70.5),
        ..racing_frame()
    };
    let (mut pipeline, _rx) = create_pipeline(vec![racing_frame(), improved]);
    connect(&mut pipeline);

    pipeline.cycle();
    let sends_before = pipeline.transport().sent.len();
    pipeline.cycle();

    assert_eq!(pipeline.transport().sent.len(), sends_before + 1);
    let notification = pipeline.transport().sent.last().unwrap();
    assert_eq!(notification.priority, Priority::Info);
    assert!(notification.model.cycles >= 1 && notification.model.cycles <= 2);
    assert_eq!(frame_texts(notification), vec!["1:10.500", "3 / 20"]);
}

#[test]
fn test_infinite_laps_render_the_unlimited_marker() {
    let next_lap = SourceFrame {
        laps_completed: Some(6),
        laps_remaining_raw: Some(32767),
        ..racing_frame()
    };
    let (mut pipeline, _rx) = create_pipeline(vec![racing_frame(), next_lap]);
    connect(&mut pipeline);

    pipeline.cycle();
    pipeline.cycle();

    let notification = pipeline.transport().sent.last().unwrap();
    assert_eq!(frame_texts(notification), vec!["6 / ∞"]);
}

#[test]
fn test_reconnection_does_not_suppress_repeat_payloads() {
    let quick_lap = SourceFrame {
        best_lap_time_s: Some(70.5),
        ..racing_frame()
    };
    let (mut pipeline, _rx) = create_pipeline(vec![quick_lap.clone(), quick_lap.clone()]);
    connect(&mut pipeline);
    pipeline.cycle();

    let best_lap_sends = |pipeline: &TestPipeline| {
        pipeline
            .transport()
            .sent
            .iter()
            .filter(|n| frame_texts(n).contains(&"1:10.500"))
            .count()
    };
    assert_eq!(best_lap_sends(&pipeline), 1);

    pipeline.source_mut().drop_connection();
    pipeline.check_connection();
    assert_eq!(pipeline.connection_state(), ConnectionState::Disconnected);

    pipeline.source_mut().sim_running = true;
    connect(&mut pipeline);
    pipeline.cycle();

    // the same best lap goes out again: SentState and the coalescer were
    // cleared on disconnect
    assert_eq!(best_lap_sends(&pipeline), 2);
}

#[test]
fn test_eager_ratings_on_every_connection() {
    let (mut pipeline, _rx) = create_pipeline(vec![racing_frame(), racing_frame()]);
    connect(&mut pipeline);

    let ratings_sends = |pipeline: &TestPipeline| {
        pipeline
            .transport()
            .sent
            .iter()
            .filter(|n| frame_texts(n).contains(&"5,429"))
            .count()
    };
    assert_eq!(ratings_sends(&pipeline), 1);

    pipeline.source_mut().drop_connection();
    pipeline.check_connection();
    pipeline.source_mut().sim_running = true;
    connect(&mut pipeline);

    assert_eq!(ratings_sends(&pipeline), 2);
}

#[test]
fn test_failed_send_is_retried_on_the_next_cycle() {
    let quick_lap = SourceFrame {
        best_lap_time_s: Some(70.5),
        ..racing_frame()
    };
    let (mut pipeline, _rx) = create_pipeline(vec![quick_lap.clone(), quick_lap.clone()]);
    connect(&mut pipeline);

    let sends_before = pipeline.transport().sent.len();
    pipeline.transport_mut().fail_sends = true;
    pipeline.cycle();
    assert_eq!(pipeline.transport().sent.len(), sends_before);

    pipeline.transport_mut().fail_sends = false;
    pipeline.cycle();

    let notification = pipeline.transport().sent.last().unwrap();
    assert!(frame_texts(notification).contains(&"1:10.500"));
}

#[test]
fn test_stale_persistent_notifications_are_dismissed_on_send() {
    let caution = SourceFrame {
        session_flags: flag_bit("caution"),
        ..racing_frame()
    };
    let all_clear = SourceFrame {
        session_flags: flag_bit("green"),
        ..racing_frame()
    };
    let (mut pipeline, _rx) = create_pipeline(vec![racing_frame(), caution, all_clear]);
    connect(&mut pipeline);

    pipeline.cycle();
    pipeline.cycle();
    pipeline.cycle();

    // the eager ratings and the caution flag were both persistent; sending
    // the green flag dismissed them
    let transport = pipeline.transport();
    assert_eq!(transport.queue.len(), 2);
    assert!(transport.dismissed.len() >= 2);
}
