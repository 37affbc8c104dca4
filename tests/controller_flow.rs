//! End-to-end controller behavior with an in-process provider and a mock
//! microphone.

mod common;

use std::sync::Arc;
use std::time::Duration;

use auravox::audio::{MockCapture, MockCaptureFactory, MockCaptureHandle};
use auravox::config::Config;
use auravox::controller::{ControllerEvent, SessionController};
use auravox::sentiment::SentimentSnapshot;
use tokio::sync::mpsc;
use tokio::time::timeout;

use common::{FakeAnalysis, FakeProvider};

const BLOCK_SIZE: usize = 64;

fn test_config(provider: &FakeProvider) -> Config {
    let mut config = Config::default();
    config.provider.api_key = Some("controller_test_key".to_string());
    config.provider.url = provider.url();
    config.analysis.enabled = false;
    config
}

/// Controller wired to the fake provider and one scripted mock microphone.
fn build_controller(
    config: Config,
) -> (
    SessionController,
    mpsc::Receiver<ControllerEvent>,
    MockCaptureHandle,
) {
    let (capture, handle) = MockCapture::new(BLOCK_SIZE, 5.0);
    let factory = MockCaptureFactory::new();
    factory.push(capture);
    let (controller, events) =
        SessionController::new(config, Arc::new(factory)).expect("build controller");
    (controller, events, handle)
}

async fn next_event(events: &mut mpsc::Receiver<ControllerEvent>) -> ControllerEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for controller event")
        .expect("controller event channel ended unexpectedly")
}

async fn next_transcript(events: &mut mpsc::Receiver<ControllerEvent>) -> (String, bool) {
    loop {
        if let ControllerEvent::Transcript(segment) = next_event(events).await {
            return (segment.text, segment.is_final);
        }
    }
}

async fn next_sentiment(events: &mut mpsc::Receiver<ControllerEvent>) -> SentimentSnapshot {
    loop {
        if let ControllerEvent::Sentiment(snapshot) = next_event(events).await {
            return snapshot;
        }
    }
}

#[tokio::test]
async fn full_session_flow() {
    let provider = FakeProvider::builder()
        .interim("hel")
        .final_result("hello")
        .final_result("world")
        .spawn()
        .await;
    let (controller, mut events, handle) = build_controller(test_config(&provider));

    controller.start().await.expect("start");
    let state = controller.connection_state();
    assert!(state.is_recording);
    assert!(state.is_connected);
    assert!(!state.is_connecting);
    assert!(state.error.is_none());

    // Microphone audio flows through to the service as binary frames
    assert!(handle.feed(&[0.05f32; BLOCK_SIZE * 2]));
    provider.wait_for_binary_frames(2).await;

    assert_eq!(next_transcript(&mut events).await, ("hel".to_string(), false));
    assert_eq!(
        next_transcript(&mut events).await,
        ("hello".to_string(), true)
    );
    assert_eq!(
        next_transcript(&mut events).await,
        ("world".to_string(), true)
    );
    assert_eq!(controller.transcript(), "hello world");
    assert_eq!(controller.final_transcript(), "hello world");

    controller.stop().await;
    let state = controller.connection_state();
    assert!(!state.is_recording);
    assert!(!state.is_connected);
    assert!(!state.is_connecting);
    assert!(!handle.is_active());
}

#[tokio::test]
async fn interim_is_replaced_wholesale_and_cleared_by_final() {
    let provider = FakeProvider::builder()
        .interim("hel")
        .interim("hello wor")
        .final_result("hello world")
        .spawn()
        .await;
    let (controller, mut events, _handle) = build_controller(test_config(&provider));

    controller.start().await.expect("start");

    next_transcript(&mut events).await;
    let (text, is_final) = next_transcript(&mut events).await;
    assert_eq!((text.as_str(), is_final), ("hello wor", false));
    assert_eq!(controller.transcript(), "hello wor");
    assert_eq!(controller.interim_transcript().as_deref(), Some("hello wor"));

    next_transcript(&mut events).await;
    assert_eq!(controller.transcript(), "hello world");
    assert_eq!(controller.interim_transcript(), None);

    controller.stop().await;
}

#[tokio::test]
async fn empty_results_are_dropped_before_the_buffer() {
    let provider = FakeProvider::builder()
        .final_result("")
        .final_result("first")
        .interim("   ")
        .final_result("second")
        .spawn()
        .await;
    let (controller, mut events, _handle) = build_controller(test_config(&provider));

    controller.start().await.expect("start");

    assert_eq!(
        next_transcript(&mut events).await,
        ("first".to_string(), true)
    );
    assert_eq!(
        next_transcript(&mut events).await,
        ("second".to_string(), true)
    );
    assert_eq!(controller.transcript(), "first second");

    controller.stop().await;
}

#[tokio::test]
async fn remote_close_clears_connected_but_not_recording() {
    let provider = FakeProvider::builder()
        .final_result("bye")
        .close_after_frames()
        .spawn()
        .await;
    let (controller, mut events, handle) = build_controller(test_config(&provider));

    controller.start().await.expect("start");
    next_transcript(&mut events).await;

    loop {
        if let ControllerEvent::Closed = next_event(&mut events).await {
            break;
        }
    }
    let state = controller.connection_state();
    assert!(!state.is_connected);
    assert!(state.error.is_none());
    // The microphone keeps running until the user stops it
    assert!(state.is_recording);
    assert!(handle.is_active());

    controller.stop().await;
    assert!(!handle.is_active());
}

#[tokio::test]
async fn stop_is_idempotent() {
    let provider = FakeProvider::builder().spawn().await;
    let (controller, _events, handle) = build_controller(test_config(&provider));

    controller.start().await.expect("start");
    controller.stop().await;
    controller.stop().await;

    let state = controller.connection_state();
    assert!(!state.is_recording);
    assert!(!handle.is_active());
}

#[tokio::test]
async fn start_while_active_is_a_noop() {
    let provider = FakeProvider::builder().spawn().await;
    let (controller, _events, handle) = build_controller(test_config(&provider));

    controller.start().await.expect("first start");
    // No second capture is scripted: if this tried to build a new session
    // it would fail on the factory
    controller.start().await.expect("second start");
    assert!(controller.is_recording());
    assert!(handle.is_active());

    controller.stop().await;
}

#[tokio::test]
async fn stop_during_slow_start_discards_the_session() {
    let provider = FakeProvider::builder().spawn().await;
    let mut config = test_config(&provider);
    config.analysis.enabled = false;

    let (capture, handle) = MockCapture::new(BLOCK_SIZE, 5.0);
    let capture = capture.with_start_delay(Duration::from_millis(300));
    let factory = MockCaptureFactory::new();
    factory.push(capture);
    let (controller, _events) =
        SessionController::new(config, Arc::new(factory)).expect("build controller");
    let controller = Arc::new(controller);

    let starter = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.start().await })
    };
    // Let the start reach the slow capture startup, then supersede it
    tokio::time::sleep(Duration::from_millis(50)).await;
    controller.stop().await;

    starter
        .await
        .expect("join start")
        .expect("superseded start is not an error");

    let state = controller.connection_state();
    assert!(!state.is_recording);
    assert!(!state.is_connecting);
    assert!(state.error.is_none());
    assert!(!handle.is_active());
}

#[tokio::test]
async fn final_transcripts_are_analyzed() {
    let analysis = FakeAnalysis::spawn(vec![serde_json::json!({
        "sentiment": 0.7,
        "sentiment_label": "positive",
        "keywords": ["alpha", "beta"],
        "confidence": 0.9,
        "emotion_scores": {
            "joy": 0.8, "sadness": 0.0, "anger": 0.0,
            "fear": 0.0, "surprise": 0.1, "disgust": 0.0
        }
    })])
    .await;
    let provider = FakeProvider::builder()
        .interim("hello th")
        .final_result("hello there")
        .spawn()
        .await;

    let mut config = test_config(&provider);
    config.analysis.enabled = true;
    config.analysis.url = analysis.url();
    let (controller, mut events, _handle) = build_controller(config);

    controller.start().await.expect("start");

    let snapshot = next_sentiment(&mut events).await;
    assert_eq!(snapshot.sentiment_label, "positive");
    assert!((snapshot.sentiment - 0.7).abs() < 1e-6);
    assert_eq!(snapshot.keywords, vec!["alpha", "beta"]);
    assert!((snapshot.emotion_scores.joy - 0.8).abs() < 1e-6);

    // Only the final went to the collaborator, never the interim
    assert_eq!(analysis.requests(), vec!["hello there".to_string()]);
    assert_eq!(controller.keywords(), vec!["alpha", "beta"]);

    controller.stop().await;
}

#[tokio::test]
async fn keywords_accumulate_across_finals() {
    let analysis = FakeAnalysis::spawn(vec![
        serde_json::json!({
            "sentiment": 0.5, "sentiment_label": "positive",
            "keywords": ["alpha", "beta"], "confidence": 0.9
        }),
        serde_json::json!({
            "sentiment": -0.2, "sentiment_label": "negative",
            "keywords": ["beta", "gamma"], "confidence": 0.8
        }),
    ])
    .await;
    let provider = FakeProvider::builder()
        .final_result("one")
        .final_result("two")
        .spawn()
        .await;

    let mut config = test_config(&provider);
    config.analysis.enabled = true;
    config.analysis.url = analysis.url();
    let (controller, mut events, _handle) = build_controller(config);

    controller.start().await.expect("start");
    analysis.wait_for_requests(2).await;

    next_sentiment(&mut events).await;
    let snapshot = next_sentiment(&mut events).await;

    // Duplicates collapse; the union survives in the merged view
    assert_eq!(snapshot.keywords.len(), 3);
    for keyword in ["alpha", "beta", "gamma"] {
        assert!(snapshot.keywords.iter().any(|k| k == keyword));
    }

    controller.stop().await;
}

#[tokio::test]
async fn analysis_failure_never_stops_recording() {
    // Reserve a dead port so every analysis request fails fast
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let dead = listener.local_addr().expect("addr");
    drop(listener);

    let provider = FakeProvider::builder()
        .final_result("still here")
        .spawn()
        .await;
    let mut config = test_config(&provider);
    config.analysis.enabled = true;
    config.analysis.url = format!("http://{dead}");
    let (controller, mut events, handle) = build_controller(config);

    controller.start().await.expect("start");
    next_transcript(&mut events).await;

    // Give the doomed analysis request time to fail
    tokio::time::sleep(Duration::from_millis(100)).await;

    let state = controller.connection_state();
    assert!(state.is_recording);
    assert!(state.is_connected);
    assert!(state.error.is_none());
    assert_eq!(controller.transcript(), "still here");

    // Audio still flows after the failure
    assert!(handle.feed(&[0.05f32; BLOCK_SIZE]));
    provider.wait_for_binary_frames(1).await;

    controller.stop().await;
}

#[tokio::test]
async fn reset_clears_transcript_and_keywords() {
    let analysis = FakeAnalysis::spawn(vec![serde_json::json!({
        "sentiment": 0.4, "sentiment_label": "positive",
        "keywords": ["alpha"], "confidence": 0.9
    })])
    .await;
    let provider = FakeProvider::builder()
        .final_result("forget me")
        .spawn()
        .await;

    let mut config = test_config(&provider);
    config.analysis.enabled = true;
    config.analysis.url = analysis.url();
    let (controller, mut events, _handle) = build_controller(config);

    controller.start().await.expect("start");
    next_sentiment(&mut events).await;
    assert_eq!(controller.transcript(), "forget me");
    assert_eq!(controller.keywords(), vec!["alpha"]);

    controller.reset().await;
    assert_eq!(controller.transcript(), "");
    assert!(controller.keywords().is_empty());
    assert!(controller.sentiment().is_none());
    assert!(!controller.is_recording());
}
