use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use leadstream_core::{
    AudioAttachment, GeoPoint, HistoryEntry, Record, RecordId, SearchParameters, SessionEvent,
    SessionStatus, StreamEvent,
};
use leadstream_engine::{
    ChunkStream, ControllerServices, ControllerSettings, FailureKind, HistoryRecorder,
    SearchBackend, SearchController, Transcriber, TransportError,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::Instant;

enum Step {
    Send(String),
    Wait(Duration),
    Fail(TransportError),
    Hang,
}

type Script = Result<Vec<Step>, TransportError>;

/// In-memory backend that replays one script per opened stream.
struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
    opened: Mutex<Vec<SearchParameters>>,
    transcript: Result<String, TransportError>,
    history: Mutex<Vec<HistoryEntry>>,
    history_fails: bool,
}

impl ScriptedBackend {
    fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            opened: Mutex::new(Vec::new()),
            transcript: Ok(String::new()),
            history: Mutex::new(Vec::new()),
            history_fails: false,
        }
    }

    fn opened(&self) -> Vec<SearchParameters> {
        self.opened.lock().unwrap().clone()
    }

    fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SearchBackend for ScriptedBackend {
    async fn open_stream(
        &self,
        parameters: &SearchParameters,
    ) -> Result<ChunkStream, TransportError> {
        self.opened.lock().unwrap().push(parameters.clone());
        let steps = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(vec![Step::Hang]))?;

        Ok(futures_util::stream::unfold(steps.into_iter(), |mut steps| async move {
            loop {
                match steps.next() {
                    None => return None,
                    Some(Step::Send(text)) => return Some((Ok(Bytes::from(text)), steps)),
                    Some(Step::Fail(err)) => return Some((Err(err), steps)),
                    Some(Step::Wait(delay)) => tokio::time::sleep(delay).await,
                    Some(Step::Hang) => futures_util::future::pending::<()>().await,
                }
            }
        })
        .boxed())
    }
}

#[async_trait::async_trait]
impl Transcriber for ScriptedBackend {
    async fn transcribe(&self, _audio: &AudioAttachment) -> Result<String, TransportError> {
        self.transcript.clone()
    }
}

#[async_trait::async_trait]
impl HistoryRecorder for ScriptedBackend {
    async fn record(&self, entry: &HistoryEntry) -> Result<(), TransportError> {
        if self.history_fails {
            return Err(TransportError::new(FailureKind::HttpStatus(500), "boom"));
        }
        self.history.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

fn spawn(backend: &Arc<ScriptedBackend>) -> SearchController {
    let services = ControllerServices {
        search: backend.clone(),
        transcriber: backend.clone(),
        history: backend.clone(),
    };
    SearchController::spawn(services, ControllerSettings::default())
}

fn parameters() -> SearchParameters {
    SearchParameters {
        category: "plumber".to_string(),
        bbox: "51.50,-0.13,51.52,-0.10".to_string(),
        center: GeoPoint {
            lat: 51.51,
            lng: -0.12,
        },
        radius_km: 3.0,
        location_name: "Holborn".to_string(),
        filter: None,
        merge: false,
        user_id: "user-7".to_string(),
    }
}

fn audio() -> AudioAttachment {
    AudioAttachment {
        file_name: "memo.webm".to_string(),
        mime_type: "audio/webm".to_string(),
        data: vec![7; 32],
    }
}

fn status(message: &str) -> Step {
    Step::Send(
        StreamEvent::Status {
            message: message.to_string(),
        }
        .to_frame(),
    )
}

fn lead(record: Record) -> Step {
    Step::Send(StreamEvent::Lead { record }.to_frame())
}

fn complete() -> Step {
    Step::Send(StreamEvent::Complete.to_frame())
}

fn progress_of(events: &[SessionEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn completed_search_settles_and_records_history() {
    let update_frame = StreamEvent::Update {
        record: Record::new(1).with("phone", "+44 20 7946 0000"),
    }
    .to_frame();
    let (head, tail) = update_frame.split_at(update_frame.len() / 2);

    let backend = Arc::new(ScriptedBackend::new(vec![Ok(vec![
        status("Scanning map tiles"),
        Step::Wait(Duration::from_millis(300)),
        lead(Record::new(1).with("name", "Holborn Pipes")),
        lead(Record::new(1).with("name", "Duplicate")),
        Step::Send(head.to_string()),
        Step::Wait(Duration::from_millis(40)),
        Step::Send(tail.to_string()),
        Step::Wait(Duration::from_millis(200)),
        complete(),
    ])]));
    let mut controller = spawn(&backend);

    let started = Instant::now();
    let session_id = controller.start(parameters(), None).await.unwrap();
    let mut events = Vec::new();
    let outcome = controller
        .wait_for(session_id, |event| events.push(event.clone()))
        .await
        .unwrap();

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.message.as_deref(), Some("Found 1 results"));
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].get("name"), Some(&json!("Holborn Pipes")));
    assert_eq!(
        outcome.records[0].get("phone"),
        Some(&json!("+44 20 7946 0000"))
    );
    assert!(started.elapsed() >= Duration::from_millis(1_540));

    let progress = progress_of(&events);
    assert!(progress.windows(2).all(|pair| pair[1] >= pair[0]));
    assert_eq!(progress.last().copied(), Some(100.0));
    assert!(events.iter().any(|event| matches!(
        event,
        SessionEvent::ResultsPublished { records, .. } if records.len() == 1
    )));

    tokio::time::sleep(Duration::from_millis(10)).await;
    let history = backend.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].user_id, "user-7");
    assert_eq!(history[0].result_count, 1);
    assert_eq!(history[0].valid_result_count, 1);
}

#[tokio::test(start_paused = true)]
async fn silent_stream_times_out() {
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(vec![
        status("Starting"),
        Step::Hang,
    ])]));
    let mut controller = spawn(&backend);

    let started = Instant::now();
    let session_id = controller.start(parameters(), None).await.unwrap();
    let outcome = controller.wait_for(session_id, |_| {}).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::TimedOut);
    assert_eq!(
        outcome.message.as_deref(),
        Some("The search took too long and was stopped")
    );
    assert!(started.elapsed() >= Duration::from_secs(120));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(backend.history().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_search_and_resets_progress() {
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(vec![
        status("Starting"),
        lead(Record::new("a")),
        Step::Hang,
    ])]));
    let mut controller = spawn(&backend);

    let session_id = controller.start(parameters(), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    controller.cancel_handle().cancel();

    let mut events = Vec::new();
    let outcome = controller
        .wait_for(session_id, |event| events.push(event.clone()))
        .await
        .unwrap();

    assert_eq!(outcome.status, SessionStatus::Cancelled);
    assert_eq!(progress_of(&events).last().copied(), Some(0.0));

    // Nothing from the cancelled search arrives later.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(controller.try_next_event(), None);
}

#[tokio::test(start_paused = true)]
async fn newer_search_supersedes_running_one() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok(vec![
            lead(Record::new(1)),
            Step::Wait(Duration::from_secs(10)),
            lead(Record::new(2)),
            complete(),
        ]),
        Ok(vec![lead(Record::new(3)), complete()]),
    ]));
    let mut controller = spawn(&backend);

    let first = controller.start(parameters(), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let second = controller.start(parameters(), None).await.unwrap();
    assert!(second > first);

    let mut events = Vec::new();
    let outcome = controller
        .wait_for(second, |event| events.push(event.clone()))
        .await
        .unwrap();

    let superseded = events
        .iter()
        .find_map(|event| match event {
            SessionEvent::Finished(outcome) if outcome.session_id == first => Some(outcome),
            _ => None,
        })
        .expect("first search finished");
    assert_eq!(superseded.status, SessionStatus::Cancelled);
    assert_eq!(
        superseded.message.as_deref(),
        Some("Superseded by a newer search")
    );

    assert_eq!(outcome.status, SessionStatus::Completed);
    let ids: Vec<_> = outcome.records.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, vec![RecordId::Int(3)]);

    tokio::time::sleep(Duration::from_secs(15)).await;
    while let Some(event) = controller.try_next_event() {
        assert_eq!(event.session_id(), second);
    }
}

#[tokio::test(start_paused = true)]
async fn rejected_request_fails_with_server_message() {
    let backend = Arc::new(ScriptedBackend::new(vec![Err(TransportError::new(
        FailureKind::HttpStatus(429),
        "Quota exceeded",
    ))]));
    let mut controller = spawn(&backend);

    let session_id = controller.start(parameters(), None).await.unwrap();
    let outcome = controller.wait_for(session_id, |_| {}).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Failed);
    assert_eq!(outcome.message.as_deref(), Some("Quota exceeded"));
}

#[tokio::test(start_paused = true)]
async fn broken_transport_fails_search() {
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(vec![
        lead(Record::new(1)),
        Step::Fail(TransportError::new(FailureKind::Network, "connection reset")),
    ])]));
    let mut controller = spawn(&backend);

    let session_id = controller.start(parameters(), None).await.unwrap();
    let outcome = controller.wait_for(session_id, |_| {}).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Failed);
    assert_eq!(
        outcome.message.as_deref(),
        Some("network error: connection reset")
    );
}

#[tokio::test(start_paused = true)]
async fn stream_closing_without_completion_fails() {
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(vec![
        status("Starting"),
        lead(Record::new(1)),
    ])]));
    let mut controller = spawn(&backend);

    let session_id = controller.start(parameters(), None).await.unwrap();
    let outcome = controller.wait_for(session_id, |_| {}).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Failed);
    assert_eq!(
        outcome.message.as_deref(),
        Some("Stream ended before completion")
    );
}

#[tokio::test(start_paused = true)]
async fn transcript_is_added_to_filter() {
    let mut backend = ScriptedBackend::new(vec![Ok(vec![complete()])]);
    backend.transcript = Ok("open on sundays".to_string());
    let backend = Arc::new(backend);
    let mut controller = spawn(&backend);

    let session_id = controller
        .start(parameters(), Some(audio()))
        .await
        .unwrap();
    let outcome = controller.wait_for(session_id, |_| {}).await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert!(outcome.warnings.is_empty());
    assert_eq!(
        backend.opened()[0].filter.as_deref(),
        Some("open on sundays")
    );
}

#[tokio::test(start_paused = true)]
async fn failed_transcription_still_searches() {
    let mut backend = ScriptedBackend::new(vec![Ok(vec![
        lead(Record::new(1).with("email", "info@pipes.test")),
        complete(),
    ])]);
    backend.transcript = Err(TransportError::new(FailureKind::Network, "offline"));
    let backend = Arc::new(backend);
    let mut controller = spawn(&backend);

    let session_id = controller
        .start(parameters(), Some(audio()))
        .await
        .unwrap();
    let mut events = Vec::new();
    let outcome = controller
        .wait_for(session_id, |event| events.push(event.clone()))
        .await
        .unwrap();

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].starts_with("Audio transcription failed"));
    assert!(events
        .iter()
        .any(|event| matches!(event, SessionEvent::Warning { .. })));
    assert_eq!(backend.opened()[0].filter, None);
}

#[tokio::test(start_paused = true)]
async fn history_failure_does_not_change_outcome() {
    let mut backend = ScriptedBackend::new(vec![Ok(vec![lead(Record::new(1)), complete()])]);
    backend.history_fails = true;
    let backend = Arc::new(backend);
    let mut controller = spawn(&backend);

    let session_id = controller.start(parameters(), None).await.unwrap();
    let outcome = controller.wait_for(session_id, |_| {}).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(controller.try_next_event(), None);
}

#[tokio::test(start_paused = true)]
async fn restored_results_show_in_view() {
    let backend = Arc::new(ScriptedBackend::new(Vec::new()));
    let controller = spawn(&backend);

    controller.restore(vec![
        Record::new(1).with("email", "a@b.test"),
        Record::new(2),
    ]);
    let view = controller.view().await.unwrap();

    assert_eq!(view.status, SessionStatus::Idle);
    assert_eq!(view.stats.total, 2);
    assert_eq!(view.stats.valid, 1);
    assert!(backend.opened().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_pending_history() {
    let backend = Arc::new(ScriptedBackend::new(vec![Ok(vec![
        lead(Record::new(1).with("phone", "555")),
        complete(),
    ])]));
    let mut controller = spawn(&backend);

    let session_id = controller.start(parameters(), None).await.unwrap();
    let outcome = controller.wait_for(session_id, |_| {}).await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Completed);

    controller.shutdown().await;
    assert_eq!(backend.history().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn history_from_back_to_back_searches_is_all_recorded() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        Ok(vec![lead(Record::new(1).with("phone", "555")), complete()]),
        Ok(vec![lead(Record::new(2).with("email", "x@y.test")), complete()]),
    ]));
    let mut controller = spawn(&backend);

    for _ in 0..2 {
        let session_id = controller.start(parameters(), None).await.unwrap();
        let outcome = controller.wait_for(session_id, |_| {}).await.unwrap();
        assert_eq!(outcome.status, SessionStatus::Completed);
    }

    controller.shutdown().await;
    assert_eq!(backend.history().len(), 2);
}
