use stream_logging::{stream_debug, stream_info, stream_trace, stream_warn};

use crate::progress::{
    COMPLETION_FLOOR, DISCOVERY_TARGET_CAP, FIRST_PHASE_TARGET, LEAD_TARGET_INCREMENT,
    PROGRESS_COMPLETE,
};
use crate::{
    AudioAttachment, ControllerState, Effect, Msg, Record, SearchParameters, SearchSession,
    SessionEvent, SessionId, SessionStatus, StreamEvent, StreamPhase,
};

const SUPERSEDED_MESSAGE: &str = "Superseded by a newer search";
const CANCELLED_MESSAGE: &str = "Search cancelled";
const TIMED_OUT_MESSAGE: &str = "The search took too long and was stopped";
const STREAM_CLOSED_EARLY_MESSAGE: &str = "Stream ended before completion";

/// Phases in which a running session still accepts clock ticks.
const ACTIVE_PHASES: [StreamPhase; 4] = [
    StreamPhase::Transcribing,
    StreamPhase::Streaming,
    StreamPhase::AwaitingFinish,
    StreamPhase::Settling,
];

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: ControllerState, msg: Msg) -> (ControllerState, Vec<Effect>) {
    let effects = match msg {
        Msg::SearchSubmitted { parameters, audio } => start_session(&mut state, parameters, audio),
        Msg::TranscriptResolved { session_id, result } => {
            resolve_transcript(&mut state, session_id, result)
        }
        Msg::ChunkReceived { session_id, chunk } => {
            if !is_live(&state, session_id, &[StreamPhase::Streaming]) {
                return (state, Vec::new());
            }
            let events = state.parser.feed(&chunk);
            state.dropped_frames += state.parser.take_warnings().len();
            apply_events(&mut state, session_id, events)
        }
        Msg::StreamEnded { session_id } => end_stream(&mut state, session_id),
        Msg::StreamFailed {
            session_id,
            message,
        } => {
            if !is_live(&state, session_id, &[StreamPhase::Streaming]) {
                return (state, Vec::new());
            }
            stream_warn!("Search {} failed: {}", session_id, message);
            terminate(&mut state, SessionStatus::Failed, Some(message))
        }
        Msg::Tick { session_id } => tick(&mut state, session_id),
        Msg::CompletionWaitElapsed { session_id } => {
            if !is_live(&state, session_id, &[StreamPhase::AwaitingFinish]) {
                return (state, Vec::new());
            }
            stream_debug!(
                "Completion wait for {} capped at {:.1}%",
                session_id,
                state.progress.displayed()
            );
            begin_settle(&mut state, session_id)
        }
        Msg::SettleElapsed { session_id } => finish_completed(&mut state, session_id),
        Msg::TimeoutElapsed { session_id } => {
            let waiting = [StreamPhase::Transcribing, StreamPhase::Streaming];
            if !is_live(&state, session_id, &waiting) {
                return (state, Vec::new());
            }
            stream_warn!("Search {} timed out", session_id);
            terminate(
                &mut state,
                SessionStatus::TimedOut,
                Some(TIMED_OUT_MESSAGE.to_string()),
            )
        }
        Msg::CancelRequested => cancel(&mut state),
        Msg::RestoreResults(records) => {
            restore_results(&mut state, records);
            Vec::new()
        }
    };

    (state, effects)
}

/// Race guard: only the current, still running session in one of `phases` may act.
fn is_live(state: &ControllerState, session_id: SessionId, phases: &[StreamPhase]) -> bool {
    let live = state
        .session
        .as_ref()
        .is_some_and(|session| session.id == session_id && session.is_running())
        && phases.contains(&state.phase);
    if !live {
        stream_trace!(
            "Discarding message for session {} (current {:?}, phase {:?})",
            session_id,
            state.current_session_id(),
            state.phase
        );
    }
    live
}

fn start_session(
    state: &mut ControllerState,
    parameters: SearchParameters,
    audio: Option<AudioAttachment>,
) -> Vec<Effect> {
    let mut effects = Vec::new();
    if let Some(previous) = state.session.as_ref().filter(|s| s.is_running()) {
        stream_info!("Search {} superseded by a new search", previous.id);
        effects.extend(terminate(
            state,
            SessionStatus::Cancelled,
            Some(SUPERSEDED_MESSAGE.to_string()),
        ));
    }

    let session_id = state.allocate_session_id();
    state.parser.reset();
    state.results.reset();
    state.progress.reset();
    state.seen_status = false;
    state.dropped_frames = 0;

    let mut session = SearchSession::new(session_id, parameters);
    session.transition(SessionStatus::Running, None);
    let parameters = session.parameters.clone();
    state.session = Some(session);
    state.mark_dirty();
    stream_info!(
        "Search {} started: category={} location={}",
        session_id,
        parameters.category,
        parameters.location_name
    );

    effects.push(Effect::Notify(SessionEvent::StateChanged {
        session_id,
        status: SessionStatus::Running,
        message: None,
    }));
    effects.push(Effect::ArmTimeout { session_id });
    effects.push(Effect::StartClock { session_id });
    match audio {
        Some(audio) => {
            state.phase = StreamPhase::Transcribing;
            effects.push(Effect::Transcribe { session_id, audio });
        }
        None => {
            state.phase = StreamPhase::Streaming;
            effects.push(Effect::OpenStream {
                session_id,
                parameters,
            });
        }
    }
    effects
}

fn resolve_transcript(
    state: &mut ControllerState,
    session_id: SessionId,
    result: Result<String, String>,
) -> Vec<Effect> {
    if !is_live(state, session_id, &[StreamPhase::Transcribing]) {
        return Vec::new();
    }
    let Some(session) = state.session.as_mut() else {
        return Vec::new();
    };

    let mut effects = Vec::new();
    match result {
        Ok(transcript) => {
            stream_debug!("Transcript for {}: {} chars", session_id, transcript.len());
            session.parameters.absorb_transcript(&transcript);
        }
        Err(reason) => {
            let message =
                format!("Audio transcription failed ({reason}); searching with the text filter only");
            stream_warn!("Search {}: {}", session_id, message);
            session.warnings.push(message.clone());
            effects.push(Effect::Notify(SessionEvent::Warning {
                session_id,
                message,
            }));
        }
    }
    let parameters = session.parameters.clone();

    state.phase = StreamPhase::Streaming;
    state.mark_dirty();
    effects.push(Effect::OpenStream {
        session_id,
        parameters,
    });
    effects
}

/// Applies decoded events in wire order. Everything after `complete` is ignored.
fn apply_events(
    state: &mut ControllerState,
    session_id: SessionId,
    events: Vec<StreamEvent>,
) -> Vec<Effect> {
    let mut results_touched = false;
    let mut progress_touched = false;
    let mut completed = false;

    for event in events {
        match event {
            StreamEvent::Status { message } => {
                if state.seen_status {
                    state.progress.set_message(message);
                } else {
                    state.seen_status = true;
                    state.progress.set_target(FIRST_PHASE_TARGET, Some(message));
                }
                progress_touched = true;
            }
            StreamEvent::Lead { record } => {
                results_touched |= state.results.apply_lead(record);
                state
                    .progress
                    .bump_target(LEAD_TARGET_INCREMENT, DISCOVERY_TARGET_CAP);
            }
            StreamEvent::Update { record } => {
                results_touched |= state.results.apply_update(record);
            }
            StreamEvent::Complete => {
                state.progress.set_target(PROGRESS_COMPLETE, None);
                state.phase = StreamPhase::AwaitingFinish;
                completed = true;
                break;
            }
            StreamEvent::Unknown => {
                stream_trace!("Ignoring unknown event type in search {}", session_id);
            }
        }
    }

    let mut effects = Vec::new();
    if results_touched {
        state.mark_dirty();
        effects.push(Effect::Notify(SessionEvent::ResultsChanged {
            session_id,
            total: state.results.len(),
        }));
    }
    if progress_touched {
        state.mark_dirty();
        effects.push(progress_event(state, session_id));
    }
    if completed {
        stream_info!(
            "Search {} complete with {} results",
            session_id,
            state.results.len()
        );
        state.mark_dirty();
        effects.push(Effect::DisarmTimeout { session_id });
        effects.push(Effect::AwaitCompletion { session_id });
        effects.push(Effect::Notify(SessionEvent::ResultsPublished {
            session_id,
            records: state.results.snapshot(),
        }));
    }
    effects
}

fn end_stream(state: &mut ControllerState, session_id: SessionId) -> Vec<Effect> {
    if !is_live(state, session_id, &[StreamPhase::Streaming]) {
        return Vec::new();
    }
    let residual = state.parser.flush();
    state.dropped_frames += state.parser.take_warnings().len();
    let mut effects = apply_events(state, session_id, residual);
    if state.phase == StreamPhase::Streaming {
        stream_warn!("Search {} stream closed without a complete event", session_id);
        effects.extend(terminate(
            state,
            SessionStatus::Failed,
            Some(STREAM_CLOSED_EARLY_MESSAGE.to_string()),
        ));
    }
    effects
}

fn tick(state: &mut ControllerState, session_id: SessionId) -> Vec<Effect> {
    if !is_live(state, session_id, &ACTIVE_PHASES) {
        return Vec::new();
    }
    let before = state.progress.displayed();
    let displayed = state.progress.tick();

    let mut effects = Vec::new();
    if displayed > before {
        state.mark_dirty();
        effects.push(progress_event(state, session_id));
    }
    if state.phase == StreamPhase::AwaitingFinish && displayed >= COMPLETION_FLOOR {
        effects.extend(begin_settle(state, session_id));
    }
    effects
}

fn begin_settle(state: &mut ControllerState, session_id: SessionId) -> Vec<Effect> {
    state.phase = StreamPhase::Settling;
    vec![Effect::ScheduleSettle { session_id }]
}

fn finish_completed(state: &mut ControllerState, session_id: SessionId) -> Vec<Effect> {
    if !is_live(state, session_id, &[StreamPhase::Settling]) {
        return Vec::new();
    }
    let mut effects = Vec::new();
    if !state.progress.is_complete() {
        state.progress.finish();
        effects.push(progress_event(state, session_id));
    }
    let message = format!("Found {} results", state.results.len());
    effects.extend(terminate(state, SessionStatus::Completed, Some(message)));
    effects
}

fn cancel(state: &mut ControllerState) -> Vec<Effect> {
    let Some(session_id) = state
        .session
        .as_ref()
        .filter(|session| session.is_running())
        .map(|session| session.id)
    else {
        stream_trace!("Cancel ignored: no running search");
        return Vec::new();
    };

    stream_info!("Search {} cancelled", session_id);
    state.progress.reset();
    state.parser.reset();
    let mut effects = vec![Effect::Notify(SessionEvent::Progress {
        session_id,
        percent: 0.0,
        message: None,
    })];
    effects.extend(terminate(
        state,
        SessionStatus::Cancelled,
        Some(CANCELLED_MESSAGE.to_string()),
    ));
    effects
}

fn restore_results(state: &mut ControllerState, records: Vec<Record>) {
    if state.session.as_ref().is_some_and(|s| s.is_running()) {
        stream_debug!("Ignoring cached results while a search is running");
        return;
    }
    state.results = records.into_iter().collect();
    state.mark_dirty();
}

/// Moves the current session into a terminal state and releases its resources.
fn terminate(
    state: &mut ControllerState,
    status: SessionStatus,
    message: Option<String>,
) -> Vec<Effect> {
    let Some(session) = state.session.as_mut() else {
        return Vec::new();
    };
    if !session.transition(status, message) {
        return Vec::new();
    }
    let session_id = session.id;
    let message = session.message.clone();
    state.phase = StreamPhase::Closed;
    state.mark_dirty();

    let mut effects = vec![
        Effect::AbortStream { session_id },
        Effect::DisarmTimeout { session_id },
        Effect::StopClock { session_id },
        Effect::Notify(SessionEvent::StateChanged {
            session_id,
            status,
            message,
        }),
    ];
    if status == SessionStatus::Completed {
        if let Some(entry) = state.history_entry() {
            effects.push(Effect::RecordHistory { session_id, entry });
        }
    }
    if let Some(outcome) = state.outcome() {
        effects.push(Effect::Notify(SessionEvent::Finished(outcome)));
    }
    effects
}

fn progress_event(state: &ControllerState, session_id: SessionId) -> Effect {
    Effect::Notify(SessionEvent::Progress {
        session_id,
        percent: state.progress.displayed(),
        message: state.progress.message().map(ToOwned::to_owned),
    })
}
