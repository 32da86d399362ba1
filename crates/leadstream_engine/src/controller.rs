use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use leadstream_core::{
    update, AudioAttachment, ControllerState, Effect, Msg, Record, SearchParameters,
    SessionEvent, SessionId, SessionOutcome, SessionView,
};
use stream_logging::{stream_debug, stream_info, stream_trace, stream_warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::backend::{HistoryRecorder, SearchBackend, Transcriber};

/// Upper bound on waiting for history posts when the controller shuts down.
const HISTORY_DRAIN_LIMIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Period of the progress clock.
    pub tick_interval: Duration,
    /// Whole-search limit, disarmed once the backend reports completion.
    pub session_timeout: Duration,
    /// Longest wait for the completion sprint before settling anyway.
    pub completion_wait_cap: Duration,
    /// Pause between reaching ~100% and reporting completion.
    pub settle_delay: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            session_timeout: Duration::from_secs(120),
            completion_wait_cap: Duration::from_millis(5_000),
            settle_delay: Duration::from_millis(1_000),
        }
    }
}

/// External collaborators the controller drives.
#[derive(Clone)]
pub struct ControllerServices {
    pub search: Arc<dyn SearchBackend>,
    pub transcriber: Arc<dyn Transcriber>,
    pub history: Arc<dyn HistoryRecorder>,
}

impl ControllerServices {
    /// Use one backend for search, transcription and history.
    pub fn from_backend<B>(backend: B) -> Self
    where
        B: SearchBackend + Transcriber + HistoryRecorder + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            search: backend.clone(),
            transcriber: backend.clone(),
            history: backend,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("search controller has shut down")]
pub struct ControllerClosed;

enum ControllerCommand {
    Start {
        parameters: SearchParameters,
        audio: Option<AudioAttachment>,
        reply: oneshot::Sender<Option<SessionId>>,
    },
    Cancel,
    Restore(Vec<Record>),
    View(oneshot::Sender<SessionView>),
    Shutdown,
}

/// Owner-side handle of a running search controller.
///
/// All session state lives on a single tokio task; this handle only sends
/// commands to it and receives [`SessionEvent`]s back.
pub struct SearchController {
    cmd_tx: mpsc::UnboundedSender<ControllerCommand>,
    event_rx: mpsc::UnboundedReceiver<SessionEvent>,
    actor: JoinHandle<()>,
}

/// Cloneable cancel button, e.g. for a Ctrl-C handler.
#[derive(Clone)]
pub struct CancelHandle {
    cmd_tx: mpsc::UnboundedSender<ControllerCommand>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.cmd_tx.send(ControllerCommand::Cancel);
    }
}

impl SearchController {
    /// Spawns the controller task on the current tokio runtime.
    pub fn spawn(services: ControllerServices, settings: ControllerSettings) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();

        let actor = ControllerActor {
            state: ControllerState::new(),
            services,
            settings,
            msg_tx,
            event_tx,
            tasks: SessionTasks::default(),
            history: JoinSet::new(),
        };
        let actor = tokio::spawn(actor.run(cmd_rx, msg_rx));

        Self {
            cmd_tx,
            event_rx,
            actor,
        }
    }

    /// Start a search, superseding any search still running.
    pub async fn start(
        &self,
        parameters: SearchParameters,
        audio: Option<AudioAttachment>,
    ) -> Result<SessionId, ControllerClosed> {
        let (reply, response) = oneshot::channel();
        self.cmd_tx
            .send(ControllerCommand::Start {
                parameters,
                audio,
                reply,
            })
            .map_err(|_| ControllerClosed)?;
        response.await.ok().flatten().ok_or(ControllerClosed)
    }

    pub fn cancel(&self) {
        let _ = self.cmd_tx.send(ControllerCommand::Cancel);
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cmd_tx: self.cmd_tx.clone(),
        }
    }

    /// Seed results from a previous run. Ignored while a search is running.
    pub fn restore(&self, records: Vec<Record>) {
        let _ = self.cmd_tx.send(ControllerCommand::Restore(records));
    }

    pub async fn view(&self) -> Result<SessionView, ControllerClosed> {
        let (reply, response) = oneshot::channel();
        self.cmd_tx
            .send(ControllerCommand::View(reply))
            .map_err(|_| ControllerClosed)?;
        response.await.map_err(|_| ControllerClosed)
    }

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.event_rx.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Drain events until `session_id` finishes, showing each one to
    /// `observe` on the way.
    pub async fn wait_for(
        &mut self,
        session_id: SessionId,
        mut observe: impl FnMut(&SessionEvent),
    ) -> Result<SessionOutcome, ControllerClosed> {
        while let Some(event) = self.event_rx.recv().await {
            observe(&event);
            if let SessionEvent::Finished(outcome) = event {
                if outcome.session_id == session_id {
                    return Ok(outcome);
                }
            }
        }
        Err(ControllerClosed)
    }

    /// Stop the controller, aborting any running search and giving pending
    /// history posts a bounded chance to finish.
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(ControllerCommand::Shutdown);
        if let Err(err) = self.actor.await {
            stream_warn!("Search controller task ended abnormally: {}", err);
        }
    }
}

struct ControllerActor {
    state: ControllerState,
    services: ControllerServices,
    settings: ControllerSettings,
    msg_tx: mpsc::UnboundedSender<Msg>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    tasks: SessionTasks,
    history: JoinSet<()>,
}

impl ControllerActor {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<ControllerCommand>,
        mut msg_rx: mpsc::UnboundedReceiver<Msg>,
    ) {
        loop {
            tokio::select! {
                biased;
                command = cmd_rx.recv() => match command {
                    Some(ControllerCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(msg) = msg_rx.recv() => self.dispatch(msg),
            }
        }
        stream_debug!("Search controller shutting down");
        self.tasks.shutdown();

        let pending = self.history.len();
        if pending > 0 {
            let drain = async { while self.history.join_next().await.is_some() {} };
            if tokio::time::timeout(HISTORY_DRAIN_LIMIT, drain).await.is_err() {
                stream_warn!("Gave up waiting for {} history posts", pending);
            }
        }
    }

    fn handle_command(&mut self, command: ControllerCommand) {
        match command {
            ControllerCommand::Start {
                parameters,
                audio,
                reply,
            } => {
                self.dispatch(Msg::SearchSubmitted { parameters, audio });
                let _ = reply.send(self.state.current_session_id());
            }
            ControllerCommand::Cancel => self.dispatch(Msg::CancelRequested),
            ControllerCommand::Restore(records) => self.dispatch(Msg::RestoreResults(records)),
            ControllerCommand::View(reply) => {
                let _ = reply.send(self.state.view());
            }
            ControllerCommand::Shutdown => {}
        }
    }

    fn dispatch(&mut self, msg: Msg) {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;
        for effect in effects {
            self.run_effect(effect);
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::Transcribe { session_id, audio } => {
                let transcriber = self.services.transcriber.clone();
                let msg_tx = self.msg_tx.clone();
                self.tasks
                    .spawn(session_id, TaskKind::Transcription, async move {
                        stream_debug!(
                            "Transcribing {} ({} bytes) for search {}",
                            audio.file_name,
                            audio.data.len(),
                            session_id
                        );
                        let result = transcriber
                            .transcribe(&audio)
                            .await
                            .map_err(|err| err.user_message());
                        let _ = msg_tx.send(Msg::TranscriptResolved { session_id, result });
                    });
            }
            Effect::OpenStream {
                session_id,
                parameters,
            } => {
                let search = self.services.search.clone();
                let msg_tx = self.msg_tx.clone();
                self.tasks.spawn(
                    session_id,
                    TaskKind::Stream,
                    read_stream(search, session_id, parameters, msg_tx),
                );
            }
            Effect::AbortStream { session_id } => {
                self.tasks.cancel(session_id, TaskKind::Stream);
                self.tasks.cancel(session_id, TaskKind::Transcription);
            }
            Effect::ArmTimeout { session_id } => {
                let delay = self.settings.session_timeout;
                let msg = Msg::TimeoutElapsed { session_id };
                let task = send_after(delay, self.msg_tx.clone(), msg);
                self.tasks.spawn(session_id, TaskKind::Timeout, task);
            }
            Effect::DisarmTimeout { session_id } => {
                self.tasks.cancel(session_id, TaskKind::Timeout);
            }
            Effect::StartClock { session_id } => {
                let task = run_clock(self.settings.tick_interval, session_id, self.msg_tx.clone());
                self.tasks.spawn(session_id, TaskKind::Clock, task);
            }
            Effect::StopClock { session_id } => {
                self.tasks.cancel(session_id, TaskKind::Clock);
            }
            Effect::AwaitCompletion { session_id } => {
                let delay = self.settings.completion_wait_cap;
                let msg = Msg::CompletionWaitElapsed { session_id };
                let task = send_after(delay, self.msg_tx.clone(), msg);
                self.tasks.spawn(session_id, TaskKind::CompletionWait, task);
            }
            Effect::ScheduleSettle { session_id } => {
                self.tasks.cancel(session_id, TaskKind::CompletionWait);
                let delay = self.settings.settle_delay;
                let msg = Msg::SettleElapsed { session_id };
                let task = send_after(delay, self.msg_tx.clone(), msg);
                self.tasks.spawn(session_id, TaskKind::Settle, task);
            }
            Effect::RecordHistory { session_id, entry } => {
                // Not tied to the session: a newer search must not abort it.
                reap_finished(&mut self.history);
                let history = self.services.history.clone();
                self.history.spawn(async move {
                    match history.record(&entry).await {
                        Ok(()) => stream_debug!(
                            "Recorded history for search {} ({} results)",
                            session_id,
                            entry.result_count
                        ),
                        Err(err) => stream_warn!(
                            "History for search {} was not recorded: {}",
                            session_id,
                            err
                        ),
                    }
                });
            }
            Effect::Notify(event) => {
                if let SessionEvent::Finished(outcome) = &event {
                    stream_info!(
                        "Search {} finished as {:?} with {} results",
                        outcome.session_id,
                        outcome.status,
                        outcome.records.len()
                    );
                    self.tasks.release(outcome.session_id);
                }
                let _ = self.event_tx.send(event);
            }
        }
    }
}

async fn read_stream(
    search: Arc<dyn SearchBackend>,
    session_id: SessionId,
    parameters: SearchParameters,
    msg_tx: mpsc::UnboundedSender<Msg>,
) {
    let mut stream = match search.open_stream(&parameters).await {
        Ok(stream) => stream,
        Err(err) => {
            stream_warn!("Search {} request failed: {}", session_id, err);
            let _ = msg_tx.send(Msg::StreamFailed {
                session_id,
                message: err.user_message(),
            });
            return;
        }
    };
    stream_debug!("Search {} stream open", session_id);

    while let Some(chunk) = stream.next().await {
        let msg = match chunk {
            Ok(bytes) => Msg::ChunkReceived {
                session_id,
                chunk: bytes.to_vec(),
            },
            Err(err) => {
                stream_warn!("Search {} stream broke: {}", session_id, err);
                let _ = msg_tx.send(Msg::StreamFailed {
                    session_id,
                    message: err.user_message(),
                });
                return;
            }
        };
        if msg_tx.send(msg).is_err() {
            return;
        }
    }
    let _ = msg_tx.send(Msg::StreamEnded { session_id });
}

async fn run_clock(period: Duration, session_id: SessionId, msg_tx: mpsc::UnboundedSender<Msg>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;
    loop {
        interval.tick().await;
        if msg_tx.send(Msg::Tick { session_id }).is_err() {
            break;
        }
    }
}

async fn send_after(delay: Duration, msg_tx: mpsc::UnboundedSender<Msg>, msg: Msg) {
    tokio::time::sleep(delay).await;
    let _ = msg_tx.send(msg);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TaskKind {
    Transcription,
    Stream,
    Timeout,
    Clock,
    CompletionWait,
    Settle,
}

/// Drops completed history posts so the set only holds ones still in flight.
fn reap_finished(tasks: &mut JoinSet<()>) -> usize {
    let mut reaped = 0;
    while let Some(result) = tasks.try_join_next() {
        if let Err(err) = result {
            stream_warn!("History post task failed: {}", err);
        }
        reaped += 1;
    }
    reaped
}

/// Background work owned by the newest session. Each task gets its own
/// cancellation token; starting work for a newer session cancels everything
/// belonging to the previous one.
#[derive(Default)]
struct SessionTasks {
    session_id: Option<SessionId>,
    tokens: HashMap<TaskKind, CancellationToken>,
}

impl SessionTasks {
    fn spawn<F>(&mut self, session_id: SessionId, kind: TaskKind, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.session_id {
            Some(current) if session_id < current => {
                stream_trace!("Not starting {:?} for superseded search {}", kind, session_id);
                return;
            }
            Some(current) if session_id == current => {}
            _ => {
                self.shutdown();
                self.session_id = Some(session_id);
            }
        }

        let token = CancellationToken::new();
        if let Some(previous) = self.tokens.insert(kind, token.clone()) {
            previous.cancel();
        }
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = task => {}
            }
        });
    }

    fn cancel(&mut self, session_id: SessionId, kind: TaskKind) {
        if self.session_id != Some(session_id) {
            return;
        }
        if let Some(token) = self.tokens.remove(&kind) {
            stream_trace!("Cancelled {:?} for search {}", kind, session_id);
            token.cancel();
        }
    }

    fn release(&mut self, session_id: SessionId) {
        if self.session_id == Some(session_id) {
            self.shutdown();
        }
    }

    fn shutdown(&mut self) {
        for (_, token) in self.tokens.drain() {
            token.cancel();
        }
    }
}
