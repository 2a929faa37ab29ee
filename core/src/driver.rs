//! Event loop for a search session
//!
//! One task owns the [`SearchSession`] and multiplexes three event sources:
//! commands from the caller, debounce deadlines and finished fetches. Fetches
//! run concurrently in a `JoinSet`; their outcomes come back to the same task,
//! so session state is only ever touched from one place.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{Id, JoinError, JoinHandle, JoinSet};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, warn};

use crate::backend::SearchBackend;
use crate::error::{Error, FetchError, Result};
use crate::session::{FetchOutcome, FetchRequest, SearchSession};
use crate::types::{SearchFilters, SearchSnapshot};

/// Idle wake-up when no debounce deadline is armed (the branch is disabled
/// in that case; this only gives the sleep future a value).
const IDLE_SLEEP: Duration = Duration::from_secs(3600);

/// Something the caller wants the session to do.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Input {
        text: String,
        filters: SearchFilters,
    },
    AddToHistory(String),
    ClearCache,
    Refetch,
    Reset,
}

/// Caller side of a running session.
///
/// Dropping every handle stops the session task.
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<SearchSnapshot>,
    sent: u64,
}

impl SessionHandle {
    /// Queue a command. Returns the revision at which it will be reflected.
    pub fn send(&mut self, command: SessionCommand) -> Result<u64> {
        self.commands
            .send(command)
            .map_err(|_| Error::SessionClosed)?;
        self.sent += 1;
        Ok(self.sent)
    }

    /// Shorthand for [`SessionCommand::Input`].
    pub fn input(&mut self, text: impl Into<String>, filters: SearchFilters) -> Result<u64> {
        self.send(SessionCommand::Input {
            text: text.into(),
            filters,
        })
    }

    /// Most recently published state, without waiting.
    pub fn latest(&self) -> SearchSnapshot {
        self.state.borrow().clone()
    }

    /// State reflecting every command sent so far.
    pub async fn snapshot(&mut self) -> Result<SearchSnapshot> {
        let sent = self.sent;
        let snapshot = self
            .state
            .wait_for(|s| s.revision >= sent)
            .await
            .map_err(|_| Error::SessionClosed)?
            .clone();
        Ok(snapshot)
    }

    /// Wait until every command is reflected and the session is settled.
    ///
    /// On timeout the latest state is returned as is, with `settled == false`.
    pub async fn settled(&mut self, limit: Duration) -> Result<SearchSnapshot> {
        let sent = self.sent;
        let wait = self.state.wait_for(|s| s.revision >= sent && s.settled);
        let outcome = match timeout(limit, wait).await {
            Ok(Ok(snapshot)) => Some(Ok(snapshot.clone())),
            Ok(Err(_)) => Some(Err(Error::SessionClosed)),
            Err(_) => None,
        };

        outcome.unwrap_or_else(|| {
            debug!("Session did not settle within {:?}", limit);
            Ok(self.latest())
        })
    }
}

/// Spawn the event loop for `session` on the current tokio runtime.
///
/// The session should be built over a context using
/// [`crate::clock::TokioClock`] so its deadlines line up with tokio's timer.
pub fn spawn_session<B: SearchBackend>(
    session: SearchSession<B>,
) -> (SessionHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(session.snapshot());
    let task = tokio::spawn(run_session(session, commands_rx, state_tx));

    let handle = SessionHandle {
        commands: commands_tx,
        state: state_rx,
        sent: 0,
    };
    (handle, task)
}

/// Fetch tasks in flight, with the request each one is running so a task
/// that dies can still be answered.
#[derive(Default)]
struct Fetches {
    tasks: JoinSet<FetchOutcome>,
    requests: HashMap<Id, FetchRequest>,
}

impl Fetches {
    fn spawn<B: SearchBackend>(&mut self, session: &SearchSession<B>, request: FetchRequest) {
        let fetcher = session.fetcher();
        let task = request.clone();
        let handle = self.tasks.spawn(async move { fetcher.run(task).await });
        self.requests.insert(handle.id(), request);
    }

    /// Outcome of the next task to finish. A task that panicked yields a
    /// failed outcome for its request.
    async fn next(&mut self) -> Option<FetchOutcome> {
        match self.tasks.join_next_with_id().await? {
            Ok((id, outcome)) => {
                self.requests.remove(&id);
                Some(outcome)
            }
            Err(e) => self.failed(e),
        }
    }

    fn failed(&mut self, e: JoinError) -> Option<FetchOutcome> {
        warn!("Fetch task failed: {}", e);
        let request = self.requests.remove(&e.id())?;
        Some(request.fail(FetchError::Network("fetch task failed".to_string())))
    }

    fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn abort_all(&mut self) {
        debug!("Search session closed ({} fetches abandoned)", self.tasks.len());
        self.tasks.abort_all();
        self.requests.clear();
    }
}

async fn run_session<B: SearchBackend>(
    mut session: SearchSession<B>,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    state: watch::Sender<SearchSnapshot>,
) {
    let mut fetches = Fetches::default();
    let mut revision: u64 = 0;

    loop {
        for request in session.poll() {
            fetches.spawn(&session, request);
        }
        publish(&state, &session, revision);

        let deadline = session.next_deadline();
        let wake_at = deadline
            .map(Instant::from_std)
            .unwrap_or_else(|| Instant::now() + IDLE_SLEEP);

        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => {
                    revision += 1;
                    handle_command(&mut session, command, &mut fetches);
                }
                None => break,
            },
            Some(outcome) = fetches.next(), if !fetches.is_empty() => {
                session.apply(outcome);
            }
            _ = sleep_until(wake_at), if deadline.is_some() => {}
        }
    }

    fetches.abort_all();
}

fn handle_command<B: SearchBackend>(
    session: &mut SearchSession<B>,
    command: SessionCommand,
    fetches: &mut Fetches,
) {
    match command {
        SessionCommand::Input { text, filters } => session.set_input(text, filters),
        SessionCommand::AddToHistory(query) => {
            session.add_to_history(&query);
        }
        SessionCommand::ClearCache => session.clear_cache(),
        SessionCommand::Refetch => {
            if let Some(request) = session.refetch() {
                fetches.spawn(session, request);
            }
        }
        SessionCommand::Reset => session.reset(),
    }
}

fn publish<B: SearchBackend>(
    state: &watch::Sender<SearchSnapshot>,
    session: &SearchSession<B>,
    revision: u64,
) {
    let mut snapshot = session.snapshot();
    snapshot.revision = revision;
    state.send_if_modified(|current| {
        if *current == snapshot {
            false
        } else {
            *current = snapshot;
            true
        }
    });
}
