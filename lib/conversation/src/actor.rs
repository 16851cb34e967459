//! Per-session actor.
//!
//! One task owns a [`Session`] and is its only writer. Handles talk to it
//! through a mailbox; every reply is a snapshot. A running turn lives in its
//! own task and hands its result back to the actor, which commits it. A
//! second turn requested meanwhile is rejected, never queued.

use crate::error::TurnError;
use crate::message::Message;
use crate::orchestrator::{ConversationOrchestrator, TurnInput, TurnOutcome, validate_message};
use crate::session::Session;
use crate::stream::TextFanout;
use parlance_core::SessionId;
use rootcause::Report;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, instrument};

const MAILBOX_CAPACITY: usize = 32;

type TurnReply = Result<Message, TurnError>;

enum SessionCommand {
    StartTurn {
        text: String,
        model: Option<String>,
        sink: Option<mpsc::UnboundedSender<String>>,
        reply: oneshot::Sender<Result<oneshot::Receiver<TurnReply>, TurnError>>,
    },
    GetState {
        reply: oneshot::Sender<Session>,
    },
    SetModel {
        model: String,
        reply: oneshot::Sender<Session>,
    },
    Clear {
        reply: oneshot::Sender<Result<Session, TurnError>>,
    },
}

/// An accepted turn. The turn runs to completion whether or not this is
/// awaited.
#[derive(Debug)]
pub struct TurnTicket {
    session_id: SessionId,
    done: oneshot::Receiver<TurnReply>,
}

impl TurnTicket {
    /// Waits for the committed assistant message.
    ///
    /// # Errors
    ///
    /// Returns `Provider` if the provider failed (a fallback reply was still
    /// committed), or `SessionClosed` if the actor went away.
    pub async fn wait(self) -> Result<Message, Report<TurnError>> {
        match self.done.await {
            Ok(reply) => Ok(reply?),
            Err(_) => Err(TurnError::SessionClosed {
                session_id: self.session_id,
            }
            .into()),
        }
    }
}

struct InFlight {
    user_text: String,
    task: JoinHandle<Result<TurnOutcome, TurnError>>,
    done: oneshot::Sender<TurnReply>,
}

struct SessionTask {
    session: Session,
    orchestrator: Arc<ConversationOrchestrator>,
    commands: mpsc::Receiver<SessionCommand>,
    accepting: bool,
    buffer: Option<mpsc::UnboundedReceiver<String>>,
    turn: Option<InFlight>,
}

async fn next_chunk(buffer: &mut Option<mpsc::UnboundedReceiver<String>>) -> Option<String> {
    match buffer {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn join_turn(
    turn: &mut Option<InFlight>,
) -> Result<Result<TurnOutcome, TurnError>, JoinError> {
    match turn {
        Some(in_flight) => (&mut in_flight.task).await,
        None => std::future::pending().await,
    }
}

impl SessionTask {
    #[instrument(skip_all, fields(session_id = %self.session.session_id))]
    async fn run(mut self) {
        debug!("session actor started");
        while self.accepting || self.turn.is_some() {
            tokio::select! {
                command = self.commands.recv(), if self.accepting => match command {
                    Some(command) => self.handle(command),
                    None => self.accepting = false,
                },
                chunk = next_chunk(&mut self.buffer), if self.buffer.is_some() => match chunk {
                    Some(chunk) => self.session.append_stream_chunk(&chunk),
                    None => self.buffer = None,
                },
                result = join_turn(&mut self.turn), if self.turn.is_some() => {
                    self.finish_turn(result);
                }
            }
        }
        debug!("session actor stopped");
    }

    fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::StartTurn {
                text,
                model,
                sink,
                reply,
            } => {
                let _ = reply.send(self.start_turn(text, model.as_deref(), sink));
            }
            SessionCommand::GetState { reply } => {
                let _ = reply.send(self.session.clone());
            }
            SessionCommand::SetModel { model, reply } => {
                if !model.trim().is_empty() {
                    self.session.model = model;
                }
                let _ = reply.send(self.session.clone());
            }
            SessionCommand::Clear { reply } => {
                let _ = reply.send(self.session.clear().map(|()| self.session.clone()));
            }
        }
    }

    fn start_turn(
        &mut self,
        text: String,
        model: Option<&str>,
        sink: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<oneshot::Receiver<TurnReply>, TurnError> {
        validate_message(&text)?;
        self.session.begin_turn(model)?;

        let fanout = sink.map(|sink| {
            let (buffer_tx, buffer_rx) = mpsc::unbounded_channel();
            self.buffer = Some(buffer_rx);
            TextFanout::new().with_sink(sink).with_sink(buffer_tx)
        });

        let input = TurnInput {
            session_id: self.session.session_id.clone(),
            model: self.session.model.clone(),
            history: self.session.messages.clone(),
            user_text: text.clone(),
        };
        let orchestrator = Arc::clone(&self.orchestrator);
        let task = tokio::spawn(async move {
            orchestrator.process_turn(input, fanout.as_ref()).await
        });

        let (done, done_rx) = oneshot::channel();
        self.turn = Some(InFlight {
            user_text: text,
            task,
            done,
        });
        info!(model = %self.session.model, "turn started");
        Ok(done_rx)
    }

    fn finish_turn(&mut self, result: Result<Result<TurnOutcome, TurnError>, JoinError>) {
        let Some(in_flight) = self.turn.take() else {
            return;
        };
        self.buffer = None;

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => TurnOutcome::failed(&in_flight.user_text, e.to_string()),
            Err(e) => {
                error!(error = %e, "turn task failed");
                TurnOutcome::failed(&in_flight.user_text, e.to_string())
            }
        };
        let provider_error = outcome.provider_error;

        self.session
            .commit_turn(outcome.user_message, outcome.assistant_message);
        let committed = self.session.messages[self.session.messages.len() - 2..].to_vec();

        let orchestrator = Arc::clone(&self.orchestrator);
        let session_id = self.session.session_id.clone();
        let persisted = committed.clone();
        tokio::spawn(async move {
            orchestrator.persist_turn(&session_id, &persisted).await;
        });

        let reply = match provider_error {
            None => Ok(committed[1].clone()),
            Some(reason) => Err(TurnError::Provider { reason }),
        };
        info!(messages = self.session.message_count(), "turn committed");
        let _ = in_flight.done.send(reply);
    }
}

/// Handle to a session actor. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionActor {
    session_id: SessionId,
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionActor {
    /// Creates an empty session with the default model and spawns its actor.
    ///
    /// The actor stops once every handle is dropped and no turn is running.
    #[must_use]
    pub fn spawn(session_id: SessionId, orchestrator: Arc<ConversationOrchestrator>) -> Self {
        let session = Session::new(session_id.clone(), &orchestrator.config().default_model);
        let (commands_tx, commands_rx) = mpsc::channel(MAILBOX_CAPACITY);

        let task = SessionTask {
            session,
            orchestrator,
            commands: commands_rx,
            accepting: true,
            buffer: None,
            turn: None,
        };
        tokio::spawn(task.run());

        Self {
            session_id,
            commands: commands_tx,
        }
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    fn closed(&self) -> Report<TurnError> {
        TurnError::SessionClosed {
            session_id: self.session_id.clone(),
        }
        .into()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, Report<TurnError>> {
        let (reply, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| self.closed())?;
        reply_rx.await.map_err(|_| self.closed())
    }

    /// Starts a turn and returns once it is accepted or rejected.
    ///
    /// With a `sink`, text is streamed into it as it is produced. The turn
    /// does not depend on the sink: if the receiver is dropped the turn
    /// still completes and commits.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` or `TurnInProgress` without any state change,
    /// or `SessionClosed` if the actor is gone.
    pub async fn start_turn(
        &self,
        text: impl Into<String>,
        model: Option<String>,
        sink: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<TurnTicket, Report<TurnError>> {
        let text = text.into();
        let done = self
            .request(|reply| SessionCommand::StartTurn {
                text,
                model,
                sink,
                reply,
            })
            .await??;
        Ok(TurnTicket {
            session_id: self.session_id.clone(),
            done,
        })
    }

    /// Runs a full turn and returns the committed assistant message.
    ///
    /// # Errors
    ///
    /// See [`start_turn`](Self::start_turn) and [`TurnTicket::wait`].
    pub async fn process_turn(
        &self,
        text: impl Into<String>,
        model: Option<String>,
    ) -> Result<Message, Report<TurnError>> {
        self.start_turn(text, model, None).await?.wait().await
    }

    /// Starts a streamed turn. Returns the text feed and the turn ticket.
    ///
    /// # Errors
    ///
    /// See [`start_turn`](Self::start_turn).
    pub async fn stream_turn(
        &self,
        text: impl Into<String>,
        model: Option<String>,
    ) -> Result<(mpsc::UnboundedReceiver<String>, TurnTicket), Report<TurnError>> {
        let (sink, feed) = mpsc::unbounded_channel();
        let ticket = self.start_turn(text, model, Some(sink)).await?;
        Ok((feed, ticket))
    }

    /// Returns a point-in-time snapshot of the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the actor is gone.
    pub async fn get_state(&self) -> Result<Session, Report<TurnError>> {
        self.request(|reply| SessionCommand::GetState { reply }).await
    }

    /// Changes the model used by subsequent turns.
    ///
    /// # Errors
    ///
    /// Returns `SessionClosed` if the actor is gone.
    pub async fn set_model(&self, model: impl Into<String>) -> Result<Session, Report<TurnError>> {
        let model = model.into();
        self.request(|reply| SessionCommand::SetModel { model, reply })
            .await
    }

    /// Drops the conversation history.
    ///
    /// # Errors
    ///
    /// Returns `TurnInProgress` while a turn runs, or `SessionClosed`.
    pub async fn clear(&self) -> Result<Session, Report<TurnError>> {
        Ok(self.request(|reply| SessionCommand::Clear { reply }).await??)
    }
}
