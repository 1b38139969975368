//! Session orchestrator — owns one conversation's lifecycle and adjudicates
//! the race between inline replies and the handoff poller.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::PollerConfig;
use crate::definition::AgentDefinition;
use crate::engine::{EngineReply, SetupEngine, classify};
use crate::error::ProxyError;
use crate::handoff::{HandoffPoller, HandoffStore};
use crate::provision::{ChainReport, ProvisioningChain};
use crate::session::model::{Session, Turn};

/// Lifecycle phases of a setup session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    AwaitingReply,
    ReplyReceived,
    TimedOut,
    Provisioning,
    Done,
    Failed,
}

impl SessionPhase {
    /// Check if a transition from `self` to `target` is valid.
    ///
    /// `TimedOut` is recoverable: a later user turn re-enters
    /// `AwaitingReply`. A definition can also land while the session sits in
    /// `Idle` between turns, hence `Idle → ReplyReceived`.
    pub fn can_transition_to(&self, target: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, target),
            (Idle, AwaitingReply)
                | (Idle, ReplyReceived)
                | (Idle, TimedOut)
                | (AwaitingReply, ReplyReceived)
                | (AwaitingReply, Idle)
                | (AwaitingReply, TimedOut)
                | (TimedOut, AwaitingReply)
                | (ReplyReceived, Provisioning)
                | (Provisioning, Done)
                | (Provisioning, Failed)
        )
    }

    /// Whether the session attempt has finished, for better or worse.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::AwaitingReply => "awaiting_reply",
            Self::ReplyReceived => "reply_received",
            Self::TimedOut => "timed_out",
            Self::Provisioning => "provisioning",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// First-writer-wins gate guarding the provisioning chain.
///
/// Both delivery channels — the inline reply and the handoff poller — race to
/// claim it, and only the first claim succeeds. Keeping the gate in one place
/// makes the at-most-once guarantee auditable here instead of scattered
/// across callbacks.
#[derive(Debug, Default)]
pub struct ProvisionGate {
    claimed: AtomicBool,
}

impl ProvisionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate. Returns `true` exactly once per gate.
    pub fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

/// Point-in-time view of a session for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub phase: SessionPhase,
    pub turns: Vec<Turn>,
    /// Set when an edit-mode conversation reported completion; the caller
    /// should refresh its view of the agent.
    pub agent_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ChainReport>,
}

struct Inner {
    session: RwLock<Session>,
    phase: RwLock<SessionPhase>,
    turns: RwLock<Vec<Turn>>,
    gate: RwLock<Arc<ProvisionGate>>,
    poller: Mutex<Option<HandoffPoller>>,
    report: RwLock<Option<ChainReport>>,
    agent_updated: AtomicBool,
    engine: Arc<dyn SetupEngine>,
    store: Arc<dyn HandoffStore>,
    chain: Arc<ProvisioningChain>,
    poller_config: PollerConfig,
}

/// Coordinates one guided conversation: sends turns through the proxy, arms
/// the handoff poller, and hands the winning definition to the provisioning
/// chain exactly once.
#[derive(Clone)]
pub struct SessionOrchestrator {
    inner: Arc<Inner>,
}

impl SessionOrchestrator {
    pub fn new(
        engine: Arc<dyn SetupEngine>,
        store: Arc<dyn HandoffStore>,
        chain: Arc<ProvisioningChain>,
        poller_config: PollerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session: RwLock::new(Session::open()),
                phase: RwLock::new(SessionPhase::Idle),
                turns: RwLock::new(Vec::new()),
                gate: RwLock::new(Arc::new(ProvisionGate::new())),
                poller: Mutex::new(None),
                report: RwLock::new(None),
                agent_updated: AtomicBool::new(false),
                engine,
                store,
                chain,
                poller_config,
            }),
        }
    }

    pub async fn session_id(&self) -> String {
        self.inner.session.read().await.id.clone()
    }

    /// Drive one user turn: forward it through the proxy, arm the poller,
    /// and interpret the reply.
    ///
    /// Upstream and transport failures are recovered locally as an in-chat
    /// error bubble; only `RateLimited` is returned to the caller, who must
    /// back off before retrying.
    pub async fn send_turn(&self, text: &str) -> Result<(), ProxyError> {
        let (session_id, credentials) = {
            let session = self.inner.session.read().await;
            (session.id.clone(), session.credentials.clone())
        };

        {
            let phase = *self.inner.phase.read().await;
            if phase.is_terminal() || phase == SessionPhase::Provisioning {
                debug!(%session_id, %phase, "Ignoring turn in settled session");
                return Ok(());
            }
        }

        self.push_turn(Turn::user(text)).await;
        self.transition(SessionPhase::AwaitingReply).await;
        // The definition may come back out-of-band no matter what the reply
        // says, so the poller is armed on every turn.
        self.arm_poller(&session_id).await;

        match self
            .inner
            .engine
            .send_turn(&session_id, text, &credentials)
            .await
        {
            Ok(reply) => match classify(&reply) {
                EngineReply::Plain(text) => {
                    self.push_turn(Turn::engine(text)).await;
                    self.transition(SessionPhase::Idle).await;
                }
                EngineReply::Creation(definition) => {
                    info!(
                        %session_id,
                        agent = %definition.name,
                        "Inline reply won the delivery race"
                    );
                    self.handle_definition(&session_id, definition).await;
                }
                EngineReply::EditCompleted => {
                    self.inner.agent_updated.store(true, Ordering::Release);
                    self.transition(SessionPhase::Idle).await;
                }
            },
            Err(e @ ProxyError::RateLimited { .. }) => {
                self.transition(SessionPhase::Idle).await;
                return Err(e);
            }
            Err(e) => {
                // Recovering the conversation is independent of recovering
                // the handoff, so the poller keeps running.
                warn!(%session_id, error = %e, "Setup chat turn failed");
                self.push_turn(Turn::engine(format!(
                    "Something went wrong talking to the builder: {e}. Please try again."
                )))
                .await;
                self.transition(SessionPhase::Idle).await;
            }
        }

        Ok(())
    }

    /// Abandon the current attempt and start over with a fresh session.
    ///
    /// Stops the old poller so a stale pickup can never trigger a superseded
    /// provisioning chain, then swaps in a new session, transcript, and gate.
    pub async fn reset(&self) -> String {
        self.stop_poller().await;

        let fresh = Session::open();
        let id = fresh.id.clone();
        *self.inner.session.write().await = fresh;
        *self.inner.gate.write().await = Arc::new(ProvisionGate::new());
        *self.inner.phase.write().await = SessionPhase::Idle;
        self.inner.turns.write().await.clear();
        *self.inner.report.write().await = None;
        self.inner.agent_updated.store(false, Ordering::Release);

        info!(session_id = %id, "Session reset");
        id
    }

    /// Stop background work without touching the transcript. Used when the
    /// user navigates away from the conversation.
    pub async fn abandon(&self) {
        self.stop_poller().await;
    }

    pub async fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.session_id().await,
            phase: *self.inner.phase.read().await,
            turns: self.inner.turns.read().await.clone(),
            agent_updated: self.inner.agent_updated.load(Ordering::Acquire),
            report: self.inner.report.read().await.clone(),
        }
    }

    /// Whether the handoff poller is currently armed and running.
    pub async fn poller_armed(&self) -> bool {
        self.inner
            .poller
            .lock()
            .await
            .as_ref()
            .map(|p| !p.is_finished())
            .unwrap_or(false)
    }

    async fn arm_poller(&self, session_id: &str) {
        let mut slot = self.inner.poller.lock().await;
        if slot.as_ref().map(|p| !p.is_finished()).unwrap_or(false) {
            return;
        }

        let found = self.clone();
        let found_sid = session_id.to_string();
        let timed_out = self.clone();
        let timeout_sid = session_id.to_string();

        let poller = HandoffPoller::start(
            Arc::clone(&self.inner.store),
            session_id.to_string(),
            self.inner.poller_config.clone(),
            move |definition| {
                tokio::spawn(async move {
                    found.handle_definition(&found_sid, definition).await;
                });
            },
            move || {
                tokio::spawn(async move {
                    timed_out.handle_timeout(&timeout_sid).await;
                });
            },
        );

        debug!(session_id, "Handoff poller armed");
        *slot = Some(poller);
    }

    async fn stop_poller(&self) {
        if let Some(poller) = self.inner.poller.lock().await.take() {
            poller.stop();
        }
    }

    /// Consume a definition from either delivery channel. Only the first
    /// caller per session attempt gets through the gate; the loser is
    /// ignored.
    async fn handle_definition(&self, session_id: &str, definition: AgentDefinition) {
        let (current_id, credentials, gate) = {
            let session = self.inner.session.read().await;
            let gate = Arc::clone(&*self.inner.gate.read().await);
            (session.id.clone(), session.credentials.clone(), gate)
        };

        if current_id != session_id {
            debug!(
                stale = session_id,
                current = %current_id,
                "Dropping definition for a superseded session"
            );
            return;
        }
        if !gate.try_claim() {
            debug!(%session_id, "Provisioning already claimed; ignoring duplicate definition");
            return;
        }

        self.stop_poller().await;
        self.transition(SessionPhase::ReplyReceived).await;
        self.transition(SessionPhase::Provisioning).await;

        match self
            .inner
            .chain
            .run(session_id, &credentials, &definition)
            .await
        {
            Ok(report) => {
                info!(%session_id, destination = %report.destination, "Provisioning finished");
                *self.inner.report.write().await = Some(report);
                self.transition(SessionPhase::Done).await;
            }
            Err(e) => {
                warn!(%session_id, error = %e, "Provisioning failed before a token was obtained");
                self.push_turn(Turn::engine(
                    "We could not create your account. Please reset and try again.",
                ))
                .await;
                self.transition(SessionPhase::Failed).await;
            }
        }
    }

    async fn handle_timeout(&self, session_id: &str) {
        let current_id = self.inner.session.read().await.id.clone();
        if current_id != session_id {
            return;
        }
        let gate = Arc::clone(&*self.inner.gate.read().await);
        if gate.is_claimed() {
            return;
        }

        warn!(%session_id, "No definition arrived before the poll budget ran out");
        self.transition(SessionPhase::TimedOut).await;
        self.push_turn(Turn::engine(
            "The builder is taking longer than expected. Send another message to retry.",
        ))
        .await;
    }

    async fn push_turn(&self, turn: Turn) {
        self.inner.turns.write().await.push(turn);
    }

    /// Apply a phase change if the transition is valid. Rejections are
    /// expected when the two delivery channels race and are logged at debug.
    async fn transition(&self, target: SessionPhase) {
        let mut phase = self.inner.phase.write().await;
        if *phase == target {
            return;
        }
        if phase.can_transition_to(target) {
            debug!(from = %*phase, to = %target, "Session phase change");
            *phase = target;
        } else {
            debug!(from = %*phase, to = %target, "Rejected session phase change");
        }
    }
}
