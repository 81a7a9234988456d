//! Enumeration types shared by the sync core and the dashboard.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Observable state of a worker as reported by the resource API.
///
/// Strings the console does not know about decode as [`WorkerState::Unknown`]
/// instead of failing the whole snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Waiting for work.
    Idle,
    /// Running an LLM turn.
    Thinking,
    /// Executing a tool or action.
    Acting,
    /// Casting a vote on a room decision.
    Voting,
    /// Paused by the model provider's rate limit.
    RateLimited,
    /// Stuck waiting on a human or an external dependency.
    Blocked,
    /// Any state string this build does not recognise.
    #[serde(other)]
    Unknown,
}

impl WorkerState {
    /// The visual activity kind a transition into this state produces.
    ///
    /// Only the five busy states are visualised; `Idle` and `Unknown` return
    /// `None`.
    pub const fn activity_kind(self) -> Option<ActivityKind> {
        match self {
            Self::Thinking => Some(ActivityKind::WorkerThinking),
            Self::Acting => Some(ActivityKind::WorkerActing),
            Self::Voting => Some(ActivityKind::WorkerVoting),
            Self::RateLimited => Some(ActivityKind::WorkerRateLimited),
            Self::Blocked => Some(ActivityKind::WorkerBlocked),
            Self::Idle | Self::Unknown => None,
        }
    }

    /// Human-readable verb phrase used in event labels.
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Idle => "is idle",
            Self::Thinking => "is thinking",
            Self::Acting => "is acting",
            Self::Voting => "is voting",
            Self::RateLimited => "hit a rate limit",
            Self::Blocked => "is blocked",
            Self::Unknown => "changed state",
        }
    }
}

/// Lifecycle status of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// The room's queen is running.
    Active,
    /// The room is paused by its operator.
    Paused,
    /// The room has been stopped.
    Stopped,
    /// Any status string this build does not recognise.
    #[serde(other)]
    Unknown,
}

/// Kind of an ephemeral activity event shown on the swarm view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// A worker started an LLM turn.
    WorkerThinking,
    /// A worker started executing an action.
    WorkerActing,
    /// A worker started voting.
    WorkerVoting,
    /// A worker hit a provider rate limit.
    WorkerRateLimited,
    /// A worker became blocked.
    WorkerBlocked,
    /// A task run started.
    TaskStarted,
    /// A task run completed.
    TaskCompleted,
    /// A task run failed.
    TaskFailed,
    /// A decision was proposed to the room quorum.
    DecisionProposed,
    /// A vote was cast on a decision.
    VoteCast,
    /// A decision was resolved.
    DecisionResolved,
    /// An escalation was raised to the keeper.
    EscalationRaised,
    /// A message was sent between agents.
    MessageSent,
    /// A room goal was updated.
    GoalUpdated,
    /// A worker created a new skill.
    SkillCreated,
    /// Funds moved through the room wallet.
    WalletTransfer,
}

impl ActivityKind {
    /// Ripple color used by the swarm view for this kind.
    pub const fn color(self) -> &'static str {
        match self {
            Self::WorkerThinking => "#60a5fa",
            Self::WorkerActing => "#34d399",
            Self::WorkerVoting | Self::VoteCast => "#a78bfa",
            Self::WorkerRateLimited => "#fbbf24",
            Self::WorkerBlocked | Self::TaskFailed | Self::EscalationRaised => "#f87171",
            Self::TaskStarted => "#38bdf8",
            Self::TaskCompleted => "#4ade80",
            Self::DecisionProposed | Self::DecisionResolved => "#c084fc",
            Self::MessageSent => "#94a3b8",
            Self::GoalUpdated => "#f472b6",
            Self::SkillCreated => "#2dd4bf",
            Self::WalletTransfer => "#facc15",
        }
    }
}
