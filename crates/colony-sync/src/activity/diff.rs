//! Worker snapshot diffing.
//!
//! The resource API only exposes full worker listings, so state
//! transitions are recovered by comparing each polled snapshot with the one
//! before it.

use std::collections::HashMap;

use colony_types::{Worker, WorkerId, WorkerState};

use super::feed::EventDraft;

/// Remembers the previous worker snapshot and reports transitions.
#[derive(Debug, Clone, Default)]
pub struct SnapshotDiffer {
    previous: HashMap<WorkerId, WorkerState>,
}

impl SnapshotDiffer {
    /// Create a differ with no baseline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `workers` with the previous snapshot, then make it the new
    /// baseline.
    ///
    /// A worker yields one draft when its state changed into one of the
    /// visualised busy states and it belongs to a room. Workers seen for
    /// the first time never yield a draft.
    pub fn observe(&mut self, workers: &[Worker]) -> Vec<EventDraft> {
        let drafts = workers
            .iter()
            .filter_map(|worker| {
                let previous = self.previous.get(&worker.id)?;
                if *previous == worker.state {
                    return None;
                }
                let kind = worker.state.activity_kind()?;
                let room_id = worker.room_id?;
                Some(EventDraft::new(kind, room_id, transition_label(worker)))
            })
            .collect();

        self.previous = workers.iter().map(|w| (w.id, w.state)).collect();
        drafts
    }

    /// Number of workers in the current baseline.
    pub fn baseline_len(&self) -> usize {
        self.previous.len()
    }
}

fn transition_label(worker: &Worker) -> String {
    let name = worker.name.trim();
    if name.is_empty() {
        format!("Worker #{} {}", worker.id, worker.state.describe())
    } else {
        format!("{name} {}", worker.state.describe())
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use colony_types::{ActivityKind, RoomId};

    use super::*;

    fn worker(id: u64, state: WorkerState) -> Worker {
        Worker {
            id: WorkerId::new(id),
            name: format!("w{id}"),
            room_id: Some(RoomId::new(10)),
            state,
        }
    }

    #[test]
    fn transition_into_busy_state_yields_one_event() {
        let mut differ = SnapshotDiffer::new();
        assert!(differ.observe(&[worker(1, WorkerState::Idle)]).is_empty());

        let drafts = differ.observe(&[worker(1, WorkerState::Thinking)]);
        assert_eq!(drafts.len(), 1);
        let draft = &drafts[0];
        assert_eq!(draft.kind, ActivityKind::WorkerThinking);
        assert_eq!(draft.room_id, RoomId::new(10));
        assert_eq!(draft.label, "w1 is thinking");
    }

    #[test]
    fn first_observation_is_not_a_transition() {
        let mut differ = SnapshotDiffer::new();
        assert!(differ.observe(&[]).is_empty());
        assert!(differ.observe(&[worker(1, WorkerState::Thinking)]).is_empty());
    }

    #[test]
    fn unchanged_idle_and_unknown_states_yield_nothing() {
        let mut differ = SnapshotDiffer::new();
        differ.observe(&[
            worker(1, WorkerState::Acting),
            worker(2, WorkerState::Thinking),
            worker(3, WorkerState::Thinking),
        ]);
        let drafts = differ.observe(&[
            worker(1, WorkerState::Acting),
            worker(2, WorkerState::Idle),
            worker(3, WorkerState::Unknown),
        ]);
        assert!(drafts.is_empty());
    }

    #[test]
    fn worker_without_room_yields_nothing() {
        let mut differ = SnapshotDiffer::new();
        let mut loose = worker(1, WorkerState::Idle);
        loose.room_id = None;
        differ.observe(&[loose.clone()]);
        loose.state = WorkerState::Blocked;
        assert!(differ.observe(&[loose]).is_empty());
    }

    #[test]
    fn baseline_is_replaced_after_each_snapshot() {
        let mut differ = SnapshotDiffer::new();
        differ.observe(&[worker(1, WorkerState::Idle), worker(2, WorkerState::Idle)]);
        assert_eq!(differ.baseline_len(), 2);

        // Worker 2 disappears, then comes back busy: no baseline, no event.
        differ.observe(&[worker(1, WorkerState::Idle)]);
        assert_eq!(differ.baseline_len(), 1);
        let drafts = differ.observe(&[worker(1, WorkerState::Voting), worker(2, WorkerState::Acting)]);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].kind, ActivityKind::WorkerVoting);

        // The same state again is not a new transition.
        assert!(differ
            .observe(&[worker(1, WorkerState::Voting), worker(2, WorkerState::Acting)])
            .is_empty());
    }

    #[test]
    fn unnamed_worker_label_uses_id() {
        let mut differ = SnapshotDiffer::new();
        let mut anon = worker(7, WorkerState::Idle);
        anon.name = String::new();
        differ.observe(&[anon.clone()]);
        anon.state = WorkerState::RateLimited;
        let drafts = differ.observe(&[anon]);
        assert_eq!(drafts[0].label, "Worker #7 hit a rate limit");
    }
}
