use std::sync::Mutex;

/// Lifecycle phase of a run. `Failed` is reachable from any non terminal
/// phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Splitting,
    Merging,
    Cleaning,
    Completed,
    Failed,
}

/// Point-in-time copy of the progress state, safe to hand to pollers.
///
/// `min`, `max` and `value` are byte counts for the current phase: the total
/// input size while splitting, the total partition-file size while merging.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub phase: Phase,
    pub status: String,
    pub min: u64,
    pub max: u64,
    pub value: u64,
    pub finished: bool,
}

/// Shared progress state, mutated by the producer, the writer pool and the
/// merger under a single internal lock. External consumers poll
/// [Progress::snapshot]; they never observe intermediate lock state.
pub struct Progress {
    state: Mutex<ProgressSnapshot>,
}

impl Progress {
    pub(crate) fn new() -> Progress {
        Progress {
            state: Mutex::new(ProgressSnapshot {
                phase: Phase::Idle,
                status: String::new(),
                min: 0,
                max: 0,
                value: 0,
                finished: false,
            }),
        }
    }

    /// Enter a new phase, resetting the byte counters for it.
    pub(crate) fn begin_phase(&self, phase: Phase, status: String, max: u64) {
        let mut state = self.state.lock().unwrap();
        state.phase = phase;
        state.status = status;
        state.min = 0;
        state.max = max;
        state.value = 0;
        state.finished = false;
    }

    pub(crate) fn add_bytes(&self, bytes: u64) {
        let mut state = self.state.lock().unwrap();
        state.value += bytes;
    }

    /// Terminal success. Sets the `finished` flag observed by pollers.
    pub(crate) fn complete(&self, status: String) {
        let mut state = self.state.lock().unwrap();
        state.phase = Phase::Completed;
        state.status = status;
        state.finished = true;
    }

    /// Terminal failure. The flag is set here as well so pollers stop.
    pub(crate) fn fail(&self, status: String) {
        let mut state = self.state.lock().unwrap();
        state.phase = Phase::Failed;
        state.status = status;
        state.finished = true;
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::progress::{Phase, Progress};

    #[test]
    fn test_phase_transitions() {
        let progress = Progress::new();
        assert_eq!(progress.snapshot().phase, Phase::Idle);

        progress.begin_phase(Phase::Splitting, "splitting".to_string(), 1000);
        progress.add_bytes(100);
        progress.add_bytes(250);
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.phase, Phase::Splitting);
        assert_eq!(snapshot.max, 1000);
        assert_eq!(snapshot.value, 350);
        assert!(!snapshot.finished);

        progress.begin_phase(Phase::Merging, "merging".to_string(), 500);
        assert_eq!(progress.snapshot().value, 0);

        progress.complete("done".to_string());
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.phase, Phase::Completed);
        assert!(snapshot.finished);
    }

    #[test]
    fn test_failure_is_terminal() {
        let progress = Progress::new();
        progress.begin_phase(Phase::Splitting, "splitting".to_string(), 10);
        progress.fail("sort failed: boom".to_string());
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.phase, Phase::Failed);
        assert!(snapshot.finished);
    }
}
