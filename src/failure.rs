use std::sync::Mutex;

/// Records the first error observed by any writer task. Later errors are
/// dropped - the run is reported through its first failure, and workers
/// consult [FailureSlot::has_failed] to stop doing useless work.
pub(crate) struct FailureSlot {
    first: Mutex<Option<anyhow::Error>>,
}

impl FailureSlot {
    pub(crate) fn new() -> FailureSlot {
        FailureSlot {
            first: Mutex::new(None),
        }
    }

    pub(crate) fn record(&self, error: anyhow::Error) {
        let mut first = self.first.lock().unwrap();
        if first.is_none() {
            *first = Some(error);
        }
    }

    pub(crate) fn has_failed(&self) -> bool {
        self.first.lock().unwrap().is_some()
    }

    pub(crate) fn take(&self) -> Option<anyhow::Error> {
        self.first.lock().unwrap().take()
    }
}
