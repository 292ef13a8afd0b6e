//! Thread-safe collection of terminal job failures.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::job::JobFailure;

/// Unordered set of terminal failures shared by `Arc` with the pipeline.
///
/// Every operation takes the internal lock once, so `push`, `len` and `join`
/// are each atomic with respect to one another.
#[derive(Debug, Default)]
pub struct ErrorSet {
    failures: Mutex<Vec<Arc<JobFailure>>>,
}

impl ErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure and return the new count.
    pub fn push(&self, failure: Arc<JobFailure>) -> usize {
        let mut failures = self.failures.lock().expect("error set lock poisoned");
        failures.push(failure);
        failures.len()
    }

    pub fn len(&self) -> usize {
        self.failures.lock().expect("error set lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the recorded failures.
    pub fn failures(&self) -> Vec<Arc<JobFailure>> {
        self.failures.lock().expect("error set lock poisoned").clone()
    }

    /// Join every recorded failure into one error, or `None` if there are none.
    pub fn join(&self) -> Option<JoinedError> {
        let failures = self.failures();
        if failures.is_empty() {
            None
        } else {
            Some(JoinedError { failures })
        }
    }
}

/// All terminal failures of a run, reported as a single error.
#[derive(Debug, Clone)]
pub struct JoinedError {
    failures: Vec<Arc<JobFailure>>,
}

impl JoinedError {
    pub fn failures(&self) -> &[Arc<JobFailure>] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for JoinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for JoinedError {}
