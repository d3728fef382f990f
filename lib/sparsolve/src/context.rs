use crate::dataset::QueryableDataset;
use crate::error::QueryEvaluationError;
use crate::limits::QueryExecutionLimits;
use crate::multiset::SolutionSequence;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// A token that can be used to cancel an evaluation from another thread.
///
/// It is shared by all clones: cancelling one cancels them all.
///
/// ```
/// use sparsolve::CancellationToken;
///
/// let token = CancellationToken::new();
/// let other = token.clone();
/// other.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that is not cancelled yet
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the evaluations using this token or one of its clones.
    #[inline]
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called on this token or a clone.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// The point in time after which an evaluation must stop, together with its cancellation token.
#[derive(Clone, Debug, Default)]
pub struct Deadline {
    expires_at: Option<Instant>,
    cancellation_token: CancellationToken,
}

impl Deadline {
    /// A deadline `timeout` from now. `None` never expires.
    pub fn after(timeout: Option<Duration>) -> Self {
        Self {
            expires_at: timeout.and_then(|t| Instant::now().checked_add(t)),
            cancellation_token: CancellationToken::default(),
        }
    }

    /// A deadline that never expires
    #[inline]
    pub fn never() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_cancellation_token(mut self, cancellation_token: CancellationToken) -> Self {
        self.cancellation_token = cancellation_token;
        self
    }

    /// Returns `true` if the evaluation has a time bound.
    #[inline]
    pub fn is_bounded(&self) -> bool {
        self.expires_at.is_some()
    }

    /// Returns `true` once the deadline is elapsed or the evaluation is cancelled.
    pub fn is_reached(&self) -> bool {
        self.cancellation_token.is_cancelled()
            || self
                .expires_at
                .is_some_and(|expires_at| Instant::now() >= expires_at)
    }

    /// The time left before the deadline, `None` if unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| expires_at.saturating_duration_since(Instant::now()))
    }

    /// Fails with [`QueryEvaluationError::Cancelled`] or [`QueryEvaluationError::Timeout`] once
    /// reached.
    pub fn check(&self) -> Result<(), QueryEvaluationError> {
        if self.cancellation_token.is_cancelled() {
            Err(QueryEvaluationError::Cancelled)
        } else if self
            .expires_at
            .is_some_and(|expires_at| Instant::now() >= expires_at)
        {
            Err(QueryEvaluationError::Timeout)
        } else {
            Ok(())
        }
    }
}

/// Options of a single evaluation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvaluationOptions {
    /// Partition cross products over a worker pool
    pub parallel: bool,
    /// Remove temporary variables from the result of each basic graph pattern
    pub trim_temporary_variables: bool,
    /// Maximal number of steps of `*` and `+` property paths
    pub max_property_path_depth: Option<usize>,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            trim_temporary_variables: true,
            max_property_path_depth: QueryExecutionLimits::default().max_property_path_depth,
        }
    }
}

/// The state shared by all the steps of one evaluation.
///
/// Holds the dataset, the input sequence the evaluation starts from, the deadline and the options.
/// It is built once per evaluation and must not be shared between evaluations.
pub struct EvaluationContext<'a, D: QueryableDataset + ?Sized> {
    dataset: &'a D,
    input: SolutionSequence,
    deadline: Deadline,
    options: EvaluationOptions,
}

impl<'a, D: QueryableDataset + ?Sized> EvaluationContext<'a, D> {
    /// A context over the dataset starting from the
    /// [`Identity`](SolutionSequence::Identity) sequence.
    pub fn new(dataset: &'a D) -> Self {
        Self {
            dataset,
            input: SolutionSequence::Identity,
            deadline: Deadline::never(),
            options: EvaluationOptions::default(),
        }
    }

    /// Sets the sequence the evaluation results are joined with.
    #[must_use]
    pub fn with_input(mut self, input: SolutionSequence) -> Self {
        self.input = input;
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: EvaluationOptions) -> Self {
        self.options = options;
        self
    }

    #[inline]
    pub fn dataset(&self) -> &'a D {
        self.dataset
    }

    #[inline]
    pub fn input(&self) -> &SolutionSequence {
        &self.input
    }

    #[inline]
    pub fn deadline(&self) -> &Deadline {
        &self.deadline
    }

    #[inline]
    pub fn options(&self) -> &EvaluationOptions {
        &self.options
    }

    /// Fails if the deadline is reached or the evaluation cancelled.
    #[inline]
    pub fn check_deadline(&self) -> Result<(), QueryEvaluationError> {
        self.deadline.check()
    }
}
