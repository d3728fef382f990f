use std::time::Duration;

/// Resource bounds of an evaluation
///
/// ```
/// use sparsolve::QueryExecutionLimits;
/// use std::time::Duration;
///
/// let limits = QueryExecutionLimits {
///     timeout: Some(Duration::from_secs(2)),
///     ..QueryExecutionLimits::strict()
/// };
/// assert_eq!(limits.max_property_path_depth, Some(100));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryExecutionLimits {
    /// Wall-clock time after which the evaluation fails with a timeout
    ///
    /// Default: 30 seconds
    pub timeout: Option<Duration>,

    /// Maximal number of steps followed by `*` and `+` property paths from a single node
    ///
    /// Default: 1,000 steps
    pub max_property_path_depth: Option<usize>,
}

impl Default for QueryExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            max_property_path_depth: Some(1_000),
        }
    }
}

impl QueryExecutionLimits {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits for untrusted queries: 5 seconds and 100 path steps
    #[must_use]
    pub fn strict() -> Self {
        Self {
            timeout: Some(Duration::from_secs(5)),
            max_property_path_depth: Some(100),
        }
    }

    /// Limits for trusted queries: 5 minutes and 10,000 path steps
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            timeout: Some(Duration::from_secs(300)),
            max_property_path_depth: Some(10_000),
        }
    }

    /// No limit at all
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            timeout: None,
            max_property_path_depth: None,
        }
    }
}
