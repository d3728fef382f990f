use oxrdf::{NamedNode, Term, Variable};
use std::convert::Infallible;
use std::error::Error;

/// A SPARQL evaluation error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum QueryEvaluationError {
    /// Error from the underlying RDF dataset
    #[error(transparent)]
    Dataset(Box<dyn Error + Send + Sync>),
    /// A variable already bound in a solution was given a different value
    #[error("The variable {variable} is already bound to {existing} and cannot be bound to {new}")]
    DuplicateBinding {
        variable: Variable,
        existing: Term,
        new: Term,
    },
    /// An expression required the value of an unbound variable
    #[error("The variable {0} is not bound")]
    UnboundVariable(Variable),
    /// An expression was applied to arguments of the wrong type
    #[error("{0}")]
    TypeError(String),
    /// The expression calls a function that is not known to the evaluator
    #[error("The function {0} is not supported")]
    UnsupportedFunction(NamedNode),
    /// The graph pattern kind cannot be evaluated by this crate
    #[error("The graph pattern {0} is not supported")]
    UnsupportedGraphPattern(String),
    /// The query form cannot be evaluated by this crate
    #[error("{0} queries are not supported")]
    UnsupportedQueryForm(&'static str),
    /// A property function pattern refers to a function that is not registered
    #[error("The property function {0} is not registered")]
    UnknownPropertyFunction(NamedNode),
    /// A property path evaluation went deeper than the configured limit
    #[error("The property path evaluation exceeded the maximal depth of {0}")]
    PathDepthExceeded(usize),
    /// Error if the dataset returns the default graph even if a named graph is expected
    #[error("The SPARQL dataset returned the default graph even if a named graph is expected")]
    UnexpectedDefaultGraph,
    /// The evaluation deadline has been reached
    #[error("The SPARQL evaluation exceeded its timeout")]
    Timeout,
    #[error("The SPARQL operation has been cancelled")]
    Cancelled,
}

impl QueryEvaluationError {
    /// Returns `true` for errors that only invalidate the current solution.
    ///
    /// `FILTER` and `LET` drop the row on such errors instead of aborting the evaluation.
    #[inline]
    pub fn is_expression_error(&self) -> bool {
        matches!(
            self,
            Self::UnboundVariable(_) | Self::TypeError(_) | Self::UnsupportedFunction(_)
        )
    }
}

impl From<Infallible> for QueryEvaluationError {
    #[inline]
    fn from(error: Infallible) -> Self {
        match error {}
    }
}
