use crate::dataset::{QueryableDataset, dataset_error};
use crate::error::QueryEvaluationError;
use crate::multiset::{Multiset, SolutionSequence};
use crate::solution::Solution;
use oxrdf::{BlankNode, Literal, NamedNode, Term, Variable};
use spargebra::algebra::PropertyPathExpression;
use std::fmt;

/// A position of a pattern: either a fixed term or a variable
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum PatternTerm {
    Term(Term),
    Variable(Variable),
}

impl PatternTerm {
    #[inline]
    pub fn as_term(&self) -> Option<&Term> {
        match self {
            Self::Term(term) => Some(term),
            Self::Variable(_) => None,
        }
    }

    #[inline]
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Self::Term(_) => None,
            Self::Variable(variable) => Some(variable),
        }
    }

    /// Checks that `value` can be put at this position, binding the variable in `solution` if
    /// needed.
    fn bind(&self, value: Term, solution: &mut Solution) -> bool {
        match self {
            Self::Term(term) => *term == value,
            Self::Variable(variable) => solution.set(variable.clone(), value).is_ok(),
        }
    }
}

impl From<Term> for PatternTerm {
    #[inline]
    fn from(term: Term) -> Self {
        Self::Term(term)
    }
}

impl From<NamedNode> for PatternTerm {
    #[inline]
    fn from(node: NamedNode) -> Self {
        Self::Term(node.into())
    }
}

impl From<BlankNode> for PatternTerm {
    #[inline]
    fn from(node: BlankNode) -> Self {
        Self::Term(node.into())
    }
}

impl From<Literal> for PatternTerm {
    #[inline]
    fn from(literal: Literal) -> Self {
        Self::Term(literal.into())
    }
}

impl From<Variable> for PatternTerm {
    #[inline]
    fn from(variable: Variable) -> Self {
        Self::Variable(variable)
    }
}

impl fmt::Display for PatternTerm {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Term(term) => term.fmt(f),
            Self::Variable(variable) => variable.fmt(f),
        }
    }
}

/// A triple pattern like `?s <http://example.com/p> ?o`
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct TriplePattern {
    pub subject: PatternTerm,
    pub predicate: PatternTerm,
    pub object: PatternTerm,
}

impl TriplePattern {
    #[inline]
    pub fn new(
        subject: impl Into<PatternTerm>,
        predicate: impl Into<PatternTerm>,
        object: impl Into<PatternTerm>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// The distinct variables of the pattern, in subject, predicate, object order
    pub fn variables(&self) -> Vec<Variable> {
        let mut variables = Vec::new();
        for position in [&self.subject, &self.predicate, &self.object] {
            if let Some(variable) = position.as_variable() {
                if !variables.contains(variable) {
                    variables.push(variable.clone());
                }
            }
        }
        variables
    }
}

impl fmt::Display for TriplePattern {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

/// A property path pattern like `?s <http://example.com/p>+ ?o`
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct PathPattern {
    pub subject: PatternTerm,
    pub path: PropertyPathExpression,
    pub object: PatternTerm,
}

impl PathPattern {
    pub fn variables(&self) -> Vec<Variable> {
        let mut variables = Vec::new();
        for position in [&self.subject, &self.object] {
            if let Some(variable) = position.as_variable() {
                if !variables.contains(variable) {
                    variables.push(variable.clone());
                }
            }
        }
        variables
    }
}

/// A function computing the subject and object pairs of a "magic" predicate.
///
/// It is given the values of the subject and object positions when they are fixed terms and
/// returns the matching pairs.
///
/// ```
/// use oxrdf::{Literal, Term};
/// use sparsolve::{PropertyFunction, QueryEvaluationError};
///
/// struct Split;
///
/// impl PropertyFunction for Split {
///     fn evaluate(
///         &self,
///         subject: Option<&Term>,
///         _object: Option<&Term>,
///     ) -> Result<Vec<(Term, Term)>, QueryEvaluationError> {
///         let Some(Term::Literal(subject)) = subject else {
///             return Ok(Vec::new());
///         };
///         Ok(subject
///             .value()
///             .split(' ')
///             .map(|part| (subject.clone().into(), Literal::from(part).into()))
///             .collect())
///     }
/// }
///
/// let pairs = Split.evaluate(Some(&Literal::from("a b").into()), None)?;
/// assert_eq!(pairs.len(), 2);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
pub trait PropertyFunction: Send + Sync {
    fn evaluate(
        &self,
        subject: Option<&Term>,
        object: Option<&Term>,
    ) -> Result<Vec<(Term, Term)>, QueryEvaluationError>;
}

impl<F> PropertyFunction for F
where
    F: Fn(Option<&Term>, Option<&Term>) -> Result<Vec<(Term, Term)>, QueryEvaluationError>
        + Send
        + Sync,
{
    #[inline]
    fn evaluate(
        &self,
        subject: Option<&Term>,
        object: Option<&Term>,
    ) -> Result<Vec<(Term, Term)>, QueryEvaluationError> {
        self(subject, object)
    }
}

/// Matches a triple pattern against the dataset.
///
/// `graph_name` is `None` for the default graph. Repeated variables must bind equal terms.
/// A default graph quad returned for a named graph lookup is an error.
pub(crate) fn evaluate_triple_pattern<D: QueryableDataset + ?Sized>(
    dataset: &D,
    pattern: &TriplePattern,
    graph_name: Option<&Term>,
) -> Result<SolutionSequence, QueryEvaluationError> {
    let mut solutions = Vec::new();
    for quad in dataset.quads_for_pattern(
        pattern.subject.as_term(),
        pattern.predicate.as_term(),
        pattern.object.as_term(),
        Some(graph_name),
    ) {
        let quad = quad.map_err(dataset_error)?;
        if graph_name.is_some() && quad.graph_name.is_none() {
            return Err(QueryEvaluationError::UnexpectedDefaultGraph);
        }
        let mut solution = Solution::new();
        if pattern.subject.bind(quad.subject, &mut solution)
            && pattern.predicate.bind(quad.predicate, &mut solution)
            && pattern.object.bind(quad.object, &mut solution)
        {
            solutions.push(solution);
        }
    }
    Ok(matches_to_sequence(solutions, pattern.variables()))
}

/// Calls a property function and binds its results.
pub(crate) fn evaluate_property_function(
    function: &dyn PropertyFunction,
    subject: &PatternTerm,
    object: &PatternTerm,
) -> Result<SolutionSequence, QueryEvaluationError> {
    let mut solutions = Vec::new();
    for (s, o) in function.evaluate(subject.as_term(), object.as_term())? {
        let mut solution = Solution::new();
        if subject.bind(s, &mut solution) && object.bind(o, &mut solution) {
            solutions.push(solution);
        }
    }
    let mut variables = Vec::new();
    variables.extend(subject.as_variable().cloned());
    if let Some(variable) = object.as_variable() {
        if !variables.contains(variable) {
            variables.push(variable.clone());
        }
    }
    Ok(matches_to_sequence(solutions, variables))
}

/// Binds the ends of the pairs returned by a path evaluation.
pub(crate) fn bind_path_ends(
    pattern: &PathPattern,
    pairs: impl IntoIterator<Item = (Term, Term)>,
) -> SolutionSequence {
    let mut solutions = Vec::new();
    for (s, o) in pairs {
        let mut solution = Solution::new();
        if pattern.subject.bind(s, &mut solution) && pattern.object.bind(o, &mut solution) {
            solutions.push(solution);
        }
    }
    matches_to_sequence(solutions, pattern.variables())
}

fn matches_to_sequence(solutions: Vec<Solution>, variables: Vec<Variable>) -> SolutionSequence {
    if variables.is_empty() {
        // Fully bound pattern: the match only tells if it holds
        return if solutions.is_empty() {
            SolutionSequence::Null
        } else {
            SolutionSequence::Identity
        };
    }
    Multiset::from_parts(solutions, variables).into()
}
