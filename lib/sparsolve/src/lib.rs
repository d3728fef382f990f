#![doc = include_str!("../README.md")]
#![doc(test(attr(deny(warnings))))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![doc(html_favicon_url = "https://raw.githubusercontent.com/oxigraph/oxigraph/main/logo.svg")]
#![doc(html_logo_url = "https://raw.githubusercontent.com/oxigraph/oxigraph/main/logo.svg")]

mod aggregate;
mod algebra;
mod context;
mod dataset;
mod error;
mod eval;
mod expression;
mod limits;
mod multiset;
mod path;
mod pattern;
mod solution;

pub use crate::algebra::{Algebra, AlgebraBuilder, BgpPattern};
pub use crate::context::{CancellationToken, Deadline, EvaluationContext, EvaluationOptions};
pub use crate::dataset::{DatasetQuad, ExpressionTerm, QueryableDataset};
pub use crate::error::QueryEvaluationError;
use crate::eval::{AlgebraEvaluator, PropertyFunctionRegistry};
pub use crate::expression::{
    CustomFunction, CustomFunctionRegistry, ExpressionContext, ExpressionEvaluator,
    SimpleExpressionEvaluator,
};
pub use crate::limits::QueryExecutionLimits;
pub use crate::multiset::{Multiset, SolutionSequence};
pub use crate::pattern::{PathPattern, PatternTerm, PropertyFunction, TriplePattern};
pub use crate::solution::{Solution, is_temporary_variable, temporary_variable};
use oxrdf::{NamedNode, Term};
use spargebra::Query;
use spargebra::algebra::GraphPattern;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, debug_span};

/// Evaluates an [`Algebra`] against a given [RDF dataset](https://www.w3.org/TR/rdf11-concepts/#dfn-rdf-dataset)
///
/// Note that this evaluator does not handle the `FROM` and `FROM NAMED` part of the query.
/// You must select the proper dataset before using this struct.
///
/// To adapt this software to work on your own RDF dataset, you need to implement the
/// [`QueryableDataset`] trait.
///
/// ```
/// use oxrdf::{Dataset, GraphName, NamedNode, Quad, Variable};
/// use sparsolve::QueryEvaluator;
/// use spargebra::Query;
///
/// let ex = NamedNode::new("http://example.com")?;
/// let dataset = Dataset::from_iter([Quad::new(
///     ex.clone(),
///     ex.clone(),
///     ex.clone(),
///     GraphName::DefaultGraph,
/// )]);
/// let query = Query::parse("SELECT * WHERE { ?s ?p ?o }", None)?;
/// let solutions = QueryEvaluator::new().evaluate_query(&query, &dataset)?;
/// assert_eq!(solutions.count(), 1);
/// assert_eq!(
///     solutions.iter().next().and_then(|s| s.get(&Variable::new("s").ok()?)),
///     Some(ex.into())
/// );
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone)]
pub struct QueryEvaluator {
    limits: QueryExecutionLimits,
    parallel: bool,
    trim_temporary_variables: bool,
    cancellation_token: Option<CancellationToken>,
    default_expression_evaluator: SimpleExpressionEvaluator,
    expression_evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    property_functions: PropertyFunctionRegistry,
}

impl Default for QueryEvaluator {
    fn default() -> Self {
        Self {
            limits: QueryExecutionLimits::default(),
            parallel: false,
            trim_temporary_variables: true,
            cancellation_token: None,
            default_expression_evaluator: SimpleExpressionEvaluator::new(),
            expression_evaluator: None,
            property_functions: PropertyFunctionRegistry::default(),
        }
    }
}

impl QueryEvaluator {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates the algebra against the dataset, starting from the
    /// [`Identity`](SolutionSequence::Identity) sequence.
    pub fn evaluate<D: QueryableDataset + ?Sized>(
        &self,
        algebra: &Algebra,
        dataset: &D,
    ) -> Result<SolutionSequence, QueryEvaluationError> {
        self.evaluate_with_context(algebra, &self.context(dataset))
    }

    /// Evaluates the algebra with an explicit context.
    ///
    /// The result is joined with the [input](EvaluationContext::input) of the context. A result
    /// truncated because the deadline was reached is never returned: the evaluation fails with
    /// [`QueryEvaluationError::Timeout`] or [`QueryEvaluationError::Cancelled`] instead.
    ///
    /// ```
    /// use oxrdf::{Dataset, GraphName, Literal, NamedNode, Quad, Variable};
    /// use sparsolve::{Algebra, EvaluationContext, QueryEvaluator, Solution, SolutionSequence};
    /// use spargebra::Query;
    ///
    /// let ex = NamedNode::new("http://example.com")?;
    /// let dataset = Dataset::from_iter([Quad::new(
    ///     ex.clone(),
    ///     ex.clone(),
    ///     Literal::from(1),
    ///     GraphName::DefaultGraph,
    /// )]);
    /// let Query::Select { pattern, .. } =
    ///     Query::parse("SELECT * WHERE { ?s ?p ?o }", None)?
    /// else {
    ///     unreachable!()
    /// };
    /// let input = [(Variable::new("o")?, Literal::from(2).into())]
    ///     .into_iter()
    ///     .collect::<Solution>();
    /// let context = EvaluationContext::new(&dataset)
    ///     .with_input(SolutionSequence::from_iter([input]));
    /// let algebra = Algebra::from_graph_pattern(&pattern)?;
    /// let solutions = QueryEvaluator::new().evaluate_with_context(&algebra, &context)?;
    /// assert!(solutions.is_null());
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    pub fn evaluate_with_context<D: QueryableDataset + ?Sized>(
        &self,
        algebra: &Algebra,
        context: &EvaluationContext<'_, D>,
    ) -> Result<SolutionSequence, QueryEvaluationError> {
        let span = debug_span!("sparql_evaluation", parallel = context.options().parallel);
        let _enter = span.enter();
        let expression_evaluator = self
            .expression_evaluator
            .as_deref()
            .unwrap_or(&self.default_expression_evaluator);
        let result = AlgebraEvaluator::new(context, expression_evaluator, &self.property_functions)
            .eval(algebra, None)?;
        let result = context.input().clone().join(result);
        if let Err(error) = context.check_deadline() {
            debug!(
                partial_solutions = result.count(),
                "evaluation stopped by its deadline"
            );
            return Err(error);
        }
        Ok(result)
    }

    /// Converts the graph pattern with [`AlgebraBuilder`] and evaluates it.
    ///
    /// The registered property functions are recognized in the triple patterns.
    pub fn evaluate_graph_pattern<D: QueryableDataset + ?Sized>(
        &self,
        pattern: &GraphPattern,
        dataset: &D,
    ) -> Result<SolutionSequence, QueryEvaluationError> {
        self.evaluate(&self.algebra_builder().build(pattern)?, dataset)
    }

    /// Evaluates a `SELECT` or `ASK` query.
    ///
    /// `ASK` returns [`Identity`](SolutionSequence::Identity) if the pattern has a solution
    /// and [`Null`](SolutionSequence::Null) otherwise.
    pub fn evaluate_query<D: QueryableDataset + ?Sized>(
        &self,
        query: &Query,
        dataset: &D,
    ) -> Result<SolutionSequence, QueryEvaluationError> {
        match query {
            Query::Select { pattern, .. } => self.evaluate_graph_pattern(pattern, dataset),
            Query::Ask { pattern, .. } => Ok(
                if self.evaluate_graph_pattern(pattern, dataset)?.is_empty() {
                    SolutionSequence::Null
                } else {
                    SolutionSequence::Identity
                },
            ),
            Query::Construct { .. } => Err(QueryEvaluationError::UnsupportedQueryForm("CONSTRUCT")),
            Query::Describe { .. } => Err(QueryEvaluationError::UnsupportedQueryForm("DESCRIBE")),
        }
    }

    /// Sets the wall-clock time after which the evaluation fails with
    /// [`QueryEvaluationError::Timeout`].
    #[must_use]
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.limits.timeout = Some(timeout);
        self
    }

    /// Partitions the cross products of basic graph patterns over the `rayon` thread pool.
    ///
    /// The solutions are the same as in the sequential mode.
    #[must_use]
    #[inline]
    pub fn with_parallel_evaluation(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Sets if the [temporary variables](is_temporary_variable) are removed from the result of
    /// each basic graph pattern. Enabled by default.
    #[must_use]
    #[inline]
    pub fn with_temporary_variable_trimming(mut self, trim: bool) -> Self {
        self.trim_temporary_variables = trim;
        self
    }

    /// Sets the timeout and the property path depth limit.
    ///
    /// ```
    /// use sparsolve::{QueryEvaluator, QueryExecutionLimits};
    ///
    /// let evaluator = QueryEvaluator::new().with_limits(QueryExecutionLimits::strict());
    /// # let _ = evaluator;
    /// ```
    #[must_use]
    #[inline]
    pub fn with_limits(mut self, limits: QueryExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Makes the evaluations fail with [`QueryEvaluationError::Cancelled`] once the token is
    /// cancelled.
    ///
    /// ```
    /// use oxrdf::Dataset;
    /// use sparsolve::{CancellationToken, QueryEvaluationError, QueryEvaluator};
    /// use spargebra::Query;
    ///
    /// let cancellation_token = CancellationToken::new();
    /// let evaluator = QueryEvaluator::new().with_cancellation_token(cancellation_token.clone());
    /// cancellation_token.cancel();
    /// let query = Query::parse("SELECT * WHERE { ?s ?p ?o }", None)?;
    /// assert!(matches!(
    ///     evaluator.evaluate_query(&query, &Dataset::new()),
    ///     Err(QueryEvaluationError::Cancelled)
    /// ));
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    #[must_use]
    #[inline]
    pub fn with_cancellation_token(mut self, cancellation_token: CancellationToken) -> Self {
        self.cancellation_token = Some(cancellation_token);
        self
    }

    /// Replaces the default [`SimpleExpressionEvaluator`].
    ///
    /// Functions registered with [`with_custom_function`](Self::with_custom_function) are only
    /// known to the default evaluator.
    #[must_use]
    #[inline]
    pub fn with_expression_evaluator(
        mut self,
        expression_evaluator: impl ExpressionEvaluator + 'static,
    ) -> Self {
        self.expression_evaluator = Some(Arc::new(expression_evaluator));
        self
    }

    /// Registers a property function: triple patterns with this predicate call the function
    /// instead of matching the dataset.
    ///
    /// ```
    /// use oxrdf::{Dataset, Literal, NamedNode, Term};
    /// use sparsolve::{QueryEvaluationError, QueryEvaluator};
    /// use spargebra::Query;
    ///
    /// let evaluator = QueryEvaluator::new().with_property_function(
    ///     NamedNode::new("http://example.com/range")?,
    ///     |subject: Option<&Term>,
    ///      _: Option<&Term>|
    ///      -> Result<Vec<(Term, Term)>, QueryEvaluationError> {
    ///         Ok((1..=3)
    ///             .map(|i| {
    ///                 (
    ///                     subject.cloned().unwrap_or_else(|| Literal::from(0).into()),
    ///                     Literal::from(i).into(),
    ///                 )
    ///             })
    ///             .collect())
    ///     },
    /// );
    /// let query = Query::parse("SELECT ?i WHERE { 0 <http://example.com/range> ?i }", None)?;
    /// assert_eq!(evaluator.evaluate_query(&query, &Dataset::new())?.count(), 3);
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    #[must_use]
    #[inline]
    pub fn with_property_function(
        mut self,
        name: NamedNode,
        function: impl PropertyFunction + 'static,
    ) -> Self {
        self.property_functions.insert(name, Arc::new(function));
        self
    }

    /// Adds a custom SPARQL function to the default expression evaluator.
    ///
    /// ```
    /// use oxrdf::{Dataset, Literal, NamedNode, Variable};
    /// use sparsolve::QueryEvaluator;
    /// use spargebra::Query;
    ///
    /// let evaluator = QueryEvaluator::new().with_custom_function(
    ///     NamedNode::new("http://example.com/nt")?,
    ///     |args| args.first().map(|t| Literal::from(t.to_string()).into()),
    /// );
    /// let query = Query::parse("SELECT (<http://example.com/nt>(1) AS ?nt) WHERE {}", None)?;
    /// let solutions = evaluator.evaluate_query(&query, &Dataset::new())?;
    /// assert_eq!(
    ///     solutions.iter().next().and_then(|s| s.get(&Variable::new("nt").ok()?)),
    ///     Some(Literal::from("\"1\"^^<http://www.w3.org/2001/XMLSchema#integer>").into())
    /// );
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    #[must_use]
    #[inline]
    pub fn with_custom_function(
        mut self,
        name: NamedNode,
        evaluator: impl Fn(&[Term]) -> Option<Term> + Send + Sync + 'static,
    ) -> Self {
        self.default_expression_evaluator = self
            .default_expression_evaluator
            .with_custom_function(name, evaluator);
        self
    }

    /// The builder recognizing the registered property functions
    pub fn algebra_builder(&self) -> AlgebraBuilder {
        self.property_functions
            .keys()
            .fold(AlgebraBuilder::new(), |builder, name| {
                builder.with_property_function(name.clone())
            })
    }

    fn context<'a, D: QueryableDataset + ?Sized>(
        &self,
        dataset: &'a D,
    ) -> EvaluationContext<'a, D> {
        let mut deadline = Deadline::after(self.limits.timeout);
        if let Some(cancellation_token) = &self.cancellation_token {
            deadline = deadline.with_cancellation_token(cancellation_token.clone());
        }
        EvaluationContext::new(dataset)
            .with_deadline(deadline)
            .with_options(EvaluationOptions {
                parallel: self.parallel,
                trim_temporary_variables: self.trim_temporary_variables,
                max_property_path_depth: self.limits.max_property_path_depth,
            })
    }
}
