use crate::aggregate::{AggregateState, aggregated_expression};
use crate::algebra::{Algebra, AlgebraBuilder, BgpPattern};
use crate::context::EvaluationContext;
use crate::dataset::{QueryableDataset, dataset_error};
use crate::error::QueryEvaluationError;
use crate::expression::{ExpressionContext, ExpressionEvaluator, cmp_terms};
use crate::multiset::{Multiset, SolutionSequence};
use crate::path::{PathEvaluator, evaluate_path_pattern};
use crate::pattern::{PropertyFunction, evaluate_property_function, evaluate_triple_pattern};
use crate::solution::Solution;
use oxrdf::{NamedNode, Term, Variable};
use oxsdatatypes::DateTime;
use rustc_hash::FxHashMap;
use spargebra::algebra::{AggregateExpression, Expression, GraphPattern, OrderExpression};
use spargebra::term::NamedNodePattern;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, trace};

pub(crate) type PropertyFunctionRegistry = FxHashMap<NamedNode, Arc<dyn PropertyFunction>>;

type ExistsAlgebras = Rc<RefCell<FxHashMap<GraphPattern, Rc<Algebra>>>>;

/// Recursive evaluator of an [`Algebra`] tree.
///
/// The active graph is passed down the recursion: `None` is the default graph.
/// Inside `EXISTS` the basic graph patterns start from the tested row instead of the identity.
pub(crate) struct AlgebraEvaluator<'a, D: QueryableDataset + ?Sized> {
    context: &'a EvaluationContext<'a, D>,
    expression_evaluator: &'a dyn ExpressionEvaluator,
    property_functions: &'a PropertyFunctionRegistry,
    exists_algebras: ExistsAlgebras,
    seed: Option<Solution>,
    now: DateTime,
}

impl<'a, D: QueryableDataset + ?Sized> AlgebraEvaluator<'a, D> {
    pub fn new(
        context: &'a EvaluationContext<'a, D>,
        expression_evaluator: &'a dyn ExpressionEvaluator,
        property_functions: &'a PropertyFunctionRegistry,
    ) -> Self {
        Self {
            context,
            expression_evaluator,
            property_functions,
            exists_algebras: ExistsAlgebras::default(),
            seed: None,
            now: DateTime::now(),
        }
    }

    /// An evaluator sharing the same state whose basic graph patterns start from `seed`
    fn seeded(&self, seed: Solution) -> Self {
        Self {
            context: self.context,
            expression_evaluator: self.expression_evaluator,
            property_functions: self.property_functions,
            exists_algebras: Rc::clone(&self.exists_algebras),
            seed: Some(seed),
            now: self.now,
        }
    }

    fn start(&self) -> SolutionSequence {
        self.seed.as_ref().map_or(SolutionSequence::Identity, |seed| {
            [seed.clone()].into_iter().collect()
        })
    }

    pub fn eval(
        &self,
        algebra: &Algebra,
        graph_name: Option<&Term>,
    ) -> Result<SolutionSequence, QueryEvaluationError> {
        self.context.check_deadline()?;
        Ok(match algebra {
            Algebra::Bgp(items) => traced("bgp", self.eval_bgp(items, graph_name)?),
            Algebra::Join { left, right } => {
                let left = self.eval(left, graph_name)?;
                let right = self.eval(right, graph_name)?;
                self.context.check_deadline()?;
                traced("join", left.join(right))
            }
            Algebra::Union { left, right } => {
                let left = self.eval(left, graph_name)?;
                let right = self.eval(right, graph_name)?;
                traced("union", left.union(right))
            }
            Algebra::LeftJoin {
                left,
                right,
                expression,
            } => {
                let left = self.eval(left, graph_name)?;
                let right = self.eval(right, graph_name)?;
                self.context.check_deadline()?;
                let result = if let Some(expression) = expression {
                    let mut error = None;
                    let result = left.left_join(right, |solution| {
                        self.ebv_or_skip(expression, solution, graph_name, &mut error)
                    });
                    error.map_or(Ok(result), Err)?
                } else {
                    left.left_join(right, |_| true)
                };
                traced("left_join", result)
            }
            Algebra::Minus { left, right } => {
                let left = self.eval(left, graph_name)?;
                let right = self.eval(right, graph_name)?;
                traced("minus", left.minus(&right))
            }
            Algebra::Filter { expression, inner } => {
                let inner = self.eval(inner, graph_name)?;
                traced("filter", self.filter(inner, expression, graph_name)?)
            }
            Algebra::Extend {
                inner,
                variable,
                expression,
            } => {
                let inner = self.eval(inner, graph_name)?;
                traced(
                    "extend",
                    inner.extend(variable, |solution| {
                        self.evaluate_term(expression, solution, graph_name)
                    })?,
                )
            }
            Algebra::Graph { name, inner } => traced("graph", self.eval_graph(name, inner)?),
            Algebra::Values {
                variables,
                bindings,
            } => traced("values", values(variables, bindings)),
            Algebra::OrderBy { inner, expression } => {
                let inner = self.eval(inner, graph_name)?;
                traced("order_by", self.order_by(inner, expression, graph_name)?)
            }
            Algebra::Project { inner, variables } => {
                traced("project", self.eval(inner, graph_name)?.project(variables))
            }
            Algebra::Distinct { inner } => {
                traced("distinct", self.eval(inner, graph_name)?.distinct())
            }
            Algebra::Reduced { inner } => {
                traced("reduced", self.eval(inner, graph_name)?.reduced())
            }
            Algebra::Slice {
                inner,
                start,
                length,
            } => traced("slice", self.eval(inner, graph_name)?.slice(*start, *length)),
            Algebra::Group {
                inner,
                variables,
                aggregates,
            } => {
                let inner = self.eval(inner, graph_name)?;
                traced("group", self.group(&inner, variables, aggregates, graph_name)?)
            }
        })
    }

    /// Left to right fold of the items.
    ///
    /// The fold stops as soon as the running result is empty: the remaining items are never
    /// matched against the dataset.
    fn eval_bgp(
        &self,
        items: &[BgpPattern],
        graph_name: Option<&Term>,
    ) -> Result<SolutionSequence, QueryEvaluationError> {
        let Some(first) = items.first() else {
            return Ok(self.start());
        };
        if let BgpPattern::Bind {
            variable,
            expression,
        } = first
        {
            self.check_leading_bind(variable, expression, graph_name)?;
        }
        let options = self.context.options();
        let mut current = self.start();
        for (position, item) in items.iter().enumerate() {
            current = match item {
                BgpPattern::Filter(expression) => self.filter(current, expression, graph_name)?,
                BgpPattern::Bind {
                    variable,
                    expression,
                } => current.extend(variable, |solution| {
                    self.evaluate_term(expression, solution, graph_name)
                })?,
                BgpPattern::Let {
                    variable,
                    expression,
                } => self.assign(current, variable, expression, graph_name)?,
                _ => {
                    let local = self.eval_bgp_match(item, graph_name)?;
                    if local.is_empty() {
                        debug!(
                            position,
                            remaining = items.len() - position - 1,
                            "basic graph pattern item without match, skipping the remaining items"
                        );
                        return Ok(SolutionSequence::Null);
                    }
                    self.context.check_deadline()?;
                    if current.is_disjoint_with(&local) {
                        current.product_with_timeout(
                            local,
                            self.context.deadline(),
                            options.parallel,
                        )
                    } else {
                        current.join(local)
                    }
                }
            };
            if current.is_empty() {
                debug!(
                    position,
                    remaining = items.len() - position - 1,
                    "basic graph pattern without solution, skipping the remaining items"
                );
                return Ok(SolutionSequence::Null);
            }
        }
        if options.trim_temporary_variables {
            current = current.trim();
        }
        Ok(if current.is_empty() {
            SolutionSequence::Null
        } else {
            current
        })
    }

    fn eval_bgp_match(
        &self,
        item: &BgpPattern,
        graph_name: Option<&Term>,
    ) -> Result<SolutionSequence, QueryEvaluationError> {
        match item {
            BgpPattern::Triple(pattern) => {
                evaluate_triple_pattern(self.context.dataset(), pattern, graph_name)
            }
            BgpPattern::Path(pattern) => {
                evaluate_path_pattern(&self.path_evaluator(graph_name), pattern)
            }
            BgpPattern::SubQuery(algebra) => self.eval(algebra, graph_name),
            BgpPattern::PropertyFunction {
                function,
                subject,
                object,
            } => {
                let Some(implementation) = self.property_functions.get(function) else {
                    return Err(QueryEvaluationError::UnknownPropertyFunction(
                        function.clone(),
                    ));
                };
                evaluate_property_function(implementation.as_ref(), subject, object)
            }
            BgpPattern::Filter(_) | BgpPattern::Bind { .. } | BgpPattern::Let { .. } => {
                Ok(SolutionSequence::Identity)
            }
        }
    }

    /// A leading `BIND` must not rebind a variable of the evaluation input.
    fn check_leading_bind(
        &self,
        variable: &Variable,
        expression: &Expression,
        graph_name: Option<&Term>,
    ) -> Result<(), QueryEvaluationError> {
        let Some((solution, existing)) = self
            .context
            .input()
            .iter()
            .find_map(|solution| Some((solution, solution.get(variable)?)))
        else {
            return Ok(());
        };
        let new = self.evaluate_term(expression, solution, graph_name)?;
        Err(QueryEvaluationError::DuplicateBinding {
            variable: variable.clone(),
            existing,
            new,
        })
    }

    fn eval_graph(
        &self,
        name: &NamedNodePattern,
        inner: &Algebra,
    ) -> Result<SolutionSequence, QueryEvaluationError> {
        let dataset = self.context.dataset();
        match name {
            NamedNodePattern::NamedNode(name) => {
                let graph_name = Term::from(name.clone());
                if !dataset
                    .contains_graph_name(&graph_name)
                    .map_err(dataset_error)?
                {
                    return Ok(SolutionSequence::Null);
                }
                self.eval(inner, Some(&graph_name))
            }
            NamedNodePattern::Variable(variable) => {
                let mut result = SolutionSequence::Null;
                for graph_name in dataset.named_graphs().map_err(dataset_error)? {
                    let matches = self
                        .eval(inner, Some(&graph_name))?
                        .assign(variable, |_| Some(graph_name.clone()));
                    result = result.union(matches);
                }
                Ok(result)
            }
        }
    }

    /// Sorts on the keys of each solution, computed once before sorting
    fn order_by(
        &self,
        inner: SolutionSequence,
        expression: &[OrderExpression],
        graph_name: Option<&Term>,
    ) -> Result<SolutionSequence, QueryEvaluationError> {
        let mut error = None;
        let context = self.expression_context(graph_name);
        let result = inner.sort_by_key(
            |solution| {
                expression
                    .iter()
                    .map(|comparator| {
                        let (OrderExpression::Asc(key) | OrderExpression::Desc(key)) = comparator;
                        match self.expression_evaluator.evaluate(key, solution, &context) {
                            Ok(value) => Some(value),
                            Err(e) => {
                                if !e.is_expression_error() {
                                    error.get_or_insert(e);
                                }
                                None
                            }
                        }
                    })
                    .collect::<Vec<_>>()
            },
            |a, b| {
                for ((comparator, a), b) in expression.iter().zip(a).zip(b) {
                    let ordering = match comparator {
                        OrderExpression::Asc(_) => cmp_terms(a.as_ref(), b.as_ref()),
                        OrderExpression::Desc(_) => cmp_terms(a.as_ref(), b.as_ref()).reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            },
        );
        error.map_or(Ok(result), Err)
    }

    /// One solution per group, in the order the groups are first seen.
    ///
    /// Without grouping variables there is always a single group, even if `inner` is empty.
    fn group(
        &self,
        inner: &SolutionSequence,
        variables: &[Variable],
        aggregates: &[(Variable, AggregateExpression)],
        graph_name: Option<&Term>,
    ) -> Result<SolutionSequence, QueryEvaluationError> {
        let new_states = || {
            aggregates
                .iter()
                .map(|(_, aggregate)| AggregateState::new(aggregate))
                .collect::<Result<Vec<_>, _>>()
        };
        let mut group_index = FxHashMap::<Vec<Option<Term>>, usize>::default();
        let mut groups = Vec::new();
        if variables.is_empty() {
            group_index.insert(Vec::new(), 0);
            groups.push((Vec::new(), new_states()?));
        }
        for solution in inner {
            let key = variables.iter().map(|v| solution.get(v)).collect::<Vec<_>>();
            let index = match group_index.entry(key) {
                Entry::Occupied(entry) => *entry.get(),
                Entry::Vacant(entry) => {
                    groups.push((entry.key().clone(), new_states()?));
                    *entry.insert(groups.len() - 1)
                }
            };
            let Some((_, states)) = groups.get_mut(index) else {
                continue;
            };
            for ((_, aggregate), state) in aggregates.iter().zip(states) {
                let value = if let Some(expression) = aggregated_expression(aggregate) {
                    match self.expression_evaluator.evaluate(
                        expression,
                        solution,
                        &self.expression_context(graph_name),
                    ) {
                        Ok(value) => Some(value),
                        Err(e) if e.is_expression_error() => None,
                        Err(e) => return Err(e),
                    }
                } else {
                    None
                };
                state.add(solution, value);
            }
        }
        self.context.check_deadline()?;
        debug!(groups = groups.len(), "solutions grouped");
        let solutions = groups
            .into_iter()
            .map(|(key, states)| {
                variables
                    .iter()
                    .zip(key)
                    .filter_map(|(variable, value)| Some((variable.clone(), value?)))
                    .chain(aggregates.iter().zip(states).filter_map(
                        |((variable, _), state)| Some((variable.clone(), state.finish()?.into())),
                    ))
                    .collect::<Solution>()
            })
            .collect();
        let variables = variables
            .iter()
            .chain(aggregates.iter().map(|(variable, _)| variable))
            .cloned()
            .collect();
        Ok(SolutionSequence::non_empty_or_null(Multiset::from_parts(
            solutions, variables,
        )))
    }

    /// Keeps the solutions for which the expression is true. Expression errors drop the solution.
    fn filter(
        &self,
        sequence: SolutionSequence,
        expression: &Expression,
        graph_name: Option<&Term>,
    ) -> Result<SolutionSequence, QueryEvaluationError> {
        let mut error = None;
        let result = sequence
            .filter(|solution| self.ebv_or_skip(expression, solution, graph_name, &mut error));
        error.map_or(Ok(result), Err)
    }

    fn assign(
        &self,
        sequence: SolutionSequence,
        variable: &Variable,
        expression: &Expression,
        graph_name: Option<&Term>,
    ) -> Result<SolutionSequence, QueryEvaluationError> {
        let mut error = None;
        let result = sequence.assign(variable, |solution| {
            match self.evaluate_term(expression, solution, graph_name) {
                Ok(value) => Some(value),
                Err(e) => {
                    if !e.is_expression_error() {
                        error.get_or_insert(e);
                    }
                    None
                }
            }
        });
        error.map_or(Ok(result), Err)
    }

    /// The effective boolean value, `false` on expression errors.
    ///
    /// Other errors are stored in `error` so that the caller can abort once the row operation ends.
    fn ebv_or_skip(
        &self,
        expression: &Expression,
        solution: &Solution,
        graph_name: Option<&Term>,
        error: &mut Option<QueryEvaluationError>,
    ) -> bool {
        match self.expression_evaluator.effective_boolean_value(
            expression,
            solution,
            &self.expression_context(graph_name),
        ) {
            Ok(value) => value,
            Err(e) => {
                if !e.is_expression_error() {
                    error.get_or_insert(e);
                }
                false
            }
        }
    }

    fn evaluate_term(
        &self,
        expression: &Expression,
        solution: &Solution,
        graph_name: Option<&Term>,
    ) -> Result<Term, QueryEvaluationError> {
        self.expression_evaluator
            .evaluate(expression, solution, &self.expression_context(graph_name))
            .map(Term::from)
    }

    fn expression_context<'b>(&'b self, graph_name: Option<&'b Term>) -> ScopedContext<'b, 'a, D> {
        ScopedContext {
            evaluator: self,
            graph_name,
        }
    }

    fn path_evaluator<'b>(&'b self, graph_name: Option<&'b Term>) -> PathEvaluator<'b, D> {
        PathEvaluator::new(
            self.context.dataset(),
            graph_name,
            self.context.options().max_property_path_depth,
            self.context.deadline(),
        )
    }

    /// Returns `true` if `pattern` has a solution once the bindings of `solution` are applied.
    ///
    /// The built algebra is cached per pattern but the evaluation is done for each row.
    fn exists(
        &self,
        pattern: &GraphPattern,
        solution: &Solution,
        graph_name: Option<&Term>,
    ) -> Result<bool, QueryEvaluationError> {
        let cached = self.exists_algebras.borrow().get(pattern).map(Rc::clone);
        let algebra = if let Some(algebra) = cached {
            algebra
        } else {
            let builder = self
                .property_functions
                .keys()
                .fold(AlgebraBuilder::new(), |builder, name| {
                    builder.with_property_function(name.clone())
                });
            let algebra = Rc::new(builder.build(pattern)?);
            self.exists_algebras
                .borrow_mut()
                .insert(pattern.clone(), Rc::clone(&algebra));
            algebra
        };
        let solutions = self.seeded(solution.clone()).eval(&algebra, graph_name)?;
        Ok(solutions
            .iter()
            .any(|candidate| candidate.is_compatible_with(solution, &candidate.variables())))
    }
}

/// The [`ExpressionContext`] of an expression evaluated in a given active graph
struct ScopedContext<'b, 'a, D: QueryableDataset + ?Sized> {
    evaluator: &'b AlgebraEvaluator<'a, D>,
    graph_name: Option<&'b Term>,
}

impl<D: QueryableDataset + ?Sized> ExpressionContext for ScopedContext<'_, '_, D> {
    fn exists(
        &self,
        pattern: &GraphPattern,
        solution: &Solution,
    ) -> Result<bool, QueryEvaluationError> {
        self.evaluator.exists(pattern, solution, self.graph_name)
    }

    fn now(&self) -> DateTime {
        self.evaluator.now
    }
}

fn values(variables: &[Variable], bindings: &[Vec<Option<Term>>]) -> SolutionSequence {
    let solutions = bindings
        .iter()
        .map(|row| {
            variables
                .iter()
                .zip(row)
                .filter_map(|(variable, value)| Some((variable.clone(), value.clone()?)))
                .collect::<Solution>()
        })
        .collect();
    SolutionSequence::non_empty_or_null(Multiset::from_parts(solutions, variables.to_vec()))
}

fn traced(operator: &'static str, result: SolutionSequence) -> SolutionSequence {
    trace!(operator, solutions = result.count(), "algebra node evaluated");
    result
}
