use crate::context::Deadline;
use crate::dataset::{QueryableDataset, dataset_error};
use crate::error::QueryEvaluationError;
use crate::multiset::SolutionSequence;
use crate::pattern::{PathPattern, bind_path_ends};
use oxrdf::{NamedNode, Term};
use rustc_hash::FxHashSet;
use spargebra::algebra::PropertyPathExpression;
use std::hash::Hash;

/// Evaluates property paths inside a single graph.
///
/// Simple steps and sequences follow bag semantics. Alternatives and closures are deduplicated.
pub(crate) struct PathEvaluator<'a, D: QueryableDataset + ?Sized> {
    dataset: &'a D,
    graph_name: Option<&'a Term>,
    max_depth: Option<usize>,
    deadline: &'a Deadline,
}

impl<'a, D: QueryableDataset + ?Sized> PathEvaluator<'a, D> {
    pub fn new(
        dataset: &'a D,
        graph_name: Option<&'a Term>,
        max_depth: Option<usize>,
        deadline: &'a Deadline,
    ) -> Self {
        Self {
            dataset,
            graph_name,
            max_depth,
            deadline,
        }
    }

    /// Returns if there is a path from `start` to `end`.
    pub fn eval_closed(
        &self,
        path: &PropertyPathExpression,
        start: &Term,
        end: &Term,
    ) -> Result<bool, QueryEvaluationError> {
        Ok(match path {
            PropertyPathExpression::NamedNode(p) => self
                .quads(Some(start), Some(p), Some(end))?
                .into_iter()
                .next()
                .is_some(),
            PropertyPathExpression::Reverse(p) => self.eval_closed(p, end, start)?,
            PropertyPathExpression::Sequence(a, b) => {
                for middle in self.eval_from(a, start)? {
                    if self.eval_closed(b, &middle, end)? {
                        return Ok(true);
                    }
                }
                false
            }
            PropertyPathExpression::Alternative(a, b) => {
                self.eval_closed(a, start, end)? || self.eval_closed(b, start, end)?
            }
            PropertyPathExpression::ZeroOrMore(p) => {
                if start == end {
                    self.is_node(start)?
                } else {
                    self.closure(vec![start.clone()], 0, |e| self.eval_from(p, e))?
                        .contains(end)
                }
            }
            PropertyPathExpression::OneOrMore(p) => self
                .closure(self.eval_from(p, start)?, 1, |e| self.eval_from(p, e))?
                .contains(end),
            PropertyPathExpression::ZeroOrOne(p) => {
                if start == end {
                    self.is_node(start)?
                } else {
                    self.eval_closed(p, start, end)?
                }
            }
            PropertyPathExpression::NegatedPropertySet(ps) => self
                .quads(Some(start), None, Some(end))?
                .into_iter()
                .any(|(_, predicate, _)| !is_in_set(&predicate, ps)),
        })
    }

    /// The ends of the paths starting from `start`
    pub fn eval_from(
        &self,
        path: &PropertyPathExpression,
        start: &Term,
    ) -> Result<Vec<Term>, QueryEvaluationError> {
        Ok(match path {
            PropertyPathExpression::NamedNode(p) => self
                .quads(Some(start), Some(p), None)?
                .into_iter()
                .map(|(_, _, o)| o)
                .collect(),
            PropertyPathExpression::Reverse(p) => self.eval_to(p, start)?,
            PropertyPathExpression::Sequence(a, b) => {
                let mut ends = Vec::new();
                for middle in self.eval_from(a, start)? {
                    ends.extend(self.eval_from(b, &middle)?);
                }
                ends
            }
            PropertyPathExpression::Alternative(a, b) => {
                let mut ends = self.eval_from(a, start)?;
                ends.extend(self.eval_from(b, start)?);
                deduplicate(ends)
            }
            PropertyPathExpression::ZeroOrMore(p) => {
                if self.is_node(start)? {
                    self.closure(vec![start.clone()], 0, |e| self.eval_from(p, e))?
                } else {
                    Vec::new()
                }
            }
            PropertyPathExpression::OneOrMore(p) => {
                self.closure(self.eval_from(p, start)?, 1, |e| self.eval_from(p, e))?
            }
            PropertyPathExpression::ZeroOrOne(p) => {
                if self.is_node(start)? {
                    let mut ends = vec![start.clone()];
                    ends.extend(self.eval_from(p, start)?);
                    deduplicate(ends)
                } else {
                    Vec::new()
                }
            }
            PropertyPathExpression::NegatedPropertySet(ps) => self
                .quads(Some(start), None, None)?
                .into_iter()
                .filter(|(_, predicate, _)| !is_in_set(predicate, ps))
                .map(|(_, _, o)| o)
                .collect(),
        })
    }

    /// The starts of the paths ending at `end`
    pub fn eval_to(
        &self,
        path: &PropertyPathExpression,
        end: &Term,
    ) -> Result<Vec<Term>, QueryEvaluationError> {
        Ok(match path {
            PropertyPathExpression::NamedNode(p) => self
                .quads(None, Some(p), Some(end))?
                .into_iter()
                .map(|(s, _, _)| s)
                .collect(),
            PropertyPathExpression::Reverse(p) => self.eval_from(p, end)?,
            PropertyPathExpression::Sequence(a, b) => {
                let mut starts = Vec::new();
                for middle in self.eval_to(b, end)? {
                    starts.extend(self.eval_to(a, &middle)?);
                }
                starts
            }
            PropertyPathExpression::Alternative(a, b) => {
                let mut starts = self.eval_to(a, end)?;
                starts.extend(self.eval_to(b, end)?);
                deduplicate(starts)
            }
            PropertyPathExpression::ZeroOrMore(p) => {
                if self.is_node(end)? {
                    self.closure(vec![end.clone()], 0, |e| self.eval_to(p, e))?
                } else {
                    Vec::new()
                }
            }
            PropertyPathExpression::OneOrMore(p) => {
                self.closure(self.eval_to(p, end)?, 1, |e| self.eval_to(p, e))?
            }
            PropertyPathExpression::ZeroOrOne(p) => {
                if self.is_node(end)? {
                    let mut starts = vec![end.clone()];
                    starts.extend(self.eval_to(p, end)?);
                    deduplicate(starts)
                } else {
                    Vec::new()
                }
            }
            PropertyPathExpression::NegatedPropertySet(ps) => self
                .quads(None, None, Some(end))?
                .into_iter()
                .filter(|(_, predicate, _)| !is_in_set(predicate, ps))
                .map(|(s, _, _)| s)
                .collect(),
        })
    }

    /// All the (start, end) pairs of the path
    pub fn eval_open(
        &self,
        path: &PropertyPathExpression,
    ) -> Result<Vec<(Term, Term)>, QueryEvaluationError> {
        Ok(match path {
            PropertyPathExpression::NamedNode(p) => self
                .quads(None, Some(p), None)?
                .into_iter()
                .map(|(s, _, o)| (s, o))
                .collect(),
            PropertyPathExpression::Reverse(p) => self
                .eval_open(p)?
                .into_iter()
                .map(|(s, o)| (o, s))
                .collect(),
            PropertyPathExpression::Sequence(a, b) => {
                let mut pairs = Vec::new();
                for (start, middle) in self.eval_open(a)? {
                    pairs.extend(
                        self.eval_from(b, &middle)?
                            .into_iter()
                            .map(|end| (start.clone(), end)),
                    );
                }
                pairs
            }
            PropertyPathExpression::Alternative(a, b) => {
                let mut pairs = self.eval_open(a)?;
                pairs.extend(self.eval_open(b)?);
                deduplicate(pairs)
            }
            PropertyPathExpression::ZeroOrMore(p) => {
                self.closure(self.identity_pairs()?, 0, |(start, middle)| {
                    Ok(self
                        .eval_from(p, middle)?
                        .into_iter()
                        .map(|end| (start.clone(), end))
                        .collect())
                })?
            }
            PropertyPathExpression::OneOrMore(p) => {
                self.closure(self.eval_open(p)?, 1, |(start, middle)| {
                    Ok(self
                        .eval_from(p, middle)?
                        .into_iter()
                        .map(|end| (start.clone(), end))
                        .collect())
                })?
            }
            PropertyPathExpression::ZeroOrOne(p) => {
                let mut pairs = self.identity_pairs()?;
                pairs.extend(self.eval_open(p)?);
                deduplicate(pairs)
            }
            PropertyPathExpression::NegatedPropertySet(ps) => self
                .quads(None, None, None)?
                .into_iter()
                .filter(|(_, predicate, _)| !is_in_set(predicate, ps))
                .map(|(s, _, o)| (s, o))
                .collect(),
        })
    }

    fn quads(
        &self,
        subject: Option<&Term>,
        predicate: Option<&NamedNode>,
        object: Option<&Term>,
    ) -> Result<Vec<(Term, Term, Term)>, QueryEvaluationError> {
        let predicate = predicate.map(|p| Term::from(p.clone()));
        self.dataset
            .quads_for_pattern(subject, predicate.as_ref(), object, Some(self.graph_name))
            .map(|quad| {
                let quad = quad.map_err(dataset_error)?;
                Ok((quad.subject, quad.predicate, quad.object))
            })
            .collect()
    }

    /// Returns if the term is the subject or the object of a triple of the graph.
    fn is_node(&self, term: &Term) -> Result<bool, QueryEvaluationError> {
        let graph_name = Some(self.graph_name);
        if self
            .dataset
            .quads_for_pattern(Some(term), None, None, graph_name)
            .next()
            .transpose()
            .map_err(dataset_error)?
            .is_some()
        {
            return Ok(true);
        }
        Ok(self
            .dataset
            .quads_for_pattern(None, None, Some(term), graph_name)
            .next()
            .transpose()
            .map_err(dataset_error)?
            .is_some())
    }

    /// The zero-length paths of all the nodes of the graph
    fn identity_pairs(&self) -> Result<Vec<(Term, Term)>, QueryEvaluationError> {
        let mut pairs = Vec::new();
        for (s, _, o) in self.quads(None, None, None)? {
            pairs.push((s.clone(), s));
            pairs.push((o.clone(), o));
        }
        Ok(deduplicate(pairs))
    }

    /// Level by level closure of `start` under `next`.
    ///
    /// `depth` is the number of steps already taken by the elements of `start`.
    /// Fails once a level that is deeper than the maximal depth yields new elements.
    fn closure<T: Clone + Eq + Hash>(
        &self,
        start: Vec<T>,
        mut depth: usize,
        mut next: impl FnMut(&T) -> Result<Vec<T>, QueryEvaluationError>,
    ) -> Result<Vec<T>, QueryEvaluationError> {
        let mut all = FxHashSet::default();
        let mut output = Vec::new();
        let mut level = Vec::new();
        for e in start {
            if all.insert(e.clone()) {
                output.push(e.clone());
                level.push(e);
            }
        }
        while !level.is_empty() {
            self.deadline.check()?;
            let mut next_level = Vec::new();
            for e in &level {
                for n in next(e)? {
                    if all.insert(n.clone()) {
                        next_level.push(n);
                    }
                }
            }
            if next_level.is_empty() {
                break;
            }
            depth += 1;
            if let Some(max_depth) = self.max_depth {
                if depth > max_depth {
                    return Err(QueryEvaluationError::PathDepthExceeded(max_depth));
                }
            }
            output.extend(next_level.iter().cloned());
            level = next_level;
        }
        Ok(output)
    }
}

/// Matches a path pattern, using the fixed ends to drive the evaluation.
pub(crate) fn evaluate_path_pattern<D: QueryableDataset + ?Sized>(
    evaluator: &PathEvaluator<'_, D>,
    pattern: &PathPattern,
) -> Result<SolutionSequence, QueryEvaluationError> {
    let pairs = match (pattern.subject.as_term(), pattern.object.as_term()) {
        (Some(subject), Some(object)) => {
            return Ok(if evaluator.eval_closed(&pattern.path, subject, object)? {
                SolutionSequence::Identity
            } else {
                SolutionSequence::Null
            });
        }
        (Some(subject), None) => evaluator
            .eval_from(&pattern.path, subject)?
            .into_iter()
            .map(|object| (subject.clone(), object))
            .collect(),
        (None, Some(object)) => evaluator
            .eval_to(&pattern.path, object)?
            .into_iter()
            .map(|subject| (subject, object.clone()))
            .collect(),
        (None, None) => evaluator.eval_open(&pattern.path)?,
    };
    Ok(bind_path_ends(pattern, pairs))
}

fn is_in_set(predicate: &Term, set: &[NamedNode]) -> bool {
    matches!(predicate, Term::NamedNode(p) if set.contains(p))
}

fn deduplicate<T: Clone + Eq + Hash>(values: Vec<T>) -> Vec<T> {
    let mut seen = FxHashSet::default();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::{Dataset, GraphName, Literal, Quad, Variable};
    use std::error::Error;

    fn ex(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{name}"))
    }

    fn t(name: &str) -> Term {
        ex(name).into()
    }

    fn p(name: &str) -> PropertyPathExpression {
        PropertyPathExpression::NamedNode(ex(name))
    }

    /// a -p-> b -p-> c -p-> a and c -q-> "1"
    fn cycle() -> Dataset {
        let mut dataset = Dataset::new();
        for (s, o) in [("a", "b"), ("b", "c"), ("c", "a")] {
            dataset.insert(&Quad::new(ex(s), ex("p"), ex(o), GraphName::DefaultGraph));
        }
        dataset.insert(&Quad::new(ex("c"), ex("q"), Literal::from(1), GraphName::DefaultGraph));
        dataset
    }

    fn chain(len: usize) -> Dataset {
        let mut dataset = Dataset::new();
        for i in 0..len {
            dataset.insert(&Quad::new(
                ex(&i.to_string()),
                ex("p"),
                ex(&(i + 1).to_string()),
                GraphName::DefaultGraph,
            ));
        }
        dataset
    }

    fn sorted(terms: Vec<Term>) -> Vec<String> {
        let mut terms = terms.iter().map(ToString::to_string).collect::<Vec<_>>();
        terms.sort();
        terms
    }

    #[test]
    fn one_or_more_on_cycle_terminates() -> Result<(), Box<dyn Error>> {
        let dataset = cycle();
        let deadline = Deadline::never();
        let evaluator = PathEvaluator::new(&dataset, None, None, &deadline);
        let path = PropertyPathExpression::OneOrMore(Box::new(p("p")));
        assert_eq!(
            sorted(evaluator.eval_from(&path, &t("a"))?),
            sorted(vec![t("a"), t("b"), t("c")])
        );
        assert_eq!(evaluator.eval_open(&path)?.len(), 9);
        Ok(())
    }

    #[test]
    fn zero_or_more_includes_start() -> Result<(), Box<dyn Error>> {
        let dataset = chain(3);
        let deadline = Deadline::never();
        let evaluator = PathEvaluator::new(&dataset, None, None, &deadline);
        let path = PropertyPathExpression::ZeroOrMore(Box::new(p("p")));
        assert_eq!(evaluator.eval_from(&path, &t("2"))?, [t("2"), t("3")]);
        assert!(evaluator.eval_closed(&path, &t("0"), &t("0"))?);
        assert!(evaluator.eval_closed(&path, &t("0"), &t("3"))?);
        assert!(!evaluator.eval_closed(&path, &t("3"), &t("0"))?);
        assert!(evaluator.eval_from(&path, &t("unknown"))?.is_empty());
        Ok(())
    }

    #[test]
    fn sequence_alternative_and_reverse() -> Result<(), Box<dyn Error>> {
        let dataset = cycle();
        let deadline = Deadline::never();
        let evaluator = PathEvaluator::new(&dataset, None, None, &deadline);
        let sequence = PropertyPathExpression::Sequence(Box::new(p("p")), Box::new(p("q")));
        assert_eq!(
            evaluator.eval_from(&sequence, &t("b"))?,
            [Term::from(Literal::from(1))]
        );
        let reverse = PropertyPathExpression::Reverse(Box::new(p("p")));
        assert_eq!(evaluator.eval_from(&reverse, &t("a"))?, [t("c")]);
        let alternative = PropertyPathExpression::Alternative(Box::new(p("p")), Box::new(p("p")));
        assert_eq!(evaluator.eval_open(&alternative)?.len(), 3);
        Ok(())
    }

    #[test]
    fn negated_property_set() -> Result<(), Box<dyn Error>> {
        let dataset = cycle();
        let deadline = Deadline::never();
        let evaluator = PathEvaluator::new(&dataset, None, None, &deadline);
        let path = PropertyPathExpression::NegatedPropertySet(vec![ex("p")]);
        assert_eq!(
            evaluator.eval_open(&path)?,
            [(t("c"), Term::from(Literal::from(1)))]
        );
        Ok(())
    }

    #[test]
    fn path_pattern_ends() -> Result<(), Box<dyn Error>> {
        let dataset = cycle();
        let deadline = Deadline::never();
        let evaluator = PathEvaluator::new(&dataset, None, None, &deadline);
        let x = Variable::new_unchecked("x");
        let plus = PropertyPathExpression::OneOrMore(Box::new(p("p")));
        let same_ends = PathPattern {
            subject: x.clone().into(),
            path: plus.clone(),
            object: x.clone().into(),
        };
        let result = evaluate_path_pattern(&evaluator, &same_ends)?;
        assert_eq!(result.count(), 3);
        assert_eq!(result.variables(), [x]);
        let closed = PathPattern {
            subject: ex("a").into(),
            path: plus,
            object: ex("c").into(),
        };
        assert!(evaluate_path_pattern(&evaluator, &closed)?.is_identity());
        let missing = PathPattern {
            subject: ex("c").into(),
            path: p("p"),
            object: ex("b").into(),
        };
        assert!(evaluate_path_pattern(&evaluator, &missing)?.is_null());
        Ok(())
    }

    #[test]
    fn depth_limit() -> Result<(), Box<dyn Error>> {
        let dataset = chain(10);
        let deadline = Deadline::never();
        let path = PropertyPathExpression::OneOrMore(Box::new(p("p")));
        let bounded = PathEvaluator::new(&dataset, None, Some(3), &deadline);
        assert!(matches!(
            bounded.eval_from(&path, &t("0")),
            Err(QueryEvaluationError::PathDepthExceeded(3))
        ));
        assert_eq!(bounded.eval_from(&path, &t("7"))?.len(), 3);
        let unbounded = PathEvaluator::new(&dataset, None, None, &deadline);
        assert_eq!(unbounded.eval_from(&path, &t("0"))?.len(), 10);
        Ok(())
    }
}
