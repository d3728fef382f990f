use crate::dataset::ExpressionTerm;
use crate::error::QueryEvaluationError;
use crate::expression::{
    build_plain_literal, cmp_terms, numeric_add, numeric_divide, to_string_and_language,
};
use crate::solution::Solution;
use oxrdf::{Term, Variable};
use oxsdatatypes::Integer;
use rustc_hash::FxHashSet;
use spargebra::algebra::{AggregateExpression, AggregateFunction, Expression};
use std::cmp::Ordering;

/// The expression evaluated on each solution of a group, `None` for `COUNT(*)`
pub(crate) fn aggregated_expression(aggregate: &AggregateExpression) -> Option<&Expression> {
    match aggregate {
        AggregateExpression::CountSolutions { .. } => None,
        AggregateExpression::FunctionCall { expr, .. } => Some(expr),
    }
}

/// The running value of an aggregate over the solutions of a group.
///
/// `DISTINCT` aggregates keep the values they have already seen.
pub(crate) enum AggregateState {
    CountSolutions {
        seen: Option<FxHashSet<Vec<(Variable, Term)>>>,
        count: i64,
    },
    Count {
        seen: Option<FxHashSet<ExpressionTerm>>,
        count: i64,
    },
    Sample(Option<ExpressionTerm>),
    /// The accumulator is dropped on the first expression error
    Expression {
        seen: Option<FxHashSet<ExpressionTerm>>,
        accumulator: Option<Box<dyn Accumulator>>,
    },
}

impl AggregateState {
    pub fn new(aggregate: &AggregateExpression) -> Result<Self, QueryEvaluationError> {
        let (name, distinct) = match aggregate {
            AggregateExpression::CountSolutions { distinct } => {
                return Ok(Self::CountSolutions {
                    seen: distinct.then(FxHashSet::default),
                    count: 0,
                });
            }
            AggregateExpression::FunctionCall { name, distinct, .. } => (name, *distinct),
        };
        let seen = distinct.then(FxHashSet::default);
        let accumulator: Box<dyn Accumulator> = match name {
            AggregateFunction::Count => return Ok(Self::Count { seen, count: 0 }),
            AggregateFunction::Sample => return Ok(Self::Sample(None)),
            AggregateFunction::Sum => Box::new(SumAccumulator::default()),
            AggregateFunction::Avg => Box::new(AvgAccumulator::default()),
            AggregateFunction::Min => Box::new(MinAccumulator::default()),
            AggregateFunction::Max => Box::new(MaxAccumulator::default()),
            AggregateFunction::GroupConcat { separator } => Box::new(GroupConcatAccumulator::new(
                separator.as_deref().unwrap_or(" "),
            )),
            AggregateFunction::Custom(name) => {
                return Err(QueryEvaluationError::UnsupportedFunction(name.clone()));
            }
        };
        Ok(Self::Expression {
            seen,
            accumulator: Some(accumulator),
        })
    }

    /// Adds a solution of the group.
    ///
    /// `value` is the value of the [aggregated expression](aggregated_expression) for the
    /// solution, `None` if its evaluation failed.
    pub fn add(&mut self, solution: &Solution, value: Option<ExpressionTerm>) {
        match self {
            Self::CountSolutions { seen, count } => {
                if let Some(seen) = seen {
                    let mut bindings = solution.iter().collect::<Vec<_>>();
                    bindings.sort_unstable_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));
                    if !seen.insert(bindings) {
                        return;
                    }
                }
                *count += 1;
            }
            Self::Count { seen, count } => {
                let Some(value) = value else {
                    return;
                };
                if let Some(seen) = seen {
                    if !seen.insert(value) {
                        return;
                    }
                }
                *count += 1;
            }
            Self::Sample(sample) => {
                if sample.is_none() {
                    *sample = value;
                }
            }
            Self::Expression { seen, accumulator } => {
                if accumulator.is_none() {
                    return; // Already failed
                }
                let Some(value) = value else {
                    *accumulator = None;
                    return;
                };
                if let Some(seen) = seen {
                    if !seen.insert(value.clone()) {
                        return;
                    }
                }
                if let Some(accumulator) = accumulator {
                    accumulator.add(value);
                }
            }
        }
    }

    /// The value of the aggregate, `None` if it is unbound
    pub fn finish(self) -> Option<ExpressionTerm> {
        match self {
            Self::CountSolutions { count, .. } | Self::Count { count, .. } => {
                Some(ExpressionTerm::IntegerLiteral(count.into()))
            }
            Self::Sample(value) => value,
            Self::Expression { accumulator, .. } => accumulator?.finish(),
        }
    }
}

pub(crate) trait Accumulator {
    fn add(&mut self, element: ExpressionTerm);

    fn finish(&mut self) -> Option<ExpressionTerm>;
}

/// `None` once a non numeric value or an overflow is met
struct SumAccumulator {
    sum: Option<ExpressionTerm>,
}

impl Default for SumAccumulator {
    fn default() -> Self {
        Self {
            sum: Some(ExpressionTerm::IntegerLiteral(Integer::default())),
        }
    }
}

impl Accumulator for SumAccumulator {
    fn add(&mut self, element: ExpressionTerm) {
        self.sum = self.sum.as_ref().and_then(|sum| numeric_add(sum, &element));
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        self.sum.take()
    }
}

#[derive(Default)]
struct AvgAccumulator {
    sum: SumAccumulator,
    count: i64,
}

impl Accumulator for AvgAccumulator {
    fn add(&mut self, element: ExpressionTerm) {
        self.sum.add(element);
        self.count += 1;
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        let sum = self.sum.finish()?;
        if self.count == 0 {
            return Some(ExpressionTerm::IntegerLiteral(Integer::default()));
        }
        numeric_divide(&sum, &ExpressionTerm::IntegerLiteral(self.count.into()))
    }
}

#[derive(Default)]
struct MinAccumulator {
    min: Option<ExpressionTerm>,
}

impl Accumulator for MinAccumulator {
    fn add(&mut self, element: ExpressionTerm) {
        if self.min.is_none() || cmp_terms(Some(&element), self.min.as_ref()) == Ordering::Less {
            self.min = Some(element);
        }
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        self.min.take()
    }
}

#[derive(Default)]
struct MaxAccumulator {
    max: Option<ExpressionTerm>,
}

impl Accumulator for MaxAccumulator {
    fn add(&mut self, element: ExpressionTerm) {
        if cmp_terms(Some(&element), self.max.as_ref()) == Ordering::Greater {
            self.max = Some(element);
        }
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        self.max.take()
    }
}

/// Keeps the language tag only if all the values share it
struct GroupConcatAccumulator {
    concat: Option<String>,
    language: Option<Option<String>>,
    separator: String,
}

impl GroupConcatAccumulator {
    fn new(separator: &str) -> Self {
        Self {
            concat: Some(String::new()),
            language: None,
            separator: separator.into(),
        }
    }
}

impl Accumulator for GroupConcatAccumulator {
    fn add(&mut self, element: ExpressionTerm) {
        let Some(concat) = self.concat.as_mut() else {
            return;
        };
        let Some((value, element_language)) = to_string_and_language(element) else {
            self.concat = None;
            return;
        };
        if let Some(language) = &self.language {
            if *language != element_language {
                self.language = Some(None);
            }
            concat.push_str(&self.separator);
        } else {
            self.language = Some(element_language);
        }
        concat.push_str(&value);
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        self.concat
            .take()
            .map(|result| build_plain_literal(result, self.language.take().flatten()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::Literal;
    use oxsdatatypes::Decimal;
    use std::error::Error;

    fn call(name: AggregateFunction, distinct: bool) -> AggregateExpression {
        AggregateExpression::FunctionCall {
            name,
            expr: Expression::Variable(Variable::new_unchecked("x")),
            distinct,
        }
    }

    fn aggregate(
        aggregate: &AggregateExpression,
        values: impl IntoIterator<Item = Option<ExpressionTerm>>,
    ) -> Result<Option<Term>, QueryEvaluationError> {
        let mut state = AggregateState::new(aggregate)?;
        for value in values {
            state.add(&Solution::new(), value);
        }
        Ok(state.finish().map(Term::from))
    }

    fn integers(values: &[i64]) -> impl Iterator<Item = Option<ExpressionTerm>> + '_ {
        values
            .iter()
            .map(|v| Some(ExpressionTerm::IntegerLiteral((*v).into())))
    }

    #[test]
    fn numeric_aggregates() -> Result<(), Box<dyn Error>> {
        let values = [1, 2, 2, 5];
        assert_eq!(
            aggregate(&call(AggregateFunction::Sum, false), integers(&values))?,
            Some(Literal::from(10).into())
        );
        assert_eq!(
            aggregate(&call(AggregateFunction::Sum, true), integers(&values))?,
            Some(Literal::from(8).into())
        );
        assert_eq!(
            aggregate(&call(AggregateFunction::Avg, false), integers(&values))?,
            Some(Literal::from(Decimal::from(10).checked_div(4).ok_or("overflow")?).into())
        );
        assert_eq!(
            aggregate(&call(AggregateFunction::Min, false), integers(&values))?,
            Some(Literal::from(1).into())
        );
        assert_eq!(
            aggregate(&call(AggregateFunction::Max, false), integers(&values))?,
            Some(Literal::from(5).into())
        );
        Ok(())
    }

    #[test]
    fn empty_groups() -> Result<(), Box<dyn Error>> {
        assert_eq!(
            aggregate(&AggregateExpression::CountSolutions { distinct: false }, [])?,
            Some(Literal::from(0).into())
        );
        assert_eq!(
            aggregate(&call(AggregateFunction::Sum, false), [])?,
            Some(Literal::from(0).into())
        );
        assert_eq!(
            aggregate(&call(AggregateFunction::Avg, false), [])?,
            Some(Literal::from(0).into())
        );
        assert_eq!(aggregate(&call(AggregateFunction::Max, false), [])?, None);
        assert_eq!(aggregate(&call(AggregateFunction::Sample, false), [])?, None);
        Ok(())
    }

    #[test]
    fn errors_unbind_the_aggregate_but_not_the_count() -> Result<(), Box<dyn Error>> {
        let values = || integers(&[1, 2]).chain([None]);
        assert_eq!(aggregate(&call(AggregateFunction::Sum, false), values())?, None);
        assert_eq!(
            aggregate(&call(AggregateFunction::Count, false), values())?,
            Some(Literal::from(2).into())
        );
        assert_eq!(
            aggregate(&call(AggregateFunction::Sample, false), [None].into_iter().chain(values()))?,
            Some(Literal::from(1).into())
        );
        Ok(())
    }

    #[test]
    fn group_concat() -> Result<(), Box<dyn Error>> {
        let strings = || {
            ["a", "b", "a"]
                .into_iter()
                .map(|s| Some(ExpressionTerm::StringLiteral(s.into())))
        };
        assert_eq!(
            aggregate(
                &call(AggregateFunction::GroupConcat { separator: None }, false),
                strings()
            )?,
            Some(Literal::from("a b a").into())
        );
        assert_eq!(
            aggregate(
                &call(
                    AggregateFunction::GroupConcat {
                        separator: Some(", ".into())
                    },
                    true
                ),
                strings()
            )?,
            Some(Literal::from("a, b").into())
        );
        Ok(())
    }

    #[test]
    fn custom_aggregates_are_unsupported() {
        let custom = call(
            AggregateFunction::Custom(oxrdf::NamedNode::new_unchecked("http://example.com/agg")),
            false,
        );
        assert!(matches!(
            AggregateState::new(&custom),
            Err(QueryEvaluationError::UnsupportedFunction(_))
        ));
    }
}
