//! The closed algebra evaluated by [`QueryEvaluator`](crate::QueryEvaluator) and its construction
//! from [`spargebra`] graph patterns.

use crate::error::QueryEvaluationError;
use crate::pattern::{PathPattern, PatternTerm, TriplePattern};
use crate::solution::temporary_variable;
use oxrdf::{NamedNode, Term, Variable};
use rustc_hash::FxHashSet;
use spargebra::algebra::{
    AggregateExpression, Expression, GraphPattern, OrderExpression, PropertyPathExpression,
};
use spargebra::term::{GroundTerm, NamedNodePattern, TermPattern};

/// An item of a basic graph pattern
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum BgpPattern {
    Triple(TriplePattern),
    Path(PathPattern),
    /// Keeps the running solutions for which the expression is true
    Filter(Expression),
    /// Binds a variable that must not be bound yet
    Bind {
        variable: Variable,
        expression: Expression,
    },
    /// Binds a variable or checks the value it is already bound to
    Let {
        variable: Variable,
        expression: Expression,
    },
    /// A nested algebra joined with the running solutions
    SubQuery(Box<Algebra>),
    /// A predicate computed by a registered [`PropertyFunction`](crate::PropertyFunction)
    PropertyFunction {
        function: NamedNode,
        subject: PatternTerm,
        object: PatternTerm,
    },
}

impl BgpPattern {
    /// Returns `true` for the items that produce solutions from the dataset
    #[inline]
    pub fn is_match(&self) -> bool {
        !matches!(
            self,
            Self::Filter(_) | Self::Bind { .. } | Self::Let { .. }
        )
    }
}

/// A node of the evaluated algebra
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Algebra {
    /// A basic graph pattern, evaluated as a left to right fold
    Bgp(Vec<BgpPattern>),
    Join {
        left: Box<Self>,
        right: Box<Self>,
    },
    Union {
        left: Box<Self>,
        right: Box<Self>,
    },
    /// Optional pattern, with the filter of the `OPTIONAL` block if any
    LeftJoin {
        left: Box<Self>,
        right: Box<Self>,
        expression: Option<Expression>,
    },
    Minus {
        left: Box<Self>,
        right: Box<Self>,
    },
    Filter {
        expression: Expression,
        inner: Box<Self>,
    },
    Extend {
        inner: Box<Self>,
        variable: Variable,
        expression: Expression,
    },
    /// Evaluates the inner algebra inside a named graph
    Graph {
        name: NamedNodePattern,
        inner: Box<Self>,
    },
    /// Inline data. `None` values are unbound.
    Values {
        variables: Vec<Variable>,
        bindings: Vec<Vec<Option<Term>>>,
    },
    OrderBy {
        inner: Box<Self>,
        expression: Vec<OrderExpression>,
    },
    Project {
        inner: Box<Self>,
        variables: Vec<Variable>,
    },
    Distinct {
        inner: Box<Self>,
    },
    Reduced {
        inner: Box<Self>,
    },
    Slice {
        inner: Box<Self>,
        start: usize,
        length: Option<usize>,
    },
    /// Groups the solutions on the values of `variables` and binds the aggregates of each group
    Group {
        inner: Box<Self>,
        variables: Vec<Variable>,
        aggregates: Vec<(Variable, AggregateExpression)>,
    },
}

impl Algebra {
    /// Converts a [`spargebra`] graph pattern without registered property functions.
    ///
    /// ```
    /// use sparsolve::{Algebra, BgpPattern};
    /// use spargebra::Query;
    ///
    /// let query = Query::parse("SELECT * WHERE { ?s ?p ?o . ?o ?p2 [] }", None)?;
    /// let Query::Select { pattern, .. } = query else {
    ///     unreachable!()
    /// };
    /// let Algebra::Project { inner, .. } = Algebra::from_graph_pattern(&pattern)? else {
    ///     unreachable!()
    /// };
    /// let Algebra::Bgp(items) = *inner else {
    ///     unreachable!()
    /// };
    /// assert_eq!(items.len(), 2);
    /// assert!(items.iter().all(BgpPattern::is_match));
    /// # Result::<_, Box<dyn std::error::Error>>::Ok(())
    /// ```
    pub fn from_graph_pattern(pattern: &GraphPattern) -> Result<Self, QueryEvaluationError> {
        AlgebraBuilder::new().build(pattern)
    }

    /// The empty basic graph pattern
    #[inline]
    pub fn identity() -> Self {
        Self::Bgp(Vec::new())
    }
}

/// Builds an [`Algebra`] from a [`spargebra`] graph pattern.
///
/// Blank nodes of the patterns become temporary variables and joins of basic graph patterns are
/// merged into a single one. Triple patterns whose predicate is a registered property function
/// become [`BgpPattern::PropertyFunction`] items.
#[derive(Default, Clone)]
pub struct AlgebraBuilder {
    property_functions: FxHashSet<NamedNode>,
}

impl AlgebraBuilder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_property_function(mut self, name: NamedNode) -> Self {
        self.property_functions.insert(name);
        self
    }

    pub fn build(&self, pattern: &GraphPattern) -> Result<Algebra, QueryEvaluationError> {
        Ok(match pattern {
            GraphPattern::Bgp { patterns } => Algebra::Bgp(
                patterns
                    .iter()
                    .map(|pattern| {
                        self.bgp_item(
                            pattern_term(&pattern.subject),
                            &pattern.predicate,
                            pattern_term(&pattern.object),
                        )
                    })
                    .collect(),
            ),
            GraphPattern::Path {
                subject,
                path,
                object,
            } => {
                if let PropertyPathExpression::NamedNode(predicate) = path {
                    Algebra::Bgp(vec![self.bgp_item(
                        pattern_term(subject),
                        &NamedNodePattern::NamedNode(predicate.clone()),
                        pattern_term(object),
                    )])
                } else {
                    Algebra::Bgp(vec![BgpPattern::Path(PathPattern {
                        subject: pattern_term(subject),
                        path: path.clone(),
                        object: pattern_term(object),
                    })])
                }
            }
            GraphPattern::Join { left, right } => {
                match (into_bgp(self.build(left)?), into_bgp(self.build(right)?)) {
                    (Ok(items), other) | (other, Ok(items)) if items.is_empty() => {
                        other.map_or_else(|algebra| algebra, Algebra::Bgp)
                    }
                    (Ok(mut left), Ok(right)) => {
                        left.extend(right);
                        Algebra::Bgp(left)
                    }
                    (left, right) => Algebra::Join {
                        left: Box::new(left.map_or_else(|algebra| algebra, Algebra::Bgp)),
                        right: Box::new(right.map_or_else(|algebra| algebra, Algebra::Bgp)),
                    },
                }
            }
            GraphPattern::LeftJoin {
                left,
                right,
                expression,
            } => Algebra::LeftJoin {
                left: Box::new(self.build(left)?),
                right: Box::new(self.build(right)?),
                expression: expression.clone(),
            },
            GraphPattern::Filter { expr, inner } => Algebra::Filter {
                expression: expr.clone(),
                inner: Box::new(self.build(inner)?),
            },
            GraphPattern::Union { left, right } => Algebra::Union {
                left: Box::new(self.build(left)?),
                right: Box::new(self.build(right)?),
            },
            GraphPattern::Graph { name, inner } => Algebra::Graph {
                name: name.clone(),
                inner: Box::new(self.build(inner)?),
            },
            GraphPattern::Extend {
                inner,
                variable,
                expression,
            } => Algebra::Extend {
                inner: Box::new(self.build(inner)?),
                variable: variable.clone(),
                expression: expression.clone(),
            },
            GraphPattern::Minus { left, right } => Algebra::Minus {
                left: Box::new(self.build(left)?),
                right: Box::new(self.build(right)?),
            },
            GraphPattern::Values {
                variables,
                bindings,
            } => Algebra::Values {
                variables: variables.clone(),
                bindings: bindings
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|value| value.clone().map(ground_term))
                            .collect()
                    })
                    .collect(),
            },
            GraphPattern::OrderBy { inner, expression } => Algebra::OrderBy {
                inner: Box::new(self.build(inner)?),
                expression: expression.clone(),
            },
            GraphPattern::Project { inner, variables } => Algebra::Project {
                inner: Box::new(self.build(inner)?),
                variables: variables.clone(),
            },
            GraphPattern::Distinct { inner } => Algebra::Distinct {
                inner: Box::new(self.build(inner)?),
            },
            GraphPattern::Reduced { inner } => Algebra::Reduced {
                inner: Box::new(self.build(inner)?),
            },
            GraphPattern::Slice {
                inner,
                start,
                length,
            } => Algebra::Slice {
                inner: Box::new(self.build(inner)?),
                start: *start,
                length: *length,
            },
            GraphPattern::Group {
                inner,
                variables,
                aggregates,
            } => Algebra::Group {
                inner: Box::new(self.build(inner)?),
                variables: variables.clone(),
                aggregates: aggregates.clone(),
            },
            GraphPattern::Service { .. } => {
                return Err(QueryEvaluationError::UnsupportedGraphPattern(
                    "SERVICE".into(),
                ));
            }
        })
    }

    fn bgp_item(
        &self,
        subject: PatternTerm,
        predicate: &NamedNodePattern,
        object: PatternTerm,
    ) -> BgpPattern {
        match predicate {
            NamedNodePattern::NamedNode(p) if self.property_functions.contains(p) => {
                BgpPattern::PropertyFunction {
                    function: p.clone(),
                    subject,
                    object,
                }
            }
            NamedNodePattern::NamedNode(p) => {
                BgpPattern::Triple(TriplePattern::new(subject, p.clone(), object))
            }
            NamedNodePattern::Variable(v) => {
                BgpPattern::Triple(TriplePattern::new(subject, v.clone(), object))
            }
        }
    }
}

/// The items of a basic graph pattern, the algebra itself otherwise
fn into_bgp(algebra: Algebra) -> Result<Vec<BgpPattern>, Algebra> {
    match algebra {
        Algebra::Bgp(items) => Ok(items),
        algebra => Err(algebra),
    }
}

fn pattern_term(term: &TermPattern) -> PatternTerm {
    match term {
        TermPattern::NamedNode(node) => node.clone().into(),
        TermPattern::BlankNode(node) => temporary_variable(node.as_str()).into(),
        TermPattern::Literal(literal) => literal.clone().into(),
        TermPattern::Variable(variable) => variable.clone().into(),
    }
}

fn ground_term(term: GroundTerm) -> Term {
    match term {
        GroundTerm::NamedNode(node) => node.into(),
        GroundTerm::Literal(literal) => literal.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution::is_temporary_variable;
    use spargebra::Query;
    use std::error::Error;

    fn where_clause(query: &str) -> Result<GraphPattern, Box<dyn Error>> {
        let Query::Select { pattern, .. } = Query::parse(query, None)? else {
            return Err("not a SELECT query".into());
        };
        let GraphPattern::Project { inner, .. } = pattern else {
            return Err("not a projection".into());
        };
        Ok(*inner)
    }

    #[test]
    fn blank_nodes_become_temporary_variables() -> Result<(), Box<dyn Error>> {
        let algebra = Algebra::from_graph_pattern(&where_clause(
            "SELECT * WHERE { ?s <http://example.com/p> [] }",
        )?)?;
        let Algebra::Bgp(items) = algebra else {
            return Err("not a BGP".into());
        };
        let [BgpPattern::Triple(triple)] = items.as_slice() else {
            return Err("not a single triple".into());
        };
        assert!(
            triple
                .object
                .as_variable()
                .is_some_and(is_temporary_variable)
        );
        Ok(())
    }

    #[test]
    fn simple_paths_are_triples() -> Result<(), Box<dyn Error>> {
        let algebra = Algebra::from_graph_pattern(&where_clause(
            "SELECT * WHERE { ?s <http://example.com/p>+ ?o . ?o ^<http://example.com/p> ?t }",
        )?)?;
        let Algebra::Bgp(items) = algebra else {
            return Err("not a BGP".into());
        };
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], BgpPattern::Path(_)));
        Ok(())
    }

    #[test]
    fn registered_property_function() -> Result<(), Box<dyn Error>> {
        let function = NamedNode::new("http://example.com/split")?;
        let algebra = AlgebraBuilder::new()
            .with_property_function(function.clone())
            .build(&where_clause(
                "SELECT * WHERE { ?s <http://example.com/p> ?o . \
                 ?o <http://example.com/split> ?part }",
            )?)?;
        let Algebra::Bgp(items) = algebra else {
            return Err("not a BGP".into());
        };
        assert!(matches!(
            &items[1],
            BgpPattern::PropertyFunction { function: f, .. } if *f == function
        ));
        Ok(())
    }

    #[test]
    fn optional_and_union_nodes() -> Result<(), Box<dyn Error>> {
        let algebra = Algebra::from_graph_pattern(&where_clause(
            "SELECT * WHERE { { ?s <http://example.com/a> ?o } \
             UNION { ?s <http://example.com/b> ?o } \
             OPTIONAL { ?o <http://example.com/c> ?c } }",
        )?)?;
        let Algebra::LeftJoin { left, .. } = algebra else {
            return Err("not a left join".into());
        };
        assert!(matches!(*left, Algebra::Union { .. }));
        Ok(())
    }

    #[test]
    fn group_node() -> Result<(), Box<dyn Error>> {
        let Query::Select { pattern, .. } = Query::parse(
            "SELECT ?s (COUNT(*) AS ?c) WHERE { ?s ?p ?o } GROUP BY ?s",
            None,
        )?
        else {
            return Err("not a SELECT query".into());
        };
        let Algebra::Project { inner, .. } = Algebra::from_graph_pattern(&pattern)? else {
            return Err("not a projection".into());
        };
        let Algebra::Extend { inner, .. } = *inner else {
            return Err("not an extension".into());
        };
        let Algebra::Group {
            variables,
            aggregates,
            ..
        } = *inner
        else {
            return Err("not a group".into());
        };
        assert_eq!(variables, [Variable::new("s")?]);
        assert!(matches!(
            aggregates.as_slice(),
            [(_, AggregateExpression::CountSolutions { distinct: false })]
        ));
        Ok(())
    }

    #[test]
    fn service_is_unsupported() -> Result<(), Box<dyn Error>> {
        let pattern =
            where_clause("SELECT * WHERE { SERVICE <http://example.com/s> { ?s ?p ?o } }")?;
        assert!(matches!(
            Algebra::from_graph_pattern(&pattern),
            Err(QueryEvaluationError::UnsupportedGraphPattern(_))
        ));
        Ok(())
    }
}
