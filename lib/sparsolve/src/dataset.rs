use crate::error::QueryEvaluationError;
use oxrdf::{
    BlankNode, Dataset, GraphName, GraphNameRef, Literal, NamedNode, QuadRef, SubjectRef,
    Term, TermRef,
};
use oxsdatatypes::{Boolean, DateTime, Decimal, Double, Float, Integer};
use rustc_hash::FxHashSet;
use std::convert::Infallible;
use std::error::Error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::empty;
use std::mem::discriminant;

/// A [RDF dataset](https://www.w3.org/TR/sparql11-query/#rdfDataset) that can be queried by the
/// evaluator
///
/// The evaluator only reads from the dataset. Index selection is left to the implementation.
pub trait QueryableDataset {
    /// Error returned by the dataset.
    type Error: Error + Send + Sync + 'static;

    /// Fetches quads according to a pattern
    ///
    /// For `graph_name`, `None` matches all the named graphs, `Some(None)` encodes the default
    /// graph
    /// and `Some(Some(_))` a named graph
    fn quads_for_pattern<'a>(
        &'a self,
        subject: Option<&'a Term>,
        predicate: Option<&'a Term>,
        object: Option<&'a Term>,
        graph_name: Option<Option<&'a Term>>,
    ) -> Box<dyn Iterator<Item = Result<DatasetQuad, Self::Error>> + 'a>;

    /// Fetches the list of dataset named graphs, in the order they are first seen
    fn named_graphs(&self) -> Result<Vec<Term>, Self::Error> {
        let mut seen = FxHashSet::default();
        let mut graph_names = Vec::new();
        for quad in self.quads_for_pattern(None, None, None, None) {
            if let Some(graph_name) = quad?.graph_name {
                if seen.insert(graph_name.clone()) {
                    graph_names.push(graph_name);
                }
            }
        }
        Ok(graph_names)
    }

    /// Returns if the dataset contains a given named graph
    fn contains_graph_name(&self, graph_name: &Term) -> Result<bool, Self::Error> {
        Ok(self
            .quads_for_pattern(None, None, None, Some(Some(graph_name)))
            .next()
            .transpose()?
            .is_some())
    }
}

impl<D: QueryableDataset + ?Sized> QueryableDataset for &D {
    type Error = D::Error;

    fn quads_for_pattern<'a>(
        &'a self,
        subject: Option<&'a Term>,
        predicate: Option<&'a Term>,
        object: Option<&'a Term>,
        graph_name: Option<Option<&'a Term>>,
    ) -> Box<dyn Iterator<Item = Result<DatasetQuad, D::Error>> + 'a> {
        (**self).quads_for_pattern(subject, predicate, object, graph_name)
    }

    fn named_graphs(&self) -> Result<Vec<Term>, D::Error> {
        (**self).named_graphs()
    }

    fn contains_graph_name(&self, graph_name: &Term) -> Result<bool, D::Error> {
        (**self).contains_graph_name(graph_name)
    }
}

impl QueryableDataset for Dataset {
    type Error = Infallible;

    fn quads_for_pattern<'a>(
        &'a self,
        subject: Option<&'a Term>,
        predicate: Option<&'a Term>,
        object: Option<&'a Term>,
        graph_name: Option<Option<&'a Term>>,
    ) -> Box<dyn Iterator<Item = Result<DatasetQuad, Infallible>> + 'a> {
        #[expect(clippy::unnecessary_wraps)]
        fn quad_to_result(quad: QuadRef<'_>) -> Result<DatasetQuad, Infallible> {
            Ok(DatasetQuad {
                subject: quad.subject.into_owned().into(),
                predicate: quad.predicate.into_owned().into(),
                object: quad.object.into_owned(),
                graph_name: match quad.graph_name {
                    GraphNameRef::NamedNode(g) => Some(g.into_owned().into()),
                    GraphNameRef::BlankNode(g) => Some(g.into_owned().into()),
                    GraphNameRef::DefaultGraph => None,
                },
            })
        }

        let graph_name = match graph_name {
            Some(Some(Term::NamedNode(g))) => Some(GraphName::NamedNode(g.clone())),
            Some(Some(Term::BlankNode(g))) => Some(GraphName::BlankNode(g.clone())),
            Some(Some(_)) => return Box::new(empty()),
            Some(None) => Some(GraphName::DefaultGraph),
            None => None,
        };
        let predicate = match predicate {
            Some(Term::NamedNode(p)) => Some(p),
            Some(_) => return Box::new(empty()),
            None => None,
        };
        let in_graph = move |q: &QuadRef<'_>| {
            graph_name.as_ref().map_or_else(
                || !q.graph_name.is_default_graph(),
                |g| g.as_ref() == q.graph_name,
            )
        };

        if let Some(subject) = subject {
            let subject = match subject {
                Term::NamedNode(s) => SubjectRef::from(s.as_ref()),
                Term::BlankNode(s) => s.as_ref().into(),
                Term::Literal(_) => return Box::new(empty()),
            };
            Box::new(
                self.quads_for_subject(subject)
                    .filter(move |q| {
                        predicate.is_none_or(|p| p.as_ref() == q.predicate)
                            && object.is_none_or(|o| TermRef::from(o) == q.object)
                            && in_graph(q)
                    })
                    .map(quad_to_result),
            )
        } else if let Some(object) = object {
            Box::new(
                self.quads_for_object(object)
                    .filter(move |q| {
                        predicate.is_none_or(|p| p.as_ref() == q.predicate) && in_graph(q)
                    })
                    .map(quad_to_result),
            )
        } else if let Some(predicate) = predicate {
            Box::new(
                self.quads_for_predicate(predicate)
                    .filter(in_graph)
                    .map(quad_to_result),
            )
        } else {
            Box::new(self.iter().filter(in_graph).map(quad_to_result))
        }
    }
}

/// A quad returned by a [`QueryableDataset`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetQuad {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    /// `None` if the quad is in the default graph
    pub graph_name: Option<Term>,
}

pub(crate) fn dataset_error(error: impl Error + Send + Sync + 'static) -> QueryEvaluationError {
    QueryEvaluationError::Dataset(Box::new(error))
}

/// A term as understood by the expression evaluator
#[derive(Clone, Debug)]
pub enum ExpressionTerm {
    NamedNode(NamedNode),
    BlankNode(BlankNode),
    StringLiteral(String),
    LangStringLiteral {
        value: String,
        language: String,
    },
    BooleanLiteral(Boolean),
    IntegerLiteral(Integer),
    DecimalLiteral(Decimal),
    FloatLiteral(Float),
    DoubleLiteral(Double),
    DateTimeLiteral(DateTime),
    OtherTypedLiteral {
        value: String,
        datatype: NamedNode,
    },
}

impl PartialEq for ExpressionTerm {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NamedNode(l), Self::NamedNode(r)) => l == r,
            (Self::BlankNode(l), Self::BlankNode(r)) => l == r,
            (Self::StringLiteral(l), Self::StringLiteral(r)) => l == r,
            (
                Self::LangStringLiteral {
                    value: lv,
                    language: ll,
                },
                Self::LangStringLiteral {
                    value: rv,
                    language: rl,
                },
            ) => lv == rv && ll == rl,
            (Self::BooleanLiteral(l), Self::BooleanLiteral(r)) => l == r,
            (Self::IntegerLiteral(l), Self::IntegerLiteral(r)) => l == r,
            (Self::DecimalLiteral(l), Self::DecimalLiteral(r)) => l == r,
            (Self::FloatLiteral(l), Self::FloatLiteral(r)) => l.to_be_bytes() == r.to_be_bytes(),
            (Self::DoubleLiteral(l), Self::DoubleLiteral(r)) => l.to_be_bytes() == r.to_be_bytes(),
            (Self::DateTimeLiteral(l), Self::DateTimeLiteral(r)) => l == r,
            (
                Self::OtherTypedLiteral {
                    value: lv,
                    datatype: ld,
                },
                Self::OtherTypedLiteral {
                    value: rv,
                    datatype: rd,
                },
            ) => lv == rv && ld == rd,
            (_, _) => false,
        }
    }
}

impl Eq for ExpressionTerm {}

impl Hash for ExpressionTerm {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        discriminant(self).hash(state);
        match self {
            Self::NamedNode(v) => v.hash(state),
            Self::BlankNode(v) => v.hash(state),
            Self::StringLiteral(v) => v.hash(state),
            Self::LangStringLiteral { value, language } => (value, language).hash(state),
            Self::BooleanLiteral(v) => v.hash(state),
            Self::IntegerLiteral(v) => v.hash(state),
            Self::DecimalLiteral(v) => v.hash(state),
            Self::FloatLiteral(v) => v.to_be_bytes().hash(state),
            Self::DoubleLiteral(v) => v.to_be_bytes().hash(state),
            Self::DateTimeLiteral(v) => v.hash(state),
            Self::OtherTypedLiteral { value, datatype } => (value, datatype).hash(state),
        }
    }
}

impl From<Term> for ExpressionTerm {
    #[inline]
    fn from(term: Term) -> Self {
        match term {
            Term::NamedNode(t) => Self::NamedNode(t),
            Term::BlankNode(t) => Self::BlankNode(t),
            Term::Literal(t) => {
                let (value, datatype, language) = t.destruct();
                if let Some(language) = language {
                    Self::LangStringLiteral { value, language }
                } else if let Some(datatype) = datatype {
                    parse_typed_literal(&value, datatype.as_str())
                        .unwrap_or(Self::OtherTypedLiteral { value, datatype })
                } else {
                    Self::StringLiteral(value)
                }
            }
        }
    }
}

impl From<ExpressionTerm> for Term {
    #[inline]
    fn from(term: ExpressionTerm) -> Self {
        match term {
            ExpressionTerm::NamedNode(t) => t.into(),
            ExpressionTerm::BlankNode(t) => t.into(),
            ExpressionTerm::StringLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::LangStringLiteral { value, language } => {
                Literal::new_language_tagged_literal_unchecked(value, language).into()
            }
            ExpressionTerm::BooleanLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::IntegerLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::DecimalLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::FloatLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::DoubleLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::DateTimeLiteral(value) => Literal::from(value).into(),
            ExpressionTerm::OtherTypedLiteral { value, datatype } => {
                Literal::new_typed_literal(value, datatype).into()
            }
        }
    }
}

impl fmt::Display for ExpressionTerm {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Term::from(self.clone()).fmt(f)
    }
}

impl From<NamedNode> for ExpressionTerm {
    #[inline]
    fn from(term: NamedNode) -> Self {
        Self::NamedNode(term)
    }
}

impl From<bool> for ExpressionTerm {
    #[inline]
    fn from(value: bool) -> Self {
        Self::BooleanLiteral(value.into())
    }
}

impl ExpressionTerm {
    /// Computes the term [Effective boolean value](https://www.w3.org/TR/sparql11-query/#ebv)
    pub fn effective_boolean_value(&self) -> Option<bool> {
        match self {
            Self::BooleanLiteral(value) => Some((*value).into()),
            Self::StringLiteral(value) => Some(!value.is_empty()),
            Self::FloatLiteral(value) => Some(Boolean::from(*value).into()),
            Self::DoubleLiteral(value) => Some(Boolean::from(*value).into()),
            Self::IntegerLiteral(value) => Some(Boolean::from(*value).into()),
            Self::DecimalLiteral(value) => Some(Boolean::from(*value).into()),
            _ => None,
        }
    }

    pub(crate) fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::IntegerLiteral(_)
                | Self::DecimalLiteral(_)
                | Self::FloatLiteral(_)
                | Self::DoubleLiteral(_)
        )
    }
}

pub(crate) fn parse_typed_literal(value: &str, datatype: &str) -> Option<ExpressionTerm> {
    Some(match datatype {
        "http://www.w3.org/2001/XMLSchema#boolean" => {
            ExpressionTerm::BooleanLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#string" => ExpressionTerm::StringLiteral(value.into()),
        "http://www.w3.org/2001/XMLSchema#float" => {
            ExpressionTerm::FloatLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#double" => {
            ExpressionTerm::DoubleLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#decimal" => {
            ExpressionTerm::DecimalLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#integer"
        | "http://www.w3.org/2001/XMLSchema#byte"
        | "http://www.w3.org/2001/XMLSchema#short"
        | "http://www.w3.org/2001/XMLSchema#int"
        | "http://www.w3.org/2001/XMLSchema#long"
        | "http://www.w3.org/2001/XMLSchema#unsignedByte"
        | "http://www.w3.org/2001/XMLSchema#unsignedShort"
        | "http://www.w3.org/2001/XMLSchema#unsignedInt"
        | "http://www.w3.org/2001/XMLSchema#unsignedLong"
        | "http://www.w3.org/2001/XMLSchema#positiveInteger"
        | "http://www.w3.org/2001/XMLSchema#negativeInteger"
        | "http://www.w3.org/2001/XMLSchema#nonPositiveInteger"
        | "http://www.w3.org/2001/XMLSchema#nonNegativeInteger" => {
            ExpressionTerm::IntegerLiteral(value.parse().ok()?)
        }
        "http://www.w3.org/2001/XMLSchema#dateTime"
        | "http://www.w3.org/2001/XMLSchema#dateTimeStamp" => {
            ExpressionTerm::DateTimeLiteral(value.parse().ok()?)
        }
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::Quad;
    use std::error::Error;

    fn ex(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{name}"))
    }

    fn dataset() -> Dataset {
        let mut dataset = Dataset::new();
        dataset.insert(&Quad::new(ex("a"), ex("p"), ex("b"), GraphName::DefaultGraph));
        dataset.insert(&Quad::new(ex("a"), ex("q"), ex("c"), GraphName::DefaultGraph));
        dataset.insert(&Quad::new(ex("b"), ex("p"), ex("c"), ex("g1")));
        dataset.insert(&Quad::new(ex("c"), ex("p"), ex("a"), ex("g2")));
        dataset
    }

    #[test]
    fn default_graph_by_subject() -> Result<(), Box<dyn Error>> {
        let dataset = dataset();
        let quads = dataset
            .quads_for_pattern(Some(&ex("a").into()), None, None, Some(None))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(quads.len(), 2);
        assert!(quads.iter().all(|q| q.graph_name.is_none()));
        Ok(())
    }

    #[test]
    fn named_graphs_by_predicate() -> Result<(), Box<dyn Error>> {
        let dataset = dataset();
        let quads = dataset
            .quads_for_pattern(None, Some(&ex("p").into()), None, None)
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(quads.len(), 2);
        assert!(quads.iter().all(|q| q.graph_name.is_some()));
        Ok(())
    }

    #[test]
    fn fixed_named_graph_by_object() -> Result<(), Box<dyn Error>> {
        let dataset = dataset();
        let g1 = Term::from(ex("g1"));
        let quads = dataset
            .quads_for_pattern(None, None, Some(&ex("c").into()), Some(Some(&g1)))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(
            quads,
            [DatasetQuad {
                subject: ex("b").into(),
                predicate: ex("p").into(),
                object: ex("c").into(),
                graph_name: Some(g1),
            }]
        );
        Ok(())
    }

    #[test]
    fn literal_subject_matches_nothing() {
        let dataset = dataset();
        assert_eq!(
            dataset
                .quads_for_pattern(Some(&Literal::from(1).into()), None, None, Some(None))
                .count(),
            0
        );
    }

    #[test]
    fn named_graph_listing() -> Result<(), Box<dyn Error>> {
        let dataset = dataset();
        let mut graphs = dataset.named_graphs()?;
        graphs.sort_by_key(ToString::to_string);
        assert_eq!(graphs, [Term::from(ex("g1")), Term::from(ex("g2"))]);
        assert!(dataset.contains_graph_name(&ex("g2").into())?);
        assert!(!dataset.contains_graph_name(&ex("g3").into())?);
        Ok(())
    }

    #[test]
    fn typed_literal_parsing() {
        assert_eq!(
            ExpressionTerm::from(Term::from(Literal::from(1))),
            ExpressionTerm::IntegerLiteral(1.into())
        );
        assert_eq!(
            ExpressionTerm::from(Term::from(Literal::new_typed_literal(
                "foo",
                NamedNode::new_unchecked("http://www.w3.org/2001/XMLSchema#integer")
            ))),
            ExpressionTerm::OtherTypedLiteral {
                value: "foo".into(),
                datatype: NamedNode::new_unchecked("http://www.w3.org/2001/XMLSchema#integer")
            }
        );
        assert_eq!(
            ExpressionTerm::from(Term::from(Literal::new_simple_literal("")))
                .effective_boolean_value(),
            Some(false)
        );
        assert_eq!(
            ExpressionTerm::NamedNode(ex("a")).effective_boolean_value(),
            None
        );
    }
}
