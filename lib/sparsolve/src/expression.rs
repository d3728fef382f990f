use crate::dataset::ExpressionTerm;
use crate::error::QueryEvaluationError;
use crate::solution::Solution;
use md5::Md5;
use oxrdf::vocab::xsd;
use oxrdf::{BlankNode, Literal, NamedNode, Term};
use oxsdatatypes::{Boolean, DateTime, Decimal, Double, Float, Integer};
use rand::random;
use regex::{Regex, RegexBuilder};
use rustc_hash::FxHashMap;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use spargebra::algebra::{Expression, Function, GraphPattern};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt::Write;
use std::sync::Arc;

/// A custom function, called with the values of its arguments. `None` is an evaluation error.
pub type CustomFunction = Arc<dyn Fn(&[Term]) -> Option<Term> + Send + Sync>;

pub type CustomFunctionRegistry = FxHashMap<NamedNode, CustomFunction>;

const REGEX_SIZE_LIMIT: usize = 1_000_000;

/// What an [`ExpressionEvaluator`] can ask to the algebra evaluator
pub trait ExpressionContext {
    /// Evaluates `EXISTS { pattern }` with the bindings of `solution`
    fn exists(
        &self,
        pattern: &GraphPattern,
        solution: &Solution,
    ) -> Result<bool, QueryEvaluationError>;

    /// The value of `NOW()`, constant during a whole evaluation
    fn now(&self) -> DateTime;
}

/// Evaluates the expressions of `FILTER`, `BIND` and the other algebra operators
pub trait ExpressionEvaluator: Send + Sync {
    /// Fails with an [expression error](QueryEvaluationError::is_expression_error) if the
    /// expression has no value for the solution.
    fn evaluate(
        &self,
        expression: &Expression,
        solution: &Solution,
        context: &dyn ExpressionContext,
    ) -> Result<ExpressionTerm, QueryEvaluationError>;

    /// Evaluates the expression and computes its [effective boolean value](https://www.w3.org/TR/sparql11-query/#ebv)
    fn effective_boolean_value(
        &self,
        expression: &Expression,
        solution: &Solution,
        context: &dyn ExpressionContext,
    ) -> Result<bool, QueryEvaluationError> {
        let value = self.evaluate(expression, solution, context)?;
        value.effective_boolean_value().ok_or_else(|| {
            QueryEvaluationError::TypeError(format!("{value} has no effective boolean value"))
        })
    }
}

/// The default [`ExpressionEvaluator`].
///
/// It implements the SPARQL 1.1 operators and functions. Function calls on an IRI are resolved
/// first against the registered custom functions, then against the XSD constructor functions.
///
/// ```
/// use oxrdf::{Literal, NamedNode, Term};
/// use sparsolve::SimpleExpressionEvaluator;
///
/// let evaluator = SimpleExpressionEvaluator::new().with_custom_function(
///     NamedNode::new("http://example.com/twice")?,
///     |args| {
///         let [Term::Literal(value)] = args else {
///             return None;
///         };
///         Some(Literal::from(value.value().repeat(2)).into())
///     },
/// );
/// # let _ = evaluator;
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone, Default)]
pub struct SimpleExpressionEvaluator {
    custom_functions: CustomFunctionRegistry,
}

impl SimpleExpressionEvaluator {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a custom SPARQL function.
    #[inline]
    #[must_use]
    pub fn with_custom_function(
        mut self,
        name: NamedNode,
        evaluator: impl Fn(&[Term]) -> Option<Term> + Send + Sync + 'static,
    ) -> Self {
        self.custom_functions.insert(name, Arc::new(evaluator));
        self
    }

    fn call(
        &self,
        function: &Function,
        args: &[Expression],
        solution: &Solution,
        context: &dyn ExpressionContext,
    ) -> Result<ExpressionTerm, QueryEvaluationError> {
        let args = args
            .iter()
            .map(|arg| self.evaluate(arg, solution, context))
            .collect::<Result<Vec<_>, _>>()?;
        if let Function::Custom(name) = function {
            return self.call_custom(name, args);
        }
        call_builtin(function, args, context).ok_or_else(|| {
            QueryEvaluationError::TypeError(format!(
                "{function} cannot be applied to the given arguments"
            ))
        })
    }

    fn call_custom(
        &self,
        name: &NamedNode,
        args: Vec<ExpressionTerm>,
    ) -> Result<ExpressionTerm, QueryEvaluationError> {
        if let Some(function) = self.custom_functions.get(name) {
            let args = args.into_iter().map(Term::from).collect::<Vec<_>>();
            return function(&args).map(Into::into).ok_or_else(|| {
                QueryEvaluationError::TypeError(format!(
                    "{name} cannot be applied to the given arguments"
                ))
            });
        }
        let cast: fn(ExpressionTerm) -> Option<ExpressionTerm> = match name.as_ref() {
            xsd::STRING => cast_to_string,
            xsd::BOOLEAN => cast_to_boolean,
            xsd::INTEGER => cast_to_integer,
            xsd::DECIMAL => cast_to_decimal,
            xsd::FLOAT => cast_to_float,
            xsd::DOUBLE => cast_to_double,
            xsd::DATE_TIME => cast_to_date_time,
            _ => return Err(QueryEvaluationError::UnsupportedFunction(name.clone())),
        };
        let Ok([arg]) = <[ExpressionTerm; 1]>::try_from(args) else {
            return Err(QueryEvaluationError::TypeError(format!(
                "{name} takes a single argument"
            )));
        };
        let message = format!("{arg} cannot be cast to {name}");
        cast(arg).ok_or(QueryEvaluationError::TypeError(message))
    }
}

impl ExpressionEvaluator for SimpleExpressionEvaluator {
    fn evaluate(
        &self,
        expression: &Expression,
        solution: &Solution,
        context: &dyn ExpressionContext,
    ) -> Result<ExpressionTerm, QueryEvaluationError> {
        let eval = |e: &Expression| self.evaluate(e, solution, context);
        let ebv = |e: &Expression| self.effective_boolean_value(e, solution, context);
        Ok(match expression {
            Expression::NamedNode(node) => ExpressionTerm::NamedNode(node.clone()),
            Expression::Literal(literal) => Term::from(literal.clone()).into(),
            Expression::Variable(variable) => solution
                .get(variable)
                .ok_or_else(|| QueryEvaluationError::UnboundVariable(variable.clone()))?
                .into(),
            Expression::Or(a, b) => or(ebv(a), || ebv(b))?.into(),
            Expression::And(a, b) => and(ebv(a), || ebv(b))?.into(),
            Expression::Equal(a, b) => {
                let (a, b) = (eval(a)?, eval(b)?);
                equals(&a, &b).ok_or_else(|| incomparable(&a, &b))?.into()
            }
            Expression::SameTerm(a, b) => (eval(a)? == eval(b)?).into(),
            Expression::Greater(a, b) => compare(&eval(a)?, &eval(b)?, Ordering::is_gt)?.into(),
            Expression::GreaterOrEqual(a, b) => {
                compare(&eval(a)?, &eval(b)?, Ordering::is_ge)?.into()
            }
            Expression::Less(a, b) => compare(&eval(a)?, &eval(b)?, Ordering::is_lt)?.into(),
            Expression::LessOrEqual(a, b) => {
                compare(&eval(a)?, &eval(b)?, Ordering::is_le)?.into()
            }
            Expression::In(a, list) => {
                let a = eval(a)?;
                let mut error = None;
                for item in list {
                    match eval(item) {
                        Ok(item) => match equals(&a, &item) {
                            Some(true) => return Ok(true.into()),
                            Some(false) => (),
                            None => error = Some(incomparable(&a, &item)),
                        },
                        Err(e) if e.is_expression_error() => error = Some(e),
                        Err(e) => return Err(e),
                    }
                }
                if let Some(error) = error {
                    return Err(error);
                }
                false.into()
            }
            Expression::Add(a, b) => arithmetic("+", &eval(a)?, &eval(b)?, add)?,
            Expression::Subtract(a, b) => arithmetic("-", &eval(a)?, &eval(b)?, subtract)?,
            Expression::Multiply(a, b) => arithmetic("*", &eval(a)?, &eval(b)?, multiply)?,
            Expression::Divide(a, b) => arithmetic("/", &eval(a)?, &eval(b)?, divide)?,
            Expression::UnaryPlus(e) => {
                let value = eval(e)?;
                if !value.is_numeric() {
                    return Err(QueryEvaluationError::TypeError(format!(
                        "{value} is not a number"
                    )));
                }
                value
            }
            Expression::UnaryMinus(e) => {
                let value = eval(e)?;
                negate(&value).ok_or_else(|| {
                    QueryEvaluationError::TypeError(format!("{value} cannot be negated"))
                })?
            }
            Expression::Not(e) => (!ebv(e)?).into(),
            Expression::Exists(pattern) => context.exists(pattern, solution)?.into(),
            Expression::Bound(variable) => solution.contains_variable(variable).into(),
            Expression::If(condition, then, otherwise) => {
                if ebv(condition)? {
                    eval(then)?
                } else {
                    eval(otherwise)?
                }
            }
            Expression::Coalesce(list) => {
                for item in list {
                    match eval(item) {
                        Ok(value) => return Ok(value),
                        Err(e) if e.is_expression_error() => (),
                        Err(e) => return Err(e),
                    }
                }
                return Err(QueryEvaluationError::TypeError(
                    "COALESCE has no argument with a value".into(),
                ));
            }
            Expression::FunctionCall(function, args) => {
                self.call(function, args, solution, context)?
            }
        })
    }
}

/// `||` with the SPARQL error handling: an error on one side is hidden by `true` on the other one
fn or(
    a: Result<bool, QueryEvaluationError>,
    b: impl FnOnce() -> Result<bool, QueryEvaluationError>,
) -> Result<bool, QueryEvaluationError> {
    match a {
        Ok(true) => Ok(true),
        Ok(false) => b(),
        Err(error) if error.is_expression_error() => {
            if b()? {
                Ok(true)
            } else {
                Err(error)
            }
        }
        Err(error) => Err(error),
    }
}

/// `&&` with the SPARQL error handling: an error on one side is hidden by `false` on the other one
fn and(
    a: Result<bool, QueryEvaluationError>,
    b: impl FnOnce() -> Result<bool, QueryEvaluationError>,
) -> Result<bool, QueryEvaluationError> {
    match a {
        Ok(false) => Ok(false),
        Ok(true) => b(),
        Err(error) if error.is_expression_error() => {
            if b()? {
                Err(error)
            } else {
                Ok(false)
            }
        }
        Err(error) => Err(error),
    }
}

fn incomparable(a: &ExpressionTerm, b: &ExpressionTerm) -> QueryEvaluationError {
    QueryEvaluationError::TypeError(format!("{a} and {b} cannot be compared"))
}

fn compare(
    a: &ExpressionTerm,
    b: &ExpressionTerm,
    accept: fn(Ordering) -> bool,
) -> Result<bool, QueryEvaluationError> {
    Ok(accept(partial_cmp(a, b).ok_or_else(|| incomparable(a, b))?))
}

fn arithmetic(
    operator: &str,
    a: &ExpressionTerm,
    b: &ExpressionTerm,
    operation: fn(NumericBinaryOperands) -> Option<ExpressionTerm>,
) -> Result<ExpressionTerm, QueryEvaluationError> {
    NumericBinaryOperands::new(a, b)
        .and_then(operation)
        .ok_or_else(|| {
            QueryEvaluationError::TypeError(format!("{a} {operator} {b} has no value"))
        })
}

/// Numeric addition for `SUM` and `AVG`
pub(crate) fn numeric_add(a: &ExpressionTerm, b: &ExpressionTerm) -> Option<ExpressionTerm> {
    NumericBinaryOperands::new(a, b).and_then(add)
}

pub(crate) fn numeric_divide(a: &ExpressionTerm, b: &ExpressionTerm) -> Option<ExpressionTerm> {
    NumericBinaryOperands::new(a, b).and_then(divide)
}

fn add(operands: NumericBinaryOperands) -> Option<ExpressionTerm> {
    Some(match operands {
        NumericBinaryOperands::Float(v1, v2) => ExpressionTerm::FloatLiteral(v1 + v2),
        NumericBinaryOperands::Double(v1, v2) => ExpressionTerm::DoubleLiteral(v1 + v2),
        NumericBinaryOperands::Integer(v1, v2) => {
            ExpressionTerm::IntegerLiteral(v1.checked_add(v2)?)
        }
        NumericBinaryOperands::Decimal(v1, v2) => {
            ExpressionTerm::DecimalLiteral(v1.checked_add(v2)?)
        }
    })
}

fn subtract(operands: NumericBinaryOperands) -> Option<ExpressionTerm> {
    Some(match operands {
        NumericBinaryOperands::Float(v1, v2) => ExpressionTerm::FloatLiteral(v1 - v2),
        NumericBinaryOperands::Double(v1, v2) => ExpressionTerm::DoubleLiteral(v1 - v2),
        NumericBinaryOperands::Integer(v1, v2) => {
            ExpressionTerm::IntegerLiteral(v1.checked_sub(v2)?)
        }
        NumericBinaryOperands::Decimal(v1, v2) => {
            ExpressionTerm::DecimalLiteral(v1.checked_sub(v2)?)
        }
    })
}

fn multiply(operands: NumericBinaryOperands) -> Option<ExpressionTerm> {
    Some(match operands {
        NumericBinaryOperands::Float(v1, v2) => ExpressionTerm::FloatLiteral(v1 * v2),
        NumericBinaryOperands::Double(v1, v2) => ExpressionTerm::DoubleLiteral(v1 * v2),
        NumericBinaryOperands::Integer(v1, v2) => {
            ExpressionTerm::IntegerLiteral(v1.checked_mul(v2)?)
        }
        NumericBinaryOperands::Decimal(v1, v2) => {
            ExpressionTerm::DecimalLiteral(v1.checked_mul(v2)?)
        }
    })
}

/// The division of two integers is a decimal
fn divide(operands: NumericBinaryOperands) -> Option<ExpressionTerm> {
    Some(match operands {
        NumericBinaryOperands::Float(v1, v2) => ExpressionTerm::FloatLiteral(v1 / v2),
        NumericBinaryOperands::Double(v1, v2) => ExpressionTerm::DoubleLiteral(v1 / v2),
        NumericBinaryOperands::Integer(v1, v2) => {
            ExpressionTerm::DecimalLiteral(Decimal::from(v1).checked_div(v2)?)
        }
        NumericBinaryOperands::Decimal(v1, v2) => {
            ExpressionTerm::DecimalLiteral(v1.checked_div(v2)?)
        }
    })
}

fn negate(value: &ExpressionTerm) -> Option<ExpressionTerm> {
    Some(match value {
        ExpressionTerm::FloatLiteral(value) => ExpressionTerm::FloatLiteral(-*value),
        ExpressionTerm::DoubleLiteral(value) => ExpressionTerm::DoubleLiteral(-*value),
        ExpressionTerm::IntegerLiteral(value) => {
            ExpressionTerm::IntegerLiteral(value.checked_neg()?)
        }
        ExpressionTerm::DecimalLiteral(value) => {
            ExpressionTerm::DecimalLiteral(value.checked_neg()?)
        }
        _ => return None,
    })
}

/// Numeric operands promoted to their common type
enum NumericBinaryOperands {
    Float(Float, Float),
    Double(Double, Double),
    Integer(Integer, Integer),
    Decimal(Decimal, Decimal),
}

impl NumericBinaryOperands {
    fn new(a: &ExpressionTerm, b: &ExpressionTerm) -> Option<Self> {
        Some(match (a, b) {
            (ExpressionTerm::FloatLiteral(v1), ExpressionTerm::FloatLiteral(v2)) => {
                Self::Float(*v1, *v2)
            }
            (ExpressionTerm::FloatLiteral(v1), ExpressionTerm::DoubleLiteral(v2)) => {
                Self::Double((*v1).into(), *v2)
            }
            (ExpressionTerm::FloatLiteral(v1), ExpressionTerm::IntegerLiteral(v2)) => {
                Self::Float(*v1, (*v2).into())
            }
            (ExpressionTerm::FloatLiteral(v1), ExpressionTerm::DecimalLiteral(v2)) => {
                Self::Float(*v1, (*v2).into())
            }
            (ExpressionTerm::DoubleLiteral(v1), ExpressionTerm::FloatLiteral(v2)) => {
                Self::Double(*v1, (*v2).into())
            }
            (ExpressionTerm::DoubleLiteral(v1), ExpressionTerm::DoubleLiteral(v2)) => {
                Self::Double(*v1, *v2)
            }
            (ExpressionTerm::DoubleLiteral(v1), ExpressionTerm::IntegerLiteral(v2)) => {
                Self::Double(*v1, (*v2).into())
            }
            (ExpressionTerm::DoubleLiteral(v1), ExpressionTerm::DecimalLiteral(v2)) => {
                Self::Double(*v1, (*v2).into())
            }
            (ExpressionTerm::IntegerLiteral(v1), ExpressionTerm::FloatLiteral(v2)) => {
                Self::Float((*v1).into(), *v2)
            }
            (ExpressionTerm::IntegerLiteral(v1), ExpressionTerm::DoubleLiteral(v2)) => {
                Self::Double((*v1).into(), *v2)
            }
            (ExpressionTerm::IntegerLiteral(v1), ExpressionTerm::IntegerLiteral(v2)) => {
                Self::Integer(*v1, *v2)
            }
            (ExpressionTerm::IntegerLiteral(v1), ExpressionTerm::DecimalLiteral(v2)) => {
                Self::Decimal((*v1).into(), *v2)
            }
            (ExpressionTerm::DecimalLiteral(v1), ExpressionTerm::FloatLiteral(v2)) => {
                Self::Float((*v1).into(), *v2)
            }
            (ExpressionTerm::DecimalLiteral(v1), ExpressionTerm::DoubleLiteral(v2)) => {
                Self::Double((*v1).into(), *v2)
            }
            (ExpressionTerm::DecimalLiteral(v1), ExpressionTerm::IntegerLiteral(v2)) => {
                Self::Decimal(*v1, (*v2).into())
            }
            (ExpressionTerm::DecimalLiteral(v1), ExpressionTerm::DecimalLiteral(v2)) => {
                Self::Decimal(*v1, *v2)
            }
            _ => return None,
        })
    }
}

/// Equality operator (=). `None` if the terms cannot be compared.
fn equals(a: &ExpressionTerm, b: &ExpressionTerm) -> Option<bool> {
    if let (Some(a), Some(b)) = (as_double_compatible(a), as_double_compatible(b)) {
        return Some(
            NumericBinaryOperands::new(a, b).is_some_and(|operands| match operands {
                NumericBinaryOperands::Float(a, b) => a == b,
                NumericBinaryOperands::Double(a, b) => a == b,
                NumericBinaryOperands::Integer(a, b) => a == b,
                NumericBinaryOperands::Decimal(a, b) => a == b,
            }),
        );
    }
    match (a, b) {
        (ExpressionTerm::OtherTypedLiteral { .. }, ExpressionTerm::OtherTypedLiteral { .. })
            if a == b =>
        {
            Some(true)
        }
        (
            ExpressionTerm::OtherTypedLiteral { .. },
            ExpressionTerm::NamedNode(_)
            | ExpressionTerm::BlankNode(_)
            | ExpressionTerm::LangStringLiteral { .. },
        )
        | (
            ExpressionTerm::NamedNode(_)
            | ExpressionTerm::BlankNode(_)
            | ExpressionTerm::LangStringLiteral { .. },
            ExpressionTerm::OtherTypedLiteral { .. },
        ) => Some(false),
        // Unknown datatypes might have values equal to the other literal
        (ExpressionTerm::OtherTypedLiteral { .. }, _)
        | (_, ExpressionTerm::OtherTypedLiteral { .. }) => None,
        _ => Some(a == b),
    }
}

fn as_double_compatible(term: &ExpressionTerm) -> Option<&ExpressionTerm> {
    term.is_numeric().then_some(term)
}

/// Comparison for <, >, <= and >= operators
fn partial_cmp(a: &ExpressionTerm, b: &ExpressionTerm) -> Option<Ordering> {
    if a == b {
        return Some(Ordering::Equal);
    }
    partial_cmp_literals(a, b)
}

fn partial_cmp_literals(a: &ExpressionTerm, b: &ExpressionTerm) -> Option<Ordering> {
    match (a, b) {
        (ExpressionTerm::StringLiteral(a), ExpressionTerm::StringLiteral(b)) => a.partial_cmp(b),
        (
            ExpressionTerm::LangStringLiteral {
                value: va,
                language: la,
            },
            ExpressionTerm::LangStringLiteral {
                value: vb,
                language: lb,
            },
        ) => {
            if la == lb {
                va.partial_cmp(vb)
            } else {
                None
            }
        }
        (ExpressionTerm::BooleanLiteral(a), ExpressionTerm::BooleanLiteral(b)) => {
            bool::from(*a).partial_cmp(&bool::from(*b))
        }
        (ExpressionTerm::DateTimeLiteral(a), ExpressionTerm::DateTimeLiteral(b)) => {
            a.partial_cmp(b)
        }
        _ => match NumericBinaryOperands::new(a, b)? {
            NumericBinaryOperands::Float(a, b) => a.partial_cmp(&b),
            NumericBinaryOperands::Double(a, b) => a.partial_cmp(&b),
            NumericBinaryOperands::Integer(a, b) => a.partial_cmp(&b),
            NumericBinaryOperands::Decimal(a, b) => a.partial_cmp(&b),
        },
    }
}

/// Total order used by `ORDER BY`: unbound, blank nodes, IRIs and then literals
pub(crate) fn cmp_terms(a: Option<&ExpressionTerm>, b: Option<&ExpressionTerm>) -> Ordering {
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        (Some(_), None) => return Ordering::Greater,
        (None, Some(_)) => return Ordering::Less,
        (None, None) => return Ordering::Equal,
    };
    match (a, b) {
        (ExpressionTerm::BlankNode(a), ExpressionTerm::BlankNode(b)) => a.as_str().cmp(b.as_str()),
        (ExpressionTerm::BlankNode(_), _) => Ordering::Less,
        (_, ExpressionTerm::BlankNode(_)) => Ordering::Greater,
        (ExpressionTerm::NamedNode(a), ExpressionTerm::NamedNode(b)) => a.as_str().cmp(b.as_str()),
        (ExpressionTerm::NamedNode(_), _) => Ordering::Less,
        (_, ExpressionTerm::NamedNode(_)) => Ordering::Greater,
        _ => partial_cmp_literals(a, b).unwrap_or_else(|| {
            match (Term::from(a.clone()), Term::from(b.clone())) {
                (Term::Literal(a), Term::Literal(b)) => (a.value(), a.datatype(), a.language())
                    .cmp(&(b.value(), b.datatype(), b.language())),
                _ => Ordering::Equal,
            }
        }),
    }
}

fn call_builtin(
    function: &Function,
    args: Vec<ExpressionTerm>,
    context: &dyn ExpressionContext,
) -> Option<ExpressionTerm> {
    let mut args = args.into_iter();
    let mut arg = || args.next();
    Some(match function {
        Function::Str => ExpressionTerm::StringLiteral(match Term::from(arg()?) {
            Term::NamedNode(node) => node.into_string(),
            Term::BlankNode(_) => return None,
            Term::Literal(literal) => literal.destruct().0,
        }),
        Function::Lang => match arg()? {
            ExpressionTerm::LangStringLiteral { language, .. } => {
                ExpressionTerm::StringLiteral(language)
            }
            ExpressionTerm::NamedNode(_) | ExpressionTerm::BlankNode(_) => return None,
            _ => ExpressionTerm::StringLiteral(String::new()),
        },
        Function::LangMatches => {
            let ExpressionTerm::StringLiteral(language_tag) = arg()? else {
                return None;
            };
            let ExpressionTerm::StringLiteral(language_range) = arg()? else {
                return None;
            };
            lang_matches(&language_tag, &language_range).into()
        }
        Function::Datatype => match Term::from(arg()?) {
            Term::Literal(literal) => ExpressionTerm::NamedNode(literal.datatype().into_owned()),
            _ => return None,
        },
        Function::Iri => match arg()? {
            ExpressionTerm::NamedNode(node) => ExpressionTerm::NamedNode(node),
            ExpressionTerm::StringLiteral(iri) => {
                ExpressionTerm::NamedNode(NamedNode::new(iri).ok()?)
            }
            _ => return None,
        },
        Function::BNode => match arg() {
            None => ExpressionTerm::BlankNode(BlankNode::default()),
            Some(ExpressionTerm::StringLiteral(id)) => {
                ExpressionTerm::BlankNode(BlankNode::new(id).ok()?)
            }
            Some(_) => return None,
        },
        Function::Rand => ExpressionTerm::DoubleLiteral(random::<f64>().into()),
        Function::Abs => match arg()? {
            ExpressionTerm::IntegerLiteral(value) => {
                ExpressionTerm::IntegerLiteral(value.checked_abs()?)
            }
            ExpressionTerm::DecimalLiteral(value) => {
                ExpressionTerm::DecimalLiteral(value.checked_abs()?)
            }
            ExpressionTerm::FloatLiteral(value) => ExpressionTerm::FloatLiteral(value.abs()),
            ExpressionTerm::DoubleLiteral(value) => ExpressionTerm::DoubleLiteral(value.abs()),
            _ => return None,
        },
        Function::Ceil => match arg()? {
            ExpressionTerm::IntegerLiteral(value) => ExpressionTerm::IntegerLiteral(value),
            ExpressionTerm::DecimalLiteral(value) => {
                ExpressionTerm::DecimalLiteral(value.checked_ceil()?)
            }
            ExpressionTerm::FloatLiteral(value) => ExpressionTerm::FloatLiteral(value.ceil()),
            ExpressionTerm::DoubleLiteral(value) => ExpressionTerm::DoubleLiteral(value.ceil()),
            _ => return None,
        },
        Function::Floor => match arg()? {
            ExpressionTerm::IntegerLiteral(value) => ExpressionTerm::IntegerLiteral(value),
            ExpressionTerm::DecimalLiteral(value) => {
                ExpressionTerm::DecimalLiteral(value.checked_floor()?)
            }
            ExpressionTerm::FloatLiteral(value) => ExpressionTerm::FloatLiteral(value.floor()),
            ExpressionTerm::DoubleLiteral(value) => ExpressionTerm::DoubleLiteral(value.floor()),
            _ => return None,
        },
        Function::Round => match arg()? {
            ExpressionTerm::IntegerLiteral(value) => ExpressionTerm::IntegerLiteral(value),
            ExpressionTerm::DecimalLiteral(value) => {
                ExpressionTerm::DecimalLiteral(value.checked_round()?)
            }
            ExpressionTerm::FloatLiteral(value) => ExpressionTerm::FloatLiteral(value.round()),
            ExpressionTerm::DoubleLiteral(value) => ExpressionTerm::DoubleLiteral(value.round()),
            _ => return None,
        },
        Function::Concat => {
            let mut result = String::new();
            let mut language: Option<Option<String>> = None;
            while let Some(value) = arg() {
                let (value, value_language) = to_string_and_language(value)?;
                match &language {
                    Some(current) if *current != value_language => language = Some(None),
                    Some(_) => (),
                    None => language = Some(value_language),
                }
                result.push_str(&value);
            }
            build_plain_literal(result, language.flatten())
        }
        Function::SubStr => {
            let (source, language) = to_string_and_language(arg()?)?;
            let ExpressionTerm::IntegerLiteral(start) = arg()? else {
                return None;
            };
            let start = usize::try_from(i64::from(start)).ok()?;
            let length = match arg() {
                Some(ExpressionTerm::IntegerLiteral(length)) => {
                    Some(usize::try_from(i64::from(length)).ok()?)
                }
                Some(_) => return None,
                None => None,
            };
            // Positions are counted in characters, starting from 1
            let chars = source.chars().skip(start.checked_sub(1)?);
            let value = if let Some(length) = length {
                chars.take(length).collect()
            } else {
                chars.collect()
            };
            build_plain_literal(value, language)
        }
        Function::StrLen => {
            let (value, _) = to_string_and_language(arg()?)?;
            ExpressionTerm::IntegerLiteral(i64::try_from(value.chars().count()).ok()?.into())
        }
        Function::Replace => {
            let (text, language) = to_string_and_language(arg()?)?;
            let ExpressionTerm::StringLiteral(pattern) = arg()? else {
                return None;
            };
            let ExpressionTerm::StringLiteral(replacement) = arg()? else {
                return None;
            };
            let flags = match arg() {
                Some(ExpressionTerm::StringLiteral(flags)) => Some(flags),
                Some(_) => return None,
                None => None,
            };
            let regex = compile_pattern(&pattern, flags.as_deref())?;
            build_plain_literal(
                regex.replace_all(&text, replacement.as_str()).into_owned(),
                language,
            )
        }
        Function::UCase => {
            let (value, language) = to_string_and_language(arg()?)?;
            build_plain_literal(value.to_uppercase(), language)
        }
        Function::LCase => {
            let (value, language) = to_string_and_language(arg()?)?;
            build_plain_literal(value.to_lowercase(), language)
        }
        Function::EncodeForUri => {
            let (value, _) = to_string_and_language(arg()?)?;
            let mut result = String::with_capacity(value.len());
            for c in value.bytes() {
                if c.is_ascii_alphanumeric() || matches!(c, b'-' | b'_' | b'.' | b'~') {
                    result.push(char::from(c));
                } else {
                    write!(result, "%{c:02X}").ok()?;
                }
            }
            ExpressionTerm::StringLiteral(result)
        }
        Function::Contains => {
            let (text, pattern, _) = to_argument_compatible_strings(arg()?, arg()?)?;
            text.contains(pattern.as_str()).into()
        }
        Function::StrStarts => {
            let (text, pattern, _) = to_argument_compatible_strings(arg()?, arg()?)?;
            text.starts_with(pattern.as_str()).into()
        }
        Function::StrEnds => {
            let (text, pattern, _) = to_argument_compatible_strings(arg()?, arg()?)?;
            text.ends_with(pattern.as_str()).into()
        }
        Function::StrBefore => {
            let (text, pattern, language) = to_argument_compatible_strings(arg()?, arg()?)?;
            if let Some((before, _)) = text.split_once(pattern.as_str()) {
                build_plain_literal(before.into(), language)
            } else {
                ExpressionTerm::StringLiteral(String::new())
            }
        }
        Function::StrAfter => {
            let (text, pattern, language) = to_argument_compatible_strings(arg()?, arg()?)?;
            if let Some((_, after)) = text.split_once(pattern.as_str()) {
                build_plain_literal(after.into(), language)
            } else {
                ExpressionTerm::StringLiteral(String::new())
            }
        }
        Function::Year => ExpressionTerm::IntegerLiteral(date_time(arg()?)?.year().into()),
        Function::Month => ExpressionTerm::IntegerLiteral(date_time(arg()?)?.month().into()),
        Function::Day => ExpressionTerm::IntegerLiteral(date_time(arg()?)?.day().into()),
        Function::Hours => ExpressionTerm::IntegerLiteral(date_time(arg()?)?.hour().into()),
        Function::Minutes => ExpressionTerm::IntegerLiteral(date_time(arg()?)?.minute().into()),
        Function::Seconds => ExpressionTerm::DecimalLiteral(date_time(arg()?)?.second()),
        Function::Timezone => ExpressionTerm::OtherTypedLiteral {
            value: date_time(arg()?)?.timezone()?.to_string(),
            datatype: xsd::DAY_TIME_DURATION.into(),
        },
        Function::Tz => ExpressionTerm::StringLiteral(
            date_time(arg()?)?
                .timezone_offset()
                .map(|offset| offset.to_string())
                .unwrap_or_default(),
        ),
        Function::Now => ExpressionTerm::DateTimeLiteral(context.now()),
        Function::Uuid => ExpressionTerm::NamedNode(NamedNode::new_unchecked(format!(
            "urn:uuid:{}",
            generate_uuid()
        ))),
        Function::StrUuid => ExpressionTerm::StringLiteral(generate_uuid()),
        Function::Md5 => hash::<Md5>(arg()?)?,
        Function::Sha1 => hash::<Sha1>(arg()?)?,
        Function::Sha256 => hash::<Sha256>(arg()?)?,
        Function::Sha384 => hash::<Sha384>(arg()?)?,
        Function::Sha512 => hash::<Sha512>(arg()?)?,
        Function::StrLang => {
            let ExpressionTerm::StringLiteral(value) = arg()? else {
                return None;
            };
            let ExpressionTerm::StringLiteral(language) = arg()? else {
                return None;
            };
            Term::from(Literal::new_language_tagged_literal(value, language).ok()?).into()
        }
        Function::StrDt => {
            let ExpressionTerm::StringLiteral(value) = arg()? else {
                return None;
            };
            let ExpressionTerm::NamedNode(datatype) = arg()? else {
                return None;
            };
            Term::from(Literal::new_typed_literal(value, datatype)).into()
        }
        Function::IsIri => matches!(arg()?, ExpressionTerm::NamedNode(_)).into(),
        Function::IsBlank => matches!(arg()?, ExpressionTerm::BlankNode(_)).into(),
        Function::IsLiteral => {
            (!matches!(arg()?, ExpressionTerm::NamedNode(_) | ExpressionTerm::BlankNode(_))).into()
        }
        Function::IsNumeric => arg()?.is_numeric().into(),
        Function::Regex => {
            let (text, _) = to_string_and_language(arg()?)?;
            let ExpressionTerm::StringLiteral(pattern) = arg()? else {
                return None;
            };
            let flags = match arg() {
                Some(ExpressionTerm::StringLiteral(flags)) => Some(flags),
                Some(_) => return None,
                None => None,
            };
            compile_pattern(&pattern, flags.as_deref())?
                .is_match(&text)
                .into()
        }
        Function::Custom(_) => return None,
    })
}

fn date_time(term: ExpressionTerm) -> Option<DateTime> {
    if let ExpressionTerm::DateTimeLiteral(value) = term {
        Some(value)
    } else {
        None
    }
}

fn hash<H: Digest>(term: ExpressionTerm) -> Option<ExpressionTerm> {
    let ExpressionTerm::StringLiteral(input) = term else {
        return None;
    };
    Some(ExpressionTerm::StringLiteral(hex::encode(H::digest(
        input.as_bytes(),
    ))))
}

fn lang_matches(language_tag: &str, language_range: &str) -> bool {
    if language_range == "*" {
        return !language_tag.is_empty();
    }
    let mut tag_subtags = language_tag.split('-');
    // The tag must start with all the subtags of the range
    language_range.split('-').all(|range_subtag| {
        tag_subtags
            .next()
            .is_some_and(|tag_subtag| range_subtag.eq_ignore_ascii_case(tag_subtag))
    })
}

pub(crate) fn to_string_and_language(term: ExpressionTerm) -> Option<(String, Option<String>)> {
    match term {
        ExpressionTerm::StringLiteral(value) => Some((value, None)),
        ExpressionTerm::LangStringLiteral { value, language } => Some((value, Some(language))),
        _ => None,
    }
}

pub(crate) fn build_plain_literal(value: String, language: Option<String>) -> ExpressionTerm {
    if let Some(language) = language {
        ExpressionTerm::LangStringLiteral { value, language }
    } else {
        ExpressionTerm::StringLiteral(value)
    }
}

/// The two strings if the language of the second one is compatible with the first one
fn to_argument_compatible_strings(
    arg1: ExpressionTerm,
    arg2: ExpressionTerm,
) -> Option<(String, String, Option<String>)> {
    let (value1, language1) = to_string_and_language(arg1)?;
    let (value2, language2) = to_string_and_language(arg2)?;
    (language2.is_none() || language1 == language2).then_some((value1, value2, language1))
}

fn compile_pattern(pattern: &str, flags: Option<&str>) -> Option<Regex> {
    let flags = flags.unwrap_or_default();
    let pattern = if flags.contains('q') {
        Cow::Owned(regex::escape(pattern))
    } else {
        Cow::Borrowed(pattern)
    };
    let mut builder = RegexBuilder::new(&pattern);
    builder.size_limit(REGEX_SIZE_LIMIT);
    for flag in flags.chars() {
        match flag {
            's' => {
                builder.dot_matches_new_line(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            'i' => {
                builder.case_insensitive(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            'q' => (),
            _ => return None,
        }
    }
    builder.build().ok()
}

/// A random version 4 UUID in its hexadecimal form
fn generate_uuid() -> String {
    let mut uuid = random::<u128>().to_le_bytes();
    uuid[6] = (uuid[6] & 0x0F) | 0x40;
    uuid[8] = (uuid[8] & 0x3F) | 0x80;
    format!(
        "{}-{}-{}-{}-{}",
        hex::encode(&uuid[0..4]),
        hex::encode(&uuid[4..6]),
        hex::encode(&uuid[6..8]),
        hex::encode(&uuid[8..10]),
        hex::encode(&uuid[10..16])
    )
}

fn cast_to_string(term: ExpressionTerm) -> Option<ExpressionTerm> {
    Some(ExpressionTerm::StringLiteral(match Term::from(term) {
        Term::NamedNode(node) => node.into_string(),
        Term::BlankNode(_) => return None,
        Term::Literal(literal) => literal.destruct().0,
    }))
}

fn cast_to_boolean(term: ExpressionTerm) -> Option<ExpressionTerm> {
    Some(ExpressionTerm::BooleanLiteral(match term {
        ExpressionTerm::BooleanLiteral(value) => value,
        ExpressionTerm::FloatLiteral(value) => value.into(),
        ExpressionTerm::DoubleLiteral(value) => value.into(),
        ExpressionTerm::IntegerLiteral(value) => value.into(),
        ExpressionTerm::DecimalLiteral(value) => value.into(),
        ExpressionTerm::StringLiteral(value) => value.parse::<Boolean>().ok()?,
        _ => return None,
    }))
}

fn cast_to_integer(term: ExpressionTerm) -> Option<ExpressionTerm> {
    Some(ExpressionTerm::IntegerLiteral(match term {
        ExpressionTerm::FloatLiteral(value) => value.try_into().ok()?,
        ExpressionTerm::DoubleLiteral(value) => value.try_into().ok()?,
        ExpressionTerm::IntegerLiteral(value) => value,
        ExpressionTerm::DecimalLiteral(value) => value.try_into().ok()?,
        ExpressionTerm::BooleanLiteral(value) => value.into(),
        ExpressionTerm::StringLiteral(value) => value.parse().ok()?,
        _ => return None,
    }))
}

fn cast_to_decimal(term: ExpressionTerm) -> Option<ExpressionTerm> {
    Some(ExpressionTerm::DecimalLiteral(match term {
        ExpressionTerm::FloatLiteral(value) => value.try_into().ok()?,
        ExpressionTerm::DoubleLiteral(value) => value.try_into().ok()?,
        ExpressionTerm::IntegerLiteral(value) => value.into(),
        ExpressionTerm::DecimalLiteral(value) => value,
        ExpressionTerm::BooleanLiteral(value) => value.into(),
        ExpressionTerm::StringLiteral(value) => value.parse().ok()?,
        _ => return None,
    }))
}

fn cast_to_float(term: ExpressionTerm) -> Option<ExpressionTerm> {
    Some(ExpressionTerm::FloatLiteral(match term {
        ExpressionTerm::FloatLiteral(value) => value,
        ExpressionTerm::DoubleLiteral(value) => value.into(),
        ExpressionTerm::IntegerLiteral(value) => value.into(),
        ExpressionTerm::DecimalLiteral(value) => value.into(),
        ExpressionTerm::BooleanLiteral(value) => value.into(),
        ExpressionTerm::StringLiteral(value) => value.parse().ok()?,
        _ => return None,
    }))
}

fn cast_to_double(term: ExpressionTerm) -> Option<ExpressionTerm> {
    Some(ExpressionTerm::DoubleLiteral(match term {
        ExpressionTerm::FloatLiteral(value) => value.into(),
        ExpressionTerm::DoubleLiteral(value) => value,
        ExpressionTerm::IntegerLiteral(value) => value.into(),
        ExpressionTerm::DecimalLiteral(value) => value.into(),
        ExpressionTerm::BooleanLiteral(value) => value.into(),
        ExpressionTerm::StringLiteral(value) => value.parse().ok()?,
        _ => return None,
    }))
}

fn cast_to_date_time(term: ExpressionTerm) -> Option<ExpressionTerm> {
    Some(ExpressionTerm::DateTimeLiteral(match term {
        ExpressionTerm::DateTimeLiteral(value) => value,
        ExpressionTerm::StringLiteral(value) => value.parse().ok()?,
        _ => return None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::Variable;
    use spargebra::Query;
    use std::error::Error;

    struct NoContext;

    impl ExpressionContext for NoContext {
        fn exists(&self, _: &GraphPattern, _: &Solution) -> Result<bool, QueryEvaluationError> {
            Ok(false)
        }

        fn now(&self) -> DateTime {
            DateTime::now()
        }
    }

    /// Parses the expression of `SELECT (expression AS ?r) {}`
    fn parse(expression: &str) -> Result<Expression, Box<dyn Error>> {
        let query = Query::parse(&format!("SELECT ({expression} AS ?r) WHERE {{}}"), None)?;
        let Query::Select { pattern, .. } = query else {
            return Err("not a SELECT query".into());
        };
        let GraphPattern::Project { inner, .. } = pattern else {
            return Err("not a projection".into());
        };
        let GraphPattern::Extend { expression, .. } = *inner else {
            return Err("not an extension".into());
        };
        Ok(expression)
    }

    fn eval(expression: &str) -> Result<Term, Box<dyn Error>> {
        Ok(SimpleExpressionEvaluator::new()
            .evaluate(&parse(expression)?, &Solution::new(), &NoContext)?
            .into())
    }

    fn eval_error(expression: &str) -> Result<QueryEvaluationError, Box<dyn Error>> {
        match SimpleExpressionEvaluator::new().evaluate(
            &parse(expression)?,
            &Solution::new(),
            &NoContext,
        ) {
            Ok(value) => Err(format!("{expression} evaluated to {value}").into()),
            Err(error) => Ok(error),
        }
    }

    #[test]
    fn numeric_promotion() -> Result<(), Box<dyn Error>> {
        assert_eq!(eval("1 + 2")?, Literal::from(3).into());
        assert_eq!(eval("1 + 2.5")?, Literal::from("3.5".parse::<Decimal>()?).into());
        assert_eq!(eval("3 / 2")?, Literal::from("1.5".parse::<Decimal>()?).into());
        assert_eq!(eval("-(2)")?, Literal::from(-2).into());
        assert_eq!(eval("1 = 1.0")?, Literal::from(true).into());
        assert_eq!(eval("2 > 1.5e0")?, Literal::from(true).into());
        Ok(())
    }

    #[test]
    fn decimal_rounding() -> Result<(), Box<dyn Error>> {
        assert_eq!(eval("ABS(-1.5)")?, Literal::from("1.5".parse::<Decimal>()?).into());
        assert_eq!(eval("CEIL(1.2)")?, Literal::from("2".parse::<Decimal>()?).into());
        assert_eq!(eval("FLOOR(-1.2)")?, Literal::from("-2".parse::<Decimal>()?).into());
        assert_eq!(eval("ROUND(2.4)")?, Literal::from("2".parse::<Decimal>()?).into());
        assert_eq!(eval("ABS(-3)")?, Literal::from(3).into());
        Ok(())
    }

    #[test]
    fn expression_errors() -> Result<(), Box<dyn Error>> {
        assert!(eval_error("?unbound + 1")?.is_expression_error());
        assert!(eval_error("1 + \"a\"")?.is_expression_error());
        assert!(eval_error("1 / 0")?.is_expression_error());
        assert!(eval_error("<http://example.com/f>(1)")?.is_expression_error());
        Ok(())
    }

    #[test]
    fn three_valued_logic() -> Result<(), Box<dyn Error>> {
        assert_eq!(eval("?unbound || true")?, Literal::from(true).into());
        assert_eq!(eval("false && ?unbound")?, Literal::from(false).into());
        assert!(eval_error("?unbound || false")?.is_expression_error());
        assert_eq!(eval("COALESCE(?unbound, 2)")?, Literal::from(2).into());
        assert_eq!(eval("IF(1 < 2, \"a\", \"b\")")?, Literal::from("a").into());
        assert_eq!(eval("2 IN (1, 2)")?, Literal::from(true).into());
        Ok(())
    }

    #[test]
    fn string_functions() -> Result<(), Box<dyn Error>> {
        assert_eq!(eval("SUBSTR(\"foobar\", 4)")?, Literal::from("bar").into());
        assert_eq!(eval("SUBSTR(\"foobar\", 2, 3)")?, Literal::from("oob").into());
        assert_eq!(eval("STRLEN(\"été\")")?, Literal::from(3).into());
        assert_eq!(
            eval("UCASE(\"foo\"@en)")?,
            Literal::new_language_tagged_literal_unchecked("FOO", "en").into()
        );
        assert_eq!(
            eval("CONCAT(\"foo\"@en, \"bar\"@en)")?,
            Literal::new_language_tagged_literal_unchecked("foobar", "en").into()
        );
        assert_eq!(eval("CONCAT(\"foo\"@en, \"bar\")")?, Literal::from("foobar").into());
        assert_eq!(eval("STRBEFORE(\"abc\", \"b\")")?, Literal::from("a").into());
        assert_eq!(eval("STRAFTER(\"abc\", \"b\")")?, Literal::from("c").into());
        assert_eq!(eval("STRAFTER(\"abc\", \"z\")")?, Literal::from("").into());
        assert_eq!(
            eval("ENCODE_FOR_URI(\"Los Angeles\")")?,
            Literal::from("Los%20Angeles").into()
        );
        assert_eq!(
            eval("REPLACE(\"abcd\", \"B\", \"Z\", \"i\")")?,
            Literal::from("aZcd").into()
        );
        assert_eq!(eval("REGEX(\"abc\", \"^a.c$\")")?, Literal::from(true).into());
        assert_eq!(eval("LANGMATCHES(\"en-US\", \"en\")")?, Literal::from(true).into());
        assert_eq!(eval("LANGMATCHES(\"fr\", \"en\")")?, Literal::from(false).into());
        assert_eq!(eval("LANGMATCHES(\"en\", \"*\")")?, Literal::from(true).into());
        Ok(())
    }

    #[test]
    fn hashes_and_casts() -> Result<(), Box<dyn Error>> {
        assert_eq!(
            eval("MD5(\"abc\")")?,
            Literal::from("900150983cd24fb0d6963f7d28e17f72").into()
        );
        assert_eq!(
            eval("<http://www.w3.org/2001/XMLSchema#integer>(\"12\")")?,
            Literal::from(12).into()
        );
        assert_eq!(
            eval("<http://www.w3.org/2001/XMLSchema#boolean>(0)")?,
            Literal::from(false).into()
        );
        assert!(
            eval_error("<http://www.w3.org/2001/XMLSchema#integer>(\"a\")")?.is_expression_error()
        );
        Ok(())
    }

    #[test]
    fn date_time_functions() -> Result<(), Box<dyn Error>> {
        let date = "\"2011-01-10T14:45:13.815-05:00\"^^<http://www.w3.org/2001/XMLSchema#dateTime>";
        assert_eq!(eval(&format!("YEAR({date})"))?, Literal::from(2011).into());
        assert_eq!(eval(&format!("HOURS({date})"))?, Literal::from(14).into());
        assert_eq!(eval(&format!("TZ({date})"))?, Literal::from("-05:00").into());
        assert_eq!(
            eval(&format!("TIMEZONE({date})"))?,
            Literal::new_typed_literal("-PT5H", xsd::DAY_TIME_DURATION).into()
        );
        Ok(())
    }

    #[test]
    fn uuid() -> Result<(), Box<dyn Error>> {
        assert!(
            Regex::new("^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")?
                .is_match(&generate_uuid())
        );
        Ok(())
    }

    #[test]
    fn custom_function() -> Result<(), Box<dyn Error>> {
        let name = NamedNode::new("http://example.com/double")?;
        let evaluator =
            SimpleExpressionEvaluator::new().with_custom_function(name.clone(), |args| {
                let [Term::Literal(value)] = args else {
                    return None;
                };
                Some(Literal::from(value.value().repeat(2)).into())
            });
        let x = Variable::new("x")?;
        let mut solution = Solution::new();
        solution.set(x.clone(), Literal::from("ab").into())?;
        let expression = Expression::FunctionCall(Function::Custom(name), vec![x.into()]);
        assert_eq!(
            Term::from(evaluator.evaluate(&expression, &solution, &NoContext)?),
            Literal::from("abab").into()
        );
        Ok(())
    }

    #[test]
    fn ordering() {
        let one = ExpressionTerm::IntegerLiteral(1.into());
        let two = ExpressionTerm::DoubleLiteral(2.0.into());
        let iri = ExpressionTerm::NamedNode(NamedNode::new_unchecked("http://example.com/"));
        assert_eq!(cmp_terms(Some(&one), Some(&two)), Ordering::Less);
        assert_eq!(cmp_terms(Some(&iri), Some(&one)), Ordering::Less);
        assert_eq!(cmp_terms(None, Some(&iri)), Ordering::Less);
    }
}
