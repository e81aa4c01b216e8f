//! Composable boolean predicates and dynamic filter composition.

use crate::builder::SelectQuery;
use crate::expr::Expr;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Comparison operators for WHERE clauses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonOp::Eq => write!(f, "="),
            ComparisonOp::Ne => write!(f, "!="),
            ComparisonOp::Lt => write!(f, "<"),
            ComparisonOp::Le => write!(f, "<="),
            ComparisonOp::Gt => write!(f, ">"),
            ComparisonOp::Ge => write!(f, ">="),
            ComparisonOp::In => write!(f, "in"),
            ComparisonOp::NotIn => write!(f, "not in"),
            ComparisonOp::IsNull => write!(f, "is null"),
            ComparisonOp::IsNotNull => write!(f, "is not null"),
        }
    }
}

/// Logical operators for combining predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => write!(f, "and"),
            LogicalOp::Or => write!(f, "or"),
        }
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Expr(Expr),
    List(Vec<Value>),
    Subquery(Box<SelectQuery>),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Expr(expr) => write!(f, "{}", expr),
            Operand::List(values) => {
                let values = values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "({})", values)
            }
            Operand::Subquery(query) => write!(f, "({})", query),
        }
    }
}

/// Boolean expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Simple {
        left: Expr,
        op: ComparisonOp,
        right: Option<Operand>,
    },
    Compound {
        predicates: Vec<Predicate>,
        op: LogicalOp,
    },
    Not(Box<Predicate>),
}

impl Predicate {
    fn combine(self, other: Predicate, op: LogicalOp) -> Predicate {
        match self {
            Predicate::Compound {
                mut predicates,
                op: existing,
            } if existing == op => {
                predicates.push(other);
                Predicate::Compound { predicates, op }
            }
            left => Predicate::Compound {
                predicates: vec![left, other],
                op,
            },
        }
    }

    pub fn and(self, other: Predicate) -> Predicate {
        self.combine(other, LogicalOp::And)
    }

    pub fn or(self, other: Predicate) -> Predicate {
        self.combine(other, LogicalOp::Or)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate {
        match self {
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }

    /// AND of every present clause; absent clauses are skipped.
    ///
    /// Returns `None` ("no filter") when every clause is absent.
    pub fn all_of<I>(clauses: I) -> Option<Predicate>
    where
        I: IntoIterator<Item = Option<Predicate>>,
    {
        clauses
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<Predicate>, clause| match acc {
                Some(acc) => Some(acc.and(clause)),
                None => Some(clause),
            })
    }

    /// OR of every present clause; absent clauses are skipped
    pub fn any_of<I>(clauses: I) -> Option<Predicate>
    where
        I: IntoIterator<Item = Option<Predicate>>,
    {
        clauses
            .into_iter()
            .flatten()
            .fold(None, |acc: Option<Predicate>, clause| match acc {
                Some(acc) => Some(acc.or(clause)),
                None => Some(clause),
            })
    }

    /// Visit every expression in this predicate
    pub fn walk(&self, into_subqueries: bool, visit: &mut dyn FnMut(&Expr)) {
        match self {
            Predicate::Simple { left, right, .. } => {
                left.walk(into_subqueries, visit);
                match right {
                    Some(Operand::Expr(expr)) => expr.walk(into_subqueries, visit),
                    Some(Operand::Subquery(query)) if into_subqueries => query.walk(visit),
                    _ => {}
                }
            }
            Predicate::Compound { predicates, .. } => {
                for predicate in predicates {
                    predicate.walk(into_subqueries, visit);
                }
            }
            Predicate::Not(inner) => inner.walk(into_subqueries, visit),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Simple { left, op, right } => match right {
                Some(right) => write!(f, "{} {} {}", left, op, right),
                None => write!(f, "{} {}", left, op),
            },
            Predicate::Compound { predicates, op } => {
                if predicates.is_empty() {
                    return write!(f, "true");
                }
                let parts = predicates
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(&format!(" {} ", op));
                write!(f, "({})", parts)
            }
            Predicate::Not(inner) => write!(f, "not {}", inner),
        }
    }
}

/// Accumulating predicate builder for imperative filter assembly.
///
/// Starts empty; `build` yields `None` when nothing was added.
#[derive(Debug, Clone, Default)]
pub struct BooleanBuilder {
    predicate: Option<Predicate>,
}

impl BooleanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn or(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate {
            Some(existing) => existing.or(predicate),
            None => predicate,
        });
        self
    }

    /// AND with the OR of every present clause
    pub fn and_any_of<I>(self, clauses: I) -> Self
    where
        I: IntoIterator<Item = Option<Predicate>>,
    {
        match Predicate::any_of(clauses) {
            Some(any) => self.and(any),
            None => self,
        }
    }

    pub fn has_value(&self) -> bool {
        self.predicate.is_some()
    }

    pub fn build(self) -> Option<Predicate> {
        self.predicate
    }
}

type ConditionFn<C> = Arc<dyn Fn(&C) -> Option<Predicate> + Send + Sync>;

/// Ordered set of named, independently optional conditions over a search input `C`.
///
/// Each condition turns the input into a predicate or into `None` when its
/// parameter is absent. [`DynamicFilter::build`] folds the present ones with AND.
pub struct DynamicFilter<C> {
    conditions: Vec<(&'static str, ConditionFn<C>)>,
}

impl<C> DynamicFilter<C> {
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    pub fn condition<F>(mut self, name: &'static str, condition: F) -> Self
    where
        F: Fn(&C) -> Option<Predicate> + Send + Sync + 'static,
    {
        self.conditions.push((name, Arc::new(condition)));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.conditions.iter().map(|(name, _)| *name).collect()
    }

    /// Names of the conditions that produce a predicate for `input`
    pub fn active(&self, input: &C) -> Vec<&'static str> {
        self.conditions
            .iter()
            .filter(|(_, condition)| condition(input).is_some())
            .map(|(name, _)| *name)
            .collect()
    }

    /// AND of every present condition, `None` when all are absent
    pub fn build(&self, input: &C) -> Option<Predicate> {
        Predicate::all_of(self.conditions.iter().map(|(_, condition)| condition(input)))
    }
}

impl<C> Default for DynamicFilter<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for DynamicFilter<C> {
    fn clone(&self) -> Self {
        Self {
            conditions: self.conditions.clone(),
        }
    }
}

impl<C> fmt::Debug for DynamicFilter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicFilter")
            .field("conditions", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Int, Text, TypedExpr};

    fn username() -> TypedExpr<Text> {
        TypedExpr::column("member", "Member", "username")
    }

    fn age() -> TypedExpr<Int> {
        TypedExpr::column("member", "Member", "age")
    }

    struct Search {
        username: Option<String>,
        age: Option<i32>,
    }

    fn search_filter() -> DynamicFilter<Search> {
        DynamicFilter::new()
            .condition("username", |s: &Search| {
                s.username.as_deref().map(|u| username().eq(u))
            })
            .condition("age", |s: &Search| s.age.map(|a| age().eq(a)))
    }

    #[test]
    fn test_and_flattens() {
        let predicate = username()
            .eq("member1")
            .and(age().eq(10))
            .and(age().gt(5));

        match predicate {
            Predicate::Compound { predicates, op } => {
                assert_eq!(op, LogicalOp::And);
                assert_eq!(predicates.len(), 3);
            }
            other => panic!("unexpected predicate {:?}", other),
        }
    }

    #[test]
    fn test_double_not_cancels() {
        let predicate = age().eq(10);
        assert_eq!(predicate.clone().not().not(), predicate);
    }

    #[test]
    fn test_all_of_skips_absent() {
        let predicate = Predicate::all_of([None, Some(age().eq(10)), None]);
        assert_eq!(predicate, Some(age().eq(10)));

        assert_eq!(Predicate::all_of([None, None]), None);
        assert_eq!(Predicate::all_of(Vec::new()), None);
    }

    #[test]
    fn test_dynamic_filter() {
        let filter = search_filter();

        let both = Search {
            username: Some("member1".to_string()),
            age: Some(10),
        };
        assert_eq!(
            filter.build(&both),
            Some(username().eq("member1").and(age().eq(10)))
        );
        assert_eq!(filter.active(&both), vec!["username", "age"]);

        let age_only = Search {
            username: None,
            age: Some(10),
        };
        assert_eq!(filter.build(&age_only), Some(age().eq(10)));

        let none = Search {
            username: None,
            age: None,
        };
        assert_eq!(filter.build(&none), None);
        assert!(filter.active(&none).is_empty());
    }

    #[test]
    fn test_boolean_builder() {
        let builder = BooleanBuilder::new();
        assert!(!builder.has_value());
        assert_eq!(builder.clone().build(), None);

        let predicate = builder
            .and(username().eq("member1"))
            .and_any_of([Some(age().eq(10)), None, Some(age().eq(20))])
            .build()
            .unwrap();

        assert_eq!(
            predicate.to_string(),
            "(member.username = \"member1\" and (member.age = 10 or member.age = 20))"
        );
    }
}
