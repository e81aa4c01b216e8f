//! Typed expressions over entity fields.
//!
//! Every expression is an untyped [`Expr`] tree underneath. [`TypedExpr<K>`] tags
//! it with a value-kind marker (`Text`, `Int`, `Float`, `Bool`) so comparisons,
//! aggregates and projections are checked by the compiler: `member.age.eq("x")`
//! does not type-check, and `sum()`/`avg()` only exist on numeric kinds.

use crate::builder::{NullHandling, OrderSpecifier, SelectQuery, SortDirection};
use crate::predicate::{ComparisonOp, Operand, Predicate};
use crate::schema::{FieldDef, RelationDef};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

/// Runtime tag of a value kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Int,
    Float,
    Bool,
}

impl ValueKind {
    /// Kind of a literal value, `None` for null or composite values
    pub fn of(value: &Value) -> Option<ValueKind> {
        match value {
            Value::String(_) => Some(ValueKind::Text),
            Value::Number(n) if n.is_f64() => Some(ValueKind::Float),
            Value::Number(_) => Some(ValueKind::Int),
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// Compile-time value kind marker
pub trait Kind: fmt::Debug + Clone + Send + Sync + 'static {
    const KIND: ValueKind;

    /// Rust type a non-null value of this kind maps to
    type Native: serde::de::DeserializeOwned + Send + 'static;
}

/// Kinds that support `sum` and `avg`
pub trait Numeric: Kind {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Text;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Int;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Float;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bool;

impl Kind for Text {
    const KIND: ValueKind = ValueKind::Text;
    type Native = String;
}

impl Kind for Int {
    const KIND: ValueKind = ValueKind::Int;
    type Native = i64;
}

impl Kind for Float {
    const KIND: ValueKind = ValueKind::Float;
    type Native = f64;
}

impl Kind for Bool {
    const KIND: ValueKind = ValueKind::Bool;
    type Native = bool;
}

impl Numeric for Int {}
impl Numeric for Float {}

/// A Rust literal usable as an operand of kind `Self::Kind`
pub trait Literal {
    type Kind: Kind;

    fn into_value(self) -> Value;

    /// Whether this is a missing optional value rather than a present one
    fn is_absent(&self) -> bool {
        false
    }
}

impl Literal for &str {
    type Kind = Text;

    fn into_value(self) -> Value {
        Value::String(self.to_string())
    }
}

impl Literal for String {
    type Kind = Text;

    fn into_value(self) -> Value {
        Value::String(self)
    }
}

impl Literal for &String {
    type Kind = Text;

    fn into_value(self) -> Value {
        Value::String(self.clone())
    }
}

impl Literal for i32 {
    type Kind = Int;

    fn into_value(self) -> Value {
        Value::Number(self.into())
    }
}

impl Literal for i64 {
    type Kind = Int;

    fn into_value(self) -> Value {
        Value::Number(self.into())
    }
}

/// NaN has no JSON form; it becomes a null literal that compares as unknown.
impl Literal for f64 {
    type Kind = Float;

    fn into_value(self) -> Value {
        serde_json::Number::from_f64(self)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

impl Literal for bool {
    type Kind = Bool;

    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl<T: Literal> Literal for Option<T> {
    type Kind = T::Kind;

    fn into_value(self) -> Value {
        self.map(Literal::into_value).unwrap_or(Value::Null)
    }

    fn is_absent(&self) -> bool {
        self.is_none()
    }
}

/// Aggregate function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunc::Count => write!(f, "count"),
            AggregateFunc::CountDistinct => write!(f, "count_distinct"),
            AggregateFunc::Sum => write!(f, "sum"),
            AggregateFunc::Avg => write!(f, "avg"),
            AggregateFunc::Min => write!(f, "min"),
            AggregateFunc::Max => write!(f, "max"),
        }
    }
}

/// Reference to one field of an aliased entity
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub alias: String,
    pub entity: &'static str,
    pub field: &'static str,
    pub kind: ValueKind,
}

/// Untyped expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    /// A whole entity row, materialized as a JSON object (null when a left join misses)
    Entity {
        alias: String,
        entity: &'static str,
    },
    Literal(Value),
    Aggregate {
        func: AggregateFunc,
        arg: Box<Expr>,
    },
    Case {
        operand: Box<Expr>,
        branches: Vec<(Value, Value)>,
        otherwise: Value,
    },
    Concat(Box<Expr>, Box<Expr>),
    StringValue(Box<Expr>),
    /// Uncorrelated scalar subquery
    Subquery(Box<SelectQuery>),
}

impl Expr {
    /// Natural column label used when no alias is given
    pub fn label(&self) -> String {
        match self {
            Expr::Column(column) => column.field.to_string(),
            Expr::Entity { alias, .. } => alias.clone(),
            Expr::Literal(value) => match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            Expr::Aggregate { func, arg } => format!("{}({})", func, arg.label()),
            Expr::Case { .. } => "case".to_string(),
            Expr::Concat(..) => "concat".to_string(),
            Expr::StringValue(inner) => format!("str({})", inner.label()),
            Expr::Subquery(_) => "subquery".to_string(),
        }
    }

    /// Statically known value kind, if any
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Expr::Column(column) => Some(column.kind),
            Expr::Entity { .. } => None,
            Expr::Literal(value) => ValueKind::of(value),
            Expr::Aggregate { func, arg } => match func {
                AggregateFunc::Count | AggregateFunc::CountDistinct => Some(ValueKind::Int),
                AggregateFunc::Avg => Some(ValueKind::Float),
                AggregateFunc::Sum | AggregateFunc::Min | AggregateFunc::Max => arg.kind(),
            },
            Expr::Case {
                branches,
                otherwise,
                ..
            } => branches
                .first()
                .and_then(|(_, then)| ValueKind::of(then))
                .or_else(|| ValueKind::of(otherwise)),
            Expr::Concat(..) | Expr::StringValue(_) => Some(ValueKind::Text),
            Expr::Subquery(query) => query.selections.first().and_then(|s| s.expr.kind()),
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Expr::Aggregate { .. })
    }

    /// Whether an aggregate appears in this expression outside of subqueries
    pub fn contains_aggregate(&self) -> bool {
        let mut found = false;
        self.walk(false, &mut |expr| found |= expr.is_aggregate());
        found
    }

    /// Visit this expression and its children depth-first.
    ///
    /// With `into_subqueries` the walk also descends into every expression of
    /// nested subqueries.
    pub fn walk(&self, into_subqueries: bool, visit: &mut dyn FnMut(&Expr)) {
        visit(self);
        match self {
            Expr::Column(_) | Expr::Entity { .. } | Expr::Literal(_) => {}
            Expr::Aggregate { arg, .. } => arg.walk(into_subqueries, visit),
            Expr::Case { operand, .. } => operand.walk(into_subqueries, visit),
            Expr::Concat(left, right) => {
                left.walk(into_subqueries, visit);
                right.walk(into_subqueries, visit);
            }
            Expr::StringValue(inner) => inner.walk(into_subqueries, visit),
            Expr::Subquery(query) => {
                if into_subqueries {
                    query.walk(visit);
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(column) => write!(f, "{}.{}", column.alias, column.field),
            Expr::Entity { alias, .. } => write!(f, "{}", alias),
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Aggregate { func, arg } => write!(f, "{}({})", func, arg),
            Expr::Case {
                operand,
                branches,
                otherwise,
            } => {
                write!(f, "case {}", operand)?;
                for (when, then) in branches {
                    write!(f, " when {} then {}", when, then)?;
                }
                write!(f, " else {} end", otherwise)
            }
            Expr::Concat(left, right) => write!(f, "concat({}, {})", left, right),
            Expr::StringValue(inner) => write!(f, "str({})", inner),
            Expr::Subquery(query) => write!(f, "({})", query),
        }
    }
}

/// An [`Expr`] whose value kind is known at compile time
#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpr<K> {
    expr: Expr,
    kind: PhantomData<K>,
}

impl<K: Kind> TypedExpr<K> {
    pub(crate) fn new(expr: Expr) -> Self {
        Self {
            expr,
            kind: PhantomData,
        }
    }

    /// Typed reference to `alias.field`
    pub fn column(alias: impl Into<String>, entity: &'static str, field: &'static str) -> Self {
        Self::new(Expr::Column(ColumnRef {
            alias: alias.into(),
            entity,
            field,
            kind: K::KIND,
        }))
    }

    /// Typed reference built from a schema field definition
    pub fn field(alias: impl Into<String>, entity: &'static str, def: &FieldDef) -> Self {
        debug_assert_eq!(def.field_type.kind(), K::KIND, "field {} kind", def.name);
        Self::column(alias, entity, def.name)
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn into_expr(self) -> Expr {
        self.expr
    }

    fn compare(&self, op: ComparisonOp, right: Operand) -> Predicate {
        Predicate::Simple {
            left: self.expr.clone(),
            op,
            right: Some(right),
        }
    }

    fn compare_literal<V: Literal<Kind = K>>(&self, op: ComparisonOp, value: V) -> Predicate {
        self.compare(op, Operand::Expr(Expr::Literal(value.into_value())))
    }

    /// `self = value`; an absent value becomes `self IS NULL`
    pub fn eq<V: Literal<Kind = K>>(&self, value: V) -> Predicate {
        if value.is_absent() {
            self.is_null()
        } else {
            self.compare_literal(ComparisonOp::Eq, value)
        }
    }

    /// `self <> value`; an absent value becomes `self IS NOT NULL`
    pub fn ne<V: Literal<Kind = K>>(&self, value: V) -> Predicate {
        if value.is_absent() {
            self.is_not_null()
        } else {
            self.compare_literal(ComparisonOp::Ne, value)
        }
    }

    pub fn gt<V: Literal<Kind = K>>(&self, value: V) -> Predicate {
        self.compare_literal(ComparisonOp::Gt, value)
    }

    pub fn goe<V: Literal<Kind = K>>(&self, value: V) -> Predicate {
        self.compare_literal(ComparisonOp::Ge, value)
    }

    pub fn lt<V: Literal<Kind = K>>(&self, value: V) -> Predicate {
        self.compare_literal(ComparisonOp::Lt, value)
    }

    pub fn loe<V: Literal<Kind = K>>(&self, value: V) -> Predicate {
        self.compare_literal(ComparisonOp::Le, value)
    }

    pub fn in_<V, I>(&self, values: I) -> Predicate
    where
        V: Literal<Kind = K>,
        I: IntoIterator<Item = V>,
    {
        let values = values.into_iter().map(Literal::into_value).collect();
        self.compare(ComparisonOp::In, Operand::List(values))
    }

    pub fn not_in<V, I>(&self, values: I) -> Predicate
    where
        V: Literal<Kind = K>,
        I: IntoIterator<Item = V>,
    {
        let values = values.into_iter().map(Literal::into_value).collect();
        self.compare(ComparisonOp::NotIn, Operand::List(values))
    }

    /// `self IN (subquery)`
    pub fn in_query(&self, subquery: &TypedExpr<K>) -> Predicate {
        match &subquery.expr {
            Expr::Subquery(query) => self.compare(ComparisonOp::In, Operand::Subquery(query.clone())),
            other => self.compare(ComparisonOp::In, Operand::Expr(other.clone())),
        }
    }

    pub fn is_null(&self) -> Predicate {
        Predicate::Simple {
            left: self.expr.clone(),
            op: ComparisonOp::IsNull,
            right: None,
        }
    }

    pub fn is_not_null(&self) -> Predicate {
        Predicate::Simple {
            left: self.expr.clone(),
            op: ComparisonOp::IsNotNull,
            right: None,
        }
    }

    /// `self = other` for two expressions of the same kind
    pub fn eq_expr(&self, other: &TypedExpr<K>) -> Predicate {
        self.compare(ComparisonOp::Eq, Operand::Expr(other.expr.clone()))
    }

    pub fn ne_expr(&self, other: &TypedExpr<K>) -> Predicate {
        self.compare(ComparisonOp::Ne, Operand::Expr(other.expr.clone()))
    }

    pub fn gt_expr(&self, other: &TypedExpr<K>) -> Predicate {
        self.compare(ComparisonOp::Gt, Operand::Expr(other.expr.clone()))
    }

    pub fn goe_expr(&self, other: &TypedExpr<K>) -> Predicate {
        self.compare(ComparisonOp::Ge, Operand::Expr(other.expr.clone()))
    }

    pub fn lt_expr(&self, other: &TypedExpr<K>) -> Predicate {
        self.compare(ComparisonOp::Lt, Operand::Expr(other.expr.clone()))
    }

    pub fn loe_expr(&self, other: &TypedExpr<K>) -> Predicate {
        self.compare(ComparisonOp::Le, Operand::Expr(other.expr.clone()))
    }

    pub fn asc(&self) -> OrderSpecifier {
        OrderSpecifier {
            expr: self.expr.clone(),
            direction: SortDirection::Asc,
            nulls: NullHandling::Default,
        }
    }

    pub fn desc(&self) -> OrderSpecifier {
        OrderSpecifier {
            expr: self.expr.clone(),
            direction: SortDirection::Desc,
            nulls: NullHandling::Default,
        }
    }

    fn aggregate<R: Kind>(&self, func: AggregateFunc) -> TypedExpr<R> {
        TypedExpr::new(Expr::Aggregate {
            func,
            arg: Box::new(self.expr.clone()),
        })
    }

    /// Number of non-null values
    pub fn count(&self) -> TypedExpr<Int> {
        self.aggregate(AggregateFunc::Count)
    }

    pub fn count_distinct(&self) -> TypedExpr<Int> {
        self.aggregate(AggregateFunc::CountDistinct)
    }

    pub fn max(&self) -> TypedExpr<K> {
        self.aggregate(AggregateFunc::Max)
    }

    pub fn min(&self) -> TypedExpr<K> {
        self.aggregate(AggregateFunc::Min)
    }

    /// Cast to its string form
    pub fn string_value(&self) -> TypedExpr<Text> {
        TypedExpr::new(Expr::StringValue(Box::new(self.expr.clone())))
    }

    /// Select this expression under another column label
    pub fn as_(&self, alias: impl Into<String>) -> Selection {
        Selection {
            expr: self.expr.clone(),
            alias: Some(alias.into()),
        }
    }

    /// Start a simple `CASE self WHEN .. THEN ..` expression
    pub fn when<V: Literal<Kind = K>>(&self, value: V) -> CaseWhen<K> {
        CaseWhen {
            operand: self.expr.clone(),
            when: value.into_value(),
            kind: PhantomData,
        }
    }
}

impl<K: Numeric> TypedExpr<K> {
    pub fn sum(&self) -> TypedExpr<K> {
        self.aggregate(AggregateFunc::Sum)
    }

    pub fn avg(&self) -> TypedExpr<Float> {
        self.aggregate(AggregateFunc::Avg)
    }

    /// The same value as a double, comparable with float expressions
    pub fn as_float(&self) -> TypedExpr<Float> {
        TypedExpr::new(self.expr.clone())
    }
}

impl TypedExpr<Text> {
    pub fn concat(&self, suffix: &str) -> TypedExpr<Text> {
        TypedExpr::new(Expr::Concat(
            Box::new(self.expr.clone()),
            Box::new(Expr::Literal(Value::String(suffix.to_string()))),
        ))
    }

    pub fn concat_expr(&self, suffix: &TypedExpr<Text>) -> TypedExpr<Text> {
        TypedExpr::new(Expr::Concat(
            Box::new(self.expr.clone()),
            Box::new(suffix.expr.clone()),
        ))
    }
}

/// A constant projected as-is for every row
pub fn constant<V: Literal>(value: V) -> TypedExpr<V::Kind> {
    TypedExpr::new(Expr::Literal(value.into_value()))
}

/// `CASE x WHEN v` waiting for its first `THEN`
#[derive(Debug, Clone)]
pub struct CaseWhen<K> {
    operand: Expr,
    when: Value,
    kind: PhantomData<K>,
}

impl<K: Kind> CaseWhen<K> {
    pub fn then<V: Literal>(self, value: V) -> CaseBuilder<K, V::Kind> {
        CaseBuilder {
            operand: self.operand,
            branches: vec![(self.when, value.into_value())],
            kind: PhantomData,
        }
    }
}

/// Case expression with at least one branch; `R` is the result kind
#[derive(Debug, Clone)]
pub struct CaseBuilder<K, R> {
    operand: Expr,
    branches: Vec<(Value, Value)>,
    kind: PhantomData<(K, R)>,
}

impl<K: Kind, R: Kind> CaseBuilder<K, R> {
    pub fn when<V: Literal<Kind = K>>(self, value: V) -> CaseWhenThen<K, R> {
        CaseWhenThen {
            builder: self,
            when: value.into_value(),
        }
    }

    pub fn otherwise<V: Literal<Kind = R>>(self, value: V) -> TypedExpr<R> {
        TypedExpr::new(Expr::Case {
            operand: Box::new(self.operand),
            branches: self.branches,
            otherwise: value.into_value(),
        })
    }
}

/// Further `WHEN` waiting for its `THEN`
#[derive(Debug, Clone)]
pub struct CaseWhenThen<K, R> {
    builder: CaseBuilder<K, R>,
    when: Value,
}

impl<K: Kind, R: Kind> CaseWhenThen<K, R> {
    pub fn then<V: Literal<Kind = R>>(mut self, value: V) -> CaseBuilder<K, R> {
        self.builder.branches.push((self.when, value.into_value()));
        self.builder
    }
}

/// One projected column: an expression and an optional label override
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl Selection {
    pub fn label(&self) -> String {
        self.alias.clone().unwrap_or_else(|| self.expr.label())
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} as {}", self.expr, alias),
            None => write!(f, "{}", self.expr),
        }
    }
}

impl From<Expr> for Selection {
    fn from(expr: Expr) -> Self {
        Selection { expr, alias: None }
    }
}

impl<K: Kind> From<TypedExpr<K>> for Selection {
    fn from(expr: TypedExpr<K>) -> Self {
        Selection {
            expr: expr.expr,
            alias: None,
        }
    }
}

impl<K: Kind> From<&TypedExpr<K>> for Selection {
    fn from(expr: &TypedExpr<K>) -> Self {
        Selection {
            expr: expr.expr.clone(),
            alias: None,
        }
    }
}

impl<K: Kind> From<TypedExpr<K>> for Expr {
    fn from(expr: TypedExpr<K>) -> Self {
        expr.expr
    }
}

impl<K: Kind> From<&TypedExpr<K>> for Expr {
    fn from(expr: &TypedExpr<K>) -> Self {
        expr.expr.clone()
    }
}

/// An aliased entity usable as a query source or join target
pub trait EntityPath {
    type Entity;

    fn alias(&self) -> &str;

    fn entity_name(&self) -> &'static str;

    /// The whole entity as a single projected column
    fn to_expr(&self) -> Expr {
        Expr::Entity {
            alias: self.alias().to_string(),
            entity: self.entity_name(),
        }
    }

    /// Number of rows where this entity is present
    fn count(&self) -> TypedExpr<Int> {
        TypedExpr::new(Expr::Aggregate {
            func: AggregateFunc::Count,
            arg: Box::new(self.to_expr()),
        })
    }
}

/// A declared relationship navigated from an aliased source entity
#[derive(Debug, Clone, PartialEq)]
pub struct RelationPath {
    pub source_alias: String,
    pub name: &'static str,
    pub local_field: &'static str,
    pub target_entity: &'static str,
    pub target_field: &'static str,
}

impl RelationPath {
    /// Navigate a declared relation from `source_alias`
    pub fn navigate(source_alias: impl Into<String>, def: &RelationDef) -> Self {
        Self {
            source_alias: source_alias.into(),
            name: def.name,
            local_field: def.local_field,
            target_entity: def.target_entity,
            target_field: def.target_field,
        }
    }
}

impl fmt::Display for RelationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.source_alias, self.name)
    }
}
