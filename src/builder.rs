use crate::backend::QueryRow;
use crate::error::{QueryError, Result};
use crate::expr::{EntityPath, Expr, Kind, RelationPath, Selection, TypedExpr};
use crate::predicate::{Operand, Predicate};
use crate::projection::{BindingStrategy, Projection};
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

/// Placement of null sort keys, independent of the direction.
///
/// `Default` orders null as the lowest value: first when ascending, last when
/// descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullHandling {
    Default,
    NullsFirst,
    NullsLast,
}

/// Join type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "inner join"),
            JoinType::Left => write!(f, "left join"),
        }
    }
}

/// ORDER BY key
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpecifier {
    pub expr: Expr,
    pub direction: SortDirection,
    pub nulls: NullHandling,
}

impl OrderSpecifier {
    pub fn nulls_first(mut self) -> Self {
        self.nulls = NullHandling::NullsFirst;
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = NullHandling::NullsLast;
        self
    }
}

impl fmt::Display for OrderSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.expr, self.direction)?;
        match self.nulls {
            NullHandling::Default => Ok(()),
            NullHandling::NullsFirst => write!(f, " nulls first"),
            NullHandling::NullsLast => write!(f, " nulls last"),
        }
    }
}

/// Aliased entity in FROM or JOIN position
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub entity: &'static str,
    pub alias: String,
}

impl Source {
    fn of<P: EntityPath>(path: &P) -> Self {
        Self {
            entity: path.entity_name(),
            alias: path.alias().to_string(),
        }
    }
}

/// Join clause.
///
/// With a `relation` the target row must satisfy the declared key equality; the
/// optional `on` predicate further narrows the eligible target rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub target: Source,
    pub relation: Option<RelationPath>,
    pub on: Option<Predicate>,
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relation {
            Some(relation) => write!(f, "{} {} {}", self.join_type, relation, self.target.alias)?,
            None => write!(
                f,
                "{} {} {}",
                self.join_type, self.target.entity, self.target.alias
            )?,
        }
        if let Some(on) = &self.on {
            write!(f, " on {}", on)?;
        }
        Ok(())
    }
}

/// Executor-facing description of a select query
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub selections: Vec<Selection>,
    pub sources: Vec<Source>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Predicate>,
    pub group_by: Vec<Expr>,
    pub having: Option<Predicate>,
    pub order_by: Vec<OrderSpecifier>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    pub distinct: bool,
}

impl SelectQuery {
    fn new(selections: Vec<Selection>) -> Self {
        Self {
            selections,
            sources: Vec::new(),
            joins: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            offset: None,
            limit: None,
            distinct: false,
        }
    }

    /// Whether rows collapse into groups: explicit grouping, or an aggregate in
    /// the projection, having or order by
    pub fn is_aggregated(&self) -> bool {
        !self.group_by.is_empty()
            || self.selections.iter().any(|s| s.expr.contains_aggregate())
            || self.having.as_ref().map_or(false, has_aggregate)
            || self.order_by.iter().any(|o| o.expr.contains_aggregate())
    }

    /// Whether `expr` has one value per group
    fn is_grouped(&self, expr: &Expr) -> bool {
        expr.contains_aggregate()
            || matches!(expr, Expr::Literal(_) | Expr::Subquery(_))
            || self.group_by.contains(expr)
    }

    /// Visit every expression of this query and of its nested subqueries
    pub fn walk(&self, visit: &mut dyn FnMut(&Expr)) {
        self.walk_with(true, visit);
    }

    fn walk_with(&self, into_subqueries: bool, visit: &mut dyn FnMut(&Expr)) {
        for selection in &self.selections {
            selection.expr.walk(into_subqueries, visit);
        }
        for join in &self.joins {
            if let Some(on) = &join.on {
                on.walk(into_subqueries, visit);
            }
        }
        if let Some(predicate) = &self.where_clause {
            predicate.walk(into_subqueries, visit);
        }
        for expr in &self.group_by {
            expr.walk(into_subqueries, visit);
        }
        if let Some(having) = &self.having {
            having.walk(into_subqueries, visit);
        }
        for order in &self.order_by {
            order.expr.walk(into_subqueries, visit);
        }
    }

    /// Definition-time checks shared by top-level queries and subqueries
    pub(crate) fn validate(&self) -> Result<()> {
        if self.selections.is_empty() {
            return Err(QueryError::Query("Projection must have at least one expression".to_string()));
        }

        if self.sources.is_empty() {
            return Err(QueryError::Query("Query must have at least one source".to_string()));
        }

        let mut bound = HashSet::new();
        for source in &self.sources {
            if !bound.insert(source.alias.as_str()) {
                return Err(QueryError::Query(format!("Alias {} is bound twice", source.alias)));
            }
        }

        // joins see only the aliases bound before them, plus their own target
        for join in &self.joins {
            if let Some(relation) = &join.relation {
                if !bound.contains(relation.source_alias.as_str()) {
                    return Err(QueryError::Query(format!(
                        "Join {} navigates from unbound alias {}",
                        relation, relation.source_alias
                    )));
                }
                if relation.target_entity != join.target.entity {
                    return Err(QueryError::Query(format!(
                        "Join {} targets {} but {} is a {}",
                        relation, relation.target_entity, join.target.alias, join.target.entity
                    )));
                }
            }

            if !bound.insert(join.target.alias.as_str()) {
                return Err(QueryError::Query(format!(
                    "Alias {} is bound twice",
                    join.target.alias
                )));
            }

            if let Some(on) = &join.on {
                let mut unbound = None;
                on.walk(false, &mut |expr| {
                    if unbound.is_none() {
                        unbound = unbound_alias(expr, &bound);
                    }
                });
                if let Some(alias) = unbound {
                    return Err(QueryError::Query(format!(
                        "Join {} refers to alias {} before it is bound",
                        join.target.alias, alias
                    )));
                }
            }
        }

        let mut unbound = None;
        let mut subqueries = Vec::new();
        self.walk_with(false, &mut |expr| {
            if let Some(alias) = unbound_alias(expr, &bound) {
                unbound.get_or_insert(alias);
            }
            if let Expr::Subquery(query) = expr {
                subqueries.push((**query).clone());
            }
        });
        if let Some(alias) = unbound {
            return Err(QueryError::Query(format!("Alias {} is not bound by from or join", alias)));
        }

        let predicates = [&self.where_clause, &self.having]
            .into_iter()
            .chain(self.joins.iter().map(|j| &j.on))
            .flatten();
        for predicate in predicates {
            collect_in_subqueries(predicate, &mut subqueries);
        }
        for subquery in &subqueries {
            subquery.validate()?;
        }

        if self.is_aggregated() {
            let keys = self
                .selections
                .iter()
                .map(|s| &s.expr)
                .chain(self.order_by.iter().map(|o| &o.expr));
            for expr in keys {
                if !self.is_grouped(expr) {
                    return Err(QueryError::Query(format!(
                        "{} must be aggregated or appear in group by",
                        expr
                    )));
                }
            }
        }

        Ok(())
    }

    /// Same query with its window replaced
    pub fn with_window(&self, offset: Option<usize>, limit: Option<usize>) -> Self {
        let mut query = self.clone();
        query.offset = offset;
        query.limit = limit;
        query
    }
}

/// Alias of a column or entity reference missing from `bound`
fn unbound_alias(expr: &Expr, bound: &HashSet<&str>) -> Option<String> {
    match expr {
        Expr::Column(column) if !bound.contains(column.alias.as_str()) => Some(column.alias.clone()),
        Expr::Entity { alias, .. } if !bound.contains(alias.as_str()) => Some(alias.clone()),
        _ => None,
    }
}

fn has_aggregate(predicate: &Predicate) -> bool {
    let mut found = false;
    predicate.walk(false, &mut |expr| found |= expr.is_aggregate());
    found
}

fn collect_in_subqueries(predicate: &Predicate, out: &mut Vec<SelectQuery>) {
    match predicate {
        Predicate::Simple {
            right: Some(Operand::Subquery(query)),
            ..
        } => out.push((**query).clone()),
        Predicate::Simple { .. } => {}
        Predicate::Compound { predicates, .. } => {
            for predicate in predicates {
                collect_in_subqueries(predicate, out);
            }
        }
        Predicate::Not(inner) => collect_in_subqueries(inner, out),
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "select ")?;
        if self.distinct {
            write!(f, "distinct ")?;
        }

        let selections = self
            .selections
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{}", selections)?;

        let sources = self
            .sources
            .iter()
            .map(|s| format!("{} {}", s.entity, s.alias))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, " from {}", sources)?;

        for join in &self.joins {
            write!(f, " {}", join)?;
        }

        if let Some(where_clause) = &self.where_clause {
            write!(f, " where {}", where_clause)?;
        }

        if !self.group_by.is_empty() {
            let keys = self
                .group_by
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " group by {}", keys)?;
        }

        if let Some(having) = &self.having {
            write!(f, " having {}", having)?;
        }

        if !self.order_by.is_empty() {
            let order = self
                .order_by
                .iter()
                .map(|o| o.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " order by {}", order)?;
        }

        if let Some(limit) = self.limit {
            write!(f, " limit {}", limit)?;
        }

        if let Some(offset) = self.offset {
            write!(f, " offset {}", offset)?;
        }

        Ok(())
    }
}

/// SELECT query builder.
///
/// Every method consumes the builder and returns the extended one; clone a
/// partially built builder to reuse it as a template.
pub struct SelectBuilder<R> {
    query: SelectQuery,
    projection: Projection<R>,
    misuse: Option<String>,
}

impl<R> SelectBuilder<R> {
    /// Create a new SELECT query builder for a projection
    pub fn new(projection: Projection<R>) -> Self {
        Self {
            query: SelectQuery::new(projection.selections().to_vec()),
            projection,
            misuse: None,
        }
    }

    /// Add a FROM source; several sources form a cross product
    pub fn from<P: EntityPath>(mut self, path: &P) -> Self {
        self.query.sources.push(Source::of(path));
        self
    }

    /// Add a WHERE condition, ANDed with any existing one
    pub fn where_(mut self, predicate: Predicate) -> Self {
        self.query.where_clause = Some(match self.query.where_clause.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Add every present condition; absent ones are skipped
    pub fn where_all<I>(self, clauses: I) -> Self
    where
        I: IntoIterator<Item = Option<Predicate>>,
    {
        match Predicate::all_of(clauses) {
            Some(predicate) => self.where_(predicate),
            None => self,
        }
    }

    fn push_join<P: EntityPath>(
        mut self,
        join_type: JoinType,
        relation: Option<RelationPath>,
        target: &P,
    ) -> Self {
        self.query.joins.push(Join {
            join_type,
            target: Source::of(target),
            relation,
            on: None,
        });
        self
    }

    /// Inner join along a declared relation
    pub fn join<P: EntityPath>(self, relation: RelationPath, target: &P) -> Self {
        self.inner_join(relation, target)
    }

    pub fn inner_join<P: EntityPath>(self, relation: RelationPath, target: &P) -> Self {
        self.push_join(JoinType::Inner, Some(relation), target)
    }

    pub fn left_join<P: EntityPath>(self, relation: RelationPath, target: &P) -> Self {
        self.push_join(JoinType::Left, Some(relation), target)
    }

    /// Inner join an unrelated entity; match it with `on`
    pub fn inner_join_entity<P: EntityPath>(self, target: &P) -> Self {
        self.push_join(JoinType::Inner, None, target)
    }

    /// Left join an unrelated entity; match it with `on`
    pub fn left_join_entity<P: EntityPath>(self, target: &P) -> Self {
        self.push_join(JoinType::Left, None, target)
    }

    /// Restrict the target rows of the most recent join
    pub fn on(mut self, predicate: Predicate) -> Self {
        match self.query.joins.last_mut() {
            Some(join) => {
                join.on = Some(match join.on.take() {
                    Some(existing) => existing.and(predicate),
                    None => predicate,
                });
            }
            None => {
                self.misuse
                    .get_or_insert_with(|| format!("on({}) without a preceding join", predicate));
            }
        }
        self
    }

    /// Add a GROUP BY key
    pub fn group_by(mut self, key: impl Into<Expr>) -> Self {
        self.query.group_by.push(key.into());
        self
    }

    /// Add a HAVING condition
    pub fn having(mut self, predicate: Predicate) -> Self {
        self.query.having = Some(match self.query.having.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Add an ORDER BY key after the existing ones
    pub fn order_by(mut self, order: OrderSpecifier) -> Self {
        self.query.order_by.push(order);
        self
    }

    /// Set OFFSET
    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Set LIMIT
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Use DISTINCT
    pub fn distinct(mut self) -> Self {
        self.query.distinct = true;
        self
    }

    /// Validate and freeze the query
    pub fn build(self) -> Result<Query<R>> {
        if let Some(misuse) = self.misuse {
            return Err(QueryError::Query(misuse));
        }

        self.query.validate()?;

        Ok(Query {
            select: self.query,
            projection: self.projection,
        })
    }
}

impl<E> SelectBuilder<E>
where
    E: serde::de::DeserializeOwned + Send + 'static,
{
    /// `select(path).from(path)` in one step
    pub fn select_from<P: EntityPath<Entity = E>>(path: &P) -> Self {
        SelectBuilder::new(Projection::entity(path)).from(path)
    }
}

impl<R> Clone for SelectBuilder<R> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            projection: self.projection.clone(),
            misuse: self.misuse.clone(),
        }
    }
}

impl<R> fmt::Debug for SelectBuilder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectBuilder")
            .field("query", &self.query)
            .field("strategy", &self.projection.strategy())
            .finish()
    }
}

/// A validated, immutable query and the mapping of its rows to `R`
pub struct Query<R> {
    select: SelectQuery,
    projection: Projection<R>,
}

impl<R> Query<R> {
    pub fn select_query(&self) -> &SelectQuery {
        &self.select
    }

    pub fn projection(&self) -> &Projection<R> {
        &self.projection
    }

    pub fn strategy(&self) -> BindingStrategy {
        self.projection.strategy()
    }

    pub fn offset(&self) -> Option<usize> {
        self.select.offset
    }

    pub fn limit(&self) -> Option<usize> {
        self.select.limit
    }

    /// Copy of this query with a different LIMIT
    pub fn with_limit(&self, limit: usize) -> Self {
        Self {
            select: self.select.with_window(self.select.offset, Some(limit)),
            projection: self.projection.clone(),
        }
    }

    pub fn map_row(&self, row: &QueryRow) -> Result<R> {
        self.projection.map(row)
    }
}

impl<R> Clone for Query<R> {
    fn clone(&self) -> Self {
        Self {
            select: self.select.clone(),
            projection: self.projection.clone(),
        }
    }
}

impl<R> fmt::Debug for Query<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("select", &self.select)
            .field("strategy", &self.projection.strategy())
            .finish()
    }
}

impl<R> fmt::Display for Query<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.select)
    }
}

/// Scalar subquery builder, usable wherever an expression of kind `K` is
pub struct SubQuery<K> {
    query: SelectQuery,
    kind: PhantomData<K>,
}

impl<K: Kind> SubQuery<K> {
    pub fn select(expr: &TypedExpr<K>) -> Self {
        Self {
            query: SelectQuery::new(vec![Selection::from(expr)]),
            kind: PhantomData,
        }
    }

    pub fn from<P: EntityPath>(mut self, path: &P) -> Self {
        self.query.sources.push(Source::of(path));
        self
    }

    pub fn where_(mut self, predicate: Predicate) -> Self {
        self.query.where_clause = Some(match self.query.where_clause.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn as_expr(self) -> TypedExpr<K> {
        TypedExpr::new(Expr::Subquery(Box::new(self.query)))
    }
}
