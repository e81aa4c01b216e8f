//! In-memory executor with generated ids, used as the embedded fixture database.
//!
//! Rows are stored as JSON objects keyed by schema field name. Queries are
//! evaluated tuple by tuple: sources form a cross product, joins extend each
//! tuple, and predicates follow SQL three-valued logic (a comparison with null is
//! unknown, and only rows whose filter is true survive).

use crate::backend::{QueryExecutor, QueryResult, QueryRow};
use crate::builder::{Join, JoinType, NullHandling, OrderSpecifier, SelectQuery, SortDirection};
use crate::error::{QueryError, Result};
use crate::expr::{AggregateFunc, Expr, ValueKind};
use crate::model::{default_schema, Entity};
use crate::predicate::{ComparisonOp, LogicalOp, Operand, Predicate};
use crate::schema::{FieldType, SchemaRegistry};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;
use std::{ptr, slice};
use tokio::sync::RwLock;
use tracing::{debug, trace};

type Record = Map<String, Value>;

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<&'static str, Vec<Record>>,
    sequences: HashMap<&'static str, i64>,
}

impl Tables {
    fn table(&self, entity: &str) -> &[Record] {
        self.rows.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Schema-checked in-memory store implementing [`QueryExecutor`]
#[derive(Debug)]
pub struct MemoryBackend {
    schema: SchemaRegistry,
    tables: RwLock<Tables>,
}

impl MemoryBackend {
    pub fn new(schema: SchemaRegistry) -> Self {
        Self {
            schema,
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Backend over the member/team schema
    pub fn with_default_schema() -> Result<Self> {
        Ok(Self::new(default_schema()?))
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// Insert a new entity and assign its id.
    ///
    /// Fails if the entity already has an id, a non-nullable field is null, or a
    /// foreign key points at a missing row.
    pub async fn persist<E: Entity>(&self, entity: &mut E) -> Result<i64> {
        if let Some(id) = entity.id() {
            return Err(QueryError::Executor(format!(
                "{} {} is already persisted",
                E::ENTITY,
                id
            )));
        }

        let mut record = to_record(entity)?;
        let mut tables = self.tables.write().await;
        self.check_record(E::ENTITY, &record, &tables)?;

        let sequence = tables.sequences.entry(E::ENTITY).or_insert(0);
        *sequence += 1;
        let id = *sequence;

        record.insert("id".to_string(), Value::from(id));
        tables.rows.entry(E::ENTITY).or_default().push(record);
        entity.set_id(id);

        debug!(entity = E::ENTITY, id, "persisted");
        Ok(id)
    }

    /// Replace the stored row with the same id
    pub async fn merge<E: Entity>(&self, entity: &E) -> Result<()> {
        let id = entity.id().ok_or_else(|| {
            QueryError::Executor(format!("cannot merge a {} without id", E::ENTITY))
        })?;

        let record = to_record(entity)?;
        let mut tables = self.tables.write().await;
        self.check_record(E::ENTITY, &record, &tables)?;

        let slot = tables
            .rows
            .get_mut(E::ENTITY)
            .and_then(|rows| rows.iter_mut().find(|row| has_id(row, id)))
            .ok_or_else(|| QueryError::Executor(format!("{} {} not found", E::ENTITY, id)))?;
        *slot = record;

        debug!(entity = E::ENTITY, id, "merged");
        Ok(())
    }

    pub async fn find<E: Entity>(&self, id: i64) -> Result<Option<E>> {
        let tables = self.tables.read().await;
        match tables.table(E::ENTITY).iter().find(|row| has_id(row, id)) {
            Some(row) => Ok(Some(serde_json::from_value(Value::Object(row.clone()))?)),
            None => Ok(None),
        }
    }

    /// Drop every row and reset the id sequences
    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        *tables = Tables::default();
    }

    pub async fn row_count(&self, entity: &str) -> usize {
        self.tables.read().await.table(entity).len()
    }

    fn check_record(&self, entity: &str, record: &Record, tables: &Tables) -> Result<()> {
        let schema = self.schema.get(entity)?;

        for field in &schema.fields {
            if field.name == "id" {
                continue;
            }
            let value = record.get(field.name).unwrap_or(&Value::Null);
            if value.is_null() {
                if !field.nullable {
                    return Err(QueryError::Executor(format!(
                        "{}.{} must not be null",
                        entity, field.name
                    )));
                }
            } else if !fits(field.field_type, value) {
                return Err(QueryError::Executor(format!(
                    "{}.{} cannot hold {}",
                    entity, field.name, value
                )));
            }
        }

        for relation in schema.foreign_keys() {
            let value = match record.get(relation.local_field) {
                Some(value) if !value.is_null() => value,
                _ => continue,
            };
            let exists = tables
                .table(relation.target_entity)
                .iter()
                .any(|row| row.get(relation.target_field) == Some(value));
            if !exists {
                return Err(QueryError::Executor(format!(
                    "{}.{} references missing {} {}",
                    entity, relation.local_field, relation.target_entity, value
                )));
            }
        }

        Ok(())
    }

    /// Every entity, field and relation the query names must be registered
    fn check_query(&self, query: &SelectQuery) -> Result<()> {
        self.check_sources(query)?;

        let mut failure = None;
        let mut subqueries = Vec::new();
        query.walk(&mut |expr| {
            let checked = match expr {
                Expr::Column(column) => self.schema.field(column.entity, column.field).map(|_| ()),
                Expr::Entity { entity, .. } => self.schema.get(entity).map(|_| ()),
                Expr::Subquery(subquery) => {
                    subqueries.push((**subquery).clone());
                    Ok(())
                }
                _ => Ok(()),
            };
            if let Err(e) = checked {
                failure.get_or_insert(e);
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }

        for subquery in &subqueries {
            self.check_sources(subquery)?;
        }
        Ok(())
    }

    fn check_sources(&self, query: &SelectQuery) -> Result<()> {
        for source in &query.sources {
            self.schema.get(source.entity)?;
        }
        for join in &query.joins {
            self.schema.get(join.target.entity)?;
            if let Some(relation) = &join.relation {
                self.schema.field(relation.target_entity, relation.target_field)?;
            }
        }
        Ok(())
    }
}

fn to_record<E: Serialize>(entity: &E) -> Result<Record> {
    match serde_json::to_value(entity)? {
        Value::Object(record) => Ok(record),
        other => Err(QueryError::Schema(format!(
            "entity must serialize to an object, got {}",
            other
        ))),
    }
}

fn has_id(record: &Record, id: i64) -> bool {
    record.get("id").and_then(Value::as_i64) == Some(id)
}

fn fits(field_type: FieldType, value: &Value) -> bool {
    match (field_type.kind(), ValueKind::of(value)) {
        (ValueKind::Float, Some(ValueKind::Int)) => true,
        (expected, actual) => Some(expected) == actual,
    }
}

#[async_trait]
impl QueryExecutor for MemoryBackend {
    async fn execute(&self, query: &SelectQuery) -> Result<QueryResult> {
        self.check_query(query)?;

        let tables = self.tables.read().await;
        let rows = Evaluator::new(&tables).select(query, true)?;
        let labels = query
            .selections
            .iter()
            .map(|s| s.label())
            .collect::<Vec<_>>();

        trace!(rows = rows.len(), "memory execute");
        Ok(rows
            .into_iter()
            .map(|values| {
                let mut row = QueryRow::new();
                for (label, value) in labels.iter().zip(values) {
                    row.insert(label.clone(), value);
                }
                row
            })
            .collect())
    }

    async fn execute_count(&self, query: &SelectQuery) -> Result<u64> {
        self.check_query(query)?;

        let tables = self.tables.read().await;
        let count = Evaluator::new(&tables).select(query, false)?.len();

        trace!(count, "memory count");
        Ok(count as u64)
    }
}

/// Bound records of one candidate row, by alias; `None` is a left-join miss
#[derive(Debug, Clone, Default)]
struct Tuple<'a> {
    slots: Vec<(&'a str, Option<&'a Record>)>,
}

impl<'a> Tuple<'a> {
    fn bind(&self, alias: &'a str, record: Option<&'a Record>) -> Self {
        let mut tuple = self.clone();
        tuple.slots.push((alias, record));
        tuple
    }

    fn record(&self, alias: &str) -> Result<Option<&'a Record>> {
        self.slots
            .iter()
            .find(|(bound, _)| *bound == alias)
            .map(|(_, record)| *record)
            .ok_or_else(|| QueryError::Query(format!("Alias {} is not bound", alias)))
    }
}

/// Evaluates one query; subquery results are cached for the whole run
struct Evaluator<'a> {
    tables: &'a Tables,
    subqueries: RefCell<Vec<(&'a SelectQuery, Rc<Vec<Vec<Value>>>)>>,
}

impl<'a> Evaluator<'a> {
    fn new(tables: &'a Tables) -> Self {
        Self {
            tables,
            subqueries: RefCell::new(Vec::new()),
        }
    }

    /// Rows of an uncorrelated subquery, selected at most once
    fn subquery(&self, query: &'a SelectQuery) -> Result<Rc<Vec<Vec<Value>>>> {
        if let Some((_, rows)) = self
            .subqueries
            .borrow()
            .iter()
            .find(|(cached, _)| ptr::eq(*cached, query))
        {
            return Ok(Rc::clone(rows));
        }

        let rows = Rc::new(self.select(query, true)?);
        trace!(stage = "subquery", rows = rows.len());
        self.subqueries.borrow_mut().push((query, Rc::clone(&rows)));
        Ok(rows)
    }

    /// Projected rows; without `windowed` ordering and offset/limit are skipped
    fn select(&self, query: &'a SelectQuery, windowed: bool) -> Result<Vec<Vec<Value>>> {
        let tuples = self.scan(query)?;

        let mut filtered = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            if let Some(predicate) = &query.where_clause {
                if self.test(predicate, slice::from_ref(&tuple))? != Some(true) {
                    continue;
                }
            }
            filtered.push(tuple);
        }
        trace!(stage = "where", rows = filtered.len());

        let mut units = Vec::new();
        for group in self.group(query, filtered)? {
            if let Some(having) = &query.having {
                if self.test(having, &group)? != Some(true) {
                    continue;
                }
            }
            let values = query
                .selections
                .iter()
                .map(|s| self.eval(&s.expr, &group))
                .collect::<Result<Vec<_>>>()?;
            let keys = if windowed {
                query
                    .order_by
                    .iter()
                    .map(|o| self.eval(&o.expr, &group))
                    .collect::<Result<Vec<_>>>()?
            } else {
                Vec::new()
            };
            units.push((values, keys));
        }
        trace!(stage = "project", rows = units.len());

        if windowed && !query.order_by.is_empty() {
            units.sort_by(|(_, a), (_, b)| compare_keys(&query.order_by, a, b));
        }

        let mut rows = units.into_iter().map(|(values, _)| values).collect::<Vec<_>>();

        if query.distinct {
            let mut seen: Vec<Vec<Value>> = Vec::new();
            rows.retain(|row| {
                if seen.contains(row) {
                    false
                } else {
                    seen.push(row.clone());
                    true
                }
            });
        }

        if windowed {
            rows = rows
                .into_iter()
                .skip(query.offset.unwrap_or(0))
                .take(query.limit.unwrap_or(usize::MAX))
                .collect();
        }

        Ok(rows)
    }

    fn scan(&self, query: &'a SelectQuery) -> Result<Vec<Tuple<'a>>> {
        let mut tuples = vec![Tuple::default()];

        for source in &query.sources {
            let records = self.tables.table(source.entity);
            tuples = tuples
                .iter()
                .flat_map(|tuple| {
                    records
                        .iter()
                        .map(move |record| tuple.bind(source.alias.as_str(), Some(record)))
                })
                .collect();
        }
        trace!(stage = "from", rows = tuples.len());

        for join in &query.joins {
            tuples = self.join(join, tuples)?;
            trace!(stage = "join", alias = %join.target.alias, rows = tuples.len());
        }

        Ok(tuples)
    }

    fn join(&self, join: &'a Join, tuples: Vec<Tuple<'a>>) -> Result<Vec<Tuple<'a>>> {
        let records = self.tables.table(join.target.entity);
        let alias = join.target.alias.as_str();
        let mut joined = Vec::new();

        for tuple in tuples {
            let mut matched = false;

            for record in records {
                if let Some(relation) = &join.relation {
                    let local = tuple
                        .record(&relation.source_alias)?
                        .and_then(|source| source.get(relation.local_field));
                    if !keys_match(local, record.get(relation.target_field)) {
                        continue;
                    }
                }

                let candidate = tuple.bind(alias, Some(record));
                if let Some(on) = &join.on {
                    if self.test(on, slice::from_ref(&candidate))? != Some(true) {
                        continue;
                    }
                }

                matched = true;
                joined.push(candidate);
            }

            if !matched && join.join_type == JoinType::Left {
                joined.push(tuple.bind(alias, None));
            }
        }

        Ok(joined)
    }

    /// Partition tuples into evaluation units, groups in first-seen order
    fn group(&self, query: &'a SelectQuery, tuples: Vec<Tuple<'a>>) -> Result<Vec<Vec<Tuple<'a>>>> {
        if !query.is_aggregated() {
            return Ok(tuples.into_iter().map(|tuple| vec![tuple]).collect());
        }
        if query.group_by.is_empty() {
            return Ok(vec![tuples]);
        }

        let mut groups: Vec<(Vec<Value>, Vec<Tuple<'a>>)> = Vec::new();
        for tuple in tuples {
            let key = query
                .group_by
                .iter()
                .map(|expr| self.eval(expr, slice::from_ref(&tuple)))
                .collect::<Result<Vec<_>>>()?;
            match groups.iter_mut().find(|(existing, _)| *existing == key) {
                Some((_, members)) => members.push(tuple),
                None => groups.push((key, vec![tuple])),
            }
        }
        trace!(stage = "group", groups = groups.len());

        Ok(groups.into_iter().map(|(_, members)| members).collect())
    }

    /// Value of `expr` for a unit; non-aggregate parts read the unit's first tuple
    fn eval(&self, expr: &'a Expr, group: &[Tuple<'a>]) -> Result<Value> {
        match expr {
            Expr::Column(column) => match group.first() {
                Some(tuple) => Ok(tuple
                    .record(&column.alias)?
                    .and_then(|record| record.get(column.field))
                    .cloned()
                    .unwrap_or(Value::Null)),
                None => Ok(Value::Null),
            },
            Expr::Entity { alias, .. } => match group.first() {
                Some(tuple) => Ok(tuple
                    .record(alias)?
                    .map(|record| Value::Object(record.clone()))
                    .unwrap_or(Value::Null)),
                None => Ok(Value::Null),
            },
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Aggregate { func, arg } => {
                let mut values = Vec::with_capacity(group.len());
                for tuple in group {
                    let value = self.eval(arg, slice::from_ref(tuple))?;
                    if !value.is_null() {
                        values.push(value);
                    }
                }
                aggregate(*func, values)
            }
            Expr::Case {
                operand,
                branches,
                otherwise,
            } => {
                let value = self.eval(operand, group)?;
                if !value.is_null() {
                    for (when, then) in branches {
                        // a null branch never matches
                        if when.is_null() {
                            continue;
                        }
                        if compare(&value, when)? == Ordering::Equal {
                            return Ok(then.clone());
                        }
                    }
                }
                Ok(otherwise.clone())
            }
            Expr::Concat(left, right) => {
                let left = string_form(&self.eval(left, group)?);
                let right = string_form(&self.eval(right, group)?);
                Ok(match (left, right) {
                    (Some(left), Some(right)) => Value::String(left + &right),
                    _ => Value::Null,
                })
            }
            Expr::StringValue(inner) => Ok(string_form(&self.eval(inner, group)?)
                .map(Value::String)
                .unwrap_or(Value::Null)),
            Expr::Subquery(query) => self.scalar(query),
        }
    }

    fn scalar(&self, query: &'a SelectQuery) -> Result<Value> {
        let rows = self.subquery(query)?;
        if rows.len() > 1 {
            return Err(QueryError::Query(format!(
                "Scalar subquery returned {} rows",
                rows.len()
            )));
        }
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Three-valued truth of a predicate; `None` is unknown
    fn test(&self, predicate: &'a Predicate, group: &[Tuple<'a>]) -> Result<Option<bool>> {
        match predicate {
            Predicate::Simple { left, op, right } => {
                let left = self.eval(left, group)?;
                let right = right.as_ref();
                match op {
                    ComparisonOp::IsNull => Ok(Some(left.is_null())),
                    ComparisonOp::IsNotNull => Ok(Some(!left.is_null())),
                    ComparisonOp::In => self.membership(&left, right, group),
                    ComparisonOp::NotIn => Ok(self.membership(&left, right, group)?.map(|found| !found)),
                    ComparisonOp::Eq => self.comparison(&left, right, group, |o| o == Ordering::Equal),
                    ComparisonOp::Ne => self.comparison(&left, right, group, |o| o != Ordering::Equal),
                    ComparisonOp::Lt => self.comparison(&left, right, group, |o| o == Ordering::Less),
                    ComparisonOp::Le => self.comparison(&left, right, group, |o| o != Ordering::Greater),
                    ComparisonOp::Gt => self.comparison(&left, right, group, |o| o == Ordering::Greater),
                    ComparisonOp::Ge => self.comparison(&left, right, group, |o| o != Ordering::Less),
                }
            }
            Predicate::Compound { predicates, op } => {
                let mut unknown = false;
                for predicate in predicates {
                    match (op, self.test(predicate, group)?) {
                        (LogicalOp::And, Some(false)) => return Ok(Some(false)),
                        (LogicalOp::Or, Some(true)) => return Ok(Some(true)),
                        (_, None) => unknown = true,
                        _ => {}
                    }
                }
                Ok(if unknown {
                    None
                } else {
                    Some(*op == LogicalOp::And)
                })
            }
            Predicate::Not(inner) => Ok(self.test(inner, group)?.map(|value| !value)),
        }
    }

    fn comparison(
        &self,
        left: &Value,
        right: Option<&'a Operand>,
        group: &[Tuple<'a>],
        accept: fn(Ordering) -> bool,
    ) -> Result<Option<bool>> {
        let right = match right {
            Some(Operand::Expr(expr)) => self.eval(expr, group)?,
            Some(other) => {
                return Err(QueryError::Query(format!(
                    "comparison cannot take {} as operand",
                    other
                )))
            }
            None => return Err(QueryError::Query("comparison without operand".to_string())),
        };

        if left.is_null() || right.is_null() {
            return Ok(None);
        }
        Ok(Some(accept(compare(left, &right)?)))
    }

    fn membership(
        &self,
        left: &Value,
        right: Option<&'a Operand>,
        group: &[Tuple<'a>],
    ) -> Result<Option<bool>> {
        let candidates = match right {
            Some(Operand::List(values)) => values.clone(),
            Some(Operand::Subquery(query)) => self
                .subquery(query)?
                .iter()
                .map(|row| row.first().cloned().unwrap_or(Value::Null))
                .collect(),
            Some(Operand::Expr(expr)) => vec![self.eval(expr, group)?],
            None => return Err(QueryError::Query("in without operand".to_string())),
        };

        if left.is_null() {
            return Ok(None);
        }

        let mut unknown = false;
        for candidate in &candidates {
            if candidate.is_null() {
                unknown = true;
            } else if compare(left, candidate)? == Ordering::Equal {
                return Ok(Some(true));
            }
        }
        Ok(if unknown { None } else { Some(false) })
    }
}

fn keys_match(local: Option<&Value>, target: Option<&Value>) -> bool {
    match (local, target) {
        (Some(local), Some(target)) if !local.is_null() && !target.is_null() => {
            matches!(compare(local, target), Ok(Ordering::Equal))
        }
        _ => false,
    }
}

/// Order of two non-null values of the same kind
fn compare(a: &Value, b: &Value) -> Result<Ordering> {
    let ordering = match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x
                .as_f64()
                .zip(y.as_f64())
                .and_then(|(x, y)| x.partial_cmp(&y)),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    };
    ordering.ok_or_else(|| QueryError::Query(format!("cannot compare {} with {}", a, b)))
}

fn compare_keys(order: &[OrderSpecifier], a: &[Value], b: &[Value]) -> Ordering {
    for ((specifier, a), b) in order.iter().zip(a).zip(b) {
        let ordering = match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => null_position(specifier),
            (false, true) => null_position(specifier).reverse(),
            (false, false) => {
                let ordering = compare(a, b).unwrap_or(Ordering::Equal);
                match specifier.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Where a null key sorts relative to a non-null one
fn null_position(specifier: &OrderSpecifier) -> Ordering {
    match (specifier.nulls, specifier.direction) {
        (NullHandling::NullsFirst, _) => Ordering::Less,
        (NullHandling::NullsLast, _) => Ordering::Greater,
        (NullHandling::Default, SortDirection::Asc) => Ordering::Less,
        (NullHandling::Default, SortDirection::Desc) => Ordering::Greater,
    }
}

fn string_form(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn number(value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| QueryError::Query(format!("{} is not numeric", value)))
}

fn float(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

/// Aggregate over the non-null values of a group
fn aggregate(func: AggregateFunc, values: Vec<Value>) -> Result<Value> {
    match func {
        AggregateFunc::Count => Ok(Value::from(values.len() as u64)),
        AggregateFunc::CountDistinct => {
            let mut distinct: Vec<Value> = Vec::new();
            for value in values {
                if !distinct.contains(&value) {
                    distinct.push(value);
                }
            }
            Ok(Value::from(distinct.len() as u64))
        }
        AggregateFunc::Sum if values.is_empty() => Ok(Value::Null),
        AggregateFunc::Sum => {
            if values.iter().all(|v| v.as_i64().is_some()) {
                values
                    .iter()
                    .filter_map(Value::as_i64)
                    .try_fold(0i64, |total, v| total.checked_add(v))
                    .map(Value::from)
                    .ok_or_else(|| QueryError::Query("sum overflows i64".to_string()))
            } else {
                Ok(float(values.iter().map(number).sum::<Result<f64>>()?))
            }
        }
        AggregateFunc::Avg if values.is_empty() => Ok(Value::Null),
        AggregateFunc::Avg => {
            let total = values.iter().map(number).sum::<Result<f64>>()?;
            Ok(float(total / values.len() as f64))
        }
        AggregateFunc::Max => extreme(values, Ordering::Greater),
        AggregateFunc::Min => extreme(values, Ordering::Less),
    }
}

fn extreme(values: Vec<Value>, wanted: Ordering) -> Result<Value> {
    let mut best: Option<Value> = None;
    for value in values {
        best = Some(match best {
            Some(current) if compare(&value, &current)? != wanted => current,
            _ => value,
        });
    }
    Ok(best.unwrap_or(Value::Null))
}
