//! Mapping of result rows onto caller types.
//!
//! A [`Projection<R>`] fixes both the selected expressions and how each row
//! becomes an `R`. The strategy is picked once, when the projection is defined:
//!
//! - `Tuple`: rows come back as [`QueryRow`]s.
//! - `ByName`: columns are matched to the fields of a serde type by label.
//! - `ByConstructor`: columns are passed positionally to a Rust function whose
//!   arity and argument kinds are checked when the projection is built.
//! - `PreTyped`: the target type declares its own typed projection, so the
//!   compiler checks the shape.

use crate::backend::QueryRow;
use crate::error::{QueryError, Result};
use crate::expr::{EntityPath, Kind, Selection, TypedExpr, ValueKind};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// How a projection turns rows into values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingStrategy {
    Tuple,
    ByName,
    ByConstructor,
    PreTyped,
}

type RowMapper<R> = Arc<dyn Fn(&QueryRow) -> Result<R> + Send + Sync>;

/// Selected expressions plus the row mapper for `R`
pub struct Projection<R> {
    selections: Vec<Selection>,
    strategy: BindingStrategy,
    mapper: RowMapper<R>,
}

impl<R> Projection<R> {
    fn with_mapper<F>(selections: Vec<Selection>, strategy: BindingStrategy, mapper: F) -> Self
    where
        F: Fn(&QueryRow) -> Result<R> + Send + Sync + 'static,
    {
        Self {
            selections,
            strategy,
            mapper: Arc::new(mapper),
        }
    }

    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }

    pub fn strategy(&self) -> BindingStrategy {
        self.strategy
    }

    pub fn map(&self, row: &QueryRow) -> Result<R> {
        (self.mapper)(row)
    }
}

impl<R> Clone for Projection<R> {
    fn clone(&self) -> Self {
        Self {
            selections: self.selections.clone(),
            strategy: self.strategy,
            mapper: Arc::clone(&self.mapper),
        }
    }
}

impl<R> fmt::Debug for Projection<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projection")
            .field("selections", &self.selections)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl Projection<QueryRow> {
    /// Rows as named, ordered tuples
    pub fn tuple(selections: impl IntoSelections) -> Self {
        Self::with_mapper(selections.into_selections(), BindingStrategy::Tuple, |row| {
            Ok(row.clone())
        })
    }
}

impl<T> Projection<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// A whole entity, bound by field name
    pub fn entity<P: EntityPath<Entity = T>>(path: &P) -> Self {
        let selection = Selection::from(path.to_expr());
        let label = selection.label();
        Self::with_mapper(vec![selection], BindingStrategy::ByName, move |row| {
            let value = row.value(&label).cloned().unwrap_or(Value::Null);
            serde_json::from_value(value).map_err(|e| {
                QueryError::TypeMapping(format!("cannot bind entity column {}: {}", label, e))
            })
        })
    }
}

impl<T> Projection<T>
where
    T: Serialize + DeserializeOwned + Default + Send + 'static,
{
    /// Bind columns to the fields of `T` by case-sensitive label.
    ///
    /// A field with no matching column keeps its `T::default()` value; a column
    /// with no matching field is ignored.
    pub fn fields(selections: impl IntoSelections) -> Self {
        Self::with_mapper(selections.into_selections(), BindingStrategy::ByName, |row| {
            let mut target = match serde_json::to_value(T::default())? {
                Value::Object(map) => map,
                _ => {
                    return Err(QueryError::TypeMapping(
                        "field binding target must serialize to a struct".to_string(),
                    ))
                }
            };
            overlay(&mut target, row);
            serde_json::from_value(Value::Object(target))
                .map_err(|e| QueryError::TypeMapping(format!("cannot bind fields: {}", e)))
        })
    }
}

fn overlay(target: &mut Map<String, Value>, row: &QueryRow) {
    for (label, value) in row.columns() {
        if let Some(slot) = target.get_mut(label) {
            *slot = value.clone();
        }
    }
}

impl<T: Send + 'static> Projection<T> {
    /// Bind columns positionally to a constructor function.
    ///
    /// Fails with [`QueryError::InvalidProjectionArity`] when the function takes a
    /// different number of arguments than there are selections, and with
    /// [`QueryError::TypeMapping`] when a selection's kind cannot feed its argument.
    pub fn constructor<Args, C>(selections: impl IntoSelections, constructor: C) -> Result<Self>
    where
        C: Constructor<T, Args>,
    {
        let selections = selections.into_selections();
        let params = C::params();

        if params.len() != selections.len() {
            return Err(QueryError::InvalidProjectionArity {
                expected: params.len(),
                actual: selections.len(),
            });
        }

        for (position, (selection, accepts)) in selections.iter().zip(&params).enumerate() {
            if let Some(kind) = selection.expr.kind() {
                if !accepts(kind) {
                    return Err(QueryError::TypeMapping(format!(
                        "constructor argument {} cannot take {} of kind {:?}",
                        position, selection.expr, kind
                    )));
                }
            }
        }

        Ok(Self::with_mapper(
            selections,
            BindingStrategy::ByConstructor,
            move |row| constructor.construct(row.values()),
        ))
    }
}

impl<T: FromRow + Send + 'static> Projection<T> {
    /// Projection whose shape `T` declares itself, typically from a function
    /// taking one typed expression per field
    pub fn typed(selections: impl IntoSelections) -> Self {
        Self::with_mapper(
            selections.into_selections(),
            BindingStrategy::PreTyped,
            T::from_row,
        )
    }
}

impl<T> Projection<Option<T>>
where
    T: DeserializeOwned + Send + 'static,
{
    /// A single typed column; null maps to `None`
    pub fn scalar<K: Kind<Native = T>>(expr: &TypedExpr<K>) -> Self {
        Self::with_mapper(vec![Selection::from(expr)], BindingStrategy::PreTyped, |row| {
            match row.value_at(0) {
                None | Some(Value::Null) => Ok(None),
                Some(value) => serde_json::from_value(value.clone())
                    .map(Some)
                    .map_err(|e| QueryError::TypeMapping(format!("cannot read scalar: {}", e))),
            }
        })
    }
}

/// Types built from a whole row, in a pre-typed projection
pub trait FromRow: Sized {
    fn from_row(row: &QueryRow) -> Result<Self>;
}

/// A Rust value readable from one column
pub trait FromColumn: Sized {
    /// Whether a column of `kind` can be read as `Self`
    fn accepts(kind: ValueKind) -> bool;

    fn from_column(value: &Value) -> Result<Self>;
}

macro_rules! impl_from_column {
    ($($ty:ty => [$($kind:ident),+]),+ $(,)?) => {
        $(
            impl FromColumn for $ty {
                fn accepts(kind: ValueKind) -> bool {
                    matches!(kind, $(ValueKind::$kind)|+)
                }

                fn from_column(value: &Value) -> Result<Self> {
                    if value.is_null() {
                        return Err(QueryError::TypeMapping(format!(
                            "null cannot be read as {}",
                            stringify!($ty)
                        )));
                    }
                    serde_json::from_value(value.clone()).map_err(|e| {
                        QueryError::TypeMapping(format!(
                            "{} cannot be read as {}: {}",
                            value,
                            stringify!($ty),
                            e
                        ))
                    })
                }
            }
        )+
    };
}

impl_from_column! {
    String => [Text],
    i32 => [Int],
    i64 => [Int],
    f64 => [Int, Float],
    bool => [Bool],
}

impl<T: FromColumn> FromColumn for Option<T> {
    fn accepts(kind: ValueKind) -> bool {
        T::accepts(kind)
    }

    fn from_column(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            value => T::from_column(value).map(Some),
        }
    }
}

/// A function usable as a row constructor; `Args` is its argument tuple
pub trait Constructor<T, Args>: Send + Sync + 'static {
    /// Kind check per argument position
    fn params() -> Vec<fn(ValueKind) -> bool>;

    fn construct(&self, values: &[Value]) -> Result<T>;
}

macro_rules! impl_constructor {
    ($($arg:ident $value:ident),+) => {
        impl<F, T, $($arg),+> Constructor<T, ($($arg,)+)> for F
        where
            F: Fn($($arg),+) -> T + Send + Sync + 'static,
            $($arg: FromColumn,)+
        {
            fn params() -> Vec<fn(ValueKind) -> bool> {
                vec![$(<$arg as FromColumn>::accepts as fn(ValueKind) -> bool),+]
            }

            fn construct(&self, values: &[Value]) -> Result<T> {
                let mut values = values.iter();
                $(
                    let $value = values
                        .next()
                        .ok_or_else(|| QueryError::TypeMapping("row has fewer columns than constructor arguments".to_string()))
                        .and_then(<$arg as FromColumn>::from_column)?;
                )+
                Ok(self($($value),+))
            }
        }
    };
}

impl_constructor!(A a);
impl_constructor!(A a, B b);
impl_constructor!(A a, B b, C c);
impl_constructor!(A a, B b, C c, D d);

/// Anything that expands to a list of selections: a `Vec<Selection>` or a
/// tuple of up to five typed expressions and selections
pub trait IntoSelections {
    fn into_selections(self) -> Vec<Selection>;
}

impl IntoSelections for Vec<Selection> {
    fn into_selections(self) -> Vec<Selection> {
        self
    }
}

macro_rules! impl_into_selections {
    ($($item:ident),+) => {
        impl<$($item: Into<Selection>),+> IntoSelections for ($($item,)+) {
            #[allow(non_snake_case)]
            fn into_selections(self) -> Vec<Selection> {
                let ($($item,)+) = self;
                vec![$($item.into()),+]
            }
        }
    };
}

impl_into_selections!(A);
impl_into_selections!(A, B);
impl_into_selections!(A, B, C);
impl_into_selections!(A, B, C, D);
impl_into_selections!(A, B, C, D, E);
