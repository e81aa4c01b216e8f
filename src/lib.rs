//! typed-query - Type-safe query builder for a member/team model
//!
//! typed-query builds relational queries out of typed field references instead
//! of strings, runs them through an executor abstraction, and maps the rows onto
//! caller types.
//!
//! # Architecture
//!
//! - **Schema Model**: Entities, fields and relations described once, used to derive typed paths
//! - **Predicate Builder**: Typed comparisons composed with and/or/not, plus optional-clause folding
//! - **Query Builder**: Fluent, immutable query definitions with joins, grouping, ordering and paging
//! - **Projection Mapper**: Rows bound to tuples, named fields, constructors or pre-typed DTOs
//! - **Executor Abstraction**: Storage behind an async trait; an in-memory executor ships for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use typed_query::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let backend = Arc::new(MemoryBackend::with_default_schema()?);
//!
//!     let mut team_a = Team::new("teamA");
//!     backend.persist(&mut team_a).await?;
//!     backend.persist(&mut Member::new("member1", 10).with_team(&team_a)).await?;
//!
//!     let member = member();
//!     let team = team();
//!     let query = SelectBuilder::select_from(&member)
//!         .join(member.team(), &team)
//!         .where_(team.name.eq("teamA"))
//!         .order_by(member.age.desc())
//!         .build()?;
//!
//!     let factory = QueryFactory::new(backend);
//!     let members = factory.fetch_list(&query).await?;
//!     println!("teamA: {:?}", members);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! The in-memory executor is behind the `memory` feature, enabled by default:
//!
//! ```toml
//! [dependencies]
//! typed-query = { version = "0.1", default-features = false }
//! ```

pub mod backend;
pub mod builder;
pub mod error;
pub mod expr;
pub mod factory;
pub mod model;
pub mod predicate;
pub mod projection;
pub mod schema;

#[cfg(feature = "memory")]
pub mod memory;

pub use backend::{QueryExecutor, QueryResult, QueryRow};
pub use builder::{
    JoinType, NullHandling, OrderSpecifier, Query, SelectBuilder, SelectQuery, SortDirection,
    SubQuery,
};
pub use error::{QueryError, Result};
pub use expr::{
    constant, AggregateFunc, Bool, EntityPath, Expr, Float, Int, Kind, Literal, Numeric,
    RelationPath, Selection, Text, TypedExpr, ValueKind,
};
pub use factory::{QueryConfig, QueryFactory, QueryResults};
pub use model::{member, team, Entity, Member, MemberDto, QMember, QTeam, Team};
pub use predicate::{BooleanBuilder, ComparisonOp, DynamicFilter, LogicalOp, Predicate};
pub use projection::{BindingStrategy, Constructor, FromColumn, FromRow, IntoSelections, Projection};
pub use schema::{EntitySchema, FieldDef, FieldType, RelationDef, RelationKind, SchemaRegistry};

#[cfg(feature = "memory")]
pub use memory::MemoryBackend;

/// Prelude for common imports
pub mod prelude {
    pub use crate::backend::{QueryExecutor, QueryResult, QueryRow};
    pub use crate::builder::{Query, SelectBuilder, SortDirection, SubQuery};
    pub use crate::error::{QueryError, Result};
    pub use crate::expr::{constant, EntityPath, Int, Text, TypedExpr};
    pub use crate::factory::{QueryConfig, QueryFactory, QueryResults};
    pub use crate::model::{member, team, Entity, Member, MemberDto, QMember, QTeam, Team};
    pub use crate::predicate::{BooleanBuilder, DynamicFilter, Predicate};
    pub use crate::projection::{BindingStrategy, FromRow, Projection};

    #[cfg(feature = "memory")]
    pub use crate::memory::MemoryBackend;
}
