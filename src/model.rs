//! The member/team model: entities, their schemas and query paths.
//!
//! `Member` owns the relationship: its `team_id` references `Team.id`. A team's
//! members are a derived view, reachable through [`QTeam::members`] in joins or
//! through [`Team::members_query`].

use crate::backend::QueryRow;
use crate::builder::{Query, SelectBuilder};
use crate::error::Result;
use crate::expr::{EntityPath, Int, RelationPath, Text, TypedExpr};
use crate::projection::{FromRow, Projection};
use crate::schema::{EntitySchema, FieldDef, FieldType, RelationDef, RelationKind, SchemaRegistry};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A schema-backed record with a generated identifier
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    const ENTITY: &'static str;

    fn schema() -> EntitySchema;

    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: i64);
}

const MEMBER_ID: FieldDef = FieldDef::new("id", FieldType::BigInt, false);
const MEMBER_USERNAME: FieldDef = FieldDef::new("username", FieldType::Text, true);
const MEMBER_AGE: FieldDef = FieldDef::new("age", FieldType::Integer, false);
const MEMBER_TEAM_ID: FieldDef = FieldDef::new("team_id", FieldType::BigInt, true);

const TEAM_ID: FieldDef = FieldDef::new("id", FieldType::BigInt, false);
const TEAM_NAME: FieldDef = FieldDef::new("name", FieldType::Text, false);

const MEMBER_TEAM: RelationDef = RelationDef {
    name: "team",
    kind: RelationKind::ManyToOne,
    local_field: "team_id",
    target_entity: Team::ENTITY,
    target_field: "id",
};

const TEAM_MEMBERS: RelationDef = RelationDef {
    name: "members",
    kind: RelationKind::OneToMany,
    local_field: "id",
    target_entity: Member::ENTITY,
    target_field: "team_id",
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: Option<i64>,
    pub username: Option<String>,
    pub age: i32,
    pub team_id: Option<i64>,
}

impl Member {
    pub fn new(username: &str, age: i32) -> Self {
        Self {
            id: None,
            username: Some(username.to_string()),
            age,
            team_id: None,
        }
    }

    /// A member without a name
    pub fn anonymous(age: i32) -> Self {
        Self {
            id: None,
            username: None,
            age,
            team_id: None,
        }
    }

    pub fn with_team(mut self, team: &Team) -> Self {
        self.change_team(team);
        self
    }

    pub fn change_team(&mut self, team: &Team) {
        self.team_id = team.id;
    }
}

impl Entity for Member {
    const ENTITY: &'static str = "Member";

    fn schema() -> EntitySchema {
        EntitySchema {
            name: Self::ENTITY,
            fields: vec![MEMBER_ID, MEMBER_USERNAME, MEMBER_AGE, MEMBER_TEAM_ID],
            relations: vec![MEMBER_TEAM],
        }
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: Option<i64>,
    pub name: String,
}

impl Team {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
        }
    }

    /// Members whose team reference is `team_id`
    pub fn members_query(team_id: i64) -> Result<Query<Member>> {
        let member = member();
        SelectBuilder::select_from(&member)
            .where_(member.team_id.eq(team_id))
            .build()
    }
}

impl Entity for Team {
    const ENTITY: &'static str = "Team";

    fn schema() -> EntitySchema {
        EntitySchema {
            name: Self::ENTITY,
            fields: vec![TEAM_ID, TEAM_NAME],
            relations: vec![TEAM_MEMBERS],
        }
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

/// Registry holding the member and team schemas
pub fn default_schema() -> Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    registry.register(Team::schema())?;
    registry.register(Member::schema())?;
    registry.validate()?;
    Ok(registry)
}

/// Query path over an aliased `Member`
#[derive(Debug, Clone)]
pub struct QMember {
    alias: String,
    pub id: TypedExpr<Int>,
    pub username: TypedExpr<Text>,
    pub age: TypedExpr<Int>,
    pub team_id: TypedExpr<Int>,
}

impl QMember {
    pub fn new(alias: impl Into<String>) -> Self {
        let alias = alias.into();
        Self {
            id: TypedExpr::field(alias.as_str(), Member::ENTITY, &MEMBER_ID),
            username: TypedExpr::field(alias.as_str(), Member::ENTITY, &MEMBER_USERNAME),
            age: TypedExpr::field(alias.as_str(), Member::ENTITY, &MEMBER_AGE),
            team_id: TypedExpr::field(alias.as_str(), Member::ENTITY, &MEMBER_TEAM_ID),
            alias,
        }
    }

    /// The member's team
    pub fn team(&self) -> RelationPath {
        RelationPath::navigate(self.alias.as_str(), &MEMBER_TEAM)
    }
}

impl EntityPath for QMember {
    type Entity = Member;

    fn alias(&self) -> &str {
        &self.alias
    }

    fn entity_name(&self) -> &'static str {
        Member::ENTITY
    }
}

/// Query path over an aliased `Team`
#[derive(Debug, Clone)]
pub struct QTeam {
    alias: String,
    pub id: TypedExpr<Int>,
    pub name: TypedExpr<Text>,
}

impl QTeam {
    pub fn new(alias: impl Into<String>) -> Self {
        let alias = alias.into();
        Self {
            id: TypedExpr::field(alias.as_str(), Team::ENTITY, &TEAM_ID),
            name: TypedExpr::field(alias.as_str(), Team::ENTITY, &TEAM_NAME),
            alias,
        }
    }

    /// The team's members (one-to-many)
    pub fn members(&self) -> RelationPath {
        RelationPath::navigate(self.alias.as_str(), &TEAM_MEMBERS)
    }
}

impl EntityPath for QTeam {
    type Entity = Team;

    fn alias(&self) -> &str {
        &self.alias
    }

    fn entity_name(&self) -> &'static str {
        Team::ENTITY
    }
}

/// `Member` under its default alias
pub fn member() -> QMember {
    QMember::new("member")
}

/// `Team` under its default alias
pub fn team() -> QTeam {
    QTeam::new("team")
}

/// Name and age of a member
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberDto {
    pub username: Option<String>,
    pub age: i32,
}

impl MemberDto {
    pub fn new(username: Option<String>, age: i32) -> Self {
        Self { username, age }
    }

    /// Pre-typed projection: the argument kinds are checked by the compiler
    pub fn projection(username: &TypedExpr<Text>, age: &TypedExpr<Int>) -> Projection<MemberDto> {
        Projection::typed((username, age))
    }
}

impl FromRow for MemberDto {
    fn from_row(row: &QueryRow) -> Result<Self> {
        Ok(Self {
            username: row.column(0)?,
            age: row.column(1)?,
        })
    }
}
