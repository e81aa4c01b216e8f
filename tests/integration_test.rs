#![cfg(feature = "memory")]

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use typed_query::prelude::*;

struct Fixture {
    backend: Arc<MemoryBackend>,
    factory: QueryFactory<MemoryBackend>,
    team_a: Team,
}

// teamA: member1 (10), member2 (20); teamB: member3 (30), "member4 " (40)
async fn fixture() -> Fixture {
    let backend = Arc::new(MemoryBackend::with_default_schema().unwrap());

    let mut team_a = Team::new("teamA");
    let mut team_b = Team::new("teamB");
    backend.persist(&mut team_a).await.unwrap();
    backend.persist(&mut team_b).await.unwrap();

    let members = [
        ("member1", 10, &team_a),
        ("member2", 20, &team_a),
        ("member3", 30, &team_b),
        ("member4 ", 40, &team_b),
    ];
    for (name, age, team) in members {
        backend
            .persist(&mut Member::new(name, age).with_team(team))
            .await
            .unwrap();
    }

    Fixture {
        factory: QueryFactory::new(Arc::clone(&backend)),
        backend,
        team_a,
    }
}

fn names(members: &[Member]) -> Vec<String> {
    members
        .iter()
        .map(|m| m.username.clone().unwrap_or_default())
        .collect()
}

mod search_tests {
    use super::*;

    #[tokio::test]
    async fn test_search_with_chained_where() {
        let fx = fixture().await;
        let member = member();

        let query = SelectBuilder::select_from(&member)
            .where_(member.username.eq("member1"))
            .where_(member.age.eq(10))
            .build()
            .unwrap();

        let found = fx.factory.fetch_one(&query).await.unwrap().unwrap();
        assert_eq!(found.username.as_deref(), Some("member1"));
        assert_eq!(found.age, 10);
    }

    #[tokio::test]
    async fn test_search_with_and_params() {
        let fx = fixture().await;
        let member = member();

        let query = SelectBuilder::select_from(&member)
            .where_all([Some(member.username.eq("member1")), None, Some(member.age.eq(10))])
            .build()
            .unwrap();

        let found = fx.factory.fetch_single(&query).await.unwrap();
        assert_eq!(found.username.as_deref(), Some("member1"));
    }

    #[tokio::test]
    async fn test_and_matches_intersection() {
        let fx = fixture().await;
        let member = member();

        let old = member.age.goe(20);
        let team_a = member.team_id.eq(fx.team_a.id);
        let fetch = |predicate: Predicate| {
            let query = SelectBuilder::select_from(&member)
                .where_(predicate)
                .build()
                .unwrap();
            let factory = fx.factory.clone();
            async move { names(&factory.fetch_list(&query).await.unwrap()) }
        };

        let both = fetch(old.clone().and(team_a.clone())).await;
        let old_names = fetch(old).await;
        let team_names = fetch(team_a).await;

        let intersection = old_names
            .into_iter()
            .filter(|name| team_names.contains(name))
            .collect::<Vec<_>>();
        assert_eq!(both, intersection);
        assert_eq!(both, vec!["member2"]);
    }

    #[tokio::test]
    async fn test_fetch_variants() {
        let fx = fixture().await;
        let member = member();
        let all = SelectBuilder::select_from(&member).build().unwrap();

        assert_eq!(fx.factory.fetch_list(&all).await.unwrap().len(), 4);
        assert_eq!(fx.factory.fetch_count(&all).await.unwrap(), 4);

        let err = fx.factory.fetch_one(&all).await.unwrap_err();
        assert!(matches!(err, QueryError::TooManyResults { .. }));

        let first = fx.factory.fetch_first(&all).await.unwrap().unwrap();
        assert_eq!(first.username.as_deref(), Some("member1"));

        let nobody = SelectBuilder::select_from(&member)
            .where_(member.username.eq("nobody"))
            .build()
            .unwrap();
        assert_eq!(fx.factory.fetch_one(&nobody).await.unwrap(), None);
        assert!(matches!(
            fx.factory.fetch_single(&nobody).await.unwrap_err(),
            QueryError::NoResult
        ));
    }

    #[tokio::test]
    async fn test_page_total_matches_list() {
        let fx = fixture().await;
        let member = member();
        let query = SelectBuilder::select_from(&member)
            .where_(member.age.gt(15))
            .build()
            .unwrap();

        let page = fx.factory.fetch_page(&query).await.unwrap();
        let list = fx.factory.fetch_list(&query).await.unwrap();
        assert_eq!(page.total, list.len() as u64);
        assert_eq!(page.results, list);
        assert_eq!(page.offset, None);
    }

    #[tokio::test]
    async fn test_team_members_query() {
        let fx = fixture().await;
        let team_id = fx.team_a.id.unwrap();

        let query = Team::members_query(team_id).unwrap();
        let members = fx.factory.fetch_list(&query).await.unwrap();
        assert_eq!(names(&members), vec!["member1", "member2"]);
    }
}

mod order_tests {
    use super::*;

    #[tokio::test]
    async fn test_sort_nulls_last() {
        let fx = fixture().await;
        for mut extra in [
            Member::anonymous(100),
            Member::new("member5", 100),
            Member::new("member6", 100),
        ] {
            fx.backend.persist(&mut extra).await.unwrap();
        }

        let member = member();
        let query = SelectBuilder::select_from(&member)
            .where_(member.age.eq(100))
            .order_by(member.age.desc())
            .order_by(member.username.asc().nulls_last())
            .build()
            .unwrap();

        let members = fx.factory.fetch_list(&query).await.unwrap();
        let usernames = members
            .iter()
            .map(|m| m.username.as_deref())
            .collect::<Vec<_>>();
        assert_eq!(usernames, vec![Some("member5"), Some("member6"), None]);
    }

    #[tokio::test]
    async fn test_paging_list() {
        let fx = fixture().await;
        let member = member();
        let query = SelectBuilder::select_from(&member)
            .order_by(member.username.desc())
            .offset(1)
            .limit(2)
            .build()
            .unwrap();

        let members = fx.factory.fetch_list(&query).await.unwrap();
        assert_eq!(names(&members), vec!["member3", "member2"]);
    }

    #[tokio::test]
    async fn test_paging_results() {
        let fx = fixture().await;
        let member = member();
        let query = SelectBuilder::select_from(&member)
            .order_by(member.username.desc())
            .offset(1)
            .limit(2)
            .build()
            .unwrap();

        let page = fx.factory.fetch_page(&query).await.unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.limit, Some(2));
        assert_eq!(page.offset, Some(1));
        assert_eq!(page.results.len(), 2);

        let past_end = SelectBuilder::select_from(&member)
            .order_by(member.username.desc())
            .offset(10)
            .limit(2)
            .build()
            .unwrap();
        let page = fx.factory.fetch_page(&past_end).await.unwrap();
        assert_eq!(page.total, 4);
        assert!(page.is_empty());
    }
}

mod aggregate_tests {
    use super::*;

    #[tokio::test]
    async fn test_aggregation() {
        let fx = fixture().await;
        let member = member();
        let query = SelectBuilder::new(Projection::tuple((
            member.age.count(),
            member.age.sum(),
            member.age.avg(),
            member.age.max(),
            member.age.min(),
        )))
        .from(&member)
        .build()
        .unwrap();

        let rows = fx.factory.fetch_list(&query).await.unwrap();
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.get_i64("count(age)"), Some(4));
        assert_eq!(row.get_i64("sum(age)"), Some(100));
        assert_eq!(row.get_f64("avg(age)"), Some(25.0));
        assert_eq!(row.get_i64("max(age)"), Some(40));
        assert_eq!(row.get_i64("min(age)"), Some(10));
    }

    #[tokio::test]
    async fn test_group_by_team_name() {
        let fx = fixture().await;
        let member = member();
        let team = team();
        let query = SelectBuilder::new(Projection::tuple((&team.name, member.age.avg())))
            .from(&member)
            .join(member.team(), &team)
            .group_by(&team.name)
            .build()
            .unwrap();

        let rows = fx.factory.fetch_list(&query).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_string("name").as_deref(), Some("teamA"));
        assert_eq!(rows[0].get_f64("avg(age)"), Some(15.0));
        assert_eq!(rows[1].get_string("name").as_deref(), Some("teamB"));
        assert_eq!(rows[1].get_f64("avg(age)"), Some(35.0));

        assert_eq!(fx.factory.fetch_count(&query).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_having_filters_groups() {
        let fx = fixture().await;
        let member = member();
        let team = team();
        let query = SelectBuilder::new(Projection::tuple((&team.name, member.age.sum())))
            .from(&member)
            .join(member.team(), &team)
            .group_by(&team.name)
            .having(member.age.sum().gt(50))
            .build()
            .unwrap();

        let rows = fx.factory.fetch_list(&query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_string("name").as_deref(), Some("teamB"));
        assert_eq!(rows[0].get_i64("sum(age)"), Some(70));
    }
}

mod join_tests {
    use super::*;

    async fn add_members_named_after_teams(fx: &Fixture) {
        for name in ["teamA", "teamB", "teamC"] {
            fx.backend.persist(&mut Member::new(name, 0)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_relation_join() {
        let fx = fixture().await;
        let member = member();
        let team = team();
        let query = SelectBuilder::select_from(&member)
            .join(member.team(), &team)
            .where_(team.name.eq("teamA"))
            .build()
            .unwrap();

        let members = fx.factory.fetch_list(&query).await.unwrap();
        assert_eq!(names(&members), vec!["member1", "member2"]);
    }

    #[tokio::test]
    async fn test_relation_join_matches_explicit_key_join() {
        let fx = fixture().await;
        let member = member();
        let team = team();

        let by_relation = SelectBuilder::select_from(&member)
            .join(member.team(), &team)
            .where_(team.name.eq("teamB"))
            .build()
            .unwrap();
        let by_key = SelectBuilder::select_from(&member)
            .inner_join_entity(&team)
            .on(member.team_id.eq_expr(&team.id))
            .where_(team.name.eq("teamB"))
            .build()
            .unwrap();

        let expected = fx.factory.fetch_list(&by_relation).await.unwrap();
        assert_eq!(fx.factory.fetch_list(&by_key).await.unwrap(), expected);
        assert_eq!(names(&expected), vec!["member3", "member4 "]);
    }

    #[tokio::test]
    async fn test_inverse_relation_join() {
        let fx = fixture().await;
        let member = member();
        let team = team();
        let query = SelectBuilder::select_from(&team)
            .join(team.members(), &member)
            .where_(member.age.gt(15))
            .distinct()
            .build()
            .unwrap();

        let teams = fx.factory.fetch_list(&query).await.unwrap();
        let team_names = teams.iter().map(|t| t.name.as_str()).collect::<Vec<_>>();
        assert_eq!(team_names, vec!["teamA", "teamB"]);
    }

    #[tokio::test]
    async fn test_theta_join() {
        let fx = fixture().await;
        add_members_named_after_teams(&fx).await;

        let member = member();
        let team = team();
        let query = SelectBuilder::select_from(&member)
            .from(&team)
            .where_(member.username.eq_expr(&team.name))
            .build()
            .unwrap();

        let members = fx.factory.fetch_list(&query).await.unwrap();
        assert_eq!(names(&members), vec!["teamA", "teamB"]);
    }

    #[tokio::test]
    async fn test_left_join_on_filtering() {
        let fx = fixture().await;
        let member = member();
        let team = team();
        let query = SelectBuilder::new(Projection::tuple((member.to_expr(), team.to_expr())))
            .from(&member)
            .left_join(member.team(), &team)
            .on(team.name.eq("teamA"))
            .build()
            .unwrap();

        let rows = fx.factory.fetch_list(&query).await.unwrap();
        assert_eq!(rows.len(), 4);

        for row in &rows {
            let joined: Member = row.get("member").unwrap();
            let joined_team = row.get::<Team>("team");
            match joined.age {
                10 | 20 => assert_eq!(joined_team.map(|t| t.name), Some("teamA".to_string())),
                _ => assert!(row.is_null("team")),
            }
        }
    }

    #[tokio::test]
    async fn test_left_join_on_unrelated_entity() {
        let fx = fixture().await;
        add_members_named_after_teams(&fx).await;

        let member = member();
        let team = team();
        let query = SelectBuilder::new(Projection::tuple((member.to_expr(), team.to_expr())))
            .from(&member)
            .left_join_entity(&team)
            .on(member.username.eq_expr(&team.name))
            .build()
            .unwrap();

        let rows = fx.factory.fetch_list(&query).await.unwrap();
        assert_eq!(rows.len(), 7);

        let matched = rows
            .iter()
            .filter(|row| !row.is_null("team"))
            .filter_map(|row| row.get::<Member>("member"))
            .map(|m| m.username.unwrap_or_default())
            .collect::<Vec<_>>();
        assert_eq!(matched, vec!["teamA", "teamB"]);

        let team_c = rows
            .iter()
            .find(|row| {
                row.get::<Member>("member")
                    .and_then(|m| m.username)
                    .as_deref()
                    == Some("teamC")
            })
            .unwrap();
        assert!(team_c.is_null("team"));
    }

    #[tokio::test]
    async fn test_count_through_join() {
        let fx = fixture().await;
        let member = member();
        let team = team();
        let query = SelectBuilder::select_from(&member)
            .join(member.team(), &team)
            .where_(team.name.eq("teamB"))
            .build()
            .unwrap();

        assert_eq!(fx.factory.fetch_count(&query).await.unwrap(), 2);
    }
}

mod subquery_tests {
    use super::*;

    fn ages(query: &SelectBuilder<Option<i64>>) -> Query<Option<i64>> {
        query.clone().order_by(member().age.asc()).build().unwrap()
    }

    #[tokio::test]
    async fn test_subquery_eq_max() {
        let fx = fixture().await;
        let member = member();
        let member_sub = QMember::new("memberSub");

        let oldest = SubQuery::select(&member_sub.age.max())
            .from(&member_sub)
            .as_expr();
        let query = SelectBuilder::new(Projection::scalar(&member.age))
            .from(&member)
            .where_(member.age.eq_expr(&oldest));

        let found = fx.factory.fetch_list(&ages(&query)).await.unwrap();
        assert_eq!(found, vec![Some(40)]);
    }

    #[tokio::test]
    async fn test_subquery_goe_avg() {
        let fx = fixture().await;
        let member = member();
        let member_sub = QMember::new("memberSub");

        let average = SubQuery::select(&member_sub.age.avg())
            .from(&member_sub)
            .as_expr();
        let query = SelectBuilder::new(Projection::scalar(&member.age))
            .from(&member)
            .where_(member.age.as_float().goe_expr(&average));

        let found = fx.factory.fetch_list(&ages(&query)).await.unwrap();
        assert_eq!(found, vec![Some(30), Some(40)]);
    }

    #[tokio::test]
    async fn test_subquery_in() {
        let fx = fixture().await;
        let member = member();
        let member_sub = QMember::new("memberSub");

        let older_than_ten = SubQuery::select(&member_sub.age)
            .from(&member_sub)
            .where_(member_sub.age.gt(10))
            .as_expr();
        let query = SelectBuilder::new(Projection::scalar(&member.age))
            .from(&member)
            .where_(member.age.in_query(&older_than_ten));

        let found = fx.factory.fetch_list(&ages(&query)).await.unwrap();
        assert_eq!(found, vec![Some(20), Some(30), Some(40)]);
    }

    #[tokio::test]
    async fn test_select_subquery() {
        let fx = fixture().await;
        let member = member();
        let member_sub = QMember::new("memberSub");

        let average = SubQuery::select(&member_sub.age.avg())
            .from(&member_sub)
            .as_expr();
        let query = SelectBuilder::new(Projection::tuple((&member.username, average.as_("avg_age"))))
            .from(&member)
            .build()
            .unwrap();

        let rows = fx.factory.fetch_list(&query).await.unwrap();
        assert_eq!(rows.len(), 4);
        for row in &rows {
            assert_eq!(row.get_f64("avg_age"), Some(25.0));
        }
    }
}

mod expression_tests {
    use super::*;

    #[tokio::test]
    async fn test_simple_case() {
        let fx = fixture().await;
        let member = member();
        let label = member
            .age
            .when(10)
            .then("ten")
            .when(20)
            .then("twenty")
            .otherwise("other");
        let query = SelectBuilder::new(Projection::tuple((label,)))
            .from(&member)
            .order_by(member.age.asc())
            .build()
            .unwrap();

        let rows = fx.factory.fetch_list(&query).await.unwrap();
        let labels = rows
            .iter()
            .filter_map(|row| row.get_string("case"))
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["ten", "twenty", "other", "other"]);
    }

    #[tokio::test]
    async fn test_constant() {
        let fx = fixture().await;
        let member = member();
        let query = SelectBuilder::new(Projection::tuple((&member.username, constant("A"))))
            .from(&member)
            .build()
            .unwrap();

        let rows = fx.factory.fetch_list(&query).await.unwrap();
        assert_eq!(rows.len(), 4);
        for row in &rows {
            assert_eq!(row.get_at::<String>(1).as_deref(), Some("A"));
        }
    }

    #[tokio::test]
    async fn test_concat() {
        let fx = fixture().await;
        let member = member();
        let joined = member
            .username
            .concat("_")
            .concat_expr(&member.age.string_value());
        let query = SelectBuilder::new(Projection::scalar(&joined))
            .from(&member)
            .where_(member.username.eq("member1"))
            .build()
            .unwrap();

        let value = fx.factory.fetch_single(&query).await.unwrap();
        assert_eq!(value.as_deref(), Some("member1_10"));
    }
}

mod projection_tests {
    use super::*;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct UserDto {
        name: Option<String>,
        age: i32,
    }

    fn expected() -> Vec<MemberDto> {
        [("member1", 10), ("member2", 20), ("member3", 30), ("member4 ", 40)]
            .into_iter()
            .map(|(name, age)| MemberDto::new(Some(name.to_string()), age))
            .collect()
    }

    #[tokio::test]
    async fn test_tuple_projection() {
        let fx = fixture().await;
        let member = member();
        let query = SelectBuilder::new(Projection::tuple((&member.username, &member.age)))
            .from(&member)
            .build()
            .unwrap();
        assert_eq!(query.strategy(), BindingStrategy::Tuple);

        let rows = fx.factory.fetch_list(&query).await.unwrap();
        assert_eq!(rows[0].get_string("username").as_deref(), Some("member1"));
        assert_eq!(rows[0].get_at::<i32>(1), Some(10));
    }

    #[tokio::test]
    async fn test_fields_projection() {
        let fx = fixture().await;
        let member = member();
        let query = SelectBuilder::new(Projection::<MemberDto>::fields((&member.username, &member.age)))
            .from(&member)
            .build()
            .unwrap();

        assert_eq!(fx.factory.fetch_list(&query).await.unwrap(), expected());
    }

    #[tokio::test]
    async fn test_fields_projection_with_alias_and_subquery() {
        let fx = fixture().await;
        let member = member();
        let member_sub = QMember::new("memberSub");
        let oldest = SubQuery::select(&member_sub.age.max())
            .from(&member_sub)
            .as_expr();

        let query = SelectBuilder::new(Projection::<UserDto>::fields((
            member.username.as_("name"),
            oldest.as_("age"),
        )))
        .from(&member)
        .build()
        .unwrap();

        let users = fx.factory.fetch_list(&query).await.unwrap();
        assert_eq!(users.len(), 4);
        assert_eq!(
            users[0],
            UserDto {
                name: Some("member1".to_string()),
                age: 40
            }
        );
        assert!(users.iter().all(|u| u.age == 40));
    }

    #[tokio::test]
    async fn test_constructor_projection() {
        let fx = fixture().await;
        let member = member();
        let projection =
            Projection::<MemberDto>::constructor((&member.username, &member.age), MemberDto::new)
                .unwrap();
        let query = SelectBuilder::new(projection).from(&member).build().unwrap();
        assert_eq!(query.strategy(), BindingStrategy::ByConstructor);

        assert_eq!(fx.factory.fetch_list(&query).await.unwrap(), expected());
    }

    #[test]
    fn test_constructor_arity_mismatch() {
        let member = member();
        let err = Projection::<MemberDto>::constructor((&member.username,), MemberDto::new)
            .unwrap_err();

        assert!(matches!(
            err,
            QueryError::InvalidProjectionArity {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_pre_typed_projection() {
        let fx = fixture().await;
        let member = member();
        let query = SelectBuilder::new(MemberDto::projection(&member.username, &member.age))
            .from(&member)
            .build()
            .unwrap();
        assert_eq!(query.strategy(), BindingStrategy::PreTyped);

        assert_eq!(fx.factory.fetch_list(&query).await.unwrap(), expected());
    }

    #[tokio::test]
    async fn test_distinct_projection() {
        let fx = fixture().await;
        let member = member();
        let query = SelectBuilder::new(Projection::scalar(&member.team_id))
            .from(&member)
            .distinct()
            .build()
            .unwrap();

        let team_ids = fx.factory.fetch_list(&query).await.unwrap();
        assert_eq!(team_ids, vec![Some(1), Some(2)]);
    }
}

mod dynamic_tests {
    use super::*;

    #[derive(Debug, Default)]
    struct MemberSearch {
        username: Option<String>,
        age_goe: Option<i32>,
        age_loe: Option<i32>,
        team_name: Option<String>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct MemberTeamDto {
        username: Option<String>,
        age: i32,
        team_name: Option<String>,
    }

    fn search_filter(member: &QMember, team: &QTeam) -> DynamicFilter<MemberSearch> {
        let username = member.username.clone();
        let age_goe = member.age.clone();
        let age_loe = member.age.clone();
        let team_name = team.name.clone();

        DynamicFilter::new()
            .condition("username", move |s: &MemberSearch| {
                s.username.as_deref().map(|u| username.eq(u))
            })
            .condition("age_goe", move |s: &MemberSearch| s.age_goe.map(|a| age_goe.goe(a)))
            .condition("age_loe", move |s: &MemberSearch| s.age_loe.map(|a| age_loe.loe(a)))
            .condition("team_name", move |s: &MemberSearch| {
                s.team_name.as_deref().map(|t| team_name.eq(t))
            })
    }

    async fn search(fx: &Fixture, input: &MemberSearch) -> Vec<MemberTeamDto> {
        let member = member();
        let team = team();
        let filter = search_filter(&member, &team);

        let query = SelectBuilder::new(Projection::<MemberTeamDto>::fields((
            &member.username,
            &member.age,
            team.name.as_("team_name"),
        )))
        .from(&member)
        .left_join(member.team(), &team)
        .where_all([filter.build(input)])
        .build()
        .unwrap();

        fx.factory.fetch_list(&query).await.unwrap()
    }

    #[tokio::test]
    async fn test_boolean_builder() {
        let fx = fixture().await;
        let member = member();
        let username_param: Option<&str> = Some("member1");
        let age_param: Option<i32> = Some(10);

        let mut builder = BooleanBuilder::new();
        if let Some(username) = username_param {
            builder = builder.and(member.username.eq(username));
        }
        if let Some(age) = age_param {
            builder = builder.and(member.age.eq(age));
        }

        let query = SelectBuilder::select_from(&member)
            .where_all([builder.build()])
            .build()
            .unwrap();

        let members = fx.factory.fetch_list(&query).await.unwrap();
        assert_eq!(names(&members), vec!["member1"]);
    }

    #[tokio::test]
    async fn test_dynamic_filter() {
        let fx = fixture().await;

        let found = search(
            &fx,
            &MemberSearch {
                team_name: Some("teamB".to_string()),
                age_goe: Some(35),
                ..MemberSearch::default()
            },
        )
        .await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username.as_deref(), Some("member4 "));
        assert_eq!(found[0].team_name.as_deref(), Some("teamB"));

        let found = search(
            &fx,
            &MemberSearch {
                age_goe: Some(20),
                age_loe: Some(30),
                ..MemberSearch::default()
            },
        )
        .await;
        let ages = found.iter().map(|m| m.age).collect::<Vec<_>>();
        assert_eq!(ages, vec![20, 30]);
    }

    #[tokio::test]
    async fn test_absent_parameters_match_everything() {
        let fx = fixture().await;

        let found = search(&fx, &MemberSearch::default()).await;
        assert_eq!(found.len(), 4);

        let member = member();
        let team = team();
        assert!(search_filter(&member, &team)
            .active(&MemberSearch::default())
            .is_empty());
    }
}
