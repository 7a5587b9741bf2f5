mod common;

use common::*;
use expressive_orm::{EagerConstraint, ModelError, QueryMethods, QueryType};
use serde_json::{json, Value};

async fn assert_single_eager_query(count: usize) {
    let conn = mock();
    let users: Vec<Value> = (1..=count).map(|id| json!({"id": id})).collect();
    let posts: Vec<Value> = (1..=count)
        .map(|id| json!({"id": 1000 + id, "user_id": id}))
        .collect();
    conn.push_json(Value::Array(users)).push_json(Value::Array(posts));

    let users = User::with(conn.clone(), "posts").get().await.unwrap();

    assert_eq!(users.len(), count);
    assert_eq!(conn.query_count(), 2);
    assert!(conn
        .executed()
        .iter()
        .all(|query| query.kind == QueryType::Select));
    for user in &users {
        assert_eq!(related_keys(user, "posts").len(), 1);
    }
}

#[tokio::test]
async fn test_eager_load_issues_one_query_per_relation() {
    for count in [1, 10, 100] {
        assert_single_eager_query(count).await;
    }
}

#[tokio::test]
async fn test_eager_constraint_is_batched() {
    let conn = mock();
    conn.push_json(json!([{"id": 1}, {"id": 2}, {"id": 2}, {"id": null}]));

    User::with(conn.clone(), "posts").get().await.unwrap();

    assert_eq!(
        conn.executed_sql(),
        vec![
            "SELECT * FROM users".to_string(),
            "SELECT * FROM posts WHERE posts.user_id IN (1, 2)".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_has_many_groups_rows_in_result_order() {
    let conn = mock();
    conn.push_json(json!([{"id": 1}, {"id": 2}]));
    conn.push_json(json!([
        {"user_id": 1, "id": 10},
        {"user_id": 1, "id": 11},
        {"user_id": 2, "id": 12}
    ]));

    let users = User::with(conn.clone(), "posts").get().await.unwrap();

    assert_eq!(related_keys(&users.as_slice()[0], "posts"), vec![json!(10), json!(11)]);
    assert_eq!(related_keys(&users.as_slice()[1], "posts"), vec![json!(12)]);
    assert!(users.iter().all(|user| user.relation_loaded("posts")));
}

#[tokio::test]
async fn test_parents_without_children_get_empty_collections() {
    let conn = mock();
    conn.push_json(json!([{"id": 1}, {"id": 2}, {"id": 3}]));
    conn.push_json(json!([{"user_id": 1, "id": 10}]));

    let users = User::with(conn.clone(), "posts").get().await.unwrap();

    for user in users.iter().skip(1) {
        let posts = user.get_relation("posts").and_then(|v| v.many()).unwrap();
        assert!(posts.is_empty());
    }
}

#[tokio::test]
async fn test_has_one_keeps_first_match() {
    let conn = mock();
    conn.push_json(json!([{"id": 1}, {"id": 2}]));
    conn.push_json(json!([
        {"id": 5, "user_id": 1},
        {"id": 6, "user_id": 1}
    ]));

    let users = User::with(conn.clone(), "profile").get().await.unwrap();

    let first = users.as_slice()[0].get_relation("profile").unwrap();
    assert_eq!(first.one().unwrap().key(), Some(&json!(5)));

    let second = users.as_slice()[1].get_relation("profile").unwrap();
    assert!(second.one().is_none());
}

#[tokio::test]
async fn test_string_keys_match_numeric_keys() {
    let conn = mock();
    conn.push_json(json!([{"id": 1}]));
    conn.push_json(json!([{"id": 10, "user_id": "1"}]));

    let users = User::with(conn.clone(), "posts").get().await.unwrap();

    assert_eq!(related_keys(users.first().unwrap(), "posts"), vec![json!(10)]);
}

#[tokio::test]
async fn test_nested_paths_load_each_level_once() {
    let conn = mock();
    conn.push_json(json!([{"id": 1}, {"id": 2}]));
    conn.push_json(json!([
        {"id": 10, "user_id": 1},
        {"id": 11, "user_id": 2}
    ]));
    conn.push_json(json!([
        {"id": 100, "post_id": 10},
        {"id": 101, "post_id": 10},
        {"id": 102, "post_id": 11}
    ]));

    let users = User::with(conn.clone(), "posts.comments").get().await.unwrap();

    assert_eq!(conn.query_count(), 3);
    assert_eq!(
        conn.executed_sql()[2],
        "SELECT * FROM comments WHERE comments.post_id IN (10, 11)"
    );

    let posts = users.as_slice()[0].get_relation("posts").unwrap().many().unwrap();
    assert_eq!(
        related_keys(posts.first().unwrap(), "comments"),
        vec![json!(100), json!(101)]
    );
}

#[tokio::test]
async fn test_path_constraint_is_layered_on_batch_query() {
    let conn = mock();
    conn.push_json(json!([{"id": 1}]));

    User::query(conn.clone())
        .with_where("posts", |q| q.where_eq("posts.published", true).order_by("posts.id"))
        .get()
        .await
        .unwrap();

    assert_eq!(
        conn.executed_sql()[1],
        "SELECT * FROM posts WHERE posts.user_id IN (1) AND posts.published = true ORDER BY posts.id ASC"
    );
}

#[tokio::test]
async fn test_or_in_path_constraint_stays_inside_batch() {
    let conn = mock();
    conn.push_json(json!([{"id": 1}, {"id": 2}]));

    User::query(conn.clone())
        .with_where("posts", |q| {
            q.where_eq("posts.published", true)
                .or_where("posts.featured", "=", true)
        })
        .get()
        .await
        .unwrap();

    assert_eq!(
        conn.executed_sql()[1],
        "SELECT * FROM posts WHERE posts.user_id IN (1, 2) AND (posts.published = true OR posts.featured = true)"
    );
}

#[tokio::test]
async fn test_path_constraint_mapping_with_nested_path() {
    let conn = mock();
    conn.push_json(json!([{"id": 1}]));
    conn.push_json(json!([{"id": 10, "user_id": 1}]));
    conn.push_json(json!([{"id": 100, "post_id": 10}]));

    let users = User::query(conn.clone())
        .with(vec![
            ("posts", EagerConstraint::new(|q| q.order_by("posts.id"))),
            (
                "posts.comments",
                EagerConstraint::new(|q| q.where_eq("comments.approved", true)),
            ),
        ])
        .get()
        .await
        .unwrap();

    assert_eq!(
        conn.executed_sql(),
        vec![
            "SELECT * FROM users".to_string(),
            "SELECT * FROM posts WHERE posts.user_id IN (1) ORDER BY posts.id ASC".to_string(),
            "SELECT * FROM comments WHERE comments.post_id IN (10) AND comments.approved = true"
                .to_string(),
        ]
    );
    let posts = users.first().unwrap().get_relation("posts").unwrap().many().unwrap();
    assert_eq!(related_keys(posts.first().unwrap(), "comments"), vec![json!(100)]);
}

#[tokio::test]
async fn test_repeated_with_calls_accumulate() {
    let conn = mock();
    conn.push_json(json!([{"id": 1}]));
    conn.push_json(json!([{"id": 10, "user_id": 1}]));
    conn.push_json(json!([{"id": 5, "user_id": 1}]));

    let users = User::query(conn.clone())
        .with("posts")
        .with("profile")
        .get()
        .await
        .unwrap();

    assert_eq!(conn.query_count(), 3);
    let user = users.first().unwrap();
    assert_eq!(related_keys(user, "posts"), vec![json!(10)]);
    let profile = user.get_relation("profile").unwrap();
    assert_eq!(profile.one().unwrap().key(), Some(&json!(5)));
}

#[tokio::test]
async fn test_empty_batch_skips_eager_queries() {
    let conn = mock();

    let users = User::with(conn.clone(), ["posts", "profile"]).get().await.unwrap();

    assert!(users.is_empty());
    assert_eq!(conn.query_count(), 1);
}

#[tokio::test]
async fn test_undeclared_relation_is_an_error() {
    let conn = mock();
    conn.push_json(json!([{"id": 1}]));

    let err = User::with(conn.clone(), "nope").get().await.unwrap_err();

    assert_eq!(
        err,
        ModelError::Relationship(
            "Call to undefined relationship 'nope' on model 'User'".to_string()
        )
    );
}

#[tokio::test]
async fn test_failed_eager_query_fails_the_whole_get() {
    let conn = mock();
    conn.push_json(json!([{"id": 1}]));
    conn.push_error(ModelError::Database("connection reset".to_string()));

    let result = User::with(conn.clone(), "posts").get().await;

    assert_eq!(
        result.unwrap_err(),
        ModelError::Database("connection reset".to_string())
    );
}

#[tokio::test]
async fn test_through_relation_selects_far_parent_key() {
    let conn = mock();
    conn.push_json(json!([{"id": 1}, {"id": 2}]));
    conn.push_json(json!([
        {"id": 10, "user_id": 3, "country_id": 1},
        {"id": 11, "user_id": 4, "country_id": 2},
        {"id": 12, "user_id": 3, "country_id": 1}
    ]));

    let countries = Country::with(conn.clone(), "posts").get().await.unwrap();

    assert_eq!(
        conn.executed_sql()[1],
        "SELECT posts.*, users.country_id FROM posts INNER JOIN users ON users.id = posts.user_id WHERE users.country_id IN (1, 2)"
    );
    assert_eq!(
        related_keys(&countries.as_slice()[0], "posts"),
        vec![json!(10), json!(12)]
    );
    assert_eq!(related_keys(&countries.as_slice()[1], "posts"), vec![json!(11)]);
}

#[tokio::test]
async fn test_model_default_eager_loads() {
    let conn = mock();
    conn.push_json(json!([{"id": 1}]));
    conn.push_json(json!([{"id": 9, "account_id": 1}]));

    let accounts = Account::all(conn.clone()).await.unwrap();

    assert_eq!(conn.query_count(), 2);
    let profile = accounts.first().unwrap().get_relation("profile").unwrap();
    assert_eq!(profile.one().unwrap().key(), Some(&json!(9)));
}

#[tokio::test]
async fn test_collection_load_skips_loaded_relations() {
    let conn = mock();
    conn.push_json(json!([{"id": 1}]));
    conn.push_json(json!([{"id": 10, "user_id": 1}]));

    let users = User::with(conn.clone(), "posts").get().await.unwrap();
    assert_eq!(conn.query_count(), 2);

    let users = users.load("posts").await.unwrap();
    assert_eq!(conn.query_count(), 2);

    conn.push_json(json!([{"id": 10, "user_id": 1}, {"id": 13, "user_id": 1}]));
    let users = users.load_fresh("posts").await.unwrap();
    assert_eq!(conn.query_count(), 3);
    assert_eq!(
        related_keys(users.first().unwrap(), "posts"),
        vec![json!(10), json!(13)]
    );
}

#[tokio::test]
async fn test_load_descends_into_loaded_relations() {
    let conn = mock();
    conn.push_json(json!([{"id": 1}]));
    conn.push_json(json!([{"id": 10, "user_id": 1}]));
    let users = User::with(conn.clone(), "posts").get().await.unwrap();

    conn.clear_log();
    conn.push_json(json!([{"id": 100, "post_id": 10}]));
    let users = users.load("posts.comments").await.unwrap();

    assert_eq!(
        conn.executed_sql(),
        vec!["SELECT * FROM comments WHERE comments.post_id IN (10)".to_string()]
    );
    let posts = users.first().unwrap().get_relation("posts").unwrap().many().unwrap();
    assert_eq!(related_keys(posts.first().unwrap(), "comments"), vec![json!(100)]);
}

#[tokio::test]
async fn test_entity_load_and_to_json() {
    let conn = mock();
    let mut user = existing::<User>(&conn, json!({"id": 1}));
    conn.push_json(json!([{"id": 10, "user_id": 1}]));

    user.load("posts").await.unwrap();

    assert_eq!(
        user.to_json().unwrap(),
        json!({"id": 1, "posts": [{"id": 10, "user_id": 1}]})
    );
}
