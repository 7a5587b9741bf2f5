#![allow(dead_code)]

use std::sync::Arc;

use expressive_orm::{Entity, MockConnection, Model, Relation, RelationFactory};
use serde_json::Value;

pub struct User;

impl Model for User {
    fn table_name() -> &'static str {
        "users"
    }

    fn relation(name: &str, factory: &RelationFactory<'_>) -> Option<Relation> {
        match name {
            "posts" => Some(factory.has_many::<Post>(None, None)),
            "profile" => Some(factory.has_one::<Profile>(None, None)),
            _ => None,
        }
    }
}

pub struct Post;

impl Model for Post {
    fn table_name() -> &'static str {
        "posts"
    }

    fn relation(name: &str, factory: &RelationFactory<'_>) -> Option<Relation> {
        match name {
            "comments" => Some(factory.has_many::<Comment>(None, None)),
            _ => None,
        }
    }
}

pub struct Comment;

impl Model for Comment {
    fn table_name() -> &'static str {
        "comments"
    }
}

pub struct Profile;

impl Model for Profile {
    fn table_name() -> &'static str {
        "profiles"
    }
}

pub struct Country;

impl Model for Country {
    fn table_name() -> &'static str {
        "countries"
    }

    fn relation(name: &str, factory: &RelationFactory<'_>) -> Option<Relation> {
        match name {
            "posts" => Some(factory.has_many_through::<Post, User>(None, None, None)),
            _ => None,
        }
    }
}

pub struct Category;

impl Model for Category {
    fn table_name() -> &'static str {
        "categories"
    }

    fn relation(name: &str, factory: &RelationFactory<'_>) -> Option<Relation> {
        match name {
            "children" => Some(factory.has_many::<Category>(Some("parent_id"), None)),
            _ => None,
        }
    }
}

/// Users that always come with their profile
pub struct Account;

impl Model for Account {
    fn table_name() -> &'static str {
        "accounts"
    }

    fn eager_loads() -> &'static [&'static str] {
        &["profile"]
    }

    fn relation(name: &str, factory: &RelationFactory<'_>) -> Option<Relation> {
        match name {
            "profile" => Some(factory.has_one::<Profile>(None, None)),
            _ => None,
        }
    }
}

pub fn mock() -> Arc<MockConnection> {
    Arc::new(MockConnection::new())
}

/// Existing entity of `M` hydrated from a JSON object
pub fn existing<M: Model>(conn: &Arc<MockConnection>, row: Value) -> Entity {
    let prototype = Entity::new::<M>().on(conn.clone());
    let mut rows = prototype.hydrate(expressive_orm::backends::rows_from_json(Value::Array(vec![row])));
    rows.remove(0)
}

/// Primary keys of a loaded has-many relation
pub fn related_keys(entity: &Entity, relation: &str) -> Vec<Value> {
    entity
        .get_relation(relation)
        .and_then(|value| value.many())
        .map(|collection| collection.model_keys())
        .unwrap_or_default()
}
