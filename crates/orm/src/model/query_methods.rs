//! Query Methods - model-level entry points
//!
//! Every [`Model`] gets these through a blanket impl, so callers can write
//! `User::find(conn, 1)` or `User::with(conn, "posts").get()`.

use std::sync::Arc;

use serde_json::Value;

use crate::backends::Connection;
use crate::error::ModelResult;
use crate::model::attributes::IntoAttributes;
use crate::model::core_trait::Model;
use crate::model::{Collection, Entity};
use crate::query::ModelQuery;
use crate::relationships::eager_loading::IntoEagerLoads;

/// Trait providing query operations for model collections
pub trait QueryMethods: Model + Sized {
    /// Query over this model's table on `connection`
    fn query(connection: Arc<dyn Connection>) -> ModelQuery {
        Entity::new::<Self>().on(connection).new_query()
    }

    /// Unsaved entity mass assigned from `attributes`
    fn make(attributes: impl IntoAttributes) -> ModelResult<Entity> {
        Entity::make::<Self>(attributes)
    }

    /// Query that eager loads `relations`
    fn with(connection: Arc<dyn Connection>, relations: impl IntoEagerLoads) -> ModelQuery {
        Self::query(connection).with(relations)
    }

    /// Find by primary key
    async fn find<T: Into<Value>>(
        connection: Arc<dyn Connection>,
        id: T,
    ) -> ModelResult<Option<Entity>> {
        Self::query(connection).find(id).await
    }

    /// Find several by primary key
    async fn find_many<T: Into<Value>>(
        connection: Arc<dyn Connection>,
        ids: Vec<T>,
    ) -> ModelResult<Collection> {
        Self::query(connection).find_many(ids).await
    }

    /// Every row of the table
    async fn all(connection: Arc<dyn Connection>) -> ModelResult<Collection> {
        Self::query(connection).all().await
    }

    /// Mass assign and insert a new entity
    async fn create(
        connection: Arc<dyn Connection>,
        attributes: impl IntoAttributes,
    ) -> ModelResult<Entity> {
        let mut entity = Self::make(attributes)?.on(connection);
        entity.save().await?;
        Ok(entity)
    }
}

impl<M: Model> QueryMethods for M {}
