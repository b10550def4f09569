//! Generic store implementations
//!
//! CRUD helpers for any `Model`. Every operation is a thin delegation to
//! `QueryBuilder`, so filters, ordering and errors behave exactly as they do
//! there.

use super::core::GenericStore;
use crate::errors::StoreError;
use crate::query_builder::builder::record_fields;
use crate::query_builder::{OrderBy, QueryBuilder, Where};
use crate::traits::Model;
use serde_json::Value;
use tracing::debug;

impl<T: Model> GenericStore<T> {
    fn scoped(&self, conditions: Option<&Where>, order_by: Option<&OrderBy>) -> QueryBuilder<T> {
        let mut query = self.query();
        if let Some(conditions) = conditions {
            query = query.with_where(conditions.clone());
        }
        if let Some(order_by) = order_by {
            query = query.with_order(order_by);
        }
        query
    }

    /// One page of records and the total number of matches
    pub async fn list(
        &self,
        page: u64,
        page_size: u64,
        conditions: Option<&Where>,
        order_by: Option<&OrderBy>,
    ) -> Result<(Vec<T>, i64), StoreError> {
        let page = self
            .scoped(conditions, order_by)
            .paginate(page, page_size)
            .await?;
        Ok((page.items, page.total))
    }

    pub async fn list_all(
        &self,
        conditions: Option<&Where>,
        order_by: Option<&OrderBy>,
    ) -> Result<Vec<T>, StoreError> {
        self.scoped(conditions, order_by).find().await
    }

    pub async fn create(&self, record: &T) -> Result<T, StoreError> {
        self.query().create(record).await
    }

    /// Record with primary key `id`, or `NotFound`
    pub async fn retrieve(&self, id: impl Into<Value>) -> Result<T, StoreError> {
        let id = id.into();
        self.find_by_id(id.clone())
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{} with id {}", T::table_name(), id)))
    }

    pub async fn find_by_id(&self, id: impl Into<Value>) -> Result<Option<T>, StoreError> {
        match self.by_id(id).first().await {
            Ok(record) => Ok(Some(record)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Load the record, apply `mutate` and save it back
    pub async fn update<F>(&self, id: impl Into<Value>, mutate: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut T),
    {
        let mut record = self.retrieve(id).await?;
        mutate(&mut record);
        self.query().save(&record).await
    }

    /// Delete by primary key; `false` when nothing matched
    pub async fn delete(&self, id: impl Into<Value>) -> Result<bool, StoreError> {
        Ok(self.by_id(id).delete().await? > 0)
    }

    pub async fn get_many<V: Into<Value>>(&self, ids: Vec<V>) -> Result<Vec<T>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.query()
            .where_in(T::primary_key_field(), ids)
            .order_by_asc(T::primary_key_field())
            .find()
            .await
    }

    pub async fn exists(&self, conditions: &Where) -> Result<bool, StoreError> {
        self.scoped(Some(conditions), None).exists().await
    }

    /// First match by primary key, or `NotFound`
    pub async fn find_one(&self, conditions: &Where) -> Result<T, StoreError> {
        self.scoped(Some(conditions), None).first().await
    }

    pub async fn find_all(
        &self,
        conditions: &Where,
        order_by: Option<&OrderBy>,
    ) -> Result<Vec<T>, StoreError> {
        self.scoped(Some(conditions), order_by).find().await
    }

    /// First match, or `init` inserted when nothing matches
    pub async fn find_one_or_create(&self, conditions: &Where, init: &T) -> Result<T, StoreError> {
        match self.find_one(conditions).await {
            Ok(record) => Ok(record),
            Err(err) if err.is_not_found() => {
                debug!(table = T::table_name(), "no match, creating record");
                self.create(init).await
            }
            Err(err) => Err(err),
        }
    }

    pub async fn find_one_and_update<F>(
        &self,
        conditions: &Where,
        mutate: F,
    ) -> Result<T, StoreError>
    where
        F: FnOnce(&mut T),
    {
        let mut record = self.find_one(conditions).await?;
        mutate(&mut record);
        self.query().save(&record).await
    }

    /// Remove the first match and return it as it was
    pub async fn find_one_and_delete(&self, conditions: &Where) -> Result<T, StoreError> {
        let record = self.find_one(conditions).await?;
        let pk = T::primary_key_field();
        let id = record_fields(T::table_name(), &record)?
            .remove(pk)
            .filter(|value| !value.is_null())
            .ok_or_else(|| {
                StoreError::InvalidData(format!("{} record has no {}", T::table_name(), pk))
            })?;

        self.by_id(id).delete().await?;
        Ok(record)
    }

    pub async fn count(&self, conditions: &Where) -> Result<i64, StoreError> {
        self.scoped(Some(conditions), None).count().await
    }

    pub async fn count_all(&self) -> Result<i64, StoreError> {
        self.query().count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_builder::WhereOptions;
    use crate::testing::{MemoryExecutor, Product};
    use serde_json::json;

    fn store() -> (MemoryExecutor, GenericStore<Product>) {
        let memory = MemoryExecutor::new();
        memory.seed(
            "products",
            vec![
                json!({
                    "id": 1, "name": "Laptop", "category": "Electronics",
                    "price": 200.0, "owner": "ann"
                }),
                json!({
                    "id": 2, "name": "Phone", "category": "Electronics",
                    "price": 100.0, "owner": "bob"
                }),
                json!({
                    "id": 3, "name": "Novel", "category": "Books",
                    "price": 15.0, "owner": "ann"
                }),
            ],
        );
        let store = GenericStore::new(memory.handle());
        (memory, store)
    }

    fn electronics() -> Where {
        let mut conditions = Where::new();
        conditions.set("category", "Electronics");
        conditions
    }

    #[tokio::test]
    async fn test_list_and_count() {
        let (_, store) = store();
        let mut order_by = OrderBy::new();
        order_by.desc("price");

        let (items, total) = store.list(1, 1, Some(&electronics()), Some(&order_by)).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Laptop");

        assert_eq!(store.list_all(None, None).await.unwrap().len(), 3);
        assert_eq!(store.count(&electronics()).await.unwrap(), 2);
        assert_eq!(store.count_all().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retrieve_and_find_by_id() {
        let (_, store) = store();

        assert_eq!(store.retrieve(2).await.unwrap().name, "Phone");
        assert!(store.find_by_id(99).await.unwrap().is_none());
        assert!(store.retrieve(99).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (memory, store) = store();

        let updated = store.update(3, |p| p.price = 20.0).await.unwrap();
        assert_eq!(updated.price, 20.0);
        assert_eq!(store.retrieve(3).await.unwrap().price, 20.0);
        assert_eq!(memory.rows("products").len(), 3);

        assert!(store.delete(3).await.unwrap());
        assert!(!store.delete(3).await.unwrap());
        assert_eq!(store.count_all().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_get_many_and_exists() {
        let (_, store) = store();

        let found = store.get_many(vec![3, 1, 42]).await.unwrap();
        let ids: Vec<Option<i64>> = found.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![Some(1), Some(3)]);
        assert!(store.get_many(Vec::<i64>::new()).await.unwrap().is_empty());

        assert!(store.exists(&electronics()).await.unwrap());
        let mut garden = Where::new();
        garden.set("category", "Garden");
        assert!(!store.exists(&garden).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_all_keeps_repeated_conditions() {
        let (_, store) = store();
        let mut conditions = Where::new();
        conditions
            .add_with("id", 1, WhereOptions::not_equal())
            .add_with("id", 2, WhereOptions::not_equal());

        let found = store.find_all(&conditions, None).await.unwrap();
        let ids: Vec<Option<i64>> = found.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![Some(3)]);
        assert_eq!(store.count(&conditions).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_one_variants() {
        let (_, store) = store();

        assert_eq!(store.find_one(&electronics()).await.unwrap().name, "Laptop");
        assert_eq!(store.find_all(&electronics(), None).await.unwrap().len(), 2);

        let mut garden = Where::new();
        garden.set("category", "Garden");
        let created = store
            .find_one_or_create(&garden, &Product::new("Rake", "Garden", 12.0))
            .await
            .unwrap();
        assert_eq!(created.id, Some(4));
        let again = store
            .find_one_or_create(&garden, &Product::new("Hoe", "Garden", 9.0))
            .await
            .unwrap();
        assert_eq!(again.name, "Rake");

        let renamed = store
            .find_one_and_update(&garden, |p| p.name = "Leaf rake".to_string())
            .await
            .unwrap();
        assert_eq!(store.retrieve(4).await.unwrap().name, "Leaf rake");
        assert_eq!(renamed.id, Some(4));

        let removed = store.find_one_and_delete(&garden).await.unwrap();
        assert_eq!(removed.name, "Leaf rake");
        assert!(store.find_one(&garden).await.unwrap_err().is_not_found());
    }
}
