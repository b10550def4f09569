use crate::query_builder::QueryBuilder;
use crate::traits::{Executor, Model};
use std::marker::PhantomData;
use std::sync::Arc;

/// Ready-made CRUD operations for one model, built on `QueryBuilder`
pub struct GenericStore<T: Model> {
    pub(crate) executor: Arc<dyn Executor>,
    _phantom: PhantomData<T>,
}

impl<T: Model> Clone for GenericStore<T> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            _phantom: PhantomData,
        }
    }
}

impl<T: Model> std::fmt::Debug for GenericStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericStore")
            .field("table", &T::table_name())
            .field("table_prefix", &self.executor.table_prefix())
            .finish()
    }
}

impl<T: Model> GenericStore<T> {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            _phantom: PhantomData,
        }
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Fresh builder over this store's table
    pub fn query(&self) -> QueryBuilder<T> {
        QueryBuilder::new(Arc::clone(&self.executor))
    }

    pub(crate) fn by_id(&self, id: impl Into<serde_json::Value>) -> QueryBuilder<T> {
        self.query().filter(T::primary_key_field(), id)
    }
}
