//! Named component registry
//!
//! Keeps models, services and controllers of an application under string
//! names so they can be looked up by type later. Lookups return errors
//! instead of panicking when a name is unknown or bound to another type.

use crate::traits::Model;
use std::any::{type_name, Any};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

type Component = Arc<dyn Any + Send + Sync>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{kind} already registered: {name}")]
    AlreadyRegistered { kind: &'static str, name: String },

    #[error("{kind} not registered: {name}")]
    NotRegistered { kind: &'static str, name: String },

    #[error("{kind} {name} is not a {expected}")]
    TypeMismatch {
        kind: &'static str,
        name: String,
        expected: &'static str,
    },
}

/// Application service stored in the registry
pub trait Service: Any + Send + Sync {
    fn name(&self) -> &str;
}

/// Application controller stored in the registry
pub trait Controller: Any + Send + Sync {
    fn name(&self) -> &str;
}

struct ModelSlot {
    name: String,
    value: Component,
    migration: fn(&str) -> Vec<String>,
}

/// Everything one application namespace contributes.
///
/// ```
/// use record_store::registry::{Registration, Registry};
/// # use record_store::Model;
/// # use serde::{Deserialize, Serialize};
/// # #[derive(Debug, Clone, Serialize, Deserialize)]
/// # struct Product { id: i64 }
/// # impl Model for Product { fn table_name() -> &'static str { "products" } }
///
/// let mut registry = Registry::new();
/// registry
///     .register(Registration::new("shop").model(Product { id: 0 }))
///     .unwrap();
/// assert!(registry.model::<Product>("products").is_ok());
/// ```
pub struct Registration {
    namespace: String,
    model: Option<ModelSlot>,
    service: Option<(String, Component)>,
    controller: Option<(String, Component)>,
}

impl Registration {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            model: None,
            service: None,
            controller: None,
        }
    }

    /// Model registered under its table name
    pub fn model<M: Model>(mut self, model: M) -> Self {
        self.model = Some(ModelSlot {
            name: M::table_name().to_string(),
            value: Arc::new(model),
            migration: M::migration_sql,
        });
        self
    }

    pub fn service<S: Service>(mut self, service: S) -> Self {
        self.service = Some((service.name().to_string(), Arc::new(service)));
        self
    }

    pub fn controller<C: Controller>(mut self, controller: C) -> Self {
        self.controller = Some((controller.name().to_string(), Arc::new(controller)));
        self
    }
}

#[derive(Default)]
pub struct Registry {
    namespaces: HashSet<String>,
    models: HashMap<String, Component>,
    migrations: Vec<(String, fn(&str) -> Vec<String>)>,
    services: HashMap<String, Component>,
    controllers: HashMap<String, Component>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut models: Vec<&String> = self.models.keys().collect();
        let mut services: Vec<&String> = self.services.keys().collect();
        let mut controllers: Vec<&String> = self.controllers.keys().collect();
        models.sort();
        services.sort();
        controllers.sort();

        f.debug_struct("Registry")
            .field("namespaces", &self.namespaces.len())
            .field("models", &models)
            .field("services", &services)
            .field("controllers", &controllers)
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a namespace with its model, service and controller.
    ///
    /// Nothing is stored when the namespace or any component name is taken.
    pub fn register(&mut self, registration: Registration) -> Result<(), RegistryError> {
        let Registration {
            namespace,
            model,
            service,
            controller,
        } = registration;

        if self.namespaces.contains(&namespace) {
            return Err(RegistryError::AlreadyRegistered {
                kind: "app",
                name: namespace,
            });
        }
        if let Some(slot) = &model {
            ensure_free("model", &self.models, &slot.name)?;
        }
        if let Some((name, _)) = &service {
            ensure_free("service", &self.services, name)?;
        }
        if let Some((name, _)) = &controller {
            ensure_free("controller", &self.controllers, name)?;
        }

        info!(namespace = %namespace, "registering app");
        self.namespaces.insert(namespace);

        if let Some(slot) = model {
            self.insert_model(slot);
        }
        if let Some((name, service)) = service {
            info!(service = %name, "registering service");
            self.services.insert(name, service);
        }
        if let Some((name, controller)) = controller {
            info!(controller = %name, "registering controller");
            self.controllers.insert(name, controller);
        }
        Ok(())
    }

    pub fn register_model<M: Model>(&mut self, model: M) -> Result<(), RegistryError> {
        ensure_free("model", &self.models, M::table_name())?;
        self.insert_model(ModelSlot {
            name: M::table_name().to_string(),
            value: Arc::new(model),
            migration: M::migration_sql,
        });
        Ok(())
    }

    pub fn register_service<S: Service>(&mut self, service: S) -> Result<(), RegistryError> {
        let name = service.name().to_string();
        ensure_free("service", &self.services, &name)?;
        info!(service = %name, "registering service");
        self.services.insert(name, Arc::new(service));
        Ok(())
    }

    pub fn register_controller<C: Controller>(
        &mut self,
        controller: C,
    ) -> Result<(), RegistryError> {
        let name = controller.name().to_string();
        ensure_free("controller", &self.controllers, &name)?;
        info!(controller = %name, "registering controller");
        self.controllers.insert(name, Arc::new(controller));
        Ok(())
    }

    pub fn model<M: Model>(&self, name: &str) -> Result<Arc<M>, RegistryError> {
        lookup("model", &self.models, name)
    }

    pub fn service<S: Service>(&self, name: &str) -> Result<Arc<S>, RegistryError> {
        lookup("service", &self.services, name)
    }

    pub fn controller<C: Controller>(&self, name: &str) -> Result<Arc<C>, RegistryError> {
        lookup("controller", &self.controllers, name)
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Model names in registration order
    pub fn model_names(&self) -> Vec<&str> {
        self.migrations.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Migration statements of every registered model, in registration order,
    /// written against `prefix` + table name
    pub fn migrations(&self, prefix: &str) -> Vec<(String, Vec<String>)> {
        self.migrations
            .iter()
            .map(|(name, migration)| {
                let table = format!("{}{}", prefix, name);
                (name.clone(), migration(&table))
            })
            .collect()
    }

    fn insert_model(&mut self, slot: ModelSlot) {
        info!(model = %slot.name, "registering model");
        self.migrations.push((slot.name.clone(), slot.migration));
        self.models.insert(slot.name, slot.value);
    }
}

fn ensure_free(
    kind: &'static str,
    components: &HashMap<String, Component>,
    name: &str,
) -> Result<(), RegistryError> {
    if components.contains_key(name) {
        return Err(RegistryError::AlreadyRegistered {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

fn lookup<T: Any + Send + Sync>(
    kind: &'static str,
    components: &HashMap<String, Component>,
    name: &str,
) -> Result<Arc<T>, RegistryError> {
    let component = components
        .get(name)
        .cloned()
        .ok_or_else(|| RegistryError::NotRegistered {
            kind,
            name: name.to_string(),
        })?;

    component
        .downcast::<T>()
        .map_err(|_| RegistryError::TypeMismatch {
            kind,
            name: name.to_string(),
            expected: type_name::<T>(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Product, Review};

    struct ProductService;

    impl Service for ProductService {
        fn name(&self) -> &str {
            "product"
        }
    }

    struct ProductController {
        prefix: &'static str,
    }

    impl Controller for ProductController {
        fn name(&self) -> &str {
            "product"
        }
    }

    fn product() -> Product {
        Product::new("template", "", 0.0)
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = Registry::new();
        registry
            .register(
                Registration::new("shop")
                    .model(product())
                    .service(ProductService)
                    .controller(ProductController { prefix: "/products" }),
            )
            .unwrap();

        assert_eq!(registry.model::<Product>("products").unwrap().name, "template");
        assert!(registry.service::<ProductService>("product").is_ok());
        assert_eq!(
            registry.controller::<ProductController>("product").unwrap().prefix,
            "/products"
        );
    }

    #[test]
    fn test_duplicate_namespace_is_rejected_without_side_effects() {
        let mut registry = Registry::new();
        registry.register(Registration::new("shop")).unwrap();

        let err = registry
            .register(Registration::new("shop").service(ProductService))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::AlreadyRegistered {
                kind: "app",
                name: "shop".to_string()
            }
        );
        assert!(registry.service::<ProductService>("product").is_err());
    }

    #[test]
    fn test_duplicate_component_names() {
        let mut registry = Registry::new();
        registry.register_model(product()).unwrap();
        assert!(matches!(
            registry.register_model(product()),
            Err(RegistryError::AlreadyRegistered { kind: "model", .. })
        ));

        registry.register_service(ProductService).unwrap();
        assert!(registry.register_service(ProductService).is_err());

        // a clash in a namespace registration leaves the namespace free
        let err = registry
            .register(Registration::new("other").model(product()))
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered { kind: "model", .. }));
        assert!(registry.register(Registration::new("other")).is_ok());
    }

    #[test]
    fn test_lookup_errors() {
        let mut registry = Registry::new();
        registry.register_model(product()).unwrap();

        assert!(matches!(
            registry.model::<Review>("products"),
            Err(RegistryError::TypeMismatch { kind: "model", .. })
        ));
        assert!(matches!(
            registry.model::<Product>("orders"),
            Err(RegistryError::NotRegistered { kind: "model", .. })
        ));
    }

    #[test]
    fn test_migrations_follow_registration_order() {
        let mut registry = Registry::new();
        registry
            .register_model(Review {
                id: 1,
                product_id: 1,
                rating: 5,
            })
            .unwrap();
        registry.register_model(product()).unwrap();

        assert_eq!(registry.model_names(), vec!["reviews", "products"]);
        let migrations = registry.migrations("");
        assert!(migrations[0].1.is_empty());
        assert_eq!(migrations[1].0, "products");
        assert!(migrations[1].1[0].starts_with("CREATE TABLE IF NOT EXISTS products "));
    }

    #[test]
    fn test_migrations_use_table_prefix() {
        let mut registry = Registry::new();
        registry.register_model(product()).unwrap();

        let migrations = registry.migrations("shop_");
        assert_eq!(migrations[0].0, "products");
        assert_eq!(
            migrations[0].1[1],
            "CREATE INDEX IF NOT EXISTS idx_shop_products_category ON shop_products (category)"
        );
        assert!(migrations[0].1[0].starts_with("CREATE TABLE IF NOT EXISTS shop_products "));
        assert_eq!(
            Product::drop_table_sql("shop_products"),
            "DROP TABLE IF EXISTS shop_products"
        );
    }
}
