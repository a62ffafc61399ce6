use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::classpath::ClasspathOrder;
use crate::introspect::{Introspect, IntrospectionError, ObjectId, Value};
use crate::log_node::LogNode;
use crate::scan_spec::ScanSpec;

// Handler modules are discovered by build.rs from src/handlers/*/mod.rs.
include!(concat!(env!("OUT_DIR"), "/handler_modules.rs"));

/// Whether a class loader consults its parent before or after its own classpath.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationOrder {
    ParentFirst,
    ChildFirst,
}

/// Metadata describing a class loader handler.
#[derive(Clone, Debug)]
pub struct HandlerMetadata {
    pub id: &'static str,
    /// Fully-qualified class loader type names this handler recognizes.
    pub handled_class_loaders: &'static [&'static str],
}

/// A handler could not read a value it cannot work without.
#[derive(Debug, Error)]
#[error("{handler}: cannot resolve {what} of class loader {class_loader}")]
pub struct HandlerError {
    pub handler: &'static str,
    pub class_loader: ObjectId,
    pub what: &'static str,
    #[source]
    pub source: IntrospectionError,
}

impl HandlerError {
    pub fn mandatory(
        handler: &'static str,
        class_loader: ObjectId,
        what: &'static str,
    ) -> impl FnOnce(IntrospectionError) -> HandlerError {
        move |source| HandlerError {
            handler,
            class_loader,
            what,
            source,
        }
    }
}

/// Knows how to extract the classpath of one family of class loaders.
///
/// One instance serves every loader of its family during a scan, so any state a
/// handler keeps between `handle` calls must be synchronized.
pub trait ClassLoaderHandler: Send + Sync {
    fn metadata(&self) -> HandlerMetadata;

    /// Loader this one wraps and delegates to, if any.
    fn embedded_class_loader(
        &self,
        _heap: &dyn Introspect,
        _class_loader: ObjectId,
    ) -> Option<ObjectId> {
        None
    }

    fn delegation_order(&self, heap: &dyn Introspect, class_loader: ObjectId) -> DelegationOrder;

    /// Add the classpath entries of `class_loader` to `classpath_order`.
    fn handle(
        &self,
        scan_spec: &ScanSpec,
        heap: &dyn Introspect,
        class_loader: ObjectId,
        classpath_order: &ClasspathOrder,
        log: Option<&LogNode>,
    ) -> Result<(), HandlerError>;
}

/// Wrapper struct for handler factory functions to enable inventory collection.
pub struct HandlerFactory(pub fn() -> Box<dyn ClassLoaderHandler>);

inventory::collect!(HandlerFactory);

/// Macro to register a class loader handler implementation.
///
/// Usage: `register_handler!(HandlerName);`
#[macro_export]
macro_rules! register_handler {
    ($handler_type:ty) => {
        inventory::submit! {
            $crate::handlers::HandlerFactory(|| Box::new(<$handler_type>::default()))
        }
    };
}

/// Returns all registered handlers, sorted by id.
pub fn all_handlers() -> Vec<Box<dyn ClassLoaderHandler>> {
    let mut handlers: Vec<Box<dyn ClassLoaderHandler>> = inventory::iter::<HandlerFactory>
        .into_iter()
        .map(|factory| (factory.0)())
        .collect();
    handlers.sort_by(|a, b| a.metadata().id.cmp(b.metadata().id));
    handlers
}

/// One instance of every handler, looked up by class loader type.
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn ClassLoaderHandler>>,
    by_type: BTreeMap<&'static str, usize>,
    fallback: Arc<dyn ClassLoaderHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::with_handlers(all_handlers())
    }

    pub fn with_handlers(handlers: Vec<Box<dyn ClassLoaderHandler>>) -> Self {
        let handlers: Vec<Arc<dyn ClassLoaderHandler>> =
            handlers.into_iter().map(Arc::from).collect();
        let mut by_type = BTreeMap::new();
        for (index, handler) in handlers.iter().enumerate() {
            let metadata = handler.metadata();
            for &type_name in metadata.handled_class_loaders {
                if let Some(previous) = by_type.insert(type_name, index) {
                    tracing::warn!(
                        class_loader_type = type_name,
                        replaced = handlers[previous].metadata().id,
                        handler = metadata.id,
                        "class loader type claimed by more than one handler"
                    );
                }
            }
        }
        Self {
            handlers,
            by_type,
            fallback: Arc::new(fallback::FallbackClassLoaderHandler),
        }
    }

    /// Handler for the most specific type of `class_loader` that some handler claims,
    /// else the fallback handler. `None` if the heap does not know the object.
    pub fn find_handler_for(
        &self,
        heap: &dyn Introspect,
        class_loader: ObjectId,
    ) -> Option<Arc<dyn ClassLoaderHandler>> {
        let hierarchy = heap.type_hierarchy(class_loader);
        if hierarchy.is_empty() {
            return None;
        }
        let handler = hierarchy
            .iter()
            .find_map(|type_name| self.by_type.get(type_name))
            .map(|&index| Arc::clone(&self.handlers[index]))
            .unwrap_or_else(|| Arc::clone(&self.fallback));
        Some(handler)
    }

    pub fn handlers(&self) -> &[Arc<dyn ClassLoaderHandler>] {
        &self.handlers
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Add the URLs of a `URL[]`/`List<URL>` value as classpath elements.
pub(crate) fn add_urls(
    heap: &dyn Introspect,
    urls: &Value,
    class_loader: ObjectId,
    classpath_order: &ClasspathOrder,
    log: Option<&LogNode>,
) {
    let Some(urls) = urls.as_array() else {
        return;
    };
    for url in urls {
        if let Some(url) = heap.string_value(url) {
            classpath_order.add_classpath_element(&url, class_loader, log);
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::introspect::{ObjectId, Value};
    use crate::snapshot::HeapObject;

    pub(crate) fn str_value(value: &str) -> Value {
        Value::Str(value.to_string())
    }

    pub(crate) fn refs(ids: &[u64]) -> Value {
        Value::Array(ids.iter().map(|&id| Value::Ref(ObjectId(id))).collect())
    }

    pub(crate) fn strings(values: &[&str]) -> Value {
        Value::Array(values.iter().map(|value| str_value(value)).collect())
    }

    pub(crate) fn file(id: u64, path: &str) -> HeapObject {
        HeapObject::new(id, "java.io.File").with_field("path", str_value(path))
    }

    pub(crate) fn locations(order: &crate::classpath::ClasspathOrder) -> Vec<String> {
        order
            .get_order()
            .into_iter()
            .map(|entry| entry.location)
            .collect()
    }
}
