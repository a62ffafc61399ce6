use crate::classpath::ClasspathOrder;
use crate::handlers::{
    ClassLoaderHandler, DelegationOrder, HandlerError, HandlerMetadata, add_urls,
};
use crate::introspect::{Introspect, ObjectId, Value};
use crate::location::split_path_list;
use crate::log_node::LogNode;
use crate::scan_spec::ScanSpec;

/// String fields that commonly hold a path list on loaders nobody has a handler for.
const PATH_LIST_FIELDS: [&str; 3] = ["classpath", "classPath", "path"];

/// Best-effort handler for class loaders that no registered handler claims.
///
/// Not registered: the registry hands it out only when dispatch finds no match.
pub(crate) struct FallbackClassLoaderHandler;

impl ClassLoaderHandler for FallbackClassLoaderHandler {
    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            id: "fallback",
            handled_class_loaders: &["java.lang.ClassLoader"],
        }
    }

    fn delegation_order(&self, _heap: &dyn Introspect, _class_loader: ObjectId) -> DelegationOrder {
        DelegationOrder::ParentFirst
    }

    fn handle(
        &self,
        _scan_spec: &ScanSpec,
        heap: &dyn Introspect,
        class_loader: ObjectId,
        classpath_order: &ClasspathOrder,
        log: Option<&LogNode>,
    ) -> Result<(), HandlerError> {
        if let Ok(urls @ Value::Array(_)) = heap.invoke(class_loader, "getURLs", &[]) {
            add_urls(heap, &urls, class_loader, classpath_order, log);
            return Ok(());
        }
        for field in PATH_LIST_FIELDS {
            if let Ok(Value::Str(paths)) = heap.field(class_loader, field) {
                classpath_order.add_classpath_elements(split_path_list(&paths), class_loader, log);
                return Ok(());
            }
        }
        tracing::debug!(
            class_loader = %class_loader,
            class_name = heap.class_name(class_loader).unwrap_or("<unknown>"),
            "no classpath found on unrecognized class loader"
        );
        Ok(())
    }
}
