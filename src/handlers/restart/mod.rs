use crate::classpath::ClasspathOrder;
use crate::handlers::{
    ClassLoaderHandler, DelegationOrder, HandlerError, HandlerMetadata, add_urls,
};
use crate::introspect::{Introspect, ObjectId};
use crate::log_node::LogNode;
use crate::scan_spec::ScanSpec;

const ID: &str = "spring-boot-restart";

/// Handler for the Spring Boot devtools restart loader, which looks in its own
/// URLs before asking its parent.
#[derive(Default)]
pub(crate) struct RestartClassLoaderHandler;

crate::register_handler!(RestartClassLoaderHandler);

impl ClassLoaderHandler for RestartClassLoaderHandler {
    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            id: ID,
            handled_class_loaders: &[
                "org.springframework.boot.devtools.restart.classloader.RestartClassLoader",
            ],
        }
    }

    fn delegation_order(&self, _heap: &dyn Introspect, _class_loader: ObjectId) -> DelegationOrder {
        DelegationOrder::ChildFirst
    }

    fn handle(
        &self,
        _scan_spec: &ScanSpec,
        heap: &dyn Introspect,
        class_loader: ObjectId,
        classpath_order: &ClasspathOrder,
        log: Option<&LogNode>,
    ) -> Result<(), HandlerError> {
        let urls = heap
            .invoke(class_loader, "getURLs", &[])
            .map_err(HandlerError::mandatory(ID, class_loader, "URLs"))?;
        add_urls(heap, &urls, class_loader, classpath_order, log);
        Ok(())
    }
}
