use crate::classpath::ClasspathOrder;
use crate::handlers::{
    ClassLoaderHandler, DelegationOrder, HandlerError, HandlerMetadata, add_urls,
};
use crate::introspect::{Introspect, ObjectId};
use crate::log_node::LogNode;
use crate::scan_spec::ScanSpec;

const ID: &str = "url-class-loader";

/// Handler for the standard hierarchical loaders that expose their roots as URLs.
#[derive(Default)]
pub(crate) struct UrlClassLoaderHandler;

crate::register_handler!(UrlClassLoaderHandler);

impl ClassLoaderHandler for UrlClassLoaderHandler {
    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            id: ID,
            handled_class_loaders: &[
                "java.net.URLClassLoader",
                "jdk.internal.loader.ClassLoaders$AppClassLoader",
                "jdk.internal.loader.ClassLoaders$PlatformClassLoader",
            ],
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
        // JDK 9+ builtin loaders keep their URLs in `ucp.path` instead of answering getURLs().
        let urls = heap.invoke(class_loader, "getURLs", &[]).or_else(|error| {
            heap.field(class_loader, "ucp")
                .and_then(|ucp| heap.field_of(&ucp, "path"))
                .map_err(|_| error)
        });
        let urls = urls.map_err(HandlerError::mandatory(ID, class_loader, "URLs"))?;
        add_urls(heap, &urls, class_loader, classpath_order, log);
        Ok(())
    }
}
