use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use crate::classpath::ClasspathOrder;
use crate::handlers::{ClassLoaderHandler, DelegationOrder, HandlerError, HandlerMetadata};
use crate::introspect::{Introspect, ObjectId, Value};
use crate::location::file_uri;
use crate::log_node::LogNode;
use crate::scan_spec::ScanSpec;

const ID: &str = "felix";

/// Handler for Apache Felix bundle class loaders.
///
/// A loader's own wiring is always added. Required wirings already walked are
/// remembered for the lifetime of the handler, so bundles shared by several loaders
/// are added once.
#[derive(Default)]
pub(crate) struct FelixClassLoaderHandler {
    visited: Mutex<HashSet<ObjectId>>,
}

crate::register_handler!(FelixClassLoaderHandler);

impl ClassLoaderHandler for FelixClassLoaderHandler {
    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            id: ID,
            handled_class_loaders: &[
                "org.apache.felix.framework.BundleWiringImpl$BundleClassLoaderJava5",
                "org.apache.felix.framework.BundleWiringImpl$BundleClassLoader",
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
        let wiring = heap
            .object_field(class_loader, "m_wiring")
            .map_err(HandlerError::mandatory(ID, class_loader, "bundle wiring"))?;

        let mut visited = self.visited.lock().unwrap_or_else(PoisonError::into_inner);
        visited.insert(wiring);
        add_bundle(heap, wiring, class_loader, classpath_order, log);
        let mut pending = VecDeque::from(provider_wirings(heap, wiring));
        while let Some(wiring) = pending.pop_front() {
            if !visited.insert(wiring) {
                tracing::debug!(wiring = %wiring, "bundle wiring already visited");
                continue;
            }
            add_bundle(heap, wiring, class_loader, classpath_order, log);
            pending.extend(provider_wirings(heap, wiring));
        }
        Ok(())
    }
}

/// Add the content of the wiring's revision, then its embedded content paths.
fn add_bundle(
    heap: &dyn Introspect,
    wiring: ObjectId,
    class_loader: ObjectId,
    classpath_order: &ClasspathOrder,
    log: Option<&LogNode>,
) {
    let Ok(revision) = heap.invoke(wiring, "getRevision", &[]) else {
        return;
    };
    let Ok(content) = heap.invoke_on(&revision, "getContent", &[]) else {
        return;
    };
    let Some(location) = content_location(heap, &content) else {
        return;
    };
    classpath_order.add_classpath_element(&location, class_loader, log);

    let Ok(Value::Array(embedded)) = heap.invoke_on(&revision, "getContentPath", &[]) else {
        return;
    };
    for embedded in embedded.iter().filter(|embedded| **embedded != content) {
        if let Some(location) = content_location(heap, embedded) {
            classpath_order.add_classpath_element(&location, class_loader, log);
        }
    }
}

fn content_location(heap: &dyn Introspect, content: &Value) -> Option<String> {
    let file = heap.invoke_on(content, "getFile", &[]).ok()?;
    heap.file_path(&file).map(|path| file_uri(&path))
}

/// Wirings providing the capabilities this wiring requires.
fn provider_wirings(heap: &dyn Introspect, wiring: ObjectId) -> Vec<ObjectId> {
    let Ok(Value::Array(wires)) = heap.invoke(wiring, "getRequiredWires", &[Value::Null]) else {
        return Vec::new();
    };
    wires
        .iter()
        .filter_map(|wire| heap.invoke_on(wire, "getProviderWiring", &[]).ok())
        .filter_map(|provider| provider.as_object())
        .collect()
}
