use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use crate::classpath::ClasspathOrder;
use crate::handlers::{ClassLoaderHandler, DelegationOrder, HandlerError, HandlerMetadata};
use crate::introspect::{Introspect, IntrospectionError, ObjectId, Value};
use crate::location::join_base;
use crate::log_node::{self, LogNode};
use crate::scan_spec::ScanSpec;

const ID: &str = "equinox";

/// Bundle file fields naming the classpath element inside the base file, in priority order.
const CLASSPATH_ELEMENT_FIELDS: [&str; 2] = ["cp", "nestedDirName"];

/// Handler for Eclipse Equinox bundle class loaders.
///
/// Every Equinox loader of one framework sees the same system bundles, so they are
/// read only once per handler instance.
#[derive(Default)]
pub(crate) struct EquinoxClassLoaderHandler {
    already_read_system_bundles: Mutex<bool>,
}

crate::register_handler!(EquinoxClassLoaderHandler);

impl ClassLoaderHandler for EquinoxClassLoaderHandler {
    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            id: ID,
            handled_class_loaders: &["org.eclipse.osgi.internal.loader.EquinoxClassLoader"],
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
        let manager = heap
            .field(class_loader, "manager")
            .map_err(HandlerError::mandatory(ID, class_loader, "classpath manager"))?;
        let mut walk = BundleFileWalk {
            heap,
            class_loader,
            classpath_order,
            log,
            visited: HashSet::new(),
        };
        walk.add_classpath_entries(&manager);

        if let Ok(Value::Array(fragments)) = heap.field_of(&manager, "fragments") {
            for fragment in &fragments {
                walk.add_classpath_entries(fragment);
            }
        }

        let mut already_read = self
            .already_read_system_bundles
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !*already_read {
            let system_log = log_node::child(log, "Reading Equinox system bundles");
            match add_system_bundles(heap, class_loader, classpath_order, system_log.as_ref()) {
                Ok(()) => *already_read = true,
                Err(error) => {
                    tracing::debug!(
                        class_loader = %class_loader,
                        error = %error,
                        "Equinox system bundles not reachable"
                    );
                }
            }
        }
        Ok(())
    }
}

/// State of one walk over `ClasspathEntry.bundlefile` chains.
struct BundleFileWalk<'a> {
    heap: &'a dyn Introspect,
    class_loader: ObjectId,
    classpath_order: &'a ClasspathOrder,
    log: Option<&'a LogNode>,
    visited: HashSet<ObjectId>,
}

impl BundleFileWalk<'_> {
    /// Add the bundle files of every entry of `owner.entries`.
    fn add_classpath_entries(&mut self, owner: &Value) {
        let Ok(Value::Array(entries)) = self.heap.field_of(owner, "entries") else {
            return;
        };
        for entry in &entries {
            if let Ok(bundle_file) = self.heap.field_of(entry, "bundlefile") {
                self.add_bundle_file(bundle_file);
            }
        }
    }

    /// Visit a bundle file, then its `wrapped` chain, then its `next` chain.
    fn add_bundle_file(&mut self, bundle_file: Value) {
        let mut pending = vec![bundle_file];
        while let Some(bundle_file) = pending.pop() {
            let Some(bundle_file) = bundle_file.as_object() else {
                continue;
            };
            if !self.visited.insert(bundle_file) {
                tracing::debug!(bundle_file = %bundle_file, "bundle file already visited");
                continue;
            }
            self.add_base_file(bundle_file);
            if let Ok(next) = self.heap.field(bundle_file, "next") {
                pending.push(next);
            }
            if let Ok(wrapped) = self.heap.field(bundle_file, "wrapped") {
                pending.push(wrapped);
            }
        }
    }

    fn add_base_file(&self, bundle_file: ObjectId) {
        let Some(base_file) = self
            .heap
            .field(bundle_file, "basefile")
            .ok()
            .and_then(|base_file| self.heap.file_path(&base_file))
        else {
            return;
        };
        let element = CLASSPATH_ELEMENT_FIELDS.iter().find_map(|field| {
            self.heap
                .field(bundle_file, field)
                .ok()
                .and_then(|value| self.heap.string_value(&value))
        });
        let location = match element {
            Some(element) => join_base(&base_file, &element),
            None => base_file,
        };
        self.classpath_order
            .add_classpath_element(&location, self.class_loader, self.log);
    }
}

/// Locations of all bundles installed in the framework, found through the system module (id 0).
fn add_system_bundles(
    heap: &dyn Introspect,
    class_loader: ObjectId,
    classpath_order: &ClasspathOrder,
    log: Option<&LogNode>,
) -> Result<(), IntrospectionError> {
    let mut current = heap.field(class_loader, "delegate")?;
    for field in ["container", "storage", "moduleContainer", "moduleDatabase", "modulesById"] {
        current = heap.field_of(&current, field)?;
    }
    let system_module = heap.invoke_on(&current, "get", &[Value::Long(0)])?;
    let bundle = heap.invoke_on(&system_module, "getBundle", &[])?;
    let bundle_context = heap.invoke_on(&bundle, "getBundleContext", &[])?;
    let bundles = heap.invoke_on(&bundle_context, "getBundles", &[])?;
    let Some(bundles) = bundles.as_array() else {
        return Err(IntrospectionError::TypeMismatch {
            member: "getBundles".to_string(),
            expected: "array",
            found: bundles.kind(),
        });
    };
    for bundle in bundles {
        let location = heap
            .field_of(bundle, "module")
            .and_then(|module| heap.field_of(&module, "location"));
        let Ok(Value::Str(location)) = location else {
            continue;
        };
        if let Some(index) = location.find("file:") {
            classpath_order.add_classpath_entry(&location[index..], class_loader, log);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{file, locations, refs, str_value};
    use crate::snapshot::{HeapObject, HeapSnapshot};

    const LOADER: &str = "org.eclipse.osgi.internal.loader.EquinoxClassLoader";

    fn bundle_file(id: u64, base_file: u64) -> HeapObject {
        HeapObject::new(id, "org.eclipse.osgi.storage.bundlefile.ZipBundleFile")
            .with_field("basefile", Value::Ref(ObjectId(base_file)))
    }

    fn classpath_entry(id: u64, bundle_file: u64) -> HeapObject {
        HeapObject::new(id, "org.eclipse.osgi.internal.loader.classpath.ClasspathEntry")
            .with_field("bundlefile", Value::Ref(ObjectId(bundle_file)))
    }

    /// Loader 1 with manager 2 whose entries are `entries`.
    fn loader_with_entries(entries: &[u64]) -> HeapSnapshot {
        HeapSnapshot::new()
            .with_object(HeapObject::new(1, LOADER).with_field("manager", Value::Ref(ObjectId(2))))
            .with_object(
                HeapObject::new(2, "org.eclipse.osgi.internal.loader.classpath.ClasspathManager")
                    .with_field("entries", refs(entries)),
            )
    }

    /// Framework reachable from loader `loader` through `delegate`, with bundles at `locations`.
    fn with_system_bundles(mut heap: HeapSnapshot, loader: HeapObject, locations: &[&str]) -> HeapSnapshot {
        let chain = [
            (100, "org.eclipse.osgi.internal.loader.BundleLoader", "container"),
            (101, "org.eclipse.osgi.internal.framework.EquinoxContainer", "storage"),
            (102, "org.eclipse.osgi.storage.Storage", "moduleContainer"),
            (103, "org.eclipse.osgi.container.ModuleContainer", "moduleDatabase"),
            (104, "org.eclipse.osgi.container.ModuleDatabase", "modulesById"),
        ];
        heap.insert(loader.with_field("delegate", Value::Ref(ObjectId(100))));
        for (id, class_name, field) in chain {
            heap.insert(HeapObject::new(id, class_name).with_field(field, Value::Ref(ObjectId(id + 1))));
        }
        heap.insert(
            HeapObject::new(105, "java.util.HashMap")
                .with_method("get", vec![Value::Long(0)], Value::Ref(ObjectId(106))),
        );
        heap.insert(
            HeapObject::new(106, "org.eclipse.osgi.internal.framework.EquinoxContainerAdaptor$1")
                .with_getter("getBundle", Value::Ref(ObjectId(107))),
        );
        heap.insert(
            HeapObject::new(107, "org.eclipse.osgi.internal.framework.EquinoxBundle$SystemBundle")
                .with_getter("getBundleContext", Value::Ref(ObjectId(108))),
        );
        let bundle_ids: Vec<u64> = (0..locations.len() as u64).map(|index| 200 + index * 2).collect();
        heap.insert(
            HeapObject::new(108, "org.eclipse.osgi.internal.framework.BundleContextImpl")
                .with_getter("getBundles", refs(&bundle_ids)),
        );
        for (&bundle, location) in bundle_ids.iter().zip(locations) {
            heap.insert(
                HeapObject::new(bundle, "org.eclipse.osgi.internal.framework.EquinoxBundle")
                    .with_field("module", Value::Ref(ObjectId(bundle + 1))),
            );
            heap.insert(
                HeapObject::new(bundle + 1, "org.eclipse.osgi.internal.framework.EquinoxBundle$EquinoxModule")
                    .with_field("location", str_value(location)),
            );
        }
        heap
    }

    fn handle(
        handler: &EquinoxClassLoaderHandler,
        heap: &HeapSnapshot,
        loader: u64,
        order: &ClasspathOrder,
    ) -> Result<(), HandlerError> {
        handler.handle(&ScanSpec::default(), heap, ObjectId(loader), order, None)
    }

    #[test]
    fn joins_base_file_with_first_classpath_element_field() {
        let heap = loader_with_entries(&[10, 11, 12])
            .with_object(classpath_entry(10, 20))
            .with_object(classpath_entry(11, 21))
            .with_object(classpath_entry(12, 22))
            .with_object(
                bundle_file(20, 30)
                    .with_field("cp", str_value("bin/"))
                    .with_field("nestedDirName", str_value("ignored")),
            )
            .with_object(bundle_file(21, 31).with_field("nestedDirName", str_value("lib/nested.jar")))
            .with_object(bundle_file(22, 32).with_field("cp", Value::Null))
            .with_object(file(30, "/osgi/plugins/a"))
            .with_object(file(31, "/osgi/plugins/b.jar"))
            .with_object(file(32, "/osgi/plugins/c.jar"));
        let order = ClasspathOrder::new();

        handle(&EquinoxClassLoaderHandler::default(), &heap, 1, &order).expect("handle loader");

        assert_eq!(
            locations(&order),
            vec![
                "/osgi/plugins/a/bin",
                "/osgi/plugins/b.jar/lib/nested.jar",
                "/osgi/plugins/c.jar",
            ]
        );
    }

    #[test]
    fn self_referential_bundle_file_chain_terminates() {
        let heap = loader_with_entries(&[10])
            .with_object(classpath_entry(10, 20))
            .with_object(
                bundle_file(20, 30)
                    .with_field("wrapped", Value::Ref(ObjectId(21)))
                    .with_field("next", Value::Ref(ObjectId(20))),
            )
            .with_object(
                bundle_file(21, 31)
                    .with_field("wrapped", Value::Ref(ObjectId(20)))
                    .with_field("next", Value::Ref(ObjectId(21))),
            )
            .with_object(file(30, "/osgi/outer.jar"))
            .with_object(file(31, "/osgi/inner.jar"));
        let order = ClasspathOrder::new();

        handle(&EquinoxClassLoaderHandler::default(), &heap, 1, &order).expect("handle loader");

        assert_eq!(locations(&order), vec!["/osgi/outer.jar", "/osgi/inner.jar"]);
    }

    #[test]
    fn walks_fragment_classpaths_after_host_entries() {
        let heap = loader_with_entries(&[10])
            .with_object(
                HeapObject::new(2, "org.eclipse.osgi.internal.loader.classpath.ClasspathManager")
                    .with_field("entries", refs(&[10]))
                    .with_field("fragments", refs(&[3])),
            )
            .with_object(
                HeapObject::new(3, "org.eclipse.osgi.internal.loader.classpath.FragmentClasspath")
                    .with_field("entries", refs(&[11])),
            )
            .with_object(classpath_entry(10, 20))
            .with_object(classpath_entry(11, 21))
            .with_object(bundle_file(20, 30))
            .with_object(bundle_file(21, 31))
            .with_object(file(30, "/osgi/host.jar"))
            .with_object(file(31, "/osgi/fragment.jar"));
        let order = ClasspathOrder::new();

        handle(&EquinoxClassLoaderHandler::default(), &heap, 1, &order).expect("handle loader");

        assert_eq!(locations(&order), vec!["/osgi/host.jar", "/osgi/fragment.jar"]);
    }

    #[test]
    fn system_bundles_are_read_once_per_handler() {
        let heap = with_system_bundles(
            loader_with_entries(&[]),
            HeapObject::new(1, LOADER).with_field("manager", Value::Ref(ObjectId(2))),
            &["reference:file:/osgi/plugins/core.jar", "http://example.com/remote.jar"],
        );
        let heap = with_system_bundles(
            heap.with_object(
                HeapObject::new(5, "org.eclipse.osgi.internal.loader.classpath.ClasspathManager"),
            ),
            HeapObject::new(4, LOADER).with_field("manager", Value::Ref(ObjectId(5))),
            &["reference:file:/osgi/plugins/core.jar", "http://example.com/remote.jar"],
        );
        let handler = EquinoxClassLoaderHandler::default();
        let first = ClasspathOrder::new();
        let second = ClasspathOrder::new();

        handle(&handler, &heap, 1, &first).expect("first loader");
        handle(&handler, &heap, 4, &second).expect("second loader");

        assert_eq!(locations(&first), vec!["file:/osgi/plugins/core.jar"]);
        assert!(second.is_empty());
    }

    #[test]
    fn concurrent_loaders_emit_system_bundles_once() {
        let loaders = [(1, 2), (4, 5), (6, 7), (8, 9)];
        let mut heap = HeapSnapshot::new();
        for &(loader, manager) in &loaders {
            heap = with_system_bundles(
                heap.with_object(HeapObject::new(
                    manager,
                    "org.eclipse.osgi.internal.loader.classpath.ClasspathManager",
                )),
                HeapObject::new(loader, LOADER).with_field("manager", Value::Ref(ObjectId(manager))),
                &["reference:file:/osgi/plugins/core.jar"],
            );
        }
        let handler = EquinoxClassLoaderHandler::default();

        let emitted: Vec<String> = std::thread::scope(|scope| {
            let workers: Vec<_> = loaders
                .iter()
                .map(|&(loader, _)| {
                    let (heap, handler) = (&heap, &handler);
                    scope.spawn(move || {
                        let order = ClasspathOrder::new();
                        handle(handler, heap, loader, &order).expect("handle loader");
                        locations(&order)
                    })
                })
                .collect();
            workers
                .into_iter()
                .flat_map(|worker| worker.join().expect("worker thread"))
                .collect()
        });

        assert_eq!(emitted, vec!["file:/osgi/plugins/core.jar"]);
    }

    #[test]
    fn unreachable_system_bundles_are_retried() {
        let handler = EquinoxClassLoaderHandler::default();
        let without_framework = loader_with_entries(&[]);
        let with_framework = with_system_bundles(
            loader_with_entries(&[]),
            HeapObject::new(1, LOADER).with_field("manager", Value::Ref(ObjectId(2))),
            &["reference:file:/osgi/plugins/core.jar"],
        );
        let order = ClasspathOrder::new();

        handle(&handler, &without_framework, 1, &order).expect("loader without framework");
        assert!(order.is_empty());
        handle(&handler, &with_framework, 1, &order).expect("loader with framework");

        assert_eq!(locations(&order), vec!["file:/osgi/plugins/core.jar"]);
    }

    #[test]
    fn missing_manager_fails_the_container() {
        let heap = HeapSnapshot::new().with_object(HeapObject::new(1, LOADER));
        let order = ClasspathOrder::new();

        let error = handle(&EquinoxClassLoaderHandler::default(), &heap, 1, &order)
            .expect_err("manager is mandatory");

        assert_eq!(error.handler, ID);
        assert_eq!(error.what, "classpath manager");
        assert!(order.is_empty());
    }
}
