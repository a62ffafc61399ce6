use std::collections::HashSet;
use std::sync::Arc;

use opentelemetry::{Context as OtelContext, KeyValue};
use rayon::prelude::*;
use serde::Serialize;

use crate::classpath::ClasspathOrder;
use crate::handlers::{ClassLoaderHandler, DelegationOrder, HandlerRegistry};
use crate::introspect::{Introspect, ObjectId, Value};
use crate::log_node::{self, LogNode};
use crate::scan_spec::ScanSpec;
use crate::telemetry::{Telemetry, record_handler_failure, with_span};

/// How class loaders are handed to their handlers.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ResolveMode {
    #[default]
    Sequential,
    /// One rayon task per class loader; results are merged in class loader order.
    Parallel,
}

/// A class loader in classpath order, with the handler that resolved it.
#[derive(Clone, Debug, Serialize)]
pub struct ResolvedClassLoader {
    pub id: ObjectId,
    pub class_name: String,
    pub handler: &'static str,
    pub delegation_order: DelegationOrder,
}

/// A class loader whose handler failed; it contributes no entries.
#[derive(Clone, Debug, Serialize)]
pub struct ContainerFailure {
    pub class_loader: ObjectId,
    pub handler: &'static str,
    pub message: String,
}

/// Outcome of resolving a set of root class loaders.
#[derive(Debug, Default)]
pub struct Resolution {
    pub order: ClasspathOrder,
    pub class_loaders: Vec<ResolvedClassLoader>,
    pub failures: Vec<ContainerFailure>,
}

struct PlannedLoader {
    resolved: ResolvedClassLoader,
    handler: Arc<dyn ClassLoaderHandler>,
}

/// Walks class loader graphs and collects their classpath through the registered handlers.
///
/// Every call to `resolve` or `class_loader_order` builds a fresh registry, so state that
/// handlers keep between loaders never outlives one scan.
pub struct ClasspathResolver<'a> {
    registry: fn() -> HandlerRegistry,
    telemetry: Option<&'a Telemetry>,
}

impl Default for ClasspathResolver<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ClasspathResolver<'a> {
    pub fn new() -> Self {
        Self::with_registry(HandlerRegistry::new)
    }

    /// Resolver whose scans use the handlers built by `registry`.
    pub fn with_registry(registry: fn() -> HandlerRegistry) -> Self {
        Self {
            registry,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Option<&'a Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Class loaders reachable from `roots` through embedded loaders and parents, in the
    /// order their classpath entries take effect.
    pub fn class_loader_order(
        &self,
        heap: &dyn Introspect,
        roots: &[ObjectId],
    ) -> Vec<ResolvedClassLoader> {
        plan(&(self.registry)(), heap, roots)
            .into_iter()
            .map(|planned| planned.resolved)
            .collect()
    }

    pub fn resolve(
        &self,
        scan_spec: &ScanSpec,
        heap: &dyn Introspect,
        roots: &[ObjectId],
        mode: ResolveMode,
    ) -> Resolution {
        let log = LogNode::root(format_args!(
            "Resolving classpath of {} root class loaders",
            roots.len()
        ));
        let planned = plan(&(self.registry)(), heap, roots);
        tracing::info!(
            roots = roots.len(),
            class_loaders = planned.len(),
            mode = ?mode,
            "resolving classpath"
        );

        let outcomes: Vec<Result<ClasspathOrder, ContainerFailure>> = match mode {
            ResolveMode::Sequential => planned
                .iter()
                .map(|loader| {
                    with_span(
                        self.telemetry,
                        &span_name(loader),
                        &span_attributes(loader),
                        || handle_loader(scan_spec, heap, loader, Some(&log)),
                    )
                })
                .collect(),
            ResolveMode::Parallel => {
                let parent_cx = OtelContext::current();
                planned
                    .par_iter()
                    .map(|loader| match self.telemetry {
                        Some(telemetry) => telemetry.in_span_with_parent(
                            &span_name(loader),
                            &span_attributes(loader),
                            &parent_cx,
                            || handle_loader(scan_spec, heap, loader, Some(&log)),
                        ),
                        None => handle_loader(scan_spec, heap, loader, Some(&log)),
                    })
                    .collect()
            }
        };

        let mut resolution = Resolution::default();
        for (loader, outcome) in planned.into_iter().zip(outcomes) {
            match outcome {
                Ok(order) => resolution.order.extend_from(&order),
                Err(failure) => resolution.failures.push(failure),
            }
            resolution.class_loaders.push(loader.resolved);
        }
        tracing::info!(
            entries = resolution.order.len(),
            failures = resolution.failures.len(),
            "resolved classpath"
        );
        resolution
    }
}

fn plan(
    registry: &HandlerRegistry,
    heap: &dyn Introspect,
    roots: &[ObjectId],
) -> Vec<PlannedLoader> {
    let mut visited = HashSet::new();
    let mut planned = Vec::new();
    for &root in roots {
        delegate_to(registry, heap, root, &mut visited, &mut planned);
    }
    planned
}

/// Append `class_loader` and its ancestry, parents before or after it by delegation order.
fn delegate_to(
    registry: &HandlerRegistry,
    heap: &dyn Introspect,
    class_loader: ObjectId,
    visited: &mut HashSet<ObjectId>,
    planned: &mut Vec<PlannedLoader>,
) {
    if !visited.insert(class_loader) {
        return;
    }
    let Some(handler) = registry.find_handler_for(heap, class_loader) else {
        tracing::debug!(class_loader = %class_loader, "class loader not found in heap");
        return;
    };
    if let Some(embedded) = handler.embedded_class_loader(heap, class_loader) {
        delegate_to(registry, heap, embedded, visited, planned);
    }
    let delegation_order = handler.delegation_order(heap, class_loader);
    let loader = PlannedLoader {
        resolved: ResolvedClassLoader {
            id: class_loader,
            class_name: heap.class_name(class_loader).unwrap_or_default().to_string(),
            handler: handler.metadata().id,
            delegation_order,
        },
        handler,
    };
    let parent = parent_of(heap, class_loader);
    match delegation_order {
        DelegationOrder::ParentFirst => {
            if let Some(parent) = parent {
                delegate_to(registry, heap, parent, visited, planned);
            }
            planned.push(loader);
        }
        DelegationOrder::ChildFirst => {
            planned.push(loader);
            if let Some(parent) = parent {
                delegate_to(registry, heap, parent, visited, planned);
            }
        }
    }
}

fn parent_of(heap: &dyn Introspect, class_loader: ObjectId) -> Option<ObjectId> {
    heap.field(class_loader, "parent")
        .or_else(|_| heap.invoke(class_loader, "getParent", &[]))
        .ok()
        .as_ref()
        .and_then(Value::as_object)
}

/// Run one handler into its own order so that a failure leaves nothing behind.
fn handle_loader(
    scan_spec: &ScanSpec,
    heap: &dyn Introspect,
    loader: &PlannedLoader,
    log: Option<&LogNode>,
) -> Result<ClasspathOrder, ContainerFailure> {
    let resolved = &loader.resolved;
    let log = log_node::child(
        log,
        format_args!(
            "Class loader {} {} ({})",
            resolved.class_name, resolved.id, resolved.handler
        ),
    );
    let order = ClasspathOrder::new();
    match loader
        .handler
        .handle(scan_spec, heap, resolved.id, &order, log.as_ref())
    {
        Ok(()) => Ok(order),
        Err(error) => {
            let message = error.to_string();
            tracing::warn!(
                class_loader = %resolved.id,
                class_name = %resolved.class_name,
                handler = resolved.handler,
                error = %message,
                "skipping class loader"
            );
            record_handler_failure(resolved.handler, &message);
            Err(ContainerFailure {
                class_loader: resolved.id,
                handler: resolved.handler,
                message,
            })
        }
    }
}

fn span_name(loader: &PlannedLoader) -> String {
    format!("handler:{}", loader.resolved.handler)
}

fn span_attributes(loader: &PlannedLoader) -> [KeyValue; 2] {
    [
        KeyValue::new("classpath_scope.class_loader", loader.resolved.id.to_string()),
        KeyValue::new(
            "classpath_scope.class_loader_type",
            loader.resolved.class_name.clone(),
        ),
    ]
}
