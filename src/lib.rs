//! Resolve the classpath of JVM class loader graphs without loading classes, and scope
//! packages, paths, classes and jars with whitelists and blacklists.

pub mod classpath;
pub mod glob;
pub mod handlers;
pub mod introspect;
pub mod location;
pub mod log_node;
pub mod resolve;
pub mod scan_spec;
pub mod scope;
pub mod snapshot;
pub mod telemetry;
