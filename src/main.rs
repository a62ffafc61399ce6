use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use opentelemetry::KeyValue;
use serde::Serialize;

use classpath_scope::introspect::ObjectId;
use classpath_scope::location::is_archive;
use classpath_scope::resolve::{
    ClasspathResolver, ContainerFailure, Resolution, ResolveMode, ResolvedClassLoader,
};
use classpath_scope::scan_spec::ScanSpec;
use classpath_scope::snapshot::HeapSnapshot;
use classpath_scope::telemetry::{Telemetry, current_trace_id, init_logging, with_span};

/// CLI arguments for classpath-scope execution.
#[derive(Parser, Debug)]
#[command(
    name = "classpath-scope",
    about = "Resolve the classpath of a captured JVM class loader graph and scope it with whitelists and blacklists.",
    version
)]
struct Cli {
    /// JSON heap snapshot of the class loader graph.
    #[arg(long, value_name = "PATH")]
    snapshot: PathBuf,
    /// Root class loader object id; defaults to the snapshot's roots.
    #[arg(long = "root", value_name = "ID")]
    roots: Vec<u64>,
    #[arg(long, value_name = "PACKAGE")]
    whitelist_package: Vec<String>,
    #[arg(long, value_name = "PACKAGE")]
    blacklist_package: Vec<String>,
    #[arg(long, value_name = "PATH")]
    whitelist_path: Vec<String>,
    #[arg(long, value_name = "PATH")]
    blacklist_path: Vec<String>,
    #[arg(long, value_name = "CLASS")]
    whitelist_class: Vec<String>,
    #[arg(long, value_name = "CLASS")]
    blacklist_class: Vec<String>,
    /// Jar leaf name or glob, e.g. `spring-*.jar`.
    #[arg(long, value_name = "JAR")]
    whitelist_jar: Vec<String>,
    #[arg(long, value_name = "JAR")]
    blacklist_jar: Vec<String>,
    /// Resolve class loaders on a thread pool.
    #[arg(long)]
    parallel: bool,
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// OTLP HTTP endpoint to export traces to.
    #[arg(long, value_name = "URL")]
    otel: Option<String>,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    init_logging(cli.quiet);
    let telemetry = cli.otel.clone().map(Telemetry::new).transpose()?;
    let result = with_span(
        telemetry.as_ref(),
        "classpath-scope",
        &[KeyValue::new(
            "classpath_scope.snapshot",
            cli.snapshot.display().to_string(),
        )],
        || execute(&cli, telemetry.as_ref()),
    );
    if let Some(telemetry) = &telemetry {
        telemetry.shutdown()?;
    }
    result
}

fn execute(cli: &Cli, telemetry: Option<&Telemetry>) -> Result<()> {
    let started_at = Instant::now();
    let scan_spec = build_scan_spec(cli)?;
    let heap = load_snapshot(&cli.snapshot)?;
    let roots = select_roots(&heap, &cli.roots)?;
    let load_duration_ms = started_at.elapsed().as_millis();

    let mode = if cli.parallel {
        ResolveMode::Parallel
    } else {
        ResolveMode::Sequential
    };
    let resolve_started_at = Instant::now();
    let resolution = ClasspathResolver::new()
        .with_telemetry(telemetry)
        .resolve(&scan_spec, &heap, &roots, mode);
    let resolve_duration_ms = resolve_started_at.elapsed().as_millis();

    let report = build_report(&scan_spec, &resolution, current_trace_id());
    let mut writer = output_writer(cli.output.as_deref())?;
    serde_json::to_writer_pretty(&mut writer, &report)
        .context("failed to serialize classpath report")?;
    writer
        .write_all(b"\n")
        .context("failed to write classpath report")?;

    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} load_ms={} resolve_ms={} class_loaders={} entries={} failures={}",
            started_at.elapsed().as_millis(),
            load_duration_ms,
            resolve_duration_ms,
            resolution.class_loaders.len(),
            report.classpath.len(),
            resolution.failures.len()
        );
    }

    Ok(())
}

fn build_scan_spec(cli: &Cli) -> Result<ScanSpec> {
    let spec = ScanSpec::builder()
        .whitelist_packages(&cli.whitelist_package)
        .context("invalid --whitelist-package")?
        .blacklist_packages(&cli.blacklist_package)
        .context("invalid --blacklist-package")?
        .whitelist_paths(&cli.whitelist_path)
        .context("invalid --whitelist-path")?
        .blacklist_paths(&cli.blacklist_path)
        .context("invalid --blacklist-path")?
        .whitelist_classes(&cli.whitelist_class)
        .context("invalid --whitelist-class")?
        .blacklist_classes(&cli.blacklist_class)
        .context("invalid --blacklist-class")?
        .whitelist_jars(&cli.whitelist_jar)
        .context("invalid --whitelist-jar")?
        .blacklist_jars(&cli.blacklist_jar)
        .context("invalid --blacklist-jar")?
        .build();
    Ok(spec)
}

fn load_snapshot(path: &Path) -> Result<HeapSnapshot> {
    let file =
        File::open(path).with_context(|| format!("snapshot not found: {}", path.display()))?;
    HeapSnapshot::from_json_reader(BufReader::new(file))
        .with_context(|| format!("failed to load {}", path.display()))
}

fn select_roots(heap: &HeapSnapshot, requested: &[u64]) -> Result<Vec<ObjectId>> {
    if requested.is_empty() {
        if heap.roots().is_empty() {
            anyhow::bail!("no root class loaders: pass --root or list roots in the snapshot");
        }
        return Ok(heap.roots().to_vec());
    }
    requested
        .iter()
        .map(|&id| {
            let id = ObjectId(id);
            if heap.contains(id) {
                Ok(id)
            } else {
                Err(anyhow::anyhow!("root class loader {id} is not in the snapshot"))
            }
        })
        .collect()
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}

/// JSON document written for one resolution.
#[derive(Serialize)]
struct Report<'a> {
    scan_spec: String,
    class_loaders: &'a [ResolvedClassLoader],
    classpath: Vec<ReportEntry>,
    failures: &'a [ContainerFailure],
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,
}

#[derive(Serialize)]
struct ReportEntry {
    location: String,
    class_loader: ObjectId,
    archive: bool,
    /// False for archives whose leaf name the jar criteria exclude.
    in_scope: bool,
}

fn build_report<'a>(
    scan_spec: &ScanSpec,
    resolution: &'a Resolution,
    trace_id: Option<String>,
) -> Report<'a> {
    let classpath = resolution
        .order
        .get_order()
        .into_iter()
        .map(|entry| {
            let archive = is_archive(&entry.location);
            ReportEntry {
                in_scope: !archive || scan_spec.jar_is_in_scope(&entry.location),
                archive,
                location: entry.location,
                class_loader: entry.class_loader,
            }
        })
        .collect();
    Report {
        scan_spec: scan_spec.to_string(),
        class_loaders: &resolution.class_loaders,
        classpath,
        failures: &resolution.failures,
        trace_id,
    }
}
