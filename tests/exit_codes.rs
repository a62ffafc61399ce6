use std::process::Command;

fn classpath_scope() -> String {
    std::env::var("CARGO_BIN_EXE_classpath-scope").unwrap_or_else(|_| {
        let mut path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        path.push("target");
        path.push("debug");
        path.push("classpath-scope");
        if cfg!(windows) {
            path.set_extension("exe");
        }
        path.to_string_lossy().to_string()
    })
}

#[test]
fn classpath_scope_exits_non_zero_on_missing_snapshot() {
    let output = Command::new(classpath_scope())
        .arg("--snapshot")
        .arg("missing.json")
        .output()
        .expect("run classpath-scope");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("snapshot not found"));
}

#[test]
fn classpath_scope_exits_non_zero_on_wildcard_misuse() {
    let output = Command::new(classpath_scope())
        .arg("--snapshot")
        .arg("missing.json")
        .arg("--whitelist-jar")
        .arg("lib/*.jar")
        .output()
        .expect("run classpath-scope");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--whitelist-jar"));
}
