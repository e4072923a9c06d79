use std::path::Path;
use std::process::Command;

fn killer_bin() -> std::path::PathBuf {
    let mut path = std::env::current_exe().unwrap();
    // test binary is in target/debug/deps/, the tool is in target/debug/
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("mutant-killer");
    path
}

fn write_mutation_info(path: &Path, num_mutants: u32) {
    let files: Vec<_> = (0..num_mutants)
        .map(|id| {
            serde_json::json!({
                "filename": format!("pass{}.cc", id),
                "mutationTreeRoot": {
                    "mutationGroups": [{"removeStmt": {"mutationId": id}}],
                    "children": []
                }
            })
        })
        .collect();
    std::fs::write(path, serde_json::json!({"infoForFiles": files}).to_string()).unwrap();
}

#[test]
fn e2e_status_without_run() {
    let dir = tempfile::TempDir::new().unwrap();
    let output = Command::new(killer_bin())
        .args(["status", "--json"])
        .current_dir(dir.path())
        .output()
        .expect("failed to run mutant-killer");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No previous run found"), "stderr: {}", stderr);
}

#[test]
fn e2e_missing_mutation_info() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("cc"), "").unwrap();
    std::fs::create_dir(dir.path().join("csmith")).unwrap();

    let output = Command::new(killer_bin())
        .args(["run", "nonexistent.json", "cc", "csmith"])
        .current_dir(dir.path())
        .output()
        .expect("failed to run mutant-killer");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Mutation info file not found"), "stderr: {}", stderr);
}

#[test]
fn e2e_malformed_mutation_info() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("info.json"), r#"{"infoForFiles": [{"filename": "a.cc"}]}"#)
        .unwrap();
    std::fs::write(dir.path().join("cc"), "").unwrap();
    std::fs::create_dir(dir.path().join("csmith")).unwrap();

    let output = Command::new(killer_bin())
        .args(["run", "info.json", "cc", "csmith"])
        .current_dir(dir.path())
        .output()
        .expect("failed to run mutant-killer");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("malformed mutation description"), "stderr: {}", stderr);
}

#[test]
fn e2e_no_mutants_finishes_immediately() {
    let dir = tempfile::TempDir::new().unwrap();
    write_mutation_info(&dir.path().join("info.json"), 0);
    std::fs::write(dir.path().join("cc"), "").unwrap();
    std::fs::create_dir(dir.path().join("csmith")).unwrap();

    let output = Command::new(killer_bin())
        .args(["run", "info.json", "cc", "csmith", "--output-dir", "out"])
        .current_dir(dir.path())
        .output()
        .expect("failed to run mutant-killer");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("out/.mutant-killer-state.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report["total"], 0);
    assert_eq!(report["programs"], 0);
}

#[cfg(unix)]
#[test]
fn e2e_run_kills_and_reports() {
    use mutant_killer::runner::make_executable;

    const CSMITH: &str = r##"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo 'int main(void) { return 0; }' > "$out"
"##;
    // Mutant 1 breaks compilation, mutant 2 breaks the program; the rest change nothing.
    const COMPILER: &str = r##"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
case ",${DREDD_ENABLED_MUTATION:-}," in
  *,1,*) exit 1 ;;
  *,2,*) printf '#!/bin/sh\nexit 7\n' > "$out" ;;
  *) printf '#!/bin/sh\necho checksum = 42\n' > "$out" ;;
esac
chmod +x "$out"
"##;

    let dir = tempfile::TempDir::new().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("csmith/build/src")).unwrap();
    std::fs::write(root.join("csmith/build/src/csmith"), CSMITH).unwrap();
    make_executable(&root.join("csmith/build/src/csmith")).unwrap();
    std::fs::write(root.join("cc"), COMPILER).unwrap();
    make_executable(&root.join("cc")).unwrap();
    write_mutation_info(&root.join("info.json"), 5);

    let output = Command::new(killer_bin())
        .args([
            "run", "info.json", "cc", "csmith",
            "--work-dir", "work",
            "--output-dir", "out",
            "--seed", "3",
            "--max-programs", "2",
            "--min-timeout-secs", "2",
        ])
        .current_dir(root)
        .output()
        .expect("failed to run mutant-killer");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let status = Command::new(killer_bin())
        .args(["status", "--json", "--output-dir", "out"])
        .current_dir(root)
        .output()
        .expect("failed to run mutant-killer status");
    assert!(status.status.success());
    let report: serde_json::Value =
        serde_json::from_str(String::from_utf8_lossy(&status.stdout).trim()).unwrap();

    assert_eq!(report["total"], 5);
    assert_eq!(report["killed"], 2);
    assert_eq!(report["unkilled"], 3);
    assert_eq!(report["programs"], 2);
    let kills = report["kills"].as_array().unwrap();
    assert_eq!(kills[0]["id"], 1);
    assert_eq!(kills[0]["status"], "COMPILE_FAIL_KILL");
    assert_eq!(kills[1]["id"], 2);
    assert_eq!(kills[1]["status"], "RUN_FAIL_KILL");
}
