//! End-to-end tests for the `kiln` binary.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const MANIFEST: &str = r#"
[[variables]]
name = "project_name"
required = true

[[variables]]
name = "port"
type = "int"
default = 8080

[[modules]]
type = "handler"

[[modules.imports]]
file = "src/main.rs"
anchor = "// kiln:modules"
line = "mod {{ module_name }};"
"#;

const README_V1: &str = "# {{ project_name }}\n\nalpha\nbeta\ngamma\n";

struct Sandbox {
    root: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        write(root.path(), "kiln.toml", "[generate]\ninteractive = false\n");
        Self { root }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    fn template(&self) -> PathBuf {
        self.path("templates/svc")
    }

    fn project(&self) -> PathBuf {
        self.path("projects/billing")
    }

    fn write_template(&self, version: &str, readme: &str) {
        let dir = self.template();
        write(
            &dir,
            "template.toml",
            &format!("[template]\nname = \"svc\"\nversion = \"{version}\"\n{MANIFEST}"),
        );
        write(&dir, "template/README.md", readme);
        write(&dir, "template/src/main.rs", "// kiln:modules\nfn main() {}\n");
        write(&dir, "template/PORT", "{{ port }}\n");
        write(
            &dir,
            "modules/handler/src/{{ module_name }}.rs",
            "pub fn {{ module_name | snake }}() {}\n",
        );
    }

    /// `kiln` with an isolated cache, config file and working directory.
    fn kiln(&self) -> Command {
        let mut cmd = Command::cargo_bin("kiln").unwrap();
        cmd.current_dir(self.root.path())
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1")
            .arg("--config")
            .arg(self.path("kiln.toml"))
            .arg("--cache-dir")
            .arg(self.path("cache"));
        cmd
    }

    fn generate(&self) {
        self.kiln()
            .arg("new")
            .arg(self.template())
            .arg(self.project())
            .arg("--no-input")
            .assert()
            .success();
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn read(root: &Path, rel: &str) -> String {
    std::fs::read_to_string(root.join(rel)).unwrap()
}

// ── basics ──────────────────────────────────────────────────────────────

#[test]
fn help_lists_commands() {
    Command::cargo_bin("kiln")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("new"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn version_flag_prints_version() {
    Command::cargo_bin("kiln")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn unknown_subcommand_exits_2() {
    Command::cargo_bin("kiln")
        .unwrap()
        .arg("explode")
        .assert()
        .code(2);
}

// ── new ─────────────────────────────────────────────────────────────────

#[test]
fn new_renders_local_template() {
    let sb = Sandbox::new();
    sb.write_template("1.0.0", README_V1);

    sb.kiln()
        .arg("new")
        .arg(sb.template())
        .arg(sb.project())
        .args(["--no-input", "-d", "port=9000"])
        .assert()
        .success();

    assert!(read(&sb.project(), "README.md").starts_with("# billing\n"));
    assert_eq!(read(&sb.project(), "PORT"), "9000\n");
    assert!(sb.project().join(".kiln-answers.json").is_file());
}

#[test]
fn dry_run_writes_nothing() {
    let sb = Sandbox::new();
    sb.write_template("1.0.0", README_V1);

    sb.kiln()
        .arg("new")
        .arg(sb.template())
        .arg(sb.project())
        .args(["--no-input", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("README.md"));

    assert!(!sb.project().exists());
}

#[test]
fn json_output_describes_generated_files() {
    let sb = Sandbox::new();
    sb.write_template("1.0.0", README_V1);

    let assert = sb
        .kiln()
        .args(["--output-format", "json", "new"])
        .arg(sb.template())
        .arg(sb.project())
        .arg("--no-input")
        .assert()
        .success();

    let doc: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(doc["template"], "svc@1.0.0");
    assert!(
        doc["files"]
            .as_array()
            .unwrap()
            .iter()
            .any(|f| f == "README.md")
    );
}

#[test]
fn unknown_template_exits_3() {
    let sb = Sandbox::new();

    sb.kiln()
        .args(["new", "no-such-template", "out", "--no-input"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn malformed_define_exits_2() {
    let sb = Sandbox::new();
    sb.write_template("1.0.0", README_V1);

    sb.kiln()
        .arg("new")
        .arg(sb.template())
        .arg(sb.project())
        .args(["--no-input", "-d", "port"])
        .assert()
        .code(2);
}

#[test]
fn non_empty_destination_exits_2() {
    let sb = Sandbox::new();
    sb.write_template("1.0.0", README_V1);
    write(&sb.project(), "notes.txt", "mine\n");

    sb.kiln()
        .arg("new")
        .arg(sb.template())
        .arg(sb.project())
        .arg("--no-input")
        .assert()
        .code(2);

    assert_eq!(read(&sb.project(), "notes.txt"), "mine\n");
    assert!(!sb.project().join("README.md").exists());
}

// ── add ─────────────────────────────────────────────────────────────────

#[test]
fn add_creates_module_and_import() {
    let sb = Sandbox::new();
    sb.write_template("1.0.0", README_V1);
    sb.generate();

    sb.kiln()
        .args(["add", "handler", "orders", "--no-input", "-p"])
        .arg(sb.project())
        .assert()
        .success();

    assert_eq!(read(&sb.project(), "src/orders.rs"), "pub fn orders() {}\n");
    assert!(read(&sb.project(), "src/main.rs").contains("mod orders;"));
}

// ── update / check ──────────────────────────────────────────────────────

#[test]
fn update_without_metadata_exits_3() {
    let sb = Sandbox::new();
    write(&sb.project(), "README.md", "hand made\n");

    sb.kiln()
        .args(["update", "--no-input", "-p"])
        .arg(sb.project())
        .assert()
        .code(3);
}

#[test]
fn update_with_nothing_new_is_a_noop() {
    let sb = Sandbox::new();
    sb.write_template("1.0.0", README_V1);
    sb.generate();

    sb.kiln()
        .args(["update", "--no-input", "-p"])
        .arg(sb.project())
        .assert()
        .success()
        .stdout(predicate::str::contains("Already up to date"));
}

#[test]
fn conflicting_update_exits_5_until_resolved() {
    let sb = Sandbox::new();
    sb.write_template("1.0.0", README_V1);
    sb.generate();

    write(&sb.project(), "README.md", "# billing\n\nalpha\nbeta (mine)\ngamma\n");
    sb.write_template("1.1.0", "# {{ project_name }}\n\nalpha\nbeta (v2)\ngamma\n");

    sb.kiln()
        .args(["update", "--no-input", "-p"])
        .arg(sb.project())
        .assert()
        .code(5)
        .stdout(predicate::str::contains("README.md"));
    assert!(read(&sb.project(), "README.md").contains("<<<<<<<"));

    sb.kiln().args(["check", "-p"]).arg(sb.project()).assert().code(5);

    write(&sb.project(), "README.md", "# billing\n\nalpha\nbeta (both)\ngamma\n");
    sb.kiln()
        .args(["check", "-p"])
        .arg(sb.project())
        .assert()
        .success();
}

#[test]
fn clean_update_merges_both_sides() {
    let sb = Sandbox::new();
    sb.write_template("1.0.0", README_V1);
    sb.generate();

    write(&sb.project(), "README.md", "# billing\n\nalpha (mine)\nbeta\ngamma\n");
    sb.write_template("1.1.0", "# {{ project_name }}\n\nalpha\nbeta\ngamma (v2)\n");

    sb.kiln()
        .args(["update", "--no-input", "-p"])
        .arg(sb.project())
        .assert()
        .success();

    assert_eq!(
        read(&sb.project(), "README.md"),
        "# billing\n\nalpha (mine)\nbeta\ngamma (v2)\n"
    );
}

// ── templates / config ──────────────────────────────────────────────────

#[test]
fn templates_list_shows_cached_template() {
    let sb = Sandbox::new();
    sb.write_template("1.0.0", README_V1);
    sb.generate();

    let assert = sb
        .kiln()
        .args(["--output-format", "json", "templates", "list"])
        .assert()
        .success();

    let doc: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    let names: Vec<_> = doc
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(names, ["svc"]);
}

#[test]
fn templates_inspect_reads_local_directory() {
    let sb = Sandbox::new();
    sb.write_template("1.0.0", README_V1);

    sb.kiln()
        .args(["templates", "inspect"])
        .arg(sb.template())
        .assert()
        .success()
        .stdout(predicate::str::contains("svc 1.0.0"))
        .stdout(predicate::str::contains("handler"));
}

#[test]
fn config_path_prints_a_toml_file() {
    let sb = Sandbox::new();

    sb.kiln()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("toml"));
}

#[test]
fn missing_config_file_exits_4() {
    Command::cargo_bin("kiln")
        .unwrap()
        .args(["--config", "/definitely/not/here/kiln.toml", "config", "show"])
        .assert()
        .code(4);
}
