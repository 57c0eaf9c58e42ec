//! CLI smoke tests for docmatrix.
//!
//! These tests run the binary against small source trees in temporary
//! directories. Tool-dependent paths run with an empty `PATH` so results do
//! not depend on what is installed on the machine.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the docmatrix binary.
fn docmatrix_cmd() -> Command {
  cargo_bin_cmd!("docmatrix")
}

fn write_file(path: &Path, content: &str) {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(path, content).unwrap();
}

/// A project with `build.yaml` and one source subtree per language.
struct Project {
  temp: TempDir,
  empty_path: PathBuf,
}

impl Project {
  fn new(languages: &[&str], formats: &str) -> Self {
    let temp = TempDir::new().unwrap();
    for lang in languages {
      let dir = temp.path().join("template").join(lang);
      write_file(&dir.join("template.adoc"), "= Template\n\nHello.\n");
      write_file(
        &dir.join("version.properties"),
        &format!("revnumber=9.0-{}\nrevdate=July 2025\n", lang),
      );
    }
    let config = format!(
      "languages: [{}]\nflavors: [plain]\nsource:\n  root: template\nformats:\n{}\nbuild:\n  output_dir: out/build\n  dist_dir: out/dist\n",
      languages.join(", "),
      formats
    );
    write_file(&temp.path().join("build.yaml"), &config);
    let empty_path = temp.path().join("no-tools");
    std::fs::create_dir_all(&empty_path).unwrap();
    Self { temp, empty_path }
  }

  fn path(&self, relative: &str) -> PathBuf {
    self.temp.path().join(relative)
  }

  /// Command running in the project directory with no external tools on `PATH`.
  fn cmd(&self) -> Command {
    let mut cmd = docmatrix_cmd();
    cmd
      .current_dir(self.temp.path())
      .env("PATH", &self.empty_path)
      .env_remove("RUST_LOG");
    cmd
  }
}

const NO_FORMATS: &str = "  html: { enabled: false }";
const HTML: &str = "  html: { enabled: true }";

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  docmatrix_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  docmatrix_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("docmatrix"));
}

#[test]
fn subcommand_help_works() {
  for cmd in &["build", "validate", "formats", "package", "test-artifacts"] {
    docmatrix_cmd()
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

// =============================================================================
// formats
// =============================================================================

#[test]
fn formats_lists_builtin_converters() {
  docmatrix_cmd()
    .arg("formats")
    .assert()
    .success()
    .stdout(predicate::str::contains("html"))
    .stdout(predicate::str::contains("github_markdown_mp"))
    .stdout(predicate::str::contains("textile"));
}

#[test]
fn formats_json_is_priority_ordered() {
  let out = docmatrix_cmd().args(["--json", "formats"]).output().unwrap();
  assert!(out.status.success());

  let formats: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
  let formats = formats.as_array().unwrap();
  assert_eq!(formats.len(), 10);
  let priorities: Vec<i64> = formats.iter().map(|f| f["priority"].as_i64().unwrap()).collect();
  let mut sorted = priorities.clone();
  sorted.sort();
  assert_eq!(priorities, sorted);
  assert_eq!(formats.last().unwrap()["id"], "textile");
}

// =============================================================================
// Configuration errors
// =============================================================================

#[test]
fn missing_config_exits_with_config_code() {
  let temp = TempDir::new().unwrap();

  docmatrix_cmd()
    .current_dir(temp.path())
    .arg("validate")
    .assert()
    .code(2)
    .stderr(predicate::str::contains("build.yaml"));
}

#[test]
fn unknown_format_override_exits_with_config_code() {
  let project = Project::new(&["EN"], HTML);

  project
    .cmd()
    .args(["build", "--format", "epub"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("epub"));
}

#[test]
fn malformed_env_override_exits_with_config_code() {
  let project = Project::new(&["EN"], HTML);

  project
    .cmd()
    .env("DOCMATRIX_MAX_WORKERS", "many")
    .arg("build")
    .assert()
    .code(2)
    .stderr(predicate::str::contains("DOCMATRIX_MAX_WORKERS"));
}

// =============================================================================
// validate
// =============================================================================

#[test]
fn validate_passes_on_clean_tree() {
  let project = Project::new(&["EN", "DE"], NO_FORMATS);

  project
    .cmd()
    .arg("validate")
    .assert()
    .success()
    .stdout(predicate::str::contains("Validation passed"));
}

#[test]
fn validate_reports_missing_metadata() {
  let project = Project::new(&["EN", "DE"], HTML);
  write_file(&project.path("template/DE/version.properties"), "revremark=draft\n");

  project
    .cmd()
    .arg("validate")
    .assert()
    .code(3)
    .stderr(predicate::str::contains("revnumber"))
    .stdout(predicate::str::contains("failing languages: DE"));
}

// =============================================================================
// build
// =============================================================================

#[test]
fn build_with_no_formats_succeeds() {
  let project = Project::new(&["EN", "DE"], NO_FORMATS);

  project
    .cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("0 succeeded, 0 failed"));
}

#[test]
fn build_validation_failure_dispatches_nothing() {
  let project = Project::new(&["EN"], HTML);
  std::fs::remove_file(project.path("template/EN/version.properties")).unwrap();

  // Diagnostics are printed by the command itself, not only logged.
  project
    .cmd()
    .env("RUST_LOG", "off")
    .arg("build")
    .assert()
    .code(3)
    .stderr(predicate::str::contains("[metadata] EN"))
    .stderr(predicate::str::contains("version metadata file is missing"))
    .stdout(predicate::str::contains("failing languages: EN"));

  assert!(!project.path("out/build").exists());
}

#[test]
fn build_json_validation_failure_lists_diagnostics() {
  let project = Project::new(&["EN"], HTML);
  std::fs::remove_file(project.path("template/EN/version.properties")).unwrap();

  let out = project
    .cmd()
    .env("RUST_LOG", "off")
    .args(["--json", "build"])
    .output()
    .unwrap();
  assert_eq!(out.status.code(), Some(3));

  let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
  assert_eq!(json["passed"], false);
  let errors = json["errors"].as_array().unwrap();
  assert!(
    errors
      .iter()
      .any(|e| e["message"] == "version metadata file is missing" && e["language"] == "EN")
  );
}

#[test]
fn build_reports_missing_tools_per_task() {
  let project = Project::new(&["EN", "DE"], HTML);

  project
    .cmd()
    .arg("build")
    .assert()
    .code(4)
    .stdout(predicate::str::contains("0 succeeded, 2 failed"))
    .stderr(predicate::str::contains("EN/plain/html [dependency]"))
    .stderr(predicate::str::contains("DE/plain/html [dependency]"));
}

#[test]
fn build_json_lists_every_result() {
  let project = Project::new(&["EN", "DE"], HTML);

  let out = project.cmd().args(["--json", "build", "--lang", "DE"]).output().unwrap();
  assert_eq!(out.status.code(), Some(4));

  let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
  assert_eq!(json["succeeded"], 0);
  assert_eq!(json["failed"], 1);
  assert_eq!(json["results"][0]["status"], "failed");
  assert_eq!(json["results"][0]["kind"], "dependency");
  assert_eq!(json["results"][0]["task"]["language"], "DE");
}

// =============================================================================
// test-artifacts
// =============================================================================

#[test]
fn test_artifacts_passes_on_clean_tree() {
  let project = Project::new(&["EN"], HTML);
  let html = project.path("out/build/EN/plain/html");
  write_file(&html.join("images/logo.png"), "png");
  write_file(&html.join("template-EN-plain.html"), r#"<img src="images/logo.png">"#);

  project
    .cmd()
    .arg("test-artifacts")
    .assert()
    .success()
    .stdout(predicate::str::contains("validated with 0 warning(s)"));
}

#[test]
fn test_artifacts_reports_broken_images() {
  let project = Project::new(&["EN"], HTML);
  write_file(
    &project.path("out/build/EN/plain/html/template-EN-plain.html"),
    r#"<img src="/abs/logo.png"><img src="images/gone.png">"#,
  );

  project
    .cmd()
    .env("RUST_LOG", "off")
    .arg("test-artifacts")
    .assert()
    .code(3)
    .stderr(predicate::str::contains("[artifact] EN"))
    .stderr(predicate::str::contains("image uses absolute path `/abs/logo.png`"))
    .stderr(predicate::str::contains("missing image `images/gone.png`"));
}

#[test]
fn test_artifacts_json_flags_corrupt_docx() {
  let project = Project::new(&["EN"], HTML);
  write_file(&project.path("out/build/EN/plain/docx/template-EN-plain.docx"), "garbage");

  let out = project.cmd().args(["--json", "test-artifacts"]).output().unwrap();
  assert_eq!(out.status.code(), Some(3));

  let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
  assert_eq!(json["passed"], false);
  assert_eq!(json["errors"][0]["check"], "artifact");
}

#[test]
fn test_artifacts_without_build_tree_fails() {
  let project = Project::new(&["EN"], HTML);

  project
    .cmd()
    .arg("test-artifacts")
    .assert()
    .failure()
    .stderr(predicate::str::contains("does not exist"));
}

// =============================================================================
// package
// =============================================================================

#[test]
fn package_archives_existing_build_tree() {
  let project = Project::new(&["EN"], HTML);
  write_file(
    &project.path("out/build/EN/plain/html/template-EN-plain.html"),
    "<html></html>",
  );

  project
    .cmd()
    .arg("package")
    .assert()
    .success()
    .stdout(predicate::str::contains("Packaged 1 archive(s)"));

  assert!(
    project
      .path("out/dist/EN/plain/html/template-EN-plain-html.zip")
      .is_file()
  );
}

#[test]
fn package_honors_dist_dir_override() {
  let project = Project::new(&["EN"], HTML);
  write_file(
    &project.path("out/build/EN/plain/html/template-EN-plain.html"),
    "<html></html>",
  );
  let dist = project.path("elsewhere");

  project
    .cmd()
    .arg("package")
    .arg("--dist-dir")
    .arg(&dist)
    .assert()
    .success();

  assert!(dist.join("EN/plain/html/template-EN-plain-html.zip").is_file());
}
