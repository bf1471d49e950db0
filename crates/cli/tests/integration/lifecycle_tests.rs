//! End-to-end build, install and uninstall through the `pkg` binary.

use std::fs;

use predicates::prelude::*;

use super::common::{TestEnv, writing_descriptor};

#[test]
fn build_install_uninstall_demo() {
  let env = TestEnv::new();
  let descriptor = env.write_descriptor("demo", &writing_descriptor("demo", "1.0", &["usr/bin/demo"]));
  let root = env.root_path();

  env
    .cmd()
    .arg("build")
    .arg(&descriptor)
    .assert()
    .success()
    .stdout(predicate::str::contains("Built demo 1.0"));
  assert!(root.join("var/cache/pkg/demo/1.0/pkg.tar.gz").is_file());
  assert!(root.join("var/cache/pkg/demo/1.0/pkg.tar.gz.md5").is_file());

  env
    .cmd()
    .args(["install", "demo"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Installed demo 1.0"));
  assert_eq!(fs::read_to_string(root.join("usr/bin/demo")).unwrap(), "demo\n");

  env
    .cmd()
    .args(["files", "demo"])
    .assert()
    .success()
    .stdout(predicate::str::contains(format!("{}/usr/bin/demo", root.display())));

  env
    .cmd()
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("demo").and(predicate::str::contains("1.0")));

  env
    .cmd()
    .args(["uninstall", "demo"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Uninstalled demo"));
  assert!(!root.join("usr/bin/demo").exists());
  assert!(!root.join("var/lib/pkg/demo/files").exists());
}

#[test]
fn rebuild_reports_cached() {
  let env = TestEnv::new();
  let descriptor = env.write_descriptor("demo", &writing_descriptor("demo", "1.0", &["x"]));

  env.cmd().arg("build").arg(&descriptor).assert().success();
  env
    .cmd()
    .arg("build")
    .arg(&descriptor)
    .assert()
    .success()
    .stdout(predicate::str::contains("already built"));
}

#[test]
fn root_flag_overrides_environment() {
  let env = TestEnv::new();
  let descriptor = env.write_descriptor("demo", &writing_descriptor("demo", "1.0", &["x"]));
  let other = env.temp.path().join("other-root");

  env
    .cmd()
    .arg("--root")
    .arg(&other)
    .arg("build")
    .arg(&descriptor)
    .assert()
    .success();

  assert!(other.join("var/cache/pkg/demo/1.0/pkg.tar.gz").is_file());
  assert!(!env.root_path().join("var").exists());
}

#[test]
fn relative_root_is_recorded_absolutely() {
  let env = TestEnv::new();
  let content = r#"return {
  name = "demo",
  version = "1.0",
  build = function(ctx)
    ctx:sh([[mkdir -p "$DESTDIR/usr/bin" && echo demo > "$DESTDIR/usr/bin/demo"]])
  end,
  post_install = function(ctx)
    ctx:sh([[echo hook > "$PKG_ROOT/hooked"]])
  end,
}
"#;
  let descriptor = env.write_descriptor("demo", content);
  let root = env.root_path();
  let base = root.parent().unwrap().to_path_buf();
  let elsewhere = base.join("elsewhere");
  fs::create_dir_all(&elsewhere).unwrap();

  for args in [vec!["build", descriptor.to_str().unwrap()], vec!["install", "demo"]] {
    env
      .cmd()
      .current_dir(&base)
      .args(["--root", "root"])
      .args(&args)
      .assert()
      .success();
  }

  let ledger = fs::read_to_string(root.join("var/lib/pkg/demo/files")).unwrap();
  assert!(ledger.lines().all(|line| line.starts_with(&format!("{}/", root.display()))));
  assert_eq!(fs::read_to_string(root.join("hooked")).unwrap(), "hook\n");

  env
    .cmd()
    .current_dir(&elsewhere)
    .arg("--root")
    .arg(&root)
    .args(["uninstall", "demo"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Uninstalled demo"));
  assert!(!root.join("usr/bin/demo").exists());
  assert!(!root.join("var/lib/pkg/demo/files").exists());
}

#[test]
fn first_failure_stops_remaining_packages() {
  let env = TestEnv::new();
  let broken = env.write_descriptor("broken", "return { name = \"broken\", version = \"1\" }");
  let good = env.write_descriptor("good", &writing_descriptor("good", "1", &["g"]));

  env
    .cmd()
    .arg("build")
    .arg(&broken)
    .arg(&good)
    .assert()
    .code(1)
    .stderr(predicate::str::contains("missing required field 'build'"));

  assert!(!env.root_path().join("var/cache/pkg/good").exists());
}

#[test]
fn failing_callback_reports_its_log() {
  let env = TestEnv::new();
  let descriptor = env.write_descriptor(
    "demo",
    r#"return {
  name = "demo",
  version = "1.0",
  build = function(ctx)
    ctx:sh("echo compiler exploded && exit 2")
  end,
}
"#,
  );

  env
    .cmd()
    .arg("build")
    .arg(&descriptor)
    .assert()
    .code(1)
    .stderr(predicate::str::contains("build callback failed"))
    .stderr(predicate::str::contains(".log"));

  let logs: Vec<_> = fs::read_dir(env.scratch_path())
    .unwrap()
    .flatten()
    .filter(|e| e.file_name().to_string_lossy().ends_with(".log"))
    .collect();
  assert_eq!(logs.len(), 1);
  assert!(fs::read_to_string(logs[0].path()).unwrap().contains("compiler exploded"));
}

#[test]
fn flags_reach_build_callbacks() {
  let env = TestEnv::new();
  let descriptor = env.write_descriptor(
    "flags",
    r#"return {
  name = "flags",
  version = "1",
  build = function(ctx)
    ctx:sh([[printf '%s %s' "$NOTEST" "$JOBS" > "$DESTDIR/flags"]])
  end,
}
"#,
  );

  env
    .cmd()
    .env("PKG_NOTEST", "1")
    .args(["--jobs", "3", "build"])
    .arg(&descriptor)
    .assert()
    .success();
  env.cmd().args(["install", "flags"]).assert().success();

  assert_eq!(fs::read_to_string(env.root_path().join("flags")).unwrap(), "1 3");
}

#[test]
fn json_output_describes_outcomes() {
  let env = TestEnv::new();
  let descriptor = env.write_descriptor("demo", &writing_descriptor("demo", "1.0", &["x"]));

  env
    .cmd()
    .args(["-o", "json", "build"])
    .arg(&descriptor)
    .assert()
    .success()
    .stdout(predicate::str::contains("\"status\": \"built\""));

  env
    .cmd()
    .args(["version", "demo", "-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"demo\": \"1.0\""));
}
