//! Uninstall lifecycle: ownership-safe removal and hooks.

use std::fs;

use pkg_lib::engine::{RemovalStats, UninstallOutcome, UninstallStage};

use super::common::{TestRoot, write_commands, writing_descriptor};

#[test]
fn uninstalling_a_missing_package_is_not_an_error() {
  let env = TestRoot::new();

  let outcome = env.engine().uninstall("ghost").unwrap();

  assert!(matches!(outcome, UninstallOutcome::NotInstalled { ref name } if name == "ghost"));
}

#[test]
fn shared_directories_are_kept() {
  let env = TestRoot::new();
  let path = env.descriptor(
    "demo",
    &writing_descriptor("demo", "1.0", &["usr/share/demo/readme", "usr/bin/demo"]),
  );
  let engine = env.engine();
  engine.build(&path).unwrap();
  engine.install("demo").unwrap();
  fs::write(env.root().join("usr/share/foreign.txt"), "not ours").unwrap();

  let outcome = engine.uninstall("demo").unwrap();

  let UninstallOutcome::Removed { stats, stages, .. } = outcome else {
    panic!("expected removal");
  };
  assert_eq!(
    stats,
    RemovalStats {
      files_removed: 2,
      dirs_removed: 2,
      dirs_kept: 2
    }
  );
  assert_eq!(stages.last(), Some(&UninstallStage::PostUninstalled));
  assert!(!env.root().join("usr/share/demo").exists());
  assert!(!env.root().join("usr/bin").exists());
  assert_eq!(fs::read_to_string(env.root().join("usr/share/foreign.txt")).unwrap(), "not ours");
}

#[test]
#[cfg(unix)]
fn symlinked_directories_are_not_removed() {
  let env = TestRoot::new();
  let path = env.descriptor("demo", &writing_descriptor("demo", "1.0", &["lib/demo.so"]));
  let engine = env.engine();
  engine.build(&path).unwrap();

  let real = env.root().join("usr/lib");
  fs::create_dir_all(&real).unwrap();
  std::os::unix::fs::symlink("usr/lib", env.root().join("lib")).unwrap();

  engine.install("demo").unwrap();
  assert!(real.join("demo.so").exists());

  engine.uninstall("demo").unwrap();

  assert!(fs::symlink_metadata(env.root().join("lib")).unwrap().file_type().is_symlink());
  assert!(real.is_dir());
  assert!(!real.join("demo.so").exists());
}

#[test]
fn files_already_gone_are_tolerated() {
  let env = TestRoot::new();
  let path = env.descriptor("demo", &writing_descriptor("demo", "1.0", &["a", "b"]));
  let engine = env.engine();
  engine.build(&path).unwrap();
  engine.install("demo").unwrap();
  fs::remove_file(env.root().join("a")).unwrap();

  let outcome = engine.uninstall("demo").unwrap();

  assert!(matches!(outcome, UninstallOutcome::Removed { ref stats, .. } if stats.files_removed == 1));
  assert!(!env.root().join("b").exists());
  assert!(!engine.ledgers().is_installed("demo"));
}

#[test]
fn uninstall_hooks_bracket_removal() {
  let env = TestRoot::new();
  let content = format!(
    r#"return {{
  name = "demo",
  version = "1.0",
  build = function(ctx)
    ctx:sh([[{}]])
  end,
  pre_uninstall = function(ctx)
    ctx:sh([[test -e X && touch pre-uninstall-ran]])
  end,
  post_uninstall = function(ctx)
    ctx:sh([[test ! -e X && test ! -e "$PKG_ROOT/var/lib/pkg/demo/files" && touch post-uninstall-ran]])
  end,
}}
"#,
    write_commands("demo", &["X"])
  );
  let path = env.descriptor("demo", &content);
  let engine = env.engine();
  engine.build(&path).unwrap();
  engine.install("demo").unwrap();

  engine.uninstall("demo").unwrap();

  assert!(env.root().join("pre-uninstall-ran").exists());
  assert!(env.root().join("post-uninstall-ran").exists());
}

#[test]
fn failing_pre_uninstall_leaves_files_in_place() {
  let env = TestRoot::new();
  let extra = r#"pre_uninstall = function(ctx)
    ctx:sh("exit 1")
  end,"#;
  let path = env.descriptor(
    "demo",
    &super::common::with_build("demo", "1.0", &write_commands("demo", &["X"]), extra),
  );
  let engine = env.engine();
  engine.build(&path).unwrap();
  engine.install("demo").unwrap();

  assert!(engine.uninstall("demo").is_err());

  assert!(env.root().join("X").exists());
  assert!(engine.ledgers().is_installed("demo"));
}
