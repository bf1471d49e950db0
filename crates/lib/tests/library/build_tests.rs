//! Build lifecycle: caching, checksums, source preparation and callback failures.

use std::fs;

use pkg_lib::archive::{ArchiveCodec, TarGz};
use pkg_lib::engine::{BuildStage, BuildStatus, EngineError, ErrorKind};
use pkg_lib::util::hash::{SidecarCheck, hash_bytes, verify_sidecar};

use super::common::{FakeDownloader, TestRoot, with_build, writing_descriptor};

#[test]
fn build_archives_exactly_the_destdir_contents() {
  let env = TestRoot::new();
  let path = env.descriptor("demo", &writing_descriptor("demo", "1.0", &["X"]));

  let outcome = env.engine().build(&path).unwrap();

  assert_eq!(outcome.status, BuildStatus::Built);
  assert_eq!(
    outcome.stages,
    vec![
      BuildStage::Loaded,
      BuildStage::Sourced,
      BuildStage::Built,
      BuildStage::Archived,
      BuildStage::Stored
    ]
  );
  assert_eq!(TarGz.list_members(&outcome.archive, "/").unwrap(), vec!["/X"]);
  assert_eq!(verify_sidecar(&outcome.archive).unwrap(), SidecarCheck::Valid);

  let root = env.root();
  assert!(root.join("var/lib/pkg/demo/1.0/demo.pkg").is_file());
  assert_eq!(
    fs::read_link(root.join("var/lib/pkg/demo/demo.pkg")).unwrap(),
    std::path::PathBuf::from("1.0/demo.pkg")
  );
  assert!(!root.join("X").exists(), "build must not touch the target root");
  assert!(env.scratch_dirs().is_empty(), "scratch directories are removed");
}

#[test]
fn second_build_only_relinks() {
  let env = TestRoot::new();
  let counter = env.temp.path().join("build-count");
  let cmd = format!("echo run >> {} && echo hi > \"$DESTDIR/x\"", counter.display());
  let path = env.descriptor("demo", &with_build("demo", "1.0", &cmd, ""));
  let engine = env.engine();

  let first = engine.build(&path).unwrap();
  let bytes = fs::read(&first.archive).unwrap();
  let second = engine.build(&path).unwrap();

  assert_eq!(first.status, BuildStatus::Built);
  assert_eq!(second.status, BuildStatus::Cached);
  assert_eq!(second.stages, vec![BuildStage::Loaded]);
  assert_eq!(fs::read_to_string(&counter).unwrap(), "run\n");
  assert_eq!(fs::read(&second.archive).unwrap(), bytes);
}

#[test]
fn checksum_mismatch_aborts_before_build() {
  let env = TestRoot::new();
  let marker = env.temp.path().join("built");
  let expected = hash_bytes(b"the real tarball").0;
  let extra = format!(
    "sources = {{ \"https://example.org/src.tar.gz\" }},\n  checksums = {{ \"{}\" }},",
    expected
  );
  let path = env.descriptor(
    "demo",
    &with_build("demo", "1.0", &format!("touch {}", marker.display()), &extra),
  );
  let engine = env.engine_with(FakeDownloader::default().serve("https://example.org/src.tar.gz", "tampered"));

  let err = engine.build(&path).unwrap_err();

  assert_eq!(err.kind(), ErrorKind::Integrity);
  assert!(matches!(err, EngineError::Integrity { ref expected, .. } if expected.as_str() == hash_bytes(b"the real tarball").0));
  assert!(!marker.exists(), "build callback must not run");
  assert!(!engine.cache().archive_path("demo", "1.0").exists());
  assert!(engine.cache().current_version("demo").unwrap().is_none());
}

#[test]
fn verified_sources_are_not_fetched_again() {
  let env = TestRoot::new();
  let body = "plain source";
  let extra = format!(
    "sources = {{ \"https://example.org/notes.txt\" }},\n  checksums = {{ \"{}\" }},",
    hash_bytes(body.as_bytes())
  );
  let path = env.descriptor(
    "demo",
    &with_build("demo", "1.0", "cp \"$SRCDIR/notes.txt\" \"$DESTDIR/notes.txt\"", &extra),
  );
  let downloader = FakeDownloader::default().serve("https://example.org/notes.txt", body);
  let calls = downloader.calls.clone();
  let engine = env.engine_with(downloader);

  engine.build(&path).unwrap();
  engine.cache().heal("demo", "1.0").unwrap();
  let rebuilt = engine.build(&path).unwrap();

  assert_eq!(rebuilt.status, BuildStatus::Built);
  assert_eq!(calls.get(), 1);
}

#[test]
fn stale_cached_source_is_fetched_again() {
  let env = TestRoot::new();
  let body = "fresh source";
  let extra = format!(
    "sources = {{ \"https://example.org/notes.txt\" }},\n  checksums = {{ \"{}\" }},",
    hash_bytes(body.as_bytes())
  );
  let path = env.descriptor(
    "demo",
    &with_build("demo", "1.0", "cp \"$SRCDIR/notes.txt\" \"$DESTDIR/notes.txt\"", &extra),
  );
  let downloader = FakeDownloader::default().serve("https://example.org/notes.txt", body);
  let calls = downloader.calls.clone();
  let engine = env.engine_with(downloader);
  let snapshot = engine.cache().snapshot("demo", "1.0").unwrap();
  fs::write(snapshot.join("notes.txt"), "stale source").unwrap();

  let outcome = engine.build(&path).unwrap();

  assert_eq!(outcome.status, BuildStatus::Built);
  assert_eq!(calls.get(), 1);
  assert_eq!(fs::read_to_string(snapshot.join("notes.txt")).unwrap(), body);
}

#[test]
fn unchecked_sources_are_fetched_every_build() {
  let env = TestRoot::new();
  let extra = "sources = { \"https://example.org/notes.txt\" },\n  checksums = { \"SKIP\" },";
  let path = env.descriptor("demo", &with_build("demo", "1.0", "true", extra));
  let downloader = FakeDownloader::default().serve("https://example.org/notes.txt", "notes");
  let calls = downloader.calls.clone();
  let engine = env.engine_with(downloader);

  engine.build(&path).unwrap();
  engine.cache().heal("demo", "1.0").unwrap();
  engine.build(&path).unwrap();

  assert_eq!(calls.get(), 2);
}

#[test]
fn tarball_with_destination_is_extracted_and_stripped() {
  let env = TestRoot::new();
  let tree = env.temp.path().join("upstream");
  fs::create_dir_all(tree.join("demo-1.0")).unwrap();
  fs::write(tree.join("demo-1.0/hello.txt"), "hello").unwrap();
  let tarball = env.temp.path().join("demo-1.0.tar.gz");
  TarGz.pack(&tree, &tarball).unwrap();

  let extra = "sources = { \"https://example.org/demo-1.0.tar.gz::demo\" },";
  let cmd = "mkdir -p \"$DESTDIR/usr/share\" && cp \"$SRCDIR/demo/hello.txt\" \"$DESTDIR/usr/share/hello.txt\"";
  let path = env.descriptor("demo", &with_build("demo", "1.0", cmd, extra));
  let engine = env.engine_with(
    FakeDownloader::default().serve("https://example.org/demo-1.0.tar.gz", fs::read(&tarball).unwrap()),
  );

  let outcome = engine.build(&path).unwrap();

  assert_eq!(
    TarGz.list_members(&outcome.archive, "/").unwrap(),
    vec!["/usr/", "/usr/share/", "/usr/share/hello.txt"]
  );
}

#[test]
fn relative_local_sources_come_from_the_descriptor_directory() {
  let env = TestRoot::new();
  fs::write(env.descriptors().join("fix.patch"), "patch").unwrap();
  let extra = "sources = { \"fix.patch\" },";
  let path = env.descriptor(
    "demo",
    &with_build("demo", "1.0", "cp \"$SRCDIR/fix.patch\" \"$DESTDIR/fix.patch\"", extra),
  );

  let outcome = env.engine().build(&path).unwrap();

  assert_eq!(TarGz.list_members(&outcome.archive, "/").unwrap(), vec!["/fix.patch"]);
  assert!(env.root().join("var/cache/pkg/demo/1.0/src/fix.patch").is_file());
}

#[test]
fn prepare_runs_in_the_source_directory_before_build() {
  let env = TestRoot::new();
  let content = r#"return {
  name = "demo",
  version = "1.0",
  prepare = function(ctx)
    ctx:sh([[test "$(pwd)" = "$SRCDIR" && echo prepared > configured]])
  end,
  build = function(ctx)
    ctx:sh([[test "$(pwd)" = "$DESTDIR" && cp "$SRCDIR/configured" "$DESTDIR/configured"]])
  end,
}
"#;
  let path = env.descriptor("demo", content);

  let outcome = env.engine().build(&path).unwrap();

  assert_eq!(TarGz.list_members(&outcome.archive, "/").unwrap(), vec!["/configured"]);
}

#[test]
fn failing_build_keeps_its_log_and_writes_no_archive() {
  let env = TestRoot::new();
  let path = env.descriptor("demo", &with_build("demo", "1.0", "echo compiling && exit 3", ""));
  let engine = env.engine();

  let err = engine.build(&path).unwrap_err();

  assert_eq!(err.kind(), ErrorKind::Callback);
  let EngineError::Callback(callback) = err else {
    panic!("expected callback error");
  };
  let log = fs::read_to_string(&callback.log).unwrap();
  assert!(log.contains("compiling"));
  assert!(!engine.cache().archive_path("demo", "1.0").exists());
  assert!(env.scratch_dirs().is_empty());
}

#[test]
fn invalid_descriptor_mutates_nothing() {
  let env = TestRoot::new();
  let path = env.descriptor("demo", "return { name = \"demo\", version = \"1.0\" }");

  let err = env.engine().build(&path).unwrap_err();

  assert_eq!(err.kind(), ErrorKind::Validation);
  assert!(!env.root().join("var").exists());
}

#[test]
fn unknown_scheme_is_a_fetch_error() {
  let env = TestRoot::new();
  let extra = "sources = { \"svn://example.org/repo\" },";
  let path = env.descriptor("demo", &with_build("demo", "1.0", "true", extra));

  let err = env.engine().build(&path).unwrap_err();

  assert_eq!(err.kind(), ErrorKind::Fetch);
  assert!(err.to_string().contains("svn://example.org/repo"));
}

#[test]
fn build_environment_carries_flags() {
  let env = TestRoot::new();
  let cmd = "printf '%s %s %s' \"$NOTEST\" \"$MAKEFLAGS\" \"$BINDIR\" > \"$DESTDIR/env\"";
  let path = env.descriptor("demo", &with_build("demo", "1.0", cmd, ""));
  let engine = pkg_lib::engine::Engine::new(env.config().with_disable_tests(true).with_jobs(Some(2)));

  let outcome = engine.build(&path).unwrap();
  let unpacked = env.temp.path().join("unpacked");
  TarGz.unpack(&outcome.archive, &unpacked).unwrap();

  assert_eq!(fs::read_to_string(unpacked.join("env")).unwrap(), "1 -j2 /usr/bin");
}
