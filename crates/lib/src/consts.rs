/// Application name used for state directories under the target root.
pub const APP_NAME: &str = "pkg";

/// File extension of package descriptors.
pub const DESCRIPTOR_EXT: &str = "pkg";

/// Archive format name and the extension of build archives.
pub const ARCHIVE_EXT: &str = "tar.gz";

/// Base file name of build archives inside a version directory.
pub const ARCHIVE_NAME: &str = "pkg.tar.gz";

/// Extension appended to an archive name for its checksum sidecar.
pub const CHECKSUM_EXT: &str = "md5";

/// Ledger file name inside a package's data directory.
pub const LEDGER_NAME: &str = "files";

/// Name of the per-version source snapshot directory inside the cache.
pub const SNAPSHOT_DIR: &str = "src";

/// Checksum entry that marks a source as unchecked.
pub const CHECKSUM_SKIP: &str = "SKIP";

/// Install prefix exposed to build callbacks.
pub const PREFIX: &str = "/usr";

/// Executable install path exposed to build callbacks.
pub const BINDIR: &str = "/usr/bin";

/// Library install path exposed to build callbacks.
pub const LIBDIR: &str = "/usr/lib";
