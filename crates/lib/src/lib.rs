//! pkg-lib: core of a minimal source-based package manager.
//!
//! - `descriptor`: Lua package descriptors and their lifecycle callbacks
//! - `fetch`: source locators and the transports that resolve them
//! - `archive`: the build archive codec and source tarball extraction
//! - `cache`: per-version source snapshots, build archives and current pointers
//! - `ledger`: per-package records of installed paths
//! - `engine`: build, install and uninstall orchestration

pub mod archive;
pub mod cache;
pub mod config;
pub mod consts;
pub mod descriptor;
pub mod engine;
pub mod fetch;
pub mod ledger;
pub mod util;
