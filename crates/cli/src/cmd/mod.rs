mod build;
mod files;
mod install;
mod list;
mod uninstall;
mod version;

pub use build::cmd_build;
pub use files::cmd_files;
pub use install::cmd_install;
pub use list::cmd_list;
pub use uninstall::cmd_uninstall;
pub use version::cmd_version;
