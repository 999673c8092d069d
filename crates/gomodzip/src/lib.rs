//! Go module zip archives.
//!
//! A Go module proxy serves `$module/@v/$version.zip` in a fixed layout:
//! every file sits under a `$module@$version/` prefix, version control
//! directories and nested modules are left out, and file names must be
//! portable across the file systems the go command supports.
//!
//! [`create_from_dir`] walks a directory and writes such an archive. The
//! walk is sorted and every entry carries the same timestamp, so the same
//! tree always produces the same bytes.

mod create;
mod error;
mod path;

pub use create::{MAX_GO_MOD, MAX_LICENSE, MAX_ZIP_FILE, ModuleVersion, create_from_dir};
pub use error::Error;
pub use path::{check_file_path, check_module_path, check_version};
