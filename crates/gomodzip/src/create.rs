use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::path::{check_file_path, check_module_path, check_version};
use crate::Error;

/// Maximum total uncompressed size of the files in a module zip.
pub const MAX_ZIP_FILE: u64 = 500 << 20;
/// Maximum size of the module's `go.mod`.
pub const MAX_GO_MOD: u64 = 16 << 20;
/// Maximum size of the module's `LICENSE`.
pub const MAX_LICENSE: u64 = 16 << 20;

const VCS_DIRS: &[&str] = &[".bzr", ".hg", ".git", ".svn"];

/// The module path and version an archive is built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleVersion {
    pub path: String,
    pub version: String,
}

impl ModuleVersion {
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
        }
    }

    fn prefix(&self) -> String {
        format!("{}@{}/", self.path, self.version)
    }
}

struct SourceFile {
    name: String,
    path: PathBuf,
    size: u64,
}

/// Writes a module zip for `module` containing the files below `dir`.
///
/// Returns the writer once the central directory has been written.
pub fn create_from_dir<W: Write + Seek>(
    out: W,
    module: &ModuleVersion,
    dir: &Path,
) -> Result<W, Error> {
    check_module_path(&module.path)?;
    check_version(&module.version)?;

    let files = collect_files(dir)?;
    check_files(&files)?;

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());
    let prefix = module.prefix();

    let mut zip = ZipWriter::new(out);
    for file in &files {
        zip.start_file(format!("{prefix}{}", file.name), options)?;
        let mut source = File::open(&file.path)?;
        let copied = io::copy(&mut source, &mut zip)?;
        if copied != file.size {
            return Err(Error::FileChanged {
                path: file.name.clone(),
            });
        }
    }

    debug!(module = %module.path, version = %module.version, files = files.len(), "module zip written");
    Ok(zip.finish()?)
}

fn collect_files(dir: &Path) -> Result<Vec<SourceFile>, Error> {
    let mut files = Vec::new();
    let mut walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry?;
        if entry.depth() == 0 {
            continue;
        }

        let name = slash_path(entry.path().strip_prefix(dir).unwrap_or(entry.path()));
        let file_type = entry.file_type();

        if file_type.is_dir() {
            let base = entry.file_name().to_string_lossy();
            if VCS_DIRS.contains(&base.as_ref()) {
                walker.skip_current_dir();
                continue;
            }
            // A go.mod below the root starts another module.
            if entry.path().join("go.mod").is_file() {
                debug!(dir = %name, "skipping nested module");
                walker.skip_current_dir();
            }
            continue;
        }

        if !file_type.is_file() {
            debug!(path = %name, "skipping irregular file");
            continue;
        }
        if is_vendored_package(&name) {
            continue;
        }

        files.push(SourceFile {
            size: entry.metadata()?.len(),
            path: entry.into_path(),
            name,
        });
    }

    Ok(files)
}

fn check_files(files: &[SourceFile]) -> Result<(), Error> {
    let mut folded: HashMap<String, &str> = HashMap::with_capacity(files.len());
    let mut total: u64 = 0;

    for file in files {
        check_file_path(&file.name)?;

        if let Some(first) = folded.insert(file.name.to_lowercase(), &file.name) {
            return Err(Error::CaseCollision {
                first: first.to_string(),
                second: file.name.clone(),
            });
        }

        let limit = match file.name.as_str() {
            "go.mod" => Some(MAX_GO_MOD),
            "LICENSE" => Some(MAX_LICENSE),
            _ => None,
        };
        if let Some(limit) = limit.filter(|limit| file.size > *limit) {
            return Err(Error::FileTooLarge {
                path: file.name.clone(),
                size: file.size,
                limit,
            });
        }

        total = total.saturating_add(file.size);
        if total > MAX_ZIP_FILE {
            return Err(Error::TreeTooLarge {
                limit: MAX_ZIP_FILE,
            });
        }
    }

    Ok(())
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Files in vendored packages are excluded; `vendor/modules.txt` and files
/// in subdirectories named `vendor` elsewhere in the tree are kept.
fn is_vendored_package(name: &str) -> bool {
    let rest = if let Some(rest) = name.strip_prefix("vendor/") {
        rest
    } else if let Some(i) = name.find("/vendor/") {
        &name[i + "/vendor/".len()..]
    } else {
        return false;
    };
    rest.contains('/')
}
