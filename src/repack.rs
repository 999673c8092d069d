//! Turns a verified npm tarball into a Go module zip.
//!
//! Each archive request gets its own [`Staging`] directory holding the
//! tarball, the unpacked tree and the finished zip. The directory is removed
//! when the [`ArchiveHandle`] that owns it is dropped, which for a streamed
//! response is after the last byte has been sent.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tempfile::TempDir;
use tokio::task;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::module::ModuleIdentity;
use crate::registry::PackageVersion;
use crate::tarball::TarballFetcher;

const TARBALL: &str = "package.tgz";
const SOURCE: &str = "source";
const ARCHIVE: &str = "module.zip";

/// Builds a module archive from an unpacked source tree.
pub trait ArchiveBuilder: Send + Sync {
    fn build(&self, identity: &ModuleIdentity, source: &Path, out: &mut File) -> Result<()>;
}

/// The Go module zip format.
#[derive(Debug, Default, Clone, Copy)]
pub struct GoModuleZip;

impl ArchiveBuilder for GoModuleZip {
    fn build(&self, identity: &ModuleIdentity, source: &Path, out: &mut File) -> Result<()> {
        gomodzip::create_from_dir(out, &identity.module_version(), source)?;
        Ok(())
    }
}

/// A per-request scratch directory.
#[derive(Debug)]
pub struct Staging {
    dir: TempDir,
}

impl Staging {
    /// Creates a staging directory under `root`, or the system temporary
    /// directory when `root` is `None`.
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("npmgoproxy-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|err| Error::io("creating staging directory", err))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn tarball_path(&self) -> PathBuf {
        self.dir.path().join(TARBALL)
    }

    pub fn source_dir(&self) -> PathBuf {
        self.dir.path().join(SOURCE)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.dir.path().join(ARCHIVE)
    }
}

/// A finished archive, open for reading from the start.
#[derive(Debug)]
pub struct ArchiveHandle {
    pub file: File,
    pub len: u64,
    pub identity: ModuleIdentity,
    pub staging: Staging,
}

#[derive(Clone)]
pub struct ArchiveRepacker {
    base_path: String,
    builder: Arc<dyn ArchiveBuilder>,
}

impl ArchiveRepacker {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self::with_builder(base_path, Arc::new(GoModuleZip))
    }

    pub fn with_builder(base_path: impl Into<String>, builder: Arc<dyn ArchiveBuilder>) -> Self {
        Self {
            base_path: base_path.into(),
            builder,
        }
    }

    pub fn identity(&self, version: &PackageVersion) -> ModuleIdentity {
        ModuleIdentity::new(&self.base_path, &version.name, &version.version)
    }

    /// Unpacks the staged tarball and writes the module archive.
    ///
    /// Blocking; callers on the runtime go through [`ArchivePipeline`].
    pub fn repack(&self, staging: Staging, version: &PackageVersion) -> Result<ArchiveHandle> {
        let identity = self.identity(version);
        let source = staging.source_dir();
        let stats = unpack(&staging.tarball_path(), &source)?;

        let archive_path = staging.archive_path();
        let mut out = File::options()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&archive_path)
            .map_err(|err| Error::io(format!("creating {}", archive_path.display()), err))?;
        self.builder.build(&identity, &source, &mut out)?;

        let len = out
            .seek(SeekFrom::End(0))
            .and_then(|len| out.rewind().map(|()| len))
            .map_err(|err| Error::io(format!("rewinding {}", archive_path.display()), err))?;

        info!(
            module = %identity.path,
            version = %identity.version,
            files = stats.files,
            skipped = stats.skipped,
            bytes = len,
            "module archive created"
        );

        Ok(ArchiveHandle {
            file: out,
            len,
            identity,
            staging,
        })
    }
}

/// Downloads, verifies and repacks a package version.
#[derive(Clone)]
pub struct ArchivePipeline {
    fetcher: TarballFetcher,
    repacker: ArchiveRepacker,
    staging_root: Option<PathBuf>,
}

impl ArchivePipeline {
    pub fn new(fetcher: TarballFetcher, repacker: ArchiveRepacker, staging_root: Option<PathBuf>) -> Self {
        Self {
            fetcher,
            repacker,
            staging_root,
        }
    }

    pub async fn build(&self, version: PackageVersion) -> Result<ArchiveHandle> {
        let staging = Staging::create(self.staging_root.as_deref())?;
        self.fetcher.fetch(&version.dist, &staging.tarball_path()).await?;

        let repacker = self.repacker.clone();
        task::spawn_blocking(move || repacker.repack(staging, &version))
            .await
            .map_err(|err| Error::Task(err.to_string()))?
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UnpackStats {
    pub files: usize,
    pub skipped: usize,
}

/// Extracts a gzipped tarball below `dest`.
///
/// Regular files and directories are extracted; links and special files are
/// skipped. An entry whose path would land outside `dest` fails the whole
/// extraction, as does a tree larger than a module zip may hold.
pub fn unpack(tarball: &Path, dest: &Path) -> Result<UnpackStats> {
    unpack_limited(tarball, dest, gomodzip::MAX_ZIP_FILE)
}

fn unpack_limited(tarball: &Path, dest: &Path, limit: u64) -> Result<UnpackStats> {
    let file = File::open(tarball)
        .map_err(|err| Error::io(format!("opening {}", tarball.display()), err))?;
    fs::create_dir_all(dest)
        .map_err(|err| Error::io(format!("creating {}", dest.display()), err))?;

    let mut archive = Archive::new(GzDecoder::new(file));
    let mut stats = UnpackStats::default();
    let mut total: u64 = 0;
    let malformed = |err: io::Error| Error::Decode(format!("malformed tarball: {err}"));

    for entry in archive.entries().map_err(malformed)? {
        let mut entry = entry.map_err(malformed)?;
        let name = entry.path().map_err(malformed)?.into_owned();
        let target = safe_join(dest, &name).ok_or_else(|| {
            Error::Decode(format!(
                "tarball entry {} escapes the package directory",
                name.display()
            ))
        })?;

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target)
                    .map_err(|err| Error::io(format!("creating {}", target.display()), err))?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|err| Error::io(format!("creating {}", parent.display()), err))?;
                }
                let mut out = File::create(&target)
                    .map_err(|err| Error::io(format!("creating {}", target.display()), err))?;
                let allowance = (limit - total).saturating_add(1);
                total += io::copy(&mut (&mut entry).take(allowance), &mut out).map_err(malformed)?;
                if total > limit {
                    return Err(gomodzip::Error::TreeTooLarge { limit }.into());
                }
                stats.files += 1;
            }
            EntryType::Symlink | EntryType::Link => {
                warn!(entry = %name.display(), "skipping link in tarball");
                stats.skipped += 1;
            }
            other => {
                debug!(entry = %name.display(), kind = ?other, "skipping tarball entry");
                stats.skipped += 1;
            }
        }
    }

    Ok(stats)
}

/// Joins an archive entry path onto `root`, refusing absolute paths and
/// parent components.
fn safe_join(root: &Path, entry: &Path) -> Option<PathBuf> {
    let mut joined = root.to_path_buf();
    for component in entry.components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(joined)
}
