use crate::error::PackagingError;
use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Name prefix FRED gives its per-run output directories
pub const DEFAULT_RUN_DIR_PREFIX: &str = "RUN";

/// Packaged simulation results, ready for upload.
///
/// Immutable once built; `total_size_bytes` always equals the archive length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedResults {
    zip_content: Vec<u8>,
    file_count: usize,
    total_size_bytes: usize,
    directory_name: String,
}

impl PackagedResults {
    pub fn new(zip_content: Vec<u8>, file_count: usize, directory_name: impl Into<String>) -> Self {
        let total_size_bytes = zip_content.len();
        Self {
            zip_content,
            file_count,
            total_size_bytes,
            directory_name: directory_name.into(),
        }
    }

    pub fn zip_content(&self) -> &[u8] {
        &self.zip_content
    }

    /// Number of files written into the archive (excluded entries not counted)
    pub fn file_count(&self) -> usize {
        self.file_count
    }

    pub fn total_size_bytes(&self) -> usize {
        self.total_size_bytes
    }

    /// Name of the directory that was packaged, for labelling only
    pub fn directory_name(&self) -> &str {
        &self.directory_name
    }

    pub fn into_zip_content(self) -> Vec<u8> {
        self.zip_content
    }
}

/// Decides which directory names count as a run output root
pub trait RunDirectoryMatcher: Send + Sync {
    fn is_run_directory(&self, name: &str) -> bool;
}

impl<F> RunDirectoryMatcher for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_run_directory(&self, name: &str) -> bool {
        self(name)
    }
}

/// Case-sensitive name prefix match (`RUN*` by default)
#[derive(Debug, Clone)]
pub struct PrefixMatcher {
    prefix: String,
}

impl PrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for PrefixMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_RUN_DIR_PREFIX)
    }
}

impl RunDirectoryMatcher for PrefixMatcher {
    fn is_run_directory(&self, name: &str) -> bool {
        name.starts_with(&self.prefix)
    }
}

/// Packages a results directory into a ZIP archive
#[cfg_attr(test, mockall::automock)]
pub trait ResultsPackager: Send + Sync {
    fn package_directory(&self, results_dir: &Path) -> Result<PackagedResults, PackagingError>;
}

/// A directory whose contents are archived under `<name>/...`
#[derive(Debug)]
struct RunRoot {
    name: String,
    path: PathBuf,
    /// Every archived file must resolve beneath this path
    canonical: PathBuf,
}

struct ArchiveOutput {
    zip_content: Vec<u8>,
    file_count: usize,
    excluded: usize,
}

/// In-memory ZIP packager for FRED results directories.
///
/// Accepts either a single run directory (`RUN4/`) or a parent holding
/// several (`output/RUN1/`, `output/RUN2/`). Only run directories are
/// archived, and no file that resolves outside its run directory is ever
/// read: escaping symlinks are skipped, not treated as errors.
pub struct DirectoryArchiver {
    matcher: Arc<dyn RunDirectoryMatcher>,
    compression: CompressionMethod,
}

impl DirectoryArchiver {
    pub fn new() -> Self {
        Self::with_matcher(PrefixMatcher::default())
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::with_matcher(PrefixMatcher::new(prefix))
    }

    pub fn with_matcher(matcher: impl RunDirectoryMatcher + 'static) -> Self {
        Self {
            matcher: Arc::new(matcher),
            compression: CompressionMethod::Deflated,
        }
    }

    fn validate_directory(&self, results_dir: &Path) -> Result<(), PackagingError> {
        if !results_dir.exists() {
            error!(path = %results_dir.display(), "Results directory does not exist");
            return Err(PackagingError::InvalidResultsDirectory(format!(
                "Results directory does not exist: {}",
                results_dir.display()
            )));
        }

        if !results_dir.is_dir() {
            error!(path = %results_dir.display(), "Results path is not a directory");
            return Err(PackagingError::InvalidResultsDirectory(format!(
                "Path is not a directory: {}",
                results_dir.display()
            )));
        }

        Ok(())
    }

    /// Resolve which directories get archived.
    ///
    /// A directory that itself matches is the single run root. Otherwise only
    /// its matching immediate subdirectories are used, sorted by name.
    fn find_run_roots(
        &self,
        results_dir: &Path,
        canonical_dir: &Path,
        directory_name: &str,
    ) -> Result<Vec<RunRoot>, PackagingError> {
        if self.matcher.is_run_directory(directory_name) {
            return Ok(vec![RunRoot {
                name: directory_name.to_string(),
                path: results_dir.to_path_buf(),
                canonical: canonical_dir.to_path_buf(),
            }]);
        }

        let unreadable = |e: io::Error| {
            PackagingError::InvalidResultsDirectory(format!(
                "Results directory is not readable: {}: {}",
                results_dir.display(),
                e
            ))
        };

        let mut roots = Vec::new();
        for entry in fs::read_dir(results_dir).map_err(unreadable)? {
            let entry = entry.map_err(unreadable)?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };

            let path = entry.path();
            if !self.matcher.is_run_directory(name) || !path.is_dir() {
                continue;
            }

            let canonical = match fs::canonicalize(&path) {
                Ok(canonical) => canonical,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unresolvable run directory");
                    continue;
                }
            };

            if !canonical.starts_with(canonical_dir) {
                warn!(
                    path = %path.display(),
                    "Skipping run directory that resolves outside the results directory"
                );
                continue;
            }

            roots.push(RunRoot {
                name: name.to_string(),
                path,
                canonical,
            });
        }

        roots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roots)
    }

    fn create_zip(&self, run_roots: &[RunRoot]) -> io::Result<ArchiveOutput> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let mut file_count = 0;
        let mut excluded = 0;

        for root in run_roots {
            let (added, skipped) = self.add_run_root(&mut zip, root)?;
            file_count += added;
            excluded += skipped;
        }

        let zip_content = zip.finish()?.into_inner();

        Ok(ArchiveOutput {
            zip_content,
            file_count,
            excluded,
        })
    }

    /// Archive every file under one run root. Returns (added, excluded).
    fn add_run_root(
        &self,
        zip: &mut ZipWriter<Cursor<Vec<u8>>>,
        root: &RunRoot,
    ) -> io::Result<(usize, usize)> {
        let mut added = 0;
        let mut excluded = 0;

        for entry in WalkDir::new(&root.path)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry?;
            if entry.depth() == 0 || entry.file_type().is_dir() {
                continue;
            }

            let resolved = match fs::canonicalize(entry.path()) {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping unresolvable entry");
                    excluded += 1;
                    continue;
                }
            };

            if !resolved.starts_with(&root.canonical) {
                warn!(
                    path = %entry.path().display(),
                    run_dir = %root.name,
                    "Skipping file outside run directory via symlink"
                );
                excluded += 1;
                continue;
            }

            // Sockets, fifos and links to in-tree directories are not archived
            if !resolved.is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&root.path)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            // Lossy names would collide inside the archive
            let Some(name) = archive_name(&root.name, relative) else {
                warn!(
                    path = %entry.path().display(),
                    run_dir = %root.name,
                    "Skipping file with non-UTF-8 name"
                );
                excluded += 1;
                continue;
            };

            let mut source = File::open(&resolved)?;
            let size = source.metadata()?.len();
            let options = FileOptions::default()
                .compression_method(self.compression)
                .unix_permissions(0o644)
                .large_file(size >= u32::MAX as u64);

            zip.start_file(name.as_str(), options)?;
            io::copy(&mut source, zip)?;
            added += 1;

            debug!(archive_name = %name, size_bytes = size, "Added to ZIP");
        }

        Ok((added, excluded))
    }
}

impl Default for DirectoryArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultsPackager for DirectoryArchiver {
    #[instrument(skip(self), fields(results_dir = %results_dir.display()))]
    fn package_directory(&self, results_dir: &Path) -> Result<PackagedResults, PackagingError> {
        self.validate_directory(results_dir)?;

        let canonical_dir = fs::canonicalize(results_dir).map_err(|e| {
            PackagingError::InvalidResultsDirectory(format!(
                "Results directory is not readable: {}: {}",
                results_dir.display(),
                e
            ))
        })?;
        let directory_name = directory_name(results_dir, &canonical_dir);

        let run_roots = self.find_run_roots(results_dir, &canonical_dir, &directory_name)?;
        if run_roots.is_empty() {
            warn!(
                path = %results_dir.display(),
                "No run directories found; expected a RUN* directory or a parent of RUN* directories"
            );
            return Err(PackagingError::InvalidResultsDirectory(format!(
                "No FRED output directories found in {}",
                results_dir.display()
            )));
        }

        info!(
            run_dirs = ?run_roots.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            "Found run directories"
        );

        let archive = self.create_zip(&run_roots).map_err(|source| {
            error!(path = %results_dir.display(), error = %source, "ZIP creation failed");
            PackagingError::Packaging {
                message: results_dir.display().to_string(),
                source,
            }
        })?;

        metrics::histogram!("results.packaging.files").record(archive.file_count as f64);
        if archive.excluded > 0 {
            metrics::counter!("results.packaging.excluded").increment(archive.excluded as u64);
        }

        let packaged = PackagedResults::new(archive.zip_content, archive.file_count, directory_name);

        info!(
            file_count = packaged.file_count(),
            excluded = archive.excluded,
            size_bytes = packaged.total_size_bytes(),
            "Created results ZIP"
        );

        Ok(packaged)
    }
}

/// Last component of the path as given, falling back to the resolved path
/// for inputs like `.`
fn directory_name(results_dir: &Path, canonical_dir: &Path) -> String {
    results_dir
        .file_name()
        .or_else(|| canonical_dir.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `<run_root>/<relative/path>` with forward slashes on every platform.
/// `None` when a component is not valid UTF-8.
fn archive_name(run_root_name: &str, relative: &Path) -> Option<String> {
    let mut name = run_root_name.to_string();
    for component in relative.components() {
        name.push('/');
        name.push_str(component.as_os_str().to_str()?);
    }
    Some(name)
}
