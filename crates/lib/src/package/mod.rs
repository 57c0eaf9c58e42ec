//! Distribution archives for successful build results.
//!
//! The pipeline hands the packager coordinate-tagged results only; how they
//! are archived is up to the [`Packager`] implementation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{BuildConfiguration, OutputLayout};
use crate::matrix::TaskId;

#[derive(Debug, Error)]
pub enum PackageError {
  #[error("i/o error at {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write archive {}: {source}", path.display())]
  Zip {
    path: PathBuf,
    #[source]
    source: zip::result::ZipError,
  },

  #[error("failed to scan {}: {source}", path.display())]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("build output {} does not exist", path.display())]
  MissingOutput { path: PathBuf },
}

impl PackageError {
  fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
    PackageError::Io {
      path: path.into(),
      source,
    }
  }

  fn zip(path: &Path, source: zip::result::ZipError) -> Self {
    PackageError::Zip {
      path: path.to_path_buf(),
      source,
    }
  }
}

/// One successful task, ready for packaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInput {
  pub task: TaskId,
  /// Primary artifact produced by the converter.
  pub artifact: PathBuf,
  /// The task's output directory; everything below it is archived.
  pub output_dir: PathBuf,
}

/// Turns successful build results into distributable archives.
pub trait Packager: Send + Sync {
  /// Package every input, returning the created archive paths in input order.
  fn package(&self, inputs: &[PackageInput]) -> Result<Vec<PathBuf>, PackageError>;
}

/// Writes one deterministic ZIP per (language, flavor, format) triple under
/// `{dist-root}/{language}/{flavor}/{format}/`.
#[derive(Debug, Clone)]
pub struct ZipPackager {
  layout: OutputLayout,
}

impl ZipPackager {
  pub fn new(layout: OutputLayout) -> Self {
    Self { layout }
  }

  pub fn from_config(config: &BuildConfiguration) -> Self {
    Self::new(config.output.clone())
  }

  /// `{dist-root}/{language}/{flavor}/{format}/{prefix}-{language}-{flavor}-{format}.zip`
  pub fn archive_path(&self, task: &TaskId) -> PathBuf {
    self
      .layout
      .dist_dir(&task.language, &task.flavor, &task.format)
      .join(format!(
        "{}-{}-{}-{}.zip",
        self.layout.artifact_prefix, task.language, task.flavor, task.format
      ))
  }

  fn package_one(&self, input: &PackageInput) -> Result<PathBuf, PackageError> {
    if !input.output_dir.is_dir() {
      return Err(PackageError::MissingOutput {
        path: input.output_dir.clone(),
      });
    }
    let archive = self.archive_path(&input.task);
    if let Some(parent) = archive.parent() {
      fs::create_dir_all(parent).map_err(|source| PackageError::io(parent, source))?;
    }
    let entries = entries_from_dir(&input.output_dir)?;
    write_zip(&archive, &entries)?;
    debug!(task = %input.task, archive = %archive.display(), files = entries.len(), "archive written");
    Ok(archive)
  }
}

impl Packager for ZipPackager {
  fn package(&self, inputs: &[PackageInput]) -> Result<Vec<PathBuf>, PackageError> {
    let archives = inputs
      .iter()
      .map(|input| self.package_one(input))
      .collect::<Result<Vec<_>, _>>()?;
    info!(count = archives.len(), dist = %self.layout.dist_root.display(), "archives created");
    Ok(archives)
  }
}

/// A file and its `/`-separated name inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ArchiveEntry {
  archive_path: String,
  source: PathBuf,
}

fn entries_from_dir(root: &Path) -> Result<Vec<ArchiveEntry>, PackageError> {
  let mut entries = Vec::new();
  for entry in WalkDir::new(root).follow_links(false) {
    let entry = entry.map_err(|source| PackageError::Walk {
      path: root.to_path_buf(),
      source,
    })?;
    if entry.file_type().is_dir() {
      continue;
    }
    let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
    entries.push(ArchiveEntry {
      archive_path: archive_path(relative),
      source: entry.path().to_path_buf(),
    });
  }
  entries.sort_by(|left, right| left.archive_path.cmp(&right.archive_path));
  Ok(entries)
}

fn archive_path(relative: &Path) -> String {
  relative
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}

/// Fixed timestamps and permissions keep archives byte-identical across runs.
fn write_zip(path: &Path, entries: &[ArchiveEntry]) -> Result<(), PackageError> {
  let file = fs::File::create(path).map_err(|source| PackageError::io(path, source))?;
  let mut writer = zip::ZipWriter::new(file);
  let timestamp = zip::DateTime::from_date_and_time(1980, 1, 1, 0, 0, 0)
    .map_err(|_| PackageError::io(path, io::Error::other("invalid zip timestamp")))?;
  let options = zip::write::FileOptions::<()>::default()
    .compression_method(zip::CompressionMethod::Deflated)
    .last_modified_time(timestamp)
    .unix_permissions(0o644);
  for entry in entries {
    writer
      .start_file(entry.archive_path.as_str(), options)
      .map_err(|source| PackageError::zip(path, source))?;
    let mut input = fs::File::open(&entry.source).map_err(|source| PackageError::io(&entry.source, source))?;
    io::copy(&mut input, &mut writer).map_err(|source| PackageError::io(&entry.source, source))?;
  }
  writer.finish().map_err(|source| PackageError::zip(path, source))?;
  Ok(())
}

/// Find finished task outputs in an existing build tree.
///
/// Looks at `{language}/{flavor}/{format}` directories below `layout.build_root`
/// and keeps those holding a primary artifact (`{prefix}-{language}-{flavor}.*`
/// or a multi-page `index.md`).
pub fn discover_outputs(layout: &OutputLayout) -> Result<Vec<PackageInput>, PackageError> {
  let root = &layout.build_root;
  if !root.is_dir() {
    return Err(PackageError::MissingOutput { path: root.clone() });
  }
  let mut inputs = Vec::new();
  for entry in WalkDir::new(root)
    .min_depth(3)
    .max_depth(3)
    .sort_by_file_name()
  {
    let entry = entry.map_err(|source| PackageError::Walk {
      path: root.clone(),
      source,
    })?;
    if !entry.file_type().is_dir() {
      continue;
    }
    let Some(task) = task_from_path(root, entry.path()) else {
      continue;
    };
    match primary_artifact(entry.path(), &layout.artifact_prefix, &task)? {
      Some(artifact) => inputs.push(PackageInput {
        task,
        artifact,
        output_dir: entry.path().to_path_buf(),
      }),
      None => warn!(task = %task, path = %entry.path().display(), "no artifact found, skipping"),
    }
  }
  Ok(inputs)
}

fn task_from_path(root: &Path, dir: &Path) -> Option<TaskId> {
  let relative = dir.strip_prefix(root).ok()?;
  let parts: Vec<String> = relative
    .components()
    .map(|c| c.as_os_str().to_string_lossy().into_owned())
    .collect();
  match parts.as_slice() {
    [language, flavor, format] => Some(TaskId::new(language.as_str(), flavor.as_str(), format.as_str())),
    _ => None,
  }
}

fn primary_artifact(dir: &Path, prefix: &str, task: &TaskId) -> Result<Option<PathBuf>, PackageError> {
  let stem = format!("{}-{}-{}", prefix, task.language, task.flavor);
  let mut files: Vec<PathBuf> = fs::read_dir(dir)
    .map_err(|source| PackageError::io(dir, source))?
    .filter_map(Result::ok)
    .map(|e| e.path())
    .filter(|p| p.is_file())
    .collect();
  files.sort();
  let named = files
    .iter()
    .find(|p| p.file_stem().is_some_and(|s| s.to_string_lossy() == stem));
  let index = files.iter().find(|p| p.file_name().is_some_and(|n| n == "index.md"));
  Ok(named.or(index).cloned())
}
