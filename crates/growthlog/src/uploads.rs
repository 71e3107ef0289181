//! Photo upload storage.
//!
//! Uploaded photos live in one flat directory, named by their sanitized
//! filename. Stored files are never overwritten: a second upload under a taken
//! name either reuses the existing file (same bytes) or gets a content-hash
//! suffix.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Name used when nothing usable survives sanitization.
const FALLBACK_STEM: &str = "upload";

/// Longest stored filename, in bytes.
const MAX_FILENAME_LEN: usize = 100;

/// Hex digits of the content hash used to disambiguate colliding names.
const HASH_SUFFIX_LEN: usize = 8;

/// Device names Windows refuses to create as files.
const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("valid filename regex"))
}

/// Reduce an uploaded filename to a single safe path segment.
///
/// Path separators become word breaks, whitespace runs become `_`, anything
/// outside `[A-Za-z0-9_.-]` is dropped, and leading/trailing `.` and `_` are
/// stripped, so the result can never be `..` or contain a directory
/// component. Returns `None` if nothing is left.
///
/// ```
/// use growthlog::uploads::sanitize_filename;
///
/// assert_eq!(sanitize_filename("../../etc/passwd.jpg").as_deref(), Some("etc_passwd.jpg"));
/// assert_eq!(sanitize_filename("my plant.png").as_deref(), Some("my_plant.png"));
/// assert_eq!(sanitize_filename("../.."), None);
/// ```
#[must_use]
pub fn sanitize_filename(name: &str) -> Option<String> {
    let spaced = name.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = unsafe_chars().replace_all(&joined, "");
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        return None;
    }

    let mut safe = trimmed.to_string();
    let stem = safe.split('.').next().unwrap_or_default();
    if WINDOWS_DEVICE_NAMES
        .iter()
        .any(|device| device.eq_ignore_ascii_case(stem))
    {
        safe.insert(0, '_');
    }

    Some(truncate_keeping_extension(&safe, MAX_FILENAME_LEN))
}

/// Split `name` into stem and extension (without the dot).
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

fn join_extension(stem: &str, ext: Option<&str>) -> String {
    match ext {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

/// Shorten an ASCII filename to `max` bytes, cutting from the stem.
fn truncate_keeping_extension(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }
    let (stem, ext) = split_extension(name);
    let ext_len = ext.map_or(0, |e| e.len() + 1);
    if ext_len >= max {
        return name[..max].to_string();
    }
    join_extension(&stem[..max - ext_len], ext)
}

/// Whether `segment` is a single file name with no traversal.
///
/// Without separators the only traversing names are `.` and `..`.
fn is_safe_path_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains('/')
        && !segment.contains('\\')
        && !segment.contains('\0')
}

/// Reference to a stored photo, as persisted on an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFileRef {
    name: String,
    fresh: bool,
}

impl StoredFileRef {
    /// The stored file name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this upload wrote the file, as opposed to reusing an
    /// identical one already on disk.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }
}

/// Flat directory of uploaded photos.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    /// The upload directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Largest accepted upload, in bytes.
    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Store an uploaded file and return the reference to persist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the file is empty or too large,
    /// [`Error::DirectoryCreate`] or [`Error::FileWrite`] if the write fails.
    pub fn store(&self, file_name: &str, content: &[u8]) -> Result<StoredFileRef> {
        if content.is_empty() {
            return Err(Error::validation("photo", "the uploaded file is empty"));
        }
        if content.len() > self.max_bytes {
            return Err(Error::validation(
                "photo",
                format!("the uploaded file exceeds {} bytes", self.max_bytes),
            ));
        }

        let name = sanitize_filename(file_name).unwrap_or_else(|| FALLBACK_STEM.to_string());
        self.ensure_dir()?;

        let digest = blake3::hash(content);
        if let Some(fresh) = self.write_or_reuse(&name, content, &digest)? {
            return Ok(StoredFileRef { name, fresh });
        }

        let (stem, ext) = split_extension(&name);
        let hex = digest.to_hex();
        let stem = format!("{stem}-{}", &hex.as_str()[..HASH_SUFFIX_LEN]);
        let suffixed = truncate_keeping_extension(
            &join_extension(&stem, ext),
            MAX_FILENAME_LEN + HASH_SUFFIX_LEN + 1,
        );
        debug!("Upload name '{}' is taken, trying '{}'", name, suffixed);

        if let Some(fresh) = self.write_or_reuse(&suffixed, content, &digest)? {
            return Ok(StoredFileRef {
                name: suffixed,
                fresh,
            });
        }

        Err(Error::FileWrite {
            path: self.dir.join(&suffixed),
            source: std::io::Error::new(
                ErrorKind::AlreadyExists,
                "a different file already uses this content-hash name",
            ),
        })
    }

    /// Remove a file written by [`UploadStore::store`] that no entry will
    /// reference. Files the upload reused are left in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileWrite`] if the file cannot be removed.
    pub fn discard(&self, stored: &StoredFileRef) -> Result<()> {
        if !stored.fresh {
            return Ok(());
        }
        let path = self.dir.join(&stored.name);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!("Removed unreferenced upload {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::FileWrite { path, source }),
        }
    }

    /// Resolve a stored reference to its path on disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the reference is not a plain file name or
    /// no such file exists in the upload directory.
    pub fn resolve(&self, reference: &str) -> Result<PathBuf> {
        if !is_safe_path_segment(reference) {
            return Err(Error::not_found(format!("upload '{reference}'")));
        }
        let path = self.dir.join(reference);
        if !path.starts_with(&self.dir) || !path.is_file() {
            return Err(Error::not_found(format!("upload '{reference}'")));
        }
        Ok(path)
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|source| Error::DirectoryCreate {
                path: self.dir.clone(),
                source,
            })?;
            info!("Created upload directory {}", self.dir.display());
        }
        Ok(())
    }

    /// Write `content` to `name` unless it exists.
    ///
    /// Returns `Some(true)` if the file was written, `Some(false)` if it
    /// already held identical bytes, and `None` if the name holds other bytes.
    fn write_or_reuse(
        &self,
        name: &str,
        content: &[u8],
        digest: &blake3::Hash,
    ) -> Result<Option<bool>> {
        let path = self.dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let written = file.write_all(content).and_then(|()| file.sync_all());
                if let Err(source) = written {
                    let _ = std::fs::remove_file(&path);
                    return Err(Error::FileWrite { path, source });
                }
                info!("Stored upload {} ({} bytes)", path.display(), content.len());
                Ok(Some(true))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                // A concurrent upload may still be writing this file. Its
                // partial bytes hash differently, so this one takes the
                // suffixed name instead.
                let existing = std::fs::read(&path).map_err(|source| Error::FileWrite {
                    path: path.clone(),
                    source,
                })?;
                if blake3::hash(&existing) != *digest {
                    return Ok(None);
                }
                debug!("Reusing identical upload {}", path.display());
                Ok(Some(false))
            }
            Err(source) => Err(Error::FileWrite { path, source }),
        }
    }
}
