//! State store: validated, atomic persistence of the state document
//!
//! The document is replaced with temp-file-then-rename, so readers see the
//! old or the new document and never a partial one. Each write also
//! refreshes `<state>.sha256`, which lets other processes detect changes
//! without parsing the document.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use gitstate_fs::io::remove_if_exists;
use gitstate_fs::{content_digest, write_atomic};
use serde_json::Value;

use crate::document::{STATE_VERSION, StateDocument};
use crate::{Error, Result};

struct Cached {
    digest: String,
    document: StateDocument,
}

/// Reads and writes one state document.
pub struct StateStore {
    path: PathBuf,
    digest_path: PathBuf,
    max_bytes: Option<u64>,
    cache: RefCell<Option<Cached>>,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut digest_name = path.file_name().unwrap_or_default().to_os_string();
        digest_name.push(".sha256");
        Self {
            digest_path: path.with_file_name(digest_name),
            path,
            max_bytes: None,
            cache: RefCell::new(None),
        }
    }

    /// Refuse to persist documents larger than `max_bytes`.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn digest_path(&self) -> &Path {
        &self.digest_path
    }

    /// Raw document bytes, `None` when the file does not exist.
    pub fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(gitstate_fs::Error::io(&self.path, e).into()),
        }
    }

    /// Parsed document.
    ///
    /// `Ok(None)` when absent or empty, [`Error::Corrupt`] when non-empty but
    /// invalid, [`Error::VersionMismatch`] when written by another format
    /// version.
    pub fn read(&self) -> Result<Option<StateDocument>> {
        let Some(bytes) = self.read_bytes()? else {
            return Ok(None);
        };
        self.parse(&bytes)
    }

    fn parse(&self, bytes: &[u8]) -> Result<Option<StateDocument>> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let digest = content_digest(bytes);
        if let Some(cached) = self.cache.borrow().as_ref()
            && cached.digest == digest
        {
            return Ok(Some(cached.document.clone()));
        }

        let value: Value = serde_json::from_slice(bytes).map_err(|e| self.corrupt(e.to_string()))?;
        let version = value
            .pointer("/metadata/version")
            .ok_or_else(|| self.corrupt("metadata.version is missing"))?;
        if version.as_u64() != Some(u64::from(STATE_VERSION)) {
            return Err(Error::VersionMismatch {
                found: version.to_string(),
                expected: STATE_VERSION,
            });
        }

        let document: StateDocument =
            serde_json::from_value(value).map_err(|e| self.corrupt(e.to_string()))?;
        let problems = document.problems();
        if !problems.is_empty() {
            return Err(self.corrupt(problems.join("; ")));
        }

        *self.cache.borrow_mut() = Some(Cached {
            digest,
            document: document.clone(),
        });
        Ok(Some(document))
    }

    /// Content digest recorded by the last write, without reading the document.
    pub fn digest_on_disk(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.digest_path) {
            Ok(s) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(gitstate_fs::Error::io(&self.digest_path, e).into()),
        }
    }

    /// Validate and atomically persist `document`, then refresh the digest
    /// side-file and the in-memory cache.
    pub(crate) fn write(&self, document: &StateDocument) -> Result<()> {
        let problems = document.problems();
        if !problems.is_empty() {
            return Err(Error::InvalidMutation {
                message: problems.join("; "),
            });
        }

        let mut bytes = serde_json::to_vec_pretty(document)?;
        bytes.push(b'\n');
        if let Some(max) = self.max_bytes
            && bytes.len() as u64 > max
        {
            return Err(Error::InvalidMutation {
                message: format!("state document is {} bytes, limit is {max}", bytes.len()),
            });
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| gitstate_fs::Error::io(parent, e))?;
        }
        let digest = content_digest(&bytes);
        write_atomic(&self.path, &bytes)?;
        write_atomic(&self.digest_path, format!("{digest}\n").as_bytes())?;

        tracing::debug!(
            path = %self.path.display(),
            bytes = bytes.len(),
            digest = %digest,
            "Wrote state document"
        );
        *self.cache.borrow_mut() = Some(Cached {
            digest,
            document: document.clone(),
        });
        Ok(())
    }

    /// Put back exact bytes captured earlier; `None` removes the document.
    pub(crate) fn restore(&self, bytes: Option<&[u8]>) -> Result<()> {
        self.cache.borrow_mut().take();
        match bytes {
            Some(bytes) => {
                write_atomic(&self.path, bytes)?;
                let digest = content_digest(bytes);
                write_atomic(&self.digest_path, format!("{digest}\n").as_bytes())?;
            }
            None => {
                remove_if_exists(&self.path)?;
                remove_if_exists(&self.digest_path)?;
            }
        }
        Ok(())
    }

    fn corrupt(&self, message: impl Into<String>) -> Error {
        Error::Corrupt {
            path: self.path.clone(),
            message: message.into(),
        }
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("path", &self.path)
            .field("max_bytes", &self.max_bytes)
            .finish_non_exhaustive()
    }
}
