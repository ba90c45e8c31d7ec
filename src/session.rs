use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::BibNumber;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("base name must not be empty")]
    EmptyBaseName,
    #[error("base name must not contain path separators: {0:?}")]
    InvalidBaseName(String),
    #[error("no image left to label")]
    Finished,
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `{base_name}-{digits}{extension}`, where the extension keeps its dot and
/// is empty when `original` has none.
pub fn labeled_file_name(base_name: &str, number: &BibNumber, original: &Path) -> String {
    let extension = original
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    format!("{base_name}-{number}{extension}")
}

/// An image that was written to the output directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledImage {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub number: BibNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Images already labeled or skipped
    pub done: usize,
    pub total: usize,
    pub labeled: usize,
}

/// Walks an operator through a list of images, one at a time.
///
/// Holds the pending list, the current position and everything accepted so
/// far. Detection itself stays outside: the caller runs the detector on
/// [`current`](Self::current) and reports the decision back with
/// [`accept`](Self::accept) or [`skip`](Self::skip).
#[derive(Debug)]
pub struct LabelSession {
    base_name: String,
    output_dir: PathBuf,
    pending: Vec<PathBuf>,
    current: usize,
    accepted: Vec<LabeledImage>,
    skipped: Vec<PathBuf>,
    processed: HashSet<String>,
}

impl LabelSession {
    pub fn new(
        base_name: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        pending: Vec<PathBuf>,
    ) -> Result<Self, SessionError> {
        let base_name = base_name.into().trim().to_string();
        if base_name.is_empty() {
            return Err(SessionError::EmptyBaseName);
        }
        if base_name.contains(['/', '\\']) {
            return Err(SessionError::InvalidBaseName(base_name));
        }

        Ok(Self {
            base_name,
            output_dir: output_dir.into(),
            pending,
            current: 0,
            accepted: Vec::new(),
            skipped: Vec::new(),
            processed: HashSet::new(),
        })
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Image waiting for a decision, if any.
    pub fn current(&self) -> Option<&Path> {
        self.pending.get(self.current).map(PathBuf::as_path)
    }

    /// Zero-based position of the current image.
    pub fn position(&self) -> usize {
        self.current
    }

    pub fn is_finished(&self) -> bool {
        self.current >= self.pending.len()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            done: self.current.min(self.pending.len()),
            total: self.pending.len(),
            labeled: self.accepted.len(),
        }
    }

    pub fn accepted(&self) -> &[LabeledImage] {
        &self.accepted
    }

    pub fn skipped(&self) -> &[PathBuf] {
        &self.skipped
    }

    /// Copy the current image into the output directory under its labeled
    /// name and move on.
    pub fn accept(&mut self, number: BibNumber) -> Result<&LabeledImage, SessionError> {
        let source = self.current().ok_or(SessionError::Finished)?.to_path_buf();

        std::fs::create_dir_all(&self.output_dir).map_err(|source| SessionError::Io {
            path: self.output_dir.clone(),
            source,
        })?;

        let destination = self
            .output_dir
            .join(labeled_file_name(&self.base_name, &number, &source));
        std::fs::copy(&source, &destination).map_err(|e| SessionError::Io {
            path: destination.clone(),
            source: e,
        })?;
        info!(
            source = %source.display(),
            destination = %destination.display(),
            "labeled image saved"
        );

        self.processed.insert(file_key(&source));
        self.accepted.push(LabeledImage {
            source,
            destination,
            number,
        });
        self.advance();

        self.accepted.last().ok_or(SessionError::Finished)
    }

    /// Leave the current image unlabeled and move on.
    pub fn skip(&mut self) -> Result<PathBuf, SessionError> {
        let source = self.current().ok_or(SessionError::Finished)?.to_path_buf();
        self.skipped.push(source.clone());
        self.advance();
        Ok(source)
    }

    // Step forward, passing over files whose name was already labeled
    fn advance(&mut self) {
        self.current += 1;
        while let Some(next) = self.pending.get(self.current) {
            if !self.processed.contains(&file_key(next)) {
                break;
            }
            debug!(path = %next.display(), "already labeled, skipping");
            self.current += 1;
        }
    }
}

fn file_key(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bib(s: &str) -> BibNumber {
        BibNumber::parse(s).unwrap()
    }

    #[test]
    fn labeled_name_keeps_extension() {
        assert_eq!(
            labeled_file_name("maraton", &bib("07"), Path::new("/photos/IMG_1.jpg")),
            "maraton-07.jpg"
        );
        assert_eq!(
            labeled_file_name("run", &bib("123"), Path::new("a.b/photo")),
            "run-123"
        );
    }

    #[test]
    fn base_name_is_validated() {
        assert!(matches!(
            LabelSession::new("  ", "out", vec![]),
            Err(SessionError::EmptyBaseName)
        ));
        assert!(matches!(
            LabelSession::new("a/b", "out", vec![]),
            Err(SessionError::InvalidBaseName(_))
        ));
    }

    #[test]
    fn empty_session_is_finished() {
        let mut session = LabelSession::new("race", "out", vec![]).unwrap();
        assert!(session.is_finished());
        assert!(session.current().is_none());
        assert!(matches!(session.skip(), Err(SessionError::Finished)));
        assert!(matches!(session.accept(bib("1")), Err(SessionError::Finished)));
    }

    #[test]
    fn skip_advances_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("labeled");
        let mut session = LabelSession::new(
            "race",
            &out,
            vec![PathBuf::from("a.png"), PathBuf::from("b.png")],
        )
        .unwrap();

        assert_eq!(session.skip().unwrap(), PathBuf::from("a.png"));
        assert_eq!(session.current(), Some(Path::new("b.png")));
        assert_eq!(session.progress(), Progress { done: 1, total: 2, labeled: 0 });
        assert!(!out.exists());
    }
}
