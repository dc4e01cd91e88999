//! Resume material for a run: the extracted text used for scoring and letter
//! writing, and the optional PDF attached to outgoing mail.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::mail::Attachment;

#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("could not read resume file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("resume text is empty")]
    Empty,
}

#[async_trait]
pub trait ResumeSource: Send + Sync {
    /// Plain resume text. Extraction from PDF happens elsewhere.
    async fn resume_text(&self) -> Result<String, ResumeError>;

    async fn attachment(&self) -> Result<Option<Attachment>, ResumeError>;
}

/// Resume stored on disk as a text file with an optional PDF alongside.
#[derive(Debug, Clone)]
pub struct FileResumeSource {
    text_path: PathBuf,
    pdf_path: Option<PathBuf>,
}

impl FileResumeSource {
    pub fn new(text_path: impl Into<PathBuf>, pdf_path: Option<PathBuf>) -> Self {
        Self {
            text_path: text_path.into(),
            pdf_path,
        }
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, ResumeError> {
    tokio::fs::read(path).await.map_err(|source| ResumeError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[async_trait]
impl ResumeSource for FileResumeSource {
    async fn resume_text(&self) -> Result<String, ResumeError> {
        let bytes = read(&self.text_path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn attachment(&self) -> Result<Option<Attachment>, ResumeError> {
        let Some(path) = &self.pdf_path else {
            return Ok(None);
        };
        let data = read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "resume.pdf".to_string());
        Ok(Some(Attachment {
            filename,
            content_type: "application/pdf".to_string(),
            data: Bytes::from(data),
        }))
    }
}

/// Everything a run needs from the resume, loaded once up front.
#[derive(Debug, Clone)]
pub struct ResumeMaterial {
    pub text: String,
    pub attachment: Option<Attachment>,
}

impl ResumeMaterial {
    /// Loads the resume. Empty text is an error; the attachment is only read
    /// when `attach` is set.
    pub async fn load(source: &dyn ResumeSource, attach: bool) -> Result<Self, ResumeError> {
        let text = source.resume_text().await?;
        if text.trim().is_empty() {
            return Err(ResumeError::Empty);
        }
        let attachment = if attach { source.attachment().await? } else { None };
        Ok(Self {
            text: text.trim().to_string(),
            attachment,
        })
    }
}
