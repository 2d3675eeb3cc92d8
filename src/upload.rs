//! Upload payload collection and validation.
//!
//! Both the HTTP endpoints (multipart) and the CLI (a file on disk) build an
//! [`UploadForm`], then call [`UploadForm::validate`] to get a
//! [`NewDocument`]. Validation happens before any store access.

use std::path::Path;

use anyhow::Context;
use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use paper_intake_core::models::NewDocument;
use tracing::warn;

use crate::error::IntakeError;
use crate::extract::{extract_text, resolve_mime};

/// User id recorded when the caller does not identify one.
pub const ANONYMOUS_USER: &str = "anonymous";

/// A file as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Raw, unvalidated upload fields.
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    pub project_id: Option<String>,
    pub user_id: Option<String>,
    pub existing_document_id: Option<String>,
    /// Text extracted by the client. Takes precedence over server extraction.
    pub extracted_text: Option<String>,
    pub force: bool,
    pub file: Option<UploadedFile>,
}

/// An upload that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub document: NewDocument,
    pub existing_document_id: Option<String>,
    pub force: bool,
}

impl UploadForm {
    /// Reads all multipart fields. Unknown fields are ignored.
    ///
    /// Field names are accepted in camelCase (`projectId`) or snake_case
    /// (`project_id`).
    pub async fn from_multipart(
        mut multipart: Multipart,
        max_bytes: usize,
    ) -> Result<Self, IntakeError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, max_bytes))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" | "newFile" | "new_file" => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| multipart_error(e, max_bytes))?;
                    form.file = Some(UploadedFile {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                other => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| multipart_error(e, max_bytes))?;
                    form.set_text_field(other, value)?;
                }
            }
        }

        form.check_size(max_bytes)?;
        Ok(form)
    }

    /// Builds a form from a file on disk (CLI).
    pub fn from_path(
        project_id: &str,
        path: &Path,
        user_id: Option<String>,
        extracted_text: Option<String>,
    ) -> anyhow::Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(UploadForm {
            project_id: Some(project_id.to_string()),
            user_id,
            extracted_text,
            file: Some(UploadedFile {
                file_name,
                content_type: None,
                bytes,
            }),
            ..Default::default()
        })
    }

    fn set_text_field(&mut self, name: &str, value: String) -> Result<(), IntakeError> {
        match name {
            "projectId" | "project_id" => self.project_id = Some(value),
            "userId" | "user_id" => self.user_id = Some(value),
            "existingDocumentId" | "existing_document_id" => {
                self.existing_document_id = Some(value)
            }
            "extractedText" | "extracted_text" => self.extracted_text = Some(value),
            "force" => {
                self.force = match value.trim() {
                    "true" | "1" | "yes" => true,
                    "false" | "0" | "no" | "" => false,
                    other => {
                        return Err(IntakeError::invalid(format!(
                            "force must be a boolean, got '{}'",
                            other
                        )))
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn check_size(&self, max_bytes: usize) -> Result<(), IntakeError> {
        match self.file {
            Some(ref f) if f.bytes.len() > max_bytes => {
                Err(IntakeError::PayloadTooLarge { limit: max_bytes })
            }
            _ => Ok(()),
        }
    }

    /// Checks required fields and resolves MIME type and text.
    pub fn validate(self) -> Result<ValidatedUpload, IntakeError> {
        let project_id = non_blank(self.project_id)
            .ok_or_else(|| IntakeError::invalid("projectId is required"))?;
        let file = self
            .file
            .ok_or_else(|| IntakeError::invalid("file is required"))?;
        if file.file_name.trim().is_empty() {
            return Err(IntakeError::invalid("file must carry a filename"));
        }

        let mime_type = resolve_mime(&file.file_name, file.content_type.as_deref());
        let content = match non_blank(self.extracted_text) {
            Some(text) => text,
            None => match extract_text(&file.bytes, &mime_type) {
                Ok(text) => text,
                Err(e) => {
                    warn!(file_name = %file.file_name, error = %e, "no text extracted");
                    String::new()
                }
            },
        };

        Ok(ValidatedUpload {
            document: NewDocument {
                project_id,
                user_id: non_blank(self.user_id).unwrap_or_else(|| ANONYMOUS_USER.to_string()),
                file_name: file.file_name,
                file_size: file.bytes.len() as i64,
                mime_type,
                content,
            },
            existing_document_id: non_blank(self.existing_document_id),
            force: self.force,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn multipart_error(err: MultipartError, max_bytes: usize) -> IntakeError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        IntakeError::PayloadTooLarge { limit: max_bytes }
    } else {
        IntakeError::invalid(format!("malformed multipart body: {}", err.body_text()))
    }
}
