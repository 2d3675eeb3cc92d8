//! Upload commands: `intake check`, `intake upload` and `intake replace`.
//!
//! Each reads a file from disk, runs it through the same validation and
//! extraction as the HTTP endpoints, then prints the result to stdout.
//! Non-success outcomes return an error so the process exits non-zero.

use std::path::Path;

use anyhow::{bail, Context, Result};

use paper_intake_core::models::SimilarityVerdict;
use paper_intake_core::replace::ReplaceOutcome;

use crate::config::Config;
use crate::service::{CommitOutcome, IntakeService};
use crate::upload::{UploadForm, ValidatedUpload};

fn load_upload(
    project_id: &str,
    path: &Path,
    user_id: Option<String>,
    text_file: Option<&Path>,
) -> Result<ValidatedUpload> {
    let extracted_text = match text_file {
        Some(p) => Some(
            std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read text file {}", p.display()))?,
        ),
        None => None,
    };
    let form = UploadForm::from_path(project_id, path, user_id, extracted_text)?;
    Ok(form.validate()?)
}

fn print_verdict(verdict: &SimilarityVerdict) {
    println!(
        "{}  confidence {:.1}  ({})",
        verdict.recommendation,
        verdict.confidence,
        verdict.classification.as_str()
    );
    for m in &verdict.matches {
        let content = m
            .content_score
            .map(|c| format!("{:.1}", c))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:>5.1}  name {:>5.1}  text {:>5}  {}  {}",
            m.confidence, m.filename_score, content, m.document_id, m.file_name
        );
    }
}

pub async fn run_check(
    config: &Config,
    project_id: &str,
    path: &Path,
    text_file: Option<&Path>,
    json: bool,
) -> Result<()> {
    let upload = load_upload(project_id, path, None, text_file)?;
    let service = IntakeService::open(config).await?;
    let verdict = service.check(&upload.document).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        print_verdict(&verdict);
    }
    Ok(())
}

pub async fn run_upload(
    config: &Config,
    project_id: &str,
    path: &Path,
    user_id: Option<String>,
    force: bool,
) -> Result<()> {
    let upload = load_upload(project_id, path, user_id, None)?;
    let service = IntakeService::open(config).await?;

    match service.commit(upload.document, force).await? {
        CommitOutcome::Stored { document, verdict } => {
            if !verdict.recommendation.is_allow() {
                print_verdict(&verdict);
            }
            println!("Stored {} as {}", document.file_name, document.id);
            Ok(())
        }
        CommitOutcome::Held { verdict } => {
            print_verdict(&verdict);
            bail!("upload held: resembles an existing document (use --force or `intake replace`)");
        }
    }
}

pub async fn run_replace(
    config: &Config,
    project_id: &str,
    existing_document_id: &str,
    path: &Path,
    user_id: Option<String>,
) -> Result<()> {
    let upload = load_upload(project_id, path, user_id, None)?;
    let service = IntakeService::open(config).await?;

    match service.replace(existing_document_id, upload.document).await? {
        ReplaceOutcome::Replaced(doc) => {
            println!("Replaced {} with {} ({})", existing_document_id, doc.id, doc.file_name);
            Ok(())
        }
        ReplaceOutcome::Failed { reason, .. } => {
            bail!("replace-failed: {} (original document unchanged)", reason)
        }
        ReplaceOutcome::Partial {
            project_id,
            old_document_id,
            new_document_id,
            reason,
        } => bail!(
            "replace-partial: {} (project {}, old {}, new {}); run `intake reconcile --project {}`",
            reason,
            project_id,
            old_document_id,
            new_document_id.as_deref().unwrap_or("none"),
            project_id
        ),
        ReplaceOutcome::Unverified {
            document,
            completed_count,
        } => bail!(
            "replace-unverified: stored {} but found {} completed row(s) named {}",
            document.id,
            completed_count.map_or_else(|| "?".to_string(), |n| n.to_string()),
            document.file_name
        ),
    }
}
