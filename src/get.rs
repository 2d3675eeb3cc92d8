//! Document lookup commands: `intake get` and `intake list`.

use anyhow::Result;

use paper_intake_core::models::DocumentRecord;

use crate::config::Config;
use crate::service::IntakeService;

/// Characters of extracted text shown by `intake get`.
const PREVIEW_CHARS: usize = 400;

pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let service = IntakeService::open(config).await?;
    let doc = service.get(id).await?;
    print_document(&doc);
    Ok(())
}

pub async fn run_list(config: &Config, project_id: &str) -> Result<()> {
    let service = IntakeService::open(config).await?;
    let docs = service.list(project_id).await?;

    if docs.is_empty() {
        println!("No documents in project {}.", project_id);
        return Ok(());
    }

    println!(
        "{:<36}  {:<10}  {:>10}  {:<20}  FILE",
        "ID", "STATUS", "BYTES", "CREATED"
    );
    for doc in &docs {
        println!(
            "{:<36}  {:<10}  {:>10}  {:<20}  {}",
            doc.id,
            doc.status.as_str(),
            doc.file_size,
            doc.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            doc.file_name
        );
    }
    println!("\n{} document(s).", docs.len());
    Ok(())
}

fn print_document(doc: &DocumentRecord) {
    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!("project_id:   {}", doc.project_id);
    println!("user_id:      {}", doc.user_id);
    println!("file_name:    {}", doc.file_name);
    println!("file_size:    {}", doc.file_size);
    println!("mime_type:    {}", doc.mime_type);
    println!("status:       {}", doc.status);
    println!("created_at:   {}", doc.created_at.to_rfc3339());
    println!("updated_at:   {}", doc.updated_at.to_rfc3339());
    println!("--- Content ---");
    if doc.content.is_empty() {
        println!("(no extracted text)");
    } else {
        let preview: String = doc.content.chars().take(PREVIEW_CHARS).collect();
        println!("{}", preview);
        if doc.content.chars().count() > PREVIEW_CHARS {
            println!("...");
        }
    }
}
