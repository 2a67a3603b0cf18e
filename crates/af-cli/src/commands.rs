//! Command handlers
//!
//! Every command builds a fresh attachment for the slot, works on the record
//! file and persists the record when the command changed it.

use std::collections::BTreeMap;

use af_attachments::{Attachment, AttachmentOptions, UploadedFile, ORIGINAL_STYLE};
use af_core::{AffixConfig, Record};
use anyhow::{bail, ensure, Context};
use serde_json::json;
use tracing::info;

use crate::args::{Cli, Commands, Target};
use crate::json_record::JsonRecord;

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AffixConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Assign {
            target,
            file,
            content_type,
        } => {
            ensure!(file.is_file(), "no such file: {}", file.display());
            let (mut attachment, mut record) = open(&config, &target).await?;

            let mut upload = UploadedFile::from_path(&file);
            if let Some(content_type) = content_type {
                upload = upload.with_content_type(content_type);
            }

            attachment.assign(&mut record, Some(upload)).await?;
            save(&mut attachment, &mut record).await?;
            info!(
                slot = %target.slot,
                url = %attachment.url(&record, None, false),
                "Assigned"
            );
        }
        Commands::Clear { target } => {
            let (mut attachment, mut record) = open(&config, &target).await?;
            attachment.clear(&mut record);
            save(&mut attachment, &mut record).await?;
        }
        Commands::Url {
            target,
            style,
            no_timestamp,
        } => {
            let (attachment, record) = open(&config, &target).await?;
            println!("{}", attachment.url(&record, style.as_deref(), !no_timestamp));
        }
        Commands::Path { target, style } => {
            let (attachment, record) = open(&config, &target).await?;
            println!("{}", attachment.path(&record, style.as_deref()));
        }
        Commands::Reprocess { target } => {
            let (mut attachment, mut record) = open(&config, &target).await?;
            if !attachment.reprocess(&mut record).await? {
                bail!("reprocessing failed: {}", error_summary(&record));
            }
            record.persist().await?;
        }
        Commands::Destroy { target } => {
            let (mut attachment, mut record) = open(&config, &target).await?;
            attachment.destroy(&mut record).await?;
            record.persist().await?;
            info!(slot = %target.slot, "Destroyed");
        }
        Commands::Show { target } => {
            let (attachment, record) = open(&config, &target).await?;
            println!("{}", serde_json::to_string_pretty(&describe(&attachment, &record))?);
        }
    }

    Ok(())
}

async fn open(config: &AffixConfig, target: &Target) -> anyhow::Result<(Attachment, JsonRecord)> {
    let options = AttachmentOptions::from_config(config, &target.slot)
        .with_context(|| format!("configuring slot {}", target.slot))?;
    let attachment = Attachment::new(&target.slot, options)?;

    let mut record = JsonRecord::open(&target.record, &target.model, target.id).await?;
    record.ensure_attachment_columns(&target.slot);

    Ok((attachment, record))
}

async fn save(attachment: &mut Attachment, record: &mut JsonRecord) -> anyhow::Result<()> {
    if !attachment.save(record).await? {
        bail!("validation failed: {}", error_summary(record));
    }
    record.persist().await
}

fn error_summary(record: &JsonRecord) -> String {
    record
        .errors()
        .iter()
        .map(|(attribute, message)| format!("{} {}", attribute, message))
        .collect::<Vec<_>>()
        .join("; ")
}

fn describe(attachment: &Attachment, record: &JsonRecord) -> serde_json::Value {
    let mut styles = vec![ORIGINAL_STYLE.to_string()];
    styles.extend(attachment.styles(record).iter().map(|s| s.name.clone()));

    let urls: BTreeMap<&str, String> = styles
        .iter()
        .map(|style| (style.as_str(), attachment.url(record, Some(style), true)))
        .collect();
    let paths: BTreeMap<&str, String> = styles
        .iter()
        .map(|style| (style.as_str(), attachment.path(record, Some(style))))
        .collect();

    json!({
        "model": record.model_name(),
        "id": record.id(),
        "slot": attachment.name(),
        "file": attachment.file(record),
        "original_filename": attachment.original_filename(record),
        "content_type": attachment.content_type(record),
        "size": attachment.size(record),
        "updated_at": attachment.updated_at(record),
        "fingerprint": attachment.fingerprint(record),
        "urls": urls,
        "paths": paths,
    })
}
