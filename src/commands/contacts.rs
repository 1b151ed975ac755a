//! Contact list commands: walist, wavalidcsv, thecsv, csvfile.

use chrono::Utc;
use std::path::PathBuf;
use tracing::{info, warn};
use wacast_core::{
    contacts::{self, ContactRow, RejectedRow},
    csv_codec,
    error::WacastError,
    message::{Attachment, Document},
    phone,
};

use super::{describe_error, download, CommandContext};
use crate::gateway::uploads::chat_of;

/// Longest list shown inline by `walist`.
const LIST_LIMIT: usize = 200;

pub(super) async fn handle_walist(ctx: &CommandContext<'_>) -> String {
    let contacts = ctx.runner.ledger().load().verified_contacts();
    if contacts.is_empty() {
        return format!(
            "📭 No verified contacts yet. Use *{}wacheck* first.",
            ctx.prefix()
        );
    }

    if ctx.args().eq_ignore_ascii_case("csv") {
        let rows = contacts.iter().map(|(name, key)| vec![name.as_str(), key.as_str()]);
        let bytes = match csv_codec::encode(&["Name", "Phone Number"], rows) {
            Ok(b) => b,
            Err(e) => return describe_error(&e, ctx.prefix()),
        };
        let caption = format!("📋 {} verified WhatsApp contacts", contacts.len());
        return match ctx
            .send_document(Document::csv("whatsapp_contacts.csv", &caption, bytes))
            .await
        {
            Ok(()) => String::new(),
            Err(e) => describe_error(&e, ctx.prefix()),
        };
    }

    let mut out = format!("📋 *Verified contacts* ({})\n\n", contacts.len());
    for (i, (name, key)) in contacts.iter().take(LIST_LIMIT).enumerate() {
        if name == key {
            out.push_str(&format!("{}. {key}\n", i + 1));
        } else {
            out.push_str(&format!("{}. {name}: {key}\n", i + 1));
        }
    }
    if contacts.len() > LIST_LIMIT {
        out.push_str(&format!(
            "\n…and {} more. Use *{}walist csv* for the full list.",
            contacts.len() - LIST_LIMIT,
            ctx.prefix()
        ));
    }
    out
}

pub(super) async fn handle_wavalidcsv(ctx: &CommandContext<'_>) -> String {
    let url = ctx.args();
    if url.is_empty() {
        return format!(
            "Please provide a URL to a CSV file containing contacts.\n\n\
             Example: *{}wavalidcsv https://example.com/contacts.csv*\n\n\
             The CSV file should have columns for name and phone number.",
            ctx.prefix()
        );
    }
    ctx.say(format!(
        "📥 Downloading contacts from CSV URL:\n{url}\n\n\
         This will add all contacts directly without WhatsApp validation."
    ))
    .await;

    let body = match download(ctx.http, url, ctx.config.uploads.max_download_bytes).await {
        Ok(b) => b,
        Err(e) => return describe_error(&e, ctx.prefix()),
    };
    if body.iter().all(u8::is_ascii_whitespace) {
        return "❌ The downloaded file is empty or invalid.".to_string();
    }
    let extraction = match contacts::extract_from_csv(&body, ctx.normalizer) {
        Ok(x) => x,
        Err(e) => return describe_error(&e, ctx.prefix()),
    };
    if extraction.valid.is_empty() {
        return "❌ No valid contacts found in the CSV file. Please check the file format."
            .to_string();
    }

    let mut added = 0usize;
    let result = ctx.runner.ledger().update(|ledger| {
        for row in &extraction.valid {
            if !ledger.is_verified(&row.key) {
                added += 1;
            }
            ledger.mark_verified(&row.key, &row.name);
        }
    });
    if let Err(e) = result {
        return describe_error(&e, ctx.prefix());
    }
    info!("wavalidcsv: imported {added} new contacts");

    format!(
        "📊 *CSV Import Complete*\n\n\
         • Valid contacts: *{}*\n\
         • Newly added: *{added}*\n\
         • Already saved: *{}*\n\
         • Invalid rows: *{}*\n\n\
         _All valid contacts have been saved for broadcast messages._",
        extraction.valid.len(),
        extraction.valid.len() - added,
        extraction.invalid.len(),
    )
}

/// A CSV carried by the command message itself or by the message it quotes.
fn attached_csv(ctx: &CommandContext<'_>) -> Option<Attachment> {
    ctx.message
        .document()
        .filter(|d| d.is_csv())
        .or(ctx.message.quoted.as_ref().filter(|d| d.is_csv()))
        .cloned()
}

/// Use an attached CSV or wait for the user to upload one.
async fn obtain_csv(ctx: &CommandContext<'_>, prompt: &str) -> Result<Attachment, String> {
    if let Some(file) = attached_csv(ctx) {
        return Ok(file);
    }
    let mut sub = ctx
        .uploads
        .subscribe(chat_of(ctx.message))
        .map_err(|e| describe_error(&e, ctx.prefix()))?;
    ctx.say(prompt).await;
    match sub.wait(ctx.upload_timeout()).await {
        Some(file) => {
            sub.finish();
            Ok(file)
        }
        None => Err(format!(
            "⏱️ No file received within {} minutes. Please try again.",
            ctx.config.uploads.timeout_secs / 60
        )),
    }
}

/// A rejected row for the invalid-contacts report.
struct Invalid {
    row: usize,
    name: String,
    number: String,
    reason: String,
}

impl From<RejectedRow> for Invalid {
    fn from(r: RejectedRow) -> Self {
        Self {
            row: r.row,
            name: r.name,
            number: r.raw,
            reason: r.reason,
        }
    }
}

pub(super) async fn handle_thecsv(ctx: &CommandContext<'_>) -> String {
    let file = match obtain_csv(
        ctx,
        "Please send a contacts.csv file. I will process it and extract valid contacts.",
    )
    .await
    {
        Ok(f) => f,
        Err(reply) => return reply,
    };
    let Some(data) = file.data else {
        return "❌ Could not download the file. Please send it again.".to_string();
    };
    ctx.say("📄 CSV file received! Processing contacts...").await;

    let extraction = match contacts::extract_from_csv(&data, ctx.normalizer) {
        Ok(x) => x,
        Err(e) => return describe_error(&e, ctx.prefix()),
    };
    let mut invalid: Vec<Invalid> = extraction.invalid.into_iter().map(Invalid::from).collect();
    let mut valid: Vec<ContactRow> = Vec::new();

    for (i, row) in extraction.valid.into_iter().enumerate() {
        let check = tokio::time::timeout(
            ctx.item_timeout(),
            ctx.messenger.check_exists(&phone::jid(&row.key)),
        )
        .await;
        let reason = match check {
            Ok(Ok(e)) if e.exists => None,
            Ok(Ok(_)) => Some("Not registered on WhatsApp"),
            Ok(Err(e)) => {
                warn!("thecsv: check failed for {}: {e}", row.key);
                Some("Error checking number")
            }
            Err(_) => Some("Error checking number"),
        };
        match reason {
            None => valid.push(row),
            Some(reason) => invalid.push(Invalid {
                row: i + 1,
                name: row.name,
                number: row.key,
                reason: reason.to_string(),
            }),
        }
    }
    invalid.sort_by_key(|r| r.row);

    if let Err(e) = ctx.runner.ledger().update(|ledger| {
        for row in &valid {
            ledger.mark_verified(&row.key, &row.name);
        }
    }) {
        warn!("thecsv: ledger update failed: {e}");
    }

    ctx.say(format!(
        "📊 *CSV Processing Complete*\n\n\
         ✅ Valid Contacts: *{}*\n\
         ❌ Invalid Contacts: *{}*",
        valid.len(),
        invalid.len()
    ))
    .await;

    if let Err(e) = send_reports(ctx, &valid, &invalid).await {
        return describe_error(&e, ctx.prefix());
    }
    String::new()
}

async fn send_reports(
    ctx: &CommandContext<'_>,
    valid: &[ContactRow],
    invalid: &[Invalid],
) -> Result<(), WacastError> {
    if !valid.is_empty() {
        let rows = valid.iter().map(|r| vec![r.name.as_str(), r.key.as_str()]);
        let bytes = csv_codec::encode(&["Name", "Phone Number"], rows)?;
        let caption = format!("✅ {} valid WhatsApp contacts", valid.len());
        ctx.send_document(Document::csv("valid_contacts.csv", &caption, bytes))
            .await?;
    }
    if !invalid.is_empty() {
        let rows = invalid.iter().map(|r| {
            vec![
                r.row.to_string(),
                r.name.clone(),
                r.number.clone(),
                r.reason.clone(),
            ]
        });
        let bytes = csv_codec::encode(&["Row", "Name", "Phone Number", "Reason"], rows)?;
        let caption = format!("❌ {} invalid or non-WhatsApp contacts", invalid.len());
        ctx.send_document(Document::csv("invalid_contacts.csv", &caption, bytes))
            .await?;
    }
    Ok(())
}

/// Keep letters, digits, `.`, `-`, `_`; everything else becomes `_`.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    let cleaned = if cleaned.is_empty() { "upload" } else { cleaned };
    if cleaned.to_ascii_lowercase().ends_with(".csv") {
        cleaned.to_string()
    } else {
        format!("{cleaned}.csv")
    }
}

/// `uploads/YYYY-MM-DD/{millis}_{name}` relative to the data dir.
fn upload_path(original: &str) -> PathBuf {
    let now = Utc::now();
    PathBuf::from("uploads")
        .join(now.format("%Y-%m-%d").to_string())
        .join(format!(
            "{}_{}",
            now.timestamp_millis(),
            sanitize_filename(original)
        ))
}

pub(super) async fn handle_csvfile(ctx: &CommandContext<'_>) -> String {
    let file = match obtain_csv(
        ctx,
        "📋 *CSV File Storage*\n\nPlease upload your CSV file now, and I'll save it for you.",
    )
    .await
    {
        Ok(f) => f,
        Err(reply) => return reply,
    };
    let Some(data) = file.data.as_deref() else {
        return "❌ Could not download the file. Please send it again.".to_string();
    };

    let name = file.filename.as_deref().unwrap_or("upload.csv");
    let relative = upload_path(name);
    let full = ctx.data_dir.join(&relative);
    let saved = async {
        if let Some(dir) = full.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&full, data).await
    }
    .await;
    if let Err(e) = saved {
        return format!("❌ Error saving file: {e}\n\nPlease try again.");
    }
    info!("csvfile: saved {}", full.display());

    format!(
        "✅ File saved successfully!\n\n\
         *File Details:*\n\
         • *Name:* {}\n\
         • *Size:* {:.2} KB\n\
         • *Path:* {}",
        relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        data.len() as f64 / 1024.0,
        relative.display()
    )
}
