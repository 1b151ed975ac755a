//! Registration checks: wacheck, wacheckurl, waresume.

use std::collections::HashSet;
use tracing::info;
use wacast_core::{
    contacts::{self, ContactRow},
    phone,
};
use wacast_jobs::{ops::VerifyNumbers, JobKind, WorkItem};

use super::{describe_error, download, format_duration, CommandContext};

pub(super) async fn handle_wacheck(ctx: &CommandContext<'_>) -> String {
    let args = ctx.args();
    let p = ctx.prefix();
    if args.is_empty() {
        return format!(
            "Please provide a number or a list of contacts.\n\n\
             *Single:* {p}wacheck 0712345678\n\
             *Bulk:*\n{p}wacheck\nJohn,0712345678\nJane,0787654321"
        );
    }
    if args.contains('\n') || args.contains(',') {
        let extraction = contacts::parse_lines(args, ctx.normalizer);
        return start_verify(ctx, extraction.valid, extraction.invalid.len());
    }
    check_single(ctx, args).await
}

/// Check one number right away and record the outcome.
async fn check_single(ctx: &CommandContext<'_>, raw: &str) -> String {
    let Some(key) = ctx.normalizer.normalize(raw) else {
        return format!("❌ Invalid phone number: {raw}");
    };
    let jid = phone::jid(&key);
    let checked = tokio::time::timeout(ctx.item_timeout(), ctx.messenger.check_exists(&jid)).await;
    let existence = match checked {
        Ok(Ok(existence)) => existence,
        Ok(Err(e)) => return format!("⚠️ Could not check *{key}*: {e}"),
        Err(_) => return format!("⚠️ Could not check *{key}*: timed out"),
    };

    let recorded = ctx.runner.ledger().update(|ledger| {
        if existence.exists {
            ledger.mark_verified(&key, &key);
        } else {
            ledger.mark_rejected(&key, &key);
        }
    });
    if let Err(e) = recorded {
        tracing::warn!("wacheck: ledger update failed for {key}: {e}");
    }

    if existence.exists {
        format!("✅ *{key}* is registered on WhatsApp.")
    } else {
        format!("❌ *{key}* is not registered on WhatsApp.")
    }
}

/// Drop repeated numbers, keeping the first name seen.
fn dedupe(rows: Vec<ContactRow>) -> Vec<WorkItem> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|r| seen.insert(r.key.clone()))
        .map(|r| WorkItem::new(r.name, r.key))
        .collect()
}

/// Start a background verify job over `rows`.
pub(super) fn start_verify(ctx: &CommandContext<'_>, rows: Vec<ContactRow>, invalid: usize) -> String {
    let items = dedupe(rows);
    if items.is_empty() {
        return format!("❌ No valid phone numbers found ({invalid} invalid).");
    }
    let total = items.len();
    let op = VerifyNumbers::new(ctx.messenger.clone()).with_progress(ctx.progress_sink());
    match ctx
        .runner
        .prepare_start(JobKind::VerifyNumbers, items, None)
    {
        Ok((lease, checkpoint)) => {
            info!("wacheck: verifying {total} numbers for {}", ctx.message.sender_id);
            ctx.spawn_job(lease, checkpoint, Box::new(op));
            let mut out = format!(
                "🔍 Checking *{total}* numbers. This can take up to {}.",
                format_duration(ctx.runner.config().estimate(total))
            );
            if invalid > 0 {
                out.push_str(&format!("\n⚠️ Skipped {invalid} invalid entries."));
            }
            out.push_str(&format!(
                "\n\nUse *{p}wastop* to pause and *{p}waresume* to continue.",
                p = ctx.prefix()
            ));
            out
        }
        Err(e) => describe_error(&e, ctx.prefix()),
    }
}

pub(super) async fn handle_wacheckurl(ctx: &CommandContext<'_>) -> String {
    let url = ctx.args();
    if url.is_empty() {
        return format!(
            "Please provide a URL to a text file with one contact per line.\n\n\
             Example: *{}wacheckurl https://example.com/contacts.txt*",
            ctx.prefix()
        );
    }
    ctx.say(format!("📥 Downloading contacts from:\n{url}")).await;
    let body = match download(ctx.http, url, ctx.config.uploads.max_download_bytes).await {
        Ok(b) => b,
        Err(e) => return describe_error(&e, ctx.prefix()),
    };
    let text = String::from_utf8_lossy(&body);
    let extraction = contacts::parse_lines(&text, ctx.normalizer);
    start_verify(ctx, extraction.valid, extraction.invalid.len())
}

pub(super) fn handle_waresume(ctx: &CommandContext<'_>) -> String {
    match ctx.runner.prepare_resume(JobKind::VerifyNumbers) {
        Ok((lease, checkpoint)) => {
            let (at, total) = (checkpoint.current_index, checkpoint.items.len());
            let op = VerifyNumbers::new(ctx.messenger.clone()).with_progress(ctx.progress_sink());
            ctx.spawn_job(lease, checkpoint, Box::new(op));
            format!("▶️ Resuming number check at {at}/{total}.")
        }
        Err(e) => describe_error(&e, ctx.prefix()),
    }
}
