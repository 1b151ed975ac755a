//! Cast book commands: castedcsv, castbroadcast, castclear, castexport.

use tracing::warn;
use wacast_core::{message::Document, phone};
use wacast_jobs::{
    cast::{CastEntry, Upsert},
    ops::render_template,
};

use super::{broadcast::start_broadcast, describe_error, CommandContext};

/// How `castedcsv` resolved the shared contact.
enum CardResult {
    Greeted,
    AlreadyGreeted,
    GreetingFailed(String),
    NotRegistered,
    CheckFailed(String),
}

pub(super) async fn handle_castedcsv(ctx: &CommandContext<'_>) -> String {
    let Some(card) = ctx.message.contact.as_ref() else {
        return cast_status(ctx);
    };
    let name = card.name().unwrap_or_else(|| "Unknown".to_string());
    let Some(key) = card
        .phone_digits()
        .and_then(|digits| ctx.normalizer.normalize(&digits))
    else {
        return "❌ Could not extract a valid phone number from this contact.".to_string();
    };
    ctx.say(format!(
        "🔍 Processing contact: *{name}* with number *{key}*..."
    ))
    .await;

    let (header, status, message, note) = match process_card(ctx, &name, &key).await {
        CardResult::Greeted => ("✅ *Contact Processed*", "Registered", "Sent".to_string(), None),
        CardResult::AlreadyGreeted => (
            "✅ *Contact Processed*",
            "Registered",
            "Already Sent Previously".to_string(),
            None,
        ),
        CardResult::GreetingFailed(e) => (
            "⚠️ *Contact Processed*",
            "Registered",
            "Failed".to_string(),
            Some(e),
        ),
        CardResult::NotRegistered => (
            "⚠️ *Contact Processed*",
            "Not Registered",
            "Not Sent".to_string(),
            None,
        ),
        CardResult::CheckFailed(e) => (
            "⚠️ *Contact Partially Processed*",
            "Error Checking",
            "Not Sent".to_string(),
            Some(e),
        ),
    };
    let mut out = format!(
        "{header}\n\n\
         • Name: *{name}*\n\
         • Number: *{key}*\n\
         • WhatsApp Status: *{status}*\n\
         • Message: *{message}*\n\n\
         Contact saved to the cast book."
    );
    if let Some(note) = note {
        out.push_str(&format!("\n\n_{note}_"));
    }
    out
}

async fn process_card(ctx: &CommandContext<'_>, name: &str, key: &str) -> CardResult {
    let jid = phone::jid(key);
    let checked = tokio::time::timeout(ctx.item_timeout(), ctx.messenger.check_exists(&jid)).await;
    let exists = match checked {
        Ok(Ok(e)) => e.exists,
        Ok(Err(e)) => {
            save_entry(ctx, name, key, false);
            return CardResult::CheckFailed(e.to_string());
        }
        Err(_) => {
            save_entry(ctx, name, key, false);
            return CardResult::CheckFailed("check timed out".into());
        }
    };

    let ledger = ctx.runner.ledger().update(|l| {
        if exists {
            l.mark_verified(key, name);
        } else {
            l.mark_rejected(key, name);
        }
    });
    let already_notified = match ledger {
        Ok(l) => l.is_notified(key),
        Err(e) => {
            warn!("castedcsv: ledger update failed for {key}: {e}");
            false
        }
    };

    let previous = save_entry(ctx, name, key, exists);
    if !exists {
        return CardResult::NotRegistered;
    }

    let sent_before = matches!(previous, Some(Upsert::Existing(ref e)) if e.message_sent);
    if sent_before || already_notified {
        mark_sent(ctx, key);
        return CardResult::AlreadyGreeted;
    }

    let text = render_template(&ctx.config.broadcast.greeting, name);
    if let Err(e) = ctx.messenger.send_typing(&jid).await {
        tracing::debug!("castedcsv: typing indicator failed: {e}");
    }
    match ctx.messenger.send_text(&jid, &text).await {
        Ok(()) => {
            mark_sent(ctx, key);
            CardResult::Greeted
        }
        Err(e) => CardResult::GreetingFailed(e.to_string()),
    }
}

fn save_entry(ctx: &CommandContext<'_>, name: &str, key: &str, registered: bool) -> Option<Upsert> {
    let entry = CastEntry {
        name: name.to_string(),
        key: key.to_string(),
        registered,
        message_sent: false,
    };
    match ctx.cast_book.upsert(entry) {
        Ok(u) => Some(u),
        Err(e) => {
            warn!("castedcsv: cast book write failed for {key}: {e}");
            None
        }
    }
}

/// Record the greeting in both the cast book and the ledger.
fn mark_sent(ctx: &CommandContext<'_>, key: &str) {
    if let Err(e) = ctx.cast_book.mark_sent(key) {
        warn!("castedcsv: cast book update failed for {key}: {e}");
    }
    if let Err(e) = ctx.runner.ledger().update(|l| l.mark_notified(key)) {
        warn!("castedcsv: ledger update failed for {key}: {e}");
    }
}

fn cast_status(ctx: &CommandContext<'_>) -> String {
    match ctx.cast_book.entries() {
        Ok(entries) if entries.is_empty() => {
            "📊 *Contact Casting Status*\n\nNo contacts have been saved yet.\n\n\
             To use this feature, send a contact card with this command."
                .to_string()
        }
        Ok(entries) => {
            let registered = entries.iter().filter(|e| e.registered).count();
            let greeted = entries.iter().filter(|e| e.message_sent).count();
            format!(
                "📊 *Contact Casting Status*\n\n\
                 • Total contacts saved: *{}*\n\
                 • Registered: *{registered}*\n\
                 • Greeted: *{greeted}*\n\n\
                 To add more contacts, send a contact card with this command.",
                entries.len()
            )
        }
        Err(e) => describe_error(&e, ctx.prefix()),
    }
}

pub(super) fn handle_castbroadcast(ctx: &CommandContext<'_>) -> String {
    let pending = match ctx.cast_book.pending() {
        Ok(p) => p,
        Err(e) => return describe_error(&e, ctx.prefix()),
    };
    // Contacts already messaged by a regular broadcast would be skipped by
    // the job anyway; catch their cast flag up here instead.
    let ledger = ctx.runner.ledger().load();
    let (notified, pending): (Vec<_>, Vec<_>) = pending
        .into_iter()
        .partition(|item| ledger.is_notified(&item.normalized_key));
    for item in &notified {
        if let Err(e) = ctx.cast_book.mark_sent(&item.normalized_key) {
            warn!("castbroadcast: cast book update failed for {}: {e}", item.normalized_key);
        }
    }
    if pending.is_empty() {
        let mut out = format!(
            "❌ No registered contacts are waiting for a greeting. \
             Use *{}castedcsv* with a contact card to add one first.",
            ctx.prefix()
        );
        if !notified.is_empty() {
            out.push_str(&format!(
                "\n\n_{} contact(s) had already been messaged and were marked as greeted._",
                notified.len()
            ));
        }
        return out;
    }
    start_broadcast(ctx, pending, ctx.config.broadcast.greeting.clone(), true)
}

pub(super) fn handle_castclear(ctx: &CommandContext<'_>) -> String {
    match ctx.cast_book.clear() {
        Ok(()) => "✅ The casted contacts database has been cleared.".to_string(),
        Err(e) => describe_error(&e, ctx.prefix()),
    }
}

pub(super) async fn handle_castexport(ctx: &CommandContext<'_>) -> String {
    let count = match ctx.cast_book.entries() {
        Ok(entries) => entries.len(),
        Err(e) => return describe_error(&e, ctx.prefix()),
    };
    if count == 0 {
        return "⚠️ No contacts in the database.".to_string();
    }
    let bytes = match ctx.cast_book.export() {
        Ok(b) => b,
        Err(e) => return describe_error(&e, ctx.prefix()),
    };
    let caption = format!("📊 Casted contacts database ({count} contacts)");
    match ctx
        .send_document(Document::csv("casted_contacts.csv", &caption, bytes))
        .await
    {
        Ok(()) => String::new(),
        Err(e) => describe_error(&e, ctx.prefix()),
    }
}
