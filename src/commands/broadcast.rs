//! Broadcast commands: wabroadcast, wabroadcastresume, wastop, wabroadcastinfo.

use wacast_jobs::{ops::BroadcastMessage, JobKind, WorkItem};

use super::{capitalize, describe_error, format_duration, CommandContext};

pub(super) fn handle_wabroadcast(ctx: &CommandContext<'_>) -> String {
    let template = match ctx.args() {
        "" => ctx.config.broadcast.message.clone(),
        custom => custom.to_string(),
    };
    let items: Vec<WorkItem> = ctx
        .runner
        .ledger()
        .load()
        .pending_notification()
        .into_iter()
        .map(|(name, key)| WorkItem::new(name, key))
        .collect();
    if items.is_empty() {
        return format!(
            "ℹ️ No verified contacts are waiting for a message.\n\n\
             Use *{}wacheck* to verify numbers first.",
            ctx.prefix()
        );
    }
    start_broadcast(ctx, items, template, false)
}

/// Start a broadcast job. `cast` also flags recipients as greeted in the cast book.
pub(super) fn start_broadcast(
    ctx: &CommandContext<'_>,
    items: Vec<WorkItem>,
    template: String,
    cast: bool,
) -> String {
    let total = items.len();
    let mut op = BroadcastMessage::new(ctx.messenger.clone(), template.clone())
        .with_progress(ctx.progress_sink());
    if cast {
        op = op.with_cast_book(ctx.cast_book.clone());
    }
    match ctx
        .runner
        .prepare_start(JobKind::BroadcastMessage, items, Some(template))
    {
        Ok((lease, checkpoint)) => {
            ctx.spawn_job(lease, checkpoint, Box::new(op));
            format!(
                "📢 Broadcasting to *{total}* contacts. Estimated time: about {}.\n\n\
                 Use *{p}wastop* to pause and *{p}wabroadcastresume* to continue.",
                format_duration(ctx.runner.config().estimate(total)),
                p = ctx.prefix()
            )
        }
        Err(e) => describe_error(&e, ctx.prefix()),
    }
}

pub(super) fn handle_wabroadcastresume(ctx: &CommandContext<'_>) -> String {
    match ctx.runner.prepare_resume(JobKind::BroadcastMessage) {
        Ok((lease, checkpoint)) => {
            let template = checkpoint
                .message
                .clone()
                .unwrap_or_else(|| ctx.config.broadcast.message.clone());
            let (at, total) = (checkpoint.current_index, checkpoint.items.len());
            // Cast contacts among the recipients get their sent flag either way.
            let op = BroadcastMessage::new(ctx.messenger.clone(), template)
                .with_cast_book(ctx.cast_book.clone())
                .with_progress(ctx.progress_sink());
            ctx.spawn_job(lease, checkpoint, Box::new(op));
            format!("▶️ Resuming broadcast at {at}/{total}.")
        }
        Err(e) => describe_error(&e, ctx.prefix()),
    }
}

pub(super) fn handle_wastop(ctx: &CommandContext<'_>) -> String {
    let stopped = ctx.runner.registry().stop_all();
    if ctx.args().eq_ignore_ascii_case("clear") {
        return clear_saved_jobs(ctx, &stopped);
    }
    if stopped.is_empty() {
        return "ℹ️ No job is running.".to_string();
    }
    let names: Vec<&str> = stopped.iter().map(|k| k.label()).collect();
    format!(
        "⏹️ Stopping: {}.\n\nProgress is saved. Use *{p}waresume* or *{p}wabroadcastresume* to continue.",
        names.join(", "),
        p = ctx.prefix()
    )
}

/// `wastop clear`: forget saved progress. Only clears once no job is running,
/// since a stopping runner writes its checkpoint one last time.
fn clear_saved_jobs(ctx: &CommandContext<'_>, stopped: &[JobKind]) -> String {
    if !stopped.is_empty() {
        return format!(
            "⏹️ Stopping running jobs first. Send *{}wastop clear* again once they report back.",
            ctx.prefix()
        );
    }
    for kind in JobKind::ALL {
        if let Err(e) = ctx.runner.checkpoints().clear(kind) {
            return describe_error(&e, ctx.prefix());
        }
    }
    "🗑️ Saved job progress cleared. Contacts and send history are kept.".to_string()
}

pub(super) fn handle_wabroadcastinfo(ctx: &CommandContext<'_>) -> String {
    let ledger = ctx.runner.ledger().load();
    let pending = ledger.pending_notification().len();
    let cfg = ctx.runner.config();

    let mut out = format!(
        "📊 *Broadcast Info*\n\n\
         • Verified contacts: *{}*\n\
         • Already messaged: *{}*\n\
         • Waiting for a message: *{pending}*\n\
         • Not on WhatsApp: *{}*\n\
         • Delay between messages: *{}–{}s*\n\
         • Estimated time for the rest: *{}*",
        ledger.verified_set.len(),
        ledger.notified_set.len(),
        ledger.rejected_set.len(),
        cfg.min_delay.as_secs(),
        cfg.max_delay.as_secs(),
        format_duration(cfg.estimate(pending)),
    );

    for kind in JobKind::ALL {
        let running = ctx.runner.registry().is_running(kind);
        match ctx.runner.checkpoints().load(kind) {
            Some(cp) if cp.is_resumable() => out.push_str(&format!(
                "\n\n{} {}: {}/{} done{}",
                if running { "🟢" } else { "⏸️" },
                capitalize(kind.label()),
                cp.current_index,
                cp.items.len(),
                if running { "" } else { " (saved, can resume)" }
            )),
            _ if running => out.push_str(&format!("\n\n🟢 {}: running", capitalize(kind.label()))),
            _ => {}
        }
    }
    out
}
