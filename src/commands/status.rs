//! Status and catalog commands: keepalive, keepaliveurl, weburl, cmdlist, wacmds, help.

use super::CommandContext;
use crate::gateway::keepalive::format_uptime;

/// One catalog entry.
struct CommandInfo {
    name: &'static str,
    category: &'static str,
    description: &'static str,
    /// Usage lines; `{p}` is replaced by the command prefix.
    usage: &'static str,
}

const fn info(
    name: &'static str,
    category: &'static str,
    description: &'static str,
    usage: &'static str,
) -> CommandInfo {
    CommandInfo {
        name,
        category,
        description,
        usage,
    }
}

const CATEGORIES: [&str; 5] = ["General", "Media", "Fun", "Image Effects", "Group"];

/// Everything `cmdlist` shows. Only the General commands are handled by this
/// bot; the rest are listed for users coming from the full bot menu.
const CATALOG: &[CommandInfo] = &[
    info(
        "wacheck",
        "General",
        "Check if a phone number is registered on WhatsApp",
        "{p}wacheck [phone number]\nor for bulk checking:\n{p}wacheck\nName1,Number1\nName2,Number2",
    ),
    info(
        "wacheckurl",
        "General",
        "Check WhatsApp numbers from a URL text file",
        "{p}wacheckurl [url_to_text_file]",
    ),
    info("waresume", "General", "Resume an interrupted WhatsApp check process", "{p}waresume"),
    info(
        "wabroadcast",
        "General",
        "Send messages to all saved WhatsApp contacts (owner only)",
        "{p}wabroadcast [optional message, {name} is replaced]",
    ),
    info("wabroadcastresume", "General", "Resume an interrupted broadcast (owner only)", "{p}wabroadcastresume"),
    info(
        "wastop",
        "General",
        "Stop an ongoing check or broadcast",
        "{p}wastop\n{p}wastop clear (also forget saved progress)",
    ),
    info("wabroadcastinfo", "General", "Show statistics about the broadcast process", "{p}wabroadcastinfo"),
    info("walist", "General", "List saved WhatsApp contacts", "{p}walist [csv]"),
    info(
        "wavalidcsv",
        "General",
        "Import contacts from a CSV URL without checking them",
        "{p}wavalidcsv [url_to_csv]",
    ),
    info(
        "thecsv",
        "General",
        "Check every contact in an uploaded CSV file",
        "{p}thecsv, then upload the file",
    ),
    info(
        "csvfile",
        "General",
        "Save an uploaded CSV file on the server",
        "{p}csvfile, then upload the file (or reply to a file with {p}csvfile)",
    ),
    info(
        "castedcsv",
        "General",
        "Check a shared contact, save it, and greet it once",
        "{p}castedcsv with a contact card",
    ),
    info("castbroadcast", "General", "Greet every saved contact not greeted yet (owner only)", "{p}castbroadcast"),
    info("castclear", "General", "Clear the casted contacts database (owner only)", "{p}castclear"),
    info("castexport", "General", "Export the casted contacts database (owner only)", "{p}castexport"),
    info("keepalive", "General", "Show uptime and keepalive statistics", "{p}keepalive"),
    info("keepaliveurl", "General", "Show the URL to ping to keep the bot awake", "{p}keepaliveurl"),
    info("weburl", "General", "Show the web dashboard URL", "{p}weburl"),
    info("cmdlist", "General", "Show this list of all available commands", "{p}cmdlist [category]"),
    info("wacmds", "General", "List the WhatsApp tool commands", "{p}wacmds"),
    info("help", "General", "Get help information about a command", "{p}help [command]"),
    info("sticker", "Media", "Convert image/video to sticker", "{p}sticker"),
    info("toimg", "Media", "Convert sticker to image", "{p}toimg"),
    info("mp3", "Media", "Convert video to audio", "{p}mp3"),
    info("trt", "Media", "Translate text to another language", "{p}trt"),
    info("tts", "Media", "Convert text to speech", "{p}tts"),
    info("yta", "Media", "Download YouTube audio", "{p}yta"),
    info("ytv", "Media", "Download YouTube video", "{p}ytv"),
    info("bully", "Fun", "Send bully reaction animation", "{p}bully"),
    info("cuddle", "Fun", "Send cuddle reaction animation", "{p}cuddle"),
    info("hug", "Fun", "Send hug reaction animation", "{p}hug"),
    info("kiss", "Fun", "Send kiss reaction animation", "{p}kiss"),
    info("slap", "Fun", "Send slap reaction animation", "{p}slap"),
    info("wasted", "Image Effects", "Apply wasted effect to image", "{p}wasted"),
    info("trigger", "Image Effects", "Apply trigger effect to image", "{p}trigger"),
    info("blur", "Image Effects", "Apply blur effect to image", "{p}blur"),
    info("circle", "Image Effects", "Make image circular", "{p}circle"),
    info("jail", "Image Effects", "Put image subject behind bars", "{p}jail"),
    info("invert", "Image Effects", "Invert image colors", "{p}invert"),
    info("add", "Group", "Add a user to a group", "{p}add"),
    info("kick", "Group", "Remove a user from a group", "{p}kick"),
    info("promote", "Group", "Make a user group admin", "{p}promote"),
    info("demote", "Group", "Remove admin status from a user", "{p}demote"),
    info("link", "Group", "Get group invite link", "{p}link"),
    info("tagall", "Group", "Tag all group members", "{p}tagall"),
];

pub(super) fn handle_keepalive(ctx: &CommandContext<'_>) -> String {
    let last = ctx
        .keepalive
        .last_ping()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "Never".to_string());
    let keepalive = &ctx.config.keepalive;
    let state = if keepalive.enabled { "Active" } else { "Disabled" };
    format!(
        "🔄 *KeepAlive Status*\n\n\
         • Status: *{state}*\n\
         • Uptime: *{}*\n\
         • Ping Count: *{}*\n\
         • Last Ping: *{last}*\n\
         • Ping Interval: *Every {} minutes*\n\n\
         The keepalive loop pings the bot's own /ping endpoint so the host doesn't put it to sleep.",
        format_uptime(ctx.uptime.elapsed()),
        ctx.keepalive.count(),
        keepalive.interval_secs / 60,
    )
}

pub(super) fn handle_keepaliveurl(ctx: &CommandContext<'_>) -> String {
    format!(
        "🔗 *KeepAlive URL*\n\n\
         {}/ping\n\n\
         Point an external monitor (UptimeRobot, cron-job.org, ...) at this URL \
         every 5-10 minutes to keep the bot online.",
        ctx.config.api.base_url()
    )
}

pub(super) fn handle_weburl(ctx: &CommandContext<'_>) -> String {
    let base = ctx.config.api.base_url();
    format!(
        "🌐 *Web Dashboard*\n\n\
         • Dashboard: {base}/\n\
         • Status API: {base}/api/status\n\
         • Ping: {base}/ping"
    )
}

pub(super) fn handle_cmdlist(args: &str, prefix: &str) -> String {
    let requested = args.trim();
    if !requested.is_empty() {
        let Some(category) = CATEGORIES
            .iter()
            .find(|c| c.eq_ignore_ascii_case(requested))
        else {
            return format!(
                "❌ Category \"{requested}\" not found.\n\nAvailable categories: {}",
                CATEGORIES.join(", ")
            );
        };
        let mut commands: Vec<&CommandInfo> =
            CATALOG.iter().filter(|c| c.category == *category).collect();
        commands.sort_by_key(|c| c.name);
        let mut out = format!("📋 *{category} Commands*\n\n");
        for (i, cmd) in commands.iter().enumerate() {
            out.push_str(&format!(
                "{}. *{prefix}{}*\n   ↪ {}\n\n",
                i + 1,
                cmd.name,
                cmd.description
            ));
        }
        return out.trim_end().to_string();
    }

    let mut out = format!(
        "📋 *COMMAND LIST*\n\n*Total Commands:* {}\n\n*Available Categories:*\n",
        CATALOG.len()
    );
    for category in CATEGORIES {
        let count = CATALOG.iter().filter(|c| c.category == category).count();
        out.push_str(&format!("• *{category}* ({count} commands)\n"));
    }
    out.push_str(&format!(
        "\n*Usage:*\n\
         • Type *{prefix}cmdlist* to see all categories\n\
         • Type *{prefix}cmdlist [category]* to see commands in a specific category\n\
         • Type *{prefix}help [command]* for detailed help on a specific command"
    ));
    out
}

pub(super) fn handle_wacmds(prefix: &str) -> String {
    let mut out = String::from("📱 *WhatsApp Commands List*\n\n");
    for cmd in CATALOG.iter().filter(|c| c.category == "General") {
        out.push_str(&format!("• *{prefix}{}* - {}\n", cmd.name, cmd.description));
    }
    out.push_str(&format!(
        "\n*Examples:*\n\
         {prefix}wacheck 0712345678\n\
         {prefix}wacheck\nJohn,0712345678\nJane,0787654321\n\
         {prefix}walist csv"
    ));
    out
}

pub(super) fn handle_help(args: &str, prefix: &str) -> String {
    let Some(word) = args.split_whitespace().next() else {
        return format!(
            "Please specify a command to get help for.\n\n\
             Example: *{prefix}help wacheck*\n\n\
             Or use *{prefix}cmdlist* to see all available commands."
        );
    };
    let name = word.strip_prefix(prefix).unwrap_or(word).to_ascii_lowercase();
    match CATALOG.iter().find(|c| c.name == name) {
        Some(cmd) => format!(
            "📖 *Help: {}*\n\n*Description:*\n{}\n\n*Usage:*\n{}",
            cmd.name,
            cmd.description,
            cmd.usage.replace("{p}", prefix)
        ),
        None => format!(
            "❌ Help information for \"{name}\" is not available.\n\n\
             Use *{prefix}cmdlist* to see all available commands."
        ),
    }
}
