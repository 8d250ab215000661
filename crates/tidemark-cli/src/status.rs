use std::path::Path;

use tidemark_db::ControlRecord;

/// Print control records as a boxed table.
pub fn print_status(records: &[ControlRecord], db_path: &Path) {
    for line in render_status(records, db_path) {
        println!("{line}");
    }
}

fn render_status(records: &[ControlRecord], db_path: &Path) -> Vec<String> {
    let version = env!("CARGO_PKG_VERSION");

    let db_display = match std::env::var("HOME") {
        Ok(home) if !home.is_empty() => db_path.to_string_lossy().replace(&home, "~"),
        _ => db_path.to_string_lossy().to_string(),
    };

    let channel_w = records
        .iter()
        .map(|r| r.channel.chars().count())
        .max()
        .unwrap_or(0)
        .max("Channel".len());
    let version_w = 8;
    // "│ " + channel + 2 + version + 2 + state + "│"
    let width = (channel_w + version_w + 29 + 7).max(db_display.chars().count() + 4);
    let state_w = width - channel_w - version_w - 7;

    let title = format!("tidemark v{version}");
    let title_dashes = width.saturating_sub(title.len() + 7);
    let top = format!("╭─── {title} {}╮", "─".repeat(title_dashes));
    let bottom = format!("╰{}╯", "─".repeat(width - 2));
    let inner = width - 4;

    let row = |channel: &str, version: &str, state: &str| {
        format!("│ {channel:<channel_w$}  {version:>version_w$}  {state:<state_w$}│")
    };

    let mut lines = vec![top];
    lines.push(format!("│ {:<inner$} │", db_display));
    lines.push(format!("│ {} │", "─".repeat(inner)));
    lines.push(row("Channel", "Version", "State"));

    if records.is_empty() {
        lines.push(format!("│ {:<inner$} │", "no channels recorded"));
    }
    for record in records {
        let state = if record.locked {
            match record.locked_at {
                Some(at) => format!("locked {}", at.format("%Y-%m-%d %H:%M:%S")),
                None => "locked".to_string(),
            }
        } else {
            "unlocked".to_string()
        };
        lines.push(row(&record.channel, &record.version.to_string(), &state));
    }

    lines.push(bottom);
    lines
}
