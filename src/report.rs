//! Console rendering: the per-record table, run banners, and the closing
//! summary. Everything here is cosmetic; the log file carries the detail.

use colored::{Color, Colorize};

use crate::config;
use crate::extract::ExtractedRecord;
use crate::scan::{Mode, ScanReport, StopReason};

/// Field order for the record table.
const DISPLAY_ORDER: &[&str] = &[
    config::FIELD_RMA,
    config::FIELD_CLIENT,
    config::FIELD_PHONE,
    config::FIELD_DEVICE_TYPE,
    config::FIELD_MANUFACTURER,
    config::FIELD_MODEL,
    config::FIELD_SERIAL,
    config::FIELD_DEFECT,
    config::FIELD_CONDITION,
    config::FIELD_TECHNICIAN,
    config::FIELD_NOTES,
    config::FIELD_URL,
];

const NAME_WIDTH: usize = 28;
const VALUE_WIDTH: usize = 66;

fn field_color(name: &str) -> Color {
    match name {
        config::FIELD_RMA => Color::Cyan,
        config::FIELD_CLIENT | config::FIELD_URL => Color::BrightBlue,
        config::FIELD_PHONE => Color::BrightCyan,
        config::FIELD_DEVICE_TYPE => Color::Green,
        config::FIELD_MANUFACTURER | config::FIELD_MODEL | config::FIELD_TECHNICIAN => {
            Color::BrightGreen
        }
        config::FIELD_SERIAL => Color::Magenta,
        config::FIELD_DEFECT | config::FIELD_CONDITION => Color::Yellow,
        config::FIELD_NOTES => Color::BrightMagenta,
        _ => Color::White,
    }
}

pub fn print_banner(mode: Mode, start: u32) {
    match mode {
        Mode::Full => {
            println!("{}", "== Full scan: CRM → Notion ==".bright_blue().bold());
            println!("Starting from RMA {}", start.to_string().cyan());
        }
        Mode::Single(rma) => {
            println!(
                "{}",
                format!("== Single order: RMA {rma} ==").bright_blue().bold()
            );
        }
    }
    println!(
        "{}",
        chrono::Local::now()
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
}

pub fn print_record(record: &ExtractedRecord) {
    for name in DISPLAY_ORDER {
        let value = record.get(name).unwrap_or("-");
        let color = field_color(name);
        // Pad before coloring; escape codes would otherwise eat the width.
        let label = format!("{:<width$}", name, width = NAME_WIDTH);
        let mut lines = wrap(value, VALUE_WIDTH).into_iter();
        if let Some(first) = lines.next() {
            println!("  {} {first}", label.color(color).bold());
        }
        for continuation in lines {
            println!("  {:<width$} {continuation}", "", width = NAME_WIDTH);
        }
    }
}

pub fn print_summary(report: &ScanReport) {
    println!();
    match report.reason {
        StopReason::OrderMissing => println!(
            "Scan complete: RMA {} was the first missing order.",
            report.stopped_at
        ),
        StopReason::PageUnavailable => println!(
            "{}",
            format!(
                "Scan stopped early: RMA {} would not load. Rerun to pick up from the same place.",
                report.stopped_at
            )
            .yellow()
        ),
        StopReason::Completed => println!("Requested order processed."),
    }
    let count = format!("{}", report.synced);
    println!(
        "Synced {} record(s), RMA {} through {}.",
        count.green().bold(),
        report.started_at,
        report.stopped_at
    );
}

/// Word wrap with hard cuts for unbreakable runs such as URLs.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    let mut len = 0usize;
    for word in text.split_whitespace() {
        for piece in chunk(word, width) {
            let piece_len = piece.chars().count();
            if len > 0 && len + 1 + piece_len > width {
                lines.push(std::mem::take(&mut line));
                len = 0;
            }
            if len > 0 {
                line.push(' ');
                len += 1;
            }
            line.push_str(&piece);
            len += piece_len;
        }
    }
    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

fn chunk(word: &str, width: usize) -> Vec<String> {
    if word.chars().count() <= width {
        return vec![word.to_string()];
    }
    word.chars()
        .collect::<Vec<_>>()
        .chunks(width)
        .map(|c| c.iter().collect())
        .collect()
}
