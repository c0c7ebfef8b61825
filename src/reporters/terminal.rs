use crate::types::{AuthorEntry, Report, SelectionMode};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, CellAlignment, Color, Table};

const BAR_WIDTH: usize = 40;

pub fn report_terminal(report: &Report) {
    eprintln!();
    println!(
        "{} — {} ({} files, {})",
        "⚖ git-guilt".magenta().bold(),
        report.meta.selection.describe().bright_black(),
        report.meta.file_count.to_string().bright_black(),
        repo_name(&report.meta.repo_path).bright_black(),
    );
    println!();

    if report.authors.is_empty() {
        let msg = if report.meta.selection.is_range() {
            "  No change in blame between these revisions."
        } else {
            "  Nothing to blame at this revision."
        };
        println!("{}", msg.yellow());
        println!();
        return;
    }

    let table = match &report.meta.selection {
        SelectionMode::At { .. } => snapshot_table(&report.authors, report.meta.total),
        SelectionMode::Range { .. } => delta_table(&report.authors),
    };
    println!("{table}");

    if report.meta.selection.is_range() {
        println!(
            "  {} {}",
            "net:".bright_black(),
            signed(report.meta.total).bold(),
        );
    } else {
        println!(
            "  {} {}",
            "total lines:".bright_black(),
            report.meta.total.to_string().bold(),
        );
    }
    println!();
}

// ─── Tables ───────────────────────────────────────────────────────────────────

fn snapshot_table(authors: &[AuthorEntry], total: i64) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["AUTHOR", "LINES", "SHARE", ""]);

    let max = authors.iter().map(|e| e.lines.abs()).max().unwrap_or(0);
    for entry in authors {
        let share = if total > 0 { entry.lines as f64 / total as f64 * 100.0 } else { 0.0 };
        table.add_row(vec![
            Cell::new(&entry.author),
            Cell::new(entry.lines).set_alignment(CellAlignment::Right),
            Cell::new(format!("{share:5.1}%")).set_alignment(CellAlignment::Right),
            Cell::new(bar('█', entry.lines, max)).fg(Color::Cyan),
        ]);
    }
    table
}

fn delta_table(authors: &[AuthorEntry]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["AUTHOR", "CHANGE", ""]);

    let max = authors.iter().map(|e| e.lines.abs()).max().unwrap_or(0);
    for entry in authors {
        // Plain text + cell colour, so comfy-table measures visible width.
        let (change, graph) = if entry.lines >= 0 {
            (
                Cell::new(format!("+{}", entry.lines)).fg(Color::Green).add_attribute(Attribute::Bold),
                Cell::new(bar('+', entry.lines, max)).fg(Color::Green),
            )
        } else {
            (
                Cell::new(entry.lines).fg(Color::Red).add_attribute(Attribute::Bold),
                Cell::new(bar('-', entry.lines, max)).fg(Color::Red),
            )
        };
        table.add_row(vec![
            Cell::new(&entry.author),
            change.set_alignment(CellAlignment::Right),
            graph,
        ]);
    }
    table
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// `|value|` scaled against `max` into at most [`BAR_WIDTH`] glyphs. Any
/// non-zero value gets at least one.
fn bar(glyph: char, value: i64, max: i64) -> String {
    let value = value.unsigned_abs() as usize;
    let max = max.unsigned_abs() as usize;
    if value == 0 || max == 0 {
        return String::new();
    }
    let len = if max <= BAR_WIDTH { value } else { (value * BAR_WIDTH / max).max(1) };
    std::iter::repeat(glyph).take(len).collect()
}

fn signed(n: i64) -> colored::ColoredString {
    match n {
        n if n > 0 => format!("+{n}").green(),
        n if n < 0 => n.to_string().red(),
        _ => "0".normal(),
    }
}

fn repo_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or(path)
}
