//! Terminal output for the command line tools.

use std::path::Path;

use clap::builder::styling::{AnsiColor, Color, Style};
use clap::builder::Styles;
use crossterm::style::{Attribute, Color as CtColor, Stylize};
use unicode_width::UnicodeWidthStr;

use crate::download_manager::BatchReport;

const PANEL_WIDTH: usize = 60;

pub fn get_styles() -> Styles {
    let accent = |color| Style::new().bold().fg_color(Some(Color::Ansi(color)));
    Styles::styled()
        .usage(accent(AnsiColor::Cyan).underline())
        .header(accent(AnsiColor::Cyan).underline())
        .literal(accent(AnsiColor::Green))
        .invalid(accent(AnsiColor::Red))
        .error(accent(AnsiColor::Red))
        .valid(accent(AnsiColor::Green))
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))))
}

pub mod colors {
    use crossterm::style::Color;

    pub const CYAN: Color = Color::Rgb {
        r: 0,
        g: 255,
        b: 255,
    };
    pub const GREEN: Color = Color::Rgb {
        r: 0,
        g: 255,
        b: 136,
    };
    pub const ORANGE: Color = Color::Rgb {
        r: 255,
        g: 165,
        b: 0,
    };
    pub const RED: Color = Color::Rgb {
        r: 255,
        g: 85,
        b: 85,
    };
    pub const DIM: Color = Color::Rgb {
        r: 128,
        g: 128,
        b: 128,
    };
    pub const WHITE: Color = Color::Rgb {
        r: 255,
        g: 255,
        b: 255,
    };
}

mod symbols {
    pub const TOP_LEFT: &str = "╭";
    pub const TOP_RIGHT: &str = "╮";
    pub const BOTTOM_LEFT: &str = "╰";
    pub const BOTTOM_RIGHT: &str = "╯";
    pub const HORIZONTAL: &str = "─";
    pub const BULLET: &str = "●";
    pub const CHECK: &str = "✓";
    pub const CROSS: &str = "✗";
    pub const SKIP: &str = "↷";
}

/// Pads `text` with spaces to `width` terminal columns.
///
/// Song names are often CJK, so widths are display columns, not chars.
pub fn pad_to_width(text: &str, width: usize) -> String {
    let padding = width.saturating_sub(text.width());
    format!("{}{}", text, " ".repeat(padding))
}

pub fn print_section_header(title: &str) {
    let title_width = title.width();
    let left = PANEL_WIDTH.saturating_sub(title_width + 4) / 2;
    let right = PANEL_WIDTH.saturating_sub(title_width + 4 + left);

    println!();
    println!(
        "{}{} {} {}{}",
        symbols::TOP_LEFT.with(colors::CYAN),
        symbols::HORIZONTAL.repeat(left).with(colors::CYAN),
        title.with(colors::CYAN).bold().attribute(Attribute::Italic),
        symbols::HORIZONTAL.repeat(right).with(colors::CYAN),
        symbols::TOP_RIGHT.with(colors::CYAN)
    );
}

pub fn print_section_footer() {
    println!(
        "{}{}{}",
        symbols::BOTTOM_LEFT.with(colors::CYAN),
        symbols::HORIZONTAL.repeat(PANEL_WIDTH).with(colors::CYAN),
        symbols::BOTTOM_RIGHT.with(colors::CYAN)
    );
    println!();
}

pub fn print_key_value(key: &str, value: &str) {
    println!(
        "  {} {} {}",
        symbols::BULLET.with(colors::CYAN),
        pad_to_width(&format!("{}:", key), 12).with(colors::DIM),
        value.with(colors::WHITE)
    );
}

fn print_songs(symbol: &str, color: CtColor, songs: &[String]) {
    for song in songs {
        println!("    {}  {}", symbol.with(color).bold(), song.as_str().with(color));
    }
}

pub fn print_error(message: &str) {
    println!(
        " {} {}",
        symbols::CROSS.with(colors::RED).bold(),
        message.with(colors::RED)
    );
}

/// Final summary of a batch run.
pub fn print_batch_summary(report: &BatchReport, report_dir: &Path) {
    print_section_header("BATCH SUMMARY");
    if let Some(name) = &report.playlist_name {
        print_key_value("Playlist", name);
    }
    print_key_value("Total", &report.total.to_string());
    print_key_value("Succeeded", &report.succeeded.len().to_string());
    print_key_value("Failed", &report.failed.len().to_string());
    print_key_value("Skipped", &report.skipped.len().to_string());
    print_key_value("Reports", &report_dir.display().to_string());

    print_songs(symbols::CHECK, colors::GREEN, &report.succeeded);
    print_songs(symbols::CROSS, colors::RED, &report.failed);
    print_songs(symbols::SKIP, colors::DIM, &report.skipped);

    if report.stopped_early {
        println!(
            "  {}",
            "Stopped before the end of the list".with(colors::ORANGE)
        );
    }
    print_section_footer();
}

pub fn print_enqueue_summary(queue: &str, published: usize, source: &str) {
    print_section_header("JOBS PUBLISHED");
    print_key_value("Source", source);
    print_key_value("Queue", queue);
    print_key_value("Jobs", &published.to_string());
    print_section_footer();
}
