//! Terminal output for `appctr`: labels, tables and spinners.
//!
//! Color is decided once, in this order:
//! 1. `--no-color`
//! 2. `NO_COLOR` in the environment (any value)
//! 3. `TERM=dumb`
//! 4. `--color` (`auto` colors only a TTY stdout)

use anstream::{eprintln, println};
use anstyle::{AnsiColor, Color, Style};
use comfy_table::{Attribute, Cell, ContentArrangement, Table, presets};
use indicatif::{ProgressBar, ProgressStyle};
use std::borrow::Cow;
use std::io::IsTerminal;
use std::time::Duration;

/// When to emit ANSI colors
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Always,
    #[default]
    Auto,
    Never,
}

impl std::str::FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "auto" => Ok(Self::Auto),
            "never" => Ok(Self::Never),
            _ => Err(format!("invalid color mode '{s}' (expected always, auto or never)")),
        }
    }
}

/// Outcome tone of a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Ok,
    Info,
    Warn,
    Error,
}

impl Tone {
    fn word(self) -> &'static str {
        match self {
            Tone::Ok => "OK",
            Tone::Info => "INFO",
            Tone::Warn => "WARN",
            Tone::Error => "ERROR",
        }
    }

    fn color(self) -> AnsiColor {
        match self {
            Tone::Ok => AnsiColor::Green,
            Tone::Info => AnsiColor::Cyan,
            Tone::Warn => AnsiColor::Yellow,
            Tone::Error => AnsiColor::Red,
        }
    }

    fn glyphs(self) -> (&'static str, &'static str) {
        match self {
            Tone::Ok => ("✓", "[OK]"),
            Tone::Info => ("•", "-"),
            Tone::Warn => ("⚠", "[!]"),
            Tone::Error => ("✗", "[X]"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ui {
    pub color_enabled: bool,
    /// Spinners animate only on a colored TTY
    pub spinner_enabled: bool,
}

impl Default for Ui {
    fn default() -> Self {
        Self::new(ColorMode::Auto, false)
    }
}

impl Ui {
    pub fn new(mode: ColorMode, force_no_color: bool) -> Self {
        let color_enabled = Self::resolve_color(mode, force_no_color);
        let spinner_enabled = color_enabled && std::io::stdout().is_terminal();

        if !color_enabled {
            anstream::ColorChoice::write_global(anstream::ColorChoice::Never);
        }

        Self {
            color_enabled,
            spinner_enabled,
        }
    }

    fn resolve_color(mode: ColorMode, force_no_color: bool) -> bool {
        if force_no_color || std::env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if std::env::var("TERM").is_ok_and(|term| term == "dumb") {
            return false;
        }

        match mode {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => std::io::stdout().is_terminal(),
        }
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if self.color_enabled {
            format!("{style}{text}{style:#}")
        } else {
            text.to_string()
        }
    }

    /// Print a `LABEL message` line; errors go to stderr
    pub fn label(&self, tone: Tone, msg: impl AsRef<str>) {
        let style = Style::new().fg_color(Some(Color::Ansi(tone.color()))).bold();
        let line = format!("{} {}", self.paint(tone.word(), style), msg.as_ref());
        if tone == Tone::Error {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }

    pub fn ok(&self, msg: impl AsRef<str>) {
        self.label(Tone::Ok, msg);
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        self.label(Tone::Info, msg);
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        self.label(Tone::Warn, msg);
    }

    pub fn err(&self, msg: impl AsRef<str>) {
        self.label(Tone::Error, msg);
    }

    pub fn dim(&self, s: impl AsRef<str>) -> String {
        self.paint(
            s.as_ref(),
            Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))),
        )
    }

    pub fn bold(&self, s: impl AsRef<str>) -> String {
        self.paint(s.as_ref(), Style::new().bold())
    }

    pub fn colored(&self, s: impl AsRef<str>, color: AnsiColor) -> String {
        self.paint(s.as_ref(), Style::new().fg_color(Some(Color::Ansi(color))))
    }

    /// Status glyph, with an ASCII fallback when color is off
    pub fn icon(&self, tone: Tone) -> &'static str {
        let (fancy, plain) = tone.glyphs();
        if self.color_enabled { fancy } else { plain }
    }

    /// Table with borders
    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.load_preset(if self.color_enabled {
            presets::UTF8_FULL_CONDENSED
        } else {
            presets::ASCII_MARKDOWN
        });
        table
    }

    /// Borderless table for key/value listings
    pub fn simple_table(&self) -> Table {
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.load_preset(presets::NOTHING);
        table
    }

    pub fn cell(&self, content: impl Into<String>) -> Cell {
        Cell::new(content.into())
    }

    pub fn header_cell(&self, content: impl Into<String>) -> Cell {
        let cell = Cell::new(content.into());
        if self.color_enabled {
            cell.add_attribute(Attribute::Bold)
        } else {
            cell
        }
    }

    /// Colored through comfy-table so column widths stay right
    pub fn colored_cell(&self, content: impl Into<String>, color: AnsiColor) -> Cell {
        let cell = Cell::new(content.into());
        if self.color_enabled {
            cell.fg(comfy_color(color))
        } else {
            cell
        }
    }

    /// Spinner for a long move. Hidden when spinners are disabled.
    pub fn spinner(&self, message: impl Into<Cow<'static, str>>) -> ProgressBar {
        let pb = if self.spinner_enabled {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .template("{spinner:.cyan} {msg}")
            {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(80));
            pb
        } else {
            ProgressBar::hidden()
        };
        pb.set_message(message);
        pb
    }

    /// Stop a spinner and leave one status line behind
    pub fn spinner_finish(&self, pb: &ProgressBar, tone: Tone, msg: impl Into<Cow<'static, str>>) {
        let msg = msg.into();
        if self.spinner_enabled {
            if let Ok(style) = ProgressStyle::default_spinner().template("{msg}") {
                pb.set_style(style);
            }
            let icon = self.colored(self.icon(tone), tone.color());
            pb.finish_with_message(format!("{icon} {msg}"));
        } else {
            pb.finish_and_clear();
            self.label(tone, msg);
        }
    }

    pub fn println(&self, msg: impl AsRef<str>) {
        println!("{}", msg.as_ref());
    }

    pub fn newline(&self) {
        println!();
    }

    pub fn section(&self, title: impl AsRef<str>) {
        println!("{}", self.bold(title));
    }
}

fn comfy_color(color: AnsiColor) -> comfy_table::Color {
    use comfy_table::Color as C;
    match color {
        AnsiColor::Black => C::Black,
        AnsiColor::Red | AnsiColor::BrightRed => C::Red,
        AnsiColor::Green | AnsiColor::BrightGreen => C::Green,
        AnsiColor::Yellow | AnsiColor::BrightYellow => C::Yellow,
        AnsiColor::Blue | AnsiColor::BrightBlue => C::Blue,
        AnsiColor::Magenta | AnsiColor::BrightMagenta => C::Magenta,
        AnsiColor::Cyan | AnsiColor::BrightCyan => C::Cyan,
        AnsiColor::White | AnsiColor::BrightWhite => C::White,
        AnsiColor::BrightBlack => C::DarkGrey,
    }
}

/// Human-readable byte count
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> Ui {
        Ui::new(ColorMode::Never, false)
    }

    #[test]
    fn test_color_mode_parse() {
        assert_eq!("always".parse::<ColorMode>().unwrap(), ColorMode::Always);
        assert_eq!("AUTO".parse::<ColorMode>().unwrap(), ColorMode::Auto);
        assert_eq!("never".parse::<ColorMode>().unwrap(), ColorMode::Never);
        assert!("sometimes".parse::<ColorMode>().is_err());
    }

    #[test]
    fn test_no_color_flag_wins() {
        let ui = Ui::new(ColorMode::Always, true);
        assert!(!ui.color_enabled);
        assert!(!ui.spinner_enabled);
    }

    #[test]
    fn test_plain_icons() {
        let ui = plain();
        assert_eq!(ui.icon(Tone::Ok), "[OK]");
        assert_eq!(ui.icon(Tone::Warn), "[!]");
        assert_eq!(ui.icon(Tone::Error), "[X]");
        assert_eq!(ui.icon(Tone::Info), "-");
    }

    #[test]
    fn test_plain_styles_are_passthrough() {
        let ui = plain();
        assert_eq!(ui.dim("x"), "x");
        assert_eq!(ui.bold("x"), "x");
        assert_eq!(ui.colored("x", AnsiColor::Red), "x");
    }

    #[test]
    fn test_hidden_spinner_finishes() {
        let ui = plain();
        let pb = ui.spinner("moving");
        ui.spinner_finish(&pb, Tone::Ok, "done");
        assert!(pb.is_finished());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }
}
