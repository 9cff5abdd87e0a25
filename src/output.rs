//! # Terminal Output
//!
//! Colour and symbol handling for the command-line tool.
//!
//! The `--color` flag picks a [`ColorChoice`]. In `auto` mode colours are
//! turned off by `NO_COLOR`, `CLICOLOR=0` or `TERM=dumb`, forced on by
//! `CLICOLOR_FORCE`, and otherwise follow whether stdout is a terminal.
//!
//! ```rust,ignore
//! use inrepo_triggers::output::{ColorChoice, OutputConfig, Status};
//!
//! let out = OutputConfig::new(ColorChoice::Auto);
//! println!("{}", out.status(Status::Ok, "myorg/myrepo: 2 presubmits"));
//! ```

use std::env;
use std::fmt;
use std::str::FromStr;

use console::style;

/// Value of the `--color` flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    Always,
    Never,
    #[default]
    Auto,
}

impl FromStr for ColorChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(ColorChoice::Always),
            "never" => Ok(ColorChoice::Never),
            "auto" => Ok(ColorChoice::Auto),
            other => Err(format!(
                "invalid color choice '{}' (expected always, never or auto)",
                other
            )),
        }
    }
}

impl fmt::Display for ColorChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorChoice::Always => write!(f, "always"),
            ColorChoice::Never => write!(f, "never"),
            ColorChoice::Auto => write!(f, "auto"),
        }
    }
}

/// Outcome shown at the start of a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Changed,
    Unchanged,
    Error,
}

/// Resolved output settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    pub use_color: bool,
}

impl OutputConfig {
    pub fn new(choice: ColorChoice) -> Self {
        let use_color = match choice {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => detect_color_support(),
        };
        Self { use_color }
    }

    pub fn plain() -> Self {
        Self { use_color: false }
    }

    /// Pick the symbol or its plain-text fallback.
    pub fn symbol<'a>(&self, fancy: &'a str, plain: &'a str) -> &'a str {
        if self.use_color {
            fancy
        } else {
            plain
        }
    }

    /// Format one status line, e.g. `[OK] myorg/myrepo`.
    pub fn status(&self, status: Status, message: &str) -> String {
        let (fancy, plain) = match status {
            Status::Ok => ("✅", "[OK]"),
            Status::Changed => ("🔄", "[CHANGED]"),
            Status::Unchanged => ("➖", "[UNCHANGED]"),
            Status::Error => ("❌", "[ERR]"),
        };
        let symbol = self.symbol(fancy, plain);
        if !self.use_color {
            return format!("{} {}", symbol, message);
        }
        let message = match status {
            Status::Error => style(message).red().to_string(),
            Status::Changed => style(message).green().to_string(),
            Status::Ok | Status::Unchanged => message.to_string(),
        };
        format!("{} {}", symbol, message)
    }

    /// Emphasise a heading.
    pub fn heading(&self, text: &str) -> String {
        if self.use_color {
            style(text).bold().to_string()
        } else {
            text.to_string()
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::new(ColorChoice::Auto)
    }
}

fn detect_color_support() -> bool {
    // Presence alone disables colour (https://no-color.org/).
    if env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
        return false;
    }
    if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
        return true;
    }
    if env::var("TERM").is_ok_and(|v| v == "dumb") {
        return false;
    }
    console::Term::stdout().features().colors_supported()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_color_choice_parse() {
        assert_eq!("ALWAYS".parse::<ColorChoice>().unwrap(), ColorChoice::Always);
        assert_eq!("never".parse::<ColorChoice>().unwrap(), ColorChoice::Never);
        assert_eq!("auto".parse::<ColorChoice>().unwrap(), ColorChoice::Auto);
        assert!("sometimes".parse::<ColorChoice>().is_err());
        assert_eq!(ColorChoice::Never.to_string(), "never");
    }

    #[test]
    fn test_explicit_choices() {
        assert!(OutputConfig::new(ColorChoice::Always).use_color);
        assert!(!OutputConfig::new(ColorChoice::Never).use_color);
    }

    #[test]
    #[serial]
    fn test_no_color_disables_auto() {
        env::set_var("NO_COLOR", "1");
        let out = OutputConfig::new(ColorChoice::Auto);
        env::remove_var("NO_COLOR");
        assert!(!out.use_color);
    }

    #[test]
    fn test_plain_status_lines() {
        let out = OutputConfig::plain();
        assert_eq!(out.status(Status::Ok, "myorg/myrepo"), "[OK] myorg/myrepo");
        assert_eq!(out.status(Status::Error, "boom"), "[ERR] boom");
        assert_eq!(out.heading("Summary"), "Summary");
    }

    #[test]
    fn test_symbol() {
        let fancy = OutputConfig { use_color: true };
        assert_eq!(fancy.symbol("🌳", "[TREE]"), "🌳");
        assert_eq!(OutputConfig::plain().symbol("🌳", "[TREE]"), "[TREE]");
    }
}
