//! Plain-text result output for CLI commands.
//!
//! Results go to stdout one line at a time; logs go to stderr.

use std::fmt::Display;

/// Prints one result line.
#[allow(clippy::print_stdout)]
pub fn line(text: impl Display) {
    println!("{text}");
}

/// Prints a `name: yes|no` line.
pub fn flag(name: &str, value: bool) {
    line(format_flag(name, value));
}

/// Formats a `name: yes|no` line.
#[must_use]
pub fn format_flag(name: &str, value: bool) -> String {
    format!("{name}: {}", if value { "yes" } else { "no" })
}
