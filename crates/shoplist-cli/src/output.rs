//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use shoplist_core::sync::ConnectionState;
use shoplist_core::Item;

/// Length of the ID prefix shown in human output
const SHORT_ID_LEN: usize = 8;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Check if output is JSON
    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a single item
    pub fn print_item(&self, item: &Item) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:        {}", item.id());
                println!("Name:      {}", item.name());
                println!(
                    "Status:    {}",
                    if item.completed() { "done" } else { "pending" }
                );
                println!(
                    "Created:   {}",
                    item.created_at().format("%Y-%m-%d %H:%M")
                );
            }
            OutputFormat::Json => print_json(item),
            OutputFormat::Quiet => println!("{}", item.id()),
        }
    }

    /// Print the whole list
    pub fn print_items(&self, items: &[Item]) {
        match self.format {
            OutputFormat::Human => {
                if items.is_empty() {
                    println!("The shopping list is empty.");
                    return;
                }
                for item in items {
                    println!("{}", item_line(item));
                }
                let done = items.iter().filter(|i| i.completed()).count();
                println!("\n{} item(s), {} done", items.len(), done);
            }
            OutputFormat::Json => print_json(&items),
            OutputFormat::Quiet => {
                for item in items {
                    println!("{}", item.id());
                }
            }
        }
    }

    /// Print a connection state change
    pub fn print_state(&self, state: ConnectionState) {
        match self.format {
            OutputFormat::Human => println!("-- {} --", state),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"state": state.to_string()}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// One line of the human list view
fn item_line(item: &Item) -> String {
    format!(
        "[{}] {} | {}",
        if item.completed() { "x" } else { " " },
        short_id(item.id()),
        item.name()
    )
}

/// First characters of an ID
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode JSON: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id(""), "");
    }

    #[test]
    fn test_item_line() {
        let item = Item::with_fields("0123456789", "Milk", true, Utc::now());
        assert_eq!(item_line(&item), "[x] 01234567 | Milk");

        let item = Item::with_fields("abc", "Bread", false, Utc::now());
        assert_eq!(item_line(&item), "[ ] abc | Bread");
    }
}
