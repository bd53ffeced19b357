//! Output formatting for CLI results

use serde::Serialize;
use tabled::Tabled;

use crate::error::Result;

pub mod formatters;
pub mod json;
pub mod table;

pub use json::{format_json, format_json_from};
pub use table::{format_table, format_key_values};

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Pretty format - human-optimized rich formatting
    #[default]
    Pretty,
    /// Table format - one row per entry
    Table,
    /// JSON format - structured for scripts
    Json,
}

/// Render rows as a table or JSON.
///
/// `Pretty` and `Table` share the tabled renderer; commands that want a
/// richer pretty view handle `Pretty` themselves before calling this.
pub fn render<T: Tabled + Serialize>(rows: &[T], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(format_json(rows)?),
        OutputFormat::Pretty | OutputFormat::Table => Ok(format_table(rows)),
    }
}
