//! Table rendering (rounded borders, centred header row)

use tabled::{
    Table, Tabled,
    builder::Builder,
    settings::{Alignment, Modify, Style, object::Rows},
};

fn styled(mut table: Table) -> String {
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));
    table.to_string()
}

/// One row per record
pub fn format_table<T: Tabled>(rows: &[T]) -> String {
    if rows.is_empty() {
        return "No results found.".to_string();
    }
    styled(Table::new(rows))
}

/// Two-column FIELD / VALUE table for a single record such as proxy stats
pub fn format_key_values(pairs: &[(&str, String)]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["FIELD", "VALUE"]);
    for (field, value) in pairs {
        builder.push_record([field.to_string(), value.clone()]);
    }
    styled(builder.build())
}
