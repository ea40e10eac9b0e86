//! Text rendering for tool results.
//!
//! Every tool returns one text blob. Row sets are drawn as ASCII tables
//! padded by display width, so CJK and emoji cells stay aligned.

use crate::models::{QueryKind, RowSet, TableDescription, WriteOutcome};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

pub const EMPTY_RESULT: &str =
    "Query executed successfully. No results returned (empty result set).";

/// Render one decoded value as cell text.
pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => i.to_string(),
            (None, Some(u), _) => u.to_string(),
            // f64 Display never switches to exponent notation
            (None, None, Some(f)) => f.to_string(),
            _ => n.to_string(),
        },
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(_) | JsonValue::Object(_) => value.to_string(),
    }
}

#[derive(Clone, Copy)]
enum Align {
    Left,
    Center,
    Right,
}

fn pad(text: &str, width: usize, align: Align) -> String {
    let fill = width.saturating_sub(text.width());
    let (left, right) = match align {
        Align::Left => (0, fill),
        Align::Right => (fill, 0),
        Align::Center => (fill / 2, fill - fill / 2),
    };
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(right))
}

/// Draw an ASCII table. Numeric cells are right aligned.
pub fn format_as_table(columns: &[String], rows: &[Vec<JsonValue>]) -> String {
    let cells: Vec<Vec<(String, bool)>> = rows
        .iter()
        .map(|row| {
            (0..columns.len())
                .map(|i| {
                    let value = row.get(i).unwrap_or(&JsonValue::Null);
                    (format_value(value), value.is_number())
                })
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for row in &cells {
        for (i, (text, _)) in row.iter().enumerate() {
            widths[i] = widths[i].max(text.width());
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = String::new();
    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(col, w)| format!("| {} ", pad(col, *w, Align::Center)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&separator);

    for row in &cells {
        let line: String = row
            .iter()
            .zip(&widths)
            .map(|((text, numeric), w)| {
                let align = if *numeric { Align::Right } else { Align::Left };
                format!("| {} ", pad(text, *w, align))
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }

    output.push_str(&separator);
    output
}

fn bullet_list(header: &str, items: &[String]) -> String {
    let mut output = format!("{}\n", header);
    let lines: Vec<String> = items.iter().map(|item| format!("  - {}", item)).collect();
    output.push_str(&lines.join("\n"));
    output
}

/// Renders query results, catalog listings and write outcomes.
#[derive(Debug, Clone, Copy)]
pub struct ResultFormatter {
    row_cap: u32,
}

impl ResultFormatter {
    pub fn new(row_cap: u32) -> Self {
        Self {
            row_cap: row_cap.max(1),
        }
    }

    pub fn row_cap(&self) -> u32 {
        self.row_cap
    }

    /// Render a row set, showing at most `row_cap` rows.
    pub fn format_rows(&self, set: &RowSet) -> String {
        if set.is_empty() {
            return EMPTY_RESULT.to_string();
        }

        let cap = self.row_cap as usize;
        let shown = &set.rows[..set.rows.len().min(cap)];
        let omitted = set.omitted + (set.rows.len() - shown.len()) as u64;

        let mut output = format!("Query returned {} row(s):\n\n", set.total_rows());
        output.push_str(&format_as_table(&set.columns, shown));
        if omitted > 0 {
            output.push_str(&format!("\n... and {} more row(s)", omitted));
        }
        output
    }

    pub fn format_schemas(&self, schemas: &[String]) -> String {
        if schemas.is_empty() {
            return "No user schemas found in the database.".to_string();
        }
        bullet_list("Available schemas:", schemas)
    }

    pub fn format_tables(&self, schema: &str, tables: &[String]) -> String {
        if tables.is_empty() {
            return format!("No tables found in schema '{}'.", schema);
        }
        bullet_list(&format!("Tables in schema '{}':", schema), tables)
    }

    pub fn format_description(&self, description: &TableDescription) -> String {
        let columns: Vec<String> = ["Column", "Type", "Nullable", "Default", "Key"]
            .into_iter()
            .map(String::from)
            .collect();
        let rows: Vec<Vec<JsonValue>> = description
            .columns
            .iter()
            .map(|c| {
                let key = match (&c.primary_key, &c.references) {
                    (true, _) => "PK".to_string(),
                    (false, Some(target)) => format!("FK -> {}", target),
                    (false, None) => String::new(),
                };
                vec![
                    c.name.clone().into(),
                    c.data_type.clone().into(),
                    (if c.nullable { "YES" } else { "NO" }).into(),
                    c.default.clone().map_or(JsonValue::Null, JsonValue::String),
                    key.into(),
                ]
            })
            .collect();

        let mut output = format!("Table: {}\n\n", description.qualified_name());
        output.push_str("Columns:\n");
        output.push_str(&format_as_table(&columns, &rows));

        if !description.primary_key.is_empty() {
            output.push_str(&format!(
                "\nPrimary Key: {}\n",
                description.primary_key.join(", ")
            ));
        }

        if !description.foreign_keys.is_empty() {
            output.push_str("\nForeign Keys:\n");
            for fk in &description.foreign_keys {
                output.push_str(&format!("  - {}\n", fk));
            }
        }

        output
    }

    pub fn format_write_outcome(&self, outcome: &WriteOutcome) -> String {
        match outcome {
            WriteOutcome::ConfirmationRequired { kind, sql } => format!(
                "CONFIRMATION_REQUIRED\n\
                 Query Type: {kind}\n\
                 SQL Query:\n\
                 {sql}\n\
                 \n\
                 This query will modify the database. It requires user confirmation before execution.\n\
                 Please ask the user: \"Do you want to proceed with this {kind} operation? (yes/no)\"\n"
            ),
            // Row counts are meaningless for schema changes
            WriteOutcome::Executed {
                kind: QueryKind::Ddl,
                ..
            } => "Query executed successfully.".to_string(),
            WriteOutcome::Executed { rows_affected, .. } => {
                format!("Query executed successfully. {} row(s) affected.", rows_affected)
            }
        }
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_ROW_CAP)
    }
}
