//! Output formatting for query results.
//!
//! Renders normalized rows as an ASCII table (like the MySQL CLI) or a
//! markdown table for MCP clients that display text.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

/// Output format for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// ASCII table format (like MySQL CLI)
    Table,
    /// Markdown table format
    Markdown,
}

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn cell<'a>(row: &'a serde_json::Map<String, JsonValue>, column: &str) -> &'a JsonValue {
    row.get(column).unwrap_or(&JsonValue::Null)
}

pub fn format_as_table(
    columns: &[String],
    rows: &[serde_json::Map<String, JsonValue>],
    execution_time_ms: u64,
) -> String {
    if columns.is_empty() {
        return "Empty set".to_string();
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for row in rows {
        for (i, col) in columns.iter().enumerate() {
            widths[i] = widths[i].max(format_value(cell(row, col)).width());
        }
    }

    let pad = |text: &str, width: usize, right: bool| {
        let fill = " ".repeat(width.saturating_sub(text.width()));
        if right {
            format!("| {}{} ", fill, text)
        } else {
            format!("| {}{} ", text, fill)
        }
    };

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = separator.clone();
    output.push_str(
        &(columns
            .iter()
            .zip(&widths)
            .map(|(col, w)| pad(col, *w, false))
            .collect::<String>()
            + "|\n"),
    );
    output.push_str(&separator);

    for row in rows {
        let line: String = columns
            .iter()
            .zip(&widths)
            .map(|(col, w)| {
                let value = cell(row, col);
                pad(&format_value(value), *w, value.is_number())
            })
            .collect();
        output.push_str(&line);
        output.push_str("|\n");
    }
    output.push_str(&separator);

    let row_text = if rows.len() == 1 { "row" } else { "rows" };
    output.push_str(&format!(
        "{} {} in set ({:.2} sec)\n",
        rows.len(),
        row_text,
        execution_time_ms as f64 / 1000.0
    ));
    output
}

pub fn format_as_markdown(
    columns: &[String],
    rows: &[serde_json::Map<String, JsonValue>],
) -> String {
    if columns.is_empty() {
        return "*Empty set*".to_string();
    }

    let escape = |s: String| s.replace('|', "\\|").replace('\n', " ");

    let mut output: String = columns
        .iter()
        .map(|c| format!("| {} ", escape(c.clone())))
        .collect::<String>()
        + "|\n";
    output.push_str(&(columns.iter().map(|_| "|---").collect::<String>() + "|\n"));

    for row in rows {
        let line: String = columns
            .iter()
            .map(|col| format!("| {} ", escape(format_value(cell(row, col)))))
            .collect();
        output.push_str(&line);
        output.push_str("|\n");
    }

    output.push_str(&format!("\n*{} rows*", rows.len()));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> (Vec<String>, Vec<serde_json::Map<String, JsonValue>>) {
        let columns = vec!["id".to_string(), "name".to_string()];
        let rows = vec![
            json!({"id": 1, "name": "Ann"}).as_object().cloned().unwrap_or_default(),
            json!({"id": 22, "name": null}).as_object().cloned().unwrap_or_default(),
        ];
        (columns, rows)
    }

    #[test]
    fn test_table_layout() {
        let (columns, rows) = sample();
        let table = format_as_table(&columns, &rows, 1500);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines[0], "+----+------+");
        assert_eq!(lines[1], "| id | name |");
        assert_eq!(lines[3], "|  1 | Ann  |");
        assert_eq!(lines[4], "| 22 | NULL |");
        assert_eq!(lines[6], "2 rows in set (1.50 sec)");
    }

    #[test]
    fn test_table_wide_characters() {
        let columns = vec!["名前".to_string()];
        let rows = vec![json!({"名前": "x"}).as_object().cloned().unwrap_or_default()];
        let table = format_as_table(&columns, &rows, 0);
        assert!(table.starts_with("+------+\n| 名前 |\n"));
    }

    #[test]
    fn test_markdown() {
        let (columns, rows) = sample();
        let md = format_as_markdown(&columns, &rows);
        assert!(md.starts_with("| id | name |\n|---|---|\n| 1 | Ann |\n"));
        assert!(md.ends_with("*2 rows*"));
    }

    #[test]
    fn test_empty_columns() {
        assert_eq!(format_as_table(&[], &[], 0), "Empty set");
        assert_eq!(format_as_markdown(&[], &[]), "*Empty set*");
    }
}
