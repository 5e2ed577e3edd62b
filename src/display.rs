//! ASCII table rendering for the CLI.

use crate::session::ResultSet;
use crate::value::Value;

const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Render a result set as a boxed table.
pub fn render_table(
    result: &ResultSet,
    table_width: usize,
    max_col_width: usize,
    color: bool,
) -> String {
    let names = result.column_names();
    if names.is_empty() {
        let (rows, _) = result.shape();
        return format!("({rows} rows)\n");
    }
    let rows = result.rows();

    let clip = |text: &str| -> String {
        if text.chars().count() > max_col_width {
            let clipped: String = text.chars().take(max_col_width.saturating_sub(1)).collect();
            format!("{clipped}…")
        } else {
            text.to_string()
        }
    };

    let mut widths: Vec<usize> = names.iter().map(|n| clip(n).chars().count()).collect();
    let rendered_rows: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(i, value)| {
                    let text = clip(&display_value(value));
                    if let Some(width) = widths.get_mut(i) {
                        *width = (*width).max(text.chars().count());
                    }
                    text
                })
                .collect()
        })
        .collect();

    // drop trailing columns that don't fit the terminal
    let mut visible = widths.len();
    let mut used = 1;
    for (i, width) in widths.iter().enumerate() {
        used += width + 3;
        if used > table_width && i > 0 {
            visible = i;
            break;
        }
    }

    let border = |junction: &str| {
        let mut line = String::from(junction);
        for width in widths.iter().take(visible) {
            line.push_str(&"-".repeat(width + 2));
            line.push_str(junction);
        }
        line.push('\n');
        line
    };

    let mut output = String::new();
    output.push_str(&border("+"));
    output.push('|');
    for (name, width) in names.iter().zip(widths.iter()).take(visible) {
        let cell = format!(" {:<width$} ", clip(name), width = *width);
        if color {
            output.push_str(&format!("{BOLD}{cell}{RESET}"));
        } else {
            output.push_str(&cell);
        }
        output.push('|');
    }
    output.push('\n');
    output.push_str(&border("+"));

    for row in &rendered_rows {
        output.push('|');
        for (text, width) in row.iter().zip(widths.iter()).take(visible) {
            let is_null = text.as_str() == "null";
            let cell = format!(" {text:<width$} ", width = *width);
            if color && is_null {
                output.push_str(&format!("{DIM}{cell}{RESET}"));
            } else {
                output.push_str(&cell);
            }
            output.push('|');
        }
        output.push('\n');
    }
    output.push_str(&border("+"));

    let (row_count, column_count) = result.shape();
    if visible < column_count {
        output.push_str(&format!(
            "({row_count} rows, {column_count} columns, {visible} shown)\n"
        ));
    } else {
        output.push_str(&format!("({row_count} rows)\n"));
    }
    output
}

fn display_value(value: &Value) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    #[test]
    fn renders_headers_rows_and_count() {
        let mut session = Session::default();
        let result = session
            .execute("SELECT name FROM $planets ORDER BY id LIMIT 2")
            .expect("query runs");
        let table = render_table(&result, 80, 30, false);
        assert!(table.contains("name"));
        assert!(table.contains("Mercury"));
        assert!(table.contains("(2 rows)"));
    }

    #[test]
    fn long_values_are_clipped() {
        let mut session = Session::default();
        let result = session
            .execute("SELECT birth_place FROM $astronauts LIMIT 1")
            .expect("query runs");
        let table = render_table(&result, 80, 5, false);
        assert!(table.contains('…'));
    }
}
