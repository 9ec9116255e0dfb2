//! Terminal rendering of query results.

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};

use crate::query::ResultTable;

/// Renders the result as a boxed table, or an empty-result notice.
#[must_use]
pub fn render(result: &ResultTable) -> String {
    if result.rows.is_empty() {
        return "No results found.".into();
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(result.header.clone());
    for row in &result.rows {
        table.add_row(row.clone());
    }
    let mut out = table.to_string();
    if result.truncated {
        out.push_str(&format!("\nShowing the first {} results.", result.limit));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: Vec<Vec<String>>, truncated: bool) -> ResultTable {
        ResultTable {
            header: vec!["Product Name", "Price"],
            rows,
            truncated,
            limit: 1,
        }
    }

    #[test]
    fn render_fn_reports_an_empty_result() {
        assert_eq!(render(&table(Vec::new(), false)), "No results found.");
    }

    #[test]
    fn render_fn_appends_the_limit_notice_when_truncated() {
        let out = render(&table(
            vec![vec!["Myth Realized".into(), "4.99".into()]],
            true,
        ));
        assert!(out.contains("Myth Realized"));
        assert!(out.ends_with("Showing the first 1 results."));
    }
}
