//! Aligned two-column summary tables for terminal output.

use unicode_width::UnicodeWidthStr;

/// Label/value rows rendered with the labels padded to a common width.
#[derive(Debug, Default)]
pub struct SummaryTable {
    title: String,
    rows: Vec<(String, String)>,
}

impl SummaryTable {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            rows: Vec::new(),
        }
    }

    pub fn row(&mut self, label: impl Into<String>, value: impl ToString) -> &mut Self {
        self.rows.push((label.into(), value.to_string()));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render as plain text lines, no trailing newline.
    #[must_use]
    pub fn render(&self) -> String {
        let label_width = self
            .rows
            .iter()
            .map(|(label, _)| label.width())
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        if !self.title.is_empty() {
            out.push_str(&self.title);
            out.push('\n');
        }
        for (i, (label, value)) in self.rows.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let pad = label_width.saturating_sub(label.width());
            out.push_str("  ");
            out.push_str(label);
            out.push_str(&" ".repeat(pad));
            out.push_str("  ");
            out.push_str(value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_aligned() {
        let mut table = SummaryTable::new("Analysis");
        table.row("Tests", 12).row("Duplicate groups", 2);
        insta::assert_snapshot!(table.render(), @r"
        Analysis
          Tests             12
          Duplicate groups  2
        ");
    }

    #[test]
    fn wide_chars_count_by_display_width() {
        let mut table = SummaryTable::new("");
        table.row("測試", 1).row("abcd", 2);
        let rendered = table.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "  測試  1");
        assert_eq!(lines[1], "  abcd  2");
    }
}
