//! ANSI styles for rich terminal output.

/// A single SGR style, rendered only when color is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    code: &'static str,
}

impl Style {
    #[must_use]
    pub const fn new(code: &'static str) -> Self {
        Self { code }
    }

    /// Wrap `text` in this style's escape codes.
    #[must_use]
    pub fn paint(&self, text: &str) -> String {
        if self.code.is_empty() {
            return text.to_string();
        }
        format!("\x1b[{}m{text}\x1b[0m", self.code)
    }
}

#[derive(Debug, Clone)]
pub struct Theme {
    pub success: Style,
    pub error: Style,
    pub warning: Style,
    pub info: Style,
    pub dimmed: Style,
    pub accent: Style,
    pub emphasis: Style,
    pub section: Style,

    pub category_obsolete: Style,
    pub category_fragile: Style,
    pub category_duplicate: Style,
    pub category_valuable: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            success: Style::new("1;32"),
            error: Style::new("1;31"),
            warning: Style::new("1;33"),
            info: Style::new("34"),
            dimmed: Style::new("2"),
            accent: Style::new("36"),
            emphasis: Style::new("1"),
            section: Style::new("1;36"),

            category_obsolete: Style::new("90"),
            category_fragile: Style::new("33"),
            category_duplicate: Style::new("35"),
            category_valuable: Style::new("32"),
        }
    }
}

impl Theme {
    #[must_use]
    pub const fn category(&self, category: crate::model::TestCategory) -> Style {
        use crate::model::TestCategory;
        match category {
            TestCategory::Obsolete => self.category_obsolete,
            TestCategory::Fragile => self.category_fragile,
            TestCategory::Duplicate => self.category_duplicate,
            TestCategory::Valuable => self.category_valuable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paint_wraps_in_sgr() {
        let theme = Theme::default();
        assert_eq!(theme.success.paint("ok"), "\x1b[1;32mok\x1b[0m");
        assert_eq!(Style::new("").paint("plain"), "plain");
    }
}
