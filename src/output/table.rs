//! Table formatting for CLI output.
//!
//! Provides aligned, human-readable tables with:
//! - Column headers and a dashed separator
//! - Auto-sizing columns based on display width
//! - Per-column width caps with truncation

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// A simple table formatter.
#[derive(Debug, Default)]
pub struct TableFormatter {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    max_widths: Vec<Option<usize>>,
}

impl TableFormatter {
    /// Create a new table formatter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the column headers.
    pub fn headers<I, S>(&mut self, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Add a row to the table.
    pub fn row<I, S>(&mut self, cells: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
        self
    }

    /// Cap the width of column `index`; longer cells are truncated.
    pub fn max_width(&mut self, index: usize, width: usize) -> &mut Self {
        if self.max_widths.len() <= index {
            self.max_widths.resize(index + 1, None);
        }
        self.max_widths[index] = Some(width);
        self
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn calculate_widths(&self) -> Vec<usize> {
        let num_cols = self
            .rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(self.headers.len()))
            .max()
            .unwrap_or(0);

        let mut widths = vec![0usize; num_cols];
        for (i, header) in self.headers.iter().enumerate() {
            widths[i] = widths[i].max(header.width());
        }
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.width());
            }
        }
        for (i, cap) in self.max_widths.iter().enumerate() {
            if let Some(cap) = cap
                && i < widths.len()
            {
                widths[i] = widths[i].min(*cap);
            }
        }
        widths
    }

    /// Print the table to stdout.
    pub fn print(&self) {
        print!("{}", self.render());
    }

    /// Render the table as a string.
    pub fn render(&self) -> String {
        let widths = self.calculate_widths();
        let mut output = String::new();

        if !self.headers.is_empty() {
            output.push_str(&row_to_string(&self.headers, &widths));
            output.push('\n');
            let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
            output.push_str(&sep.join("  "));
            output.push('\n');
        }

        for row in &self.rows {
            output.push_str(&row_to_string(row, &widths));
            output.push('\n');
        }

        output
    }
}

fn row_to_string(cells: &[String], widths: &[usize]) -> String {
    let parts: Vec<String> = cells
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let width = widths.get(i).copied().unwrap_or(0);
            let cell_width = cell.width();
            if cell_width <= width {
                format!("{}{}", cell, " ".repeat(width - cell_width))
            } else {
                truncate(cell, width)
            }
        })
        .collect();

    parts.join("  ").trim_end().to_string()
}

/// Truncate a string to fit within a given display width.
fn truncate(s: &str, max_width: usize) -> String {
    if max_width <= 3 {
        return ".".repeat(max_width);
    }

    let mut width = 0;
    let mut out = String::new();
    for c in s.chars() {
        let char_width = c.width().unwrap_or(0);
        if width + char_width + 3 > max_width {
            out.push_str("...");
            width += 3;
            break;
        }
        out.push(c);
        width += char_width;
    }

    if width < max_width {
        out.push_str(&" ".repeat(max_width - width));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_basic() {
        let mut table = TableFormatter::new();
        table.headers(["Locale", "Source"]);
        table.row(["zh", "browser"]);
        table.row(["en", "default"]);

        let output = table.render();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "Locale  Source");
        assert_eq!(lines[1], "------  -------");
        assert_eq!(lines[2], "zh      browser");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_wide_characters_align() {
        let mut table = TableFormatter::new();
        table.headers(["Name", "Code"]);
        table.row(["中文", "zh"]);
        table.row(["English", "en"]);

        let output = table.render();
        let lines: Vec<&str> = output.lines().collect();
        // "中文" occupies four columns, padded to the seven of "English".
        assert_eq!(lines[2], "中文     zh");
        assert_eq!(lines[3], "English  en");
    }

    #[test]
    fn test_max_width_truncates() {
        let mut table = TableFormatter::new();
        table.headers(["Metadata"]);
        table.row(["page=home,referrer=search"]);
        table.max_width(0, 8);

        let output = table.render();
        assert!(output.lines().any(|l| l == "page=..."));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("hi", 10).trim(), "hi");
        assert_eq!(truncate("hello", 2), "..");
    }
}
