//! Terminal table rendering for search results.

/// Padding added to every column beyond its widest cell.
const COLUMN_PADDING: usize = 2;

/// Truncates `s` to `max` characters, marking the cut with `...`.
#[must_use]
pub fn cut_str(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

fn center(s: &str, width: usize) -> String {
    let len = s.chars().count();
    let pad = width.saturating_sub(len);
    let left = pad / 2;
    let right = pad - left;
    format!("{}{}{}", " ".repeat(left), s, " ".repeat(right))
}

/// ASCII table with centered cells and per-column width caps.
pub struct TablePrinter {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    max_widths: Vec<Option<usize>>,
}

impl TablePrinter {
    #[must_use]
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(ToString::to_string).collect(),
            rows: Vec::new(),
            max_widths: Vec::new(),
        }
    }

    /// Caps column widths; `None` leaves a column unbounded.
    pub fn set_max_widths(&mut self, widths: Vec<Option<usize>>) {
        self.max_widths = widths;
    }

    pub fn add_row(&mut self, row: Vec<String>) {
        debug_assert_eq!(row.len(), self.headers.len());
        self.rows.push(row);
    }

    /// Sorts rows ascending by one column; out-of-range columns are ignored.
    pub fn sort_by_column(&mut self, column: usize) {
        if column < self.headers.len() {
            self.rows.sort_by(|a, b| a[column].cmp(&b[column]));
        }
    }

    fn column_widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self
            .headers
            .iter()
            .map(|h| h.chars().count())
            .collect();

        for row in &self.rows {
            for (column, cell) in row.iter().enumerate() {
                widths[column] = widths[column].max(cell.chars().count());
            }
        }

        for (column, width) in widths.iter_mut().enumerate() {
            *width += COLUMN_PADDING;
            if let Some(Some(cap)) = self.max_widths.get(column) {
                *width = (*width).min(*cap);
            }
        }
        widths
    }

    fn render_row(&self, cells: &[String], widths: &[usize]) -> String {
        let mut line = String::from("|");
        for (cell, width) in cells.iter().zip(widths) {
            line.push_str(&center(&cut_str(cell, *width), *width));
            line.push('|');
        }
        line
    }

    fn render_separator(widths: &[usize]) -> String {
        let mut line = String::from("+");
        for width in widths {
            line.push_str(&"-".repeat(*width));
            line.push('+');
        }
        line
    }

    /// Renders the full table, trailing newline included.
    #[must_use]
    pub fn render(&self) -> String {
        let widths = self.column_widths();
        let separator = Self::render_separator(&widths);

        let mut out = String::new();
        out.push_str(&separator);
        out.push('\n');
        out.push_str(&self.render_row(&self.headers, &widths));
        out.push('\n');
        out.push_str(&separator);
        out.push('\n');

        if !self.rows.is_empty() {
            for row in &self.rows {
                out.push_str(&self.render_row(row, &widths));
                out.push('\n');
            }
            out.push_str(&separator);
            out.push('\n');
        }
        out
    }

    /// Renders to stdout.
    pub fn print(&self) {
        print!("{}", self.render());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TablePrinter {
        let mut printer = TablePrinter::new(&["File Name", "Size", "URL"]);
        printer.add_row(vec![
            "b.mkv".to_string(),
            "1GB".to_string(),
            "irc://net/#b/Bot/2".to_string(),
        ]);
        printer.add_row(vec![
            "a.mkv".to_string(),
            "683MB".to_string(),
            "irc://net/#a/Bot/1".to_string(),
        ]);
        printer
    }

    #[test]
    fn test_cut_str_truncates_with_ellipsis() {
        assert_eq!(cut_str("abcdef", 10), "abcdef");
        assert_eq!(cut_str("abcdefghij", 6), "abc...");
    }

    #[test]
    fn test_render_has_borders_and_all_rows() {
        let table = sample().render();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with('+') && lines[0].ends_with('+'));
        assert!(lines[1].contains("File Name"));
        assert!(lines[3].contains("b.mkv"));
        assert!(lines[4].contains("a.mkv"));
    }

    #[test]
    fn test_sort_by_column_orders_rows() {
        let mut printer = sample();
        printer.sort_by_column(0);
        let table = printer.render();
        let a = table.find("a.mkv").unwrap();
        let b = table.find("b.mkv").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_sort_by_out_of_range_column_is_ignored() {
        let mut printer = sample();
        printer.sort_by_column(9);
        assert!(printer.render().contains("b.mkv"));
    }

    #[test]
    fn test_max_width_caps_column() {
        let mut printer = TablePrinter::new(&["Name"]);
        printer.set_max_widths(vec![Some(8)]);
        printer.add_row(vec!["averylongfilename.mkv".to_string()]);
        let table = printer.render();
        for line in table.lines().filter(|l| l.starts_with('|')) {
            assert_eq!(line.chars().count(), 10, "8 wide plus two pipes: {line}");
        }
        assert!(table.contains("avery..."));
    }

    #[test]
    fn test_headers_only_table_renders_without_body() {
        let printer = TablePrinter::new(&["A", "B"]);
        let table = printer.render();
        assert_eq!(table.lines().count(), 3);
    }
}
