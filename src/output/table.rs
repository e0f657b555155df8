#![forbid(unsafe_code)]

use std::io;

use crossterm::style::{Color, Stylize as _};

#[derive(Debug, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Row>,
    color: bool,
}

#[derive(Debug)]
struct Row {
    cells: Vec<String>,
    color: Option<Color>,
}

impl Table {
    pub fn new(headers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            color: false,
        }
    }

    /// Enables per-row colouring when printing as text.
    #[must_use]
    pub fn colored(mut self, enabled: bool) -> Self {
        self.color = enabled;
        self
    }

    pub fn row(&mut self, cols: impl IntoIterator<Item = impl Into<String>>) {
        self.push(cols, None);
    }

    pub fn row_colored(
        &mut self,
        cols: impl IntoIterator<Item = impl Into<String>>,
        color: Color,
    ) {
        self.push(cols, Some(color));
    }

    fn push(&mut self, cols: impl IntoIterator<Item = impl Into<String>>, color: Option<Color>) {
        self.rows.push(Row {
            cells: cols.into_iter().map(Into::into).collect(),
            color,
        });
    }

    pub fn print(&self) -> io::Result<()> {
        let mut out = io::stdout().lock();
        self.write_to(&mut out)
    }

    pub fn write_csv(&self) -> io::Result<()> {
        self.write_csv_to(io::stdout().lock())
    }

    fn write_csv_to(&self, out: impl io::Write) -> io::Result<()> {
        let mut wtr = csv::Writer::from_writer(out);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(&row.cells)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_to(&self, mut out: impl io::Write) -> io::Result<()> {
        let mut widths = vec![0usize; self.headers.len()];
        for (i, h) in self.headers.iter().enumerate() {
            widths[i] = widths[i].max(visible_width(h));
        }
        for row in &self.rows {
            for (i, cell) in row.cells.iter().enumerate() {
                if i >= widths.len() {
                    widths.push(0);
                }
                widths[i] = widths[i].max(visible_width(cell));
            }
        }

        writeln!(&mut out, "{}", format_row(&self.headers, &widths))?;
        for row in &self.rows {
            let line = format_row(&row.cells, &widths);
            match row.color.filter(|_| self.color) {
                Some(color) => writeln!(&mut out, "{}", line.with(color))?,
                None => writeln!(&mut out, "{line}")?,
            }
        }
        Ok(())
    }
}

fn visible_width(s: &str) -> usize {
    s.chars().count()
}

fn format_row(row: &[String], widths: &[usize]) -> String {
    let mut out = String::new();
    for (i, cell) in row.iter().enumerate() {
        if i > 0 {
            out.push_str("  ");
        }
        let w = widths
            .get(i)
            .copied()
            .unwrap_or_else(|| visible_width(cell));
        out.push_str(cell);
        let pad = w.saturating_sub(visible_width(cell));
        for _ in 0..pad {
            out.push(' ');
        }
    }
    out.truncate(out.trim_end().len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligns_columns_by_widest_cell() {
        let mut t = Table::new(["ID", "TITLE"]);
        t.row(["1", "Buy milk"]);
        t.row(["12", "Ship"]);
        let mut buf = Vec::new();
        t.write_to(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "ID  TITLE\n1   Buy milk\n12  Ship\n");
    }

    #[test]
    fn color_is_ignored_unless_enabled() {
        let mut t = Table::new(["ID"]);
        t.row_colored(["1"], Color::Green);
        let mut buf = Vec::new();
        t.write_to(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "ID\n1\n");
    }

    #[test]
    fn writes_csv_with_header() {
        let mut t = Table::new(["id", "title"]);
        t.row(["1", "Buy milk, eggs"]);
        let mut buf = Vec::new();
        t.write_csv_to(&mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "id,title\n1,\"Buy milk, eggs\"\n"
        );
    }
}
