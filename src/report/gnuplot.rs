//! Minimal gnuplot script builder.
//!
//! The terminal line is left as a placeholder while the script is built
//! and resolved last, once plot options are known.

use std::fmt::Write;

use crate::common::error::{PrequelError, PrequelResult};

pub const TERMINAL_PLACEHOLDER: &str = "# ${SET_TERMINAL}\n";

#[derive(Debug, Default)]
pub struct Script {
    buf: String,
    plots: Vec<String>,
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn check_block_name(name: &str) -> PrequelResult<()> {
    let mut chars = name.chars();
    let head_ok = chars.next().map_or(false, |c| c.is_ascii_alphabetic());
    if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(PrequelError::report(format!("invalid data block name: {name}")));
    }
    Ok(())
}

impl Script {
    pub fn new() -> Self {
        let mut script = Self::default();
        script.buf.push_str(TERMINAL_PLACEHOLDER);
        script
    }

    pub fn cmd(&mut self, line: &str) -> &mut Self {
        self.buf.push_str(line);
        self.buf.push('\n');
        self
    }

    pub fn comment(&mut self, text: &str) -> &mut Self {
        let _ = write!(self.buf, "\n# {text}\n");
        self
    }

    /// `$name << EOD` block with the row index as first column.
    pub fn data_block(&mut self, name: &str, columns: &[Vec<f64>]) -> PrequelResult<&mut Self> {
        check_block_name(name)?;
        let rows = columns.first().map_or(0, Vec::len);
        if columns.iter().any(|c| c.len() != rows) {
            return Err(PrequelError::report(format!("data block {name}: ragged columns")));
        }
        let _ = writeln!(self.buf, "${name} << EOD");
        for row in 0..rows {
            let _ = write!(self.buf, "{row}");
            for column in columns {
                let _ = write!(self.buf, " {}", column[row]);
            }
            self.buf.push('\n');
        }
        self.buf.push_str("EOD\n");
        Ok(self)
    }

    /// Two blocks for a labelled heat map: `$name` with headers and `$name_label` without.
    pub fn matrix_block(&mut self, name: &str, labels: &[String], rows: &[Vec<u64>]) -> PrequelResult<&mut Self> {
        check_block_name(name)?;
        if rows.len() != labels.len() || rows.iter().any(|r| r.len() != labels.len()) {
            return Err(PrequelError::report("confusion matrix is not square"));
        }
        let header: Vec<String> = labels.iter().map(|l| quote(l)).collect();
        let _ = writeln!(self.buf, "${name} << EOD\n,{}", header.join(","));
        for (label, row) in labels.iter().zip(rows) {
            let cells: Vec<String> = row.iter().map(u64::to_string).collect();
            let _ = writeln!(self.buf, "{},{}", quote(label), cells.join(","));
        }
        let _ = writeln!(self.buf, "EOD\n\n${name}_label << EOD");
        for row in rows {
            let cells: Vec<String> = row.iter().map(u64::to_string).collect();
            let _ = writeln!(self.buf, "{}", cells.join(","));
        }
        self.buf.push_str("EOD\n");
        Ok(self)
    }

    pub fn panel(&mut self, x: f64, y: f64, width: f64, height: f64, title: &str) -> &mut Self {
        let _ = writeln!(self.buf, "set origin {x}, {y}");
        let _ = writeln!(self.buf, "set size {width}, {height}");
        let _ = writeln!(self.buf, "set title {} noenhanced font \",15\"", quote(title));
        self
    }

    /// `set xtics` with at most `max` evenly spread names, always keeping the last.
    pub fn xtics(&mut self, axis: &str, names: &[String], max: usize) -> &mut Self {
        if names.is_empty() {
            let _ = writeln!(self.buf, "set {axis} ()");
            return self;
        }
        let step = if max > 1 && max < names.len() {
            ((names.len() - 1) / (max - 1)).max(1)
        } else {
            1
        };
        let mut indexes: Vec<usize> = (0..names.len()).step_by(step).collect();
        if indexes.last() != Some(&(names.len() - 1)) {
            indexes.push(names.len() - 1);
        }
        let tics: Vec<String> = indexes
            .into_iter()
            .map(|i| format!("{} {i}", quote(&names[i])))
            .collect();
        let _ = writeln!(self.buf, "set {axis} ({})", tics.join(", "));
        self
    }

    /// Name/value text panel.
    pub fn properties(&mut self, entries: &[(&str, String)], name_width: usize) -> &mut Self {
        self.cmd("unset border").cmd("unset tics");
        let mut y = -0.5;
        for (name, value) in entries {
            let _ = writeln!(
                self.buf,
                "set label {} back noenhanced offset 1.3, {y} textcolor rgb \"dark-orange\"",
                quote(name)
            );
            let _ = writeln!(
                self.buf,
                "set label {} noenhanced front offset {}, {y} textcolor rgb \"dark-green\"",
                quote(&format!(": {value}")),
                name_width
            );
            y -= 1.0;
        }
        self.cmd("plot [0:1][1:0] NaN notitle").cmd("set border").cmd("set tics")
    }

    pub fn line_style(&mut self, index: usize, color: &str) -> &mut Self {
        let _ = writeln!(self.buf, "set style line {index} linewidth 1 linecolor {}", quote(color));
        self
    }

    /// Queue one `with lines` series; flushed by [`Script::plot`].
    pub fn series(&mut self, block: &str, column: usize, title: &str, style: usize, axis: Option<&str>) -> &mut Self {
        let mut s = format!(
            "${block} using 1:{} with lines title {} noenhanced linestyle {style}",
            column + 1,
            quote(title)
        );
        if let Some(axis) = axis {
            let _ = write!(s, " axis {axis}");
        }
        self.plots.push(s);
        self
    }

    pub fn plot(&mut self) -> &mut Self {
        if !self.plots.is_empty() {
            let plots = std::mem::take(&mut self.plots);
            let _ = writeln!(self.buf, "plot {}", plots.join(",\\\n     "));
        }
        self
    }

    pub fn reset(&mut self) -> &mut Self {
        self.cmd("reset").cmd("unset key")
    }

    /// Finished script with the terminal placeholder resolved, if a terminal was given.
    pub fn finish(self, terminal: Option<&str>, terminal_option: Option<&str>, font: Option<&str>, output: Option<&str>) -> String {
        let Some(terminal) = terminal else {
            return self.buf;
        };
        let mut line = format!("set terminal {terminal}");
        if let Some(opt) = terminal_option {
            let _ = write!(line, " {opt}");
        }
        if let Some(font) = font {
            let _ = write!(line, " font {}", quote(font));
        }
        line.push('\n');
        if let Some(path) = output {
            let _ = writeln!(line, "set output {}", quote(path));
        }
        self.buf.replacen(TERMINAL_PLACEHOLDER, &line, 1)
    }
}
