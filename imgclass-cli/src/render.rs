//! Terminal presentation of report lines.
//!
//! Maps semantic report styles to crossterm colours. Colour is dropped when
//! stdout is not a terminal or `NO_COLOR` is set.

use crossterm::style::Stylize;
use imgclass_core::report::{Line, Segment, Style};
use std::io::IsTerminal;

pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Colour only for an interactive stdout without `NO_COLOR`.
    pub fn detect() -> Self {
        let no_color = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        Self::new(!no_color && std::io::stdout().is_terminal())
    }

    pub fn render_segment(&self, segment: &Segment) -> String {
        if !self.color {
            return segment.text.clone();
        }
        let text = segment.text.as_str();
        match segment.style {
            Style::Plain => text.to_string(),
            Style::Label => text.magenta().to_string(),
            Style::Score => text.blue().to_string(),
            Style::Heading => text.bold().to_string(),
            Style::Metric => text.cyan().to_string(),
        }
    }

    pub fn render(&self, line: &[Segment]) -> String {
        line.iter().map(|s| self.render_segment(s)).collect()
    }

    pub fn print(&self, line: &[Segment]) {
        println!("{}", self.render(line));
    }

    pub fn print_all(&self, lines: &[Line]) {
        for line in lines {
            self.print(line);
        }
    }
}
