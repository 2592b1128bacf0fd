use crate::types::Region;
use serde::Serialize;

/// Hover tooltip: shown on pointer enter, refreshed on every move, hidden
/// on leave.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tooltip {
    pub visible: bool,
    pub lines: Vec<String>,
    pub left: f64,
    pub top: f64,
    #[serde(skip)]
    offset: (f64, f64),
}

impl Tooltip {
    pub fn new(offset: [f64; 2]) -> Self {
        Self { offset: (offset[0], offset[1]), ..Self::default() }
    }

    pub fn enter(&mut self) {
        self.visible = true;
    }

    /// Refresh text and position. Does not change visibility.
    pub fn move_to(&mut self, region: &Region, year: &str, page_x: f64, page_y: f64) {
        self.lines = tooltip_lines(region, year);
        self.left = page_x + self.offset.0;
        self.top = page_y + self.offset.1;
    }

    pub fn leave(&mut self) {
        self.visible = false;
    }

    /// Markup for the tooltip host element.
    pub fn html(&self) -> String {
        self.lines
            .iter()
            .map(|l| escape_html(l))
            .collect::<Vec<_>>()
            .join(" <br>\n")
    }
}

pub fn tooltip_lines(region: &Region, year: &str) -> Vec<String> {
    let population = region
        .population_in(year)
        .map(format_population)
        .unwrap_or_else(|| "n/a".to_string());
    vec![
        line("Federal state", region.display_name()),
        line("Population", &population),
    ]
}

fn line(variable: &str, data: &str) -> String {
    format!("{}: {}", variable, data)
}

/// Group digits in threes with `,`: `1234567` → `1,234,567`.
pub fn format_population(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
