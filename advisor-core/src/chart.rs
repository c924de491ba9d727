use std::collections::HashMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::RenderError;
use crate::table::{Column, Table};

pub const DEFAULT_TOP_K: usize = 10;

const WIDTH: f32 = 720.0;
const HEIGHT: f32 = 420.0;
const LEFT: f32 = 70.0;
const RIGHT: f32 = 20.0;
const TOP: f32 = 50.0;
const BOTTOM: f32 = 120.0;
const BAR_FILL: &str = "#2E86C1";
const LABEL_CHARS: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bar {
    pub label: String,
    pub count: usize,
}

/// Occurrence counts of one column's values, largest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Histogram {
    pub column: Column,
    pub bars: Vec<Bar>,
    /// Distinct values before truncation.
    pub groups: usize,
}

impl Histogram {
    /// Counts values of `column`, sorts by count descending and keeps `top_k`.
    /// Equal counts keep first-appearance order.
    pub fn from_table(table: &Table, column: Column, top_k: usize) -> Result<Self, RenderError> {
        let values = table
            .values(column)
            .ok_or(RenderError::MissingColumn(column))?;

        let mut positions: HashMap<&str, usize> = HashMap::new();
        let mut bars: Vec<Bar> = Vec::new();
        for value in values {
            match positions.get(value) {
                Some(&index) => bars[index].count += 1,
                None => {
                    positions.insert(value, bars.len());
                    bars.push(Bar {
                        label: value.to_string(),
                        count: 1,
                    });
                }
            }
        }

        let groups = bars.len();
        bars.sort_by(|a, b| b.count.cmp(&a.count));
        bars.truncate(top_k);

        Ok(Self {
            column,
            bars,
            groups,
        })
    }

    pub fn title(&self) -> String {
        format!("Top {} by number of recommendations", plural(self.column))
    }

    pub fn max_count(&self) -> usize {
        self.bars.iter().map(|b| b.count).max().unwrap_or(0)
    }

    /// Renders a fixed-size SVG bar chart.
    pub fn to_svg(&self) -> String {
        let mut svg = String::new();
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{HEIGHT}" viewBox="0 0 {WIDTH} {HEIGHT}" role="img" font-family="Helvetica, Arial, sans-serif">"#
        );
        let _ = write!(
            svg,
            r##"<rect width="{WIDTH}" height="{HEIGHT}" fill="#ffffff"/><text x="{}" y="28" font-size="16" font-weight="bold" text-anchor="middle">{}</text>"##,
            WIDTH / 2.0,
            escape_xml(&self.title())
        );

        let plot_w = WIDTH - LEFT - RIGHT;
        let plot_h = HEIGHT - TOP - BOTTOM;
        let base_y = TOP + plot_h;

        if self.bars.is_empty() {
            let _ = write!(
                svg,
                r##"<text x="{}" y="{}" font-size="14" fill="#666666" text-anchor="middle">No data</text></svg>"##,
                WIDTH / 2.0,
                TOP + plot_h / 2.0
            );
            return svg;
        }

        let (step, ceiling) = axis_scale(self.max_count());
        let scale = plot_h / ceiling as f32;

        let mut tick = 0;
        while tick <= ceiling {
            let y = base_y - tick as f32 * scale;
            let _ = write!(
                svg,
                r##"<line x1="{LEFT}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="#dddddd" stroke-width="1"/><text x="{:.1}" y="{:.1}" font-size="11" text-anchor="end">{tick}</text>"##,
                LEFT + plot_w,
                LEFT - 6.0,
                y + 4.0
            );
            tick += step;
        }

        let _ = write!(
            svg,
            r#"<text x="18" y="{:.1}" font-size="12" text-anchor="middle" transform="rotate(-90 18 {:.1})">Number of recommendations</text>"#,
            TOP + plot_h / 2.0,
            TOP + plot_h / 2.0
        );

        let slot = plot_w / self.bars.len() as f32;
        let bar_w = slot * 0.7;
        for (index, bar) in self.bars.iter().enumerate() {
            let x = LEFT + slot * index as f32 + (slot - bar_w) / 2.0;
            let h = bar.count as f32 * scale;
            let center = x + bar_w / 2.0;
            let label_y = base_y + 14.0;
            let _ = write!(
                svg,
                r#"<rect x="{x:.1}" y="{:.1}" width="{bar_w:.1}" height="{h:.1}" fill="{BAR_FILL}"><title>{}: {}</title></rect>"#,
                base_y - h,
                escape_xml(&bar.label),
                bar.count
            );
            let _ = write!(
                svg,
                r#"<text x="{center:.1}" y="{:.1}" font-size="11" text-anchor="middle">{}</text>"#,
                base_y - h - 4.0,
                bar.count
            );
            let _ = write!(
                svg,
                r#"<text x="{center:.1}" y="{label_y:.1}" font-size="11" text-anchor="end" transform="rotate(-35 {center:.1} {label_y:.1})">{}</text>"#,
                escape_xml(&shorten(&bar.label, LABEL_CHARS))
            );
        }

        let _ = write!(
            svg,
            r##"<line x1="{LEFT}" y1="{base_y:.1}" x2="{:.1}" y2="{base_y:.1}" stroke="#333333" stroke-width="1"/><line x1="{LEFT}" y1="{TOP}" x2="{LEFT}" y2="{base_y:.1}" stroke="#333333" stroke-width="1"/></svg>"##,
            LEFT + plot_w
        );
        svg
    }
}

fn plural(column: Column) -> &'static str {
    match column {
        Column::Subscription => "subscriptions",
        Column::Category => "categories",
        Column::Problem => "problems",
        Column::Solution => "solutions",
        Column::Impact => "impact levels",
        Column::ResourceGroup => "resource groups",
        Column::Resource => "resources",
    }
}

/// Tick step and axis ceiling giving at most five intervals.
fn axis_scale(max: usize) -> (usize, usize) {
    let max = max.max(1);
    let step = max.div_ceil(5).max(1);
    (step, max.div_ceil(step) * step)
}

fn shorten(input: &str, max: usize) -> String {
    if input.chars().count() > max {
        let head: String = input.chars().take(max - 1).collect();
        format!("{head}…")
    } else {
        input.to_string()
    }
}

fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
