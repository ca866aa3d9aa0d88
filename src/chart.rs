//! Cosmetic chart helpers.
//!
//! Charts are plain data: an [`Axis`] records styling, wedges and text
//! placements in data coordinates so callers can inspect the layout or
//! render it with [`Axis::to_svg`].

use std::fmt;

use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DPI: f64 = 100.0;
const DEFAULT_COLORS: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

#[derive(Debug, Error, PartialEq)]
pub enum ChartError {
    #[error("{values} values but {labels} labels")]
    LengthMismatch { values: usize, labels: usize },

    #[error("no values to plot")]
    Empty,

    #[error("value {value} at index {index} is negative or not finite")]
    InvalidValue { index: usize, value: f64 },

    #[error("values sum to zero")]
    ZeroTotal,

    #[error("values sum to a non-finite total")]
    TotalOverflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    Light,
    Normal,
    Bold,
}

impl FontWeight {
    fn css(self) -> u16 {
        match self {
            FontWeight::Light => 300,
            FontWeight::Normal => 400,
            FontWeight::Bold => 700,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizontalAlignment {
    Left,
    Center,
    Right,
}

impl HorizontalAlignment {
    fn text_anchor(self) -> &'static str {
        match self {
            HorizontalAlignment::Left => "start",
            HorizontalAlignment::Center => "middle",
            HorizontalAlignment::Right => "end",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub size: f64,
    pub weight: FontWeight,
    pub color: String,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            size: 10.0,
            weight: FontWeight::Normal,
            color: "black".to_string(),
        }
    }
}

/// Figure size in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridStyle {
    pub major: bool,
    pub minor: bool,
    pub line_width: f64,
    pub line_style: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Title {
    pub text: String,
    pub style: TextStyle,
}

/// Donut segment, angles in degrees counter-clockwise from the positive x axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wedge {
    pub theta1: f64,
    pub theta2: f64,
    pub fraction: f64,
    pub radius: f64,
    pub width: f64,
    pub face_color: String,
    pub edge_color: String,
}

impl Wedge {
    pub fn mid_angle(&self) -> f64 {
        (self.theta2 - self.theta1) / 2.0 + self.theta1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub style: TextStyle,
    pub z_order: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub text: String,
    pub xy: (f64, f64),
    pub xy_text: (f64, f64),
    pub horizontal_alignment: HorizontalAlignment,
    pub connection_style: String,
    pub arrow_color: String,
    pub arrow_width: f64,
    pub style: TextStyle,
    pub z_order: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub figure: Figure,
    pub equal_aspect: bool,
    pub title: Option<Title>,
    pub tick_labels: TextStyle,
    pub axis_labels: TextStyle,
    pub grid: Option<GridStyle>,
    pub wedges: Vec<Wedge>,
    pub texts: Vec<Label>,
    pub annotations: Vec<Annotation>,
}

impl Axis {
    pub fn new(figure: Figure) -> Self {
        Self {
            figure,
            equal_aspect: false,
            title: None,
            tick_labels: TextStyle::default(),
            axis_labels: TextStyle::default(),
            grid: None,
            wedges: Vec::new(),
            texts: Vec::new(),
            annotations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeseriesStyle {
    pub width: f64,
    pub height: f64,
    pub label_fontsize: f64,
    pub axis_fontsize: f64,
}

impl Default for TimeseriesStyle {
    fn default() -> Self {
        Self {
            width: 10.0,
            height: 6.0,
            label_fontsize: 14.0,
            axis_fontsize: 12.0,
        }
    }
}

/// Donut styling. Deserializing a partial JSON mapping overrides only the
/// keys it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PieSettings {
    pub figure: Figure,
    pub wedge_width: f64,
    pub edge_color: String,
    pub colors: Vec<String>,
    pub start_angle: f64,
    pub pct_distance: f64,
    pub pct_decimals: usize,
    pub pct_style: TextStyle,
    pub label_style: TextStyle,
    pub title_style: TextStyle,
}

impl Default for PieSettings {
    fn default() -> Self {
        Self {
            figure: Figure {
                width: 8.0,
                height: 4.0,
            },
            wedge_width: 0.5,
            edge_color: "white".to_string(),
            colors: DEFAULT_COLORS.iter().map(|color| color.to_string()).collect(),
            start_angle: 0.0,
            pct_distance: 0.75,
            pct_decimals: 1,
            pct_style: TextStyle {
                size: 14.0,
                weight: FontWeight::Normal,
                color: "white".to_string(),
            },
            label_style: TextStyle {
                size: 20.0,
                weight: FontWeight::Light,
                color: "black".to_string(),
            },
            title_style: TextStyle {
                size: 30.0,
                weight: FontWeight::Light,
                color: "black".to_string(),
            },
        }
    }
}

/// Light, evenly sized labels and a dotted grid for time-series plots.
pub fn setup_timeseries_axis(ax: Option<Axis>, style: &TimeseriesStyle) -> Axis {
    let mut ax = ax.unwrap_or_else(|| {
        Axis::new(Figure {
            width: style.width,
            height: style.height,
        })
    });
    ax.tick_labels.size = style.axis_fontsize;
    ax.tick_labels.weight = FontWeight::Light;
    ax.axis_labels.size = style.label_fontsize;
    ax.axis_labels.weight = FontWeight::Light;
    ax.grid = Some(GridStyle {
        major: true,
        minor: true,
        line_width: 0.5,
        line_style: ":".to_string(),
    });
    ax
}

/// Donut chart with a percentage inside each wedge and a leader-line label
/// outside it. Labels sit right of the chart when the wedge midpoint's cosine
/// is non-negative, left otherwise.
pub fn labelled_pie<S: AsRef<str>>(
    values: &[f64],
    labels: &[S],
    title: &str,
    ax: Option<Axis>,
    settings: &PieSettings,
) -> Result<Axis, ChartError> {
    if values.len() != labels.len() {
        return Err(ChartError::LengthMismatch {
            values: values.len(),
            labels: labels.len(),
        });
    }
    if values.is_empty() {
        return Err(ChartError::Empty);
    }
    if let Some((index, value)) = values
        .iter()
        .enumerate()
        .find(|(_, value)| !value.is_finite() || **value < 0.0)
    {
        return Err(ChartError::InvalidValue {
            index,
            value: *value,
        });
    }
    let total = values.iter().sum::<f64>();
    if !total.is_finite() {
        return Err(ChartError::TotalOverflow);
    }
    if total <= 0.0 {
        return Err(ChartError::ZeroTotal);
    }

    let mut ax = ax.unwrap_or_else(|| {
        let mut ax = Axis::new(settings.figure);
        ax.equal_aspect = true;
        ax
    });

    let mut theta = settings.start_angle;
    for (index, (value, label)) in values.iter().zip(labels).enumerate() {
        let fraction = value / total;
        let wedge = Wedge {
            theta1: theta,
            theta2: theta + 360.0 * fraction,
            fraction,
            radius: 1.0,
            width: settings.wedge_width,
            face_color: settings
                .colors
                .get(index % settings.colors.len().max(1))
                .cloned()
                .unwrap_or_else(|| DEFAULT_COLORS[index % DEFAULT_COLORS.len()].to_string()),
            edge_color: settings.edge_color.clone(),
        };
        theta = wedge.theta2;

        let mid = wedge.mid_angle();
        let (y, x) = mid.to_radians().sin_cos();

        ax.texts.push(Label {
            text: format!("{:.*}%", settings.pct_decimals, fraction * 100.0),
            x: settings.pct_distance * x,
            y: settings.pct_distance * y,
            style: settings.pct_style.clone(),
            z_order: 1,
        });

        let side = if x >= 0.0 { 1.0 } else { -1.0 };
        ax.annotations.push(Annotation {
            text: label.as_ref().to_string(),
            xy: (x, y),
            xy_text: (1.25 * side, 1.3 * y),
            horizontal_alignment: if side > 0.0 {
                HorizontalAlignment::Left
            } else {
                HorizontalAlignment::Right
            },
            connection_style: format!("angle,angleA=0,angleB={mid}"),
            arrow_color: "gray".to_string(),
            arrow_width: 0.5,
            style: settings.label_style.clone(),
            z_order: 0,
        });

        ax.wedges.push(wedge);
    }

    ax.title = Some(Title {
        text: title.to_string(),
        style: settings.title_style.clone(),
    });
    Ok(ax)
}

impl Axis {
    /// Standalone SVG rendering. Leader lines are drawn as straight segments.
    pub fn to_svg(&self) -> String {
        let width = self.figure.width * DPI;
        let height = self.figure.height * DPI;
        let title_space = self
            .title
            .as_ref()
            .map(|title| title.style.size * 1.6)
            .unwrap_or(0.0);

        // Data range [-1.6, 1.6] x [-1.5, 1.5] fits in the plot area.
        let plot_height = height - title_space;
        let scale = (width / 3.2).min(plot_height / 3.0);
        let cx = width / 2.0;
        let cy = title_space + plot_height / 2.0;
        let to_px = |x: f64, y: f64| (cx + x * scale, cy - y * scale);

        let mut svg = String::new();
        push_line(
            &mut svg,
            format_args!(
                r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width:.0}" height="{height:.0}" viewBox="0 0 {width:.0} {height:.0}">"#
            ),
        );
        push_line(
            &mut svg,
            format_args!(
                r#"<rect width="{width:.0}" height="{height:.0}" fill="white"/>"#
            ),
        );

        if let Some(grid) = &self.grid {
            self.write_grid(&mut svg, grid, title_space, width, height);
        }

        for wedge in &self.wedges {
            write_wedge(&mut svg, wedge, cx, cy, scale);
        }

        let mut annotations = self.annotations.iter().collect::<Vec<_>>();
        annotations.sort_by_key(|annotation| annotation.z_order);
        for annotation in annotations {
            let (x1, y1) = to_px(annotation.xy.0, annotation.xy.1);
            let (x2, y2) = to_px(annotation.xy_text.0, annotation.xy_text.1);
            push_line(
                &mut svg,
                format_args!(
                    r#"<line x1="{x1:.2}" y1="{y1:.2}" x2="{x2:.2}" y2="{y2:.2}" stroke="{}" stroke-width="{}"/>"#,
                    escape(annotation.arrow_color.as_str()),
                    annotation.arrow_width
                ),
            );
            write_text(
                &mut svg,
                &annotation.text,
                x2,
                y2,
                &annotation.style,
                annotation.horizontal_alignment,
            );
        }

        let mut texts = self.texts.iter().collect::<Vec<_>>();
        texts.sort_by_key(|text| text.z_order);
        for text in texts {
            let (x, y) = to_px(text.x, text.y);
            write_text(
                &mut svg,
                &text.text,
                x,
                y,
                &text.style,
                HorizontalAlignment::Center,
            );
        }

        if let Some(title) = &self.title {
            write_text(
                &mut svg,
                &title.text,
                width / 2.0,
                title.style.size * 1.1,
                &title.style,
                HorizontalAlignment::Center,
            );
        }

        svg.push_str("</svg>\n");
        svg
    }

    fn write_grid(&self, svg: &mut String, grid: &GridStyle, top: f64, width: f64, height: f64) {
        const DIVISIONS: usize = 5;
        let dash = if grid.line_style == ":" {
            r#" stroke-dasharray="1,2""#
        } else {
            ""
        };
        let left = 0.08 * width;
        let right = 0.96 * width;
        let top = top + 0.04 * height;
        let bottom = 0.9 * height;
        push_line(
            svg,
            format_args!(
                r#"<rect x="{left:.2}" y="{top:.2}" width="{:.2}" height="{:.2}" fill="none" stroke="black"/>"#,
                right - left,
                bottom - top
            ),
        );
        let steps = if grid.minor { DIVISIONS * 2 } else { DIVISIONS };
        for step in 1..steps {
            let t = step as f64 / steps as f64;
            let x = left + t * (right - left);
            let y = top + t * (bottom - top);
            push_line(
                svg,
                format_args!(
                    r#"<line x1="{x:.2}" y1="{top:.2}" x2="{x:.2}" y2="{bottom:.2}" stroke="gray" stroke-width="{}"{dash}/>"#,
                    grid.line_width
                ),
            );
            push_line(
                svg,
                format_args!(
                    r#"<line x1="{left:.2}" y1="{y:.2}" x2="{right:.2}" y2="{y:.2}" stroke="gray" stroke-width="{}"{dash}/>"#,
                    grid.line_width
                ),
            );
        }
    }
}

fn write_wedge(svg: &mut String, wedge: &Wedge, cx: f64, cy: f64, scale: f64) {
    let outer = wedge.radius * scale;
    let inner = (wedge.radius - wedge.width).max(0.0) * scale;
    let span = wedge.theta2 - wedge.theta1;
    let face = escape(wedge.face_color.as_str());
    let edge = escape(wedge.edge_color.as_str());

    if span >= 360.0 - 1e-9 {
        let ring = (outer + inner) / 2.0;
        push_line(
            svg,
            format_args!(
                r#"<circle cx="{cx:.2}" cy="{cy:.2}" r="{ring:.2}" fill="none" stroke="{face}" stroke-width="{:.2}"/>"#,
                outer - inner
            ),
        );
        return;
    }

    let point = |radius: f64, angle: f64| {
        let (sin, cos) = angle.to_radians().sin_cos();
        (cx + radius * cos, cy - radius * sin)
    };
    let large_arc = if span > 180.0 { 1 } else { 0 };
    let (ox1, oy1) = point(outer, wedge.theta1);
    let (ox2, oy2) = point(outer, wedge.theta2);
    let (ix2, iy2) = point(inner, wedge.theta2);
    let (ix1, iy1) = point(inner, wedge.theta1);
    push_line(
        svg,
        format_args!(
            r#"<path d="M {ox1:.2} {oy1:.2} A {outer:.2} {outer:.2} 0 {large_arc} 0 {ox2:.2} {oy2:.2} L {ix2:.2} {iy2:.2} A {inner:.2} {inner:.2} 0 {large_arc} 1 {ix1:.2} {iy1:.2} Z" fill="{face}" stroke="{edge}"/>"#
        ),
    );
}

fn push_line(svg: &mut String, line: fmt::Arguments<'_>) {
    svg.push_str(&line.to_string());
    svg.push('\n');
}

fn write_text(
    svg: &mut String,
    text: &str,
    x: f64,
    y: f64,
    style: &TextStyle,
    alignment: HorizontalAlignment,
) {
    push_line(
        svg,
        format_args!(
            r#"<text x="{x:.2}" y="{y:.2}" font-size="{}" font-weight="{}" fill="{}" text-anchor="{}" dominant-baseline="middle">{}</text>"#,
            style.size,
            style.weight.css(),
            escape(style.color.as_str()),
            alignment.text_anchor(),
            escape(text)
        ),
    );
}
