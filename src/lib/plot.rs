//! Minimal SVG charts.
//!
//! Every plotting call works on an explicit [`Figure`] and its [`Axes`];
//! nothing is drawn into shared state. A figure is rendered with
//! [`Figure::to_svg`] or written with [`Figure::save`].

use crate::posterior::PosteriorSummary;
use anyhow::{anyhow, Result};
use itertools::Itertools;
use log::debug;
use std::fmt::Write;
use std::path::Path;

const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 60.0;
const N_TICKS: usize = 5;
const COLOR: &str = "#1f77b4";
const ACCENT: &str = "#ff7f0e";

#[derive(Clone, Debug, PartialEq)]
pub enum Element {
    Histogram { edges: Vec<f64>, counts: Vec<usize> },
    Scatter { x: Vec<f64>, y: Vec<f64> },
    Line { x: Vec<f64>, y: Vec<f64> },
    VLine { x: f64, label: String },
    Interval { low: f64, high: f64, label: String },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Axes {
    pub elements: Vec<Element>,
    pub xlabel: String,
    pub ylabel: String,
    pub title: String,
}

impl Axes {
    /// Bins `values` on `edges` and draws the bars. Returns the counts.
    pub fn hist(&mut self, values: &[f64], edges: &[f64]) -> Vec<usize> {
        let counts = histogram_counts(values, edges);
        self.elements.push(Element::Histogram {
            edges: edges.to_vec(),
            counts: counts.clone(),
        });
        counts
    }

    pub fn scatter(&mut self, x: &[f64], y: &[f64]) {
        self.elements.push(Element::Scatter {
            x: x.to_vec(),
            y: y.to_vec(),
        });
    }

    pub fn plot(&mut self, x: &[f64], y: &[f64]) {
        self.elements.push(Element::Line {
            x: x.to_vec(),
            y: y.to_vec(),
        });
    }

    pub fn axvline(&mut self, x: f64, label: &str) {
        self.elements.push(Element::VLine {
            x,
            label: label.to_string(),
        });
    }

    pub fn interval(&mut self, low: f64, high: f64, label: &str) {
        self.elements.push(Element::Interval {
            low,
            high,
            label: label.to_string(),
        });
    }

    pub fn set_xlabel(&mut self, label: &str) {
        self.xlabel = label.to_string();
    }

    pub fn set_ylabel(&mut self, label: &str) {
        self.ylabel = label.to_string();
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    /// Data limits over every element, padded by 5%.
    fn bounds(&self) -> (f64, f64, f64, f64) {
        let mut xs: Vec<f64> = Vec::new();
        let mut ys: Vec<f64> = Vec::new();
        for element in &self.elements {
            match element {
                Element::Histogram { edges, counts } => {
                    xs.extend(edges.iter().copied());
                    ys.push(0.0);
                    ys.extend(counts.iter().map(|&c| c as f64));
                }
                Element::Scatter { x, y } | Element::Line { x, y } => {
                    xs.extend(x.iter().copied());
                    ys.extend(y.iter().copied());
                }
                Element::VLine { x, .. } => xs.push(*x),
                Element::Interval { low, high, .. } => {
                    xs.push(*low);
                    xs.push(*high);
                }
            }
        }
        let (x0, x1) = padded_range(&xs);
        let (y0, y1) = padded_range(&ys);
        (x0, x1, y0, y1)
    }
}

fn padded_range(values: &[f64]) -> (f64, f64) {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    match finite.minmax().into_option() {
        None => (0.0, 1.0),
        Some((lo, hi)) if hi - lo <= f64::EPSILON => (lo - 0.5, hi + 0.5),
        Some((lo, hi)) => {
            let pad = 0.05 * (hi - lo);
            (lo - pad, hi + pad)
        }
    }
}

/// A single-axes figure.
#[derive(Clone, Debug, PartialEq)]
pub struct Figure {
    pub width: f64,
    pub height: f64,
    axes: Axes,
}

impl Figure {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            axes: Axes::default(),
        }
    }

    pub fn axes(&self) -> &Axes {
        &self.axes
    }

    pub fn axes_mut(&mut self) -> &mut Axes {
        &mut self.axes
    }

    pub fn to_svg(&self) -> String {
        let mut svg = String::new();
        self.render(&mut svg)
            .expect("write to String is infallible");
        svg
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_svg())
            .map_err(|e| anyhow!("Could not write figure to {}: {}", path.display(), e))?;
        debug!("Wrote figure to {}", path.display());
        Ok(())
    }

    fn render(&self, svg: &mut String) -> std::fmt::Result {
        let (x0, x1, y0, y1) = self.axes.bounds();
        let plot_w = self.width - MARGIN_LEFT - MARGIN_RIGHT;
        let plot_h = self.height - MARGIN_TOP - MARGIN_BOTTOM;
        let px = |x: f64| MARGIN_LEFT + (x - x0) / (x1 - x0) * plot_w;
        let py = |y: f64| MARGIN_TOP + (1.0 - (y - y0) / (y1 - y0)) * plot_h;
        let bottom = MARGIN_TOP + plot_h;

        writeln!(svg, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
        writeln!(
            svg,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" font-family=\"sans-serif\" font-size=\"12\">",
            self.width, self.height
        )?;
        writeln!(svg, "  <rect width=\"100%\" height=\"100%\" fill=\"white\"/>")?;

        for element in &self.axes.elements {
            match element {
                Element::Histogram { edges, counts } => {
                    for (i, &count) in counts.iter().enumerate() {
                        let left = px(edges[i]);
                        let right = px(edges[i + 1]);
                        let top = py(count as f64);
                        writeln!(
                            svg,
                            "  <rect class=\"bar\" x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"{}\" stroke=\"white\"/>",
                            left,
                            top,
                            (right - left).max(0.0),
                            (py(0.0) - top).max(0.0),
                            COLOR
                        )?;
                    }
                }
                Element::Scatter { x, y } => {
                    for (a, b) in x.iter().zip(y) {
                        writeln!(
                            svg,
                            "  <circle class=\"point\" cx=\"{:.2}\" cy=\"{:.2}\" r=\"3\" fill=\"{}\" fill-opacity=\"0.7\"/>",
                            px(*a),
                            py(*b),
                            COLOR
                        )?;
                    }
                }
                Element::Line { x, y } => {
                    let points = x
                        .iter()
                        .zip(y)
                        .map(|(a, b)| format!("{:.2},{:.2}", px(*a), py(*b)))
                        .join(" ");
                    writeln!(
                        svg,
                        "  <polyline class=\"line\" points=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"2\"/>",
                        points, ACCENT
                    )?;
                }
                Element::VLine { x, label } => {
                    writeln!(
                        svg,
                        "  <line class=\"vline\" x1=\"{0:.2}\" y1=\"{1:.2}\" x2=\"{0:.2}\" y2=\"{2:.2}\" stroke=\"black\" stroke-dasharray=\"4 3\"/>",
                        px(*x),
                        MARGIN_TOP,
                        bottom
                    )?;
                    writeln!(
                        svg,
                        "  <text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\">{}</text>",
                        px(*x),
                        MARGIN_TOP - 6.0,
                        escape(label)
                    )?;
                }
                Element::Interval { low, high, label } => {
                    let y = bottom - 10.0;
                    writeln!(
                        svg,
                        "  <line class=\"interval\" x1=\"{:.2}\" y1=\"{2:.2}\" x2=\"{1:.2}\" y2=\"{2:.2}\" stroke=\"black\" stroke-width=\"4\"/>",
                        px(*low),
                        px(*high),
                        y
                    )?;
                    writeln!(
                        svg,
                        "  <text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\">{}</text>",
                        (px(*low) + px(*high)) / 2.0,
                        y - 8.0,
                        escape(label)
                    )?;
                }
            }
        }

        // frame and ticks
        writeln!(
            svg,
            "  <rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"none\" stroke=\"#333\"/>",
            MARGIN_LEFT, MARGIN_TOP, plot_w, plot_h
        )?;
        for tick in linspace(x0, x1, N_TICKS) {
            writeln!(
                svg,
                "  <text class=\"xtick\" x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\">{}</text>",
                px(tick),
                bottom + 16.0,
                format_tick(tick)
            )?;
        }
        for tick in linspace(y0, y1, N_TICKS) {
            writeln!(
                svg,
                "  <text class=\"ytick\" x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"end\">{}</text>",
                MARGIN_LEFT - 6.0,
                py(tick) + 4.0,
                format_tick(tick)
            )?;
        }

        writeln!(
            svg,
            "  <text class=\"xlabel\" x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\">{}</text>",
            MARGIN_LEFT + plot_w / 2.0,
            self.height - 16.0,
            escape(&self.axes.xlabel)
        )?;
        writeln!(
            svg,
            "  <text class=\"ylabel\" x=\"16\" y=\"{0:.2}\" text-anchor=\"middle\" transform=\"rotate(-90 16 {0:.2})\">{1}</text>",
            MARGIN_TOP + plot_h / 2.0,
            escape(&self.axes.ylabel)
        )?;
        if !self.axes.title.is_empty() {
            writeln!(
                svg,
                "  <text class=\"title\" x=\"{:.2}\" y=\"18\" text-anchor=\"middle\" font-size=\"14\" font-weight=\"bold\">{}</text>",
                self.width / 2.0,
                escape(&self.axes.title)
            )?;
        }
        writeln!(svg, "</svg>")
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn format_tick(value: f64) -> String {
    if value.abs() >= 100.0 || value.fract().abs() < 1e-9 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

/// `n` evenly spaced values from `start` to `stop`, both included.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Integer bin edges `min, min + 1, ..., max`. A degenerate range gets a
/// single unit-wide bin.
pub fn integer_edges(min: i64, max: i64) -> Vec<f64> {
    if max <= min {
        return vec![min as f64, min as f64 + 1.0];
    }
    (min..=max).map(|v| v as f64).collect()
}

/// `n_bins` equal-width edges spanning the data.
pub fn even_edges(values: &[f64], n_bins: usize) -> Vec<f64> {
    let (lo, hi) = match values.iter().copied().minmax().into_option() {
        Some((lo, hi)) if hi > lo => (lo, hi),
        Some((lo, _)) => (lo - 0.5, lo + 0.5),
        None => (0.0, 1.0),
    };
    linspace(lo, hi, n_bins.max(1) + 1)
}

/// Counts per bin. Bins are half-open `[e_i, e_i+1)` except the last,
/// which also holds its right edge. Values outside the edges are dropped.
pub fn histogram_counts(values: &[f64], edges: &[f64]) -> Vec<usize> {
    if edges.len() < 2 {
        return Vec::new();
    }
    let n_bins = edges.len() - 1;
    let last = edges[n_bins];
    let mut counts = vec![0; n_bins];
    for &v in values {
        if v < edges[0] || v > last || v.is_nan() {
            continue;
        }
        let bin = if v == last {
            n_bins - 1
        } else {
            edges.partition_point(|&e| e <= v) - 1
        };
        counts[bin] += 1;
    }
    counts
}

/// Histogram of the draws with the posterior mean and the HDI marked.
pub fn plot_posterior(draws: &[f64], name: &str, summary: &PosteriorSummary) -> Figure {
    let mut fig = Figure::new(640.0, 420.0);
    let ax = fig.axes_mut();
    ax.hist(draws, &even_edges(draws, 40));
    ax.axvline(summary.mean, &format!("mean={:.3}", summary.mean));
    ax.interval(
        summary.hdi_low,
        summary.hdi_high,
        &format!(
            "{:.0}% HDI [{:.3}, {:.3}]",
            summary.hdi_prob * 100.0,
            summary.hdi_low,
            summary.hdi_high
        ),
    );
    ax.set_title(name);
    ax.set_xlabel(name);
    ax.set_ylabel("draws");
    fig
}
