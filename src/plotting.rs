use plotters::coord::Shift;
use plotters::prelude::*;
use std::ops::Range;
use tracing::debug;

use crate::error::Result;
use crate::figure::FigureContent;
use crate::grid::{Grid, LandscapeComparison, MinimumLocation, ScoreSurface};
use crate::history::{
    Misalignments, QuadrupoleMisalignment, SystemIdentificationHistory, TuningHistory,
};

const FONT: &str = "sans-serif";

// matplotlib tab10
const TAB_BLUE: RGBColor = RGBColor(0x1f, 0x77, 0xb4);
const TAB_ORANGE: RGBColor = RGBColor(0xff, 0x7f, 0x0e);
const TAB_GREEN: RGBColor = RGBColor(0x2c, 0xa0, 0x2c);
const TAB_RED: RGBColor = RGBColor(0xd6, 0x27, 0x28);

const MISALIGNMENT_X_COLORS: [RGBColor; 3] = [
    RGBColor(0xFF, 0x6F, 0x61),
    RGBColor(0x6B, 0x5B, 0x95),
    RGBColor(0x88, 0xB0, 0x4B),
];
const MISALIGNMENT_Y_COLORS: [RGBColor; 3] = [
    RGBColor(0xFF, 0xD7, 0x00),
    RGBColor(0x40, 0xE0, 0xD0),
    RGBColor(0xFF, 0x7E, 0x5F),
];
const QUADRUPOLE_LABELS: [&str; 3] = ["Q1", "Q2", "Q3"];

/// Viridis colormap - maps value in [0, 1] to RGB
pub fn viridis_color(t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);
    // Viridis colormap approximation (purple → cyan → yellow)
    let r = (0.267 + t * (0.329 - 0.267 + t * (0.984 - 0.329))) * 255.0;
    let g = (0.005 + t * (0.569 - 0.005 + t * (0.906 - 0.569))) * 255.0;
    let b = (0.329 + t * (0.758 - 0.329 - t * (0.758 - 0.121))) * 255.0;

    RGBColor(
        r.clamp(0.0, 255.0) as u8,
        g.clamp(0.0, 255.0) as u8,
        b.clamp(0.0, 255.0) as u8,
    )
}

/// Position of `value` on the shared colour scale, in [0, 1].
pub fn normalize(value: f64, (lo, hi): (f64, f64)) -> f64 {
    let span = hi - lo;
    if span <= 0.0 {
        return 0.0;
    }
    ((value - lo) / span).clamp(0.0, 1.0)
}

/// Axis range covering all values with a small margin; flat data gets a unit band.
fn padded_range(values: impl IntoIterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

    if lo > hi {
        return 0.0..1.0;
    }
    let span = hi - lo;
    if span == 0.0 {
        let pad = if lo == 0.0 { 1.0 } else { lo.abs() * 0.1 };
        return (lo - pad)..(hi + pad);
    }
    (lo - span * 0.05)..(hi + span * 0.05)
}

/// Cell boundaries around each sample: midpoints between neighbours, with the
/// outer cells mirrored. Returns `samples.len() + 1` edges.
fn cell_edges(samples: &[f64]) -> Vec<f64> {
    match samples {
        [] => Vec::new(),
        [single] => vec![single - 0.5, single + 0.5],
        _ => {
            let n = samples.len();
            let mut edges = Vec::with_capacity(n + 1);
            edges.push(samples[0] - (samples[1] - samples[0]) / 2.0);
            edges.extend(samples.windows(2).map(|pair| (pair[0] + pair[1]) / 2.0));
            edges.push(samples[n - 1] + (samples[n - 1] - samples[n - 2]) / 2.0);
            edges
        }
    }
}

struct Line {
    label: String,
    values: Vec<f64>,
    color: RGBColor,
}

impl Line {
    fn new(label: &str, values: impl IntoIterator<Item = f64>, color: RGBColor) -> Self {
        Self {
            label: label.to_string(),
            values: values.into_iter().collect(),
            color,
        }
    }
}

/// Dashed horizontal reference line
struct Reference {
    value: f64,
    color: RGBColor,
}

struct LinePanel<'a> {
    title: Option<&'a str>,
    x_desc: Option<&'a str>,
    y_desc: &'a str,
    lines: Vec<Line>,
    references: Vec<Reference>,
    legend: bool,
}

fn draw_line_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &LinePanel,
) -> Result<()> {
    let len = panel.lines.iter().map(|l| l.values.len()).max().unwrap_or(0);
    let x_max = len.saturating_sub(1).max(1) as f64;
    let y_range = padded_range(
        panel
            .lines
            .iter()
            .flat_map(|l| l.values.iter().copied())
            .chain(panel.references.iter().map(|r| r.value)),
    );

    let mut builder = ChartBuilder::on(area);
    builder
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(65);
    if let Some(title) = panel.title {
        builder.caption(title, (FONT, 18).into_font());
    }
    let mut chart = builder.build_cartesian_2d(0f64..x_max, y_range)?;

    let mut mesh = chart.configure_mesh();
    mesh.y_desc(panel.y_desc);
    if let Some(x_desc) = panel.x_desc {
        mesh.x_desc(x_desc);
    }
    mesh.draw()?;

    for line in &panel.lines {
        let color = line.color;
        chart
            .draw_series(LineSeries::new(
                line.values.iter().enumerate().map(|(i, v)| (i as f64, *v)),
                color.stroke_width(2),
            ))?
            .label(line.label.as_str())
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
            });
    }

    let dash = x_max / 40.0;
    for reference in &panel.references {
        let style = reference.color.stroke_width(2);
        let value = reference.value;
        chart.draw_series((0..40).step_by(2).map(|k| {
            let start = k as f64 * dash;
            PathElement::new(vec![(start, value), (start + dash, value)], style)
        }))?;
    }

    if panel.legend {
        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;
    }

    Ok(())
}

/// Plot the gradient-based tuning history as four panels in one row: loss,
/// beam parameters, quadrupole strengths and steerer angles.
///
/// Returns the panel areas so callers can annotate them further.
pub fn plot_tuning_history<DB: DrawingBackend>(
    history: &TuningHistory,
    area: &DrawingArea<DB, Shift>,
) -> Result<Vec<DrawingArea<DB, Shift>>> {
    let panels = area.split_evenly((1, 4));
    let beams = &history.beam_parameters;
    let magnets = &history.magnet_settings;

    draw_line_panel(
        &panels[0],
        &LinePanel {
            title: Some("Loss"),
            x_desc: Some("Iteration"),
            y_desc: "Loss",
            lines: vec![Line::new("loss", history.loss.iter().copied(), TAB_BLUE)],
            references: Vec::new(),
            legend: false,
        },
    )?;

    draw_line_panel(
        &panels[1],
        &LinePanel {
            title: Some("Beam parameters"),
            x_desc: Some("Iteration"),
            y_desc: "Beam parameter (m)",
            lines: vec![
                Line::new("mu_x", beams.iter().map(|b| b.mu_x), TAB_BLUE),
                Line::new("sigma_x", beams.iter().map(|b| b.sigma_x), TAB_ORANGE),
                Line::new("mu_y", beams.iter().map(|b| b.mu_y), TAB_GREEN),
                Line::new("sigma_y", beams.iter().map(|b| b.sigma_y), TAB_RED),
            ],
            references: Vec::new(),
            legend: true,
        },
    )?;

    draw_line_panel(
        &panels[2],
        &LinePanel {
            title: Some("Quadrupole settings"),
            x_desc: Some("Iteration"),
            y_desc: "Quadrupole strength (1/m^2)",
            lines: vec![
                Line::new("AREAMQZM1", magnets.iter().map(|m| m.q1), TAB_BLUE),
                Line::new("AREAMQZM2", magnets.iter().map(|m| m.q2), TAB_ORANGE),
                Line::new("AREAMQZM3", magnets.iter().map(|m| m.q3), TAB_GREEN),
            ],
            references: Vec::new(),
            legend: true,
        },
    )?;

    draw_line_panel(
        &panels[3],
        &LinePanel {
            title: Some("Steerer settings"),
            x_desc: Some("Iteration"),
            y_desc: "Steering angle (rad)",
            lines: vec![
                Line::new("AREAMCVM1", magnets.iter().map(|m| m.cv), TAB_BLUE),
                Line::new("AREAMCHM1", magnets.iter().map(|m| m.ch), TAB_ORANGE),
            ],
            references: Vec::new(),
            legend: true,
        },
    )?;

    debug!(iterations = history.loss.len(), "tuning history plotted");
    Ok(panels)
}

fn misalignment_lines(
    history: &SystemIdentificationHistory,
    component: fn(&QuadrupoleMisalignment) -> f64,
    colors: &[RGBColor; 3],
) -> Vec<Line> {
    history
        .misalignments()
        .iter()
        .zip(QUADRUPOLE_LABELS)
        .zip(colors)
        .map(|((series, label), color)| {
            Line::new(label, series.iter().map(|m| component(m) * 1e3), *color)
        })
        .collect()
}

fn ground_truth_references(
    ground_truth: Option<&Misalignments>,
    component: fn(&QuadrupoleMisalignment) -> f64,
    colors: &[RGBColor; 3],
) -> Vec<Reference> {
    ground_truth
        .map(|truth| {
            truth
                .as_array()
                .iter()
                .zip(colors)
                .map(|(m, color)| Reference {
                    value: component(m) * 1e3,
                    color: *color,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Plot system-identification training: loss, then x and y misalignment of
/// each quadrupole in millimetres. Ground-truth misalignments, when given, are
/// drawn as dashed lines in the matching colour.
pub fn plot_system_identification_training<DB: DrawingBackend>(
    history: &SystemIdentificationHistory,
    ground_truth: Option<&Misalignments>,
    area: &DrawingArea<DB, Shift>,
) -> Result<Vec<DrawingArea<DB, Shift>>> {
    let panels = area.split_evenly((3, 1));
    let x_of = |m: &QuadrupoleMisalignment| m.x;
    let y_of = |m: &QuadrupoleMisalignment| m.y;

    draw_line_panel(
        &panels[0],
        &LinePanel {
            title: None,
            x_desc: None,
            y_desc: "Loss",
            lines: vec![Line::new("loss", history.loss.iter().copied(), TAB_BLUE)],
            references: Vec::new(),
            legend: false,
        },
    )?;

    draw_line_panel(
        &panels[1],
        &LinePanel {
            title: None,
            x_desc: None,
            y_desc: "x misalignment (mm)",
            lines: misalignment_lines(history, x_of, &MISALIGNMENT_X_COLORS),
            references: ground_truth_references(ground_truth, x_of, &MISALIGNMENT_X_COLORS),
            legend: true,
        },
    )?;

    draw_line_panel(
        &panels[2],
        &LinePanel {
            title: None,
            x_desc: Some("Epoch"),
            y_desc: "y misalignment (mm)",
            lines: misalignment_lines(history, y_of, &MISALIGNMENT_Y_COLORS),
            references: ground_truth_references(ground_truth, y_of, &MISALIGNMENT_Y_COLORS),
            legend: true,
        },
    )?;

    debug!(
        epochs = history.loss.len(),
        with_ground_truth = ground_truth.is_some(),
        "system identification training plotted"
    );
    Ok(panels)
}

fn draw_heatmap<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    title: &str,
    grid: &Grid,
    surface: &ScoreSurface,
    minimum: &MinimumLocation,
    value_range: (f64, f64),
) -> Result<()> {
    let q1_edges = cell_edges(&grid.q1);
    let q2_edges = cell_edges(&grid.q2);
    let q1_range = padded_range(q1_edges.iter().copied());
    let q2_range = padded_range(q2_edges.iter().copied());

    let mut chart = ChartBuilder::on(area)
        .caption(title, (FONT, 20).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(q1_range, q2_range)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("q1 (1/m^2)")
        .y_desc("q2 (1/m^2)")
        .draw()?;

    chart.draw_series(surface.rows().enumerate().flat_map(|(row, values)| {
        let q1_edges = &q1_edges;
        let q2_edges = &q2_edges;
        values.iter().enumerate().map(move |(col, value)| {
            let color = viridis_color(normalize(*value, value_range));
            Rectangle::new(
                [
                    (q1_edges[col], q2_edges[row]),
                    (q1_edges[col + 1], q2_edges[row + 1]),
                ],
                color.filled(),
            )
        })
    }))?;

    chart
        .draw_series(std::iter::once(Cross::new(
            (minimum.q1, minimum.q2),
            8,
            TAB_RED.stroke_width(3),
        )))?
        .label(format!("min ({:.3}, {:.3})", minimum.q1, minimum.q2))
        .legend(|(x, y)| Cross::new((x + 10, y), 6, TAB_RED.stroke_width(2)));

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    Ok(())
}

fn draw_colorbar<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    value_range: (f64, f64),
) -> Result<()> {
    const STEPS: usize = 100;
    let (lo, hi) = value_range;
    let y_range = padded_range([lo, hi]);
    let (y_lo, y_hi) = (y_range.start, y_range.end);

    let mut chart = ChartBuilder::on(area)
        .margin_top(40)
        .margin_bottom(50)
        .margin_right(10)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..1f64, y_range)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .disable_x_axis()
        .y_desc("MAE")
        .draw()?;

    let step = (y_hi - y_lo) / STEPS as f64;
    chart.draw_series((0..STEPS).map(|k| {
        let bottom = y_lo + k as f64 * step;
        let color = viridis_color(normalize(bottom + step / 2.0, value_range));
        Rectangle::new([(0.0, bottom), (1.0, bottom + step)], color.filled())
    }))?;

    Ok(())
}

/// Plot the ground-truth objective next to the prior-mean model on one shared
/// colour scale, marking each surface's minimum.
///
/// Returns the ground-truth panel, the prior-mean panel and the colour bar.
pub fn plot_landscape_comparison<DB: DrawingBackend>(
    comparison: &LandscapeComparison,
    area: &DrawingArea<DB, Shift>,
) -> Result<Vec<DrawingArea<DB, Shift>>> {
    let (width, _) = area.dim_in_pixel();
    let colorbar_width = (width / 10).max(60).min(width / 2);
    let (maps, colorbar) = area.split_horizontally(width.saturating_sub(colorbar_width) as i32);
    let mut panels = maps.split_evenly((1, 2));

    draw_heatmap(
        &panels[0],
        "Ground truth",
        &comparison.grid,
        &comparison.ground_truth,
        &comparison.ground_truth_min,
        comparison.value_range,
    )?;
    draw_heatmap(
        &panels[1],
        "Prior mean model",
        &comparison.grid,
        &comparison.prior_mean,
        &comparison.prior_mean_min,
        comparison.value_range,
    )?;
    draw_colorbar(&colorbar, comparison.value_range)?;

    debug!(
        resolution = comparison.grid.resolution(),
        lo = comparison.value_range.0,
        hi = comparison.value_range.1,
        "landscape comparison plotted"
    );
    panels.push(colorbar);
    Ok(panels)
}

pub struct TuningHistoryFigure<'a>(pub &'a TuningHistory);

impl FigureContent for TuningHistoryFigure<'_> {
    fn draw<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>) -> Result<()> {
        plot_tuning_history(self.0, area).map(|_| ())
    }
}

pub struct SystemIdentificationFigure<'a> {
    pub history: &'a SystemIdentificationHistory,
    pub ground_truth: Option<&'a Misalignments>,
}

impl FigureContent for SystemIdentificationFigure<'_> {
    fn draw<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>) -> Result<()> {
        plot_system_identification_training(self.history, self.ground_truth, area).map(|_| ())
    }
}

pub struct LandscapeFigure<'a>(pub &'a LandscapeComparison);

impl FigureContent for LandscapeFigure<'_> {
    fn draw<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>) -> Result<()> {
        plot_landscape_comparison(self.0, area).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viridis_endpoints_match_colormap() {
        let low = viridis_color(0.0);
        let high = viridis_color(1.0);
        // dark purple at the bottom, yellow at the top
        assert!(low.2 > low.0 && low.2 > low.1);
        assert!(high.0 > 200 && high.1 > 200 && high.2 < 60);
        assert_eq!(viridis_color(-3.0), low);
        assert_eq!(viridis_color(7.0), high);
    }

    #[test]
    fn normalize_uses_shared_scale() {
        assert_eq!(normalize(0.0, (0.0, 2.0)), 0.0);
        assert_eq!(normalize(1.0, (0.0, 2.0)), 0.5);
        assert_eq!(normalize(2.0, (0.0, 2.0)), 1.0);
        assert_eq!(normalize(5.0, (0.0, 2.0)), 1.0);
        // flat surfaces sit at the bottom of the scale
        assert_eq!(normalize(3.0, (3.0, 3.0)), 0.0);
    }

    #[test]
    fn cell_edges_surround_samples() {
        assert_eq!(cell_edges(&[0.0, 1.0, 2.0]), vec![-0.5, 0.5, 1.5, 2.5]);
        assert_eq!(cell_edges(&[4.0]), vec![3.5, 4.5]);
        assert!(cell_edges(&[]).is_empty());
    }

    #[test]
    fn padded_range_handles_flat_and_empty_data() {
        assert_eq!(padded_range([0.0, 0.0]), -1.0..1.0);
        assert_eq!(padded_range([-5.0]), -5.5..-4.5);
        assert_eq!(padded_range(std::iter::empty()), 0.0..1.0);

        let range = padded_range([0.0, 10.0, f64::NAN]);
        assert_eq!(range, -0.5..10.5);
    }
}
