use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{PlotError, Result, SurfaceKind};

/// Bounds of one input dimension of the landscape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
}

impl ParameterRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Evenly spaced samples over `[min, max]`, both endpoints included.
    pub fn samples(&self, resolution: usize) -> Result<Vec<f64>> {
        if resolution == 0 {
            return Err(PlotError::InvalidResolution(resolution));
        }
        Ok(linspace(self.min, self.max, resolution))
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(PlotError::InvalidRange {
                name: name.to_string(),
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// `start + i * step` with the last sample pinned to `stop`.
/// A single sample collapses to `start`.
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    if num == 0 {
        return Vec::new();
    }
    if num == 1 {
        return vec![start];
    }

    let step = (stop - start) / (num - 1) as f64;
    let mut samples: Vec<f64> = (0..num).map(|i| start + i as f64 * step).collect();
    samples[num - 1] = stop;
    samples
}

/// Cartesian lattice of q1 (columns) and q2 (rows) samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub q1: Vec<f64>,
    pub q2: Vec<f64>,
}

impl Grid {
    pub fn new(q1: &ParameterRange, q2: &ParameterRange, resolution: usize) -> Result<Self> {
        if resolution == 0 {
            return Err(PlotError::InvalidResolution(resolution));
        }
        q1.validate("q1")?;
        q2.validate("q2")?;

        Ok(Self {
            q1: q1.samples(resolution)?,
            q2: q2.samples(resolution)?,
        })
    }

    pub fn resolution(&self) -> usize {
        self.q1.len()
    }

    /// Coordinates of cell `(row, col)`: row follows q2, column follows q1.
    pub fn point(&self, row: usize, col: usize) -> (f64, f64) {
        (self.q1[col], self.q2[row])
    }

    /// All `[q1, q2]` pairs in row-major (flattened) order.
    pub fn points(&self) -> Vec<[f64; 2]> {
        self.q2
            .iter()
            .flat_map(|&q2| self.q1.iter().map(move |&q1| [q1, q2]))
            .collect()
    }
}

/// One scalar per grid cell, stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSurface")]
pub struct ScoreSurface {
    resolution: usize,
    values: Vec<f64>,
}

/// Serialized form of a [`ScoreSurface`], checked by `from_flat` on load.
#[derive(Debug, Deserialize)]
struct RawSurface {
    resolution: usize,
    values: Vec<f64>,
}

impl TryFrom<RawSurface> for ScoreSurface {
    type Error = PlotError;

    fn try_from(raw: RawSurface) -> Result<Self> {
        Self::from_flat(raw.resolution, raw.values)
    }
}

impl ScoreSurface {
    /// Build a surface from row-major values of length `resolution²`.
    pub fn from_flat(resolution: usize, values: Vec<f64>) -> Result<Self> {
        if resolution == 0 {
            return Err(PlotError::InvalidResolution(resolution));
        }
        let expected = resolution * resolution;
        if values.len() != expected {
            return Err(PlotError::ShapeMismatch {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self { resolution, values })
    }

    /// Build a surface from square nested rows, `rows[i][j]` being cell `(i, j)`.
    pub fn from_nested(rows: &[Vec<f64>]) -> Result<Self> {
        let n = rows.len();
        if let Some(row) = rows.iter().find(|row| row.len() != n) {
            return Err(PlotError::ShapeMismatch {
                expected: n,
                actual: row.len(),
            });
        }
        Self::from_flat(n, rows.concat())
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.resolution + col]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.values.chunks(self.resolution)
    }

    pub fn to_nested(&self) -> Vec<Vec<f64>> {
        self.rows().map(|row| row.to_vec()).collect()
    }

    pub fn min(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Flattened argmin as `(row, col)`. Ties resolve to the first cell in scan order.
    pub fn argmin(&self) -> (usize, usize) {
        let mut best = 0;
        for (idx, value) in self.values.iter().enumerate() {
            if *value < self.values[best] {
                best = idx;
            }
        }
        (best / self.resolution, best % self.resolution)
    }
}

/// Grid index and coordinates of a surface minimum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinimumLocation {
    pub row: usize,
    pub col: usize,
    pub q1: f64,
    pub q2: f64,
    pub value: f64,
}

impl MinimumLocation {
    fn locate(grid: &Grid, surface: &ScoreSurface) -> Self {
        let (row, col) = surface.argmin();
        let (q1, q2) = grid.point(row, col);
        Self {
            row,
            col,
            q1,
            q2,
            value: surface.get(row, col),
        }
    }
}

/// Ground-truth and prior-mean surfaces evaluated on one grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandscapeComparison {
    pub grid: Grid,
    pub ground_truth: ScoreSurface,
    pub prior_mean: ScoreSurface,
    /// Shared `(min, max)` colour scale across both surfaces
    pub value_range: (f64, f64),
    pub ground_truth_min: MinimumLocation,
    pub prior_mean_min: MinimumLocation,
}

impl LandscapeComparison {
    pub fn from_surfaces(
        grid: Grid,
        ground_truth: ScoreSurface,
        prior_mean: ScoreSurface,
    ) -> Result<Self> {
        let n = grid.resolution();
        if n == 0 {
            return Err(PlotError::InvalidResolution(n));
        }
        if grid.q2.len() != n {
            return Err(PlotError::ShapeMismatch {
                expected: n,
                actual: grid.q2.len(),
            });
        }
        for surface in [&ground_truth, &prior_mean] {
            if surface.resolution() != n {
                return Err(PlotError::ShapeMismatch {
                    expected: n * n,
                    actual: surface.values().len(),
                });
            }
        }

        let value_range = (
            ground_truth.min().min(prior_mean.min()),
            ground_truth.max().max(prior_mean.max()),
        );
        let ground_truth_min = MinimumLocation::locate(&grid, &ground_truth);
        let prior_mean_min = MinimumLocation::locate(&grid, &prior_mean);

        Ok(Self {
            grid,
            ground_truth,
            prior_mean,
            value_range,
            ground_truth_min,
            prior_mean_min,
        })
    }

    /// Save the evaluated comparison to a JSON file
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Load a saved comparison. Shapes are re-checked and the value range
    /// and minima are recomputed from the surfaces.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        let stored: StoredComparison = serde_json::from_str(&json)?;
        let ground_truth =
            ScoreSurface::from_flat(stored.ground_truth.resolution, stored.ground_truth.values)?;
        let prior_mean =
            ScoreSurface::from_flat(stored.prior_mean.resolution, stored.prior_mean.values)?;
        Self::from_surfaces(stored.grid, ground_truth, prior_mean)
    }
}

#[derive(Debug, Deserialize)]
struct StoredComparison {
    grid: Grid,
    ground_truth: RawSurface,
    prior_mean: RawSurface,
}

fn check_finite(surface: SurfaceKind, index: usize, n: usize, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PlotError::NonFiniteScore {
            surface,
            row: index / n,
            col: index % n,
        })
    }
}

/// Call `score(q1[col], q2[row])` once per cell in row-major order.
pub fn evaluate_surface<F, E>(
    grid: &Grid,
    surface: SurfaceKind,
    mut score: F,
) -> Result<ScoreSurface>
where
    F: FnMut(f64, f64) -> std::result::Result<f64, E>,
    E: Display,
{
    let n = grid.resolution();
    let mut values = Vec::with_capacity(n * n);

    for row in 0..n {
        for col in 0..n {
            let (q1, q2) = grid.point(row, col);
            let value = score(q1, q2).map_err(|e| PlotError::Scoring {
                surface,
                row,
                col,
                message: e.to_string(),
            })?;
            values.push(check_finite(surface, row * n + col, n, value)?);
        }
    }

    debug!(%surface, evaluations = n * n, "surface evaluated");
    ScoreSurface::from_flat(n, values)
}

/// Evaluate two scalar functions over the same q1 × q2 grid.
///
/// The grid is validated before either function is called. Any failing
/// call aborts the whole evaluation.
pub fn evaluate_comparison<A, B, EA, EB>(
    q1: &ParameterRange,
    q2: &ParameterRange,
    resolution: usize,
    eval_a: A,
    eval_b: B,
) -> Result<LandscapeComparison>
where
    A: FnMut(f64, f64) -> std::result::Result<f64, EA>,
    B: FnMut(f64, f64) -> std::result::Result<f64, EB>,
    EA: Display,
    EB: Display,
{
    let grid = Grid::new(q1, q2, resolution)?;
    let ground_truth = evaluate_surface(&grid, SurfaceKind::GroundTruth, eval_a)?;
    let prior_mean = evaluate_surface(&grid, SurfaceKind::PriorMean, eval_b)?;
    LandscapeComparison::from_surfaces(grid, ground_truth, prior_mean)
}

/// Named quadrupole strengths handed to an objective function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadrupoleSetting {
    pub q1: f64,
    pub q2: f64,
}

/// Objective output: `mae` plus any further named metrics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Objective {
    pub mae: f64,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, f64>,
}

impl Objective {
    pub fn new(mae: f64) -> Self {
        Self {
            mae,
            metrics: BTreeMap::new(),
        }
    }
}

pub trait ObjectiveFunction {
    type Error: Display;

    fn evaluate(
        &mut self,
        setting: QuadrupoleSetting,
    ) -> std::result::Result<Objective, Self::Error>;
}

impl<F, E> ObjectiveFunction for F
where
    F: FnMut(QuadrupoleSetting) -> std::result::Result<Objective, E>,
    E: Display,
{
    type Error = E;

    fn evaluate(&mut self, setting: QuadrupoleSetting) -> std::result::Result<Objective, E> {
        self(setting)
    }
}

/// A learned model predicting the objective for a batch of `[q1, q2]` inputs.
pub trait PriorMeanModel {
    type Error: Display;

    fn predict(&self, inputs: &[[f64; 2]]) -> std::result::Result<Vec<f64>, Self::Error>;
}

impl<F, E> PriorMeanModel for F
where
    F: Fn(&[[f64; 2]]) -> std::result::Result<Vec<f64>, E>,
    E: Display,
{
    type Error = E;

    fn predict(&self, inputs: &[[f64; 2]]) -> std::result::Result<Vec<f64>, E> {
        self(inputs)
    }
}

/// Compare an objective's `mae` landscape with a prior-mean model's predictions.
///
/// The objective is called once per cell; the model receives the whole grid as
/// a single row-major batch.
pub fn compare_landscape<O, M>(
    objective: &mut O,
    model: &M,
    q1: &ParameterRange,
    q2: &ParameterRange,
    resolution: usize,
) -> Result<LandscapeComparison>
where
    O: ObjectiveFunction,
    M: PriorMeanModel,
{
    let grid = Grid::new(q1, q2, resolution)?;
    let n = grid.resolution();

    let ground_truth = evaluate_surface(&grid, SurfaceKind::GroundTruth, |q1, q2| {
        objective
            .evaluate(QuadrupoleSetting { q1, q2 })
            .map(|objective| objective.mae)
    })?;

    let predictions = model
        .predict(&grid.points())
        .map_err(|e| PlotError::Model(e.to_string()))?;
    if predictions.len() != n * n {
        return Err(PlotError::ShapeMismatch {
            expected: n * n,
            actual: predictions.len(),
        });
    }
    let predictions = predictions
        .into_iter()
        .enumerate()
        .map(|(idx, value)| check_finite(SurfaceKind::PriorMean, idx, n, value))
        .collect::<Result<Vec<f64>>>()?;
    let prior_mean = ScoreSurface::from_flat(n, predictions)?;

    let comparison = LandscapeComparison::from_surfaces(grid, ground_truth, prior_mean)?;
    info!(
        resolution = n,
        gt_min_q1 = comparison.ground_truth_min.q1,
        gt_min_q2 = comparison.ground_truth_min.q2,
        prior_min_q1 = comparison.prior_mean_min.q1,
        prior_min_q2 = comparison.prior_mean_min.q2,
        "landscape comparison evaluated"
    );
    Ok(comparison)
}
