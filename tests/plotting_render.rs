//! Renders every figure onto a recording backend.
//!
//! The backend answers text measurement itself, so these tests run the full
//! chart layout without touching system fonts.

use cheetah_plots::{
    grid::{evaluate_comparison, ParameterRange},
    history::{
        BeamParameters, MagnetSettings, Misalignments, QuadrupoleMisalignment,
        SystemIdentificationHistory, TuningHistory,
    },
    plotting::{
        plot_landscape_comparison, plot_system_identification_training, plot_tuning_history,
    },
};
use plotters::prelude::*;
use plotters_backend::{BackendColor, BackendCoord, BackendTextStyle, DrawingErrorKind};
use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;

#[derive(Clone, Default)]
struct Recorded {
    texts: Rc<RefCell<Vec<String>>>,
    pixels: Rc<Cell<usize>>,
}

impl Recorded {
    fn has_text(&self, needle: &str) -> bool {
        self.texts.borrow().iter().any(|t| t.contains(needle))
    }
}

struct RecordingBackend {
    size: (u32, u32),
    recorded: Recorded,
}

impl DrawingBackend for RecordingBackend {
    type ErrorType = std::io::Error;

    fn get_size(&self) -> (u32, u32) {
        self.size
    }

    fn ensure_prepared(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        Ok(())
    }

    fn present(&mut self) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        Ok(())
    }

    fn draw_pixel(
        &mut self,
        _point: BackendCoord,
        _color: BackendColor,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.recorded.pixels.set(self.recorded.pixels.get() + 1);
        Ok(())
    }

    fn draw_text<TStyle: BackendTextStyle>(
        &mut self,
        text: &str,
        _style: &TStyle,
        _pos: BackendCoord,
    ) -> Result<(), DrawingErrorKind<Self::ErrorType>> {
        self.recorded.texts.borrow_mut().push(text.to_string());
        Ok(())
    }

    fn estimate_text_size<TStyle: BackendTextStyle>(
        &self,
        text: &str,
        _style: &TStyle,
    ) -> Result<(u32, u32), DrawingErrorKind<Self::ErrorType>> {
        Ok((text.chars().count() as u32 * 7, 12))
    }
}

type RecordingArea = DrawingArea<RecordingBackend, plotters::coord::Shift>;

fn recording_area(width: u32, height: u32) -> (RecordingArea, Recorded) {
    let recorded = Recorded::default();
    let backend = RecordingBackend {
        size: (width, height),
        recorded: recorded.clone(),
    };
    (backend.into_drawing_area(), recorded)
}

fn tuning_history(iterations: usize) -> TuningHistory {
    let mut history = TuningHistory::default();
    for i in 0..iterations {
        let t = i as f64;
        history.loss.push(1.0 / (1.0 + t));
        history.beam_parameters.push(BeamParameters {
            mu_x: 1e-4 / (1.0 + t),
            sigma_x: 2e-4,
            mu_y: -1e-4 / (1.0 + t),
            sigma_y: 1.5e-4,
        });
        history.magnet_settings.push(MagnetSettings {
            q1: 10.0 + t,
            q2: -10.0 - t,
            cv: 1e-3,
            q3: 5.0,
            ch: -1e-3 * t,
        });
    }
    history
}

fn system_identification_history(epochs: usize) -> SystemIdentificationHistory {
    let mut history = SystemIdentificationHistory::default();
    for i in 0..epochs {
        let decay = 1.0 / (1.0 + i as f64);
        history.loss.push(decay);
        history.misalignment_q1.push(QuadrupoleMisalignment {
            x: 1e-4 * decay,
            y: -2e-4 * decay,
        });
        history.misalignment_q2.push(QuadrupoleMisalignment {
            x: 3e-4 * decay,
            y: 0.0,
        });
        history.misalignment_q3.push(QuadrupoleMisalignment {
            x: -1e-4,
            y: 2e-4 * decay,
        });
    }
    history
}

#[test]
fn tuning_history_draws_four_labelled_panels_without_mutation() {
    let history = tuning_history(20);
    let before = history.clone();
    let (root, recorded) = recording_area(1600, 300);

    let panels = plot_tuning_history(&history, &root).expect("tuning history should render");

    assert_eq!(panels.len(), 4);
    assert_eq!(panels[0].dim_in_pixel(), (400, 300));
    for label in [
        "Beam parameters",
        "Quadrupole settings",
        "Steerer settings",
        "sigma_y",
        "AREAMQZM3",
        "AREAMCHM1",
        "Iteration",
    ] {
        assert!(recorded.has_text(label), "missing text {label:?}");
    }
    assert!(recorded.pixels.get() > 0);
    assert_eq!(history, before);
}

#[test]
fn system_identification_draws_ground_truth_and_keeps_history() {
    let history = system_identification_history(15);
    let before = history.clone();
    let truth = Misalignments::from_flat(&[1e-4, -2e-4, 3e-4, 0.0, -1e-4, 2e-4]).unwrap();
    let (root, recorded) = recording_area(700, 760);

    let panels = plot_system_identification_training(&history, Some(&truth), &root)
        .expect("system identification should render");

    assert_eq!(panels.len(), 3);
    for label in ["x misalignment (mm)", "y misalignment (mm)", "Epoch", "Q1", "Q3"] {
        assert!(recorded.has_text(label), "missing text {label:?}");
    }
    assert_eq!(history, before);
}

#[test]
fn empty_histories_still_render() {
    let (root, _) = recording_area(1600, 300);
    plot_tuning_history(&TuningHistory::default(), &root).expect("empty tuning history");

    let (root, _) = recording_area(700, 760);
    plot_system_identification_training(&SystemIdentificationHistory::default(), None, &root)
        .expect("empty system identification history");
}

#[test]
fn landscape_comparison_draws_both_maps_and_colour_bar() {
    let range = ParameterRange::new(-1.0, 1.0);
    let comparison = evaluate_comparison(
        &range,
        &range,
        8,
        |q1, q2| Ok::<_, Infallible>(q1 * q1 + q2 * q2),
        |q1, q2| Ok::<_, Infallible>((q1 - 0.2).abs() + (q2 + 0.1).abs()),
    )
    .unwrap();
    let (root, recorded) = recording_area(1200, 500);

    let panels = plot_landscape_comparison(&comparison, &root).expect("landscape should render");

    assert_eq!(panels.len(), 3);
    for label in ["Ground truth", "Prior mean model", "MAE", "q1 (1/m^2)", "min ("] {
        assert!(recorded.has_text(label), "missing text {label:?}");
    }
}

#[test]
fn single_point_landscape_renders() {
    let comparison = evaluate_comparison(
        &ParameterRange::new(0.5, 0.5),
        &ParameterRange::new(2.0, 2.0),
        1,
        |_, _| Ok::<_, Infallible>(1.0),
        |_, _| Ok::<_, Infallible>(1.0),
    )
    .unwrap();
    assert_eq!(comparison.value_range, (1.0, 1.0));

    let (root, _) = recording_area(600, 300);
    plot_landscape_comparison(&comparison, &root).expect("degenerate landscape should render");
}
