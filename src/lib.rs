//! Plotting helpers for Cheetah beam-tuning tutorials.
//!
//! - [`grid`] evaluates an objective and a prior-mean model over a q1 × q2 grid
//! - [`history`] holds validated tuning / system-identification histories
//! - [`plotting`] draws them onto explicit plotters drawing areas
//! - [`figure`] saves the result as PNG/SVG or keeps it as an inline SVG

pub mod config;
pub mod error;
pub mod figure;
pub mod grid;
pub mod history;
pub mod plotting;

pub use error::{PlotError, Result};
