//! Figure targets: where a rendered figure ends up.
//!
//! Renderers in [`crate::plotting`] draw onto any plotters backend; this
//! module picks the backend, owns the root drawing area, and reports where the
//! result went.

use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::FigureSize;
use crate::error::Result;

/// Something that can draw itself onto a root drawing area.
pub trait FigureContent {
    fn draw<DB: DrawingBackend>(&self, area: &DrawingArea<DB, Shift>) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FigureTarget {
    Png(PathBuf),
    Svg(PathBuf),
    /// Keep the SVG document in memory for interactive display
    Inline,
}

impl FigureTarget {
    /// `.svg` paths render as SVG, anything else as PNG, no path stays inline.
    pub fn from_path<P: AsRef<Path>>(path: Option<P>) -> Self {
        match path {
            None => FigureTarget::Inline,
            Some(path) => {
                let path = path.as_ref();
                let is_svg = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));
                if is_svg {
                    FigureTarget::Svg(path.to_path_buf())
                } else {
                    FigureTarget::Png(path.to_path_buf())
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedFigure {
    Saved(PathBuf),
    Inline(String),
}

pub fn render<C: FigureContent + ?Sized>(
    content: &C,
    size: FigureSize,
    target: &FigureTarget,
) -> Result<RenderedFigure> {
    match target {
        FigureTarget::Png(path) => {
            let root = BitMapBackend::new(path, size.as_tuple()).into_drawing_area();
            draw_root(content, &root)?;
            info!(path = %path.display(), "figure saved");
            Ok(RenderedFigure::Saved(path.clone()))
        }
        FigureTarget::Svg(path) => {
            let root = SVGBackend::new(path, size.as_tuple()).into_drawing_area();
            draw_root(content, &root)?;
            info!(path = %path.display(), "figure saved");
            Ok(RenderedFigure::Saved(path.clone()))
        }
        FigureTarget::Inline => {
            let mut svg = String::new();
            {
                let root = SVGBackend::with_string(&mut svg, size.as_tuple()).into_drawing_area();
                draw_root(content, &root)?;
            }
            Ok(RenderedFigure::Inline(svg))
        }
    }
}

fn draw_root<C, DB>(content: &C, root: &DrawingArea<DB, Shift>) -> Result<()>
where
    C: FigureContent + ?Sized,
    DB: DrawingBackend,
{
    root.fill(&WHITE)?;
    content.draw(root)?;
    // present explicitly so save failures surface instead of being dropped
    root.present()?;
    Ok(())
}
