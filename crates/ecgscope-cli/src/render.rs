use anyhow::Result;
use ecgscope_lib::plot::{Color as FigureColor, Figure, PlotBackend, Series};
use plotters::prelude::*;
use std::path::{Path, PathBuf};

/// Writes each figure to a PNG file.
pub struct PngBackend {
    path: PathBuf,
    size: (u32, u32),
}

impl PngBackend {
    pub fn new(path: impl Into<PathBuf>, size: (u32, u32)) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

impl PlotBackend for PngBackend {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        draw_figure(&self.path, fig, self.size)
    }
}

fn rgb(color: FigureColor) -> RGBColor {
    let (r, g, b) = color.rgb();
    RGBColor(r, g, b)
}

/// Widen a degenerate range so plotters gets a non-empty axis.
fn padded((lo, hi): (f64, f64)) -> (f64, f64) {
    if hi > lo {
        (lo, hi)
    } else {
        (lo - 0.5, hi + 0.5)
    }
}

fn draw_figure(path: &Path, fig: &Figure, size: (u32, u32)) -> Result<()> {
    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;
    let ((x_min, x_max), (y_min, y_max)) = fig
        .bounds()
        .map(|(x, y)| (padded(x), padded(y)))
        .unwrap_or(((0.0, 1.0), (0.0, 1.0)));
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "ECG".into()),
            ("sans-serif", 24),
        )
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    let mut mesh = chart.configure_mesh();
    if let Some(label) = &fig.x.label {
        mesh.x_desc(label.as_str());
    }
    if let Some(label) = &fig.y.label {
        mesh.y_desc(label.as_str());
    }
    mesh.draw()?;
    for series in &fig.series {
        match series {
            Series::Line(line) => {
                let width = line.style.width.round().max(1.0) as u32;
                let style = rgb(line.style.color).stroke_width(width);
                chart
                    .draw_series(LineSeries::new(
                        line.points.iter().map(|p| (p[0], p[1])),
                        style,
                    ))?
                    .label(line.name.clone())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 16, y)], style));
            }
            Series::Markers(markers) => {
                let color = rgb(markers.color);
                let radius = markers.radius;
                chart
                    .draw_series(
                        markers
                            .points
                            .iter()
                            .map(|p| Circle::new((p[0], p[1]), radius, color.filled())),
                    )?
                    .label(markers.name.clone())
                    .legend(move |(x, y)| Circle::new((x, y), radius, color.filled()));
            }
        }
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}
