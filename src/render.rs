//! Scene drawing: the [`Renderer`] seam, the SVG backend, and the layers
//! (legend, graticule, regions) drawn through it.

use crate::config::AppConfig;
use crate::interaction::{FocusTarget, ZoomTransition};
use crate::path::{graticule, num, PathRenderer};
use crate::projection::Projection;
use crate::scale::ColorScale;
use crate::types::{Dataset, RegionId};
use anyhow::{anyhow, Result};
use geo::{coord, Rect};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write;
use tracing::info;

/// Drawing capabilities the map needs from a surface.
pub trait Renderer {
    fn draw_background(&mut self, width: f64, height: f64);
    fn draw_legend(&mut self, legend: &Legend);
    fn draw_graticule(&mut self, d: &str);
    fn draw_region(&mut self, id: RegionId, d: &str, fill: &str);
    fn draw_text(&mut self, label: &Label);
    fn remove_text(&mut self);
    fn set_class(&mut self, id: RegionId, class: &str, on: bool);
    fn set_transform(&mut self, transition: &ZoomTransition, stroke_width: f64);
}

/// Region name shown at the centroid of the focused region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Label {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub region: RegionId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegendText {
    pub text: String,
    pub x: f64,
    pub y: f64,
}

/// Vertical gradient bar with the scale's end values.
#[derive(Debug, Clone)]
pub struct Legend {
    pub stops: Vec<(f64, String)>,
    pub bar: LegendBar,
    pub labels: Vec<LegendText>,
}

#[derive(Debug, Clone, Copy)]
pub struct LegendBar {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotate: f64,
}

impl Legend {
    pub fn from_scale(scale: &ColorScale, min_label: &str, max_label: &str) -> Self {
        let colors = scale.range();
        let last = (colors.len().max(2) - 1) as f64;
        let stops = colors
            .iter()
            .enumerate()
            .map(|(i, c)| (i as f64 / last, c.clone()))
            .collect();
        Self {
            stops,
            // Drawn horizontally then rotated a quarter turn to stand on the right edge.
            bar: LegendBar { x: -480.0, y: 900.0, width: 200.0, height: 20.0, rotate: 270.0 },
            labels: vec![
                LegendText { text: min_label.to_string(), x: 880.0, y: 480.0 },
                LegendText { text: max_label.to_string(), x: 860.0, y: 290.0 },
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegionShape {
    pub id: RegionId,
    pub d: String,
    pub fill: String,
    pub centroid: Option<(f64, f64)>,
    pub name: String,
}

/// Everything derived from the dataset that the map draws.
#[derive(Debug, Clone)]
pub struct MapLayers {
    pub legend: Legend,
    pub graticule: String,
    pub regions: Vec<RegionShape>,
}

impl MapLayers {
    pub fn build(
        config: &AppConfig,
        dataset: &Dataset,
        projection: &Projection,
        scale: &ColorScale,
    ) -> Result<Self> {
        let path = PathRenderer::new(projection);
        let year = config.input.year.as_str();

        let regions = dataset
            .regions
            .par_iter()
            .enumerate()
            .map(|(i, region)| -> Result<RegionShape> {
                let population = region.population_in(year).ok_or_else(|| {
                    anyhow!("Region '{}' has no population for {}", region.name, year)
                })?;
                Ok(RegionShape {
                    id: RegionId(i),
                    d: path.svg_path(&region.geometry),
                    fill: scale.color(population as f64).to_string(),
                    centroid: path.centroid(&region.geometry),
                    name: region.display_name().to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let graticule = match dataset.bounds() {
            Some(bounds) => path.svg_line_path(&graticule(
                graticule_extent(bounds, projection, config.canvas.width, config.canvas.height),
                config.graticule.step,
                config.graticule.margin,
            )),
            None => String::new(),
        };

        info!("Built {} region paths", regions.len());
        Ok(Self {
            legend: Legend::from_scale(scale, &config.legend.min_label, &config.legend.max_label),
            graticule,
            regions,
        })
    }

    pub fn focus_targets(&self) -> Vec<FocusTarget> {
        self.regions
            .iter()
            .map(|r| FocusTarget { name: r.name.clone(), centroid: r.centroid })
            .collect()
    }
}

/// Data bounds grown to everything the canvas shows, so the graticule
/// reaches every edge.
fn graticule_extent(bounds: Rect<f64>, projection: &Projection, width: f64, height: f64) -> Rect<f64> {
    match projection.visible_bounds(width, height) {
        Some(visible) => Rect::new(
            coord! {
                x: bounds.min().x.min(visible.min().x),
                y: bounds.min().y.min(visible.min().y),
            },
            coord! {
                x: bounds.max().x.max(visible.max().x),
                y: bounds.max().y.max(visible.max().y),
            },
        ),
        None => bounds,
    }
}

pub fn draw_legend<R: Renderer>(renderer: &mut R, legend: &Legend) {
    renderer.draw_legend(legend);
}

pub fn draw_regions<R: Renderer>(renderer: &mut R, layers: &MapLayers) {
    for shape in &layers.regions {
        renderer.draw_region(shape.id, &shape.d, &shape.fill);
    }
}

/// Background, legend, graticule and every region, in paint order.
pub fn draw_map<R: Renderer>(renderer: &mut R, width: f64, height: f64, layers: &MapLayers) {
    renderer.draw_background(width, height);
    draw_legend(renderer, &layers.legend);
    if !layers.graticule.is_empty() {
        renderer.draw_graticule(&layers.graticule);
    }
    draw_regions(renderer, layers);
}

#[derive(Debug, Clone)]
struct SvgRegion {
    id: RegionId,
    d: String,
    fill: String,
    classes: BTreeSet<String>,
}

/// In-memory SVG scene. Commands update it; [`SvgRenderer::to_svg`] writes
/// the document with every animation at its target, [`SvgRenderer::to_svg_at`]
/// with the zoom where it stands at a given time.
#[derive(Debug, Clone, Default)]
pub struct SvgRenderer {
    size: (f64, f64),
    legend: Option<Legend>,
    graticule: Option<String>,
    regions: Vec<SvgRegion>,
    label: Option<Label>,
    transition: Option<ZoomTransition>,
    stroke_width: Option<f64>,
}

impl Renderer for SvgRenderer {
    fn draw_background(&mut self, width: f64, height: f64) {
        self.size = (width, height);
    }

    fn draw_legend(&mut self, legend: &Legend) {
        self.legend = Some(legend.clone());
    }

    fn draw_graticule(&mut self, d: &str) {
        self.graticule = Some(d.to_string());
    }

    fn draw_region(&mut self, id: RegionId, d: &str, fill: &str) {
        self.regions.push(SvgRegion {
            id,
            d: d.to_string(),
            fill: fill.to_string(),
            classes: BTreeSet::from(["feature".to_string()]),
        });
    }

    fn draw_text(&mut self, label: &Label) {
        self.label = Some(label.clone());
    }

    fn remove_text(&mut self) {
        self.label = None;
    }

    fn set_class(&mut self, id: RegionId, class: &str, on: bool) {
        if let Some(region) = self.regions.iter_mut().find(|r| r.id == id) {
            if on {
                region.classes.insert(class.to_string());
            } else {
                region.classes.remove(class);
            }
        }
    }

    fn set_transform(&mut self, transition: &ZoomTransition, stroke_width: f64) {
        self.transition = Some(*transition);
        self.stroke_width = Some(stroke_width);
    }
}

impl SvgRenderer {
    pub fn to_svg(&self) -> String {
        self.write_svg(None)
    }

    pub fn to_svg_at(&self, now_ms: f64) -> String {
        self.write_svg(Some(now_ms))
    }

    fn write_svg(&self, now_ms: Option<f64>) -> String {
        let (width, height) = self.size;
        let mut out = String::new();
        let _ = writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}">"#,
            num(width),
            num(height)
        );
        let _ = writeln!(
            out,
            r#"<rect class="background" width="{}" height="{}"/>"#,
            num(width),
            num(height)
        );

        let mut group_attrs = String::new();
        if let Some(t) = &self.transition {
            let transform = match now_ms {
                Some(now) if !t.is_done(now) => t.value_at(now),
                _ => t.to,
            };
            let _ = write!(group_attrs, r#" transform="{}""#, transform.to_svg());
        }
        if let Some(w) = self.stroke_width {
            let _ = write!(group_attrs, r#" style="stroke-width: {}px""#, num(w));
        }
        let _ = writeln!(out, r#"<g><g id="states"{}>"#, group_attrs);

        if let Some(d) = &self.graticule {
            let _ = writeln!(out, r#"<path class="graticuleLine" d="{}"/>"#, d);
        }
        for region in &self.regions {
            let classes: Vec<&str> = region.classes.iter().map(String::as_str).collect();
            let _ = writeln!(
                out,
                r#"<path class="{}" data-region="{}" fill="{}" d="{}"/>"#,
                classes.join(" "),
                region.id.0,
                xml_escape(&region.fill),
                region.d
            );
        }
        if let Some(label) = &self.label {
            let _ = writeln!(
                out,
                r#"<text class="legendKey" data-label="{}" x="{}" y="{}" style="text-anchor: middle; font-size: 8px; stroke-width: 0px; fill: black">{}</text>"#,
                label.region.0,
                num(label.x),
                num(label.y),
                xml_escape(&label.text)
            );
        }
        out.push_str("</g></g>\n");

        if let Some(legend) = &self.legend {
            write_legend(&mut out, legend);
        }
        out.push_str("</svg>\n");
        out
    }
}

fn write_legend(out: &mut String, legend: &Legend) {
    out.push_str(r#"<defs><linearGradient id="linear-gradient">"#);
    for (offset, color) in &legend.stops {
        let _ = write!(out, r#"<stop offset="{}" stop-color="{}"/>"#, num(*offset), xml_escape(color));
    }
    out.push_str("</linearGradient></defs>\n");

    let bar = legend.bar;
    let _ = writeln!(
        out,
        r#"<rect class="legend" width="{}" height="{}" x="{}" y="{}" transform="rotate({})" style="fill: url(#linear-gradient)"/>"#,
        num(bar.width),
        num(bar.height),
        num(bar.x),
        num(bar.y),
        num(bar.rotate)
    );
    for text in &legend.labels {
        let _ = writeln!(
            out,
            r#"<text class="legendKey" x="{}" y="{}">{}</text>"#,
            num(text.x),
            num(text.y),
            xml_escape(&text.text)
        );
    }
}

fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
