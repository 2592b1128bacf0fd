//! Albers (conic equal-area) projection and the two-pass fit that sizes it
//! to the canvas.

use geo::{coord, Rect};
use std::f64::consts::{PI, TAU};
use thiserror::Error;
use tracing::debug;

const EPSILON: f64 = 1e-6;

/// Scale the Albers projection starts with before anything is fitted.
pub const DEFAULT_ALBERS_SCALE: f64 = 1070.0;

/// Share of the best-fit scale actually used, leaving a margin at the
/// canvas edges.
pub const FIT_MARGIN: f64 = 0.975;

#[derive(Debug, Error, PartialEq)]
pub enum ProjectionError {
    #[error("geometry bounds have zero extent on the canvas ({width} x {height} px)")]
    DegenerateBounds { width: f64, height: f64 },
}

/// Raw conic equal-area projection in radians, before scaling.
#[derive(Debug, Clone, Copy)]
enum ConicEqualArea {
    Conic { n: f64, c: f64, r0: f64 },
    // Standard parallels symmetric about the equator.
    Cylindrical { cos_phi0: f64 },
}

impl ConicEqualArea {
    fn new(phi0: f64, phi1: f64) -> Self {
        let sy0 = phi0.sin();
        let n = (sy0 + phi1.sin()) / 2.0;
        if n.abs() < EPSILON {
            return Self::Cylindrical { cos_phi0: phi0.cos() };
        }
        let c = 1.0 + sy0 * (2.0 * n - sy0);
        Self::Conic { n, c, r0: c.sqrt() / n }
    }

    fn project(&self, lambda: f64, phi: f64) -> (f64, f64) {
        match *self {
            Self::Conic { n, c, r0 } => {
                let r = (c - 2.0 * n * phi.sin()).max(0.0).sqrt() / n;
                let a = lambda * n;
                (r * a.sin(), r0 - r * a.cos())
            }
            Self::Cylindrical { cos_phi0 } => (lambda * cos_phi0, phi.sin() / cos_phi0),
        }
    }

    fn invert(&self, x: f64, y: f64) -> (f64, f64) {
        match *self {
            Self::Conic { n, c, r0 } => {
                let r0y = r0 - y;
                let mut l = x.atan2(r0y.abs()) * r0y.signum();
                if r0y * n < 0.0 {
                    l -= PI * x.signum() * r0y.signum();
                }
                let sin_phi = (c - (x * x + r0y * r0y) * n * n) / (2.0 * n);
                (l / n, sin_phi.clamp(-1.0, 1.0).asin())
            }
            Self::Cylindrical { cos_phi0 } => (x / cos_phi0, (y * cos_phi0).clamp(-1.0, 1.0).asin()),
        }
    }
}

/// Points sampled along each canvas edge when inverting the visible area.
const EDGE_SAMPLES: usize = 32;

/// Projection parameters, in degrees, mirroring the usual Albers knobs.
#[derive(Debug, Clone)]
pub struct Albers {
    pub parallels: [f64; 2],
    pub rotate: f64,
    pub center: [f64; 2],
    pub scale: f64,
    pub translate: [f64; 2],
}

impl Default for Albers {
    fn default() -> Self {
        Self {
            parallels: [29.5, 45.5],
            rotate: 96.0,
            center: [-0.6, 38.7],
            scale: DEFAULT_ALBERS_SCALE,
            translate: [480.0, 250.0],
        }
    }
}

impl Albers {
    pub fn parallels(mut self, south: f64, north: f64) -> Self {
        self.parallels = [south, north];
        self
    }

    pub fn rotate(mut self, lambda: f64) -> Self {
        self.rotate = lambda;
        self
    }

    pub fn center(mut self, lon: f64, lat: f64) -> Self {
        self.center = [lon, lat];
        self
    }

    pub fn scale(mut self, k: f64) -> Self {
        self.scale = k;
        self
    }

    pub fn translate(mut self, x: f64, y: f64) -> Self {
        self.translate = [x, y];
        self
    }

    pub fn build(&self) -> Projection {
        let raw = ConicEqualArea::new(self.parallels[0].to_radians(), self.parallels[1].to_radians());
        // The center is projected without the rotation applied.
        let (cx, cy) = raw.project(self.center[0].to_radians(), self.center[1].to_radians());
        Projection {
            raw,
            rotate: self.rotate.to_radians(),
            k: self.scale,
            dx: self.translate[0] - self.scale * cx,
            dy: self.translate[1] + self.scale * cy,
        }
    }
}

/// A ready-to-use geographic → canvas pixel mapping.
#[derive(Debug, Clone)]
pub struct Projection {
    raw: ConicEqualArea,
    rotate: f64,
    k: f64,
    dx: f64,
    dy: f64,
}

impl Projection {
    /// Fit an Albers projection so `bounds` (lon/lat) fills a
    /// `width` x `height` canvas.
    ///
    /// A first projection at the default scale is used to measure how large
    /// the bound corners come out in pixels; the final projection is then
    /// rebuilt with the scale that makes them fit, less a small margin.
    pub fn fit(bounds: Rect<f64>, width: f64, height: f64) -> Result<Self, ProjectionError> {
        let bottom_left = bounds.min();
        let top_right = bounds.max();
        let rot_long = -(top_right.x + bottom_left.x) / 2.0;
        let center = (
            (top_right.x + bottom_left.x) / 2.0 + rot_long,
            (top_right.y + bottom_left.y) / 2.0,
        );

        let base = Albers::default()
            .parallels(bottom_left.y, top_right.y)
            .rotate(rot_long)
            .translate(width / 2.0, height / 2.0)
            .center(center.0, center.1);

        let provisional = base.build();
        let bl_px = provisional.project(bottom_left.x, bottom_left.y);
        let tr_px = provisional.project(top_right.x, top_right.y);
        let px_width = (tr_px.0 - bl_px.0).abs();
        let px_height = (bl_px.1 - tr_px.1).abs();

        let factor = (width / px_width).min(height / px_height);
        if !factor.is_finite() || factor <= 0.0 {
            return Err(ProjectionError::DegenerateBounds { width: px_width, height: px_height });
        }

        let scale = factor * FIT_MARGIN * 1000.0;
        debug!(rot_long, ?center, factor, scale, "fitted projection");
        Ok(base.scale(scale).build())
    }

    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let mut lambda = lon.to_radians() + self.rotate;
        if lambda.abs() > PI {
            lambda -= (lambda / TAU).round() * TAU;
        }
        let (x, y) = self.raw.project(lambda, lat.to_radians());
        (self.dx + self.k * x, self.dy - self.k * y)
    }

    /// Canvas pixel back to lon/lat degrees, `None` off the projection's domain.
    pub fn invert(&self, px: f64, py: f64) -> Option<(f64, f64)> {
        let (lambda, phi) = self.raw.invert((px - self.dx) / self.k, (self.dy - py) / self.k);
        let mut lon = (lambda - self.rotate).to_degrees();
        if lon.abs() > 180.0 {
            lon -= (lon / 360.0).round() * 360.0;
        }
        let lat = phi.to_degrees();
        (lon.is_finite() && lat.is_finite()).then_some((lon, lat))
    }

    /// Lon/lat box around everything shown on a `width` x `height` canvas,
    /// found by inverting points along the canvas border.
    pub fn visible_bounds(&self, width: f64, height: f64) -> Option<Rect<f64>> {
        let mut border = Vec::with_capacity(4 * (EDGE_SAMPLES + 1));
        for i in 0..=EDGE_SAMPLES {
            let t = i as f64 / EDGE_SAMPLES as f64;
            border.extend([(t * width, 0.0), (t * width, height), (0.0, t * height), (width, t * height)]);
        }
        let inverted: Vec<(f64, f64)> = border.into_iter().filter_map(|(x, y)| self.invert(x, y)).collect();
        let (first, rest) = inverted.split_first()?;
        let (mut min, mut max) = (*first, *first);
        for &(lon, lat) in rest {
            min = (min.0.min(lon), min.1.min(lat));
            max = (max.0.max(lon), max.1.max(lat));
        }
        Some(Rect::new(coord! { x: min.0, y: min.1 }, coord! { x: max.0, y: max.1 }))
    }

    pub fn scale(&self) -> f64 {
        self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn germany() -> Rect<f64> {
        Rect::new(coord! { x: 5.87, y: 47.27 }, coord! { x: 15.04, y: 55.06 })
    }

    fn inside(p: (f64, f64), w: f64, h: f64) -> bool {
        p.0 >= 0.0 && p.0 <= w && p.1 >= 0.0 && p.1 <= h
    }

    #[test]
    fn bounds_center_lands_on_canvas_center() {
        let bounds = germany();
        let projection = Projection::fit(bounds, 960.0, 500.0).unwrap();
        let c = bounds.center();
        let (x, y) = projection.project(c.x, c.y);
        assert!((x - 480.0).abs() < 1e-9);
        assert!((y - 250.0).abs() < 1e-9);
    }

    #[test]
    fn fitted_corners_stay_on_canvas() {
        for bounds in [
            germany(),
            Rect::new(coord! { x: 8.0, y: 47.5 }, coord! { x: 12.0, y: 52.5 }),
            Rect::new(coord! { x: -10.0, y: 40.0 }, coord! { x: 10.0, y: 60.0 }),
            Rect::new(coord! { x: 0.0, y: -5.0 }, coord! { x: 10.0, y: 5.0 }),
        ] {
            let projection = Projection::fit(bounds, 960.0, 500.0).unwrap();
            for (lon, lat) in [
                (bounds.min().x, bounds.min().y),
                (bounds.max().x, bounds.max().y),
                (bounds.min().x, bounds.max().y),
                (bounds.max().x, bounds.min().y),
            ] {
                let p = projection.project(lon, lat);
                assert!(inside(p, 960.0, 500.0), "{lon},{lat} -> {p:?}");
            }
        }
    }

    #[test]
    fn fitted_scale_is_below_best_fit() {
        let bounds = germany();
        let projection = Projection::fit(bounds, 960.0, 500.0).unwrap();

        let unit = Albers::default()
            .parallels(bounds.min().y, bounds.max().y)
            .rotate(-(bounds.min().x + bounds.max().x) / 2.0)
            .translate(480.0, 250.0)
            .center(0.0, (bounds.min().y + bounds.max().y) / 2.0)
            .build();
        let a = unit.project(bounds.min().x, bounds.min().y);
        let b = unit.project(bounds.max().x, bounds.max().y);
        let best = DEFAULT_ALBERS_SCALE * (960.0 / (b.0 - a.0).abs()).min(500.0 / (a.1 - b.1).abs());

        assert!(projection.scale() < best);
        assert!(projection.scale() > 0.9 * best);
    }

    #[test]
    fn north_is_up_east_is_right() {
        let projection = Projection::fit(germany(), 960.0, 500.0).unwrap();
        let munich = projection.project(11.58, 48.14);
        let hamburg = projection.project(9.99, 53.55);
        let berlin = projection.project(13.40, 52.52);
        assert!(hamburg.1 < munich.1);
        assert!(berlin.0 > hamburg.0);
    }

    #[test]
    fn invert_undoes_project() {
        for bounds in [germany(), Rect::new(coord! { x: 0.0, y: -5.0 }, coord! { x: 10.0, y: 5.0 })] {
            let projection = Projection::fit(bounds, 960.0, 500.0).unwrap();
            for (lon, lat) in [(bounds.min().x, bounds.min().y), (bounds.max().x, bounds.max().y), (7.5, 1.0)] {
                let (x, y) = projection.project(lon, lat);
                let (back_lon, back_lat) = projection.invert(x, y).unwrap();
                assert!((back_lon - lon).abs() < 1e-9, "{lon} -> {back_lon}");
                assert!((back_lat - lat).abs() < 1e-9, "{lat} -> {back_lat}");
            }
        }
    }

    #[test]
    fn visible_bounds_reach_past_the_data() {
        let bounds = germany();
        let projection = Projection::fit(bounds, 960.0, 500.0).unwrap();
        let visible = projection.visible_bounds(960.0, 500.0).unwrap();

        // The wide canvas shows far more longitude than the data spans.
        assert!(visible.min().x < bounds.min().x - 5.0);
        assert!(visible.max().x > bounds.max().x + 5.0);
        assert!(visible.min().y <= bounds.min().y);
        assert!(visible.max().y >= bounds.max().y);

        let (x, y) = projection.project(visible.min().x, visible.center().y);
        assert!(x < 1.0, "{x},{y}");
    }

    #[test]
    fn zero_extent_bounds_are_rejected() {
        let point = Rect::new(coord! { x: 10.0, y: 50.0 }, coord! { x: 10.0, y: 50.0 });
        assert!(matches!(
            Projection::fit(point, 960.0, 500.0),
            Err(ProjectionError::DegenerateBounds { .. })
        ));
    }
}
