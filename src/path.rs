use crate::projection::Projection;
use geo::{coord, Centroid, Coord, LineString, MapCoords, MultiLineString, MultiPolygon, Rect};
use std::fmt::Write;

/// Turns lon/lat geometry into canvas-space shapes and SVG path data.
#[derive(Debug, Clone, Copy)]
pub struct PathRenderer<'a> {
    projection: &'a Projection,
}

impl<'a> PathRenderer<'a> {
    pub fn new(projection: &'a Projection) -> Self {
        Self { projection }
    }

    fn project_coord(&self, c: Coord<f64>) -> Coord<f64> {
        let (x, y) = self.projection.project(c.x, c.y);
        coord! { x: x, y: y }
    }

    pub fn project_geometry(&self, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        geometry.map_coords(|c| self.project_coord(c))
    }

    /// SVG `d` attribute for a (multi)polygon, one closed subpath per ring.
    pub fn svg_path(&self, geometry: &MultiPolygon<f64>) -> String {
        let projected = self.project_geometry(geometry);
        let mut d = String::new();
        for polygon in &projected {
            for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
                write_ring(&mut d, ring);
            }
        }
        d
    }

    /// Area-weighted centroid of the projected shape, in canvas pixels.
    pub fn centroid(&self, geometry: &MultiPolygon<f64>) -> Option<(f64, f64)> {
        self.project_geometry(geometry).centroid().map(|p| (p.x(), p.y()))
    }

    pub fn svg_line_path(&self, lines: &MultiLineString<f64>) -> String {
        let mut d = String::new();
        for line in lines {
            for (i, c) in line.coords().enumerate() {
                let p = self.project_coord(*c);
                let _ = write!(d, "{}{},{}", if i == 0 { 'M' } else { 'L' }, num(p.x), num(p.y));
            }
        }
        d
    }
}

fn write_ring(d: &mut String, ring: &LineString<f64>) {
    let coords = &ring.0;
    // geo rings repeat the first point at the end; `Z` closes them instead.
    let open = match (coords.first(), coords.last()) {
        (Some(first), Some(last)) if coords.len() > 1 && first == last => &coords[..coords.len() - 1],
        _ => &coords[..],
    };
    if open.is_empty() {
        return;
    }
    for (i, c) in open.iter().enumerate() {
        let _ = write!(d, "{}{},{}", if i == 0 { 'M' } else { 'L' }, num(c.x), num(c.y));
    }
    d.push('Z');
}

/// Three decimals, trailing zeros dropped.
pub(crate) fn num(v: f64) -> String {
    let rounded = (v * 1000.0).round() / 1000.0 + 0.0;
    format!("{}", rounded)
}

/// Meridians and parallels every `step` degrees covering `bounds` padded by
/// `margin` degrees. Lines are densified so parallels curve under the conic
/// projection.
pub fn graticule(bounds: Rect<f64>, step: f64, margin: f64) -> MultiLineString<f64> {
    let min_lon = ((bounds.min().x - margin) / step).floor() * step;
    let max_lon = ((bounds.max().x + margin) / step).ceil() * step;
    let min_lat = (((bounds.min().y - margin) / step).floor() * step).max(-90.0);
    let max_lat = (((bounds.max().y + margin) / step).ceil() * step).min(90.0);
    let precision = step / 10.0;

    let mut lines = Vec::new();
    for lon in stepped(min_lon, max_lon, step) {
        lines.push(LineString::from(
            stepped(min_lat, max_lat, precision).map(|lat| coord! { x: lon, y: lat }).collect::<Vec<_>>(),
        ));
    }
    for lat in stepped(min_lat, max_lat, step) {
        lines.push(LineString::from(
            stepped(min_lon, max_lon, precision).map(|lon| coord! { x: lon, y: lat }).collect::<Vec<_>>(),
        ));
    }
    MultiLineString::new(lines)
}

/// `start, start + step, …` up to and including `end` (within rounding).
fn stepped(start: f64, end: f64, step: f64) -> impl Iterator<Item = f64> {
    let count = ((end - start) / step + 1e-9).floor().max(0.0) as usize;
    (0..=count).map(move |i| start + i as f64 * step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::two_states;

    fn projection() -> Projection {
        let dataset = two_states();
        Projection::fit(dataset.bounds().unwrap(), 960.0, 500.0).unwrap()
    }

    #[test]
    fn number_formatting() {
        assert_eq!(num(480.0), "480");
        assert_eq!(num(12.34567), "12.346");
        assert_eq!(num(-0.0001), "0");
    }

    #[test]
    fn square_becomes_one_closed_subpath() {
        let projection = projection();
        let renderer = PathRenderer::new(&projection);
        let region = &two_states().regions[0];
        let d = renderer.svg_path(&region.geometry);

        assert!(d.starts_with('M'));
        assert!(d.ends_with('Z'));
        assert_eq!(d.matches('M').count(), 1);
        assert_eq!(d.matches('L').count(), 3);
    }

    #[test]
    fn centroid_is_inside_projected_box() {
        let projection = projection();
        let renderer = PathRenderer::new(&projection);
        let region = &two_states().regions[0];
        let (cx, cy) = renderer.centroid(&region.geometry).unwrap();

        let sw = projection.project(9.0, 47.5);
        let ne = projection.project(12.0, 50.5);
        assert!(cx > sw.0 && cx < ne.0);
        assert!(cy < sw.1 && cy > ne.1);
    }

    #[test]
    fn empty_geometry_has_no_centroid() {
        let projection = projection();
        let renderer = PathRenderer::new(&projection);
        assert!(renderer.centroid(&MultiPolygon::new(vec![])).is_none());
        assert_eq!(renderer.svg_path(&MultiPolygon::new(vec![])), "");
    }

    #[test]
    fn graticule_lines_every_degree() {
        let bounds = Rect::new(coord! { x: 8.0, y: 47.5 }, coord! { x: 12.0, y: 52.5 });
        let lines = graticule(bounds, 1.0, 0.5);
        // 7 meridians (7..=13) and 7 parallels (47..=53)
        assert_eq!(lines.0.len(), 14);
        let first = &lines.0[0];
        assert_eq!(first.0.first().unwrap().x, 7.0);
        assert_eq!(first.0.first().unwrap().y, 47.0);
        assert!((first.0.last().unwrap().y - 53.0).abs() < 1e-9);
    }
}
