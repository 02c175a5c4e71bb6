//! Pixels covered by a labeled geometry

use bakau_core::raster::GeoTransform;
use geo::{BoundingRect, Contains, EuclideanDistance, Geometry, Point, Rect};

/// Pixels `(row, col)` of a `rows x cols` grid covered by `geometry`.
///
/// A pixel is covered when its center lies inside the geometry, or within
/// `buffer` map units of it when `buffer > 0`. A point always covers the
/// pixel containing it. Returned in row-major order without duplicates.
pub fn covered_pixels(
    geometry: &Geometry<f64>,
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
    buffer: f64,
) -> Vec<(usize, usize)> {
    let mut pixels = Vec::new();
    let Some(rect) = geometry.bounding_rect() else {
        return pixels;
    };
    let Some((r0, r1, c0, c1)) = pixel_window(&rect, buffer.max(0.0), transform, rows, cols) else {
        return pixels;
    };

    let anchor = match geometry {
        Geometry::Point(p) => transform.containing_pixel(p.x(), p.y(), rows, cols),
        _ => None,
    };

    for row in r0..=r1 {
        for col in c0..=c1 {
            let (x, y) = transform.pixel_to_geo(col, row);
            let center = Point::new(x, y);
            let covered = anchor == Some((row, col))
                || contains(geometry, &center)
                || (buffer > 0.0 && distance(geometry, &center) <= buffer);
            if covered {
                pixels.push((row, col));
            }
        }
    }
    pixels
}

/// Inclusive pixel ranges `(r0, r1, c0, c1)` intersecting `rect` grown by `pad`
fn pixel_window(
    rect: &Rect<f64>,
    pad: f64,
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
) -> Option<(usize, usize, usize, usize)> {
    if rows == 0 || cols == 0 {
        return None;
    }
    let (ca, ra) = transform.geo_to_pixel(rect.min().x - pad, rect.min().y - pad);
    let (cb, rb) = transform.geo_to_pixel(rect.max().x + pad, rect.max().y + pad);
    if !(ca.is_finite() && ra.is_finite() && cb.is_finite() && rb.is_finite()) {
        return None;
    }

    let clamp = |v: f64, n: usize| (v.floor().max(0.0) as usize).min(n - 1);
    let (rmin, rmax) = (ra.min(rb), ra.max(rb));
    let (cmin, cmax) = (ca.min(cb), ca.max(cb));
    if rmax < 0.0 || cmax < 0.0 || rmin >= rows as f64 || cmin >= cols as f64 {
        return None;
    }
    Some((clamp(rmin, rows), clamp(rmax, rows), clamp(cmin, cols), clamp(cmax, cols)))
}

fn contains(geometry: &Geometry<f64>, point: &Point<f64>) -> bool {
    match geometry {
        Geometry::Polygon(p) => p.contains(point),
        Geometry::MultiPolygon(mp) => mp.contains(point),
        _ => false,
    }
}

fn distance(geometry: &Geometry<f64>, point: &Point<f64>) -> f64 {
    match geometry {
        Geometry::Point(p) => p.euclidean_distance(point),
        Geometry::Polygon(poly) => point.euclidean_distance(poly),
        Geometry::MultiPolygon(mp) => point.euclidean_distance(mp),
        _ => f64::INFINITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Polygon};

    // 10 x 10 grid, 10 m pixels, origin (0, 100)
    fn transform() -> GeoTransform {
        GeoTransform::new(0.0, 100.0, 10.0, -10.0)
    }

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
        Geometry::Polygon(Polygon::new(
            LineString::from(vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)]),
            vec![],
        ))
    }

    #[test]
    fn test_point_covers_containing_pixel() {
        let p = Geometry::Point(Point::new(23.0, 71.0));
        assert_eq!(covered_pixels(&p, &transform(), 10, 10, 0.0), vec![(2, 2)]);
    }

    #[test]
    fn test_buffered_point() {
        // Center of pixel (5, 5) is (55, 45); a 10 m buffer reaches the 4 rook neighbours
        let p = Geometry::Point(Point::new(55.0, 45.0));
        let px = covered_pixels(&p, &transform(), 10, 10, 10.0);
        assert_eq!(px, vec![(4, 5), (5, 4), (5, 5), (5, 6), (6, 5)]);
    }

    #[test]
    fn test_polygon_by_center() {
        // Covers centers x in {15, 25}, y in {85, 75}
        let poly = square(10.0, 70.0, 30.0, 90.0);
        let px = covered_pixels(&poly, &transform(), 10, 10, 0.0);
        assert_eq!(px, vec![(1, 1), (1, 2), (2, 1), (2, 2)]);
    }

    #[test]
    fn test_buffered_polygon_grows() {
        let poly = square(10.0, 70.0, 30.0, 90.0);
        // One ring of pixels whose centers sit 5 m out; the ring's corners are 7.07 m away
        let px = covered_pixels(&poly, &transform(), 10, 10, 6.0);
        assert_eq!(px.len(), 12);
        assert!(!px.contains(&(0, 0)));
        assert!(px.contains(&(0, 1)));
    }

    #[test]
    fn test_outside_grid() {
        let p = Geometry::Point(Point::new(500.0, 500.0));
        assert!(covered_pixels(&p, &transform(), 10, 10, 5.0).is_empty());
    }
}
