//!
//! Minimal EPS (Encapsulated PostScript) vector writer for sites and cell
//! polygons. Text-based PostScript emission only — no color/rendering
//! policy, which stays an external collaborator's concern (`set_colors`/
//! `get_colors` on the facade); this module draws black geometry unless a
//! caller-supplied RGB triple is passed in.
//!

use crate::geometry::Point;
use std::io::{self, Write};

const POINT_RADIUS: f64 = 0.5;

fn write_header<W: Write>(out: &mut W, width: u32, height: u32) -> io::Result<()> {
    writeln!(out, "%!PS-Adobe-3.0 EPSF-3.0")?;
    writeln!(out, "%%BoundingBox: 0 0 {width} {height}")?;
    writeln!(out, "%%EndComments")?;
    Ok(())
}

fn write_footer<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "showpage")?;
    writeln!(out, "%%EOF")
}

fn set_rgb<W: Write>(out: &mut W, rgb: Option<(f64, f64, f64)>) -> io::Result<()> {
    let (r, g, b) = rgb.unwrap_or((0.0, 0.0, 0.0));
    writeln!(out, "{r:.4} {g:.4} {b:.4} setrgbcolor")
}

/// Writes one filled circle per site position.
pub fn save_point_eps<W: Write>(
    out: &mut W,
    width: u32,
    height: u32,
    points: &[Point],
    colors: &[Option<(f64, f64, f64)>],
) -> io::Result<()> {
    write_header(out, width, height)?;
    for (i, p) in points.iter().enumerate() {
        set_rgb(out, colors.get(i).copied().flatten())?;
        writeln!(out, "{:.3} {:.3} {POINT_RADIUS} 0 360 arc fill", p.x, p.y)?;
    }
    write_footer(out)
}

/// Writes one closed polygon per cell, stroked (not filled) unless a color
/// is supplied, in which case it is filled.
pub fn save_cell_eps<W: Write>(
    out: &mut W,
    width: u32,
    height: u32,
    polygons: &[Vec<Point>],
    colors: &[Option<(f64, f64, f64)>],
) -> io::Result<()> {
    write_header(out, width, height)?;
    for (i, polygon) in polygons.iter().enumerate() {
        if polygon.len() < 2 {
            continue;
        }
        let color = colors.get(i).copied().flatten();
        set_rgb(out, color)?;
        writeln!(out, "newpath")?;
        writeln!(out, "{:.3} {:.3} moveto", polygon[0].x, polygon[0].y)?;
        for p in &polygon[1..] {
            writeln!(out, "{:.3} {:.3} lineto", p.x, p.y)?;
        }
        writeln!(out, "closepath")?;
        writeln!(out, "{}", if color.is_some() { "fill" } else { "stroke" })?;
    }
    write_footer(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_point_eps_emits_one_arc_per_point() {
        let mut buf = Vec::new();
        let points = vec![Point::new(1.0, 1.0), Point::new(2.0, 2.0)];
        save_point_eps(&mut buf, 10, 10, &points, &[]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.matches("arc fill").count(), 2);
        assert!(text.starts_with("%!PS-Adobe-3.0"));
    }

    #[test]
    fn save_cell_eps_skips_degenerate_polygons() {
        let mut buf = Vec::new();
        let polygons = vec![vec![Point::new(0.0, 0.0)], vec![Point::new(0.0, 0.0), Point::new(1.0, 0.0), Point::new(1.0, 1.0)]];
        save_cell_eps(&mut buf, 10, 10, &polygons, &[]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.matches("closepath").count(), 1);
    }
}
