//! Geometry kept beside the property bag: segments, vertex lists and parsed
//! paths, built on `kurbo`.

use kurbo::{PathEl, Shape};
use serde::{Deserialize, Serialize};

pub use kurbo::{BezPath, Point, Rect, Size};

use crate::{FiberError, FiberResult};

/// Shape data that does not live in the generic property bag.
///
/// Objects whose constructor takes coordinates (lines, point lists, path
/// strings) keep the constructed form here; the binding keeps it in step with
/// the model through a kind-specific apply.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Geometry {
    /// Shape fully described by its properties.
    #[default]
    None,
    /// Straight segment.
    Segment {
        /// Start point.
        from: Point,
        /// End point.
        to: Point,
    },
    /// Vertex list of a polygon or polyline.
    Points {
        /// Vertices.
        points: Vec<Point>,
    },
    /// Parsed path, serialised as SVG path data.
    Path {
        /// Path elements.
        #[serde(with = "svg_data")]
        path: BezPath,
    },
}

impl Geometry {
    /// Extent of the geometry, if it has any points.
    #[must_use]
    pub fn extent(&self) -> Option<Rect> {
        match self {
            Self::None => None,
            Self::Segment { from, to } => Some(Rect::from_points(*from, *to)),
            Self::Points { points } => enclosing(points.iter().copied()),
            Self::Path { path } if path.elements().is_empty() => None,
            Self::Path { path } => Some(path.bounding_box()),
        }
    }
}

/// Smallest rectangle containing every point, or `None` for no points.
fn enclosing(points: impl IntoIterator<Item = Point>) -> Option<Rect> {
    let mut points = points.into_iter();
    let first = points.next()?;
    Some(points.fold(Rect::from_points(first, first), |rect, p| rect.union_pt(p)))
}

/// Parse SVG path data.
///
/// Accepts everything `kurbo` understands (`M L H V C S Q T A Z`, absolute
/// and relative). The data must start with a move.
///
/// # Errors
///
/// Returns [`FiberError::InvalidPath`] for malformed data, empty data or data
/// that does not start with a move.
pub fn parse_path(data: &str) -> FiberResult<BezPath> {
    if !data.trim_start().starts_with(['M', 'm']) {
        return Err(FiberError::InvalidPath(format!(
            "path must start with a move: {data:?}"
        )));
    }
    let path = BezPath::from_svg(data).map_err(|err| FiberError::InvalidPath(err.to_string()))?;
    match path.elements().first() {
        Some(PathEl::MoveTo(_)) => Ok(path),
        _ => Err(FiberError::InvalidPath(format!("no drawable path in {data:?}"))),
    }
}

mod svg_data {
    use kurbo::BezPath;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(path: &BezPath, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&path.to_svg())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BezPath, D::Error> {
        let data = String::deserialize(deserializer)?;
        BezPath::from_svg(&data).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_path() {
        let path = parse_path("M 40 40 C 160 0 160 160 40 120 z").expect("valid path");
        let elements = path.elements();
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0], PathEl::MoveTo(Point::new(40.0, 40.0)));
        assert!(matches!(elements[1], PathEl::CurveTo(_, _, to) if to == Point::new(40.0, 120.0)));
        assert_eq!(elements[2], PathEl::ClosePath);
    }

    #[test]
    fn test_relative_commands() {
        let path = parse_path("m10 10 l20 0 v20 h-20 z").expect("valid path");
        assert_eq!(
            path.elements(),
            &[
                PathEl::MoveTo(Point::new(10.0, 10.0)),
                PathEl::LineTo(Point::new(30.0, 10.0)),
                PathEl::LineTo(Point::new(30.0, 30.0)),
                PathEl::LineTo(Point::new(10.0, 30.0)),
                PathEl::ClosePath,
            ]
        );
    }

    #[test]
    fn test_compact_numbers() {
        let path = parse_path("M0 0L10-5.5").expect("valid path");
        assert_eq!(path.elements()[1], PathEl::LineTo(Point::new(10.0, -5.5)));
    }

    #[test]
    fn test_smooth_cubic_reflects_control() {
        let path = parse_path("M0 0 C 0 10 10 10 10 0 S 20 -10 20 0").expect("valid path");
        match path.elements()[2] {
            PathEl::CurveTo(c1, _, _) => assert_eq!(c1, Point::new(10.0, -10.0)),
            other => panic!("expected cubic, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_paths() {
        assert!(parse_path("").is_err());
        assert!(parse_path("L 10 10").is_err());
        assert!(parse_path("M 0 0 L 10").is_err());
        assert!(parse_path("M 0 0 # 1").is_err());
        assert!(parse_path("nonsense").is_err());
    }

    #[test]
    fn test_geometry_extent() {
        let geometry = Geometry::Points {
            points: vec![Point::new(0.0, 120.0), Point::new(100.0, 0.0), Point::new(220.0, 120.0)],
        };
        let extent = geometry.extent().expect("has points");
        assert!((extent.width() - 220.0).abs() < f64::EPSILON);
        assert!((extent.height() - 120.0).abs() < f64::EPSILON);
        assert!(Geometry::None.extent().is_none());

        let segment = Geometry::Segment {
            from: Point::new(80.0, 400.0),
            to: Point::new(20.0, 100.0),
        };
        assert_eq!(segment.extent(), Some(Rect::new(20.0, 100.0, 80.0, 400.0)));
    }

    #[test]
    fn test_path_geometry_serializes_as_svg() {
        let geometry = Geometry::Path {
            path: parse_path("M0 0 L10 0 L10 10 Z").expect("valid path"),
        };
        let json = serde_json::to_value(&geometry).expect("serialize geometry");
        assert_eq!(json["type"], "path");
        assert!(json["path"].as_str().is_some_and(|svg| svg.starts_with('M')));

        let back: Geometry = serde_json::from_value(json).expect("deserialize geometry");
        assert_eq!(back, geometry);
    }
}
