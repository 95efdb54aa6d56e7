//! Vector shapes and text.

use async_trait::async_trait;

use crate::binding::ObjectFactory;
use crate::cancel::CancelToken;
use crate::element::{ObjectHandle, ObjectKind};
use crate::geometry::{parse_path, Geometry, Point, Size};
use crate::model::{Length, Props};
use crate::{FiberError, FiberResult};

/// Path used when a path object has no data at all.
pub const FALLBACK_PATH: &str = "M 0 0 L 120 0 L 60 100 z";

/// Factory for every object kind except images.
///
/// Shapes are built synchronously from their model. Lines, point lists and
/// paths also keep their constructed geometry in step with the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeFactory {
    kind: ObjectKind,
}

impl ShapeFactory {
    /// Factory for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`FiberError::InvalidOperation`] for [`ObjectKind::Image`],
    /// which needs an [`ImageFactory`](crate::ImageFactory).
    pub fn new(kind: ObjectKind) -> FiberResult<Self> {
        if kind == ObjectKind::Image {
            return Err(FiberError::InvalidOperation(
                "images are built by the image factory".into(),
            ));
        }
        Ok(Self { kind })
    }

    /// Rectangle factory.
    #[must_use]
    pub const fn rect() -> Self {
        Self {
            kind: ObjectKind::Rect,
        }
    }

    /// Circle factory.
    #[must_use]
    pub const fn circle() -> Self {
        Self {
            kind: ObjectKind::Circle,
        }
    }

    /// Text factory.
    #[must_use]
    pub const fn text() -> Self {
        Self {
            kind: ObjectKind::Text,
        }
    }

    fn geometry(&self, props: &Props) -> FiberResult<Geometry> {
        Ok(match self.kind {
            ObjectKind::Line => Geometry::Segment {
                from: Point::new(props.x1.unwrap_or(0.0), props.y1.unwrap_or(0.0)),
                to: Point::new(props.x2.unwrap_or(0.0), props.y2.unwrap_or(0.0)),
            },
            ObjectKind::Polygon | ObjectKind::Polyline => Geometry::Points {
                points: props.points.clone().unwrap_or_default(),
            },
            ObjectKind::Path => Geometry::Path {
                path: parse_path(props.path.as_deref().unwrap_or(FALLBACK_PATH))?,
            },
            _ => Geometry::None,
        })
    }
}

fn size(width: f64, height: f64) -> (Option<Length>, Option<Length>) {
    (Some(Length::Px(width)), Some(Length::Px(height)))
}

fn points(coords: &[(f64, f64)]) -> Vec<Point> {
    coords.iter().map(|&(x, y)| Point::new(x, y)).collect()
}

#[async_trait]
impl ObjectFactory for ShapeFactory {
    fn kind(&self) -> ObjectKind {
        self.kind
    }

    fn defaults(&self) -> Props {
        match self.kind {
            ObjectKind::Rect => {
                let (width, height) = size(160.0, 120.0);
                Props {
                    width,
                    height,
                    fill: Some("#38bdf8".into()),
                    left: Some(100.0),
                    top: Some(80.0),
                    ..Props::default()
                }
            }
            ObjectKind::Circle => Props {
                radius: Some(60.0),
                fill: Some("#f472b6".into()),
                left: Some(260.0),
                top: Some(120.0),
                ..Props::default()
            },
            ObjectKind::Ellipse => Props {
                rx: Some(90.0),
                ry: Some(60.0),
                fill: Some("#34d399".into()),
                left: Some(360.0),
                top: Some(200.0),
                ..Props::default()
            },
            ObjectKind::Triangle => {
                let (width, height) = size(140.0, 140.0);
                Props {
                    width,
                    height,
                    fill: Some("#fb923c".into()),
                    left: Some(520.0),
                    top: Some(120.0),
                    ..Props::default()
                }
            }
            ObjectKind::Line => Props {
                x1: Some(80.0),
                y1: Some(400.0),
                x2: Some(360.0),
                y2: Some(400.0),
                stroke: Some("#f87171".into()),
                stroke_width: Some(6.0),
                ..Props::default()
            },
            ObjectKind::Polygon => Props {
                points: Some(points(&[
                    (0.0, 120.0),
                    (100.0, 0.0),
                    (220.0, 120.0),
                    (180.0, 220.0),
                    (40.0, 220.0),
                ])),
                fill: Some("rgba(244,114,182,0.2)".into()),
                stroke: Some("#f472b6".into()),
                stroke_width: Some(3.0),
                left: Some(600.0),
                top: Some(220.0),
                ..Props::default()
            },
            ObjectKind::Polyline => Props {
                points: Some(points(&[
                    (0.0, 40.0),
                    (80.0, 0.0),
                    (180.0, 40.0),
                    (240.0, 20.0),
                    (300.0, 80.0),
                ])),
                stroke: Some("#a855f7".into()),
                stroke_width: Some(4.0),
                fill: Some(String::new()),
                left: Some(420.0),
                top: Some(300.0),
                ..Props::default()
            },
            ObjectKind::Path => Props {
                path: Some("M 40 40 C 160 0 160 160 40 120 z".into()),
                fill: Some("rgba(56,189,248,0.12)".into()),
                stroke: Some("#38bdf8".into()),
                stroke_width: Some(3.0),
                left: Some(120.0),
                top: Some(220.0),
                ..Props::default()
            },
            ObjectKind::Text => Props {
                text: Some(String::new()),
                font_family: Some("Arial".into()),
                font_size: Some(16.0),
                fill: Some("#000".into()),
                left: Some(0.0),
                top: Some(0.0),
                ..Props::default()
            },
            ObjectKind::Image => Props::default(),
        }
    }

    async fn create(
        &self,
        initial: Props,
        _bounds: Size,
        _cancel: &CancelToken,
    ) -> FiberResult<ObjectHandle> {
        let geometry = self.geometry(&initial)?;
        Ok(ObjectHandle::new(self.kind, initial, geometry))
    }

    fn apply(&self, object: &ObjectHandle, next: &Props, _bounds: Size) -> bool {
        let mut next = next.clone();
        let geometry = match self.geometry(&next) {
            Ok(geometry) => geometry,
            Err(err) => {
                tracing::warn!(kind = %self.kind, error = %err, "Ignoring invalid path update");
                next.path = None;
                object.geometry()
            }
        };
        let changed = object.assign(&next);
        object.set_geometry(geometry) || changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::PathEl;

    async fn build(kind: ObjectKind, props: Props) -> FiberResult<ObjectHandle> {
        let factory = ShapeFactory::new(kind).expect("shape kind");
        let initial = kind.restrict(&factory.defaults().overlay(&props));
        factory
            .create(initial, Size::new(800.0, 600.0), &CancelToken::new())
            .await
    }

    #[test]
    fn test_image_kind_is_rejected() {
        assert!(ShapeFactory::new(ObjectKind::Image).is_err());
        assert!(ShapeFactory::new(ObjectKind::Ellipse).is_ok());
    }

    #[test]
    fn test_defaults_fit_allowlists() {
        for kind in ObjectKind::ALL {
            let Ok(factory) = ShapeFactory::new(kind) else {
                continue;
            };
            let defaults = factory.defaults();
            assert_eq!(kind.restrict(&defaults), defaults, "{kind} defaults");
        }
    }

    #[tokio::test]
    async fn test_line_geometry_follows_coordinates() {
        let line = build(ObjectKind::Line, Props::default())
            .await
            .expect("line should build");
        assert_eq!(
            line.geometry(),
            Geometry::Segment {
                from: Point::new(80.0, 400.0),
                to: Point::new(360.0, 400.0),
            }
        );

        let factory = ShapeFactory::new(ObjectKind::Line).expect("line");
        let next = Props {
            x2: Some(500.0),
            ..line.props()
        };
        assert!(factory.apply(&line, &next, Size::default()));
        assert!(!factory.apply(&line, &next, Size::default()));
        assert!(matches!(
            line.geometry(),
            Geometry::Segment { to, .. } if to == Point::new(500.0, 400.0)
        ));
    }

    #[tokio::test]
    async fn test_invalid_path_fails_creation() {
        let result = build(
            ObjectKind::Path,
            Props {
                path: Some("Q 10".into()),
                ..Props::default()
            },
        )
        .await;
        assert!(matches!(result, Err(FiberError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_invalid_path_update_keeps_geometry() {
        let path = build(ObjectKind::Path, Props::default())
            .await
            .expect("default path should build");
        let before = path.geometry();
        let factory = ShapeFactory::new(ObjectKind::Path).expect("path");

        let changed = factory.apply(
            &path,
            &Props {
                path: Some("nonsense".into()),
                ..Props::default()
            },
            Size::default(),
        );

        assert!(!changed);
        assert_eq!(path.geometry(), before);
        assert_eq!(path.props().path.as_deref(), Some("M 40 40 C 160 0 160 160 40 120 z"));
    }

    #[tokio::test]
    async fn test_fallback_path_when_unset() {
        let factory = ShapeFactory::new(ObjectKind::Path).expect("path");
        let object = factory
            .create(Props::default(), Size::default(), &CancelToken::new())
            .await
            .expect("fallback path should build");
        let Geometry::Path { path } = object.geometry() else {
            panic!("expected path geometry");
        };
        assert_eq!(path.elements().first(), Some(&PathEl::MoveTo(Point::new(0.0, 0.0))));
        assert_eq!(path.elements().last(), Some(&PathEl::ClosePath));
    }

    #[tokio::test]
    async fn test_polygon_points_are_geometry() {
        let polygon = build(ObjectKind::Polygon, Props::default())
            .await
            .expect("polygon should build");
        let extent = polygon.geometry().extent().expect("has points");
        assert!((extent.width() - 220.0).abs() < f64::EPSILON);
        assert!((extent.height() - 220.0).abs() < f64::EPSILON);
    }
}
