//! Model values bound to surface objects.
//!
//! A [`Props`] value is the plain, serialisable subset of an object's settable
//! properties. Every field is optional: an unset field means "not bound", so
//! overlaying a model on top of kind defaults and stripping unset keys are the
//! same operation.
//!
//! Properties are copied field by field through the [`PropKey`] allowlists of
//! each [`ObjectKind`](crate::ObjectKind); there is no reflective access.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::{FiberError, FiberResult};


/// A length that is either absolute or relative to the surface size.
///
/// Serialises as a number for pixels and as `"50%"` for percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LengthRepr", into = "LengthRepr")]
pub enum Length {
    /// Absolute size in logical pixels.
    Px(f64),
    /// Percentage of the reference dimension (`50.0` is half).
    Percent(f64),
}

impl Length {
    /// Resolve against a reference dimension in logical pixels.
    #[must_use]
    pub fn resolve(self, reference: f64) -> f64 {
        match self {
            Self::Px(px) => px,
            Self::Percent(pct) => reference * pct / 100.0,
        }
    }

    /// Parse `"120"`, `"120px"` or `"50%"`.
    ///
    /// # Errors
    ///
    /// Returns [`FiberError::InvalidOperation`] if the text is not a length.
    pub fn parse(text: &str) -> FiberResult<Self> {
        let trimmed = text.trim();
        let invalid = || FiberError::InvalidOperation(format!("invalid length: {text:?}"));
        if let Some(pct) = trimmed.strip_suffix('%') {
            return pct.trim().parse().map(Self::Percent).map_err(|_| invalid());
        }
        let px = trimmed.strip_suffix("px").unwrap_or(trimmed);
        px.trim().parse().map(Self::Px).map_err(|_| invalid())
    }
}

impl From<f64> for Length {
    fn from(px: f64) -> Self {
        Self::Px(px)
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Px(px) => write!(f, "{px}"),
            Self::Percent(pct) => write!(f, "{pct}%"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum LengthRepr {
    Number(f64),
    Text(String),
}

impl TryFrom<LengthRepr> for Length {
    type Error = FiberError;

    fn try_from(repr: LengthRepr) -> Result<Self, Self::Error> {
        match repr {
            LengthRepr::Number(px) => Ok(Self::Px(px)),
            LengthRepr::Text(text) => Self::parse(&text),
        }
    }
}

impl From<Length> for LengthRepr {
    fn from(length: Length) -> Self {
        match length {
            Length::Px(px) => Self::Number(px),
            Length::Percent(_) => Self::Text(length.to_string()),
        }
    }
}

/// Declares [`Props`] and [`PropKey`] from one field table so that the
/// struct, the key enum and the per-field copier cannot drift apart.
macro_rules! define_props {
    ($( $(#[$doc:meta])* $field:ident: $ty:ty => $key:ident = $name:literal, )*) => {
        /// Model value: optional settable properties of a surface object.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct Props {
            $(
                $(#[$doc])*
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }

        /// Name of a single bindable property.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum PropKey {
            $(
                $(#[$doc])*
                #[serde(rename = $name)]
                $key,
            )*
        }

        impl PropKey {
            /// Every known key, in declaration order.
            pub const ALL: &'static [PropKey] = &[$(PropKey::$key),*];

            /// Serialised (camelCase) name of the key.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $(PropKey::$key => $name,)*
                }
            }

            /// Look a key up by its serialised name.
            #[must_use]
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(PropKey::$key),)*
                    _ => None,
                }
            }
        }

        impl Props {
            /// Whether `key` holds a value.
            #[must_use]
            pub fn is_set(&self, key: PropKey) -> bool {
                match key {
                    $(PropKey::$key => self.$field.is_some(),)*
                }
            }

            /// Copy `self`, then let every field set in `over` win.
            #[must_use]
            pub fn overlay(&self, over: &Self) -> Self {
                Self {
                    $($field: over.$field.clone().or_else(|| self.$field.clone()),)*
                }
            }

            /// Keep only `keys`; unset fields stay unset.
            #[must_use]
            pub fn pick(&self, keys: &[PropKey]) -> Self {
                let mut picked = Self::default();
                for key in keys {
                    match key {
                        $(PropKey::$key => picked.$field.clone_from(&self.$field),)*
                    }
                }
                picked
            }

            /// Assign every field set in `next`. Returns whether any value changed.
            pub fn assign(&mut self, next: &Self) -> bool {
                let mut changed = false;
                $(
                    if let Some(value) = &next.$field {
                        if self.$field.as_ref() != Some(value) {
                            self.$field = Some(value.clone());
                            changed = true;
                        }
                    }
                )*
                changed
            }

            /// Whether every field set in `other` has the same value here.
            #[must_use]
            pub fn contains(&self, other: &Self) -> bool {
                $(
                    if other.$field.is_some() && self.$field != other.$field {
                        return false;
                    }
                )*
                true
            }
        }
    };
}

define_props! {
    /// Distance from the left edge of the surface.
    left: f64 => Left = "left",
    /// Distance from the top edge of the surface.
    top: f64 => Top = "top",
    /// Width in pixels or percent of the surface width.
    width: Length => Width = "width",
    /// Height in pixels or percent of the surface height.
    height: Length => Height = "height",
    /// Horizontal scale factor.
    scale_x: f64 => ScaleX = "scaleX",
    /// Vertical scale factor.
    scale_y: f64 => ScaleY = "scaleY",
    /// Rotation in degrees.
    angle: f64 => Angle = "angle",
    /// Opacity from 0.0 to 1.0.
    opacity: f64 => Opacity = "opacity",
    /// Fill color.
    fill: String => Fill = "fill",
    /// Stroke color.
    stroke: String => Stroke = "stroke",
    /// Stroke width in pixels.
    stroke_width: f64 => StrokeWidth = "strokeWidth",
    /// Whether the object can be selected interactively.
    selectable: bool => Selectable = "selectable",
    /// Whether the object receives pointer events.
    evented: bool => Evented = "evented",
    /// Whether resize/rotate controls are shown when selected.
    has_controls: bool => HasControls = "hasControls",
    /// Whether the object is painted.
    visible: bool => Visible = "visible",
    /// Horizontal corner (rect) or axis (ellipse) radius.
    rx: f64 => Rx = "rx",
    /// Vertical corner (rect) or axis (ellipse) radius.
    ry: f64 => Ry = "ry",
    /// Circle radius.
    radius: f64 => Radius = "radius",
    /// Line start X.
    x1: f64 => X1 = "x1",
    /// Line start Y.
    y1: f64 => Y1 = "y1",
    /// Line end X.
    x2: f64 => X2 = "x2",
    /// Line end Y.
    y2: f64 => Y2 = "y2",
    /// Polygon / polyline vertices.
    points: Vec<Point> => Points = "points",
    /// SVG path data.
    path: String => Path = "path",
    /// Text content.
    text: String => Text = "text",
    /// Font family name.
    font_family: String => FontFamily = "fontFamily",
    /// Font size in pixels.
    font_size: f64 => FontSize = "fontSize",
    /// Font weight (`"600"`, `"bold"`, ...).
    font_weight: String => FontWeight = "fontWeight",
    /// Text alignment.
    text_align: String => TextAlign = "textAlign",
    /// Image source: file path or `data:` URI.
    src: String => Src = "src",
    /// Cross-origin mode forwarded to the loader.
    cross_origin: String => CrossOrigin = "crossOrigin",
}

impl Props {
    /// Keys that currently hold a value, in declaration order.
    #[must_use]
    pub fn defined_keys(&self) -> Vec<PropKey> {
        PropKey::ALL
            .iter()
            .copied()
            .filter(|key| self.is_set(*key))
            .collect()
    }

    /// Whether no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defined_keys().is_empty()
    }

    /// Serialize the model to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> FiberResult<String> {
        serde_json::to_string(self).map_err(FiberError::Serialization)
    }

    /// Deserialize a model from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is not a valid model.
    pub fn from_json(json: &str) -> FiberResult<Self> {
        serde_json::from_str(json).map_err(FiberError::Serialization)
    }
}

/// Normalise a loosely typed key list against an allowlist.
///
/// Unknown names and keys outside `allowed` are dropped; order and duplicates
/// are preserved.
#[must_use]
pub fn normalize_key_selection<S: AsRef<str>>(names: &[S], allowed: &[PropKey]) -> Vec<PropKey> {
    names
        .iter()
        .filter_map(|name| PropKey::from_name(name.as_ref()))
        .filter(|key| allowed.contains(key))
        .collect()
}
