//! Bitmap images: asynchronous loaders and the image factory.
//!
//! Image objects are the one kind whose creation suspends. Loading honours a
//! [`CancelToken`], so replacing the source of a binding aborts the previous
//! load without any error or surface mutation.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;

use crate::binding::ObjectFactory;
use crate::cancel::CancelToken;
use crate::element::{ObjectHandle, ObjectKind};
use crate::geometry::{Geometry, Size};
use crate::model::{Length, PropKey, Props};
use crate::surface::SurfaceEvent;
use crate::{FiberError, FiberResult};

/// A loaded image: its source and intrinsic pixel size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Source the image was loaded from.
    pub src: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Asynchronous image source.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    /// Load and decode `src`.
    ///
    /// # Errors
    ///
    /// Returns [`FiberError::Cancelled`] once `cancel` fires, or
    /// [`FiberError::ResourceLoad`] if the source cannot be read or decoded.
    async fn load(&self, src: &str, cancel: &CancelToken) -> FiberResult<DecodedImage>;
}

/// Loads images from the filesystem and from base64 `data:` URIs.
#[derive(Debug, Clone, Default)]
pub struct FileImageLoader {
    base_dir: Option<PathBuf>,
}

impl FileImageLoader {
    /// Loader resolving relative paths against the working directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader resolving relative paths against `dir`.
    #[must_use]
    pub fn with_base_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(dir.into()),
        }
    }

    async fn read(&self, src: &str) -> FiberResult<Vec<u8>> {
        if let Some(uri) = src.strip_prefix("data:") {
            return decode_data_uri(uri);
        }
        let path = match &self.base_dir {
            Some(dir) => dir.join(src),
            None => PathBuf::from(src),
        };
        Ok(tokio::fs::read(&path).await?)
    }
}

fn decode_data_uri(uri: &str) -> FiberResult<Vec<u8>> {
    let (header, payload) = uri
        .split_once(',')
        .ok_or_else(|| FiberError::ResourceLoad("malformed data URI".into()))?;
    if !header.ends_with(";base64") {
        return Err(FiberError::ResourceLoad(
            "only base64 data URIs are supported".into(),
        ));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| FiberError::ResourceLoad(format!("invalid base64 payload: {e}")))
}

fn image_dimensions(bytes: Vec<u8>) -> FiberResult<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
        .map_err(|e| FiberError::ResourceLoad(format!("cannot decode image: {e}")))
}

#[async_trait]
impl ImageLoader for FileImageLoader {
    async fn load(&self, src: &str, cancel: &CancelToken) -> FiberResult<DecodedImage> {
        let bytes = tokio::select! {
            () = cancel.cancelled() => return Err(FiberError::Cancelled),
            bytes = self.read(src) => bytes?,
        };
        if cancel.is_cancelled() {
            return Err(FiberError::Cancelled);
        }
        let (width, height) = image_dimensions(bytes)?;
        tracing::debug!(src = %truncate(src), width, height, "Decoded image");
        Ok(DecodedImage {
            src: src.to_string(),
            width,
            height,
        })
    }
}

/// Shorten data URIs for logs.
fn truncate(src: &str) -> &str {
    const MAX: usize = 48;
    if src.len() <= MAX {
        return src;
    }
    let mut end = MAX;
    while !src.is_char_boundary(end) {
        end -= 1;
    }
    &src[..end]
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    width: u32,
    height: u32,
    latency: Duration,
    failure: Option<String>,
}

/// Loader backed by a fixed table, with optional latency and failures.
#[derive(Debug, Default)]
pub struct MemoryImageLoader {
    entries: HashMap<String, MemoryEntry>,
    loads: AtomicUsize,
}

impl MemoryImageLoader {
    /// Empty loader; every source fails.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image of the given size.
    #[must_use]
    pub fn with_image(mut self, src: impl Into<String>, width: u32, height: u32) -> Self {
        self.entries.insert(
            src.into(),
            MemoryEntry {
                width,
                height,
                latency: Duration::ZERO,
                failure: None,
            },
        );
        self
    }

    /// Register an image that resolves after `latency`.
    #[must_use]
    pub fn with_slow_image(
        mut self,
        src: impl Into<String>,
        width: u32,
        height: u32,
        latency: Duration,
    ) -> Self {
        self.entries.insert(
            src.into(),
            MemoryEntry {
                width,
                height,
                latency,
                failure: None,
            },
        );
        self
    }

    /// Register a source that fails with `message`.
    #[must_use]
    pub fn with_failure(mut self, src: impl Into<String>, message: impl Into<String>) -> Self {
        self.entries.insert(
            src.into(),
            MemoryEntry {
                width: 0,
                height: 0,
                latency: Duration::ZERO,
                failure: Some(message.into()),
            },
        );
        self
    }

    /// Number of loads started so far.
    #[must_use]
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageLoader for MemoryImageLoader {
    async fn load(&self, src: &str, cancel: &CancelToken) -> FiberResult<DecodedImage> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let entry = self
            .entries
            .get(src)
            .cloned()
            .ok_or_else(|| FiberError::ResourceLoad(format!("unknown image source: {src}")))?;

        if !entry.latency.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => return Err(FiberError::Cancelled),
                () = tokio::time::sleep(entry.latency) => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(FiberError::Cancelled);
        }
        if let Some(message) = entry.failure {
            return Err(FiberError::ResourceLoad(message));
        }
        Ok(DecodedImage {
            src: src.to_string(),
            width: entry.width,
            height: entry.height,
        })
    }
}

/// Factory for image objects.
///
/// `width`/`height` in the model are display sizes: the image keeps its
/// intrinsic size and is scaled uniformly to match. When both are given the
/// height wins. Percentages resolve against the surface's logical size. The
/// display size is applied when the image loads; later updates change the
/// other properties, and a new `src` rebuilds the object.
#[derive(Clone)]
pub struct ImageFactory {
    loader: Arc<dyn ImageLoader>,
}

impl ImageFactory {
    /// Factory loading through `loader`.
    #[must_use]
    pub fn new(loader: Arc<dyn ImageLoader>) -> Self {
        Self { loader }
    }
}

impl std::fmt::Debug for ImageFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageFactory").finish_non_exhaustive()
    }
}

/// Uniform scale that fits `intrinsic` to the requested display size.
fn display_scale(
    width: Option<Length>,
    height: Option<Length>,
    intrinsic: Size,
    bounds: Size,
) -> Option<f64> {
    let by_height = height
        .filter(|_| intrinsic.height > 0.0)
        .map(|h| h.resolve(bounds.height) / intrinsic.height);
    let by_width = width
        .filter(|_| intrinsic.width > 0.0)
        .map(|w| w.resolve(bounds.width) / intrinsic.width);
    by_height.or(by_width)
}

#[async_trait]
impl ObjectFactory for ImageFactory {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Image
    }

    fn defaults(&self) -> Props {
        Props {
            left: Some(0.0),
            top: Some(0.0),
            has_controls: Some(true),
            selectable: Some(true),
            ..Props::default()
        }
    }

    fn is_creatable(&self, props: &Props) -> bool {
        props.src.as_deref().is_some_and(|src| !src.is_empty())
    }

    fn needs_rebuild(&self, previous: &Props, next: &Props) -> bool {
        previous.src != next.src
    }

    async fn create(
        &self,
        initial: Props,
        bounds: Size,
        cancel: &CancelToken,
    ) -> FiberResult<ObjectHandle> {
        let src = initial
            .src
            .clone()
            .filter(|src| !src.is_empty())
            .ok_or_else(|| FiberError::InvalidOperation("image without src".into()))?;

        let decoded = tokio::select! {
            () = cancel.cancelled() => return Err(FiberError::Cancelled),
            decoded = self.loader.load(&src, cancel) => decoded?,
        };

        let intrinsic = Size::new(f64::from(decoded.width), f64::from(decoded.height));
        let mut props = initial.clone();
        props.width = Some(Length::Px(intrinsic.width));
        props.height = Some(Length::Px(intrinsic.height));
        if let Some(scale) = display_scale(initial.width, initial.height, intrinsic, bounds) {
            props.scale_x = Some(scale);
            props.scale_y = Some(scale);
        }

        Ok(ObjectHandle::new(ObjectKind::Image, props, Geometry::None).with_intrinsic_size(intrinsic))
    }

    fn model_keys(&self) -> &'static [PropKey] {
        &[PropKey::Width, PropKey::Height]
    }

    fn apply(&self, object: &ObjectHandle, next: &Props, _bounds: Size) -> bool {
        let mut next = next.clone();
        next.src = None;
        next.width = None;
        next.height = None;
        object.assign(&next)
    }

    fn failure_event(&self, props: &Props, error: &FiberError) -> SurfaceEvent {
        SurfaceEvent::ImageError {
            src: props.src.clone().unwrap_or_default(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    /// 2x3 RGBA PNG.
    fn png_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        image::RgbaImage::new(2, 3)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("png encoding should work");
        bytes
    }

    fn factory(loader: MemoryImageLoader) -> ImageFactory {
        ImageFactory::new(Arc::new(loader))
    }

    #[tokio::test]
    async fn test_file_loader_reads_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut file = std::fs::File::create(dir.path().join("pixel.png")).expect("create file");
        file.write_all(&png_bytes()).expect("write file");

        let loader = FileImageLoader::with_base_dir(dir.path());
        let decoded = loader
            .load("pixel.png", &CancelToken::new())
            .await
            .expect("image should load");
        assert_eq!((decoded.width, decoded.height), (2, 3));

        let missing = loader.load("missing.png", &CancelToken::new()).await;
        assert!(matches!(missing, Err(FiberError::Io(_))));
    }

    #[tokio::test]
    async fn test_file_loader_decodes_data_uri() {
        let payload = base64::engine::general_purpose::STANDARD.encode(png_bytes());
        let uri = format!("data:image/png;base64,{payload}");
        let decoded = FileImageLoader::new()
            .load(&uri, &CancelToken::new())
            .await
            .expect("data URI should load");
        assert_eq!((decoded.width, decoded.height), (2, 3));

        let plain = FileImageLoader::new()
            .load("data:text/plain,hello", &CancelToken::new())
            .await;
        assert!(matches!(plain, Err(FiberError::ResourceLoad(_))));

        let garbage = base64::engine::general_purpose::STANDARD.encode(b"not an image");
        let broken = FileImageLoader::new()
            .load(&format!("data:image/png;base64,{garbage}"), &CancelToken::new())
            .await;
        assert!(matches!(broken, Err(FiberError::ResourceLoad(_))));
    }

    #[tokio::test]
    async fn test_memory_loader_cancellation() {
        let loader =
            MemoryImageLoader::new().with_slow_image("slow.png", 10, 10, Duration::from_secs(5));
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = loader.load("slow.png", &cancel).await;
        assert!(matches!(result, Err(FiberError::Cancelled)));
        assert_eq!(loader.loads(), 1);
    }

    #[tokio::test]
    async fn test_scales_to_width_and_height_wins() {
        let images = factory(MemoryImageLoader::new().with_image("a.png", 200, 100));
        let bounds = Size::new(800.0, 600.0);

        let by_width = images
            .create(
                Props {
                    src: Some("a.png".into()),
                    width: Some(Length::Px(100.0)),
                    ..Props::default()
                },
                bounds,
                &CancelToken::new(),
            )
            .await
            .expect("image should load");
        assert_eq!(by_width.props().scale_x, Some(0.5));
        assert_eq!(by_width.props().width, Some(Length::Px(200.0)));
        assert!((by_width.bounding_rect(bounds).width() - 100.0).abs() < f64::EPSILON);

        let both = images
            .create(
                Props {
                    src: Some("a.png".into()),
                    width: Some(Length::Px(100.0)),
                    height: Some(Length::Percent(50.0)),
                    ..Props::default()
                },
                bounds,
                &CancelToken::new(),
            )
            .await
            .expect("image should load");
        assert_eq!(both.props().scale_y, Some(3.0));
        assert_eq!(both.intrinsic_size(), Some(Size::new(200.0, 100.0)));
    }

    #[test]
    fn test_rebuild_and_creatable_rules() {
        let images = factory(MemoryImageLoader::new());
        let a = Props {
            src: Some("a.png".into()),
            ..Props::default()
        };
        let b = Props {
            src: Some("b.png".into()),
            left: Some(4.0),
            ..Props::default()
        };
        assert!(images.needs_rebuild(&a, &b));
        assert!(!images.needs_rebuild(&a, &a));
        assert!(images.is_creatable(&a));
        assert!(!images.is_creatable(&Props {
            src: Some(String::new()),
            ..Props::default()
        }));
        assert!(!images.is_creatable(&Props::default()));
    }

    #[tokio::test]
    async fn test_apply_ignores_display_size() {
        let images = factory(MemoryImageLoader::new().with_image("a.png", 50, 50));
        let object = images
            .create(
                Props {
                    src: Some("a.png".into()),
                    ..Props::default()
                },
                Size::default(),
                &CancelToken::new(),
            )
            .await
            .expect("image should load");

        let changed = images.apply(
            &object,
            &Props {
                width: Some(Length::Px(10.0)),
                left: Some(30.0),
                ..Props::default()
            },
            Size::default(),
        );
        assert!(changed);
        assert_eq!(object.props().width, Some(Length::Px(50.0)));
        assert_eq!(object.props().left, Some(30.0));
    }

    #[test]
    fn test_failure_event_names_source() {
        let images = factory(MemoryImageLoader::new());
        let event = images.failure_event(
            &Props {
                src: Some("gone.png".into()),
                ..Props::default()
            },
            &FiberError::ResourceLoad("404".into()),
        );
        assert!(matches!(event, SurfaceEvent::ImageError { src, .. } if src == "gone.png"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "é".repeat(40);
        assert!(truncate(&long).len() <= 48);
        assert_eq!(truncate("short"), "short");
    }
}
