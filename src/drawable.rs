use crate::canvas::Canvas;
use crate::error::DeckError;
use crate::svg::{self, CompiledItem};
use crate::types::{Length, Rect, Size};
use base64::Engine;
use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Anything that can be presented into a box on a card.
#[derive(Debug, Clone)]
pub enum Drawable {
    Image(Arc<ImageAsset>),
    Painter(Painter),
}

/// A procedural drawable. The closure receives the final box and handles its
/// own aspect ratio.
#[derive(Clone)]
pub struct Painter {
    size: Size,
    paint: Arc<dyn Fn(&mut Canvas, Rect) + Send + Sync>,
}

impl Painter {
    pub fn new(size: Size, paint: impl Fn(&mut Canvas, Rect) + Send + Sync + 'static) -> Self {
        Self {
            size,
            paint: Arc::new(paint),
        }
    }
}

impl fmt::Debug for Painter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Painter")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ImageAsset {
    pub name: String,
    pub size: Size,
    kind: ImageKind,
}

#[derive(Debug)]
pub(crate) enum ImageKind {
    /// File path or `data:` URI, decoded by the output backend.
    Raster { source: String },
    /// Compiled at the intrinsic size.
    Vector { items: Vec<CompiledItem> },
}

impl ImageAsset {
    pub(crate) fn raster(name: impl Into<String>, size: Size, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            kind: ImageKind::Raster {
                source: source.into(),
            },
        }
    }

    pub(crate) fn vector(name: impl Into<String>, size: Size, items: Vec<CompiledItem>) -> Self {
        Self {
            name: name.into(),
            size,
            kind: ImageKind::Vector { items },
        }
    }

    /// Parses an SVG document and compiles it at its intrinsic size.
    pub fn from_svg(name: impl Into<String>, svg_xml: &str, base_dir: Option<&Path>) -> Result<Self, DeckError> {
        let size = svg::intrinsic_size(svg_xml)?;
        let items = svg::compile_svg(svg_xml, size.width.to_f32(), size.height.to_f32(), base_dir)?;
        Ok(Self::vector(name, size, items))
    }

    pub fn is_vector(&self) -> bool {
        matches!(self.kind, ImageKind::Vector { .. })
    }

    /// Draws the image stretched to exactly `rect`.
    pub fn draw(&self, canvas: &mut Canvas, rect: Rect) {
        match &self.kind {
            ImageKind::Raster { source } => {
                canvas.draw_image(rect.x, rect.y, rect.width, rect.height, source.as_str());
            }
            ImageKind::Vector { items } => {
                if self.size.is_empty() {
                    return;
                }
                canvas.save_state();
                canvas.translate(rect.x, rect.y);
                canvas.scale(
                    rect.width.to_f32() / self.size.width.to_f32(),
                    rect.height.to_f32() / self.size.height.to_f32(),
                );
                svg::render_compiled_items(items, canvas);
                canvas.restore_state();
            }
        }
    }
}

impl Drawable {
    pub fn intrinsic_size(&self) -> Size {
        match self {
            Drawable::Image(image) => image.size,
            Drawable::Painter(painter) => painter.size,
        }
    }

    /// Draws into `rect` without any aspect handling.
    pub fn draw(&self, canvas: &mut Canvas, rect: Rect) {
        match self {
            Drawable::Image(image) => image.draw(canvas, rect),
            Drawable::Painter(painter) => (painter.paint)(canvas, rect),
        }
    }

    /// Scales into `rect` preserving aspect ratio and centering the slack.
    /// Painters get the unmodified box.
    pub fn fit(&self, canvas: &mut Canvas, rect: Rect) {
        match self {
            Drawable::Image(image) => {
                if let Some(fitted) = fit_box(image.size, rect) {
                    image.draw(canvas, fitted);
                }
            }
            Drawable::Painter(_) => self.draw(canvas, rect),
        }
    }
}

/// The largest rect with the aspect of `intrinsic` that fits `rect`, centered.
/// `None` when either size is degenerate.
pub fn fit_box(intrinsic: Size, rect: Rect) -> Option<Rect> {
    let image_aspect = intrinsic.aspect()?;
    let box_aspect = rect.size().aspect()?;
    if image_aspect > box_aspect {
        let height = rect.width / image_aspect;
        Some(Rect::new(
            rect.x,
            rect.y + (rect.height - height) / 2,
            rect.width,
            height,
        ))
    } else {
        let width = rect.height * image_aspect;
        Some(Rect::new(
            rect.x + (rect.width - width) / 2,
            rect.y,
            width,
            rect.height,
        ))
    }
}

/// Resolves logical image names into drawables, relative to an image
/// directory. Each name is loaded once.
#[derive(Debug)]
pub struct ImageProvider {
    root: PathBuf,
    cache: HashMap<String, Arc<ImageAsset>>,
}

impl ImageProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn resolve(&mut self, name: &str) -> Result<Drawable, DeckError> {
        if let Some(asset) = self.cache.get(name) {
            return Ok(Drawable::Image(asset.clone()));
        }
        let asset = if name.starts_with("data:") {
            load_data_uri(name)?
        } else {
            self.load_file(name)?
        };
        log::debug!("loaded image {} ({:?})", name, asset.size);
        let asset = Arc::new(asset);
        self.cache.insert(name.to_string(), asset.clone());
        Ok(Drawable::Image(asset))
    }

    fn load_file(&self, name: &str) -> Result<ImageAsset, DeckError> {
        let path = self.root.join(name);
        if !path.is_file() {
            return Err(DeckError::unresolved("image", name));
        }
        let is_svg = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("svg"))
            .unwrap_or(false);
        if is_svg {
            let xml = std::fs::read_to_string(&path)?;
            return ImageAsset::from_svg(name, &xml, path.parent())
                .map_err(|err| DeckError::Asset(format!("{name}: {err}")));
        }
        let (width, height) = image::image_dimensions(&path)
            .map_err(|err| DeckError::Asset(format!("{name}: {err}")))?;
        Ok(ImageAsset::raster(
            name,
            Size::new(width as f32, height as f32),
            path.to_string_lossy(),
        ))
    }
}

fn load_data_uri(uri: &str) -> Result<ImageAsset, DeckError> {
    let (mime, bytes) = decode_data_uri(uri)?;
    let label = format!("data:{mime}");
    if mime.eq_ignore_ascii_case("image/svg+xml") {
        let xml = String::from_utf8(bytes)
            .map_err(|_| DeckError::Asset("svg data URI is not UTF-8".to_string()))?;
        return ImageAsset::from_svg(label, &xml, None);
    }
    let (width, height) = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()
        .map_err(|err| DeckError::Asset(format!("{label}: {err}")))?;
    Ok(ImageAsset::raster(
        label,
        Size::new(width as f32, height as f32),
        uri,
    ))
}

/// Splits a `data:` URI into its media type and decoded payload.
pub(crate) fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), DeckError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| DeckError::Asset("not a data URI".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| DeckError::Asset("data URI has no payload".to_string()))?;
    let mut parts = meta.split(';');
    let mime = parts.next().unwrap_or("").trim().to_string();
    let is_base64 = parts.any(|p| p.trim().eq_ignore_ascii_case("base64"));
    let bytes = if is_base64 {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|err| DeckError::Asset(format!("bad base64 in data URI: {err}")))?
    } else {
        percent_decode(payload)
    };
    Ok((mime, bytes))
}

fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

/// Reads the bytes behind an image source recorded on the canvas.
pub(crate) fn load_image_source(source: &str) -> Result<Vec<u8>, DeckError> {
    if source.starts_with("data:") {
        return decode_data_uri(source).map(|(_, bytes)| bytes);
    }
    std::fs::read(source).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => DeckError::unresolved("image", source),
        _ => DeckError::Io(err),
    })
}
