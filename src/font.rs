use crate::error::DeckError;
use crate::types::Length;
use rustybuzz::{Direction as HbDirection, Face as HbFace, UnicodeBuffer};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use ttf_parser::GlyphId;

// Metrics used when a family has no registered face.
const FALLBACK_ADVANCE_EM: f32 = 0.6;
const FALLBACK_ASCENT_EM: f32 = 0.8;
const FALLBACK_DESCENT_EM: f32 = 0.2;

/// A font request in pango notation: family followed by a size, e.g. `"Serif 6.5"`.
#[derive(Debug, Clone, PartialEq)]
pub struct FontSpec {
    pub family: String,
    pub size: f32,
}

impl FontSpec {
    pub fn new(family: impl Into<String>, size: f32) -> Self {
        Self {
            family: family.into(),
            size,
        }
    }

    /// Splits the trailing number off as the size. Returns `None` when the
    /// description has no family or no positive size.
    pub fn parse(description: &str) -> Option<Self> {
        let trimmed = description.trim();
        let (family, size) = trimmed.rsplit_once(char::is_whitespace)?;
        let size = size.parse::<f32>().ok()?;
        let family = family.trim();
        if family.is_empty() || !size.is_finite() || size <= 0.0 {
            return None;
        }
        Some(Self::new(family, size))
    }
}

impl fmt::Display for FontSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.family, self.size)
    }
}

/// Ascent and descent at a given size. Descent is positive (distance below the baseline).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerticalMetrics {
    pub ascent: Length,
    pub descent: Length,
}

impl VerticalMetrics {
    pub fn line_height(&self) -> Length {
        self.ascent + self.descent
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct TextWidthKey {
    font_index: usize,
    size_milli: i64,
    text: String,
}

#[derive(Debug)]
struct TextWidthCache {
    map: HashMap<TextWidthKey, Length>,
    order: VecDeque<TextWidthKey>,
    max_entries: usize,
}

impl TextWidthCache {
    fn new(max_entries: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn get(&self, key: &TextWidthKey) -> Option<Length> {
        self.map.get(key).copied()
    }

    fn insert(&mut self, key: TextWidthKey, value: Length) {
        if self.map.contains_key(&key) {
            return;
        }
        self.map.insert(key.clone(), value);
        self.order.push_back(key);
        while self.map.len() > self.max_entries {
            match self.order.pop_front() {
                Some(old) => {
                    self.map.remove(&old);
                }
                None => break,
            }
        }
    }
}

#[derive(Debug)]
pub struct FontRegistry {
    fonts: Vec<RegisteredFont>,
    lookup: HashMap<String, usize>,
    text_width_cache: Mutex<TextWidthCache>,
}

#[derive(Debug)]
pub(crate) struct RegisteredFont {
    pub(crate) name: String,
    pub(crate) data: Vec<u8>,
    pub(crate) metrics: FontMetrics,
    pub(crate) program_kind: FontProgramKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FontProgramKind {
    TrueType,
    OpenTypeCff,
}

/// Face-wide metrics in 1/1000 em, the unit PDF font dictionaries use.
#[derive(Debug)]
pub(crate) struct FontMetrics {
    pub(crate) ascent: i16,
    pub(crate) descent: i16,
    pub(crate) cap_height: i16,
    pub(crate) italic_angle: i16,
    pub(crate) stem_v: i16,
    pub(crate) bbox: (i16, i16, i16, i16),
    pub(crate) missing_width: u16,
    pub(crate) is_fixed_pitch: bool,
}

impl Default for FontRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FontRegistry {
    pub fn new() -> Self {
        Self {
            fonts: Vec::new(),
            lookup: HashMap::new(),
            text_width_cache: Mutex::new(TextWidthCache::new(20_000)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn register_dir(&mut self, path: impl AsRef<Path>) -> usize {
        let path = path.as_ref();
        let Ok(entries) = fs::read_dir(path) else {
            log::warn!("font directory {} is not readable", path.display());
            return 0;
        };
        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        // Directory order is platform dependent; first registration wins an alias.
        files.sort();
        files
            .into_iter()
            .filter(|file| self.register_file(file).is_some())
            .count()
    }

    /// Registers a `.ttf`/`.otf` file and returns its primary name.
    pub fn register_file(&mut self, path: impl AsRef<Path>) -> Option<String> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|v| v.to_str())?.to_ascii_lowercase();
        if ext != "ttf" && ext != "otf" {
            return None;
        }
        let data = fs::read(path).ok()?;
        match self.register_with_source(data, path) {
            Ok(name) => Some(name),
            Err(err) => {
                log::warn!("skipping font {}: {}", path.display(), err);
                None
            }
        }
    }

    pub fn register_bytes(
        &mut self,
        data: Vec<u8>,
        source_name: Option<&str>,
    ) -> Result<String, DeckError> {
        let source = source_name.unwrap_or("EmbeddedFont");
        self.register_with_source(data, Path::new(source))
    }

    fn register_with_source(&mut self, data: Vec<u8>, source: &Path) -> Result<String, DeckError> {
        let face = ttf_parser::Face::parse(&data, 0).map_err(|_| {
            DeckError::Asset(format!("invalid font data for {}", source.display()))
        })?;
        let (name, aliases) = font_names(&face, source);
        let (metrics, program_kind) = FontMetrics::from_face(&face);
        drop(face);

        let index = self.fonts.len();
        self.fonts.push(RegisteredFont {
            name: name.clone(),
            data,
            metrics,
            program_kind,
        });
        for alias in std::iter::once(name.clone()).chain(aliases) {
            let key = normalize_name(&alias);
            if key.is_empty() || self.lookup.contains_key(&key) {
                continue;
            }
            self.lookup.insert(key, index);
        }
        log::debug!("registered font {name}");
        Ok(name)
    }

    /// Makes `alias` resolve to the face already registered as `target`.
    pub fn register_alias(&mut self, alias: &str, target: &str) -> bool {
        let Some(index) = self.lookup.get(&normalize_name(target)).copied() else {
            return false;
        };
        self.lookup.insert(normalize_name(alias), index);
        true
    }

    /// Looks for a system face matching `family` and registers it under that
    /// family name. Returns whether the family now resolves.
    pub fn discover_system_family(&mut self, family: &str) -> bool {
        if self.resolve(family).is_some() {
            return true;
        }
        let Some(bytes) = system_font_bytes(family) else {
            log::warn!("no system font found for family \"{family}\"");
            return false;
        };
        match self.register_bytes(bytes.as_ref().clone(), Some(family)) {
            Ok(name) => {
                self.register_alias(family, &name);
                log::info!("using system font {name} for \"{family}\"");
                true
            }
            Err(err) => {
                log::warn!("system font for \"{family}\" is unusable: {err}");
                false
            }
        }
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<&RegisteredFont> {
        let key = normalize_name(name);
        self.lookup
            .get(&key)
            .and_then(|index| self.fonts.get(*index))
    }

    pub fn measure_text_width(&self, name: &str, font_size: Length, text: &str) -> Length {
        let Some(index) = self.lookup.get(&normalize_name(name)).copied() else {
            let chars = text.chars().count() as f32;
            return Length::from_f32(font_size.to_f32() * FALLBACK_ADVANCE_EM * chars);
        };
        let cache_key = TextWidthKey {
            font_index: index,
            size_milli: font_size.to_milli_i64(),
            text: text.to_string(),
        };
        if let Ok(cache) = self.text_width_cache.lock() {
            if let Some(value) = cache.get(&cache_key) {
                return value;
            }
        }
        let Some(font) = self.fonts.get(index) else {
            return Length::ZERO;
        };
        let units = shaped_advance_units(&font.data, text)
            .unwrap_or_else(|| cmap_advance_units(&font.data, text));
        let value = Length::from_f32(font_size.to_f32() * units as f32 / 1000.0);
        if let Ok(mut cache) = self.text_width_cache.lock() {
            cache.insert(cache_key, value);
        }
        value
    }

    pub fn vertical_metrics(&self, name: &str, font_size: Length) -> VerticalMetrics {
        let size = font_size.to_f32();
        match self.resolve(name) {
            Some(font) => VerticalMetrics {
                ascent: Length::from_f32(size * font.metrics.ascent as f32 / 1000.0),
                descent: Length::from_f32(size * -(font.metrics.descent as f32) / 1000.0),
            },
            None => VerticalMetrics {
                ascent: Length::from_f32(size * FALLBACK_ASCENT_EM),
                descent: Length::from_f32(size * FALLBACK_DESCENT_EM),
            },
        }
    }

    /// Horizontal advance of a glyph in 1/1000 em.
    pub(crate) fn glyph_advance(&self, name: &str, gid: u16) -> u16 {
        let Some(font) = self.resolve(name) else {
            return 0;
        };
        let Ok(face) = ttf_parser::Face::parse(&font.data, 0) else {
            return 0;
        };
        let advance = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0);
        let units = face.units_per_em().max(1) as i64;
        let scaled = ((advance as i64) * 1000 + (units / 2)) / units;
        scaled.clamp(0, u16::MAX as i64) as u16
    }
}

impl FontMetrics {
    fn from_face(face: &ttf_parser::Face<'_>) -> (Self, FontProgramKind) {
        let scale = 1000.0 / face.units_per_em().max(1) as f32;
        let ascent = scale_i16(face.ascender(), scale);
        let descent = scale_i16(face.descender(), scale);
        let cap_height = face
            .capital_height()
            .map(|value| scale_i16(value, scale))
            .unwrap_or(ascent);
        let bbox = face.global_bounding_box();
        let bbox = (
            scale_i16(bbox.x_min, scale),
            scale_i16(bbox.y_min, scale),
            scale_i16(bbox.x_max, scale),
            scale_i16(bbox.y_max, scale),
        );
        let italic_angle = face
            .italic_angle()
            .map(|value| value.round() as i16)
            .unwrap_or(0);
        let missing_width = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .map(|adv| (adv as f32 * scale).round().clamp(0.0, u16::MAX as f32) as u16)
            .unwrap_or(0);
        let program_kind = if face.tables().cff.is_some() {
            FontProgramKind::OpenTypeCff
        } else {
            FontProgramKind::TrueType
        };
        (
            Self {
                ascent,
                descent,
                cap_height,
                italic_angle,
                stem_v: 80,
                bbox,
                missing_width,
                is_fixed_pitch: face.is_monospaced(),
            },
            program_kind,
        )
    }
}

fn shaped_advance_units(data: &[u8], text: &str) -> Option<i64> {
    let face = HbFace::from_slice(data, 0)?;
    let units_per_em = face.units_per_em().max(1) as i64;
    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let positions = output.glyph_positions();
    if positions.is_empty() && !text.is_empty() {
        return None;
    }
    let total: i64 = positions
        .iter()
        .map(|pos| ((pos.x_advance as i64) * 1000 + (units_per_em / 2)) / units_per_em)
        .sum();
    Some(total.max(0))
}

fn cmap_advance_units(data: &[u8], text: &str) -> i64 {
    let Ok(face) = ttf_parser::Face::parse(data, 0) else {
        return 0;
    };
    let units_per_em = face.units_per_em().max(1) as i64;
    text.chars()
        .map(|ch| {
            face.glyph_index(ch)
                .and_then(|id| face.glyph_hor_advance(id))
                .map(|adv| (adv as i64 * 1000) / units_per_em)
                .unwrap_or(500)
        })
        .sum()
}

pub(crate) fn detect_direction(text: &str) -> HbDirection {
    for ch in text.chars() {
        let code = ch as u32;
        let rtl = matches!(
            code,
            0x0590..=0x08FF
                | 0xFB1D..=0xFDFF
                | 0xFE70..=0xFEFF
                | 0x1EE00..=0x1EEFF
        );
        if rtl {
            return HbDirection::RightToLeft;
        }
    }
    HbDirection::LeftToRight
}

fn scale_i16(value: i16, scale: f32) -> i16 {
    let scaled = (value as f32 * scale).round() as i32;
    scaled.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn font_names(face: &ttf_parser::Face<'_>, path: &Path) -> (String, Vec<String>) {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    let mut post = None;

    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY => {
                if family.is_none() {
                    family = Some(name);
                }
            }
            name_id::FULL_NAME => {
                if full.is_none() {
                    full = Some(name);
                }
            }
            name_id::POST_SCRIPT_NAME => {
                if post.is_none() {
                    post = Some(name);
                }
            }
            _ => {}
        }
    }

    let stem = path
        .file_stem()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string());
    let primary = post
        .clone()
        .or_else(|| full.clone())
        .or_else(|| family.clone())
        .or_else(|| stem.clone())
        .unwrap_or_else(|| "EmbeddedFont".to_string());

    let mut aliases = Vec::new();
    for candidate in [family, full, post, stem].into_iter().flatten() {
        if candidate != primary {
            aliases.push(candidate);
        }
    }

    (primary, aliases)
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

static SYSTEM_FONT_CACHE: OnceLock<Mutex<HashMap<String, Option<Arc<Vec<u8>>>>>> = OnceLock::new();

/// Loads the first installed face matching a family, trying the common file
/// names for the generic families the deck uses.
pub(crate) fn system_font_bytes(family: &str) -> Option<Arc<Vec<u8>>> {
    let key = normalize_name(family);
    if key.is_empty() {
        return None;
    }
    let cache = SYSTEM_FONT_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    if let Ok(guard) = cache.lock() {
        if let Some(entry) = guard.get(&key) {
            return entry.clone();
        }
    }
    let loaded = load_system_font(&key);
    if let Ok(mut guard) = cache.lock() {
        guard.insert(key, loaded.clone());
    }
    loaded
}

fn load_system_font(family_key: &str) -> Option<Arc<Vec<u8>>> {
    let candidates = system_font_file_candidates(family_key);
    let mut found: HashMap<String, PathBuf> = HashMap::new();
    for dir in system_font_dirs() {
        collect_font_files(&dir, &candidates, &mut found, 0);
    }
    for candidate in &candidates {
        let Some(path) = found.get(&candidate.to_ascii_lowercase()) else {
            continue;
        };
        let Ok(bytes) = fs::read(path) else {
            continue;
        };
        if ttf_parser::Face::parse(&bytes, 0).is_ok() {
            return Some(Arc::new(bytes));
        }
    }
    None
}

fn collect_font_files(
    dir: &Path,
    candidates: &[String],
    found: &mut HashMap<String, PathBuf>,
    depth: usize,
) {
    const MAX_DEPTH: usize = 4;
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if depth < MAX_DEPTH {
                collect_font_files(&path, candidates, found, depth + 1);
            }
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|v| v.to_str()) else {
            continue;
        };
        let lower = file_name.to_ascii_lowercase();
        if candidates.iter().any(|c| c.eq_ignore_ascii_case(&lower)) {
            found.entry(lower).or_insert(path);
        }
    }
}

fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(extra) = std::env::var("DECKPRESS_FONT_DIR") {
        for path in std::env::split_paths(&extra) {
            if !path.as_os_str().is_empty() {
                dirs.push(path);
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        dirs.push(PathBuf::from(r"C:\Windows\Fonts"));
        if let Ok(windir) = std::env::var("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(&home).join(".fonts"));
            dirs.push(PathBuf::from(home).join(".local/share/fonts"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        dirs.push(PathBuf::from("/System/Library/Fonts"));
        dirs.push(PathBuf::from("/Library/Fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    }

    dirs
}

fn system_font_file_candidates(family_key: &str) -> Vec<String> {
    let names: &[&str] = match family_key {
        "serif" | "times" | "times new roman" => &[
            "DejaVuSerif.ttf",
            "LiberationSerif-Regular.ttf",
            "NotoSerif-Regular.ttf",
            "times.ttf",
            "Times New Roman.ttf",
        ],
        "sans" | "sans-serif" | "helvetica" | "arial" => &[
            "DejaVuSans.ttf",
            "LiberationSans-Regular.ttf",
            "NotoSans-Regular.ttf",
            "arial.ttf",
            "Arial.ttf",
        ],
        "arial black" => &[
            "ariblk.ttf",
            "Arial Black.ttf",
            "Arial-Black.ttf",
            "NotoSans-Black.ttf",
            "DejaVuSans-Bold.ttf",
            "LiberationSans-Bold.ttf",
            "NotoSans-Bold.ttf",
        ],
        _ => &[],
    };
    if !names.is_empty() {
        return names.iter().map(|name| name.to_string()).collect();
    }
    let compact: String = family_key
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    vec![
        format!("{compact}.ttf"),
        format!("{compact}-Regular.ttf"),
        format!("{compact}.otf"),
        format!("{compact}-Regular.otf"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pango_style_descriptions() {
        assert_eq!(FontSpec::parse("Serif 6.5"), Some(FontSpec::new("Serif", 6.5)));
        assert_eq!(
            FontSpec::parse("Arial Black 11.2"),
            Some(FontSpec::new("Arial Black", 11.2))
        );
        assert_eq!(FontSpec::parse("Serif"), None);
        assert_eq!(FontSpec::parse("12"), None);
        assert_eq!(FontSpec::parse("Serif -3"), None);
    }

    #[test]
    fn font_spec_displays_as_description() {
        assert_eq!(FontSpec::new("Serif", 6.5).to_string(), "Serif 6.5");
    }

    #[test]
    fn unregistered_family_uses_fallback_advance() {
        let registry = FontRegistry::new();
        let width = registry.measure_text_width("Nowhere", Length::from_f32(10.0), "abcd");
        assert_eq!(width, Length::from_f32(24.0));
    }

    #[test]
    fn unregistered_family_uses_fallback_vertical_metrics() {
        let registry = FontRegistry::new();
        let metrics = registry.vertical_metrics("Nowhere", Length::from_f32(10.0));
        assert_eq!(metrics.ascent, Length::from_f32(8.0));
        assert_eq!(metrics.descent, Length::from_f32(2.0));
        assert_eq!(metrics.line_height(), Length::from_f32(10.0));
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        let mut registry = FontRegistry::new();
        let err = registry
            .register_bytes(vec![0, 1, 2, 3], Some("broken.ttf"))
            .unwrap_err();
        assert!(matches!(err, DeckError::Asset(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn alias_to_unknown_target_is_refused() {
        let mut registry = FontRegistry::new();
        assert!(!registry.register_alias("Serif", "Missing"));
    }

    #[test]
    fn generic_families_have_file_candidates() {
        assert!(system_font_file_candidates("serif").contains(&"DejaVuSerif.ttf".to_string()));
        assert_eq!(
            system_font_file_candidates("comic neue")[0],
            "ComicNeue.ttf".to_string()
        );
    }

    #[test]
    fn register_dir_skips_non_font_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.txt"), "not a font").unwrap();
        std::fs::write(dir.path().join("bogus.ttf"), [0u8; 16]).unwrap();
        let mut registry = FontRegistry::new();
        assert_eq!(registry.register_dir(dir.path()), 0);
    }
}
