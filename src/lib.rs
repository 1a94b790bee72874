mod atlas;
mod canvas;
mod card;
mod compose;
mod debug;
mod deck;
mod drawable;
mod error;
mod font;
mod geometry;
mod overlay;
mod paginate;
mod pdf;
mod raster;
mod svg;
mod text;
mod types;

pub use atlas::{AtlasTiler, CellFit, Tile, TileCursor, TilePlacement, TiledDeck, canvas_count};
pub use canvas::{Canvas, Command, Document, Page};
pub use card::{CardRecord, CardRecordBuilder};
pub use compose::{CardMetrics, Composer, column_boxes};
pub use debug::DebugLogger;
pub use deck::{
    CardDeck, DeckAssets, Keeper, KeeperRegistry, Palette, basic_rules_card, parse_actions,
    parse_goals, parse_keepers, parse_rules,
};
pub use drawable::{Drawable, ImageAsset, ImageProvider, Painter, fit_box};
pub use error::DeckError;
pub use font::{FontRegistry, FontSpec, VerticalMetrics};
pub use geometry::LayoutConfig;
pub use overlay::{BAR_HALF_THICKNESS, gap_half_angle, make_overlay};
pub use paginate::{CardPlacement, PageCursor, PaginatedDeck, Paginator, Slot};
pub use pdf::{PdfOptions, document_to_pdf, write_pdf};
pub use raster::{Renderer, document_to_png_pages};
pub use text::{Anchor, Paragraph, measure_and_draw};
pub use types::{Color, Length, Rect, Size};

use std::path::{Path, PathBuf};

/// Families the card layout asks for by default.
const DECK_FAMILIES: [&str; 3] = ["Serif", "Sans", "Arial Black"];

/// Renders a card deck to a printable PDF and to PNG sprite atlases. Both
/// passes see the same cards in the same order.
pub struct DeckPress {
    config: LayoutConfig,
    fonts: FontRegistry,
    pdf_options: PdfOptions,
    debug: Option<DebugLogger>,
}

#[derive(Clone)]
pub struct DeckPressBuilder {
    config: LayoutConfig,
    font_dirs: Vec<PathBuf>,
    font_files: Vec<PathBuf>,
    system_fonts: bool,
    pdf_options: PdfOptions,
    debug_path: Option<PathBuf>,
}

impl Default for DeckPressBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DeckPressBuilder {
    pub fn new() -> Self {
        Self {
            config: LayoutConfig::default(),
            font_dirs: Vec::new(),
            font_files: Vec::new(),
            system_fonts: true,
            pdf_options: PdfOptions::default(),
            debug_path: None,
        }
    }

    pub fn layout(mut self, config: LayoutConfig) -> Self {
        self.config = config;
        self
    }

    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn register_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    // Look up Serif, Sans and Arial Black among installed fonts when no
    // registered face provides them. Without a face, text falls back to
    // approximate metrics and base-14 PDF fonts, and the atlas skips it.
    pub fn system_fonts(mut self, enabled: bool) -> Self {
        self.system_fonts = enabled;
        self
    }

    pub fn pdf_options(mut self, options: PdfOptions) -> Self {
        self.pdf_options = options;
        self
    }

    pub fn compress(mut self, enabled: bool) -> Self {
        self.pdf_options.compress = enabled;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.pdf_options.title = Some(title.into());
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<DeckPress, DeckError> {
        self.config.validate()?;
        let mut fonts = FontRegistry::new();
        for dir in &self.font_dirs {
            fonts.register_dir(dir);
        }
        for file in &self.font_files {
            if fonts.register_file(file).is_none() {
                log::warn!("{} is not a usable font file", file.display());
            }
        }
        if self.system_fonts {
            for family in DECK_FAMILIES {
                fonts.discover_system_family(family);
            }
        }
        let debug = match self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        Ok(DeckPress {
            config: self.config,
            fonts,
            pdf_options: self.pdf_options,
            debug,
        })
    }
}

impl DeckPress {
    pub fn builder() -> DeckPressBuilder {
        DeckPressBuilder::new()
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn fonts(&self) -> &FontRegistry {
        &self.fonts
    }

    fn composer(&self) -> Composer<'_> {
        Composer::new(&self.config, &self.fonts).with_debug(self.debug.as_ref())
    }

    fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = self.debug.as_ref() {
            logger.emit_summary(context);
            logger.flush();
        }
    }

    /// Loads the deck templates from `templates`, resolving images against
    /// `images`.
    pub fn load_deck(&self, templates: &Path, images: &Path) -> Result<CardDeck, DeckError> {
        let mut provider = ImageProvider::new(images);
        CardDeck::load(templates, &mut provider)
    }

    pub fn paginate(&self, deck: &CardDeck) -> PaginatedDeck {
        let composer = self.composer();
        Paginator::new(&composer).paginate(&deck.cards)
    }

    pub fn tile(&self, deck: &CardDeck) -> TiledDeck {
        let composer = self.composer();
        AtlasTiler::new(&composer).tile(&deck.cards)
    }

    pub fn render_pdf(&self, deck: &CardDeck) -> Result<Vec<u8>, DeckError> {
        let paginated = self.paginate(deck);
        let bytes = document_to_pdf(&paginated.document, &self.fonts, &self.pdf_options)?;
        log::info!(
            "rendered {} cards onto {} PDF page(s)",
            deck.len(),
            paginated.document.pages.len()
        );
        self.emit_debug_summary("render_pdf");
        Ok(bytes)
    }

    /// Writes the PDF only after the whole document rendered.
    pub fn render_pdf_to_file(&self, deck: &CardDeck, path: &Path) -> Result<(), DeckError> {
        let bytes = self.render_pdf(deck)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// One encoded PNG per atlas canvas.
    pub fn render_atlas_pages(&self, deck: &CardDeck) -> Result<Vec<Vec<u8>>, DeckError> {
        let tiled = self.tile(deck);
        let pages = document_to_png_pages(&tiled.document, &self.fonts, 1.0)?;
        self.emit_debug_summary("render_atlas");
        Ok(pages)
    }

    /// Writes `{stem}-NN.png` files into `dir` and returns their paths.
    pub fn render_atlas_to_dir(
        &self,
        deck: &CardDeck,
        dir: &Path,
        stem: &str,
    ) -> Result<Vec<PathBuf>, DeckError> {
        let pages = self.render_atlas_pages(deck)?;
        let mut written = Vec::with_capacity(pages.len());
        for (index, png) in pages.iter().enumerate() {
            let path = dir.join(atlas_file_name(stem, index));
            std::fs::write(&path, png)?;
            written.push(path);
        }
        Ok(written)
    }
}

pub fn atlas_file_name(stem: &str, index: usize) -> String {
    format!("{stem}-{index:02}.png")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press() -> DeckPress {
        DeckPress::builder().system_fonts(false).build().unwrap()
    }

    fn small_deck() -> CardDeck {
        let cards = (0..3)
            .map(|i| {
                CardRecord::builder()
                    .color(Palette::Keeper.color())
                    .title(format!("Karto {i}"))
                    .card_type("Tenaĵo")
                    .top_paragraph("Metu ĝin sur la tablon.")
                    .build()
            })
            .collect();
        CardDeck::new(cards)
    }

    #[test]
    fn builder_rejects_invalid_layout() {
        let config = LayoutConfig {
            card_width: Length::ZERO,
            ..LayoutConfig::default()
        };
        let err = DeckPress::builder().layout(config).system_fonts(false).build();
        assert!(matches!(err, Err(DeckError::InvalidConfiguration(_))));
    }

    #[test]
    fn atlas_files_are_numbered_from_zero() {
        assert_eq!(atlas_file_name("fluxx", 0), "fluxx-00.png");
        assert_eq!(atlas_file_name("fluxx", 12), "fluxx-12.png");
    }

    #[test]
    fn both_passes_place_every_card_in_order() {
        let press = press();
        let deck = small_deck();
        let paginated = press.paginate(&deck);
        let tiled = press.tile(&deck);
        assert_eq!(paginated.placements.len(), 3);
        assert_eq!(tiled.placements.len(), 3);
        for (page, tile) in paginated.placements.iter().zip(&tiled.placements) {
            assert_eq!(page.index, tile.index);
            assert_eq!(page.metrics.top_overflow, tile.metrics.top_overflow);
        }
    }

    #[test]
    fn pdf_pass_produces_a_pdf() {
        let bytes = press().render_pdf(&small_deck()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.7"));
        assert!(bytes.ends_with(b"%%EOF\n"));
    }

    #[test]
    fn atlas_pass_writes_numbered_pngs() {
        let dir = tempfile::tempdir().unwrap();
        let paths = press()
            .render_atlas_to_dir(&small_deck(), dir.path(), "fluxx")
            .unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("fluxx-00.png"));
        let atlas = image::open(&paths[0]).unwrap();
        assert_eq!((atlas.width(), atlas.height()), (4096, 4096));
    }

    #[test]
    fn debug_log_records_placements_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("debug.jsonl");
        let press = DeckPress::builder()
            .system_fonts(false)
            .debug_log(&log_path)
            .build()
            .unwrap();
        press.render_pdf(&small_deck()).unwrap();
        let log = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(log.matches("\"type\":\"card.placed\"").count(), 3);
        assert!(log.contains("\"type\":\"debug.summary\""));
        assert!(log.contains("\"context\":\"render_pdf\""));
    }
}
