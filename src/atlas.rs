use crate::canvas::{Canvas, Document, Page};
use crate::card::CardRecord;
use crate::compose::{CardMetrics, Composer};
use crate::debug::Field;
use crate::geometry::LayoutConfig;
use crate::types::{Color, Length, Size};

/// A card's cell on one of the atlas canvases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePlacement {
    pub index: usize,
    pub canvas: usize,
    pub cell: usize,
    pub metrics: CardMetrics,
}

#[derive(Debug, Clone)]
pub struct TiledDeck {
    /// One page per atlas canvas, sized in pixels.
    pub document: Document,
    pub placements: Vec<TilePlacement>,
}

/// Scale and centering offsets that fit one card into one grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellFit {
    pub cell_width: f32,
    pub cell_height: f32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl CellFit {
    pub fn new(config: &LayoutConfig) -> Self {
        let cell_width = config.atlas_width_px as f32 / config.atlas_columns as f32;
        let cell_height = config.atlas_height_px as f32 / config.atlas_rows as f32;
        let card_w = config.card_width.to_f32();
        let card_h = config.card_height.to_f32();
        let scale = if card_w / card_h > cell_width / cell_height {
            cell_width / card_w
        } else {
            cell_height / card_h
        };
        Self {
            cell_width,
            cell_height,
            scale,
            offset_x: cell_width / 2.0 - card_w * scale / 2.0,
            offset_y: cell_height / 2.0 - card_h * scale / 2.0,
        }
    }
}

/// Hands out grid cells in row-major order, starting a new canvas every
/// `columns * rows` cards.
#[derive(Debug, Clone)]
pub struct TileCursor {
    columns: usize,
    per_canvas: usize,
    next: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub canvas: usize,
    pub cell: usize,
    pub column: usize,
    pub row: usize,
}

impl TileCursor {
    pub fn new(config: &LayoutConfig) -> Self {
        Self {
            columns: (config.atlas_columns as usize).max(1),
            per_canvas: config.cards_per_canvas().max(1),
            next: 0,
        }
    }

    pub fn next_tile(&mut self) -> Tile {
        let index = self.next;
        self.next += 1;
        let cell = index % self.per_canvas;
        Tile {
            canvas: index / self.per_canvas,
            cell,
            column: cell % self.columns,
            row: cell / self.columns,
        }
    }
}

pub fn canvas_count(card_count: usize, config: &LayoutConfig) -> usize {
    card_count.div_ceil(config.cards_per_canvas().max(1))
}

/// Renders the deck into fixed-size sprite canvases at one unit per pixel.
pub struct AtlasTiler<'a> {
    composer: &'a Composer<'a>,
}

impl<'a> AtlasTiler<'a> {
    pub fn new(composer: &'a Composer<'a>) -> Self {
        Self { composer }
    }

    pub fn tile(&self, cards: &[CardRecord]) -> TiledDeck {
        let config = self.composer.config();
        let page_size = Size::new(config.atlas_width_px as f32, config.atlas_height_px as f32);
        let fit = CellFit::new(config);
        let mut cursor = TileCursor::new(config);
        let mut canvas = Canvas::new(page_size);
        let mut placements = Vec::with_capacity(cards.len());

        for (index, card) in cards.iter().enumerate() {
            let tile = cursor.next_tile();
            if tile.cell == 0 {
                if index > 0 {
                    canvas.show_page();
                }
                canvas.save_state();
                canvas.set_fill_color(Color::WHITE);
                canvas.draw_rect(Length::ZERO, Length::ZERO, page_size.width, page_size.height);
                canvas.restore_state();
            }

            let x = tile.column as f32 * fit.cell_width + fit.offset_x;
            let y = tile.row as f32 * fit.cell_height + fit.offset_y;
            canvas.save_state();
            canvas.translate(Length::from_f32(x), Length::from_f32(y));
            canvas.scale(fit.scale, fit.scale);
            let metrics = self.composer.render_card(&mut canvas, fit.scale, card);
            canvas.restore_state();

            if let Some(debug) = self.composer.debug() {
                debug.event(
                    "card.placed",
                    &[
                        ("pass", Field::Str("atlas")),
                        ("index", Field::Int(index as i64)),
                        ("page", Field::Int(tile.canvas as i64)),
                        ("x", Field::Num(x as f64)),
                        ("y", Field::Num(y as f64)),
                    ],
                );
            }
            placements.push(TilePlacement {
                index,
                canvas: tile.canvas,
                cell: tile.cell,
                metrics,
            });
        }

        let document = if cards.is_empty() {
            Document {
                page_size,
                pages: Vec::<Page>::new(),
            }
        } else {
            canvas.finish()
        };
        log::info!(
            "tiled {} cards onto {} atlas canvas(es)",
            cards.len(),
            document.pages.len()
        );
        TiledDeck {
            document,
            placements,
        }
    }
}
