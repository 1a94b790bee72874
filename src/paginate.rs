use crate::canvas::{Canvas, Document};
use crate::card::CardRecord;
use crate::compose::{CardMetrics, Composer};
use crate::debug::Field;
use crate::geometry::LayoutConfig;
use crate::types::Length;

/// Where one card landed on the printable pages, in working units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardPlacement {
    pub index: usize,
    pub page: usize,
    pub x: Length,
    pub y: Length,
    pub metrics: CardMetrics,
}

#[derive(Debug, Clone)]
pub struct PaginatedDeck {
    pub document: Document,
    pub placements: Vec<CardPlacement>,
}

/// One slot handed out by [`PageCursor::next_slot`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub page: usize,
    pub x: Length,
    pub y: Length,
    /// A page must be emitted before drawing into this slot.
    pub starts_page: bool,
}

/// Row-major card grid walker. Breaks are deferred until the next card is
/// placed so the last page is never blank.
#[derive(Debug, Clone)]
pub struct PageCursor {
    border: Length,
    limit_x: Length,
    limit_y: Length,
    step_x: Length,
    step_y: Length,
    card_width: Length,
    card_height: Length,
    card_x: Length,
    card_y: Length,
    page: usize,
    page_break_pending: bool,
}

impl PageCursor {
    pub fn new(config: &LayoutConfig) -> Self {
        Self {
            border: config.page_border,
            limit_x: config.page_width - config.page_border,
            limit_y: config.page_height - config.page_border,
            step_x: config.card_width + config.card_gap,
            step_y: config.card_height + config.card_gap,
            card_width: config.card_width,
            card_height: config.card_height,
            card_x: config.page_border,
            card_y: config.page_border,
            page: 0,
            page_break_pending: false,
        }
    }

    pub fn next_slot(&mut self) -> Slot {
        let starts_page = self.page_break_pending;
        if starts_page {
            self.page += 1;
            self.page_break_pending = false;
        }
        let slot = Slot {
            page: self.page,
            x: self.card_x,
            y: self.card_y,
            starts_page,
        };
        self.advance();
        slot
    }

    fn advance(&mut self) {
        self.card_x += self.step_x;
        if self.card_x + self.card_width > self.limit_x {
            self.card_x = self.border;
            self.card_y += self.step_y;
            if self.card_y + self.card_height > self.limit_y {
                self.page_break_pending = true;
                self.card_y = self.border;
            }
        }
    }
}

/// Lays cards out on printable pages sized in points.
pub struct Paginator<'a> {
    composer: &'a Composer<'a>,
}

impl<'a> Paginator<'a> {
    pub fn new(composer: &'a Composer<'a>) -> Self {
        Self { composer }
    }

    pub fn paginate(&self, cards: &[CardRecord]) -> PaginatedDeck {
        let config = self.composer.config();
        let ppu = config.points_per_unit;
        let mut canvas = Canvas::new(config.page_size_points());
        let mut cursor = PageCursor::new(config);
        let mut placements = Vec::with_capacity(cards.len());

        for (index, card) in cards.iter().enumerate() {
            let slot = cursor.next_slot();
            if slot.starts_page {
                canvas.show_page();
            }
            canvas.save_state();
            canvas.scale(ppu, ppu);
            canvas.translate(slot.x, slot.y);
            let metrics = self.composer.render_card(&mut canvas, ppu, card);
            canvas.restore_state();

            log::debug!(
                "card {} placed on page {} at ({:.1}, {:.1})",
                index,
                slot.page,
                slot.x.to_f32(),
                slot.y.to_f32()
            );
            if let Some(debug) = self.composer.debug() {
                debug.event(
                    "card.placed",
                    &[
                        ("pass", Field::Str("pdf")),
                        ("index", Field::Int(index as i64)),
                        ("page", Field::Int(slot.page as i64)),
                        ("x", Field::Num(slot.x.to_f32() as f64)),
                        ("y", Field::Num(slot.y.to_f32() as f64)),
                    ],
                );
            }
            placements.push(CardPlacement {
                index,
                page: slot.page,
                x: slot.x,
                y: slot.y,
                metrics,
            });
        }

        PaginatedDeck {
            document: canvas.finish(),
            placements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::font::FontRegistry;

    fn deck(count: usize) -> Vec<CardRecord> {
        (0..count)
            .map(|i| CardRecord::builder().title(format!("Karto {i}")).build())
            .collect()
    }

    fn paginate(count: usize) -> PaginatedDeck {
        let config = LayoutConfig::default();
        let fonts = FontRegistry::new();
        let composer = Composer::new(&config, &fonts);
        Paginator::new(&composer).paginate(&deck(count))
    }

    #[test]
    fn a4_page_holds_three_by_three() {
        let config = LayoutConfig::default();
        let mut cursor = PageCursor::new(&config);
        let slots: Vec<Slot> = (0..10).map(|_| cursor.next_slot()).collect();
        let mm = Length::from_f32;
        assert_eq!((slots[0].x, slots[0].y), (mm(8.0), mm(8.0)));
        assert_eq!((slots[1].x, slots[1].y), (mm(70.0), mm(8.0)));
        assert_eq!((slots[2].x, slots[2].y), (mm(132.0), mm(8.0)));
        assert_eq!((slots[3].x, slots[3].y), (mm(8.0), mm(100.0)));
        assert_eq!((slots[8].x, slots[8].y), (mm(132.0), mm(192.0)));
        assert!(slots[..9].iter().all(|s| s.page == 0 && !s.starts_page));
        assert_eq!(slots[9].page, 1);
        assert!(slots[9].starts_page);
        assert_eq!((slots[9].x, slots[9].y), (mm(8.0), mm(8.0)));
    }

    #[test]
    fn slots_stay_inside_the_border() {
        let config = LayoutConfig::default();
        let mut cursor = PageCursor::new(&config);
        for _ in 0..50 {
            let slot = cursor.next_slot();
            assert!(slot.x >= config.page_border);
            assert!(slot.y >= config.page_border);
            assert!(slot.x + config.card_width <= config.page_width - config.page_border);
            assert!(slot.y + config.card_height <= config.page_height - config.page_border);
        }
    }

    #[test]
    fn full_page_does_not_leave_a_blank_trailer() {
        let nine = paginate(9);
        assert_eq!(nine.document.pages.len(), 1);
        let ten = paginate(10);
        assert_eq!(ten.document.pages.len(), 2);
        assert_eq!(ten.placements[9].page, 1);
    }

    #[test]
    fn empty_deck_is_one_blank_page() {
        let empty = paginate(0);
        assert_eq!(empty.document.pages.len(), 1);
        assert!(empty.document.pages[0].commands.is_empty());
        assert!(empty.placements.is_empty());
    }

    #[test]
    fn cards_are_drawn_in_millimetres_on_a_point_page() {
        let result = paginate(1);
        let commands = &result.document.pages[0].commands;
        assert_eq!(commands[0], Command::SaveState);
        assert_eq!(commands[1], Command::Scale(2.8346457, 2.8346457));
        assert_eq!(
            commands[2],
            Command::Translate(Length::from_f32(8.0), Length::from_f32(8.0))
        );
        assert_eq!(*commands.last().unwrap(), Command::RestoreState);
    }
}
