use crate::error::DeckError;
use crate::font::FontSpec;
use crate::types::{Length, Rect, Size};

/// PostScript points per millimetre.
pub const POINTS_PER_MM: f32 = 2.8346457;

/// Fixed card and page geometry. Every length is in the working unit
/// (millimetres for the canonical deck); `points_per_unit` converts to PDF points.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    pub points_per_unit: f32,

    pub page_width: Length,
    pub page_height: Length,
    pub page_border: Length,

    pub card_width: Length,
    pub card_height: Length,
    pub card_gap: Length,
    pub corner_radius: Length,
    pub outline_width: Length,
    pub inset: Length,

    pub side_title_width: Length,
    pub side_title_offset: Length,
    pub highlight_width: Length,
    pub side_gap: Length,

    pub top_title_height: Length,
    pub top_title_gap: Length,

    pub rule_position: Length,
    pub rule_height: Length,
    pub rule_gap: Length,

    pub bottom_paragraph_gap: Length,
    pub bottom_image_gap: Length,

    pub atlas_width_px: u32,
    pub atlas_height_px: u32,
    pub atlas_columns: u32,
    pub atlas_rows: u32,

    /// Body text, size in points.
    pub paragraph_font: FontSpec,
    /// Large title above the rule, size in points.
    pub center_title_font: FontSpec,
    /// Vertical side label, size in working units.
    pub side_title_font: FontSpec,
    /// Card type band, size in working units.
    pub top_title_font: FontSpec,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let mm = Length::from_f32;
        let inset = 3.0;
        Self {
            points_per_unit: POINTS_PER_MM,
            page_width: mm(210.0),
            page_height: mm(297.0),
            page_border: mm(8.0),
            card_width: mm(56.0),
            card_height: mm(86.0),
            card_gap: mm(6.0),
            corner_radius: mm(4.0),
            outline_width: mm(0.5),
            inset: mm(inset),
            side_title_width: mm(8.0),
            side_title_offset: mm(9.0),
            highlight_width: mm(0.5),
            side_gap: mm(2.0),
            top_title_height: mm(9.0),
            top_title_gap: mm(1.0),
            rule_position: mm(inset + 37.0 + 5.0 + 2.0),
            rule_height: mm(1.0),
            rule_gap: mm(2.0),
            bottom_paragraph_gap: mm(2.0),
            bottom_image_gap: mm(2.0),
            atlas_width_px: 4096,
            atlas_height_px: 4096,
            atlas_columns: 10,
            atlas_rows: 7,
            paragraph_font: FontSpec::new("Serif", 6.5),
            center_title_font: FontSpec::new("Arial Black", 11.2),
            side_title_font: FontSpec::new("Sans", 5.8),
            top_title_font: FontSpec::new("Sans", 9.0),
        }
    }
}

impl LayoutConfig {
    pub fn card_size(&self) -> Size {
        Size {
            width: self.card_width,
            height: self.card_height,
        }
    }

    pub fn page_size_points(&self) -> Size {
        Size {
            width: self.page_width * self.points_per_unit,
            height: self.page_height * self.points_per_unit,
        }
    }

    /// Left edge of the text and image column, right of the side bar.
    pub fn content_x(&self) -> Length {
        self.inset + self.side_title_width + self.side_gap
    }

    pub fn content_width(&self) -> Length {
        self.card_width - self.content_x() - self.inset
    }

    pub fn side_bar(&self) -> Rect {
        Rect::new(
            self.inset,
            self.inset,
            self.side_title_width,
            self.card_height - self.inset * 2,
        )
    }

    pub fn cards_per_canvas(&self) -> usize {
        (self.atlas_columns as usize) * (self.atlas_rows as usize)
    }

    pub fn validate(&self) -> Result<(), DeckError> {
        let positive = [
            ("points_per_unit", self.points_per_unit > 0.0),
            ("page_width", self.page_width > Length::ZERO),
            ("page_height", self.page_height > Length::ZERO),
            ("card_width", self.card_width > Length::ZERO),
            ("card_height", self.card_height > Length::ZERO),
            ("content width", self.content_width() > Length::ZERO),
            ("atlas_width_px", self.atlas_width_px > 0),
            ("atlas_height_px", self.atlas_height_px > 0),
            ("atlas_columns", self.atlas_columns > 0),
            ("atlas_rows", self.atlas_rows > 0),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, ok)| !ok) {
            return Err(DeckError::InvalidConfiguration(format!(
                "{name} must be positive"
            )));
        }
        if self.page_border < Length::ZERO {
            return Err(DeckError::InvalidConfiguration(
                "page_border must not be negative".to_string(),
            ));
        }
        if self.page_border + self.card_width > self.page_width - self.page_border
            || self.page_border + self.card_height > self.page_height - self.page_border
        {
            return Err(DeckError::InvalidConfiguration(
                "a card does not fit inside the page border".to_string(),
            ));
        }
        if self.rule_position + self.rule_height > self.card_height - self.inset {
            return Err(DeckError::InvalidConfiguration(
                "rule_position lies below the card's bottom inset".to_string(),
            ));
        }
        Ok(())
    }
}
