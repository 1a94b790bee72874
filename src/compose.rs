use crate::canvas::Canvas;
use crate::card::CardRecord;
use crate::debug::{DebugLogger, Field};
use crate::font::FontRegistry;
use crate::geometry::LayoutConfig;
use crate::text::{Anchor, Paragraph, measure_and_draw};
use crate::types::{Color, Length, Rect};
use std::f32::consts::{FRAC_PI_2, PI, TAU};

/// Where the layout cursors ended up after composing one card.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardMetrics {
    /// Cursor below the top title and top image.
    pub top_cursor: Length,
    /// Cursor below the bottom paragraph, where the bottom images start.
    pub bottom_cursor: Length,
    /// Shrink factor applied to the top title; 1 when it fit.
    pub top_title_scale: f32,
    /// The top paragraph runs into the center title or past the rule.
    pub top_overflow: bool,
}

/// Renders card faces. The canvas origin is the card's top-left corner and
/// coordinates are in the layout's working unit.
pub struct Composer<'a> {
    config: &'a LayoutConfig,
    fonts: &'a FontRegistry,
    debug: Option<&'a DebugLogger>,
}

impl<'a> Composer<'a> {
    pub fn new(config: &'a LayoutConfig, fonts: &'a FontRegistry) -> Self {
        Self {
            config,
            fonts,
            debug: None,
        }
    }

    pub fn with_debug(mut self, debug: Option<&'a DebugLogger>) -> Self {
        self.debug = debug;
        self
    }

    pub fn config(&self) -> &LayoutConfig {
        self.config
    }

    pub(crate) fn debug(&self) -> Option<&'a DebugLogger> {
        self.debug
    }

    /// Strokes the rounded card border.
    pub fn render_outline(&self, canvas: &mut Canvas) {
        let cfg = self.config;
        let r = cfg.corner_radius;
        let (w, h) = (cfg.card_width, cfg.card_height);

        canvas.save_state();
        canvas.set_stroke_color(Color::BLACK);
        canvas.set_line_width(cfg.outline_width);
        canvas.new_sub_path();
        canvas.arc(r, r, r, PI, PI + FRAC_PI_2);
        canvas.line_to(w - r, Length::ZERO);
        canvas.arc(w - r, r, r, PI + FRAC_PI_2, TAU);
        canvas.line_to(w, h - r);
        canvas.arc(w - r, h - r, r, 0.0, FRAC_PI_2);
        canvas.line_to(r, h);
        canvas.arc(r, h - r, r, FRAC_PI_2, PI);
        canvas.close_path();
        canvas.stroke();
        canvas.restore_state();
    }

    /// Draws the outline and every present field of `record`.
    /// `unit_scale` is device units (points or pixels) per working unit.
    pub fn render_card(&self, canvas: &mut Canvas, unit_scale: f32, record: &CardRecord) -> CardMetrics {
        let cfg = self.config;
        let content_x = cfg.content_x();
        let content_width = cfg.content_width();
        let side_bar = cfg.side_bar();

        self.render_outline(canvas);

        canvas.save_state();
        canvas.set_fill_color(Color::BLACK);

        if let Some(color) = record.color() {
            canvas.save_state();
            canvas.set_fill_color(color);
            canvas.draw_rect(side_bar.x, side_bar.y, side_bar.width, side_bar.height);
            canvas.restore_state();
        }

        if let Some(title) = record.title() {
            self.render_side_title(canvas, title);
        }

        if let Some(highlight) = record.side_highlight() {
            let stripe = cfg.highlight_width;
            canvas.save_state();
            canvas.set_fill_color(highlight);
            canvas.draw_rect(side_bar.x, side_bar.y, stripe, side_bar.height);
            canvas.draw_rect(side_bar.right() - stripe, side_bar.y, stripe, side_bar.height);
            canvas.restore_state();
        }

        if let Some(icon) = record.icon() {
            icon.fit(
                canvas,
                Rect::new(side_bar.x, side_bar.y, side_bar.width, side_bar.width),
            );
        }

        let mut y = cfg.inset;
        let mut top_title_scale = 1.0;

        if let Some(card_type) = record.card_type() {
            top_title_scale = self.render_top_title(canvas, content_x, y, card_type);
            y += cfg.top_title_height * top_title_scale + cfg.top_title_gap;
        }

        if let Some(image) = record.top_image() {
            let size = image.intrinsic_size();
            if size.width > Length::ZERO {
                let height = size.height * (content_width.to_f32() / size.width.to_f32());
                image.fit(canvas, Rect::new(content_x, y, content_width, height));
                y += height + cfg.top_title_gap;
            }
        }
        let top_cursor = y;

        let top_paragraph_end = record.top_paragraph().map(|text| {
            let paragraph = Paragraph::new(text, &cfg.paragraph_font, content_width);
            y + measure_and_draw(canvas, self.fonts, content_x, y, &paragraph, unit_scale, cfg.points_per_unit)
        });

        let mut center_title_top = cfg.rule_position;
        if let Some(title) = record.title() {
            let paragraph = Paragraph::new(title, &cfg.center_title_font, content_width)
                .anchored(Anchor::Bottom);
            let height = measure_and_draw(
                canvas,
                self.fonts,
                content_x,
                cfg.rule_position,
                &paragraph,
                unit_scale,
                cfg.points_per_unit,
            );
            center_title_top -= height;
        }

        let top_overflow = top_paragraph_end.is_some_and(|end| end > center_title_top);
        if top_overflow {
            self.report_overflow(record, top_paragraph_end.unwrap_or(y), center_title_top);
        }

        canvas.draw_rect(content_x, cfg.rule_position, content_width, cfg.rule_height);
        y = cfg.rule_position + cfg.rule_height + cfg.rule_gap;

        if let Some(text) = record.bottom_paragraph() {
            let paragraph = Paragraph::new(text, &cfg.paragraph_font, content_width);
            y += measure_and_draw(canvas, self.fonts, content_x, y, &paragraph, unit_scale, cfg.points_per_unit);
            y += cfg.bottom_paragraph_gap;
        }

        if let Some(images) = record.bottom_images() {
            let boxes = column_boxes(
                content_x,
                y,
                content_width,
                cfg.card_height - cfg.inset - y,
                images.len(),
                cfg.bottom_image_gap,
            );
            for (image, rect) in images.iter().zip(boxes) {
                image.fit(canvas, rect);
            }
        }

        canvas.restore_state();

        CardMetrics {
            top_cursor,
            bottom_cursor: y,
            top_title_scale,
            top_overflow,
        }
    }

    // Uppercased label running bottom-to-top, centered across the side bar.
    fn render_side_title(&self, canvas: &mut Canvas, title: &str) {
        let cfg = self.config;
        let font = &cfg.side_title_font;
        let size = Length::from_f32(font.size);
        let label = title.to_uppercase();
        let metrics = self.fonts.vertical_metrics(&font.family, size);
        let width = self.fonts.measure_text_width(&font.family, size, &label);

        let x = cfg.inset + cfg.side_title_width / 2 - metrics.line_height() / 2 + metrics.ascent;
        let y = cfg.inset + cfg.side_title_offset + width;
        canvas.save_state();
        canvas.translate(x, y);
        canvas.rotate(-FRAC_PI_2);
        canvas.set_font_name(&font.family);
        canvas.set_font_size(size);
        canvas.draw_string(Length::ZERO, Length::ZERO, label);
        canvas.restore_state();
    }

    // Returns the shrink factor applied so the title fits the content width.
    fn render_top_title(&self, canvas: &mut Canvas, x: Length, y: Length, card_type: &str) -> f32 {
        let cfg = self.config;
        let font = &cfg.top_title_font;
        let size = Length::from_f32(font.size);
        let label = card_type.to_uppercase();
        let width = self.fonts.measure_text_width(&font.family, size, &label);
        let max_width = cfg.content_width();
        let scale = top_title_scale(width, max_width);

        let metrics = self.fonts.vertical_metrics(&font.family, size);
        let baseline = cfg.top_title_height / 2 - metrics.line_height() / 2 + metrics.ascent;
        canvas.save_state();
        canvas.translate(x, y);
        canvas.scale(scale, scale);
        canvas.set_font_name(&font.family);
        canvas.set_font_size(size);
        canvas.draw_string(Length::ZERO, baseline, label);
        canvas.restore_state();
        scale
    }

    fn report_overflow(&self, record: &CardRecord, paragraph_end: Length, limit: Length) {
        let title = record.title().unwrap_or("");
        log::warn!(
            "top paragraph of card \"{}\" ends at {:.2} but the center title starts at {:.2}",
            title,
            paragraph_end.to_f32(),
            limit.to_f32()
        );
        if let Some(debug) = self.debug {
            debug.event(
                "layout.overflow",
                &[
                    ("title", Field::Str(title)),
                    ("paragraph_end", Field::Num(paragraph_end.to_f32() as f64)),
                    ("limit", Field::Num(limit.to_f32() as f64)),
                ],
            );
        }
    }
}

pub(crate) fn top_title_scale(width: Length, max_width: Length) -> f32 {
    if width > max_width && width > Length::ZERO {
        max_width.to_f32() / width.to_f32()
    } else {
        1.0
    }
}

/// Splits a region into `count` equal-width columns separated by `gap`.
pub fn column_boxes(
    x: Length,
    y: Length,
    width: Length,
    height: Length,
    count: usize,
    gap: Length,
) -> Vec<Rect> {
    if count == 0 {
        return Vec::new();
    }
    let n = count as i32;
    let column = (width - gap * (n - 1)) / n;
    (0..n)
        .map(|index| Rect::new(x + (column + gap) * index, y, column, height))
        .collect()
}
