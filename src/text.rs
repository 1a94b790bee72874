use crate::canvas::Canvas;
use crate::font::{FontRegistry, FontSpec};
use crate::types::Length;

/// Which edge of the text block the placement point refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anchor {
    #[default]
    Top,
    Bottom,
}

/// A block of wrapped text waiting to be placed on a card.
#[derive(Debug, Clone, Copy)]
pub struct Paragraph<'a> {
    pub text: &'a str,
    /// Size is in points.
    pub font: &'a FontSpec,
    /// Wrap width in the card's working unit.
    pub wrap_width: Length,
    pub anchor: Anchor,
}

impl<'a> Paragraph<'a> {
    pub fn new(text: &'a str, font: &'a FontSpec, wrap_width: Length) -> Self {
        Self {
            text,
            font,
            wrap_width,
            anchor: Anchor::Top,
        }
    }

    pub fn anchored(mut self, anchor: Anchor) -> Self {
        self.anchor = anchor;
        self
    }
}

/// Lines broken at a device size, with the metrics needed to stack them.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    pub lines: Vec<String>,
    pub ascent: Length,
    pub line_height: Length,
}

impl TextLayout {
    pub fn height(&self) -> Length {
        self.line_height * self.lines.len() as i32
    }
}

pub fn layout_text(
    fonts: &FontRegistry,
    family: &str,
    size: Length,
    text: &str,
    wrap_width: Length,
) -> TextLayout {
    let metrics = fonts.vertical_metrics(family, size);
    let measure = |s: &str| fonts.measure_text_width(family, size, s);
    let mut lines = Vec::new();
    if !text.is_empty() {
        for hard_line in text.split('\n') {
            wrap_line(hard_line, wrap_width, &measure, &mut lines);
        }
    }
    TextLayout {
        lines,
        ascent: metrics.ascent,
        line_height: metrics.line_height(),
    }
}

fn wrap_line(
    source: &str,
    wrap_width: Length,
    measure: &dyn Fn(&str) -> Length,
    out: &mut Vec<String>,
) {
    let mut current = String::new();
    let mut produced = false;
    for word in source.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if measure(&candidate) <= wrap_width {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            out.push(std::mem::take(&mut current));
            produced = true;
        }
        if measure(word) <= wrap_width {
            current = word.to_string();
        } else {
            for piece in break_word(word, wrap_width, measure) {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                    produced = true;
                }
                current = piece;
            }
        }
    }
    if !current.is_empty() || !produced {
        out.push(current);
    }
}

// Splits a word that cannot fit on a line of its own. Each piece keeps at
// least one character so a very narrow wrap width still terminates.
fn break_word(word: &str, wrap_width: Length, measure: &dyn Fn(&str) -> Length) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for ch in word.chars() {
        let mut candidate = current.clone();
        candidate.push(ch);
        if !current.is_empty() && measure(&candidate) > wrap_width {
            pieces.push(std::mem::take(&mut current));
            current.push(ch);
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Draws `paragraph` at (x, y) in the canvas's working unit and returns the
/// rendered height in that unit.
///
/// Glyph metrics and line breaks are computed at the device size
/// (`size_pt * unit_scale / points_per_unit`) so both output passes wrap text
/// the way it will actually be rasterized or printed.
pub fn measure_and_draw(
    canvas: &mut Canvas,
    fonts: &FontRegistry,
    x: Length,
    y: Length,
    paragraph: &Paragraph<'_>,
    unit_scale: f32,
    points_per_unit: f32,
) -> Length {
    if unit_scale <= 0.0 || points_per_unit <= 0.0 {
        return Length::ZERO;
    }
    let device_size = Length::from_f32(paragraph.font.size * unit_scale / points_per_unit);
    let device_wrap = paragraph.wrap_width * unit_scale;
    let layout = layout_text(
        fonts,
        &paragraph.font.family,
        device_size,
        paragraph.text,
        device_wrap,
    );
    let height = layout.height();
    if layout.lines.is_empty() {
        return Length::ZERO;
    }

    let top = match paragraph.anchor {
        Anchor::Top => Length::ZERO,
        Anchor::Bottom => -height,
    };
    canvas.save_state();
    canvas.translate(x, y);
    canvas.scale(1.0 / unit_scale, 1.0 / unit_scale);
    canvas.set_font_name(&paragraph.font.family);
    canvas.set_font_size(device_size);
    for (index, line) in layout.lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let baseline = top + layout.ascent + layout.line_height * index as i32;
        canvas.draw_string(Length::ZERO, baseline, line.as_str());
    }
    canvas.restore_state();

    height / unit_scale
}
