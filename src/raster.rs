use crate::canvas::{Command, Document, Page};
use crate::drawable::load_image_source;
use crate::error::DeckError;
use crate::font::{FontRegistry, detect_direction};
use crate::types::{Color, Length, Size};
use rustybuzz::{Face as HbFace, UnicodeBuffer};
use std::collections::{HashMap, HashSet};
use tiny_skia::{
    FillRule, FilterQuality, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap, PixmapPaint,
    Rect, Stroke, StrokeDash, Transform,
};
use ttf_parser::{GlyphId, OutlineBuilder};

#[derive(Clone)]
struct RasterState {
    transform: Transform,
    fill_color: Color,
    stroke_color: Color,
    line_width: Length,
    line_cap: u8,
    line_join: u8,
    miter_limit: Length,
    dash_pattern: Vec<Length>,
    dash_phase: Length,
    fill_opacity: f32,
    stroke_opacity: f32,
    font_name: String,
    font_size: Length,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            transform: Transform::identity(),
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Length::from_f32(1.0),
            line_cap: 0,
            line_join: 0,
            miter_limit: Length::from_f32(4.0),
            dash_pattern: Vec::new(),
            dash_phase: Length::ZERO,
            fill_opacity: 1.0,
            stroke_opacity: 1.0,
            font_name: "Helvetica".to_string(),
            font_size: Length::from_f32(12.0),
        }
    }
}

/// Renders every page to a PNG. `px_per_unit` maps the document's unit onto
/// pixels; atlas documents are already in pixels and use 1.
pub fn document_to_png_pages(
    document: &Document,
    fonts: &FontRegistry,
    px_per_unit: f32,
) -> Result<Vec<Vec<u8>>, DeckError> {
    let mut renderer = Renderer::new(fonts, px_per_unit);
    let mut pngs = Vec::with_capacity(document.pages.len());
    for page in &document.pages {
        let pixmap = renderer.render_page(page, document.page_size)?;
        let png = pixmap
            .encode_png()
            .map_err(|e| DeckError::Asset(format!("png encode failed: {e}")))?;
        pngs.push(png);
    }
    Ok(pngs)
}

/// Rasterizes pages that share one image and font cache.
pub struct Renderer<'a> {
    fonts: &'a FontRegistry,
    px_per_unit: f32,
    images: HashMap<String, Pixmap>,
    missing_fonts: HashSet<String>,
}

impl<'a> Renderer<'a> {
    pub fn new(fonts: &'a FontRegistry, px_per_unit: f32) -> Self {
        Self {
            fonts,
            px_per_unit,
            images: HashMap::new(),
            missing_fonts: HashSet::new(),
        }
    }

    pub fn render_page(&mut self, page: &Page, page_size: Size) -> Result<Pixmap, DeckError> {
        let width = to_pixels(page_size.width, self.px_per_unit)?;
        let height = to_pixels(page_size.height, self.px_per_unit)?;
        let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
            DeckError::InvalidConfiguration(format!("invalid raster size {width}x{height}"))
        })?;
        pixmap.fill(tiny_skia::Color::WHITE);

        let base = Transform::from_scale(self.px_per_unit, self.px_per_unit);
        let mut state = RasterState {
            transform: base,
            ..RasterState::default()
        };
        let mut stack: Vec<RasterState> = Vec::new();
        let mut path = PathBuilder::new();
        let mut has_path = false;

        for command in &page.commands {
            match command {
                Command::SaveState => stack.push(state.clone()),
                Command::RestoreState => {
                    if let Some(restored) = stack.pop() {
                        state = restored;
                    }
                }
                Command::Translate(x, y) => {
                    state.transform = state.transform.pre_translate(x.to_f32(), y.to_f32());
                }
                Command::Scale(x, y) => {
                    state.transform = state.transform.pre_scale(*x, *y);
                }
                Command::Rotate(angle) => {
                    let degrees = angle.to_degrees();
                    state.transform = state.transform.pre_concat(Transform::from_rotate(degrees));
                }
                Command::SetFillColor(color) => state.fill_color = *color,
                Command::SetStrokeColor(color) => state.stroke_color = *color,
                Command::SetLineWidth(width) => state.line_width = width.max(Length::ZERO),
                Command::SetLineCap(cap) => state.line_cap = *cap,
                Command::SetLineJoin(join) => state.line_join = *join,
                Command::SetMiterLimit(limit) => state.miter_limit = limit.max(Length::ZERO),
                Command::SetDash { pattern, phase } => {
                    state.dash_pattern = pattern.clone();
                    state.dash_phase = *phase;
                }
                Command::SetOpacity { fill, stroke } => {
                    state.fill_opacity = fill.clamp(0.0, 1.0);
                    state.stroke_opacity = stroke.clamp(0.0, 1.0);
                }
                Command::SetFontName(name) => state.font_name = name.clone(),
                Command::SetFontSize(size) => state.font_size = *size,
                Command::MoveTo { x, y } => {
                    path.move_to(x.to_f32(), y.to_f32());
                    has_path = true;
                }
                Command::LineTo { x, y } => {
                    path.line_to(x.to_f32(), y.to_f32());
                    has_path = true;
                }
                Command::CurveTo {
                    x1,
                    y1,
                    x2,
                    y2,
                    x,
                    y,
                } => {
                    path.cubic_to(
                        x1.to_f32(),
                        y1.to_f32(),
                        x2.to_f32(),
                        y2.to_f32(),
                        x.to_f32(),
                        y.to_f32(),
                    );
                    has_path = true;
                }
                Command::ClosePath => {
                    if has_path {
                        path.close();
                    }
                }
                Command::Fill | Command::FillEvenOdd => {
                    if let Some(shape) = take_path(&mut path, &mut has_path) {
                        fill_shape(&mut pixmap, &state, &shape, fill_rule(command));
                    }
                }
                Command::Stroke => {
                    if let Some(shape) = take_path(&mut path, &mut has_path) {
                        stroke_shape(&mut pixmap, &state, &shape);
                    }
                }
                Command::FillStroke | Command::FillStrokeEvenOdd => {
                    if let Some(shape) = take_path(&mut path, &mut has_path) {
                        fill_shape(&mut pixmap, &state, &shape, fill_rule(command));
                        stroke_shape(&mut pixmap, &state, &shape);
                    }
                }
                Command::DrawString { x, y, text } => {
                    self.draw_string(&mut pixmap, &state, x.to_f32(), y.to_f32(), text);
                }
                Command::DrawRect {
                    x,
                    y,
                    width,
                    height,
                } => {
                    if let Some(rect) =
                        Rect::from_xywh(x.to_f32(), y.to_f32(), width.to_f32(), height.to_f32())
                    {
                        let shape = PathBuilder::from_rect(rect);
                        fill_shape(&mut pixmap, &state, &shape, FillRule::Winding);
                    }
                }
                Command::DrawImage {
                    x,
                    y,
                    width,
                    height,
                    resource_id,
                } => {
                    let image = self.image(resource_id)?;
                    let (src_w, src_h) = (image.width() as f32, image.height() as f32);
                    if src_w > 0.0 && src_h > 0.0 {
                        let placement = Transform::from_row(
                            width.to_f32() / src_w,
                            0.0,
                            0.0,
                            height.to_f32() / src_h,
                            x.to_f32(),
                            y.to_f32(),
                        );
                        let paint = PixmapPaint {
                            quality: FilterQuality::Bilinear,
                            opacity: state.fill_opacity,
                            ..PixmapPaint::default()
                        };
                        pixmap.draw_pixmap(
                            0,
                            0,
                            image.as_ref(),
                            &paint,
                            state.transform.pre_concat(placement),
                            None,
                        );
                    }
                }
            }
        }
        Ok(pixmap)
    }

    fn image(&mut self, source: &str) -> Result<&Pixmap, DeckError> {
        if !self.images.contains_key(source) {
            let bytes = load_image_source(source)?;
            let pixmap = decode_image_to_pixmap(&bytes)
                .ok_or_else(|| DeckError::Asset(format!("cannot decode image {source}")))?;
            self.images.insert(source.to_string(), pixmap);
        }
        self.images
            .get(source)
            .ok_or_else(|| DeckError::unresolved("image", source))
    }

    // Only registered faces are drawn, so the pixels match the widths the
    // layout measured.
    fn draw_string(&mut self, pixmap: &mut Pixmap, state: &RasterState, x: f32, y: f32, text: &str) {
        if text.is_empty() || state.font_size <= Length::ZERO {
            return;
        }
        let fonts = self.fonts;
        match fonts.resolve(&state.font_name) {
            Some(font) => draw_glyphs(pixmap, state, &font.data, x, y, text),
            None => {
                if self.missing_fonts.insert(state.font_name.clone()) {
                    log::warn!(
                        "no registered font for \"{}\"; text in that family is not rasterized",
                        state.font_name
                    );
                }
            }
        }
    }
}

fn draw_glyphs(pixmap: &mut Pixmap, state: &RasterState, data: &[u8], x: f32, y: f32, text: &str) {
    let Ok(face) = ttf_parser::Face::parse(data, 0) else {
        return;
    };
    let paint = solid_paint(state.fill_color, state.fill_opacity);
    for glyph in layout_glyphs(data, text, state.font_size.to_f32(), x, y) {
        let mut builder = GlyphPathBuilder::new(glyph.origin_x, glyph.origin_y, glyph.scale);
        if face.outline_glyph(GlyphId(glyph.glyph_id), &mut builder).is_none() {
            continue;
        }
        if let Some(outline) = builder.finish() {
            pixmap.fill_path(&outline, &paint, FillRule::Winding, state.transform, None);
        }
    }
}

fn fill_rule(command: &Command) -> FillRule {
    match command {
        Command::FillEvenOdd | Command::FillStrokeEvenOdd => FillRule::EvenOdd,
        _ => FillRule::Winding,
    }
}

fn fill_shape(pixmap: &mut Pixmap, state: &RasterState, shape: &Path, rule: FillRule) {
    let paint = solid_paint(state.fill_color, state.fill_opacity);
    pixmap.fill_path(shape, &paint, rule, state.transform, None);
}

fn stroke_shape(pixmap: &mut Pixmap, state: &RasterState, shape: &Path) {
    let paint = solid_paint(state.stroke_color, state.stroke_opacity);
    pixmap.stroke_path(shape, &paint, &build_stroke(state), state.transform, None);
}

fn take_path(path: &mut PathBuilder, has_path: &mut bool) -> Option<Path> {
    if !*has_path {
        return None;
    }
    *has_path = false;
    std::mem::replace(path, PathBuilder::new()).finish()
}

fn build_stroke(state: &RasterState) -> Stroke {
    let mut stroke = Stroke {
        width: state.line_width.to_f32(),
        miter_limit: state.miter_limit.to_f32(),
        line_cap: match state.line_cap {
            1 => LineCap::Round,
            2 => LineCap::Square,
            _ => LineCap::Butt,
        },
        line_join: match state.line_join {
            1 => LineJoin::Round,
            2 => LineJoin::Bevel,
            _ => LineJoin::Miter,
        },
        ..Stroke::default()
    };
    if !state.dash_pattern.is_empty() {
        let mut pattern: Vec<f32> = state
            .dash_pattern
            .iter()
            .map(|p| p.abs().to_f32())
            .collect();
        if pattern.len() % 2 == 1 {
            pattern.extend(pattern.clone());
        }
        stroke.dash = StrokeDash::new(pattern, state.dash_phase.to_f32());
    }
    stroke
}

fn solid_paint(color: Color, opacity: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(to_sk_color(color, opacity));
    paint.anti_alias = true;
    paint
}

fn to_sk_color(color: Color, opacity: f32) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba(
        color.r.clamp(0.0, 1.0),
        color.g.clamp(0.0, 1.0),
        color.b.clamp(0.0, 1.0),
        opacity.clamp(0.0, 1.0),
    )
    .unwrap_or(tiny_skia::Color::BLACK)
}

fn to_pixels(length: Length, px_per_unit: f32) -> Result<u32, DeckError> {
    let px = (length.to_f32() * px_per_unit).round();
    if !px.is_finite() || px < 1.0 || px > u32::MAX as f32 {
        return Err(DeckError::InvalidConfiguration(format!(
            "raster dimension {} at {} px per unit is out of range",
            length.to_f32(),
            px_per_unit
        )));
    }
    Ok(px as u32)
}

struct GlyphPlacement {
    glyph_id: u16,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

fn layout_glyphs(font_data: &[u8], text: &str, font_size: f32, x: f32, y: f32) -> Vec<GlyphPlacement> {
    let Some(face) = HbFace::from_slice(font_data, 0) else {
        return Vec::new();
    };
    let units = face.units_per_em().max(1) as f32;
    let scale = font_size / units;
    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);

    let mut out = Vec::with_capacity(output.len());
    let mut pen_x = 0.0f32;
    for (info, pos) in output.glyph_infos().iter().zip(output.glyph_positions()) {
        let gid = info.glyph_id as u16;
        if gid != 0 {
            out.push(GlyphPlacement {
                glyph_id: gid,
                origin_x: x + pen_x + pos.x_offset as f32 * scale,
                // Shaping offsets are y-up.
                origin_y: y - pos.y_offset as f32 * scale,
                scale,
            });
        }
        pen_x += pos.x_advance as f32 * scale;
    }
    out
}

/// Font outlines are y-up; the canvas is y-down.
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn point(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.origin_y - y * self.scale)
    }

    fn finish(self) -> Option<Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.point(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x, y) = self.point(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.point(x1, y1);
        let (x2, y2) = self.point(x2, y2);
        let (x, y) = self.point(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn decode_image_to_pixmap(data: &[u8]) -> Option<Pixmap> {
    let rgba = image::load_from_memory(data).ok()?.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height)?;
    for (src, dst) in rgba
        .as_raw()
        .chunks_exact(4)
        .zip(pixmap.data_mut().chunks_exact_mut(4))
    {
        let alpha = src[3];
        dst[0] = premultiply(src[0], alpha);
        dst[1] = premultiply(src[1], alpha);
        dst[2] = premultiply(src[2], alpha);
        dst[3] = alpha;
    }
    Some(pixmap)
}

fn premultiply(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use std::f32::consts::TAU;

    const RED: Color = Color {
        r: 1.0,
        g: 0.0,
        b: 0.0,
    };

    fn unit(v: f32) -> Length {
        Length::from_f32(v)
    }

    fn rasterize(canvas: Canvas, px_per_unit: f32) -> image::RgbaImage {
        let fonts = FontRegistry::new();
        let pngs = document_to_png_pages(&canvas.finish(), &fonts, px_per_unit).unwrap();
        image::load_from_memory(&pngs[0]).unwrap().to_rgba8()
    }

    fn px(image: &image::RgbaImage, x: u32, y: u32) -> [u8; 4] {
        image.get_pixel(x, y).0
    }

    #[test]
    fn rectangles_land_top_left_in_scaled_pixels() {
        let mut canvas = Canvas::new(Size::new(10.0, 10.0));
        canvas.set_fill_color(RED);
        canvas.draw_rect(unit(0.0), unit(0.0), unit(5.0), unit(5.0));
        let image = rasterize(canvas, 2.0);
        assert_eq!(image.dimensions(), (20, 20));
        assert_eq!(px(&image, 2, 2), [255, 0, 0, 255]);
        assert_eq!(px(&image, 15, 15), [255, 255, 255, 255]);
    }

    #[test]
    fn translate_applies_in_the_current_scaled_space() {
        let mut canvas = Canvas::new(Size::new(10.0, 10.0));
        canvas.scale(2.0, 2.0);
        canvas.translate(unit(1.0), unit(1.0));
        canvas.set_fill_color(RED);
        canvas.draw_rect(unit(0.0), unit(0.0), unit(1.0), unit(1.0));
        let image = rasterize(canvas, 1.0);
        assert_eq!(px(&image, 3, 3), [255, 0, 0, 255]);
        assert_eq!(px(&image, 1, 1), [255, 255, 255, 255]);
        assert_eq!(px(&image, 5, 5), [255, 255, 255, 255]);
    }

    #[test]
    fn opacity_is_scoped_by_save_and_restore() {
        let mut canvas = Canvas::new(Size::new(4.0, 4.0));
        canvas.save_state();
        canvas.set_opacity(0.5, 0.5);
        canvas.restore_state();
        canvas.set_fill_color(Color::BLACK);
        canvas.draw_rect(unit(0.0), unit(0.0), unit(4.0), unit(4.0));
        let image = rasterize(canvas, 1.0);
        assert_eq!(px(&image, 1, 1), [0, 0, 0, 255]);
    }

    #[test]
    fn translucent_fill_blends_over_white() {
        let mut canvas = Canvas::new(Size::new(4.0, 4.0));
        canvas.set_opacity(0.5, 0.5);
        canvas.draw_rect(unit(0.0), unit(0.0), unit(4.0), unit(4.0));
        let image = rasterize(canvas, 1.0);
        let [r, g, b, a] = px(&image, 2, 2);
        assert_eq!(a, 255);
        assert!((120..=135).contains(&r) && r == g && g == b);
    }

    #[test]
    fn arcs_fill_a_disk() {
        let mut canvas = Canvas::new(Size::new(20.0, 20.0));
        canvas.set_fill_color(RED);
        canvas.new_sub_path();
        canvas.arc(unit(10.0), unit(10.0), unit(8.0), 0.0, TAU);
        canvas.close_path();
        canvas.fill();
        let image = rasterize(canvas, 1.0);
        assert_eq!(px(&image, 10, 10), [255, 0, 0, 255]);
        assert_eq!(px(&image, 0, 0), [255, 255, 255, 255]);
    }

    #[test]
    fn images_are_scaled_into_their_box() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blue.png");
        image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 0, 255, 255]))
            .save(&path)
            .unwrap();
        let mut canvas = Canvas::new(Size::new(8.0, 8.0));
        canvas.draw_image(unit(0.0), unit(0.0), unit(4.0), unit(4.0), path.to_string_lossy());
        let image = rasterize(canvas, 1.0);
        assert_eq!(px(&image, 1, 1), [0, 0, 255, 255]);
        assert_eq!(px(&image, 6, 6), [255, 255, 255, 255]);
    }

    #[test]
    fn missing_image_fails_the_page() {
        let mut canvas = Canvas::new(Size::new(8.0, 8.0));
        canvas.draw_image(unit(0.0), unit(0.0), unit(4.0), unit(4.0), "/nonexistent/deckpress.png");
        let result = document_to_png_pages(&canvas.finish(), &FontRegistry::new(), 1.0);
        assert!(matches!(result, Err(DeckError::UnresolvedReference { .. })));
    }

    #[test]
    fn degenerate_page_size_is_rejected() {
        let canvas = Canvas::new(Size::new(0.0, 8.0));
        let result = document_to_png_pages(&canvas.finish(), &FontRegistry::new(), 1.0);
        assert!(matches!(result, Err(DeckError::InvalidConfiguration(_))));
    }

    #[test]
    fn unregistered_family_never_inks_past_its_measured_width() {
        let fonts = FontRegistry::new();
        let size = unit(20.0);
        let text = "WWWWWWWW";
        let measured = fonts.measure_text_width("Sans", size, text).to_f32();

        let mut canvas = Canvas::new(Size::new(200.0, 40.0));
        canvas.set_font_name("Sans");
        canvas.set_font_size(size);
        canvas.draw_string(unit(0.0), unit(30.0), text);
        let pngs = document_to_png_pages(&canvas.finish(), &fonts, 1.0).unwrap();
        let image = image::load_from_memory(&pngs[0]).unwrap().to_rgba8();

        let inked_right = image
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0 != [255, 255, 255, 255])
            .map(|(x, _, _)| x + 1)
            .max()
            .unwrap_or(0);
        assert!(inked_right as f32 <= measured, "inked to {inked_right}, measured {measured}");
    }

    #[test]
    fn glyph_builder_flips_font_space() {
        let mut builder = GlyphPathBuilder::new(10.0, 20.0, 0.5);
        builder.move_to(0.0, 0.0);
        builder.line_to(4.0, 8.0);
        builder.line_to(8.0, 0.0);
        builder.close();
        let bounds = builder.finish().unwrap().bounds();
        assert_eq!(bounds.top(), 16.0);
        assert_eq!(bounds.bottom(), 20.0);
        assert_eq!(bounds.left(), 10.0);
        assert_eq!(bounds.right(), 14.0);
    }
}
