use crate::canvas::Canvas;
use crate::error::DeckError;
use crate::types::{Color, Length, Size};
use std::collections::HashMap;
use std::path::Path;

// Card art compiler. Supported subset:
// - <path d="..."> with every SVG 1.1 command (arcs and quadratics become cubics)
// - <rect>, <circle>, <ellipse>, <line>, <polyline>, <polygon>
// - <g>, nested <svg>, <use href="#id">, <image> with axis-aligned placement
// - presentation attributes, style="" and <style> rules with simple selectors
// - transform="" with translate, scale, rotate, skewX, skewY, matrix
//
// Not supported: <text>, gradients, clipping, masks, filters.

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Matrix {
    fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    fn translate(tx: f32, ty: f32) -> Self {
        Self {
            e: tx,
            f: ty,
            ..Self::identity()
        }
    }

    fn scale(sx: f32, sy: f32) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::identity()
        }
    }

    fn rotate(deg: f32) -> Self {
        let rad = deg.to_radians();
        let s = libm::sinf(rad);
        let c = libm::cosf(rad);
        Self {
            a: c,
            b: s,
            c: -s,
            d: c,
            e: 0.0,
            f: 0.0,
        }
    }

    fn skew(x_deg: f32, y_deg: f32) -> Self {
        Self {
            b: libm::tanf(y_deg.to_radians()),
            c: libm::tanf(x_deg.to_radians()),
            ..Self::identity()
        }
    }

    // [self] * [other]
    fn mul(self, other: Self) -> Self {
        Self {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    fn apply(self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    // sqrt(|det|): uniform stroke scale for the shapes card art uses.
    fn scale_factor(self) -> f32 {
        let det = self.a * self.d - self.b * self.c;
        libm::sqrtf(det.abs())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SvgStyle {
    fill: Option<Color>,
    stroke: Option<Color>,
    stroke_width: f32,
    line_cap: u8,
    line_join: u8,
    miter_limit: f32,
    dash_pattern: Vec<f32>,
    dash_offset: f32,
    fill_rule_evenodd: bool,
    fill_opacity: f32,
    stroke_opacity: f32,
    visible: bool,
}

impl Default for SvgStyle {
    // SVG defaults: black fill, no stroke.
    fn default() -> Self {
        Self {
            fill: Some(Color::BLACK),
            stroke: None,
            stroke_width: 1.0,
            line_cap: 0,
            line_join: 0,
            miter_limit: 4.0,
            dash_pattern: Vec::new(),
            dash_offset: 0.0,
            fill_rule_evenodd: false,
            fill_opacity: 1.0,
            stroke_opacity: 1.0,
            visible: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Selector {
    Tag(String),
    Class(String),
    Id(String),
    TagClass(String, String),
}

impl Selector {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.contains(|c: char| c.is_whitespace() || c == '>' || c == ':') {
            return None;
        }
        if let Some(id) = raw.strip_prefix('#') {
            return Some(Selector::Id(id.to_string()));
        }
        if let Some(class) = raw.strip_prefix('.') {
            return Some(Selector::Class(class.to_string()));
        }
        match raw.split_once('.') {
            Some((tag, class)) => Some(Selector::TagClass(tag.to_string(), class.to_string())),
            None => Some(Selector::Tag(raw.to_string())),
        }
    }

    fn matches(&self, node: roxmltree::Node<'_, '_>) -> bool {
        let has_class = |class: &str| {
            node.attribute("class")
                .map(|list| list.split_whitespace().any(|c| c == class))
                .unwrap_or(false)
        };
        match self {
            Selector::Tag(tag) => node.tag_name().name() == tag,
            Selector::Class(class) => has_class(class),
            Selector::Id(id) => node.attribute("id") == Some(id.as_str()),
            Selector::TagClass(tag, class) => node.tag_name().name() == tag && has_class(class),
        }
    }

    fn specificity(&self) -> u8 {
        match self {
            Selector::Tag(_) => 1,
            Selector::Class(_) => 10,
            Selector::TagClass(_, _) => 11,
            Selector::Id(_) => 100,
        }
    }
}

#[derive(Debug, Default)]
struct Stylesheet {
    rules: Vec<(Selector, String)>,
}

impl Stylesheet {
    fn extract(doc: &roxmltree::Document<'_>) -> Self {
        let mut rules = Vec::new();
        for node in doc
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == "style")
        {
            let css: String = node.children().filter_map(|c| c.text()).collect();
            let css = strip_css_comments(&css);
            for block in css.split('}') {
                let Some((selectors, body)) = block.split_once('{') else {
                    continue;
                };
                for selector in selectors.split(',').filter_map(Selector::parse) {
                    rules.push((selector, body.trim().to_string()));
                }
            }
        }
        // Stable sort keeps source order among equal specificity.
        rules.sort_by_key(|(selector, _)| selector.specificity());
        Self { rules }
    }

    fn apply(&self, node: roxmltree::Node<'_, '_>, style: &mut SvgStyle) {
        for (selector, body) in &self.rules {
            if selector.matches(node) {
                apply_style_string(body, style);
            }
        }
    }
}

fn strip_css_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, PartialEq)]
enum PathSeg {
    MoveTo(f32, f32),
    LineTo(f32, f32),
    CurveTo(f32, f32, f32, f32, f32, f32),
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompiledPath {
    segs: Vec<PathSeg>,
    style: SvgStyle,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CompiledImage {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CompiledItem {
    Path(CompiledPath),
    Image(CompiledImage),
}

/// Width and height of an SVG document in user units, taken from the root
/// `width`/`height` attributes, falling back to the `viewBox`.
pub(crate) fn intrinsic_size(svg_xml: &str) -> Result<Size, DeckError> {
    let doc = roxmltree::Document::parse(svg_xml)
        .map_err(|err| DeckError::Asset(format!("invalid svg: {err}")))?;
    let root = doc.root_element();
    if !root.tag_name().name().eq_ignore_ascii_case("svg") {
        return Err(DeckError::Asset("root element is not <svg>".to_string()));
    }
    let view_box = parse_viewbox(root.attribute("viewBox"));
    let width = root
        .attribute("width")
        .filter(|v| !v.trim().ends_with('%'))
        .and_then(parse_number)
        .or(view_box.map(|vb| vb.2));
    let height = root
        .attribute("height")
        .filter(|v| !v.trim().ends_with('%'))
        .and_then(parse_number)
        .or(view_box.map(|vb| vb.3));
    match (width, height) {
        (Some(w), Some(h)) if w > 0.0 && h > 0.0 => Ok(Size::new(w, h)),
        _ => Err(DeckError::Asset(
            "svg has neither a usable width/height nor a viewBox".to_string(),
        )),
    }
}

/// Compiles an SVG document into paths flattened to a `width` × `height`
/// viewport. Relative `<image>` references resolve against `base_dir`.
pub(crate) fn compile_svg(
    svg_xml: &str,
    width: f32,
    height: f32,
    base_dir: Option<&Path>,
) -> Result<Vec<CompiledItem>, DeckError> {
    let doc = roxmltree::Document::parse(svg_xml)
        .map_err(|err| DeckError::Asset(format!("invalid svg: {err}")))?;
    let root = doc.root_element();
    if !root.tag_name().name().eq_ignore_ascii_case("svg") {
        return Err(DeckError::Asset("root element is not <svg>".to_string()));
    }

    let stylesheet = Stylesheet::extract(&doc);
    let id_map = build_id_map(&doc);
    let view_box = parse_viewbox(root.attribute("viewBox"));
    let viewport = viewbox_to_viewport_matrix(view_box, width, height);
    let mut ctx = CompileContext {
        stylesheet: &stylesheet,
        id_map: &id_map,
        base_dir,
        use_depth: 0,
        out: Vec::new(),
    };
    compile_children(&mut ctx, root, viewport, &SvgStyle::default(), true);
    Ok(ctx.out)
}

pub(crate) fn render_compiled_items(items: &[CompiledItem], canvas: &mut Canvas) {
    for item in items {
        match item {
            CompiledItem::Path(path) => draw_compiled_path(canvas, path),
            CompiledItem::Image(img) => canvas.draw_image(
                Length::from_f32(img.x),
                Length::from_f32(img.y),
                Length::from_f32(img.width),
                Length::from_f32(img.height),
                img.source.clone(),
            ),
        }
    }
}

struct CompileContext<'a, 'd, 'i> {
    stylesheet: &'a Stylesheet,
    id_map: &'a HashMap<String, roxmltree::Node<'d, 'i>>,
    base_dir: Option<&'a Path>,
    use_depth: usize,
    out: Vec<CompiledItem>,
}

const MAX_USE_DEPTH: usize = 16;

fn compile_children(
    ctx: &mut CompileContext<'_, '_, '_>,
    node: roxmltree::Node<'_, '_>,
    ctm: Matrix,
    style: &SvgStyle,
    is_root: bool,
) {
    let mut local_style = style.clone();
    apply_presentation_and_style(node, ctx.stylesheet, &mut local_style);
    let local_ctm = match node.attribute("transform") {
        Some(transform) if !is_root => ctm.mul(parse_transform(transform)),
        _ => ctm,
    };
    for child in node.children().filter(|n| n.is_element()) {
        compile_element(ctx, child, local_ctm, &local_style);
    }
}

fn compile_element(
    ctx: &mut CompileContext<'_, '_, '_>,
    node: roxmltree::Node<'_, '_>,
    ctm: Matrix,
    style: &SvgStyle,
) {
    let tag = node.tag_name().name();
    match tag {
        "defs" | "style" | "title" | "desc" | "metadata" | "symbol" | "clipPath" | "mask"
        | "linearGradient" | "radialGradient" | "pattern" | "filter" => return,
        "g" | "a" | "switch" => {
            compile_children(ctx, node, ctm, style, false);
            return;
        }
        "svg" => {
            compile_nested_svg(ctx, node, ctm, style);
            return;
        }
        _ => {}
    }

    let mut local_style = style.clone();
    apply_presentation_and_style(node, ctx.stylesheet, &mut local_style);
    let mut local_ctm = ctm;
    if let Some(transform) = node.attribute("transform") {
        local_ctm = local_ctm.mul(parse_transform(transform));
    }

    let segs = match tag {
        "use" => {
            compile_use(ctx, node, local_ctm, &local_style);
            return;
        }
        "image" => {
            compile_image(ctx, node, local_ctm);
            return;
        }
        "path" => node.attribute("d").map(parse_path_data),
        "rect" => rect_to_path(node),
        "circle" => circle_to_path(node),
        "ellipse" => ellipse_to_path(node),
        "line" => line_to_path(node),
        "polyline" => poly_points_to_path(node, false),
        "polygon" => poly_points_to_path(node, true),
        _ => None,
    };
    if let Some(segs) = segs {
        push_compiled_path(&mut ctx.out, &segs, &local_style, local_ctm);
    }
}

fn compile_nested_svg(
    ctx: &mut CompileContext<'_, '_, '_>,
    node: roxmltree::Node<'_, '_>,
    ctm: Matrix,
    style: &SvgStyle,
) {
    let x = attr_number(node, "x");
    let y = attr_number(node, "y");
    let view_box = parse_viewbox(node.attribute("viewBox"));
    let w = node
        .attribute("width")
        .and_then(parse_number)
        .or(view_box.map(|vb| vb.2))
        .unwrap_or(0.0);
    let h = node
        .attribute("height")
        .and_then(parse_number)
        .or(view_box.map(|vb| vb.3))
        .unwrap_or(0.0);
    let inner = ctm
        .mul(Matrix::translate(x, y))
        .mul(viewbox_to_viewport_matrix(view_box, w, h));
    compile_children(ctx, node, inner, style, true);
}

fn compile_use(
    ctx: &mut CompileContext<'_, '_, '_>,
    node: roxmltree::Node<'_, '_>,
    ctm: Matrix,
    style: &SvgStyle,
) {
    let Some(id) = href_id(node) else {
        return;
    };
    let Some(target) = ctx.id_map.get(&id).copied() else {
        return;
    };
    if ctx.use_depth >= MAX_USE_DEPTH {
        log::warn!("svg <use> nesting too deep at #{id}");
        return;
    }
    let use_ctm = ctm.mul(Matrix::translate(attr_number(node, "x"), attr_number(node, "y")));
    ctx.use_depth += 1;
    if target.tag_name().name() == "symbol" {
        compile_children(ctx, target, use_ctm, style, false);
    } else {
        compile_element(ctx, target, use_ctm, style);
    }
    ctx.use_depth -= 1;
}

fn compile_image(ctx: &mut CompileContext<'_, '_, '_>, node: roxmltree::Node<'_, '_>, ctm: Matrix) {
    let href = node
        .attribute("href")
        .or_else(|| {
            node.attribute(("http://www.w3.org/1999/xlink", "href"))
        })
        .unwrap_or("")
        .trim();
    if href.is_empty() {
        return;
    }
    let x = attr_number(node, "x");
    let y = attr_number(node, "y");
    let w = attr_number(node, "width");
    let h = attr_number(node, "height");
    if w <= 0.0 || h <= 0.0 {
        return;
    }
    // Rotated or sheared images would need a matrix image draw.
    if ctm.b.abs() > 1e-4 || ctm.c.abs() > 1e-4 {
        log::debug!("skipping rotated svg <image> {href}");
        return;
    }
    let (x0, y0) = ctm.apply(x, y);
    let (x1, y1) = ctm.apply(x + w, y + h);
    let source = if href.starts_with("data:") {
        href.to_string()
    } else {
        match ctx.base_dir {
            Some(dir) => dir.join(href).to_string_lossy().into_owned(),
            None => href.to_string(),
        }
    };
    ctx.out.push(CompiledItem::Image(CompiledImage {
        x: x0.min(x1),
        y: y0.min(y1),
        width: (x1 - x0).abs(),
        height: (y1 - y0).abs(),
        source,
    }));
}

fn attr_number(node: roxmltree::Node<'_, '_>, name: &str) -> f32 {
    node.attribute(name).and_then(parse_number).unwrap_or(0.0)
}

fn build_id_map<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
) -> HashMap<String, roxmltree::Node<'a, 'input>> {
    let mut out = HashMap::new();
    for node in doc.descendants().filter(|n| n.is_element()) {
        if let Some(id) = node.attribute("id") {
            out.entry(id.to_string()).or_insert(node);
        }
    }
    out
}

fn href_id(node: roxmltree::Node<'_, '_>) -> Option<String> {
    let raw = node
        .attribute("href")
        .or_else(|| node.attribute(("http://www.w3.org/1999/xlink", "href")))?;
    let id = raw.trim().strip_prefix('#')?;
    if id.is_empty() {
        return None;
    }
    Some(id.to_string())
}

fn push_compiled_path(out: &mut Vec<CompiledItem>, segs: &[PathSeg], style: &SvgStyle, ctm: Matrix) {
    if !style.visible || segs.is_empty() {
        return;
    }
    let has_fill = style.fill.is_some() && style.fill_opacity > 0.0;
    let has_stroke =
        style.stroke.is_some() && style.stroke_width > 0.0 && style.stroke_opacity > 0.0;
    if !has_fill && !has_stroke {
        return;
    }

    let out_segs = segs
        .iter()
        .map(|seg| match *seg {
            PathSeg::MoveTo(x, y) => {
                let (x, y) = ctm.apply(x, y);
                PathSeg::MoveTo(x, y)
            }
            PathSeg::LineTo(x, y) => {
                let (x, y) = ctm.apply(x, y);
                PathSeg::LineTo(x, y)
            }
            PathSeg::CurveTo(x1, y1, x2, y2, x, y) => {
                let (x1, y1) = ctm.apply(x1, y1);
                let (x2, y2) = ctm.apply(x2, y2);
                let (x, y) = ctm.apply(x, y);
                PathSeg::CurveTo(x1, y1, x2, y2, x, y)
            }
            PathSeg::Close => PathSeg::Close,
        })
        .collect();

    let mut out_style = style.clone();
    if !has_fill {
        out_style.fill = None;
    }
    if has_stroke {
        let sf = ctm.scale_factor();
        out_style.stroke_width *= sf;
        for v in &mut out_style.dash_pattern {
            *v *= sf;
        }
        out_style.dash_offset *= sf;
    } else {
        out_style.stroke = None;
    }
    out.push(CompiledItem::Path(CompiledPath {
        segs: out_segs,
        style: out_style,
    }));
}

fn draw_compiled_path(canvas: &mut Canvas, path: &CompiledPath) {
    let style = &path.style;
    let has_fill = style.fill.is_some();
    let has_stroke = style.stroke.is_some();

    if has_stroke {
        canvas.set_miter_limit(Length::from_f32(style.miter_limit));
        let pattern = style
            .dash_pattern
            .iter()
            .map(|v| Length::from_f32(*v))
            .collect::<Vec<_>>();
        canvas.set_dash(pattern, Length::from_f32(style.dash_offset));
    }
    canvas.set_opacity(style.fill_opacity, style.stroke_opacity);
    if let Some(fill) = style.fill {
        canvas.set_fill_color(fill);
    }
    if let Some(stroke) = style.stroke {
        canvas.set_stroke_color(stroke);
        canvas.set_line_width(Length::from_f32(style.stroke_width));
        canvas.set_line_cap(style.line_cap);
        canvas.set_line_join(style.line_join);
    }

    for seg in &path.segs {
        match *seg {
            PathSeg::MoveTo(x, y) => canvas.move_to(Length::from_f32(x), Length::from_f32(y)),
            PathSeg::LineTo(x, y) => canvas.line_to(Length::from_f32(x), Length::from_f32(y)),
            PathSeg::CurveTo(x1, y1, x2, y2, x, y) => canvas.curve_to(
                Length::from_f32(x1),
                Length::from_f32(y1),
                Length::from_f32(x2),
                Length::from_f32(y2),
                Length::from_f32(x),
                Length::from_f32(y),
            ),
            PathSeg::Close => canvas.close_path(),
        }
    }

    match (has_fill, has_stroke, style.fill_rule_evenodd) {
        (true, true, true) => canvas.fill_stroke_evenodd(),
        (true, true, false) => canvas.fill_stroke(),
        (true, false, true) => canvas.fill_evenodd(),
        (true, false, false) => canvas.fill(),
        (false, true, _) => canvas.stroke(),
        (false, false, _) => {}
    }
}

fn parse_viewbox(view_box: Option<&str>) -> Option<(f32, f32, f32, f32)> {
    let nums = parse_number_list(view_box?);
    if nums.len() != 4 || nums[2] <= 0.0 || nums[3] <= 0.0 {
        return None;
    }
    Some((nums[0], nums[1], nums[2], nums[3]))
}

// preserveAspectRatio "xMidYMid meet".
fn viewbox_to_viewport_matrix(view_box: Option<(f32, f32, f32, f32)>, w: f32, h: f32) -> Matrix {
    let Some((min_x, min_y, vb_w, vb_h)) = view_box else {
        return Matrix::identity();
    };
    let s = (w / vb_w).min(h / vb_h);
    let tx = (w - vb_w * s) * 0.5 - min_x * s;
    let ty = (h - vb_h * s) * 0.5 - min_y * s;
    Matrix::translate(tx, ty).mul(Matrix::scale(s, s))
}

fn apply_presentation_and_style(
    node: roxmltree::Node<'_, '_>,
    stylesheet: &Stylesheet,
    style: &mut SvgStyle,
) {
    // Presentation attributes first, then <style> rules, then style="".
    for attr in node.attributes() {
        apply_property(attr.name(), attr.value(), style);
    }
    stylesheet.apply(node, style);
    if let Some(inline) = node.attribute("style") {
        apply_style_string(inline, style);
    }
}

fn apply_style_string(input: &str, style: &mut SvgStyle) {
    for decl in input.split(';') {
        let Some((key, value)) = decl.split_once(':') else {
            continue;
        };
        let value = value.trim();
        let value = value
            .strip_suffix("!important")
            .map(str::trim_end)
            .unwrap_or(value);
        apply_property(&key.trim().to_ascii_lowercase(), value, style);
    }
}

fn apply_property(key: &str, val: &str, style: &mut SvgStyle) {
    let val = val.trim();
    match key {
        "fill" => {
            if let Some(paint) = parse_paint(val) {
                style.fill = paint;
            }
        }
        "stroke" => {
            if let Some(paint) = parse_paint(val) {
                style.stroke = paint;
            }
        }
        "stroke-width" => {
            if let Some(v) = parse_number(val) {
                style.stroke_width = v.max(0.0);
            }
        }
        "stroke-miterlimit" => {
            if let Some(v) = parse_number(val) {
                style.miter_limit = v.max(1.0);
            }
        }
        "stroke-linecap" => {
            style.line_cap = match val {
                "round" => 1,
                "square" => 2,
                _ => 0,
            };
        }
        "stroke-linejoin" => {
            style.line_join = match val {
                "round" => 1,
                "bevel" => 2,
                _ => 0,
            };
        }
        "fill-rule" => style.fill_rule_evenodd = val.eq_ignore_ascii_case("evenodd"),
        "stroke-dasharray" => {
            if val.eq_ignore_ascii_case("none") {
                style.dash_pattern.clear();
            } else {
                style.dash_pattern = parse_number_list(val);
                if style.dash_pattern.len() % 2 == 1 {
                    let dup = style.dash_pattern.clone();
                    style.dash_pattern.extend_from_slice(&dup);
                }
            }
        }
        "stroke-dashoffset" => {
            if let Some(v) = parse_number(val) {
                style.dash_offset = v;
            }
        }
        "opacity" => {
            if let Some(v) = parse_number(val) {
                let o = v.clamp(0.0, 1.0);
                style.fill_opacity *= o;
                style.stroke_opacity *= o;
            }
        }
        "fill-opacity" => {
            if let Some(v) = parse_number(val) {
                style.fill_opacity *= v.clamp(0.0, 1.0);
            }
        }
        "stroke-opacity" => {
            if let Some(v) = parse_number(val) {
                style.stroke_opacity *= v.clamp(0.0, 1.0);
            }
        }
        "display" => {
            if val == "none" {
                style.visible = false;
            }
        }
        "visibility" => style.visible = !(val == "hidden" || val == "collapse"),
        _ => {}
    }
}

// Outer None: unknown paint, keep the inherited one. Inner None: "none".
fn parse_paint(input: &str) -> Option<Option<Color>> {
    if input.eq_ignore_ascii_case("none") {
        return Some(None);
    }
    if input.starts_with("url(") {
        // Gradients are not supported; a fallback color may follow the reference.
        let fallback = input.split_once(')').map(|(_, rest)| rest.trim())?;
        return parse_color(fallback).map(Some);
    }
    parse_color(input).map(Some)
}

fn parse_color(input: &str) -> Option<Color> {
    let v = input.trim();
    if let Some(hex) = v.strip_prefix('#') {
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return None,
        };
        let channel = |i: usize| u8::from_str_radix(expanded.get(i..i + 2)?, 16).ok();
        return Some(Color::from_rgb8(channel(0)?, channel(2)?, channel(4)?));
    }
    let lower = v.to_ascii_lowercase();
    if let Some(args) = lower
        .strip_prefix("rgb(")
        .or_else(|| lower.strip_prefix("rgba("))
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let mut channels = args.split(',').map(str::trim).take(3).map(|part| {
            match part.strip_suffix('%') {
                Some(pct) => pct.parse::<f32>().ok().map(|p| p / 100.0),
                None => part.parse::<f32>().ok().map(|c| c / 255.0),
            }
        });
        let r = channels.next()??;
        let g = channels.next()??;
        let b = channels.next()??;
        return Some(Color::rgb(r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0)));
    }
    let (r, g, b) = match lower.as_str() {
        "black" => (0, 0, 0),
        "white" => (255, 255, 255),
        "red" => (255, 0, 0),
        "green" => (0, 128, 0),
        "lime" => (0, 255, 0),
        "blue" => (0, 0, 255),
        "yellow" => (255, 255, 0),
        "orange" => (255, 165, 0),
        "gray" | "grey" => (128, 128, 128),
        "silver" => (192, 192, 192),
        "maroon" => (128, 0, 0),
        "purple" => (128, 0, 128),
        "navy" => (0, 0, 128),
        "brown" => (165, 42, 42),
        _ => return None,
    };
    Some(Color::from_rgb8(r, g, b))
}

fn parse_number(input: &str) -> Option<f32> {
    // Units are treated as user units.
    let s = input
        .trim()
        .trim_end_matches("px")
        .trim_end_matches("pt")
        .trim_end_matches("mm")
        .trim_end_matches("cm")
        .trim_end_matches("in")
        .trim();
    s.parse::<f32>().ok().filter(|v| v.is_finite())
}

fn parse_transform(input: &str) -> Matrix {
    let mut out = Matrix::identity();
    let mut s = input.trim();

    while !s.is_empty() {
        let Some(open) = s.find('(') else { break };
        let name = s[..open].trim().trim_start_matches(',').trim();
        let Some(close) = s[open + 1..].find(')') else {
            break;
        };
        let args = parse_number_list(&s[open + 1..open + 1 + close]);
        let arg = |i: usize, default: f32| args.get(i).copied().unwrap_or(default);

        let m = match name {
            "translate" => Matrix::translate(arg(0, 0.0), arg(1, 0.0)),
            "scale" => Matrix::scale(arg(0, 1.0), arg(1, arg(0, 1.0))),
            "rotate" if args.len() >= 3 => Matrix::translate(args[1], args[2])
                .mul(Matrix::rotate(args[0]))
                .mul(Matrix::translate(-args[1], -args[2])),
            "rotate" => Matrix::rotate(arg(0, 0.0)),
            "skewX" => Matrix::skew(arg(0, 0.0), 0.0),
            "skewY" => Matrix::skew(0.0, arg(0, 0.0)),
            "matrix" if args.len() >= 6 => Matrix {
                a: args[0],
                b: args[1],
                c: args[2],
                d: args[3],
                e: args[4],
                f: args[5],
            },
            _ => Matrix::identity(),
        };

        out = out.mul(m);
        s = s[open + 1 + close + 1..].trim_start();
    }

    out
}

fn parse_number_list(input: &str) -> Vec<f32> {
    let mut parser = PathParser::new(input);
    let mut out = Vec::new();
    while let Some(v) = parser.next_number() {
        out.push(v);
    }
    out
}

fn rect_to_path(node: roxmltree::Node<'_, '_>) -> Option<Vec<PathSeg>> {
    let x = attr_number(node, "x");
    let y = attr_number(node, "y");
    let w = parse_number(node.attribute("width")?)?;
    let h = parse_number(node.attribute("height")?)?;
    if w <= 0.0 || h <= 0.0 {
        return None;
    }
    let rx_attr = node.attribute("rx").and_then(parse_number);
    let ry_attr = node.attribute("ry").and_then(parse_number);
    let rx = rx_attr.or(ry_attr).unwrap_or(0.0).clamp(0.0, w / 2.0);
    let ry = ry_attr.or(rx_attr).unwrap_or(0.0).clamp(0.0, h / 2.0);
    if rx <= 0.0 || ry <= 0.0 {
        return Some(vec![
            PathSeg::MoveTo(x, y),
            PathSeg::LineTo(x + w, y),
            PathSeg::LineTo(x + w, y + h),
            PathSeg::LineTo(x, y + h),
            PathSeg::Close,
        ]);
    }
    let k = 0.552_284_8_f32;
    let (ox, oy) = (rx * k, ry * k);
    let (r, b) = (x + w, y + h);
    Some(vec![
        PathSeg::MoveTo(x + rx, y),
        PathSeg::LineTo(r - rx, y),
        PathSeg::CurveTo(r - rx + ox, y, r, y + ry - oy, r, y + ry),
        PathSeg::LineTo(r, b - ry),
        PathSeg::CurveTo(r, b - ry + oy, r - rx + ox, b, r - rx, b),
        PathSeg::LineTo(x + rx, b),
        PathSeg::CurveTo(x + rx - ox, b, x, b - ry + oy, x, b - ry),
        PathSeg::LineTo(x, y + ry),
        PathSeg::CurveTo(x, y + ry - oy, x + rx - ox, y, x + rx, y),
        PathSeg::Close,
    ])
}

fn circle_to_path(node: roxmltree::Node<'_, '_>) -> Option<Vec<PathSeg>> {
    let r = parse_number(node.attribute("r")?)?;
    if r <= 0.0 {
        return None;
    }
    Some(ellipse_segs(attr_number(node, "cx"), attr_number(node, "cy"), r, r))
}

fn ellipse_to_path(node: roxmltree::Node<'_, '_>) -> Option<Vec<PathSeg>> {
    let rx = parse_number(node.attribute("rx")?)?;
    let ry = parse_number(node.attribute("ry")?)?;
    if rx <= 0.0 || ry <= 0.0 {
        return None;
    }
    Some(ellipse_segs(attr_number(node, "cx"), attr_number(node, "cy"), rx, ry))
}

fn ellipse_segs(cx: f32, cy: f32, rx: f32, ry: f32) -> Vec<PathSeg> {
    let k = 0.552_284_8_f32;
    let ox = rx * k;
    let oy = ry * k;
    vec![
        PathSeg::MoveTo(cx + rx, cy),
        PathSeg::CurveTo(cx + rx, cy + oy, cx + ox, cy + ry, cx, cy + ry),
        PathSeg::CurveTo(cx - ox, cy + ry, cx - rx, cy + oy, cx - rx, cy),
        PathSeg::CurveTo(cx - rx, cy - oy, cx - ox, cy - ry, cx, cy - ry),
        PathSeg::CurveTo(cx + ox, cy - ry, cx + rx, cy - oy, cx + rx, cy),
        PathSeg::Close,
    ]
}

fn line_to_path(node: roxmltree::Node<'_, '_>) -> Option<Vec<PathSeg>> {
    Some(vec![
        PathSeg::MoveTo(attr_number(node, "x1"), attr_number(node, "y1")),
        PathSeg::LineTo(attr_number(node, "x2"), attr_number(node, "y2")),
    ])
}

fn poly_points_to_path(node: roxmltree::Node<'_, '_>, close: bool) -> Option<Vec<PathSeg>> {
    let nums = parse_number_list(node.attribute("points")?);
    let mut points = nums.chunks_exact(2).map(|p| (p[0], p[1]));
    let (x0, y0) = points.next()?;
    let mut segs = vec![PathSeg::MoveTo(x0, y0)];
    segs.extend(points.map(|(x, y)| PathSeg::LineTo(x, y)));
    if segs.len() < 2 {
        return None;
    }
    if close {
        segs.push(PathSeg::Close);
    }
    Some(segs)
}

fn parse_path_data(d: &str) -> Vec<PathSeg> {
    let mut segs = Vec::new();
    let mut p = PathParser::new(d);
    let mut cmd = ' ';
    let (mut cur_x, mut cur_y) = (0.0f32, 0.0f32);
    let (mut start_x, mut start_y) = (0.0f32, 0.0f32);
    let mut last_cubic_ctrl2: Option<(f32, f32)> = None;
    let mut last_quad_ctrl: Option<(f32, f32)> = None;

    while let Some(c) = p.next_command(&mut cmd) {
        let rel = c.is_ascii_lowercase();
        let base = |x: f32, y: f32, cx: f32, cy: f32| if rel { (cx + x, cy + y) } else { (x, y) };
        let before = p.i;
        match c.to_ascii_uppercase() {
            'M' => {
                if let Some((x, y)) = p.next_pair() {
                    let (x, y) = base(x, y, cur_x, cur_y);
                    segs.push(PathSeg::MoveTo(x, y));
                    (cur_x, cur_y) = (x, y);
                    (start_x, start_y) = (x, y);
                    // Further pairs after a moveto are implicit linetos.
                    while let Some((x2, y2)) = p.next_pair() {
                        let (x2, y2) = base(x2, y2, cur_x, cur_y);
                        segs.push(PathSeg::LineTo(x2, y2));
                        (cur_x, cur_y) = (x2, y2);
                    }
                }
                last_cubic_ctrl2 = None;
                last_quad_ctrl = None;
            }
            'L' => {
                while let Some((x, y)) = p.next_pair() {
                    let (x, y) = base(x, y, cur_x, cur_y);
                    segs.push(PathSeg::LineTo(x, y));
                    (cur_x, cur_y) = (x, y);
                }
                last_cubic_ctrl2 = None;
                last_quad_ctrl = None;
            }
            'H' => {
                while let Some(x) = p.next_number() {
                    cur_x = if rel { cur_x + x } else { x };
                    segs.push(PathSeg::LineTo(cur_x, cur_y));
                }
                last_cubic_ctrl2 = None;
                last_quad_ctrl = None;
            }
            'V' => {
                while let Some(y) = p.next_number() {
                    cur_y = if rel { cur_y + y } else { y };
                    segs.push(PathSeg::LineTo(cur_x, cur_y));
                }
                last_cubic_ctrl2 = None;
                last_quad_ctrl = None;
            }
            'C' => {
                while let (Some((x1, y1)), Some((x2, y2)), Some((x, y))) =
                    (p.next_pair(), p.next_pair(), p.next_pair())
                {
                    let (x1, y1) = base(x1, y1, cur_x, cur_y);
                    let (x2, y2) = base(x2, y2, cur_x, cur_y);
                    let (x, y) = base(x, y, cur_x, cur_y);
                    segs.push(PathSeg::CurveTo(x1, y1, x2, y2, x, y));
                    (cur_x, cur_y) = (x, y);
                    last_cubic_ctrl2 = Some((x2, y2));
                    last_quad_ctrl = None;
                }
            }
            'S' => {
                while let (Some((x2, y2)), Some((x, y))) = (p.next_pair(), p.next_pair()) {
                    let (x2, y2) = base(x2, y2, cur_x, cur_y);
                    let (x, y) = base(x, y, cur_x, cur_y);
                    let (x1, y1) = match last_cubic_ctrl2 {
                        Some((px, py)) => (2.0 * cur_x - px, 2.0 * cur_y - py),
                        None => (cur_x, cur_y),
                    };
                    segs.push(PathSeg::CurveTo(x1, y1, x2, y2, x, y));
                    (cur_x, cur_y) = (x, y);
                    last_cubic_ctrl2 = Some((x2, y2));
                    last_quad_ctrl = None;
                }
            }
            'Q' => {
                while let (Some((qx, qy)), Some((x, y))) = (p.next_pair(), p.next_pair()) {
                    let (qx, qy) = base(qx, qy, cur_x, cur_y);
                    let (x, y) = base(x, y, cur_x, cur_y);
                    let (c1x, c1y, c2x, c2y) = quad_to_cubic(cur_x, cur_y, qx, qy, x, y);
                    segs.push(PathSeg::CurveTo(c1x, c1y, c2x, c2y, x, y));
                    (cur_x, cur_y) = (x, y);
                    last_quad_ctrl = Some((qx, qy));
                    last_cubic_ctrl2 = None;
                }
            }
            'T' => {
                while let Some((x, y)) = p.next_pair() {
                    let (x, y) = base(x, y, cur_x, cur_y);
                    let (qx, qy) = match last_quad_ctrl {
                        Some((px, py)) => (2.0 * cur_x - px, 2.0 * cur_y - py),
                        None => (cur_x, cur_y),
                    };
                    let (c1x, c1y, c2x, c2y) = quad_to_cubic(cur_x, cur_y, qx, qy, x, y);
                    segs.push(PathSeg::CurveTo(c1x, c1y, c2x, c2y, x, y));
                    (cur_x, cur_y) = (x, y);
                    last_quad_ctrl = Some((qx, qy));
                    last_cubic_ctrl2 = None;
                }
            }
            'A' => {
                while let (Some(rx), Some(ry), Some(rot), Some(large), Some(sweep), Some((x, y))) = (
                    p.next_number(),
                    p.next_number(),
                    p.next_number(),
                    p.next_flag(),
                    p.next_flag(),
                    p.next_pair(),
                ) {
                    let (x, y) = base(x, y, cur_x, cur_y);
                    segs.extend(arc_to_cubics(cur_x, cur_y, rx, ry, rot, large, sweep, x, y));
                    (cur_x, cur_y) = (x, y);
                }
                last_cubic_ctrl2 = None;
                last_quad_ctrl = None;
            }
            'Z' => {
                segs.push(PathSeg::Close);
                (cur_x, cur_y) = (start_x, start_y);
                last_cubic_ctrl2 = None;
                last_quad_ctrl = None;
            }
            _ => {}
        }
        // Malformed data: stop instead of spinning on an unconsumed token.
        if p.i == before && !matches!(c, 'Z' | 'z') {
            break;
        }
    }

    segs
}

fn quad_to_cubic(x0: f32, y0: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> (f32, f32, f32, f32) {
    let c1x = x0 + (2.0 / 3.0) * (x1 - x0);
    let c1y = y0 + (2.0 / 3.0) * (y1 - y0);
    let c2x = x2 + (2.0 / 3.0) * (x1 - x2);
    let c2y = y2 + (2.0 / 3.0) * (y1 - y2);
    (c1x, c1y, c2x, c2y)
}

// Endpoint to center parameterization, SVG 1.1 implementation notes F.6.5.
#[allow(clippy::too_many_arguments)]
fn arc_to_cubics(
    x0: f32,
    y0: f32,
    rx: f32,
    ry: f32,
    x_axis_rotation_deg: f32,
    large_arc: bool,
    sweep: bool,
    x1: f32,
    y1: f32,
) -> Vec<PathSeg> {
    use std::f32::consts::{FRAC_PI_2, TAU};

    let mut rx = rx.abs();
    let mut ry = ry.abs();
    if rx == 0.0 || ry == 0.0 || (x0 == x1 && y0 == y1) {
        return vec![PathSeg::LineTo(x1, y1)];
    }

    let phi = x_axis_rotation_deg.to_radians();
    let (sin_phi, cos_phi) = (libm::sinf(phi), libm::cosf(phi));

    let dx2 = (x0 - x1) / 2.0;
    let dy2 = (y0 - y1) / 2.0;
    let x1p = cos_phi * dx2 + sin_phi * dy2;
    let y1p = -sin_phi * dx2 + cos_phi * dy2;

    let lambda = (x1p * x1p) / (rx * rx) + (y1p * y1p) / (ry * ry);
    if lambda > 1.0 {
        let s = libm::sqrtf(lambda);
        rx *= s;
        ry *= s;
    }

    let (rx2, ry2) = (rx * rx, ry * ry);
    let num = rx2 * ry2 - rx2 * y1p * y1p - ry2 * x1p * x1p;
    let den = rx2 * y1p * y1p + ry2 * x1p * x1p;
    let coef = if den != 0.0 {
        let sign = if large_arc == sweep { -1.0 } else { 1.0 };
        sign * libm::sqrtf((num / den).max(0.0))
    } else {
        0.0
    };
    let cxp = coef * (rx * y1p / ry);
    let cyp = coef * (-ry * x1p / rx);
    let cx = cos_phi * cxp - sin_phi * cyp + (x0 + x1) / 2.0;
    let cy = sin_phi * cxp + cos_phi * cyp + (y0 + y1) / 2.0;

    let angle = |ux: f32, uy: f32, vx: f32, vy: f32| {
        libm::atan2f(ux * vy - uy * vx, ux * vx + uy * vy)
    };
    let ux = (x1p - cxp) / rx;
    let uy = (y1p - cyp) / ry;
    let vx = (-x1p - cxp) / rx;
    let vy = (-y1p - cyp) / ry;

    let theta1 = angle(1.0, 0.0, ux, uy);
    let mut dtheta = angle(ux, uy, vx, vy);
    if !sweep && dtheta > 0.0 {
        dtheta -= TAU;
    } else if sweep && dtheta < 0.0 {
        dtheta += TAU;
    }

    let count = libm::ceilf(dtheta.abs() / FRAC_PI_2 - 1e-4).max(1.0) as i32;
    let delta = dtheta / count as f32;
    let k = (4.0 / 3.0) * libm::tanf(delta / 4.0);
    let map = |x: f32, y: f32| {
        let (x, y) = (rx * x, ry * y);
        (cx + cos_phi * x - sin_phi * y, cy + sin_phi * x + cos_phi * y)
    };

    (0..count)
        .map(|index| {
            let t1 = theta1 + delta * index as f32;
            let t2 = t1 + delta;
            let (s1, c1) = (libm::sinf(t1), libm::cosf(t1));
            let (s2, c2) = (libm::sinf(t2), libm::cosf(t2));
            let (c1x, c1y) = map(c1 - k * s1, s1 + k * c1);
            let (c2x, c2y) = map(c2 + k * s2, s2 - k * c2);
            let (ex, ey) = map(c2, s2);
            PathSeg::CurveTo(c1x, c1y, c2x, c2y, ex, ey)
        })
        .collect()
}

struct PathParser<'a> {
    bytes: &'a [u8],
    i: usize,
}

impl<'a> PathParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            bytes: input.as_bytes(),
            i: 0,
        }
    }

    fn skip_ws(&mut self) {
        while self.i < self.bytes.len()
            && matches!(self.bytes[self.i], b' ' | b'\n' | b'\r' | b'\t' | b',')
        {
            self.i += 1;
        }
    }

    // Returns the next command letter, or repeats the current one when the
    // data continues with numbers.
    fn next_command(&mut self, current: &mut char) -> Option<char> {
        self.skip_ws();
        let b = *self.bytes.get(self.i)?;
        if b.is_ascii_alphabetic() {
            *current = b as char;
            self.i += 1;
            return Some(*current);
        }
        if *current == ' ' {
            return None;
        }
        Some(*current)
    }

    fn next_number(&mut self) -> Option<f32> {
        self.skip_ws();
        let start = self.i;
        let mut digits = false;
        let at = |i: usize| self.bytes.get(i).copied();

        let mut i = self.i;
        if matches!(at(i), Some(b'+' | b'-')) {
            i += 1;
        }
        while matches!(at(i), Some(b'0'..=b'9')) {
            i += 1;
            digits = true;
        }
        if at(i) == Some(b'.') {
            i += 1;
            while matches!(at(i), Some(b'0'..=b'9')) {
                i += 1;
                digits = true;
            }
        }
        if digits && matches!(at(i), Some(b'e' | b'E')) {
            let mut j = i + 1;
            if matches!(at(j), Some(b'+' | b'-')) {
                j += 1;
            }
            if matches!(at(j), Some(b'0'..=b'9')) {
                while matches!(at(j), Some(b'0'..=b'9')) {
                    j += 1;
                }
                i = j;
            }
        }
        if !digits {
            return None;
        }
        self.i = i;
        std::str::from_utf8(&self.bytes[start..i])
            .ok()?
            .parse::<f32>()
            .ok()
    }

    // Arc flags may be written without separators ("a5 5 0 01 20 20").
    fn next_flag(&mut self) -> Option<bool> {
        self.skip_ws();
        match self.bytes.get(self.i)? {
            b'0' => {
                self.i += 1;
                Some(false)
            }
            b'1' => {
                self.i += 1;
                Some(true)
            }
            _ => None,
        }
    }

    fn next_pair(&mut self) -> Option<(f32, f32)> {
        let save = self.i;
        let x = self.next_number()?;
        match self.next_number() {
            Some(y) => Some((x, y)),
            None => {
                self.i = save;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;

    fn paths(items: &[CompiledItem]) -> Vec<&CompiledPath> {
        items
            .iter()
            .filter_map(|item| match item {
                CompiledItem::Path(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn parses_all_path_commands() {
        let segs = parse_path_data("M0 0 L10 0 H20 V10 C20 20 10 20 10 10 S0 0 0 5 Q5 5 5 10 T10 10 A5 5 0 0 1 20 20 Z");
        assert!(matches!(segs[0], PathSeg::MoveTo(_, _)));
        assert!(matches!(segs.last(), Some(PathSeg::Close)));
        assert!(segs.len() >= 9);
    }

    #[test]
    fn relative_commands_accumulate() {
        let segs = parse_path_data("m1 1 l2 0 l0 2 z");
        assert_eq!(
            segs,
            vec![
                PathSeg::MoveTo(1.0, 1.0),
                PathSeg::LineTo(3.0, 1.0),
                PathSeg::LineTo(3.0, 3.0),
                PathSeg::Close,
            ]
        );
    }

    #[test]
    fn compact_numbers_and_arc_flags() {
        let segs = parse_path_data("M10-5.5.5.5 A5 5 0 01 20 20");
        assert_eq!(segs[0], PathSeg::MoveTo(10.0, -5.5));
        assert_eq!(segs[1], PathSeg::LineTo(0.5, 0.5));
        assert!(segs.iter().any(|s| matches!(s, PathSeg::CurveTo(..))));
    }

    #[test]
    fn malformed_path_data_terminates() {
        let segs = parse_path_data("M 0 0 L x y");
        assert_eq!(segs, vec![PathSeg::MoveTo(0.0, 0.0)]);
    }

    #[test]
    fn intrinsic_size_prefers_width_and_height() {
        let size = intrinsic_size(r#"<svg xmlns="http://www.w3.org/2000/svg" width="30mm" height="20mm" viewBox="0 0 300 200"/>"#).unwrap();
        assert_eq!(size, Size::new(30.0, 20.0));
        let size = intrinsic_size(r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 64 32"/>"#).unwrap();
        assert_eq!(size, Size::new(64.0, 32.0));
        assert!(intrinsic_size(r#"<svg xmlns="http://www.w3.org/2000/svg"/>"#).is_err());
        assert!(intrinsic_size("not xml").is_err());
    }

    #[test]
    fn viewbox_maps_into_viewport() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"><rect x="0" y="0" width="10" height="10" fill="#ff0000"/></svg>"##;
        let items = compile_svg(svg, 20.0, 20.0, None).unwrap();
        let path = paths(&items)[0];
        assert_eq!(path.segs[2], PathSeg::LineTo(20.0, 20.0));
        assert_eq!(path.style.fill, Some(Color::rgb(1.0, 0.0, 0.0)));
    }

    #[test]
    fn style_precedence_is_attribute_then_sheet_then_inline() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10">
            <style>/* art */ .a { fill: #00ff00; stroke: blue } rect.b { stroke-width: 3 }</style>
            <rect class="a b" width="10" height="10" fill="red" style="stroke:#ffffff"/>
        </svg>"##;
        let items = compile_svg(svg, 10.0, 10.0, None).unwrap();
        let path = paths(&items)[0];
        assert_eq!(path.style.fill, Some(Color::rgb(0.0, 1.0, 0.0)));
        assert_eq!(path.style.stroke, Some(Color::WHITE));
        assert_eq!(path.style.stroke_width, 3.0);
    }

    #[test]
    fn group_styles_inherit_and_none_suppresses_shapes() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10">
            <g fill="none" stroke="black" stroke-width="2" transform="scale(2)">
              <circle cx="2" cy="2" r="1"/>
              <line x1="0" y1="0" x2="1" y2="1" stroke="none"/>
            </g>
        </svg>"##;
        let items = compile_svg(svg, 10.0, 10.0, None).unwrap();
        let compiled = paths(&items);
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].style.fill, None);
        assert_eq!(compiled[0].style.stroke_width, 4.0);
        assert_eq!(compiled[0].segs[0], PathSeg::MoveTo(6.0, 4.0));
    }

    #[test]
    fn use_resolves_definitions() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="40" height="20">
            <defs><rect id="box" width="5" height="5"/></defs>
            <use xlink:href="#box" x="2" y="2"/>
            <use href="#box" x="20"/>
        </svg>"##;
        let items = compile_svg(svg, 40.0, 20.0, None).unwrap();
        let compiled = paths(&items);
        assert_eq!(compiled.len(), 2);
        assert_eq!(compiled[0].segs[0], PathSeg::MoveTo(2.0, 2.0));
        assert_eq!(compiled[1].segs[0], PathSeg::MoveTo(20.0, 0.0));
    }

    #[test]
    fn self_referencing_use_is_bounded() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10">
            <g id="loop"><rect width="1" height="1"/><use href="#loop"/></g>
        </svg>"##;
        let items = compile_svg(svg, 10.0, 10.0, None).unwrap();
        assert_eq!(paths(&items).len(), MAX_USE_DEPTH + 1);
    }

    #[test]
    fn images_resolve_against_base_dir() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10">
            <image href="pic.png" x="1" y="2" width="3" height="4"/>
        </svg>"##;
        let items = compile_svg(svg, 10.0, 10.0, Some(Path::new("/art"))).unwrap();
        let CompiledItem::Image(image) = &items[0] else {
            panic!("expected an image");
        };
        assert_eq!(image.source, Path::new("/art").join("pic.png").to_string_lossy());
        assert_eq!((image.x, image.y, image.width, image.height), (1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn colors_parse_in_common_notations() {
        assert_eq!(parse_color("#fff"), Some(Color::WHITE));
        assert_eq!(parse_color("rgb(255, 0, 0)"), Some(Color::rgb(1.0, 0.0, 0.0)));
        assert_eq!(parse_color("rgb(0%, 100%, 0%)"), Some(Color::rgb(0.0, 1.0, 0.0)));
        assert_eq!(parse_color("Black"), Some(Color::BLACK));
        assert_eq!(parse_color("#12345"), None);
        assert_eq!(parse_paint("url(#g) #000000"), Some(Some(Color::BLACK)));
        assert_eq!(parse_paint("url(#g)"), None);
    }

    #[test]
    fn transforms_compose_left_to_right() {
        let m = parse_transform("translate(10, 0) scale(2)");
        assert_eq!(m.apply(1.0, 1.0), (12.0, 2.0));
        let r = parse_transform("rotate(90 5 5)");
        let (x, y) = r.apply(10.0, 5.0);
        assert!((x - 5.0).abs() < 1e-4 && (y - 10.0).abs() < 1e-4);
    }

    #[test]
    fn rendering_emits_fill_with_opacity() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10">
            <rect width="10" height="10" fill="#000000" opacity="0.5"/>
        </svg>"##;
        let items = compile_svg(svg, 10.0, 10.0, None).unwrap();
        let mut canvas = Canvas::new(Size::new(10.0, 10.0));
        render_compiled_items(&items, &mut canvas);
        let cmds = canvas.commands();
        assert!(cmds.contains(&Command::SetOpacity {
            fill: 0.5,
            stroke: 0.5
        }));
        assert_eq!(cmds.last(), Some(&Command::Fill));
    }
}
