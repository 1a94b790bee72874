use crate::canvas::{Command, Document, Page};
use crate::drawable::load_image_source;
use crate::error::DeckError;
use crate::font::{FontProgramKind, FontRegistry, RegisteredFont, detect_direction};
use crate::types::{Color, Length, Size};
use image::GenericImageView;
use rustybuzz::{Face as HbFace, UnicodeBuffer};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{self, Write};

#[derive(Debug, Clone)]
pub struct PdfOptions {
    /// Flate-compress content, font and image streams.
    pub compress: bool,
    pub title: Option<String>,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            compress: true,
            title: None,
        }
    }
}

const PRODUCER: &str = "deckpress";

pub fn document_to_pdf(
    document: &Document,
    fonts: &FontRegistry,
    options: &PdfOptions,
) -> Result<Vec<u8>, DeckError> {
    let mut out = Vec::new();
    write_pdf(document, fonts, options, &mut out)?;
    Ok(out)
}

pub fn write_pdf<W: Write>(
    document: &Document,
    fonts: &FontRegistry,
    options: &PdfOptions,
    writer: &mut W,
) -> Result<(), DeckError> {
    let mut table = ObjectTable::default();
    let catalog_id = table.reserve();
    let pages_id = table.reserve();

    let usage = collect_font_usage(document, fonts);
    let font_map = build_font_objects(&mut table, &usage, fonts, options);
    let image_map = build_image_objects(&mut table, document)?;
    let gs_map = build_extgstate_objects(&mut table, document);

    let resources = resource_dict(&font_map, &image_map, &gs_map);
    let page_height = document.page_size.height;
    let mut kids = Vec::with_capacity(document.pages.len());
    for page in &document.pages {
        let content = render_page(page, page_height, &font_map, &image_map, &gs_map, &usage);
        let content_id = table.push(stream_object("", content.as_bytes(), options.compress));
        let page_id = table.push(
            format!(
                "<< /Type /Page /Parent {} 0 R /MediaBox {} /Resources {} /Contents {} 0 R >>",
                pages_id,
                media_box(document.page_size),
                resources,
                content_id
            )
            .into_bytes(),
        );
        kids.push(page_id);
    }

    let kids_ref = kids
        .iter()
        .map(|id| format!("{} 0 R", id))
        .collect::<Vec<_>>()
        .join(" ");
    table.set(
        pages_id,
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids_ref,
            kids.len()
        )
        .into_bytes(),
    );
    table.set(
        catalog_id,
        format!("<< /Type /Catalog /Pages {} 0 R >>", pages_id).into_bytes(),
    );
    let info_id = table.push(info_object(options.title.as_deref()).into_bytes());

    log::info!(
        "writing pdf: {} page(s), {} font(s), {} image(s)",
        kids.len(),
        font_map.len(),
        image_map.len()
    );
    table.write(writer, catalog_id, info_id)?;
    Ok(())
}

/// Objects are numbered from 1 in insertion order; reserved slots are
/// filled in once their contents are known.
#[derive(Default)]
struct ObjectTable {
    objects: Vec<Option<Vec<u8>>>,
}

impl ObjectTable {
    fn reserve(&mut self) -> usize {
        self.objects.push(None);
        self.objects.len()
    }

    fn push(&mut self, body: Vec<u8>) -> usize {
        self.objects.push(Some(body));
        self.objects.len()
    }

    fn set(&mut self, id: usize, body: Vec<u8>) {
        if let Some(slot) = self.objects.get_mut(id - 1) {
            *slot = Some(body);
        }
    }

    fn write<W: Write>(&self, writer: &mut W, catalog_id: usize, info_id: usize) -> io::Result<()> {
        let mut offset = 0usize;
        write_bytes(writer, b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n", &mut offset)?;
        let mut offsets = Vec::with_capacity(self.objects.len());
        for (index, body) in self.objects.iter().enumerate() {
            offsets.push(offset);
            write_bytes(writer, format!("{} 0 obj\n", index + 1).as_bytes(), &mut offset)?;
            write_bytes(writer, body.as_deref().unwrap_or(b"null"), &mut offset)?;
            write_bytes(writer, b"\nendobj\n", &mut offset)?;
        }

        let xref_start = offset;
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", self.objects.len() + 1);
        for entry in offsets {
            xref.push_str(&format!("{:010} 00000 n \n", entry));
        }
        xref.push_str(&format!(
            "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            self.objects.len() + 1,
            catalog_id,
            info_id,
            xref_start
        ));
        write_bytes(writer, xref.as_bytes(), &mut offset)
    }
}

fn write_bytes<W: Write>(writer: &mut W, data: &[u8], offset: &mut usize) -> io::Result<()> {
    writer.write_all(data)?;
    *offset += data.len();
    Ok(())
}

fn stream_object(extra: &str, data: &[u8], compress: bool) -> Vec<u8> {
    let (payload, filter) = if compress {
        (flate_compress(data), " /Filter /FlateDecode")
    } else {
        (data.to_vec(), "")
    };
    let mut out = format!(
        "<< /Length {}{}{} >>\nstream\n",
        payload.len(),
        filter,
        extra
    )
    .into_bytes();
    out.extend_from_slice(&payload);
    out.extend_from_slice(b"\nendstream");
    out
}

fn flate_compress(data: &[u8]) -> Vec<u8> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Fonts

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FontEncoding {
    WinAnsi,
    IdentityH,
}

#[derive(Debug, Clone)]
struct FontResource {
    resource: String,
    encoding: FontEncoding,
    id: usize,
}

/// A named page resource and the object it points at.
#[derive(Debug, Clone)]
struct NamedObject {
    name: String,
    id: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ShapedGlyph {
    gid: u16,
    // Offsets and advance corrections in 1/1000 em.
    x_offset: i32,
    adjust: i32,
}

/// Fonts referenced by the document, the glyphs each one needs, and the
/// shaped glyph runs of every string drawn with a registered face.
#[derive(Default)]
struct FontUsage {
    names: BTreeSet<String>,
    glyph_maps: HashMap<String, BTreeMap<u16, String>>,
    runs: HashMap<(String, String), Vec<ShapedGlyph>>,
}

fn collect_font_usage(document: &Document, fonts: &FontRegistry) -> FontUsage {
    let mut usage = FontUsage::default();
    for page in &document.pages {
        let mut state = FontTracker::default();
        for command in &page.commands {
            state.apply(command);
            let Command::DrawString { text, .. } = command else {
                continue;
            };
            usage.names.insert(state.name.clone());
            let Some(font) = fonts.resolve(&state.name) else {
                continue;
            };
            let key = (state.name.clone(), text.clone());
            if usage.runs.contains_key(&key) {
                continue;
            }
            let glyph_map = usage.glyph_maps.entry(state.name.clone()).or_default();
            let run = shape_run(font, fonts, &state.name, text, glyph_map);
            usage.runs.insert(key, run);
        }
    }
    usage
}

/// Current font name and size, following q/Q nesting.
#[derive(Clone)]
struct FontTracker {
    name: String,
    size: Length,
    stack: Vec<(String, Length)>,
}

impl Default for FontTracker {
    fn default() -> Self {
        Self {
            name: "Helvetica".to_string(),
            size: Length::from_f32(12.0),
            stack: Vec::new(),
        }
    }
}

impl FontTracker {
    fn apply(&mut self, command: &Command) {
        match command {
            Command::SaveState => self.stack.push((self.name.clone(), self.size)),
            Command::RestoreState => {
                if let Some((name, size)) = self.stack.pop() {
                    self.name = name;
                    self.size = size;
                }
            }
            Command::SetFontName(name) => self.name = name.clone(),
            Command::SetFontSize(size) => self.size = *size,
            _ => {}
        }
    }
}

fn shape_run(
    font: &RegisteredFont,
    fonts: &FontRegistry,
    font_name: &str,
    text: &str,
    glyph_map: &mut BTreeMap<u16, String>,
) -> Vec<ShapedGlyph> {
    let Some(face) = HbFace::from_slice(&font.data, 0) else {
        return Vec::new();
    };
    let scale = 1000.0 / face.units_per_em().max(1) as f32;
    let mut buffer = UnicodeBuffer::new();
    buffer.set_direction(detect_direction(text));
    buffer.push_str(text);
    let output = rustybuzz::shape(&face, &[], buffer);
    let infos = output.glyph_infos();
    let positions = output.glyph_positions();

    let mut clusters: Vec<usize> = infos.iter().map(|g| g.cluster as usize).collect();
    clusters.push(text.len());
    let mut run = Vec::with_capacity(infos.len());
    for (index, (info, pos)) in infos.iter().zip(positions).enumerate() {
        let gid = info.glyph_id as u16;
        if gid == 0 {
            continue;
        }
        let start = clusters[index].min(text.len());
        let end = clusters[index + 1].min(text.len());
        if start < end {
            if let Some(source) = text.get(start..end) {
                glyph_map.entry(gid).or_insert_with(|| source.to_string());
            }
        }
        let nominal = fonts.glyph_advance(font_name, gid) as i32;
        let shaped = (pos.x_advance as f32 * scale).round() as i32;
        run.push(ShapedGlyph {
            gid,
            x_offset: (pos.x_offset as f32 * scale).round() as i32,
            adjust: nominal - shaped,
        });
    }
    run
}

fn build_font_objects(
    table: &mut ObjectTable,
    usage: &FontUsage,
    fonts: &FontRegistry,
    options: &PdfOptions,
) -> BTreeMap<String, FontResource> {
    let mut map = BTreeMap::new();
    for (index, name) in usage.names.iter().enumerate() {
        let resource = format!("F{}", index + 1);
        let (id, encoding) = match fonts.resolve(name) {
            Some(font) => {
                let empty = BTreeMap::new();
                let glyph_map = usage.glyph_maps.get(name).unwrap_or(&empty);
                let id = build_cidfont_objects(table, font, fonts, glyph_map, options);
                (id, FontEncoding::IdentityH)
            }
            None => {
                log::debug!("font \"{}\" is not registered; using {}", name, base14_for(name));
                let id = table.push(base14_font_object(name).into_bytes());
                (id, FontEncoding::WinAnsi)
            }
        };
        map.insert(
            name.clone(),
            FontResource {
                resource,
                encoding,
                id,
            },
        );
    }
    map
}

fn build_cidfont_objects(
    table: &mut ObjectTable,
    font: &RegisteredFont,
    fonts: &FontRegistry,
    glyph_map: &BTreeMap<u16, String>,
    options: &PdfOptions,
) -> usize {
    let base = sanitize_font_name(&font.name);
    let (file_key, extra, cid_subtype, cid_to_gid) = match font.program_kind {
        FontProgramKind::TrueType => (
            "FontFile2",
            format!(" /Length1 {}", font.data.len()),
            "CIDFontType2",
            " /CIDToGIDMap /Identity",
        ),
        FontProgramKind::OpenTypeCff => ("FontFile3", " /Subtype /OpenType".to_string(), "CIDFontType0", ""),
    };
    let file_id = table.push(stream_object(&extra, &font.data, options.compress));
    let descriptor_id = table.push(font_descriptor_object(font, file_key, file_id).into_bytes());

    let widths = glyph_map
        .keys()
        .map(|gid| {
            let advance = fonts.glyph_advance(&font.name, *gid);
            let width = if advance > 0 {
                advance
            } else {
                font.metrics.missing_width
            };
            format!("{} [{}]", gid, width)
        })
        .collect::<Vec<_>>();
    let w_array = if widths.is_empty() {
        String::new()
    } else {
        format!(" /W [{}]", widths.join(" "))
    };
    let cid_font_id = table.push(
        format!(
            "<< /Type /Font /Subtype /{} /BaseFont /{} /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> /FontDescriptor {} 0 R /DW {}{}{} >>",
            cid_subtype, base, descriptor_id, font.metrics.missing_width, w_array, cid_to_gid
        )
        .into_bytes(),
    );
    let to_unicode_id = table.push(stream_object(
        "",
        to_unicode_cmap(glyph_map).as_bytes(),
        options.compress,
    ));
    table.push(
        format!(
            "<< /Type /Font /Subtype /Type0 /BaseFont /{} /Encoding /Identity-H /DescendantFonts [{} 0 R] /ToUnicode {} 0 R >>",
            base, cid_font_id, to_unicode_id
        )
        .into_bytes(),
    )
}

fn font_descriptor_object(font: &RegisteredFont, file_key: &str, file_id: usize) -> String {
    let metrics = &font.metrics;
    let mut flags = 32;
    if metrics.is_fixed_pitch {
        flags |= 1;
    }
    format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags {} /FontBBox [{} {} {} {}] /ItalicAngle {} /Ascent {} /Descent {} /CapHeight {} /StemV {} /MissingWidth {} /{} {} 0 R >>",
        sanitize_font_name(&font.name),
        flags,
        metrics.bbox.0,
        metrics.bbox.1,
        metrics.bbox.2,
        metrics.bbox.3,
        metrics.italic_angle,
        metrics.ascent,
        metrics.descent,
        metrics.cap_height,
        metrics.stem_v,
        metrics.missing_width,
        file_key,
        file_id
    )
}

/// Base-14 stand-in for a family with no registered face.
fn base14_for(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.contains("bold") || lower.contains("black") {
        "Helvetica-Bold"
    } else if (lower.contains("serif") && !lower.contains("sans")) || lower.contains("times") {
        "Times-Roman"
    } else if lower.contains("courier") || lower.contains("mono") {
        "Courier"
    } else {
        "Helvetica"
    }
}

fn base14_font_object(name: &str) -> String {
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
        base14_for(name)
    )
}

fn sanitize_font_name(name: &str) -> String {
    let mut out = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else if ch == ' ' {
            out.push('-');
        }
    }
    if out.is_empty() {
        "Unnamed".to_string()
    } else {
        out
    }
}

fn to_unicode_cmap(glyph_map: &BTreeMap<u16, String>) -> String {
    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    let entries: Vec<(&u16, &String)> = glyph_map.iter().collect();
    for chunk in entries.chunks(100) {
        out.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, text) in chunk {
            let mut units = String::new();
            for unit in text.encode_utf16() {
                units.push_str(&format!("{:04X}", unit));
            }
            out.push_str(&format!("<{:04X}> <{}>\n", gid, units));
        }
        out.push_str("endbfchar\n");
    }

    out.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    out
}

// ---------------------------------------------------------------------------
// Images

struct ImageData {
    width: u32,
    height: u32,
    color_space: &'static str,
    filter: ImageFilter,
    data: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ImageFilter {
    Dct,
    Raw,
}

fn build_image_objects(
    table: &mut ObjectTable,
    document: &Document,
) -> Result<BTreeMap<String, NamedObject>, DeckError> {
    let mut sources = BTreeSet::new();
    for page in &document.pages {
        for command in &page.commands {
            if let Command::DrawImage { resource_id, .. } = command {
                sources.insert(resource_id.clone());
            }
        }
    }

    let mut map = BTreeMap::new();
    for (index, source) in sources.iter().enumerate() {
        let bytes = load_image_source(source)?;
        let image = decode_image_bytes(&bytes)
            .ok_or_else(|| DeckError::Asset(format!("cannot decode image {}", preview(source))))?;
        let smask_id = image.alpha.as_ref().map(|alpha| {
            let extra = format!(
                " /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8",
                image.width, image.height
            );
            table.push(stream_object(&extra, alpha, true))
        });
        let id = table.push(image_object(&image, smask_id));
        log::debug!("embedded image {} as object {}", preview(source), id);
        map.insert(
            source.clone(),
            NamedObject {
                name: format!("Im{}", index + 1),
                id,
            },
        );
    }
    Ok(map)
}

fn decode_image_bytes(data: &[u8]) -> Option<ImageData> {
    let format = image::guess_format(data).ok()?;
    let decoded = image::load_from_memory(data).ok()?;
    let (width, height) = decoded.dimensions();

    if format == image::ImageFormat::Jpeg {
        let color_space = match decoded.color() {
            image::ColorType::L8 | image::ColorType::La8 => "/DeviceGray",
            _ => "/DeviceRGB",
        };
        return Some(ImageData {
            width,
            height,
            color_space,
            filter: ImageFilter::Dct,
            data: data.to_vec(),
            alpha: None,
        });
    }

    let rgba = decoded.to_rgba8();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        has_alpha |= a != 255;
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }
    Some(ImageData {
        width,
        height,
        color_space: "/DeviceRGB",
        filter: ImageFilter::Raw,
        data: rgb,
        alpha: has_alpha.then_some(alpha),
    })
}

fn image_object(image: &ImageData, smask_id: Option<usize>) -> Vec<u8> {
    let smask = smask_id
        .map(|id| format!(" /SMask {} 0 R", id))
        .unwrap_or_default();
    let extra = format!(
        " /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} /BitsPerComponent 8{}",
        image.width, image.height, image.color_space, smask
    );
    match image.filter {
        ImageFilter::Dct => {
            let mut out = format!(
                "<< /Length {} /Filter /DCTDecode{} >>\nstream\n",
                image.data.len(),
                extra
            )
            .into_bytes();
            out.extend_from_slice(&image.data);
            out.extend_from_slice(b"\nendstream");
            out
        }
        // Pixel data is always deflated.
        ImageFilter::Raw => stream_object(&extra, &image.data, true),
    }
}

fn preview(source: &str) -> String {
    if source.starts_with("data:") {
        let head: String = source.chars().take(32).collect();
        format!("{head}...")
    } else {
        source.to_string()
    }
}

// ---------------------------------------------------------------------------
// Transparency

type OpacityKey = (u16, u16);

fn opacity_key(fill: f32, stroke: f32) -> OpacityKey {
    let quantize = |value: f32| (clamp_unit(value) * 1000.0).round() as u16;
    (quantize(fill), quantize(stroke))
}

fn build_extgstate_objects(
    table: &mut ObjectTable,
    document: &Document,
) -> BTreeMap<OpacityKey, NamedObject> {
    let mut keys = BTreeSet::new();
    for page in &document.pages {
        for command in &page.commands {
            if let Command::SetOpacity { fill, stroke } = command {
                keys.insert(opacity_key(*fill, *stroke));
            }
        }
    }
    let mut map = BTreeMap::new();
    for (index, key) in keys.into_iter().enumerate() {
        let id = table.push(
            format!(
                "<< /Type /ExtGState /ca {} /CA {} >>",
                format_milli(key.0 as i64),
                format_milli(key.1 as i64)
            )
            .into_bytes(),
        );
        map.insert(
            key,
            NamedObject {
                name: format!("GS{}", index + 1),
                id,
            },
        );
    }
    map
}

// ---------------------------------------------------------------------------
// Page content

fn resource_dict(
    fonts: &BTreeMap<String, FontResource>,
    images: &BTreeMap<String, NamedObject>,
    states: &BTreeMap<OpacityKey, NamedObject>,
) -> String {
    let entries = |items: Vec<(&str, usize)>| {
        items
            .iter()
            .map(|(name, id)| format!("/{} {} 0 R", name, id))
            .collect::<Vec<_>>()
            .join(" ")
    };
    let mut out = String::from("<<");
    if !fonts.is_empty() {
        let items = fonts.values().map(|f| (f.resource.as_str(), f.id)).collect();
        out.push_str(&format!(" /Font << {} >>", entries(items)));
    }
    if !images.is_empty() {
        let items = images.values().map(|i| (i.name.as_str(), i.id)).collect();
        out.push_str(&format!(" /XObject << {} >>", entries(items)));
    }
    if !states.is_empty() {
        let items = states.values().map(|g| (g.name.as_str(), g.id)).collect();
        out.push_str(&format!(" /ExtGState << {} >>", entries(items)));
    }
    out.push_str(" >>");
    out
}

fn media_box(size: Size) -> String {
    format!("[0 0 {} {}]", fmt_len(size.width), fmt_len(size.height))
}

fn render_page(
    page: &Page,
    page_height: Length,
    font_map: &BTreeMap<String, FontResource>,
    image_map: &BTreeMap<String, NamedObject>,
    gs_map: &BTreeMap<OpacityKey, NamedObject>,
    usage: &FontUsage,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("1 0 0 -1 0 {} cm\n", fmt_len(page_height)));
    let mut fonts = FontTracker::default();

    for command in &page.commands {
        fonts.apply(command);
        match command {
            Command::SaveState => out.push_str("q\n"),
            Command::RestoreState => out.push_str("Q\n"),
            Command::Translate(x, y) => {
                out.push_str(&format!("1 0 0 1 {} {} cm\n", fmt_len(*x), fmt_len(*y)));
            }
            Command::Scale(x, y) => {
                out.push_str(&format!("{} 0 0 {} 0 0 cm\n", fmt_coeff(*x), fmt_coeff(*y)));
            }
            Command::Rotate(angle) => {
                let (sin, cos) = (libm::sinf(*angle), libm::cosf(*angle));
                out.push_str(&format!(
                    "{} {} {} {} 0 0 cm\n",
                    fmt_coeff(cos),
                    fmt_coeff(sin),
                    fmt_coeff(-sin),
                    fmt_coeff(cos)
                ));
            }
            Command::SetFillColor(color) => out.push_str(&color_op(*color, "rg")),
            Command::SetStrokeColor(color) => out.push_str(&color_op(*color, "RG")),
            Command::SetLineWidth(width) => out.push_str(&format!("{} w\n", fmt_len(*width))),
            Command::SetLineCap(cap) => out.push_str(&format!("{} J\n", cap)),
            Command::SetLineJoin(join) => out.push_str(&format!("{} j\n", join)),
            Command::SetMiterLimit(limit) => out.push_str(&format!("{} M\n", fmt_len(*limit))),
            Command::SetDash { pattern, phase } => {
                let items = pattern
                    .iter()
                    .map(|v| fmt_len(*v))
                    .collect::<Vec<_>>()
                    .join(" ");
                out.push_str(&format!("[{}] {} d\n", items, fmt_len(*phase)));
            }
            Command::SetOpacity { fill, stroke } => {
                if let Some(state) = gs_map.get(&opacity_key(*fill, *stroke)) {
                    out.push_str(&format!("/{} gs\n", state.name));
                }
            }
            Command::SetFontName(_) | Command::SetFontSize(_) => {}
            Command::MoveTo { x, y } => {
                out.push_str(&format!("{} {} m\n", fmt_len(*x), fmt_len(*y)));
            }
            Command::LineTo { x, y } => {
                out.push_str(&format!("{} {} l\n", fmt_len(*x), fmt_len(*y)));
            }
            Command::CurveTo {
                x1,
                y1,
                x2,
                y2,
                x,
                y,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} {} {} c\n",
                    fmt_len(*x1),
                    fmt_len(*y1),
                    fmt_len(*x2),
                    fmt_len(*y2),
                    fmt_len(*x),
                    fmt_len(*y)
                ));
            }
            Command::ClosePath => out.push_str("h\n"),
            Command::Fill => out.push_str("f\n"),
            Command::FillEvenOdd => out.push_str("f*\n"),
            Command::Stroke => out.push_str("S\n"),
            Command::FillStroke => out.push_str("B\n"),
            Command::FillStrokeEvenOdd => out.push_str("B*\n"),
            Command::DrawString { x, y, text } => {
                let Some(font) = font_map.get(&fonts.name) else {
                    continue;
                };
                out.push_str("BT\n");
                out.push_str(&format!("/{} {} Tf\n", font.resource, fmt_len(fonts.size)));
                // Flip the text space back upright inside the y-down page.
                out.push_str(&format!("1 0 0 -1 {} {} Tm\n", fmt_len(*x), fmt_len(*y)));
                match font.encoding {
                    FontEncoding::WinAnsi => {
                        out.push_str(&format!("({}) Tj\n", encode_winansi(text)));
                    }
                    FontEncoding::IdentityH => {
                        let run = usage.runs.get(&(fonts.name.clone(), text.clone()));
                        out.push_str(&tj_array(run.map(Vec::as_slice).unwrap_or(&[])));
                    }
                }
                out.push_str("ET\n");
            }
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} re\nf\n",
                    fmt_len(*x),
                    fmt_len(*y),
                    fmt_len(*width),
                    fmt_len(*height)
                ));
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                if let Some(image) = image_map.get(resource_id) {
                    // Image space is y-up; map its unit square onto the box with the top row first.
                    out.push_str(&format!(
                        "q\n{} 0 0 {} {} {} cm\n/{} Do\nQ\n",
                        fmt_len(*width),
                        fmt_len(-*height),
                        fmt_len(*x),
                        fmt_len(*y + *height),
                        image.name
                    ));
                }
            }
        }
    }
    out
}

fn tj_array(run: &[ShapedGlyph]) -> String {
    if run.is_empty() {
        return "<> Tj\n".to_string();
    }
    let mut parts = Vec::with_capacity(run.len() * 2);
    for glyph in run {
        if glyph.x_offset != 0 {
            parts.push(format!("{}", -glyph.x_offset));
        }
        parts.push(format!("<{:04X}>", glyph.gid));
        if glyph.adjust != 0 {
            parts.push(format!("{}", glyph.adjust));
        }
    }
    format!("[{}] TJ\n", parts.join(" "))
}

fn info_object(title: Option<&str>) -> String {
    let mut entries = vec![format!("/Producer ({})", PRODUCER)];
    if let Some(title) = title {
        entries.push(format!("/Title ({})", escape_pdf_string(title)));
    }
    format!("<< {} >>", entries.join(" "))
}

fn escape_pdf_string(input: &str) -> String {
    if !input.is_ascii() {
        // UTF-16BE with BOM for non-ASCII text strings.
        let mut out = String::from("\\376\\377");
        for unit in input.encode_utf16() {
            for byte in unit.to_be_bytes() {
                out.push_str(&escape_byte(byte));
            }
        }
        return out;
    }
    input.bytes().map(escape_byte).collect()
}

fn escape_byte(byte: u8) -> String {
    match byte {
        b'\\' => "\\\\".to_string(),
        b'(' => "\\(".to_string(),
        b')' => "\\)".to_string(),
        b if !(0x20..0x7f).contains(&b) => format!("\\{:03o}", b),
        b => (b as char).to_string(),
    }
}

fn encode_winansi(input: &str) -> String {
    input.chars().map(|ch| escape_byte(winansi_byte(ch))).collect()
}

fn winansi_byte(ch: char) -> u8 {
    match ch {
        '\u{0000}'..='\u{007F}' | '\u{00A0}'..='\u{00FF}' => ch as u8,
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => b'?',
    }
}

fn color_op(color: Color, op: &str) -> String {
    format!(
        "{} {} {} {}\n",
        fmt_coeff(clamp_unit(color.r)),
        fmt_coeff(clamp_unit(color.g)),
        fmt_coeff(clamp_unit(color.b)),
        op
    )
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

fn fmt_len(value: Length) -> String {
    format_milli(value.to_milli_i64())
}

// Matrix coefficients and color components need more than milli precision.
fn fmt_coeff(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let mut s = format!("{:.6}", value);
    while s.ends_with('0') {
        s.pop();
    }
    if s.ends_with('.') {
        s.pop();
    }
    if s == "-0" { "0".to_string() } else { s }
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use std::io::Read;

    fn plain() -> PdfOptions {
        PdfOptions {
            compress: false,
            title: Some("Fluxx (test)".to_string()),
        }
    }

    fn render(canvas: Canvas) -> String {
        let bytes = document_to_pdf(&canvas.finish(), &FontRegistry::new(), &plain()).unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn page() -> Canvas {
        Canvas::new(Size::new(200.0, 100.0))
    }

    #[test]
    fn content_starts_in_a_flipped_user_space() {
        let mut canvas = page();
        canvas.draw_rect(
            Length::from_f32(10.0),
            Length::from_f32(20.0),
            Length::from_f32(30.0),
            Length::from_f32(5.5),
        );
        let pdf = render(canvas);
        assert!(pdf.starts_with("%PDF-1.7"));
        assert!(pdf.contains("stream\n1 0 0 -1 0 100 cm\n10 20 30 5.5 re\nf\n"));
        assert!(pdf.contains("/MediaBox [0 0 200 100]"));
        assert!(pdf.contains("/Title (Fluxx \\(test\\))"));
    }

    #[test]
    fn unregistered_families_use_base14_fonts() {
        let mut canvas = page();
        canvas.set_font_name("Serif");
        canvas.set_font_size(Length::from_f32(6.5));
        canvas.draw_string(Length::from_f32(1.0), Length::from_f32(2.0), "Prenu (1)");
        let pdf = render(canvas);
        assert!(pdf.contains("/BaseFont /Times-Roman /Encoding /WinAnsiEncoding"));
        assert!(pdf.contains("BT\n/F1 6.5 Tf\n1 0 0 -1 1 2 Tm\n(Prenu \\(1\\)) Tj\nET\n"));
    }

    #[test]
    fn base14_mapping() {
        assert_eq!(base14_for("Arial Black"), "Helvetica-Bold");
        assert_eq!(base14_for("Serif"), "Times-Roman");
        assert_eq!(base14_for("Sans"), "Helvetica");
        assert_eq!(base14_for("DejaVu Sans Mono"), "Courier");
    }

    #[test]
    fn font_changes_are_scoped_by_save_and_restore() {
        let mut canvas = page();
        canvas.save_state();
        canvas.set_font_name("Serif");
        canvas.draw_string(Length::ZERO, Length::ZERO, "a");
        canvas.restore_state();
        canvas.draw_string(Length::ZERO, Length::ZERO, "b");
        let pdf = render(canvas);
        let serif = pdf.find("/F2 12 Tf").unwrap();
        let helvetica = pdf.find("/F1 12 Tf").unwrap();
        assert!(serif < helvetica);
        assert!(pdf.contains("/Font << /F1 "));
    }

    #[test]
    fn winansi_escapes_latin1_and_replaces_the_rest() {
        assert_eq!(encode_winansi("é"), "\\351");
        assert_eq!(encode_winansi("ĉevalo"), "?evalo");
        assert_eq!(encode_winansi("a\\b"), "a\\\\b");
    }

    #[test]
    fn opacity_becomes_an_extgstate() {
        let mut canvas = page();
        canvas.set_opacity(0.7, 0.7);
        canvas.draw_rect(Length::ZERO, Length::ZERO, Length::from_i32(1), Length::from_i32(1));
        let pdf = render(canvas);
        assert!(pdf.contains("<< /Type /ExtGState /ca 0.7 /CA 0.7 >>"));
        assert!(pdf.contains("/GS1 gs\n"));
        assert!(pdf.contains("/ExtGState << /GS1 "));
    }

    #[test]
    fn rotation_keeps_fine_coefficients() {
        let mut canvas = page();
        canvas.rotate(0.001);
        let pdf = render(canvas);
        assert!(pdf.contains("0.999999 0.001 -0.001 0.999999 0 0 cm") || pdf.contains("1 0.001 -0.001 1 0 0 cm"));
    }

    #[test]
    fn translucent_png_is_embedded_with_a_soft_mask() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dot.png");
        let mut img = image::RgbaImage::new(2, 3);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 128]));
        img.save(&path).unwrap();

        let mut canvas = page();
        canvas.draw_image(
            Length::from_f32(5.0),
            Length::from_f32(10.0),
            Length::from_f32(20.0),
            Length::from_f32(30.0),
            path.to_string_lossy(),
        );
        let pdf = render(canvas);
        assert!(pdf.contains("/Subtype /Image /Width 2 /Height 3 /ColorSpace /DeviceRGB"));
        assert!(pdf.contains("/SMask "));
        assert!(pdf.contains("q\n20 0 0 -30 5 40 cm\n/Im1 Do\nQ\n"));
    }

    #[test]
    fn missing_image_is_an_unresolved_reference() {
        let mut canvas = page();
        canvas.draw_image(
            Length::ZERO,
            Length::ZERO,
            Length::from_i32(1),
            Length::from_i32(1),
            "/nonexistent/deckpress/missing.png",
        );
        let result = document_to_pdf(&canvas.finish(), &FontRegistry::new(), &plain());
        assert!(matches!(
            result,
            Err(DeckError::UnresolvedReference { kind: "image", .. })
        ));
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let mut canvas = page();
        canvas.draw_rect(Length::ZERO, Length::ZERO, Length::from_i32(1), Length::from_i32(1));
        canvas.show_page();
        canvas.draw_rect(Length::ZERO, Length::ZERO, Length::from_i32(2), Length::from_i32(2));
        let bytes = document_to_pdf(&canvas.finish(), &FontRegistry::new(), &PdfOptions::default()).unwrap();
        let text = String::from_utf8_lossy(&bytes).into_owned();
        assert!(text.contains("/Count 2"));

        let start: usize = text
            .rsplit("startxref\n")
            .next()
            .and_then(|tail| tail.lines().next())
            .and_then(|line| line.parse().ok())
            .unwrap();
        assert!(bytes[start..].starts_with(b"xref"));
        let xref = &text[start..];
        for (index, line) in xref.lines().skip(3).take_while(|l| l.ends_with(" n ")).enumerate() {
            let offset: usize = line[..10].parse().unwrap();
            let header = format!("{} 0 obj", index + 1);
            assert!(bytes[offset..].starts_with(header.as_bytes()));
        }
    }

    #[test]
    fn compressed_content_inflates_to_the_page_program() {
        let mut canvas = page();
        canvas.draw_rect(Length::ZERO, Length::ZERO, Length::from_i32(1), Length::from_i32(1));
        let bytes = document_to_pdf(&canvas.finish(), &FontRegistry::new(), &PdfOptions::default()).unwrap();
        let marker = b"/Filter /FlateDecode >>\nstream\n";
        let start = bytes
            .windows(marker.len())
            .position(|w| w == marker)
            .unwrap()
            + marker.len();
        let mut decoder = flate2::read::ZlibDecoder::new(&bytes[start..]);
        let mut content = String::new();
        decoder.read_to_string(&mut content).unwrap();
        assert!(content.starts_with("1 0 0 -1 0 100 cm\n"));
    }
}
