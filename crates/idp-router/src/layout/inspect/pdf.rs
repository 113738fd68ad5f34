//! PDF inspection with `lopdf`.
//!
//! Each page's content stream is replayed with a minimal graphics state (the
//! current transformation matrix and text scale) to estimate how much of the
//! page is covered by text, placed images and ruled table regions. Form
//! widgets are read from the page's `/Annots`.
//!
//! Coverage is approximate: text runs are sized from their glyph count and
//! font size rather than from font metrics.
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::Result;
use crate::types::PageMetrics;

/// US Letter, used when a page has no usable `/MediaBox`.
const DEFAULT_PAGE_SIZE: (f64, f64) = (612.0, 792.0);
/// Average glyph advance as a fraction of the font size.
const GLYPH_WIDTH_EM: f64 = 0.5;
/// Line box height as a multiple of the font size.
const LINE_HEIGHT_EM: f64 = 1.2;
/// A stroked or filled path needs this many rectangles to count as a table grid.
const TABLE_MIN_RECTANGLES: usize = 4;
/// ... or this many line segments.
const TABLE_MIN_SEGMENTS: usize = 6;
/// Bound on `/Parent` traversal for inherited attributes.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// Button field flag bits (PDF 32000-1, table 226).
const FF_RADIO: i64 = 1 << 15;
const FF_PUSHBUTTON: i64 = 1 << 16;

type Matrix = [f64; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

fn multiply(m: &Matrix, ctm: &Matrix) -> Matrix {
    [
        m[0] * ctm[0] + m[1] * ctm[2],
        m[0] * ctm[1] + m[1] * ctm[3],
        m[2] * ctm[0] + m[3] * ctm[2],
        m[2] * ctm[1] + m[3] * ctm[3],
        m[4] * ctm[0] + m[5] * ctm[2] + ctm[4],
        m[4] * ctm[1] + m[5] * ctm[3] + ctm[5],
    ]
}

fn transform(ctm: &Matrix, x: f64, y: f64) -> (f64, f64) {
    (ctm[0] * x + ctm[2] * y + ctm[4], ctm[1] * x + ctm[3] * y + ctm[5])
}

fn determinant(m: &Matrix) -> f64 {
    (m[0] * m[3] - m[1] * m[2]).abs()
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

fn numbers(operands: &[Object]) -> Option<Vec<f64>> {
    operands.iter().map(number).collect()
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, object)? {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

/// Look up a key on a dictionary or, failing that, on its `/Parent` chain.
fn inherited<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut current = dict;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(value) = current.get(key) {
            return resolve(doc, value);
        }
        current = current.get(b"Parent").ok().and_then(|parent| resolve_dict(doc, parent))?;
    }
    None
}

fn page_area(doc: &Document, page: &Dictionary) -> f64 {
    let (default_w, default_h) = DEFAULT_PAGE_SIZE;
    let media_box = inherited(doc, page, b"MediaBox")
        .and_then(|object| object.as_array().ok())
        .and_then(|values| numbers(values))
        .filter(|values| values.len() == 4);

    let (width, height) = match media_box {
        Some(values) => ((values[2] - values[0]).abs(), (values[3] - values[1]).abs()),
        None => (default_w, default_h),
    };
    let area = width * height;
    if area > 1.0 { area } else { default_w * default_h }
}

fn string_len(object: &Object) -> usize {
    match object {
        Object::String(bytes, _) => bytes.len(),
        Object::Array(items) => items.iter().map(string_len).sum(),
        _ => 0,
    }
}

fn xobject_is_image(doc: &Document, resources: Option<&Dictionary>, name: &[u8]) -> bool {
    let subtype = resources
        .and_then(|resources| resources.get(b"XObject").ok())
        .and_then(|xobjects| resolve_dict(doc, xobjects))
        .and_then(|xobjects| xobjects.get(name).ok())
        .and_then(|xobject| resolve_dict(doc, xobject))
        .and_then(|xobject| xobject.get(b"Subtype").ok())
        .and_then(|subtype| subtype.as_name().ok());

    match subtype {
        Some(subtype) => subtype == b"Image",
        None => true,
    }
}

/// Bounding box of the path under construction, in page space.
#[derive(Debug, Default)]
struct PathRun {
    rectangles: usize,
    segments: usize,
    min: (f64, f64),
    max: (f64, f64),
    has_points: bool,
}

impl PathRun {
    fn include(&mut self, (x, y): (f64, f64)) {
        if self.has_points {
            self.min = (self.min.0.min(x), self.min.1.min(y));
            self.max = (self.max.0.max(x), self.max.1.max(y));
        } else {
            self.min = (x, y);
            self.max = (x, y);
            self.has_points = true;
        }
    }

    fn is_table(&self) -> bool {
        self.rectangles >= TABLE_MIN_RECTANGLES || self.segments >= TABLE_MIN_SEGMENTS
    }

    fn area(&self) -> f64 {
        (self.max.0 - self.min.0) * (self.max.1 - self.min.1)
    }
}

#[derive(Debug, Default)]
struct PageTally {
    chars: u64,
    text_area: f64,
    images: u32,
    image_area: f64,
    tables: u32,
    table_area: f64,
}

fn tally_content(doc: &Document, resources: Option<&Dictionary>, content: &Content) -> PageTally {
    let mut tally = PageTally::default();
    let mut ctm = IDENTITY;
    let mut stack: Vec<Matrix> = Vec::new();
    let mut font_size = 12.0;
    let mut text_scale = 1.0;
    let mut path = PathRun::default();

    for op in &content.operations {
        let operands = op.operands.as_slice();
        match op.operator.as_str() {
            "q" => stack.push(ctm),
            "Q" => ctm = stack.pop().unwrap_or(IDENTITY),
            "cm" => {
                if let Some(m) = numbers(operands).filter(|m| m.len() == 6) {
                    ctm = multiply(&[m[0], m[1], m[2], m[3], m[4], m[5]], &ctm);
                }
            }
            "BT" => text_scale = 1.0,
            "Tf" => {
                if let Some(size) = operands.get(1).and_then(number) {
                    font_size = size.abs();
                }
            }
            "Tm" => {
                if let Some(m) = numbers(operands).filter(|m| m.len() == 6) {
                    text_scale = (m[0] * m[3] - m[1] * m[2]).abs().sqrt();
                }
            }
            "Tj" | "TJ" | "'" | "\"" => {
                let glyphs = operands.last().map(string_len).unwrap_or(0);
                if glyphs > 0 {
                    let size = font_size * text_scale * determinant(&ctm).sqrt();
                    tally.chars += glyphs as u64;
                    tally.text_area += glyphs as f64 * GLYPH_WIDTH_EM * size * LINE_HEIGHT_EM * size;
                }
            }
            "Do" => {
                let is_image = operands
                    .first()
                    .and_then(|name| name.as_name().ok())
                    .map(|name| xobject_is_image(doc, resources, name))
                    .unwrap_or(false);
                if is_image {
                    tally.images += 1;
                    tally.image_area += determinant(&ctm);
                }
            }
            "BI" => {
                tally.images += 1;
                tally.image_area += determinant(&ctm);
            }
            "re" => {
                if let Some(r) = numbers(operands).filter(|r| r.len() == 4) {
                    path.rectangles += 1;
                    path.include(transform(&ctm, r[0], r[1]));
                    path.include(transform(&ctm, r[0] + r[2], r[1] + r[3]));
                }
            }
            "m" | "l" => {
                if let Some(p) = numbers(operands).filter(|p| p.len() == 2) {
                    if op.operator == "l" {
                        path.segments += 1;
                    }
                    path.include(transform(&ctm, p[0], p[1]));
                }
            }
            "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" | "n" => {
                if path.is_table() {
                    tally.tables += 1;
                    tally.table_area += path.area();
                }
                path = PathRun::default();
            }
            _ => {}
        }
    }

    tally
}

#[derive(Debug, Default, PartialEq, Eq)]
struct WidgetCounts {
    checkboxes: u32,
    radio_buttons: u32,
}

fn count_widgets(doc: &Document, page: &Dictionary) -> WidgetCounts {
    let mut counts = WidgetCounts::default();
    let annotations = page
        .get(b"Annots")
        .ok()
        .and_then(|annots| resolve(doc, annots))
        .and_then(|annots| annots.as_array().ok());

    for annotation in annotations.into_iter().flatten() {
        let Some(widget) = resolve_dict(doc, annotation) else {
            continue;
        };
        let is_widget = widget
            .get(b"Subtype")
            .ok()
            .and_then(|subtype| subtype.as_name().ok())
            .is_some_and(|subtype| subtype == b"Widget");
        let is_button = inherited(doc, widget, b"FT")
            .and_then(|field_type| field_type.as_name().ok())
            .is_some_and(|field_type| field_type == b"Btn");
        if !is_widget || !is_button {
            continue;
        }

        let flags = inherited(doc, widget, b"Ff")
            .and_then(|flags| flags.as_i64().ok())
            .unwrap_or(0);
        if flags & FF_PUSHBUTTON != 0 {
            continue;
        }
        if flags & FF_RADIO != 0 {
            counts.radio_buttons += 1;
        } else {
            counts.checkboxes += 1;
        }
    }

    counts
}

fn page_metrics(doc: &Document, index: u32, page_id: ObjectId) -> Result<PageMetrics> {
    let page = doc.get_dictionary(page_id)?;
    let area = page_area(doc, page);
    let resources = inherited(doc, page, b"Resources").and_then(|object| match object {
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    });

    let raw = doc.get_page_content(page_id)?;
    let content = Content::decode(&raw)?;
    let tally = tally_content(doc, resources, &content);
    let widgets = count_widgets(doc, page);

    Ok(PageMetrics::new(
        index,
        tally.text_area / area,
        tally.image_area / area,
        tally.table_area / area,
    )
    .with_char_count(tally.chars)
    .with_images(tally.images)
    .with_tables(tally.tables)
    .with_form_fields(widgets.checkboxes, widgets.radio_buttons))
}

/// Page metrics for every page of a PDF document.
pub fn pdf_page_metrics(data: &[u8]) -> Result<Vec<PageMetrics>> {
    let doc = Document::load_mem(data)?;
    doc.get_pages()
        .into_values()
        .enumerate()
        .map(|(index, page_id)| page_metrics(&doc, index as u32, page_id))
        .collect()
}
