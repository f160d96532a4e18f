use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::{Result, SectionsError};
use crate::source::{DocumentSource, Metadata, OutlineEntry, PageClip};

const MAX_OUTLINE_DEPTH: u32 = 64;
const MAX_NAME_TREE_DEPTH: usize = 32;
const DEFAULT_MEDIA_BOX: (f32, f32) = (0.0, 842.0);

const INFO_KEYS: [(&str, &[u8]); 9] = [
    ("title", b"Title"),
    ("author", b"Author"),
    ("subject", b"Subject"),
    ("keywords", b"Keywords"),
    ("creator", b"Creator"),
    ("producer", b"Producer"),
    ("creationDate", b"CreationDate"),
    ("modDate", b"ModDate"),
    ("trapped", b"Trapped"),
];

/// PDF document opened with lopdf.
pub struct PdfSource {
    path: PathBuf,
    document: Document,
    pages: Vec<(u32, ObjectId)>,
    clipped: Option<ClippedCopy>,
}

/// Copy of the document whose pages get their header/footer text removed on demand.
struct ClippedCopy {
    clip: PageClip,
    document: Document,
    rewritten: HashSet<u32>,
}

impl PdfSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SectionsError::NotFound(path.to_path_buf()));
        }
        let document = Document::load(path).map_err(|e| SectionsError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let pages = document.get_pages().into_iter().collect();
        Ok(Self {
            path: path.to_path_buf(),
            document,
            pages,
            clipped: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn page(&self, index: usize) -> Result<(u32, ObjectId)> {
        self.pages
            .get(index)
            .copied()
            .ok_or(SectionsError::PageOutOfRange {
                index,
                count: self.pages.len(),
            })
    }

    fn clipped_text(&mut self, index: usize, clip: PageClip) -> Result<String> {
        let (page_number, page_id) = self.page(index)?;
        let mut copy = match self.clipped.take() {
            Some(copy) if copy.clip == clip => copy,
            _ => ClippedCopy {
                clip,
                document: self.document.clone(),
                rewritten: HashSet::new(),
            },
        };
        if !copy.rewritten.contains(&page_number) {
            let media_box = media_box(&self.document, page_id);
            let content = Content::decode(&copy.document.get_page_content(page_id)?)?;
            let operations = clip_operations(content.operations, clip, media_box);
            let encoded = Content { operations }.encode()?;
            copy.document.change_page_content(page_id, encoded)?;
            copy.rewritten.insert(page_number);
        }
        let text = copy.document.extract_text(&[page_number]);
        self.clipped = Some(copy);
        Ok(text?)
    }
}

impl DocumentSource for PdfSource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&mut self, index: usize, clip: Option<PageClip>) -> Result<String> {
        match clip {
            Some(clip) => self.clipped_text(index, clip),
            None => {
                let (page_number, _) = self.page(index)?;
                Ok(self.document.extract_text(&[page_number])?)
            }
        }
    }

    fn table_of_contents(&mut self) -> Result<Vec<OutlineEntry>> {
        let page_numbers = self
            .pages
            .iter()
            .map(|(number, id)| (*id, *number))
            .collect::<HashMap<_, _>>();
        let Some(first) = outline_root(&self.document) else {
            return Ok(Vec::new());
        };
        let mut walker = OutlineWalker {
            document: &self.document,
            page_numbers: &page_numbers,
            visited: HashSet::new(),
            entries: Vec::new(),
        };
        walker.walk(first, 1);
        Ok(walker.entries)
    }

    fn metadata(&mut self) -> Result<Metadata> {
        let info = self
            .document
            .trailer
            .get(b"Info")
            .ok()
            .map(|obj| resolve(&self.document, obj))
            .and_then(|obj| obj.as_dict().ok());
        let mut metadata = Metadata::new();
        metadata.insert("format".to_string(), format!("PDF {}", self.document.version));
        for (key, pdf_key) in INFO_KEYS {
            let value = info
                .and_then(|dict| dict_string(&self.document, dict, pdf_key))
                .unwrap_or_default();
            metadata.insert(key.to_string(), value);
        }
        metadata.insert("encryption".to_string(), encryption_label(&self.document));
        Ok(metadata)
    }
}

fn resolve<'a>(document: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => document.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// `(lly, ury)` of the page MediaBox, following `/Parent` for inherited boxes.
fn media_box(document: &Document, page_id: ObjectId) -> (f32, f32) {
    let mut current = document.get_dictionary(page_id).ok();
    let mut hops = 0;
    while let Some(dict) = current {
        if let Ok(obj) = dict.get(b"MediaBox") {
            if let Ok(values) = resolve(document, obj).as_array() {
                let values = values.iter().filter_map(number).collect::<Vec<_>>();
                if values.len() == 4 {
                    return (values[1].min(values[3]), values[1].max(values[3]));
                }
            }
        }
        hops += 1;
        if hops > MAX_NAME_TREE_DEPTH {
            break;
        }
        current = dict
            .get(b"Parent")
            .and_then(|parent| parent.as_reference())
            .and_then(|id| document.get_dictionary(id))
            .ok();
    }
    DEFAULT_MEDIA_BOX
}

/// Row-vector affine matrix `[a b c d e f]` as used by PDF content streams.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn from_operands(operands: &[Object]) -> Option<Self> {
        let values = operands.iter().filter_map(number).collect::<Vec<_>>();
        if values.len() != 6 {
            return None;
        }
        let mut m = [0.0; 6];
        m.copy_from_slice(&values);
        Some(Self(m))
    }

    fn translate(tx: f32, ty: f32) -> Self {
        Self([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    fn multiply(self, other: Matrix) -> Self {
        let [a, b, c, d, e, f] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Self([
            a * a2 + b * c2,
            a * b2 + b * d2,
            c * a2 + d * c2,
            c * b2 + d * d2,
            e * a2 + f * c2 + e2,
            e * b2 + f * d2 + f2,
        ])
    }
}

struct TextState {
    ctm: Matrix,
    stack: Vec<Matrix>,
    line: Matrix,
    text: Matrix,
    leading: f32,
}

impl TextState {
    fn new() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            stack: Vec::new(),
            line: Matrix::IDENTITY,
            text: Matrix::IDENTITY,
            leading: 0.0,
        }
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.line = Matrix::translate(tx, ty).multiply(self.line);
        self.text = self.line;
    }

    fn baseline(&self) -> f32 {
        self.text.multiply(self.ctm).0[5]
    }
}

/// Drops text-showing operators whose baseline falls in the clipped margins.
fn clip_operations(
    operations: Vec<Operation>,
    clip: PageClip,
    (lly, ury): (f32, f32),
) -> Vec<Operation> {
    let height = ury - lly;
    let mut state = TextState::new();
    let mut out = Vec::with_capacity(operations.len());
    for op in operations {
        match op.operator.as_str() {
            "q" => state.stack.push(state.ctm),
            "Q" => state.ctm = state.stack.pop().unwrap_or(Matrix::IDENTITY),
            "cm" => {
                if let Some(m) = Matrix::from_operands(&op.operands) {
                    state.ctm = m.multiply(state.ctm);
                }
            }
            "BT" => {
                state.line = Matrix::IDENTITY;
                state.text = Matrix::IDENTITY;
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(&op.operands) {
                    state.line = m;
                    state.text = m;
                }
            }
            "TL" => {
                if let Some(leading) = op.operands.first().and_then(number) {
                    state.leading = leading;
                }
            }
            "Td" | "TD" => {
                let tx = op.operands.first().and_then(number).unwrap_or(0.0);
                let ty = op.operands.get(1).and_then(number).unwrap_or(0.0);
                if op.operator == "TD" {
                    state.leading = -ty;
                }
                state.next_line(tx, ty);
            }
            "T*" => state.next_line(0.0, -state.leading),
            "'" | "\"" => state.next_line(0.0, -state.leading),
            _ => {}
        }
        let shows_text = matches!(op.operator.as_str(), "Tj" | "TJ" | "'" | "\"");
        if !shows_text {
            out.push(op);
            continue;
        }
        let y_from_top = ury - state.baseline();
        if clip.contains(y_from_top, height) {
            out.push(op);
            continue;
        }
        // Keep the line movement of the dropped operator.
        match op.operator.as_str() {
            "'" => out.push(Operation::new("T*", vec![])),
            "\"" => {
                let mut operands = op.operands.into_iter();
                if let (Some(word), Some(chars)) = (operands.next(), operands.next()) {
                    out.push(Operation::new("Tw", vec![word]));
                    out.push(Operation::new("Tc", vec![chars]));
                }
                out.push(Operation::new("T*", vec![]));
            }
            _ => {}
        }
    }
    out
}

fn outline_root(document: &Document) -> Option<ObjectId> {
    let catalog = document.catalog().ok()?;
    let outlines = resolve(document, catalog.get(b"Outlines").ok()?)
        .as_dict()
        .ok()?;
    outlines.get(b"First").ok()?.as_reference().ok()
}

struct OutlineWalker<'a> {
    document: &'a Document,
    page_numbers: &'a HashMap<ObjectId, u32>,
    visited: HashSet<ObjectId>,
    entries: Vec<OutlineEntry>,
}

impl<'a> OutlineWalker<'a> {
    fn walk(&mut self, first: ObjectId, level: u32) {
        if level > MAX_OUTLINE_DEPTH {
            return;
        }
        let document = self.document;
        let mut current = Some(first);
        while let Some(node_id) = current {
            if !self.visited.insert(node_id) {
                break;
            }
            let Ok(node) = document.get_dictionary(node_id) else {
                break;
            };
            let title = dict_string(document, node, b"Title").unwrap_or_default();
            let page = self
                .destination_page(node)
                .or_else(|| self.entries.last().map(|entry| entry.page))
                .unwrap_or(1);
            self.entries.push(OutlineEntry { level, title, page });
            if let Ok(child) = node.get(b"First").and_then(|obj| obj.as_reference()) {
                self.walk(child, level + 1);
            }
            current = node.get(b"Next").and_then(|obj| obj.as_reference()).ok();
        }
    }

    fn destination_page(&self, node: &Dictionary) -> Option<u32> {
        if let Ok(dest) = node.get(b"Dest") {
            if let Some(page) = self.resolve_destination(dest, 0) {
                return Some(page);
            }
        }
        let action = resolve(self.document, node.get(b"A").ok()?).as_dict().ok()?;
        match action.get(b"S") {
            Ok(Object::Name(kind)) if kind.as_slice() == b"GoTo" => {
                self.resolve_destination(action.get(b"D").ok()?, 0)
            }
            _ => None,
        }
    }

    fn resolve_destination(&self, dest: &Object, depth: usize) -> Option<u32> {
        if depth > 4 {
            return None;
        }
        match resolve(self.document, dest) {
            Object::Array(items) => match items.first()? {
                Object::Reference(page_id) => self.page_numbers.get(page_id).copied(),
                Object::Integer(index) => u32::try_from(*index).ok().map(|i| i + 1),
                _ => None,
            },
            Object::Dictionary(dict) => self.resolve_destination(dict.get(b"D").ok()?, depth + 1),
            Object::String(name, _) | Object::Name(name) => {
                let target = self.named_destination(name)?;
                self.resolve_destination(target, depth + 1)
            }
            _ => None,
        }
    }

    fn named_destination(&self, name: &[u8]) -> Option<&'a Object> {
        let document = self.document;
        let catalog = document.catalog().ok()?;
        if let Ok(dests) = catalog.get(b"Dests") {
            if let Ok(dests) = resolve(document, dests).as_dict() {
                if let Ok(target) = dests.get(name) {
                    return Some(target);
                }
            }
        }
        let names = resolve(document, catalog.get(b"Names").ok()?).as_dict().ok()?;
        let tree = resolve(document, names.get(b"Dests").ok()?).as_dict().ok()?;
        search_name_tree(document, tree, name, 0)
    }
}

fn search_name_tree<'a>(
    document: &'a Document,
    node: &'a Dictionary,
    name: &[u8],
    depth: usize,
) -> Option<&'a Object> {
    if depth > MAX_NAME_TREE_DEPTH {
        return None;
    }
    if let Ok(names) = node.get(b"Names").and_then(|obj| obj.as_array()) {
        for pair in names.chunks(2) {
            if let [key, value] = pair {
                if let Object::String(key, _) = resolve(document, key) {
                    if key.as_slice() == name {
                        return Some(value);
                    }
                }
            }
        }
    }
    let kids = node.get(b"Kids").and_then(|obj| obj.as_array()).ok()?;
    kids.iter().find_map(|kid| {
        let kid = resolve(document, kid).as_dict().ok()?;
        search_name_tree(document, kid, name, depth + 1)
    })
}

fn dict_string(document: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    match resolve(document, dict.get(key).ok()?) {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

/// UTF-16BE when the bytes carry a BOM, UTF-8 when valid, Latin-1 otherwise.
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn encryption_label(document: &Document) -> String {
    let Ok(encrypt) = document.trailer.get(b"Encrypt") else {
        return String::new();
    };
    let Ok(dict) = resolve(document, encrypt).as_dict() else {
        return "encrypted".to_string();
    };
    let mut label = match dict.get(b"Filter") {
        Ok(Object::Name(filter)) => String::from_utf8_lossy(filter).into_owned(),
        _ => "encrypted".to_string(),
    };
    for (key, prefix) in [(b"V".as_slice(), " V"), (b"R".as_slice(), " R")] {
        if let Ok(Object::Integer(value)) = dict.get(key) {
            label.push_str(&format!("{prefix}{value}"));
        }
    }
    label
}
