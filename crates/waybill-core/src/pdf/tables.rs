//! Table-row extraction from page content streams.
//!
//! Two flavors are supported. `Lattice` uses ruling lines drawn on the page to
//! build a cell grid; `Stream` groups text fragments that share a baseline.
//! Both return rows as lists of cell strings in reading order.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object};
use tracing::{debug, trace};

use crate::error::PdfError;

/// How table cells are located on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFlavor {
    /// Bordered tables: cells delimited by ruling lines.
    Lattice,
    /// Borderless tables: columns inferred from text alignment.
    Stream,
}

/// A table row as cell texts.
pub type TableRow = Vec<String>;

/// Positioned text drawn by a show-text operator.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub x: f32,
    pub y: f32,
    pub text: String,
}

/// An axis-aligned stroked or filled segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ruling {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Ruling {
    const AXIS_TOLERANCE: f32 = 1.0;
    const MIN_LENGTH: f32 = 5.0;

    fn is_horizontal(&self) -> bool {
        (self.y1 - self.y0).abs() <= Self::AXIS_TOLERANCE
    }

    fn is_vertical(&self) -> bool {
        (self.x1 - self.x0).abs() <= Self::AXIS_TOLERANCE
    }

    fn length(&self) -> f32 {
        (self.x1 - self.x0).abs().max((self.y1 - self.y0).abs())
    }
}

/// Text fragments and rulings of one page, in default user space.
#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    pub fragments: Vec<TextFragment>,
    pub rulings: Vec<Ruling>,
}

/// Row-major affine matrix `[a b c d e f]`.
#[derive(Debug, Clone, Copy)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    /// `self` applied first, then `other`.
    fn then(&self, other: &Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a * a2 + b * c2,
            a * b2 + b * d2,
            c * a2 + d * c2,
            c * b2 + d * d2,
            e * a2 + f * c2 + e2,
            e * b2 + f * d2 + f2,
        ])
    }

    fn translate(tx: f32, ty: f32) -> Matrix {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }
}

/// Graphics and text state tracked while walking the operators.
struct Interpreter {
    ctm: Matrix,
    stack: Vec<Matrix>,
    tm: Matrix,
    tlm: Matrix,
    font_size: f32,
    leading: f32,
    current: (f32, f32),
    subpath_start: (f32, f32),
    pending: Vec<((f32, f32), (f32, f32))>,
    layout: PageLayout,
}

impl Interpreter {
    fn new() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            stack: Vec::new(),
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            font_size: 10.0,
            leading: 0.0,
            current: (0.0, 0.0),
            subpath_start: (0.0, 0.0),
            pending: Vec::new(),
            layout: PageLayout::default(),
        }
    }

    fn run(mut self, operations: &[Operation]) -> PageLayout {
        for op in operations {
            let nums: Vec<f32> = op.operands.iter().filter_map(number).collect();
            match op.operator.as_str() {
                "q" => self.stack.push(self.ctm),
                "Q" => self.ctm = self.stack.pop().unwrap_or(Matrix::IDENTITY),
                "cm" if nums.len() == 6 => {
                    let m = Matrix([nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]]);
                    self.ctm = m.then(&self.ctm);
                }
                "BT" => {
                    self.tm = Matrix::IDENTITY;
                    self.tlm = Matrix::IDENTITY;
                }
                "Tf" => {
                    if let Some(size) = op.operands.get(1).and_then(number) {
                        self.font_size = size.abs();
                    }
                }
                "TL" if nums.len() == 1 => self.leading = nums[0],
                "Td" if nums.len() == 2 => self.next_line(nums[0], nums[1]),
                "TD" if nums.len() == 2 => {
                    self.leading = -nums[1];
                    self.next_line(nums[0], nums[1]);
                }
                "Tm" if nums.len() == 6 => {
                    self.tlm = Matrix([nums[0], nums[1], nums[2], nums[3], nums[4], nums[5]]);
                    self.tm = self.tlm;
                }
                "T*" => self.next_line(0.0, -self.leading),
                "Tj" => {
                    if let Some(text) = op.operands.first().and_then(decode_string) {
                        self.show(text);
                    }
                }
                "'" => {
                    self.next_line(0.0, -self.leading);
                    if let Some(text) = op.operands.first().and_then(decode_string) {
                        self.show(text);
                    }
                }
                "\"" => {
                    self.next_line(0.0, -self.leading);
                    if let Some(text) = op.operands.get(2).and_then(decode_string) {
                        self.show(text);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = op.operands.first() {
                        self.show(decode_array(items));
                    }
                }
                "m" if nums.len() == 2 => {
                    self.current = (nums[0], nums[1]);
                    self.subpath_start = self.current;
                }
                "l" if nums.len() == 2 => {
                    let to = (nums[0], nums[1]);
                    self.pending.push((self.current, to));
                    self.current = to;
                }
                "h" => {
                    self.pending.push((self.current, self.subpath_start));
                    self.current = self.subpath_start;
                }
                "re" if nums.len() == 4 => {
                    let (x, y, w, h) = (nums[0], nums[1], nums[2], nums[3]);
                    let corners = [(x, y), (x + w, y), (x + w, y + h), (x, y + h)];
                    for i in 0..4 {
                        self.pending.push((corners[i], corners[(i + 1) % 4]));
                    }
                    self.current = (x, y);
                    self.subpath_start = (x, y);
                }
                "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => self.commit_path(),
                "n" => self.pending.clear(),
                _ => {}
            }
        }
        self.layout
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    fn show(&mut self, text: String) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            let (x, y) = self.tm.then(&self.ctm).apply(0.0, 0.0);
            trace!("Text at ({:.1}, {:.1}): {}", x, y, trimmed);
            self.layout.fragments.push(TextFragment {
                x,
                y,
                text: trimmed.to_string(),
            });
        }
        // Glyph widths are unknown without font metrics; half an em per character
        let advance = text.chars().count() as f32 * self.font_size * 0.5;
        self.tm = Matrix::translate(advance, 0.0).then(&self.tm);
    }

    fn commit_path(&mut self) {
        for (from, to) in self.pending.drain(..) {
            let (x0, y0) = self.ctm.apply(from.0, from.1);
            let (x1, y1) = self.ctm.apply(to.0, to.1);
            let ruling = Ruling { x0, y0, x1, y1 };
            if (ruling.is_horizontal() || ruling.is_vertical())
                && ruling.length() >= Ruling::MIN_LENGTH
            {
                self.layout.rulings.push(ruling);
            }
        }
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

/// Decode a string operand: UTF-16BE when it carries a byte-order mark,
/// otherwise one character per byte.
fn decode_string(obj: &Object) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return Some(String::from_utf16_lossy(&units));
    }
    Some(
        bytes
            .iter()
            .map(|&b| if b.is_ascii_control() { ' ' } else { b as char })
            .collect(),
    )
}

/// Concatenate a `TJ` array; large negative kerning becomes a space.
fn decode_array(items: &[Object]) -> String {
    let mut out = String::new();
    for item in items {
        match number(item) {
            Some(adjust) if adjust < -200.0 => out.push(' '),
            Some(_) => {}
            None => {
                if let Some(text) = decode_string(item) {
                    out.push_str(&text);
                }
            }
        }
    }
    out
}

/// Cluster coordinates that lie within `tolerance` of each other.
fn cluster(mut values: Vec<f32>, tolerance: f32) -> Vec<f32> {
    values.sort_by(f32::total_cmp);
    let mut clusters: Vec<(f32, usize)> = Vec::new();
    for v in values {
        match clusters.last_mut() {
            Some((sum, n)) if (v - *sum / *n as f32).abs() <= tolerance => {
                *sum += v;
                *n += 1;
            }
            _ => clusters.push((v, 1)),
        }
    }
    clusters.into_iter().map(|(sum, n)| sum / n as f32).collect()
}

impl PageLayout {
    const GRID_TOLERANCE: f32 = 2.0;
    const BASELINE_TOLERANCE: f32 = 3.0;

    pub fn from_operations(operations: &[Operation]) -> Self {
        Interpreter::new().run(operations)
    }

    /// Rows of the grid formed by the page's ruling lines. Empty when the page
    /// has fewer than two horizontal or two vertical rulings.
    pub fn lattice_rows(&self) -> Vec<TableRow> {
        let ys = cluster(
            self.rulings
                .iter()
                .filter(|r| r.is_horizontal())
                .map(|r| r.y0)
                .collect(),
            Self::GRID_TOLERANCE,
        );
        let xs = cluster(
            self.rulings
                .iter()
                .filter(|r| r.is_vertical())
                .map(|r| r.x0)
                .collect(),
            Self::GRID_TOLERANCE,
        );
        if ys.len() < 2 || xs.len() < 2 {
            return Vec::new();
        }

        let mut rows = Vec::new();
        // PDF y grows upwards; read from the top band down
        for band in ys.windows(2).rev() {
            let (bottom, top) = (band[0], band[1]);
            let cells: TableRow = xs
                .windows(2)
                .map(|col| {
                    let (left, right) = (col[0], col[1]);
                    let mut inside: Vec<&TextFragment> = self
                        .fragments
                        .iter()
                        .filter(|f| f.y > bottom && f.y < top)
                        .filter(|f| f.x >= left - Self::GRID_TOLERANCE && f.x < right)
                        .collect();
                    inside.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));
                    inside
                        .iter()
                        .map(|f| f.text.as_str())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect();
            if cells.iter().any(|c| !c.is_empty()) {
                rows.push(cells);
            }
        }
        rows
    }

    /// Fragments grouped by shared baseline; only multi-column lines count as rows.
    pub fn stream_rows(&self) -> Vec<TableRow> {
        let mut fragments: Vec<&TextFragment> = self.fragments.iter().collect();
        fragments.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

        let mut lines: Vec<(f32, Vec<&TextFragment>)> = Vec::new();
        for fragment in fragments {
            match lines.last_mut() {
                Some((y, members)) if (*y - fragment.y).abs() <= Self::BASELINE_TOLERANCE => {
                    members.push(fragment)
                }
                _ => lines.push((fragment.y, vec![fragment])),
            }
        }

        lines
            .into_iter()
            .filter(|(_, members)| members.len() >= 2)
            .map(|(_, mut members)| {
                members.sort_by(|a, b| a.x.total_cmp(&b.x));
                members.iter().map(|f| f.text.clone()).collect()
            })
            .collect()
    }

    pub fn rows(&self, flavor: TableFlavor) -> Vec<TableRow> {
        match flavor {
            TableFlavor::Lattice => self.lattice_rows(),
            TableFlavor::Stream => self.stream_rows(),
        }
    }
}

/// Table rows of every page, in page order.
pub fn extract_rows(doc: &Document, flavor: TableFlavor) -> Result<Vec<TableRow>, PdfError> {
    let mut rows = Vec::new();
    for (page_no, page_id) in doc.get_pages() {
        let data = doc
            .get_page_content(page_id)
            .map_err(|e| PdfError::TableExtraction(format!("page {}: {}", page_no, e)))?;
        let content = Content::decode(&data)
            .map_err(|e| PdfError::TableExtraction(format!("page {}: {}", page_no, e)))?;

        let page_rows = PageLayout::from_operations(&content.operations).rows(flavor);
        debug!("Page {}: {} {:?} table rows", page_no, page_rows.len(), flavor);
        rows.extend(page_rows);
    }
    Ok(rows)
}

/// Join non-empty cells into a whitespace-delimited text line.
pub fn row_to_line(row: &[String]) -> String {
    row.iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn op(operator: &str, operands: Vec<Object>) -> Operation {
        Operation::new(operator, operands)
    }

    fn nums(values: &[f32]) -> Vec<Object> {
        values.iter().map(|v| Object::Real(*v as _)).collect()
    }

    fn text_at(x: f32, y: f32, text: &str) -> Vec<Operation> {
        vec![
            op("BT", vec![]),
            op("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(10)]),
            op("Td", nums(&[x, y])),
            op("Tj", vec![Object::string_literal(text)]),
            op("ET", vec![]),
        ]
    }

    /// Two-row, three-column bordered grid with text in every cell.
    fn bordered_table() -> Vec<Operation> {
        let mut ops = Vec::new();
        for y in [700.0, 680.0, 660.0] {
            ops.push(op("m", nums(&[100.0, y])));
            ops.push(op("l", nums(&[400.0, y])));
        }
        for x in [100.0, 250.0, 320.0, 400.0] {
            ops.push(op("m", nums(&[x, 660.0])));
            ops.push(op("l", nums(&[x, 700.0])));
        }
        ops.push(op("S", vec![]));

        ops.extend(text_at(105.0, 686.0, "WIDGET A"));
        ops.extend(text_at(180.0, 686.0, "12345678"));
        ops.extend(text_at(255.0, 686.0, "3"));
        ops.extend(text_at(325.0, 686.0, "30.00"));
        ops.extend(text_at(105.0, 666.0, "GADGET B"));
        ops.extend(text_at(255.0, 666.0, "1"));
        ops.extend(text_at(325.0, 666.0, "12.50"));
        ops
    }

    #[test]
    fn test_lattice_rows_follow_grid() {
        let layout = PageLayout::from_operations(&bordered_table());
        assert_eq!(
            layout.lattice_rows(),
            vec![
                vec!["WIDGET A 12345678".to_string(), "3".into(), "30.00".into()],
                vec!["GADGET B".to_string(), "1".into(), "12.50".into()],
            ]
        );
    }

    #[test]
    fn test_lattice_needs_grid() {
        let layout = PageLayout::from_operations(&text_at(10.0, 10.0, "loose text"));
        assert!(layout.lattice_rows().is_empty());
    }

    #[test]
    fn test_stream_rows_group_baselines() {
        let mut ops = text_at(50.0, 700.0, "Invoice");
        ops.extend(text_at(50.0, 650.0, "Soap"));
        ops.extend(text_at(200.0, 651.0, "2"));
        ops.extend(text_at(300.0, 650.0, "500.00"));
        ops.extend(text_at(50.0, 630.0, "Lotion"));
        ops.extend(text_at(300.0, 630.0, "1,200.00"));

        let rows = PageLayout::from_operations(&ops).stream_rows();
        assert_eq!(
            rows,
            vec![
                vec!["Soap".to_string(), "2".into(), "500.00".into()],
                vec!["Lotion".to_string(), "1,200.00".into()],
            ]
        );
    }

    #[test]
    fn test_rectangles_and_no_paint() {
        let ops = vec![
            op("re", nums(&[10.0, 10.0, 100.0, 50.0])),
            op("f", vec![]),
            op("re", nums(&[10.0, 10.0, 100.0, 50.0])),
            op("n", vec![]),
        ];
        let layout = PageLayout::from_operations(&ops);
        assert_eq!(layout.rulings.len(), 4);
    }

    #[test]
    fn test_cm_transforms_positions() {
        let mut ops = vec![op("q", vec![]), op("cm", nums(&[1.0, 0.0, 0.0, 1.0, 50.0, 20.0]))];
        ops.extend(text_at(10.0, 10.0, "moved"));
        ops.push(op("Q", vec![]));
        ops.extend(text_at(10.0, 10.0, "plain"));

        let layout = PageLayout::from_operations(&ops);
        assert_eq!(layout.fragments[0].x, 60.0);
        assert_eq!(layout.fragments[0].y, 30.0);
        assert_eq!(layout.fragments[1].x, 10.0);
    }

    #[test]
    fn test_tj_array_spacing() {
        let items = vec![
            Object::string_literal("TOT"),
            Object::Integer(-20),
            Object::string_literal("AL"),
            Object::Integer(-500),
            Object::string_literal("30.00"),
        ];
        assert_eq!(decode_array(&items), "TOTAL 30.00");
    }

    #[test]
    fn test_utf16_strings() {
        let obj = Object::String(
            vec![0xFE, 0xFF, 0x00, 0x41, 0x00, 0x42],
            lopdf::StringFormat::Hexadecimal,
        );
        assert_eq!(decode_string(&obj).as_deref(), Some("AB"));
    }

    #[test]
    fn test_row_to_line() {
        let row = vec!["WIDGET A".to_string(), " ".into(), "3".into()];
        assert_eq!(row_to_line(&row), "WIDGET A 3");
    }

    #[test]
    fn test_cluster() {
        assert_eq!(cluster(vec![10.0, 11.0, 50.0, 9.5], 2.0).len(), 2);
    }
}
