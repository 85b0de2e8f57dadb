//! Raw table suppliers.
//!
//! Turns files into [`Grid`]s with encoding and delimiter auto-detection.
//! Nothing table-specific happens here: a supplier only preserves cell
//! positions so the layout resolver can find its landmarks.
//!
//! ```text
//! .xlsx/.xls/.ods ──▶ read_workbook      ─┐
//! .html/.htm      ──▶ parse_html_tables  ─┼──▶ Grid
//! .csv/.tsv/.txt  ──▶ parse_delimited    ─┘
//! ```

use calamine::{open_workbook_auto, Data, DataType, Reader};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SourceError, SourceResult};
use crate::grid::{Cell, Grid};
use crate::logs::log_warning;

/// Upper bound on a single cell's colspan (guards against broken markup).
const MAX_COLSPAN: usize = 64;
const MAX_ROWSPAN: usize = 1024;

// =============================================================================
// Source description
// =============================================================================

/// Kind of raw source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Workbook,
    Html,
    Delimited,
}

impl SourceKind {
    /// Guess from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(SourceKind::Workbook),
            "html" | "htm" => Some(SourceKind::Html),
            "csv" | "tsv" | "txt" | "dat" => Some(SourceKind::Delimited),
            _ => None,
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "workbook" | "excel" | "xlsx" | "xls" => Ok(SourceKind::Workbook),
            "html" | "htm" => Ok(SourceKind::Html),
            "delimited" | "csv" | "tsv" | "text" => Ok(SourceKind::Delimited),
            other => Err(SourceError::Unsupported(other.to_string())),
        }
    }
}

/// How to read a source (stored in table profiles).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceOptions {
    /// Force a kind instead of guessing from the extension.
    #[serde(default)]
    pub kind: Option<SourceKind>,

    /// Workbook sheet name (first sheet when absent).
    #[serde(default)]
    pub sheet: Option<String>,

    /// Which `<table>` of an HTML page.
    #[serde(default)]
    pub table_index: usize,

    /// Text encoding (auto-detected when absent).
    #[serde(default)]
    pub encoding: Option<String>,

    /// Field delimiter (auto-detected when absent).
    #[serde(default)]
    pub delimiter: Option<char>,
}

/// A concrete file to read.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    pub path: PathBuf,
    pub options: SourceOptions,
}

impl SourceSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            options: SourceOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SourceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.options.sheet = Some(sheet.into());
        self
    }

    /// Resolved kind: explicit, by extension, or by sniffing content.
    pub fn kind(&self) -> SourceResult<SourceKind> {
        if let Some(kind) = self.options.kind.or_else(|| SourceKind::from_path(&self.path)) {
            return Ok(kind);
        }
        let bytes = std::fs::read(&self.path)?;
        Ok(sniff_kind(&bytes))
    }
}

/// Anything that can supply a grid.
pub trait TableSource {
    fn load_grid(&self) -> SourceResult<Grid>;

    /// Short description for logs.
    fn describe(&self) -> String {
        "table".to_string()
    }
}

impl TableSource for SourceSpec {
    fn load_grid(&self) -> SourceResult<Grid> {
        load(self)
    }

    fn describe(&self) -> String {
        match &self.options.sheet {
            Some(sheet) => format!("{} [{}]", self.path.display(), sheet),
            None => self.path.display().to_string(),
        }
    }
}

impl TableSource for Grid {
    fn load_grid(&self) -> SourceResult<Grid> {
        Ok(self.clone())
    }

    fn describe(&self) -> String {
        format!("in-memory grid ({} rows)", self.height())
    }
}

/// Load a source into a grid.
pub fn load(spec: &SourceSpec) -> SourceResult<Grid> {
    let grid = match spec.kind()? {
        SourceKind::Workbook => read_workbook(&spec.path, spec.options.sheet.as_deref())?,
        SourceKind::Html => {
            let content = read_text(&spec.path, spec.options.encoding.as_deref())?;
            let mut tables = parse_html_tables(&content);
            let found = tables.len();
            if spec.options.table_index >= found {
                return Err(SourceError::TableNotFound {
                    index: spec.options.table_index,
                    found,
                });
            }
            tables.swap_remove(spec.options.table_index)
        }
        SourceKind::Delimited => {
            let content = read_text(&spec.path, spec.options.encoding.as_deref())?;
            let delimiter = spec
                .options
                .delimiter
                .unwrap_or_else(|| detect_delimiter(&content));
            parse_delimited(&content, delimiter)?
        }
    };

    if grid.is_empty() {
        return Err(SourceError::Empty);
    }
    Ok(grid)
}

fn sniff_kind(bytes: &[u8]) -> SourceKind {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(2048)]).to_lowercase();
    if head.contains("<table") || head.trim_start().starts_with("<!doctype html") || head.contains("<html") {
        SourceKind::Html
    } else {
        SourceKind::Delimited
    }
}

// =============================================================================
// Text decoding
// =============================================================================

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    normalize_encoding(&result.0)
}

fn normalize_encoding(charset: &str) -> String {
    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" | "utf-8-sig" => "utf-8".to_string(),
        "shift_jis" | "shift-jis" | "sjis" | "cp932" | "windows-31j" | "ms932" => "shift_jis".to_string(),
        "euc-jp" | "eucjp" | "euc_jp" => "euc-jp".to_string(),
        "iso-2022-jp" => "iso-2022-jp".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" | "windows-1252" | "cp1252" => {
            "windows-1252".to_string()
        }
        other => other.to_string(),
    }
}

/// Decode bytes with the given encoding label. A leading BOM is stripped.
pub fn decode_content(bytes: &[u8], encoding: &str) -> SourceResult<String> {
    let label = normalize_encoding(encoding);
    let codec = encoding_rs::Encoding::for_label(label.as_bytes()).ok_or_else(|| SourceError::Encoding {
        encoding: encoding.to_string(),
        message: "unknown encoding label".to_string(),
    })?;

    let (text, used, had_errors) = codec.decode(bytes);
    if had_errors {
        log_warning(format!("Some bytes were not valid {}; replaced", used.name()));
    }
    Ok(text.into_owned())
}

/// Read a text file, decoding with `encoding` or the detected one.
pub fn read_text(path: &Path, encoding: Option<&str>) -> SourceResult<String> {
    let bytes = std::fs::read(path)?;
    let encoding = match encoding {
        Some(e) => e.to_string(),
        None if std::str::from_utf8(&bytes).is_ok() => "utf-8".to_string(),
        None => detect_encoding(&bytes),
    };
    decode_content(&bytes, &encoding).or_else(|err| match err {
        // Detection produced a label encoding_rs does not know
        SourceError::Encoding { .. } => decode_content(&bytes, "utf-8"),
        other => Err(other),
    })
}

// =============================================================================
// Delimited text
// =============================================================================

/// Pick the delimiter that occurs most often across the first lines.
pub fn detect_delimiter(content: &str) -> char {
    let lines: Vec<&str> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(20)
        .collect();

    let separators = ['\t', ',', ';', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count: usize = lines.iter().map(|l| l.matches(sep).count()).sum();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse delimited text into a grid. No header row is assumed; every record
/// keeps its position (blank lines become blank rows). A quoted field may
/// span several lines and still yields one row.
pub fn parse_delimited(content: &str, delimiter: char) -> SourceResult<Grid> {
    if !delimiter.is_ascii() {
        return Err(SourceError::Unsupported(format!("non-ASCII delimiter '{}'", delimiter)));
    }
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut grid = Grid::default();
    for line in split_records(content) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            grid.push_row(Vec::new());
            continue;
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter as u8)
            .from_reader(line.as_bytes());

        let mut row = Vec::new();
        if let Some(record) = reader.records().next() {
            row = record?.iter().map(Cell::from_raw).collect();
        }
        grid.push_row(row);
    }

    Ok(grid)
}

/// Split on newlines outside double quotes.
fn split_records(content: &str) -> Vec<&str> {
    let mut records = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    // '"' and '\n' never occur inside a multi-byte UTF-8 sequence.
    for (i, byte) in content.bytes().enumerate() {
        match byte {
            b'"' => quoted = !quoted,
            b'\n' if !quoted => {
                records.push(&content[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < content.len() {
        records.push(&content[start..]);
    }
    records
}

// =============================================================================
// HTML tables
// =============================================================================

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("valid selector"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("valid selector"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("th, td").expect("valid selector"));

/// Every `<table>` of a page, in document order.
///
/// `colspan` and `rowspan` cells are padded with empties so merged title
/// bands keep the column positions of the rows beside and below them.
pub fn parse_html_tables(html: &str) -> Vec<Grid> {
    let doc = Html::parse_document(html);
    doc.select(&TABLE).map(table_to_grid).collect()
}

fn table_to_grid(table: ElementRef<'_>) -> Grid {
    let mut grid = Grid::default();
    // Rows each column is still covered by a rowspan from above.
    let mut covered: Vec<usize> = Vec::new();

    for tr in table.select(&ROW) {
        let mut next: Vec<usize> = covered.iter().map(|n| n.saturating_sub(1)).collect();
        let mut row = Vec::new();

        for cell in tr.select(&CELL) {
            while covered.get(row.len()).is_some_and(|&n| n > 0) {
                row.push(Cell::Empty);
            }
            let start = row.len();
            let text = norm_text(&cell.text().collect::<String>());
            row.push(Cell::from_raw(&text));

            let colspan = span_attr(cell, "colspan", MAX_COLSPAN);
            row.extend(std::iter::repeat(Cell::Empty).take(colspan - 1));

            let rowspan = span_attr(cell, "rowspan", MAX_ROWSPAN);
            if rowspan > 1 {
                if next.len() < start + colspan {
                    next.resize(start + colspan, 0);
                }
                for n in &mut next[start..start + colspan] {
                    *n = rowspan - 1;
                }
            }
        }
        grid.push_row(row);
        covered = next;
    }
    grid
}

fn span_attr(cell: ElementRef<'_>, name: &str, max: usize) -> usize {
    cell.value()
        .attr(name)
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, max)
}

fn norm_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// =============================================================================
// Workbooks
// =============================================================================

/// Read one sheet of a workbook. Cell coordinates stay absolute: a sheet
/// whose used range starts at C5 yields a grid with data at row 4, column 2.
pub fn read_workbook(path: &Path, sheet: Option<&str>) -> SourceResult<Grid> {
    let mut workbook = open_workbook_auto(path).map_err(|e| SourceError::Workbook(e.to_string()))?;

    let sheet_names = workbook.sheet_names();
    let name = match sheet {
        Some(name) => sheet_names
            .iter()
            .find(|n| n.as_str() == name)
            .cloned()
            .ok_or_else(|| SourceError::SheetNotFound(name.to_string()))?,
        None => sheet_names.first().cloned().ok_or(SourceError::Empty)?,
    };

    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| SourceError::Workbook(e.to_string()))?;

    let (row_offset, col_offset) = range
        .start()
        .map_or((0, 0), |(r, c)| (r as usize, c as usize));

    let mut grid = Grid::default();
    for _ in 0..row_offset {
        grid.push_row(Vec::new());
    }
    for row in range.rows() {
        let mut cells = vec![Cell::Empty; col_offset];
        cells.extend(row.iter().map(convert_cell));
        grid.push_row(cells);
    }

    Ok(grid)
}

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Cell::Empty
            } else {
                Cell::Text(trimmed.to_string())
            }
        }
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(_) | Data::DateTimeIso(_) => data
            .as_date()
            .map(Cell::Date)
            .unwrap_or_else(|| Cell::Text(data.to_string())),
        other => Cell::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_delimited_keeps_positions() {
        let content = "消費者物価指数\n\n\t\t総合\n時間軸コード\t\t\n2024年3月\t\t101.5";
        let grid = parse_delimited(content, '\t').unwrap();

        assert_eq!(grid.height(), 5);
        assert!(grid.is_blank_row(1));
        assert_eq!(grid.get(2, 2), &Cell::from("総合"));
        assert_eq!(grid.get(4, 0), &Cell::from("2024年3月"));
        assert_eq!(grid.get(4, 2), &Cell::Number(101.5));
    }

    #[test]
    fn test_parse_delimited_quoted() {
        let grid = parse_delimited("\"2,345.6\",x\n", ',').unwrap();
        assert_eq!(grid.get(0, 0), &Cell::from("2,345.6"));
        assert_eq!(grid.get(0, 1), &Cell::from("x"));
    }

    #[test]
    fn test_parse_delimited_multiline_field() {
        let content = "\"類・品目\n総合\",x\r\n時間軸コード,y\n\n2024年3月,1\n";
        let grid = parse_delimited(content, ',').unwrap();

        assert_eq!(grid.height(), 4);
        assert_eq!(grid.get(0, 0), &Cell::from("類・品目\n総合"));
        assert_eq!(grid.get(0, 1), &Cell::from("x"));
        assert_eq!(grid.get(1, 0), &Cell::from("時間軸コード"));
        assert!(grid.is_blank_row(2));
        assert_eq!(grid.get(3, 1), &Cell::Number(1.0));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a\tb\tc\n1\t2\t3"), '\t');
        assert_eq!(detect_delimiter("title\na,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a|b|c"), '|');
        assert_eq!(detect_delimiter("single column"), ',');
    }

    #[test]
    fn test_decode_shift_jis() {
        let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode("時間軸コード,総合");
        let decoded = decode_content(&bytes, "SHIFT_JIS").unwrap();
        assert_eq!(decoded, "時間軸コード,総合");

        let decoded = decode_content(&bytes, "cp932").unwrap();
        assert!(decoded.contains("総合"));
    }

    #[test]
    fn test_decode_strips_bom() {
        let bytes = b"\xEF\xBB\xBFa,b";
        assert_eq!(decode_content(bytes, "utf-8").unwrap(), "a,b");
    }

    #[test]
    fn test_unknown_encoding() {
        assert!(matches!(
            decode_content(b"abc", "klingon"),
            Err(SourceError::Encoding { .. })
        ));
    }

    #[test]
    fn test_detect_encoding_ascii() {
        assert_eq!(detect_encoding(b"period,value\n2024,1.5\n"), "utf-8");
    }

    #[test]
    fn test_html_colspan() {
        let html = r#"
            <html><body>
            <table><tr><td>ignored</td></tr></table>
            <table>
              <tr><th colspan="3">CI</th><th>DI</th></tr>
              <tr><td>2024</td><td>1</td><td>101.2</td><td>50.0</td></tr>
            </table>
            </body></html>"#;
        let tables = parse_html_tables(html);
        assert_eq!(tables.len(), 2);

        let grid = &tables[1];
        assert_eq!(grid.get(0, 0), &Cell::from("CI"));
        assert_eq!(grid.get(0, 3), &Cell::from("DI"));
        assert_eq!(grid.get(1, 0), &Cell::Number(2024.0));
        assert_eq!(grid.get(1, 3), &Cell::Number(50.0));
    }

    #[test]
    fn test_html_rowspan() {
        let html = r#"<table>
              <tr><th rowspan="2" colspan="2">Time</th><th>CI</th></tr>
              <tr><th>Index</th></tr>
              <tr><td rowspan="2">2024</td><td>1</td><td>10</td></tr>
              <tr><td>2</td><td>20</td></tr>
            </table>"#;
        let grid = &parse_html_tables(html)[0];

        assert_eq!(grid.get(1, 2), &Cell::from("Index"));
        assert_eq!(grid.get(2, 0), &Cell::Number(2024.0));
        assert_eq!(grid.get(3, 0), &Cell::Empty);
        assert_eq!(grid.get(3, 1), &Cell::Number(2.0));
        assert_eq!(grid.get(3, 2), &Cell::Number(20.0));
    }

    #[test]
    fn test_load_delimited_file() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "header,value").unwrap();
        writeln!(file, "2024/01,1.5").unwrap();

        let grid = SourceSpec::new(file.path()).load_grid().unwrap();
        assert_eq!(grid.height(), 2);
        assert_eq!(grid.get(1, 1), &Cell::Number(1.5));
    }

    #[test]
    fn test_load_sniffs_html() {
        let mut file = NamedTempFile::with_suffix(".page").unwrap();
        write!(file, "<table><tr><td>a</td></tr></table>").unwrap();

        let spec = SourceSpec::new(file.path());
        assert_eq!(spec.kind().unwrap(), SourceKind::Html);

        let missing = spec.with_options(SourceOptions {
            table_index: 3,
            ..SourceOptions::default()
        });
        assert!(matches!(
            missing.load_grid(),
            Err(SourceError::TableNotFound { index: 3, found: 1 })
        ));
    }

    #[test]
    fn test_load_empty_source() {
        let file = NamedTempFile::with_suffix(".csv").unwrap();
        assert!(matches!(SourceSpec::new(file.path()).load_grid(), Err(SourceError::Empty)));
    }

    #[test]
    fn test_missing_workbook() {
        let result = read_workbook(Path::new("/nonexistent/book.xlsx"), None);
        assert!(matches!(result, Err(SourceError::Workbook(_))));
    }

    #[test]
    fn test_kind_from_path() {
        assert_eq!(SourceKind::from_path(Path::new("a.XLSX")), Some(SourceKind::Workbook));
        assert_eq!(SourceKind::from_path(Path::new("a.htm")), Some(SourceKind::Html));
        assert_eq!(SourceKind::from_path(Path::new("a.tsv")), Some(SourceKind::Delimited));
        assert_eq!(SourceKind::from_path(Path::new("a")), None);
    }
}
