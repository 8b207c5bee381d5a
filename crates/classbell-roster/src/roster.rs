//! Mapping between raw table rows and person records.

use chrono::NaiveDate;
use classbell_core::{
    error::ClassbellError,
    record::{PersonRecord, Threshold},
    traits::Table,
};
use tracing::warn;

pub const NAME_COLUMN: &str = "Teacher Name";
pub const CHAT_COLUMN: &str = "Chat ID";
pub const DATE_COLUMN: &str = "Teaching Date";
pub const LABEL_COLUMN: &str = "Lesson Type";

/// Accepted `Teaching Date` layouts, most specific first.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%m/%d/%Y"];

/// A row that could not be turned into a record. Written back untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRow {
    /// 1-based data row number (header excluded).
    pub row: usize,
    pub cells: Vec<String>,
    pub reason: String,
}

impl MalformedRow {
    pub fn to_error(&self) -> ClassbellError {
        ClassbellError::MalformedRecord {
            row: self.row,
            reason: self.reason.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct PersonRow {
    record: PersonRecord,
    /// State as loaded; only fields that differ get re-rendered.
    loaded: PersonRecord,
    cells: Vec<String>,
}

#[derive(Debug, Clone)]
enum Row {
    Person(PersonRow),
    Malformed(MalformedRow),
}

#[derive(Debug, Clone)]
struct Columns {
    name: usize,
    chat: usize,
    date: usize,
    label: usize,
    flags: Vec<(Threshold, usize)>,
}

/// The roster as loaded: every row in table order, parsed where possible.
#[derive(Debug, Clone)]
pub struct Roster {
    columns: Vec<String>,
    layout: Columns,
    rows: Vec<Row>,
}

impl Roster {
    /// Parse a raw table. Missing standard and flag columns are appended;
    /// rows that fail validation are kept aside as [`MalformedRow`]s.
    pub fn from_table(table: &Table, thresholds: &[Threshold]) -> Result<Self, ClassbellError> {
        let mut columns: Vec<String> = table.columns.iter().map(|c| c.trim().to_string()).collect();

        let has_data = table.rows.iter().any(|r| !is_blank(r));
        if has_data && find_column(&columns, NAME_COLUMN).is_none() {
            return Err(ClassbellError::MalformedRecord {
                row: 0,
                reason: format!("table has no '{NAME_COLUMN}' column"),
            });
        }

        let mut ensure = |name: &str| match find_column(&columns, name) {
            Some(i) => i,
            None => {
                columns.push(name.to_string());
                columns.len() - 1
            }
        };
        let name = ensure(NAME_COLUMN);
        let chat = ensure(CHAT_COLUMN);
        let date = ensure(DATE_COLUMN);
        let label = ensure(LABEL_COLUMN);
        let flags = thresholds.iter().map(|t| (*t, ensure(&t.column()))).collect();
        let layout = Columns {
            name,
            chat,
            date,
            label,
            flags,
        };

        let width = columns.len();
        let rows = table
            .rows
            .iter()
            .enumerate()
            .filter(|(_, cells)| !is_blank(cells))
            .map(|(i, cells)| {
                let mut cells = cells.clone();
                cells.resize(width.max(cells.len()), String::new());
                match parse_record(&cells, &layout) {
                    Ok(record) => Row::Person(PersonRow {
                        loaded: record.clone(),
                        record,
                        cells,
                    }),
                    Err(reason) => Row::Malformed(MalformedRow {
                        row: i + 1,
                        cells,
                        reason,
                    }),
                }
            })
            .collect();

        Ok(Self {
            columns,
            layout,
            rows,
        })
    }

    /// Render back to a raw table, rewriting only cells whose value changed.
    pub fn to_table(&self) -> Table {
        let rows = self
            .rows
            .iter()
            .map(|row| match row {
                Row::Person(p) => self.render(p),
                Row::Malformed(m) => m.cells.clone(),
            })
            .collect();
        Table {
            columns: self.columns.clone(),
            rows,
        }
    }

    fn render(&self, row: &PersonRow) -> Vec<String> {
        let mut cells = row.cells.clone();
        let (rec, old) = (&row.record, &row.loaded);
        if rec.chat_identity != old.chat_identity {
            cells[self.layout.chat] = rec.chat_identity.clone().unwrap_or_default();
        }
        if rec.event_date != old.event_date {
            cells[self.layout.date] = rec
                .event_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
        }
        for (threshold, idx) in &self.layout.flags {
            if rec.has_flag(*threshold) != old.has_flag(*threshold) {
                cells[*idx] = render_flag(rec.has_flag(*threshold)).to_string();
            }
        }
        cells
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Valid records in table order.
    pub fn people(&self) -> impl Iterator<Item = &PersonRecord> {
        self.rows.iter().filter_map(|r| match r {
            Row::Person(p) => Some(&p.record),
            Row::Malformed(_) => None,
        })
    }

    /// Valid records in table order, mutably. Names are not to be changed.
    pub fn people_mut(&mut self) -> impl Iterator<Item = &mut PersonRecord> {
        self.rows.iter_mut().filter_map(|r| match r {
            Row::Person(p) => Some(&mut p.record),
            Row::Malformed(_) => None,
        })
    }

    /// First record whose name matches `text` (trimmed, case-insensitive).
    pub fn find_by_name_mut(&mut self, text: &str) -> Option<&mut PersonRecord> {
        self.people_mut().find(|r| r.matches_name(text))
    }

    pub fn find_by_name(&self, text: &str) -> Option<&PersonRecord> {
        self.people().find(|r| r.matches_name(text))
    }

    pub fn malformed(&self) -> impl Iterator<Item = &MalformedRow> {
        self.rows.iter().filter_map(|r| match r {
            Row::Malformed(m) => Some(m),
            Row::Person(_) => None,
        })
    }

    /// Log every malformed row. Returns how many there were.
    pub fn report_malformed(&self) -> usize {
        let mut count = 0;
        for m in self.malformed() {
            warn!("roster: skipping {}", m.to_error());
            count += 1;
        }
        count
    }

    /// Whether any record differs from what was loaded.
    pub fn is_dirty(&self) -> bool {
        self.rows.iter().any(|r| match r {
            Row::Person(p) => p.record != p.loaded,
            Row::Malformed(_) => false,
        })
    }

    /// Number of rows, malformed included.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn parse_record(cells: &[String], layout: &Columns) -> Result<PersonRecord, String> {
    let name = cells[layout.name].trim();
    if name.is_empty() {
        return Err(format!("empty '{NAME_COLUMN}'"));
    }

    let mut record = PersonRecord::new(name);
    record.chat_identity = normalize_chat_id(&cells[layout.chat]);
    record.event_date = parse_date(&cells[layout.date])
        .map_err(|raw| format!("unparseable '{DATE_COLUMN}' value '{raw}'"))?;
    let label = cells[layout.label].trim();
    if !label.is_empty() {
        record.event_label = Some(label.to_string());
    }
    for (threshold, idx) in &layout.flags {
        if parse_flag(&cells[*idx]) {
            record.mark(*threshold);
        }
    }
    Ok(record)
}

fn find_column(columns: &[String], name: &str) -> Option<usize> {
    columns
        .iter()
        .position(|c| c.trim().eq_ignore_ascii_case(name))
}

fn is_blank(cells: &[String]) -> bool {
    cells.iter().all(|c| c.trim().is_empty())
}

/// Parse a date cell. Empty is `Ok(None)`; garbage is `Err(raw)`.
pub fn parse_date(raw: &str) -> Result<Option<NaiveDate>, String> {
    let s = raw.trim();
    if s.is_empty() {
        return Ok(None);
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(Some(d));
        }
    }
    // Datetime cells: take the leading date.
    if let Some((head, _)) = s.split_once(['T', ' ']) {
        if let Ok(d) = NaiveDate::parse_from_str(head, "%Y-%m-%d") {
            return Ok(Some(d));
        }
    }
    Err(s.to_string())
}

/// Chat IDs arrive as text or as spreadsheet numbers (`12345.0`).
pub fn normalize_chat_id(raw: &str) -> Option<String> {
    let s = raw.trim();
    let s = s.strip_suffix(".0").unwrap_or(s);
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "1" | "x"
    )
}

fn render_flag(set: bool) -> &'static str {
    if set {
        "TRUE"
    } else {
        "FALSE"
    }
}
