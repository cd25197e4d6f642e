//! Table Extractor
//!
//! Turns the inner markup of an HTML table into row records keyed by the
//! resolved header labels. Multi-row headers with `colspan`/`rowspan` are
//! flattened by stacking the labels of each column.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use tracing::debug;

/// Browsers clamp spans to this value as well
const MAX_SPAN: usize = 1000;

/// Rows may be this many fields short of the header width and still be kept
const RAGGED_TOLERANCE: usize = 2;

lazy_static::lazy_static! {
    static ref ROW_SELECTOR: Selector = Selector::parse("tr").unwrap();
    static ref INTEGER: Regex = Regex::new(r"^-?\d+$").unwrap();
}

#[derive(Debug, Clone)]
struct Cell {
    text: String,
    colspan: usize,
    rowspan: usize,
}

impl Cell {
    fn is_single(&self) -> bool {
        self.colspan == 1 && self.rowspan == 1
    }
}

/// Extract row records from table markup (`<thead>`, `<tbody>` or bare `<tr>`
/// content; a full `<table>` element works as well).
pub fn extract(markup: &str) -> Vec<Value> {
    let document = Html::parse_fragment(&format!("<table>{}</table>", markup));
    let rows: Vec<Vec<Cell>> = document.select(&ROW_SELECTOR).map(row_cells).collect();

    if rows.is_empty() {
        return Vec::new();
    }

    // The first row made only of single-span cells closes the header
    let mut resolved = rows.len();
    for (i, row) in rows.iter().enumerate() {
        if row.iter().all(Cell::is_single) {
            resolved = i + 1;
            break;
        }
    }

    let max_rowspan = rows[..resolved]
        .iter()
        .flat_map(|row| row.iter().map(|cell| cell.rowspan))
        .max()
        .unwrap_or(1);
    let header_rows = resolved.max(max_rowspan).min(rows.len());

    let keys = header_keys(&rows[..header_rows]);
    debug!(
        "Table header resolved: {} row(s), {} column(s)",
        header_rows,
        keys.len()
    );

    rows[header_rows..]
        .iter()
        .filter_map(|row| build_record(&keys, row))
        .collect()
}

fn row_cells(row: ElementRef<'_>) -> Vec<Cell> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| matches!(el.value().name(), "td" | "th"))
        .map(|el| Cell {
            text: normalize(&el.text().collect::<String>()),
            colspan: span(el.value().attr("colspan")),
            rowspan: span(el.value().attr("rowspan")),
        })
        .collect()
}

fn span(attr: Option<&str>) -> usize {
    attr.and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, MAX_SPAN)
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lay header cells out on a grid, copying spanned text down and across,
/// then stack each column's labels into one key.
fn header_keys(rows: &[Vec<Cell>]) -> Vec<String> {
    let mut grid: Vec<Vec<Option<String>>> = vec![Vec::new(); rows.len()];

    for (r, row) in rows.iter().enumerate() {
        let mut col = 0;
        for cell in row {
            while grid[r].get(col).map_or(false, Option::is_some) {
                col += 1;
            }
            for dr in 0..cell.rowspan {
                let Some(target) = grid.get_mut(r + dr) else {
                    break;
                };
                for dc in 0..cell.colspan {
                    let c = col + dc;
                    if target.len() <= c {
                        target.resize(c + 1, None);
                    }
                    target[c] = Some(cell.text.clone());
                }
            }
            col += cell.colspan;
        }
    }

    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    let mut keys: Vec<String> = Vec::with_capacity(width);

    for col in 0..width {
        let mut labels: Vec<&str> = Vec::new();
        for row in &grid {
            if let Some(Some(label)) = row.get(col) {
                if !label.is_empty() && labels.last() != Some(&label.as_str()) {
                    labels.push(label);
                }
            }
        }

        let mut key = if labels.is_empty() {
            format!("column{}", col + 1)
        } else {
            labels.join(" ")
        };
        if keys.contains(&key) {
            let base = key.clone();
            let mut n = 2;
            while keys.contains(&key) {
                key = format!("{}_{}", base, n);
                n += 1;
            }
        }
        keys.push(key);
    }

    keys
}

fn build_record(keys: &[String], row: &[Cell]) -> Option<Value> {
    let populated = row
        .iter()
        .take(keys.len())
        .filter(|cell| !cell.text.is_empty())
        .count();
    if populated + RAGGED_TOLERANCE < keys.len() {
        return None;
    }

    let record: Map<String, Value> = keys
        .iter()
        .zip(row.iter())
        .map(|(key, cell)| (key.clone(), coerce(&cell.text)))
        .collect();

    Some(Value::Object(record))
}

fn coerce(text: &str) -> Value {
    let trimmed = text.trim();
    if INTEGER.is_match(trimmed) {
        if let Ok(n) = trimmed.parse::<i64>() {
            return Value::from(n);
        }
    }
    Value::String(text.to_string())
}
