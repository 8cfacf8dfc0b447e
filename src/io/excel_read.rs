use std::collections::HashMap;
use std::path::Path;

use calamine::{DataType, Range, Reader, Xlsx, open_workbook};
use tracing::debug;

use crate::error::{Result, ToolError};
use crate::io::into_ledger;
use crate::model::{CellValue, Ledger, SheetLayout, TypedCell};

/// Reads the ledger from the only worksheet of the workbook at `path`.
///
/// The returned ledger remembers the sheet name, where the table starts and
/// which cells held numbers, booleans or dates, so that
/// [`excel_write`](crate::io::excel_write) can put them back as they were.
pub fn read_ledger(path: &Path) -> Result<Ledger> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let sheet_name = single_sheet_name(&workbook, path)?;
    let range = read_first_sheet(&mut workbook, path)?;

    let (rows, typed) = range_to_rows(&range);
    let mut ledger = into_ledger(rows, path)?;

    let width = ledger.headers.len();
    for row in &mut ledger.rows {
        if row.len() < width {
            row.resize(width, String::new());
        }
    }

    ledger.layout = Some(SheetLayout {
        sheet_name,
        origin: range.start().unwrap_or((0, 0)),
        typed,
    });

    debug!(row_count = ledger.rows.len(), "loaded workbook ledger");
    Ok(ledger)
}

/// Only single-sheet workbooks are accepted: the codec rewrites the whole file
/// and would otherwise drop every other sheet.
fn single_sheet_name<R: std::io::Read + std::io::Seek>(
    workbook: &Xlsx<R>,
    path: &Path,
) -> Result<String> {
    match workbook.sheet_names() {
        [] => Err(ToolError::InvalidLedger(format!(
            "{} contains no worksheet",
            path.display()
        ))),
        [name] => Ok(name.clone()),
        names => Err(ToolError::InvalidLedger(format!(
            "{} has {} worksheets; a ledger workbook must hold exactly one",
            path.display(),
            names.len()
        ))),
    }
}

fn read_first_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    path: &Path,
) -> Result<Range<DataType>> {
    let range_result = workbook.worksheet_range_at(0).ok_or_else(|| {
        ToolError::InvalidLedger(format!("{} contains no worksheet", path.display()))
    })?;
    let range = range_result.map_err(ToolError::from)?;
    Ok(range)
}

/// String view of every row in the range, plus the typed cells below the
/// header keyed by their position in the ledger body.
fn range_to_rows(
    range: &Range<DataType>,
) -> (Vec<Vec<String>>, HashMap<(usize, usize), TypedCell>) {
    let mut typed = HashMap::new();
    let rows = range
        .rows()
        .enumerate()
        .map(|(row_idx, row)| {
            row.iter()
                .enumerate()
                .map(|(col_idx, cell)| {
                    let text = cell_to_string(Some(cell));
                    if row_idx > 0 {
                        if let Some(value) = cell_value(cell) {
                            typed.insert(
                                (row_idx - 1, col_idx),
                                TypedCell {
                                    value,
                                    text: text.clone(),
                                },
                            );
                        }
                    }
                    text
                })
                .collect()
        })
        .collect();

    (rows, typed)
}

fn cell_value(cell: &DataType) -> Option<CellValue> {
    match cell {
        DataType::Float(value) => Some(CellValue::Number(*value)),
        DataType::Int(value) => Some(CellValue::Number(*value as f64)),
        DataType::Bool(value) => Some(CellValue::Bool(*value)),
        DataType::DateTime(serial) => Some(CellValue::DateTime(*serial)),
        _ => None,
    }
}

fn cell_to_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(DataType::String(value)) => value.clone(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string(),
        Some(DataType::DateTime(serial)) => date_to_string(*serial),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn date_to_string(serial: f64) -> String {
    let pattern = if serial.fract() == 0.0 {
        "%Y-%m-%d"
    } else {
        "%Y-%m-%d %H:%M:%S"
    };
    match DataType::DateTime(serial).as_datetime() {
        Some(datetime) => datetime.format(pattern).to_string(),
        None => serial.to_string(),
    }
}
