use std::path::Path;

use rust_xlsxwriter::{Format, Workbook, Worksheet};

use crate::error::Result;
use crate::model::{CellValue, Ledger};

/// Name given to the worksheet of a ledger that was not read from a workbook.
pub const LEDGER_SHEET: &str = "Ledger";

const DATE_FORMAT: &str = "yyyy-mm-dd";
const DATE_TIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// Writes the ledger as a single worksheet at the given path.
///
/// Cells are written as strings so identifiers and sizes survive untouched,
/// except those the ledger's [`SheetLayout`](crate::model::SheetLayout)
/// records as numbers, booleans or dates and that still hold their loaded
/// text. The sheet name and the table's position come from the layout too.
pub fn write_ledger(path: &Path, ledger: &Ledger) -> Result<()> {
    let layout = ledger.layout.as_ref();
    let sheet_name = layout.map_or(LEDGER_SHEET, |layout| layout.sheet_name.as_str());
    let (origin_row, origin_col) = layout.map_or((0, 0), |layout| layout.origin);

    let mut workbook_writer = Workbook::new();
    let worksheet = workbook_writer.add_worksheet();
    worksheet.set_name(sheet_name)?;

    let column = |col_idx: usize| (origin_col as usize + col_idx) as u16;

    for (col_idx, header) in ledger.headers.iter().enumerate() {
        if !header.is_empty() {
            worksheet.write_string(origin_row, column(col_idx), header)?;
        }
    }

    for (row_idx, row) in ledger.rows.iter().enumerate() {
        let sheet_row = origin_row + 1 + row_idx as u32;
        for (col_idx, cell) in row.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            match layout.and_then(|layout| layout.typed_value(row_idx, col_idx, cell)) {
                Some(value) => write_typed(worksheet, sheet_row, column(col_idx), value)?,
                None => {
                    worksheet.write_string(sheet_row, column(col_idx), cell)?;
                }
            }
        }
    }

    workbook_writer.save(path)?;
    Ok(())
}

fn write_typed(worksheet: &mut Worksheet, row: u32, col: u16, value: CellValue) -> Result<()> {
    match value {
        CellValue::Number(number) => {
            worksheet.write_number(row, col, number)?;
        }
        CellValue::Bool(flag) => {
            worksheet.write_boolean(row, col, flag)?;
        }
        CellValue::DateTime(serial) => {
            let pattern = if serial.fract() == 0.0 {
                DATE_FORMAT
            } else {
                DATE_TIME_FORMAT
            };
            let format = Format::new().set_num_format(pattern);
            worksheet.write_number_with_format(row, col, serial, &format)?;
        }
    }
    Ok(())
}
