// Formatting of a sheet for the terminal, columnar or as csv, with or without a header.

use crate::workbook::Sheet;
use anyhow::Result;
use std::io;

/// Set `header` to true to print a first row with the column names as a header (independent of
/// csv).  Set `csv` to true to get CSV output instead of fixed-format.

pub fn format_sheet(output: &mut dyn io::Write, sheet: &Sheet, header: bool, csv: bool) -> Result<()> {
    let cols = sheet
        .rows()
        .iter()
        .map(|row| row.iter().map(|c| c.to_string()).collect::<Vec<String>>())
        .collect::<Vec<Vec<String>>>();
    let fields = sheet.columns();

    if csv {
        let mut writer = ::csv::Writer::from_writer(output);
        if header {
            writer.write_record(fields)?;
        }
        for row in &cols {
            writer.write_record(row)?;
        }
        writer.flush()?;
        return Ok(());
    }

    // The column width is the max across all the entries in the column (including header, if
    // present)
    let mut widths = vec![0; fields.len()];
    if header {
        for (w, kwd) in widths.iter_mut().zip(fields) {
            *w = usize::max(*w, kwd.len());
        }
    }
    for row in &cols {
        for (w, val) in widths.iter_mut().zip(row) {
            *w = usize::max(*w, val.len());
        }
    }

    if header {
        for (kwd, w) in fields.iter().zip(&widths) {
            write!(output, "{:w$}  ", kwd)?;
        }
        writeln!(output)?;
    }
    for row in &cols {
        for (val, w) in row.iter().zip(&widths) {
            write!(output, "{:w$}  ", val)?;
        }
        writeln!(output)?;
    }
    Ok(())
}

#[cfg(test)]
use crate::workbook::Cell;

#[cfg(test)]
fn sample_sheet() -> Sheet {
    let mut s = Sheet::new("SF1_F1.0", &["Phase", "Runs", "Average Time (s)"]);
    s.push_row(vec![Cell::text("Query 1"), Cell::Int(2), Cell::Float(2.0)])
        .unwrap();
    s.push_row(vec![Cell::text("Query 11"), Cell::Int(3), Cell::Missing])
        .unwrap();
    s
}

#[test]
fn test_format_fixed() {
    let mut out = vec![];
    format_sheet(&mut out, &sample_sheet(), true, false).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines = text.lines().collect::<Vec<&str>>();
    assert!(lines.len() == 3);
    assert!(lines[0] == "Phase     Runs  Average Time (s)  ");
    assert!(lines[1] == "Query 1   2     2.0               ");
    assert!(lines[2] == "Query 11  3     N/A               ");
}

#[test]
fn test_format_csv() {
    let mut out = vec![];
    format_sheet(&mut out, &sample_sheet(), false, true).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text == "Query 1,2,2.0\nQuery 11,3,N/A\n");
}
