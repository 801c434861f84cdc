// Sorted views of the power and energy workbooks: every sheet with its rows in ascending order of
// average power or energy, rows without a value last.

use crate::energy;
use crate::power;
use crate::report::{self, Options};
use crate::workbook::{Cell, Sheet, Workbook};
use anyhow::Result;
use log::warn;
use std::cmp::Ordering;
use std::io;
use std::path::Path;

pub const POWER_STEM: &str = "power_metrics_sorted";
pub const ENERGY_STEM: &str = "energy_metrics_sorted";

// (input workbook, output workbook, sort column)
const VIEWS: [(&str, &str, &str); 2] = [
    (power::STEM, POWER_STEM, "Average Power"),
    (energy::STEM, ENERGY_STEM, "Energy (J)"),
];

pub fn run(output: &mut dyn io::Write, base: &Path, opts: &Options) -> Result<()> {
    report::for_each_scale_factor(output, base, opts, derive)
}

/// The sorted workbooks for one scale factor.  A missing input workbook is logged and its view is
/// left out.

pub fn derive(sf_dir: &Path) -> Result<Vec<Workbook>> {
    let mut workbooks = vec![];
    for (input, stem, column) in VIEWS {
        let source = match Workbook::read(sf_dir, input) {
            Ok(wb) => wb,
            Err(e) => {
                warn!("{e:#}");
                continue;
            }
        };
        let mut workbook = Workbook::new(stem);
        for sheet in source.sheets() {
            match sort_sheet(sheet, column) {
                Some(sorted) => workbook.add_sheet(sorted),
                None => warn!("Sheet {} of {input} has no column '{column}'", sheet.name()),
            }
        }
        workbooks.push(workbook);
    }
    Ok(workbooks)
}

fn sort_sheet(sheet: &Sheet, column: &str) -> Option<Sheet> {
    let col = sheet.column_index(column)?;
    let key = |row: &Vec<Cell>| row.get(col).and_then(|c| c.as_f64());
    Some(sheet.sorted_by(|a, b| match (key(a), key(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }))
}

#[test]
fn test_sort_missing_last() {
    let mut s = Sheet::new("F1.0_Csv", &["Phase", "Energy (J)"]);
    for (phase, e) in [
        ("Query 1", Cell::Float(30.0)),
        ("Query 2", Cell::Missing),
        ("Query 3", Cell::Float(10.0)),
        ("Query 4", Cell::Int(20)),
        ("Query 5", Cell::Missing),
    ] {
        s.push_row(vec![Cell::text(phase), e]).unwrap();
    }
    let sorted = sort_sheet(&s, "Energy (J)").unwrap();
    let order = sorted.rows().iter().map(|r| r[0].to_string()).collect::<Vec<String>>();
    assert!(order == vec!["Query 3", "Query 4", "Query 1", "Query 2", "Query 5"]);
    assert!(sort_sheet(&s, "Average Power").is_none());
}

#[test]
fn test_sorted_workbooks() {
    let tmp = tempfile::tempdir().unwrap();
    let mut wb = Workbook::new(power::STEM);
    let mut s = Sheet::new("F1.0_Csv", &["Phase", "Average Power"]);
    s.push_row(vec![Cell::text("Iteration 1"), Cell::Float(250.0)])
        .unwrap();
    s.push_row(vec![Cell::text("Idle"), Cell::Float(150.0)]).unwrap();
    wb.add_sheet(s);
    wb.write(tmp.path()).unwrap();

    // No energy workbook: only the power view is produced
    let views = derive(tmp.path()).unwrap();
    assert!(views.len() == 1);
    assert!(views[0].stem() == POWER_STEM);
    assert!(views[0].sheets()[0].rows()[0][0] == Cell::text("Idle"));
}
