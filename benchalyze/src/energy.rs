// Energy = average execution time x average power, computed from the execution-time and power
// workbooks written earlier for the same scale factor.  For every sheet present in both, rows are
// joined on the Phase column; phases missing from either side are left out.

use crate::exectime;
use crate::power;
use crate::report::{self, Options};
use crate::workbook::{Cell, Sheet, Workbook};
use anyhow::{Context, Result};
use log::debug;
use std::io;
use std::path::Path;

pub const STEM: &str = "energy_metrics_combined";

pub const COLUMNS: [&str; 4] = ["Phase", "Average Time (s)", "Average Power (W)", "Energy (J)"];

pub fn run(output: &mut dyn io::Write, base: &Path, opts: &Options) -> Result<()> {
    report::for_each_scale_factor(output, base, opts, |sf_dir| Ok(vec![derive(sf_dir)?]))
}

pub fn derive(sf_dir: &Path) -> Result<Workbook> {
    let times = Workbook::read(sf_dir, exectime::STEM).context("Run exec-time first")?;
    let powers = Workbook::read(sf_dir, power::STEM).context("Run power first")?;
    let mut workbook = Workbook::new(STEM);
    for power_sheet in powers.sheets() {
        let Some(time_sheet) = times.sheet(power_sheet.name()) else {
            debug!("No execution times for sheet {}", power_sheet.name());
            continue;
        };
        let sheet = join(power_sheet, time_sheet)?;
        if !sheet.is_empty() {
            workbook.add_sheet(sheet);
        }
    }
    Ok(workbook)
}

fn join(power_sheet: &Sheet, time_sheet: &Sheet) -> Result<Sheet> {
    let mut sheet = Sheet::new(power_sheet.name(), &COLUMNS);
    let (Some(p_col), Some(t_col)) = (
        power_sheet.column_index("Average Power"),
        time_sheet.column_index("Average Time (s)"),
    ) else {
        debug!("Sheet {} lacks the columns to join", power_sheet.name());
        return Ok(sheet);
    };
    for row in power_sheet.rows() {
        let Some(phase) = row.first() else {
            continue;
        };
        let Some(time_row) = time_sheet.find_row(&phase.to_string()) else {
            continue;
        };
        let time = time_row.get(t_col).and_then(|c| c.as_f64());
        let power = row.get(p_col).and_then(|c| c.as_f64());
        let energy = match (time, power) {
            (Some(t), Some(p)) => Some(t * p),
            _ => None,
        };
        sheet.push_row(vec![
            phase.clone(),
            Cell::maybe_float(time),
            Cell::maybe_float(power),
            Cell::maybe_float(energy),
        ])?;
    }
    Ok(sheet)
}

#[cfg(test)]
fn sheet_of(name: &str, columns: &[&str], rows: Vec<Vec<Cell>>) -> Sheet {
    let mut s = Sheet::new(name, columns);
    for r in rows {
        s.push_row(r).unwrap();
    }
    s
}

#[test]
fn test_energy_join() {
    let tmp = tempfile::tempdir().unwrap();
    let sf_dir = tmp.path();

    let mut times = Workbook::new(exectime::STEM);
    times.add_sheet(sheet_of(
        "F1.0_Csv",
        &["Phase", "Runs", "Average Time (s)"],
        vec![vec![Cell::text("Aggregate"), Cell::Int(3), Cell::Float(75.0)]],
    ));
    times.add_sheet(sheet_of(
        "F2.0_Csv",
        &["Phase", "Runs", "Average Time (s)"],
        vec![
            vec![Cell::text("Query 1"), Cell::Int(2), Cell::Float(2.0)],
            vec![Cell::text("Query 2"), Cell::Int(1), Cell::Missing],
        ],
    ));
    times.write(sf_dir).unwrap();

    let mut powers = Workbook::new(power::STEM);
    powers.add_sheet(sheet_of(
        "F1.0_Csv",
        &["Phase", "Average Power"],
        vec![
            vec![Cell::text("Iteration 1"), Cell::Float(210.0)],
            vec![Cell::text("Aggregate"), Cell::Float(240.0)],
            vec![Cell::text("Idle"), Cell::Float(152.0)],
        ],
    ));
    powers.add_sheet(sheet_of(
        "F2.0_Csv",
        &["Phase", "Average Power"],
        vec![
            vec![Cell::text("Query 1"), Cell::Float(310.0)],
            vec![Cell::text("Query 2"), Cell::Float(340.0)],
        ],
    ));
    powers.add_sheet(sheet_of(
        "F3.0_Csv",
        &["Phase", "Average Power"],
        vec![vec![Cell::text("Query 1"), Cell::Float(1.0)]],
    ));
    powers.write(sf_dir).unwrap();

    let energy = derive(sf_dir).unwrap();
    assert!(energy.sheets().len() == 2);
    let s = &energy.sheets()[0];
    assert!(s.name() == "F1.0_Csv");
    assert!(s.rows().len() == 1);
    assert!(s.rows()[0] == vec![Cell::text("Aggregate"), Cell::Float(75.0), Cell::Float(240.0), Cell::Float(18000.0)]);

    let s = &energy.sheets()[1];
    assert!(s.rows()[0][3] == Cell::Float(620.0));
    assert!(s.rows()[1][1] == Cell::Missing);
    assert!(s.rows()[1][3] == Cell::Missing);
}

#[test]
fn test_energy_needs_inputs() {
    let tmp = tempfile::tempdir().unwrap();
    assert!(derive(tmp.path()).is_err());
}
