// Disk volume from iostat: kB read and written by the selected devices, per iteration (plus their
// sum), per phase (summed over iterations) or per query.

use crate::configs::Settings;
use crate::report::{self, or_log, phase_label, query_logs, Options};
use crate::workbook::{Cell, Sheet};
use anyhow::Result;
use benchlog::{read_iostat, Group, IoTotals, Label, Layout};
use std::io;
use std::path::Path;

pub const STEM: &str = "io_metrics_combined";

pub const COLUMNS: [&str; 3] = ["Phase", "kB_read", "kB_wrtn"];

const IOSTAT_LOG: &str = "iostat.log";

pub fn run(output: &mut dyn io::Write, base: &Path, opts: &Options) -> Result<()> {
    report::for_each_group(output, base, STEM, opts, analyze_group)
}

pub fn analyze_group(group: &Group, layout: &Layout, settings: &Settings) -> Result<Sheet> {
    let mut sheet = Sheet::new(&group.coordinate.key(), &COLUMNS);
    let devices = &settings.devices;
    match layout {
        Layout::Iterations(iterations) => {
            let mut total = IoTotals::default();
            let mut any = false;
            for (n, dir) in iterations {
                if let Some(t) = or_log(read_iostat(&dir.join(IOSTAT_LOG), devices)) {
                    push_totals(&mut sheet, Label::Iteration(*n), &t)?;
                    total += t;
                    any = true;
                }
            }
            if any {
                push_totals(&mut sheet, Label::Aggregate, &total)?;
            }
        }
        Layout::Phases { iterations, phases } => {
            for phase in phases {
                let mut total = IoTotals::default();
                let mut any = false;
                for (_, dir) in iterations {
                    if let Some(t) = or_log(read_iostat(&dir.join(phase).join(IOSTAT_LOG), devices)) {
                        total += t;
                        any = true;
                    }
                }
                if any {
                    push_totals(&mut sheet, phase_label(phase), &total)?;
                }
            }
        }
        Layout::Queries => {
            for (q, paths) in query_logs(&group.path.join("Iostat"), "iostat_")? {
                let mut total = IoTotals::default();
                let mut any = false;
                for path in &paths {
                    if let Some(t) = or_log(read_iostat(path, devices)) {
                        total += t;
                        any = true;
                    }
                }
                if any {
                    push_totals(&mut sheet, Label::Query(q), &total)?;
                }
            }
        }
    }
    Ok(sheet)
}

fn push_totals(sheet: &mut Sheet, label: Label, t: &IoTotals) -> Result<()> {
    sheet.push_row(vec![
        Cell::text(label),
        Cell::float(t.kb_read),
        Cell::float(t.kb_wrtn),
    ])
}

#[cfg(test)]
use crate::report::group_sheet;

#[test]
fn test_io_iterations() {
    let s = group_sheet(10, "SF10_F1.0_Csv", analyze_group, &Settings::default()).unwrap();
    let labels = s.rows().iter().map(|r| r[0].to_string()).collect::<Vec<String>>();
    assert!(labels == vec!["Iteration 1", "Iteration 2", "Aggregate"]);
    assert!(s.rows()[0][1] == Cell::Float(100.0));
    assert!(s.rows()[1][1] == Cell::Float(210.0));
    assert!(s.rows()[1][2] == Cell::Float(20.0));
    assert!(s.rows()[2][1] == Cell::Float(310.0));
    assert!(s.rows()[2][2] == Cell::Float(70.0));

    let only_sdb = Settings {
        devices: vec!["sdb".to_string()],
        ..Settings::default()
    };
    let s = group_sheet(10, "SF10_F1.0_Csv", analyze_group, &only_sdb).unwrap();
    assert!(s.rows()[2][1] == Cell::Float(10.0));
}

#[test]
fn test_io_phases_and_queries() {
    let s = group_sheet(30, "SF30_F1.5", analyze_group, &Settings::default()).unwrap();
    assert!(s.rows().len() == 1);
    assert!(s.rows()[0] == vec![Cell::text("Filtering"), Cell::Float(300.0), Cell::Float(30.0)]);

    let s = group_sheet(20, "SF20_F2.0_T4", analyze_group, &Settings::default()).unwrap();
    assert!(s.rows() == [vec![Cell::text("Query 1"), Cell::Float(10.0), Cell::Float(20.0)]]);
}

#[test]
fn test_io_queries_from_iteration_files() {
    let s = group_sheet(20, "SF20_F2.0_T8", analyze_group, &Settings::default()).unwrap();
    assert!(s.rows() == [vec![Cell::text("Query 1"), Cell::Float(16.0), Cell::Float(26.0)]]);
}
