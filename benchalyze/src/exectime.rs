// Execution time per phase or query: the number of runs, the average time, its sample standard
// deviation and standard error.
//
// Per-iteration groups give a single "Aggregate" row from the total each iteration reported.
// Per-phase groups give one row per phase, pooled over the iterations.  Per-query groups give one
// row per query timing file, from the individual runs recorded in it.

use crate::configs::Settings;
use crate::report::{self, or_log, phase_label, summary_cells, Options};
use crate::workbook::{Cell, Sheet};
use anyhow::Result;
use benchlog::{
    find_query_files, read_run_times, read_timestamp_log, summarize, Group, Label, Layout,
    TimestampLog,
};
use log::debug;
use std::io;
use std::path::Path;

pub const STEM: &str = "query_execution_times_avg_combined";

pub const COLUMNS: [&str; 5] = [
    "Phase",
    "Runs",
    "Average Time (s)",
    "Sample Std Deviation (s)",
    "Std Error (s)",
];

const TIMESTAMPS: &str = "ilo_power_timestamps.txt";

pub fn run(output: &mut dyn io::Write, base: &Path, opts: &Options) -> Result<()> {
    report::for_each_group(output, base, STEM, opts, analyze_group)
}

pub fn analyze_group(group: &Group, layout: &Layout, _settings: &Settings) -> Result<Sheet> {
    let mut sheet = Sheet::new(&group.coordinate.key(), &COLUMNS);
    match layout {
        Layout::Iterations(iterations) => {
            let times = iterations
                .iter()
                .filter_map(|(_, dir)| duration(&read_timestamp_log(&dir.join(TIMESTAMPS)), None))
                .collect::<Vec<f64>>();
            push_times(&mut sheet, Label::Aggregate, &times)?;
        }
        Layout::Phases { iterations, phases } => {
            for phase in phases {
                let label = phase_label(phase);
                let times = iterations
                    .iter()
                    .filter_map(|(_, dir)| {
                        let log = read_timestamp_log(&dir.join(phase).join(TIMESTAMPS));
                        duration(&log, Some(&label))
                    })
                    .collect::<Vec<f64>>();
                push_times(&mut sheet, label, &times)?;
            }
        }
        Layout::Queries => {
            for (q, path) in find_query_files(&group.path.join("QueriesTiming"), "query_")? {
                if let Some(times) = or_log(read_run_times(&path)) {
                    push_times(&mut sheet, Label::Query(q), &times)?;
                }
            }
        }
    }
    Ok(sheet)
}

// The harness's own total is preferred, then the labeled interval, then the global interval.
fn duration(log: &TimestampLog, label: Option<&Label>) -> Option<f64> {
    if let Some(t) = log.total_seconds() {
        return Some(t as f64);
    }
    let iv = label.and_then(|l| log.get(l)).or(log.global());
    if iv.is_none() {
        debug!("Timestamp log without a duration");
    }
    iv.map(|iv| iv.seconds() as f64)
}

fn push_times(sheet: &mut Sheet, label: Label, times: &[f64]) -> Result<()> {
    if times.is_empty() {
        return Ok(());
    }
    let s = summarize(times);
    let mut row = vec![Cell::text(label), Cell::Int(s.n as i64)];
    row.extend(summary_cells(&s));
    sheet.push_row(row)
}

#[cfg(test)]
use crate::report::{close, group_sheet};

#[test]
fn test_exectime_iterations() {
    let s = group_sheet(10, "SF10_F1.0_Csv", analyze_group, &Settings::default()).unwrap();
    assert!(s.name() == "F1.0_Csv");
    assert!(s.rows().len() == 1);
    let row = &s.rows()[0];
    assert!(row[0] == Cell::text("Aggregate"));
    assert!(row[1] == Cell::Int(3));
    assert!(close(&row[2], 75.0));
    assert!(close(&row[3], 15.0));
    assert!(close(&row[4], 15.0 / 3f64.sqrt()));

    // One run, no spread
    let s = group_sheet(10, "SF10_F1.0_Parquet", analyze_group, &Settings::default()).unwrap();
    assert!(s.rows()[0][1] == Cell::Int(1));
    assert!(s.rows()[0][3] == Cell::Missing);
}

#[test]
fn test_exectime_phases() {
    let s = group_sheet(30, "SF30_F1.5", analyze_group, &Settings::default()).unwrap();
    let labels = s.rows().iter().map(|r| r[0].to_string()).collect::<Vec<String>>();
    assert!(labels == vec!["Filtering", "Joining"]);
    assert!(close(&s.rows()[0][2], 25.0));
    assert!(close(&s.rows()[1][2], 45.0));
}

#[test]
fn test_exectime_queries() {
    let s = group_sheet(20, "SF20_F2.0_T4", analyze_group, &Settings::default()).unwrap();
    let labels = s.rows().iter().map(|r| r[0].to_string()).collect::<Vec<String>>();
    assert!(labels == vec!["Query 1", "Query 2", "Query 11"]);
    assert!(close(&s.rows()[0][2], 2.0));
    assert!(s.rows()[1][1] == Cell::Int(1));
    assert!(s.rows()[1][3] == Cell::Missing);
    assert!(close(&s.rows()[2][2], 5.0));
    assert!(close(&s.rows()[2][3], 1.0));
}
