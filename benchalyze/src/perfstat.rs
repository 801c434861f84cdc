// Hardware counters and top-down breakdown from perf stat, per iteration, phase or query.
//
// Each run has a counter file for the measured process and a system-wide file with the top-down
// metrics.  Either may be missing, leaving its columns N/A.  Per-iteration groups get an
// "Aggregate" row with the mean of the defined values of each column.  Per-query groups get a row
// for every query up to the configured count.

use crate::configs::Settings;
use crate::report::{self, column_means, or_log, phase_label, Options};
use crate::workbook::{Cell, Sheet};
use anyhow::Result;
use benchlog::{
    find_query_files, read_perf_counters, read_topdown, Group, Label, Layout, PerfCounters,
    Topdown,
};
use itertools::Itertools;
use log::debug;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

pub const STEM: &str = "perf_stats_combined";

pub const COLUMNS: [&str; 11] = [
    "Phase",
    "Insn per Cycle",
    "Instructions",
    "Branch Misses",
    "LLC Load Misses",
    "Branch Misses per 1000 Instructions",
    "LLC Load Misses per 1000 Instructions",
    "Retiring",
    "Bad Speculation",
    "Frontend Bound",
    "Backend Bound",
];

const SYSTEM_FILE: &str = "perf_stats_system.txt";
const PROCESS_FILE: &str = "perf_stats_process.txt";

pub fn run(output: &mut dyn io::Write, base: &Path, opts: &Options) -> Result<()> {
    report::for_each_group(output, base, STEM, opts, analyze_group)
}

pub fn analyze_group(group: &Group, layout: &Layout, settings: &Settings) -> Result<Sheet> {
    let mut sheet = Sheet::new(&group.coordinate.key(), &COLUMNS);
    match layout {
        Layout::Iterations(iterations) => {
            for (n, dir) in iterations {
                // Older runs wrote the counters to perf_stats_metrics.txt
                let metrics = dir.join("perf_stats_metrics.txt");
                let process = if metrics.is_file() { metrics } else { dir.join(PROCESS_FILE) };
                if let Some(row) = read_row(Label::Iteration(*n), &process, &dir.join(SYSTEM_FILE)) {
                    sheet.push_row(row)?;
                }
            }
            if !sheet.is_empty() {
                let mut row = vec![Cell::text(Label::Aggregate)];
                row.extend(column_means(sheet.rows(), COLUMNS.len()));
                sheet.push_row(row)?;
            }
        }
        Layout::Phases { phases, .. } => {
            let perf = group.path.join("PerfStat");
            for phase in phases {
                let dir = perf.join(phase);
                if let Some(row) = read_row(phase_label(phase), &dir.join(PROCESS_FILE), &dir.join(SYSTEM_FILE)) {
                    sheet.push_row(row)?;
                }
            }
        }
        Layout::Queries => {
            let perf = group.path.join("PerfStat");
            let process = find_query_files(&perf, "perf_stats_process_")?
                .into_iter()
                .collect::<BTreeMap<u32, PathBuf>>();
            let system = find_query_files(&perf, "perf_stats_system_")?
                .into_iter()
                .collect::<BTreeMap<u32, PathBuf>>();
            if process.is_empty() && system.is_empty() {
                return Ok(sheet);
            }
            let queries = (1..=settings.query_count)
                .chain(process.keys().copied())
                .chain(system.keys().copied())
                .sorted()
                .dedup();
            for q in queries {
                let label = Label::Query(q);
                let row = match (process.get(&q), system.get(&q)) {
                    (None, None) => missing_row(label),
                    (p, s) => {
                        let counters = p.and_then(|p| or_log(read_perf_counters(p)));
                        let topdown = s.and_then(|s| or_log(read_topdown(s)));
                        make_row(label, &counters.unwrap_or_default(), &topdown.unwrap_or_default())
                    }
                };
                sheet.push_row(row)?;
            }
        }
    }
    Ok(sheet)
}

// None if neither file exists.
fn read_row(label: Label, process: &Path, system: &Path) -> Option<Vec<Cell>> {
    if !process.is_file() && !system.is_file() {
        debug!("No perf stat files for {label}");
        return None;
    }
    let counters = if process.is_file() {
        or_log(read_perf_counters(process)).unwrap_or_default()
    } else {
        PerfCounters::default()
    };
    let topdown = if system.is_file() {
        or_log(read_topdown(system)).unwrap_or_default()
    } else {
        Topdown::default()
    };
    Some(make_row(label, &counters, &topdown))
}

fn make_row(label: Label, c: &PerfCounters, t: &Topdown) -> Vec<Cell> {
    vec![
        Cell::text(label),
        Cell::maybe_float(c.insn_per_cycle),
        Cell::maybe_int(c.instructions),
        Cell::maybe_int(c.branch_misses),
        Cell::maybe_int(c.llc_load_misses),
        Cell::maybe_float(c.branch_misses_per_kilo_instructions()),
        Cell::maybe_float(c.llc_load_misses_per_kilo_instructions()),
        Cell::maybe_float(t.retiring),
        Cell::maybe_float(t.bad_speculation),
        Cell::maybe_float(t.frontend_bound),
        Cell::maybe_float(t.backend_bound),
    ]
}

fn missing_row(label: Label) -> Vec<Cell> {
    let mut row = vec![Cell::text(label)];
    row.resize(COLUMNS.len(), Cell::Missing);
    row
}

#[cfg(test)]
use crate::report::{close, group_sheet};

#[test]
fn test_perf_iterations() {
    let s = group_sheet(10, "SF10_F1.0_Csv", analyze_group, &Settings::default()).unwrap();
    let labels = s.rows().iter().map(|r| r[0].to_string()).collect::<Vec<String>>();
    assert!(labels == vec!["Iteration 1", "Iteration 2", "Aggregate"]);

    let it1 = &s.rows()[0];
    assert!(close(&it1[1], 1.5));
    assert!(it1[2] == Cell::Int(1_000_000));
    assert!(close(&it1[5], 2.0));
    assert!(close(&it1[6], 0.5));
    assert!(close(&it1[7], 30.0));

    // Iteration 2 has no system-wide file
    let it2 = &s.rows()[1];
    assert!(it2[3] == Cell::Int(3000));
    assert!(it2[7] == Cell::Missing);

    let agg = &s.rows()[2];
    assert!(close(&agg[1], 2.0));
    assert!(close(&agg[2], 2_000_000.0));
    assert!(close(&agg[5], 1.5));
    assert!(close(&agg[7], 30.0));
}

#[test]
fn test_perf_phases() {
    let s = group_sheet(30, "SF30_F1.5", analyze_group, &Settings::default()).unwrap();
    assert!(s.rows().len() == 1);
    assert!(s.rows()[0][0] == Cell::text("Filtering"));
    assert!(close(&s.rows()[0][1], 0.75));
    assert!(close(&s.rows()[0][6], 0.05));
    assert!(s.rows()[0][10] == Cell::Missing);
}

#[test]
fn test_perf_queries() {
    let two = Settings {
        query_count: 2,
        ..Settings::default()
    };
    let s = group_sheet(20, "SF20_F2.0_T4", analyze_group, &two).unwrap();
    assert!(s.rows().len() == 2);
    assert!(close(&s.rows()[0][1], 1.25));
    assert!(close(&s.rows()[0][7], 40.0));
    assert!(close(&s.rows()[0][10], 25.0));
    assert!(s.rows()[1][0] == Cell::text("Query 2"));
    assert!(s.rows()[1][1..].iter().all(|c| c.is_missing()));
}
