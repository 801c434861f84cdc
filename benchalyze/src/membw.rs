// Memory bandwidth from pcm: the number of throughput readings, their average and maximum, per
// iteration, phase or query, and over all of them.
//
// In per-query groups every query up to the configured query count gets a row, so that sheets from
// different groups line up; queries without data show N/A.

use crate::configs::Settings;
use crate::report::{self, or_log, phase_label, Options};
use crate::workbook::{Cell, Sheet};
use anyhow::Result;
use benchlog::{extent, find_files, find_query_files, read_memory_throughput, Group, Label, Layout};
use itertools::Itertools;
use log::debug;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;

pub const STEM: &str = "memory_bandwidth_combined";

pub const COLUMNS: [&str; 4] = [
    "Phase",
    "Samples",
    "Average Throughput (MB/s)",
    "Max Throughput (MB/s)",
];

pub fn run(output: &mut dyn io::Write, base: &Path, opts: &Options) -> Result<()> {
    report::for_each_group(output, base, STEM, opts, analyze_group)
}

pub fn analyze_group(group: &Group, layout: &Layout, settings: &Settings) -> Result<Sheet> {
    let mut sheet = Sheet::new(&group.coordinate.key(), &COLUMNS);
    let mut all = vec![];
    match layout {
        Layout::Iterations(iterations) => {
            for (n, dir) in iterations {
                let files = find_files(dir, r"pcm_stats.*\.txt")?;
                if files.is_empty() {
                    debug!("{}: no pcm output", dir.display());
                    continue;
                }
                let xs = files
                    .iter()
                    .filter_map(|(_, path)| or_log(read_memory_throughput(path)))
                    .flatten()
                    .collect::<Vec<f64>>();
                push_throughput(&mut sheet, Label::Iteration(*n), &xs)?;
                all.extend(xs);
            }
        }
        Layout::Phases { phases, .. } => {
            let pcm = group.path.join("PCM");
            for phase in phases {
                if let Some(xs) = or_log(read_memory_throughput(&pcm.join(phase).join("pcm_stats.txt"))) {
                    push_throughput(&mut sheet, phase_label(phase), &xs)?;
                    all.extend(xs);
                }
            }
        }
        Layout::Queries => {
            let mut by_query = BTreeMap::<u32, Vec<f64>>::new();
            for (q, path) in find_query_files(&group.path.join("PCM"), "pcm_")? {
                if let Some(xs) = or_log(read_memory_throughput(&path)) {
                    by_query.insert(q, xs);
                }
            }
            if by_query.is_empty() {
                return Ok(sheet);
            }
            let queries = (1..=settings.query_count)
                .chain(by_query.keys().copied())
                .sorted()
                .dedup()
                .collect::<Vec<u32>>();
            for q in queries {
                let xs = by_query.remove(&q).unwrap_or_default();
                push_throughput(&mut sheet, Label::Query(q), &xs)?;
                all.extend(xs);
            }
        }
    }
    if !all.is_empty() {
        push_throughput(&mut sheet, Label::Aggregate, &all)?;
    }
    Ok(sheet)
}

fn push_throughput(sheet: &mut Sheet, label: Label, xs: &[f64]) -> Result<()> {
    let e = extent(xs);
    sheet.push_row(vec![
        Cell::text(label),
        Cell::Int(xs.len() as i64),
        Cell::maybe_float(e.map(|e| e.mean)),
        Cell::maybe_float(e.map(|e| e.max)),
    ])
}

#[cfg(test)]
use crate::report::{close, group_sheet};

#[test]
fn test_membw_iterations() {
    let s = group_sheet(10, "SF10_F1.0_Csv", analyze_group, &Settings::default()).unwrap();
    let labels = s.rows().iter().map(|r| r[0].to_string()).collect::<Vec<String>>();
    assert!(labels == vec!["Iteration 1", "Iteration 2", "Aggregate"]);
    assert!(s.rows()[0][1] == Cell::Int(2));
    assert!(close(&s.rows()[0][2], 2000.0));
    assert!(close(&s.rows()[0][3], 3000.0));
    assert!(s.rows()[2][1] == Cell::Int(3));
    assert!(close(&s.rows()[2][2], 2000.0));
    assert!(close(&s.rows()[2][3], 3000.0));
}

#[test]
fn test_membw_phases() {
    let s = group_sheet(30, "SF30_F1.5", analyze_group, &Settings::default()).unwrap();
    let labels = s.rows().iter().map(|r| r[0].to_string()).collect::<Vec<String>>();
    assert!(labels == vec!["Filtering", "Aggregate"]);
    assert!(close(&s.rows()[0][2], 1234.5));
}

#[test]
fn test_membw_queries_padded() {
    let three = Settings {
        query_count: 3,
        ..Settings::default()
    };
    let s = group_sheet(20, "SF20_F2.0_T4", analyze_group, &three).unwrap();
    let labels = s.rows().iter().map(|r| r[0].to_string()).collect::<Vec<String>>();
    assert!(labels == vec!["Query 1", "Query 2", "Query 3", "Aggregate"]);
    assert!(close(&s.rows()[0][2], 600.0));
    assert!(close(&s.rows()[0][3], 700.0));
    assert!(s.rows()[1][1] == Cell::Int(0));
    assert!(s.rows()[1][2] == Cell::Missing);
    assert!(s.rows()[2][3] == Cell::Missing);

    let s = group_sheet(20, "SF20_F2.0_T4", analyze_group, &Settings::default()).unwrap();
    assert!(s.rows().len() == 23);
}
