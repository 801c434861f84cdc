// CPU utilisation from mpstat: min, max and average of %usr, %sys, %iowait and %idle, as three
// rows per iteration pool, phase or query.

use crate::configs::Settings;
use crate::report::{self, or_log, phase_label, query_logs, Options};
use crate::workbook::{Cell, Sheet};
use anyhow::Result;
use benchlog::{
    extent, read_mpstat, trim_edges, CpuSample, Extent, Group, Label, Layout,
};
use std::io;
use std::path::Path;

pub const STEM: &str = "cpu_metrics_combined";

pub const COLUMNS: [&str; 6] = ["Phase", "Statistic", "%usr", "%sys", "%iowait", "%idle"];

const MPSTAT_LOG: &str = "mpstat.log";

pub fn run(output: &mut dyn io::Write, base: &Path, opts: &Options) -> Result<()> {
    report::for_each_group(output, base, STEM, opts, analyze_group)
}

pub fn analyze_group(group: &Group, layout: &Layout, _settings: &Settings) -> Result<Sheet> {
    let mut sheet = Sheet::new(&group.coordinate.key(), &COLUMNS);
    match layout {
        Layout::Iterations(iterations) => {
            let samples = iterations
                .iter()
                .filter_map(|(_, dir)| or_log(read_mpstat(&dir.join(MPSTAT_LOG))))
                .flatten()
                .collect::<Vec<CpuSample>>();
            push_extents(&mut sheet, Label::Aggregate, &samples)?;
        }
        Layout::Phases { iterations, phases } => {
            for phase in phases {
                let samples = iterations
                    .iter()
                    .filter_map(|(_, dir)| or_log(read_mpstat(&dir.join(phase).join(MPSTAT_LOG))))
                    .flatten()
                    .collect::<Vec<CpuSample>>();
                push_extents(&mut sheet, phase_label(phase), &samples)?;
            }
        }
        Layout::Queries => {
            // The iterations of a query are pooled in iteration order before the edges are trimmed
            for (q, paths) in query_logs(&group.path.join("CpuLoad"), "cpu_load_")? {
                let samples = paths
                    .iter()
                    .filter_map(|path| or_log(read_mpstat(path)))
                    .flatten()
                    .collect::<Vec<CpuSample>>();
                push_extents(&mut sheet, Label::Query(q), &trim_edges(samples))?;
            }
        }
    }
    Ok(sheet)
}

fn push_extents(sheet: &mut Sheet, label: Label, samples: &[CpuSample]) -> Result<()> {
    let fields: [fn(&CpuSample) -> f64; 4] = [|s| s.usr, |s| s.sys, |s| s.iowait, |s| s.idle];
    let extents = fields
        .iter()
        .map(|f| extent(&samples.iter().map(f).collect::<Vec<f64>>()))
        .collect::<Option<Vec<_>>>();
    let Some(extents) = extents else {
        return Ok(());
    };
    let name = label.to_string();
    let statistics: [(&str, fn(&Extent) -> f64); 3] =
        [("Min", |e| e.min), ("Max", |e| e.max), ("Average", |e| e.mean)];
    for (statistic, pick) in statistics {
        let mut row = vec![Cell::text(&name), Cell::text(statistic)];
        row.extend(extents.iter().map(|e| Cell::float(pick(e))));
        sheet.push_row(row)?;
    }
    Ok(())
}

#[cfg(test)]
use crate::report::{close, group_sheet};

#[test]
fn test_cpu_iterations() {
    let s = group_sheet(10, "SF10_F1.0_Csv", analyze_group, &Settings::default()).unwrap();
    assert!(s.rows().len() == 3);
    let stats = s.rows().iter().map(|r| r[1].to_string()).collect::<Vec<String>>();
    assert!(stats == vec!["Min", "Max", "Average"]);
    assert!(s.rows().iter().all(|r| r[0] == Cell::text("Aggregate")));
    assert!(close(&s.rows()[0][2], 10.0));
    assert!(close(&s.rows()[1][2], 30.0));
    assert!(close(&s.rows()[2][2], 20.0));
    assert!(close(&s.rows()[2][3], 2.0));
}

#[test]
fn test_cpu_phases() {
    let s = group_sheet(30, "SF30_F1.5", analyze_group, &Settings::default()).unwrap();
    // Only Filtering has mpstat logs
    assert!(s.rows().len() == 3);
    assert!(s.rows()[0][0] == Cell::text("Filtering"));
    assert!(close(&s.rows()[2][2], 50.0));
}

#[test]
fn test_cpu_queries_trimmed() {
    let s = group_sheet(20, "SF20_F2.0_T4", analyze_group, &Settings::default()).unwrap();
    assert!(s.rows().len() == 6);
    // Query 1 has four samples, the first and last are dropped
    assert!(close(&s.rows()[0][2], 2.0));
    assert!(close(&s.rows()[1][2], 3.0));
    // Query 2 has two samples, both kept
    assert!(s.rows()[3][0] == Cell::text("Query 2"));
    assert!(close(&s.rows()[5][2], 6.0));
}

#[test]
fn test_cpu_queries_from_iteration_files() {
    // Only per-iteration files, nothing concatenated
    let s = group_sheet(20, "SF20_F2.0_T8", analyze_group, &Settings::default()).unwrap();
    let labels = s.rows().iter().map(|r| r[0].to_string()).collect::<Vec<String>>();
    assert!(labels == vec!["Query 1", "Query 1", "Query 1", "Query 2", "Query 2", "Query 2"]);
    // Iterations 1, 2 and 10 give 10 20 30 40 90, trimmed to 20 30 40
    assert!(close(&s.rows()[0][2], 20.0));
    assert!(close(&s.rows()[1][2], 40.0));
    assert!(close(&s.rows()[2][2], 30.0));
    assert!(close(&s.rows()[5][2], 6.0));
}
