// Power draw per iteration, phase or query: mean, sample standard deviation and standard error of
// the CPU, DIMM and total ("Average") readings of the power meter, plus idle baselines.
//
// The meter log of a group holds one section per run.  For iterations and queries, sections are
// matched to runs by position and each run's samples are further restricted to the run's
// start/end interval.  Since nothing else ties a section to a run, the number of sections is
// checked against the number of runs: a mismatch is a warning, or with strict_sections an error
// that skips the group.  Phases are selected from all sections by their intervals alone.

use crate::configs::Settings;
use crate::report::{self, or_log, phase_label, summary_cells, Options};
use crate::workbook::{Cell, Sheet};
use anyhow::{bail, Result};
use benchlog::{
    find_files, read_idle_samples, read_power_sections, read_timestamp_log, summarize, Group,
    IdleSample, Interval, Label, Layout, Metric, PowerSample, PowerSections,
};
use log::{debug, warn};
use std::io;
use std::path::Path;

pub const STEM: &str = "power_metrics_combined";

pub const COLUMNS: [&str; 11] = [
    "Phase",
    "Average CPU Watts",
    "CPU Watts Sample StdDev",
    "CPU Watts StdError",
    "Average DIMM Watts",
    "DIMM Watts Sample StdDev",
    "DIMM Watts StdError",
    "Average Power",
    "Power Sample StdDev",
    "Power StdError",
    "Samples",
];

const POWER_LOG: &str = "ilo_power_all.txt";
const IDLE_LOG: &str = "ilo_power_idle.txt";

pub fn run(output: &mut dyn io::Write, base: &Path, opts: &Options) -> Result<()> {
    report::for_each_group(output, base, STEM, opts, analyze_group)
}

pub fn analyze_group(group: &Group, layout: &Layout, settings: &Settings) -> Result<Sheet> {
    let mut sheet = Sheet::new(&group.coordinate.key(), &COLUMNS);
    match layout {
        Layout::Iterations(iterations) => {
            let sections = load_sections(&group.path.join(POWER_LOG), iterations.len(), settings)?;
            let mut all = vec![];
            for (ordinal, (n, dir)) in iterations.iter().enumerate() {
                let section = sections.section(ordinal + 1);
                let log = read_timestamp_log(&dir.join("ilo_power_timestamps.txt"));
                let samples = match log.global() {
                    Some(w) => within(section, std::slice::from_ref(w)),
                    None => {
                        warn!("{}: no interval, using the whole power section", dir.display());
                        section.iter().collect()
                    }
                };
                push_samples(&mut sheet, Label::Iteration(*n), &samples)?;
                all.extend(samples);
            }
            push_samples(&mut sheet, Label::Aggregate, &all)?;
            push_idle(&mut sheet, Label::Idle(None), &group.path.join(IDLE_LOG), settings)?;
        }

        Layout::Phases { iterations, phases } => {
            // Phases are found by their intervals, not by section position, so the number of
            // sections does not matter here.
            let sections = read_power_sections(&group.path.join(POWER_LOG), None)?;
            let log = read_timestamp_log(&group.path.join("ilo_power_timestamps_all.txt"));
            let all = sections.samples().collect::<Vec<&PowerSample>>();
            for phase in phases {
                let label = phase_label(phase);
                let windows = log
                    .intervals()
                    .iter()
                    .filter(|(l, _)| *l == label)
                    .map(|(_, iv)| *iv)
                    .collect::<Vec<Interval>>();
                if windows.is_empty() {
                    debug!("{}: no intervals for {label}", group.coordinate);
                    continue;
                }
                let samples = all
                    .iter()
                    .copied()
                    .filter(|s| windows.iter().any(|w| w.contains(&s.time)))
                    .collect::<Vec<&PowerSample>>();
                push_samples(&mut sheet, label, &samples)?;
            }
            if let Some((_, first)) = iterations.first() {
                for phase in phases {
                    let label = Label::Idle(Some(phase_label(phase).to_string()));
                    push_idle(&mut sheet, label, &first.join(phase).join(IDLE_LOG), settings)?;
                }
            }
        }

        Layout::Queries => {
            let dir = group.path.join("IloPower");
            let Some(power_log) = find_files(&dir, r"ilo_power_.*\.txt")?
                .into_iter()
                .find(|(name, _)| !name.ends_with("_idle.txt"))
            else {
                bail!("No power log in {}", dir.display());
            };
            let Some((_, timestamps)) = find_files(&dir, r"query_timestamps.*\.txt")?.into_iter().next()
            else {
                bail!("No query timestamps in {}", dir.display());
            };
            let log = read_timestamp_log(&timestamps);
            let queries = log
                .intervals()
                .iter()
                .filter_map(|(l, iv)| match l {
                    Label::Query(n) => Some((*n, *iv)),
                    _ => None,
                })
                .collect::<Vec<(u32, Interval)>>();
            let Some(highest) = queries.iter().map(|(n, _)| *n as usize).max() else {
                return Ok(sheet);
            };
            let sections = load_sections(&power_log.1, highest, settings)?;
            for (n, iv) in &queries {
                let samples = within(sections.section(*n as usize), std::slice::from_ref(iv));
                push_samples(&mut sheet, Label::Query(*n), &samples)?;
            }
            if let Some((_, idle)) = find_files(&dir, r".*_idle\.txt")?.into_iter().next() {
                push_idle(&mut sheet, Label::Idle(None), &idle, settings)?;
            }
        }
    }
    Ok(sheet)
}

/// Read the power log and check that it has the expected number of sections, `runs` unless the
/// settings say otherwise.  The result is normalized to that number.

fn load_sections(path: &Path, runs: usize, settings: &Settings) -> Result<PowerSections> {
    let mut sections = read_power_sections(path, None)?;
    let expected = settings.sections.unwrap_or(runs);
    if sections.observed() != expected {
        if settings.strict_sections {
            bail!(
                "{}: {} power sections, expected {expected}",
                path.display(),
                sections.observed()
            );
        }
        warn!(
            "{}: {} power sections, expected {expected}; matching sections to runs by position",
            path.display(),
            sections.observed()
        );
    }
    sections.normalize(expected);
    Ok(sections)
}

fn within<'a>(samples: &'a [PowerSample], windows: &[Interval]) -> Vec<&'a PowerSample> {
    samples
        .iter()
        .filter(|s| windows.iter().any(|w| w.contains(&s.time)))
        .collect()
}

fn push_samples(sheet: &mut Sheet, label: Label, samples: &[&PowerSample]) -> Result<()> {
    let mut row = vec![Cell::text(label)];
    for m in Metric::ALL {
        let xs = samples
            .iter()
            .filter_map(|s| m.of(s))
            .map(|v| v as f64)
            .collect::<Vec<f64>>();
        row.extend(summary_cells(&summarize(&xs)));
    }
    row.push(Cell::Int(samples.len() as i64));
    sheet.push_row(row)
}

// A missing idle log is logged and gives no row.
fn push_idle(sheet: &mut Sheet, label: Label, path: &Path, settings: &Settings) -> Result<()> {
    let Some(idle) = or_log(read_idle_samples(path, settings.idle_samples)) else {
        return Ok(());
    };
    if idle.is_empty() {
        return Ok(());
    }
    let mut row = vec![Cell::text(label)];
    let metrics: [fn(&IdleSample) -> u32; 3] = [|s| s.cpu_watts, |s| s.dimm_watts, |s| s.average];
    for m in metrics {
        let xs = idle.iter().map(|s| m(s) as f64).collect::<Vec<f64>>();
        row.extend(summary_cells(&summarize(&xs)));
    }
    row.push(Cell::Int(idle.len() as i64));
    sheet.push_row(row)
}

#[cfg(test)]
use crate::report::{close, copy_tree, group_sheet, group_sheet_in};
#[cfg(test)]
use benchlog::SECTION_SEPARATOR;

#[cfg(test)]
fn labels(s: &Sheet) -> Vec<String> {
    s.rows().iter().map(|r| r[0].to_string()).collect()
}

#[test]
fn test_power_iterations() {
    let s = group_sheet(10, "SF10_F1.0_Csv", analyze_group, &Settings::default()).unwrap();
    assert!(labels(&s) == vec!["Iteration 1", "Iteration 2", "Iteration 10", "Aggregate", "Idle"]);
    let power = s.column_index("Average Power").unwrap();
    let samples = s.column_index("Samples").unwrap();

    // Samples outside each iteration's interval are excluded
    assert!(close(&s.rows()[0][power], 210.0));
    assert!(s.rows()[0][samples] == Cell::Int(2));
    assert!(close(&s.rows()[0][1], 105.0));
    assert!(close(&s.rows()[1][power], 250.0));

    // Iteration10 is the third iteration and gets the third section
    assert!(close(&s.rows()[2][power], 280.0));
    assert!(s.rows()[2][power + 1] == Cell::Missing);

    assert!(close(&s.rows()[3][power], 240.0));
    assert!(s.rows()[3][samples] == Cell::Int(5));
    assert!(close(&s.rows()[4][power], 152.0));
    assert!(s.rows()[4][samples] == Cell::Int(3));
}

#[test]
fn test_power_section_mismatch() {
    // Two sections for one iteration
    let s = group_sheet(10, "SF10_F2.0_Csv", analyze_group, &Settings::default()).unwrap();
    assert!(labels(&s) == vec!["Iteration 1", "Aggregate"]);
    assert!(close(&s.rows()[0][7], 300.0));

    let strict = Settings {
        strict_sections: true,
        ..Settings::default()
    };
    assert!(group_sheet(10, "SF10_F2.0_Csv", analyze_group, &strict).is_err());

    // The expected count can be fixed by the settings
    let fixed = Settings {
        sections: Some(2),
        strict_sections: true,
        ..Settings::default()
    };
    assert!(group_sheet(10, "SF10_F2.0_Csv", analyze_group, &fixed).is_ok());
}

#[test]
fn test_power_missing_log() {
    assert!(group_sheet(10, "SF10_F1.0_Parquet", analyze_group, &Settings::default()).is_err());
}

#[test]
fn test_power_phases() {
    let s = group_sheet(30, "SF30_F1.5", analyze_group, &Settings::default()).unwrap();
    assert!(labels(&s) == vec!["Filtering", "Joining", "Idle Filtering", "Idle Joining"]);
    assert!(close(&s.rows()[0][7], 105.0));
    assert!(s.rows()[0][10] == Cell::Int(2));
    assert!(close(&s.rows()[1][7], 205.0));
    assert!(close(&s.rows()[2][7], 50.0));
    assert!(close(&s.rows()[3][7], 60.0));
}

#[test]
fn test_power_queries() {
    let s = group_sheet(20, "SF20_F2.0_T4", analyze_group, &Settings::default()).unwrap();
    assert!(labels(&s) == vec!["Query 1", "Query 2", "Idle"]);
    assert!(close(&s.rows()[0][7], 310.0));
    assert!(close(&s.rows()[1][7], 340.0));
    assert!(s.rows()[1][10] == Cell::Int(1));
    assert!(close(&s.rows()[2][7], 101.0));

    let few = Settings {
        idle_samples: 1,
        ..Settings::default()
    };
    let s = group_sheet(20, "SF20_F2.0_T4", analyze_group, &few).unwrap();
    assert!(close(&s.rows()[2][7], 102.0));
}

#[test]
fn test_power_phases_ignore_section_count() {
    // Two more sections than iterations, with samples outside every phase interval
    let tmp = tempfile::tempdir().unwrap();
    let sf_dir = tmp.path().join("SF30");
    copy_tree(Path::new("../bench_test_data/tree/SF30"), &sf_dir);
    let log = sf_dir.join("F1.5").join(POWER_LOG);
    let mut text = std::fs::read_to_string(&log).unwrap();
    for minute in [30, 40] {
        text += &format!(
            "{SECTION_SEPARATOR}\n{{\n  \"Time\": \"2024-02-05T13:{minute}:00Z\",\n  \"Average\": 999\n}}\n"
        );
    }
    std::fs::write(&log, text).unwrap();
    assert!(read_power_sections(&log, None).unwrap().observed() == 4);

    let strict = Settings {
        strict_sections: true,
        ..Settings::default()
    };
    let s = group_sheet_in(&sf_dir, 30, "SF30_F1.5", analyze_group, &strict).unwrap();
    assert!(labels(&s) == vec!["Filtering", "Joining", "Idle Filtering", "Idle Joining"]);
    assert!(close(&s.rows()[0][7], 105.0));
    assert!(close(&s.rows()[1][7], 205.0));
}
