// Drivers shared by the analyses.
//
// Every analysis produces one workbook per scale-factor directory.  The group-based analyses build
// one sheet per group directory; the derived analyses (energy, sort) build their workbooks from
// workbooks written earlier.  Either way the driver prints the sheets and writes the workbook, or
// warns when there is nothing to write.
//
// Failures while analyzing one group are logged and the group is left out.  Failures to write a
// workbook are fatal.

use crate::configs::Settings;
use crate::format;
use crate::workbook::{Cell, Sheet, Workbook};
use anyhow::{bail, Result};
use benchlog::{
    capitalize, detect_layout, find_groups, find_query_files, find_query_iteration_files,
    find_scale_factors, Group, Label, Layout, Summary,
};
use log::{debug, error, info, warn};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub settings: Settings,
    pub csv: bool,
    pub quiet: bool,
}

/// Run `analyze` on every group of every scale factor below `base` and write the workbook `stem`
/// for each scale factor.  `analyze` returns a sheet for the group, which is left out if it has no
/// rows.

pub fn for_each_group<F>(
    output: &mut dyn io::Write,
    base: &Path,
    stem: &str,
    opts: &Options,
    mut analyze: F,
) -> Result<()>
where
    F: FnMut(&Group, &Layout, &Settings) -> Result<Sheet>,
{
    for (sf, sf_dir) in scale_factors(base)? {
        info!("Processing {}", sf_dir.display());
        let groups = match find_groups(&sf_dir, sf) {
            Ok(gs) => gs,
            Err(e) => {
                error!("{}: {e:#}", sf_dir.display());
                continue;
            }
        };
        let mut workbook = Workbook::new(stem);
        for group in groups {
            let sheet = detect_layout(&group.path)
                .and_then(|layout| analyze(&group, &layout, &opts.settings));
            match sheet {
                Ok(sheet) if sheet.is_empty() => {
                    debug!("{}: no data", group.coordinate);
                }
                Ok(sheet) => workbook.add_sheet(sheet),
                Err(e) => {
                    error!("{}: {e:#}", group.coordinate);
                }
            }
        }
        finish(output, sf, &sf_dir, &workbook, opts)?;
    }
    Ok(())
}

/// Run `derive` on every scale-factor directory below `base` and write the workbooks it returns.
/// An error from `derive` (typically a missing input workbook) is logged and the scale factor is
/// skipped.

pub fn for_each_scale_factor<F>(
    output: &mut dyn io::Write,
    base: &Path,
    opts: &Options,
    mut derive: F,
) -> Result<()>
where
    F: FnMut(&Path) -> Result<Vec<Workbook>>,
{
    for (sf, sf_dir) in scale_factors(base)? {
        info!("Processing {}", sf_dir.display());
        match derive(&sf_dir) {
            Ok(workbooks) => {
                for workbook in &workbooks {
                    finish(output, sf, &sf_dir, workbook, opts)?;
                }
            }
            Err(e) => {
                warn!("SF{sf}: {e:#}");
            }
        }
    }
    Ok(())
}

fn scale_factors(base: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let sfs = find_scale_factors(base)?;
    if sfs.is_empty() {
        bail!("No scale-factor directories (SF<n>) in '{}'", base.display());
    }
    Ok(sfs)
}

fn finish(
    output: &mut dyn io::Write,
    sf: u32,
    sf_dir: &Path,
    workbook: &Workbook,
    opts: &Options,
) -> Result<()> {
    if workbook.is_empty() {
        warn!("SF{sf}: no data for {}, no workbook written", workbook.stem());
        return Ok(());
    }
    if !opts.quiet {
        for sheet in workbook.sheets() {
            writeln!(output, "\n# SF{sf} {} {}", workbook.stem(), sheet.name())?;
            format::format_sheet(output, sheet, true, opts.csv)?;
        }
    }
    let path = workbook.write(sf_dir)?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// Per-file failures are logged and treated as "no data".

pub fn or_log<T>(r: Result<T>) -> Option<T> {
    match r {
        Ok(x) => Some(x),
        Err(e) => {
            warn!("{e:#}");
            None
        }
    }
}

/// The per-query logs of a tool directory such as `CpuLoad` or `Iostat`.  The harness writes one
/// file per query and iteration into `Iterations/`, and a post-processing step may have
/// concatenated them per query into `Aggregated/`.  The concatenated files are used when present.

pub fn query_logs(tool_dir: &Path, prefix: &str) -> Result<Vec<(u32, Vec<PathBuf>)>> {
    let aggregated = tool_dir.join("Aggregated");
    if aggregated.is_dir() {
        return Ok(find_query_files(&aggregated, prefix)?
            .into_iter()
            .map(|(q, path)| (q, vec![path]))
            .collect());
    }
    debug!("{}: no Aggregated directory, reading Iterations", tool_dir.display());
    find_query_iteration_files(&tool_dir.join("Iterations"), prefix)
}

pub fn phase_label(dir_name: &str) -> Label {
    Label::Phase(capitalize(dir_name))
}

/// Mean, sample standard deviation, and standard error.

pub fn summary_cells(s: &Summary) -> [Cell; 3] {
    [
        Cell::maybe_float(s.mean),
        Cell::maybe_float(s.stddev),
        Cell::maybe_float(s.stderr),
    ]
}

/// For each column after the first, the mean of the defined values in `rows`.  Columns without
/// any defined value are undefined.

pub fn column_means(rows: &[Vec<Cell>], columns: usize) -> Vec<Cell> {
    (1..columns)
        .map(|i| {
            let xs = rows
                .iter()
                .filter_map(|r| r.get(i).and_then(|c| c.as_f64()))
                .collect::<Vec<f64>>();
            Cell::maybe_float(benchlog::mean(&xs))
        })
        .collect()
}

// Analyze one group of the fixture tree.

#[cfg(test)]
pub fn group_sheet(
    sf: u32,
    key: &str,
    analyze: fn(&Group, &Layout, &Settings) -> Result<Sheet>,
    settings: &Settings,
) -> Result<Sheet> {
    let sf_dir = format!("../bench_test_data/tree/SF{sf}");
    group_sheet_in(Path::new(&sf_dir), sf, key, analyze, settings)
}

#[cfg(test)]
pub fn group_sheet_in(
    sf_dir: &Path,
    sf: u32,
    key: &str,
    analyze: fn(&Group, &Layout, &Settings) -> Result<Sheet>,
    settings: &Settings,
) -> Result<Sheet> {
    let group = find_groups(sf_dir, sf)?
        .into_iter()
        .find(|g| g.coordinate.key() == key)
        .ok_or_else(|| anyhow::anyhow!("No group {key}"))?;
    let layout = detect_layout(&group.path)?;
    analyze(&group, &layout, settings)
}

// Tests that modify fixtures or write workbooks work on a copy of the tree.

#[cfg(test)]
pub fn copy_tree(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).unwrap();
    for entry in std::fs::read_dir(from).unwrap() {
        let p = entry.unwrap().path();
        let target = to.join(p.file_name().unwrap());
        if p.is_dir() {
            copy_tree(&p, &target);
        } else {
            std::fs::copy(&p, &target).unwrap();
        }
    }
}

#[cfg(test)]
pub fn close(c: &Cell, x: f64) -> bool {
    c.as_f64().is_some_and(|v| (v - x).abs() < 1e-9)
}

#[test]
fn test_column_means() {
    let rows = vec![
        vec![Cell::text("a"), Cell::Int(1), Cell::Missing, Cell::Missing],
        vec![Cell::text("b"), Cell::Float(2.0), Cell::Float(4.0), Cell::Missing],
    ];
    let m = column_means(&rows, 4);
    assert!(m == vec![Cell::Float(1.5), Cell::Float(4.0), Cell::Missing]);
}

#[test]
fn test_missing_base_path() {
    let mut out = vec![];
    let r = for_each_group(
        &mut out,
        Path::new("../bench_test_data/no_such_dir"),
        "x",
        &Options::default(),
        |_, _, _| bail!("not reached"),
    );
    assert!(r.is_err());

    // A directory without SF<n> children
    let tmp = tempfile::tempdir().unwrap();
    let r = for_each_scale_factor(&mut out, tmp.path(), &Options::default(), |_| Ok(vec![]));
    assert!(r.is_err());
}

#[test]
fn test_empty_workbook_not_written() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir(tmp.path().join("SF1")).unwrap();
    let mut out = vec![];
    for_each_scale_factor(&mut out, tmp.path(), &Options::default(), |_| {
        Ok(vec![Workbook::new("nothing")])
    })
    .unwrap();
    assert!(!tmp.path().join("SF1/nothing").exists());
    assert!(out.is_empty());
}

#[test]
fn test_query_logs() {
    // Concatenated files are preferred
    let logs = query_logs(Path::new("../bench_test_data/tree/SF20/F2.0/T4/CpuLoad"), "cpu_load_").unwrap();
    assert!(logs.iter().map(|(q, files)| (*q, files.len())).collect::<Vec<_>>() == vec![(1, 1), (2, 1)]);

    let logs = query_logs(Path::new("../bench_test_data/tree/SF20/F2.0/T8/Iostat"), "iostat_").unwrap();
    assert!(logs.len() == 1);
    assert!(logs[0].0 == 1 && logs[0].1.len() == 2);

    assert!(query_logs(Path::new("../bench_test_data/no_such_dir"), "x").unwrap().is_empty());
}
