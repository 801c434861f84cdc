// Parser for `mpstat` output, eg
//
//   Linux 5.15.0-91-generic (bench01)   01/05/2024   _x86_64_   (48 CPU)
//
//   10:00:01 AM  CPU    %usr   %nice    %sys %iowait    %irq   %soft  %steal  %guest  %gnice   %idle
//   10:00:02 AM  all   12.50    0.00    2.10    0.40    0.00    0.10    0.00    0.00    0.00   84.90
//   ...
//   Average:     all   12.10    0.00    2.00    0.35    0.00    0.10    0.00    0.00    0.00   85.45
//
// Only the "all" rows are used.  The header fixes the column positions; without a header the
// conventional positions relative to the "all" column are used.  Some hosts run with a locale that
// writes decimal commas, those are accepted.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuSample {
    pub usr: f64,
    pub sys: f64,
    pub iowait: f64,
    pub idle: f64,
}

pub fn read_mpstat(path: &Path) -> Result<Vec<CpuSample>> {
    let text = fs::read_to_string(path).with_context(|| format!("mpstat log {}", path.display()))?;
    Ok(parse_mpstat(&text))
}

pub fn parse_mpstat(text: &str) -> Vec<CpuSample> {
    let mut columns = HashMap::<String, usize>::new();
    let mut samples = vec![];
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.contains("Linux") || line.contains("Average") {
            continue;
        }
        if line.contains("CPU") && line.contains("%usr") {
            columns = line
                .split_whitespace()
                .enumerate()
                .map(|(i, name)| (name.trim_start_matches('%').to_string(), i))
                .collect();
            continue;
        }
        let fields = line.split_whitespace().collect::<Vec<&str>>();
        let Some(all) = fields.iter().position(|f| *f == "all") else {
            continue;
        };
        let col = |name: &str, fallback: usize| columns.get(name).copied().unwrap_or(fallback);
        let value = |i: usize| fields.get(i).and_then(|f| f.replace(',', ".").parse::<f64>().ok());
        let sample = (|| {
            Some(CpuSample {
                usr: value(col("usr", all + 1))?,
                sys: value(col("sys", all + 3))?,
                iowait: value(col("iowait", all + 4))?,
                idle: value(col("idle", fields.len() - 1))?,
            })
        })();
        if let Some(s) = sample {
            samples.push(s);
        }
    }
    samples
}

/// Drop the first and last sample, which overlap the start-up and shut-down of the measured
/// program, when there are enough samples left to be meaningful.

pub fn trim_edges(mut samples: Vec<CpuSample>) -> Vec<CpuSample> {
    if samples.len() >= 4 {
        samples.pop();
        samples.remove(0);
    }
    samples
}

#[test]
fn test_parse_mpstat() {
    let samples = read_mpstat(Path::new("../bench_test_data/mpstat.log")).unwrap();
    // Three "all" rows; the per-cpu rows, the banner and the Average row are skipped
    assert!(samples.len() == 3);
    assert!(samples[0].usr == 12.5);
    assert!(samples[0].sys == 2.1);
    assert!(samples[0].iowait == 0.4);
    assert!(samples[0].idle == 84.9);
    assert!(samples[2].idle == 70.0);
}

#[test]
fn test_decimal_comma_and_no_header() {
    let text = "\
10:00:01     all    10,00    0,00    5,00    1,00    0,00    0,00    0,00    0,00    0,00   84,00
10:00:02     all    bad      0,00    5,00    1,00    0,00    0,00    0,00    0,00    0,00   84,00
";
    let samples = parse_mpstat(text);
    assert!(samples.len() == 1);
    assert!(samples[0].usr == 10.0);
    assert!(samples[0].sys == 5.0);
    assert!(samples[0].iowait == 1.0);
    assert!(samples[0].idle == 84.0);
}

#[test]
fn test_trim_edges() {
    let s = |x: f64| CpuSample {
        usr: x,
        sys: 0.0,
        iowait: 0.0,
        idle: 100.0 - x,
    };
    let trimmed = trim_edges(vec![s(1.0), s(2.0), s(3.0), s(4.0)]);
    assert!(trimmed.iter().map(|x| x.usr).collect::<Vec<f64>>() == vec![2.0, 3.0]);
    let kept = trim_edges(vec![s(1.0), s(2.0), s(3.0)]);
    assert!(kept.len() == 3);
}
