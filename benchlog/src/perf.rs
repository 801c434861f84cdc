// Parsers for `perf stat` output.  There are two kinds of file:
//
//  - counters for the measured process (or the whole system), where the lines of interest look like
//
//        12,345,678,901      instructions              #    1.52  insn per cycle
//           123,456,789      branch-misses             #    0.98% of all branches
//            45,678,901      LLC-load-misses           #   12.30% of all LL-cache accesses
//
//  - top-down analysis, where a header line is followed by a line of percentages
//
//              retiring      bad speculation       frontend bound        backend bound
//                 34.5%                 5.2%                20.1%                40.2%
//
// perf colors its output when it believes it is writing to a terminal, and the harness captures
// that, so escape sequences are removed before matching.

use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerfCounters {
    pub insn_per_cycle: Option<f64>,
    pub instructions: Option<u64>,
    pub branch_misses: Option<u64>,
    pub llc_load_misses: Option<u64>,
}

impl PerfCounters {
    pub fn branch_misses_per_kilo_instructions(&self) -> Option<f64> {
        per_kilo(self.branch_misses, self.instructions)
    }

    pub fn llc_load_misses_per_kilo_instructions(&self) -> Option<f64> {
        per_kilo(self.llc_load_misses, self.instructions)
    }
}

fn per_kilo(events: Option<u64>, instructions: Option<u64>) -> Option<f64> {
    match (events, instructions) {
        (Some(e), Some(i)) if i > 0 => Some(e as f64 / i as f64 * 1000.0),
        _ => None,
    }
}

/// Top-down level 1 breakdown, in percent of pipeline slots.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Topdown {
    pub retiring: Option<f64>,
    pub bad_speculation: Option<f64>,
    pub frontend_bound: Option<f64>,
    pub backend_bound: Option<f64>,
}

const TOPDOWN_HEADERS: [&str; 4] = [
    "retiring",
    "bad speculation",
    "frontend bound",
    "backend bound",
];

fn ansi_escape() -> Result<Regex> {
    Ok(Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])")?)
}

pub fn read_perf_counters(path: &Path) -> Result<PerfCounters> {
    let text = fs::read_to_string(path).with_context(|| format!("perf stat file {}", path.display()))?;
    parse_perf_counters(&text)
}

/// The first occurrence of each counter wins.

pub fn parse_perf_counters(text: &str) -> Result<PerfCounters> {
    let ansi = ansi_escape()?;
    let ipc_re = Regex::new(r"(\d+\.\d+)\s+insn per cycle")?;
    let instructions_re = Regex::new(r"(\d+)\s+instructions")?;
    let branch_re = Regex::new(r"(\d+)\s+branch-misses")?;
    let llc_re = Regex::new(r"(\d+)\s+llc-load-misses")?;

    let count = |re: &Regex, line: &str| -> Option<u64> {
        re.captures(line).and_then(|c| c[1].parse::<u64>().ok())
    };

    let mut counters = PerfCounters::default();
    for line in text.lines() {
        let clean = ansi.replace_all(line, "");
        if counters.insn_per_cycle.is_none() {
            counters.insn_per_cycle = ipc_re
                .captures(&clean)
                .and_then(|c| c[1].parse::<f64>().ok());
        }
        let plain = clean.replace(',', "").to_lowercase();
        if counters.instructions.is_none() {
            counters.instructions = count(&instructions_re, &plain);
        }
        if counters.branch_misses.is_none() {
            counters.branch_misses = count(&branch_re, &plain);
        }
        if counters.llc_load_misses.is_none() {
            counters.llc_load_misses = count(&llc_re, &plain);
        }
    }
    Ok(counters)
}

pub fn read_topdown(path: &Path) -> Result<Topdown> {
    let text = fs::read_to_string(path).with_context(|| format!("perf stat file {}", path.display()))?;
    parse_topdown(&text)
}

/// The values are found by position: for each header, the first percentage at or to the right of
/// the header's column on the following line.

pub fn parse_topdown(text: &str) -> Result<Topdown> {
    let ansi = ansi_escape()?;
    let pct_re = Regex::new(r"(\d+\.\d+)%")?;

    let lines = text.lines().collect::<Vec<&str>>();
    let mut topdown = Topdown::default();
    for (i, line) in lines.iter().enumerate() {
        let header = ansi.replace_all(line, "").to_lowercase();
        let positions = TOPDOWN_HEADERS
            .iter()
            .map(|h| header.find(h))
            .collect::<Option<Vec<usize>>>();
        let Some(positions) = positions else {
            continue;
        };
        let Some(next) = lines.get(i + 1) else {
            break;
        };
        let values = ansi.replace_all(next, "");
        let value_at = |pos: usize| {
            values
                .get(pos..)
                .and_then(|rest| pct_re.captures(rest))
                .and_then(|c| c[1].parse::<f64>().ok())
        };
        topdown.retiring = value_at(positions[0]);
        topdown.bad_speculation = value_at(positions[1]);
        topdown.frontend_bound = value_at(positions[2]);
        topdown.backend_bound = value_at(positions[3]);
        break;
    }
    Ok(topdown)
}

#[test]
fn test_perf_counters() {
    let c = read_perf_counters(Path::new("../bench_test_data/perf_stats_metrics.txt")).unwrap();
    assert!(c.insn_per_cycle == Some(1.52));
    assert!(c.instructions == Some(12_345_678_901));
    assert!(c.branch_misses == Some(123_456_789));
    assert!(c.llc_load_misses == Some(45_678_901));
    let bm = c.branch_misses_per_kilo_instructions().unwrap();
    assert!((bm - 123_456_789.0 / 12_345_678_901.0 * 1000.0).abs() < 1e-9);
}

#[test]
fn test_perf_counters_missing() {
    let c = parse_perf_counters("  1,000   cycles\n  500   branch-misses\n").unwrap();
    assert!(c.instructions.is_none());
    assert!(c.branch_misses == Some(500));
    assert!(c.branch_misses_per_kilo_instructions().is_none());

    let c = parse_perf_counters("  0   instructions\n  500   branch-misses\n").unwrap();
    assert!(c.branch_misses_per_kilo_instructions().is_none());
}

#[test]
fn test_topdown() {
    let t = read_topdown(Path::new("../bench_test_data/perf_stats_system.txt")).unwrap();
    assert!(t.retiring == Some(34.5));
    assert!(t.bad_speculation == Some(5.2));
    assert!(t.frontend_bound == Some(20.1));
    assert!(t.backend_bound == Some(40.2));
}

#[test]
fn test_topdown_absent() {
    let t = parse_topdown("nothing to see\n").unwrap();
    assert!(t == Topdown::default());
}
