// Per-query timing files hold one line per repetition of the query:
//
//   Run 1 time: 12.873s
//   Run 2 time: 12.411s

use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::Path;

/// Wall times in seconds, in file order.

pub fn read_run_times(path: &Path) -> Result<Vec<f64>> {
    let text = fs::read_to_string(path).with_context(|| format!("Timing file {}", path.display()))?;
    parse_run_times(&text)
}

pub fn parse_run_times(text: &str) -> Result<Vec<f64>> {
    let re = Regex::new(r"Run \d+ time: ([\d.]+)s")?;
    Ok(text
        .lines()
        .filter_map(|l| re.captures(l))
        .filter_map(|c| c[1].parse::<f64>().ok())
        .collect())
}

#[test]
fn test_run_times() {
    let xs = parse_run_times("Warmup\nRun 1 time: 12.5s\nRun 2 time: 13s\nRun 3 time: oops\n").unwrap();
    assert!(xs == vec![12.5, 13.0]);
    assert!(read_run_times(Path::new("../bench_test_data/no_such_file.txt")).is_err());
}
