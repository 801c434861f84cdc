// Parser for the `pcm` memory-bandwidth monitor.  Each sampling interval prints a block of
// per-socket tables followed by the system-wide line
//
//   System Memory Throughput(MB/s):      15811.25
//
// and that line is the only one used.

use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::Path;

/// System memory throughput values in MB/s, in file order.

pub fn read_memory_throughput(path: &Path) -> Result<Vec<f64>> {
    let text = fs::read_to_string(path).with_context(|| format!("pcm log {}", path.display()))?;
    parse_memory_throughput(&text)
}

pub fn parse_memory_throughput(text: &str) -> Result<Vec<f64>> {
    let re = Regex::new(r"(?i)System Memory Throughput\s*\(MB/s\):\s*([\d.]+)")?;
    Ok(text
        .lines()
        .filter_map(|l| re.captures(l))
        .filter_map(|c| c[1].parse::<f64>().ok())
        .collect())
}

#[test]
fn test_parse_pcm() {
    let xs = read_memory_throughput(Path::new("../bench_test_data/pcm_stats.txt")).unwrap();
    assert!(xs == vec![15811.25, 16020.5, 9000.0]);
}

#[test]
fn test_pcm_spelling() {
    let xs = parse_memory_throughput(
        "system memory throughput (MB/s): 12.5\nSystem Memory Throughput(MB/s):\t7\nMemory: 3\n",
    )
    .unwrap();
    assert!(xs == vec![12.5, 7.0]);
}
