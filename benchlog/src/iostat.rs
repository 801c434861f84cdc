// Parser for `iostat -d` output, summing the kB read and written by selected devices.
//
//   Linux 5.15.0-91-generic (bench01)   01/05/2024   _x86_64_   (48 CPU)
//
//   Device             tps    kB_read/s    kB_wrtn/s    kB_dscd/s    kB_read    kB_wrtn    kB_dscd
//   sda               3.10        40.12        22.01         0.00    9012345    4939123          0
//   sdb               0.52         5.00         1.00         0.00    1122334     224466          0
//
//   Device             tps    kB_read/s    kB_wrtn/s    kB_dscd/s    kB_read    kB_wrtn    kB_dscd
//   sda              12.00       480.00         0.00         0.00        480          0          0
//   ...
//
// The first report after the banner covers the time since boot and is skipped, per device.  The
// harness concatenates the logs of several runs into one file at times, and every run starts with
// its own banner, so the banner resets the skipping.  Rows that are all zeros after the tps column
// carry no information and are skipped too.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::ops::AddAssign;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IoTotals {
    pub kb_read: f64,
    pub kb_wrtn: f64,

    /// Number of device rows that were summed.
    pub rows: usize,
}

impl AddAssign for IoTotals {
    fn add_assign(&mut self, other: IoTotals) {
        self.kb_read += other.kb_read;
        self.kb_wrtn += other.kb_wrtn;
        self.rows += other.rows;
    }
}

pub fn read_iostat(path: &Path, devices: &[String]) -> Result<IoTotals> {
    let text = fs::read_to_string(path).with_context(|| format!("iostat log {}", path.display()))?;
    Ok(parse_iostat(&text, devices))
}

pub fn parse_iostat(text: &str, devices: &[String]) -> IoTotals {
    let mut totals = IoTotals::default();
    let mut seen = HashSet::<&str>::new();
    let mut read_col = 5;
    let mut wrtn_col = 6;

    for line in text.lines() {
        let fields = line.split_whitespace().collect::<Vec<&str>>();
        let Some(&first) = fields.first() else {
            continue;
        };
        if first == "Linux" {
            seen.clear();
            continue;
        }
        if first.trim_end_matches(':') == "Device" {
            if let Some(i) = fields.iter().position(|f| *f == "kB_read") {
                read_col = i;
            }
            if let Some(i) = fields.iter().position(|f| *f == "kB_wrtn") {
                wrtn_col = i;
            }
            continue;
        }
        if !devices.iter().any(|d| d.as_str() == first) {
            continue;
        }
        if seen.insert(first) {
            continue;
        }
        let all_zero = fields
            .iter()
            .skip(2)
            .filter_map(|f| f.parse::<f64>().ok())
            .all(|v| v == 0.0);
        if all_zero {
            continue;
        }
        let value = |i: usize| fields.get(i).and_then(|f| f.parse::<f64>().ok());
        if let (Some(r), Some(w)) = (value(read_col), value(wrtn_col)) {
            totals.kb_read += r;
            totals.kb_wrtn += w;
            totals.rows += 1;
        }
    }
    totals
}

#[cfg(test)]
fn default_devices() -> Vec<String> {
    vec!["sda".to_string(), "sdb".to_string()]
}

#[test]
fn test_parse_iostat() {
    let t = read_iostat(Path::new("../bench_test_data/iostat.log"), &default_devices()).unwrap();
    // Since-boot rows and the all-zero sdb row are skipped, nvme0n1 is not selected
    assert!(t.rows == 3);
    assert!(t.kb_read == 480.0 + 64.0 + 1024.0);
    assert!(t.kb_wrtn == 0.0 + 128.0 + 256.0);
}

#[test]
fn test_device_selection() {
    let t = read_iostat(
        Path::new("../bench_test_data/iostat.log"),
        &["sdb".to_string()],
    )
    .unwrap();
    assert!(t.rows == 1);
    assert!(t.kb_read == 64.0);
}

#[test]
fn test_banner_resets_skipping() {
    let text = "\
Linux 5.15.0 (a)
Device             tps    kB_read/s    kB_wrtn/s    kB_dscd/s    kB_read    kB_wrtn    kB_dscd
sda               3.10        40.12        22.01         0.00    9000000    4000000          0
sda               1.00        10.00        20.00         0.00         10         20          0
Linux 5.15.0 (a)
Device             tps    kB_read/s    kB_wrtn/s    kB_dscd/s    kB_read    kB_wrtn    kB_dscd
sda               3.10        40.12        22.01         0.00    9000000    4000000          0
sda               1.00        30.00        40.00         0.00         30         40          0
";
    let mut t = parse_iostat(text, &default_devices());
    assert!(t.rows == 2);
    assert!(t.kb_read == 40.0);
    assert!(t.kb_wrtn == 60.0);
    t += IoTotals {
        kb_read: 1.0,
        kb_wrtn: 2.0,
        rows: 1,
    };
    assert!(t.rows == 3 && t.kb_read == 41.0 && t.kb_wrtn == 62.0);
}
