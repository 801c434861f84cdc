// Reader for the power-meter dumps.  The meter is polled for the duration of each run and the
// replies are appended to one file, with a separator line written between runs:
//
//   {
//     "PowerDetail": [
//       {
//         "Average": 301,
//         "CpuWatts": 187,
//         "DimmWatts": 22,
//         "Time": "2024-01-01T00:00:30Z"
//       },
//       ...
//     ]
//   }
//   ------------------------------------------------------------------------------------
//   {
//     ...
//
// The text is not valid JSON once the separators are in, and replies are sometimes truncated, so
// it is read line by line.  An entry starts at a "{" and ends at the next "}", which may be on the
// same line or a later one, and several entries may share a line.  Entries without a readable
// "Time" are dropped.
//
// The sections between separators are matched to runs by position: the Nth section belongs to the
// Nth iteration (or query N).  Nothing in the file ties a section to a run except that ordering, so
// callers should compare `observed()` to the number of runs they expect.

use crate::dates::{parse_timestamp, Timestamp};
use crate::timestamps::Interval;
use anyhow::{Context, Result};
use log::{debug, warn};
use regex::Regex;
use std::fs;
use std::path::Path;

pub const SECTION_SEPARATOR: &str =
    "------------------------------------------------------------------------------------";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    CpuWatts,
    DimmWatts,
    Average,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::CpuWatts, Metric::DimmWatts, Metric::Average];

    /// The field name in the power log.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::CpuWatts => "CpuWatts",
            Metric::DimmWatts => "DimmWatts",
            Metric::Average => "Average",
        }
    }

    pub fn of(&self, sample: &PowerSample) -> Option<u32> {
        match self {
            Metric::CpuWatts => sample.cpu_watts,
            Metric::DimmWatts => sample.dimm_watts,
            Metric::Average => sample.average,
        }
    }
}

/// One meter reading.  Every metric is optional because the meter omits fields it could not
/// read.

#[derive(Debug, Clone, PartialEq)]
pub struct PowerSample {
    pub time: Timestamp,
    pub cpu_watts: Option<u32>,
    pub dimm_watts: Option<u32>,
    pub average: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct PowerSections {
    sections: Vec<Vec<PowerSample>>,
    observed: usize,
}

impl PowerSections {
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|s| s.is_empty())
    }

    /// The number of sections present in the file, before any call to `normalize`.
    pub fn observed(&self) -> usize {
        self.observed
    }

    /// Pad with empty sections or drop trailing sections so that there are exactly `expected`.
    pub fn normalize(&mut self, expected: usize) {
        self.sections.resize_with(expected, Vec::new);
    }

    /// Section by ordinal, 1-based.  Out-of-range ordinals give an empty section.
    pub fn section(&self, ordinal: usize) -> &[PowerSample] {
        if ordinal == 0 {
            return &[];
        }
        self.sections
            .get(ordinal - 1)
            .map(|s| s.as_slice())
            .unwrap_or(&[])
    }

    /// All samples of all sections, in file order.
    pub fn samples(&self) -> impl Iterator<Item = &PowerSample> {
        self.sections.iter().flatten()
    }

    /// For one metric, the (value, time) pairs of each section.  Samples lacking the metric are
    /// left out.
    pub fn metric(&self, m: Metric) -> Vec<Vec<(u32, Timestamp)>> {
        self.sections
            .iter()
            .map(|s| {
                s.iter()
                    .filter_map(|x| m.of(x).map(|v| (v, x.time)))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

/// An idle reading, where all three metrics are required.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleSample {
    pub cpu_watts: u32,
    pub dimm_watts: u32,
    pub average: u32,
}

struct FieldPatterns {
    time: Regex,
    cpu_watts: Regex,
    dimm_watts: Regex,
    average: Regex,
}

#[derive(Default)]
struct Fields {
    time: Option<String>,
    cpu_watts: Option<u32>,
    dimm_watts: Option<u32>,
    average: Option<u32>,
}

impl FieldPatterns {
    fn new() -> Result<FieldPatterns> {
        Ok(FieldPatterns {
            time: Regex::new(r#""Time":\s*"([^"]+)""#)?,
            cpu_watts: Regex::new(r#""CpuWatts":\s*(\d+)"#)?,
            dimm_watts: Regex::new(r#""DimmWatts":\s*(\d+)"#)?,
            average: Regex::new(r#""Average":\s*(\d+)"#)?,
        })
    }

    fn scan(&self, line: &str, fields: &mut Fields) {
        if let Some(c) = self.time.captures(line) {
            fields.time = Some(c[1].to_string());
        }
        if let Some(c) = self.cpu_watts.captures(line) {
            fields.cpu_watts = c[1].parse::<u32>().ok();
        }
        if let Some(c) = self.dimm_watts.captures(line) {
            fields.dimm_watts = c[1].parse::<u32>().ok();
        }
        if let Some(c) = self.average.captures(line) {
            fields.average = c[1].parse::<u32>().ok();
        }
    }
}

// Split a line at every "{" and "}", giving each piece of text with the brace that ends it.  The
// last piece has no brace.

fn brace_pieces(line: &str) -> Vec<(&str, Option<char>)> {
    let mut pieces = vec![];
    let mut rest = line;
    while let Some(i) = rest.find(|c: char| c == '{' || c == '}') {
        pieces.push((&rest[..i], rest[i..].chars().next()));
        rest = &rest[i + 1..];
    }
    pieces.push((rest, None));
    pieces
}

// A closed entry becomes a sample if it has a readable time.

fn complete_sample(fields: Fields) -> Option<PowerSample> {
    let time = match parse_timestamp(fields.time.as_deref()?) {
        Ok(t) => t,
        Err(e) => {
            warn!("Power log entry dropped: {e}");
            return None;
        }
    };
    Some(PowerSample {
        time,
        cpu_watts: fields.cpu_watts,
        dimm_watts: fields.dimm_watts,
        average: fields.average,
    })
}

/// Read a power log into sections.  With a `window`, only samples whose time is inside it are
/// kept, but sections are still counted so that positions are preserved.

pub fn read_power_sections(path: &Path, window: Option<&Interval>) -> Result<PowerSections> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Power log {}", path.display()))?;
    let sections = parse_power_sections(&text, window)?;
    debug!(
        "{}: {} sections, {} samples kept",
        path.display(),
        sections.observed(),
        sections.samples().count()
    );
    Ok(sections)
}

pub fn parse_power_sections(text: &str, window: Option<&Interval>) -> Result<PowerSections> {
    let patterns = FieldPatterns::new()?;
    let mut result = PowerSections::default();
    let mut current = vec![];
    let mut current_seen = false;
    let mut entry: Option<Fields> = None;

    for line in text.lines() {
        if line.trim() == SECTION_SEPARATOR {
            result.sections.push(std::mem::take(&mut current));
            current_seen = false;
            entry = None;
            continue;
        }
        for (piece, brace) in brace_pieces(line) {
            if let Some(ref mut fields) = entry {
                patterns.scan(piece, fields);
            }
            match brace {
                Some('{') => entry = Some(Fields::default()),
                Some(_) => {
                    if let Some(sample) = entry.take().and_then(complete_sample) {
                        current_seen = true;
                        if window.map_or(true, |w| w.contains(&sample.time)) {
                            current.push(sample);
                        }
                    }
                }
                None => {}
            }
        }
    }
    if current_seen {
        result.sections.push(current);
    }
    result.observed = result.sections.len();
    Ok(result)
}

/// Read the last `n` complete entries of an idle log, in file order.  Fewer than `n` entries is
/// not an error.

pub fn read_idle_samples(path: &Path, n: usize) -> Result<Vec<IdleSample>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Idle power log {}", path.display()))?;
    let samples = parse_idle_samples(&text, n)?;
    if samples.len() < n {
        debug!(
            "{}: only {} of {n} idle samples available",
            path.display(),
            samples.len()
        );
    }
    Ok(samples)
}

pub fn parse_idle_samples(text: &str, n: usize) -> Result<Vec<IdleSample>> {
    let patterns = FieldPatterns::new()?;
    let mut samples = vec![];
    let mut fields = Fields::default();

    // Scanning backwards, "}" opens an entry and "{" closes it.  Each piece of a line is preceded
    // by its brace in this order.
    'lines: for line in text.lines().rev() {
        for (piece, brace) in brace_pieces(line).into_iter().rev() {
            if samples.len() >= n {
                break 'lines;
            }
            match brace {
                Some('}') => fields = Fields::default(),
                Some(_) => {
                    if let (Some(cpu_watts), Some(dimm_watts), Some(average)) =
                        (fields.cpu_watts, fields.dimm_watts, fields.average)
                    {
                        samples.push(IdleSample {
                            cpu_watts,
                            dimm_watts,
                            average,
                        });
                    }
                    fields = Fields::default();
                }
                None => {}
            }
            patterns.scan(piece, &mut fields);
        }
    }
    samples.reverse();
    Ok(samples)
}

#[cfg(test)]
use crate::dates::timestamp_from_ymdhms;

#[test]
fn test_sections_are_positional() {
    let s = read_power_sections(Path::new("../bench_test_data/power_sections.txt"), None).unwrap();
    assert!(s.observed() == 4);
    assert!(s.len() == 4);
    let averages = s
        .metric(Metric::Average)
        .iter()
        .map(|sec| sec.iter().map(|(v, _)| *v).collect::<Vec<u32>>())
        .collect::<Vec<_>>();
    assert!(averages == vec![vec![100, 101], vec![200], vec![300, 301, 302], vec![400]]);

    // The second entry of section 3 has no DimmWatts
    let dimm = s.metric(Metric::DimmWatts);
    assert!(dimm[2].len() == 2);
    assert!(s.section(3).len() == 3);
    assert!(s.section(0).is_empty());
    assert!(s.section(5).is_empty());
}

#[test]
fn test_normalize() {
    let mut s =
        read_power_sections(Path::new("../bench_test_data/power_sections.txt"), None).unwrap();
    s.normalize(8);
    assert!(s.len() == 8);
    assert!(s.observed() == 4);
    assert!(s.section(8).is_empty());
    assert!(s.section(4).len() == 1);
    s.normalize(2);
    assert!(s.len() == 2);
    assert!(s.samples().count() == 3);
}

#[test]
fn test_window() {
    let window = Interval {
        start: timestamp_from_ymdhms(2024, 1, 1, 0, 0, 0).unwrap(),
        end: timestamp_from_ymdhms(2024, 1, 1, 0, 2, 0).unwrap(),
    };
    let s = read_power_sections(Path::new("../bench_test_data/power_window.txt"), Some(&window))
        .unwrap();
    assert!(s.observed() == 1);
    let times = s.section(1).iter().map(|x| x.time).collect::<Vec<Timestamp>>();
    assert!(
        times
            == vec![
                timestamp_from_ymdhms(2024, 1, 1, 0, 0, 30).unwrap(),
                timestamp_from_ymdhms(2024, 1, 1, 0, 1, 0).unwrap(),
                timestamp_from_ymdhms(2024, 1, 1, 0, 1, 30).unwrap(),
                timestamp_from_ymdhms(2024, 1, 1, 0, 1, 45).unwrap(),
            ]
    );
    let averages = s.section(1).iter().filter_map(|x| x.average).map(|x| x as f64).collect::<Vec<f64>>();
    let summary = crate::stats::summarize(&averages);
    assert!(summary.mean.is_some());
    assert!(summary.stddev.is_some());
}

#[test]
fn test_window_trims_section_edges() {
    let text = format!(
        "{{ \"Time\": \"2024-01-01T00:00:00Z\", \"Average\": 1 }}
{SECTION_SEPARATOR}
{{ \"Time\": \"2024-01-01T00:00:59Z\", \"Average\": 2 }}
{{ \"Time\": \"2024-01-01T00:01:00Z\", \"Average\": 3 }}
{{ \"Time\": \"2024-01-01T00:01:10Z\", \"Average\": 4 }}
{{ \"Time\": \"2024-01-01T00:02:00Z\", \"Average\": 5 }}
{{ \"Time\": \"2024-01-01T00:02:01Z\", \"Average\": 6 }}
"
    );
    let window = Interval {
        start: timestamp_from_ymdhms(2024, 1, 1, 0, 1, 0).unwrap(),
        end: timestamp_from_ymdhms(2024, 1, 1, 0, 2, 0).unwrap(),
    };
    let s = parse_power_sections(&text, Some(&window)).unwrap();
    assert!(s.observed() == 2);
    assert!(s.section(1).is_empty());
    let vals = s.section(2).iter().filter_map(|x| x.average).collect::<Vec<u32>>();
    assert!(vals == vec![3, 4, 5]);
}

#[test]
fn test_bad_entries_dropped() {
    let text = "\
{
  \"Time\": \"not a time\",
  \"Average\": 5
}
{
  \"Average\": 6
}
{
  \"Time\": \"2024-01-01T00:00:00Z\",
  \"Average\": 7
}
";
    let s = parse_power_sections(text, None).unwrap();
    assert!(s.samples().count() == 1);
    assert!(s.section(1)[0].average == Some(7));
    assert!(s.section(1)[0].cpu_watts.is_none());
}

#[test]
fn test_compact_entries() {
    let text = "\
{ \"PowerDetail\": [ { \"Time\": \"2024-01-01T00:00:00Z\", \"Average\": 1 }, {
  \"Time\": \"2024-01-01T00:00:10Z\", \"Average\": 2, \"CpuWatts\": 20, \"DimmWatts\": 3
}, { \"Time\": \"2024-01-01T00:00:20Z\", \"Average\": 3, \"CpuWatts\": 30, \"DimmWatts\": 4 } ] }
";
    let s = parse_power_sections(text, None).unwrap();
    let vals = s.section(1).iter().filter_map(|x| x.average).collect::<Vec<u32>>();
    assert!(vals == vec![1, 2, 3]);

    let idle = parse_idle_samples(text, 5).unwrap();
    assert!(idle.iter().map(|x| x.average).collect::<Vec<u32>>() == vec![2, 3]);
}

#[test]
fn test_idle_fewer_than_requested() {
    let idle = read_idle_samples(Path::new("../bench_test_data/power_idle.txt"), 20).unwrap();
    assert!(idle.len() == 5);
    assert!(idle[0].cpu_watts == 90);
    assert!(idle[4].average == 154);
}

#[test]
fn test_idle_last_n() {
    let idle = read_idle_samples(Path::new("../bench_test_data/power_idle.txt"), 2).unwrap();
    assert!(idle.len() == 2);
    assert!(idle[0].average == 153);
    assert!(idle[1].average == 154);
}

#[test]
fn test_missing_power_log() {
    assert!(read_power_sections(Path::new("../bench_test_data/no_such_file.txt"), None).is_err());
}
