// Loader for the timestamp logs that the harness writes next to each run.  There are three styles
// in the wild and a file may mix them:
//
//   Query 3: Start Time = 2024-01-01T00:00:00Z, Finish Time = 2024-01-01T00:02:00Z
//
//   filtering:
//   Start Time = 2024-01-01T00:00:00Z, End Time = 2024-01-01T00:02:00Z
//
//   Start Time = 2024-01-01T00:00:00Z, End Time = 2024-01-01T00:02:00Z
//   Total Execution Time: 120 seconds
//
// The first gives a query interval, the second a phase interval (the heading names the phase), the
// third a global interval for the whole run plus the total the harness measured itself.  The
// total comes in several spellings, "Total Query Execution Time for Iteration 2: 120" among them.
//
// Bad timestamps are logged and the line is skipped.  A file that cannot be read is logged and
// yields an empty log; callers treat that as "no data" for the run.

use crate::dates::{format_timestamp, parse_timestamp, Timestamp};
use crate::{capitalize, Label};
use anyhow::Result;
use log::{debug, error, warn};
use regex::Regex;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Interval {
    /// Inclusive at both ends.
    pub fn contains(&self, t: &Timestamp) -> bool {
        self.start <= *t && *t <= self.end
    }

    pub fn seconds(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

/// The intervals found in one timestamp log, in file order.

#[derive(Debug, Default, Clone)]
pub struct TimestampLog {
    global: Option<Interval>,
    intervals: Vec<(Label, Interval)>,
    total_seconds: Option<u64>,
}

impl TimestampLog {
    /// The interval given without any label, the run as a whole.
    pub fn global(&self) -> Option<&Interval> {
        self.global.as_ref()
    }

    pub fn intervals(&self) -> &[(Label, Interval)] {
        &self.intervals
    }

    /// The first interval recorded for the label.
    pub fn get(&self, label: &Label) -> Option<&Interval> {
        self.intervals
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, iv)| iv)
    }

    /// The total execution time the harness reported, if any.
    pub fn total_seconds(&self) -> Option<u64> {
        self.total_seconds
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_none() && self.intervals.is_empty() && self.total_seconds.is_none()
    }
}

/// Read a timestamp log.  This never fails; problems are logged and produce an empty or partial
/// result.

pub fn read_timestamp_log(path: &Path) -> TimestampLog {
    let origin = path.display().to_string();
    let parsed = fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|text| parse_timestamp_log(&text, &origin));
    match parsed {
        Ok(log) => log,
        Err(e) => {
            error!("Timestamp file {origin}: {e}");
            TimestampLog::default()
        }
    }
}

/// Parse the text of a timestamp log.  `origin` names the source in log messages.

pub fn parse_timestamp_log(text: &str, origin: &str) -> Result<TimestampLog> {
    let labeled_re = Regex::new(
        r"^\s*(?:Query\s+(\d+)|(\w+))\s*:\s*Start Time\s*=\s*([^,]+),\s*(?:Finish|End) Time\s*=\s*(\S+)",
    )?;
    let bare_re = Regex::new(r"^\s*Start Time\s*=\s*([^,]+),\s*(?:Finish|End) Time\s*=\s*(\S+)")?;
    let heading_re = Regex::new(r"^\s*(\w+)\s*:\s*$")?;
    let total_re = Regex::new(r"Total (?:Query )?Execution Time(?: for Iteration \d+)?\s*:\s*(\d+)")?;

    let mut log = TimestampLog::default();
    let mut heading: Option<String> = None;

    for (lineno, line) in text.lines().enumerate() {
        if let Some(caps) = total_re.captures(line) {
            if log.total_seconds.is_none() {
                log.total_seconds = caps[1].parse::<u64>().ok();
            }
            continue;
        }

        if let Some(caps) = labeled_re.captures(line) {
            let label = if let Some(q) = caps.get(1) {
                match q.as_str().parse::<u32>() {
                    Ok(n) => Label::Query(n),
                    Err(_) => continue,
                }
            } else {
                Label::Phase(capitalize(&caps[2]))
            };
            if let Some(iv) = make_interval(&caps[3], &caps[4], origin, lineno) {
                debug!("{origin}: {label} {}", describe(&iv));
                log.intervals.push((label, iv));
            }
            heading = None;
            continue;
        }

        if let Some(caps) = bare_re.captures(line) {
            if let Some(iv) = make_interval(&caps[1], &caps[2], origin, lineno) {
                match heading.take() {
                    Some(name) => {
                        let label = Label::Phase(capitalize(&name));
                        debug!("{origin}: {label} {}", describe(&iv));
                        log.intervals.push((label, iv));
                    }
                    None => {
                        debug!("{origin}: global {}", describe(&iv));
                        if log.global.is_none() {
                            log.global = Some(iv);
                        }
                    }
                }
            }
            heading = None;
            continue;
        }

        if let Some(caps) = heading_re.captures(line) {
            heading = Some(caps[1].to_string());
        }
    }
    Ok(log)
}

fn make_interval(start: &str, end: &str, origin: &str, lineno: usize) -> Option<Interval> {
    let start = match parse_timestamp(start) {
        Ok(t) => t,
        Err(e) => {
            warn!("{origin}:{}: {e}", lineno + 1);
            return None;
        }
    };
    let end = match parse_timestamp(end) {
        Ok(t) => t,
        Err(e) => {
            warn!("{origin}:{}: {e}", lineno + 1);
            return None;
        }
    };
    if start > end {
        warn!("{origin}:{}: start time is after end time", lineno + 1);
        return None;
    }
    Some(Interval { start, end })
}

fn describe(iv: &Interval) -> String {
    format!(
        "{} .. {}",
        format_timestamp(&iv.start),
        format_timestamp(&iv.end)
    )
}

#[cfg(test)]
use crate::dates::timestamp_from_ymdhms;

#[test]
fn test_global_log() {
    let log = read_timestamp_log(Path::new("../bench_test_data/timestamps_global.txt"));
    let g = log.global().unwrap();
    assert!(g.start == timestamp_from_ymdhms(2024, 1, 1, 0, 0, 0).unwrap());
    assert!(g.end == timestamp_from_ymdhms(2024, 1, 1, 0, 2, 0).unwrap());
    assert!(g.seconds() == 120);
    assert!(log.intervals().is_empty());
    assert!(log.total_seconds() == Some(118));
}

#[test]
fn test_phase_log() {
    let log = read_timestamp_log(Path::new("../bench_test_data/timestamps_phases.txt"));
    assert!(log.global().is_none());
    let labels = log
        .intervals()
        .iter()
        .map(|(l, _)| l.to_string())
        .collect::<Vec<String>>();
    assert!(labels == vec!["Filtering", "Joining", "Aggregation"]);
    let iv = log.get(&Label::Phase("Joining".to_string())).unwrap();
    assert!(iv.start == timestamp_from_ymdhms(2024, 3, 5, 10, 5, 0).unwrap());
    assert!(iv.end == timestamp_from_ymdhms(2024, 3, 5, 10, 9, 30).unwrap());
}

#[test]
fn test_query_log() {
    let log = read_timestamp_log(Path::new("../bench_test_data/timestamps_queries.txt"));
    assert!(log.intervals().len() == 3);
    assert!(log.intervals()[0].0 == Label::Query(1));
    assert!(log.intervals()[2].0 == Label::Query(3));
    let q2 = log.get(&Label::Query(2)).unwrap();
    assert!(q2.seconds() == 45);
    assert!(log.get(&Label::Query(4)).is_none());
}

#[test]
fn test_malformed_lines_are_skipped() {
    let text = "\
Query 1: Start Time = 2024-01-01T00:00:00Z, Finish Time = 2024-01-01T00:01:00Z
Query 2: Start Time = yesterday, Finish Time = 2024-01-01T00:02:00Z
Query 3: Start Time = 2024-01-01T00:05:00Z, Finish Time = 2024-01-01T00:04:00Z
Query 4: Start Time = 2024-01-01T00:06:00Z, Finish Time = 2024-01-01T00:07:00Z
Total Query Execution Time for Iteration 1: 95 seconds
";
    let log = parse_timestamp_log(text, "inline").unwrap();
    let labels = log.intervals().iter().map(|(l, _)| l.clone()).collect::<Vec<Label>>();
    assert!(labels == vec![Label::Query(1), Label::Query(4)]);
    assert!(log.total_seconds() == Some(95));
}

#[test]
fn test_missing_file() {
    let log = read_timestamp_log(Path::new("../bench_test_data/no_such_file.txt"));
    assert!(log.is_empty());
}
