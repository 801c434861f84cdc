// This library handles a tree of benchmark-harness log files.  It finds the directories that make
// up one experiment and parses the various log formats found in them: timestamp logs, power-meter
// dumps, mpstat, iostat, pcm and perf stat output, and per-query timing files.
//
// Nothing here writes output.  Per-file problems that are not I/O errors (malformed lines, bad
// timestamps) are logged and skipped.

mod dates;
mod iostat;
mod logtree;
mod mpstat;
mod pcm;
mod perf;
mod powerlog;
mod stats;
mod timestamps;
mod timing;

use std::fmt;

// Parsing and formatting of the ISO timestamps used by every log format.

pub use dates::{format_timestamp, parse_timestamp, timestamp_from_ymdhms, Timestamp};

// Traverse the SF*/F*/[T*/][Csv|Parquet] tree and classify group directories by layout.

pub use logtree::{
    detect_layout, find_files, find_groups, find_iterations, find_query_files,
    find_query_iteration_files, find_scale_factors, find_subdirs, Coordinate, Group, Layout,
    StorageFormat,
};

// Load start/end intervals per phase or query.

pub use timestamps::{parse_timestamp_log, read_timestamp_log, Interval, TimestampLog};

// Split a power log into sections of samples, optionally windowed by an interval, and read idle
// samples from the end of an idle log.

pub use powerlog::{
    parse_idle_samples, parse_power_sections, read_idle_samples, read_power_sections, IdleSample,
    Metric, PowerSample, PowerSections, SECTION_SEPARATOR,
};

// Mean, sample standard deviation and standard error, and min/max/mean.

pub use stats::{extent, mean, summarize, Extent, Summary};

// CPU utilisation from mpstat.

pub use mpstat::{parse_mpstat, read_mpstat, trim_edges, CpuSample};

// Device read/write volume from iostat.

pub use iostat::{parse_iostat, read_iostat, IoTotals};

// Memory throughput from pcm.

pub use pcm::{parse_memory_throughput, read_memory_throughput};

// Counters and top-down metrics from perf stat.

pub use perf::{
    parse_perf_counters, parse_topdown, read_perf_counters, read_topdown, PerfCounters, Topdown,
};

// Per-run wall times from query timing files.

pub use timing::{parse_run_times, read_run_times};

/// A Label names the unit of work a row of results describes.  Labels are rendered to text in
/// output tables and the text is the key that joins tables from different analyses, so the
/// `Display` form is part of the output format.

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    /// One repetition of a run, 1-based.
    Iteration(u32),

    /// A numbered benchmark query.
    Query(u32),

    /// A named phase, capitalized as "Filtering".
    Phase(String),

    /// Everything pooled across iterations / phases / queries.
    Aggregate,

    /// The idle period, optionally the one recorded for a particular phase.
    Idle(Option<String>),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Iteration(n) => write!(f, "Iteration {n}"),
            Label::Query(n) => write!(f, "Query {n}"),
            Label::Phase(name) => write!(f, "{name}"),
            Label::Aggregate => write!(f, "Aggregate"),
            Label::Idle(None) => write!(f, "Idle"),
            Label::Idle(Some(phase)) => write!(f, "Idle {phase}"),
        }
    }
}

/// Uppercase the first character and lowercase the rest, "filtering" => "Filtering".  Phase names
/// are written this way everywhere so that labels from directory names and labels from timestamp
/// files agree.

pub fn capitalize(s: &str) -> String {
    let mut cs = s.chars();
    match cs.next() {
        Some(c) => c.to_uppercase().chain(cs.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

#[test]
fn test_label_display() {
    assert!(Label::Iteration(3).to_string() == "Iteration 3");
    assert!(Label::Query(12).to_string() == "Query 12");
    assert!(Label::Phase("Filtering".to_string()).to_string() == "Filtering");
    assert!(Label::Aggregate.to_string() == "Aggregate");
    assert!(Label::Idle(None).to_string() == "Idle");
    assert!(Label::Idle(Some("Joining".to_string())).to_string() == "Idle Joining");
}

#[test]
fn test_capitalize() {
    assert!(capitalize("filtering") == "Filtering");
    assert!(capitalize("JOINING") == "Joining");
    assert!(capitalize("") == "");
}
