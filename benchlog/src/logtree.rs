// Enumerate the experiment tree.
//
// The harness writes its logs below a base directory as
//
//    SF<scale factor>/F<frequency>/[T<threads>/][Csv|Parquet/]...
//
// where the thread level and the storage-format level are present only in some experiments.  The
// deepest directory on that path is a "group": all the runs that share one coordinate.  Below a
// group the logs come in one of three layouts:
//
//    Iteration<n>/<log>                       one directory per repetition
//    Iterations/Iteration<n>/<Phase>/<log>    repetitions split into named phases
//    <Tool>/<tool>_..._q<n>.txt               one file per query, per tool
//
// Directory names that do not match the expected patterns are ignored, as are names that are not
// UTF8.  Numbered names are sorted numerically, so Iteration10 comes after Iteration9.

use anyhow::{bail, Result};
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StorageFormat {
    Csv,
    Parquet,
}

impl StorageFormat {
    pub const ALL: [StorageFormat; 2] = [StorageFormat::Csv, StorageFormat::Parquet];

    pub fn dir_name(&self) -> &'static str {
        match self {
            StorageFormat::Csv => "Csv",
            StorageFormat::Parquet => "Parquet",
        }
    }
}

impl fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// The coordinate of a group directory.  `frequency` is the directory name, eg "F2.5", since that
/// is how every output names it.

#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub scale_factor: u32,
    pub frequency: String,
    pub threads: Option<u32>,
    pub format: Option<StorageFormat>,
}

impl Coordinate {
    /// The numeric frequency setting, 2.5 for "F2.5".
    pub fn frequency_value(&self) -> Option<f64> {
        self.frequency.strip_prefix('F')?.parse::<f64>().ok()
    }

    /// "SF100_F2.5_T20_Csv", with absent levels left out.
    pub fn key(&self) -> String {
        format!("SF{}_{}", self.scale_factor, self.sheet_key())
    }

    /// The key without the scale factor, which is implied by the workbook the sheet is in.
    pub fn sheet_key(&self) -> String {
        let mut k = self.frequency.clone();
        if let Some(t) = self.threads {
            k += &format!("_T{t}");
        }
        if let Some(f) = self.format {
            k += &format!("_{f}");
        }
        k
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[derive(Debug, Clone)]
pub struct Group {
    pub coordinate: Coordinate,
    pub path: PathBuf,
}

/// How the runs of a group are laid out on disk.

#[derive(Debug, Clone, PartialEq)]
pub enum Layout {
    /// `Iteration<n>` directories directly below the group, sorted by n.
    Iterations(Vec<(u32, PathBuf)>),

    /// `Iterations/Iteration<n>/<phase>` directories.  The phases are the directory names found in
    /// the first iteration, as written on disk.
    Phases {
        iterations: Vec<(u32, PathBuf)>,
        phases: Vec<String>,
    },

    /// Neither of the above; per-query files are found in tool subdirectories.
    Queries,
}

/// Find the scale-factor directories below `base`, sorted by scale factor.
///
/// This returns an error if `base` does not name a directory or cannot be read.

pub fn find_scale_factors(base: &Path) -> Result<Vec<(u32, PathBuf)>> {
    if !base.is_dir() {
        bail!("Base path '{}' does not exist", base.display());
    }
    let re = Regex::new(r"^SF(\d+)$")?;
    let mut sfs = numbered_subdirs(base, &re)?;
    sfs.sort_by_key(|(n, _)| *n);
    Ok(sfs)
}

/// Find the group directories below one scale-factor directory, in frequency, thread count and
/// storage format order.

pub fn find_groups(sf_dir: &Path, scale_factor: u32) -> Result<Vec<Group>> {
    let f_re = Regex::new(r"^F\d+(\.\d+)?$")?;
    let t_re = Regex::new(r"^T(\d+)$")?;

    let mut freqs = named_subdirs(sf_dir)?
        .into_iter()
        .filter(|(name, _)| f_re.is_match(name))
        .collect::<Vec<_>>();
    freqs.sort_by(|(a, _), (b, _)| {
        let fa = a[1..].parse::<f64>().unwrap_or(0.0);
        let fb = b[1..].parse::<f64>().unwrap_or(0.0);
        fa.total_cmp(&fb)
    });

    let mut groups = vec![];
    for (frequency, f_path) in freqs {
        let mut threads = numbered_subdirs(&f_path, &t_re)?;
        threads.sort_by_key(|(n, _)| *n);
        let levels = if threads.is_empty() {
            vec![(None, f_path)]
        } else {
            threads
                .into_iter()
                .map(|(n, p)| (Some(n), p))
                .collect::<Vec<_>>()
        };
        for (threads, t_path) in levels {
            let formats = StorageFormat::ALL
                .iter()
                .map(|f| (*f, t_path.join(f.dir_name())))
                .filter(|(_, p)| p.is_dir())
                .collect::<Vec<_>>();
            let coordinate = Coordinate {
                scale_factor,
                frequency: frequency.clone(),
                threads,
                format: None,
            };
            if formats.is_empty() {
                groups.push(Group {
                    coordinate,
                    path: t_path,
                });
            } else {
                for (format, path) in formats {
                    groups.push(Group {
                        coordinate: Coordinate {
                            format: Some(format),
                            ..coordinate.clone()
                        },
                        path,
                    });
                }
            }
        }
    }
    Ok(groups)
}

/// `Iteration<n>` directories in `dir`, sorted by n.  A missing directory has no iterations.

pub fn find_iterations(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }
    let re = Regex::new(r"^Iteration(\d+)$")?;
    let mut its = numbered_subdirs(dir, &re)?;
    its.sort_by_key(|(n, _)| *n);
    Ok(its)
}

/// Files in `dir` whose names start with `prefix` and end with `_q<n>.txt`, sorted by n.  If two
/// files have the same n the first in name order is used.

pub fn find_query_files(dir: &Path, prefix: &str) -> Result<Vec<(u32, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }
    let re = Regex::new(r"_q(\d+)\.txt$")?;
    let mut entries = vec![];
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else {
            // Bad directory entries are ignored
            continue;
        };
        let p = entry.path();
        if !p.is_file() {
            continue;
        }
        let Some(name) = p.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(prefix) {
            continue;
        }
        if let Some(n) = re.captures(name).and_then(|c| c[1].parse::<u32>().ok()) {
            entries.push((n, name.to_string(), p));
        }
    }
    entries.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
    entries.dedup_by_key(|(n, _, _)| *n);
    Ok(entries.into_iter().map(|(n, _, p)| (n, p)).collect())
}

/// Files in `dir` whose names start with `prefix` and end with `_q<n>_it<k>.txt`, grouped by n.
/// Groups are sorted by n and the files in a group by k, numerically.

pub fn find_query_iteration_files(dir: &Path, prefix: &str) -> Result<Vec<(u32, Vec<PathBuf>)>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }
    let re = Regex::new(r"_q(\d+)_it(\d+)\.txt$")?;
    let mut entries = vec![];
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else {
            continue;
        };
        let p = entry.path();
        if !p.is_file() {
            continue;
        }
        let Some(name) = p.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(prefix) {
            continue;
        }
        let Some(c) = re.captures(name) else {
            continue;
        };
        if let (Ok(q), Ok(it)) = (c[1].parse::<u32>(), c[2].parse::<u32>()) {
            entries.push((q, it, p));
        }
    }
    entries.sort_by_key(|(q, it, _)| (*q, *it));
    let mut groups: Vec<(u32, Vec<PathBuf>)> = vec![];
    for (q, _, p) in entries {
        match groups.last_mut() {
            Some((last, files)) if *last == q => files.push(p),
            _ => groups.push((q, vec![p])),
        }
    }
    Ok(groups)
}

/// Regular files in `dir` whose whole name matches `pattern`, sorted by name.  A missing directory
/// has none.

pub fn find_files(dir: &Path, pattern: &str) -> Result<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }
    let re = Regex::new(&format!("^(?:{pattern})$"))?;
    let mut files = vec![];
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else {
            continue;
        };
        let p = entry.path();
        if !p.is_file() {
            continue;
        }
        if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
            if re.is_match(name) {
                files.push((name.to_string(), p.clone()));
            }
        }
    }
    files.sort();
    Ok(files)
}

/// All subdirectories of `dir` with UTF8 names, sorted by name.  A missing directory has none.

pub fn find_subdirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }
    let mut dirs = named_subdirs(dir)?;
    dirs.sort();
    Ok(dirs)
}

pub fn detect_layout(group_dir: &Path) -> Result<Layout> {
    let iterations = find_iterations(group_dir)?;
    if !iterations.is_empty() {
        return Ok(Layout::Iterations(iterations));
    }
    let iterations = find_iterations(&group_dir.join("Iterations"))?;
    if let Some((_, first)) = iterations.first() {
        let phases = find_subdirs(first)?
            .into_iter()
            .map(|(name, _)| name)
            .collect::<Vec<_>>();
        return Ok(Layout::Phases { iterations, phases });
    }
    Ok(Layout::Queries)
}

fn named_subdirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs = vec![];
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else {
            continue;
        };
        let p = entry.path();
        if !p.is_dir() {
            continue;
        }
        if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
            dirs.push((name.to_string(), p.clone()));
        }
    }
    Ok(dirs)
}

// `re` must have the number as its first capture group.
fn numbered_subdirs(dir: &Path, re: &Regex) -> Result<Vec<(u32, PathBuf)>> {
    Ok(named_subdirs(dir)?
        .into_iter()
        .filter_map(|(name, p)| {
            let n = re.captures(&name)?.get(1)?.as_str().parse::<u32>().ok()?;
            Some((n, p))
        })
        .collect())
}

#[test]
fn test_find_scale_factors() {
    let sfs = find_scale_factors(Path::new("../bench_test_data/tree")).unwrap();
    let numbers = sfs.iter().map(|(n, _)| *n).collect::<Vec<u32>>();
    // "SF_old" and the file "SF5" are not scale-factor directories
    assert!(numbers == vec![10, 20, 30]);
    assert!(find_scale_factors(Path::new("../bench_test_data/no_such_dir")).is_err());
}

#[test]
fn test_find_groups() {
    let groups = find_groups(Path::new("../bench_test_data/tree/SF10"), 10).unwrap();
    let keys = groups.iter().map(|g| g.coordinate.key()).collect::<Vec<String>>();
    assert!(keys == vec!["SF10_F1.0_Csv", "SF10_F1.0_Parquet", "SF10_F2.0_Csv"]);

    let groups = find_groups(Path::new("../bench_test_data/tree/SF20"), 20).unwrap();
    let keys = groups.iter().map(|g| g.coordinate.sheet_key()).collect::<Vec<String>>();
    assert!(keys == vec!["F2.0_T4", "F2.0_T8"]);
    assert!(groups[0].coordinate.frequency_value() == Some(2.0));
    assert!(groups[0].coordinate.threads == Some(4));

    let groups = find_groups(Path::new("../bench_test_data/tree/SF30"), 30).unwrap();
    assert!(groups.len() == 1);
    assert!(groups[0].coordinate.sheet_key() == "F1.5");
}

#[test]
fn test_find_iterations_numeric_order() {
    let its = find_iterations(Path::new("../bench_test_data/tree/SF10/F1.0/Csv")).unwrap();
    let numbers = its.iter().map(|(n, _)| *n).collect::<Vec<u32>>();
    assert!(numbers == vec![1, 2, 10]);
    assert!(find_iterations(Path::new("../bench_test_data/no_such_dir")).unwrap().is_empty());
}

#[test]
fn test_find_query_files() {
    let qs = find_query_files(
        Path::new("../bench_test_data/tree/SF20/F2.0/T4/QueriesTiming"),
        "query_",
    )
    .unwrap();
    let numbers = qs.iter().map(|(n, _)| *n).collect::<Vec<u32>>();
    assert!(numbers == vec![1, 2, 11]);
}

#[test]
fn test_find_query_iteration_files() {
    let qs = find_query_iteration_files(
        Path::new("../bench_test_data/tree/SF20/F2.0/T8/CpuLoad/Iterations"),
        "cpu_load_",
    )
    .unwrap();
    assert!(qs.len() == 2);
    assert!(qs[0].0 == 1);
    let names = qs[0]
        .1
        .iter()
        .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
        .collect::<Vec<String>>();
    assert!(
        names
            == vec![
                "cpu_load_f2.0_sf20_t8_q1_it1.txt",
                "cpu_load_f2.0_sf20_t8_q1_it2.txt",
                "cpu_load_f2.0_sf20_t8_q1_it10.txt",
            ]
    );
    assert!(qs[1].0 == 2 && qs[1].1.len() == 1);

    // The concatenated per-query files do not match
    let dir = Path::new("../bench_test_data/tree/SF20/F2.0/T4/CpuLoad/Aggregated");
    assert!(find_query_iteration_files(dir, "cpu_load_").unwrap().is_empty());
}

#[test]
fn test_detect_layout() {
    match detect_layout(Path::new("../bench_test_data/tree/SF10/F1.0/Csv")).unwrap() {
        Layout::Iterations(its) => assert!(its.len() == 3),
        _ => panic!("Expected iterations"),
    }
    match detect_layout(Path::new("../bench_test_data/tree/SF30/F1.5")).unwrap() {
        Layout::Phases { iterations, phases } => {
            assert!(iterations.len() == 2);
            assert!(phases == vec!["Filtering", "Joining"]);
        }
        _ => panic!("Expected phases"),
    }
    assert!(detect_layout(Path::new("../bench_test_data/tree/SF20/F2.0/T4")).unwrap() == Layout::Queries);
}

#[test]
fn test_find_files() {
    let dir = Path::new("../bench_test_data/tree/SF20/F2.0/T4/IloPower");
    let power = find_files(dir, r"ilo_power_.*\.txt")
        .unwrap()
        .into_iter()
        .map(|(name, _)| name)
        .filter(|name| !name.ends_with("_idle.txt"))
        .collect::<Vec<String>>();
    assert!(power == vec!["ilo_power_tpch.txt"]);
    let idle = find_files(dir, r".*_idle\.txt").unwrap();
    assert!(idle.len() == 1);
    assert!(find_files(Path::new("../bench_test_data/no_such_dir"), ".*").unwrap().is_empty());
}
