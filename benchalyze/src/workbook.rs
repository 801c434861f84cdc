// Result tables ("sheets") and the workbooks that hold them.
//
// A workbook is stored as a directory named after the workbook below the scale-factor directory it
// describes, with one CSV file per sheet:
//
//   SF100/power_metrics_combined/001-F1.0_Csv.csv
//   SF100/power_metrics_combined/002-F1.0_Parquet.csv
//
// The numeric prefix keeps the sheets in the order they were added.  The first record of each file
// is the column header.  Undefined values are written as "N/A".
//
// Sheet names follow spreadsheet rules so that the CSV files can be imported as sheets without
// renaming: at most 31 characters and none of []:*?/\.

use anyhow::{bail, Context, Result};
use log::debug;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const MISSING: &str = "N/A";
pub const MAX_SHEET_NAME: usize = 31;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
    Missing,
}

impl Cell {
    /// Non-finite values are undefined.
    pub fn float(x: f64) -> Cell {
        if x.is_finite() {
            Cell::Float(x)
        } else {
            Cell::Missing
        }
    }

    pub fn maybe_float(x: Option<f64>) -> Cell {
        x.map_or(Cell::Missing, Cell::float)
    }

    pub fn maybe_int(x: Option<u64>) -> Cell {
        x.and_then(|v| i64::try_from(v).ok())
            .map_or(Cell::Missing, Cell::Int)
    }

    pub fn text(s: impl fmt::Display) -> Cell {
        Cell::Text(s.to_string())
    }

    /// The inverse of the CSV rendering: "N/A" and the empty string are undefined, then integer,
    /// then float, and anything else is text.
    pub fn parse(s: &str) -> Cell {
        let s = s.trim();
        if s.is_empty() || s == MISSING {
            Cell::Missing
        } else if let Ok(n) = s.parse::<i64>() {
            Cell::Int(n)
        } else if let Ok(x) = s.parse::<f64>() {
            Cell::float(x)
        } else {
            Cell::Text(s.to_string())
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(n) => Some(*n as f64),
            Cell::Float(x) => Some(*x),
            Cell::Text(_) | Cell::Missing => None,
        }
    }

    #[cfg(test)]
    pub fn is_missing(&self) -> bool {
        *self == Cell::Missing
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Int(n) => write!(f, "{n}"),
            Cell::Float(x) => write!(f, "{x:?}"),
            Cell::Text(s) => write!(f, "{s}"),
            Cell::Missing => write!(f, "{MISSING}"),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Int(n) => serializer.serialize_i64(*n),
            Cell::Float(x) => serializer.serialize_f64(*x),
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Missing => serializer.serialize_str(MISSING),
        }
    }
}

/// Turn a group key into a legal sheet name: the scale factor is implied by the workbook and is
/// removed, forbidden characters become "_", and the result is cut to 31 characters.

pub fn sheet_name(raw: &str) -> String {
    let stripped = match Regex::new(r"^SF\d+_") {
        Ok(re) => re.replace(raw, "").into_owned(),
        Err(_) => raw.to_string(),
    };
    stripped
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .take(MAX_SHEET_NAME)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(raw_name: &str, columns: &[&str]) -> Sheet {
        Sheet {
            name: sheet_name(raw_name),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            bail!(
                "Row has {} cells but sheet '{}' has {} columns",
                row.len(),
                self.name,
                self.columns.len()
            );
        }
        self.rows.push(row);
        Ok(())
    }

    /// A copy with the same name and columns and the rows in the order given by `compare`.  The
    /// sort is stable.
    pub fn sorted_by<F>(&self, compare: F) -> Sheet
    where
        F: FnMut(&Vec<Cell>, &Vec<Cell>) -> std::cmp::Ordering,
    {
        let mut rows = self.rows.clone();
        rows.sort_by(compare);
        Sheet {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows,
        }
    }

    /// The first row whose first cell renders as `key`.
    pub fn find_row(&self, key: &str) -> Option<&[Cell]> {
        self.rows
            .iter()
            .find(|r| r.first().is_some_and(|c| c.to_string() == key))
            .map(|r| r.as_slice())
    }
}

#[derive(Debug, Clone)]
pub struct Workbook {
    stem: String,
    sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(stem: &str) -> Workbook {
        Workbook {
            stem: stem.to_string(),
            sheets: vec![],
        }
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Add a sheet at the end.  If the name is taken, a numeric suffix is added, shortening the
    /// name if necessary to stay within the length limit.
    pub fn add_sheet(&mut self, mut sheet: Sheet) {
        if self.sheet(&sheet.name).is_some() {
            let mut k = 2;
            loop {
                let suffix = format!("_{k}");
                let base = sheet
                    .name
                    .chars()
                    .take(MAX_SHEET_NAME - suffix.len())
                    .collect::<String>();
                let candidate = base + &suffix;
                if self.sheet(&candidate).is_none() {
                    sheet.name = candidate;
                    break;
                }
                k += 1;
            }
        }
        self.sheets.push(sheet);
    }

    pub fn path(&self, sf_dir: &Path) -> PathBuf {
        sf_dir.join(&self.stem)
    }

    /// Write the workbook below `sf_dir`, replacing any previous version.  Returns the workbook
    /// directory.
    pub fn write(&self, sf_dir: &Path) -> Result<PathBuf> {
        let dir = self.path(sf_dir);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("Removing old workbook {}", dir.display()))?;
        }
        fs::create_dir_all(&dir).with_context(|| format!("Creating workbook {}", dir.display()))?;
        for (i, sheet) in self.sheets.iter().enumerate() {
            let path = dir.join(format!("{:03}-{}.csv", i + 1, sheet.name));
            let mut writer = csv::Writer::from_path(&path)
                .with_context(|| format!("Creating sheet {}", path.display()))?;
            writer.write_record(&sheet.columns)?;
            for row in &sheet.rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
            debug!("Wrote {} rows to {}", sheet.rows.len(), path.display());
        }
        Ok(dir)
    }

    /// Read the workbook `stem` below `sf_dir`.
    pub fn read(sf_dir: &Path, stem: &str) -> Result<Workbook> {
        let dir = sf_dir.join(stem);
        if !dir.is_dir() {
            bail!("Workbook {} not found", dir.display());
        }
        let mut files = vec![];
        for entry in fs::read_dir(&dir)? {
            let p = entry?.path();
            if p.is_file() && p.extension().is_some_and(|e| e == "csv") {
                files.push(p);
            }
        }
        files.sort();

        let mut workbook = Workbook::new(stem);
        for path in files {
            let Some(file_stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let name = match file_stem.split_once('-') {
                Some((_, name)) => name,
                None => file_stem,
            };
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .from_path(&path)
                .with_context(|| format!("Opening sheet {}", path.display()))?;
            let columns = reader
                .headers()?
                .iter()
                .map(|h| h.to_string())
                .collect::<Vec<String>>();
            let mut sheet = Sheet {
                name: name.to_string(),
                columns,
                rows: vec![],
            };
            for record in reader.records() {
                let record = record.with_context(|| format!("Reading sheet {}", path.display()))?;
                sheet.push_row(record.iter().map(Cell::parse).collect())?;
            }
            workbook.sheets.push(sheet);
        }
        Ok(workbook)
    }
}

#[test]
fn test_sheet_name() {
    assert!(sheet_name("SF100_F2.5_T20_Csv") == "F2.5_T20_Csv");
    assert!(sheet_name("F1.0_Csv") == "F1.0_Csv");
    assert!(sheet_name("SF1_a[b]c:d*e?f/g\\h") == "a_b_c_d_e_f_g_h");
    let long = sheet_name("SF10_F1.0_T128_Parquet_with_a_very_long_suffix");
    assert!(long.chars().count() == 31);
    assert!(long == "F1.0_T128_Parquet_with_a_very_l");
}

#[test]
fn test_duplicate_sheet_names() {
    let name = "F1.0_T128_Parquet_with_a_very_long_suffix";
    let mut wb = Workbook::new("test");
    wb.add_sheet(Sheet::new(name, &["Phase"]));
    wb.add_sheet(Sheet::new(name, &["Phase"]));
    wb.add_sheet(Sheet::new(name, &["Phase"]));
    let names = wb.sheets().iter().map(|s| s.name().to_string()).collect::<Vec<String>>();
    assert!(names[0] == "F1.0_T128_Parquet_with_a_very_l");
    assert!(names[1] == "F1.0_T128_Parquet_with_a_very_2");
    assert!(names[2] == "F1.0_T128_Parquet_with_a_very_3");
    assert!(names.iter().all(|n| n.chars().count() <= MAX_SHEET_NAME));
}

#[test]
fn test_cell_parse() {
    assert!(Cell::parse("N/A") == Cell::Missing);
    assert!(Cell::parse("") == Cell::Missing);
    assert!(Cell::parse("17") == Cell::Int(17));
    assert!(Cell::parse("2.0") == Cell::Float(2.0));
    assert!(Cell::parse("1e-7") == Cell::Float(1e-7));
    assert!(Cell::parse("Query 3") == Cell::Text("Query 3".to_string()));
    assert!(Cell::float(f64::NAN) == Cell::Missing);
    assert!(Cell::maybe_int(Some(5)) == Cell::Int(5));
    assert!(Cell::Int(3).as_f64() == Some(3.0));
    assert!(Cell::Missing.as_f64().is_none());
}

#[test]
fn test_push_row_checks_width() {
    let mut s = Sheet::new("x", &["a", "b"]);
    assert!(s.push_row(vec![Cell::Int(1)]).is_err());
    assert!(s.push_row(vec![Cell::Int(1), Cell::Missing]).is_ok());
    assert!(s.rows().len() == 1);
}

#[test]
fn test_workbook_write_read() {
    let tmp = tempfile::tempdir().unwrap();
    let mut wb = Workbook::new("power_metrics_combined");
    let mut s1 = Sheet::new("SF10_F1.0_Csv", &["Phase", "Samples", "Average Power"]);
    s1.push_row(vec![Cell::text("Iteration 1"), Cell::Int(2), Cell::Float(210.0)])
        .unwrap();
    s1.push_row(vec![Cell::text("Idle"), Cell::Int(0), Cell::Missing])
        .unwrap();
    s1.push_row(vec![Cell::text("Aggregate"), Cell::Int(5), Cell::Float(1.0 / 3.0)])
        .unwrap();
    let mut s2 = Sheet::new("SF10_F2.0_Csv", &["Phase", "Samples", "Average Power"]);
    s2.push_row(vec![Cell::text("Query 1"), Cell::Int(1), Cell::Float(300.5)])
        .unwrap();
    wb.add_sheet(s1.clone());
    wb.add_sheet(s2.clone());

    let dir = wb.write(tmp.path()).unwrap();
    assert!(dir.join("001-F1.0_Csv.csv").is_file());
    assert!(dir.join("002-F2.0_Csv.csv").is_file());

    let back = Workbook::read(tmp.path(), "power_metrics_combined").unwrap();
    assert!(back.sheets().len() == 2);
    assert!(back.sheets()[0] == s1);
    assert!(back.sheets()[1] == s2);
    assert!(back.sheet("F2.0_Csv").unwrap().column_index("Average Power") == Some(2));
}

#[test]
fn test_workbook_write_replaces() {
    let tmp = tempfile::tempdir().unwrap();
    let mut wb = Workbook::new("w");
    wb.add_sheet(Sheet::new("a", &["Phase"]));
    wb.add_sheet(Sheet::new("b", &["Phase"]));
    wb.write(tmp.path()).unwrap();

    let mut wb = Workbook::new("w");
    wb.add_sheet(Sheet::new("c", &["Phase"]));
    wb.write(tmp.path()).unwrap();
    let back = Workbook::read(tmp.path(), "w").unwrap();
    assert!(back.sheets().len() == 1);
    assert!(back.sheets()[0].name() == "c");

    assert!(Workbook::read(tmp.path(), "nonesuch").is_err());
}
