// Read analysis settings from a json file.
//
// The file holds one object { ... } with the following named fields and value types, all optional:
//
//   sections - integer, the number of sections to expect in every power log [default: the number
//              of iterations, or the highest query number, of the group]
//   idle_samples - integer, how many entries to read from the end of an idle power log [20]
//   devices - array of string, the iostat devices to sum over [["sda", "sdb"]]
//   query_count - integer, the number of benchmark queries, missing ones are shown as N/A [22]
//   strict_sections - boolean, skip a group whose power log has the wrong number of sections
//                     instead of warning about it [false]
//
// Command line switches override values from the file.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub sections: Option<usize>,
    pub idle_samples: usize,
    pub devices: Vec<String>,
    pub query_count: u32,
    pub strict_sections: bool,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            sections: None,
            idle_samples: 20,
            devices: vec!["sda".to_string(), "sdb".to_string()],
            query_count: 22,
            strict_sections: false,
        }
    }
}

// As for the system config files, the input is human-generated and all fields are optional, so
// this uses the generic JSON parser followed by explicit decoding of the fields.

pub fn read_from_json(filename: &str) -> Result<Settings> {
    let file = File::open(path::Path::new(filename))
        .with_context(|| format!("Config file {filename}"))?;
    let reader = BufReader::new(file);
    let v = serde_json::from_reader(reader)
        .with_context(|| format!("Config file {filename}"))?;
    decode(&v)
}

pub fn decode(v: &Value) -> Result<Settings> {
    let Value::Object(fields) = v else {
        bail!("Expected an object value")
    };
    let mut settings = Settings::default();
    if let Some(n) = grab_usize(fields, "sections")? {
        if n == 0 {
            bail!("Field 'sections' must be positive");
        }
        settings.sections = Some(n);
    }
    if let Some(n) = grab_usize(fields, "idle_samples")? {
        settings.idle_samples = n;
    }
    if let Some(n) = grab_usize(fields, "query_count")? {
        settings.query_count = u32::try_from(n).context("Field 'query_count' is too large")?;
    }
    if let Some(d) = fields.get("devices") {
        let Value::Array(names) = d else {
            bail!("Field 'devices' must have an array value");
        };
        let mut devices = vec![];
        for name in names {
            if let Value::String(s) = name {
                devices.push(s.clone());
            } else {
                bail!("Field 'devices' must hold only strings");
            }
        }
        settings.devices = devices;
    }
    if let Some(b) = fields.get("strict_sections") {
        if let Value::Bool(b) = b {
            settings.strict_sections = *b;
        } else {
            bail!("Field 'strict_sections' must have a boolean value");
        }
    }
    Ok(settings)
}

fn grab_usize(fields: &serde_json::Map<String, Value>, name: &str) -> Result<Option<usize>> {
    match fields.get(name) {
        None => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(n) = n.as_u64() {
                Ok(Some(usize::try_from(n)?))
            } else {
                bail!("Field '{name}' must have unsigned integer value")
            }
        }
        Some(_) => bail!("Field '{name}' must have an integer value"),
    }
}

#[test]
fn test_read_config() {
    let s = read_from_json("../bench_test_data/config.json").unwrap();
    assert!(s.sections == Some(8));
    assert!(s.idle_samples == 10);
    assert!(s.devices == vec!["nvme0n1".to_string()]);
    assert!(s.query_count == 22);
    assert!(s.strict_sections);
    assert!(read_from_json("../bench_test_data/no_such_file.json").is_err());
}

#[test]
fn test_decode_defaults() {
    let s = decode(&serde_json::json!({})).unwrap();
    assert!(s == Settings::default());
}

#[test]
fn test_decode_rejects_wrong_types() {
    assert!(decode(&serde_json::json!([])).is_err());
    assert!(decode(&serde_json::json!({"sections": "8"})).is_err());
    assert!(decode(&serde_json::json!({"sections": 0})).is_err());
    assert!(decode(&serde_json::json!({"idle_samples": -1})).is_err());
    assert!(decode(&serde_json::json!({"idle_samples": 2.5})).is_err());
    assert!(decode(&serde_json::json!({"devices": "sda"})).is_err());
    assert!(decode(&serde_json::json!({"devices": ["sda", 1]})).is_err());
    assert!(decode(&serde_json::json!({"strict_sections": 1})).is_err());
}
