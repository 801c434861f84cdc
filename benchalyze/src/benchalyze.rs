// `benchalyze` -- Analyze the log trees of the database benchmark harness
//
// Run with --help for brief help.  Every subcommand takes the base directory of one experiment, the
// directory holding the SF<n> directories, and writes one workbook into each SF<n> directory.  The
// energy and sort subcommands read workbooks written by exec-time, power and energy, so run those
// first:
//
//   benchalyze exec-time data/experiment1
//   benchalyze power data/experiment1
//   benchalyze energy data/experiment1
//   benchalyze sort data/experiment1
//
//
// Quirks
//
// Power-log sections are matched to iterations (or queries) purely by position.  If the harness was
// interrupted and restarted in the middle of a run the log will have an extra section and every
// later iteration is paired with the wrong samples.  The section count is checked against the
// number of runs and a mismatch is reported, but the data are used anyway unless --strict-sections
// is given.
//
// Per-phase groups take their phase list from the first iteration.  A phase that only appears in
// later iterations is ignored.

mod configs;
mod cpu;
mod disk;
mod energy;
mod exectime;
mod format;
mod membw;
mod perfstat;
mod power;
mod report;
mod sorted;
mod workbook;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::Path;
use std::process;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Average execution time per phase or query
    ExecTime(AnalysisArgs),

    /// Power draw per iteration, phase or query, and at idle
    Power(AnalysisArgs),

    /// Energy from the exec-time and power workbooks
    Energy(AnalysisArgs),

    /// CPU utilisation from mpstat
    Cpu(AnalysisArgs),

    /// Disk volume from iostat
    Io(AnalysisArgs),

    /// Memory bandwidth from pcm
    Membw(AnalysisArgs),

    /// Hardware counters and top-down metrics from perf stat
    Perf(AnalysisArgs),

    /// Power and energy workbooks sorted by power and energy
    Sort(AnalysisArgs),
}

#[derive(Args, Debug)]
pub struct AnalysisArgs {
    /// The experiment directory, holding the SF<n> directories
    base_path: String,

    #[command(flatten)]
    config_args: ConfigArgs,

    #[command(flatten)]
    print_args: PrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// File containing JSON data with analysis settings [default: none]
    #[arg(long)]
    config_file: Option<String>,

    /// Expect this many sections in every power log [default: the number of runs in the group]
    #[arg(long)]
    sections: Option<usize>,

    /// Read this many entries from the end of idle power logs [default: 20]
    #[arg(long)]
    idle_samples: Option<usize>,

    /// Sum iostat data for this device (repeatable) [default: sda, sdb]
    #[arg(long)]
    device: Vec<String>,

    /// Show queries up to this number even if they have no data [default: 22]
    #[arg(long)]
    query_count: Option<u32>,

    /// Skip groups whose power log does not have the expected number of sections
    #[arg(long, default_value_t = false)]
    strict_sections: bool,
}

#[derive(Args, Debug, Default)]
pub struct PrintArgs {
    /// Print tables as CSV instead of fixed-format
    #[arg(long, default_value_t = false)]
    csv: bool,
}

#[derive(Args, Debug, Default)]
pub struct MetaArgs {
    /// Print debug output
    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    /// Print only warnings and errors, no tables
    #[arg(long, short, default_value_t = false)]
    quiet: bool,
}

fn main() {
    match benchalyze() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {}", msg);
            process::exit(1);
        }
    }
}

fn benchalyze() -> Result<()> {
    let cli = Cli::parse();

    let args = match cli.command {
        Commands::ExecTime(ref a)
        | Commands::Power(ref a)
        | Commands::Energy(ref a)
        | Commands::Cpu(ref a)
        | Commands::Io(ref a)
        | Commands::Membw(ref a)
        | Commands::Perf(ref a)
        | Commands::Sort(ref a) => a,
    };

    // Progress goes to stdout along with the tables; RUST_LOG overrides the level.

    let level = if args.meta_args.verbose {
        "debug"
    } else if args.meta_args.quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stdout)
        .init();

    let opts = report::Options {
        settings: settings(&args.config_args)?,
        csv: args.print_args.csv,
        quiet: args.meta_args.quiet,
    };
    log::debug!("Settings: {:?}", opts.settings);

    let base = Path::new(&args.base_path);
    let output = &mut std::io::stdout();
    match cli.command {
        Commands::ExecTime(_) => exectime::run(output, base, &opts),
        Commands::Power(_) => power::run(output, base, &opts),
        Commands::Energy(_) => energy::run(output, base, &opts),
        Commands::Cpu(_) => cpu::run(output, base, &opts),
        Commands::Io(_) => disk::run(output, base, &opts),
        Commands::Membw(_) => membw::run(output, base, &opts),
        Commands::Perf(_) => perfstat::run(output, base, &opts),
        Commands::Sort(_) => sorted::run(output, base, &opts),
    }
}

// Settings from the config file, if any, overridden by switches.

fn settings(config_args: &ConfigArgs) -> Result<configs::Settings> {
    let mut settings = if let Some(ref config_filename) = config_args.config_file {
        configs::read_from_json(config_filename)?
    } else {
        configs::Settings::default()
    };
    if let Some(n) = config_args.sections {
        if n == 0 {
            anyhow::bail!("--sections must be positive");
        }
        settings.sections = Some(n);
    }
    if let Some(n) = config_args.idle_samples {
        settings.idle_samples = n;
    }
    if !config_args.device.is_empty() {
        settings.devices = config_args.device.clone();
    }
    if let Some(n) = config_args.query_count {
        settings.query_count = n;
    }
    if config_args.strict_sections {
        settings.strict_sections = true;
    }
    Ok(settings)
}

#[test]
fn test_cli_parses() {
    let cli = Cli::try_parse_from([
        "benchalyze",
        "power",
        "--sections",
        "8",
        "--device",
        "sda",
        "--device",
        "nvme0n1",
        "--strict-sections",
        "data/exp1",
    ])
    .unwrap();
    let Commands::Power(args) = cli.command else {
        panic!("Expected power");
    };
    assert!(args.base_path == "data/exp1");
    let s = settings(&args.config_args).unwrap();
    assert!(s.sections == Some(8));
    assert!(s.devices == vec!["sda".to_string(), "nvme0n1".to_string()]);
    assert!(s.strict_sections);
    assert!(s.idle_samples == 20);

    // Exactly one positional argument
    assert!(Cli::try_parse_from(["benchalyze", "cpu"]).is_err());
    assert!(Cli::try_parse_from(["benchalyze", "cpu", "a", "b"]).is_err());
}

#[test]
fn test_switches_override_config_file() {
    let args = ConfigArgs {
        config_file: Some("../bench_test_data/config.json".to_string()),
        idle_samples: Some(3),
        ..ConfigArgs::default()
    };
    let s = settings(&args).unwrap();
    assert!(s.sections == Some(8));
    assert!(s.idle_samples == 3);
    assert!(s.devices == vec!["nvme0n1".to_string()]);
}

// The analyses run over a copy of the fixture tree since they write workbooks into it.

#[test]
fn test_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let base = tmp.path().join("exp");
    report::copy_tree(Path::new("../bench_test_data/tree"), &base);

    let opts = report::Options::default();
    let mut out = vec![];
    exectime::run(&mut out, &base, &opts).unwrap();
    power::run(&mut out, &base, &opts).unwrap();
    energy::run(&mut out, &base, &opts).unwrap();
    sorted::run(&mut out, &base, &opts).unwrap();
    cpu::run(&mut out, &base, &opts).unwrap();
    disk::run(&mut out, &base, &opts).unwrap();
    membw::run(&mut out, &base, &opts).unwrap();
    perfstat::run(&mut out, &base, &opts).unwrap();
    assert!(!out.is_empty());

    let sf10 = base.join("SF10");
    let times = workbook::Workbook::read(&sf10, exectime::STEM).unwrap();
    let names = times.sheets().iter().map(|s| s.name().to_string()).collect::<Vec<String>>();
    assert!(names == vec!["F1.0_Csv", "F1.0_Parquet", "F2.0_Csv"]);

    // F1.0_Parquet has no power log, so it has no power sheet and no energy sheet
    let powers = workbook::Workbook::read(&sf10, power::STEM).unwrap();
    assert!(powers.sheets().len() == 2);
    let energy = workbook::Workbook::read(&sf10, energy::STEM).unwrap();
    let s = energy.sheet("F1.0_Csv").unwrap();
    assert!(s.rows().len() == 1);
    assert!(s.rows()[0][3] == workbook::Cell::Float(75.0 * 240.0));

    let sorted = workbook::Workbook::read(&sf10, sorted::POWER_STEM).unwrap();
    let first = &sorted.sheet("F1.0_Csv").unwrap().rows()[0];
    assert!(first[0] == workbook::Cell::text("Idle"));

    assert!(base.join("SF20").join(membw::STEM).is_dir());
    assert!(base.join("SF30").join(perfstat::STEM).is_dir());

    // No CPU data in SF10/F1.0_Parquet or SF10/F2.0_Csv, but F1.0_Csv has some
    let cpu = workbook::Workbook::read(&sf10, cpu::STEM).unwrap();
    assert!(cpu.sheets().len() == 1);
}
