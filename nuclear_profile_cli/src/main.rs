use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use nuclear_profile::{
    analyse_population, AnalysisReport, Landmark, Nucleus, Params, Point, Population, Profile,
    ProfileSegmenter, ProfileType, ProgressCounter, RuleSetCollection, SegmentRing,
    LOWER_QUARTILE, MEDIAN, UPPER_QUARTILE,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Nuclear outline profiling CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Profile, landmark and segment one or more population files
    Analyse(AnalyseArgs),
    /// Segment a single profile read from CSV or JSON
    Segment(SegmentArgs),
    /// Print a preset rule collection as JSON
    Rules(RulesArgs),
}

#[derive(Parser, Debug)]
struct AnalyseArgs {
    /// Population JSON files (`{"name", "nuclei": [{"name", "border", "centre"}]}`)
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Output JSON report path (`-` for stdout)
    #[arg(short, long, default_value = "report.json", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Preset rule collection for landmark detection
    #[arg(long, value_enum, default_value_t = ShapeOpt::Rodent)]
    shape: ShapeOpt,

    /// Rule collection JSON (overrides `--shape`)
    #[arg(long, value_hint = ValueHint::FilePath)]
    rules: Option<PathBuf>,

    /// Params JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Minimum segment length (overrides the config)
    #[arg(long)]
    min_length: Option<usize>,

    /// Fixed aggregate length (overrides the config)
    #[arg(long)]
    aggregate_length: Option<usize>,

    /// Median and quartile profiles CSV
    #[arg(long, value_hint = ValueHint::FilePath)]
    profiles_csv: Option<PathBuf>,

    /// Median and per-nucleus segment boundaries CSV
    #[arg(long, value_hint = ValueHint::FilePath)]
    segments_csv: Option<PathBuf>,

    /// Fail when the reference point does not converge
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,

    /// Log stage timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,

    /// Verbose logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct SegmentArgs {
    /// Profile values: CSV with one value per row, or a JSON array
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Minimum segment length
    #[arg(long, default_value_t = 10)]
    min_length: usize,

    /// Forced boundaries as `LANDMARK:INDEX` (e.g. `OP:56`)
    #[arg(long)]
    force: Vec<String>,

    /// Verbose logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct RulesArgs {
    #[arg(value_enum)]
    shape: ShapeOpt,

    /// Output path (stdout when omitted)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ShapeOpt {
    Rodent,
    Pig,
    Round,
}

impl From<ShapeOpt> for RuleSetCollection {
    fn from(value: ShapeOpt) -> Self {
        match value {
            ShapeOpt::Rodent => RuleSetCollection::rodent_sperm(),
            ShapeOpt::Pig => RuleSetCollection::pig_sperm(),
            ShapeOpt::Round => RuleSetCollection::round(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct PopulationFile {
    name: String,
    nuclei: Vec<NucleusRecord>,
}

#[derive(Deserialize, Debug)]
struct NucleusRecord {
    name: String,
    border: Vec<Point>,
    #[serde(default)]
    centre: Option<Point>,
}

#[derive(Serialize, Debug)]
struct PopulationSummary {
    name: String,
    source: PathBuf,
    nuclei: usize,
    skipped_on_load: usize,
    aggregate_length: Option<usize>,
    median_landmarks: Vec<(Landmark, usize)>,
    report: AnalysisReport,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = match &cli.command {
        Command::Analyse(args) if args.verbose => "debug",
        Command::Segment(args) if args.verbose => "debug",
        _ => "info",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Analyse(args) => handle_analyse(args),
        Command::Segment(args) => handle_segment(args),
        Command::Rules(args) => handle_rules(args),
    }
}

fn handle_analyse(args: AnalyseArgs) -> Result<()> {
    let mut params = match args.config.as_ref() {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Params::from_json(&json).with_context(|| format!("invalid config {}", path.display()))?
        }
        None => Params::default(),
    };
    if let Some(min_length) = args.min_length {
        params.min_segment_length = min_length;
    }
    if args.aggregate_length.is_some() {
        params.aggregate_length = args.aggregate_length;
    }
    params.validate()?;

    let rules = match args.rules.as_ref() {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            RuleSetCollection::from_json(&json)
                .with_context(|| format!("invalid rules {}", path.display()))?
        }
        None => args.shape.into(),
    };
    info!("Using rule collection '{}'", rules.name);

    let t_parse = Instant::now();
    let loaded = args
        .inputs
        .par_iter()
        .map(|path| -> Result<(PathBuf, Population, usize)> {
            let (population, skipped) = load_population(path, &rules, &params)?;
            Ok((path.clone(), population, skipped))
        })
        .collect::<Result<Vec<_>>>()?;
    if args.profile || args.verbose {
        info!(
            "Parse stage: {:.1} ms ({} files)",
            t_parse.elapsed().as_secs_f64() * 1000.0,
            loaded.len()
        );
    }

    let mut summaries = Vec::with_capacity(loaded.len());
    let mut populations = Vec::with_capacity(loaded.len());
    for (source, mut population, skipped_on_load) in loaded {
        let t_compute = Instant::now();
        let progress = ProgressCounter::new();
        let report = analyse_population(&mut population, &params, &progress)
            .with_context(|| format!("failed to analyse {}", source.display()))?;
        if args.profile || args.verbose {
            info!(
                "Analysis stage for {}: {:.1} ms ({} nucleus tasks)",
                population.name,
                t_compute.elapsed().as_secs_f64() * 1000.0,
                progress.count()
            );
        }
        if args.strict {
            report
                .profiling
                .ensure_converged()
                .with_context(|| format!("{} did not converge", population.name))?;
        }
        for failure in &report.segmentation.tasks.failures {
            warn!("{}: {} not segmented: {}", population.name, failure.name, failure.error);
        }
        let angle = population.collection(ProfileType::Angle)?;
        summaries.push(PopulationSummary {
            name: population.name.clone(),
            source,
            nuclei: population.len(),
            skipped_on_load,
            aggregate_length: angle.length(),
            median_landmarks: angle.landmarks().iter().map(|(l, i)| (*l, *i)).collect(),
            report,
        });
        populations.push(population);
    }

    let json = serde_json::to_string_pretty(&summaries)?;
    if args.output.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(json.as_bytes())?;
        handle.write_all(b"\n")?;
    } else {
        fs::write(&args.output, json)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
        info!("Wrote report: {}", args.output.display());
    }

    if let Some(path) = args.profiles_csv.as_ref() {
        let t_csv = Instant::now();
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        write_profile_rows(&populations, &mut writer)?;
        if args.profile || args.verbose {
            info!("Profiles CSV stage: {:.1} ms", t_csv.elapsed().as_secs_f64() * 1000.0);
        }
        info!("Wrote profiles CSV: {}", path.display());
    }

    if let Some(path) = args.segments_csv.as_ref() {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        write_header(&mut writer)?;
        for population in &populations {
            if let Some(ring) = population.collection(ProfileType::Angle)?.segments() {
                write_segment_rows(&population.name, "median", ring, &mut writer)?;
            }
            for nucleus in population.nuclei() {
                if let Some(ring) = nucleus.segments() {
                    write_segment_rows(&population.name, nucleus.name(), ring, &mut writer)?;
                }
            }
        }
        writer.flush()?;
        info!("Wrote segments CSV: {}", path.display());
    }

    Ok(())
}

/// Read a population file. Nuclei whose outlines cannot be profiled are
/// skipped with a warning.
fn load_population(
    path: &Path,
    rules: &RuleSetCollection,
    params: &Params,
) -> Result<(Population, usize)> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let file: PopulationFile = serde_json::from_slice(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    let total = file.nuclei.len();
    let nuclei = file
        .nuclei
        .into_iter()
        .filter_map(|record| {
            let name = record.name.clone();
            match Nucleus::new(
                record.name,
                record.border,
                record.centre,
                params.angle_window_proportion,
            ) {
                Ok(nucleus) => Some(nucleus),
                Err(err) => {
                    warn!("Skipping {} in {}: {}", name, path.display(), err);
                    None
                }
            }
        })
        .collect::<Vec<_>>();
    if nuclei.is_empty() {
        return Err(anyhow!("{} has no usable nuclei", path.display()));
    }
    let skipped = total - nuclei.len();
    Ok((Population::new(file.name, nuclei, rules.clone()), skipped))
}

fn write_profile_rows<W: Write>(populations: &[Population], writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record(["population", "profile", "index", "q25", "median", "q75"])?;
    for population in populations {
        for collection in population.collections() {
            if collection.length().is_none() {
                continue;
            }
            let quantiles = [LOWER_QUARTILE, MEDIAN, UPPER_QUARTILE]
                .iter()
                .map(|q| collection.profile(Landmark::ReferencePoint, *q))
                .collect::<std::result::Result<Vec<Profile>, _>>()?;
            for i in 0..quantiles[1].len() {
                writer.write_record([
                    population.name.clone(),
                    collection.profile_type().to_string(),
                    i.to_string(),
                    format!("{:.3}", quantiles[0].get(i as isize)),
                    format!("{:.3}", quantiles[1].get(i as isize)),
                    format!("{:.3}", quantiles[2].get(i as isize)),
                ])?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

fn write_header<W: Write>(writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record([
        "population",
        "owner",
        "segment",
        "start",
        "end",
        "length",
        "locked",
        "merged_from",
    ])?;
    Ok(())
}

fn write_segment_rows<W: Write>(
    population: &str,
    owner: &str,
    ring: &SegmentRing,
    writer: &mut csv::Writer<W>,
) -> Result<()> {
    for seg in ring.segments() {
        let merged_from = seg
            .merge_source_ids()
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(";");
        writer.write_record([
            population.to_string(),
            owner.to_string(),
            seg.id().to_string(),
            seg.start().to_string(),
            seg.end().to_string(),
            seg.len().to_string(),
            seg.is_locked().to_string(),
            merged_from,
        ])?;
    }
    Ok(())
}

fn handle_segment(args: SegmentArgs) -> Result<()> {
    let values = read_profile_values(&args.input)?;
    let profile = Profile::new(values)
        .with_context(|| format!("invalid profile in {}", args.input.display()))?;
    let forced = args
        .force
        .iter()
        .map(|token| parse_forced(token))
        .collect::<Result<Vec<_>>>()?;

    let t_segment = Instant::now();
    let ring = ProfileSegmenter::new(&profile, args.min_length)
        .force_all(forced)
        .segment()
        .with_context(|| format!("failed to segment {}", args.input.display()))?;
    info!(
        "Segmented {} points into {} segments in {:.1} ms",
        profile.len(),
        ring.len(),
        t_segment.elapsed().as_secs_f64() * 1000.0
    );

    let source = args.input.display().to_string();
    if args.output.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut writer = csv::Writer::from_writer(stdout.lock());
        write_header(&mut writer)?;
        write_segment_rows(&source, "profile", &ring, &mut writer)?;
        writer.flush()?;
    } else {
        let file = File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        write_header(&mut writer)?;
        write_segment_rows(&source, "profile", &ring, &mut writer)?;
        writer.flush()?;
        info!("Wrote segments CSV: {}", args.output.display());
    }
    Ok(())
}

/// Values from a JSON array, or from the first column of a CSV. A non-numeric
/// first row is taken as a header.
fn read_profile_values(path: &Path) -> Result<Vec<f64>> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        return serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse {}", path.display()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(data.as_slice());
    let mut values = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("failed to parse {}", path.display()))?;
        let Some(field) = record.get(0) else { continue };
        match field.trim().parse::<f64>() {
            Ok(value) => values.push(value),
            Err(_) if row == 0 => continue,
            Err(err) => {
                return Err(anyhow!("{} row {}: {}", path.display(), row + 1, err));
            }
        }
    }
    Ok(values)
}

fn parse_forced(token: &str) -> Result<(Landmark, usize)> {
    let (name, index) = token
        .split_once(':')
        .ok_or_else(|| anyhow!("expected LANDMARK:INDEX, got '{}'", token))?;
    let landmark = Landmark::ALL
        .into_iter()
        .find(|l| l.abbreviation().eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| anyhow!("unknown landmark '{}'", name))?;
    let index = index
        .trim()
        .parse::<usize>()
        .with_context(|| format!("invalid index in '{}'", token))?;
    Ok((landmark, index))
}

fn handle_rules(args: RulesArgs) -> Result<()> {
    let rules: RuleSetCollection = args.shape.into();
    let json = rules.to_json()?;
    match args.output.as_ref() {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
            info!("Wrote rules: {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
