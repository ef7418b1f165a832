use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use kmeans_bench::ingest::{read_log_file, read_results_file};
use kmeans_bench::{
    aggregate, generate, verify_by_dataset, Backend, BaselinePolicy, BenchConfig, BenchError,
    ChartSink, CsvChartSink, DatasetFiles, DatasetSize, Report, Result as BenchResult, RunLog,
    RunLogParser,
};

#[derive(Parser, Debug)]
#[command(name = "kmeans-bench")]
#[command(about = "Generate k-means benchmark inputs and analyse backend run logs")]
#[command(long_about = None)]
struct Cli {
    /// JSON configuration file (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity: info, debug, warn or error
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write synthetic point and centroid files
    Generate(GenerateArgs),
    /// Run the test harness, then analyse its output
    Run(AnalysisArgs),
    /// Analyse a stored harness log
    ParseLog {
        /// Captured harness output
        path: PathBuf,
        #[command(flatten)]
        analysis: AnalysisArgs,
    },
    /// Analyse a structured result file (version,N,K,iterations,sse,time_ms)
    ParseCsv {
        path: PathBuf,
        #[command(flatten)]
        analysis: AnalysisArgs,
    },
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Number of points; generates every preset when omitted
    #[arg(short = 'n', long, requires = "clusters")]
    points: Option<usize>,

    /// Number of clusters
    #[arg(short, long, requires = "points")]
    clusters: Option<usize>,

    /// File label for a custom dataset (dados_<label>.csv)
    #[arg(long, default_value = "custom")]
    label: String,

    /// RNG seed (overrides the config file)
    #[arg(long)]
    seed: Option<u64>,

    /// Destination directory
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,
}

#[derive(Args, Debug)]
struct AnalysisArgs {
    /// Analysis family, used in the chart data file name
    #[arg(long, default_value = "analysis")]
    family: String,

    /// Baseline: a backend label such as `serial` or `thread-parallel-1`, or `min-parallelism`
    #[arg(long, value_parser = parse_baseline)]
    baseline: Option<BaselinePolicy>,

    /// JSON map of dataset size to externally measured baseline time in ms
    #[arg(long, conflicts_with = "baseline")]
    reference_times: Option<PathBuf>,

    /// Maximum SSE standard deviation considered consistent
    #[arg(long)]
    tolerance: Option<f64>,

    /// Backend assumed when a log has no configuration markers
    /// (`--family serial` implies `serial`)
    #[arg(long, value_parser = parse_backend)]
    implicit_backend: Option<Backend>,

    /// Check every preset's dataset files in this directory before analysing
    #[arg(long)]
    datasets_dir: Option<PathBuf>,

    /// Directory for the chart data file
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Skip writing chart data
    #[arg(long, default_value_t = false)]
    no_chart: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = init_logging(&cli.log_level) {
        eprintln!("failed to initialise logging: {err}");
    }

    if let Err(err) = run(cli) {
        error!(error = %err, "kmeans-bench failed");
        process::exit(1);
    }
}

fn init_logging(level: &str) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(match level {
            "debug" => tracing::Level::DEBUG,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(|err| err.to_string())
}

fn run(cli: Cli) -> BenchResult<()> {
    let config = match cli.config.as_ref() {
        Some(path) => BenchConfig::load(path)?,
        None => BenchConfig::default(),
    };

    match cli.command {
        Command::Generate(args) => run_generate(config, args),
        Command::Run(args) => {
            let config = apply_analysis_overrides(config, &args)?;
            check_datasets(&config, &args)?;
            let output = config.harness.run()?;
            let parser = RunLogParser::new(&config.vocabulary)?;
            analyse(&config, &args, parser.parse(&output))
        }
        Command::ParseLog { path, analysis } => {
            let config = apply_analysis_overrides(config, &analysis)?;
            check_datasets(&config, &analysis)?;
            let parser = RunLogParser::new(&config.vocabulary)?;
            let log = read_log_file(&path, &parser)?;
            analyse(&config, &analysis, log)
        }
        Command::ParseCsv { path, analysis } => {
            let config = apply_analysis_overrides(config, &analysis)?;
            check_datasets(&config, &analysis)?;
            let rules = config.vocabulary.compile()?;
            let log = read_results_file(&path, &rules, &config.catalog)?;
            analyse(&config, &analysis, log)
        }
    }
}

fn run_generate(mut config: BenchConfig, args: GenerateArgs) -> BenchResult<()> {
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    std::fs::create_dir_all(&args.out_dir)?;

    let jobs: Vec<(String, usize, usize)> = match (args.points, args.clusters) {
        (Some(points), Some(clusters)) => vec![(args.label.clone(), points, clusters)],
        _ => config
            .catalog
            .iter()
            .map(|(_, preset)| (preset.file_label.clone(), preset.n_points, preset.n_clusters))
            .collect(),
    };

    for (label, points, clusters) in jobs {
        info!(label = %label, points, clusters, seed = config.seed, "generating dataset");
        let dataset = generate(points, clusters, config.seed, &config.synthesis)?;
        dataset.write(&DatasetFiles::for_label(&args.out_dir, &label))?;
    }
    Ok(())
}

fn apply_analysis_overrides(
    mut config: BenchConfig,
    args: &AnalysisArgs,
) -> BenchResult<BenchConfig> {
    if let Some(policy) = args.baseline.clone() {
        config.baseline = policy;
    }
    if let Some(path) = args.reference_times.as_ref() {
        config.baseline = BaselinePolicy::Reference(load_reference_times(path)?);
    }
    if let Some(tolerance) = args.tolerance {
        config.tolerance = tolerance;
    }
    if let Some(backend) = args.implicit_backend {
        config.vocabulary.implicit_backend = Some(backend);
    }
    if config.vocabulary.apply_family_default(&args.family) {
        info!(family = %args.family, "assuming the serial backend for unlabelled sections");
    }
    config.validate()?;
    Ok(config)
}

fn load_reference_times(path: &Path) -> BenchResult<BTreeMap<DatasetSize, f64>> {
    if !path.is_file() {
        return Err(BenchError::InputMissing(path.to_path_buf()));
    }
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

fn check_datasets(config: &BenchConfig, args: &AnalysisArgs) -> BenchResult<()> {
    let Some(dir) = args.datasets_dir.as_ref() else {
        return Ok(());
    };
    for (size, preset) in config.catalog.iter() {
        let files = DatasetFiles::for_label(dir, &preset.file_label);
        let (points, _) = files.load(preset.n_clusters)?;
        if points.len() != preset.n_points {
            warn!(
                dataset = %size,
                found = points.len(),
                expected = preset.n_points,
                "dataset size differs from preset"
            );
        }
    }
    info!(dir = ?dir, "dataset files present");
    Ok(())
}

fn analyse(config: &BenchConfig, args: &AnalysisArgs, log: RunLog) -> BenchResult<()> {
    if log.is_empty() {
        warn!("no benchmark results recognised in the input");
    }
    let aggregation = aggregate(&log, &config.baseline, &config.catalog);
    let verifications = verify_by_dataset(&log, config.tolerance);

    let title = format!("K-means 1D benchmark analysis ({})", args.family);
    let report = Report::new(title, &log, &aggregation, &verifications, &config.catalog);
    println!("{}", report.render_text());

    if !args.no_chart {
        std::fs::create_dir_all(&args.out_dir)?;
        CsvChartSink::new(&args.out_dir).emit(&args.family, &report.chart_points())?;
    }
    Ok(())
}

fn parse_baseline(raw: &str) -> Result<BaselinePolicy, String> {
    raw.parse().map_err(|err: BenchError| err.to_string())
}

fn parse_backend(raw: &str) -> Result<Backend, String> {
    raw.parse().map_err(|err: BenchError| err.to_string())
}
