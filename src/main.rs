//! Pulsewatch: Cardiac risk inference and record pipeline
//!
//! Main entry point for the operator CLI.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pulsewatch::adapters::artifacts::ModelArtifacts;
use pulsewatch::adapters::sanitize::SanitizingMakeWriter;
use pulsewatch::application::{AnalyticsService, ChartPreset, InferenceService};
use pulsewatch::config::{AppConfig, LogMode};
use pulsewatch::domain::{Categorical, Feature, ObservationInput, RecordStatus, RECORD_COLUMNS};

#[derive(Debug, Parser)]
#[command(
    name = "pulsewatch",
    version,
    about = "Cardiac risk assessment with an append-only patient record log"
)]
struct Cli {
    #[command(flatten)]
    config: AppConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Assess one patient and append the result to the record log
    Predict(PredictArgs),
    /// List stored records in insertion order
    Records(RecordsArgs),
    /// Risk-level counts and headline numbers
    Stats(OutputArgs),
    /// Paired feature values for a scatter view
    Series(SeriesArgs),
    /// Load artifacts and open the record store without assessing anything
    Check,
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct PredictArgs {
    /// Read the observation from a JSON file instead of flags
    #[arg(long, conflicts_with_all = ["age", "sex", "cp", "trestbps", "chol", "fbs", "restecg", "thalach", "exang", "oldpeak", "slope", "ca", "thal"])]
    input: Option<PathBuf>,

    #[arg(long, required_unless_present = "input")]
    age: Option<u32>,
    /// Female | Male
    #[arg(long, required_unless_present = "input")]
    sex: Option<String>,
    /// Chest pain type, e.g. "Asymptomatic" or "Asymptomatic (4)"
    #[arg(long, required_unless_present = "input")]
    cp: Option<String>,
    /// Resting blood pressure (mm Hg)
    #[arg(long, required_unless_present = "input")]
    trestbps: Option<u32>,
    /// Serum cholesterol (mg/dl)
    #[arg(long, required_unless_present = "input")]
    chol: Option<u32>,
    /// Fasting blood sugar > 120 mg/dl: true | false
    #[arg(long, required_unless_present = "input")]
    fbs: Option<String>,
    /// Resting ECG result
    #[arg(long, required_unless_present = "input")]
    restecg: Option<String>,
    /// Maximum heart rate achieved
    #[arg(long, required_unless_present = "input")]
    thalach: Option<u32>,
    /// Exercise induced angina: yes | no
    #[arg(long, required_unless_present = "input")]
    exang: Option<String>,
    /// ST depression induced by exercise
    #[arg(long, required_unless_present = "input", allow_negative_numbers = true)]
    oldpeak: Option<f64>,
    /// Slope of the peak exercise ST segment
    #[arg(long, required_unless_present = "input")]
    slope: Option<String>,
    /// Number of major vessels colored by fluoroscopy (0-3)
    #[arg(long, required_unless_present = "input")]
    ca: Option<u8>,
    /// Thalassemia
    #[arg(long, required_unless_present = "input")]
    thal: Option<String>,

    #[command(flatten)]
    output: OutputArgs,
}

impl PredictArgs {
    fn observation_input(&self) -> Result<ObservationInput> {
        if let Some(path) = &self.input {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            return serde_json::from_str(&text)
                .with_context(|| format!("invalid observation JSON in {}", path.display()));
        }

        fn field<T: Clone>(value: &Option<T>, flag: &str) -> Result<T> {
            value.clone().ok_or_else(|| anyhow!("missing --{flag}"))
        }

        Ok(ObservationInput {
            age: field(&self.age, "age")?,
            sex: field(&self.sex, "sex")?,
            chest_pain: field(&self.cp, "cp")?,
            resting_bp: field(&self.trestbps, "trestbps")?,
            cholesterol: field(&self.chol, "chol")?,
            fasting_blood_sugar: field(&self.fbs, "fbs")?,
            resting_ecg: field(&self.restecg, "restecg")?,
            max_heart_rate: field(&self.thalach, "thalach")?,
            exercise_angina: field(&self.exang, "exang")?,
            st_depression: field(&self.oldpeak, "oldpeak")?,
            st_slope: field(&self.slope, "slope")?,
            major_vessels: field(&self.ca, "ca")?,
            thalassemia: field(&self.thal, "thal")?,
        })
    }
}

#[derive(Debug, Args)]
struct RecordsArgs {
    /// Skip this many records
    #[arg(long, default_value_t = 0)]
    offset: usize,
    /// Maximum records to show
    #[arg(long, default_value_t = 20)]
    limit: usize,
    /// Show the last `limit` records instead of paging from the start
    #[arg(long, conflicts_with = "offset")]
    recent: bool,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PresetArg {
    /// Max Heart Rate vs Age
    HeartRateVsAge,
    /// Cholesterol vs Resting BP
    CholesterolVsBp,
}

impl From<PresetArg> for ChartPreset {
    fn from(p: PresetArg) -> Self {
        match p {
            PresetArg::HeartRateVsAge => Self::HeartRateVsAge,
            PresetArg::CholesterolVsBp => Self::CholesterolVsBp,
        }
    }
}

#[derive(Debug, Args)]
struct SeriesArgs {
    /// One of the dashboard charts
    #[arg(long, conflicts_with_all = ["x", "y"], required_unless_present_all = ["x", "y"])]
    preset: Option<PresetArg>,
    /// X column, e.g. age
    #[arg(long, requires = "y")]
    x: Option<Feature>,
    /// Y column, e.g. thalach
    #[arg(long, requires = "x")]
    y: Option<Feature>,

    #[command(flatten)]
    output: OutputArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config;

    // Initialize logging. Every line passes through the sanitizer so clinical
    // values never reach the sink verbatim.
    let (writer, _guard) = match config.log_mode {
        LogMode::File => {
            let log_file = config.log_file();
            if let Some(parent) = log_file.parent() {
                // Best-effort: the open below reports the real failure.
                let _ = std::fs::create_dir_all(parent);
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
                .with_context(|| format!("failed to open log file {}", log_file.display()))?;
            tracing_appender::non_blocking(file)
        }
        LogMode::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogMode::Stderr => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    match cli.command {
        Command::Predict(args) => run_predict(&config, &args),
        Command::Records(args) => run_records(&config, &args),
        Command::Stats(args) => run_stats(&config, &args),
        Command::Series(args) => run_series(&config, &args),
        Command::Check => run_check(&config),
    }
}

fn load_artifacts(config: &AppConfig) -> Result<ModelArtifacts> {
    ModelArtifacts::load(&config.model_dir, config.require_manifest).map_err(|e| {
        tracing::error!("Cannot serve predictions: {}", e);
        e.into()
    })
}

fn run_predict(config: &AppConfig, args: &PredictArgs) -> Result<()> {
    let artifacts = load_artifacts(config)?;
    let store = config.open_store()?;
    let service = InferenceService::new(
        Arc::new(artifacts.classifier),
        Arc::new(artifacts.scaler),
        store,
    )?;

    let input = args.observation_input()?;
    let assessment = service.assess_input(&input)?;

    if args.output.json {
        println!("{}", serde_json::to_string_pretty(&assessment)?);
    } else {
        let o = &assessment.observation;
        println!("Risk level: {}", assessment.result.risk_level());
        println!("  {}", assessment.result.risk_level().description());
        println!("Prediction: {}", assessment.result.label());
        println!();
        println!("Age: {}  Sex: {}", o.age, o.sex.label());
        println!("Chest pain: {}", o.chest_pain.display_label());
        println!("Resting BP: {}  Cholesterol: {}", o.resting_bp, o.cholesterol);
        println!("Max heart rate: {}  ST depression: {}", o.max_heart_rate, o.st_depression);
        println!("Slope: {}  Thal: {}", o.st_slope.display_label(), o.thalassemia.display_label());
        match &assessment.record {
            RecordStatus::Saved => println!("Record saved."),
            RecordStatus::NotSaved { reason } => eprintln!("Record NOT saved: {reason}"),
        }
    }
    Ok(())
}

fn run_records(config: &AppConfig, args: &RecordsArgs) -> Result<()> {
    let analytics = AnalyticsService::new(config.open_store()?);
    let (records, total, next_offset) = if args.recent {
        let total = analytics.summary()?.total;
        (analytics.recent(args.limit)?, total, None)
    } else {
        let page = analytics.page(args.offset, args.limit)?;
        let next = page.next_offset();
        (page.items, page.total_count, next)
    };

    if args.output.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!("{}", RECORD_COLUMNS.join(","));
    for record in &records {
        println!("{}", record.to_row().join(","));
    }
    println!("({} of {} records)", records.len(), total);
    if let Some(next) = next_offset {
        println!("More records: --offset {next}");
    }
    Ok(())
}

fn run_stats(config: &AppConfig, args: &OutputArgs) -> Result<()> {
    let analytics = AnalyticsService::new(config.open_store()?);
    let counts = analytics.risk_level_counts()?;
    let summary = analytics.summary()?;

    if args.json {
        let body = serde_json::json!({
            "risk_level_counts": counts.as_map(),
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("Total records: {}", summary.total);
    for (level, count) in counts.as_map() {
        println!("  {level}: {count}");
    }
    println!("High-risk share: {:.1}%", summary.high_risk_share * 100.0);
    Ok(())
}

fn run_series(config: &AppConfig, args: &SeriesArgs) -> Result<()> {
    let analytics = AnalyticsService::new(config.open_store()?);
    let (title, x, y) = match (args.preset, args.x, args.y) {
        (Some(preset), _, _) => {
            let preset = ChartPreset::from(preset);
            let (x, y) = preset.axes();
            (preset.title().to_string(), x, y)
        }
        (None, Some(x), Some(y)) => (format!("{y} vs {x}"), x, y),
        _ => return Err(anyhow!("either --preset or both --x and --y are required")),
    };
    let points = analytics.paired_series(x, y)?;

    if args.output.json {
        println!("{}", serde_json::to_string_pretty(&points)?);
        return Ok(());
    }

    println!("{title}");
    println!("{},{},prediction", x.column(), y.column());
    for p in &points {
        println!("{},{},{}", p.x, p.y, p.label);
    }
    Ok(())
}

fn run_check(config: &AppConfig) -> Result<()> {
    let artifacts = load_artifacts(config)?;
    let store = config.open_store()?;
    let count = store
        .count()
        .with_context(|| format!("record log at {} is unreadable", store.location()))?;

    println!("Model directory: {}", config.model_dir.display());
    println!("  classifier sha256: {}", artifacts.classifier_digest);
    println!("  scaler sha256:     {}", artifacts.scaler_digest);
    println!("Record log: {} ({} records)", store.location(), count);
    Ok(())
}
