#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use blackseed::assemble::Observation;
use blackseed::classify::ThresholdTable;
use blackseed::config::{
    CONFIG_FILE_NAME, Deployment, DeploymentConfig, PredictorSettings, ROOT_ENV_VAR,
};
use blackseed::data::{PredictionRow, load_observations, save_predictions};
use blackseed::model::{
    HEAT_HOURS, JULY_PEAK_SPORES, LinearCoefficients, LinkFunction, MANAGEMENT_LEVEL,
    MAY_PEAK_SPORES, ModelArtifact, StandardizerStats,
};
use blackseed::predictor::{Prediction, PredictionBasis, RiskPredictor};
use blackseed::scorer::ScorerKind;

#[derive(Parser)]
#[command(
    name = "blackseed",
    about = "Black-seed disease risk early warning",
    long_about = "Estimates black-seed disease incidence from heat-stress hours, peak spore counts \
                  and stand management using a pre-fitted regression model, and grades the result \
                  into a risk category."
)]
struct Cli {
    /// Deployment directory containing blackseed.toml (defaults to the executable's directory)
    #[arg(long, global = true, env = ROOT_ENV_VAR, value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
pub struct PredictArgs {
    /// Hours above 28 °C between 15 May and 15 August
    #[arg(long)]
    pub heat_hours: f64,

    /// Peak weekly spore count in May
    #[arg(long)]
    pub may_spores: f64,

    /// Peak weekly spore count in July
    #[arg(long)]
    pub july_spores: f64,

    /// Stand management level (e.g. excellent, average, poor)
    #[arg(long)]
    pub management: String,

    /// Additional named spore counts required by some models, as NAME=COUNT
    #[arg(long = "spore", value_name = "NAME=COUNT", value_parser = parse_named_count)]
    pub extra_spores: Vec<(String, f64)>,

    /// Print the result as JSON instead of a summary card
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Tab-separated input with heat_hours, may_peak_spores, july_peak_spores, management columns
    pub input: PathBuf,

    /// Where to write the predictions
    #[arg(long, default_value = "predictions.tsv")]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct TemplateArgs {
    /// Directory to create the starter deployment in
    #[arg(long, value_name = "DIR")]
    pub output: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict the risk for a single stand
    #[command(about = "Predict disease risk for one set of measurements")]
    Predict(PredictArgs),

    /// Score every row of a tab-separated file
    #[command(about = "Predict disease risk for a TSV file (outputs: predictions.tsv)")]
    Batch(BatchArgs),

    /// Show the loaded model and configuration
    #[command(about = "Describe the deployed model and risk settings")]
    Inspect,

    /// Write a starter deployment showing the file formats
    #[command(about = "Write a starter deployment (outputs: blackseed.toml, models/)")]
    Template(TemplateArgs),

    /// Display version and build information
    #[command(about = "Display version and build information")]
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { root, command } = cli;

    let result = match command {
        Some(Commands::Predict(args)) => predict(root.as_deref(), args),
        Some(Commands::Batch(args)) => batch(root.as_deref(), args),
        Some(Commands::Inspect) => inspect(root.as_deref()),
        Some(Commands::Template(args)) => template(args),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn parse_named_count(raw: &str) -> Result<(String, f64), String> {
    let (name, count) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=COUNT, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing spore series name in '{raw}'"));
    }
    let count = count
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid count in '{raw}': {e}"))?;
    Ok((name.to_string(), count))
}

/// Startup: resolve the deployment and build the predictor, or fail.
fn load_predictor(root: Option<&Path>) -> Result<RiskPredictor, Box<dyn std::error::Error>> {
    let root = Deployment::locate_root(root)?;
    let deployment = Deployment::load(&root)?;
    Ok(RiskPredictor::from_deployment(&deployment)?)
}

fn predict(root: Option<&Path>, args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    let predictor = load_predictor(root)?;

    let observation = args.extra_spores.into_iter().fold(
        Observation::new(
            args.heat_hours,
            args.may_spores,
            args.july_spores,
            args.management,
        ),
        |obs, (name, count)| obs.with_spores(name, count),
    );

    let prediction = predictor.predict(&observation)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&prediction)?);
    } else {
        print_card(&observation, &prediction);
    }
    Ok(())
}

fn print_card(observation: &Observation, prediction: &Prediction) {
    println!("Risk: {}", prediction.category.description());
    println!(
        "Predicted incidence: {:.1}% of {:.0}",
        prediction.value, prediction.output_scale
    );
    println!("Category: {} ({})", prediction.category, prediction.color);
    match prediction.basis {
        PredictionBasis::AllZeroInput => println!("Basis: all inputs zero, model not consulted"),
        PredictionBasis::Ceiling { trigger } => {
            println!("Basis: {trigger:?} ceiling reached, worst case assumed")
        }
        PredictionBasis::Model {
            raw_score,
            management_factor,
        } => println!("Basis: model score {raw_score:.4}, management factor {management_factor}"),
    }
    println!();
    println!("Inputs");
    println!("  heat hours:  {:.1}", observation.heat_hours);
    for (name, count) in &observation.spores {
        println!("  {name}:  {count:.0}");
    }
    println!("  management:  {}", observation.management);
}

fn batch(root: Option<&Path>, args: BatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let predictor = load_predictor(root)?;

    println!("Loading observations from: {}", args.input.display());
    let rows = load_observations(&args.input)?;
    println!("Loaded {} rows", rows.len());

    let results: Vec<PredictionRow> = rows
        .into_iter()
        .map(|row| match row.observation {
            Ok(observation) => PredictionRow::from_outcome(row.sample_id, predictor.predict(&observation)),
            Err(e) => PredictionRow {
                sample_id: row.sample_id,
                outcome: Err(e.to_string()),
            },
        })
        .collect();

    let rejected = results.iter().filter(|r| r.outcome.is_err()).count();
    if rejected > 0 {
        log::warn!("{rejected} of {} rows were rejected; see the error column.", results.len());
    }

    save_predictions(&args.output, &results)?;
    println!("Predictions saved to: {}", args.output.display());
    Ok(())
}

fn inspect(root: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let predictor = load_predictor(root)?;
    let artifact = predictor.artifact();
    let scorer = predictor.scorer();

    println!("Model: {}", scorer.variant_name());
    println!("Link function: {:?}", scorer.link());
    println!("Output scale: {}", scorer.output_scale());
    println!(
        "Spore factor: {} ({})",
        artifact.spore_factor,
        if artifact.apply_spore_factor {
            "applied to raw counts"
        } else {
            "inputs already scaled"
        }
    );
    println!("Feature order: {}", artifact.feature_order.join(", "));
    println!(
        "Spore inputs: {}",
        predictor.assembler().spore_features().collect::<Vec<_>>().join(", ")
    );
    println!(
        "Management levels: {}",
        predictor.assembler().management_labels().collect::<Vec<_>>().join(", ")
    );
    println!("Basis dimension: {}", scorer.basis_dim());
    if let ScorerKind::PolynomialRidge(expander) = scorer.kind() {
        println!(
            "Polynomial terms: {}",
            expander.term_names(&artifact.feature_order).join(", ")
        );
    }

    let table = predictor.classifier().table();
    let b = table.breakpoints();
    println!(
        "Threshold table: {} (critical > {}, high > {}, medium > {} of scale)",
        table.name(),
        b.critical,
        b.high,
        b.medium
    );
    let policy = predictor.policy();
    println!(
        "Temperature ceiling: {}",
        policy
            .temperature_ceiling
            .map_or("disabled".to_string(), |c| c.to_string())
    );
    println!(
        "Spore ceiling: {}",
        policy
            .spore_ceiling
            .map_or("disabled".to_string(), |c| c.to_string())
    );
    Ok(())
}

/// Writes a neutral bias-only model plus its configuration. The coefficients are
/// placeholders; real deployments replace the model file with a fitted one.
fn template(args: TemplateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let model_dir = args.output.join("models");
    fs::create_dir_all(&model_dir)?;

    let feature_order: Vec<String> =
        [HEAT_HOURS, MAY_PEAK_SPORES, JULY_PEAK_SPORES, MANAGEMENT_LEVEL]
            .iter()
            .map(|s| s.to_string())
            .collect();
    let artifact = ModelArtifact {
        link_function: LinkFunction::Identity,
        output_scale: 50.0,
        spore_factor: 1e-4,
        apply_spore_factor: true,
        standardizer: StandardizerStats {
            mean: vec![0.0; feature_order.len()],
            scale: vec![1.0; feature_order.len()],
        },
        linear: Some(LinearCoefficients {
            coef: vec![0.0; feature_order.len() + 1],
        }),
        feature_order,
        management_levels: BTreeMap::from([
            ("excellent".to_string(), 0.0),
            ("average".to_string(), 1.0),
            ("poor".to_string(), 2.0),
        ]),
        poly: None,
        ridge: None,
    };
    artifact.validate()?;
    let model_path = PathBuf::from("models").join("disease_model.toml");
    artifact.save(&args.output.join(&model_path))?;

    let config = DeploymentConfig {
        model_path,
        settings: PredictorSettings::new(ThresholdTable::TableA)
            .with_ceilings(Some(1900.0), None),
    };
    let config_path = Deployment::write_config(&args.output, &config)?;
    println!("Starter deployment written to: {}", args.output.display());
    println!("  {}", config_path.display());
    println!("  {}", args.output.join(&config.model_path).display());
    println!("Replace the model file with a fitted artifact before use; edit {CONFIG_FILE_NAME} to choose the threshold table.");
    Ok(())
}

/// Format seconds into a human-readable duration like "2.4 hours ago"
fn format_duration_ago(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if seconds < MINUTE {
        format!("{seconds} seconds ago")
    } else if seconds < HOUR {
        format!("{:.1} minutes ago", seconds as f64 / MINUTE as f64)
    } else if seconds < DAY {
        format!("{:.1} hours ago", seconds as f64 / HOUR as f64)
    } else {
        format!("{:.1} days ago", seconds as f64 / DAY as f64)
    }
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let build_timestamp: u64 = env!("BLACKSEED_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("blackseed {version}");

    if build_timestamp > 0 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if now > build_timestamp {
            println!("Built: {}", format_duration_ago(now - build_timestamp));
        } else {
            println!("Built: just now");
        }
    }
}
