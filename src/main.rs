use bazi_core::{BaziEngine, BaziError, BirthInfo, EngineConfig, KnowledgeBase, Result, Sex};
use chrono::{NaiveDate, NaiveTime};
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bazi_core")]
#[command(about = "Four-pillar chart calculation", long_about = None)]
#[command(version)]
struct Cli {
    /// Birth date, YYYY-MM-DD
    #[arg(long, required_unless_present = "dump_knowledge")]
    date: Option<NaiveDate>,

    /// Local clock time, HH:MM or HH:MM:SS
    #[arg(long, value_parser = parse_time, required_unless_present = "dump_knowledge")]
    time: Option<NaiveTime>,

    /// Birth longitude in degrees, east positive
    #[arg(long, allow_hyphen_values = true, required_unless_present = "dump_knowledge")]
    longitude: Option<f64>,

    #[arg(long, value_enum, default_value = "male")]
    sex: SexArg,

    /// Alternate knowledge base (JSON)
    #[arg(long)]
    knowledge: Option<PathBuf>,

    /// Engine configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Include palaces, branch relations and the fortune score
    #[arg(long)]
    extended: bool,

    /// Year for the flying-star projection
    #[arg(long, requires = "extended")]
    target_year: Option<i32>,

    /// Print the knowledge base in use and exit
    #[arg(long)]
    dump_knowledge: bool,

    /// -v info, -vv debug, -vvv trace
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum SexArg {
    Male,
    Female,
}

impl From<SexArg> for Sex {
    fn from(sex: SexArg) -> Self {
        match sex {
            SexArg::Male => Sex::Male,
            SexArg::Female => Sex::Female,
        }
    }
}

fn parse_time(value: &str) -> std::result::Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|e| format!("invalid time {value:?}: {e}"))
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let knowledge = match &cli.knowledge {
        Some(path) => Arc::new(KnowledgeBase::from_path(path)?),
        None => KnowledgeBase::standard(),
    };

    if cli.dump_knowledge {
        println!("{}", knowledge.to_json_pretty()?);
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => EngineConfig::from_path(path)?,
        None => EngineConfig::default(),
    };

    let (Some(date), Some(time), Some(longitude)) = (cli.date, cli.time, cli.longitude) else {
        return Err(BaziError::InvalidInput(
            "--date, --time and --longitude are required".into(),
        ));
    };
    let birth_info = BirthInfo::new(date.and_time(time), longitude, cli.sex.into())?;

    let engine = BaziEngine::new(knowledge, config);
    let chart = engine.generate(&birth_info);
    info!(pillars = %format!("{} {} {} {}", chart.pillars.year, chart.pillars.month, chart.pillars.day, chart.pillars.hour), "chart ready");

    let output = if cli.extended {
        let extended = engine.extended_analysis(&chart, cli.target_year);
        serde_json::json!({ "chart": chart, "extended": extended })
    } else {
        serde_json::json!({ "chart": chart })
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
