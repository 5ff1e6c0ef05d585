//! Command-line driver for the extraction pipelines.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing_subscriber::EnvFilter;

use medicare_core::Extract;
use medicare_ingest::ParquetStore;
use medicare_model::{
    CodeSpec, CohortOptions, DataFamily, ExtractConfig, JoinMode, SamplePercent, SearchOptions,
    YearMode,
};

#[derive(Debug, Parser)]
#[command(name = "medicare", about = "Cohort construction and claim code search")]
struct Cli {
    /// Root directory of the parquet extracts.
    #[arg(long, global = true, default_value = ".")]
    data_root: PathBuf,

    /// Sample percent tag (0001, 01, 05, 20, 100).
    #[arg(long, global = true, default_value = "01")]
    percent: String,

    /// Years, comma-separated or as a range (2008,2009 or 2008-2010).
    #[arg(long, global = true, default_value = "2008")]
    years: String,

    /// Time frame: calendar or age.
    #[arg(long, global = true, default_value = "calendar")]
    year_mode: String,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build a demographic/enrollment cohort.
    Cohort(CohortArgs),
    /// Search claim files for diagnosis/procedure/HCPCS codes.
    Search(SearchArgs),
}

#[derive(Debug, clap::Args)]
struct CohortArgs {
    /// Gender code or label (e.g. F, female, 2).
    #[arg(long)]
    gender: Option<String>,

    /// Ages to keep, comma-separated or as a range (70-85).
    #[arg(long)]
    ages: Option<String>,

    /// Races to keep: codes or label fragments, comma-separated.
    #[arg(long)]
    races: Option<String>,

    /// Use the RTI race code instead of the standard one.
    #[arg(long)]
    rti_race: bool,

    /// Allowed monthly buy-in values, comma-separated.
    #[arg(long)]
    buyin: Option<String>,

    /// Allowed monthly HMO indicator values, comma-separated.
    #[arg(long)]
    hmo: Option<String>,

    /// Join mode: default, inner, outer, left, right.
    #[arg(long, default_value = "default")]
    join: String,

    /// Extra columns to keep (regex allowed), comma-separated.
    #[arg(long)]
    keep: Option<String>,
}

#[derive(Debug, clap::Args)]
struct SearchArgs {
    /// Claim families to scan, comma-separated (e.g. med,opc).
    #[arg(long, required = true)]
    families: String,

    /// HCPCS code patterns, comma-separated.
    #[arg(long)]
    hcpcs: Option<String>,

    /// ICD-9 diagnosis code patterns, comma-separated.
    #[arg(long)]
    dx: Option<String>,

    /// Only scan the first N numbered diagnosis columns.
    #[arg(long)]
    dx_max_cols: Option<usize>,

    /// ICD-9 procedure code patterns, comma-separated.
    #[arg(long)]
    sg: Option<String>,

    /// Emit one boolean column per code instead of a single `match`.
    #[arg(long)]
    per_code: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    if let Err(error) = run(&cli) {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.verbosity.tracing_level_filter().to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let percent: SamplePercent = cli.percent.parse()?;
    let years = parse_years(&cli.years)?;
    let year_mode: YearMode = cli
        .year_mode
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let config = ExtractConfig::new(percent, years, year_mode)?;
    let store = ParquetStore::new(&cli.data_root);
    let mut extract = Extract::new(config, store);

    match &cli.command {
        Command::Cohort(args) => {
            let options = cohort_options(args)?;
            let cohort = extract.build_cohort(&options)?;
            println!(
                "cohort: {} patient-year rows, {} columns",
                cohort.frame.height(),
                cohort.frame.width()
            );
            for year in cohort.drops.years() {
                for (stage, fraction) in cohort.drops.stages(year) {
                    println!("  {year} {stage}: dropped {:.2}%", fraction * 100.0);
                }
            }
        }
        Command::Search(args) => {
            let options = search_options(args)?;
            let claims = extract.search_codes(&options)?;
            for (family, table) in claims.tables() {
                println!(
                    "{family}: {} claim rows, {} columns",
                    table.height(),
                    table.width()
                );
            }
        }
    }
    Ok(())
}

fn cohort_options(args: &CohortArgs) -> anyhow::Result<CohortOptions> {
    let mut options = CohortOptions::new().with_join(args.join.parse::<JoinMode>()?);
    if let Some(gender) = &args.gender {
        options = options.with_gender(gender.clone());
    }
    if let Some(ages) = &args.ages {
        options = options.with_ages(parse_int_list(ages)?);
    }
    if let Some(races) = &args.races {
        options = options.with_races(split_list(races));
    }
    options = options.with_rti_race(args.rti_race);
    if let Some(buyin) = &args.buyin {
        options = options.with_buyin_values(split_list(buyin));
    }
    if let Some(hmo) = &args.hmo {
        options = options.with_hmo_values(split_list(hmo));
    }
    if let Some(keep) = &args.keep {
        let keeps = split_list(keep)
            .into_iter()
            .map(|spec| CodeSpec::pattern(&spec))
            .collect::<Result<Vec<_>, _>>()?;
        options = options.with_keep_columns(keeps);
    }
    Ok(options)
}

fn search_options(args: &SearchArgs) -> anyhow::Result<SearchOptions> {
    let families = split_list(&args.families)
        .into_iter()
        .map(|tag| {
            tag.parse::<DataFamily>()
                .map_err(|e| anyhow::anyhow!(e))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let mut options =
        SearchOptions::new(families).with_collapse_codes(!args.per_code);
    if let Some(hcpcs) = &args.hcpcs {
        options = options.with_hcpcs(parse_codes(hcpcs)?);
    }
    if let Some(dx) = &args.dx {
        options = options.with_diagnosis(parse_codes(dx)?);
    }
    if let Some(max) = args.dx_max_cols {
        options = options.with_diagnosis_max_cols(max);
    }
    if let Some(sg) = &args.sg {
        options = options.with_procedure(parse_codes(sg)?);
    }
    // A standalone search has no cohort to filter against.
    Ok(options.with_filter_by_cohort(false))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_codes(value: &str) -> anyhow::Result<Vec<CodeSpec>> {
    split_list(value)
        .into_iter()
        .map(|code| {
            if code.chars().all(|c| c.is_ascii_alphanumeric()) {
                Ok(CodeSpec::literal(code))
            } else {
                CodeSpec::pattern(&code).map_err(Into::into)
            }
        })
        .collect()
}

fn parse_int_list(value: &str) -> anyhow::Result<Vec<i64>> {
    let mut out = Vec::new();
    for part in split_list(value) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start: i64 = start.trim().parse().context("invalid range start")?;
                let end: i64 = end.trim().parse().context("invalid range end")?;
                out.extend(start..=end);
            }
            None => out.push(part.parse().context("invalid number")?),
        }
    }
    Ok(out)
}

fn parse_years(value: &str) -> anyhow::Result<Vec<u16>> {
    Ok(parse_int_list(value)?
        .into_iter()
        .map(|year| u16::try_from(year).context("year out of range"))
        .collect::<Result<Vec<_>, _>>()?)
}
