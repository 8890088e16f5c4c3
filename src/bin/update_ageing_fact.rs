use std::{error::Error, path::PathBuf};

use ageing::{
    config::{load_env_file, DbConfig},
    db::ageing_fact::{AgeingFactArchive, DEFAULT_GENERATE_SQL},
    job::{run_update, UpdateJob},
};
use jiff::{civil::Date, Zoned};
use clap::Parser;
use log::info;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Environment name, e.g., test, prod
    #[arg(short, long, default_value = "prod")]
    env: String,

    /// Snapshot date, e.g. 2025-07-07.  Defaults to today.
    #[arg(long)]
    as_of: Option<Date>,

    /// Migration file to apply before the update.  Repeat the argument for
    /// several files, they run in the order given.
    #[arg(short, long = "migration")]
    migrations: Vec<PathBuf>,

    /// Query generating the ageing facts
    #[arg(long, default_value = DEFAULT_GENERATE_SQL)]
    sql: PathBuf,

    /// Output csv file, defaults to ageing_fact_table_<date>.csv
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Commit the delete and the insert separately
    #[arg(long)]
    per_step_commit: bool,

    /// Don't read the exported file back to check it
    #[arg(long)]
    no_verify: bool,
}

/// Run this job every day after the invoices and payments are loaded.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    load_env_file(&args.env)?;
    let config = DbConfig::from_env()?;

    let job = UpdateJob {
        as_at_date: args.as_of.unwrap_or_else(|| Zoned::now().date()),
        migrations: args.migrations,
        out: args.out,
        per_step_commit: args.per_step_commit,
        verify: !args.no_verify,
    };

    let mut archive = AgeingFactArchive::connect(&config, args.sql).await?;
    let outcome = run_update(&mut archive, &job).await?;
    println!("✅ Exported ageing fact table to: {}", outcome.csv_path.display());
    info!(
        "{} rows replaced by {} rows for {}",
        outcome.deleted, outcome.inserted, job.as_at_date
    );

    Ok(())
}
