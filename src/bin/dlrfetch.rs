use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dlrfetch::*;
use tabled::settings::Style;
use tabled::{Table as DisplayTable, Tabled};
use tracing::Level;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.dlrfetch/dlrfetch.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the reconstructed group hierarchy, optionally for one year.
    Groups {
        /// Survey year, e.g. 2012
        #[clap(short, long)]
        year: Option<i32>,

        /// Output as JSON objects
        #[clap(long)]
        json: bool,

        /// Output to pretty table, default markdown table
        #[clap(short, long)]
        pretty: bool,
    },

    /// List valid profile (or answer) identifiers.
    Ids {
        /// Survey year, e.g. 2012
        #[clap(short, long)]
        year: Option<i32>,

        /// List answer identifiers instead of profile identifiers
        #[clap(short, long)]
        answers: bool,
    },

    /// Show profile metadata for one year, with an optional unit filter.
    Meta {
        /// Survey year, e.g. 2012
        #[clap(short, long)]
        year: i32,

        /// Unit filter: V, A, kVA, Hz, kW, or all
        #[clap(short, long)]
        unit: Option<String>,

        /// Output as JSON objects
        #[clap(long)]
        json: bool,

        /// Output to pretty table, default markdown table
        #[clap(short, long)]
        pretty: bool,
    },

    /// Fetch a year of load profiles month by month and save as Parquet.
    Profiles {
        /// Survey year, e.g. 2012
        #[clap(short, long)]
        year: i32,

        /// Unit filter: V, A, kVA, Hz, kW, or all
        #[clap(short, long)]
        unit: Option<String>,

        /// Output file path, defaults to <data_dir>/tables/p<year>.parquet
        #[clap(short, long)]
        out: Option<PathBuf>,
    },

    /// Preview the first readings of a year and estimate a full fetch.
    Sample {
        /// Survey year, e.g. 2012
        #[clap(short, long)]
        year: i32,
    },

    /// Estimate fetch time and memory usage for a year.
    Estimate {
        /// Survey year, e.g. 2012
        #[clap(short, long)]
        year: i32,
    },

    /// Anonymize the survey answer tables and save the masked copies.
    Anon,

    /// Fetch and save every year in a range, resuming past completed years.
    SaveAll {
        /// First year of the sweep
        #[clap(short, long)]
        start: i32,

        /// Last year of the sweep (inclusive)
        #[clap(short, long)]
        end: i32,

        /// Output directory, defaults to <data_dir>/tables
        #[clap(short, long)]
        dir: Option<PathBuf>,
    },

    /// Fetch a named DLR table and save it as Parquet.
    Table {
        /// Table name, e.g. LinkTable or Answers
        #[clap(name = "NAME")]
        name: String,
    },

    /// Show the current configuration.
    Config,
}

#[derive(Tabled)]
struct GroupRowDisplay {
    group_id: i64,
    context_id: String,
    dom_non_dom: String,
    survey: String,
    year: String,
    location: String,
}

impl From<&FlatGroup> for GroupRowDisplay {
    fn from(g: &FlatGroup) -> Self {
        GroupRowDisplay {
            group_id: g.group_id,
            context_id: g.context_id.map_or_else(String::new, |c| c.to_string()),
            dom_non_dom: g.dom_non_dom.clone(),
            survey: g.survey.clone(),
            year: g.year.clone(),
            location: g.location.clone(),
        }
    }
}

#[derive(Tabled)]
struct MetaRowDisplay {
    profile_id: i64,
    active: bool,
    recorder_id: String,
    unit: String,
}

#[derive(Tabled)]
struct MonthRowDisplay {
    month: u32,
    status: String,
    detail: String,
}

impl From<&MonthOutcome> for MonthRowDisplay {
    fn from(o: &MonthOutcome) -> Self {
        match o {
            MonthOutcome::Fetched { month, rows } => MonthRowDisplay {
                month: *month,
                status: "fetched".to_string(),
                detail: format!("{rows} rows"),
            },
            MonthOutcome::Skipped { month, reason } => MonthRowDisplay {
                month: *month,
                status: "skipped".to_string(),
                detail: reason.clone(),
            },
        }
    }
}

#[derive(Tabled)]
struct ReadingRowDisplay {
    profile_id: i64,
    datefield: String,
    units_read: f64,
    valid: bool,
    recorder_id: String,
    unit: String,
}

impl From<&Reading> for ReadingRowDisplay {
    fn from(r: &Reading) -> Self {
        ReadingRowDisplay {
            profile_id: r.profile_id,
            datefield: r.datefield.format("%Y-%m-%d %H:%M:%S").to_string(),
            units_read: r.units_read,
            valid: r.valid,
            recorder_id: r.recorder_id.clone(),
            unit: r.unit.clone(),
        }
    }
}

#[derive(Tabled)]
struct AnonRowDisplay {
    source: String,
    output: String,
    cells_masked: usize,
    path: String,
}

fn print_table<T: Tabled>(rows: Vec<T>, pretty: bool) {
    match pretty {
        true => println!("{}", DisplayTable::new(rows).with(Style::rounded())),
        false => println!("{}", DisplayTable::new(rows).with(Style::markdown())),
    }
}

fn parse_unit(unit: &Option<String>) -> Result<Unit> {
    Ok(unit.as_deref().unwrap_or("all").parse::<Unit>()?)
}

fn run(config: &DlrConfig, command: Commands) -> Result<()> {
    match command {
        Commands::Groups { year, json, pretty } => {
            let db = DatabaseConn::open_path(&config.db_path)?;
            let flat = match year {
                Some(y) => groups_for_year(&db, y)?,
                None => all_groups(&db)?,
            };
            if json {
                for g in &flat {
                    println!("{}", serde_json::json!(g));
                }
            } else {
                print_table(flat.iter().map(GroupRowDisplay::from).collect(), pretty);
            }
        }
        Commands::Ids { year, answers } => {
            let db = DatabaseConn::open_path(&config.db_path)?;
            let ids = match answers {
                true => answer_ids(&db, year)?,
                false => profile_ids(&db, year)?,
            };
            for id in ids {
                println!("{id}");
            }
        }
        Commands::Meta {
            year,
            unit,
            json,
            pretty,
        } => {
            let unit = parse_unit(&unit)?;
            let db = DatabaseConn::open_path(&config.db_path)?;
            let (meta, plist) = meta_profiles(&db, year, unit)?;
            if json {
                for m in &meta {
                    println!("{}", serde_json::json!(m));
                }
            } else {
                let rows = meta
                    .iter()
                    .map(|m| MetaRowDisplay {
                        profile_id: m.profile_id,
                        active: m.active,
                        recorder_id: m.recorder_id.clone(),
                        unit: m.unit.clone(),
                    })
                    .collect();
                print_table(rows, pretty);
            }
            println!(
                "{} of {} profiles match unit {}",
                plist.len(),
                meta.len(),
                unit
            );
        }
        Commands::Profiles { year, unit, out } => {
            let unit = parse_unit(&unit)?;
            let db = DatabaseConn::open_path(&config.db_path)?;
            let batch = fetch_year(&db, year, unit)?;

            let path = match out {
                Some(p) => p,
                None => {
                    let dir = config.tables_dir();
                    std::fs::create_dir_all(&dir)?;
                    dir.join(format!("p{year}.parquet"))
                }
            };
            write_table(&batch.to_table(), &path)?;

            print_table(
                batch.outcomes.iter().map(MonthRowDisplay::from).collect(),
                false,
            );
            println!(
                "saved {} rows for {} to {}",
                batch.rows.len(),
                year,
                path.display()
            );
            if !batch.skipped_months().is_empty() {
                eprintln!(
                    "warning: month(s) {:?} were skipped; the saved file is incomplete",
                    batch.skipped_months()
                );
            }
        }
        Commands::Sample { year } => {
            let db = DatabaseConn::open_path(&config.db_path)?;
            let rows = sample_profiles(&db, year)?;
            print_table(rows.iter().map(ReadingRowDisplay::from).collect(), false);

            let est = fetch_estimate(&db, year)?;
            println!(
                "It will take {:.1} minutes to fetch all {} profiles from {}.",
                est.minutes, est.profiles, est.year
            );
            println!("The estimated memory usage is {:.0} MB.", est.megabytes);
        }
        Commands::Estimate { year } => {
            let db = DatabaseConn::open_path(&config.db_path)?;
            let est = fetch_estimate(&db, year)?;
            println!(
                "It will take {:.1} minutes to fetch all {} profiles from {}.",
                est.minutes, est.profiles, est.year
            );
            println!("The estimated memory usage is {:.0} MB.", est.megabytes);
        }
        Commands::Anon => {
            let db = DatabaseConn::open_path(&config.db_path)?;
            let reports = anonymise_answers(&db, &config.anonymise_dir(), &config.tables_dir())?;
            let rows = reports
                .iter()
                .map(|r| AnonRowDisplay {
                    source: r.source.clone(),
                    output: r.output.clone(),
                    cells_masked: r.cells_masked,
                    path: r.path.display().to_string(),
                })
                .collect();
            print_table(rows, false);
        }
        Commands::SaveAll { start, end, dir } => {
            let db = DatabaseConn::open_path(&config.db_path)?;
            let dir = dir.unwrap_or_else(|| config.tables_dir());
            let outcomes = save_all_profiles(&db, start, end, &dir)?;
            for outcome in &outcomes {
                match outcome {
                    YearOutcome::Saved {
                        year,
                        rows,
                        skipped_months,
                        path,
                    } => {
                        println!("{year}: saved {} rows to {}", rows, path.display());
                        if !skipped_months.is_empty() {
                            println!("{year}: month(s) {skipped_months:?} were skipped");
                        }
                    }
                    YearOutcome::Checkpointed { year, path } => {
                        println!("{year}: already saved at {}, skipped", path.display());
                    }
                    YearOutcome::Skipped { year, reason } => {
                        println!("{year}: skipped: {reason}");
                    }
                }
            }
        }
        Commands::Table { name } => {
            let table_id = DlrTable::from_name(&name)?;
            let db = DatabaseConn::open_path(&config.db_path)?;
            let table = fetch_table(&db, table_id)?;
            let rows = table.len();
            let paths = save_tables(std::slice::from_ref(&table), &config.tables_dir())?;
            for path in paths {
                println!("saved {} rows of {} to {}", rows, table.name, path.display());
            }
        }
        Commands::Config => {
            println!("Config file path:   {}", DlrConfig::config_file_path());
            println!("{}", config.summary());
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt().with_max_level(Level::INFO).init();
    }

    let config = match DlrConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&config, cli.command) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
