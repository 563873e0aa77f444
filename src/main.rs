use anyhow::{Context, bail};
use catchment_tform::spec::{FileIoFields, FunctionRegistry, TransformConfig, TransformRegistry};
use catchment_tform::store::{LocationAttributeStore, io};
use catchment_tform::{diagnostics, model};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub type Result<T> = anyhow::Result<T>;

const DEFAULT_LOC_ID_COL: &str = "comid";

#[derive(Parser)]
#[command(name = "catchment-tform")]
#[command(about = "Derive aggregated catchment attributes into per-location caches", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Args)]
struct Target {
    /// Transform configuration (YAML with `transform_attrs`).
    #[arg(long)]
    config: PathBuf,

    /// Attribute store directory; defaults to `file_io.dir_db_attrs` in the config.
    #[arg(long)]
    dir_db_attrs: Option<PathBuf>,

    /// Location identifier to process (repeatable).
    #[arg(long = "comid")]
    comids: Vec<String>,

    /// CSV/Parquet listing of location identifiers; defaults to `file_io.path_comids`.
    #[arg(long)]
    comids_file: Option<PathBuf>,

    /// Column of the listing holding identifiers.
    #[arg(long)]
    loc_id_col: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute missing derived attributes and merge them into the store.
    Run {
        #[command(flatten)]
        target: Target,

        /// Worker threads across locations (default: one per core).
        #[arg(short = 'j', long)]
        jobs: Option<usize>,

        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Report which derived attributes each location still lacks.
    Plan {
        #[command(flatten)]
        target: Target,

        #[arg(long)]
        json: bool,
    },
    /// List the function identifiers usable in `tform_type`.
    Functions,
}

struct Resolved {
    store: LocationAttributeStore,
    registry: TransformRegistry,
    locations: Vec<String>,
}

fn resolve(target: Target) -> Result<Resolved> {
    let config = TransformConfig::from_path(&target.config)
        .with_context(|| format!("load transform config {}", target.config.display()))?;
    let FileIoFields {
        dir_db_attrs,
        path_comids,
        loc_id_col,
    } = config.file_io();

    let registry = TransformRegistry::from_config(&config, &FunctionRegistry::with_builtins())
        .with_context(|| format!("expand transform config {}", target.config.display()))?;

    let Some(dir) = target.dir_db_attrs.or(dir_db_attrs) else {
        bail!("no attribute directory: pass --dir-db-attrs or set file_io.dir_db_attrs");
    };

    let mut locations = target.comids;
    if let Some(listing) = target.comids_file.or(path_comids) {
        let column = target
            .loc_id_col
            .or(loc_id_col)
            .unwrap_or_else(|| DEFAULT_LOC_ID_COL.to_string());
        let ids = io::read_location_ids(&listing, &column)
            .with_context(|| format!("read location listing {}", listing.display()))?;
        locations.extend(ids);
    }
    if locations.is_empty() {
        bail!("no locations: pass --comid or --comids-file (or set file_io.path_comids)");
    }

    Ok(Resolved {
        store: LocationAttributeStore::new(dir),
        registry,
        locations,
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    diagnostics::init(cli.verbose);

    match cli.cmd {
        Commands::Run { target, jobs, json } => {
            let Resolved {
                store,
                registry,
                locations,
            } = resolve(target)?;

            let summary = model::run(&store, &registry, &locations, jobs)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for outcome in &summary.locations {
                    if !outcome.has_data {
                        println!("{}: no attribute files", outcome.location_id);
                        continue;
                    }
                    println!(
                        "{}: computed {}, skipped {}",
                        outcome.location_id,
                        outcome.computed.len(),
                        outcome.skipped.len()
                    );
                }
                println!(
                    "{} locations, {} attributes computed, {} skipped, {} files written",
                    summary.locations.len(),
                    summary.computed_total(),
                    summary.skipped_total(),
                    summary.files_written()
                );
            }
        }
        Commands::Plan { target, json } => {
            let Resolved {
                store,
                registry,
                locations,
            } = resolve(target)?;

            let mut plans = std::collections::BTreeMap::new();
            for id in &locations {
                let plan = model::plan_location(&store, &registry, id)
                    .with_context(|| format!("plan location {}", id))?;
                plans.insert(id.clone(), plan);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&plans)?);
            } else {
                for (id, plan) in &plans {
                    let names: Vec<&str> = plan.missing_names.iter().map(String::as_str).collect();
                    println!("{}: {} missing [{}]", id, names.len(), names.join(", "));
                }
            }
        }
        Commands::Functions => {
            for id in FunctionRegistry::with_builtins().identifiers() {
                println!("{}", id);
            }
        }
    }

    Ok(())
}
