use api_shared::wire::{AllergyPayload, DrugPayload};
use api_shared::HealthService;
use clap::{Parser, Subcommand};
use rxmatch_core::config::{fallback_attribution_from_env_value, resolve_catalogue_path};
use rxmatch_core::constants::{DEFAULT_PAGE, DEFAULT_POOL_SIZE, DEFAULT_ROW};
use rxmatch_core::{
    AllergyService, Catalogue, CatalogueRepository, DrugRepository, InteractionService,
    MatchConfig,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rxmatch")]
#[command(about = "rxmatch drug interaction and allergy matching CLI")]
struct Cli {
    /// Catalogue file (defaults to RXMATCH_CATALOGUE_PATH, then data/catalogue.yaml)
    #[arg(long, global = true)]
    catalogue: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the service is alive
    Health,
    /// Find interactions for a JSON payload of current and historical drugs
    Interactions {
        /// Path to a `{drug_currents, drug_histories}` JSON file
        payload: PathBuf,
        #[arg(long, default_value_t = DEFAULT_PAGE)]
        page: usize,
        #[arg(long, default_value_t = DEFAULT_ROW)]
        row: usize,
    },
    /// Cross-check a JSON payload's allergy list against its drugs
    Allergy {
        /// Path to a `{drug_currents, drug_histories, drug_allergies}` JSON file
        payload: PathBuf,
        #[arg(long, default_value_t = DEFAULT_PAGE)]
        page: usize,
        #[arg(long, default_value_t = DEFAULT_ROW)]
        row: usize,
    },
    /// Show hierarchy details and substances for drug codes
    Lookup {
        /// Codes at any hierarchy level
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Resolve free-text drug names to substance IDs
    Resolve {
        /// Drug names
        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn open_repository(
    catalogue: Option<PathBuf>,
) -> Result<(Arc<MatchConfig>, Arc<CatalogueRepository>), Box<dyn std::error::Error>> {
    let override_path =
        catalogue.or_else(|| std::env::var("RXMATCH_CATALOGUE_PATH").ok().map(PathBuf::from));
    let catalogue_path = resolve_catalogue_path(override_path)?;
    let fallback_attribution =
        fallback_attribution_from_env_value(std::env::var("RXMATCH_FALLBACK_ATTRIBUTION").ok())?;

    let cfg = Arc::new(MatchConfig::new(
        catalogue_path,
        DEFAULT_POOL_SIZE,
        fallback_attribution,
    )?);
    let catalogue = Catalogue::load(cfg.catalogue_path())?;
    let repo = Arc::new(CatalogueRepository::new(catalogue, cfg.pool_size()));
    Ok((cfg, repo))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Health) => {
            let health = HealthService::check_health();
            println!("{}", health.message);
        }
        Some(Commands::Interactions { payload, page, row }) => {
            let (cfg, repo) = open_repository(cli.catalogue)?;
            let payload: DrugPayload = serde_json::from_str(&std::fs::read_to_string(payload)?)?;
            let service = InteractionService::new(cfg, repo);
            match service.get_interactions(&payload, page, row).await {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(e) => eprintln!("Error matching interactions: {}", e),
            }
        }
        Some(Commands::Allergy { payload, page, row }) => {
            let (cfg, repo) = open_repository(cli.catalogue)?;
            let payload: AllergyPayload =
                serde_json::from_str(&std::fs::read_to_string(payload)?)?;
            let service = AllergyService::new(cfg, repo);
            match service.get_allergy(&payload, page, row).await {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(e) => eprintln!("Error matching allergies: {}", e),
            }
        }
        Some(Commands::Lookup { codes }) => {
            let (_, repo) = open_repository(cli.catalogue)?;
            let details = repo.query_details(&codes).await?;
            let substances = repo.resolve_subs(&codes).await?;
            for code in &codes {
                let entry = serde_json::json!({
                    "code": code,
                    "detail": details.get(code),
                    "substances": substances.get(code).cloned().unwrap_or_default(),
                });
                println!("{}", serde_json::to_string_pretty(&entry)?);
            }
        }
        Some(Commands::Resolve { names }) => {
            let (_, repo) = open_repository(cli.catalogue)?;
            let resolved = repo.resolve_names(&names).await?;
            for name in &names {
                match resolved.get(name) {
                    Some(substances) => println!("{}: {}", name, substances.join(", ")),
                    None => println!("{}: no match found", name),
                }
            }
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
