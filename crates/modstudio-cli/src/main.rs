use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use modstudio_lib::registry::{
    enrich_entry, Entry, EntryQuery, FilesystemResolver, MatchResult, RegistryStore,
};
use modstudio_lib::{classify, compare_versions, RegistryConfig};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "modstudio")]
#[command(about = "Classify game installations and manage the installation registry")]
struct Cli {
    /// Registry file (default: MODSTUDIO_REGISTRY_PATH or the per-user data directory)
    #[arg(short, long, global = true)]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an installation directory without registering it
    Classify {
        path: PathBuf,
        /// Print the full profile as JSON
        #[arg(long)]
        json: bool,
    },
    /// List registered installations
    List {
        /// Order by game version instead of registration order
        #[arg(long)]
        by_version: bool,
    },
    /// Register an installation
    Add {
        /// Display name, unique within the registry
        #[arg(short, long)]
        name: String,
        /// Installation directory
        #[arg(short, long)]
        path: PathBuf,
        #[arg(short, long)]
        version: Option<String>,
        /// Mods folder relative to the installation directory
        #[arg(long)]
        mods_sub_path: Option<String>,
    },
    /// Remove an installation by id or display name
    Remove { target: String },
    /// Find an installation by any combination of criteria
    Find {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        game: Option<String>,
        #[arg(long)]
        version: Option<String>,
        /// Treat an unmatched id or name as a failed query
        #[arg(long)]
        strict: bool,
    },
    /// Classify every installation that has not been classified yet
    Enrich,
    /// Keep the registry loaded and report external changes until interrupted
    Watch,
}

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn resolve_config(registry: Option<PathBuf>) -> RegistryConfig {
    let mut config = RegistryConfig::from_env();
    if let Some(path) = registry {
        config.registry_path = path;
    }
    config
}

fn describe(entry: &Entry) -> String {
    let mut line = format!("{}  {}  {}", entry.id, entry.display_name, entry.path);
    if let Some(version) = &entry.version {
        line.push_str(&format!("  v{}", version));
    }
    if let Some(label) = &entry.profile_label {
        line.push_str(&format!("  [{}]", label));
    }
    line
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = resolve_config(cli.registry);

    match cli.command {
        Commands::Classify { path, json } => match classify(&path) {
            Ok(profile) if json => {
                println!("{}", serde_json::to_string_pretty(&profile)?);
            }
            Ok(profile) => {
                println!("Game:          {}", profile.runtime_family());
                if let Some(publisher) = &profile.publisher {
                    println!("Publisher:     {}", publisher);
                }
                println!("Version:       {}", profile.runtime_version);
                println!("Architecture:  {}", profile.architecture.as_str());
                println!("Profile:       {} ({})", profile.profile_label(), profile.target_moniker);
                println!("Executable:    {}", profile.executable_file.display());
                println!(
                    "Assemblies:    {} framework, {} game",
                    profile.framework_assemblies.len(),
                    profile.game_assemblies.len()
                );
            }
            Err(e) => bail!("{}: {}", e.code(), e),
        },
        Commands::List { by_version } => {
            let store = RegistryStore::open(&config).await?;
            let mut entries = store.entries().await;
            if by_version {
                entries.sort_by(|a, b| compare_versions(a.version.as_deref(), b.version.as_deref()));
            }

            if entries.is_empty() {
                println!("No installations registered in {}", store.path().display());
            }
            for entry in &entries {
                println!("{}", describe(entry));
            }
        }
        Commands::Add {
            name,
            path,
            version,
            mods_sub_path,
        } => {
            let store = RegistryStore::open(&config).await?;
            if store.find_by_display_name(&name).await.is_some() {
                bail!("An installation named {:?} is already registered", name);
            }

            let path = dunce::canonicalize(&path)
                .with_context(|| format!("Installation directory {:?} not found", path))?;
            let mut entry = Entry::new(name, path.display().to_string());
            entry.version = version;
            entry.mods_sub_path = mods_sub_path;

            if let Err(e) = enrich_entry(&mut entry, &FilesystemResolver) {
                log::warn!("Registering without profile data: {} [{}]", e, e.code());
            }

            println!("{}", describe(&entry));
            store.add(entry).await?;
            store.save().await.context("Failed to save registry")?;
        }
        Commands::Remove { target } => {
            let store = RegistryStore::open(&config).await?;
            let found = match Uuid::parse_str(&target) {
                Ok(id) => store.find_by_id(id).await,
                Err(_) => store.find_by_display_name(&target).await,
            };
            let Some(entry) = found else {
                bail!("No installation matches {:?}", target);
            };

            store.remove(entry.id).await;
            store.save().await.context("Failed to save registry")?;
            println!("Removed {}", entry.display_name);
        }
        Commands::Find {
            id,
            name,
            game,
            version,
            strict,
        } => {
            let store = RegistryStore::open(&config).await?;
            let query = EntryQuery {
                id,
                display_name: name,
                game_name: game,
                version,
            };

            match store.find(&query, strict).await {
                MatchResult::NoMatch => bail!("No installation matches the given criteria"),
                MatchResult::Match(entry) => println!("{}", describe(&entry)),
                MatchResult::Ambiguous { entries, message } => {
                    for entry in &entries {
                        eprintln!("  {}", describe(entry));
                    }
                    bail!(message);
                }
            }
        }
        Commands::Enrich => {
            let store = RegistryStore::open(&config).await?;
            let enriched = store.enrich_all(&FilesystemResolver).await;
            if enriched > 0 {
                store.save().await.context("Failed to save registry")?;
            }
            println!("Enriched {} installations", enriched);
        }
        Commands::Watch => {
            let store = RegistryStore::open(&RegistryConfig {
                watch: true,
                ..config
            })
            .await?;
            println!(
                "Watching {} ({} installations), press Ctrl+C to stop",
                store.path().display(),
                store.len().await
            );

            let mut last = store.entries().await;
            let mut interval = tokio::time::interval(Duration::from_millis(500));
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = interval.tick() => {
                        let current = store.entries().await;
                        if current != last {
                            println!("Registry changed: {} installations", current.len());
                            for entry in &current {
                                println!("  {}", describe(entry));
                            }
                            last = current;
                        }
                    }
                }
            }
            store.set_watch(false)?;
        }
    }

    Ok(())
}
