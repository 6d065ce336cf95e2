mod pages;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use alf_contracts::{validate_prompt_length, Session, ThemeCatalog, ThemeId};
use alf_engine::{generate_filename, image_to_png_bytes, Studio, StudioConfig};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::pages::Console;

#[derive(Debug, Parser)]
#[command(name = "alf-rs", version, about = "ALF Abstractor image studio")]
struct Cli {
    /// Character table to use instead of the bundled one.
    #[arg(long, global = true)]
    themes: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive page-by-page studio.
    Studio(StudioArgs),
    /// Generate one image and write it to disk.
    Generate(GenerateArgs),
    /// List the mascot and friend themes.
    Themes,
    /// Show reference folders and how many images each holds.
    References(ReferencesArgs),
}

#[derive(Debug, Args)]
struct EngineArgs {
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    api_base: Option<String>,
    #[arg(long)]
    references: Option<PathBuf>,
    #[arg(long)]
    out: Option<PathBuf>,
}

impl EngineArgs {
    fn apply(&self, config: &mut StudioConfig) {
        if let Some(provider) = &self.provider {
            config.provider = provider.to_ascii_lowercase();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(base) = &self.api_base {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(references) = &self.references {
            config.references_dir = references.clone();
        }
        if let Some(out) = &self.out {
            config.output_dir = out.clone();
        }
    }
}

#[derive(Debug, Args)]
struct StudioArgs {
    #[command(flatten)]
    engine: EngineArgs,
    /// Skip loading reference folders at startup.
    #[arg(long)]
    no_references: bool,
}

#[derive(Debug, Args)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long, default_value = "alf")]
    theme: String,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Args)]
struct ReferencesArgs {
    #[arg(long)]
    references: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("alf-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let catalog = Arc::new(load_catalog(cli.themes.as_ref())?);
    match cli.command {
        Command::Studio(args) => run_studio(args, catalog),
        Command::Generate(args) => run_generate(args, catalog),
        Command::Themes => run_themes(&catalog),
        Command::References(args) => run_references(args, &catalog),
    }
}

fn load_catalog(path: Option<&PathBuf>) -> Result<ThemeCatalog> {
    match path {
        Some(path) => ThemeCatalog::load(path)
            .with_context(|| format!("failed loading themes from {}", path.display())),
        None => ThemeCatalog::bundled().context("bundled theme table is invalid"),
    }
}

fn studio_config(engine: &EngineArgs) -> StudioConfig {
    let mut config = StudioConfig::from_env();
    engine.apply(&mut config);
    config
}

fn run_studio(args: StudioArgs, catalog: Arc<ThemeCatalog>) -> Result<i32> {
    let config = studio_config(&args.engine);
    let studio = Studio::from_config(&config, Arc::clone(&catalog))?;
    let mut session = Session::new(catalog);
    log::info!("studio session {}", session.id());
    if !args.no_references {
        let total: usize = studio
            .load_all_references(&mut session)
            .into_iter()
            .map(|(_, count)| count)
            .sum();
        println!(
            "Loaded {total} reference images from {}",
            config.references_dir.display()
        );
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    Console::new(
        &studio,
        &mut session,
        stdin.lock(),
        stdout.lock(),
        config.output_dir.clone(),
    )
    .run()?;
    Ok(0)
}

fn run_generate(args: GenerateArgs, catalog: Arc<ThemeCatalog>) -> Result<i32> {
    if let Err(issue) = validate_prompt_length(&args.prompt) {
        bail!("{issue}");
    }
    let theme = args.theme.trim().to_ascii_lowercase();
    if !catalog.contains(&theme) {
        bail!("unknown theme '{theme}' (see `alf-rs themes`)");
    }
    let config = studio_config(&args.engine);
    let studio = Studio::from_config(&config, Arc::clone(&catalog))?;
    let mut session = Session::new(catalog);

    let mascot = studio.catalog().mascot_id().clone();
    session.load_reference_images_from_folder(studio.references(), mascot.as_str());
    if mascot.as_str() != theme {
        session.load_reference_images_from_folder(studio.references(), &theme);
    }
    session.set_current_prompt(args.prompt.clone());

    let outcome = studio.generate(&mut session, &theme)?;
    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("failed to create {}", config.output_dir.display()))?;
    let path = config
        .output_dir
        .join(generate_filename(&args.prompt, chrono::Utc::now().timestamp()));
    fs::write(&path, image_to_png_bytes(&outcome.image)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("{}", path.display());
    Ok(0)
}

fn run_themes(catalog: &ThemeCatalog) -> Result<i32> {
    let mascot = catalog.mascot();
    println!("{:<10} {} (solo)", mascot.id, mascot.label());
    for friend in catalog.friends() {
        println!("{:<10} {}  {}", friend.id, friend.label(), friend.species);
    }
    Ok(0)
}

fn run_references(args: ReferencesArgs, catalog: &ThemeCatalog) -> Result<i32> {
    let mut config = StudioConfig::from_env();
    if let Some(references) = args.references {
        config.references_dir = references;
    }
    let store = alf_engine::ReferenceStore::new(
        config.references_dir.clone(),
        catalog.mascot_id().clone(),
    );
    let ids: Vec<ThemeId> = catalog.ids();
    for id in ids {
        let info = store.info(&id);
        let status = match (&info.error, info.folder_exists) {
            (Some(err), _) => format!("error: {err}"),
            (None, false) => "missing".to_string(),
            (None, true) => format!("{} images", info.image_count()),
        };
        println!("{:<10} {:<12} {}", id, status, info.folder.display());
    }
    Ok(0)
}
