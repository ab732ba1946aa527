use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{debug, info};
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fluxplayer::embed::{EmbedOptions, ResumePolicy, UrlBuilder};
use fluxplayer::provider::{ProviderId, ProviderRegistry};
use fluxplayer::session::{SessionEvent, VirtualScheduler};
use fluxplayer::storage::{FileStore, IntroStore, MediaCollection, MemoryStore, ProgressStore, SharedStore};
use fluxplayer::utils::{format_seconds, Clock, Config, SystemClock};
use fluxplayer::{MediaId, MediaKind, MediaRef};

/// fluxplayer - embedded player session tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file to use instead of the system and user files
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Store file to use instead of the configured one
    #[arg(long, value_name = "FILE")]
    store: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the embed URL a session would load
    Url(UrlArgs),

    /// Replay a JSON-lines event script on virtual time
    Replay {
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,

        /// Run against the persistent store instead of a scratch one
        #[arg(long)]
        persist: bool,
    },

    /// Inspect or edit watch progress
    Progress {
        #[command(subcommand)]
        action: ProgressAction,
    },

    /// Inspect or change the provider selection
    Provider {
        #[command(subcommand)]
        action: ProviderAction,
    },

    /// Manage intro windows
    Intro {
        #[command(subcommand)]
        action: IntroAction,
    },

    /// Show or edit the saved lists
    List {
        #[command(subcommand)]
        action: ListAction,
    },
}

#[derive(ClapArgs, Debug)]
struct TitleArgs {
    /// movie or tv
    kind: MediaKind,

    id: String,

    #[arg(short, long)]
    season: Option<u32>,

    #[arg(short, long)]
    episode: Option<u32>,
}

impl TitleArgs {
    fn media(&self) -> MediaRef {
        MediaRef {
            id: MediaId::new(self.id.clone()),
            kind: self.kind,
            season: self.season.filter(|_| self.kind == MediaKind::Series),
            episode: self.episode.filter(|_| self.kind == MediaKind::Series),
        }
    }
}

#[derive(ClapArgs, Debug)]
struct UrlArgs {
    #[command(flatten)]
    title: TitleArgs,

    /// Provider to build for; defaults to the active one
    #[arg(short, long)]
    provider: Option<ProviderId>,

    /// Domain to build for; defaults to the provider's active domain
    #[arg(long)]
    domain: Option<String>,

    /// Build as a manual selection (no resume, no auto-advance)
    #[arg(long)]
    manual: bool,
}

#[derive(Subcommand, Debug)]
enum ProgressAction {
    /// List all records, most recent first
    List,
    /// Show one record
    Show { kind: MediaKind, id: String },
    /// Move a series record to another episode
    SetEpisode { id: String, season: u32, episode: u32 },
    /// Restart a title from zero
    Reset(TitleArgs),
    /// Move a record stored under an old identifier
    Migrate { kind: MediaKind, old: String, new: String },
}

#[derive(Subcommand, Debug)]
enum ProviderAction {
    /// Show both providers and their active domains
    Show,
    /// Make a provider active
    Set { provider: ProviderId },
    /// Pin a provider to one of its domains
    Domain { provider: ProviderId, domain: String },
}

#[derive(Subcommand, Debug)]
enum IntroAction {
    Show { id: String },
    Set { id: String, start: f64, end: f64 },
    Clear { id: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ListName {
    MyList,
    ContinueWatching,
}

#[derive(Subcommand, Debug)]
enum ListAction {
    /// Print a list
    Show {
        #[arg(value_enum)]
        name: ListName,
    },
    /// Add a title to My List, or remove it if present
    Toggle(TitleArgs),
}

/// One line of a replay script
#[derive(Deserialize)]
#[serde(untagged)]
enum ReplayStep {
    Advance { advance_ms: u64 },
    Event(SessionEvent),
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let log_level = if args.debug { "debug" } else { config.general.log_level.as_str() };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    debug!("fluxplayer v{}", env!("CARGO_PKG_VERSION"));

    let store_path = args.store.clone().unwrap_or_else(|| config.store_path());
    let open_store = || -> SharedStore {
        debug!("Using store {:?}", store_path);
        Arc::new(FileStore::open(&store_path))
    };

    match args.command {
        Command::Url(url_args) => print_url(&config, open_store(), &url_args)?,
        Command::Replay { script, persist } => {
            let store = if persist { open_store() } else { MemoryStore::shared() };
            replay(&config, store, &script)?;
        }
        Command::Progress { action } => progress(open_store(), action)?,
        Command::Provider { action } => provider(&config, open_store(), action)?,
        Command::Intro { action } => intro(open_store(), action)?,
        Command::List { action } => list(&config, open_store(), action)?,
    }

    Ok(())
}

fn print_url(config: &Config, store: SharedStore, args: &UrlArgs) -> Result<()> {
    let registry = ProviderRegistry::new(&config.providers, store.clone());
    let provider = args.provider.unwrap_or_else(|| registry.active_provider());
    let domain = args
        .domain
        .clone()
        .unwrap_or_else(|| registry.active_domain(provider));

    let media = args.title.media();
    let options = if args.manual { EmbedOptions::manual() } else { EmbedOptions::resume() };
    let progress = ProgressStore::new(store).get(&media.id, media.kind);

    let builder = UrlBuilder::new(config.embed.clone(), &config.providers, ResumePolicy::from(&config.session));
    let url = builder.build(&media, progress.as_ref(), provider, &domain, options)?;
    println!("{}", url);
    Ok(())
}

fn replay(config: &Config, store: SharedStore, script: &Path) -> Result<()> {
    let file = std::fs::File::open(script).with_context(|| format!("Cannot open {:?}", script))?;
    let mut scheduler = VirtualScheduler::new(config, store, SystemClock.now_ms());

    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let step: ReplayStep = serde_json::from_str(line)
            .with_context(|| format!("Line {}: not an event or advance step", number + 1))?;
        let effects = match step {
            ReplayStep::Advance { advance_ms } => scheduler.advance(Duration::from_millis(advance_ms)),
            ReplayStep::Event(event) => scheduler.dispatch(event),
        };
        for effect in effects {
            println!("{}", serde_json::to_string(&effect)?);
        }
    }

    let state = scheduler.controller().state();
    info!(
        "Replay finished in phase {:?} on {}",
        state.phase,
        state.domain.as_deref().unwrap_or("-")
    );
    Ok(())
}

fn progress(store: SharedStore, action: ProgressAction) -> Result<()> {
    let progress = ProgressStore::new(store);
    match action {
        ProgressAction::List => {
            for record in progress.all() {
                let episode = match (record.season, record.episode) {
                    (Some(s), Some(e)) => format!(" S{:02}E{:02}", s, e),
                    _ => String::new(),
                };
                println!(
                    "{}/{}{}  {} / {}  ({:.0}%)",
                    record.kind,
                    record.id,
                    episode,
                    format_seconds(record.current_time_seconds),
                    format_seconds(record.duration_seconds),
                    record.percent
                );
            }
        }
        ProgressAction::Show { kind, id } => match progress.get(&MediaId::new(id.clone()), kind) {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => bail!("No progress for {}/{}", kind, id),
        },
        ProgressAction::SetEpisode { id, season, episode } => {
            progress.set_episode(&MediaId::new(id), season, episode);
        }
        ProgressAction::Reset(title) => {
            let record = progress.reset(&title.media(), SystemClock.now_ms());
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        ProgressAction::Migrate { kind, old, new } => {
            if !progress.migrate_id(kind, &MediaId::new(old), &MediaId::new(new)) {
                info!("Nothing to migrate");
            }
        }
    }
    Ok(())
}

fn provider(config: &Config, store: SharedStore, action: ProviderAction) -> Result<()> {
    let mut registry = ProviderRegistry::new(&config.providers, store);
    match action {
        ProviderAction::Show => {
            let active = registry.active_provider();
            for id in [ProviderId::A, ProviderId::B] {
                let snapshot = registry.snapshot(id);
                println!(
                    "{} {}  {}  [{}]",
                    if id == active { "*" } else { " " },
                    id,
                    snapshot.active_domain(),
                    snapshot.domains.join(", ")
                );
            }
        }
        ProviderAction::Set { provider } => registry.set_active_provider(provider),
        ProviderAction::Domain { provider, domain } => {
            if !registry.set_active_domain(provider, &domain) {
                bail!("{} is not a domain of provider {}", domain, provider);
            }
        }
    }
    Ok(())
}

fn intro(store: SharedStore, action: IntroAction) -> Result<()> {
    let intro = IntroStore::new(store);
    match action {
        IntroAction::Show { id } => match intro.get(&MediaId::new(id.clone())) {
            Some(markers) => println!(
                "{} - {}",
                format_seconds(markers.start_seconds),
                format_seconds(markers.end_seconds)
            ),
            None => println!("No intro set for {}", id),
        },
        IntroAction::Set { id, start, end } => {
            if !intro.set(&MediaId::new(id), start, end) {
                bail!("Intro end must be after its start");
            }
        }
        IntroAction::Clear { id } => intro.clear(&MediaId::new(id)),
    }
    Ok(())
}

fn list(config: &Config, store: SharedStore, action: ListAction) -> Result<()> {
    match action {
        ListAction::Show { name } => {
            let collection = match name {
                ListName::MyList => MediaCollection::my_list(store, config.general.my_list_limit),
                ListName::ContinueWatching => {
                    MediaCollection::continue_watching(store, config.general.continue_watching_limit)
                }
            };
            for entry in collection.list() {
                println!("{}", entry.media());
            }
        }
        ListAction::Toggle(title) => {
            let my_list = MediaCollection::my_list(store, config.general.my_list_limit);
            let media = title.media();
            let listed = my_list.toggle(&media, SystemClock.now_ms());
            println!("{} {}", media, if listed { "added" } else { "removed" });
        }
    }
    Ok(())
}
