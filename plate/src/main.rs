use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use plate::config::{Config, Patterns};
use plate::plate::PlateCache;
use plate::view;

#[derive(Debug, Parser)]
#[command(
    name = "plate",
    about = "Todo-list views built from plain-text wiki outlines",
    version
)]
struct Cli {
    /// Enable debug logging (RUST_LOG still takes precedence).
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Render the sections: contexts, inboxes, next actions, reminders.
    View(ViewArgs),

    /// Print the raw INBOX capture lines from the inboxes file.
    InboxRaw(InboxRawArgs),

    /// Print the condensed next-actions checklist.
    Actions(ActionsArgs),

    /// Rebuild the plate from the sources and dump it.
    Parse(ParseArgs),
}

#[derive(Debug, Args)]
struct SourceArgs {
    /// JSON configuration file; built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the configured wiki directory.
    #[arg(long)]
    dir: Option<String>,
}

#[derive(Debug, Args)]
struct ViewArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Expand every section instead of summarizing.
    #[arg(long)]
    full: bool,
    /// Emit the section strings as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct InboxRawArgs {
    #[command(flatten)]
    source: SourceArgs,
}

#[derive(Debug, Args)]
struct ActionsArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Emit the checklist entries as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct ParseArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Emit JSON instead of a debug representation.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Commands::View(args) => handle_view(args),
        Commands::InboxRaw(args) => handle_inbox_raw(args),
        Commands::Actions(args) => handle_actions(args),
        Commands::Parse(args) => handle_parse(args),
    }
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn load_config(source: &SourceArgs) -> Result<Config> {
    let mut cfg = match &source.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => Config::default(),
    };
    apply_overrides(&mut cfg, source.dir.as_deref(), false);
    Ok(cfg)
}

fn apply_overrides(cfg: &mut Config, dir: Option<&str>, full: bool) {
    if let Some(dir) = dir {
        cfg.wiki_dir = dir.to_string();
    }
    if full {
        cfg.summarize.inboxes = false;
        cfg.summarize.next_actions = false;
        cfg.summarize.reminders = false;
    }
}

fn handle_view(args: ViewArgs) -> Result<()> {
    let ViewArgs { source, full, json } = args;
    let mut cfg = load_config(&source)?;
    apply_overrides(&mut cfg, None, full);
    let patterns = Patterns::compile(&cfg)?;

    let mut cache = PlateCache::default();
    let plate = cache.get_or_rebuild(&cfg, &patterns)?;

    let contexts = view::display_contexts(plate, &cfg)?;
    let inboxes = view::display_inboxes(plate, &cfg)?;
    let next_actions = view::display_next_actions(plate, &cfg)?;
    let reminders = view::display_reminders(plate, &cfg)?;

    if json {
        #[derive(serde::Serialize)]
        struct ViewOutput {
            contexts: String,
            inboxes: String,
            next_actions: String,
            reminders: String,
        }

        let payload = ViewOutput {
            contexts,
            inboxes,
            next_actions,
            reminders,
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print!("{contexts}{inboxes}{next_actions}{reminders}");
    }
    Ok(())
}

fn handle_inbox_raw(args: InboxRawArgs) -> Result<()> {
    let cfg = load_config(&args.source)?;
    let path = cfg.inboxes_path()?;
    let text =
        fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let captured = view::inbox_raw(&text);
    if !captured.is_empty() {
        println!("{captured}");
    }
    Ok(())
}

fn handle_actions(args: ActionsArgs) -> Result<()> {
    let ActionsArgs { source, json } = args;
    let cfg = load_config(&source)?;
    let patterns = Patterns::compile(&cfg)?;

    let mut cache = PlateCache::default();
    let plate = cache.get_or_rebuild(&cfg, &patterns)?;

    if json {
        #[derive(serde::Serialize)]
        struct CondensedAction<'a> {
            name: &'a str,
            project: Option<&'a str>,
        }

        let payload: Vec<CondensedAction<'_>> = plate
            .next_actions
            .values()
            .map(|action| CondensedAction {
                name: &action.name,
                project: action.project.as_deref(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        let listing = view::condensed_actions(plate);
        if !listing.is_empty() {
            println!("{listing}");
        }
    }
    Ok(())
}

fn handle_parse(args: ParseArgs) -> Result<()> {
    let ParseArgs { source, json } = args;
    let cfg = load_config(&source)?;
    let patterns = Patterns::compile(&cfg)?;

    let mut cache = PlateCache::default();
    let plate = cache.get_or_rebuild(&cfg, &patterns)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&*plate)?);
    } else {
        println!("{plate:#?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_the_wiki_dir() {
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, Some("/elsewhere/wiki"), false);
        assert_eq!(cfg.wiki_dir, "/elsewhere/wiki");
    }

    #[test]
    fn full_override_expands_every_section() {
        let mut cfg = Config::default();
        assert!(cfg.summarize.inboxes);
        apply_overrides(&mut cfg, None, true);
        assert!(!cfg.summarize.inboxes);
        assert!(!cfg.summarize.next_actions);
        assert!(!cfg.summarize.reminders);
    }

    #[test]
    fn cli_parses_view_flags() {
        let cli = Cli::try_parse_from(["plate", "view", "--full", "--dir", "/tmp/wiki"])
            .expect("parse args");
        match cli.command {
            Commands::View(args) => {
                assert!(args.full);
                assert!(!args.json);
                assert_eq!(args.source.dir.as_deref(), Some("/tmp/wiki"));
            }
            other => panic!("expected view command, got {other:?}"),
        }
    }
}
