//! UA Changer CLI
//!
//! CLI tool for inspecting the rules and badges a settings bundle produces.

mod simulate;

use std::fs;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use uac_compiler::{compile, synthesize};
use uac_core::catalog::{ProfileTable, SpoofList};
use uac_core::effective::{effective_profile_for, render_badge, BadgeStyle};
use uac_core::matcher::matches;
use uac_core::resolver::FALLBACK_USER_AGENT;
use uac_core::settings::{import_settings, parse_bundle};
use uac_core::types::{GlobalMode, Profile, State, TabId};

#[derive(Parser)]
#[command(name = "uac-cli")]
#[command(about = "UA Changer rule compiler and tools")]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a domain pattern, optionally testing a URL against it
    Pattern {
        /// Domain pattern, e.g. `*.example.com` or `example.com/api/*`
        pattern: String,

        /// URL to test against the pattern
        #[arg(short, long)]
        url: Option<String>,
    },

    /// Print the rules a settings bundle produces
    Rules {
        #[command(flatten)]
        state: StateArgs,
    },

    /// Predict the badge for a tab URL
    Effective {
        #[command(flatten)]
        state: StateArgs,

        /// Tab URL
        #[arg(short, long)]
        url: String,

        /// Tab id the prediction is for
        #[arg(long, default_value_t = 1)]
        tab_id: TabId,
    },

    /// Validate a settings bundle
    Check {
        /// Settings bundle (export file)
        #[arg(short, long)]
        settings: String,
    },

    /// Replay an event script against in-memory browser substrates
    Simulate {
        /// Settings bundle imported before the first event
        #[arg(short, long)]
        settings: Option<String>,

        /// JSON array of events
        #[arg(short, long)]
        event: String,

        /// Real browser user agent
        #[arg(long, default_value = FALLBACK_USER_AGENT)]
        real_ua: String,
    },
}

#[derive(clap::Args)]
struct StateArgs {
    /// Settings bundle (export file)
    #[arg(short, long)]
    settings: Option<String>,

    /// Global mode override: `default`, `auto` or a profile id
    #[arg(short, long)]
    global: Option<String>,

    /// Manual pick, as `TAB=PROFILE` (repeatable)
    #[arg(short, long = "tab")]
    tabs: Vec<String>,

    /// Real browser user agent
    #[arg(long, default_value = FALLBACK_USER_AGENT)]
    real_ua: String,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Pattern { pattern, url } => cmd_pattern(&pattern, url.as_deref()),
        Commands::Rules { state } => cmd_rules(&state),
        Commands::Effective { state, url, tab_id } => cmd_effective(&state, &url, tab_id),
        Commands::Check { settings } => cmd_check(&settings),
        Commands::Simulate {
            settings,
            event,
            real_ua,
        } => simulate::run_simulation(settings.as_deref(), &event, &real_ua),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub(crate) fn read_file(path: &str) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))
}

fn parse_override(arg: &str) -> Result<(TabId, String), String> {
    let (tab, profile) = arg
        .split_once('=')
        .ok_or_else(|| format!("Expected TAB=PROFILE, got '{}'", arg))?;
    let tab = tab
        .trim()
        .parse()
        .map_err(|_| format!("Invalid tab id '{}'", tab))?;
    Ok((tab, profile.trim().to_string()))
}

fn load_state(args: &StateArgs) -> Result<State, String> {
    let mut profiles = ProfileTable::seeded("Default", "Auto");
    let mut spoofs = SpoofList::default();
    let mut global = GlobalMode::Default;

    if let Some(path) = &args.settings {
        let bundle = parse_bundle(&read_file(path)?).map_err(|e| format!("Invalid settings '{}': {}", path, e))?;
        let report = import_settings(&bundle, &mut profiles, &mut spoofs, &mut global);
        log::debug!("loaded '{}': {:?}", path, report);
    }
    if let Some(mode) = &args.global {
        global = GlobalMode::from(mode.as_str());
    }

    let mut state = State::new(profiles, spoofs, global);
    for arg in &args.tabs {
        let (tab, profile) = parse_override(arg)?;
        state.tab_overrides.insert(tab, profile);
    }
    Ok(state)
}

fn cmd_pattern(pattern: &str, url: Option<&str>) -> Result<(), String> {
    println!("Pattern:    {}", pattern);
    println!("URL filter: {}", compile(pattern));
    if let Some(url) = url {
        let verdict = if matches(url, pattern) { "matches" } else { "does not match" };
        println!("{} {} the pattern", url, verdict);
    }
    Ok(())
}

fn cmd_rules(args: &StateArgs) -> Result<(), String> {
    let state = load_state(args)?;
    let rules = synthesize(&state, &args.real_ua);

    let output = serde_json::json!({
        "session": rules.tab_rules,
        "persistent": rules.domain_rules,
    });
    let text = serde_json::to_string_pretty(&output).map_err(|e| format!("Failed to serialize rules: {}", e))?;
    println!("{}", text);
    Ok(())
}

fn cmd_effective(args: &StateArgs, url: &str, tab_id: TabId) -> Result<(), String> {
    let state = load_state(args)?;
    let effective = effective_profile_for(tab_id, Some(url), &state);
    let badge = render_badge(&effective, &BadgeStyle::default());

    println!("Source:  {}", effective.source_kind().as_str());
    match effective.profile() {
        Some(profile) => println!("Profile: {} ({})", profile.name, profile.id),
        None => println!("Profile: none"),
    }
    println!("Badge:   '{}' {}", badge.text, badge.color.as_deref().unwrap_or("(unchanged)"));
    println!("Title:   {}", badge.title.replace('\n', " | "));
    Ok(())
}

fn cmd_check(path: &str) -> Result<(), String> {
    let bundle = parse_bundle(&read_file(path)?).map_err(|e| format!("Invalid settings '{}': {}", path, e))?;

    let mut profiles = ProfileTable::seeded("Default", "Auto");
    let mut spoofs = SpoofList::default();
    let mut problems = 0usize;

    for profile in &bundle.user_agents {
        let Profile::Custom(custom) = profile else {
            continue;
        };
        if profiles.contains(&custom.id) {
            println!("  skip    profile '{}' (id already present)", custom.id);
            continue;
        }
        if let Err(e) = profiles.add(custom.clone()) {
            println!("  invalid profile '{}': {}", custom.id, e);
            problems += 1;
        }
    }

    for spoof in &bundle.permanent_spoofs {
        if let Err(e) = spoofs.add(spoof.clone(), &profiles) {
            println!("  invalid spoof '{}': {}", spoof.domain, e);
            problems += 1;
        }
    }

    println!(
        "Checked {} profiles, {} spoofs: {} problems",
        bundle.user_agents.len(),
        bundle.permanent_spoofs.len(),
        problems
    );

    if problems > 0 {
        return Err(format!("{} invalid entries in '{}'", problems, path));
    }
    Ok(())
}
