//! Gridshare - terminal client for collaborative spreadsheets

mod live;
mod tui;

use std::env;
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use directories::ProjectDirs;
use gridshare_core::config::load_config;
use gridshare_core::{Backend, Config, HttpBackend, MemoryBackend, OpenOptions, Session};
use gridshare_model::model::{SpreadsheetId, User};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use live::SocketTransport;

fn print_usage() {
    eprintln!("Usage: gridshare [OPTIONS] [SPREADSHEET_ID]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  [SPREADSHEET_ID]          Spreadsheet to open");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --api <URL>               REST API base (default: http://localhost:8000/api)");
    eprintln!("  --ws <URL>                WebSocket origin (default: derived from --api)");
    eprintln!("  --token <TOKEN>           Bearer token");
    eprintln!("  --sheet <NAME|ID>         Sheet to show first");
    eprintln!("  --offline                 Edit an in-memory spreadsheet, no server");
    eprintln!("  --list                    List your spreadsheets and exit");
    eprintln!("  --config <PATH>           Load settings from this TOML file");
    eprintln!("  -h, --help                Print help");
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    spreadsheet: Option<SpreadsheetId>,
    api: Option<String>,
    ws: Option<String>,
    token: Option<String>,
    sheet: Option<String>,
    config: Option<PathBuf>,
    offline: bool,
    list: bool,
    help: bool,
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let mut value = |name: &str| -> Result<String, String> {
            i += 1;
            args.get(i)
                .cloned()
                .ok_or_else(|| format!("{name} requires a value"))
        };
        match flag {
            "-h" | "--help" => parsed.help = true,
            "--api" => parsed.api = Some(value("--api")?),
            "--ws" => parsed.ws = Some(value("--ws")?),
            "--token" => parsed.token = Some(value("--token")?),
            "--sheet" => parsed.sheet = Some(value("--sheet")?),
            "--config" => parsed.config = Some(PathBuf::from(value("--config")?)),
            "--offline" => parsed.offline = true,
            "--list" => parsed.list = true,
            arg if arg.starts_with('-') => return Err(format!("Unknown option: {arg}")),
            arg => {
                if parsed.spreadsheet.is_some() {
                    return Err(format!("Unexpected argument: {arg}"));
                }
                let id = arg
                    .parse()
                    .map_err(|_| format!("Invalid spreadsheet id: {arg}"))?;
                parsed.spreadsheet = Some(id);
            }
        }
        i += 1;
    }
    Ok(parsed)
}

/// Command line flags win over the config file.
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(api) = &args.api {
        config.api_base = api.clone();
    }
    if let Some(ws) = &args.ws {
        config.ws_base = Some(ws.clone());
    }
    if let Some(token) = &args.token {
        config.token = Some(token.clone());
    }
}

/// Log to a file in the data directory; the terminal belongs to the UI.
fn init_logging() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "gridshare")?;
    let dir = proj.data_local_dir();
    fs::create_dir_all(dir).ok()?;
    let path = dir.join("gridshare.log");
    let file = File::create(&path).ok()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gridshare=info,gridshare_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .ok()?;
    Some(path)
}

fn offline_user(config: &Config) -> User {
    User {
        id: config.user_id.unwrap_or(1),
        username: config.username.clone().unwrap_or_else(|| "me".to_string()),
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    if let Some(path) = init_logging() {
        eprintln!("Logging to {}", path.display());
    }

    let (mut config, warnings) = load_config(args.config.as_deref());
    for warning in warnings {
        warn!(%warning, "config");
        eprintln!("Warning: {}", warning);
    }
    apply_overrides(&mut config, &args);

    let (backend, spreadsheet_id): (Box<dyn Backend>, Option<SpreadsheetId>) = if args.offline {
        let memory = MemoryBackend::new(offline_user(&config));
        let spreadsheet = memory.create_spreadsheet("Untitled")?;
        (Box::new(memory), Some(spreadsheet.id))
    } else {
        let http = HttpBackend::new(&config.api_base, config.token.clone())
            .with_context(|| format!("invalid API base {}", config.api_base))?;
        (Box::new(http), args.spreadsheet)
    };

    if args.list {
        for spreadsheet in backend.list_spreadsheets()? {
            println!(
                "{:>6}  {}  ({})",
                spreadsheet.id,
                spreadsheet.name,
                spreadsheet.owner_username.as_deref().unwrap_or("?")
            );
        }
        return Ok(());
    }

    let spreadsheet_id =
        spreadsheet_id.context("no spreadsheet id given (use --list to see yours)")?;
    let (transport, live_events) = SocketTransport::new();
    let options = OpenOptions {
        sheet: args.sheet.clone(),
        live: !args.offline,
    };
    let session = Session::open(backend, Box::new(transport), spreadsheet_id, &config, &options)
        .with_context(|| format!("could not open spreadsheet {spreadsheet_id}"))?;
    info!(spreadsheet_id, offline = args.offline, "starting terminal client");

    let mut app = tui::App::new(session);
    tui::run(&mut app, &live_events)
}

fn main() {
    let argv: Vec<String> = env::args().skip(1).collect();
    let args = match parse_args(&argv) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("Error: {}", message);
            print_usage();
            std::process::exit(1);
        }
    };
    if args.help {
        print_usage();
        return;
    }

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
