use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use vinyl_dash::command::Confirmation;
use vinyl_dash::lyrics::ExternalOpener;
use vinyl_dash::state::{take_changes, StateEvent, StatsList};
use vinyl_dash::transport::HttpTransport;
use vinyl_dash::visibility::Visibility;
use vinyl_dash::{Dashboard, SyncError};
use vinyl_proto::config::Config;

#[derive(Parser, Debug)]
#[command(name = "vinyl-dash", version, about = "Console dashboard for the vinyl recognition server")]
struct Args {
    /// Server base URL, overrides the config file.
    #[arg(long)]
    base_url: Option<String>,

    /// Config file to use instead of the default location.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// No browser in a console; print the link instead.
struct PrintOpener;

impl ExternalOpener for PrintOpener {
    fn open(&self, url: &str) -> Result<(), SyncError> {
        println!("open: {}", url);
        Ok(())
    }
}

const HELP: &str = "\
commands:
  show | hide                     resume / pause polling
  brightness N | channel N        device controls
  reboot yes                      reboot the display
  discover                        find the display and save it to config
  recognizer on|off
  lyrics | lyrics-toggle
  likes | play ID                 liked GIFs
  stats | more songs|artists|albums
  config | save | reset yes       server configuration
  gallery | upload PATH | delete NAME yes
  fallback PATH                   use an uploaded image as fallback
  quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    std::fs::create_dir_all(vinyl_proto::platform::data_dir())?;
    let log_path = vinyl_proto::platform::log_path();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();
    eprintln!("vinyl-dash log: {}", log_path.display());

    let config_path = args.config.clone().unwrap_or_else(Config::config_path);
    let mut config = Config::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    info!("Config loaded from: {:?}", config_path);
    if let Some(base_url) = args.base_url {
        config.server.base_url = base_url;
    }

    let transport = HttpTransport::new(&config.server.base_url, config.server.request_timeout())?;
    info!("Server: {}", transport.base_url());
    let dashboard = Dashboard::new(&config, Arc::new(transport), Arc::new(PrintOpener));
    let mut changes = dashboard.store().subscribe();
    dashboard.start().await;

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            // Enter alone shows whatever the pollers brought in.
            redraw(&dashboard, &mut changes).await;
            continue;
        }
        if words[0] == "quit" || words[0] == "exit" {
            break;
        }
        match run_command(&dashboard, &words).await {
            Ok(()) => {}
            Err(e) => {
                warn!("Console: {:?} failed: {}", line, e);
                println!("error: {}", e);
            }
        }
        redraw(&dashboard, &mut changes).await;
    }

    dashboard.shutdown();
    info!("vinyl-dash exiting");
    Ok(())
}

async fn redraw(dashboard: &Dashboard, changes: &mut broadcast::Receiver<StateEvent>) {
    match take_changes(changes) {
        Some(rev) => {
            debug!("Console: redraw at rev {}", rev);
            println!("{}", dashboard.render().await);
        }
        None => println!("(no changes)"),
    }
}

fn confirmed(word: Option<&&str>) -> Confirmation {
    match word {
        Some(&"yes") => Confirmation::Granted,
        _ => Confirmation::Denied,
    }
}

async fn run_command(dashboard: &Dashboard, words: &[&str]) -> anyhow::Result<()> {
    match words {
        ["show"] => dashboard.set_visibility(Visibility::Visible).await,
        ["hide"] => dashboard.set_visibility(Visibility::Hidden).await,
        ["brightness", n] => dashboard.input_brightness(n.parse()?).await?,
        ["channel", n] => dashboard.input_channel(n.parse()?).await,
        ["reboot", rest @ ..] => {
            dashboard.reboot(confirmed(rest.first())).await?;
        }
        ["discover"] => {
            let report = dashboard.discover_device().await;
            if let Some((step, e)) = report.failed {
                println!("discovery stopped at {:?}: {}", step, e);
            }
        }
        ["recognizer", "on"] => dashboard.set_recognizer(true).await?,
        ["recognizer", "off"] => dashboard.set_recognizer(false).await?,
        ["lyrics"] => {
            dashboard.fetch_lyrics().await;
        }
        ["lyrics-toggle"] => {
            dashboard.toggle_lyrics().await;
        }
        ["likes"] => dashboard.load_liked_gifs().await?,
        ["play", id] => {
            dashboard.play_liked_gif(id).await?;
        }
        ["stats"] => dashboard.refresh_stats().await?,
        ["more", list] => {
            let which = match *list {
                "songs" => StatsList::Songs,
                "artists" => StatsList::Artists,
                "albums" => StatsList::Albums,
                other => anyhow::bail!("unknown list {:?}", other),
            };
            dashboard.toggle_stats(which).await;
        }
        ["config"] => {
            let document = dashboard.settings().load().await?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        ["save"] => dashboard.settings().save_loaded().await?,
        ["fallback", path] => {
            dashboard.settings().select_fallback_image(path).await?;
            dashboard.settings().save_loaded().await?;
        }
        ["reset", rest @ ..] => {
            dashboard.settings().reset(confirmed(rest.first())).await?;
        }
        ["gallery"] => {
            dashboard.settings().list_gallery().await?;
        }
        ["upload", path] => {
            let bytes = tokio::fs::read(path).await.with_context(|| format!("reading {}", path))?;
            let file_name = std::path::Path::new(path)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(*path);
            dashboard.settings().upload_image(file_name, bytes).await?;
        }
        ["delete", name, rest @ ..] => {
            dashboard.settings().delete_image(name, confirmed(rest.first())).await?;
        }
        _ => println!("{}", HELP),
    }
    Ok(())
}
