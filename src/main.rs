use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::sync::Arc;
use tracing::info;

use piptube::app::App;
use piptube::config::{Config, Paths};
use piptube::controller::Card;
use piptube::item::{ChannelItem, LocalNode, YOUTUBE_SERVICE_ID};
use piptube::logging;
use piptube::source::Extractor;
use piptube::subscription::ChannelIdentifier;
use piptube::transport::{Downloader, HttpDownloader};
use piptube::youtube::{YtDlp, detect_channel_url};

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Search videos and list the results
  Search {
    query: Vec<String>,
    /// Number of result windows to load
    #[arg(short, long, default_value_t = 1)]
    pages: usize,
  },
  /// List a channel's uploads ('@handle' or channel URL)
  Channel {
    channel: String,
    #[arg(short, long, default_value_t = 1)]
    pages: usize,
  },
  /// Play a video and list related items
  Play { url: String },
  /// Manage subscribed channels
  Subscriptions {
    #[command(subcommand)]
    action: SubscriptionAction,
  },
  /// Show the subscription feed
  Feed {
    /// Refresh even if the last refresh is within the cooldown
    #[arg(long)]
    refresh: bool,
  },
  /// Show preferences, or change and save the given ones
  Config {
    /// Player executable used for playback
    #[arg(long)]
    player: Option<String>,
    #[arg(long)]
    refresh_cooldown_minutes: Option<u64>,
    #[arg(long)]
    cache_max_megabytes: Option<u64>,
    #[arg(long)]
    search_page_size: Option<usize>,
  },
  /// Print shell completions
  Completions { shell: Shell },
}

#[derive(Subcommand, Debug)]
enum SubscriptionAction {
  List,
  /// Subscribe to or unsubscribe from a channel URL
  Toggle { channel: String },
  /// Import a NewPipe subscription export (file path or URL)
  Import { location: String },
}

// --- Output ---

fn card_line(card: &Card) -> String {
  match card {
    Card::Video(s) => {
      let mut line = s.name.clone();
      if let Some(uploader) = &s.uploader_name {
        line.push_str(&format!("  [{uploader}]"));
      }
      if let Some(duration) = &s.duration {
        line.push_str(&format!("  {duration}"));
      }
      if let Some(date) = s.upload_date {
        line.push_str(&format!("  {}", date.format("%Y-%m-%d")));
      }
      format!("{line}\n      {}", s.url)
    }
    Card::Channel(c) => format!("[channel] {}\n      {}", c.name, c.url),
    Card::Comment(c) => format!("{}: {}", c.author, c.text),
    Card::Node(LocalNode::SubscriptionUpdate) => "Update subscriptions (piptube feed --refresh)".into(),
    Card::Node(LocalNode::ImportSubscription) => "Import NewPipe subscriptions".into(),
    Card::Node(LocalNode::Info(text)) => text.clone(),
    Card::Error(msg) => format!("error: {msg}"),
  }
}

fn print_cards(app: &App) {
  if let Some(tab) = app.list.selected_tab() {
    println!("== {} ==", tab.identifier());
  }
  for (i, card) in app.list.cards().iter().enumerate() {
    println!("{:>3}. {}", i + 1, card_line(card));
  }
  if let Some(msg) = &app.status_message {
    println!("{msg}");
  }
}

/// Settles the first window, then scrolls to the bottom to pull `pages - 1` more.
async fn load_pages(app: &mut App, pages: usize) -> Result<()> {
  app.settle().await?;
  for _ in 1..pages {
    if !app.list.has_more() {
      break;
    }
    app.list.scroll_list(f64::MAX);
    app.settle().await?;
  }
  Ok(())
}

fn update_config(
  config: &mut Config,
  player: Option<String>,
  refresh_cooldown_minutes: Option<u64>,
  cache_max_megabytes: Option<u64>,
  search_page_size: Option<usize>,
) -> Result<()> {
  let changed = player.is_some()
    || refresh_cooldown_minutes.is_some()
    || cache_max_megabytes.is_some()
    || search_page_size.is_some();
  config.player = player.or(config.player.take());
  config.refresh_cooldown_minutes = refresh_cooldown_minutes.or(config.refresh_cooldown_minutes);
  config.cache_max_megabytes = cache_max_megabytes.or(config.cache_max_megabytes);
  config.search_page_size = search_page_size.or(config.search_page_size);

  if changed {
    let path = config.save()?;
    println!("Saved {}", path.display());
  }
  println!("player = {}", config.player());
  println!("refresh_cooldown = {} min", config.refresh_cooldown().as_secs() / 60);
  println!("cache_max = {} MiB", config.cache_max_bytes() / (1024 * 1024));
  println!("search_page_size = {}", config.search_page_size());
  Ok(())
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();

  if let Command::Completions { shell } = args.command {
    clap_complete::generate(shell, &mut Args::command(), env!("CARGO_PKG_NAME"), &mut std::io::stdout());
    return Ok(());
  }

  let paths = Paths::discover();
  let _guard = logging::init(&paths.log_dir)?;
  let mut config = Config::load();
  info!(?config, "main: starting");

  let command = match args.command {
    Command::Config { player, refresh_cooldown_minutes, cache_max_megabytes, search_page_size } => {
      return update_config(&mut config, player, refresh_cooldown_minutes, cache_max_megabytes, search_page_size);
    }
    command => command,
  };

  let extractor: Arc<dyn Extractor> = Arc::new(YtDlp::new(config.search_page_size()));
  let downloader: Arc<dyn Downloader> = Arc::new(HttpDownloader::new().context("Failed to build HTTP client")?);
  let mut app = App::new(&config, &paths, extractor, downloader).await?;

  let result = run(&mut app, command).await;
  app.shutdown().await?;
  result
}

async fn run(app: &mut App, command: Command) -> Result<()> {
  match command {
    Command::Search { query, pages } => {
      app.open_search(&query.join(" "));
      load_pages(app, pages).await?;
      print_cards(app);
    }
    Command::Channel { channel, pages } => {
      let url = detect_channel_url(&channel).with_context(|| format!("Not a channel URL or @handle: {channel}"))?;
      app.open_channel(ChannelItem { service_id: YOUTUBE_SERVICE_ID, url, name: channel, description: None });
      load_pages(app, pages).await?;
      print_cards(app);
    }
    Command::Play { url } => {
      app.open_video(&url);
      app.settle().await?;
      print_cards(app);
      if let Some(msg) = &app.last_error {
        anyhow::bail!("{msg}");
      }
      if let Some(locator) = app.player.locator() {
        println!("Playing {locator}");
        app.player.wait().await?;
      }
    }
    Command::Subscriptions { action } => match action {
      SubscriptionAction::List => {
        for channel in app.subscriptions.channels().await {
          println!("{}\t{}", channel.service_id, channel.url);
        }
      }
      SubscriptionAction::Toggle { channel } => {
        let id = ChannelIdentifier::new(YOUTUBE_SERVICE_ID, channel.trim());
        if app.toggle_subscription(&id).await {
          println!("Subscribed to {}", id.url);
        } else {
          println!("Unsubscribed from {}", id.url);
        }
      }
      SubscriptionAction::Import { location } => {
        let added = app.import_subscriptions(&location).await?;
        println!("Imported {added} new channel(s)");
      }
    },
    Command::Feed { refresh } => {
      app.open_subscriptions(refresh);
      app.settle().await?;
      if let Some(updated) = app.feed.last_updated().await {
        println!("Last updated {}", updated.format("%Y-%m-%d %H:%M UTC"));
      }
      print_cards(app);
    }
    Command::Config { .. } | Command::Completions { .. } => {}
  }
  Ok(())
}
