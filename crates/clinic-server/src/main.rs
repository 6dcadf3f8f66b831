//! clinic-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered with
//! `CLINIC_*` environment variables, opens the SQLite store, wires the
//! provider clients into the inbound pipeline and serves HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `admin_password_hash`:
//!
//! ```text
//! cargo run -p clinic-server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use clinic_channels::HttpChannelSender;
use clinic_pipeline::{
  Collaborators, InboundProcessor,
  escalation::spawn_notification_worker,
  events::EventBus,
  providers::{DeepLTranslator, OpenAiClient, WebhookNotifier},
};
use clinic_server::{AppState, ServerConfig, auth::AuthConfig};
use clinic_store_sqlite::SqliteStore;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Clinic customer-service server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

const NOTIFICATION_QUEUE: usize = 64;
const EVENT_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("CLINIC").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = Arc::new(
    SqliteStore::open(&store_path)
      .await
      .with_context(|| format!("failed to open store at {store_path:?}"))?,
  );

  // Provider clients.
  let timeout = server_cfg.provider_timeout();
  let translator = DeepLTranslator::new(server_cfg.deepl(), timeout)
    .context("failed to build translation client")?;
  let llm = Arc::new(
    OpenAiClient::new(server_cfg.openai(), timeout).context("failed to build LLM client")?,
  );
  let sender = HttpChannelSender::new(timeout).context("failed to build channel sender")?;

  let notifications = match &server_cfg.notify_webhook_url {
    Some(url) => {
      let notifier = WebhookNotifier::new(url.as_str(), timeout)
        .context("failed to build notification client")?;
      let (tx, _worker) = spawn_notification_worker(Arc::new(notifier), NOTIFICATION_QUEUE);
      Some(tx)
    }
    None => {
      tracing::warn!("notify_webhook_url not set; escalations will not be notified");
      None
    }
  };

  let events = EventBus::new(EVENT_CAPACITY);
  let mut event_rx = events.subscribe();
  tokio::spawn(async move {
    loop {
      match event_rx.recv().await {
        Ok(event) => tracing::debug!(?event, "pipeline event"),
        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
          tracing::warn!(skipped = n, "event log lagging");
        }
        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
      }
    }
  });

  let processor = InboundProcessor::new(
    store.clone(),
    Collaborators {
      translator: Arc::new(translator),
      embedder: llm.clone(),
      generator: llm,
      locks: store.clone(),
      cache: Some(store.clone()),
      sender: Arc::new(sender),
      events: Arc::new(events),
      notifications,
    },
    server_cfg.pipeline_config(),
  );

  let state = AppState {
    store,
    processor: Arc::new(processor),
    auth: Arc::new(AuthConfig {
      username:      server_cfg.admin_username.clone(),
      password_hash: server_cfg.admin_password_hash.clone(),
    }),
    config: Arc::new(server_cfg.clone()),
  };

  let app = clinic_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
