//! acre-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! farm store, spawns the provisioning job loop, and serves the REST API.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for a `[[users]]` entry in config.toml:
//!
//! ```
//! cargo run -p acre-server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use acre_api::{AppState, AuthConfig, AuthUser};
use acre_core::event::{EventSink, Notifier};
use acre_store_sqlite::{SqliteProvisioner, SqliteStore};
use acre_workflow::{
  JobRunner, RequestWorkflow, WikiCache,
  notify::{TracingNotifier, TracingSink},
};
use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use rand_core::OsRng;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Runtime server configuration, deserialised from `config.toml` with
/// `ACRE_*` environment overrides.
#[derive(Deserialize, Clone)]
struct ServerConfig {
  host:       String,
  port:       u16,
  /// Path to the farm's own SQLite database.
  store_path: PathBuf,
  /// Directory holding per-tenant SQLite databases.
  data_dir:   PathBuf,
  /// Directory holding per-wiki cache snapshot files.
  cache_dir:  PathBuf,
  /// Seconds between job-outbox polls.
  #[serde(default = "default_job_interval")]
  job_interval_secs: u64,
  #[serde(default)]
  users:      Vec<AuthUser>,
}

fn default_job_interval() -> u64 { 15 }

#[derive(Parser)]
#[command(author, version, about = "Acre wiki-farm server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

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

  // Helper mode: hash a password and exit.
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
    .add_source(config::Environment::with_prefix("ACRE"))
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

  let cache = Arc::new(WikiCache::new(expand_tilde(&server_cfg.cache_dir)));
  let sink: Arc<dyn EventSink> = Arc::new(TracingSink);
  let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
  let workflow = RequestWorkflow::new(Arc::clone(&store), notifier);
  let provisioner =
    Arc::new(SqliteProvisioner::new(expand_tilde(&server_cfg.data_dir)));

  // The job loop owns its own handles; the request path only writes to the
  // outbox.
  let runner = JobRunner::new(
    Arc::clone(&store),
    provisioner,
    workflow.clone(),
    Arc::clone(&cache),
    Arc::clone(&sink),
  );
  tokio::spawn(
    runner.run_loop(Duration::from_secs(server_cfg.job_interval_secs)),
  );

  let state = AppState {
    workflow,
    auth: Arc::new(AuthConfig { users: server_cfg.users.clone() }),
  };
  let app = acre_api::api_router(state).layer(TraceLayer::new_for_http());

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
  let stdin = io::stdin();
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  stdin.lock().read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_string(),
  )
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
