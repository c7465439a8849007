use clap::{Args as ClapArgs, Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use pdcs::api::{ApiClient, FilePart, LoggingInterceptor, QueryParams, RequestOptions, ResponseEnvelope};
use pdcs::config::Config;
use pdcs::db::{DatabaseSession, TableDump};
use pdcs::storage::FileStore;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "pdcs")]
#[command(about = "Call a JSON HTTP API with caching and retries, or work with the local SQLite store")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/pdcs/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// API base URL (overrides config and PDCS_API_BASE_URL)
  #[arg(long)]
  base_url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// GET a path
  Get {
    path: String,
    /// Query parameter as key=value (repeatable)
    #[arg(short, long = "param", value_parser = parse_key_value)]
    params: Vec<(String, String)>,
    /// Serve from / store into the response cache
    #[arg(long)]
    cache: bool,
  },
  /// POST a JSON body
  Post(BodyArgs),
  /// PUT a JSON body
  Put(BodyArgs),
  /// PATCH a JSON body
  Patch(BodyArgs),
  /// DELETE a path
  Delete { path: String },
  /// Upload a file as multipart form data
  Upload { path: String, file: PathBuf },
  /// Local database commands
  #[command(subcommand)]
  Db(DbCommand),
}

#[derive(ClapArgs, Debug)]
struct BodyArgs {
  path: String,
  /// JSON request body
  #[arg(short, long)]
  data: Option<String>,
}

#[derive(Subcommand, Debug)]
enum DbCommand {
  /// Run a read-only statement and print its rows
  Query { sql: String, params: Vec<String> },
  /// Run a mutating statement
  Run { sql: String, params: Vec<String> },
  /// List tables
  Tables,
  /// Dump every table as JSON (to stdout when no file is given)
  Export { file: Option<PathBuf> },
  /// Replace table contents from a JSON dump
  Import { file: PathBuf },
  /// Delete all rows from every table
  Clear,
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
  s.split_once('=')
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

/// Statement parameters are JSON when they parse as JSON, text otherwise.
fn parse_param(raw: &str) -> Value {
  serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_body(data: Option<&str>) -> Result<Option<Value>> {
  data
    .map(|d| serde_json::from_str(d).map_err(|e| eyre!("Invalid JSON body: {}", e)))
    .transpose()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let _log_guard = pdcs::logging::init()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;
  if let Some(url) = args.base_url {
    config.api.base_url = url;
  }

  run(&config, args.command).await
}

async fn run(config: &Config, command: Command) -> Result<()> {
  // SQLite work and fsync'd snapshot writes stay off the async workers.
  let command = match command {
    Command::Db(cmd) => {
      let config = config.clone();
      return tokio::task::spawn_blocking(move || run_db(&config, cmd))
        .await
        .map_err(|e| eyre!("Database task failed: {}", e))?;
    }
    other => other,
  };

  let client = ApiClient::builder(config.api.base_url.clone())
    .headers(config.api.default_headers())
    .options(config.api.client_options())
    .interceptor(Arc::new(LoggingInterceptor))
    .build();
  if let Some(token) = &config.api_token {
    client.set_auth_token(token);
  }

  let response: ResponseEnvelope = match command {
    Command::Get {
      path,
      params,
      cache,
    } => {
      let query: QueryParams = params.into_iter().collect();
      client
        .get(&path, query, RequestOptions::new().cache(cache))
        .await
    }
    Command::Post(b) => {
      let body = parse_body(b.data.as_deref())?;
      client.post(&b.path, body, RequestOptions::new()).await
    }
    Command::Put(b) => {
      let body = parse_body(b.data.as_deref())?;
      client.put(&b.path, body, RequestOptions::new()).await
    }
    Command::Patch(b) => {
      let body = parse_body(b.data.as_deref())?;
      client.patch(&b.path, body, RequestOptions::new()).await
    }
    Command::Delete { path } => client.delete(&path, RequestOptions::new()).await,
    Command::Upload { path, file } => {
      let bytes = std::fs::read(&file)
        .map_err(|e| eyre!("Failed to read {}: {}", file.display(), e))?;
      let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();
      client
        .upload(&path, FilePart::new(name, bytes), RequestOptions::new())
        .await
    }
    Command::Db(_) => return Err(eyre!("Database commands are handled above")),
  }
  .map_err(|e| eyre!("Request failed: {}", e))?;

  print_json(&response)
}

fn run_db(config: &Config, command: DbCommand) -> Result<()> {
  let dir = config.database.storage_dir()?;
  let store = FileStore::open(&dir)
    .map_err(|e| eyre!("Failed to open storage at {}: {}", dir.display(), e))?;
  let session = DatabaseSession::new(Arc::new(store));
  session
    .initialize()
    .map_err(|e| eyre!("Failed to initialize database: {}", e))?;

  match command {
    DbCommand::Query { sql, params } => {
      let params: Vec<Value> = params.iter().map(|p| parse_param(p)).collect();
      print_json(&session.query(&sql, &params)?)?;
    }
    DbCommand::Run { sql, params } => {
      let params: Vec<Value> = params.iter().map(|p| parse_param(p)).collect();
      print_json(&session.run(&sql, &params)?)?;
    }
    DbCommand::Tables => {
      for table in session.tables()? {
        println!("{}", table);
      }
    }
    DbCommand::Export { file } => {
      let dump = session.export_to_json()?;
      match file {
        Some(path) => {
          let contents = serde_json::to_string_pretty(&dump)?;
          std::fs::write(&path, contents)
            .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
        }
        None => print_json(&dump)?,
      }
    }
    DbCommand::Import { file } => {
      let contents = std::fs::read_to_string(&file)
        .map_err(|e| eyre!("Failed to read {}: {}", file.display(), e))?;
      let dump: TableDump = serde_json::from_str(&contents)
        .map_err(|e| eyre!("Invalid dump {}: {}", file.display(), e))?;
      session.import_from_json(&dump)?;
    }
    DbCommand::Clear => session.clear_database()?,
  }

  session.close()?;
  Ok(())
}
