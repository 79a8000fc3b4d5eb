use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use opsdesk::cache::SqliteStorage;
use opsdesk::model::EntityKind;
use opsdesk::{Config, Console, FetchOptions};

#[derive(Parser, Debug)]
#[command(name = "opsdesk")]
#[command(about = "Read and write operations console data, online or from the local cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./opsdesk.yaml, then $XDG_CONFIG_HOME/opsdesk/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Also write daily-rolling log files to this directory
  #[arg(long)]
  log_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List the records of a collection
  Fetch {
    entity: EntityKind,
    #[arg(short, long)]
    tenant: Option<String>,
    /// Read the remote store only and fail instead of using the cache
    #[arg(long)]
    bypass_cache: bool,
  },
  /// Add or update a record given as a JSON object
  Put {
    entity: EntityKind,
    json: String,
    /// Replace an existing record instead of adding one
    #[arg(long)]
    update: bool,
  },
  /// Delete a record by id
  Delete { entity: EntityKind, id: String },
  /// Ping a user
  Ping {
    target: String,
    #[arg(long)]
    sender_id: String,
    #[arg(long)]
    sender_name: String,
    #[arg(short, long)]
    tenant: Option<String>,
    #[arg(long)]
    manual: bool,
  },
  /// Print pings addressed to a user as they arrive, acknowledging each
  WatchPings { user: String },
  /// Print the order list every time it changes
  WatchOrders {
    #[arg(short, long)]
    tenant: Option<String>,
  },
  /// Show the modules a role may open
  Permissions {
    role: String,
    #[arg(short, long)]
    tenant: Option<String>,
  },
  /// Manage master lists (brands, categories, units...)
  Master {
    #[command(subcommand)]
    action: MasterAction,
  },
}

#[derive(Subcommand, Debug)]
enum MasterAction {
  List {
    list_type: String,
    #[arg(short, long)]
    tenant: Option<String>,
  },
  Add {
    list_type: String,
    value: String,
    #[arg(short, long)]
    tenant: Option<String>,
  },
  Remove { list_type: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  let log_dir = args.log_dir.as_deref().or(config.logging.dir.as_deref());
  let _guard = init_logging(log_dir);

  let console = Console::open(&config)?;
  run(&console, args.command).await
}

/// Install the global subscriber. The returned guard flushes the file
/// writer on drop and must outlive `main`'s work.
fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
  let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("opsdesk=info"));
  let stderr = fmt::layer().with_writer(std::io::stderr).with_filter(filter());

  match log_dir {
    Some(dir) => {
      let appender = tracing_appender::rolling::daily(dir, "opsdesk.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      let file = fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(filter());
      tracing_subscriber::registry().with(stderr).with(file).init();
      Some(guard)
    }
    None => {
      tracing_subscriber::registry().with(stderr).init();
      None
    }
  }
}

async fn run(console: &Console<SqliteStorage>, command: Command) -> Result<()> {
  let sync = console.sync();

  match command {
    Command::Fetch {
      entity,
      tenant,
      bypass_cache,
    } => {
      let records: Vec<Value> = sync
        .fetch(
          entity.collection(),
          entity.cache_key(),
          FetchOptions {
            tenant: tenant.as_deref(),
            seed: &[],
            bypass_cache,
          },
        )
        .await?;
      print_json(&records)
    }
    Command::Put {
      entity,
      json,
      update,
    } => {
      let record: Value = serde_json::from_str(&json).wrap_err("record must be valid JSON")?;
      if !record.is_object() {
        return Err(eyre!("record must be a JSON object"));
      }
      let saved = sync
        .save(entity.collection(), entity.cache_key(), record, update)
        .await?;
      print_json(&saved)
    }
    Command::Delete { entity, id } => {
      sync
        .remove(entity.collection(), entity.cache_key(), &id)
        .await
    }
    Command::Ping {
      target,
      sender_id,
      sender_name,
      tenant,
      manual,
    } => {
      let ping = console
        .send_ping(&target, &sender_id, &sender_name, tenant.as_deref(), manual)
        .await
        .ok_or_else(|| eyre!("ping to {} was not delivered", target))?;
      print_json(&ping)
    }
    Command::WatchPings { user } => {
      if !sync.remote_available() {
        return Err(eyre!("pings need a configured remote store"));
      }
      let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
      let _subscription = console.subscribe_pings(&user, move |ping| {
        let _ = tx.send(ping);
      });

      loop {
        tokio::select! {
          ping = rx.recv() => {
            let Some(ping) = ping else { break };
            print_json(&ping)?;
            if let Some(id) = ping.id.as_deref() {
              console.ack_ping(id).await;
            }
          }
          _ = tokio::signal::ctrl_c() => break,
        }
      }
      Ok(())
    }
    Command::WatchOrders { tenant } => {
      let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
      let _subscription = console.listen_orders(tenant.as_deref(), move |orders| {
        let _ = tx.send(orders);
      });

      loop {
        tokio::select! {
          orders = rx.recv() => {
            let Some(orders) = orders else { break };
            print_json(&orders)?;
          }
          _ = tokio::signal::ctrl_c() => break,
        }
      }
      Ok(())
    }
    Command::Permissions { role, tenant } => {
      let modules = console.permissions_for(&role, tenant.as_deref()).await?;
      print_json(&modules)
    }
    Command::Master { action } => match action {
      MasterAction::List { list_type, tenant } => {
        let values = console
          .fetch_master_values(&list_type, tenant.as_deref())
          .await?;
        print_json(&values)
      }
      MasterAction::Add {
        list_type,
        value,
        tenant,
      } => {
        let record = console
          .add_master_value(&list_type, &value, tenant.as_deref())
          .await?;
        print_json(&record)
      }
      MasterAction::Remove { list_type, value } => {
        console.remove_master_value(&list_type, &value).await
      }
    },
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
