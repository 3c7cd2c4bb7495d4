//! `svt`: command-line client for the SVT inventory backend.
//!
//! Keeps its session and chat log in a local SQLite file, so a `login` in one
//! invocation is picked up by the next.
//!
//! # Usage
//!
//! ```
//! svt --base-url http://localhost:8000 login admin@svt.cl
//! svt whoami
//! svt can DELETE /users/3
//! svt products --search martillo
//! svt transfer --producto 4 --from 1 --to 2 --cantidad 5
//! svt chat send "¿Qué productos tienen stock bajo?"
//! ```

use std::{
  io::{self, BufRead, Write},
  path::{Path, PathBuf},
};

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use svt_client::{ApiRequest, AppContext, ClientConfig};
use svt_core::{
  endpoint::{Method, required_access},
  identity::Identity,
  model::{StockAdjustment, Transfer},
  query_key::Filters,
  route::guard,
};
use svt_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "svt", version, about = "Command-line client for the SVT inventory system")]
struct Cli {
  /// Path to a configuration file (TOML, YAML or JSON).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Backend base URL; overrides the configuration file.
  #[arg(long, env = "SVT_BASE_URL")]
  base_url: Option<String>,

  /// Where the session and chat log are kept.
  #[arg(long, default_value = "~/.local/share/svt/state.db")]
  state: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Sign in and keep the session for later invocations.
  Login {
    email:    String,
    /// Read from stdin when omitted.
    #[arg(long, env = "SVT_PASSWORD", hide_env_values = true)]
    password: Option<String>,
  },
  /// Create an account (does not sign in).
  Register {
    email:    String,
    #[arg(long, env = "SVT_PASSWORD", hide_env_values = true)]
    password: Option<String>,
  },
  /// Sign out and forget the persisted session.
  Logout,
  /// Print the signed-in identity and its capabilities.
  Whoami,
  /// Check whether the signed-in identity may issue a request.
  Can { method: String, path: String },
  /// Issue an arbitrary GET through the gateway.
  Get {
    path:  String,
    /// `key=value` query parameters.
    #[arg(short, long = "query", value_name = "KEY=VALUE")]
    query: Vec<String>,
  },
  /// List or search products.
  Products {
    #[arg(long)]
    search:    Option<String>,
    #[arg(long)]
    categoria: Option<String>,
  },
  /// Stock for one product across warehouses.
  Stock { producto_id: i64 },
  /// Adjust stock in one warehouse by a signed quantity.
  Adjust {
    #[arg(long)]
    producto: i64,
    #[arg(long)]
    bodega:   i64,
    #[arg(long, allow_hyphen_values = true)]
    cantidad: i64,
    #[arg(long, default_value = "ajuste manual")]
    motivo:   String,
  },
  /// Move stock from one warehouse to another.
  Transfer {
    #[arg(long)]
    producto:      i64,
    #[arg(long)]
    from:          i64,
    #[arg(long)]
    to:            i64,
    #[arg(long)]
    cantidad:      i64,
    #[arg(long)]
    observaciones: Option<String>,
  },
  /// Stock movement history, newest page first.
  Movements {
    #[arg(long)]
    producto: Option<i64>,
    #[arg(long)]
    bodega:   Option<i64>,
    #[arg(long, default_value_t = 1)]
    page:     u32,
    #[arg(long, default_value_t = 20)]
    size:     u32,
  },
  /// List warehouses.
  Warehouses {
    /// Include inactive warehouses.
    #[arg(long)]
    all: bool,
  },
  /// List or search product categories.
  Categories {
    #[arg(long)]
    search: Option<String>,
  },
  /// Talk to the inventory assistant.
  Chat {
    #[command(subcommand)]
    command: ChatCommand,
  },
  /// Decide whether a screen may be shown with the current session.
  Guard { path: String },
}

#[derive(Subcommand)]
enum ChatCommand {
  Send { message: String },
  History,
  Clear,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let mut config = ClientConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
  if let Some(base_url) = cli.base_url {
    config.base_url = base_url;
  }

  let state_path = expand_tilde(&cli.state);
  let store = SqliteStore::open(&state_path)
    .await
    .with_context(|| format!("failed to open state at {state_path:?}"))?;
  let context = AppContext::init(config, store)
    .await
    .context("failed to start client")?;

  run(&context, cli.command).await
}

async fn run(context: &AppContext<SqliteStore>, command: Command) -> Result<()> {
  match command {
    Command::Login { email, password } => {
      let password = password_or_stdin(password)?;
      let identity = context.session.login(&email, &password).await?;
      println!("signed in as {} ({})", identity.email, identity.role);
    }

    Command::Register { email, password } => {
      let password = password_or_stdin(password)?;
      let identity = context.session.register(&email, &password).await?;
      println!("registered {} ({})", identity.email, identity.role);
    }

    Command::Logout => {
      context.session.logout().await;
      println!("signed out");
    }

    Command::Whoami => {
      let Some(identity) = context.session.identity() else {
        bail!("not signed in");
      };
      print_json(&json!({
        "identity": identity,
        "role": role_label(&identity),
        "capabilities": context.session.capabilities(),
      }))?;
    }

    Command::Can { method, path } => {
      let method = Method::parse(&method)?;
      let allowed = context.gateway.can_make_request(&path, method);
      print_json(&json!({
        "method": method,
        "path": path,
        "access": format!("{:?}", required_access(&path, method)),
        "allowed": allowed,
      }))?;
    }

    Command::Get { path, query } => {
      let mut request = ApiRequest::get(path);
      for pair in query {
        let Some((key, value)) = pair.split_once('=') else {
          bail!("query parameter {pair:?} is not KEY=VALUE");
        };
        request = request.query(key, value);
      }
      let body: Value = context.gateway.json(request).await?;
      print_json(&body)?;
    }

    Command::Products { search, categoria } => {
      let products = match search {
        Some(query) => context.products().search(&query).await?,
        None => {
          let filters = Filters::new().set("categoria", categoria.unwrap_or_default());
          context.products().list(&filters).await?
        }
      };
      for product in products {
        let flag = if product.is_low_stock() { "  (stock bajo)" } else { "" };
        println!(
          "{:>5}  {:<12} {:<32} {:>6}{flag}",
          product.id, product.sku, product.nombre, product.stock_actual
        );
      }
    }

    Command::Stock { producto_id } => {
      let stock = context.inventory().stock(producto_id).await?;
      print_json(&serde_json::to_value(stock)?)?;
    }

    Command::Adjust { producto, bodega, cantidad, motivo } => {
      let adjustment = StockAdjustment { producto_id: producto, bodega_id: bodega, cantidad, motivo };
      let result = context.inventory().adjust(&adjustment).await?;
      print_json(&result)?;
    }

    Command::Transfer { producto, from, to, cantidad, observaciones } => {
      let transfer = Transfer {
        producto_id: producto,
        bodega_origen_id: from,
        bodega_destino_id: to,
        cantidad,
        observaciones,
      };
      print_json(&context.inventory().transfer(&transfer).await?)?;
    }

    Command::Movements { producto, bodega, page, size } => {
      let mut filters = Filters::new();
      if let Some(producto) = producto {
        filters = filters.set("producto_id", producto);
      }
      if let Some(bodega) = bodega {
        filters = filters.set("bodega_id", bodega);
      }
      for movement in context.inventory().movements_page(page, size, &filters).await? {
        println!(
          "{:>6}  {:<12} producto {:>5}  {:>+6}  {}",
          movement.id,
          movement.tipo_movimiento,
          movement.producto_id,
          movement.cantidad,
          movement.motivo.unwrap_or_default()
        );
      }
    }

    Command::Warehouses { all } => {
      for warehouse in context.warehouses().list(!all).await? {
        let state = if warehouse.activa { "" } else { "  (inactiva)" };
        println!(
          "{:>4}  {:<24} {}{state}",
          warehouse.id,
          warehouse.nombre,
          warehouse.ubicacion.unwrap_or_default()
        );
      }
    }

    Command::Categories { search } => {
      let categories = match search {
        Some(query) => context.categories().search(&query).await?,
        None => context.categories().list(&Filters::new()).await?,
      };
      for category in categories {
        println!("{:>4}  {}", category.id, category.nombre);
      }
    }

    Command::Chat { command } => chat(context, command).await?,

    Command::Guard { path } => {
      let has_token = context.session.credential().is_some();
      print_json(&serde_json::to_value(guard(&path, has_token))?)?;
    }
  }
  Ok(())
}

async fn chat(context: &AppContext<SqliteStore>, command: ChatCommand) -> Result<()> {
  let assistant = context.assistant();
  match command {
    ChatCommand::Send { message } => {
      assistant.initialize().await?;
      let before = context.chat.messages().len();
      assistant.send_message(&message).await?;
      for reply in context.chat.messages().iter().skip(before + 1) {
        println!("{}", reply.content);
      }
      context.chat.mark_read();
    }
    ChatCommand::History => {
      for message in context.chat.messages() {
        println!(
          "[{}] {}: {}",
          message.timestamp.format("%Y-%m-%d %H:%M"),
          message.sender,
          message.content
        );
      }
    }
    ChatCommand::Clear => {
      context.chat.clear().await?;
      println!("chat cleared");
    }
  }
  Ok(())
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn role_label(identity: &Identity) -> &'static str {
  if identity.is_admin() {
    "administrador"
  } else if identity.is_usuario() {
    "usuario"
  } else if identity.is_invitado() {
    "invitado"
  } else {
    "rol heredado sin permisos"
  }
}

fn print_json(value: &Value) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Use `password` if given, otherwise read one line from stdin.
fn password_or_stdin(password: Option<String>) -> Result<String> {
  if let Some(password) = password {
    return Ok(password);
  }
  eprint!("Password: ");
  io::stderr().flush().ok();
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
