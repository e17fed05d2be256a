//! Routing Demo
//!
//! Wires a small routing tree and drives in-memory exchanges through it, the
//! way a transport would:
//!
//! ```text
//! ServiceManager(":path", "^/([a-z]+)")
//! ├── "api" ─▶ ServiceManager(":path", "^/([a-z]+)")
//! │            ├── "greet"  ─▶ Service(":method")  POST: json ▸ validate ▸ greet
//! │            └── "visits" ─▶ Service(":method")  GET: count per session
//! └── ""    ─▶ Service(":method")  file ▸ not found
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package routing-demo -- /index.html --root ./public
//! cargo run --package routing-demo -- /api/greet -X POST \
//!     -H content-type=application/json -d '{"name":"Ada"}'
//! cargo run --package routing-demo -- /api/visits --repeat 3
//! cargo run --package routing-demo -- /api/greet -X OPTIONS --cors
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::Parser;
use switchyard::prelude::*;
use switchyard::runtime::LoggingBuilder;
use tracing::{Level, info};

#[derive(Parser)]
#[command(name = "routing-demo")]
#[command(about = "Drive in-memory exchanges through a Switchyard routing tree", long_about = None)]
struct Cli {
    /// Request path, including the query string.
    path: String,

    /// Request method.
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Extra request header as `name=value`; repeatable.
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body.
    #[arg(short, long)]
    data: Option<String>,

    /// Directory served for paths no service claims.
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Configuration file; `switchyard.toml` in the current directory
    /// otherwise.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Answer cross-origin requests with the default settings.
    #[arg(long)]
    cors: bool,

    /// Number of exchanges to send on the same session.
    #[arg(long, default_value_t = 1)]
    repeat: u32,

    /// Log routing decisions.
    #[arg(short, long)]
    verbose: bool,
}

// ============================================================================
// Routing tree
// ============================================================================

/// Requires a non-empty `name` in the parsed JSON body.
struct RequireName;

#[async_trait]
impl Validator for RequireName {
    async fn validate(&self, _: &Headers, context: &StreamContext) -> ValidationResult {
        let name = context
            .get("body")
            .and_then(|body| body.get("name").cloned())
            .and_then(|name| name.as_str().map(str::to_string));

        match name {
            Some(name) if !name.trim().is_empty() => ValidationResult {
                error: None,
                value: Some(name.into()),
            },
            _ => ValidationResult::failed("body.name must be a non-empty string"),
        }
    }
}

async fn greet(inv: Invocation) -> Result<(), BoxError> {
    let name = inv
        .context
        .get("body")
        .and_then(|body| body.get("name").cloned())
        .unwrap_or_default();
    let greeting = format!("Hello, {}!", name.as_str().unwrap_or_default());
    let body = serde_json::to_vec(&json!({ "greeting": greeting }))?;

    inv.exchange.respond(
        ResponseHead::new(StatusCode::OK).header(names::CONTENT_TYPE, "application/json"),
        RespondOptions::KEEP_OPEN,
    )?;
    inv.exchange.write(body).await?;
    inv.exchange.end()?;
    Ok(())
}

async fn count_visits(inv: Invocation) -> Result<(), BoxError> {
    let visits = inv
        .context
        .session_data()
        .get("visits")
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
        + 1;
    inv.context.set("sessionData", json!({ "visits": visits }));

    inv.exchange.respond(
        ResponseHead::new(StatusCode::OK).header(names::CONTENT_TYPE, "text/plain"),
        RespondOptions::KEEP_OPEN,
    )?;
    inv.exchange.write(format!("visit #{visits}\n")).await?;
    inv.exchange.end()?;
    Ok(())
}

fn build_tree(root: PathBuf) -> Result<ServiceManager> {
    let api = ServiceManager::with_pattern(":path", "^/([a-z]+)")?
        .service(
            "greet",
            Service::new(":method")?
                .descriptor(
                    "POST",
                    Descriptor::new(greet)
                        .pre(json_pre())
                        .pre(validate_pre(RequireName)),
                )
                .on_error(general_error()),
        )
        .service(
            "visits",
            Service::new(":method")?.descriptor("GET", Descriptor::new(count_visits)),
        )
        .service("", Service::new(":method")?.post(not_found_post()));

    Ok(ServiceManager::with_pattern(":path", "^/([a-z]+)")?
        .sub_manager("api", api)
        .service(
            "",
            Service::new(":method")?
                .post(file_post(root))
                .post(not_found_post())
                .on_error(general_error()),
        ))
}

// ============================================================================
// Main
// ============================================================================

fn request_headers(cli: &Cli) -> Result<Headers> {
    let mut headers = Headers::from([
        (":method", cli.method.as_str()),
        (":path", cli.path.as_str()),
    ]);
    for header in &cli.headers {
        let Some((name, value)) = header.split_once('=') else {
            bail!("invalid header {header:?}, expected name=value");
        };
        headers.insert(name.trim(), value.trim());
    }
    Ok(headers)
}

fn print_exchange(n: u32, stream: &MemoryExchange) {
    println!("── exchange {n} ──");
    match stream.response() {
        Some(head) => {
            println!("{}", head.status);
            for (name, value) in head.headers.iter() {
                println!("{name}: {value}");
            }
        }
        None => println!("(no response)"),
    }
    for alt_svc in stream.alt_svc() {
        println!("[altsvc] {alt_svc}");
    }
    let body = stream.body();
    if !body.is_empty() {
        println!();
        println!("{}", String::from_utf8_lossy(&body));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging before the server so the verbose level wins
    if cli.verbose {
        LoggingBuilder::new()
            .with_level(Level::DEBUG)
            .directive("switchyard_framework=trace")
            .init();
    }

    let mut builder = Server::builder();
    if let Some(path) = &cli.config {
        builder = builder.config_file(path);
    }
    let mut tree = build_tree(cli.root.clone())?;
    if cli.cors {
        tree.enable_cors(CorsConfig::default());
    }
    let server = builder.build(tree).context("failed to build server")?;

    let headers = request_headers(&cli)?;
    let session = server.on_session_open(ContextData::new());
    info!(session = session.id(), "Session opened");

    for n in 1..=cli.repeat {
        let stream = match &cli.data {
            Some(data) => MemoryExchange::with_body(n, [data.clone()]),
            None => MemoryExchange::new(n),
        };
        server
            .spawn_exchange(stream.clone(), headers.clone(), 0, &session)
            .await
            .context("exchange task panicked")?;
        print_exchange(n, &stream);
    }

    server.on_session_close(&session);
    info!(stats = ?server.stats(), "Done");
    Ok(())
}
