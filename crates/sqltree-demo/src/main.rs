//! sqltree demo - runs a scripted service/statement workload through the
//! correlation engine and prints the resulting call trees and statistics.

use anyhow::Result;
use clap::Parser;
use sqltree_core::{CallTreeTracker, ExecutionContext, StatementKind, TraceSettings, TraceSink};
use sqltree_export::{JsonlSink, JsonlSinkConfig, MemorySink};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqltree-demo")]
#[command(version)]
#[command(about = "Call-tree correlation demo", long_about = None)]
struct Cli {
    /// Write completed executions to a JSONL file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Slow-statement threshold in milliseconds
    #[arg(long, default_value_t = 20)]
    slow_threshold_ms: u64,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let settings = TraceSettings {
        slow_threshold_ms: cli.slow_threshold_ms,
        ..TraceSettings::default()
    };

    let memory: Option<Arc<MemorySink>>;
    let sink: Arc<dyn TraceSink> = match &cli.output {
        Some(path) => {
            memory = None;
            Arc::new(JsonlSink::new(JsonlSinkConfig {
                path: path.clone(),
                pretty: cli.pretty,
                ..JsonlSinkConfig::default()
            })?)
        }
        None => {
            let sink = Arc::new(MemorySink::default());
            memory = Some(Arc::clone(&sink));
            sink
        }
    };

    let tracker = CallTreeTracker::new(&settings, sink);

    let mut ctx = tracker.new_context();
    get_user_with_orders(&tracker, &mut ctx, 42);
    create_order(&tracker, &mut ctx, 42);

    if let Some(memory) = memory {
        for record in memory.executions() {
            let json = if cli.pretty {
                serde_json::to_string_pretty(&record)?
            } else {
                serde_json::to_string(&record)?
            };
            println!("{json}");
        }
    } else if let Some(path) = &cli.output {
        info!("executions written to {:?}", path);
    }

    let stats = serde_json::to_string_pretty(&tracker.statistics().snapshot())?;
    eprintln!("{stats}");
    Ok(())
}

/// User lookup that fans out into the order service
fn get_user_with_orders(tracker: &CallTreeTracker, ctx: &mut ExecutionContext, user_id: u64) {
    let svc = tracker.enter_service(ctx, "UserService", "getUserWithOrders");

    let stmt = tracker.enter_statement(
        ctx,
        "SELECT id, name FROM users WHERE id = ?",
        StatementKind::Select,
    );
    tracker.record_statement_parameters(ctx, stmt.as_ref(), vec![serde_json::json!(user_id)]);
    simulate_db(3);
    tracker.exit_statement(ctx, stmt, 1, None);

    list_orders(tracker, ctx, user_id);

    tracker.exit_service(ctx, svc);
}

fn list_orders(tracker: &CallTreeTracker, ctx: &mut ExecutionContext, user_id: u64) {
    let svc = tracker.enter_service(ctx, "OrderService", "listOrdersByUser");

    let orders = tracker.enter_statement(
        ctx,
        &format!("SELECT * FROM orders WHERE user_id = {user_id}"),
        StatementKind::Select,
    );
    simulate_db(8);

    // Item lookup nested inside the order scan
    let items = tracker.enter_statement(
        ctx,
        "SELECT * FROM order_items WHERE order_id IN (1, 2, 3)",
        StatementKind::Select,
    );
    simulate_db(25);
    tracker.exit_statement(ctx, items, 7, None);
    tracker.exit_statement(ctx, orders, 3, None);

    tracker.exit_service(ctx, svc);
}

/// Order creation with a failing audit update
fn create_order(tracker: &CallTreeTracker, ctx: &mut ExecutionContext, user_id: u64) {
    let svc = tracker.enter_service(ctx, "OrderService", "createOrder");

    let insert = tracker.enter_statement(
        ctx,
        &format!("INSERT INTO orders (user_id, total) VALUES ({user_id}, 99)"),
        StatementKind::Insert,
    );
    simulate_db(4);
    tracker.exit_statement(ctx, insert, 1, None);

    let touch = tracker.enter_service(ctx, "UserService", "touchUser");
    let update = tracker.enter_statement(
        ctx,
        &format!("UPDATE users SET updated_at = now() WHERE id = {user_id}"),
        StatementKind::Update,
    );
    simulate_db(2);
    tracker.exit_statement(ctx, update, 0, Some("lock wait timeout"));
    tracker.exit_service(ctx, touch);

    tracker.exit_service(ctx, svc);
}

fn simulate_db(millis: u64) {
    std::thread::sleep(Duration::from_millis(millis));
}
