//! Демонстрация шины kinbus.
//!
//! Создаёт несколько конечных точек, подписанных на один вид сообщения,
//! публикует серию сообщений и печатает статистику шины в JSON.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use anyhow::{Context, Result};
use clap::Parser;
use kinbus::{impl_message, init_logging, Bus, BusStats, Endpoint, Message, Settings};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "kinbus")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "kinbus - in-process publish/subscribe bus demo", long_about = None)]
struct Cli {
    /// Количество конечных точек-подписчиков
    #[arg(short, long, default_value_t = 3)]
    endpoints: usize,
    /// Количество публикуемых сообщений
    #[arg(short, long, default_value_t = 10)]
    messages: u64,
    /// Ёмкость почтового ящика (по умолчанию из конфигурации)
    #[arg(short, long)]
    capacity: Option<usize>,
    /// Путь к файлу конфигурации
    #[arg(long, env = "KINBUS_CONFIG")]
    config: Option<PathBuf>,
    /// Включить подробный вывод (debug)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug)]
struct Tick {
    seq: u64,
}
impl_message!(Tick, 1);

#[derive(Serialize)]
struct Report {
    stats: BusStats,
    received: Vec<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Settings::load().context("failed to load config")?,
    };
    if cli.verbose {
        settings.logging.level = "debug".to_string();
    }

    let logging = init_logging(&settings.logging).context("failed to initialise logging")?;

    let bus = Bus::with_config(settings.bus.clone());
    let capacity = cli
        .capacity
        .unwrap_or(settings.bus.default_mailbox_capacity);

    let mut consumers = Vec::with_capacity(cli.endpoints);
    let mut counters = Vec::with_capacity(cli.endpoints);
    for _ in 0..cli.endpoints {
        let endpoint = bus.new_endpoint(capacity).await?;
        let received = Arc::new(AtomicU64::new(0));
        subscribe_counter(&endpoint, &received).await?;

        counters.push(received);
        consumers.push(tokio::spawn(consume(endpoint, cli.messages)));
    }

    info!(
        endpoints = cli.endpoints,
        messages = cli.messages,
        capacity,
        "Publishing"
    );
    for seq in 0..cli.messages {
        let result = bus.publish(Tick { seq }).await?;
        debug!(seq, reached = result.subscribers_reached, "Published");
    }

    for consumer in consumers {
        consumer.await.context("consumer task failed")??;
    }
    bus.close().await?;

    let report = Report {
        stats: bus.stats(),
        received: counters
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    logging.shutdown();
    Ok(())
}

async fn subscribe_counter(
    endpoint: &Endpoint,
    received: &Arc<AtomicU64>,
) -> Result<()> {
    let received = received.clone();
    endpoint
        .subscribe(Tick { seq: 0 }.kind(), move |tick: &Tick| {
            received.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(seq = tick.seq, "Tick handled");
        })
        .await?;
    Ok(())
}

/// Обрабатывает ровно `expected` сообщений, затем закрывает конечную точку.
async fn consume(
    endpoint: Endpoint,
    expected: u64,
) -> Result<()> {
    for _ in 0..expected {
        if !endpoint.dispatch().await {
            break;
        }
    }
    endpoint.close().await?;
    Ok(())
}
