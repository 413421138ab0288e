use anyhow::{Context, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use kvsink_core::domain::message::PROGRAM;
use kvsink_core::impls::MemoryStore;
use kvsink_core::{AckTracker, DriverBuilder, LogMessage, PathOptions, RedisDestConfig};

/// stdin の 1 行を LogMessage にする
/// - JSON object なら各フィールドを name/value として取り込む
/// - それ以外は行全体を MESSAGE、PROGRAM=kvsink
fn parse_line(line: &str) -> LogMessage {
    if let Ok(serde_json::Value::Object(fields)) = serde_json::from_str(line) {
        let mut msg = LogMessage::empty();
        for (name, value) in fields {
            match value {
                serde_json::Value::String(s) => msg.set_value(name, s),
                other => msg.set_value(name, other.to_string()),
            }
        }
        return msg;
    }
    LogMessage::new(line).with_value(PROGRAM, "kvsink")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kvsink=info,kvsink_core=info"));
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var_os("JSON_LOGS").is_some() {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = RedisDestConfig::from_env().context("reading KVSINK_* configuration")?;
    let mut builder = DriverBuilder::new(config);

    // (A) backend を選ぶ: redis（既定）か、プロセス内の memory
    let memory_store = match std::env::var("KVSINK_BACKEND").as_deref() {
        Err(_) | Ok("redis") => None,
        Ok("memory") => {
            let store = MemoryStore::new();
            let factory_store = store.clone();
            builder = builder.backend_factory(move || Box::new(factory_store.backend()));
            Some(store)
        }
        Ok(other) => bail!("unknown KVSINK_BACKEND {other:?} (expected redis or memory)"),
    };

    let mut driver = builder.build().context("building destination")?;
    driver.init()?;

    // (B) stdin を読み、flow control 付きで投入
    let tracker = AckTracker::new();
    let options = PathOptions::with_flow_control(tracker.clone());
    let handle = driver.handle();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut interrupted = false;
    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("reading stdin")? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => handle.queue(parse_line(&line), &options),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                break;
            }
        }
    }

    // (C) EOF なら配送完了（全 ack）を待つ。Ctrl-C で打ち切り
    if !interrupted {
        info!(pending = tracker.pending(), "stdin closed, waiting for delivery");
        tokio::select! {
            _ = tracker.wait_idle() => {}
            _ = tokio::signal::ctrl_c() => info!("interrupted while draining"),
        }
    }

    driver.deinit().await?;
    let stats = driver.stats();
    println!("{}", serde_json::to_string(&stats)?);

    if let Some(store) = memory_store {
        for (key, value) in store.entries() {
            info!(%key, %value, "stored");
        }
    }
    driver.free();
    Ok(())
}
