//! `murmur run`: the engine behind a console transport.
//!
//! Every stdin line becomes a private message from `user`; outbound
//! messages are printed to stdout.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use murmur::bus::{InboundMessage, OutboundKind, OutboundMessage};
use murmur::config::Config;
use murmur::providers::OpenAICompatProvider;
use murmur::utils::logging::init_logging;
use murmur::Engine;

pub(crate) async fn cmd_run(path: PathBuf, user: String) -> Result<()> {
    let config = Config::load_from_path(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    init_logging(&config.logging).context("Failed to initialize logging")?;

    let provider = OpenAICompatProvider::from_config(&config.provider)
        .context("Failed to create completion provider")?;
    let engine = Arc::new(
        Engine::builder(config, Arc::new(provider))
            .build()
            .context("Failed to build engine")?,
    );
    info!(user = %user, "Console transport ready");

    let runner = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.start().await }
    });

    let printer = tokio::spawn({
        let bus = Arc::clone(engine.bus());
        async move {
            while let Some(msg) = bus.consume_outbound().await {
                print_outbound(&msg);
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => {
                match line? {
                    Some(text) if text.trim().is_empty() => continue,
                    Some(text) => {
                        engine
                            .bus()
                            .publish_inbound(InboundMessage::private(&user, &text))
                            .await?;
                    }
                    None => break,
                }
            }
        }
    }

    engine.shutdown().await;
    match runner.await {
        Ok(Err(e)) => error!(error = %e, "Engine failed"),
        Err(e) => error!(error = %e, "Engine task panicked"),
        Ok(Ok(())) => {}
    }
    printer.abort();
    Ok(())
}

fn print_outbound(msg: &OutboundMessage) {
    let tag = match msg.kind {
        OutboundKind::Response => "",
        OutboundKind::Refusal => "[refused] ",
        OutboundKind::Busy => "[busy] ",
    };
    for text in &msg.texts {
        println!("{}{}", tag, text);
    }
    if let Some(sticker) = &msg.sticker {
        println!("[sticker: {}]", sticker);
    }
}
