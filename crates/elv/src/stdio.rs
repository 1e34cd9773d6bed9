//! JSON-lines bus over stdin/stdout.
//!
//! Lets a river process run as a plain filter: one message per input line,
//! one published message per output line. Handy for replaying a captured
//! topic locally or piping into a bus bridge.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};
use tokio::sync::Mutex;
use tracing::warn;

use crate::bus::{MessageBus, Subscription};
use crate::packet::Packet;

#[derive(Debug)]
pub struct StdioBus {
    stdout: Mutex<Stdout>,
}

impl StdioBus {
    pub fn new() -> Self {
        Self {
            stdout: Mutex::new(tokio::io::stdout()),
        }
    }

    pub fn subscribe(&self) -> StdinSubscription {
        StdinSubscription {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdioBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for StdioBus {
    async fn publish(&self, packet: &Packet) -> Result<()> {
        let mut line = packet.to_json();
        line.push('\n');

        // One write per message keeps lines whole under concurrent publishers.
        let mut stdout = self.stdout.lock().await;
        stdout
            .write_all(line.as_bytes())
            .await
            .context("writing message to stdout")?;
        stdout.flush().await.context("flushing stdout")?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct StdinSubscription {
    lines: Lines<BufReader<Stdin>>,
}

#[async_trait]
impl Subscription for StdinSubscription {
    async fn next_message(&mut self) -> Option<String> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return Some(line),
                Ok(None) => return None,
                Err(error) => {
                    warn!(%error, "could not read from stdin; closing subscription");
                    return None;
                }
            }
        }
    }
}
