//! Out-of-process engine bridge.
//!
//! Events are written one JSON object per line; commands are read the same
//! way. Malformed command lines are logged and skipped.

use async_trait::async_trait;
use switchboard_core::codec;
use switchboard_core::{Engine, EnginePorts};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tracing::{info, warn};

/// Bridges the relay to an external program over a line-oriented pipe.
pub struct StdioEngine<R, W> {
    input: R,
    output: W,
}

impl StdioEngine<Stdin, Stdout> {
    /// Bridge over the process's own stdin and stdout.
    pub fn stdio() -> Self {
        Self::with_io(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> StdioEngine<R, W> {
    /// Bridge over an arbitrary reader and writer.
    pub fn with_io(input: R, output: W) -> Self {
        Self { input, output }
    }
}

#[async_trait]
impl<R, W> Engine for StdioEngine<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn name(&self) -> &'static str {
        "stdio"
    }

    async fn run(self: Box<Self>, ports: EnginePorts) {
        let Self { input, mut output } = *self;
        let EnginePorts { mut events, commands } = ports;
        let mut lines = BufReader::new(input).lines();
        let mut input_open = true;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let mut line = match codec::encode_event(&event) {
                        Ok(line) => line,
                        Err(e) => {
                            warn!(kind = event.kind(), error = %e, "skipping unencodable event");
                            continue;
                        }
                    };
                    line.push('\n');
                    if let Err(e) = write_line(&mut output, &line).await {
                        warn!(error = %e, "engine output closed");
                        break;
                    }
                }
                line = lines.next_line(), if input_open => match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match codec::decode_command(line.as_bytes()) {
                            Ok(command) => {
                                if commands.send(command).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, "ignoring malformed engine command"),
                        }
                    }
                    Ok(None) => {
                        info!("engine input closed");
                        input_open = false;
                    }
                    Err(e) => {
                        warn!(error = %e, "engine input failed");
                        input_open = false;
                    }
                },
            }
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, line: &str) -> std::io::Result<()> {
    output.write_all(line.as_bytes()).await?;
    output.flush().await
}
