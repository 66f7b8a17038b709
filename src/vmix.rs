// Outbound fire-and-forget command sender for the video-mixing endpoint.
//
// External-collaborator boundary: the synchronization layer only hands this
// a fully-formed command block. Delivery is best-effort; every failure is
// logged and swallowed, because a dropped overlay command must never block
// the next button press.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// How long one complete send (connect, handshake, commands, quit) may take
/// before it is abandoned.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Line-oriented TCP client for the mixer's command port.
#[derive(Debug, Clone)]
pub struct VmixSender {
    addr: String,
}

impl VmixSender {
    pub fn new(addr: String) -> Self {
        VmixSender { addr }
    }

    /// Send a block of commands, fire-and-forget. Waits for the mixer's
    /// `VERSION` banner, sends `PING`, the commands, then `QUIT`. Never
    /// returns an error; failures are logged at warn level.
    pub async fn send(&self, commands: &[String]) {
        if commands.is_empty() {
            return;
        }
        match tokio::time::timeout(SEND_TIMEOUT, self.send_inner(commands)).await {
            Ok(Ok(())) => {
                debug!(addr = %self.addr, count = commands.len(), "vmix commands delivered");
            }
            Ok(Err(e)) => {
                warn!(addr = %self.addr, error = %e, "vmix send failed");
            }
            Err(_) => {
                warn!(addr = %self.addr, "vmix send timed out");
            }
        }
    }

    async fn send_inner(&self, commands: &[String]) -> std::io::Result<()> {
        let stream = TcpStream::connect(&self.addr).await?;
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        while let Some(line) = lines.next_line().await? {
            if line.contains("VERSION") {
                write_half.write_all(b"PING\r\n").await?;
                let mut block = String::new();
                for command in commands {
                    block.push_str(command);
                    block.push_str("\r\n");
                }
                write_half.write_all(block.as_bytes()).await?;
                write_half.write_all(b"QUIT\r\n").await?;
            }
            if line.contains("QUIT OK") {
                break;
            }
        }
        Ok(())
    }
}
