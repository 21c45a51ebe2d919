use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// One read of at most this many bytes is taken as the whole response.
pub const MAX_RESPONSE_SIZE: usize = 1024;

/// Commands understood by the camera's control server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Pause,
    Resume,
    Reset,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Start => "START",
            Command::Stop => "STOP",
            Command::Pause => "PAUSE",
            Command::Resume => "RESUME",
            Command::Reset => "RESET",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "START" => Ok(Command::Start),
            "STOP" => Ok(Command::Stop),
            "PAUSE" => Ok(Command::Pause),
            "RESUME" => Ok(Command::Resume),
            "RESET" => Ok(Command::Reset),
            other => Err(format!("unknown control command: {}", other)),
        }
    }
}

/// Line-oriented request/response client for the sender's control port.
///
/// One command in flight at a time: write `command\n`, then a single read
/// of up to [`MAX_RESPONSE_SIZE`] bytes is the reply.
pub struct ControlClient {
    stream: TcpStream,
}

impl ControlClient {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to control server {}", addr))?;
        stream.set_nodelay(true).ok();
        Ok(Self { stream })
    }

    pub async fn send(&mut self, command: &str) -> Result<String> {
        let command = command.trim();
        if command.is_empty() {
            bail!("empty control command");
        }
        if command.contains('\n') {
            bail!("control command must be a single line");
        }

        let mut line = Vec::with_capacity(command.len() + 1);
        line.extend_from_slice(command.as_bytes());
        line.push(b'\n');
        self.stream
            .write_all(&line)
            .await
            .context("failed to send control command")?;

        let mut buf = BytesMut::with_capacity(MAX_RESPONSE_SIZE);
        let n = self
            .stream
            .read_buf(&mut buf)
            .await
            .context("failed to read control response")?;
        if n == 0 {
            bail!("control server closed the connection");
        }

        let response = String::from_utf8_lossy(&buf[..n]).trim_end().to_string();
        debug!(command, %response, "control exchange");
        Ok(response)
    }

    pub async fn send_command(&mut self, command: Command) -> Result<String> {
        self.send(command.as_str()).await
    }
}
