use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{info, trace, warn};
use udpcam_protocol::MAX_DATAGRAM_SIZE;
use udpcam_video::{FrameSink, ImageDecoder};

use crate::config::ReceiverConfig;
use crate::receiver::Receiver;

/// Bind the receiving socket with an enlarged OS buffer to absorb frame bursts.
pub fn bind_socket(config: &ReceiverConfig) -> Result<UdpSocket> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid UDP address {}:{}", config.host, config.port))?;

    let sock = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )
    .context("failed to create UDP socket")?;
    if let Err(e) = sock.set_recv_buffer_size(config.recv_buffer_size) {
        warn!(size = config.recv_buffer_size, "could not set socket receive buffer: {}", e);
    }
    sock.bind(&addr.into())
        .with_context(|| format!("failed to bind UDP on {}", addr))?;
    sock.set_nonblocking(true)
        .context("failed to set non-blocking")?;

    let std_sock: std::net::UdpSocket = sock.into();
    UdpSocket::from_std(std_sock).context("failed to wrap UDP socket in tokio")
}

/// Run the receive loop until `shutdown` is set.
///
/// Each iteration drains up to `batch_size` datagrams, renders at most one
/// frame, runs housekeeping, then checks the shutdown flag. The socket is
/// closed and the receiver flushed before returning.
pub async fn run_receive_loop<D, S>(
    socket: UdpSocket,
    receiver: &mut Receiver<D, S>,
    config: &ReceiverConfig,
    shutdown: &AtomicBool,
) where
    D: ImageDecoder,
    S: FrameSink,
{
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let batch_size = config.batch_size.max(1);
    let read_timeout = config.read_timeout();
    let mut throttle = RecvErrorThrottle::default();

    if let Ok(addr) = socket.local_addr() {
        info!(%addr, mode = ?config.mode, "receiving");
    }

    loop {
        read_batch(&socket, &mut buf, receiver, batch_size, read_timeout, &mut throttle).await;
        receiver.render_one();
        receiver.housekeeping(Instant::now());

        if shutdown.load(Ordering::Acquire) {
            break;
        }
    }

    drop(socket);
    receiver.finish();
}

/// Read until the batch is full, a read times out, or the socket errors.
/// Returns the number of datagrams handled.
async fn read_batch<D, S>(
    socket: &UdpSocket,
    buf: &mut [u8],
    receiver: &mut Receiver<D, S>,
    batch_size: usize,
    read_timeout: Duration,
    throttle: &mut RecvErrorThrottle,
) -> usize
where
    D: ImageDecoder,
    S: FrameSink,
{
    let mut handled = 0;
    while handled < batch_size {
        match timeout(read_timeout, socket.recv_from(buf)).await {
            Ok(Ok((len, src))) => {
                throttle.reset();
                handled += 1;
                let outcome = receiver.handle_datagram(&buf[..len], Instant::now());
                trace!(%src, len, ?outcome, "datagram");
            }
            Ok(Err(e)) => {
                let (log, pause) = throttle.on_error(Instant::now());
                if let Some(suppressed) = log {
                    warn!(suppressed, "UDP recv error: {}", e);
                }
                tokio::time::sleep(pause).await;
                break;
            }
            // Quiet socket: nothing more this batch.
            Err(_) => break,
        }
    }
    handled
}

/// Keeps a socket that fails on every read from spinning the loop and
/// flooding the log.
#[derive(Debug, Default)]
struct RecvErrorThrottle {
    consecutive: u32,
    suppressed: u64,
    last_warn: Option<Instant>,
}

impl RecvErrorThrottle {
    const WARN_INTERVAL: Duration = Duration::from_secs(1);
    const PAUSE_STEP: Duration = Duration::from_millis(10);
    const MAX_PAUSE: Duration = Duration::from_millis(100);

    /// Record one failed read. Returns `Some(suppressed)` when a warning
    /// should be logged, and how long to pause before the next batch.
    fn on_error(&mut self, now: Instant) -> (Option<u64>, Duration) {
        self.consecutive = self.consecutive.saturating_add(1);
        let pause = (Self::PAUSE_STEP * self.consecutive).min(Self::MAX_PAUSE);

        let due = match self.last_warn {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= Self::WARN_INTERVAL,
        };
        if !due {
            self.suppressed += 1;
            return (None, pause);
        }
        self.last_warn = Some(now);
        (Some(std::mem::take(&mut self.suppressed)), pause)
    }

    fn reset(&mut self) {
        self.consecutive = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::tests::{CollectSink, FakeDecoder};
    use image::codecs::jpeg::JpegEncoder;
    use image::{ExtendedColorType, Rgb, RgbImage};
    use udpcam_protocol::fragment_frame;
    use udpcam_video::JpegDecoder;

    fn test_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([10, 120, 200]));
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 50)
            .encode(img.as_raw(), width, height, ExtendedColorType::Rgb8)
            .unwrap();
        out
    }

    fn loopback_config() -> ReceiverConfig {
        ReceiverConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ReceiverConfig::default()
        }
    }

    #[tokio::test]
    async fn receives_chunked_jpeg_over_loopback() {
        let config = loopback_config();
        let socket = bind_socket(&config).unwrap();
        let addr = socket.local_addr().unwrap();
        let mut rx = Receiver::new(&config, JpegDecoder::new(), CollectSink::default(), Instant::now());
        let shutdown = AtomicBool::new(false);

        let jpeg = test_jpeg(32, 24);
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let send = async {
            // Garbage first: must not disturb the real frame.
            sender.send_to(&[1, 2, 3], addr).await.unwrap();
            let mut packets = fragment_frame(&jpeg, 1, 64).unwrap();
            assert!(packets.len() > 1);
            packets.reverse();
            for p in &packets {
                sender.send_to(&p.to_bytes(), addr).await.unwrap();
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
            shutdown.store(true, Ordering::Release);
        };

        tokio::join!(run_receive_loop(socket, &mut rx, &config, &shutdown), send);

        let frames = &rx.sink().frames;
        assert_eq!(frames.len(), 1);
        assert_eq!((frames[0].width, frames[0].height), (32, 24));
        assert!(rx.assembler().is_empty());
    }

    #[tokio::test]
    async fn quiet_socket_does_not_block_shutdown() {
        let config = loopback_config();
        let socket = bind_socket(&config).unwrap();
        let mut rx = Receiver::new(&config, FakeDecoder, CollectSink::default(), Instant::now());
        let shutdown = AtomicBool::new(false);

        let stop = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown.store(true, Ordering::Release);
        };
        let run = async {
            tokio::join!(run_receive_loop(socket, &mut rx, &config, &shutdown), stop);
        };
        timeout(Duration::from_secs(2), run)
            .await
            .expect("loop should exit once the flag is set");
        assert!(rx.sink().frames.is_empty());
    }

    #[tokio::test]
    async fn batch_stops_at_limit() {
        let config = loopback_config();
        let socket = bind_socket(&config).unwrap();
        let addr = socket.local_addr().unwrap();
        let mut rx = Receiver::new(&config, FakeDecoder, CollectSink::default(), Instant::now());
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for id in 0..5u32 {
            let bytes = udpcam_protocol::ChunkPacket::new(id, 0, 1, vec![id as u8 + 1]).to_bytes();
            sender.send_to(&bytes, addr).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut throttle = RecvErrorThrottle::default();
        let first = read_batch(&socket, &mut buf, &mut rx, 3, Duration::from_millis(100), &mut throttle).await;
        assert_eq!(first, 3);
        let second = read_batch(&socket, &mut buf, &mut rx, 3, Duration::from_millis(20), &mut throttle).await;
        assert_eq!(second, 2);
        assert_eq!(rx.stats().received, 5);
    }

    #[test]
    fn repeated_recv_errors_are_throttled() {
        let mut throttle = RecvErrorThrottle::default();
        let start = Instant::now();

        let (log, pause) = throttle.on_error(start);
        assert_eq!(log, Some(0));
        assert_eq!(pause, Duration::from_millis(10));

        // A tight error loop inside the warn interval stays quiet and backs off.
        let mut last_pause = pause;
        for i in 1..20u64 {
            let (log, pause) = throttle.on_error(start + Duration::from_millis(i));
            assert_eq!(log, None);
            assert!(pause >= last_pause);
            last_pause = pause;
        }
        assert_eq!(last_pause, Duration::from_millis(100));

        let (log, _) = throttle.on_error(start + Duration::from_secs(1));
        assert_eq!(log, Some(19));

        // A good read resets the backoff but not the warn window.
        throttle.reset();
        let (log, pause) = throttle.on_error(start + Duration::from_millis(1100));
        assert_eq!(log, None);
        assert_eq!(pause, Duration::from_millis(10));
    }

    #[test]
    fn bind_rejects_bad_host() {
        let config = ReceiverConfig {
            host: "not-an-ip".into(),
            ..ReceiverConfig::default()
        };
        assert!(bind_socket(&config).is_err());
    }
}
