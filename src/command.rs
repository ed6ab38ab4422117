use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::spawn;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::errors::{Result, TelloError};

/// Direction of an aerobatic flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipDirection {
    Left,
    Right,
    Forward,
    Back,
}

impl FlipDirection {
    pub(crate) fn letter(&self) -> &'static str {
        match self {
            FlipDirection::Left => "l",
            FlipDirection::Right => "r",
            FlipDirection::Forward => "f",
            FlipDirection::Back => "b",
        }
    }
}

/// Commands a remote-control style client can queue for the drone.
#[derive(Debug)]
pub enum TelloCommand {
    TakeOff,
    Land,
    StopAndHover,
    EmergencyStop,
    RemoteControl { left_right: i8, forwards_backwards: i8, up_down: i8, yaw: i8 },
    Flip(FlipDirection),
}

pub type TelloCommandSender = mpsc::UnboundedSender<TelloCommand>;
pub type TelloCommandReceiver = mpsc::UnboundedReceiver<TelloCommand>;

pub fn make_tello_command_channel() -> (TelloCommandSender, TelloCommandReceiver) {
    mpsc::unbounded_channel()
}

// Protocol parameter ranges; out-of-range values are clamped, not rejected.
pub(crate) fn clamp_distance(cm: i32) -> i32 {
    cm.clamp(20, 500)
}

pub(crate) fn clamp_degrees(deg: i32) -> i32 {
    deg.clamp(1, 3600)
}

pub(crate) fn clamp_speed(speed: i32) -> i32 {
    speed.clamp(10, 100)
}

pub(crate) fn clamp_rc(value: i32) -> i8 {
    value.clamp(-100, 100) as i8
}

struct Dispatch {
    line: String,
    reply: oneshot::Sender<Result<String>>,
}

/// Request/response exchange on the connected command socket.
///
/// The drone attaches no request id to its replies, so arrival order is the
/// only way to match a reply to its command. A single worker task owns the
/// exchange and serves queued commands strictly one at a time, in FIFO
/// order. Fire-and-forget datagrams go straight to the socket instead.
#[derive(Debug)]
pub(crate) struct CommandChannel {
    sock: Arc<UdpSocket>,
    queue: mpsc::UnboundedSender<Dispatch>,
}

impl CommandChannel {
    pub(crate) fn new(
        sock: UdpSocket,
        response_timeout: Duration,
        token: CancellationToken,
    ) -> Self {
        let sock = Arc::new(sock);
        let (queue, mut requests) = mpsc::unbounded_channel::<Dispatch>();

        let worker_sock = Arc::clone(&sock);
        let _ = spawn(async move {
            loop {
                let dispatch = tokio::select! {
                    _ = token.cancelled() => break,
                    next = requests.recv() => match next {
                        Some(dispatch) => dispatch,
                        None => break,
                    },
                };

                let result = exchange(&worker_sock, &dispatch.line, response_timeout).await;
                // the requester may have given up waiting
                let _ = dispatch.reply.send(result);
            }
        });

        Self { sock, queue }
    }

    /// Queues a command and waits for its single reply, trimmed.
    pub(crate) async fn request(&self, line: String) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.queue
            .send(Dispatch { line, reply: tx })
            .map_err(|_| TelloError::NotConnected)?;
        rx.await.map_err(|_| TelloError::NotConnected)?
    }

    /// Queues a control command and interprets the reply, where a literal
    /// `"ok"` means success and anything else is a rejection.
    pub(crate) async fn control(&self, line: String) -> Result<()> {
        let reply = self.request(line.clone()).await?;
        if reply == "ok" {
            Ok(())
        } else {
            Err(TelloError::CommandRejected { command: line, reply })
        }
    }

    /// Sends a datagram with no reply expected, bypassing the queue.
    ///
    /// `emergency` relies on this path to race ahead of queued commands.
    pub(crate) async fn fire_and_forget(&self, line: &str) -> Result<()> {
        log::debug!("SEND {line} (no reply expected)");
        self.sock.send(line.as_bytes()).await?;
        Ok(())
    }
}

async fn exchange(sock: &UdpSocket, line: &str, response_timeout: Duration) -> Result<String> {
    log::info!("SEND {line}");
    sock.send(line.as_bytes()).await?;

    let mut buf = vec![0; 1024];
    let n = match timeout(response_timeout, sock.recv(&mut buf)).await {
        Ok(received) => received?,
        Err(_) => {
            log::warn!("no reply to \"{line}\" within {response_timeout:?}");
            return Err(TelloError::NoResponse(response_timeout));
        }
    };
    buf.truncate(n);

    let reply = String::from_utf8_lossy(&buf).trim().to_string();
    log::info!("RECEIVED {reply}");
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamping_is_idempotent_and_in_range() {
        for x in [-1000, 0, 19, 20, 250, 500, 501, 10_000] {
            let once = clamp_distance(x);
            assert_eq!(clamp_distance(once), once);
            assert!((20..=500).contains(&once));
        }
        for x in [-5, 0, 9, 10, 55, 100, 101, 999] {
            let once = clamp_speed(x);
            assert_eq!(clamp_speed(once), once);
            assert!((10..=100).contains(&once));
        }
        for x in [-1, 0, 1, 360, 3600, 3601] {
            let once = clamp_degrees(x);
            assert_eq!(clamp_degrees(once), once);
            assert!((1..=3600).contains(&once));
        }
    }

    #[test]
    fn rc_values_clamp_to_channel_range() {
        assert_eq!(clamp_rc(-500), -100);
        assert_eq!(clamp_rc(-100), -100);
        assert_eq!(clamp_rc(0), 0);
        assert_eq!(clamp_rc(100), 100);
        assert_eq!(clamp_rc(101), 100);
    }

    #[test]
    fn flip_directions_map_to_protocol_letters() {
        assert_eq!(FlipDirection::Left.letter(), "l");
        assert_eq!(FlipDirection::Right.letter(), "r");
        assert_eq!(FlipDirection::Forward.letter(), "f");
        assert_eq!(FlipDirection::Back.letter(), "b");
    }
}
