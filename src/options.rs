use std::time::Duration;

use crate::command::*;
use crate::video::{FrameHook, VideoFrame, VIDEO_HEIGHT, VIDEO_WIDTH};

pub const DEFAULT_DRONE_HOST: &str = "192.168.10.1";
pub const DEFAULT_COMMAND_PORT: u16 = 8889;
pub const DEFAULT_STATE_PORT: u16 = 8890;
pub const DEFAULT_VIDEO_PORT: u16 = 11111;

/// Tello drone connection and other usage options.
///
/// The defaults fly a real drone in AP mode. Tests and simulators point
/// `drone_host` and the ports somewhere else, typically loopback.
pub struct TelloOptions {
    pub drone_host: String,
    pub command_port: u16,
    pub state_port: u16,
    pub video_port: u16,
    /// Local address the state and video listeners bind to.
    pub local_address: String,
    /// How long a reply-expecting command waits before giving up with
    /// [`crate::TelloError::NoResponse`]. Policy, not a drone constant.
    pub response_timeout: Duration,
    pub video_width: u32,
    pub video_height: u32,
    /// Run the frame hook on every Nth decoded frame.
    pub frame_hook_interval: u32,
    pub(crate) frame_hook: Option<FrameHook>,
    pub(crate) command_receiver: Option<TelloCommandReceiver>,
}

impl Default for TelloOptions {
    fn default() -> Self {
        Self {
            drone_host: DEFAULT_DRONE_HOST.to_string(),
            command_port: DEFAULT_COMMAND_PORT,
            state_port: DEFAULT_STATE_PORT,
            video_port: DEFAULT_VIDEO_PORT,
            local_address: "0.0.0.0".to_string(),
            response_timeout: Duration::from_secs(10),
            video_width: VIDEO_WIDTH,
            video_height: VIDEO_HEIGHT,
            frame_hook_interval: 15,
            frame_hook: None,
            command_receiver: None,
        }
    }
}

impl TelloOptions {
    /// Returns the sender end of a channel for issuing commands to the
    /// drone, eg for a remote control application. The receiver end is
    /// drained by [`crate::Tello::handle_commands`].
    pub fn with_command(&mut self) -> TelloCommandSender {
        let (tx, rx) = make_tello_command_channel();
        self.command_receiver = Some(rx);
        tx
    }

    /// Installs a frame-processing callback, run on every Nth decoded
    /// frame before that frame is published (eg for face detection).
    pub fn with_frame_hook(&mut self, hook: impl FnMut(&mut VideoFrame) + Send + 'static) {
        self.frame_hook = Some(Box::new(hook));
    }

    pub(crate) fn command_address(&self) -> String {
        format!("{}:{}", self.drone_host, self.command_port)
    }

    pub(crate) fn state_bind_address(&self) -> String {
        format!("{}:{}", self.local_address, self.state_port)
    }

    pub(crate) fn video_bind_address(&self) -> String {
        format!("{}:{}", self.local_address, self.video_port)
    }
}
