use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::command::{
    clamp_degrees, clamp_distance, clamp_rc, clamp_speed, CommandChannel, FlipDirection,
    TelloCommand,
};
use crate::errors::{Result, TelloError};
use crate::observable::ObservableValue;
use crate::options::TelloOptions;
use crate::recorder::{Recorder, SharedRecorder};
use crate::state::{spawn_state_listener, Telemetry};
use crate::video::{spawn_video_ingest, VideoFrame, VideoIngest};

/// Connection lifecycle of a [`Tello`] session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Default, Clone, Copy)]
struct RcChannels {
    left_right: i8,
    forwards_backwards: i8,
    up_down: i8,
    yaw: i8,
}

/// A control session with one Tello drone.
///
/// Owns the command channel, the telemetry and video listeners and the
/// observable values the presentation layer watches. Flight commands are
/// serialized through a single-worker queue because the drone's replies
/// carry no request id; see [`connect`](Tello::connect) for the lifecycle.
pub struct Tello {
    options: TelloOptions,
    session_state: Arc<ObservableValue<SessionState>>,
    telemetry: Arc<ObservableValue<Telemetry>>,
    battery_level: Arc<ObservableValue<u8>>,
    current_frame: Arc<ObservableValue<Option<Arc<VideoFrame>>>>,
    channel: Option<Arc<CommandChannel>>,
    token: CancellationToken,
    video_token: Option<CancellationToken>,
    recorder: SharedRecorder,
    rc: RcChannels,
}

impl Default for Tello {
    fn default() -> Self {
        Self::with_options(TelloOptions::default())
    }
}

impl Tello {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: TelloOptions) -> Self {
        Self {
            options,
            session_state: Arc::new(ObservableValue::new(SessionState::Disconnected)),
            telemetry: Arc::new(ObservableValue::new(Telemetry::default())),
            battery_level: Arc::new(ObservableValue::new(0)),
            current_frame: Arc::new(ObservableValue::new(None)),
            channel: None,
            token: CancellationToken::new(),
            video_token: None,
            recorder: Arc::new(Mutex::new(None)),
            rc: RcChannels::default(),
        }
    }

    //////////////////////////////////////////////////////////////////////
    // lifecycle

    /// Connects to the drone: resolves the host, binds and connects the
    /// command socket, performs the `command` handshake and starts the
    /// state listener. Already connected is a no-op.
    pub async fn connect(&mut self) -> Result<()> {
        if self.session_state.get() == SessionState::Connected {
            return Ok(());
        }

        self.session_state.set(SessionState::Connecting);
        match self.establish().await {
            Ok(()) => {
                self.session_state.set(SessionState::Connected);
                Ok(())
            }
            Err(err) => {
                self.session_state.set(SessionState::Disconnected);
                Err(err)
            }
        }
    }

    async fn establish(&mut self) -> Result<()> {
        let address = self.options.command_address();
        log::info!("connecting to drone at {address}");

        let drone_address = lookup_host(&address)
            .await
            .ok()
            .and_then(|mut addresses| addresses.next())
            .ok_or_else(|| TelloError::UnresolvedHost {
                host: self.options.drone_host.clone(),
            })?;

        let sock = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(TelloError::SocketUnavailable)?;
        sock.connect(drone_address)
            .await
            .map_err(TelloError::SocketUnavailable)?;

        let token = CancellationToken::new();
        let channel = Arc::new(CommandChannel::new(
            sock,
            self.options.response_timeout,
            token.child_token(),
        ));

        // SDK-mode handshake; the drone answers "ok"
        channel.control("command".to_string()).await?;

        match UdpSocket::bind(self.options.state_bind_address()).await {
            Ok(state_sock) => {
                let _ = spawn_state_listener(
                    state_sock,
                    Arc::clone(&self.telemetry),
                    Arc::clone(&self.battery_level),
                    token.child_token(),
                );
            }
            Err(err) => {
                // flight still works without telemetry
                log::warn!("can't bind state port {}: {err}", self.options.state_port);
            }
        }

        self.token = token;
        self.channel = Some(channel);
        log::info!("connected");
        Ok(())
    }

    /// Tears the session down: cancels every background loop, finalizes an
    /// active recording and closes the sockets. Idempotent; disconnecting
    /// when already disconnected is a no-op.
    pub fn disconnect(&mut self) {
        if self.session_state.get() == SessionState::Disconnected {
            return;
        }
        log::info!("disconnecting");

        self.token.cancel();
        self.video_token = None;
        self.channel = None;
        self.rc = RcChannels::default();
        self.session_state.set(SessionState::Disconnected);
    }

    pub fn is_connected(&self) -> bool {
        self.session_state.get() == SessionState::Connected
    }

    pub fn is_streaming(&self) -> bool {
        self.video_token.is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    //////////////////////////////////////////////////////////////////////
    // observables

    pub fn observe_session_state(&self) -> watch::Receiver<SessionState> {
        self.session_state.subscribe()
    }

    pub fn observe_telemetry(&self) -> watch::Receiver<Telemetry> {
        self.telemetry.subscribe()
    }

    pub fn observe_battery(&self) -> watch::Receiver<u8> {
        self.battery_level.subscribe()
    }

    /// The most recent decoded video frame; intermediate frames a slow
    /// consumer never looked at are dropped, not queued.
    pub fn observe_frames(&self) -> watch::Receiver<Option<Arc<VideoFrame>>> {
        self.current_frame.subscribe()
    }

    pub fn battery_level(&self) -> u8 {
        self.battery_level.get()
    }

    pub fn telemetry(&self) -> Telemetry {
        self.telemetry.get()
    }

    pub fn current_frame(&self) -> Option<Arc<VideoFrame>> {
        self.current_frame.get()
    }

    //////////////////////////////////////////////////////////////////////
    // flight commands

    fn channel(&self) -> Result<&CommandChannel> {
        if self.session_state.get() != SessionState::Connected {
            return Err(TelloError::NotConnected);
        }
        self.channel.as_deref().ok_or(TelloError::NotConnected)
    }

    pub async fn take_off(&self) -> Result<()> {
        self.channel()?.control("takeoff".to_string()).await
    }

    pub async fn land(&self) -> Result<()> {
        self.channel()?.control("land".to_string()).await
    }

    /// Hover in place. Works at any time.
    pub async fn stop_and_hover(&self) -> Result<()> {
        self.channel()?.control("stop".to_string()).await
    }

    /// Stops all motors immediately. Fire-and-forget, written straight to
    /// the socket ahead of anything still waiting in the command queue.
    pub async fn emergency(&self) -> Result<()> {
        match &self.channel {
            Some(channel) => channel.fire_and_forget("emergency").await,
            None => Err(TelloError::NotConnected),
        }
    }

    async fn move_in(&self, direction: &str, cm: i32) -> Result<()> {
        self.channel()?
            .control(format!("{direction} {}", clamp_distance(cm)))
            .await
    }

    pub async fn up(&self, cm: i32) -> Result<()> {
        self.move_in("up", cm).await
    }

    pub async fn down(&self, cm: i32) -> Result<()> {
        self.move_in("down", cm).await
    }

    pub async fn left(&self, cm: i32) -> Result<()> {
        self.move_in("left", cm).await
    }

    pub async fn right(&self, cm: i32) -> Result<()> {
        self.move_in("right", cm).await
    }

    pub async fn forward(&self, cm: i32) -> Result<()> {
        self.move_in("forward", cm).await
    }

    pub async fn back(&self, cm: i32) -> Result<()> {
        self.move_in("back", cm).await
    }

    pub async fn turn_clockwise(&self, degrees: i32) -> Result<()> {
        self.channel()?
            .control(format!("cw {}", clamp_degrees(degrees)))
            .await
    }

    pub async fn turn_counter_clockwise(&self, degrees: i32) -> Result<()> {
        self.channel()?
            .control(format!("ccw {}", clamp_degrees(degrees)))
            .await
    }

    pub async fn flip(&self, direction: FlipDirection) -> Result<()> {
        self.channel()?
            .control(format!("flip {}", direction.letter()))
            .await
    }

    pub async fn set_speed(&self, cm_per_sec: i32) -> Result<()> {
        self.channel()?
            .control(format!("speed {}", clamp_speed(cm_per_sec)))
            .await
    }

    /// Fly to (x, y, z) relative to the current position, each axis in cm.
    pub async fn go(&self, x: i32, y: i32, z: i32, speed: i32) -> Result<()> {
        self.channel()?
            .control(format!("go {x} {y} {z} {}", clamp_speed(speed)))
            .await
    }

    /// Fly a curve through (x1, y1, z1) to (x2, y2, z2).
    #[allow(clippy::too_many_arguments)]
    pub async fn curve(
        &self,
        x1: i32,
        y1: i32,
        z1: i32,
        x2: i32,
        y2: i32,
        z2: i32,
        speed: i32,
    ) -> Result<()> {
        self.channel()?
            .control(format!(
                "curve {x1} {y1} {z1} {x2} {y2} {z2} {}",
                speed.clamp(10, 60)
            ))
            .await
    }

    //////////////////////////////////////////////////////////////////////
    // rc control

    /// Left/right channel, -100..100. Re-sends the combined `rc` command
    /// immediately; this is a streaming control surface and never waits
    /// for a reply.
    pub async fn set_left_right(&mut self, value: i32) -> Result<()> {
        self.rc.left_right = clamp_rc(value);
        self.send_rc().await
    }

    /// Forward/back channel, -100..100.
    pub async fn set_forward_back(&mut self, value: i32) -> Result<()> {
        self.rc.forwards_backwards = clamp_rc(value);
        self.send_rc().await
    }

    /// Up/down channel, -100..100.
    pub async fn set_up_down(&mut self, value: i32) -> Result<()> {
        self.rc.up_down = clamp_rc(value);
        self.send_rc().await
    }

    /// Yaw channel, -100..100.
    pub async fn set_yaw(&mut self, value: i32) -> Result<()> {
        self.rc.yaw = clamp_rc(value);
        self.send_rc().await
    }

    async fn send_rc(&self) -> Result<()> {
        let RcChannels { left_right, forwards_backwards, up_down, yaw } = self.rc;
        self.channel()?
            .fire_and_forget(&format!("rc {left_right} {forwards_backwards} {up_down} {yaw}"))
            .await
    }

    //////////////////////////////////////////////////////////////////////
    // read queries

    /// Sends a raw read query (eg `"battery?"`) and returns the trimmed
    /// reply. In most cases the state listener is the better source.
    pub async fn query(&self, query: &str) -> Result<String> {
        self.channel()?.request(query.to_string()).await
    }

    /// Current battery percentage; 0 if the reply does not parse.
    pub async fn battery(&self) -> Result<u8> {
        Ok(lenient_number(&self.query("battery?").await?))
    }

    /// Current speed in cm/s; 0 if the reply does not parse.
    pub async fn speed(&self) -> Result<f32> {
        Ok(lenient_number(&self.query("speed?").await?))
    }

    /// Accumulated flight time in seconds; 0 if the reply does not parse.
    pub async fn flight_time(&self) -> Result<u32> {
        Ok(lenient_number(&self.query("time?").await?))
    }

    pub async fn wifi_snr(&self) -> Result<String> {
        self.query("wifi?").await
    }

    pub async fn sdk_version(&self) -> Result<String> {
        self.query("sdk?").await
    }

    pub async fn serial_number(&self) -> Result<String> {
        self.query("sn?").await
    }

    //////////////////////////////////////////////////////////////////////
    // video & recording

    /// Sends `streamon` and starts grabbing, decoding and publishing
    /// frames. Already streaming is a no-op.
    pub async fn start_video(&mut self) -> Result<()> {
        if self.video_token.is_some() {
            return Ok(());
        }
        self.channel()?.control("streamon".to_string()).await?;

        let sock = UdpSocket::bind(self.options.video_bind_address())
            .await
            .map_err(TelloError::SocketUnavailable)?;

        let token = self.token.child_token();
        let _ = spawn_video_ingest(
            VideoIngest {
                sock,
                frame_value: Arc::clone(&self.current_frame),
                recorder: Arc::clone(&self.recorder),
                hook: self.options.frame_hook.take(),
                hook_interval: self.options.frame_hook_interval,
            },
            token.clone(),
        );
        self.video_token = Some(token);
        Ok(())
    }

    /// Sends `streamoff` and stops the ingest loop, finalizing any active
    /// recording.
    pub async fn stop_video(&mut self) -> Result<()> {
        let token = self.video_token.take().ok_or(TelloError::VideoNotStarted)?;
        token.cancel();
        self.channel()?.control("streamoff".to_string()).await
    }

    /// Starts recording to `recorded_<timestamp>.mp4` in the working
    /// directory and returns the path.
    pub fn start_recording(&self) -> Result<PathBuf> {
        let name = format!(
            "recorded_{}.mp4",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        );
        self.start_recording_to(name)
    }

    /// Starts encoding decoded frames to `path`. Requires an active video
    /// stream; starting while already recording is an error.
    pub fn start_recording_to(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        if self.video_token.is_none() {
            return Err(TelloError::VideoNotStarted);
        }

        let mut slot = self.recorder.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return Err(TelloError::RecorderAlreadyStarted);
        }

        let path = path.as_ref().to_path_buf();
        *slot = Some(Recorder::create(
            &path,
            self.options.video_width,
            self.options.video_height,
        )?);
        Ok(path)
    }

    /// Finalizes the current recording. Stopping while not recording is an
    /// error.
    pub fn stop_recording(&self) -> Result<()> {
        let recorder = self
            .recorder
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        recorder.ok_or(TelloError::RecorderNotStarted)?.finish()
    }

    //////////////////////////////////////////////////////////////////////
    // queued command handling

    /// Drains commands issued through the channel obtained from
    /// [`TelloOptions::with_command`], executing them in submission order.
    /// A failed command is logged and the loop keeps flying.
    pub async fn handle_commands(&mut self) -> Result<()> {
        let Some(mut receiver) = self.options.command_receiver.take() else {
            log::warn!("no command channel was requested, nothing to handle");
            return Ok(());
        };

        while let Some(command) = receiver.recv().await {
            let result = match command {
                TelloCommand::TakeOff => self.take_off().await,
                TelloCommand::Land => self.land().await,
                TelloCommand::StopAndHover => self.stop_and_hover().await,
                TelloCommand::EmergencyStop => self.emergency().await,
                TelloCommand::Flip(direction) => self.flip(direction).await,
                TelloCommand::RemoteControl {
                    left_right,
                    forwards_backwards,
                    up_down,
                    yaw,
                } => {
                    self.rc = RcChannels { left_right, forwards_backwards, up_down, yaw };
                    self.send_rc().await
                }
            };
            if let Err(err) = result {
                log::warn!("command failed: {err}");
            }
        }
        Ok(())
    }
}

/// Read-query replies are telemetry-adjacent, so numeric parse failures
/// fall back to the default instead of propagating an error. Unit suffixes
/// like the `s` in `"12s"` are tolerated.
fn lenient_number<T: FromStr + Default>(reply: &str) -> T {
    reply
        .trim()
        .trim_end_matches(char::is_alphabetic)
        .parse()
        .unwrap_or_default()
}
