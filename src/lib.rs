mod command;
mod errors;
mod observable;
mod options;
mod recorder;
mod state;
mod tello;
mod video;

pub use command::{
    make_tello_command_channel, FlipDirection, TelloCommand, TelloCommandReceiver,
    TelloCommandSender,
};
pub use errors::{Result, TelloError};
pub use observable::ObservableValue;
pub use options::{
    TelloOptions, DEFAULT_COMMAND_PORT, DEFAULT_DRONE_HOST, DEFAULT_STATE_PORT,
    DEFAULT_VIDEO_PORT,
};
pub use recorder::Recorder;
pub use state::{Telemetry, Vector3};
pub use tello::{SessionState, Tello};
pub use video::{FrameHook, VideoFrame, VIDEO_HEIGHT, VIDEO_WIDTH};
