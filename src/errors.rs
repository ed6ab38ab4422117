use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TelloError>;

#[derive(Error, Debug)]
pub enum TelloError {
    #[error("cannot resolve drone host \"{host}\"")]
    UnresolvedHost { host: String },

    #[error("command socket unavailable: {0}")]
    SocketUnavailable(#[source] std::io::Error),

    #[error("no response from drone within {0:?}")]
    NoResponse(Duration),

    #[error("i/o error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("not connected to the drone")]
    NotConnected,

    #[error("drone rejected command \"{command}\": {reply}")]
    CommandRejected { command: String, reply: String },

    #[error("recorder is already running")]
    RecorderAlreadyStarted,

    #[error("recorder is not running")]
    RecorderNotStarted,

    #[error("video stream is not running")]
    VideoNotStarted,

    #[error("h264 decoder error: {0}")]
    Decode(String),

    #[error("h264 encoder error: {0}")]
    Encode(String),
}
