use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};

use minimp4::Mp4Muxer;
use openh264::encoder::{Encoder, EncoderConfig};

use crate::errors::{Result, TelloError};
use crate::video::VideoFrame;

/// The recorder slot shared between the session (which starts and stops
/// recordings) and the video ingest loop (which feeds frames).
pub(crate) type SharedRecorder = Arc<Mutex<Option<Recorder>>>;

/// Encodes a sequence of decoded frames into an MP4 file.
///
/// Lifecycle is independent of the video stream: recordings can start and
/// stop any number of times while frames keep flowing. There is no internal
/// buffering beyond what the codec requires, so a slow encode exerts
/// backpressure directly on whoever calls [`Recorder::record`].
pub struct Recorder {
    encoder: Encoder,
    muxer: Mp4Muxer<File>,
    width: u32,
    height: u32,
    frames: u64,
}

// SAFETY: the muxer's raw pointers are only dereferenced through `&mut self`
// methods, and the `SharedRecorder` mutex guarantees exclusive access when the
// recorder moves between the session and the video ingest task.
unsafe impl Send for Recorder {}

impl Recorder {
    /// Opens the target file and an encoder bound to the given
    /// decoded-frame geometry.
    pub fn create(path: &Path, width: u32, height: u32) -> Result<Self> {
        log::info!("recording {width}x{height} video to {}", path.display());

        let config = EncoderConfig::new(width, height);
        let encoder =
            Encoder::with_config(config).map_err(|err| TelloError::Encode(err.to_string()))?;

        let file = File::create(path)?;
        let mut muxer = Mp4Muxer::new(file);
        muxer.init_video(width as i32, height as i32, false, "tello-flix");

        Ok(Self { encoder, muxer, width, height, frames: 0 })
    }

    /// Encodes and appends one frame.
    pub fn record(&mut self, frame: &VideoFrame) -> Result<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(TelloError::Encode(format!(
                "frame is {}x{} but the recording is {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }

        let bitstream = self
            .encoder
            .encode(frame)
            .map_err(|err| TelloError::Encode(err.to_string()))?;
        self.muxer.write_video(&bitstream.to_vec());
        self.frames += 1;
        Ok(())
    }

    pub fn frames_recorded(&self) -> u64 {
        self.frames
    }

    /// Finalizes the container, making the file playable.
    pub fn finish(self) -> Result<()> {
        log::info!("finished recording after {} frames", self.frames);
        let mut muxer = self.muxer;
        muxer.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_frames_into_a_playable_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");

        let mut recorder = Recorder::create(&path, 32, 32).unwrap();
        for _ in 0..5 {
            recorder.record(&VideoFrame::blank(32, 32)).unwrap();
        }
        assert_eq!(recorder.frames_recorded(), 5);
        recorder.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(!bytes.is_empty());
        // "ftyp" box near the start marks an MP4 container
        assert_eq!(&bytes[4..8], b"ftyp");
    }

    #[test]
    fn rejects_frames_with_the_wrong_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");

        let mut recorder = Recorder::create(&path, 32, 32).unwrap();
        let err = recorder.record(&VideoFrame::blank(16, 16)).unwrap_err();
        assert!(matches!(err, TelloError::Encode(_)));
    }
}
