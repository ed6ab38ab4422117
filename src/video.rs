use std::sync::Arc;

use bytebuffer::ByteBuffer;
use openh264::decoder::Decoder;
use openh264::formats::YUVSource;
use tokio::net::UdpSocket;
use tokio::{spawn, task};
use tokio_util::sync::CancellationToken;

use crate::observable::ObservableValue;
use crate::recorder::SharedRecorder;

pub const VIDEO_WIDTH: u32 = 960;
pub const VIDEO_HEIGHT: u32 = 720;

const MAX_CHUNK_SIZE: usize = 1460;

/// A per-frame processing callback, run on every Nth decoded frame before
/// it is published. The interval bounds the CPU cost of expensive analysis
/// such as face detection.
pub type FrameHook = Box<dyn FnMut(&mut VideoFrame) + Send>;

/// One decoded frame of video, planar YUV 4:2:0 with stride padding
/// stripped so each plane is tightly packed.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

impl VideoFrame {
    pub(crate) fn from_yuv(source: &impl YUVSource) -> VideoFrame {
        let width = source.width() as usize;
        let height = source.height() as usize;

        let mut frame = VideoFrame {
            width: width as u32,
            height: height as u32,
            y: Vec::with_capacity(width * height),
            u: Vec::with_capacity(width * height / 4),
            v: Vec::with_capacity(width * height / 4),
        };
        copy_plane(source.y(), source.y_stride() as usize, width, height, &mut frame.y);
        copy_plane(source.u(), source.u_stride() as usize, width / 2, height / 2, &mut frame.u);
        copy_plane(source.v(), source.v_stride() as usize, width / 2, height / 2, &mut frame.v);
        frame
    }

    /// A uniform grey frame, useful as a placeholder and in tests.
    pub fn blank(width: u32, height: u32) -> VideoFrame {
        let (w, h) = (width as usize, height as usize);
        VideoFrame {
            width,
            height,
            y: vec![0x80; w * h],
            u: vec![0x80; w * h / 4],
            v: vec![0x80; w * h / 4],
        }
    }
}

fn copy_plane(src: &[u8], stride: usize, width: usize, height: usize, out: &mut Vec<u8>) {
    for row in 0..height {
        let start = row * stride;
        out.extend_from_slice(&src[start..start + width]);
    }
}

// Lets the recorder's encoder consume frames directly.
impl YUVSource for VideoFrame {
    fn width(&self) -> i32 {
        self.width as i32
    }

    fn height(&self) -> i32 {
        self.height as i32
    }

    fn y(&self) -> &[u8] {
        &self.y
    }

    fn u(&self) -> &[u8] {
        &self.u
    }

    fn v(&self) -> &[u8] {
        &self.v
    }

    fn y_stride(&self) -> i32 {
        self.width as i32
    }

    fn u_stride(&self) -> i32 {
        (self.width / 2) as i32
    }

    fn v_stride(&self) -> i32 {
        (self.width / 2) as i32
    }
}

pub(crate) struct VideoIngest {
    pub(crate) sock: UdpSocket,
    pub(crate) frame_value: Arc<ObservableValue<Option<Arc<VideoFrame>>>>,
    pub(crate) recorder: SharedRecorder,
    pub(crate) hook: Option<FrameHook>,
    pub(crate) hook_interval: u32,
}

/// Runs the continuous grab/decode/publish loop.
///
/// Datagrams are reassembled into H.264 access units (a datagram shorter
/// than the chunk size terminates the unit), decoded, offered to an active
/// recorder, then published with overwrite semantics. Per-iteration
/// failures are logged and the loop carries on; on cancellation any active
/// recorder is finalized before the task exits.
pub(crate) fn spawn_video_ingest(
    mut ingest: VideoIngest,
    token: CancellationToken,
) -> task::JoinHandle<()> {
    spawn(async move {
        log::info!("video ingest running at {:?}", ingest.sock.local_addr());

        let mut decoder = match Decoder::new() {
            Ok(decoder) => decoder,
            Err(err) => {
                log::error!("can't create h264 decoder: {err}");
                return;
            }
        };

        let mut assembly = ByteBuffer::new();
        let mut chunk = vec![0; MAX_CHUNK_SIZE];
        let hook_interval = ingest.hook_interval.max(1);
        let mut frames_until_hook = hook_interval;

        loop {
            let received = tokio::select! {
                _ = token.cancelled() => break,
                r = ingest.sock.recv(&mut chunk) => r,
            };
            let n = match received {
                Ok(n) => n,
                Err(err) => {
                    log::warn!("can't receive video chunk: {err}");
                    continue;
                }
            };
            if n == 0 {
                continue;
            }

            assembly.write_bytes(&chunk[..n]);
            if n == MAX_CHUNK_SIZE {
                // more chunks of this access unit to come
                continue;
            }

            let access_unit = assembly.into_vec();
            assembly = ByteBuffer::new();

            let decoded = match decoder.decode(&access_unit) {
                Ok(Some(yuv)) => yuv,
                Ok(None) => continue, // decoder needs more data
                Err(err) => {
                    log::warn!("h264 decoder error: {err}");
                    continue;
                }
            };
            let mut frame = VideoFrame::from_yuv(&decoded);

            // the recorder sees every frame, unprocessed
            {
                let mut slot = ingest.recorder.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(recorder) = slot.as_mut() {
                    if let Err(err) = recorder.record(&frame) {
                        log::warn!("can't record frame: {err}");
                    }
                }
            }

            if let Some(hook) = ingest.hook.as_mut() {
                frames_until_hook -= 1;
                if frames_until_hook == 0 {
                    frames_until_hook = hook_interval;
                    hook(&mut frame);
                }
            }

            ingest.frame_value.set(Some(Arc::new(frame)));
        }

        // guaranteed release on the way out, whatever stopped the loop
        let recorder = {
            let mut slot = ingest.recorder.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        if let Some(recorder) = recorder {
            if let Err(err) = recorder.finish() {
                log::warn!("can't finalize recording: {err}");
            }
        }

        log::info!("video ingest stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_frame_planes_are_consistent() {
        let frame = VideoFrame::blank(16, 8);
        assert_eq!(frame.y.len(), 16 * 8);
        assert_eq!(frame.u.len(), 16 * 8 / 4);
        assert_eq!(frame.v.len(), 16 * 8 / 4);
        assert_eq!(YUVSource::y_stride(&frame), 16);
        assert_eq!(YUVSource::u_stride(&frame), 8);
    }

    #[test]
    fn frame_observable_keeps_only_latest() {
        let value = ObservableValue::new(None);

        for height in [2u32, 4, 6] {
            value.set(Some(Arc::new(VideoFrame::blank(8, height))));
        }

        let latest = value.get().unwrap();
        assert_eq!(latest.height, 6);
    }
}
