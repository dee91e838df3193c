//! Draw loop: raw frames plus the latest cursor sample into an encoded clip.
//!
//! The loop runs at the cadence the frame source delivers frames. At the
//! top of every iteration it checks that the session is still
//! `Recording`; leaving that state is its only stop condition besides the
//! stream ending. Every exit path stops the frame source.

use std::time::Duration;

use image::RgbaImage;
use loopcast_common::clock::{FramePacer, SessionClock};
use loopcast_common::error::{LoopcastError, LoopcastResult};
use loopcast_cursor_relay::CursorFeed;
use loopcast_model::cursor::CursorSample;
use loopcast_model::session::SessionState;
use tokio::sync::watch;

use crate::glyph::{draw_cursor, CursorOverlay};
use crate::host::{CaptureHost, ClipEncoder, Frame, FrameSource};

/// Why the draw loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEnd {
    /// The session left `Recording`.
    Stopped,
    /// The frame source ended on its own (target closed or lost).
    SourceEnded,
}

/// A finalized recording.
#[derive(Debug, Clone)]
pub struct Clip {
    pub bytes: Vec<u8>,
    pub frames: u64,
    pub width: u32,
    pub height: u32,
    pub duration: Duration,
    pub end: CaptureEnd,
}

/// One recording's compositor.
pub struct Compositor {
    frames: Box<dyn FrameSource>,
    cursor: CursorFeed,
    pointer_space: Option<(u32, u32)>,
    state: watch::Receiver<SessionState>,
    fps: u32,
}

impl Compositor {
    pub fn new(
        frames: Box<dyn FrameSource>,
        cursor: CursorFeed,
        pointer_space: Option<(u32, u32)>,
        state: watch::Receiver<SessionState>,
        fps: u32,
    ) -> Self {
        Self {
            frames,
            cursor,
            pointer_space,
            state,
            fps: fps.max(1),
        }
    }

    /// Run until the session leaves `Recording` or the stream ends, then
    /// finalize the clip.
    ///
    /// A recording that produced no frames, or frames with zero area, is an
    /// `Encode` error rather than an empty clip.
    pub async fn run(mut self, host: &dyn CaptureHost) -> LoopcastResult<Clip> {
        let mut encoder: Option<(Box<dyn ClipEncoder>, u32, u32)> = None;
        let result = self.draw_loop(host, &mut encoder).await;
        self.frames.stop().await;

        match result {
            Ok((frames, duration, end)) => {
                let Some((encoder, width, height)) = encoder else {
                    return Err(LoopcastError::encode("no frames were captured"));
                };
                if frames == 0 {
                    encoder.abort().await;
                    return Err(LoopcastError::encode("no frames were captured"));
                }
                let bytes = encoder.finish().await?;
                if bytes.is_empty() {
                    return Err(LoopcastError::encode("encoder produced no data"));
                }
                tracing::info!(frames, width, height, bytes = bytes.len(), ?end, "Clip finalized");
                Ok(Clip {
                    bytes,
                    frames,
                    width,
                    height,
                    duration,
                    end,
                })
            }
            Err(e) => {
                if let Some((encoder, _, _)) = encoder {
                    encoder.abort().await;
                }
                Err(e)
            }
        }
    }

    async fn draw_loop(
        &mut self,
        host: &dyn CaptureHost,
        encoder: &mut Option<(Box<dyn ClipEncoder>, u32, u32)>,
    ) -> LoopcastResult<(u64, Duration, CaptureEnd)> {
        let clock = SessionClock::begin();
        let mut pacer = FramePacer::new(self.fps);
        let mut encoded = 0u64;

        loop {
            if *self.state.borrow() != SessionState::Recording {
                return Ok((encoded, clock.elapsed(), CaptureEnd::Stopped));
            }

            let next = tokio::select! {
                changed = self.state.changed() => {
                    if changed.is_err() {
                        return Ok((encoded, clock.elapsed(), CaptureEnd::Stopped));
                    }
                    continue;
                }
                frame = self.frames.next_frame() => frame?,
            };
            let Some(Frame { mut image, .. }) = next else {
                tracing::info!(frames = encoded, "Frame source ended");
                return Ok((encoded, clock.elapsed(), CaptureEnd::SourceEnded));
            };

            if !pacer.admit(clock.elapsed()) {
                continue;
            }
            let (width, height) = image.dimensions();
            if width == 0 || height == 0 {
                return Err(LoopcastError::encode(format!(
                    "captured frame has zero area ({width}x{height})"
                )));
            }

            if let Some(sample) = self.cursor.latest() {
                draw_cursor(&mut image, overlay_for(&sample, self.pointer_space, width, height));
            }

            if encoder.is_none() {
                let opened = host.open_encoder(width, height, self.fps).await?;
                tracing::debug!(width, height, fps = self.fps, "Encoder opened");
                *encoder = Some((opened, width, height));
            }
            if let Some((active, enc_width, enc_height)) = encoder.as_mut() {
                if (width, height) != (*enc_width, *enc_height) {
                    image = fit_to(&image, *enc_width, *enc_height);
                }
                active.push_frame(&image).await?;
            }
            encoded += 1;
        }
    }
}

/// Map a cursor sample into raster pixels.
///
/// Samples already in raster space pass through; otherwise they are
/// scaled by the raster-to-sample ratio.
pub fn overlay_for(
    sample: &CursorSample,
    pointer_space: Option<(u32, u32)>,
    width: u32,
    height: u32,
) -> CursorOverlay {
    let (x, y) = match pointer_space {
        Some((sw, sh)) if sw > 0 && sh > 0 && (sw, sh) != (width, height) => (
            sample.x * width as f64 / sw as f64,
            sample.y * height as f64 / sh as f64,
        ),
        _ => (sample.x, sample.y),
    };
    CursorOverlay {
        x,
        y,
        pressed: sample.button_down,
    }
}

/// Crop or pad `image` to the encoder's fixed size.
fn fit_to(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let mut out = RgbaImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        if x < width && y < height {
            out.put_pixel(x, y, *pixel);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeHost, FakeSourceScript};
    use image::Rgba;
    use loopcast_cursor_relay::cursor_channel;
    use loopcast_model::target::SurfaceRef;
    use std::sync::Arc;

    const GRAY: Rgba<u8> = Rgba([128, 128, 128, 255]);

    async fn acquire(host: &FakeHost) -> Box<dyn FrameSource> {
        host.acquire(&SurfaceRef::url(1, "https://example.com"))
            .await
            .unwrap()
            .frames
    }

    #[test]
    fn samples_are_scaled_into_raster_space() {
        let sample = CursorSample::new(100.0, 50.0, true);
        let same = overlay_for(&sample, None, 100, 100);
        assert_eq!((same.x, same.y), (100.0, 50.0));
        assert!(same.pressed);

        let scaled = overlay_for(&sample, Some((200, 100)), 100, 100);
        assert_eq!((scaled.x, scaled.y), (50.0, 50.0));

        let degenerate = overlay_for(&sample, Some((0, 0)), 100, 100);
        assert_eq!((degenerate.x, degenerate.y), (100.0, 50.0));
    }

    #[tokio::test]
    async fn frame_reflects_most_recently_received_sample() {
        let host = FakeHost::new(FakeSourceScript::Frames {
            count: 1,
            width: 64,
            height: 64,
        });
        let frames = acquire(&host).await;
        let (sink, feed) = cursor_channel();
        sink.send_replace(Some(CursorSample::new(40.0, 40.0, false)));
        // A newer sample arrives before the draw.
        sink.send_replace(Some(CursorSample::new(10.0, 10.0, false)));

        let (_state_tx, state_rx) = watch::channel(SessionState::Recording);
        let clip = Compositor::new(frames, feed, None, state_rx, 1000)
            .run(&host)
            .await
            .unwrap();
        assert_eq!(clip.frames, 1);
        assert_eq!(clip.end, CaptureEnd::SourceEnded);

        let drawn = host.encoded_frames();
        assert_eq!(drawn.len(), 1);
        assert_ne!(*drawn[0].get_pixel(13, 20), GRAY);
        assert_eq!(*drawn[0].get_pixel(43, 50), GRAY);
    }

    #[tokio::test]
    async fn leaving_recording_stops_the_loop_and_the_source() {
        let host = FakeHost::new(FakeSourceScript::Endless {
            width: 32,
            height: 32,
        });
        let frames = acquire(&host).await;
        let (_sink, feed) = cursor_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Recording);

        let host = Arc::new(host);
        let runner = {
            let host = host.clone();
            tokio::spawn(async move {
                Compositor::new(frames, feed, None, state_rx, 1000)
                    .run(host.as_ref())
                    .await
            })
        };
        for _ in 0..400 {
            if !host.encoded_frames().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        state_tx.send_replace(SessionState::Stopping);

        let clip = runner.await.unwrap().unwrap();
        assert_eq!(clip.end, CaptureEnd::Stopped);
        assert!(clip.frames >= 1);
        assert_eq!(host.live_streams(), 0);
    }

    #[tokio::test]
    async fn zero_frames_is_an_encode_error() {
        let host = FakeHost::new(FakeSourceScript::Frames {
            count: 0,
            width: 32,
            height: 32,
        });
        let frames = acquire(&host).await;
        let (_sink, feed) = cursor_channel();
        let (_state_tx, state_rx) = watch::channel(SessionState::Recording);
        let err = Compositor::new(frames, feed, None, state_rx, 30)
            .run(&host)
            .await
            .unwrap_err();
        assert!(matches!(err, LoopcastError::Encode { .. }));
        assert_eq!(host.live_streams(), 0);
    }

    #[tokio::test]
    async fn zero_area_frames_are_an_encode_error_and_release_the_source() {
        let host = FakeHost::new(FakeSourceScript::Frames {
            count: 3,
            width: 0,
            height: 24,
        });
        let frames = acquire(&host).await;
        let (_sink, feed) = cursor_channel();
        let (_state_tx, state_rx) = watch::channel(SessionState::Recording);
        let err = Compositor::new(frames, feed, None, state_rx, 30)
            .run(&host)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("zero area"), "{err}");
        assert_eq!(host.live_streams(), 0);
    }

    #[test]
    fn mismatched_frames_are_cropped_to_encoder_size() {
        let image = RgbaImage::from_pixel(8, 4, GRAY);
        let fitted = fit_to(&image, 4, 6);
        assert_eq!(fitted.dimensions(), (4, 6));
        assert_eq!(*fitted.get_pixel(3, 3), GRAY);
        assert_eq!(*fitted.get_pixel(3, 5), Rgba([0, 0, 0, 0]));
    }
}
