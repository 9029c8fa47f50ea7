//! GStreamer-backed encoder.
//!
//! Camera frames enter through an `appsrc` (the encoder's input surface)
//! and leave as a muxed file. Stopping sends EOS and waits for the muxer to
//! finalize the container before tearing the pipeline down.

use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use gst::prelude::*;
use gstreamer as gst;
use vidcap_common::config::{AudioCodec, ContainerFormat, VideoCodec};
use vidcap_common::error::{VidcapError, VidcapResult};

use super::{AudioSource, Encoder, EncoderBackend, EncoderSettings};
use crate::sink::Surface;

const EOS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Creates [`GstEncoder`]s.
#[derive(Debug, Default, Clone)]
pub struct GstEncoderBackend;

impl EncoderBackend for GstEncoderBackend {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn create_encoder(&self) -> VidcapResult<Box<dyn Encoder>> {
        init_gstreamer()?;
        Ok(Box::new(GstEncoder { pipeline: None }))
    }
}

pub struct GstEncoder {
    pipeline: Option<gst::Pipeline>,
}

impl Encoder for GstEncoder {
    fn prepare(&mut self, settings: &EncoderSettings) -> VidcapResult<Surface> {
        self.teardown();

        let launch = encoder_launch(settings);
        tracing::debug!(%launch, "Building encoder pipeline");
        let element = gst::parse::launch(&launch)
            .map_err(|e| VidcapError::encoder(format!("Failed to build pipeline: {e}")))?;
        let pipeline = element
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| VidcapError::encoder("Launch string did not produce a pipeline"))?;

        // Paused allocates the muxer and opens the output file.
        pipeline
            .set_state(gst::State::Paused)
            .map_err(|e| VidcapError::encoder(format!("Failed to prepare encoder: {e:?}")))?;

        self.pipeline = Some(pipeline);
        Ok(Surface::new(settings.video_size))
    }

    fn start(&mut self) -> VidcapResult<()> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| VidcapError::encoder("start before prepare"))?;
        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| VidcapError::encoder(format!("Failed to start encoder: {e:?}")))?;
        Ok(())
    }

    fn stop(&mut self) -> VidcapResult<()> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| VidcapError::encoder("stop before prepare"))?;

        if !pipeline.send_event(gst::event::Eos::new()) {
            tracing::warn!("Failed to send EOS event; output may be truncated");
        } else if let Some(bus) = pipeline.bus() {
            let start = Instant::now();
            loop {
                let elapsed = start.elapsed();
                if elapsed >= EOS_DRAIN_TIMEOUT {
                    tracing::warn!("EOS drain timed out");
                    break;
                }
                let remaining = EOS_DRAIN_TIMEOUT - elapsed;
                match bus.timed_pop(gst::ClockTime::from_nseconds(remaining.as_nanos() as u64)) {
                    Some(msg) => match msg.view() {
                        gst::MessageView::Eos(_) => {
                            tracing::debug!("EOS received; container finalized");
                            break;
                        }
                        gst::MessageView::Error(e) => {
                            tracing::warn!(error = %e.error(), "Encoder error during EOS drain");
                            break;
                        }
                        _ => {}
                    },
                    None => {
                        tracing::warn!("EOS drain timed out");
                        break;
                    }
                }
            }
        }

        pipeline
            .set_state(gst::State::Null)
            .map_err(|e| VidcapError::encoder(format!("Failed to stop encoder: {e:?}")))?;
        Ok(())
    }

    fn reset(&mut self) {
        self.teardown();
    }

    fn release(&mut self) {
        self.teardown();
    }
}

impl GstEncoder {
    fn teardown(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gst::State::Null) {
                tracing::warn!(error = ?e, "Failed to tear down encoder pipeline");
            }
        }
    }
}

/// Launch description for `settings`.
pub fn encoder_launch(settings: &EncoderSettings) -> String {
    let path = escape_path(&settings.output_path);
    let width = settings.video_size.width;
    let height = settings.video_size.height;
    let fps = settings.frame_rate;
    let kbps = (settings.video_bitrate / 1000).max(1);
    let keyint = fps.saturating_mul(2).max(2);

    let (video_enc, video_parse) = match settings.video_codec {
        VideoCodec::H264 => (
            format!("x264enc tune=zerolatency speed-preset=veryfast bitrate={kbps} key-int-max={keyint}"),
            "h264parse",
        ),
        VideoCodec::Hevc => (
            format!("x265enc tune=zerolatency speed-preset=veryfast bitrate={kbps} key-int-max={keyint}"),
            "h265parse",
        ),
    };
    let muxer = match settings.container {
        ContainerFormat::ThreeGpp => "3gppmux",
        ContainerFormat::Mp4 => "mp4mux",
    };
    let orientation = match settings.orientation_hint {
        0 => String::new(),
        degrees => format!(" ! taginject tags=\"image-orientation=rotate-{degrees}\""),
    };

    let mut launch = format!(
        "appsrc name=vidcap-input is-live=true format=time do-timestamp=true caps=video/x-raw,format=NV12,width={width},height={height},framerate={fps}/1 ! queue max-size-buffers=8 ! videoconvert ! {video_enc} ! {video_parse}{orientation} ! queue ! {muxer} name=mux ! filesink location=\"{path}\""
    );

    if settings.audio_source == AudioSource::Mic {
        let audio_enc = match settings.audio_codec {
            AudioCodec::Aac => "avenc_aac",
            AudioCodec::Opus => "opusenc",
        };
        launch.push_str(&format!(
            " autoaudiosrc ! queue ! audioconvert ! audioresample ! {audio_enc} ! queue ! mux."
        ));
    }
    launch
}

fn init_gstreamer() -> VidcapResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    match GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string())) {
        Ok(()) => Ok(()),
        Err(e) => Err(VidcapError::encoder(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::VideoSource;
    use std::path::PathBuf;
    use vidcap_geometry::Size;

    fn settings() -> EncoderSettings {
        EncoderSettings {
            output_path: PathBuf::from("/tmp/out \"x\".3gp"),
            audio_source: AudioSource::Mic,
            video_source: VideoSource::Surface,
            container: ContainerFormat::ThreeGpp,
            video_codec: VideoCodec::H264,
            audio_codec: AudioCodec::Aac,
            video_bitrate: 640_000,
            frame_rate: 30,
            video_size: Size::new(960, 720),
            orientation_hint: 90,
        }
    }

    #[test]
    fn launch_embeds_rate_size_and_rotation() {
        let launch = encoder_launch(&settings());
        assert!(launch.contains("width=960,height=720,framerate=30/1"));
        assert!(launch.contains("bitrate=640"));
        assert!(launch.contains("rotate-90"));
        assert!(launch.contains("3gppmux name=mux"));
        assert!(launch.contains("avenc_aac"));
        assert!(launch.contains("out \\\"x\\\".3gp"));
    }

    #[test]
    fn launch_without_audio_or_rotation() {
        let mut s = settings();
        s.audio_source = AudioSource::None;
        s.orientation_hint = 0;
        let launch = encoder_launch(&s);
        assert!(!launch.contains("autoaudiosrc"));
        assert!(!launch.contains("taginject"));
    }
}
