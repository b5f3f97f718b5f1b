//! FFmpeg-backed encoding service.
//!
//! Muxes the captured frame stream and the source audio into one container:
//! H.264 + AAC in MP4, or VP9 + Vorbis in WebM. The container is staged in a
//! temp file and tailed after every write, so the controller sees incremental
//! chunks while recording rather than one blob at the end.

use std::ffi::CString;
use std::io::Read;

use rsmpeg::{
    avcodec::{AVCodec, AVCodecContext},
    avformat::AVFormatContextOutput,
    avutil::{AVChannelLayout, AVFrame, AVRational},
    error::RsmpegError,
    ffi,
};
use tempfile::NamedTempFile;

use super::{AudioStreamConfig, EncodeError, EncodingService, VideoStreamConfig};

/// Output container selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// H.264 + AAC, the widest-compatibility target.
    #[default]
    Mp4,
    /// VP9 + Vorbis, the browser-native recording format.
    Webm,
}

impl ContainerFormat {
    fn video_codec_name(&self) -> &'static str {
        match self {
            Self::Mp4 => "libx264",
            Self::Webm => "libvpx-vp9",
        }
    }

    fn audio_codec_name(&self) -> &'static str {
        match self {
            Self::Mp4 => "aac",
            Self::Webm => "libvorbis",
        }
    }

    fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::Webm => "video/webm",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }
}

struct VideoTrack {
    codec_ctx: AVCodecContext,
    frame: AVFrame,
    stream_index: i32,
    pts: i64,
    width: u32,
    height: u32,
}

struct AudioTrack {
    codec_ctx: AVCodecContext,
    frame: AVFrame,
    stream_index: i32,
    frame_size: usize,
    pending: Vec<f32>,
    pts: i64,
}

struct MuxSession {
    format_ctx: AVFormatContextOutput,
    video: VideoTrack,
    audio: AudioTrack,
    reader: std::fs::File,
    staging: NamedTempFile,
}

/// FFmpeg implementation of the platform encoding service.
pub struct FfmpegMuxer {
    container: ContainerFormat,
    bitrate: u64,
    crf: Option<u32>,
    inner: Option<MuxSession>,
}

impl FfmpegMuxer {
    pub fn new(container: ContainerFormat) -> Self {
        Self {
            container,
            bitrate: 8_000_000,
            crf: Some(18),
            inner: None,
        }
    }

    pub fn container(&self) -> ContainerFormat {
        self.container
    }

    fn session(&mut self) -> Result<&mut MuxSession, EncodeError> {
        self.inner.as_mut().ok_or(EncodeError::NotStarted)
    }
}

/// Receive every pending packet from `codec_ctx` and hand it to the muxer.
fn pump_packets(
    codec_ctx: &mut AVCodecContext,
    format_ctx: &mut AVFormatContextOutput,
    stream_index: i32,
) -> Result<(), EncodeError> {
    loop {
        let mut packet = match codec_ctx.receive_packet() {
            Ok(p) => p,
            Err(RsmpegError::EncoderDrainError) | Err(RsmpegError::EncoderFlushedError) => break,
            Err(e) => return Err(e.into()),
        };
        packet.set_stream_index(stream_index);
        let stream_time_base = format_ctx
            .streams()
            .get(stream_index as usize)
            .expect("stream registered at begin")
            .time_base;
        packet.rescale_ts(codec_ctx.time_base, stream_time_base);
        format_ctx.interleaved_write_frame(&mut packet)?;
    }
    Ok(())
}

impl EncodingService for FfmpegMuxer {
    fn begin(
        &mut self,
        video: VideoStreamConfig,
        audio: AudioStreamConfig,
    ) -> Result<(), EncodeError> {
        let staging = tempfile::Builder::new()
            .prefix("shaderwave-")
            .suffix(&format!(".{}", self.container.extension()))
            .tempfile()?;
        let path = CString::new(staging.path().to_string_lossy().as_bytes())
            .map_err(|_| EncodeError::Other("staging path contains NUL".into()))?;

        let mut format_ctx = AVFormatContextOutput::create(&path)?;

        // Video stream, as the renderer produces it: RGBA in, YUV420P out.
        let video_codec_name = self.container.video_codec_name();
        let video_codec = AVCodec::find_encoder_by_name(
            &CString::new(video_codec_name).expect("static codec name"),
        )
        .ok_or_else(|| EncodeError::CodecNotFound(video_codec_name.to_string()))?;
        let mut video_ctx = AVCodecContext::new(&video_codec);
        video_ctx.set_width(video.width as i32);
        video_ctx.set_height(video.height as i32);
        video_ctx.set_pix_fmt(ffi::AV_PIX_FMT_YUV420P);
        video_ctx.set_time_base(AVRational {
            num: 1,
            den: video.fps as i32,
        });
        video_ctx.set_framerate(AVRational {
            num: video.fps as i32,
            den: 1,
        });
        video_ctx.set_bit_rate(self.bitrate as i64);
        if let Some(crf) = self.crf {
            unsafe {
                let crf_str = CString::new(crf.to_string()).expect("numeric string");
                let crf_key = CString::new("crf").expect("static key");
                ffi::av_opt_set(
                    video_ctx.as_mut_ptr() as *mut _,
                    crf_key.as_ptr(),
                    crf_str.as_ptr(),
                    ffi::AV_OPT_SEARCH_CHILDREN as i32,
                );
                let preset = CString::new("medium").expect("static value");
                let preset_key = CString::new("preset").expect("static key");
                ffi::av_opt_set(
                    video_ctx.as_mut_ptr() as *mut _,
                    preset_key.as_ptr(),
                    preset.as_ptr(),
                    ffi::AV_OPT_SEARCH_CHILDREN as i32,
                );
            }
        }
        video_ctx.open(None)?;

        let video_stream_index = {
            let mut stream = format_ctx.new_stream();
            stream.set_codecpar(video_ctx.extract_codecpar());
            stream.set_time_base(video_ctx.time_base);
            stream.index
        };

        let mut video_frame = AVFrame::new();
        video_frame.set_format(ffi::AV_PIX_FMT_YUV420P);
        video_frame.set_width(video.width as i32);
        video_frame.set_height(video.height as i32);
        video_frame.alloc_buffer()?;

        // Audio stream: the played track arrives as mono f32 planar.
        let audio_codec_name = self.container.audio_codec_name();
        let audio_codec = AVCodec::find_encoder_by_name(
            &CString::new(audio_codec_name).expect("static codec name"),
        )
        .ok_or_else(|| EncodeError::CodecNotFound(audio_codec_name.to_string()))?;
        let mut audio_ctx = AVCodecContext::new(&audio_codec);
        audio_ctx.set_sample_rate(audio.sample_rate as i32);
        audio_ctx.set_sample_fmt(ffi::AV_SAMPLE_FMT_FLTP);
        audio_ctx.set_ch_layout(AVChannelLayout::from_nb_channels(1).into_inner());
        audio_ctx.set_time_base(AVRational {
            num: 1,
            den: audio.sample_rate as i32,
        });
        audio_ctx.set_bit_rate(128_000);
        audio_ctx.open(None)?;

        let frame_size = if audio_ctx.frame_size > 0 {
            audio_ctx.frame_size as usize
        } else {
            1024
        };

        let audio_stream_index = {
            let mut stream = format_ctx.new_stream();
            stream.set_codecpar(audio_ctx.extract_codecpar());
            stream.set_time_base(audio_ctx.time_base);
            stream.index
        };

        let mut audio_frame = AVFrame::new();
        audio_frame.set_format(ffi::AV_SAMPLE_FMT_FLTP);
        audio_frame.set_nb_samples(frame_size as i32);
        audio_frame.set_ch_layout(AVChannelLayout::from_nb_channels(1).into_inner());
        audio_frame.set_sample_rate(audio.sample_rate as i32);
        audio_frame.alloc_buffer()?;

        format_ctx.write_header(&mut None)?;

        let reader = std::fs::File::open(staging.path())?;

        log::debug!(
            "muxer opened: {} {}x{}@{} + {} @ {} Hz",
            self.container.video_codec_name(),
            video.width,
            video.height,
            video.fps,
            self.container.audio_codec_name(),
            audio.sample_rate
        );

        self.inner = Some(MuxSession {
            format_ctx,
            video: VideoTrack {
                codec_ctx: video_ctx,
                frame: video_frame,
                stream_index: video_stream_index,
                pts: 0,
                width: video.width,
                height: video.height,
            },
            audio: AudioTrack {
                codec_ctx: audio_ctx,
                frame: audio_frame,
                stream_index: audio_stream_index,
                frame_size,
                pending: Vec::new(),
                pts: 0,
            },
            reader,
            staging,
        });
        Ok(())
    }

    fn push_video_frame(&mut self, rgba: &[u8]) -> Result<(), EncodeError> {
        let session = self.session()?;
        let video = &mut session.video;

        let expected = (video.width * video.height * 4) as usize;
        if rgba.len() != expected {
            return Err(EncodeError::InvalidFrame(format!(
                "expected {} bytes, got {}",
                expected,
                rgba.len()
            )));
        }

        rgba_to_yuv420p(&mut video.frame, rgba, video.width as usize, video.height as usize);
        video.frame.set_pts(video.pts);
        video.pts += 1;

        video.codec_ctx.send_frame(Some(&video.frame))?;
        pump_packets(
            &mut video.codec_ctx,
            &mut session.format_ctx,
            video.stream_index,
        )
    }

    fn push_audio_samples(&mut self, samples: &[f32]) -> Result<(), EncodeError> {
        let session = self.session()?;
        let audio = &mut session.audio;

        audio.pending.extend_from_slice(samples);
        while audio.pending.len() >= audio.frame_size {
            let plane = audio.frame.data[0] as *mut f32;
            unsafe {
                std::ptr::copy_nonoverlapping(audio.pending.as_ptr(), plane, audio.frame_size);
            }
            audio.pending.drain(..audio.frame_size);

            audio.frame.set_pts(audio.pts);
            audio.pts += audio.frame_size as i64;

            audio.codec_ctx.send_frame(Some(&audio.frame))?;
            pump_packets(
                &mut audio.codec_ctx,
                &mut session.format_ctx,
                audio.stream_index,
            )?;
        }
        Ok(())
    }

    fn drain_chunks(&mut self, out: &mut Vec<Vec<u8>>) -> Result<(), EncodeError> {
        let session = self.session()?;
        let mut fresh = Vec::new();
        session.reader.read_to_end(&mut fresh)?;
        if !fresh.is_empty() {
            out.push(fresh);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<Vec<u8>>, EncodeError> {
        let mut session = self.inner.take().ok_or(EncodeError::NotStarted)?;

        // Pad the last partial audio frame with silence and flush both codecs.
        if !session.audio.pending.is_empty() {
            session.audio.pending.resize(session.audio.frame_size, 0.0);
            let audio = &mut session.audio;
            let plane = audio.frame.data[0] as *mut f32;
            unsafe {
                std::ptr::copy_nonoverlapping(audio.pending.as_ptr(), plane, audio.frame_size);
            }
            audio.pending.clear();
            audio.frame.set_pts(audio.pts);
            audio.codec_ctx.send_frame(Some(&audio.frame))?;
            pump_packets(
                &mut audio.codec_ctx,
                &mut session.format_ctx,
                audio.stream_index,
            )?;
        }

        session.video.codec_ctx.send_frame(None)?;
        pump_packets(
            &mut session.video.codec_ctx,
            &mut session.format_ctx,
            session.video.stream_index,
        )?;
        session.audio.codec_ctx.send_frame(None)?;
        pump_packets(
            &mut session.audio.codec_ctx,
            &mut session.format_ctx,
            session.audio.stream_index,
        )?;

        session.format_ctx.write_trailer()?;

        let MuxSession {
            format_ctx,
            mut reader,
            staging,
            ..
        } = session;
        // Close the container before tailing the last bytes.
        drop(format_ctx);

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest)?;
        drop(staging);

        if rest.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![rest])
        }
    }

    fn mime_type(&self) -> &'static str {
        self.container.mime_type()
    }

    fn file_extension(&self) -> &'static str {
        self.container.extension()
    }
}

/// BT.601 RGBA → YUV420P with 2x2 chroma subsampling.
fn rgba_to_yuv420p(frame: &mut AVFrame, rgba: &[u8], width: usize, height: usize) {
    let y_plane = frame.data[0];
    let u_plane = frame.data[1];
    let v_plane = frame.data[2];
    let y_stride = frame.linesize[0] as usize;
    let u_stride = frame.linesize[1] as usize;
    let v_stride = frame.linesize[2] as usize;

    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) * 4;
            let r = rgba[idx] as f32;
            let g = rgba[idx + 1] as f32;
            let b = rgba[idx + 2] as f32;

            let y_val = (0.299 * r + 0.587 * g + 0.114 * b) as u8;
            unsafe {
                *y_plane.add(y * y_stride + x) = y_val;
            }

            if x % 2 == 0 && y % 2 == 0 {
                let u_val = (128.0 - 0.168736 * r - 0.331264 * g + 0.5 * b) as u8;
                let v_val = (128.0 + 0.5 * r - 0.418688 * g - 0.081312 * b) as u8;
                unsafe {
                    *u_plane.add((y / 2) * u_stride + (x / 2)) = u_val;
                    *v_plane.add((y / 2) * v_stride + (x / 2)) = v_val;
                }
            }
        }
    }
}
