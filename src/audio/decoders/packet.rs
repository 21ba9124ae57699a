use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{self, DecoderOptions, CodecType};
use symphonia::core::conv::ConvertibleSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use crate::audio::stream::SharedStream;
use crate::error::DecodeError;
use crate::models::{AudioCodec, PcmSpec};

// A corrupt packet is skipped, but this many in a row is fatal.
const MAX_DECODE_RETRIES: usize = 3;

/// Output bit depth of the compressed-format decoders
pub(crate) const OUTPUT_BIT_DEPTH: u16 = 16;

// Longest Vorbis packet in frames (half the largest block size)
const VORBIS_PREROLL_FRAMES: u64 = 4096;

/// Packet-level access to one track of a symphonia container.
pub(crate) struct PacketReader {
    stream: SharedStream,
    codec: AudioCodec,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn codecs::Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    spec: PcmSpec,
    total_frames: Option<u64>,
    /// Frame the next sample handed out must be, after a seek
    seek_target: Option<u64>,
    at_start: bool,
}

/// Track encodings accepted for each container, with the bit depth they
/// are handed out at
fn track_codecs(codec: AudioCodec) -> &'static [(CodecType, u16)] {
    match codec {
        AudioCodec::Wav => &[(codecs::CODEC_TYPE_PCM_S16LE, 16), (codecs::CODEC_TYPE_PCM_U8, 8)],
        AudioCodec::OggVorbis => &[(codecs::CODEC_TYPE_VORBIS, OUTPUT_BIT_DEPTH)],
        AudioCodec::Flac => &[(codecs::CODEC_TYPE_FLAC, OUTPUT_BIT_DEPTH)],
        AudioCodec::Mp3 => &[(codecs::CODEC_TYPE_MP3, OUTPUT_BIT_DEPTH)],
    }
}

impl PacketReader {
    pub fn open(stream: SharedStream, codec: AudioCodec) -> Result<Self, DecodeError> {
        let media_source = MediaSourceStream::new(Box::new(stream.clone()), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = codec.extensions().first() {
            hint.with_extension(extension);
        }

        let opened = symphonia::default::get_probe()
            .format(&hint, media_source, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::format(codec.name(), format!("unrecognized container: {}", e)))?;
        let format = opened.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != codecs::CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::format(codec.name(), "no audio track found"))?;

        let params = &track.codec_params;
        let bit_depth = track_codecs(codec)
            .iter()
            .find(|(accepted, _)| *accepted == params.codec)
            .map(|&(_, bits)| bits)
            .ok_or_else(|| {
                let name = symphonia::default::get_codecs()
                    .get_codec(params.codec)
                    .map_or("unknown", |descriptor| descriptor.short_name);
                DecodeError::format(codec.name(), format!("unsupported {} encoding", name))
            })?;
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| DecodeError::format(codec.name(), "unknown sample rate"))?;
        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| DecodeError::format(codec.name(), "unknown channel layout"))?;
        if channels == 0 || channels > 2 {
            return Err(DecodeError::UnsupportedLayout { channels, bit_depth });
        }

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| DecodeError::DecodeFailed(format!("Failed to create {} decoder: {}", codec.name(), e)))?;

        let spec = PcmSpec::new(channels, sample_rate, bit_depth);
        debug!("Opened {} stream: {}", codec.name(), spec.format_description());

        Ok(Self {
            track_id: track.id,
            time_base: params.time_base,
            total_frames: params.n_frames,
            stream,
            codec,
            format,
            decoder,
            spec,
            seek_target: None,
            at_start: true,
        })
    }

    pub fn spec(&self) -> PcmSpec {
        self.spec
    }

    pub fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    /// Decode the next packet of the track and append its interleaved
    /// samples to `out`. Returns false once the stream is exhausted.
    pub fn next_samples<S: ConvertibleSample>(
        &mut self,
        sample_buf: &mut Option<SampleBuffer<S>>,
        out: &mut Vec<S>,
    ) -> Result<bool, DecodeError> {
        let channels = self.spec.channels as usize;
        let mut decode_errors = 0;

        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    debug!("{} stream changed layout, treating as end of stream", self.codec.name());
                    return Ok(false);
                }
                Err(SymphoniaError::IoError(err)) => return Err(DecodeError::Io(err)),
                Err(err) => {
                    return Err(DecodeError::DecodeFailed(format!("Failed to read packet: {}", err)));
                }
            };
            self.at_start = false;

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(err)) => {
                    decode_errors += 1;
                    warn!("Skipping corrupt {} packet: {}", self.codec.name(), err);
                    if decode_errors > MAX_DECODE_RETRIES {
                        return Err(DecodeError::DecodeFailed(format!(
                            "{} consecutive corrupt packets: {}",
                            decode_errors, err
                        )));
                    }
                    continue;
                }
                Err(SymphoniaError::IoError(err)) => return Err(DecodeError::Io(err)),
                Err(err) => {
                    return Err(DecodeError::DecodeFailed(format!("Failed to decode packet: {}", err)));
                }
            };

            if decoded.spec().channels.count() != channels {
                return Err(DecodeError::DecodeFailed(
                    "channel layout changed mid-stream".to_string(),
                ));
            }
            if decoded.frames() == 0 {
                continue;
            }

            let needed = decoded.capacity() * channels;
            if sample_buf.as_ref().map_or(true, |buf| buf.capacity() < needed) {
                *sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, *decoded.spec()));
            }
            let Some(buf) = sample_buf.as_mut() else {
                continue;
            };
            buf.copy_interleaved_ref(decoded);

            let samples = buf.samples();
            let mut skip = 0;
            if let Some(target) = self.seek_target {
                let start = self.ts_to_frames(packet.ts());
                let frames = (samples.len() / channels) as u64;
                if start + frames <= target {
                    continue;
                }
                skip = target.saturating_sub(start) as usize * channels;
                self.seek_target = None;
            }
            out.extend_from_slice(&samples[skip..]);
            return Ok(true);
        }
    }

    /// Position the reader so the next sample produced is `frame`
    pub fn seek_frame(&mut self, frame: u64) -> Result<(), DecodeError> {
        if let Some(total) = self.total_frames {
            if frame > total {
                return Err(DecodeError::DecodeFailed(format!(
                    "seek to frame {} beyond end ({})",
                    frame, total
                )));
            }
        }
        if frame == 0 && self.at_start {
            return Ok(());
        }

        // Vorbis output lags its packets by one block after a decoder reset
        let preroll = match self.codec {
            AudioCodec::OggVorbis => VORBIS_PREROLL_FRAMES,
            _ => 0,
        };
        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: self.frames_to_ts(frame.saturating_sub(preroll)),
                    track_id: self.track_id,
                },
            )
            .map_err(|e| DecodeError::DecodeFailed(format!("Seek failed: {}", e)))?;
        debug!(
            "{} seek to frame {} landed on ts {}",
            self.codec.name(),
            frame,
            seeked.actual_ts
        );

        self.decoder.reset();
        self.seek_target = Some(frame);
        self.at_start = frame == 0;
        Ok(())
    }

    /// Re-open the container from the first byte of the stream
    pub fn reopen(&mut self) -> Result<(), DecodeError> {
        if self.at_start {
            return Ok(());
        }
        self.stream.seek_to_start()?;
        *self = Self::open(self.stream.clone(), self.codec)?;
        Ok(())
    }

    fn frames_to_ts(&self, frames: u64) -> u64 {
        match self.time_base {
            Some(tb) if !(tb.numer == 1 && tb.denom == self.spec.sample_rate) => {
                tb.calc_timestamp(Time::from(frames as f64 / self.spec.sample_rate as f64))
            }
            _ => frames,
        }
    }

    fn ts_to_frames(&self, ts: u64) -> u64 {
        match self.time_base {
            Some(tb) if !(tb.numer == 1 && tb.denom == self.spec.sample_rate) => {
                let time = tb.calc_time(ts);
                ((time.seconds as f64 + time.frac) * self.spec.sample_rate as f64).round() as u64
            }
            _ => ts,
        }
    }
}
