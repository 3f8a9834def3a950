use ffmpeg_next::{Dictionary, Rational};

use crate::{
    error::{Error, Result},
    frame::CodecFrame,
    hw::{find_hw_encoder, find_sw_encoder},
    packet::EncodedPacket,
    stream::StreamDescriptor,
};

/// Outcome of one receive attempt on an encoder.
pub enum Drain {
    /// A packet is ready; more may follow.
    Packet(EncodedPacket),
    /// Nothing ready until more input arrives.
    Pending,
    /// End of stream reached, the encoder will not produce anything else.
    Finished,
}

/// Frame-in, packet-out encoder.
pub trait VideoEncoder {
    /// Time base of the packets returned by `receive_packet`.
    fn time_base(&self) -> Rational;

    fn send_frame(&mut self, frame: CodecFrame) -> Result<()>;

    /// Signals that no more frames follow. Buffered packets are drained afterwards.
    fn send_eof(&mut self) -> Result<()>;

    fn receive_packet(&mut self) -> Result<Drain>;
}

#[derive(Debug, Clone)]
pub struct EncoderSettings {
    // "ultrafast", "medium", etc.
    pub preset: Option<String>,
    // "zerolatency", "film", etc.
    pub tune: Option<String>,
    // None = two seconds of frames
    pub keyframe_interval: Option<u32>,
    /// Try hardware encoders before the software one.
    pub hardware: bool,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            preset: Some("ultrafast".to_string()),
            tune: None,
            keyframe_interval: None,
            hardware: false,
        }
    }
}

pub struct EncoderSession {
    inner: ffmpeg_next::codec::encoder::Video,
    codec_name: String,
    time_base: Rational,
    frame_duration: i64,
    last_pts: Option<i64>,
}

impl EncoderSession {
    /// Looks up, configures and opens the encoder described by `descriptor`.
    pub fn open(descriptor: &StreamDescriptor, settings: &EncoderSettings) -> Result<Self> {
        if settings.hardware && descriptor.encoder_name().is_some() {
            log::warn!(
                "encoder {} requested explicitly, skipping hardware encoder search",
                descriptor.encoder_name().unwrap_or_default()
            );
        } else if settings.hardware {
            match find_hw_encoder(descriptor.codec_id()) {
                Some(codec) => {
                    let name = codec.name().to_string();
                    log::info!("attempting hardware encoder: {}", name);
                    match Self::open_codec(codec, descriptor, settings) {
                        Ok(session) => return Ok(session),
                        Err(e) => log::warn!(
                            "hardware encoder {} failed: {}, falling back to software",
                            name,
                            e
                        ),
                    }
                }
                None => log::info!("no hardware encoder found, using software encoder"),
            }
        }

        let codec = find_sw_encoder(descriptor.codec_id(), descriptor.encoder_name())
            .ok_or_else(|| {
                Error::CodecNotFound(
                    descriptor
                        .encoder_name()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("{:?}", descriptor.codec_id())),
                )
            })?;
        Self::open_codec(codec, descriptor, settings)
    }

    fn open_codec(
        codec: ffmpeg_next::Codec,
        descriptor: &StreamDescriptor,
        settings: &EncoderSettings,
    ) -> Result<Self> {
        let codec_name = codec.name().to_string();
        let mut encoder = ffmpeg_next::codec::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(Error::ContextAlloc)?;

        encoder.set_width(descriptor.width());
        encoder.set_height(descriptor.height());
        encoder.set_format(descriptor.pixel_format());
        encoder.set_frame_rate(Some(descriptor.frame_rate()));
        encoder.set_time_base(descriptor.time_base());
        encoder.set_bit_rate(descriptor.bit_rate());
        encoder.set_gop(
            settings
                .keyframe_interval
                .unwrap_or(descriptor.fps() * 2)
                .max(1),
        );
        if descriptor.global_header() {
            encoder.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let mut opts = Dictionary::new();
        if let Some(preset) = settings.preset.as_deref() {
            opts.set("preset", preset);
        }
        if let Some(tune) = settings.tune.as_deref() {
            opts.set("tune", tune);
        }

        let encoder = encoder
            .open_with(opts)
            .map_err(|source| Error::EncoderOpen {
                codec: codec_name.clone(),
                source,
            })?;

        // the encoder may adjust the requested time base while opening
        let time_base: Rational = unsafe { (*encoder.0.as_ptr()).time_base.into() };
        let ticks_per_second = time_base.denominator() as i64 / time_base.numerator().max(1) as i64;
        let frame_duration = ticks_per_second / descriptor.fps().max(1) as i64;

        log::info!(
            "encoder opened: {}, {}, encoder time_base: {}",
            codec_name,
            descriptor,
            time_base
        );

        Ok(Self {
            inner: encoder,
            codec_name,
            time_base,
            frame_duration,
            last_pts: None,
        })
    }

    pub fn codec_name(&self) -> &str {
        &self.codec_name
    }

    pub fn frame_duration(&self) -> i64 {
        self.frame_duration
    }

    pub fn inner(&self) -> &ffmpeg_next::codec::encoder::Video {
        &self.inner
    }
}

impl VideoEncoder for EncoderSession {
    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn send_frame(&mut self, frame: CodecFrame) -> Result<()> {
        let pts = frame.pts();
        match (pts, self.last_pts) {
            (Some(pts), Some(previous)) if pts > previous => {}
            (Some(_), None) => {}
            _ => {
                return Err(Error::NonMonotonicPts {
                    pts,
                    previous: self.last_pts,
                });
            }
        }
        self.inner
            .send_frame(frame.as_video())
            .map_err(Error::SendFrame)?;
        self.last_pts = pts;
        Ok(())
    }

    fn send_eof(&mut self) -> Result<()> {
        self.inner.send_eof().map_err(Error::SendEof)
    }

    fn receive_packet(&mut self) -> Result<Drain> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        match self.inner.receive_packet(&mut packet) {
            Ok(()) => {
                let mut packet = EncodedPacket::from((packet, self.time_base));
                if packet.duration() == 0 {
                    packet.set_duration(self.frame_duration);
                }
                Ok(Drain::Packet(packet))
            }
            Err(ffmpeg_next::Error::Other { errno })
                if errno == ffmpeg_next::util::error::EAGAIN =>
            {
                Ok(Drain::Pending)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(Drain::Finished),
            Err(err) => Err(Error::ReceivePacket(err)),
        }
    }
}

#[cfg(test)]
#[path = "encoder_test.rs"]
mod encoder_test;
