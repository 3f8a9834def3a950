use std::path::{Path, PathBuf};

use ffmpeg_next::Rational;

use crate::{
    encoder::EncoderSession,
    error::{Error, Result},
    packet::EncodedPacket,
};

/// Packet-in, file-out sink of the pipeline.
pub trait PacketWriter {
    fn write_header(&mut self) -> Result<()>;

    /// Appends `packet`, converting its timestamps to the stream time base first.
    fn write_packet(&mut self, packet: EncodedPacket) -> Result<()>;

    /// Finalizes the container. Calling it again after success is a no-op.
    fn write_trailer(&mut self) -> Result<()>;

    /// Releases the destination. Only valid after the trailer or before the header.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxerState {
    Unopened,
    HeaderWritten,
    Streaming,
    TrailerWritten,
    Closed,
}

/// Container writer with a single video stream.
pub struct Muxer {
    inner: Option<ffmpeg_next::format::context::Output>,
    path: PathBuf,
    stream_index: Option<usize>,
    stream_time_base: Rational,
    state: MuxerState,
    packets: u64,
}

impl Muxer {
    /// Opens `path` for writing; the container format is guessed from the extension.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let output = ffmpeg_next::format::output(&path).map_err(|source| Error::OutputOpen {
            path: path.display().to_string(),
            source,
        })?;
        log::info!(
            "output opened: {} (format: {})",
            path.display(),
            output.format().name()
        );
        Ok(Self {
            inner: Some(output),
            path,
            stream_index: None,
            stream_time_base: Rational(0, 1),
            state: MuxerState::Unopened,
            packets: 0,
        })
    }

    /// Whether the container wants codec headers out of band (extradata).
    pub fn requires_global_header(&self) -> bool {
        self.inner
            .as_ref()
            .map(|o| {
                o.format()
                    .flags()
                    .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER)
            })
            .unwrap_or(false)
    }

    /// Adds the video stream with codec parameters and time base of an opened encoder.
    pub fn add_video_stream(&mut self, encoder: &EncoderSession) -> Result<()> {
        use crate::encoder::VideoEncoder;

        let output = self.output_mut("add stream", MuxerState::Unopened)?;
        let codec = ffmpeg_next::encoder::find_by_name(encoder.codec_name());
        let mut stream = output.add_stream(codec).map_err(Error::AddStream)?;
        stream.set_parameters(encoder.inner());
        stream.set_time_base(encoder.time_base());
        let index = stream.index();
        self.stream_index = Some(index);
        self.stream_time_base = encoder.time_base();
        Ok(())
    }

    pub fn state(&self) -> MuxerState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn packets_written(&self) -> u64 {
        self.packets
    }

    /// Stream time base, final once the header is written.
    pub fn stream_time_base(&self) -> Rational {
        self.stream_time_base
    }

    fn output_mut(
        &mut self,
        action: &'static str,
        expected: MuxerState,
    ) -> Result<&mut ffmpeg_next::format::context::Output> {
        if self.state != expected {
            return Err(Error::InvalidState {
                action,
                state: self.state,
            });
        }
        self.inner.as_mut().ok_or(Error::InvalidState {
            action,
            state: MuxerState::Closed,
        })
    }
}

impl PacketWriter for Muxer {
    fn write_header(&mut self) -> Result<()> {
        let stream_index = self.stream_index.ok_or(Error::InvalidState {
            action: "write header without stream",
            state: self.state,
        })?;
        let requested = self.stream_time_base;
        let output = self.output_mut("write header", MuxerState::Unopened)?;
        output.write_header().map_err(Error::WriteHeader)?;
        // the muxer may pick its own time base while writing the header
        let time_base = output
            .stream(stream_index)
            .map(|s| s.time_base())
            .unwrap_or(requested);
        self.stream_time_base = time_base;
        self.state = MuxerState::HeaderWritten;
        log::info!("header written, stream time_base: {}", time_base);
        Ok(())
    }

    fn write_packet(&mut self, mut packet: EncodedPacket) -> Result<()> {
        if !matches!(
            self.state,
            MuxerState::HeaderWritten | MuxerState::Streaming
        ) {
            return Err(Error::InvalidState {
                action: "write packet",
                state: self.state,
            });
        }
        let stream_index = self.stream_index.unwrap_or_default();
        let stream_time_base = self.stream_time_base;
        let source_time_base = packet.time_base();
        let source_pts = packet.pts();

        packet.rescale_to(stream_time_base);
        let p = packet.get_mut();
        p.set_stream(stream_index);
        p.set_position(-1);

        let output = self.inner.as_mut().ok_or(Error::InvalidState {
            action: "write packet",
            state: MuxerState::Closed,
        })?;
        p.write_interleaved(output)
            .map_err(|source| Error::WritePacket {
                pts: source_pts,
                time_base: source_time_base,
                source,
            })?;
        self.state = MuxerState::Streaming;
        self.packets += 1;
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        match self.state {
            MuxerState::HeaderWritten | MuxerState::Streaming => {
                let output = self.inner.as_mut().ok_or(Error::InvalidState {
                    action: "write trailer",
                    state: MuxerState::Closed,
                })?;
                output.write_trailer().map_err(Error::WriteTrailer)?;
                self.state = MuxerState::TrailerWritten;
                log::info!(
                    "trailer written: {} ({} packets)",
                    self.path.display(),
                    self.packets
                );
                Ok(())
            }
            MuxerState::TrailerWritten | MuxerState::Closed => Ok(()),
            MuxerState::Unopened => Err(Error::InvalidState {
                action: "write trailer",
                state: self.state,
            }),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self.state {
            MuxerState::TrailerWritten | MuxerState::Unopened => {
                // dropping the context closes the file
                self.inner = None;
                self.state = MuxerState::Closed;
                log::info!("output closed: {}", self.path.display());
                Ok(())
            }
            MuxerState::Closed => Ok(()),
            state => Err(Error::InvalidState {
                action: "close",
                state,
            }),
        }
    }
}
