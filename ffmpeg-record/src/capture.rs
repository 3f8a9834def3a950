use std::ffi::CString;

use ffmpeg_next::{Dictionary, format::Pixel, frame::Video};

use crate::{
    bitmap::{CaptureRegion, RGBA_BYTES_PER_PIXEL, RawBitmap},
    error::{Error, Result},
    scaler::Scaler,
};

/// Source of screen bitmaps. `capture` may block until an image is available.
pub trait ScreenCapture: Send + 'static {
    /// Region every captured bitmap covers, fixed for the lifetime of the source.
    fn region(&self) -> CaptureRegion;

    fn capture(&mut self) -> Result<RawBitmap>;
}

impl ScreenCapture for Box<dyn ScreenCapture> {
    fn region(&self) -> CaptureRegion {
        (**self).region()
    }

    fn capture(&mut self) -> Result<RawBitmap> {
        (**self).capture()
    }
}

/// Platform screen grabber through FFmpeg input devices
/// (x11grab on Linux, gdigrab on Windows, avfoundation on macOS).
pub struct DeviceCapture {
    device: String,
    input: ffmpeg_next::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg_next::codec::decoder::Video,
    scaler: Scaler,
    region: CaptureRegion,
}

impl DeviceCapture {
    /// Opens monitor `display`. `size` limits the grabbed area, None = whole screen.
    pub fn open(display: u32, size: Option<(u32, u32)>, fps: u32) -> Result<Self> {
        let (format_name, url) = grab_device(display);
        if format_name == "gdigrab" && display != 0 {
            log::warn!("gdigrab grabs the whole desktop, display index {} ignored", display);
        }
        let device = format!("{}:{}", format_name, url);

        let mut options = Dictionary::new();
        options.set("framerate", &fps.to_string());
        if let Some((width, height)) = size {
            options.set("video_size", &format!("{}x{}", width, height));
        }
        if format_name == "avfoundation" {
            options.set("capture_cursor", "1");
        }

        let format = find_input_format(format_name).map_err(|source| Error::CaptureDevice {
            device: device.clone(),
            source,
        })?;
        let input = ffmpeg_next::format::open_with(
            &url,
            &ffmpeg_next::format::format::Format::Input(format),
            options,
        )
        .map_err(|source| Error::CaptureDevice {
            device: device.clone(),
            source,
        })?
        .input();

        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| Error::Capture(format!("{} has no video stream", device)))?;
        let stream_index = stream.index();
        let decoder = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .and_then(|ctx| ctx.decoder().video())
            .map_err(|source| Error::CaptureDevice {
                device: device.clone(),
                source,
            })?;

        if decoder.format() == Pixel::None || decoder.width() == 0 || decoder.height() == 0 {
            return Err(Error::Capture(format!("{} reports no usable geometry", device)));
        }

        // YUV 4:2:0 needs even dimensions
        let region = CaptureRegion::sized(decoder.width() & !1, decoder.height() & !1);
        let scaler = Scaler::bilinear(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGBA,
            region.width,
            region.height,
        )?;

        log::info!(
            "capture device opened: {}, native {}x{} {:?}, region {}",
            device,
            decoder.width(),
            decoder.height(),
            decoder.format(),
            region
        );

        Ok(Self {
            device,
            input,
            stream_index,
            decoder,
            scaler,
            region,
        })
    }

    fn next_frame(&mut self) -> Result<Video> {
        loop {
            let mut packet = ffmpeg_next::codec::packet::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => {
                    return Err(Error::Capture(format!("{} closed", self.device)));
                }
                Err(e) => return Err(Error::Capture(format!("{}: {}", self.device, e))),
            }
            if packet.stream() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .map_err(|e| Error::Capture(format!("{}: {}", self.device, e)))?;

            let mut frame = Video::empty();
            match self.decoder.receive_frame(&mut frame) {
                Ok(()) => return Ok(frame),
                Err(ffmpeg_next::Error::Other { errno })
                    if errno == ffmpeg_next::util::error::EAGAIN =>
                {
                    continue;
                }
                Err(e) => return Err(Error::Capture(format!("{}: {}", self.device, e))),
            }
        }
    }
}

impl ScreenCapture for DeviceCapture {
    fn region(&self) -> CaptureRegion {
        self.region
    }

    fn capture(&mut self) -> Result<RawBitmap> {
        let native = self.next_frame()?;
        let mut rgba = Video::empty();
        self.scaler.run(&native, &mut rgba)?;

        let row = self.region.width as usize * RGBA_BYTES_PER_PIXEL;
        let stride = rgba.stride(0);
        let plane = rgba.data(0);
        let mut data = Vec::with_capacity(row * self.region.height as usize);
        for y in 0..self.region.height as usize {
            data.extend_from_slice(&plane[y * stride..y * stride + row]);
        }
        RawBitmap::new(self.region.width, self.region.height, data)
    }
}

/// Resolve input format by name (e.g. "x11grab") via FFmpeg's av_find_input_format.
fn find_input_format(
    name: &str,
) -> std::result::Result<ffmpeg_next::format::format::Input, ffmpeg_next::Error> {
    let cname = CString::new(name).map_err(|_| ffmpeg_next::Error::InvalidData)?;
    let ptr = unsafe { ffmpeg_next::ffi::av_find_input_format(cname.as_ptr()) };
    if ptr.is_null() {
        return Err(ffmpeg_next::Error::DemuxerNotFound);
    }
    Ok(unsafe { ffmpeg_next::format::format::Input::wrap(ptr as *mut _) })
}

/// FFmpeg input device and url grabbing monitor `display` on this platform.
fn grab_device(display: u32) -> (&'static str, String) {
    if cfg!(target_os = "windows") {
        ("gdigrab", "desktop".to_string())
    } else if cfg!(target_os = "macos") {
        ("avfoundation", format!("Capture screen {}:none", display))
    } else {
        ("x11grab", format!(":{}.0", display))
    }
}

/// What a [`PatternCapture`] draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Solid([u8; 4]),
    /// Vertical color bars scrolling one bar width every 8 frames.
    Bars,
}

const BARS: [[u8; 4]; 8] = [
    [235, 235, 235, 255],
    [235, 235, 16, 255],
    [16, 235, 235, 255],
    [16, 235, 16, 255],
    [235, 16, 235, 255],
    [235, 16, 16, 255],
    [16, 16, 235, 255],
    [16, 16, 16, 255],
];

/// Synthetic capture source, for running the pipeline without a display.
pub struct PatternCapture {
    region: CaptureRegion,
    pattern: Pattern,
    frames: u64,
}

impl PatternCapture {
    pub fn new(width: u32, height: u32, pattern: Pattern) -> Self {
        Self {
            region: CaptureRegion::sized(width, height),
            pattern,
            frames: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn draw_bars(&self) -> Vec<u8> {
        let (width, height) = (self.region.width as usize, self.region.height as usize);
        let bar_width = (width / BARS.len()).max(1);
        let shift = (self.frames / 8) as usize;
        let mut row = Vec::with_capacity(width * RGBA_BYTES_PER_PIXEL);
        for x in 0..width {
            row.extend_from_slice(&BARS[(x / bar_width + shift) % BARS.len()]);
        }
        row.repeat(height)
    }
}

impl ScreenCapture for PatternCapture {
    fn region(&self) -> CaptureRegion {
        self.region
    }

    fn capture(&mut self) -> Result<RawBitmap> {
        let bitmap = match self.pattern {
            Pattern::Solid(rgba) => RawBitmap::solid(self.region.width, self.region.height, rgba),
            Pattern::Bars => {
                RawBitmap::new(self.region.width, self.region.height, self.draw_bars())
            }
        };
        self.frames += 1;
        bitmap
    }
}
