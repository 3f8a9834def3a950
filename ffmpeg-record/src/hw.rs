//! Hardware-accelerated encoder discovery.
//!
//! Hardware encoders are tried first when requested; the caller falls back to
//! the software encoder when none is present or opening one fails.

use ffmpeg_next::codec;

/// Candidate hardware encoder names for `codec_id`, in preference order.
pub fn hw_encoder_names(codec_id: codec::Id) -> &'static [&'static str] {
    match codec_id {
        codec::Id::H264 => &["h264_nvenc", "h264_vaapi", "h264_qsv", "h264_v4l2m2m"],
        codec::Id::HEVC => &["hevc_nvenc", "hevc_vaapi", "hevc_qsv", "hevc_v4l2m2m"],
        _ => &[],
    }
}

/// Returns the first hardware encoder for `codec_id` compiled into FFmpeg.
pub fn find_hw_encoder(codec_id: codec::Id) -> Option<ffmpeg_next::Codec> {
    for name in hw_encoder_names(codec_id) {
        if let Some(codec) = ffmpeg_next::encoder::find_by_name(name) {
            log::info!("found hardware encoder: {}", name);
            return Some(codec);
        }
    }
    None
}

/// Software encoder by explicit name, or the default encoder for `codec_id`.
pub fn find_sw_encoder(codec_id: codec::Id, name: Option<&str>) -> Option<ffmpeg_next::Codec> {
    match name {
        Some(name) => ffmpeg_next::encoder::find_by_name(name),
        None => ffmpeg_next::encoder::find(codec_id),
    }
}
