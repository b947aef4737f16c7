use std::fs;
use std::path::{Path, PathBuf};

use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::ProbeError;

/// Probed attributes of a source file, trusted as accurate by the rest of
/// the pipeline.
#[derive(Debug, Clone)]
pub struct AudioInfo {
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// Stream duration in milliseconds.
    pub duration_ms: f64,
    /// Channel count of the first decodable track.
    pub channels: u32,
}

/// Reads size, duration and channel count of an audio file without decoding
/// its samples.
///
/// # Arguments
/// * `path` - Path to the audio file
pub fn probe_audio(path: impl AsRef<Path>) -> Result<AudioInfo, ProbeError> {
    let path = path.as_ref();
    let size = fs::metadata(path)?.len();

    let file = fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|os| os.to_str()) {
        hint.with_extension(ext);
    }
    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();

    let probed = symphonia::default::get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
    let format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(ProbeError::NoTrack)?;

    let channels = track
        .codec_params
        .channels
        .ok_or(ProbeError::MissingChannels)?
        .count() as u32;

    let n_frames = track
        .codec_params
        .n_frames
        .ok_or(ProbeError::MissingDuration)?;
    let duration_ms = match track.codec_params.time_base {
        Some(tb) => {
            let time = tb.calc_time(n_frames);
            (time.seconds as f64 + time.frac) * 1000.0
        }
        None => {
            let sample_rate = track
                .codec_params
                .sample_rate
                .ok_or(ProbeError::MissingDuration)?;
            n_frames as f64 / sample_rate as f64 * 1000.0
        }
    };

    Ok(AudioInfo {
        path: path.to_path_buf(),
        size,
        duration_ms,
        channels,
    })
}
