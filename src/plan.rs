use std::path::Path;

use strum_macros::Display;

use crate::probe::AudioInfo;

/// MP3 bitrate control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "bin", derive(clap::ValueEnum))]
pub enum Mp3Mode {
    Vbr,
    Cbr,
}

/// Opus bitrate control mode. `Cvbr` is constrained VBR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "bin", derive(clap::ValueEnum))]
pub enum OpusMode {
    Vbr,
    Cbr,
    Cvbr,
}

/// Opus encoder application hint, passed through verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "bin", derive(clap::ValueEnum))]
pub enum OpusApplication {
    Voip,
    Audio,
    Lowdelay,
}

#[derive(Debug, Clone)]
pub struct Mp3Config {
    pub mode: Mp3Mode,
    /// VBR quality: 0 = best/largest, 9 = worst/smallest.
    pub vbr: u8,
    /// CBR bitrate per channel in kbit/s.
    pub cbrpch: u32,
    /// 0 = high quality/slow, 9 = low quality/fast.
    pub compression_level: u8,
}

impl Default for Mp3Config {
    fn default() -> Self {
        Mp3Config {
            mode: Mp3Mode::Vbr,
            vbr: 4,
            cbrpch: 64,
            compression_level: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpusConfig {
    pub mode: OpusMode,
    /// Bitrate per channel in kbit/s.
    pub bpch: u32,
    /// 0 = low quality/fast, 10 = high quality/slow.
    pub compression_level: u8,
    pub application: OpusApplication,
}

impl Default for OpusConfig {
    fn default() -> Self {
        OpusConfig {
            mode: OpusMode::Vbr,
            bpch: 64,
            compression_level: 10,
            application: OpusApplication::Audio,
        }
    }
}

/// Codec selection. Exactly one variant's parameters are ever read, so the
/// two configurations are a closed sum rather than a struct with two
/// optional halves.
#[derive(Debug, Clone)]
pub enum CodecConfig {
    Mp3(Mp3Config),
    Opus(OpusConfig),
}

impl CodecConfig {
    pub fn name(&self) -> &'static str {
        match self {
            CodecConfig::Mp3(_) => "mp3",
            CodecConfig::Opus(_) => "opus",
        }
    }

    /// Output container for this codec: mp3 stays mp3, opus goes into ogg.
    pub fn output_kind(&self) -> OutputKind {
        match self {
            CodecConfig::Mp3(_) => OutputKind::Mp3,
            CodecConfig::Opus(_) => OutputKind::Ogg,
        }
    }
}

/// Output container, doubling as ffmpeg's `-f` value and the output file
/// extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputKind {
    Mp3,
    Ogg,
}

impl OutputKind {
    #[inline]
    pub fn extension(self) -> &'static str {
        match self {
            OutputKind::Mp3 => "mp3",
            OutputKind::Ogg => "ogg",
        }
    }
}

/// What to do with a single input file: hand `args` to ffmpeg, or leave the
/// file alone because its bitrate density is already below the threshold.
#[derive(Debug)]
pub enum EncodingPlan {
    Skip {
        /// The computed density, for the caller's log line.
        kb_per_channel_minute: f64,
    },
    Encode {
        args: Vec<String>,
        output: OutputKind,
    },
}

/// Source bitrate density in KB per channel per minute.
///
/// Zero duration or zero channels yields inf/NaN; the threshold comparison
/// in [`build_plan`] is then false and the file proceeds to encode.
pub fn kb_per_channel_minute(size: u64, duration_ms: f64, channels: u32) -> f64 {
    let kb = size as f64 / 1024.0;
    let minutes = duration_ms / 1000.0 / 60.0;
    kb / channels as f64 / minutes
}

/// Decides whether to encode `input` at all, and with which engine
/// arguments. Pure: no I/O, no logging.
///
/// The skip check runs before any argument is built. A threshold of zero
/// counts as unset and never skips.
pub fn build_plan(
    input: &AudioInfo,
    codec: &CodecConfig,
    skip_threshold: Option<f64>,
) -> EncodingPlan {
    if let Some(threshold) = skip_threshold {
        if threshold > 0.0 {
            let density = kb_per_channel_minute(input.size, input.duration_ms, input.channels);
            if threshold > density {
                return EncodingPlan::Skip {
                    kb_per_channel_minute: density,
                };
            }
        }
    }

    EncodingPlan::Encode {
        args: encoder_args(&input.path, codec, input.channels),
        output: codec.output_kind(),
    }
}

/// Builds the ffmpeg argument list for one input. The engine is
/// positional-flag sensitive, so quality flags always follow the codec
/// selection and `-f` comes last; the runner appends the output path.
pub fn encoder_args(input: &Path, codec: &CodecConfig, channels: u32) -> Vec<String> {
    let mut args: Vec<String> = vec!["-i".into(), input.to_string_lossy().into_owned()];

    match codec {
        CodecConfig::Opus(opus) => {
            args.push("-c:a".into());
            args.push("opus".into());

            // ffmpeg cannot mux cover art into ogg (trac ticket 4448);
            // leaving a video stream in produces files some players refuse
            // to open, so drop it outright.
            args.push("-vn".into());

            args.push("-vbr".into());
            args.push(
                match opus.mode {
                    OpusMode::Vbr => "on",
                    OpusMode::Cvbr => "constrained",
                    OpusMode::Cbr => "off",
                }
                .into(),
            );

            args.push("-b:a".into());
            args.push(format!("{}k", opus.bpch * channels));

            args.push("-compression_level".into());
            args.push(opus.compression_level.to_string());
            args.push("-application".into());
            args.push(opus.application.to_string());
        }
        CodecConfig::Mp3(mp3) => {
            args.push("-c:a".into());
            args.push("libmp3lame".into());

            match mp3.mode {
                Mp3Mode::Vbr => {
                    args.push("-q:a".into());
                    args.push(mp3.vbr.to_string());
                }
                Mp3Mode::Cbr => {
                    args.push("-b:a".into());
                    args.push(format!("{}k", mp3.cbrpch * channels));
                }
            }

            args.push("-compression_level".into());
            args.push(mp3.compression_level.to_string());

            // Keep album art, and pin the tag revision common players cope
            // with.
            args.push("-c:v".into());
            args.push("copy".into());
            args.push("-id3v2_version".into());
            args.push("3".into());
        }
    }

    args.push("-f".into());
    args.push(codec.output_kind().to_string());

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn stereo_minute() -> AudioInfo {
        AudioInfo {
            path: PathBuf::from("track.flac"),
            size: 1_048_576,
            duration_ms: 60_000.0,
            channels: 2,
        }
    }

    fn opus_config() -> CodecConfig {
        CodecConfig::Opus(OpusConfig {
            mode: OpusMode::Cbr,
            bpch: 64,
            compression_level: 10,
            application: OpusApplication::Audio,
        })
    }

    fn mp3_vbr_config() -> CodecConfig {
        CodecConfig::Mp3(Mp3Config {
            mode: Mp3Mode::Vbr,
            vbr: 2,
            cbrpch: 64,
            compression_level: 0,
        })
    }

    /// Value of the argument following `flag`, if present.
    fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn density_of_one_mib_stereo_minute_is_512() {
        assert_eq!(kb_per_channel_minute(1_048_576, 60_000.0, 2), 512.0);
    }

    #[test]
    fn threshold_below_density_proceeds() {
        let plan = build_plan(&stereo_minute(), &opus_config(), Some(500.0));
        assert!(matches!(plan, EncodingPlan::Encode { .. }));
    }

    #[test]
    fn threshold_above_density_skips() {
        let plan = build_plan(&stereo_minute(), &opus_config(), Some(600.0));
        match plan {
            EncodingPlan::Skip {
                kb_per_channel_minute,
            } => assert_eq!(kb_per_channel_minute.round(), 512.0),
            EncodingPlan::Encode { .. } => panic!("expected a skip"),
        }
    }

    #[test]
    fn zero_threshold_never_skips() {
        let plan = build_plan(&stereo_minute(), &opus_config(), Some(0.0));
        assert!(matches!(plan, EncodingPlan::Encode { .. }));
    }

    #[test]
    fn absent_threshold_never_skips() {
        let plan = build_plan(&stereo_minute(), &opus_config(), None);
        assert!(matches!(plan, EncodingPlan::Encode { .. }));
    }

    #[test]
    fn zero_duration_proceeds() {
        let mut input = stereo_minute();
        input.duration_ms = 0.0;
        let plan = build_plan(&input, &opus_config(), Some(600.0));
        assert!(matches!(plan, EncodingPlan::Encode { .. }));
    }

    #[test]
    fn zero_channels_proceeds() {
        let mut input = stereo_minute();
        input.channels = 0;
        let plan = build_plan(&input, &opus_config(), Some(600.0));
        assert!(matches!(plan, EncodingPlan::Encode { .. }));
    }

    #[test]
    fn skip_is_monotonic_in_threshold() {
        let input = stereo_minute();
        let codec = opus_config();
        let mut skipped_before = false;
        for threshold in [100.0, 300.0, 512.0, 513.0, 600.0, 10_000.0] {
            let skipped = matches!(
                build_plan(&input, &codec, Some(threshold)),
                EncodingPlan::Skip { .. }
            );
            // Raising the threshold can turn a proceed into a skip, never
            // the reverse.
            assert!(skipped || !skipped_before);
            skipped_before = skipped;
        }
    }

    #[test]
    fn opus_args_drop_video_streams() {
        let args = encoder_args(Path::new("in.flac"), &opus_config(), 2);
        assert!(args.iter().any(|a| a == "-vn"));
        assert!(!args.iter().any(|a| a == "-c:v"));
    }

    #[test]
    fn opus_cbr_bitrate_scales_with_channels() {
        let args = encoder_args(Path::new("in.flac"), &opus_config(), 2);
        assert_eq!(flag_value(&args, "-vbr"), Some("off"));
        assert_eq!(flag_value(&args, "-b:a"), Some("128k"));

        let args = encoder_args(Path::new("in.flac"), &opus_config(), 6);
        assert_eq!(flag_value(&args, "-b:a"), Some("384k"));
    }

    #[test]
    fn opus_modes_map_to_vbr_flag() {
        for (mode, expected) in [
            (OpusMode::Vbr, "on"),
            (OpusMode::Cvbr, "constrained"),
            (OpusMode::Cbr, "off"),
        ] {
            let codec = CodecConfig::Opus(OpusConfig {
                mode,
                ..OpusConfig::default()
            });
            let args = encoder_args(Path::new("in.flac"), &codec, 2);
            assert_eq!(flag_value(&args, "-vbr"), Some(expected));
        }
    }

    #[test]
    fn opus_passthrough_flags() {
        let args = encoder_args(Path::new("in.flac"), &opus_config(), 2);
        assert_eq!(flag_value(&args, "-compression_level"), Some("10"));
        assert_eq!(flag_value(&args, "-application"), Some("audio"));
    }

    #[test]
    fn mp3_args_keep_cover_art_and_pin_tag_version() {
        let args = encoder_args(Path::new("in.flac"), &mp3_vbr_config(), 2);
        assert_eq!(flag_value(&args, "-c:v"), Some("copy"));
        assert_eq!(flag_value(&args, "-id3v2_version"), Some("3"));
    }

    #[test]
    fn mp3_vbr_uses_quality_scale_not_bitrate() {
        let args = encoder_args(Path::new("in.flac"), &mp3_vbr_config(), 2);
        assert_eq!(flag_value(&args, "-q:a"), Some("2"));
        assert!(!args.iter().any(|a| a == "-b:a"));
    }

    #[test]
    fn mp3_cbr_bitrate_scales_with_channels() {
        let codec = CodecConfig::Mp3(Mp3Config {
            mode: Mp3Mode::Cbr,
            cbrpch: 96,
            ..Mp3Config::default()
        });
        let args = encoder_args(Path::new("in.flac"), &codec, 2);
        assert_eq!(flag_value(&args, "-b:a"), Some("192k"));
        assert!(!args.iter().any(|a| a == "-q:a"));
    }

    #[test]
    fn container_follows_codec() {
        assert_eq!(opus_config().output_kind(), OutputKind::Ogg);
        assert_eq!(mp3_vbr_config().output_kind(), OutputKind::Mp3);
        assert_eq!(OutputKind::Ogg.extension(), "ogg");
        assert_eq!(OutputKind::Mp3.extension(), "mp3");
        assert_eq!(OutputKind::Ogg.to_string(), "ogg");
        assert_eq!(OutputKind::Mp3.to_string(), "mp3");
    }

    #[test]
    fn quality_flags_follow_codec_selection() {
        for codec in [opus_config(), mp3_vbr_config()] {
            let args = encoder_args(Path::new("in.flac"), &codec, 2);
            let codec_at = args.iter().position(|a| a == "-c:a").unwrap();
            let quality_at = args
                .iter()
                .position(|a| a == "-q:a" || a == "-b:a")
                .unwrap();
            assert!(codec_at < quality_at);
            assert_eq!(args[args.len() - 2], "-f");
        }
    }

    #[test]
    fn format_flag_matches_container() {
        let args = encoder_args(Path::new("in.flac"), &opus_config(), 2);
        assert_eq!(flag_value(&args, "-f"), Some("ogg"));
        let args = encoder_args(Path::new("in.flac"), &mp3_vbr_config(), 2);
        assert_eq!(flag_value(&args, "-f"), Some("mp3"));
    }
}
