use anyhow::Result;
use audio_batch_transcode::plan::{
    CodecConfig, Mp3Config, Mp3Mode, OpusApplication, OpusConfig, OpusMode,
};
use audio_batch_transcode::{TranscodeOptions, transcode_folder};
use clap::{Parser, ValueEnum};
use log::{error, info};
use std::path::PathBuf;

#[derive(Clone, Copy, ValueEnum, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
enum Codec {
    Mp3,
    Opus,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// input directory
    input: PathBuf,

    /// output directory, default to transcode next to the input audios
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// path to the ffmpeg binary
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// target codec
    #[arg(short, long, value_enum, default_value_t = Codec::Opus)]
    codec: Codec,

    /// mp3 bitrate control mode
    #[arg(long, value_enum, default_value_t = Mp3Mode::Vbr)]
    mp3_mode: Mp3Mode,

    /// mp3 VBR quality, 0 (best) to 9 (worst)
    #[arg(long, default_value_t = 4)]
    mp3_vbr: u8,

    /// mp3 CBR bitrate per channel in kbit/s
    #[arg(long, default_value_t = 64)]
    mp3_cbrpch: u32,

    /// mp3 compression level, 0 (high quality/slow) to 9 (low quality/fast)
    #[arg(long, default_value_t = 0)]
    mp3_compression_level: u8,

    /// opus bitrate control mode
    #[arg(long, value_enum, default_value_t = OpusMode::Vbr)]
    opus_mode: OpusMode,

    /// opus bitrate per channel in kbit/s
    #[arg(long, default_value_t = 64)]
    opus_bpch: u32,

    /// opus compression level, 0 (low quality/fast) to 10 (high quality/slow)
    #[arg(long, default_value_t = 10)]
    opus_compression_level: u8,

    /// opus encoder application hint
    #[arg(long, value_enum, default_value_t = OpusApplication::Audio)]
    opus_application: OpusApplication,

    /// minimum size reduction in percent for a re-encode to be kept
    #[arg(long, default_value_t = 0.0)]
    min_savings: f64,

    /// skip encoding sources already below this many KB per channel per minute
    #[arg(long)]
    skip_threshold: Option<f64>,

    /// number of threads to use, default to CPU core count
    #[arg(short, long)]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    _ = pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .parse_filters("symphonia=error")
        .parse_default_env()
        .try_init();

    let cli = Cli::parse();

    // --- Configuration ---
    let codec = match cli.codec {
        Codec::Mp3 => CodecConfig::Mp3(Mp3Config {
            mode: cli.mp3_mode,
            vbr: cli.mp3_vbr,
            cbrpch: cli.mp3_cbrpch,
            compression_level: cli.mp3_compression_level,
        }),
        Codec::Opus => CodecConfig::Opus(OpusConfig {
            mode: cli.opus_mode,
            bpch: cli.opus_bpch,
            compression_level: cli.opus_compression_level,
            application: cli.opus_application,
        }),
    };
    let options = TranscodeOptions {
        input_dir: cli.input,
        output_dir: cli.output,
        ffmpeg_path: cli.ffmpeg,
        codec,
        min_savings: cli.min_savings,
        skip_threshold: cli.skip_threshold,
        num_threads: cli.threads,
    };

    info!("Starting batch transcode with options:");
    info!("  Input Directory: {:?}", options.input_dir);
    info!("  Output Directory: {:?}", options.output_dir);
    info!("  FFmpeg: {:?}", options.ffmpeg_path);
    info!("  Codec: {:?}", options.codec);
    info!("  Minimum Savings: {}%", options.min_savings);
    if let Some(t) = options.skip_threshold {
        info!("  Skip Threshold: {} KB/ch/m", t);
    } else {
        info!("  Skip Threshold: Disabled");
    }
    if let Some(n) = options.num_threads {
        info!("  Threads: {}", n);
    } else {
        info!("  Threads: Default");
    }
    info!("---");

    match transcode_folder(&options) {
        Ok(_) => {
            info!("Transcoding finished successfully!");
            Ok(())
        }
        Err(e) => {
            error!("Transcoding failed: {}", e);
            Err(e)?
        }
    }
}
