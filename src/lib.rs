/// Module for error handling
pub mod error;
/// Module for the encoding-plan core: codec parameters, skip heuristic,
/// engine arguments
pub mod plan;
/// Module for probing input media attributes
pub mod probe;
/// Module for running ffmpeg and enforcing the savings policy
pub mod runner;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::error::Error;
use crate::plan::{CodecConfig, EncodingPlan, Mp3Mode, build_plan};
use crate::probe::probe_audio;
use crate::runner::{EncodeJob, run_ffmpeg_and_cleanup};

/// Input formats accepted for transcoding
#[derive(Debug, PartialEq)]
pub enum InputFormat {
    Wav,
    Mp3,
    Flac,
    Ogg,
    M4a,
    Aac,
    Opus,
}

impl InputFormat {
    /// Returns a list of supported file extensions
    #[inline]
    pub fn supported_extensions() -> &'static [&'static str] {
        &["wav", "mp3", "flac", "ogg", "m4a", "aac", "opus"]
    }

    /// Creates an InputFormat from a file path based on its extension
    #[inline]
    pub fn from_path(value: impl AsRef<Path>) -> Option<Self> {
        Some(
            match value
                .as_ref()
                .extension()
                .unwrap_or_default()
                .to_string_lossy()
                .to_lowercase()
                .as_ref()
            {
                "wav" => Self::Wav,
                "mp3" => Self::Mp3,
                "flac" => Self::Flac,
                "ogg" => Self::Ogg,
                "m4a" => Self::M4a,
                "aac" => Self::Aac,
                "opus" => Self::Opus,
                _ => return None,
            },
        )
    }
}

/// Configuration options for a batch transcode run
#[derive(Debug, Clone)]
pub struct TranscodeOptions {
    /// Input directory containing audio files to process
    pub input_dir: PathBuf,
    /// Output directory mirroring the input tree. If not set, results land
    /// next to their sources (replacing them on an in-place mp3 re-encode).
    pub output_dir: Option<PathBuf>,
    /// Path to the ffmpeg binary
    pub ffmpeg_path: PathBuf,
    /// Codec selection and its quality/bitrate parameters
    pub codec: CodecConfig,
    /// Minimum size reduction in percent for a re-encode to be kept
    pub min_savings: f64,
    /// Skip encoding sources already below this many KB per channel per
    /// minute
    pub skip_threshold: Option<f64>,
    /// Number of threads for parallel processing
    pub num_threads: Option<usize>,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        TranscodeOptions {
            input_dir: PathBuf::from("."),
            output_dir: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            codec: CodecConfig::Opus(Default::default()),
            min_savings: 0.0,
            skip_threshold: None,
            num_threads: None,
        }
    }
}

/// Represents an audio file to be processed
#[derive(Debug)]
struct AudioFile {
    path: PathBuf,
}

/// Transcode all audio files in a folder to the configured codec
pub fn transcode_folder(options: &TranscodeOptions) -> Result<(), Error> {
    // Configure Rayon thread pool size if specified
    if let Some(num_threads) = options.num_threads {
        if num_threads > 0 {
            let rayon_init_result = rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .build_global();
            if let Err(e) = rayon_init_result {
                warn!(
                    "Failed to configure Rayon thread pool: {}. Using default number of threads.",
                    e
                );
            } else {
                info!("Using {} threads for processing.", num_threads);
            }
        } else {
            info!("Using default number of threads.");
        }
    } else {
        info!("Using default number of threads.");
    }

    // 1. Validate options
    validate_options(options)?;

    // 2. Discover audio files
    info!("Discovering audio files in {:?}...", options.input_dir);
    let all_audio_files = find_audio_files(&options.input_dir)?;
    if all_audio_files.is_empty() {
        info!("No audio files found.");
        return Ok(());
    }
    info!("Found {} audio files.", all_audio_files.len());

    // 3. Reject batches where two inputs would write the same output file
    check_output_collisions(&all_audio_files, options)?;

    // 4. Transcode all files in parallel
    info!(
        "Transcoding all {} files to {}...",
        all_audio_files.len(),
        options.codec.name()
    );
    let process_pb = ProgressBar::new(all_audio_files.len() as u64);
    process_pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}").expect("Internal Error: Failed to set progress bar style")
        .progress_chars("#>-"));
    process_pb.set_message("Transcoding files");

    let results: Vec<Result<PathBuf, Error>> = all_audio_files
        .par_iter()
        .progress_with(process_pb.clone())
        .map(|audio_file| process_single_file(&audio_file.path, options))
        .collect();
    process_pb.finish_with_message("Transcoding done");

    // 5. Report final status and errors
    let mut success_count = 0;
    let mut error_count = 0;
    for result in results {
        match result {
            Ok(_) => success_count += 1,
            Err(e) => {
                error!("Error: {}", e); // Log the detailed error
                error_count += 1;
            }
        }
    }

    info!(
        "Transcoding complete. {} files succeeded, {} files failed.",
        success_count, error_count
    );

    if error_count > 0 {
        Err(Error::FilesFailed(error_count))
    } else {
        Ok(())
    }
}

/// Processes a single audio file: probes it, builds an encoding plan, and
/// either skips it or hands it to the runner.
///
/// Returns the path the caller should consider final: the re-encoded file,
/// or the untouched original when the plan skipped or the savings policy
/// rejected the encode.
pub fn process_single_file(
    input_path: impl AsRef<Path>,
    options: &TranscodeOptions,
) -> Result<PathBuf, Error> {
    let input_path = input_path.as_ref();
    let file_name_str = input_path.file_name().unwrap_or_default().to_string_lossy();
    debug!("Processing: {}", file_name_str);

    // 1. Probe input attributes
    let input = probe_audio(input_path).map_err(|e| Error::Probe {
        path: input_path.to_path_buf(),
        source: e,
    })?;
    debug!(
        "  -> File: {}, Size: {} B, Duration: {:.0} ms, Channels: {}",
        file_name_str, input.size, input.duration_ms, input.channels
    );

    // 2. Build the encoding plan
    match build_plan(&input, &options.codec, options.skip_threshold) {
        EncodingPlan::Skip {
            kb_per_channel_minute,
        } => {
            info!(
                "Audio's {} KB/ch/m bitrate is smaller than skip threshold, skipping encoding.",
                kb_per_channel_minute.round()
            );
            Ok(input.path.clone())
        }
        EncodingPlan::Encode { args, output } => {
            // 3. Determine output path and run the engine
            let output_path =
                resolve_output_path(input_path, &options.input_dir, &options.output_dir)?;
            let final_path = run_ffmpeg_and_cleanup(EncodeJob {
                input: &input,
                ffmpeg_path: &options.ffmpeg_path,
                args,
                output,
                output_path,
                min_savings: options.min_savings,
            })
            .map_err(|e| Error::Encode {
                path: input_path.to_path_buf(),
                source: e,
            })?;
            debug!("Finished {:?} -> {:?}", input_path, final_path);
            Ok(final_path)
        }
    }
}

/// Mirrors `input_path` under the output directory when one is set,
/// otherwise keeps the file where it is. The extension swap happens in the
/// runner.
fn resolve_output_path(
    input_path: &Path,
    input_base_dir: &Path,
    output_base_dir: &Option<PathBuf>,
) -> Result<PathBuf, Error> {
    match output_base_dir {
        Some(obd) => {
            let relative_path =
                pathdiff::diff_paths(input_path, input_base_dir).ok_or_else(|| Error::Io {
                    path: input_path.to_path_buf(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "Failed to calculate relative path",
                    ),
                })?;
            Ok(obd.join(relative_path))
        }
        None => Ok(input_path.to_path_buf()),
    }
}

/// Rejects batches where two inputs resolve to the same output file, e.g.
/// `a.flac` and `a.wav` both becoming `a.ogg`. The parallel runs would
/// otherwise race on the final path and the survivor would be arbitrary.
fn check_output_collisions(
    files: &[AudioFile],
    options: &TranscodeOptions,
) -> Result<(), Error> {
    let extension = options.codec.output_kind().extension();
    let mut seen: HashMap<PathBuf, &Path> = HashMap::new();

    for file in files {
        let mut final_path =
            resolve_output_path(&file.path, &options.input_dir, &options.output_dir)?;
        final_path.set_extension(extension);
        if let Some(first) = seen.insert(final_path.clone(), &file.path) {
            return Err(Error::OutputCollision {
                first: first.to_path_buf(),
                second: file.path.clone(),
                output: final_path,
            });
        }
    }
    Ok(())
}

/// Validates transcode options for correctness
///
/// # Arguments
/// * `options` - Reference to TranscodeOptions struct
fn validate_options(options: &TranscodeOptions) -> Result<(), Error> {
    if !options.input_dir.is_dir() {
        return Err(Error::InvalidOptions(format!(
            "Input path is not a valid directory: {:?}",
            options.input_dir
        )));
    }
    if let Some(output_dir) = &options.output_dir {
        if !output_dir.exists() {
            fs::create_dir_all(output_dir).map_err(|e| Error::Io {
                path: output_dir.to_path_buf(),
                source: e,
            })?;
            info!("Created output directory: {:?}", output_dir);
        } else if !output_dir.is_dir() {
            return Err(Error::InvalidOptions(format!(
                "Output path exists but is not a directory: {:?}",
                output_dir
            )));
        }
    }

    if !(0.0..=100.0).contains(&options.min_savings) {
        return Err(Error::InvalidOptions(format!(
            "Minimum savings must be between 0 and 100 percent: {}",
            options.min_savings
        )));
    }
    match &options.codec {
        CodecConfig::Mp3(mp3) => {
            if mp3.mode == Mp3Mode::Vbr && mp3.vbr > 9 {
                return Err(Error::InvalidOptions(format!(
                    "MP3 VBR quality must be between 0 (best) and 9 (worst): {}",
                    mp3.vbr
                )));
            }
            if mp3.compression_level > 9 {
                return Err(Error::InvalidOptions(format!(
                    "MP3 compression level must be between 0 and 9: {}",
                    mp3.compression_level
                )));
            }
        }
        CodecConfig::Opus(opus) => {
            if opus.compression_level > 10 {
                return Err(Error::InvalidOptions(format!(
                    "Opus compression level must be between 0 and 10: {}",
                    opus.compression_level
                )));
            }
        }
    }
    Ok(())
}

/// Finds all supported audio files in the specified directory
///
/// # Arguments
/// * `input_dir` - Directory to search for audio files
///
/// # Returns
/// Vector of AudioFile structs representing found audio files
fn find_audio_files(input_dir: impl AsRef<Path>) -> Result<Vec<AudioFile>, Error> {
    let mut audio_files = Vec::new();

    for entry in WalkDir::new(input_dir)
        .into_iter()
        .filter_map(|e| e.ok()) // Filter out directory reading errors
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if let Some(ext) = path
            .extension()
            .and_then(|os| os.to_str())
            .map(|s| s.to_lowercase())
        {
            if InputFormat::supported_extensions().contains(&ext.as_str()) {
                audio_files.push(AudioFile {
                    path: path.to_path_buf(),
                });
            }
        }
    }
    Ok(audio_files)
}
