use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};

use crate::error::EncodeError;
use crate::plan::OutputKind;
use crate::probe::AudioInfo;

/// One ffmpeg invocation plus the bookkeeping around it.
#[derive(Debug)]
pub struct EncodeJob<'a> {
    pub input: &'a AudioInfo,
    pub ffmpeg_path: &'a Path,
    /// Planned arguments; the runner appends `-y` and the output path.
    pub args: Vec<String>,
    pub output: OutputKind,
    /// Where the result should land; its extension is replaced by the
    /// container's.
    pub output_path: PathBuf,
    /// Minimum size reduction, in percent, for the encode to be kept.
    pub min_savings: f64,
}

/// Percentage saved by the encode relative to the original size. Negative
/// when the encode grew the file.
pub fn savings_percent(original: u64, encoded: u64) -> f64 {
    (1.0 - encoded as f64 / original as f64) * 100.0
}

/// Runs the engine, enforces the minimum-savings policy, and returns the
/// final path: the re-encoded file when the savings were good enough, the
/// untouched original otherwise.
///
/// The encode goes into a hidden temp sibling of the final path first, so a
/// failed or rejected run never clobbers anything. That also makes in-place
/// re-encoding (mp3 to mp3 without an output directory) safe: the source is
/// only replaced by the final rename.
pub fn run_ffmpeg_and_cleanup(job: EncodeJob<'_>) -> Result<PathBuf, EncodeError> {
    let mut final_path = job.output_path;
    final_path.set_extension(job.output.extension());

    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = temp_sibling(&final_path, &job.input.path, job.output.extension());

    debug!("Running {:?} with args {:?}", job.ffmpeg_path, job.args);
    let output = Command::new(job.ffmpeg_path)
        .args(&job.args)
        .arg("-y")
        .arg(&temp_path)
        .output()
        .map_err(EncodeError::Spawn)?;

    if !output.status.success() {
        let _ = fs::remove_file(&temp_path);
        return Err(EncodeError::Engine {
            status: output.status,
            stderr: stderr_tail(&output.stderr),
        });
    }

    finalize_encode(job.input, job.min_savings, &temp_path, final_path)
}

/// Applies the savings policy to a finished encode. Every error path
/// removes the temp file, so a failed run leaves nothing behind.
fn finalize_encode(
    input: &AudioInfo,
    min_savings: f64,
    temp_path: &Path,
    final_path: PathBuf,
) -> Result<PathBuf, EncodeError> {
    let encoded_size = match fs::metadata(temp_path) {
        Ok(meta) => meta.len(),
        Err(e) => {
            let _ = fs::remove_file(temp_path);
            return Err(EncodeError::Io(e));
        }
    };
    let savings = savings_percent(input.size, encoded_size);

    if savings < min_savings {
        info!(
            "Re-encode of {:?} saved only {:.1}% (minimum {:.1}%), keeping the original.",
            input.path.file_name().unwrap_or_default(),
            savings,
            min_savings
        );
        fs::remove_file(temp_path)?;
        return Ok(input.path.clone());
    }

    if let Err(e) = fs::rename(temp_path, &final_path) {
        let _ = fs::remove_file(temp_path);
        return Err(EncodeError::Io(e));
    }
    Ok(final_path)
}

/// Temp name carries the source extension as well as the target stem, so
/// same-stem inputs in one directory (`a.flac` and `a.wav`) never share a
/// temp file even when run on parallel workers.
fn temp_sibling(final_path: &Path, input_path: &Path, extension: &str) -> PathBuf {
    let stem = final_path.file_stem().unwrap_or_default().to_string_lossy();
    let src_ext = input_path
        .extension()
        .unwrap_or_default()
        .to_string_lossy()
        .to_lowercase();
    final_path.with_file_name(format!(".{stem}.{src_ext}.tmp.{extension}"))
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(6)..].join("\n")
}
