use std::path::PathBuf;

use symphonia::core::errors::Error as SymphoniaError;

#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("Symphonia error: {0}")]
    Symphonia(#[from] SymphoniaError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No compatible audio track found")]
    NoTrack,
    #[error("Track has no channel layout")]
    MissingChannels,
    #[error("Track duration could not be determined")]
    MissingDuration,
}

#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("Failed to spawn ffmpeg: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("ffmpeg exited with {status}: {stderr}")]
    Engine {
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error("Probing failed for {path}: {source}")]
    Probe {
        path: PathBuf,
        #[source]
        source: ProbeError,
    },
    #[error("Encoding failed for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: EncodeError,
    },
    #[error("I/O error during processing of {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Inputs {first:?} and {second:?} both resolve to output {output:?}")]
    OutputCollision {
        first: PathBuf,
        second: PathBuf,
        output: PathBuf,
    },
    #[error("{0} files failed to transcode")]
    FilesFailed(usize),
}
