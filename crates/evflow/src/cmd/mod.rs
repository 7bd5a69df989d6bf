use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use evflow_frame::{FrameConfig, DEFAULT_MAX_HEADERS_SIZE, DEFAULT_MAX_MESSAGE_SIZE};
use evflow_transport::DEFAULT_CHUNK_SIZE;

use crate::exit::{io_error, CliResult};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod inspect;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode an event stream into typed events.
    Decode(DecodeArgs),
    /// List the raw messages of an event stream.
    Inspect(InspectArgs),
    /// Encode JSON lines into event-stream messages.
    Encode(EncodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Inspect(args) => inspect::run(args, format),
        Command::Encode(args) => encode::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Clone)]
pub struct FrameLimits {
    /// Largest accepted message, in bytes.
    #[arg(long, env = "EVFLOW_MAX_MESSAGE_SIZE", default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,
    /// Largest accepted header block, in bytes.
    #[arg(long, env = "EVFLOW_MAX_HEADERS_SIZE", default_value_t = DEFAULT_MAX_HEADERS_SIZE)]
    pub max_headers_size: usize,
}

impl FrameLimits {
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_message_size: self.max_message_size,
            max_headers_size: self.max_headers_size,
        }
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Input file, or `-` for stdin.
    #[arg(default_value = "-")]
    pub input: PathBuf,
    /// Bytes read from the input per chunk.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
    /// Stop after N events.
    #[arg(long)]
    pub count: Option<u64>,
    #[command(flatten)]
    pub limits: FrameLimits,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Input file, or `-` for stdin.
    #[arg(default_value = "-")]
    pub input: PathBuf,
    /// Stop after N messages.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub limits: FrameLimits,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// JSON lines file, or `-` for stdin.
    #[arg(default_value = "-")]
    pub input: PathBuf,
    /// Write messages here instead of stdout.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,
    #[command(flatten)]
    pub limits: FrameLimits,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Open `path` for reading; `-` is stdin. Also returns a display name.
pub fn open_input(path: &Path) -> CliResult<(Box<dyn Read + Send>, String)> {
    if path.as_os_str() == "-" {
        return Ok((Box::new(io::stdin()), "<stdin>".to_string()));
    }
    let file = File::open(path)
        .map_err(|err| io_error(&format!("cannot open {}", path.display()), err))?;
    Ok((Box::new(file), path.display().to_string()))
}
