mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "evflow", version, about = "Event-stream decoding CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decode_subcommand() {
        let cli = Cli::try_parse_from([
            "evflow",
            "decode",
            "/tmp/stream.bin",
            "--chunk-size",
            "16",
            "--count",
            "2",
        ])
        .expect("decode args should parse");

        match cli.command {
            Command::Decode(args) => {
                assert_eq!(args.chunk_size, 16);
                assert_eq!(args.count, Some(2));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn decode_reads_stdin_by_default() {
        let cli = Cli::try_parse_from(["evflow", "decode"]).expect("decode args should parse");
        match cli.command {
            Command::Decode(args) => assert_eq!(args.input.as_os_str(), "-"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_output_format() {
        let err = Cli::try_parse_from(["evflow", "--format", "yaml", "inspect"])
            .expect_err("unknown format should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn parses_encode_output() {
        let cli = Cli::try_parse_from(["evflow", "encode", "in.jsonl", "-o", "out.bin"])
            .expect("encode args should parse");
        assert!(matches!(cli.command, Command::Encode(args) if args.output.is_some()));
    }
}
