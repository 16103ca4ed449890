use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use objcache_result::{
    Context, FileType, Reader, ResultConfig, ResultDumper, ResultExtractor, Writer,
};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "objcache", version, about = "Inspect and build compiler result cache entries")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Describe the entries of a result file
    Dump(DumpArgs),
    /// Write every entry of a result file into a directory
    Extract(ExtractArgs),
    /// Store files as a new result file
    Store(StoreArgs),
}

#[derive(Args)]
struct DumpArgs {
    /// Path to a result file
    result: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ExtractArgs {
    /// Path to a result file
    result: PathBuf,
    /// Directory to write the entries to (created if missing)
    dir: PathBuf,
}

#[derive(Args)]
struct StoreArgs {
    /// Path of the result file to create
    result: PathBuf,
    /// Entry to store, as `TYPE=PATH` (e.g. `object=foo.o`); may be repeated
    #[arg(long = "entry", value_name = "TYPE=PATH", value_parser = parse_entry)]
    entries: Vec<(FileType, PathBuf)>,
    /// TOML config file; `OBJCACHE_*` environment variables override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Object file the entries were produced for
    #[arg(long, default_value = "a.o")]
    output_obj: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

fn parse_entry(value: &str) -> Result<(FileType, PathBuf), String> {
    let (file_type, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected TYPE=PATH, got `{value}`"))?;
    let file_type = file_type.parse::<FileType>().map_err(|err| err.to_string())?;
    if path.is_empty() {
        return Err(format!("missing path in `{value}`"));
    }
    Ok((file_type, PathBuf::from(path)))
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("OBJCACHE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Dump(args) => {
            let mut dumper = ResultDumper::new();
            Reader::new(&args.result)
                .read(&mut dumper)
                .with_context(|| format!("failed to read {}", args.result.display()))?;
            let summary = dumper.into_summary();
            if args.json {
                print_json(&summary)?;
            } else {
                print!("{}", summary.render_text());
            }
            Ok(0)
        }
        Command::Extract(args) => {
            let mut extractor = ResultExtractor::new(&args.dir);
            Reader::new(&args.result)
                .read(&mut extractor)
                .with_context(|| format!("failed to extract {}", args.result.display()))?;
            for path in extractor.written() {
                println!("{}", path.display());
            }
            Ok(0)
        }
        Command::Store(args) => {
            let config = match &args.config {
                Some(path) => ResultConfig::load_from_path(path)?,
                None => ResultConfig::default(),
            }
            .with_env_overrides()?;
            let ctx = Context::for_current_dir(config, &args.output_obj)
                .context("failed to determine the working directory")?;

            let mut writer = Writer::new(&ctx, &args.result);
            for (file_type, path) in args.entries {
                writer.write(file_type, path)?;
            }
            let diff = writer
                .finalize()
                .with_context(|| format!("failed to store {}", args.result.display()))?;

            if args.json {
                print_json(&diff)?;
            } else {
                println!(
                    "stored {}: {:+} files, {:+} KiB",
                    args.result.display(),
                    diff.count,
                    diff.size_kibibyte
                );
            }
            Ok(0)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_argument_parses() {
        assert_eq!(
            parse_entry("object=build/foo.o").unwrap(),
            (FileType::Object, PathBuf::from("build/foo.o"))
        );
        assert_eq!(
            parse_entry("stderr_output=a=b").unwrap(),
            (FileType::StderrOutput, PathBuf::from("a=b"))
        );
        assert!(parse_entry("object").is_err());
        assert!(parse_entry("object=").is_err());
        assert!(parse_entry("executable=a.out").is_err());
    }
}
