// Idiomatic Rust CLI for Artpack.
//
// Explicit subcommands and long-form options over the library's
// compress/decompress/header APIs.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use serde_json::{Value, json};

use crate::container::codec::{self, CodecError, DEFAULT_BUFFER_SIZE};
use crate::container::header::Header;
use crate::io::{self as file_io, FileOptions, PartialOutput};

/// Upper bound for `--buffer-size`.
const MAX_BUFFER_SIZE: u64 = 1 << 30; // 1 GiB

// ---------------------------------------------------------------------------
// Byte size parsing (supports K, M, G suffixes)
// ---------------------------------------------------------------------------

fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size string".into());
    }
    let (num_part, multiplier) = match s.as_bytes().last() {
        Some(b'k' | b'K') => (&s[..s.len() - 1], 1024u64),
        Some(b'm' | b'M') => (&s[..s.len() - 1], 1024 * 1024),
        Some(b'g' | b'G') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1u64),
    };
    let num: u64 = num_part
        .trim()
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: '{s}'"))
}

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Static-model arithmetic coding compressor.
#[derive(Parser, Debug)]
#[command(
    name = "artpack",
    version,
    about = "Arithmetic coding compressor/decompressor",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Compress files (or stdin) into .artpack containers.
    Compress(CodecArgs),
    /// Decompress .artpack containers (or stdin).
    Decompress(CodecArgs),
    /// Print the header of an .artpack container.
    Info(PrintArgs),
    /// Print build/configuration details.
    Config,
}

#[derive(Args, Debug)]
struct CodecArgs {
    /// Output file (single input only; default derives from the input name).
    #[arg(long, short = 'o', value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Write output to stdout.
    #[arg(short = 'c', long)]
    stdout: bool,

    /// I/O chunk size (supports K/M/G suffix). Does not affect the output.
    #[arg(long = "buffer-size", value_parser = parse_byte_size, default_value_t = DEFAULT_BUFFER_SIZE as u64)]
    buffer_size: u64,

    /// Input files (default: stdin).
    #[arg(value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,
}

#[derive(Args, Debug)]
struct PrintArgs {
    /// Artpack input file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Compress,
    Decompress,
    Info,
    Config,
}

#[derive(Debug)]
struct Options {
    command: Command,
    use_stdout: bool,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    buffer_size: u64,
    inputs: Vec<PathBuf>,
    output_file: Option<PathBuf>,
}

fn resolve_options(cli: Cli) -> Options {
    let mut opts = Options {
        command: Command::Config,
        use_stdout: false,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
        buffer_size: DEFAULT_BUFFER_SIZE as u64,
        inputs: Vec::new(),
        output_file: None,
    };

    match cli.command {
        Cmd::Compress(args) => {
            opts.command = Command::Compress;
            apply_codec_args(&mut opts, args);
        }
        Cmd::Decompress(args) => {
            opts.command = Command::Decompress;
            apply_codec_args(&mut opts, args);
        }
        Cmd::Info(args) => {
            opts.command = Command::Info;
            opts.inputs = vec![args.input];
        }
        Cmd::Config => {}
    }
    opts
}

fn apply_codec_args(opts: &mut Options, args: CodecArgs) {
    opts.use_stdout = args.stdout;
    opts.buffer_size = args.buffer_size;
    opts.inputs = args.inputs;
    opts.output_file = args.output;
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("artpack".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn file_options(opts: &Options) -> FileOptions {
    FileOptions {
        buffer_size: opts.buffer_size as usize,
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn check_output(path: &Path, force: bool) -> Result<(), String> {
    if path.exists() && !force {
        Err(format!(
            "output file exists, use -f to overwrite: {}",
            path.display()
        ))
    } else {
        Ok(())
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => eprintln!("{s}"),
        Err(e) => log::error!("could not serialize stats: {e}"),
    }
}

/// Run `job` over every input, concurrently with the `parallel` feature.
///
/// Each file is an independent codec invocation; no state is shared.
fn run_batch<F>(inputs: &[PathBuf], job: F) -> Vec<Result<Value, String>>
where
    F: Fn(&Path) -> Result<Value, String> + Send + Sync,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        inputs.par_iter().map(|p| job(p.as_path())).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        inputs.iter().map(|p| job(p.as_path())).collect()
    }
}

fn report_batch(opts: &Options, results: Vec<Result<Value, String>>) -> i32 {
    let mut exit_code = 0;
    for result in results {
        match result {
            Ok(stats) => {
                if opts.json_output {
                    print_json(&stats);
                }
            }
            Err(msg) => {
                eprintln!("artpack: {msg}");
                exit_code = 1;
            }
        }
    }
    exit_code
}

fn validate_targets(opts: &Options) -> Result<(), String> {
    if opts.inputs.len() > 1 && opts.output_file.is_some() {
        return Err("--output requires a single input".into());
    }
    if opts.inputs.len() > 1 && opts.use_stdout {
        return Err("--stdout requires a single input".into());
    }
    Ok(())
}

fn read_stdin() -> Result<Vec<u8>, String> {
    let mut data = Vec::new();
    io::stdin()
        .lock()
        .read_to_end(&mut data)
        .map_err(|e| format!("read error: {e}"))?;
    Ok(data)
}

/// Destination of a stdin-driven run: stdout, or `--output` staged in a
/// temporary file until the run succeeds.
enum StreamOutput {
    Stdout(BufWriter<io::StdoutLock<'static>>),
    File(PartialOutput),
}

impl StreamOutput {
    fn open(opts: &Options) -> Result<Self, String> {
        match (&opts.output_file, opts.use_stdout) {
            (Some(path), false) => {
                check_output(path, opts.force)?;
                PartialOutput::create(path, opts.buffer_size as usize)
                    .map(Self::File)
                    .map_err(|e| format!("output file: {}: {e}", path.display()))
            }
            _ => Ok(Self::Stdout(BufWriter::with_capacity(
                opts.buffer_size as usize,
                io::stdout().lock(),
            ))),
        }
    }

    fn commit(self) -> Result<(), String> {
        match self {
            Self::Stdout(mut w) => w.flush(),
            Self::File(partial) => partial.commit(),
        }
        .map_err(|e| format!("write flush error: {e}"))
    }

    fn discard(self) {
        match self {
            // Whatever reached stdout is already gone.
            Self::Stdout(mut w) => {
                if let Err(e) = w.flush() {
                    log::warn!("could not flush stdout: {e}");
                }
            }
            Self::File(partial) => partial.discard(),
        }
    }
}

impl Write for StreamOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stdout(w) => w.write(buf),
            Self::File(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

/// Commit on success, discard on failure; returns the exit code.
fn finish_stream<T>(
    output: StreamOutput,
    result: Result<T, CodecError>,
    what: &str,
    report: impl FnOnce(T),
) -> i32 {
    match result {
        Ok(summary) => match output.commit() {
            Ok(()) => {
                report(summary);
                0
            }
            Err(msg) => {
                eprintln!("artpack: {msg}");
                1
            }
        },
        Err(e) => {
            output.discard();
            eprintln!("artpack: {what} error: {e}");
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!("artpack version {version} (Rust)");
    eprintln!("Licensed under the MIT License");

    let hashing = cfg!(feature = "file-io") as u8;
    let parallel = cfg!(feature = "parallel") as u8;
    let ptr_size = std::mem::size_of::<*const ()>();

    eprintln!("FILE_IO={hashing}");
    eprintln!("PARALLEL={parallel}");
    eprintln!("DEFAULT_BUFFER_SIZE={DEFAULT_BUFFER_SIZE}");
    eprintln!("MAX_PRECISION={}", crate::coder::model::MAX_PRECISION);
    eprintln!("EXTENSION=.{}", file_io::EXTENSION);
    eprintln!("sizeof(usize)={ptr_size}");

    0
}

// ---------------------------------------------------------------------------
// Compress command
// ---------------------------------------------------------------------------

fn compress_one(opts: &Options, input: &Path) -> Result<Value, String> {
    if opts.use_stdout {
        let file = File::open(input).map_err(|e| format!("{}: {e}", input.display()))?;
        let mut reader = BufReader::with_capacity(opts.buffer_size as usize, file);
        let mut out = BufWriter::new(io::stdout().lock());
        let summary = codec::compress_stream(&mut reader, &mut out, opts.buffer_size as usize)
            .map_err(|e| format!("{}: {e}", input.display()))?;
        out.flush().map_err(|e| format!("write flush error: {e}"))?;
        return Ok(json!({
            "command": "compress",
            "input": input.display().to_string(),
            "input_size": summary.header.plaintext_len(),
            "output_size": summary.compressed_size(),
            "precision": summary.header.model.precision(),
        }));
    }

    let output = opts
        .output_file
        .clone()
        .unwrap_or_else(|| file_io::default_compressed_path(input));
    check_output(&output, opts.force)?;

    let stats = file_io::compress_file_to(input, &output, &file_options(opts))
        .map_err(|e| format!("{}: {e}", input.display()))?;

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "artpack: {} -> {}: {} -> {} bytes ({:.1}%), precision {}",
            input.display(),
            output.display(),
            stats.input_size,
            stats.output_size,
            stats.ratio() * 100.0,
            stats.model.precision()
        );
    }

    Ok(json!({
        "command": "compress",
        "input": input.display().to_string(),
        "output": output.display().to_string(),
        "input_size": stats.input_size,
        "output_size": stats.output_size,
        "header_size": stats.header_size,
        "payload_size": stats.payload_size,
        "precision": stats.model.precision(),
        "distinct_symbols": stats.model.distinct_symbols(),
        "sha256": stats.input_sha256.map(|d| hex(&d)),
    }))
}

fn cmd_compress(opts: &Options) -> i32 {
    if let Err(msg) = validate_targets(opts) {
        eprintln!("artpack: {msg}");
        return 1;
    }

    if opts.inputs.is_empty() {
        // Two passes are required, so stdin is buffered in full.
        let data = match read_stdin() {
            Ok(d) => d,
            Err(msg) => {
                eprintln!("artpack: {msg}");
                return 1;
            }
        };
        let mut output = match StreamOutput::open(opts) {
            Ok(w) => w,
            Err(msg) => {
                eprintln!("artpack: {msg}");
                return 1;
            }
        };
        let result = codec::compress_stream(
            &mut Cursor::new(&data),
            &mut output,
            opts.buffer_size as usize,
        );
        return finish_stream(output, result, "compress", |summary| {
            if opts.json_output {
                print_json(&json!({
                    "command": "compress",
                    "input_size": summary.header.plaintext_len(),
                    "output_size": summary.compressed_size(),
                    "precision": summary.header.model.precision(),
                }));
            }
        });
    }

    let results = run_batch(&opts.inputs, |input| compress_one(opts, input));
    report_batch(opts, results)
}

// ---------------------------------------------------------------------------
// Decompress command
// ---------------------------------------------------------------------------

fn decompress_one(opts: &Options, input: &Path) -> Result<Value, String> {
    if opts.use_stdout {
        let file = File::open(input).map_err(|e| format!("{}: {e}", input.display()))?;
        let mut reader = BufReader::with_capacity(opts.buffer_size as usize, file);
        let mut out = BufWriter::new(io::stdout().lock());
        let summary = codec::decompress_stream(&mut reader, &mut out)
            .map_err(|e| format!("{}: {e}", input.display()))?;
        out.flush().map_err(|e| format!("write flush error: {e}"))?;
        return Ok(json!({
            "command": "decompress",
            "input": input.display().to_string(),
            "output_size": summary.output_size,
            "precision": summary.header.model.precision(),
        }));
    }

    let output = match &opts.output_file {
        Some(path) => {
            check_output(path, opts.force)?;
            path.clone()
        }
        None => file_io::default_decompressed_path(input),
    };

    let stats = file_io::decompress_file_to(input, &output, &file_options(opts))
        .map_err(|e| format!("{}: {e}", input.display()))?;

    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "artpack: {} -> {}: {} -> {} bytes",
            input.display(),
            output.display(),
            stats.input_size,
            stats.output_size
        );
    }

    Ok(json!({
        "command": "decompress",
        "input": input.display().to_string(),
        "output": output.display().to_string(),
        "input_size": stats.input_size,
        "output_size": stats.output_size,
        "precision": stats.precision,
        "sha256": stats.output_sha256.map(|d| hex(&d)),
    }))
}

fn cmd_decompress(opts: &Options) -> i32 {
    if let Err(msg) = validate_targets(opts) {
        eprintln!("artpack: {msg}");
        return 1;
    }

    if opts.inputs.is_empty() {
        let mut output = match StreamOutput::open(opts) {
            Ok(w) => w,
            Err(msg) => {
                eprintln!("artpack: {msg}");
                return 1;
            }
        };
        let mut reader = BufReader::with_capacity(opts.buffer_size as usize, io::stdin().lock());
        let result = codec::decompress_stream(&mut reader, &mut output);
        return finish_stream(output, result, "decompress", |summary| {
            if opts.json_output {
                print_json(&json!({
                    "command": "decompress",
                    "output_size": summary.output_size,
                    "precision": summary.header.model.precision(),
                }));
            }
        });
    }

    let results = run_batch(&opts.inputs, |input| decompress_one(opts, input));
    report_batch(opts, results)
}

// ---------------------------------------------------------------------------
// Info command
// ---------------------------------------------------------------------------

fn cmd_info(opts: &Options) -> i32 {
    let Some(input) = opts.inputs.first() else {
        eprintln!("artpack: info requires an input file");
        return 1;
    };

    let file = match File::open(input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("artpack: {}: {e}", input.display());
            return 1;
        }
    };
    let file_size = file.metadata().map(|m| m.len()).unwrap_or(0);
    let mut reader = BufReader::new(file);

    let header = match Header::decode(&mut reader) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("artpack: invalid artpack header: {e}");
            return 1;
        }
    };

    let header_size = header.encoded_len() as u64;
    let payload_size = file_size.saturating_sub(header_size);
    let model = &header.model;
    let bound_bytes = (model.entropy_bits() / 8.0).ceil() as u64;

    if opts.json_output {
        print_json(&json!({
            "command": "info",
            "input": input.display().to_string(),
            "message_length": header.message_length,
            "plaintext_size": header.plaintext_len(),
            "count_width": model.count_width(),
            "precision": model.precision(),
            "distinct_symbols": model.distinct_symbols(),
            "header_size": header_size,
            "payload_size": payload_size,
            "entropy_bound_bytes": bound_bytes,
        }));
        return 0;
    }

    println!("artpack container:            {}", input.display());
    println!("message length:               {}", header.message_length);
    println!("plaintext size:               {}", header.plaintext_len());
    println!("count width:                  {}", model.count_width());
    println!("precision:                    {}", model.precision());
    println!("distinct symbols:             {}", model.distinct_symbols());
    println!("max count:                    {}", model.max_count());
    println!("header size:                  {header_size}");
    println!("payload size:                 {payload_size}");
    println!("entropy bound (payload):      {bound_bytes}");

    if opts.verbose > 0 {
        println!("  byte      count");
        for (byte, &count) in model.counts().iter().enumerate() {
            if count > 0 {
                println!("  {byte:#04x}  {count:>9}");
            }
        }
    }

    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    let cli = Cli::parse();
    let opts = resolve_options(cli);

    let default_filter = match (opts.quiet, opts.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    if opts.buffer_size == 0 || opts.buffer_size > MAX_BUFFER_SIZE {
        eprintln!(
            "artpack: --buffer-size: {} is outside 1..={MAX_BUFFER_SIZE}",
            opts.buffer_size
        );
        process::exit(1);
    }

    if opts.use_stdout && opts.output_file.is_some() && !opts.quiet {
        log::warn!("-c option overrides output filename");
    }

    let exit_code = match opts.command {
        Command::Compress => cmd_compress(&opts),
        Command::Decompress => cmd_decompress(&opts),
        Command::Info => cmd_info(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
