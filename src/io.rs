// File-level I/O helpers for compression/decompression.
//
// Wraps the container pipeline with buffered file I/O and default output
// naming. Outputs are staged in a temporary file and only renamed into place
// once complete. Optionally computes streaming SHA-256
// checksums of the plaintext (feature-gated behind `file-io`), so the stats
// of a compress run and of the matching decompress run can be compared.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::coder::model::FrequencyModel;
use crate::container::codec::{self, CodecError, DEFAULT_BUFFER_SIZE};

/// Extension appended to compressed files.
pub const EXTENSION: &str = "artpack";

/// Suffix used when a compressed file does not carry [`EXTENSION`].
const FALLBACK_SUFFIX: &str = "out";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Buffering policy for the file helpers. Never changes the output bytes.
#[derive(Debug, Clone)]
pub struct FileOptions {
    /// Read/write chunk size in bytes.
    pub buffer_size: usize,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `compress_file_to()`.
#[derive(Debug, Clone)]
pub struct CompressStats {
    /// Plaintext size in bytes.
    pub input_size: u64,
    /// Container size in bytes (header + payload).
    pub output_size: u64,
    /// Header bytes, model included.
    pub header_size: u64,
    /// Arithmetic-coded payload bytes.
    pub payload_size: u64,
    /// The model written into the header.
    pub model: FrequencyModel,
    /// SHA-256 of the plaintext (if `file-io` feature is enabled).
    pub input_sha256: Option<[u8; 32]>,
}

impl CompressStats {
    /// Output size over input size; 0 for empty input.
    pub fn ratio(&self) -> f64 {
        if self.input_size == 0 {
            0.0
        } else {
            self.output_size as f64 / self.input_size as f64
        }
    }
}

/// Statistics returned by `decompress_file_to()`.
#[derive(Debug, Clone)]
pub struct DecompressStats {
    /// Container size in bytes.
    pub input_size: u64,
    /// Reconstructed plaintext size in bytes.
    pub output_size: u64,
    /// Register width used by the decoder.
    pub precision: u32,
    /// SHA-256 of the reconstructed plaintext (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// Default paths
// ---------------------------------------------------------------------------

/// `input` with `.artpack` appended.
pub fn default_compressed_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".");
    name.push(EXTENSION);
    PathBuf::from(name)
}

/// `input` without its `.artpack` extension (or with `.out` appended when it
/// has none). If that path is taken, the first free `name.N.ext` is used.
pub fn default_decompressed_path(input: &Path) -> PathBuf {
    let base = if input.extension().is_some_and(|e| e == EXTENSION) {
        input.with_extension("")
    } else {
        let mut name = input.as_os_str().to_owned();
        name.push(".");
        name.push(FALLBACK_SUFFIX);
        PathBuf::from(name)
    };
    if !base.exists() {
        return base;
    }
    (1u64..)
        .map(|n| numbered(&base, n))
        .find(|p| !p.exists())
        .unwrap_or(base)
}

/// `dir/stem.N.ext`, or `dir/stem.N` when there is no extension.
fn numbered(path: &Path, n: u64) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let name = match path.extension() {
        Some(ext) => format!("{stem}.{n}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{n}"),
    };
    path.with_file_name(name)
}

// ---------------------------------------------------------------------------
// compress_file / decompress_file
// ---------------------------------------------------------------------------

/// Compress `path` into `path.artpack`, overwriting any existing file.
///
/// Returns the output path and the model written into its header.
pub fn compress_file(path: &Path) -> Result<(PathBuf, FrequencyModel), CodecError> {
    let output = default_compressed_path(path);
    let stats = compress_file_to(path, &output, &FileOptions::default())?;
    Ok((output, stats.model))
}

/// Decompress `path`, writing to `output` or to the default path.
pub fn decompress_file(path: &Path, output: Option<&Path>) -> Result<PathBuf, CodecError> {
    let output = match output {
        Some(p) => p.to_path_buf(),
        None => default_decompressed_path(path),
    };
    decompress_file_to(path, &output, &FileOptions::default())?;
    Ok(output)
}

// ---------------------------------------------------------------------------
// compress_file_to
// ---------------------------------------------------------------------------

/// Compress `input_path` into `output_path`.
///
/// The input is read twice through a `BufReader` (histogram pass, then
/// coding pass). Output goes to a temporary file next to `output_path` that
/// replaces it only once the container is complete, so a failed run leaves
/// any existing file untouched.
pub fn compress_file_to(
    input_path: &Path,
    output_path: &Path,
    opts: &FileOptions,
) -> Result<CompressStats, CodecError> {
    reject_same_file(input_path, output_path)?;
    let input_file = File::open(input_path)?;
    let input_size = input_file.metadata()?.len();
    let reader = BufReader::with_capacity(opts.buffer_size.max(1), input_file);
    let mut reader = HashingReader::new(reader);

    let mut output = PartialOutput::create(output_path, opts.buffer_size)?;
    let summary = match codec::compress_stream(&mut reader, &mut output, opts.buffer_size) {
        Ok(summary) => summary,
        Err(e) => {
            output.discard();
            return Err(e);
        }
    };
    output.commit()?;

    log::info!(
        "{} -> {}: {} -> {} bytes",
        input_path.display(),
        output_path.display(),
        input_size,
        summary.compressed_size()
    );

    Ok(CompressStats {
        input_size: summary.header.plaintext_len(),
        output_size: summary.compressed_size(),
        header_size: summary.header_size,
        payload_size: summary.payload_size,
        model: summary.header.model,
        input_sha256: reader.digest(),
    })
}

// ---------------------------------------------------------------------------
// decompress_file_to
// ---------------------------------------------------------------------------

/// Decompress `input_path` into `output_path`.
///
/// As with [`compress_file_to`], `output_path` is only replaced after the
/// whole payload decoded cleanly.
pub fn decompress_file_to(
    input_path: &Path,
    output_path: &Path,
    opts: &FileOptions,
) -> Result<DecompressStats, CodecError> {
    reject_same_file(input_path, output_path)?;
    let input_file = File::open(input_path)?;
    let input_size = input_file.metadata()?.len();
    let mut reader = BufReader::with_capacity(opts.buffer_size.max(1), input_file);

    let mut output = PartialOutput::create(output_path, opts.buffer_size)?;

    #[cfg(feature = "file-io")]
    let mut output_hasher = sha2::Sha256::new();

    #[cfg(feature = "file-io")]
    let result = {
        let mut hashing_writer = HashingWriter {
            inner: &mut output,
            hasher: &mut output_hasher,
        };
        codec::decompress_stream(&mut reader, &mut hashing_writer)
    };

    #[cfg(not(feature = "file-io"))]
    let result = codec::decompress_stream(&mut reader, &mut output);

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            output.discard();
            return Err(e);
        }
    };
    output.commit()?;

    log::info!(
        "{} -> {}: {} -> {} bytes",
        input_path.display(),
        output_path.display(),
        input_size,
        summary.output_size
    );

    #[cfg(feature = "file-io")]
    let output_sha256 = Some(output_hasher.finalize().into());
    #[cfg(not(feature = "file-io"))]
    let output_sha256: Option<[u8; 32]> = None;

    Ok(DecompressStats {
        input_size,
        output_size: summary.output_size,
        precision: summary.header.model.precision(),
        output_sha256,
    })
}

fn reject_same_file(input: &Path, output: &Path) -> Result<(), CodecError> {
    match (fs::canonicalize(input), fs::canonicalize(output)) {
        (Ok(a), Ok(b)) if a == b => Err(CodecError::SameFile { path: a }),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// PartialOutput
// ---------------------------------------------------------------------------

/// Buffered output staged in a temporary file beside its destination.
///
/// [`commit`](Self::commit) renames it over the destination;
/// [`discard`](Self::discard) (or dropping it) removes it.
pub(crate) struct PartialOutput {
    writer: BufWriter<NamedTempFile>,
    path: PathBuf,
}

impl PartialOutput {
    pub(crate) fn create(path: &Path, buffer_size: usize) -> io::Result<Self> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let file = tempfile::Builder::new()
            .prefix(".artpack-")
            .suffix(".partial")
            .tempfile_in(dir)?;
        Ok(Self {
            writer: BufWriter::with_capacity(buffer_size.max(1), file),
            path: path.to_path_buf(),
        })
    }

    /// Flush and move the finished output into place.
    pub(crate) fn commit(self) -> io::Result<()> {
        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Drop the staged bytes, leaving the destination as it was.
    pub(crate) fn discard(self) {
        let (file, _) = self.writer.into_parts();
        let staged = file.path().to_path_buf();
        if let Err(e) = file.close() {
            log::warn!("could not remove partial output {}: {e}", staged.display());
        }
    }
}

impl Write for PartialOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

// ---------------------------------------------------------------------------
// Hashing reader/writer (hash only with the file-io feature)
// ---------------------------------------------------------------------------

/// Hashes the bytes of the first pass; the first seek finalizes the digest.
struct HashingReader<R> {
    inner: R,
    #[cfg(feature = "file-io")]
    hasher: Option<sha2::Sha256>,
    digest: Option<[u8; 32]>,
}

impl<R> HashingReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            #[cfg(feature = "file-io")]
            hasher: Some(sha2::Sha256::new()),
            digest: None,
        }
    }

    fn digest(&self) -> Option<[u8; 32]> {
        self.digest
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        #[cfg(feature = "file-io")]
        {
            if let Some(hasher) = self.hasher.as_mut() {
                hasher.update(&buf[..n]);
            }
        }
        Ok(n)
    }
}

impl<R: Seek> Seek for HashingReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        #[cfg(feature = "file-io")]
        {
            if let Some(hasher) = self.hasher.take() {
                self.digest = Some(hasher.finalize().into());
            }
        }
        self.inner.seek(pos)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }
}

#[cfg(feature = "file-io")]
struct HashingWriter<'a, W: Write> {
    inner: &'a mut W,
    hasher: &'a mut sha2::Sha256,
}

#[cfg(feature = "file-io")]
impl<W: Write> Write for HashingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::FormatError;
    use tempfile::tempdir;

    #[test]
    fn compress_decompress_file_roundtrip() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("notes.txt");
        let data = b"The quick brown fox jumps over the lazy dog. 1234567890";
        fs::write(&input, data).unwrap();

        let (packed, model) = compress_file(&input).unwrap();
        assert_eq!(packed, dir.path().join("notes.txt.artpack"));
        assert_eq!(model.total_count(), data.len() as u64 + 1);

        // notes.txt still exists, so the default output is disambiguated.
        let out = decompress_file(&packed, None).unwrap();
        assert_eq!(out, dir.path().join("notes.1.txt"));
        assert_eq!(fs::read(&out).unwrap(), data);
    }

    #[test]
    fn decompress_to_explicit_path() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.bin");
        fs::write(&input, [0u8, 1, 2, 3, 0, 0, 255]).unwrap();
        let (packed, _) = compress_file(&input).unwrap();

        let target = dir.path().join("restored.bin");
        let out = decompress_file(&packed, Some(&target)).unwrap();
        assert_eq!(out, target);
        assert_eq!(fs::read(&target).unwrap(), [0u8, 1, 2, 3, 0, 0, 255]);
    }

    #[test]
    fn default_paths() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("report.csv");
        assert_eq!(
            default_compressed_path(&plain),
            dir.path().join("report.csv.artpack")
        );

        let packed = dir.path().join("report.csv.artpack");
        assert_eq!(default_decompressed_path(&packed), plain);

        fs::write(&plain, b"").unwrap();
        assert_eq!(
            default_decompressed_path(&packed),
            dir.path().join("report.1.csv")
        );
        fs::write(dir.path().join("report.1.csv"), b"").unwrap();
        assert_eq!(
            default_decompressed_path(&packed),
            dir.path().join("report.2.csv")
        );

        let odd = dir.path().join("blob.bin");
        assert_eq!(
            default_decompressed_path(&odd),
            dir.path().join("blob.bin.out")
        );

        let bare = dir.path().join("README.artpack");
        fs::write(dir.path().join("README"), b"").unwrap();
        assert_eq!(
            default_decompressed_path(&bare),
            dir.path().join("README.1")
        );
    }

    #[test]
    fn bad_magic_leaves_no_output() {
        let dir = tempdir().unwrap();
        let bogus = dir.path().join("bogus.artpack");
        fs::write(&bogus, b"definitely not an artpack container").unwrap();

        let target = dir.path().join("bogus");
        let err = decompress_file(&bogus, Some(&target)).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Format(FormatError::BadMagic { .. })
        ));
        assert!(!target.exists());
    }

    #[test]
    fn truncated_payload_leaves_no_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("long.txt");
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 37) as u8 + b'0').collect();
        fs::write(&input, &data).unwrap();
        let (packed, _) = compress_file(&input).unwrap();

        let bytes = fs::read(&packed).unwrap();
        fs::write(&packed, &bytes[..bytes.len() - 64]).unwrap();

        let target = dir.path().join("long.out");
        let err = decompress_file(&packed, Some(&target)).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)), "{err}");
        assert!(!target.exists());
    }

    fn dir_entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn existing_output_survives_bad_input() {
        let dir = tempdir().unwrap();
        let bogus = dir.path().join("bogus.artpack");
        fs::write(&bogus, b"definitely not an artpack container").unwrap();
        let precious = dir.path().join("precious.txt");
        fs::write(&precious, b"user data that must survive").unwrap();

        let err = decompress_file(&bogus, Some(&precious)).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Format(FormatError::BadMagic { .. })
        ));
        assert_eq!(fs::read(&precious).unwrap(), b"user data that must survive");
        assert_eq!(dir_entries(dir.path()), 2, "staged output left behind");
    }

    #[test]
    fn existing_output_survives_truncated_payload() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("long.txt");
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 37) as u8 + b'0').collect();
        fs::write(&input, &data).unwrap();
        let (packed, _) = compress_file(&input).unwrap();
        let bytes = fs::read(&packed).unwrap();
        fs::write(&packed, &bytes[..bytes.len() - 64]).unwrap();

        let precious = dir.path().join("precious.txt");
        fs::write(&precious, b"keep").unwrap();
        let err = decompress_file_to(&packed, &precious, &FileOptions::default()).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)), "{err}");
        assert_eq!(fs::read(&precious).unwrap(), b"keep");
        assert_eq!(dir_entries(dir.path()), 3);
    }

    #[test]
    fn successful_run_replaces_existing_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.bin");
        fs::write(&input, b"fresh contents").unwrap();
        let packed = dir.path().join("in.bin.artpack");
        fs::write(&packed, b"stale").unwrap();

        compress_file_to(&input, &packed, &FileOptions::default()).unwrap();
        let out = dir.path().join("out.bin");
        fs::write(&out, b"stale").unwrap();
        decompress_file_to(&packed, &out, &FileOptions::default()).unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"fresh contents");
        assert_eq!(dir_entries(dir.path()), 3);
    }

    #[test]
    fn same_input_and_output_is_rejected() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.bin");
        fs::write(&input, b"do not truncate me").unwrap();
        let opts = FileOptions::default();

        let err = compress_file_to(&input, &input, &opts).unwrap_err();
        assert!(matches!(err, CodecError::SameFile { .. }), "{err}");
        // A different spelling of the same path is caught too.
        let alias = dir.path().join(".").join("in.bin");
        let err = compress_file_to(&input, &alias, &opts).unwrap_err();
        assert!(matches!(err, CodecError::SameFile { .. }), "{err}");
        assert_eq!(fs::read(&input).unwrap(), b"do not truncate me");

        let (packed, _) = compress_file(&input).unwrap();
        let err = decompress_file_to(&packed, &packed, &opts).unwrap_err();
        assert!(matches!(err, CodecError::SameFile { .. }), "{err}");
        assert_eq!(&fs::read(&packed).unwrap()[..8], b"ARTPACK\n");
    }

    #[test]
    fn buffer_size_does_not_change_file_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("data.bin");
        let data: Vec<u8> = (0..50_000u32).map(|i| (i * 31 % 97) as u8).collect();
        fs::write(&input, &data).unwrap();

        let a = dir.path().join("a.artpack");
        let b = dir.path().join("b.artpack");
        compress_file_to(&input, &a, &FileOptions { buffer_size: 64 }).unwrap();
        compress_file_to(&input, &b, &FileOptions::default()).unwrap();
        assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
    }

    #[test]
    fn stats_are_consistent() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("stats.bin");
        let data = vec![7u8; 10_000];
        fs::write(&input, &data).unwrap();

        let packed = dir.path().join("stats.bin.artpack");
        let enc = compress_file_to(&input, &packed, &FileOptions::default()).unwrap();
        assert_eq!(enc.input_size, data.len() as u64);
        assert_eq!(enc.output_size, fs::metadata(&packed).unwrap().len());
        assert_eq!(enc.output_size, enc.header_size + enc.payload_size);
        assert!(enc.ratio() < 0.1);

        let restored = dir.path().join("restored.bin");
        let dec = decompress_file_to(&packed, &restored, &FileOptions::default()).unwrap();
        assert_eq!(dec.output_size, data.len() as u64);
        assert_eq!(dec.input_size, enc.output_size);
        assert_eq!(dec.precision, enc.model.precision());
    }

    #[cfg(feature = "file-io")]
    #[test]
    fn sha256_checksums_match() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("sha.txt");
        fs::write(&input, b"checksum me, then check me again").unwrap();

        let packed = dir.path().join("sha.txt.artpack");
        let enc = compress_file_to(&input, &packed, &FileOptions::default()).unwrap();
        let restored = dir.path().join("sha.out");
        let dec = decompress_file_to(&packed, &restored, &FileOptions::default()).unwrap();

        assert!(enc.input_sha256.is_some());
        assert_eq!(enc.input_sha256, dec.output_sha256);
    }

    #[test]
    fn missing_input_is_io_error() {
        let dir = tempdir().unwrap();
        let err = compress_file(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, CodecError::Io(_)));
    }
}
