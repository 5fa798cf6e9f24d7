use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::{Builder, NamedTempFile};

use crate::error::Result;
use crate::reader::read_member;
use crate::types::{CleaningDecision, GzipMember, Span};

/// Chunk size used when streaming the payload through.
pub const COPY_BUFFER: usize = 1024 * 1024;

/// What [`clean_file`] did with a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Header was already clean; the file was not opened for writing.
    Unchanged(CleaningDecision),
    /// Dry run: the file would have been rewritten.
    WouldClean(CleaningDecision),
    Cleaned(CleaningDecision),
}

impl Outcome {
    pub fn decision(&self) -> &CleaningDecision {
        match *self {
            Outcome::Unchanged(ref d) | Outcome::WouldClean(ref d) | Outcome::Cleaned(ref d) => d,
        }
    }
}

/// Write `member` to `dst` with a cleaned header, then copy the rest of `src` verbatim.
///
/// Output order is the fixed header, FEXTRA, FCOMMENT, then everything from `payload_start` to
/// EOF (deflate data, trailer, later members). FNAME and FHCRC are never copied. Returns the
/// number of bytes written.
pub fn rewrite_member<R, W>(src: &mut R, dst: &mut W, member: &GzipMember) -> io::Result<u64>
where
    R: Read + Seek,
    W: Write,
{
    dst.write_all(&member.cleaned_fixed())?;
    let mut written = GzipMember::FIXED_LEN as u64;

    for span in [member.offsets.extra, member.offsets.fcomment].iter().flatten() {
        written += copy_span(src, dst, *span)?;
    }

    src.seek(SeekFrom::Start(member.offsets.payload_start))?;
    written += copy_to_end(src, dst)?;
    Ok(written)
}

fn copy_span<R: Read + Seek, W: Write>(src: &mut R, dst: &mut W, span: Span) -> io::Result<u64> {
    src.seek(SeekFrom::Start(span.start))?;
    let copied = io::copy(&mut Read::take(&mut *src, span.len()), dst)?;
    if copied < span.len() {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "file shrank while copying header field"));
    }
    Ok(copied)
}

fn copy_to_end<R: Read, W: Write>(src: &mut R, dst: &mut W) -> io::Result<u64> {
    let mut buf = vec![0u8; COPY_BUFFER];
    let mut copied = 0u64;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => return Ok(copied),
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        dst.write_all(&buf[..n])?;
        copied += n as u64;
    }
}

/// Parse the header of the file at `path` and, unless it is already clean or `dry_run` is set,
/// rewrite it in place.
///
/// The new contents go to a temp file next to the original which is renamed over it once fully
/// written and synced. Any failure before the rename drops (and deletes) the temp file and leaves
/// the original untouched.
pub fn clean_file(path: &Path, dry_run: bool) -> Result<Outcome> {
    let mut src = BufReader::new(File::open(path)?);
    let member = read_member(&mut src)?;
    let decision = member.decision();

    if !decision.needs_rewrite() {
        return Ok(Outcome::Unchanged(decision));
    }
    if dry_run {
        return Ok(Outcome::WouldClean(decision));
    }

    // The closure owns the source so it is closed before the rename.
    replace_with(path, move |out| rewrite_member(&mut src, out, &member).map(|_| ()))?;

    Ok(Outcome::Cleaned(decision))
}

/// Fill a temp file beside `path` with `write`, then rename it over `path`.
///
/// Nothing touches `path` until `write` has succeeded and the temp file is flushed and synced; on
/// any error the temp file is removed when it drops.
fn replace_with<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<NamedTempFile>) -> io::Result<()>,
{
    let mut out = BufWriter::new(temp_file_beside(path)?);
    write(&mut out)?;
    let tmp = out.into_inner().map_err(|e| e.into_error())?;
    replace(tmp, path)
}

/// Longest piece of the original file name carried into a temp file name. The prefix dot, the
/// separator, six random characters and `.tmp` must still fit in a 255 byte name.
const TEMP_NAME_MAX: usize = 200;

/// `.<name>.XXXXXX.tmp` in the same directory, so the final rename never crosses filesystems.
fn temp_file_beside(path: &Path) -> io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = match path.file_name() {
        Some(name) => format!(".{}.", truncate_name(&name.to_string_lossy(), TEMP_NAME_MAX)),
        None => String::from("."),
    };
    Builder::new().prefix(&prefix).suffix(".tmp").tempfile_in(dir)
}

fn truncate_name(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut cut = max;
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    &name[..cut]
}

fn replace(tmp: NamedTempFile, path: &Path) -> io::Result<()> {
    // Temp files are created 0600; keep the original mode.
    let permissions = fs::metadata(path)?.permissions();
    tmp.as_file().set_permissions(permissions)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
