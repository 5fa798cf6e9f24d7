use std::io::{self, BufRead, Read, Seek};

use crate::error::{FormatError, Result};
use crate::types::{FieldOffsets, GzipMember, Span};
use crate::{extra_len, parse_fixed, until_nul};

/// Parse the member header starting at the reader's current position.
///
/// Fields are walked one at a time: FEXTRA and FHCRC are skipped by length, FNAME and FCOMMENT are
/// scanned for their NUL one `fill_buf` at a time. Memory use is the reader's own buffer whatever
/// the field lengths, and nothing past the header is consumed. On success the reader is left at
/// `payload_start` and all offsets are absolute positions in the stream.
pub fn read_member<R: BufRead + Seek>(reader: &mut R) -> Result<GzipMember> {
    let start = reader.stream_position()?;

    let mut fixed = [0u8; GzipMember::FIXED_LEN];
    if read_up_to(reader, &mut fixed)? < GzipMember::FIXED_LEN {
        return Err(FormatError::NotGzip.into());
    }
    let (flags, mtime, xfl, os) = parse_fixed(&fixed)?;
    let mut pos = GzipMember::FIXED_LEN as u64;

    // RFC 1952 order: FEXTRA, FNAME, FCOMMENT, FHCRC.
    let extra = if flags.fextra() {
        let mut xlen = [0u8; 2];
        if read_up_to(reader, &mut xlen)? < xlen.len() {
            return Err(FormatError::TruncatedExtra.into());
        }
        let (_, len) = extra_len(&xlen).map_err(|_| FormatError::TruncatedExtra)?;
        skip_exact(reader, u64::from(len), FormatError::TruncatedExtra)?;
        Some(advance(&mut pos, 2 + u64::from(len)))
    } else {
        None
    };

    let fname = if flags.fname() {
        let len = skip_null_terminated(reader, FormatError::TruncatedName)?;
        Some(advance(&mut pos, len))
    } else {
        None
    };

    let fcomment = if flags.fcomment() {
        let len = skip_null_terminated(reader, FormatError::TruncatedComment)?;
        Some(advance(&mut pos, len))
    } else {
        None
    };

    let fhcrc = if flags.fhcrc() {
        skip_exact(reader, 2, FormatError::TruncatedCrc)?;
        Some(advance(&mut pos, 2))
    } else {
        None
    };

    let offsets = FieldOffsets {
        start: 0,
        extra,
        fname,
        fcomment,
        fhcrc,
        payload_start: pos,
    };

    Ok(GzipMember {
        fixed,
        flags,
        mtime,
        xfl,
        os,
        offsets: offsets.shifted(start),
    })
}

fn advance(pos: &mut u64, len: u64) -> Span {
    let span = Span::new(*pos, *pos + len);
    *pos = span.end;
    span
}

/// Like `read_exact`, but a short read at EOF returns the count instead of failing.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn skip_exact<R: Read>(reader: &mut R, len: u64, failure: FormatError) -> Result<()> {
    let skipped = io::copy(&mut Read::take(&mut *reader, len), &mut io::sink())?;
    if skipped < len {
        return Err(failure.into());
    }
    Ok(())
}

/// Consume a NUL-terminated field and return its length including the NUL.
fn skip_null_terminated<R: BufRead>(reader: &mut R, failure: FormatError) -> Result<u64> {
    let mut len = 0u64;
    loop {
        let (used, done) = {
            let chunk = match reader.fill_buf() {
                Ok(chunk) => chunk,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if chunk.is_empty() {
                return Err(failure.into());
            }
            match until_nul(chunk) {
                Ok((_, before)) => (before.len() + 1, true),
                Err(_) => (chunk.len(), false),
            }
        };
        reader.consume(used);
        len += used as u64;
        if done {
            return Ok(len);
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::error::Error;
    use crate::types::Flags;
    use std::io::{BufReader, Cursor, SeekFrom};

    fn named_member(name_len: usize) -> Vec<u8> {
        let mut bytes = vec![0x1f, 0x8b, 0x08, Flags::FNAME, 0x01, 0x02, 0x03, 0x04, 0x00, 0x03];
        bytes.extend(::std::iter::repeat(b'n').take(name_len));
        bytes.push(0);
        bytes.extend_from_slice(&[0xd1, 0xd2, 0xd3]);
        bytes
    }

    /// A gzip header with FNAME set followed by `len` bytes of name that never end. The bytes are
    /// generated on demand, and every `read` call is recorded.
    struct EndlessName {
        header: [u8; 10],
        pos: u64,
        len: u64,
        bytes_read: u64,
        largest_read: usize,
    }

    impl EndlessName {
        fn new(len: u64) -> EndlessName {
            EndlessName {
                header: [0x1f, 0x8b, 0x08, Flags::FNAME, 0x01, 0x02, 0x03, 0x04, 0x00, 0x03],
                pos: 0,
                len: 10 + len,
                bytes_read: 0,
                largest_read: 0,
            }
        }
    }

    impl Read for EndlessName {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.largest_read = self.largest_read.max(buf.len());
            let n = buf.len().min((self.len - self.pos) as usize);
            for (i, b) in buf[..n].iter_mut().enumerate() {
                let at = self.pos as usize + i;
                *b = if at < self.header.len() { self.header[at] } else { b'n' };
            }
            self.pos += n as u64;
            self.bytes_read += n as u64;
            Ok(n)
        }
    }

    impl Seek for EndlessName {
        fn seek(&mut self, to: SeekFrom) -> io::Result<u64> {
            match to {
                SeekFrom::Current(0) => Ok(self.pos),
                _ => Err(io::Error::new(io::ErrorKind::Other, "only position queries are supported")),
            }
        }
    }

    #[test]
    fn leaves_reader_at_payload() {
        let mut cursor = Cursor::new(named_member(8));
        let member = read_member(&mut cursor).unwrap();
        assert_eq!(member.mtime, 0x04030201);
        assert_eq!(member.offsets.fname, Some(Span::from(10..19)));
        assert_eq!(cursor.position(), 19);
        assert_eq!(member.offsets.payload_start, 19);
    }

    #[test]
    fn long_names_span_many_buffers() {
        let len = 3 * 8192 + 5;
        let mut reader = BufReader::with_capacity(64, Cursor::new(named_member(len)));
        let member = read_member(&mut reader).unwrap();
        let end = 10 + len as u64 + 1;
        assert_eq!(member.offsets.fname, Some(Span::from(10..end)));
        assert_eq!(member.offsets.payload_start, end);
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, vec![0xd1, 0xd2, 0xd3]);
    }

    #[test]
    fn offsets_are_absolute() {
        let mut bytes = vec![0xee; 5];
        bytes.extend(named_member(3));
        let mut cursor = Cursor::new(bytes);
        cursor.set_position(5);
        let member = read_member(&mut cursor).unwrap();
        assert_eq!(member.offsets.start, 5);
        assert_eq!(member.offsets.fname, Some(Span::from(15..19)));
        assert_eq!(member.offsets.payload_start, 19);
        assert_eq!(cursor.position(), 19);
    }

    #[test]
    fn all_fields_walked_in_order() {
        let mut bytes = vec![0x1f, 0x8b, 0x08, Flags::FEXTRA | Flags::FNAME | Flags::FCOMMENT | Flags::FHCRC, 0, 0, 0, 0, 0x00, 0x03];
        bytes.extend_from_slice(&[0x03, 0x00, b'a', b'b', b'c']);
        bytes.extend_from_slice(b"sample.txt\0");
        bytes.extend_from_slice(b"hello\0");
        bytes.extend_from_slice(&[0xaa, 0xbb, 0xd1]);

        let mut reader = BufReader::with_capacity(4, Cursor::new(bytes));
        let member = read_member(&mut reader).unwrap();
        assert_eq!(member.offsets.extra, Some(Span::from(10..15)));
        assert_eq!(member.offsets.fname, Some(Span::from(15..26)));
        assert_eq!(member.offsets.fcomment, Some(Span::from(26..32)));
        assert_eq!(member.offsets.fhcrc, Some(Span::from(32..34)));
        assert_eq!(member.offsets.payload_start, 34);
    }

    #[test]
    fn unterminated_name_is_scanned_in_bounded_reads() {
        let len = 64 * 1024 * 1024;
        let mut reader = BufReader::with_capacity(8 * 1024, EndlessName::new(len));
        match read_member(&mut reader) {
            Err(Error::Format(FormatError::TruncatedName)) => {}
            unexpected => panic!("Expected a truncated name, got this instead: {:?}", unexpected),
        }
        let source = reader.get_ref();
        assert_eq!(source.bytes_read, 10 + len);
        assert!(source.largest_read <= 8 * 1024, "read requested {} bytes at once", source.largest_read);
    }

    #[test]
    fn truncated_fields_at_eof() {
        let mut name = named_member(100);
        name.truncate(name.len() - 4);
        match read_member(&mut Cursor::new(name)) {
            Err(Error::Format(FormatError::TruncatedName)) => {}
            unexpected => panic!("Expected a truncated name, got this instead: {:?}", unexpected),
        }

        let extra = vec![0x1f, 0x8b, 0x08, Flags::FEXTRA, 0, 0, 0, 0, 0x00, 0x03, 0x05, 0x00, 0x01];
        match read_member(&mut Cursor::new(extra)) {
            Err(Error::Format(FormatError::TruncatedExtra)) => {}
            unexpected => panic!("Expected a truncated extra field, got this instead: {:?}", unexpected),
        }

        let comment = vec![0x1f, 0x8b, 0x08, Flags::FCOMMENT, 0, 0, 0, 0, 0x00, 0x03, b'c'];
        match read_member(&mut Cursor::new(comment)) {
            Err(Error::Format(FormatError::TruncatedComment)) => {}
            unexpected => panic!("Expected a truncated comment, got this instead: {:?}", unexpected),
        }

        let crc = vec![0x1f, 0x8b, 0x08, Flags::FHCRC, 0, 0, 0, 0, 0x00, 0x03, 0x01];
        match read_member(&mut Cursor::new(crc)) {
            Err(Error::Format(FormatError::TruncatedCrc)) => {}
            unexpected => panic!("Expected a truncated header crc, got this instead: {:?}", unexpected),
        }
    }

    #[test]
    fn short_or_foreign_file_is_not_gzip() {
        for bytes in vec![vec![0x1f, 0x8b, 0x08], Vec::new(), b"this is not gzip".to_vec()] {
            match read_member(&mut Cursor::new(bytes)) {
                Err(Error::Format(FormatError::NotGzip)) => {}
                unexpected => panic!("Expected NotGzip, got this instead: {:?}", unexpected),
            }
        }
    }

}
