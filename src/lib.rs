//! Normalize the header of GZIP files in place, as laid out in [RFC
//! 1952](https://tools.ietf.org/rfc/rfc1952.txt), so that re-compressing the same data twice
//! produces the same bytes.
//!
//! A cleaned member header has MTIME set to zero and carries neither FNAME nor FHCRC. FEXTRA and
//! FCOMMENT are kept byte for byte. The compressed payload is never decoded, only copied.
//!
//! # Notes on this cleaner
//!
//! ## TL;DR
//!
//! Only the first member of a file is cleaned.
//!
//! ## Details
//!
//! Multiple members can live in a single GZIP stream by concatenating GZIP files together (see
//! [section 2.2](https://tools.ietf.org/html/rfc1952#page-5) of the RFC). Finding the second
//! member header means inflating the first member, which is exactly what this crate avoids, so
//! everything after the first header is streamed through untouched: the deflate data, the
//! CRC32/ISIZE trailer and any later members along with whatever MTIME or FNAME they carry.
//!
//! ## Parsing
//!
//! The header parsers below are built from nom's *streaming* combinators, so running out of input
//! is reported as `Incomplete` rather than as a parse error. [`parse_member`] maps that to the
//! truncation error of the field being parsed. [`reader::read_member`] walks a file field by
//! field with the same parsers and never holds more than the fixed header and one buffer of a
//! NUL-terminated field in memory.

pub mod error;
pub mod reader;
pub mod rewrite;
pub mod scan;
pub mod types;

pub use error::{Error, FormatError, Result};
pub use reader::read_member;
pub use rewrite::{clean_file, rewrite_member, Outcome};
pub use scan::{find_targets, run, Options, Summary};
pub use types::*;

use nom::bytes::streaming::{tag, take, take_until};
use nom::combinator::{map, recognize, verify};
use nom::multi::length_data;
use nom::number::streaming::{le_u16, le_u32, u8 as byte};
use nom::sequence::{terminated, tuple};
use nom::IResult;

/// Why an in-memory header could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The bytes present are not a valid header.
    Invalid(FormatError),
    /// The input ended inside a field. If the stream really ends here this is the error to report.
    Incomplete(FormatError),
}

fn magic(input: &[u8]) -> IResult<&[u8], &[u8]> {
    tag(&b"\x1f\x8b"[..])(input)
}

fn compression_method(input: &[u8]) -> IResult<&[u8], u8> {
    verify(byte, |cm: &u8| *cm == GzipMember::DEFLATE)(input)
}

fn flags(input: &[u8]) -> IResult<&[u8], Flags> {
    map(byte, Flags::from)(input)
}

fn modified_time(input: &[u8]) -> IResult<&[u8], u32> {
    le_u32(input)
}

fn single_byte(input: &[u8]) -> IResult<&[u8], u8> {
    byte(input)
}

/// ID1 ID2 CM FLG MTIME XFL OS
fn fixed_header(input: &[u8]) -> IResult<&[u8], (&[u8], u8, Flags, u32, u8, u8)> {
    tuple((magic, compression_method, flags, modified_time, single_byte, single_byte))(input)
}

pub(crate) fn extra_len(input: &[u8]) -> IResult<&[u8], u16> {
    le_u16(input)
}

/// XLEN followed by XLEN bytes of sub-fields. The sub-fields are not looked at.
fn extra_field(input: &[u8]) -> IResult<&[u8], &[u8]> {
    recognize(length_data(extra_len))(input)
}

/// Bytes before the first NUL; `Incomplete` while no NUL has been seen.
pub(crate) fn until_nul(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_until(&b"\0"[..])(input)
}

/// Raw bytes up to and including the NUL terminator. No encoding is assumed.
fn null_terminated(input: &[u8]) -> IResult<&[u8], &[u8]> {
    recognize(terminated(until_nul, take(1usize)))(input)
}

fn header_crc16(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take(2usize)(input)
}

fn field<'a, O, F>(input: &'a [u8], failure: FormatError, parser: F) -> ::std::result::Result<(&'a [u8], O), ParseError>
where
    F: FnOnce(&'a [u8]) -> IResult<&'a [u8], O>,
{
    parser(input).map_err(|err| match err {
        nom::Err::Incomplete(_) => ParseError::Incomplete(failure),
        nom::Err::Error(_) | nom::Err::Failure(_) => ParseError::Invalid(failure),
    })
}

fn optional_field<'a, O, F>(
    input: &'a [u8],
    rest: &mut &'a [u8],
    present: bool,
    failure: FormatError,
    parser: F,
) -> ::std::result::Result<Option<Span>, ParseError>
where
    F: FnOnce(&'a [u8]) -> IResult<&'a [u8], O>,
{
    if !present {
        return Ok(None);
    }
    let start = input.len() - rest.len();
    let (remaining, _) = field(*rest, failure, parser)?;
    *rest = remaining;
    Ok(Some(Span::from(start as u64..(input.len() - rest.len()) as u64)))
}

/// Flags, MTIME, XFL and OS from the 10 fixed header bytes.
pub(crate) fn parse_fixed(input: &[u8]) -> ::std::result::Result<(Flags, u32, u8, u8), FormatError> {
    match fixed_header(input) {
        Ok((_, (_, _, flags, mtime, xfl, os))) => Ok((flags, mtime, xfl, os)),
        Err(_) => Err(FormatError::NotGzip),
    }
}

/// Parse a member header that starts at `input[0]`. Offsets in the result are relative to the
/// start of `input`; trailing bytes after the header are ignored.
pub fn parse_member(input: &[u8]) -> ::std::result::Result<GzipMember, ParseError> {
    let (mut rest, (_, _, flags, mtime, xfl, os)) =
        field(input, FormatError::NotGzip, fixed_header)?;

    let mut fixed = [0u8; GzipMember::FIXED_LEN];
    fixed.copy_from_slice(&input[..GzipMember::FIXED_LEN]);

    // RFC 1952 order: FEXTRA, FNAME, FCOMMENT, FHCRC.
    let extra = optional_field(input, &mut rest, flags.fextra(), FormatError::TruncatedExtra, extra_field)?;
    let fname = optional_field(input, &mut rest, flags.fname(), FormatError::TruncatedName, null_terminated)?;
    let fcomment = optional_field(input, &mut rest, flags.fcomment(), FormatError::TruncatedComment, null_terminated)?;
    let fhcrc = optional_field(input, &mut rest, flags.fhcrc(), FormatError::TruncatedCrc, header_crc16)?;

    Ok(GzipMember {
        fixed,
        flags,
        mtime,
        xfl,
        os,
        offsets: FieldOffsets {
            start: 0,
            extra,
            fname,
            fcomment,
            fhcrc,
            payload_start: (input.len() - rest.len()) as u64,
        },
    })
}
