use std::fmt;
use std::ops::Range;

/// The FLG byte of a member header. The raw byte is kept so bits we never
/// look at (FTEXT, reserved) survive a rewrite untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags(u8);

impl Flags {
    pub const FTEXT:    u8 = 0b0000_0001;
    pub const FHCRC:    u8 = 0b0000_0010;
    pub const FEXTRA:   u8 = 0b0000_0100;
    pub const FNAME:    u8 = 0b0000_1000;
    pub const FCOMMENT: u8 = 0b0001_0000;

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn ftext(self)    -> bool { self.0 & Flags::FTEXT    > 0 }
    pub fn fhcrc(self)    -> bool { self.0 & Flags::FHCRC    > 0 }
    pub fn fextra(self)   -> bool { self.0 & Flags::FEXTRA   > 0 }
    pub fn fname(self)    -> bool { self.0 & Flags::FNAME    > 0 }
    pub fn fcomment(self) -> bool { self.0 & Flags::FCOMMENT > 0 }

    /// Flags for the rewritten header: FNAME and FHCRC are always cleared,
    /// every other bit is carried over.
    pub fn cleaned(self) -> Flags {
        Flags(self.0 & !Flags::FNAME & !Flags::FHCRC)
    }
}

impl From<u8> for Flags {

    fn from(byte: u8) -> Self {
        Flags(byte)
    }

}

/// Half-open byte range `[start, end)` in the source stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: u64,
    pub end: u64,
}

impl Span {
    pub fn new(start: u64, end: u64) -> Span {
        debug_assert!(start <= end);
        Span { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub(crate) fn shifted(self, base: u64) -> Span {
        Span::new(self.start + base, self.end + base)
    }
}

impl From<Range<u64>> for Span {

    fn from(range: Range<u64>) -> Self {
        Span::new(range.start, range.end)
    }

}

/// Where each optional field of a member header lives. `None` means the
/// field is absent according to the flag byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOffsets {
    pub start: u64,
    /// XLEN prefix plus the extra data.
    pub extra: Option<Span>,
    /// Original filename including its NUL terminator.
    pub fname: Option<Span>,
    /// Comment including its NUL terminator.
    pub fcomment: Option<Span>,
    pub fhcrc: Option<Span>,
    pub payload_start: u64,
}

impl FieldOffsets {
    pub(crate) fn shifted(self, base: u64) -> FieldOffsets {
        FieldOffsets {
            start: self.start + base,
            extra: self.extra.map(|s| s.shifted(base)),
            fname: self.fname.map(|s| s.shifted(base)),
            fcomment: self.fcomment.map(|s| s.shifted(base)),
            fhcrc: self.fhcrc.map(|s| s.shifted(base)),
            payload_start: self.payload_start + base,
        }
    }

    /// Number of header bytes the rewrite drops.
    pub fn removed_len(&self) -> u64 {
        self.fname.map_or(0, |s| s.len()) + self.fhcrc.map_or(0, |s| s.len())
    }
}

/// Layout of the first member header of a GZIP stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GzipMember {
    /// The 10 fixed header bytes exactly as read.
    pub fixed: [u8; 10],
    pub flags: Flags,
    pub mtime: u32,
    pub xfl: u8,
    pub os: u8,
    pub offsets: FieldOffsets,
}

impl GzipMember {
    pub const FIXED_LEN: usize = 10;
    /// The only compression method RFC 1952 defines; any other CM byte is rejected.
    pub const DEFLATE: u8 = 8;

    pub fn decision(&self) -> CleaningDecision {
        CleaningDecision::from(self)
    }

    /// Fixed header for the cleaned member: same ID, CM, XFL and OS bytes,
    /// FNAME/FHCRC bits cleared and MTIME zeroed.
    pub fn cleaned_fixed(&self) -> [u8; 10] {
        let mut fixed = self.fixed;
        fixed[3] = self.flags.cleaned().bits();
        fixed[4..8].copy_from_slice(&[0; 4]);
        fixed
    }
}

/// What a member header carries that the cleaner strips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleaningDecision {
    pub needs_mtime_clear: bool,
    pub needs_fname_removal: bool,
    /// Informational; FHCRC is dropped whenever a rewrite happens anyway.
    pub needs_fhcrc_removal: bool,
    pub mtime: u32,
}

impl CleaningDecision {
    /// A lone FHCRC does not trigger a rewrite: the checksum only goes stale
    /// once the header bytes it covers change.
    pub fn needs_rewrite(&self) -> bool {
        self.needs_mtime_clear || self.needs_fname_removal
    }

    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.needs_mtime_clear {
            issues.push(format!("mtime={}", self.mtime));
        }
        if self.needs_fname_removal {
            issues.push(String::from("filename"));
        }
        if self.needs_fhcrc_removal {
            issues.push(String::from("crc"));
        }
        issues
    }
}

impl<'a> From<&'a GzipMember> for CleaningDecision {

    fn from(member: &'a GzipMember) -> Self {
        CleaningDecision {
            needs_mtime_clear: member.mtime != 0,
            needs_fname_removal: member.flags.fname(),
            needs_fhcrc_removal: member.flags.fhcrc(),
            mtime: member.mtime,
        }
    }

}

impl fmt::Display for CleaningDecision {

    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.issues().join(", "))
    }

}
