//! Four-character codes used as compact runtime type and format tags.

use std::fmt;

/// A 4-byte packed character code.
///
/// Every [`SharedObject`](crate::object::SharedObject) carries one as a
/// lightweight runtime type marker; collaborators can branch on the tag
/// instead of full RTTI. Media formats use the same representation.
///
/// # Example
///
/// ```rust
/// use strata::fourcc::FourCc;
///
/// const H264: FourCc = FourCc::new(b"avc1");
/// assert_eq!(H264.to_string(), "avc1");
/// assert_eq!(FourCc::from_u32(H264.as_u32()), H264);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCc([u8; 4]);

impl FourCc {
    /// Generic shared object tag.
    pub const OBJECT: FourCc = FourCc::new(b"?obj");
    /// Byte buffer tag.
    pub const BUFFER: FourCc = FourCc::new(b"?buf");
    /// Message tag.
    pub const MESSAGE: FourCc = FourCc::new(b"?msg");
    /// Job tag.
    pub const JOB: FourCc = FourCc::new(b"?job");
    /// Content tag.
    pub const CONTENT: FourCc = FourCc::new(b"?cnt");
    /// Looper tag.
    pub const LOOPER: FourCc = FourCc::new(b"?lpr");
    /// Dispatch queue tag.
    pub const DISPATCH_QUEUE: FourCc = FourCc::new(b"?dpq");

    /// Create a code from four bytes.
    #[inline]
    pub const fn new(code: &[u8; 4]) -> Self {
        FourCc(*code)
    }

    /// Pack the code into a big-endian `u32` (first byte in the high bits).
    #[inline]
    pub const fn as_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Unpack a code from a big-endian `u32`.
    #[inline]
    pub const fn from_u32(v: u32) -> Self {
        FourCc(v.to_be_bytes())
    }

    /// The raw four bytes.
    #[inline]
    pub const fn bytes(self) -> [u8; 4] {
        self.0
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            // Non-printable bytes render as '.' so tags stay greppable in logs.
            let c = if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({self})")
    }
}

impl From<&[u8; 4]> for FourCc {
    fn from(code: &[u8; 4]) -> Self {
        FourCc(*code)
    }
}
