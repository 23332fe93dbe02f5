// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use errno::{errno, Errno};
use libc::{c_void, pollfd, ppoll, sigset_t, timespec, POLLIN};
use nix::sys::ioctl::ioctl_num_type;
use std::ffi::OsStr;
use std::fmt;
use std::fs::File;
use std::mem::{size_of, MaybeUninit};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::ptr::null;

pub(crate) const IOCTL_MAGIC: u8 = 0xb4;

#[repr(u8)]
enum Ioctl {
    GetChipInfo = 1,
}

/// Issue an ioctl, mapping a failure to the errno it set.
pub(crate) fn ioctl<T>(fd: RawFd, code: ioctl_num_type, arg: *mut T) -> Result<i32> {
    // SAFETY: callers pass a code whose encoded size matches T.
    match unsafe { libc::ioctl(fd, code, arg) } {
        -1 => Err(Error::from_errno()),
        rc => Ok(rc),
    }
}

/// Wrap a descriptor returned in a request struct as an owned File.
pub(crate) fn file_from_fd(fd: i32) -> File {
    // SAFETY: the kernel has just handed ownership of fd to us.
    unsafe { File::from_raw_fd(fd) }
}

/// Marker for wire structs that are valid for every bit pattern,
/// and so may be filled directly by a read.
///
/// # Safety
///
/// Implementors must be `repr(C)` and contain only integers, or wrappers
/// around integers, for which all values are valid.
pub(crate) unsafe trait Plain: Sized {}

/// Read exactly one record of type T from the file.
pub(crate) fn read_record<T: Plain>(f: &File) -> Result<T> {
    let mut rec = MaybeUninit::<T>::zeroed();
    let expected = size_of::<T>();
    // SAFETY: the buffer is sized and aligned for T.
    let n = unsafe { libc::read(f.as_raw_fd(), rec.as_mut_ptr() as *mut c_void, expected) };
    if n < 0 {
        return Err(Error::from_errno());
    }
    let found = n as usize;
    if found != expected {
        return Err(Error::UnderRead { expected, found });
    }
    // SAFETY: T is Plain and was zeroed before the read.
    Ok(unsafe { rec.assume_init() })
}

/// Check, without blocking, if the file has a record available to read.
pub fn has_event(f: &File) -> Result<bool> {
    let mut pfd = pollfd {
        fd: f.as_raw_fd(),
        events: POLLIN,
        revents: 0,
    };
    let timeout = timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: pfd and timeout outlive the call.
    match unsafe { ppoll(&mut pfd, 1, &timeout, null::<sigset_t>()) } {
        -1 => Err(Error::from_errno()),
        0 => Ok(false),
        _ => Ok(true),
    }
}

/// Information about a particular GPIO chip.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChipInfo {
    /// The kernel name of the chip, e.g. `gpiochip0`.
    pub name: Name,
    /// A functional name for the chip, such as a product number.
    ///
    /// May be empty.
    pub label: Name,
    /// The number of lines on the chip.
    pub num_lines: u32,
}

/// Get the publicly available information for a chip.
///
/// * `cf` - The open chip File.
pub fn get_chip_info(cf: &File) -> Result<ChipInfo> {
    let mut info = ChipInfo::default();
    ioctl(
        cf.as_raw_fd(),
        nix::request_code_read!(IOCTL_MAGIC, Ioctl::GetChipInfo, size_of::<ChipInfo>()),
        &mut info,
    )?;
    Ok(info)
}

/// The result returned by [`gpiod_uapi`] functions.
///
/// [`gpiod_uapi`]: crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`gpiod_uapi`] functions.
///
/// [`gpiod_uapi`]: crate
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
pub enum Error {
    /// A system call failed with the contained errno.
    #[error(transparent)]
    Os(#[from] Errno),
    /// A read returned fewer bytes than a full record.
    #[error("read {found} bytes, expected {expected}")]
    UnderRead { expected: usize, found: usize },
    /// The kernel returned a record that could not be decoded.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl Error {
    /// Capture the errno of the system call that just failed.
    pub fn from_errno() -> Error {
        Error::Os(errno())
    }

    /// The errno, if the error came from a system call.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::Os(e) => Some(*e),
            _ => None,
        }
    }
}

/// A failure to decode a field of a record returned by the kernel.
//
// Only expected if a kernel adds an enum value this crate predates.
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
#[error("kernel returned invalid {field}: {msg}")]
pub struct ValidationError {
    pub field: String,
    pub msg: String,
}

impl ValidationError {
    pub fn new<S: Into<String>, T: Into<String>>(field: S, msg: T) -> ValidationError {
        ValidationError {
            field: field.into(),
            msg: msg.into(),
        }
    }
}

/// The maximum number of bytes stored in a Name, including the terminator.
pub const NAME_MAX: usize = 32;

/// A fixed size, NUL padded, name field.
#[repr(C)]
#[derive(Clone, Copy, Default, Eq, PartialEq)]
pub struct Name([u8; NAME_MAX]);

impl Name {
    /// Check if the name is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }

    /// The length of the name, not including any terminator.
    #[inline]
    pub fn strlen(&self) -> usize {
        self.0.iter().position(|&x| x == 0).unwrap_or(NAME_MAX)
    }

    /// The name as raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..self.strlen()]
    }

    /// The name as an OsStr.
    pub fn as_os_str(&self) -> &OsStr {
        OsStr::from_bytes(self.as_bytes())
    }

    /// Construct a name from bytes.
    ///
    /// The name is truncated to leave room for the terminator the kernel
    /// expects, so it may be cut in the middle of a multi-byte character.
    pub fn from_bytes(s: &[u8]) -> Name {
        let mut n = Name::default();
        let len = s.len().min(NAME_MAX - 1);
        n.0[..len].copy_from_slice(&s[..len]);
        n
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::from_bytes(s.as_bytes())
    }
}

impl From<&Name> for String {
    fn from(n: &Name) -> Self {
        String::from_utf8_lossy(n.as_bytes()).into_owned()
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_os_str())
    }
}

/// An identifier for a line on a particular chip.
///
/// Valid offsets are in the range 0..`num_lines` as reported in the [`ChipInfo`].
pub type Offset = u32;

/// The maximum number of lines that may be requested in a single request.
pub const LINES_MAX: usize = 64;

/// The offsets of the lines in a request.
#[repr(C)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Offsets([Offset; LINES_MAX]);

impl Offsets {
    /// Create offsets from a slice.
    ///
    /// Entries beyond [`LINES_MAX`] are ignored.
    pub fn from_slice(s: &[Offset]) -> Self {
        let mut n = Offsets::default();
        for (dst, src) in n.0.iter_mut().zip(s) {
            *dst = *src;
        }
        n
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Offset {
        self.0[idx]
    }
}

impl Default for Offsets {
    fn default() -> Self {
        Offsets([0; LINES_MAX])
    }
}

/// Space reserved for future use, sized in u32 words.
#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[doc(hidden)]
pub struct Padding<const SIZE: usize>([u32; SIZE]);

impl<const SIZE: usize> Default for Padding<SIZE> {
    fn default() -> Self {
        Padding([0; SIZE])
    }
}

/// The transition that triggered an edge event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineEdgeEventKind {
    /// The line went from *inactive* to *active*.
    RisingEdge = 1,
    /// The line went from *active* to *inactive*.
    FallingEdge = 2,
}

impl TryFrom<u32> for LineEdgeEventKind {
    type Error = ValidationError;

    fn try_from(v: u32) -> std::result::Result<Self, Self::Error> {
        match v {
            1 => Ok(LineEdgeEventKind::RisingEdge),
            2 => Ok(LineEdgeEventKind::FallingEdge),
            x => Err(ValidationError::new("kind", format!("invalid value: {}", x))),
        }
    }
}

/// The change that triggered a line info change event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineInfoChangeKind {
    /// The line has been requested.
    Requested = 1,
    /// The line has been released.
    Released = 2,
    /// The line has been reconfigured.
    Reconfigured = 3,
}

impl TryFrom<u32> for LineInfoChangeKind {
    type Error = ValidationError;

    fn try_from(v: u32) -> std::result::Result<Self, Self::Error> {
        match v {
            1 => Ok(LineInfoChangeKind::Requested),
            2 => Ok(LineInfoChangeKind::Released),
            3 => Ok(LineInfoChangeKind::Reconfigured),
            x => Err(ValidationError::new("kind", format!("invalid value: {}", x))),
        }
    }
}
