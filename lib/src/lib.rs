// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A library for accessing GPIO lines on Linux platforms
//! using the GPIO character device.
//!
//! Chips are opened and inspected using the [`chip`] module, and lines are
//! reserved from them as the [`Line`] and [`LineSet`] types of the
//! [`request`] module.
//!
//! Both versions of the kernel uAPI are supported.  The version is negotiated
//! when a chip is opened, preferring v2, and fixed for the life of the chip
//! and every reservation made from it.  See [`Capabilities`] for the
//! differences.
//!
//! To read an input line and drive an output:
//! ```no_run
//! # fn main() -> gpiod::Result<()> {
//! use gpiod::chip::Chip;
//! use gpiod::line::Value;
//! use gpiod::request::Options;
//!
//! let chip = Chip::from_path("/dev/gpiochip0")?;
//! let button = chip.request_line(3, &Options::default())?;
//! let led = chip.request_line(4, Options::default().as_output(Value::Inactive))?;
//! led.set_value(button.value()?)?;
//! # Ok(())
//! # }
//! ```
//!
//! Edge events are delivered to a handler running on a background thread
//! owned by the reservation:
//! ```no_run
//! # fn main() -> gpiod::Result<()> {
//! use gpiod::line::EdgeDetection;
//! use gpiod::request::Options;
//!
//! let mut line = gpiod::request_line(
//!     "gpiochip0",
//!     5,
//!     Options::default()
//!         .with_edge_detection(EdgeDetection::BothEdges)
//!         .with_event_handler(|event| println!("{:?}", event)),
//! )?;
//! // ...
//! line.close()?; // the handler is not called after this returns
//! # Ok(())
//! # }
//! ```
//!
//! [`chip`]: module@chip
//! [`request`]: module@request
//! [`Line`]: request::Line
//! [`LineSet`]: request::LineSet

use errno::Errno;
use gpiod_uapi as uapi;
use std::fmt;
use std::path::{Path, PathBuf};

mod abi;

/// Types and functions specific to chips.
pub mod chip;

mod dispatch;

/// Types specific to lines.
pub mod line;

/// Types and functions related to reserving lines.
///
/// Lines are reserved from a [`Chip`] using [`request_line`] or
/// [`request_lines`], configured by [`Options`].
/// Reserved lines may be reconfigured using a [`Config`].
///
/// [`Chip`]: crate::chip::Chip
/// [`request_line`]: crate::chip::Chip::request_line
/// [`request_lines`]: crate::chip::Chip::request_lines
/// [`Options`]: Options
/// [`Config`]: Config
pub mod request;

pub use abi::{AbiVersion, Capabilities};
pub use chip::Chip;
pub use request::{Line, LineSet};

/// Errors returned by [`gpiod`] functions.
///
/// The variants fall into two families, distinguished by [`Error::is_local`].
/// Local errors are raised by the library before any call to the kernel.
/// Native errors carry the errno returned by the kernel or the OS, untouched,
/// so callers can branch on well known codes such as EBUSY and EINVAL
/// using [`Error::errno`].
///
/// [`gpiod`]: crate
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
pub enum Error {
    /// An offset is out of range for the chip, or repeated within a request.
    #[error("invalid offset")]
    InvalidOffset,

    /// The path is not a GPIO character device.
    #[error("\"{}\" is not a character device", .0.display())]
    NotCharacterDevice(PathBuf),

    /// The chip or reservation has already been closed.
    #[error("already closed")]
    Closed,

    /// A value was written to a line that is not an output.
    #[error("permission denied")]
    PermissionDenied,

    /// An OS call, such as opening or inspecting a file, failed.
    #[error(transparent)]
    Os(#[from] Errno),

    /// A uAPI call was rejected.
    #[error("uAPI {0} returned: {1}")]
    Uapi(UapiCall, #[source] uapi::Error),
}

impl Error {
    /// The native errno, if the error originated from the kernel or the OS.
    ///
    /// Features unavailable under the negotiated ABI version report EINVAL.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::Os(e) => Some(*e),
            Error::Uapi(_, e) => e.errno(),
            _ => None,
        }
    }

    /// True if the error was raised by the library rather than the kernel or OS.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Error::InvalidOffset
                | Error::NotCharacterDevice(_)
                | Error::Closed
                | Error::PermissionDenied
        )
    }

    /// The rejection for a feature the negotiated ABI version lacks.
    pub(crate) fn unsupported(call: UapiCall) -> Error {
        Error::Uapi(call, uapi::Error::Os(Errno(libc::EINVAL)))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Os(Errno(e.raw_os_error().unwrap_or(libc::EIO)))
    }
}

/// Identifiers for the underlying uAPI calls.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum UapiCall {
    GetChipInfo,
    GetLine,
    GetLineEvent,
    GetLineHandle,
    GetLineInfo,
    GetLineValues,
    HasEvent,
    ReadEvent,
    SetLineConfig,
    SetLineValues,
    UnwatchLineInfo,
    WatchLineInfo,
}

impl fmt::Display for UapiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UapiCall::GetChipInfo => "get_chip_info",
            UapiCall::GetLine => "get_line",
            UapiCall::GetLineEvent => "get_line_event",
            UapiCall::GetLineHandle => "get_line_handle",
            UapiCall::GetLineInfo => "get_line_info",
            UapiCall::GetLineValues => "get_line_values",
            UapiCall::HasEvent => "has_event",
            UapiCall::ReadEvent => "read_event",
            UapiCall::SetLineConfig => "set_line_config",
            UapiCall::SetLineValues => "set_line_values",
            UapiCall::UnwatchLineInfo => "unwatch_line_info",
            UapiCall::WatchLineInfo => "watch_line_info",
        };
        write!(f, "{}", name)
    }
}

/// The result for [`gpiod`] functions.
///
/// [`gpiod`]: crate
pub type Result<T> = std::result::Result<T, Error>;

/// Reserve a single line on a chip.
///
/// The chip may be identified by path or by name, e.g. `gpiochip0`.
/// The chip itself is closed before returning; the reservation remains open.
pub fn request_line<P: AsRef<Path>>(
    chip: P,
    offset: line::Offset,
    options: &request::Options,
) -> Result<Line> {
    Chip::from_path(chip)?.request_line(offset, options)
}

/// Reserve a set of lines on a chip.
///
/// The chip may be identified by path or by name, e.g. `gpiochip0`.
/// The chip itself is closed before returning; the reservation remains open.
pub fn request_lines<P: AsRef<Path>>(
    chip: P,
    offsets: &[line::Offset],
    options: &request::Options,
) -> Result<LineSet> {
    Chip::from_path(chip)?.request_lines(offsets, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_errno() {
        assert_eq!(Error::InvalidOffset.errno(), None);
        assert_eq!(Error::Closed.errno(), None);
        assert_eq!(Error::Os(Errno(libc::ENOENT)).errno(), Some(Errno(libc::ENOENT)));
        let e = Error::Uapi(UapiCall::GetLine, uapi::Error::Os(Errno(libc::EBUSY)));
        assert_eq!(e.errno(), Some(Errno(libc::EBUSY)));
        let e = Error::Uapi(
            UapiCall::ReadEvent,
            uapi::Error::UnderRead {
                expected: 48,
                found: 0,
            },
        );
        assert_eq!(e.errno(), None);
    }

    #[test]
    fn error_is_local() {
        assert!(Error::InvalidOffset.is_local());
        assert!(Error::NotCharacterDevice(PathBuf::from("/dev/null")).is_local());
        assert!(Error::Closed.is_local());
        assert!(Error::PermissionDenied.is_local());
        assert!(!Error::Os(Errno(libc::ENOENT)).is_local());
        assert!(!Error::unsupported(UapiCall::WatchLineInfo).is_local());
    }

    #[test]
    fn unsupported_is_einval() {
        assert_eq!(
            Error::unsupported(UapiCall::SetLineConfig),
            Error::Uapi(
                UapiCall::SetLineConfig,
                uapi::Error::Os(Errno(libc::EINVAL))
            )
        );
    }

    #[test]
    fn error_from_io() {
        let e = std::io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(Error::from(e), Error::Os(Errno(libc::EACCES)));
    }

    #[test]
    fn error_display() {
        assert_eq!(Error::InvalidOffset.to_string(), "invalid offset");
        assert_eq!(
            Error::NotCharacterDevice(PathBuf::from("/dev/null")).to_string(),
            "\"/dev/null\" is not a character device"
        );
        assert_eq!(Error::Closed.to_string(), "already closed");
        assert_eq!(
            UapiCall::UnwatchLineInfo.to_string(),
            "unwatch_line_info"
        );
    }
}
