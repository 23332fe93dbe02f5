// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::dispatch::{Dispatcher, Source};
use crate::line::{self, InfoChangeEvent, Offset};
use crate::request::{self, Line, LineSet};
use crate::{AbiVersion, Capabilities, Error, Result, UapiCall};
use gpiod_uapi::{get_chip_info, v1, v2};
use nohash_hasher::IntMap;
use std::cmp::Ordering;
use std::fmt;
use std::fs::{self, File};
use std::os::linux::fs::MetadataExt;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileTypeExt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A handler for line info changes.
pub type InfoHandler = Arc<dyn Fn(InfoChangeEvent) + Send + Sync>;

type Watches = Arc<Mutex<IntMap<Offset, InfoHandler>>>;

/// Check if a path corresponds to a GPIO character device.
///
/// Returns the resolved path to the character device.
pub fn is_chip<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let pb = fs::canonicalize(&path)?;
    // the kernel names chip devices gpiochipN
    if let Some(num) = pb.to_str().and_then(|s| s.strip_prefix("/dev/gpiochip")) {
        if !num.is_empty() && num.bytes().all(|c| c.is_ascii_digit()) {
            return Ok(pb);
        }
    }

    let m = fs::metadata(&pb)?;
    if !m.file_type().is_char_device() {
        return Err(Error::NotCharacterDevice(pb));
    }
    // other character devices, e.g. /dev/null, are not GPIO chips
    let Some(name) = pb.file_name() else {
        return Err(Error::NotCharacterDevice(pb));
    };
    let sysfs_dev = Path::new("/sys/bus/gpio/devices").join(name).join("dev");
    if let Ok(dev) = fs::read_to_string(sysfs_dev) {
        let rdev = m.st_rdev();
        if dev.trim_end() == format!("{}:{}", libc::major(rdev), libc::minor(rdev)) {
            return Ok(pb);
        }
    }
    Err(Error::NotCharacterDevice(pb))
}

/// Compare two chip paths, ordering any trailing numbers numerically.
///
/// So `/dev/gpiochip3` sorts before `/dev/gpiochip10`.
pub fn path_compare(a: &Path, b: &Path) -> Ordering {
    let (ap, an) = split_number(a.as_os_str().as_bytes());
    let (bp, bn) = split_number(b.as_os_str().as_bytes());
    ap.cmp(bp).then(an.cmp(&bn))
}

fn split_number(s: &[u8]) -> (&[u8], Option<u64>) {
    let digits = s.iter().rev().take_while(|c| c.is_ascii_digit()).count();
    let (prefix, num) = s.split_at(s.len() - digits);
    let num = std::str::from_utf8(num).ok().and_then(|n| n.parse().ok());
    (prefix, num)
}

/// Returns the paths of all the GPIO character devices on the system.
///
/// The returned paths are sorted by [`path_compare`] and contain no duplicates.
pub fn chips() -> Result<Vec<PathBuf>> {
    let mut chips = fs::read_dir("/dev")?
        .filter_map(|de| de.ok())
        .filter_map(|de| is_chip(de.path()).ok())
        .collect::<Vec<PathBuf>>();
    chips.sort_unstable_by(|a, b| path_compare(a, b));
    chips.dedup();
    Ok(chips)
}

/// Resolve a bare chip name, such as `gpiochip0`, to its path under `/dev`.
fn chip_path(p: &Path) -> PathBuf {
    let mut components = p.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => Path::new("/dev").join(name),
        _ => p.to_path_buf(),
    }
}

/// Options for opening a [`Chip`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Options {
    consumer: Option<String>,
    abiv: Option<AbiVersion>,
}

impl Options {
    /// Set the consumer label applied to lines requested from the chip.
    ///
    /// May be overridden for individual requests.
    /// Defaults to `gpiod-p<pid>`.
    pub fn with_consumer(&mut self, consumer: &str) -> &mut Self {
        self.consumer = Some(consumer.into());
        self
    }

    /// Force the uAPI ABI version, rather than negotiating it with the kernel.
    ///
    /// Intended for compatibility testing.
    pub fn using_abi_version(&mut self, abiv: AbiVersion) -> &mut Self {
        self.abiv = Some(abiv);
        self
    }

    /// Open the chip at the path, or with the name, e.g. `gpiochip0`.
    pub fn open<P: AsRef<Path>>(&self, p: P) -> Result<Chip> {
        let path = is_chip(chip_path(p.as_ref()))?;
        let f = File::open(&path)?;
        let ci = get_chip_info(&f).map_err(|e| Error::Uapi(UapiCall::GetChipInfo, e))?;
        let caps = Capabilities::negotiate(&f, ci.num_lines, self.abiv);
        let name = String::from(&ci.name);
        log::debug!("{} opened using {}", name, caps.abi_version());
        Ok(Chip {
            path,
            name,
            label: String::from(&ci.label),
            num_lines: ci.num_lines,
            consumer: self
                .consumer
                .clone()
                .unwrap_or_else(|| format!("gpiod-p{}", std::process::id())),
            caps,
            f: Some(Arc::new(f)),
            watches: Watches::default(),
            watcher: Mutex::new(None),
        })
    }
}

/// A GPIO character device.
///
/// The chip is the factory for line reservations, and the source of line
/// info and info change notifications.
///
/// Reservations outlive the chip they were requested from.
pub struct Chip {
    path: PathBuf,
    name: String,
    label: String,
    num_lines: u32,
    consumer: String,
    caps: Capabilities,
    f: Option<Arc<File>>,
    watches: Watches,
    watcher: Mutex<Option<Dispatcher>>,
}

impl fmt::Debug for Chip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chip")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("label", &self.label)
            .field("num_lines", &self.num_lines)
            .field("abi_version", &self.caps.abi_version())
            .field("closed", &self.f.is_none())
            .finish()
    }
}

impl Chip {
    /// Open the chip at the given path, or with the given name, with default options.
    ///
    /// # Examples
    /// ```no_run
    /// # fn example() -> gpiod::Result<gpiod::Chip> {
    /// let chip = gpiod::Chip::from_path("/dev/gpiochip0")?;
    /// # Ok(chip)
    /// # }
    /// ```
    pub fn from_path<P: AsRef<Path>>(p: P) -> Result<Chip> {
        Options::default().open(p)
    }

    /// The path to the character device.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The name of the chip, as assigned by the kernel, e.g. `gpiochip0`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A functional name for the chip, such as a product number.
    ///
    /// May be empty.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The number of lines on the chip.
    pub fn lines(&self) -> Result<u32> {
        self.file()?;
        Ok(self.num_lines)
    }

    /// The consumer label applied to requests that do not set their own.
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// The uAPI ABI version negotiated when the chip was opened.
    pub fn abi_version(&self) -> AbiVersion {
        self.caps.abi_version()
    }

    /// The features available through the chip.
    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub(crate) fn file(&self) -> Result<&Arc<File>> {
        self.f.as_ref().ok_or(Error::Closed)
    }

    fn check_offset(&self, offset: Offset) -> Result<()> {
        if offset >= self.num_lines {
            return Err(Error::InvalidOffset);
        }
        Ok(())
    }

    /// Get the current info for a line.
    pub fn line_info(&self, offset: Offset) -> Result<line::Info> {
        let f = self.file()?;
        self.check_offset(offset)?;
        read_line_info(f, self.caps.abi_version(), offset)
    }

    /// Watch a line for changes to its info, returning the current info.
    ///
    /// The handler is called from a background thread, in the order the
    /// kernel reports the changes, until the line is unwatched or the chip
    /// is closed.  Only one watch may be active on a line.
    ///
    /// Requires the v2 uAPI ABI.
    pub fn watch_line_info<F>(&self, offset: Offset, handler: F) -> Result<line::Info>
    where
        F: Fn(InfoChangeEvent) + Send + Sync + 'static,
    {
        let f = self.file()?;
        self.check_offset(offset)?;
        if !self.caps.info_watch() {
            return Err(Error::unsupported(UapiCall::WatchLineInfo));
        }
        let info = {
            let mut watches = self.watches.lock().expect("watch registry poisoned");
            let li = v2::watch_line_info(f, offset)
                .map_err(|e| Error::Uapi(UapiCall::WatchLineInfo, e))?;
            watches.insert(offset, Arc::new(handler));
            line::Info::from(&li)
        };
        if let Err(e) = self.start_watcher(f) {
            self.abandon_watch(f, offset);
            return Err(e);
        }
        Ok(info)
    }

    // Drops a watch that has no reader to deliver its changes.
    fn abandon_watch(&self, f: &File, offset: Offset) {
        self.watches
            .lock()
            .expect("watch registry poisoned")
            .remove(&offset);
        if let Err(e) = v2::unwatch_line_info(f, offset) {
            log::warn!(
                "{} failed to unwatch line {}: {}",
                self.name,
                offset,
                Error::Uapi(UapiCall::UnwatchLineInfo, e)
            );
        }
    }

    // Spawns the info change reader, unless one is already running.
    fn start_watcher(&self, f: &Arc<File>) -> Result<()> {
        let mut watcher = self.watcher.lock().expect("watcher poisoned");
        if watcher.as_ref().is_some_and(|w| !w.is_finished()) {
            return Ok(());
        }
        let source = InfoSource {
            files: vec![f.clone()],
            watches: self.watches.clone(),
        };
        *watcher = Some(Dispatcher::spawn(&self.name, source)?);
        Ok(())
    }

    /// Stop watching a line for info changes.
    ///
    /// Fails with EBUSY if the line is not being watched.
    pub fn unwatch_line_info(&self, offset: Offset) -> Result<()> {
        let f = self.file()?;
        self.check_offset(offset)?;
        if !self.caps.info_watch() {
            return Err(Error::unsupported(UapiCall::UnwatchLineInfo));
        }
        let mut watches = self.watches.lock().expect("watch registry poisoned");
        v2::unwatch_line_info(f, offset)
            .map_err(|e| Error::Uapi(UapiCall::UnwatchLineInfo, e))?;
        watches.remove(&offset);
        Ok(())
    }

    /// Reserve a single line.
    pub fn request_line(&self, offset: Offset, options: &request::Options) -> Result<Line> {
        LineSet::new(self, &[offset], options).map(Line::from)
    }

    /// Reserve a set of lines.
    ///
    /// The order of the offsets is preserved by the reservation, and
    /// determines the order of values and info.
    pub fn request_lines(&self, offsets: &[Offset], options: &request::Options) -> Result<LineSet> {
        LineSet::new(self, offsets, options)
    }

    /// Close the chip.
    ///
    /// Any info watches are removed, and their handlers are not called
    /// once this returns.
    /// Reservations made from the chip remain open.
    pub fn close(&mut self) -> Result<()> {
        let f = self.f.take().ok_or(Error::Closed)?;
        if let Some(mut watcher) = self.watcher.get_mut().expect("watcher poisoned").take() {
            watcher.stop();
        }
        let watches = std::mem::take(&mut *self.watches.lock().expect("watch registry poisoned"));
        for offset in watches.keys() {
            if let Err(e) = v2::unwatch_line_info(&f, *offset) {
                log::warn!(
                    "{} failed to unwatch line {}: {}",
                    self.name,
                    offset,
                    Error::Uapi(UapiCall::UnwatchLineInfo, e)
                );
            }
        }
        log::debug!("{} closed", self.name);
        Ok(())
    }
}

impl Drop for Chip {
    fn drop(&mut self) {
        if self.f.is_some() {
            _ = self.close();
        }
    }
}

/// Read the info for a line using the given ABI version.
pub(crate) fn read_line_info(cf: &File, abiv: AbiVersion, offset: Offset) -> Result<line::Info> {
    let map_err = |e| Error::Uapi(UapiCall::GetLineInfo, e);
    match abiv {
        AbiVersion::V1 => v1::get_line_info(cf, offset)
            .map(|li| line::Info::from(&li))
            .map_err(map_err),
        AbiVersion::V2 => v2::get_line_info(cf, offset)
            .map(|li| line::Info::from(&li))
            .map_err(map_err),
    }
}

struct InfoSource {
    files: Vec<Arc<File>>,
    watches: Watches,
}

impl Source for InfoSource {
    fn files(&self) -> &[Arc<File>] {
        &self.files
    }

    fn dispatch(&mut self, idx: usize) -> Result<()> {
        let ev = v2::read_line_info_change_event(&self.files[idx])
            .map_err(|e| Error::Uapi(UapiCall::ReadEvent, e))?;
        let ev = InfoChangeEvent::try_from(&ev)
            .map_err(|e| Error::Uapi(UapiCall::ReadEvent, e.into()))?;
        // the handler runs unlocked so it may watch or unwatch other lines
        let handler = self
            .watches
            .lock()
            .expect("watch registry poisoned")
            .get(&ev.info.offset)
            .cloned();
        match handler {
            Some(handler) => handler(ev),
            None => log::debug!("dropped info change for unwatched line {}", ev.info.offset),
        }
        Ok(())
    }
}
