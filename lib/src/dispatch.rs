// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Background delivery of events read from chip and line descriptors.

use crate::{Error, Result, UapiCall};
use errno::Errno;
use gpiod_uapi::{self as uapi, has_event};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};
use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const WAKE: Token = Token(usize::MAX);

/// A set of descriptors whose records are decoded and delivered to a handler.
pub(crate) trait Source: Send + 'static {
    /// The descriptors to read, identified by index.
    fn files(&self) -> &[Arc<File>];

    /// Read one record from the indexed descriptor and deliver it.
    ///
    /// Only called once the descriptor has a record ready, so does not block.
    fn dispatch(&mut self, idx: usize) -> Result<()>;
}

/// The reader thread for a [`Source`].
///
/// Stopping, explicitly or by drop, blocks until the thread has exited, so
/// no handler is running or will run once it returns.
pub(crate) struct Dispatcher {
    waker: Waker,
    stopped: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Start a thread delivering the records from the source.
    pub(crate) fn spawn<S: Source>(name: &str, source: S) -> Result<Dispatcher> {
        let poll = Poll::new()?;
        for (idx, f) in source.files().iter().enumerate() {
            poll.registry().register(
                &mut SourceFd(&f.as_raw_fd()),
                Token(idx),
                Interest::READABLE,
            )?;
        }
        let waker = Waker::new(poll.registry(), WAKE)?;
        let stopped = Arc::new(AtomicBool::new(false));
        let thread = thread::Builder::new().name(name.into()).spawn({
            let stopped = stopped.clone();
            move || run(poll, source, &stopped)
        })?;
        log::debug!("{} dispatcher started", name);
        Ok(Dispatcher {
            waker,
            stopped,
            thread: Some(thread),
        })
    }

    /// True if the thread has exited, or was never started.
    pub(crate) fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stop the thread, waiting for it to exit.
    ///
    /// If called from a handler, so from the thread itself, the thread is
    /// signalled but not joined, and exits once the handler returns.
    pub(crate) fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.stopped.store(true, Ordering::Release);
        if let Err(e) = self.waker.wake() {
            log::warn!("failed to wake dispatcher: {}", e);
        }
        if thread.thread().id() == thread::current().id() {
            return;
        }
        let name = thread.thread().name().unwrap_or_default().to_owned();
        if thread.join().is_err() {
            log::warn!("{} dispatcher handler panicked", name);
        }
        log::debug!("{} dispatcher stopped", name);
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<S: Source>(mut poll: Poll, mut source: S, stopped: &AtomicBool) {
    let mut events = Events::with_capacity(source.files().len() + 1);
    loop {
        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            log::warn!("dispatcher poll failed: {}", e);
            return;
        }
        for event in events.iter() {
            if event.token() == WAKE {
                return;
            }
            let idx = event.token().0;
            // readiness is edge triggered, so drain everything available
            loop {
                if stopped.load(Ordering::Acquire) {
                    return;
                }
                match has_event(&source.files()[idx]) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(uapi::Error::Os(Errno(libc::EINTR))) => continue,
                    Err(e) => {
                        log::warn!("{}", Error::Uapi(UapiCall::HasEvent, e));
                        return;
                    }
                }
                match source.dispatch(idx) {
                    Ok(()) => {}
                    Err(e) if is_discarded(&e) => {
                        log::warn!("dispatcher discarded event: {}", e);
                    }
                    Err(e) if is_transient(&e) => break,
                    Err(e) => {
                        log::warn!("dispatcher failed to read event: {}", e);
                        return;
                    }
                }
            }
        }
    }
}

// The record was consumed but could not be decoded.
fn is_discarded(e: &Error) -> bool {
    matches!(
        e,
        Error::Uapi(_, uapi::Error::Validation(_) | uapi::Error::UnderRead { .. })
    )
}

fn is_transient(e: &Error) -> bool {
    matches!(
        e.errno(),
        Some(Errno(libc::EINTR)) | Some(Errno(libc::EAGAIN))
    )
}
