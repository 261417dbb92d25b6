//! Network namespace handles and scoped namespace switching.
//!
//! setns(2) only affects the calling thread, so a guard must be dropped on the
//! thread that created it.

use std::{
    fs::File,
    marker::PhantomData,
    os::fd::{AsRawFd, RawFd},
    path::{Path, PathBuf},
};

use nix::sched::{setns, CloneFlags};
use tracing::trace;

use crate::error::{Error, Result};

const CURRENT_NETNS: &str = "/proc/thread-self/ns/net";

#[derive(Debug)]
pub struct NetNs {
    file: File,
    path: PathBuf,
}

impl NetNs {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| Error::Namespace {
            path: path.clone(),
            source,
        })?;

        Ok(Self { file, path })
    }

    /// Namespace of the calling thread.
    pub fn current() -> Result<Self> {
        Self::open(CURRENT_NETNS)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Switches the calling thread into this namespace until the guard is dropped.
    pub fn enter(&self) -> Result<NetNsGuard> {
        let previous = NetNs::current()?;

        setns(self.file.as_raw_fd(), CloneFlags::CLONE_NEWNET).map_err(|source| {
            Error::Namespace {
                path: self.path.clone(),
                source: source.into(),
            }
        })?;

        trace!(netns = %self.path.display(), "entered network namespace");

        Ok(NetNsGuard {
            previous,
            _not_send: PhantomData,
        })
    }

    /// Runs `f` inside this namespace. `f` receives the namespace that was
    /// current before entry.
    pub fn run<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&NetNs) -> Result<R>,
    {
        let guard = self.enter()?;
        let result = f(guard.previous());
        drop(guard);
        result
    }
}

impl AsRawFd for NetNs {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

/// Restores the previous namespace of the calling thread on drop.
#[must_use = "the namespace is restored as soon as the guard is dropped"]
pub struct NetNsGuard {
    previous: NetNs,
    // setns is per thread; the guard must not migrate
    _not_send: PhantomData<*const ()>,
}

impl NetNsGuard {
    pub fn previous(&self) -> &NetNs {
        &self.previous
    }
}

impl Drop for NetNsGuard {
    fn drop(&mut self) {
        if let Err(e) = setns(self.previous.file.as_raw_fd(), CloneFlags::CLONE_NEWNET) {
            // the thread would keep running in the wrong namespace
            panic!(
                "failed to restore network namespace {}: {}",
                self.previous.path.display(),
                e
            );
        }

        trace!(netns = %self.previous.path.display(), "restored network namespace");
    }
}
