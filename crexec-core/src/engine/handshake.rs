// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Restore token handshake.
//!
//! After a successful checkpoint spawn the process blocks until the engine
//! (or whoever restores the image) queues the restore signal carrying a
//! 32-bit payload. There is no timeout: the wait ends with the payload or
//! with the process being killed.

use std::mem::MaybeUninit;

use nix::errno::Errno;
use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow};

use crate::error::ProcessError;
use crate::types::RestoreToken;

/// Channel delivering the restore token to a checkpointed process.
pub trait RestoreTokenChannel {
    /// Prepare to receive. Called before the engine is spawned so that an
    /// early delivery is queued instead of lost. Calling it twice is harmless.
    fn arm(&mut self) -> Result<(), ProcessError>;

    /// Block until the token arrives.
    fn wait_token(&mut self) -> Result<RestoreToken, ProcessError>;
}

/// Signal number used to deliver the restore token.
pub fn restore_signal() -> libc::c_int {
    libc::SIGRTMIN() + 2
}

/// POSIX queued-signal implementation of [`RestoreTokenChannel`].
pub struct SignalTokenChannel {
    signal: libc::c_int,
    /// Mask in effect before `arm`, restored on drop.
    previous_mask: Option<SigSet>,
}

impl SignalTokenChannel {
    pub fn new() -> Self {
        Self::with_signal(restore_signal())
    }

    pub fn with_signal(signal: libc::c_int) -> Self {
        Self {
            signal,
            previous_mask: None,
        }
    }

    pub fn signal(&self) -> libc::c_int {
        self.signal
    }

    fn signal_set(&self) -> SigSet {
        // Realtime signals have no `Signal` variant, so the set is filled
        // through libc.
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        // SAFETY: sigemptyset initializes the set before sigaddset reads it,
        // and the result is a valid sigset_t.
        unsafe {
            libc::sigemptyset(set.as_mut_ptr());
            libc::sigaddset(set.as_mut_ptr(), self.signal);
            SigSet::from_sigset_t_unchecked(set.assume_init())
        }
    }
}

impl Default for SignalTokenChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SignalTokenChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalTokenChannel")
            .field("signal", &self.signal)
            .field("armed", &self.previous_mask.is_some())
            .finish()
    }
}

impl RestoreTokenChannel for SignalTokenChannel {
    fn arm(&mut self) -> Result<(), ProcessError> {
        if self.previous_mask.is_some() {
            return Ok(());
        }

        let set = self.signal_set();
        let mut previous = SigSet::empty();
        pthread_sigmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut previous)).map_err(|e| {
            ProcessError::Handshake {
                reason: format!("Failed to block signal {}: {}", self.signal, e.desc()),
            }
        })?;

        self.previous_mask = Some(previous);
        tracing::debug!(signal = self.signal, "Restore signal blocked");
        Ok(())
    }

    fn wait_token(&mut self) -> Result<RestoreToken, ProcessError> {
        self.arm()?;

        let set = self.signal_set();
        let mut info = MaybeUninit::<libc::siginfo_t>::zeroed();

        tracing::info!(signal = self.signal, "Waiting for restore token");

        loop {
            // SAFETY: `set` is initialized and `info` points to writable storage.
            let signo = unsafe { libc::sigwaitinfo(set.as_ref(), info.as_mut_ptr()) };
            if signo >= 0 {
                break;
            }
            let errno = Errno::last();
            if errno != Errno::EINTR {
                return Err(ProcessError::Handshake {
                    reason: format!("sigwaitinfo failed: {}", errno.desc()),
                });
            }
        }

        // SAFETY: sigwaitinfo returned a signal and filled `info`.
        let info = unsafe { info.assume_init() };
        if info.si_code != libc::SI_QUEUE {
            return Err(ProcessError::Handshake {
                reason: format!(
                    "signal {} delivered without payload (si_code {})",
                    self.signal, info.si_code
                ),
            });
        }

        // SAFETY: SI_QUEUE deliveries carry a sigval.
        let value = unsafe { info.si_value() };
        let token = RestoreToken::new(payload_from_ptr(value.sival_ptr));

        tracing::info!(token = %token, "Received restore token");
        Ok(token)
    }
}

impl Drop for SignalTokenChannel {
    fn drop(&mut self) {
        if let Some(previous) = self.previous_mask.take() {
            if let Err(e) = pthread_sigmask(SigmaskHow::SIG_SETMASK, Some(&previous), None) {
                tracing::warn!(signal = self.signal, error = %e, "Failed to restore signal mask");
            }
        }
    }
}

/// Queue the restore signal with `token` as payload to process `pid`.
pub fn queue_token(pid: libc::pid_t, token: RestoreToken) -> Result<(), ProcessError> {
    queue_token_with_signal(pid, restore_signal(), token)
}

/// Queue `signal` with `token` as payload to process `pid`.
pub fn queue_token_with_signal(
    pid: libc::pid_t,
    signal: libc::c_int,
    token: RestoreToken,
) -> Result<(), ProcessError> {
    let value = libc::sigval {
        sival_ptr: payload_to_ptr(token.value()),
    };
    // SAFETY: plain syscall wrapper with a by-value sigval.
    let rc = unsafe { libc::sigqueue(pid, signal, value) };
    if rc != 0 {
        return Err(ProcessError::Handshake {
            reason: format!(
                "sigqueue to {} failed: {}",
                pid,
                Errno::last().desc()
            ),
        });
    }
    Ok(())
}

// `sival_int` shares storage with `sival_ptr`; libc only exposes the pointer.

#[cfg(any(target_endian = "little", target_pointer_width = "32"))]
fn payload_from_ptr(ptr: *mut libc::c_void) -> i32 {
    ptr as usize as u32 as i32
}

#[cfg(all(target_endian = "big", target_pointer_width = "64"))]
fn payload_from_ptr(ptr: *mut libc::c_void) -> i32 {
    ((ptr as usize as u64) >> 32) as u32 as i32
}

#[cfg(any(target_endian = "little", target_pointer_width = "32"))]
fn payload_to_ptr(value: i32) -> *mut libc::c_void {
    value as u32 as usize as *mut libc::c_void
}

#[cfg(all(target_endian = "big", target_pointer_width = "64"))]
fn payload_to_ptr(value: i32) -> *mut libc::c_void {
    ((value as u32 as u64) << 32) as usize as *mut libc::c_void
}
