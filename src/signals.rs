//! Signal handling and the shared growable-buffer primitive.
//!
//! The editor is single-threaded; the only concurrency is asynchronous
//! signal delivery. Handlers never touch editor state: they record a
//! pending flag and return. A process-wide nesting counter masks delivery
//! around structural edits, and the pending flags are acted on at the
//! command-loop top and at blocking-read boundaries, unwinding through
//! `EdError::Interrupt` instead of a non-local jump.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{EdError, Result};

static MASK_DEPTH: AtomicUsize = AtomicUsize::new(0);
static SIGHUP_PENDING: AtomicBool = AtomicBool::new(false);
static SIGINT_PENDING: AtomicBool = AtomicBool::new(false);
static SIGWINCH_PENDING: AtomicBool = AtomicBool::new(false);

static WINDOW_LINES: AtomicUsize = AtomicUsize::new(22);
static WINDOW_COLUMNS: AtomicUsize = AtomicUsize::new(72);

extern "C" fn catch_signal(signum: libc::c_int) {
    match signum {
        libc::SIGHUP => SIGHUP_PENDING.store(true, Ordering::SeqCst),
        libc::SIGINT => SIGINT_PENDING.store(true, Ordering::SeqCst),
        libc::SIGWINCH => SIGWINCH_PENDING.store(true, Ordering::SeqCst),
        _ => {}
    }
}

fn set_signal(signum: libc::c_int, handler: libc::sighandler_t, flags: libc::c_int) {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = flags;
        libc::sigaction(signum, &action, std::ptr::null_mut());
    }
}

/// Install the handlers. Window-size changes are only tracked when stdin
/// is a terminal; the initial size is queried unconditionally.
///
/// SIGINT is installed without `SA_RESTART` so a blocking read returns
/// `EINTR` and the read loop can raise `EdError::Interrupt` promptly.
pub fn set_signals() {
    let catch: extern "C" fn(libc::c_int) = catch_signal;
    let catch = catch as libc::sighandler_t;
    query_window_size();
    if unsafe { libc::isatty(0) } == 1 {
        set_signal(libc::SIGWINCH, catch, libc::SA_RESTART);
    }
    set_signal(libc::SIGHUP, catch, libc::SA_RESTART);
    set_signal(libc::SIGQUIT, libc::SIG_IGN, 0);
    set_signal(libc::SIGINT, catch, 0);
}

pub fn disable_interrupts() {
    MASK_DEPTH.fetch_add(1, Ordering::SeqCst);
}

pub fn enable_interrupts() {
    let prev = MASK_DEPTH.load(Ordering::SeqCst);
    if prev > 0 {
        MASK_DEPTH.store(prev - 1, Ordering::SeqCst);
    }
}

/// RAII critical-section guard: the mask is released on every exit path.
pub struct InterruptGuard;

impl InterruptGuard {
    pub fn new() -> Self {
        disable_interrupts();
        InterruptGuard
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        enable_interrupts();
    }
}

/// Consume a pending interrupt when the mask is not held.
pub fn check_interrupt() -> Result<()> {
    if MASK_DEPTH.load(Ordering::SeqCst) == 0 && SIGINT_PENDING.swap(false, Ordering::SeqCst) {
        return Err(EdError::Interrupt);
    }
    Ok(())
}

/// A hang-up is pending and deliverable; the caller saves the buffer and
/// exits. The flag is consumed.
pub fn take_hangup() -> bool {
    MASK_DEPTH.load(Ordering::SeqCst) == 0 && SIGHUP_PENDING.swap(false, Ordering::SeqCst)
}

fn query_window_size() {
    unsafe {
        let mut ws: libc::winsize = std::mem::zeroed();
        if libc::ioctl(0, libc::TIOCGWINSZ, &mut ws) >= 0 {
            if ws.ws_row > 2 && ws.ws_row < 600 {
                WINDOW_LINES.store(ws.ws_row as usize - 2, Ordering::SeqCst);
            }
            if ws.ws_col > 8 && ws.ws_col < 1800 {
                WINDOW_COLUMNS.store(ws.ws_col as usize - 8, Ordering::SeqCst);
            }
        }
    }
}

/// Re-query the terminal size if a window-size change was delivered.
pub fn update_window_size() {
    if SIGWINCH_PENDING.swap(false, Ordering::SeqCst) {
        query_window_size();
    }
}

pub fn window_lines() -> usize {
    WINDOW_LINES.load(Ordering::SeqCst)
}

pub fn set_window_lines(lines: usize) {
    WINDOW_LINES.store(lines, Ordering::SeqCst);
}

pub fn window_columns() -> usize {
    WINDOW_COLUMNS.load(Ordering::SeqCst)
}

/// Assure at least `min_size` bytes of capacity, growing on the 512-byte
/// floor / 1 KiB granule schedule. Requests at or beyond `i32::MAX` fail:
/// line lengths must stay representable as a positive int.
pub fn ensure_buffer(buf: &mut Vec<u8>, min_size: usize) -> Result<()> {
    if buf.capacity() >= min_size {
        return Ok(());
    }
    if min_size >= i32::MAX as usize {
        return Err(EdError::LineTooLong);
    }
    let new_size = if min_size < 512 {
        512
    } else if min_size > i32::MAX as usize / 2 {
        i32::MAX as usize
    } else {
        (min_size / 512) * 1024
    };
    buf.try_reserve_exact(new_size - buf.len())
        .map_err(|_| EdError::MemoryExhausted)?;
    Ok(())
}
