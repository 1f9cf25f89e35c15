// common.rs — console printing and fatal error routing

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::q_shared::{ERR_DROP, ERR_FATAL};

pub const DISTNAME: &str = "qlight";
pub const DISTVER: f32 = 1.0;

// ============================================================
// Redirect buffer for Com_Printf
// ============================================================

static RD_BUFFER: Mutex<Option<String>> = Mutex::new(None);

static DEVELOPER: AtomicBool = AtomicBool::new(false);

/// Begin redirecting printf output into a buffer.
pub fn com_begin_redirect() {
    *RD_BUFFER.lock() = Some(String::new());
}

/// End redirect and return the captured output.
pub fn com_end_redirect() -> Option<String> {
    RD_BUFFER.lock().take()
}

/// Enable or disable developer output.
pub fn com_set_developer(enabled: bool) {
    DEVELOPER.store(enabled, Ordering::Relaxed);
}

pub fn com_developer() -> bool {
    DEVELOPER.load(Ordering::Relaxed)
}

// ============================================================
// Com_Printf / Com_DPrintf / Com_WPrintf / Com_Error
// ============================================================

fn com_print_raw(msg: &str) {
    {
        let mut buf = RD_BUFFER.lock();
        if let Some(ref mut s) = *buf {
            s.push_str(msg);
            return;
        }
    }
    print!("{}", msg);
}

/// General-purpose print function. Prints to stdout and appends to redirect
/// buffer if one is active.
pub fn com_printf(msg: &str) {
    log::info!("{}", msg.trim_end());
    com_print_raw(msg);
}

/// Developer-only print.
pub fn com_dprintf(msg: &str) {
    log::debug!("{}", msg.trim_end());
    if !com_developer() {
        return;
    }
    com_print_raw(msg);
}

/// Warning print, always shown.
pub fn com_wprintf(msg: &str) {
    log::warn!("{}", msg.trim_end());
    com_print_raw(&format!("WARNING: {}", msg));
}

/// Engine error handler.
/// - `ERR_FATAL`: prints to stderr and panics.
/// - `ERR_DROP`: prints the error and returns.
pub fn com_error(code: i32, msg: &str) {
    log::error!("{}", msg);
    if code == ERR_FATAL {
        eprintln!("Error: {}", msg);
        panic!("Fatal error: {}", msg);
    }
    if code == ERR_DROP {
        com_print_raw(&format!("********************\nERROR: {}\n********************\n", msg));
    }
}

// ============================================================
// Progress ticker
// ============================================================

/// Prints a 10-step percentage ticker ("0...1...2...") as work items finish.
/// `done` is the count after the caller's increment.
pub fn com_progress(done: usize, total: usize) {
    if total == 0 {
        return;
    }
    let prev = ((done - 1) * 10) / total;
    let now = (done * 10) / total;
    if done == 1 {
        com_print_raw("0");
    }
    if now != prev {
        com_print_raw(&format!("...{}", now));
    }
    if done == total {
        com_print_raw(" (done)\n");
    }
}

// ============================================================
// Tests
// ============================================================
