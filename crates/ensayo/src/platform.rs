//! Host capability boundary for function interception.
//!
//! The executor consults an [`Interceptor`] for code patching, stack
//! capture and debugger detection. Hosts that cannot provide a capability
//! report [`CapabilityError::Unavailable`]; the engine then runs in
//! [`CaptureMode::Degraded`] and tests still execute.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Platform capability errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// The host does not support this capability
    #[error("{capability} is not available on {platform}")]
    Unavailable {
        /// Capability name
        capability: &'static str,
        /// Host platform name
        platform: &'static str,
    },

    /// The capability exists but the operation failed
    #[error("{capability} failed: {message}")]
    Failed {
        /// Capability name
        capability: &'static str,
        /// Error message
        message: String,
    },
}

/// Result type for capability operations
pub type CapabilityResult<T> = Result<T, CapabilityError>;

/// Proof that a code range was made writable; hand back to restore it
#[derive(Debug, PartialEq, Eq)]
pub struct WritableToken {
    /// Start address
    pub addr: u64,
    /// Length in bytes
    pub len: usize,
}

/// An installed intercept
#[derive(Debug, PartialEq, Eq)]
pub struct InterceptHandle {
    /// Patched address
    pub addr: u64,
}

/// A module mapped into the running process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    /// Path of the mapped file
    pub path: PathBuf,
    /// Lowest mapped address
    pub start: u64,
    /// One past the highest mapped address
    pub end: u64,
}

/// Platform services the executor needs to instrument calls
pub trait Interceptor: Send + Sync {
    /// Make a code range writable for patching
    fn make_code_writable(&self, addr: u64, len: usize) -> CapabilityResult<WritableToken>;
    /// Restore the protection changed by [`Self::make_code_writable`]
    fn restore_code_protection(&self, token: WritableToken) -> CapabilityResult<()>;
    /// Install an intercept at a function entry
    fn install_intercept(&self, addr: u64) -> CapabilityResult<InterceptHandle>;
    /// Remove an intercept
    fn uninstall_intercept(&self, handle: InterceptHandle) -> CapabilityResult<()>;
    /// Return addresses of the current call stack, innermost first
    fn capture_stack_trace(&self) -> CapabilityResult<Vec<u64>>;
    /// Modules mapped into the process
    fn enumerate_loaded_modules(&self) -> CapabilityResult<Vec<LoadedModule>>;
    /// Map a runtime address to the address space reported by discovery
    fn normalize_address(&self, addr: u64) -> u64;
    /// Whether a debugger is attached to this process
    fn is_debugger_attached(&self) -> bool;
}

/// Host name used in capability errors
#[must_use]
pub const fn platform_name() -> &'static str {
    std::env::consts::OS
}

const fn unavailable(capability: &'static str) -> CapabilityError {
    CapabilityError::Unavailable {
        capability,
        platform: platform_name(),
    }
}

/// Interceptor that supports nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullInterceptor;

impl Interceptor for NullInterceptor {
    fn make_code_writable(&self, _addr: u64, _len: usize) -> CapabilityResult<WritableToken> {
        Err(unavailable("make_code_writable"))
    }

    fn restore_code_protection(&self, _token: WritableToken) -> CapabilityResult<()> {
        Err(unavailable("restore_code_protection"))
    }

    fn install_intercept(&self, _addr: u64) -> CapabilityResult<InterceptHandle> {
        Err(unavailable("install_intercept"))
    }

    fn uninstall_intercept(&self, _handle: InterceptHandle) -> CapabilityResult<()> {
        Err(unavailable("uninstall_intercept"))
    }

    fn capture_stack_trace(&self) -> CapabilityResult<Vec<u64>> {
        Err(unavailable("capture_stack_trace"))
    }

    fn enumerate_loaded_modules(&self) -> CapabilityResult<Vec<LoadedModule>> {
        Err(unavailable("enumerate_loaded_modules"))
    }

    fn normalize_address(&self, addr: u64) -> u64 {
        addr
    }

    fn is_debugger_attached(&self) -> bool {
        false
    }
}

/// Interceptor backed by what the host OS exposes without code patching.
///
/// On Linux, modules come from `/proc/self/maps` and debugger detection from
/// `TracerPid` in `/proc/self/status`. Patching is unavailable everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostPlatform;

impl Interceptor for HostPlatform {
    fn make_code_writable(&self, _addr: u64, _len: usize) -> CapabilityResult<WritableToken> {
        Err(unavailable("make_code_writable"))
    }

    fn restore_code_protection(&self, _token: WritableToken) -> CapabilityResult<()> {
        Err(unavailable("restore_code_protection"))
    }

    fn install_intercept(&self, _addr: u64) -> CapabilityResult<InterceptHandle> {
        Err(unavailable("install_intercept"))
    }

    fn uninstall_intercept(&self, _handle: InterceptHandle) -> CapabilityResult<()> {
        Err(unavailable("uninstall_intercept"))
    }

    fn capture_stack_trace(&self) -> CapabilityResult<Vec<u64>> {
        Err(unavailable("capture_stack_trace"))
    }

    #[cfg(target_os = "linux")]
    fn enumerate_loaded_modules(&self) -> CapabilityResult<Vec<LoadedModule>> {
        let maps = std::fs::read_to_string("/proc/self/maps").map_err(|e| CapabilityError::Failed {
            capability: "enumerate_loaded_modules",
            message: e.to_string(),
        })?;
        Ok(parse_proc_maps(&maps))
    }

    #[cfg(not(target_os = "linux"))]
    fn enumerate_loaded_modules(&self) -> CapabilityResult<Vec<LoadedModule>> {
        Err(unavailable("enumerate_loaded_modules"))
    }

    fn normalize_address(&self, addr: u64) -> u64 {
        addr
    }

    #[cfg(target_os = "linux")]
    fn is_debugger_attached(&self) -> bool {
        std::fs::read_to_string("/proc/self/status")
            .map(|status| tracer_pid(&status).is_some_and(|pid| pid != 0))
            .unwrap_or(false)
    }

    #[cfg(not(target_os = "linux"))]
    fn is_debugger_attached(&self) -> bool {
        false
    }
}

/// Parse `/proc/<pid>/maps`, merging the mappings of each file.
///
/// The path is the rest of the line after the inode, so it may contain
/// spaces.
#[must_use]
pub fn parse_proc_maps(maps: &str) -> Vec<LoadedModule> {
    let mut modules: Vec<LoadedModule> = Vec::new();
    for line in maps.lines() {
        let mut fields = line.splitn(6, char::is_whitespace);
        let (Some(range), Some(_perms), Some(_off), Some(_dev), Some(_inode), Some(rest)) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            continue;
        };
        let path = rest.trim_start();
        if !path.starts_with('/') {
            continue;
        }
        let Some((start, end)) = range.split_once('-') else {
            continue;
        };
        let (Ok(start), Ok(end)) = (u64::from_str_radix(start, 16), u64::from_str_radix(end, 16)) else {
            continue;
        };
        match modules.iter_mut().find(|m| m.path.as_os_str() == path) {
            Some(m) => {
                m.start = m.start.min(start);
                m.end = m.end.max(end);
            }
            None => modules.push(LoadedModule {
                path: PathBuf::from(path),
                start,
                end,
            }),
        }
    }
    modules
}

/// Extract `TracerPid` from `/proc/<pid>/status`
#[must_use]
pub fn tracer_pid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))
        .and_then(|v| v.trim().parse().ok())
}

/// Installs an intercept for the lifetime of one call
#[derive(Debug)]
pub struct InterceptGuard<'a, I: Interceptor + ?Sized> {
    interceptor: &'a I,
    handle: Option<InterceptHandle>,
}

impl<'a, I: Interceptor + ?Sized> InterceptGuard<'a, I> {
    /// Install an intercept at `addr`
    ///
    /// # Errors
    ///
    /// Propagates the interceptor's capability error.
    pub fn install(interceptor: &'a I, addr: u64) -> CapabilityResult<Self> {
        let handle = interceptor.install_intercept(addr)?;
        Ok(Self {
            interceptor,
            handle: Some(handle),
        })
    }
}

impl<I: Interceptor + ?Sized> Drop for InterceptGuard<'_, I> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.interceptor.uninstall_intercept(handle) {
                tracing::warn!(error = %e, "intercept left installed");
            }
        }
    }
}

/// How much the executor can observe on this host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureMode {
    /// Intercepts can be installed around calls
    Intercepting,
    /// Tests run, but only panics and process status are observed
    Degraded(String),
}

impl CaptureMode {
    /// Whether intercepts are installed around calls
    #[must_use]
    pub const fn is_intercepting(&self) -> bool {
        matches!(self, Self::Intercepting)
    }

    /// Log a degraded mode, at most once per process
    pub fn report_once(&self) {
        static REPORTED: AtomicBool = AtomicBool::new(false);
        if let Self::Degraded(reason) = self {
            if !REPORTED.swap(true, Ordering::SeqCst) {
                tracing::warn!(%reason, "event capture degraded");
            }
        }
    }
}

/// Determine the capture mode of an interceptor.
///
/// An attached debugger forces degraded mode, since intercepts would
/// collide with its breakpoints.
#[must_use]
pub fn probe<I: Interceptor + ?Sized>(interceptor: &I) -> CaptureMode {
    if interceptor.is_debugger_attached() {
        return CaptureMode::Degraded("debugger attached".to_string());
    }
    let anchor = crate::exec::anchor_address();
    match interceptor.install_intercept(anchor) {
        Ok(handle) => match interceptor.uninstall_intercept(handle) {
            Ok(()) => CaptureMode::Intercepting,
            Err(e) => CaptureMode::Degraded(e.to_string()),
        },
        Err(e) => CaptureMode::Degraded(e.to_string()),
    }
}
