// memory.rs
//! Cross-platform helpers to query free and total physical memory.
//! Falls back to zero when the platform gives no answer.

use std::sync::OnceLock;

/// Point-in-time view of system memory, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub free: u64,
    pub total: u64,
}

impl MemoryStats {
    pub fn sample() -> Self {
        Self {
            free: free_memory(),
            total: total_memory(),
        }
    }
}

/// Free physical memory in bytes.
pub fn free_memory() -> u64 {
    // Never report more free than total, even if the two reads race.
    free_ram_bytes().unwrap_or(0).min(total_memory())
}

/// Total physical memory in bytes. Cached after the first query.
pub fn total_memory() -> u64 {
    static TOTAL: OnceLock<u64> = OnceLock::new();
    *TOTAL.get_or_init(|| total_ram_bytes().unwrap_or(0))
}

/* -------------------------- Windows -------------------------- */

#[cfg(target_os = "windows")]
fn memory_status() -> Option<windows_sys::Win32::System::Memory::MEMORYSTATUSEX> {
    use windows_sys::Win32::System::Memory::{GlobalMemoryStatusEx, MEMORYSTATUSEX};
    unsafe {
        let mut st: MEMORYSTATUSEX = std::mem::zeroed();
        st.dwLength = std::mem::size_of::<MEMORYSTATUSEX>() as u32;
        if GlobalMemoryStatusEx(&mut st) != 0 { Some(st) } else { None }
    }
}
#[cfg(target_os = "windows")]
fn total_ram_bytes() -> Option<u64> { memory_status().map(|st| st.ullTotalPhys) }
#[cfg(target_os = "windows")]
fn free_ram_bytes() -> Option<u64> { memory_status().map(|st| st.ullAvailPhys) }

/* --------------------- macOS / iOS (Darwin) --------------------- */

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn sysctl_u64(name: &str) -> Option<u64> {
    use libc::{c_void, size_t, sysctlbyname};
    let cname = std::ffi::CString::new(name).ok()?;
    let mut val: u64 = 0;
    let mut len: size_t = std::mem::size_of::<u64>() as _;
    let rc = unsafe { sysctlbyname(cname.as_ptr(), &mut val as *mut _ as *mut c_void, &mut len, std::ptr::null_mut(), 0) };
    if rc == 0 && val != 0 { Some(val) } else { None }
}
#[cfg(any(target_os = "macos", target_os = "ios"))]
fn sysctl_u32(name: &str) -> Option<u32> {
    use libc::{c_void, size_t, sysctlbyname};
    let cname = std::ffi::CString::new(name).ok()?;
    let mut val: u32 = 0;
    let mut len: size_t = std::mem::size_of::<u32>() as _;
    let rc = unsafe { sysctlbyname(cname.as_ptr(), &mut val as *mut _ as *mut c_void, &mut len, std::ptr::null_mut(), 0) };
    if rc == 0 { Some(val) } else { None }
}
#[cfg(any(target_os = "macos", target_os = "ios"))]
fn total_ram_bytes() -> Option<u64> { sysctl_u64("hw.memsize") }
#[cfg(any(target_os = "macos", target_os = "ios"))]
fn free_ram_bytes() -> Option<u64> {
    let pages = sysctl_u32("vm.page_free_count")? as u64;
    let page_size = sysctl_u64("hw.pagesize")?;
    Some(pages * page_size)
}

/* --------------------- Linux / Android --------------------- */

#[cfg(any(target_os = "linux", target_os = "android"))]
fn total_ram_bytes() -> Option<u64> {
    // /proc/meminfo: "MemTotal:  16367168 kB"
    let text = std::fs::read_to_string("/proc/meminfo").ok()?;
    meminfo_bytes(&text, "MemTotal:")
}
#[cfg(any(target_os = "linux", target_os = "android"))]
fn free_ram_bytes() -> Option<u64> {
    let text = std::fs::read_to_string("/proc/meminfo").ok()?;
    // MemAvailable is missing on kernels older than 3.14
    meminfo_bytes(&text, "MemAvailable:").or_else(|| meminfo_bytes(&text, "MemFree:"))
}

#[cfg_attr(not(any(target_os = "linux", target_os = "android")), allow(dead_code))]
fn meminfo_bytes(text: &str, key: &str) -> Option<u64> {
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(key) {
            let kb: u64 = rest.split_whitespace().next()?.parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

/* --------------------- Other / WASM / Fallbacks --------------------- */

#[cfg(not(any(
    target_os = "windows",
    target_os = "macos",
    target_os = "ios",
    target_os = "linux",
    target_os = "android"
)))]
fn total_ram_bytes() -> Option<u64> { None }
#[cfg(not(any(
    target_os = "windows",
    target_os = "macos",
    target_os = "ios",
    target_os = "linux",
    target_os = "android"
)))]
fn free_ram_bytes() -> Option<u64> { None }
