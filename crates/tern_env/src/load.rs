//! Load averages and system uptime.

/// 1, 5 and 15 minute load averages. Zeros where the platform has no notion of
/// load (Windows).
pub fn loadavg() -> [f64; 3] {
    let mut avg = load_average().unwrap_or([0.0; 3]);
    for v in &mut avg {
        if !v.is_finite() || *v < 0.0 {
            *v = 0.0;
        }
    }
    avg
}

/// Seconds since the system booted.
pub fn uptime() -> f64 {
    uptime_secs().unwrap_or(0.0)
}

/* -------------------------- Windows -------------------------- */

#[cfg(target_os = "windows")]
fn load_average() -> Option<[f64; 3]> { None }
#[cfg(target_os = "windows")]
fn uptime_secs() -> Option<f64> {
    use windows_sys::Win32::System::SystemInformation::GetTickCount64;
    let ms = unsafe { GetTickCount64() };
    Some(ms as f64 / 1000.0)
}

/* --------------------- macOS / iOS (Darwin) --------------------- */

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn load_average() -> Option<[f64; 3]> {
    let mut avg = [0.0f64; 3];
    let n = unsafe { libc::getloadavg(avg.as_mut_ptr(), 3) };
    if n == 3 { Some(avg) } else { None }
}
#[cfg(any(target_os = "macos", target_os = "ios"))]
fn uptime_secs() -> Option<f64> {
    use libc::{c_void, size_t, sysctlbyname, timeval};
    let cname = std::ffi::CString::new("kern.boottime").ok()?;
    let mut boot: timeval = unsafe { std::mem::zeroed() };
    let mut len: size_t = std::mem::size_of::<timeval>() as _;
    let rc = unsafe { sysctlbyname(cname.as_ptr(), &mut boot as *mut _ as *mut c_void, &mut len, std::ptr::null_mut(), 0) };
    if rc != 0 {
        return None;
    }
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?
        .as_secs_f64();
    let booted = boot.tv_sec as f64 + boot.tv_usec as f64 / 1_000_000.0;
    Some((now - booted).max(0.0))
}

/* --------------------- Linux / Android --------------------- */

#[cfg(any(target_os = "linux", target_os = "android"))]
fn load_average() -> Option<[f64; 3]> {
    // /proc/loadavg: "0.52 0.58 0.59 1/467 12345"
    parse_loadavg(&std::fs::read_to_string("/proc/loadavg").ok()?)
}
#[cfg(any(target_os = "linux", target_os = "android"))]
fn uptime_secs() -> Option<f64> {
    // /proc/uptime: "12345.67 54321.00"
    parse_uptime(&std::fs::read_to_string("/proc/uptime").ok()?)
}

#[cfg_attr(not(any(target_os = "linux", target_os = "android")), allow(dead_code))]
fn parse_loadavg(text: &str) -> Option<[f64; 3]> {
    let mut fields = text.split_whitespace();
    let mut avg = [0.0; 3];
    for slot in &mut avg {
        *slot = fields.next()?.parse().ok()?;
    }
    Some(avg)
}

#[cfg_attr(not(any(target_os = "linux", target_os = "android")), allow(dead_code))]
fn parse_uptime(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse().ok()
}

/* --------------------- Other / WASM / Fallbacks --------------------- */

#[cfg(not(any(
    target_os = "windows",
    target_os = "macos",
    target_os = "ios",
    target_os = "linux",
    target_os = "android"
)))]
fn load_average() -> Option<[f64; 3]> { None }
#[cfg(not(any(
    target_os = "windows",
    target_os = "macos",
    target_os = "ios",
    target_os = "linux",
    target_os = "android"
)))]
fn uptime_secs() -> Option<f64> { None }
