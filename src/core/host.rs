//! Local host identity.

/// Host name as the OS reports it, `None` when it cannot be resolved.
#[must_use]
pub fn local_hostname() -> Option<String> {
    detect().map(|name| name.trim().to_string()).filter(|name| !name.is_empty())
}

#[cfg(windows)]
fn detect() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}

#[cfg(unix)]
fn detect() -> Option<String> {
    nix::unistd::gethostname()
        .ok()
        .and_then(|raw| raw.into_string().ok())
        .or_else(|| std::env::var("HOSTNAME").ok())
}

#[cfg(not(any(windows, unix)))]
fn detect() -> Option<String> {
    None
}
