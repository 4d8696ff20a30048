//! Device path rules shared by the platform policies.
//!
//! These are pure string transforms, kept free of platform gating so the
//! macOS rules stay testable on any host.

use regex::Regex;
use std::sync::OnceLock;

/// Matches a trailing partition suffix: a lowercase `s` followed by digits,
/// e.g. the `s1` in `disk2s1`.
fn partition_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"s\d+$").expect("partition suffix pattern is valid"))
}

/// Whether a device name refers to a single partition rather than a whole
/// disk.
pub fn is_partition_name(name: &str) -> bool {
    partition_suffix().is_match(name)
}

/// Strip a trailing partition suffix, returning the whole-disk path when the
/// supplied path addressed a single partition.
pub fn strip_partition_suffix(path: &str) -> Option<String> {
    let re = partition_suffix();
    re.is_match(path).then(|| re.replace(path, "").into_owned())
}

/// Substitute the raw (unbuffered) device variant for a buffered macOS disk
/// path: `/dev/disk…` becomes `/dev/rdisk…`. Raw nodes bypass the buffer
/// cache, which bulk sequential writes want.
pub fn raw_disk_path(path: &str) -> Option<String> {
    path.strip_prefix("/dev/disk")
        .map(|rest| format!("/dev/rdisk{rest}"))
}

/// Full macOS derivation: strip a partition suffix (with a warning, since
/// whole-image writes must go to the whole disk), then swap in the raw
/// device node.
pub fn derive_macos_flash_path(supplied: &str) -> super::FlashTarget {
    let mut warnings = Vec::new();
    let mut path = supplied.to_string();

    if let Some(whole_disk) = strip_partition_suffix(&path) {
        warnings.push(format!(
            "`{path}` is a partition; flashing the whole disk `{whole_disk}` instead"
        ));
        path = whole_disk;
    }

    if let Some(raw) = raw_disk_path(&path) {
        path = raw;
    }

    super::FlashTarget { path, warnings }
}
