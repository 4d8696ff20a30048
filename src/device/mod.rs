//! Removable block device discovery and platform path rules.
//!
//! Platform behavior lives behind [`PlatformPolicy`], selected once at
//! startup by [`host_policy`] instead of scattering `cfg` checks through the
//! flash workflow.

pub mod path;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

use anyhow::Result;

/// A removable block device, as offered to the user for target selection.
///
/// Advisory only; nothing here selects or validates a flash target.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device path, e.g. `/dev/sdb` or `/dev/disk2`.
    pub name: String,
    pub size_bytes: u64,
    /// Model or volume label; empty when the platform reports none.
    pub label: String,
}

/// The device path a flash will actually write to, plus any non-fatal
/// warnings produced while deriving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashTarget {
    pub path: String,
    pub warnings: Vec<String>,
}

/// Platform-specific behavior: device discovery, raw-path derivation, and
/// the privileged commands the flash workflow shells out to.
pub trait PlatformPolicy: Send + Sync {
    /// All removable devices the platform reports as safe flash targets.
    fn list_removable_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Map a user-supplied device path to the path the copy should write to.
    fn derive_flash_path(&self, supplied: &str) -> FlashTarget;

    /// Argument vector that unmounts the device, including any privilege
    /// escalation prefix.
    fn unmount_argv(&self, device: &str) -> Vec<String>;

    /// Argument vector for the raw block copy, including privilege prefix.
    fn copy_argv(&self, image: &str, device: &str) -> Vec<String>;
}

/// Select the policy for the host platform. Called once at process start.
pub fn host_policy() -> Box<dyn PlatformPolicy> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::LinuxPolicy)
    }
    #[cfg(target_os = "macos")]
    {
        Box::new(macos::MacosPolicy)
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        compile_error!("isoflash supports Linux and macOS hosts");
    }
}

/// Render a byte count the way drive listings usually do.
pub fn format_size(bytes: u64) -> String {
    const GIB: u64 = 1024 * 1024 * 1024;
    const MIB: u64 = 1024 * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{} MiB", bytes / MIB)
    } else {
        format!("{bytes} B")
    }
}
