//! Linux block device discovery via udev.

use anyhow::{Context, Result};

use super::{DeviceInfo, FlashTarget, PlatformPolicy};

pub struct LinuxPolicy;

impl PlatformPolicy for LinuxPolicy {
    fn list_removable_devices(&self) -> Result<Vec<DeviceInfo>> {
        let mut enumerator = udev::Enumerator::new().context("Failed to open udev")?;
        enumerator
            .match_subsystem("block")
            .context("Failed to filter block subsystem")?;
        enumerator
            .match_property("DEVTYPE", "disk")
            .context("Failed to filter whole disks")?;

        let mut devices = Vec::new();
        for device in enumerator
            .scan_devices()
            .context("Failed to scan block devices")?
        {
            let removable = device
                .attribute_value("removable")
                .and_then(|v| v.to_str())
                == Some("1");
            if !removable {
                continue;
            }

            let Some(node) = device.devnode() else {
                continue;
            };

            // The size attribute counts 512-byte sectors regardless of the
            // device's logical block size.
            let sectors: u64 = device
                .attribute_value("size")
                .and_then(|v| v.to_str())
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);

            let label = device
                .property_value("ID_MODEL")
                .or_else(|| device.property_value("ID_FS_LABEL"))
                .and_then(|v| v.to_str())
                .unwrap_or("")
                .to_string();

            devices.push(DeviceInfo {
                name: node.display().to_string(),
                size_bytes: sectors * 512,
                label,
            });
        }

        Ok(devices)
    }

    fn derive_flash_path(&self, supplied: &str) -> FlashTarget {
        FlashTarget {
            path: supplied.to_string(),
            warnings: Vec::new(),
        }
    }

    fn unmount_argv(&self, device: &str) -> Vec<String> {
        vec!["sudo".into(), "umount".into(), device.into()]
    }

    fn copy_argv(&self, image: &str, device: &str) -> Vec<String> {
        vec![
            "sudo".into(),
            "dd".into(),
            format!("if={image}"),
            format!("of={device}"),
            "bs=4M".into(),
            "status=progress".into(),
        ]
    }
}
