//! macOS disk discovery via `diskutil`.
//!
//! `diskutil list` reports individual partitions alongside whole disks under
//! similar names (`disk2`, `disk2s1`), so discovery drops partition names
//! and keeps only whole disks on a USB bus.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::process::Command;

use super::path::{derive_macos_flash_path, is_partition_name};
use super::{DeviceInfo, FlashTarget, PlatformPolicy};

pub struct MacosPolicy;

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DiskutilList {
    all_disks: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DiskutilInfo {
    #[serde(default)]
    bus_protocol: String,
    #[serde(default)]
    removable_media: bool,
    #[serde(default)]
    total_size: u64,
    #[serde(default)]
    media_name: String,
    #[serde(default)]
    volume_name: String,
}

fn diskutil_plist(args: &[&str]) -> Result<Vec<u8>> {
    let output = Command::new("diskutil")
        .args(args)
        .output()
        .context("Failed to execute diskutil")?;

    if !output.status.success() {
        bail!(
            "diskutil {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    Ok(output.stdout)
}

impl MacosPolicy {
    fn disk_names(&self) -> Result<Vec<String>> {
        let stdout = diskutil_plist(&["list", "-plist", "external", "physical"])?;
        let list: DiskutilList =
            plist::from_bytes(&stdout).context("Failed to parse diskutil list output")?;
        Ok(list.all_disks)
    }

    fn disk_info(&self, name: &str) -> Result<DiskutilInfo> {
        let stdout = diskutil_plist(&["info", "-plist", name])?;
        plist::from_bytes(&stdout).context("Failed to parse diskutil info output")
    }
}

impl PlatformPolicy for MacosPolicy {
    fn list_removable_devices(&self) -> Result<Vec<DeviceInfo>> {
        let mut devices = Vec::new();

        for name in self.disk_names()? {
            if is_partition_name(&name) {
                continue;
            }

            let info = self.disk_info(&name)?;
            if !info.removable_media || info.bus_protocol != "USB" {
                continue;
            }

            let label = if info.volume_name.is_empty() {
                info.media_name
            } else {
                info.volume_name
            };

            devices.push(DeviceInfo {
                name: format!("/dev/{name}"),
                size_bytes: info.total_size,
                label,
            });
        }

        Ok(devices)
    }

    fn derive_flash_path(&self, supplied: &str) -> FlashTarget {
        derive_macos_flash_path(supplied)
    }

    fn unmount_argv(&self, device: &str) -> Vec<String> {
        vec!["diskutil".into(), "unmountDisk".into(), device.into()]
    }

    fn copy_argv(&self, image: &str, device: &str) -> Vec<String> {
        vec![
            "sudo".into(),
            "dd".into(),
            format!("if={image}"),
            format!("of={device}"),
            "bs=4m".into(),
        ]
    }
}
