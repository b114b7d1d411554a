//! Device persistence using JSON file storage

use crate::device::ZigbeeDevice;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Data directory from `DATA_DIR`, defaulting to `./data`
#[must_use]
pub fn data_path() -> PathBuf {
    PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()))
}

/// Location of a device record: `<data_dir>/devices/<ieee>.json`
#[must_use]
pub fn device_file(data_dir: &Path, device: &ZigbeeDevice) -> PathBuf {
    data_dir
        .join("devices")
        .join(format!("{}.json", device.ieee_address_string().replace(':', "")))
}

/// Load a device record from a JSON file
pub async fn load_device(path: &Path) -> Option<ZigbeeDevice> {
    match fs::read_to_string(path).await {
        Ok(contents) => match serde_json::from_str::<ZigbeeDevice>(&contents) {
            Ok(device) => {
                tracing::debug!("Loaded device {} from {:?}", device.ieee_address_string(), path);
                Some(device)
            }
            Err(e) => {
                tracing::warn!("Failed to parse device file {:?}: {}", path, e);
                None
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No device file found at {:?}", path);
            None
        }
        Err(e) => {
            tracing::warn!("Failed to read device file {:?}: {}", path, e);
            None
        }
    }
}

/// Save a device record to a JSON file atomically
#[allow(clippy::missing_errors_doc)]
pub async fn save_device(path: &Path, device: &ZigbeeDevice) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_string_pretty(device)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    // Write to a temp file, then rename over the target
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &json).await?;
    fs::rename(&tmp_path, path).await?;

    tracing::debug!("Saved device {} to {:?}", device.ieee_address_string(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{CustomCluster, DataType};
    use crate::device::Endpoint;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("zigbee-core-{name}-{}", std::process::id()))
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = scratch_dir("roundtrip");
        let path = dir.join("device.json");

        let mut device = ZigbeeDevice::new([8, 7, 6, 5, 4, 3, 2, 1], 0xBEEF);
        device.endpoints.push(Endpoint::new(1, vec![0x0006], vec![]));
        let mut cluster = CustomCluster {
            id: 0xFC00,
            manufacturer_code: Some(0x115F),
            attributes: Default::default(),
            commands: Default::default(),
            commands_response: Default::default(),
        };
        cluster.attributes.insert(
            "mode".to_string(),
            crate::cluster::CustomAttribute {
                id: 0x0009,
                data_type: DataType::Uint8,
            },
        );
        device.custom_clusters.insert("manuSpecificVendor".to_string(), cluster);

        save_device(&path, &device).await.unwrap();
        let loaded = load_device(&path).await.unwrap();
        assert_eq!(loaded.nwk_address, 0xBEEF);
        assert!(loaded.custom_clusters.contains_key("manuSpecificVendor"));
        assert!(!path.with_extension("json.tmp").exists());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_device_file_name() {
        let device = ZigbeeDevice::new([0x00, 0x15, 0x8d, 0, 0, 0, 0, 1], 0x1234);
        let path = device_file(Path::new("/var/lib/zigbee"), &device);
        assert_eq!(path, PathBuf::from("/var/lib/zigbee/devices/00158d0000000001.json"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let path = scratch_dir("missing").join("nope.json");
        assert!(load_device(&path).await.is_none());
    }
}
