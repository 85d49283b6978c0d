//! Platform and device discovery.

use opencl3::device::{
    CL_DEVICE_TYPE_ACCELERATOR, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_CPU, CL_DEVICE_TYPE_GPU, Device,
};
use opencl3::error_codes::CL_DEVICE_NOT_FOUND;
use opencl3::platform::{Platform, get_platforms};
use opencl3::types::cl_device_type;

use crate::{Error, Result};

/// Device class filter applied during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceKind {
    #[default]
    Gpu,
    Cpu,
    Accelerator,
    Any,
}

impl DeviceKind {
    fn mask(self) -> cl_device_type {
        match self {
            DeviceKind::Gpu => CL_DEVICE_TYPE_GPU,
            DeviceKind::Cpu => CL_DEVICE_TYPE_CPU,
            DeviceKind::Accelerator => CL_DEVICE_TYPE_ACCELERATOR,
            DeviceKind::Any => CL_DEVICE_TYPE_ALL,
        }
    }
}

/// Selection criteria: which platform, which device class, and which
/// index within the filtered device list.
#[derive(Debug, Clone, Copy, Default)]
pub struct Selector {
    pub platform_index: usize,
    pub kind: DeviceKind,
    pub device_index: usize,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn platform(mut self, index: usize) -> Self {
        self.platform_index = index;
        self
    }

    pub fn kind(mut self, kind: DeviceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn device(mut self, index: usize) -> Self {
        self.device_index = index;
        self
    }
}

/// Snapshot of the queryable attributes of one device.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub extensions: Vec<String>,
    pub global_mem_size: u64,
    pub local_mem_size: u64,
    pub max_work_group_size: usize,
    pub max_work_item_dimensions: u32,
    pub max_work_item_sizes: Vec<usize>,
}

impl DeviceProfile {
    pub fn query(device: &Device) -> Result<Self> {
        Ok(Self {
            name: device.name()?.trim().to_string(),
            vendor: device.vendor()?.trim().to_string(),
            version: device.version()?.trim().to_string(),
            extensions: device
                .extensions()?
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            global_mem_size: device.global_mem_size()?,
            local_mem_size: device.local_mem_size()?,
            max_work_group_size: device.max_work_group_size()?,
            max_work_item_dimensions: device.max_work_item_dimensions()?,
            max_work_item_sizes: device
                .max_work_item_sizes()?
                .into_iter()
                .map(|s| s as usize)
                .collect(),
        })
    }
}

/// Resolve a selector to a concrete (platform, device) pair.
///
/// Fails with [`Error::Discovery`] when the filter yields no device or
/// one of the indices is out of range of the enumerated set.
pub fn discover(selector: &Selector) -> Result<(Platform, Device)> {
    let platforms = get_platforms()?;
    let platform = *platforms.get(selector.platform_index).ok_or_else(|| {
        Error::Discovery(format!(
            "platform index {} out of range ({} platform(s) available)",
            selector.platform_index,
            platforms.len()
        ))
    })?;
    let ids = devices_on(&platform, selector.kind, selector.platform_index)?;
    let id = ids.get(selector.device_index).copied().ok_or_else(|| {
        Error::Discovery(format!(
            "device index {} out of range ({} {:?} device(s) on platform {})",
            selector.device_index,
            ids.len(),
            selector.kind,
            selector.platform_index
        ))
    })?;
    let device = Device::new(id);
    log::debug!(
        "discovered device {} on platform {}",
        device.name().unwrap_or_default(),
        selector.platform_index
    );
    Ok((platform, device))
}

/// Every device of the given class on one platform, for callers that
/// drive several sessions side by side.
pub fn discover_all(platform_index: usize, kind: DeviceKind) -> Result<Vec<Device>> {
    let platforms = get_platforms()?;
    let platform = platforms.get(platform_index).ok_or_else(|| {
        Error::Discovery(format!(
            "platform index {platform_index} out of range ({} platform(s) available)",
            platforms.len()
        ))
    })?;
    let ids = devices_on(platform, kind, platform_index)?;
    Ok(ids.into_iter().map(Device::new).collect())
}

fn devices_on(
    platform: &Platform,
    kind: DeviceKind,
    index: usize,
) -> Result<Vec<opencl3::types::cl_device_id>> {
    platform.get_devices(kind.mask()).map_err(|e| {
        if e.0 == CL_DEVICE_NOT_FOUND {
            Error::Discovery(format!("no {kind:?} device on platform {index}"))
        } else {
            Error::from(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_defaults_to_first_gpu() {
        let sel = Selector::new();
        assert_eq!(sel.platform_index, 0);
        assert_eq!(sel.kind, DeviceKind::Gpu);
        assert_eq!(sel.device_index, 0);
    }

    #[test]
    fn builder_overrides_stick() {
        let sel = Selector::new().platform(1).kind(DeviceKind::Cpu).device(2);
        assert_eq!(sel.platform_index, 1);
        assert_eq!(sel.kind, DeviceKind::Cpu);
        assert_eq!(sel.device_index, 2);
    }

    #[test]
    fn kind_masks_match_backend_constants() {
        assert_eq!(DeviceKind::Gpu.mask(), CL_DEVICE_TYPE_GPU);
        assert_eq!(DeviceKind::Cpu.mask(), CL_DEVICE_TYPE_CPU);
        assert_eq!(DeviceKind::Accelerator.mask(), CL_DEVICE_TYPE_ACCELERATOR);
        assert_eq!(DeviceKind::Any.mask(), CL_DEVICE_TYPE_ALL);
    }
}
