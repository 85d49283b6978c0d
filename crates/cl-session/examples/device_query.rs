// Enumerate every platform and device and print their profiles.

use cl_session::DeviceProfile;
use opencl3::device::{CL_DEVICE_TYPE_ALL, Device};
use opencl3::platform::get_platforms;

fn main() -> cl_session::Result<()> {
    let platforms = get_platforms().map_err(cl_session::Error::from)?;
    println!("{} platform(s)", platforms.len());

    for (pi, platform) in platforms.iter().enumerate() {
        println!(
            "platform {pi}: {}",
            platform.name().unwrap_or_else(|_| "<unnamed>".into())
        );
        let ids = platform
            .get_devices(CL_DEVICE_TYPE_ALL)
            .unwrap_or_default();
        for (di, id) in ids.into_iter().enumerate() {
            let profile = DeviceProfile::query(&Device::new(id))?;
            println!("  device {di}: {} ({})", profile.name, profile.vendor);
            println!("    version            : {}", profile.version);
            println!(
                "    global / local mem : {} MiB / {} KiB",
                profile.global_mem_size / 1024 / 1024,
                profile.local_mem_size / 1024
            );
            println!(
                "    max work-group     : {} (dims {}, sizes {:?})",
                profile.max_work_group_size,
                profile.max_work_item_dimensions,
                profile.max_work_item_sizes
            );
            println!(
                "    extensions         : {}",
                profile.extensions.len()
            );
        }
    }
    Ok(())
}
