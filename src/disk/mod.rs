mod block_device;
mod file_disk;

pub use block_device::BlockDevice;
pub use file_disk::FileDisk;
