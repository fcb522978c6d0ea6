//! Device models and the registry routing telegrams to them.

pub mod device;
pub mod registry;
pub mod switch;

pub use device::Device;
pub use registry::{DeviceUpdatedCallback, DeviceUpdatedHandle, DeviceUpdatedNotifier, Devices};
pub use switch::Switch;
