pub mod resource_monitor;
pub mod semaphore;

pub use resource_monitor::{recommend_permits, ResourceMonitor, ResourceSample, ThermalState};
pub use semaphore::{AsyncSemaphore, SemaphorePermit};
