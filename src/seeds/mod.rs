//! Database seeding functionality
//!
//! Populates the device registry from configuration at startup.

pub mod device;

pub use device::seed_devices;
