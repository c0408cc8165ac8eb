//! `usb`
//!
//! Lists the vendor/product ids of the devices currently on the USB bus.

use std::collections::HashSet;

use log::debug;

use crate::{error::BackendError, resolve::BusId};

/// The USB bus of this machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsbBus;

impl UsbBus {
    /// Ids of every device attached right now.
    ///
    /// # Errors
    /// Never; the platform enumerator reports an empty bus rather than failing.
    pub fn attached(&self) -> Result<HashSet<BusId>, BackendError> {
        let devices = bus_ids(
            usb_enumeration::enumerate(None, None)
                .iter()
                .map(|device| (device.vendor_id, device.product_id)),
        );
        debug!("{} USB devices attached", devices.len());
        Ok(devices)
    }
}

/// Collapses enumerated `(vendor, product)` pairs into a set; hubs and composite devices show
/// up more than once.
fn bus_ids(devices: impl IntoIterator<Item = (u16, u16)>) -> HashSet<BusId> {
    devices
        .into_iter()
        .map(|(vendor, product)| BusId::new(vendor, product))
        .collect()
}
