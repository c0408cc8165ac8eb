//! `resolve`
//!
//! Works out which configured printer is plugged in right now.
//!
//! Printers advertise the USB device behind them through their spooler name, which must end in
//! `_VVVV:PPPP` (hexadecimal vendor and product ids), e.g. `iDPRT_SP310_0a5f:0001`. A printer
//! is present when a device with that id is on the bus. Nothing is cached between calls: USB
//! devices come and go, so every resolution works from a fresh snapshot.

use std::collections::HashSet;
use std::fmt;

use log::{debug, warn};
use serde::Serialize;

use crate::error::ResolveError;

/// USB vendor and product id pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BusId {
    /// Vendor id.
    pub vendor: u16,
    /// Product id.
    pub product: u16,
}

impl BusId {
    /// Creates a new [`BusId`].
    pub const fn new(vendor: u16, product: u16) -> Self {
        BusId { vendor, product }
    }
}

impl fmt::Display for BusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor, self.product)
    }
}

/// A printer known to the spooler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PrinterDescriptor {
    /// Spooler queue name.
    pub name: String,
    /// Device id from the name suffix, if it has one.
    pub bus_id: Option<BusId>,
}

impl PrinterDescriptor {
    /// Builds a descriptor from a spooler queue name, reading the `_VVVV:PPPP` suffix.
    ///
    /// Names without a well-formed suffix get no bus id and can never be selected.
    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let bus_id = parse_bus_suffix(&name);
        PrinterDescriptor { name, bus_id }
    }
}

/// Reads a trailing `_VVVV:PPPP` from `name`.
fn parse_bus_suffix(name: &str) -> Option<BusId> {
    let (_, suffix) = name.rsplit_once('_')?;
    let (vendor, product) = suffix.split_once(':')?;
    Some(BusId::new(parse_hex4(vendor)?, parse_hex4(product)?))
}

/// Parses exactly four hex digits.
fn parse_hex4(digits: &str) -> Option<u16> {
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(digits, 16).ok()
}

/// The configured printers whose device is attached, sorted by name.
///
/// # Arguments
/// * `configured`: Printers known to the spooler.
/// * `attached`: Devices currently on the bus.
pub fn present_printers<'a>(
    configured: &'a [PrinterDescriptor],
    attached: &HashSet<BusId>,
) -> Vec<&'a PrinterDescriptor> {
    let mut present: Vec<&PrinterDescriptor> = configured
        .iter()
        .filter(|printer| match printer.bus_id {
            Some(id) => attached.contains(&id),
            None => {
                debug!("printer {:?} has no USB id suffix", printer.name);
                false
            }
        })
        .collect();
    present.sort_by(|a, b| a.name.cmp(&b.name));
    present
}

/// Chooses the printer to print on.
///
/// # Arguments
/// * `configured`: Printers known to the spooler.
/// * `attached`: Devices currently on the bus.
/// * `preferred`: A printer the caller insists on.
///
/// # Returns
/// The preferred printer if it is present. Otherwise the only present printer, or, when several
/// are present, the one whose name sorts first.
///
/// # Errors
/// [`ResolveError::PreferredPrinterNotPresent`] if `preferred` is given but not configured or
/// not attached; there is no fallback to another printer. [`ResolveError::NoPrinterPresent`] if
/// no configured printer is attached.
pub fn resolve_printer(
    configured: &[PrinterDescriptor],
    attached: &HashSet<BusId>,
    preferred: Option<&str>,
) -> Result<PrinterDescriptor, ResolveError> {
    if let Some(name) = preferred {
        return configured
            .iter()
            .find(|printer| printer.name == name)
            .filter(|printer| printer.bus_id.is_some_and(|id| attached.contains(&id)))
            .cloned()
            .ok_or_else(|| ResolveError::PreferredPrinterNotPresent {
                name: name.to_string(),
            });
    }

    let present = present_printers(configured, attached);
    if present.len() > 1 {
        warn!(
            "{} printers attached, using {:?}",
            present.len(),
            present[0].name
        );
    }
    present
        .first()
        .map(|printer| (*printer).clone())
        .ok_or(ResolveError::NoPrinterPresent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn printers(names: &[&str]) -> Vec<PrinterDescriptor> {
        names
            .iter()
            .map(|name| PrinterDescriptor::from_name(*name))
            .collect()
    }

    fn attached(ids: &[(u16, u16)]) -> HashSet<BusId> {
        ids.iter().map(|(v, p)| BusId::new(*v, *p)).collect()
    }

    #[test]
    fn test_parse_suffix() {
        assert_eq!(
            PrinterDescriptor::from_name("iDPRT_SP310_0a5f:0001").bus_id,
            Some(BusId::new(0x0a5f, 0x0001))
        );
        assert_eq!(
            PrinterDescriptor::from_name("Zebra_0A5F:00FF").bus_id,
            Some(BusId::new(0x0a5f, 0x00ff)),
            "upper case hex"
        );
        for name in [
            "Office_Laser",
            "Zebra_0a5f0001",
            "Zebra_0a5f:001",
            "Zebra_0a5f:00001",
            "Zebra_0a5g:0001",
            "0a5f:0001",
            "Zebra_0a5f:0001_backup",
        ] {
            assert_eq!(PrinterDescriptor::from_name(name).bus_id, None, "{name}");
        }
    }

    #[test]
    fn test_nothing_attached() {
        let configured = printers(&["A_0a5f:0001", "B_04b8:0202", "Office"]);
        assert_eq!(
            resolve_printer(&configured, &HashSet::new(), None),
            Err(ResolveError::NoPrinterPresent)
        );
        assert_eq!(
            resolve_printer(&[], &HashSet::new(), None),
            Err(ResolveError::NoPrinterPresent)
        );
    }

    #[test]
    fn test_single_match() {
        let configured = printers(&["Office", "Label_0a5f:0001", "Other_04b8:0202"]);
        let resolved =
            resolve_printer(&configured, &attached(&[(0x0a5f, 0x0001), (0x1d6b, 2)]), None);
        assert_eq!(resolved.unwrap().name, "Label_0a5f:0001");
    }

    #[test]
    fn test_tie_break_is_lexicographic() {
        let configured = printers(&["Zulu_0a5f:0001", "Alpha_04b8:0202"]);
        let both = attached(&[(0x0a5f, 0x0001), (0x04b8, 0x0202)]);
        assert_eq!(
            resolve_printer(&configured, &both, None).unwrap().name,
            "Alpha_04b8:0202"
        );

        // same device behind two queues
        let configured = printers(&["b_0a5f:0001", "a_0a5f:0001"]);
        assert_eq!(
            resolve_printer(&configured, &both, None).unwrap().name,
            "a_0a5f:0001"
        );
    }

    #[test]
    fn test_preferred_printer() {
        let configured = printers(&["Alpha_04b8:0202", "Zulu_0a5f:0001"]);
        let both = attached(&[(0x0a5f, 0x0001), (0x04b8, 0x0202)]);
        assert_eq!(
            resolve_printer(&configured, &both, Some("Zulu_0a5f:0001"))
                .unwrap()
                .name,
            "Zulu_0a5f:0001"
        );

        // configured but unplugged: no fallback to Alpha
        let only_alpha = attached(&[(0x04b8, 0x0202)]);
        assert_eq!(
            resolve_printer(&configured, &only_alpha, Some("Zulu_0a5f:0001")),
            Err(ResolveError::PreferredPrinterNotPresent {
                name: "Zulu_0a5f:0001".to_string()
            })
        );

        // not configured at all
        assert_eq!(
            resolve_printer(&configured, &both, Some("Missing_0a5f:0001")),
            Err(ResolveError::PreferredPrinterNotPresent {
                name: "Missing_0a5f:0001".to_string()
            })
        );
    }

    #[test]
    fn test_present_printers_sorted() {
        let configured = printers(&["c_0001:0001", "a_0001:0001", "b_0002:0002", "d"]);
        let present = present_printers(&configured, &attached(&[(1, 1)]));
        let names: Vec<&str> = present.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a_0001:0001", "c_0001:0001"]);
    }

    #[test]
    fn test_bus_id_display() {
        assert_eq!(BusId::new(0x0a5f, 1).to_string(), "0a5f:0001");
    }
}
