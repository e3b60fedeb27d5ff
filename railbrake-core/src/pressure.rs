//! Pressure unit conversions shared by the brake models.
//!
//! Air brake pressures are carried as gauge psi.  Vacuum brake pressures are
//! carried as absolute psi, converted from the inHg vacuum readings drivers
//! and configuration use via [vacuum_to_psia] and [psia_to_vacuum].  The
//! atmospheric reference is always passed in explicitly.

use crate::imports::*;

/// Standard atmosphere in psi absolute
pub const ONE_ATMOSPHERE_PSI: f64 = 14.695_948_775_5;

pub fn psi_to_inhg(psi: f64) -> f64 {
    si::Pressure::new::<si::pound_force_per_square_inch>(psi).get::<si::inch_of_mercury>()
}

pub fn inhg_to_psi(inhg: f64) -> f64 {
    si::Pressure::new::<si::inch_of_mercury>(inhg).get::<si::pound_force_per_square_inch>()
}

pub fn psi_to_bar(psi: f64) -> f64 {
    si::Pressure::new::<si::pound_force_per_square_inch>(psi).get::<si::bar>()
}

pub fn bar_to_psi(bar: f64) -> f64 {
    si::Pressure::new::<si::bar>(bar).get::<si::pound_force_per_square_inch>()
}

pub fn psi_to_kpa(psi: f64) -> f64 {
    si::Pressure::new::<si::pound_force_per_square_inch>(psi).get::<si::kilopascal>()
}

/// Converts a vacuum reading in inHg to absolute psi (V2P)
pub fn vacuum_to_psia(vacuum_inhg: f64, atmosphere_psi: f64) -> f64 {
    atmosphere_psi - inhg_to_psi(vacuum_inhg)
}

/// Converts absolute psi to a vacuum reading in inHg (P2V)
pub fn psia_to_vacuum(psia: f64, atmosphere_psi: f64) -> f64 {
    psi_to_inhg(atmosphere_psi - psia)
}

/// Display unit for status strings
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PressureUnit {
    #[default]
    Psi,
    Bar,
    KPa,
    InHg,
}

impl PressureUnit {
    /// Formats a gauge psi value in this unit
    pub fn format(&self, psi: f64) -> String {
        match self {
            PressureUnit::Psi => format!("{psi:.0} psi"),
            PressureUnit::Bar => format!("{:.2} bar", psi_to_bar(psi)),
            PressureUnit::KPa => format!("{:.0} kPa", psi_to_kpa(psi)),
            PressureUnit::InHg => format!("{:.1} inHg", psi_to_inhg(psi)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vacuum_round_trip() {
        let mut psia = 0.5;
        while psia < ONE_ATMOSPHERE_PSI {
            let back = vacuum_to_psia(psia_to_vacuum(psia, ONE_ATMOSPHERE_PSI), ONE_ATMOSPHERE_PSI);
            assert!((back - psia).abs() < 1e-9, "{psia} -> {back}");
            psia += 0.25;
        }
    }

    #[test]
    fn test_vacuum_round_trip_alternate_atmosphere() {
        // some content uses 1 bar as the atmospheric reference
        let atm = bar_to_psi(1.0);
        for vac in [0.0, 5.0, 21.0, 25.0] {
            let back = psia_to_vacuum(vacuum_to_psia(vac, atm), atm);
            assert!((back - vac).abs() < 1e-9);
        }
    }

    #[test]
    fn test_known_conversions() {
        assert!(almost_eq(inhg_to_psi(21.0), 10.314, Some(1e-3)));
        assert!(almost_eq(bar_to_psi(5.0), 72.519, Some(1e-3)));
        assert_eq!(vacuum_to_psia(0.0, ONE_ATMOSPHERE_PSI), ONE_ATMOSPHERE_PSI);
    }

    #[test]
    fn test_format() {
        assert_eq!(PressureUnit::Psi.format(90.2), "90 psi");
        assert_eq!(PressureUnit::Bar.format(0.0), "0.00 bar");
    }
}
