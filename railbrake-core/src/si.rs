//! Import uom si system and add unit constants
//! Zero values should be created using standard uom syntax ($Quantity::ZERO) after adding "use crate::imports::*"
//! Non-zero values should be created using standard uom syntax ($Quantity::new::<$unit>($value)) or multiplication syntax ($value * $UNIT_CONSTANT)

use uom::si;

pub use si::f64::{Force, Length, Pressure, Time, Volume};
pub use si::force::kilonewton;
pub use si::length::meter;
pub use si::pressure::{bar, inch_of_mercury, kilopascal, pound_force_per_square_inch};
pub use si::ratio::ratio;
pub use si::time::second;
pub use si::volume::{cubic_inch, cubic_meter};
