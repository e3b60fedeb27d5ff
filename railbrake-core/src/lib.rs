//! Pneumatic brake simulation core for trains of air or vacuum braked rail vehicles.
//!
//! Every tick the train propagates its brake pipe pressures once
//! ([train::BrakeTrain::propagate_brake_pressure]) and then runs each car's
//! local valve logic ([brakes::BrakeSystem::update]).  [train::BrakeTrain::step]
//! does both in that order.
//!
//! Air pressures are gauge psi, vacuum brake pressures are absolute psi.
//! Dimensioned parameters (forces, volumes, lengths, time) use [uom] through
//! [si] and [uc].

#[macro_use]
pub mod macros;

pub mod brakes;
pub mod error;
pub(crate) mod imports;
pub mod pipe;
pub mod pressure;
pub mod si;
pub mod traits;
pub mod train;
pub mod uc;
pub mod utils;
pub mod validate;

pub mod prelude {
    pub use crate::brakes::{
        AirBrakeParams, AirSinglePipe, AirTwinPipe, BrakeEvent, BrakeSystem, BrakeTopology,
        BrakeTrait, BrakeValveType, ElectroPneumatic, RetainerSetting, VacuumBrakeParams,
        VacuumSinglePipe, ValveState,
    };
    pub use crate::pipe::{propagate_brake_pressure, PipeSnapshot, PropagationOutcome};
    pub use crate::pressure::*;
    pub use crate::traits::*;
    pub use crate::train::{step_trains, BrakeCar, BrakeTrain, LocoAirSupply, TrainBrakeCommand};
}
