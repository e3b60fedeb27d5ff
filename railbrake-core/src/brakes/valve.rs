//! Triple valve state machine

use crate::imports::*;

/// Width of the dead band either side of the reservoir pressures that the
/// valve ignores, in psi
pub const VALVE_HYSTERESIS_PSI: f64 = 1.0;
/// On high-pressure systems the valve releases once the brake pipe recovers
/// to this fraction of emergency reservoir pressure
pub const HIGH_PRESSURE_RELEASE_RATIO: f64 = 0.97;
/// Emergency reservoir pressure above which a system counts as high-pressure
pub const HIGH_PRESSURE_SYSTEM_PSI: f64 = 70.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, IsVariant)]
/// Flow path selected by a brake valve
pub enum ValveState {
    /// Brake pipe recharges the reservoirs, cylinder exhausts
    Release,
    /// All ports closed
    #[default]
    Lap,
    /// Auxiliary reservoir feeds the cylinder
    Apply,
    /// Auxiliary and emergency reservoirs feed the cylinder
    Emergency,
}

impl fmt::Display for ValveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValveState::Release => "Rel",
            ValveState::Lap => "Lap",
            ValveState::Apply => "App",
            ValveState::Emergency => "Emg",
        };
        f.write_str(s)
    }
}

/// Discrete signal raised when a pressure starts rising or falling, for
/// consumers such as sound or event logging
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BrakeEvent {
    TrainBrakePressureIncrease,
    TrainBrakePressureDecrease,
    EngineBrakePressureIncrease,
    EngineBrakePressureDecrease,
}

impl ValveState {
    /// Train brake signal for a change from `prev` into `self`
    pub fn train_brake_event(self, prev: ValveState) -> Option<BrakeEvent> {
        if self == prev {
            return None;
        }
        match self {
            ValveState::Release => Some(BrakeEvent::TrainBrakePressureDecrease),
            ValveState::Apply | ValveState::Emergency => {
                Some(BrakeEvent::TrainBrakePressureIncrease)
            }
            ValveState::Lap => None,
        }
    }

    /// Engine brake signal for a change from `prev` into `self`
    pub fn engine_brake_event(self, prev: ValveState) -> Option<BrakeEvent> {
        if self == prev {
            return None;
        }
        match self {
            ValveState::Release => Some(BrakeEvent::EngineBrakePressureDecrease),
            ValveState::Apply | ValveState::Emergency => {
                Some(BrakeEvent::EngineBrakePressureIncrease)
            }
            ValveState::Lap => None,
        }
    }
}

/// Pressures a triple valve compares, all gauge psi
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValvePressures {
    pub brake_pipe_psi: f64,
    pub aux_res_psi: f64,
    pub emerg_res_psi: f64,
    pub full_serv_psi: f64,
}

/// Next triple valve state for the given pressures.
///
/// Only pressures and the previous state are consulted, so a pipe pressure
/// wandering inside the ±[VALVE_HYSTERESIS_PSI] band around the auxiliary
/// reservoir never moves the valve.
pub fn next_triple_valve_state(prev: ValveState, p: &ValvePressures) -> ValveState {
    let bp = p.brake_pipe_psi;
    if bp < p.full_serv_psi - VALVE_HYSTERESIS_PSI {
        ValveState::Emergency
    } else if bp > p.aux_res_psi + VALVE_HYSTERESIS_PSI
        || (prev == ValveState::Emergency && bp > p.aux_res_psi)
        || (p.emerg_res_psi > HIGH_PRESSURE_SYSTEM_PSI
            && bp >= HIGH_PRESSURE_RELEASE_RATIO * p.emerg_res_psi
            && bp > p.aux_res_psi)
    {
        ValveState::Release
    } else if prev != ValveState::Emergency && bp < p.aux_res_psi - VALVE_HYSTERESIS_PSI {
        ValveState::Apply
    } else if prev == ValveState::Apply && bp >= p.aux_res_psi {
        ValveState::Lap
    } else {
        prev
    }
}
