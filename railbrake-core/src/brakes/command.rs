use crate::imports::*;

/// Train-wide brake commands issued from the lead cab.
///
/// `brake_line1_psi_or_inhg` is gauge psi on air braked trains and inches of
/// mercury vacuum on vacuum braked trains.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainBrakeCommand {
    /// Commanded brake pipe pressure
    pub brake_line1_psi_or_inhg: f64,
    /// Main reservoir pipe pressure, gauge psi
    pub brake_line2_psi: f64,
    /// Commanded engine brake pipe pressure, gauge psi
    pub brake_line3_psi: f64,
    /// Electro-pneumatic demand fraction, nominally within [0, 1]
    pub brake_line4: f64,
    /// Emergency application in progress
    #[serde(default)]
    pub emergency: bool,
    /// Driver is bailing off the automatic brake on the locomotives
    #[serde(default)]
    pub bail_off: bool,
    /// Dynamic brake demand, percent
    #[serde(default)]
    pub dynamic_brake_percent: f64,
}

impl Default for TrainBrakeCommand {
    fn default() -> Self {
        Self {
            brake_line1_psi_or_inhg: 90.0,
            brake_line2_psi: 0.0,
            brake_line3_psi: 0.0,
            brake_line4: 0.0,
            emergency: false,
            bail_off: false,
            dynamic_brake_percent: 0.0,
        }
    }
}

impl Init for TrainBrakeCommand {}
impl SerdeAPI for TrainBrakeCommand {}

impl TrainBrakeCommand {
    /// Electro-pneumatic demand clamped to [0, 1]
    pub fn ep_demand(&self) -> f64 {
        if self.brake_line4.is_nan() {
            0.0
        } else {
            self.brake_line4.clamp(0.0, 1.0)
        }
    }
}
