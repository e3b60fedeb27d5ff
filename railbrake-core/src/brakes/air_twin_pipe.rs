use super::*;
use crate::pressure::PressureUnit;

/// Twin-pipe air brake.  A main reservoir pipe (line 2) runs beside the brake
/// pipe and keeps the auxiliary reservoir charged, while the cylinder follows
/// a graduated target derived from the emergency (control) reservoir.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AirTwinPipe {
    pub air: AirSinglePipe,
}

impl Init for AirTwinPipe {
    fn init(&mut self) -> Result<(), Error> {
        self.air.init()
    }
}

impl AirTwinPipe {
    pub fn new(params: AirBrakeParams) -> Self {
        Self {
            air: AirSinglePipe::new(params),
        }
    }

    /// Cylinder target is `max(retainer, (emergency - brake pipe) * aux/cyl
    /// ratio)`, never below `floor_psi`; the valve state simply reports which
    /// side of the target the cylinder is on.
    pub(super) fn update_twin_pipe(&mut self, pipes: &mut PipeState, floor_psi: f64, dt_s: f64) {
        let threshold = self
            .air
            .graduated_threshold_psi(pipes)
            .max(floor_psi)
            .min(self.air.max_cyl_psi());
        let ratio = self.air.ratios().aux_cyl;
        let ratios = *self.air.ratios();
        let params = &self.air.params;
        let s = &mut self.air.state;

        if s.auto_cyl_psi > threshold {
            s.triple_valve = ValveState::Release;
            s.auto_cyl_psi = (s.auto_cyl_psi - dt_s * s.release_rate_psi_per_sec).max(threshold);
        } else if s.auto_cyl_psi < threshold {
            s.triple_valve = ValveState::Apply;
            let dp = equalizing_rise(
                s.aux_res_psi,
                s.auto_cyl_psi,
                1.0 / ratio,
                dt_s * params.max_application_rate_psi_per_sec,
            );
            if s.auto_cyl_psi + dp >= threshold {
                s.aux_res_psi -= (threshold - s.auto_cyl_psi) / ratio;
                s.auto_cyl_psi = threshold;
            } else {
                s.aux_res_psi -= dp / ratio;
                s.auto_cyl_psi += dp;
            }
        } else {
            s.triple_valve = ValveState::Lap;
        }

        if pipes.brake_line1_psi > s.emerg_res_psi {
            // control reservoir charges from the brake pipe
            transfer_rise(
                &mut pipes.brake_line1_psi,
                &mut s.emerg_res_psi,
                ratios.emerg_aux * ratios.aux_brake_line,
                dt_s * params.emerg_res_charging_rate_psi_per_sec,
            );
            s.triple_valve = ValveState::Release;
        }
        if s.aux_res_psi < pipes.brake_line2_psi {
            transfer_rise(
                &mut pipes.brake_line2_psi,
                &mut s.aux_res_psi,
                ratios.aux_brake_line,
                dt_s * params.max_aux_charging_rate_psi_per_sec,
            );
        }
    }
}

impl BrakeTrait for AirTwinPipe {
    fn initialize(&mut self, pipes: &mut PipeState, setup: &BrakeSetup, command: &TrainBrakeCommand) {
        self.air.initialize(pipes, setup, command)
    }

    fn initialize_moving(
        &mut self,
        pipes: &mut PipeState,
        command: &TrainBrakeCommand,
        atmosphere_psi: f64,
    ) {
        self.air.initialize_moving(pipes, command, atmosphere_psi)
    }

    fn update(&mut self, pipes: &mut PipeState, _ctx: &UpdateContext, dt_s: f64) -> BrakeOutput {
        let prev = self.air.state.triple_valve;
        self.update_twin_pipe(pipes, 0.0, dt_s);
        self.air.finish_update(pipes, prev, dt_s)
    }

    fn cyl_psi(&self) -> f64 {
        self.air.cyl_psi()
    }

    fn set_retainer(&mut self, setting: RetainerSetting) {
        self.air.set_retainer(setting)
    }

    fn normalize_pressures(&mut self, pipes: &mut PipeState, max_pressure: f64, atmosphere_psi: f64) {
        self.air.normalize_pressures(pipes, max_pressure, atmosphere_psi)
    }

    fn is_braking(&self) -> bool {
        self.air.is_braking()
    }

    fn max_handbrake_force(&self) -> si::Force {
        self.air.max_handbrake_force()
    }

    fn status(&self, pipes: &PipeState, unit: PressureUnit, atmosphere_psi: f64) -> String {
        format!(
            "{} MRP {}",
            self.air.status(pipes, unit, atmosphere_psi),
            unit.format(pipes.brake_line2_psi)
        )
    }

    fn debug_columns(&self, atmosphere_psi: f64) -> Vec<String> {
        self.air.debug_columns(atmosphere_psi)
    }
}
