use super::*;
use crate::pressure::{psia_to_vacuum, vacuum_to_psia, PressureUnit};
use std::f64::consts::PI;

/// Static parameters of a vacuum braked car
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VacuumBrakeParams {
    pub max_brake_force: si::Force,
    pub max_handbrake_force: si::Force,
    /// Pressure difference across the piston that gives maximum brake force, psi
    pub max_force_pressure_psi: f64,
    pub num_cylinders: u32,
    /// Cylinder volume with the piston in applied position
    pub cyl_volume: si::Volume,
    /// Vacuum reservoir volume with the piston in released position
    pub vac_res_volume: si::Volume,
    /// Brake pipe volume of one car
    pub pipe_volume: si::Volume,
    pub max_release_rate_psi_per_sec: f64,
    pub max_application_rate_psi_per_sec: f64,
    /// Cylinder admits air directly instead of drawing it from the brake pipe
    #[serde(default)]
    pub has_direct_admission_valve: bool,
    /// Time constant of the ejector when this car drives the brake pipe
    #[serde(default = "default_release_time_factor")]
    pub release_time_factor: si::Time,
}

fn default_release_time_factor() -> si::Time {
    1.009 * uc::S
}

impl Default for VacuumBrakeParams {
    fn default() -> Self {
        Self {
            max_brake_force: 89.0 * uc::KN,
            max_handbrake_force: si::Force::ZERO,
            max_force_pressure_psi: pressure::inhg_to_psi(21.0),
            num_cylinders: 2,
            cyl_volume: 9.0 * 9.0 * 4.5 * PI * uc::IN3,
            vac_res_volume: 12.0 * 12.0 * 16.0 * PI * uc::IN3,
            pipe_volume: 1.0 * 1.0 * 70.0 * 12.0 * PI * uc::IN3,
            max_release_rate_psi_per_sec: 2.5,
            max_application_rate_psi_per_sec: 2.5,
            has_direct_admission_valve: false,
            release_time_factor: default_release_time_factor(),
        }
    }
}

impl Valid for VacuumBrakeParams {}

impl ObjState for VacuumBrakeParams {
    fn validate(&self) -> ValidationResults {
        let mut errors = ValidationErrors::new();
        si_chk_num_gez_fin(&mut errors, &self.max_brake_force, "Max brake force");
        si_chk_num_gez_fin(&mut errors, &self.max_handbrake_force, "Max handbrake force");
        chk_num_gtz_fin(&mut errors, self.max_force_pressure_psi, "Max force pressure");
        si_chk_num_gtz_fin(&mut errors, &self.cyl_volume, "Cylinder volume");
        si_chk_num_gtz_fin(&mut errors, &self.vac_res_volume, "Vacuum reservoir volume");
        si_chk_num_gtz_fin(&mut errors, &self.pipe_volume, "Pipe volume");
        chk_num_gez_fin(&mut errors, self.max_release_rate_psi_per_sec, "Max release rate");
        chk_num_gez_fin(
            &mut errors,
            self.max_application_rate_psi_per_sec,
            "Max application rate",
        );
        si_chk_num_gtz_fin(&mut errors, &self.release_time_factor, "Release time factor");
        if self.cyl_volume >= self.vac_res_volume {
            errors.push(anyhow!(
                "Cylinder volume must be smaller than the vacuum reservoir volume!"
            ));
        }
        errors.make_err()
    }
}

/// Mutable state of a vacuum braked car, absolute psi
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VacuumBrakeState {
    /// Pressure under the piston, fed from the brake pipe
    pub cyl_psia: f64,
    /// Pressure above the piston with the piston in released position
    pub vac_res_psia: f64,
    /// Direction the cylinder pressure last moved in
    pub valve: ValveState,
}

/// Automatic vacuum brake.  Lower absolute pressure means more vacuum; the
/// brake applies when air admitted to the pipe raises the cylinder above the
/// reservoir.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VacuumSinglePipe {
    pub params: VacuumBrakeParams,
    #[serde(default)]
    pub state: VacuumBrakeState,
}

impl Init for VacuumSinglePipe {
    fn init(&mut self) -> Result<(), Error> {
        self.params.validate()?;
        Ok(())
    }
}

impl VacuumSinglePipe {
    pub fn new(params: VacuumBrakeParams) -> Self {
        Self {
            params,
            state: Default::default(),
        }
    }

    fn cyl_res_volume_ratio(&self) -> f64 {
        let ratio = (self.params.cyl_volume / self.params.vac_res_volume).get::<si::ratio>();
        if ratio.is_finite() {
            ratio
        } else {
            0.0
        }
    }

    /// `n * volume / pipe volume`, or 0 when the pipe volume is unusable
    fn pipe_ratio(&self, volume: si::Volume) -> f64 {
        let ratio = (self.params.num_cylinders as f64 * volume / self.params.pipe_volume)
            .get::<si::ratio>();
        if ratio.is_finite() {
            ratio
        } else {
            0.0
        }
    }

    /// Reservoir pressure corrected for the piston travelling into it
    pub fn vac_res_adjusted_psia(&self) -> f64 {
        let s = &self.state;
        if s.vac_res_psia >= s.cyl_psia {
            return s.vac_res_psia;
        }
        let ratio = self.cyl_res_volume_ratio();
        if ratio >= 1.0 {
            return s.vac_res_psia;
        }
        (s.vac_res_psia / (1.0 - ratio)).min(s.cyl_psia)
    }

    /// Pressure difference across the piston
    pub fn piston_differential_psi(&self) -> f64 {
        (self.state.cyl_psia - self.vac_res_adjusted_psia()).max(0.0)
    }

    fn brake_force(&self) -> si::Force {
        let max = self.params.max_force_pressure_psi;
        if max <= 0.0 {
            return si::Force::ZERO;
        }
        self.params.max_brake_force * (self.piston_differential_psi() / max).min(1.0)
    }

    /// Vacuum demand in inHg for an AI brake percentage
    pub fn ai_vacuum_inhg(&self, percent: f64, atmosphere_psi: f64) -> f64 {
        let percent = clamp_pct(percent);
        psia_to_vacuum(
            atmosphere_psi - self.params.max_force_pressure_psi * (1.0 - percent / 100.0),
            atmosphere_psi,
        )
    }
}

impl BrakeTrait for VacuumSinglePipe {
    /// `max_pressure` and `full_serv_pressure` are vacuum readings in inHg
    fn initialize(&mut self, pipes: &mut PipeState, setup: &BrakeSetup, _command: &TrainBrakeCommand) {
        let atm = setup.atmosphere_psi;
        pipes.brake_line1_psi = vacuum_to_psia(setup.full_serv_pressure, atm);
        pipes.brake_line2_psi = 0.0;
        pipes.brake_line3_psi = 0.0;
        pipes.bail_off = false;
        self.state.vac_res_psia = vacuum_to_psia(setup.max_pressure, atm);
        self.state.cyl_psia = if setup.immediate_release {
            self.state.vac_res_psia
        } else {
            pipes.brake_line1_psi
        };
        self.state.valve = ValveState::Lap;
    }

    fn initialize_moving(
        &mut self,
        pipes: &mut PipeState,
        command: &TrainBrakeCommand,
        atmosphere_psi: f64,
    ) {
        let psia = vacuum_to_psia(command.brake_line1_psi_or_inhg, atmosphere_psi);
        pipes.brake_line1_psi = psia;
        pipes.brake_line2_psi = 0.0;
        pipes.brake_line3_psi = 0.0;
        pipes.bail_off = false;
        self.state.cyl_psia = psia;
        self.state.vac_res_psia = psia;
        self.state.valve = ValveState::Lap;
    }

    fn update(&mut self, pipes: &mut PipeState, _ctx: &UpdateContext, dt_s: f64) -> BrakeOutput {
        let prev = self.state.valve;
        let cyl_ratio = self.pipe_ratio(self.params.cyl_volume);
        let res_ratio = self.pipe_ratio(self.params.vac_res_volume);
        let cyl_res = self.cyl_res_volume_ratio();
        let p = &self.params;
        let s = &mut self.state;
        let bp = &mut pipes.brake_line1_psi;

        if *bp < s.vac_res_psia {
            // pipe vacuum above the reservoir: the ball valve opens and both
            // sides of the piston are exhausted into the pipe
            transfer_drop(
                &mut s.vac_res_psia,
                bp,
                res_ratio,
                dt_s * p.max_release_rate_psi_per_sec * cyl_res,
            );
            s.cyl_psia = s.vac_res_psia;
            s.valve = ValveState::Release;
        } else if *bp < s.cyl_psia {
            transfer_drop(
                &mut s.cyl_psia,
                bp,
                cyl_ratio,
                dt_s * p.max_release_rate_psi_per_sec,
            );
            s.valve = ValveState::Release;
        } else if *bp > s.cyl_psia {
            let dp = equalizing_rise(
                *bp,
                s.cyl_psia,
                cyl_ratio,
                dt_s * p.max_application_rate_psi_per_sec,
            );
            s.cyl_psia += dp;
            if !p.has_direct_admission_valve {
                *bp -= dp * cyl_ratio;
            }
            s.valve = ValveState::Apply;
        } else {
            s.valve = ValveState::Lap;
        }
        *bp = bp.max(0.0);
        s.cyl_psia = s.cyl_psia.max(0.0);
        s.vac_res_psia = s.vac_res_psia.max(0.0);

        BrakeOutput {
            pneumatic_force: self.brake_force(),
            events: self.state.valve.train_brake_event(prev).into_iter().collect(),
        }
    }

    /// Pressure difference across the piston, psi
    fn cyl_psi(&self) -> f64 {
        self.piston_differential_psi()
    }

    fn set_retainer(&mut self, _setting: RetainerSetting) {}

    /// `max_pressure` is the regulated vacuum in inHg
    fn normalize_pressures(&mut self, pipes: &mut PipeState, max_pressure: f64, atmosphere_psi: f64) {
        let min_psia = vacuum_to_psia(max_pressure, atmosphere_psi);
        pipes.brake_line1_psi = pipes.brake_line1_psi.max(min_psia);
        self.state.vac_res_psia = self.state.vac_res_psia.max(min_psia);
        self.state.cyl_psia = self.state.cyl_psia.max(min_psia);
    }

    fn is_braking(&self) -> bool {
        self.piston_differential_psi() > self.params.max_force_pressure_psi * BRAKING_CYL_FRACTION
    }

    fn max_handbrake_force(&self) -> si::Force {
        self.params.max_handbrake_force
    }

    /// Commanded vacuum in inHg to absolute psi
    fn internal_pressure(&self, pressure: f64, atmosphere_psi: f64) -> f64 {
        vacuum_to_psia(pressure, atmosphere_psi)
    }

    fn status(&self, pipes: &PipeState, _unit: PressureUnit, atmosphere_psi: f64) -> String {
        format!(
            "BP {:.1} inHg",
            psia_to_vacuum(pipes.brake_line1_psi, atmosphere_psi)
        )
    }

    fn debug_columns(&self, atmosphere_psi: f64) -> Vec<String> {
        vec![
            format!("{:.1}", psia_to_vacuum(self.state.cyl_psia, atmosphere_psi)),
            format!(
                "{:.1}",
                psia_to_vacuum(self.vac_res_adjusted_psia(), atmosphere_psi)
            ),
            self.state.valve.to_string(),
        ]
    }
}
