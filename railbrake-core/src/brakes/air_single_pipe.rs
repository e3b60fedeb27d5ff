use super::*;
use crate::pressure::PressureUnit;

/// Fallback auxiliary reservoir to brake pipe volume ratio
pub const DEFAULT_AUX_BRAKE_LINE_VOLUME_RATIO: f64 = 3.1;
/// Fallback emergency to auxiliary reservoir volume ratio
pub const DEFAULT_EMERG_AUX_VOLUME_RATIO: f64 = 1.4;
/// Fallback auxiliary reservoir to cylinder volume ratio
pub const DEFAULT_AUX_CYL_VOLUME_RATIO: f64 = 2.5;
/// Fallback maximum cylinder pressure, psi
pub const DEFAULT_MAX_CYL_PSI: f64 = 64.0;
/// Bleed-off valve closes itself once every reservoir is below this, psi
pub const BLEED_OFF_CLOSED_PSI: f64 = 0.01;
/// Share of maximum cylinder pressure above which the car counts as braking
pub const BRAKING_CYL_FRACTION: f64 = 0.3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, IsVariant)]
/// Control valve fitted to an air braked car
pub enum BrakeValveType {
    /// Plain triple valve with direct release; the emergency reservoir helps
    /// recharge the auxiliary reservoir
    #[default]
    TripleValve,
    /// Distributor with graduated release, using the emergency reservoir as
    /// its control reservoir
    Distributor,
}

/// Static parameters of an air braked car
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AirBrakeParams {
    /// Brake force at maximum cylinder pressure
    pub max_brake_force: si::Force,
    /// Brake force with the handbrake fully applied
    pub max_handbrake_force: si::Force,
    pub max_cyl_psi: f64,
    pub aux_cyl_volume_ratio: f64,
    /// Auxiliary reservoir volume, used to derive the brake pipe volume ratio
    #[serde(default)]
    pub aux_res_volume: Option<si::Volume>,
    /// Emergency reservoir volume, used to derive the emergency/auxiliary ratio
    #[serde(default)]
    pub emerg_res_volume: Option<si::Volume>,
    pub max_release_rate_psi_per_sec: f64,
    pub max_application_rate_psi_per_sec: f64,
    pub max_aux_charging_rate_psi_per_sec: f64,
    pub emerg_res_charging_rate_psi_per_sec: f64,
    #[serde(default)]
    pub brake_valve: BrakeValveType,
    /// Number of retainer valve positions (0, 3 or 4)
    #[serde(default)]
    pub retainer_positions: u8,
    /// Auxiliary reservoir is charged from the main reservoir pipe on twin-pipe cars
    #[serde(default)]
    pub mrp_aux_res_charging: bool,
}

impl Default for AirBrakeParams {
    fn default() -> Self {
        Self {
            max_brake_force: 89.0 * uc::KN,
            max_handbrake_force: si::Force::ZERO,
            max_cyl_psi: DEFAULT_MAX_CYL_PSI,
            aux_cyl_volume_ratio: DEFAULT_AUX_CYL_VOLUME_RATIO,
            aux_res_volume: None,
            emerg_res_volume: None,
            max_release_rate_psi_per_sec: 1.86,
            max_application_rate_psi_per_sec: 0.9,
            max_aux_charging_rate_psi_per_sec: 1.684,
            emerg_res_charging_rate_psi_per_sec: 1.684,
            brake_valve: BrakeValveType::TripleValve,
            retainer_positions: 4,
            mrp_aux_res_charging: false,
        }
    }
}

impl Valid for AirBrakeParams {}

impl ObjState for AirBrakeParams {
    fn validate(&self) -> ValidationResults {
        let mut errors = ValidationErrors::new();
        si_chk_num_gez_fin(&mut errors, &self.max_brake_force, "Max brake force");
        si_chk_num_gez_fin(&mut errors, &self.max_handbrake_force, "Max handbrake force");
        chk_num_gez_fin(&mut errors, self.max_cyl_psi, "Max cylinder pressure");
        chk_num_gez_fin(&mut errors, self.aux_cyl_volume_ratio, "Aux/cylinder volume ratio");
        chk_num_gez_fin(
            &mut errors,
            self.max_release_rate_psi_per_sec,
            "Max release rate",
        );
        chk_num_gez_fin(
            &mut errors,
            self.max_application_rate_psi_per_sec,
            "Max application rate",
        );
        chk_num_gez_fin(
            &mut errors,
            self.max_aux_charging_rate_psi_per_sec,
            "Max aux charging rate",
        );
        chk_num_gez_fin(
            &mut errors,
            self.emerg_res_charging_rate_psi_per_sec,
            "Emergency reservoir charging rate",
        );
        if let Some(vol) = &self.aux_res_volume {
            si_chk_num_gez_fin(&mut errors, vol, "Aux reservoir volume");
        }
        if let Some(vol) = &self.emerg_res_volume {
            si_chk_num_gez_fin(&mut errors, vol, "Emergency reservoir volume");
        }
        if ![0, 3, 4].contains(&self.retainer_positions) {
            errors.push(anyhow!(
                "Retainer positions = {} must be 0, 3 or 4!",
                self.retainer_positions
            ));
        }
        errors.make_err()
    }
}

/// Volume ratios resolved from configured volumes, falling back to fixed
/// constants wherever a volume is missing or zero
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AirVolumeRatios {
    pub aux_brake_line: f64,
    pub emerg_aux: f64,
    pub aux_cyl: f64,
}

impl Default for AirVolumeRatios {
    fn default() -> Self {
        Self {
            aux_brake_line: DEFAULT_AUX_BRAKE_LINE_VOLUME_RATIO,
            emerg_aux: DEFAULT_EMERG_AUX_VOLUME_RATIO,
            aux_cyl: DEFAULT_AUX_CYL_VOLUME_RATIO,
        }
    }
}

fn volume_ratio(num: Option<si::Volume>, den: Option<si::Volume>) -> Option<f64> {
    match (num, den) {
        (Some(num), Some(den)) if num > si::Volume::ZERO && den > si::Volume::ZERO => {
            let ratio = (num / den).get::<si::ratio>();
            ratio.is_finite().then_some(ratio)
        }
        _ => None,
    }
}

/// Mutable state of an air braked car, all gauge psi
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AirBrakeState {
    pub aux_res_psi: f64,
    pub emerg_res_psi: f64,
    /// Cylinder pressure from the automatic brake alone
    pub auto_cyl_psi: f64,
    /// Effective cylinder pressure including the engine brake
    pub cyl_psi: f64,
    pub full_serv_psi: f64,
    pub retainer_threshold_psi: f64,
    pub release_rate_psi_per_sec: f64,
    pub triple_valve: ValveState,
}

/// Single-pipe automatic air brake: brake pipe, auxiliary and emergency
/// reservoirs, triple valve (or distributor), retainer and cylinder
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AirSinglePipe {
    pub params: AirBrakeParams,
    #[serde(default)]
    pub state: AirBrakeState,
    #[serde(skip)]
    ratios: AirVolumeRatios,
}

impl Default for AirSinglePipe {
    fn default() -> Self {
        Self::new(AirBrakeParams::default())
    }
}

impl Init for AirSinglePipe {
    fn init(&mut self) -> Result<(), Error> {
        self.params.validate()?;
        if self.state.release_rate_psi_per_sec <= 0.0 {
            self.state.release_rate_psi_per_sec = self.params.max_release_rate_psi_per_sec;
        }
        Ok(())
    }
}

impl AirSinglePipe {
    pub fn new(params: AirBrakeParams) -> Self {
        let state = AirBrakeState {
            release_rate_psi_per_sec: params.max_release_rate_psi_per_sec,
            ..Default::default()
        };
        let mut air = Self {
            params,
            state,
            ratios: Default::default(),
        };
        air.ratios.aux_cyl = air.aux_cyl_ratio_or_default();
        air
    }

    pub fn ratios(&self) -> &AirVolumeRatios {
        &self.ratios
    }

    fn aux_cyl_ratio_or_default(&self) -> f64 {
        let ratio = self.params.aux_cyl_volume_ratio;
        if ratio.is_finite() && ratio > 0.0 {
            ratio
        } else {
            DEFAULT_AUX_CYL_VOLUME_RATIO
        }
    }

    /// Resolves volume ratios against this car's brake pipe volume
    pub(super) fn init_ratios(&mut self, brake_pipe_volume: si::Volume) {
        let aux_brake_line = volume_ratio(self.params.aux_res_volume, Some(brake_pipe_volume))
            .unwrap_or_else(|| {
                #[cfg(feature = "logging")]
                log::debug!(
                    "aux reservoir volume unset, using aux/brake line ratio {}",
                    DEFAULT_AUX_BRAKE_LINE_VOLUME_RATIO
                );
                DEFAULT_AUX_BRAKE_LINE_VOLUME_RATIO
            });
        let emerg_aux = volume_ratio(self.params.emerg_res_volume, self.params.aux_res_volume)
            .unwrap_or(DEFAULT_EMERG_AUX_VOLUME_RATIO);
        self.ratios = AirVolumeRatios {
            aux_brake_line,
            emerg_aux,
            aux_cyl: self.aux_cyl_ratio_or_default(),
        };
    }

    /// Maximum cylinder pressure, never zero
    pub fn max_cyl_psi(&self) -> f64 {
        if self.params.max_cyl_psi > 0.0 {
            self.params.max_cyl_psi
        } else {
            DEFAULT_MAX_CYL_PSI
        }
    }

    fn valve_pressures(&self, pipes: &PipeState) -> ValvePressures {
        ValvePressures {
            brake_pipe_psi: pipes.brake_line1_psi,
            aux_res_psi: self.state.aux_res_psi,
            emerg_res_psi: self.state.emerg_res_psi,
            full_serv_psi: self.state.full_serv_psi,
        }
    }

    /// Cylinder pressure the release stops at: the retainer setting, raised
    /// to the graduated release target on distributor valves
    pub(super) fn release_threshold_psi(&self, pipes: &PipeState) -> f64 {
        let threshold = match self.params.brake_valve {
            BrakeValveType::TripleValve => self.state.retainer_threshold_psi,
            BrakeValveType::Distributor => self.state.retainer_threshold_psi.max(
                (self.state.emerg_res_psi - pipes.brake_line1_psi) * self.ratios.aux_cyl,
            ),
        };
        threshold.clamp(0.0, self.max_cyl_psi())
    }

    /// Release threshold used by continuously graduated valves
    pub(super) fn graduated_threshold_psi(&self, pipes: &PipeState) -> f64 {
        self.state
            .retainer_threshold_psi
            .max((self.state.emerg_res_psi - pipes.brake_line1_psi) * self.ratios.aux_cyl)
            .clamp(0.0, self.max_cyl_psi())
    }

    /// Valve logic and reservoir transfers of the single-pipe brake
    pub(super) fn update_single_pipe(&mut self, pipes: &mut PipeState, dt_s: f64) {
        let threshold = self.release_threshold_psi(pipes);
        if pipes.bleed_off_valve_open {
            self.bleed_off(pipes, dt_s);
            return;
        }
        let valve = next_triple_valve_state(self.state.triple_valve, &self.valve_pressures(pipes));
        self.state.triple_valve = valve;
        match valve {
            ValveState::Apply | ValveState::Emergency => {
                // twin-pipe cars stop at the graduated target whatever their valve type
                let cap = pipes
                    .two_pipes
                    .then(|| self.graduated_threshold_psi(pipes));
                self.apply_from_aux(pipes, cap, dt_s);
                if valve.is_emergency() {
                    transfer_drop(
                        &mut self.state.emerg_res_psi,
                        &mut self.state.aux_res_psi,
                        self.ratios.emerg_aux,
                        dt_s * self.params.max_application_rate_psi_per_sec,
                    );
                }
            }
            ValveState::Release => self.release(pipes, threshold, dt_s),
            ValveState::Lap => {}
        }
        if pipes.two_pipes
            && self.params.mrp_aux_res_charging
            && !self.state.triple_valve.is_release()
        {
            transfer_rise(
                &mut pipes.brake_line2_psi,
                &mut self.state.aux_res_psi,
                self.ratios.aux_brake_line,
                dt_s * self.params.max_aux_charging_rate_psi_per_sec,
            );
        }
    }

    /// Feeds the cylinder from the auxiliary reservoir, laps the valve once
    /// the reservoir has come down to brake pipe pressure
    pub(super) fn apply_from_aux(&mut self, pipes: &PipeState, cap: Option<f64>, dt_s: f64) {
        let ratio = self.ratios.aux_cyl;
        let max_cyl = self.max_cyl_psi();
        let s = &mut self.state;
        // auxiliary reservoir falls by dp / ratio while the cylinder rises by dp
        let mut dp = equalizing_rise(
            s.aux_res_psi,
            s.auto_cyl_psi,
            1.0 / ratio,
            dt_s * self.params.max_application_rate_psi_per_sec,
        );
        if let Some(cap) = cap {
            if s.auto_cyl_psi + dp > cap {
                dp = (cap - s.auto_cyl_psi).max(0.0);
            }
        }
        if s.triple_valve.is_apply() && pipes.brake_line1_psi > s.aux_res_psi - dp / ratio {
            dp = ((s.aux_res_psi - pipes.brake_line1_psi) * ratio).max(0.0);
            s.triple_valve = ValveState::Lap;
        }
        if s.auto_cyl_psi + dp > max_cyl {
            dp = (max_cyl - s.auto_cyl_psi).max(0.0);
        }
        s.aux_res_psi -= dp / ratio;
        s.auto_cyl_psi += dp;
    }

    fn release(&mut self, pipes: &mut PipeState, threshold: f64, dt_s: f64) {
        let ea = self.ratios.emerg_aux;
        let s = &mut self.state;
        if s.auto_cyl_psi > threshold {
            s.auto_cyl_psi = (s.auto_cyl_psi - dt_s * s.release_rate_psi_per_sec).max(threshold);
        }
        let emerg_dp = dt_s * self.params.emerg_res_charging_rate_psi_per_sec;
        if self.params.brake_valve.is_triple_valve()
            && s.aux_res_psi < s.emerg_res_psi
            && s.aux_res_psi < pipes.brake_line1_psi
        {
            // emergency reservoir helps, but never lifts the auxiliary above the pipe
            let mut dp = equalizing_drop(s.emerg_res_psi, s.aux_res_psi, ea, emerg_dp);
            if s.aux_res_psi + dp * ea > pipes.brake_line1_psi {
                dp = (pipes.brake_line1_psi - s.aux_res_psi) / ea;
            }
            s.emerg_res_psi -= dp;
            s.aux_res_psi += dp * ea;
        }
        if s.aux_res_psi > s.emerg_res_psi {
            transfer_rise(&mut s.aux_res_psi, &mut s.emerg_res_psi, ea, emerg_dp);
        }
        let source = if pipes.two_pipes && self.params.mrp_aux_res_charging {
            &mut pipes.brake_line2_psi
        } else {
            &mut pipes.brake_line1_psi
        };
        transfer_rise(
            source,
            &mut s.aux_res_psi,
            self.ratios.aux_brake_line,
            dt_s * self.params.max_aux_charging_rate_psi_per_sec,
        );
    }

    fn bleed_off(&mut self, pipes: &mut PipeState, dt_s: f64) {
        let s = &mut self.state;
        s.aux_res_psi = (s.aux_res_psi - dt_s * self.params.max_application_rate_psi_per_sec).max(0.0);
        s.auto_cyl_psi = (s.auto_cyl_psi - dt_s * self.params.max_release_rate_psi_per_sec).max(0.0);
        s.emerg_res_psi =
            (s.emerg_res_psi - dt_s * self.params.emerg_res_charging_rate_psi_per_sec).max(0.0);
        s.triple_valve = ValveState::Release;
        if s.aux_res_psi < BLEED_OFF_CLOSED_PSI
            && s.auto_cyl_psi < BLEED_OFF_CLOSED_PSI
            && s.emerg_res_psi < BLEED_OFF_CLOSED_PSI
        {
            pipes.bleed_off_valve_open = false;
        }
    }

    /// Engine brake override, clamps, effective cylinder pressure, force and
    /// valve signal, shared by every air topology
    pub(super) fn finish_update(
        &mut self,
        pipes: &mut PipeState,
        prev_valve: ValveState,
        dt_s: f64,
    ) -> BrakeOutput {
        let max_cyl = self.max_cyl_psi();
        let s = &mut self.state;
        if pipes.bail_off {
            s.auto_cyl_psi -= dt_s * self.params.max_release_rate_psi_per_sec;
        }
        s.auto_cyl_psi = s.auto_cyl_psi.clamp(0.0, max_cyl);
        s.aux_res_psi = s.aux_res_psi.max(0.0);
        s.emerg_res_psi = s.emerg_res_psi.max(0.0);
        pipes.brake_line1_psi = pipes.brake_line1_psi.max(0.0);
        pipes.brake_line2_psi = pipes.brake_line2_psi.max(0.0);
        s.cyl_psi = s.auto_cyl_psi.max(pipes.brake_line3_psi);

        let force = self.params.max_brake_force * (s.cyl_psi / max_cyl).min(1.0);
        BrakeOutput {
            pneumatic_force: force,
            events: s.triple_valve.train_brake_event(prev_valve).into_iter().collect(),
        }
    }

    /// Lowers the maximum cylinder pressure so a full application from
    /// `max_pressure_psi` can actually reach it
    pub fn correct_max_cyl_pressure(&mut self, max_pressure_psi: f64) {
        let ratio = self.ratios.aux_cyl;
        if self.params.max_cyl_psi > max_pressure_psi - self.params.max_cyl_psi / ratio {
            self.params.max_cyl_psi = max_pressure_psi * ratio / (1.0 + ratio);
        }
    }
}

impl BrakeTrait for AirSinglePipe {
    fn initialize(&mut self, pipes: &mut PipeState, setup: &BrakeSetup, command: &TrainBrakeCommand) {
        pipes.brake_line1_psi = command.brake_line1_psi_or_inhg.max(0.0);
        pipes.brake_line2_psi = command.brake_line2_psi.max(0.0);
        pipes.brake_line3_psi = 0.0;
        pipes.bail_off = false;
        let max_cyl = self.max_cyl_psi();
        let s = &mut self.state;
        s.aux_res_psi = pipes.brake_line1_psi;
        s.emerg_res_psi = setup.max_pressure.max(0.0);
        s.full_serv_psi = setup.full_serv_pressure.max(0.0);
        s.auto_cyl_psi = if setup.immediate_release {
            0.0
        } else {
            ((setup.max_pressure - pipes.brake_line1_psi) * self.ratios.aux_cyl).clamp(0.0, max_cyl)
        };
        s.cyl_psi = s.auto_cyl_psi;
        s.triple_valve = ValveState::Lap;
    }

    fn initialize_moving(
        &mut self,
        pipes: &mut PipeState,
        command: &TrainBrakeCommand,
        _atmosphere_psi: f64,
    ) {
        pipes.brake_line1_psi = command.brake_line1_psi_or_inhg.max(0.0);
        pipes.brake_line2_psi = command.brake_line2_psi.max(0.0);
        pipes.brake_line3_psi = 0.0;
        pipes.bail_off = false;
        let s = &mut self.state;
        s.aux_res_psi = pipes.brake_line1_psi;
        s.emerg_res_psi = s.emerg_res_psi.max(pipes.brake_line1_psi);
        s.auto_cyl_psi = 0.0;
        s.cyl_psi = 0.0;
        s.triple_valve = ValveState::Lap;
    }

    fn update(&mut self, pipes: &mut PipeState, _ctx: &UpdateContext, dt_s: f64) -> BrakeOutput {
        let prev = self.state.triple_valve;
        self.update_single_pipe(pipes, dt_s);
        self.finish_update(pipes, prev, dt_s)
    }

    fn cyl_psi(&self) -> f64 {
        self.state.cyl_psi
    }

    fn set_retainer(&mut self, setting: RetainerSetting) {
        let (threshold, rate) = setting.threshold_and_rate(
            self.params.retainer_positions,
            self.params.max_release_rate_psi_per_sec,
        );
        self.state.retainer_threshold_psi = threshold;
        self.state.release_rate_psi_per_sec = rate;
    }

    fn normalize_pressures(&mut self, pipes: &mut PipeState, max_pressure: f64, _atmosphere_psi: f64) {
        let max = max_pressure.max(0.0);
        pipes.brake_line1_psi = pipes.brake_line1_psi.min(max);
        self.state.aux_res_psi = self.state.aux_res_psi.min(max);
        self.state.emerg_res_psi = self.state.emerg_res_psi.min(max);
    }

    fn is_braking(&self) -> bool {
        self.state.auto_cyl_psi > self.max_cyl_psi() * BRAKING_CYL_FRACTION
    }

    fn max_handbrake_force(&self) -> si::Force {
        self.params.max_handbrake_force
    }

    fn status(&self, pipes: &PipeState, unit: PressureUnit, _atmosphere_psi: f64) -> String {
        format!(
            "BC {} {} BP {}",
            unit.format(self.state.cyl_psi),
            self.state.triple_valve,
            unit.format(pipes.brake_line1_psi)
        )
    }

    fn debug_columns(&self, _atmosphere_psi: f64) -> Vec<String> {
        let s = &self.state;
        vec![
            format!("{:.1}", s.cyl_psi),
            format!("{:.1}", s.aux_res_psi),
            format!("{:.1}", s.emerg_res_psi),
            format!("{:.0}", s.full_serv_psi),
            format!("{:.0}", s.retainer_threshold_psi),
            s.triple_valve.to_string(),
        ]
    }
}
