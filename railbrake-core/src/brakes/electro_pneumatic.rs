use super::*;
use crate::pressure::PressureUnit;
use std::cmp::Ordering;

/// Electro-pneumatic brake: a twin-pipe brake whose cylinder is additionally
/// driven to an electrically commanded pressure, fed from the main reservoir pipe
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ElectroPneumatic {
    pub twin: AirTwinPipe,
    /// State of the electrically operated application/release valves
    #[serde(default)]
    pub ep_valve: ValveState,
}

impl Init for ElectroPneumatic {
    fn init(&mut self) -> Result<(), Error> {
        self.twin.init()
    }
}

impl ElectroPneumatic {
    pub fn new(params: AirBrakeParams) -> Self {
        Self {
            twin: AirTwinPipe::new(params),
            ep_valve: ValveState::Lap,
        }
    }

    /// Cylinder pressure demanded by the electric command
    pub fn demand_psi(&self, brake_line4: f64) -> f64 {
        clamp_pct(brake_line4 * 100.0) / 100.0 * self.twin.air.state.full_serv_psi
    }

    pub(super) fn update_ep(
        &mut self,
        pipes: &mut PipeState,
        ctx: &UpdateContext,
        dt_s: f64,
    ) -> BrakeOutput {
        let demand = self.demand_psi(ctx.brake_line4);
        let prev_triple = self.twin.air.state.triple_valve;
        let prev_ep = self.ep_valve;

        if self.twin.air.state.auto_cyl_psi > demand {
            self.ep_valve = ValveState::Release;
            if self.twin.air.state.triple_valve.is_lap() {
                self.twin.air.state.triple_valve = ValveState::Release;
            }
        }

        self.twin.update_twin_pipe(pipes, demand, dt_s);

        let max_application = self.twin.air.params.max_application_rate_psi_per_sec;
        let ratios = *self.twin.air.ratios();
        // cylinder volume over brake pipe volume
        let cyl_line2 = ratios.aux_brake_line / ratios.aux_cyl;
        let s = &mut self.twin.air.state;
        match s.auto_cyl_psi.partial_cmp(&demand) {
            Some(Ordering::Less) => {
                self.ep_valve = ValveState::Apply;
                let mut dp = equalizing_rise(
                    pipes.brake_line2_psi,
                    s.auto_cyl_psi,
                    cyl_line2,
                    dt_s * max_application,
                );
                if s.auto_cyl_psi + dp > demand {
                    dp = demand - s.auto_cyl_psi;
                }
                pipes.brake_line2_psi -= dp * cyl_line2;
                s.auto_cyl_psi += dp;
            }
            Some(Ordering::Equal) => self.ep_valve = ValveState::Lap,
            _ => {}
        }

        let mut out = self.twin.air.finish_update(pipes, prev_triple, dt_s);
        if let Some(event) = self.ep_valve.train_brake_event(prev_ep) {
            if !out.events.contains(&event) {
                out.events.push(event);
            }
        }
        out
    }
}

impl BrakeTrait for ElectroPneumatic {
    fn initialize(&mut self, pipes: &mut PipeState, setup: &BrakeSetup, command: &TrainBrakeCommand) {
        self.twin.initialize(pipes, setup, command);
        self.ep_valve = ValveState::Lap;
    }

    fn initialize_moving(
        &mut self,
        pipes: &mut PipeState,
        command: &TrainBrakeCommand,
        atmosphere_psi: f64,
    ) {
        self.twin.initialize_moving(pipes, command, atmosphere_psi);
        self.ep_valve = ValveState::Lap;
    }

    fn update(&mut self, pipes: &mut PipeState, ctx: &UpdateContext, dt_s: f64) -> BrakeOutput {
        self.update_ep(pipes, ctx, dt_s)
    }

    fn cyl_psi(&self) -> f64 {
        self.twin.cyl_psi()
    }

    fn set_retainer(&mut self, setting: RetainerSetting) {
        self.twin.set_retainer(setting)
    }

    fn normalize_pressures(&mut self, pipes: &mut PipeState, max_pressure: f64, atmosphere_psi: f64) {
        self.twin.normalize_pressures(pipes, max_pressure, atmosphere_psi)
    }

    fn is_braking(&self) -> bool {
        self.twin.is_braking()
    }

    fn max_handbrake_force(&self) -> si::Force {
        self.twin.max_handbrake_force()
    }

    fn status(&self, pipes: &PipeState, unit: PressureUnit, atmosphere_psi: f64) -> String {
        format!("{} EP {}", self.twin.status(pipes, unit, atmosphere_psi), self.ep_valve)
    }

    fn debug_columns(&self, atmosphere_psi: f64) -> Vec<String> {
        let mut columns = self.twin.debug_columns(atmosphere_psi);
        columns.push(self.ep_valve.to_string());
        columns
    }
}
