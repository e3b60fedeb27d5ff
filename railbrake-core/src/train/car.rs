use super::*;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, HistoryVec)]
/// Per-tick brake quantities of one car
pub struct BrakeCarState {
    /// Update counter
    pub i: usize,
    pub brake_force: si::Force,
    pub cyl_psi: f64,
    pub brake_line1_psi: f64,
    pub brake_line2_psi: f64,
}

impl Init for BrakeCarState {}
impl SerdeAPI for BrakeCarState {}

/// Rail vehicle as seen by the brake core
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrakeCar {
    /// User-defined identifier of the car type
    #[serde(default)]
    pub car_type: String,
    /// Length between pulling faces, sets the brake pipe volume
    pub length: si::Length,
    /// Air supply, present on locomotives only
    #[serde(default)]
    pub loco: Option<LocoAirSupply>,
    pub brake: BrakeSystem,
    #[serde(default)]
    pub state: BrakeCarState,
    #[serde(default)]
    /// Custom vector of [Self::state]
    pub history: BrakeCarStateHistoryVec,
    #[serde(default)]
    save_interval: Option<usize>,
}

impl Init for BrakeCar {
    fn init(&mut self) -> Result<(), Error> {
        self.loco.init()?;
        self.brake.set_car_length(self.length);
        self.brake.init()?;
        Ok(())
    }
}
impl SerdeAPI for BrakeCar {}

impl BrakeCar {
    pub fn new(
        car_type: impl Into<String>,
        length: si::Length,
        brake: BrakeSystem,
        loco: Option<LocoAirSupply>,
    ) -> anyhow::Result<Self> {
        let mut car = Self {
            car_type: car_type.into(),
            length,
            loco,
            brake,
            state: Default::default(),
            history: Default::default(),
            save_interval: None,
        };
        car.init()?;
        Ok(car)
    }

    /// Builds a car from a row of a brake parameter table
    pub fn from_params(params: &BrakeCarParams, loco: Option<LocoAirSupply>) -> anyhow::Result<Self> {
        Self::new(
            params.car_type.clone(),
            params.length,
            params.to_brake_system()?,
            loco,
        )
    }

    pub fn is_locomotive(&self) -> bool {
        self.loco.is_some()
    }

    pub fn set_save_interval(&mut self, save_interval: Option<usize>) {
        self.save_interval = save_interval;
    }

    pub fn get_save_interval(&self) -> Option<usize> {
        self.save_interval
    }

    pub(super) fn snapshot(&self) -> PipeSnapshot {
        let pipes = &self.brake.pipes;
        PipeSnapshot {
            brake_line1_psi: pipes.brake_line1_psi,
            brake_line2_psi: pipes.brake_line2_psi,
            brake_line3_psi: pipes.brake_line3_psi,
            brake_pipe_volume: self
                .brake
                .brake_pipe_volume
                .unwrap_or_else(|| brakes::brake_pipe_volume(self.length)),
            front_brake_hose_connected: pipes.front_brake_hose_connected,
            angle_cock_a_open: pipes.angle_cock_a_open,
            angle_cock_b_open: pipes.angle_cock_b_open,
            two_pipes: pipes.two_pipes,
            loco: self.loco.as_ref().map(LocoAirSupply::snapshot),
            vacuum: match &self.brake.topology {
                BrakeTopology::Vacuum(vac) => Some(VacuumPipeRates {
                    apply_charging_rate_psi_per_sec: vac.params.max_application_rate_psi_per_sec,
                    release_time_factor: vac.params.release_time_factor,
                }),
                _ => None,
            },
        }
    }

    pub(super) fn apply(&mut self, assignment: &PipeAssignment) {
        let pipes = &mut self.brake.pipes;
        pipes.brake_line1_psi = assignment.brake_line1_psi;
        pipes.brake_line2_psi = assignment.brake_line2_psi;
        pipes.brake_line3_psi = assignment.brake_line3_psi;
        pipes.bail_off = assignment.bail_off;
        if let (Some(loco), Some(mr)) = (self.loco.as_mut(), assignment.main_res_psi) {
            loco.main_res_psi = mr;
        }
    }

    /// Runs the car's brake valves for one tick and records its state
    pub fn update(&mut self, dt: si::Time, ctx: &UpdateContext) -> anyhow::Result<Vec<BrakeEvent>> {
        let events = self
            .brake
            .update(dt, ctx)
            .with_context(|| format!("{}\ncar type {:?}", format_dbg!(), self.car_type))?;
        self.state.i += 1;
        self.state.brake_force = self.brake.force;
        self.state.cyl_psi = self.brake.cyl_pressure_psi();
        self.state.brake_line1_psi = self.brake.pipes.brake_line1_psi;
        self.state.brake_line2_psi = self.brake.pipes.brake_line2_psi;
        self.save_state();
        Ok(events)
    }

    /// Pushes the current state to history every `save_interval` updates
    pub fn save_state(&mut self) {
        if let Some(interval) = self.save_interval {
            if interval > 0 && self.state.i % interval == 0 {
                self.history.push(self.state.clone());
            }
        }
    }
}
