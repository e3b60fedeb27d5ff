//! Ordered chain of braked cars stepped one tick at a time.

use crate::brakes::{
    self, BrakeCarParams, BrakeEvent, BrakeSetup, BrakeSystem, BrakeTopology, UpdateContext,
    ValveState,
};
use crate::imports::*;
use crate::pipe::{
    self, LeadLoco, LocoSnapshot, PipeAssignment, PipeMedium, PipeSnapshot, PropagationInputs,
    VacuumPipeRates,
};
use crate::pressure::PressureUnit;
use rayon::prelude::*;

mod car;
mod locomotive;

pub use crate::brakes::TrainBrakeCommand;
pub use car::*;
pub use locomotive::*;

/// Brake event raised by one car during a tick
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarBrakeEvent {
    pub car_idx: usize,
    pub event: BrakeEvent,
}

fn default_atmosphere_psi() -> f64 {
    pressure::ONE_ATMOSPHERE_PSI
}

fn default_max_pressure() -> f64 {
    90.0
}

fn default_full_serv_pressure() -> f64 {
    64.0
}

/// Train of braked cars, front to rear
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrakeTrain {
    pub cars: Vec<BrakeCar>,
    /// Index of the car whose brake valve drives the brake pipe
    #[serde(default)]
    pub lead_idx: Option<usize>,
    #[serde(default)]
    pub command: TrainBrakeCommand,
    #[serde(default = "default_atmosphere_psi")]
    pub atmosphere_psi: f64,
    /// Equalizing reservoir pressure with the brake released, psi or inHg
    #[serde(default = "default_max_pressure")]
    pub max_pressure: f64,
    /// Equalizing reservoir pressure at full service, psi or inHg
    #[serde(default = "default_full_serv_pressure")]
    pub full_serv_pressure: f64,
    #[serde(default)]
    pub engine_brake_state: ValveState,
    /// Events raised during the latest [BrakeTrain::step]
    #[serde(skip)]
    pub events: Vec<CarBrakeEvent>,
}

impl Init for BrakeTrain {
    fn init(&mut self) -> Result<(), Error> {
        self.cars.init()?;
        if let Some(idx) = self.lead_idx {
            match self.cars.get(idx) {
                None => {
                    return Err(Error::InitError(format!(
                        "lead index {idx} out of range for {} cars",
                        self.cars.len()
                    )))
                }
                Some(car) if !car.is_locomotive() => {
                    return Err(Error::InitError(format!(
                        "lead car {idx} ({:?}) has no locomotive air supply",
                        car.car_type
                    )))
                }
                _ => {}
            }
        }
        let n_vacuum = self.cars.iter().filter(|car| car.brake.is_vacuum()).count();
        if n_vacuum > 0 && n_vacuum < self.cars.len() {
            return Err(Error::InitError(format!(
                "train mixes {n_vacuum} vacuum braked cars with {} air braked cars",
                self.cars.len() - n_vacuum
            )));
        }
        if self.lead_idx.is_none() && !self.cars.is_empty() {
            #[cfg(feature = "logging")]
            log::warn!("train has no lead locomotive, brake pipe pressures will be uniform");
        }
        Ok(())
    }
}
impl SerdeAPI for BrakeTrain {}

impl Default for BrakeTrain {
    fn default() -> Self {
        Self {
            cars: Vec::new(),
            lead_idx: None,
            command: TrainBrakeCommand::default(),
            atmosphere_psi: default_atmosphere_psi(),
            max_pressure: default_max_pressure(),
            full_serv_pressure: default_full_serv_pressure(),
            engine_brake_state: ValveState::default(),
            events: Vec::new(),
        }
    }
}

impl BrakeTrain {
    /// Couples `cars` in the canonical way and validates the result
    pub fn new(cars: Vec<BrakeCar>, lead_idx: Option<usize>) -> anyhow::Result<Self> {
        let mut train = Self {
            cars,
            lead_idx,
            ..Default::default()
        };
        train.connect_brake_hoses();
        train.init()?;
        Ok(train)
    }

    /// Builds a train from car types looked up in a brake parameter table.
    /// `locos` supplies the air supply of locomotives by position.
    pub fn from_params(
        params: &HashMap<String, BrakeCarParams>,
        car_types: &[&str],
        locos: &HashMap<usize, LocoAirSupply>,
        lead_idx: Option<usize>,
    ) -> anyhow::Result<Self> {
        let cars = car_types
            .iter()
            .enumerate()
            .map(|(idx, car_type)| {
                let row = params
                    .get(*car_type)
                    .with_context(|| format!("unknown car type {car_type:?}"))?;
                BrakeCar::from_params(row, locos.get(&idx).cloned())
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Self::new(cars, lead_idx)
    }

    pub fn medium(&self) -> PipeMedium {
        if self.cars.iter().any(|car| car.brake.is_vacuum()) {
            PipeMedium::Vacuum
        } else {
            PipeMedium::Air
        }
    }

    /// Connects every inner hose and opens the inner angle cocks; the cocks
    /// at both ends of the train are closed
    pub fn connect_brake_hoses(&mut self) {
        let n = self.cars.len();
        for (idx, car) in self.cars.iter_mut().enumerate() {
            let pipes = &mut car.brake.pipes;
            pipes.front_brake_hose_connected = idx > 0;
            pipes.angle_cock_a_open = idx > 0;
            pipes.angle_cock_b_open = idx + 1 < n;
        }
    }

    /// Index range of the locomotive consist around the lead
    pub fn find_lead_locomotives(&self) -> Option<(usize, usize)> {
        let lead_idx = self.lead_idx.filter(|idx| *idx < self.cars.len())?;
        let snapshots: Vec<PipeSnapshot> = self.cars.iter().map(BrakeCar::snapshot).collect();
        Some(pipe::find_lead_locomotives(&snapshots, lead_idx))
    }

    /// Charges every car to the released state at `max_pressure` with the
    /// given full service pressure; pressures are psi for air braked trains
    /// and inHg for vacuum braked ones
    pub fn initialize(
        &mut self,
        handbrake_on: bool,
        max_pressure: f64,
        full_serv_pressure: f64,
        immediate_release: bool,
    ) {
        self.max_pressure = max_pressure;
        self.full_serv_pressure = full_serv_pressure;
        self.command.brake_line1_psi_or_inhg = max_pressure;
        let setup = BrakeSetup {
            handbrake_on,
            max_pressure,
            full_serv_pressure,
            immediate_release,
            atmosphere_psi: self.atmosphere_psi,
        };
        for car in self.cars.iter_mut() {
            car.brake.initialize_with(&setup, &self.command);
        }
        self.engine_brake_state = ValveState::default();
        self.events.clear();
    }

    /// Places every car in the released running state
    pub fn initialize_moving(&mut self) {
        for car in self.cars.iter_mut() {
            car.brake
                .initialize_moving(&self.command, self.atmosphere_psi);
        }
        self.engine_brake_state = ValveState::default();
        self.events.clear();
    }

    /// Sets the commanded brake pipe pressure from a 0 to 100 % brake demand
    pub fn ai_set_percent(&mut self, percent: f64) {
        let vacuum = self.cars.iter().find_map(|car| match &car.brake.topology {
            BrakeTopology::Vacuum(vac) => Some(vac),
            _ => None,
        });
        self.command.brake_line1_psi_or_inhg = match vacuum {
            Some(vac) => vac.ai_vacuum_inhg(percent, self.atmosphere_psi),
            None => {
                let fraction = clamp_pct(percent) / 100.0;
                self.max_pressure - (self.max_pressure - self.full_serv_pressure) * fraction
            }
        };
    }

    /// Distributes the commanded pressures along the brake pipes for `dt`
    pub fn propagate_brake_pressure(&mut self, dt: si::Time) -> anyhow::Result<()> {
        let dt_s = dt.as_seconds().with_context(|| format_dbg!())?;
        for loco in self.cars.iter_mut().filter_map(|car| car.loco.as_mut()) {
            loco.charge_main_res(dt_s);
        }

        let snapshots: Vec<PipeSnapshot> = self.cars.iter().map(BrakeCar::snapshot).collect();
        let outcome = {
            let lead = match self.lead_idx {
                Some(idx) => Some(LeadLoco {
                    idx,
                    supply: self
                        .cars
                        .get(idx)
                        .and_then(|car| car.loco.as_ref())
                        .with_context(|| format!("{}\nlead car is not a locomotive", format_dbg!(idx)))?,
                    engine_brake_state: self.engine_brake_state,
                }),
                None => None,
            };
            let inputs = PropagationInputs {
                command: &self.command,
                lead,
                medium: self.medium(),
                atmosphere_psi: self.atmosphere_psi,
            };
            pipe::propagate_brake_pressure(&snapshots, &inputs, dt_s)?
        };

        for (car, assignment) in self.cars.iter_mut().zip(&outcome.assignments) {
            car.apply(assignment);
        }
        self.engine_brake_state = outcome.engine_brake_state;
        if let Some(car_idx) = self.lead_idx {
            self.events.extend(
                outcome
                    .events
                    .iter()
                    .map(|event| CarBrakeEvent { car_idx, event: *event }),
            );
        }
        Ok(())
    }

    /// Runs every car's brake valves for `dt`
    pub fn update(&mut self, dt: si::Time) -> anyhow::Result<()> {
        let ctx = UpdateContext {
            brake_line4: self.command.ep_demand(),
            atmosphere_psi: self.atmosphere_psi,
        };
        for (car_idx, car) in self.cars.iter_mut().enumerate() {
            let events = car
                .update(dt, &ctx)
                .with_context(|| format!("{}\n{}", format_dbg!(), format_dbg!(car_idx)))?;
            self.events
                .extend(events.into_iter().map(|event| CarBrakeEvent { car_idx, event }));
        }
        Ok(())
    }

    /// Propagates pipe pressures, then updates every car
    pub fn step(&mut self, dt: si::Time) -> anyhow::Result<()> {
        self.events.clear();
        self.propagate_brake_pressure(dt)?;
        self.update(dt)
    }

    /// Runs `n_steps` steps of `dt`
    pub fn walk(&mut self, dt: si::Time, n_steps: usize) -> anyhow::Result<()> {
        for i in 0..n_steps {
            self.step(dt)
                .with_context(|| format!("{}\ntime step: {}", format_dbg!(), i))?;
        }
        Ok(())
    }

    pub fn set_save_interval(&mut self, save_interval: Option<usize>) {
        for car in self.cars.iter_mut() {
            car.set_save_interval(save_interval);
        }
    }

    /// Full status line of every car, with the end of train pressure
    pub fn status(&self, unit: PressureUnit) -> Vec<String> {
        let last = self.cars.last().map(|car| &car.brake);
        self.cars
            .iter()
            .map(|car| car.brake.full_status(last, unit, self.atmosphere_psi))
            .collect()
    }
}

/// Steps several independent trains in parallel
pub fn step_trains(trains: &mut [BrakeTrain], dt: si::Time) -> anyhow::Result<()> {
    trains
        .par_iter_mut()
        .enumerate()
        .try_for_each(|(idx, train)| train.step(dt).with_context(|| format_dbg!(idx)))
}
