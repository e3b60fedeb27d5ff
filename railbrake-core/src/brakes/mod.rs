//! Per-car brake models.
//!
//! Each topology keeps its own reservoirs and valve logic behind
//! [BrakeTrait]; [BrakeSystem] pairs the active topology with the pipe
//! state every topology shares and applies the handbrake floor.

use crate::imports::*;

pub mod air_single_pipe;
pub mod air_twin_pipe;
pub mod command;
pub mod electro_pneumatic;
pub mod params;
pub mod transfer;
pub mod vacuum_single_pipe;
pub mod valve;

#[cfg(test)]
mod tests;

pub use air_single_pipe::*;
pub use air_twin_pipe::*;
pub use command::*;
pub use electro_pneumatic::*;
pub use params::*;
pub use transfer::*;
pub use vacuum_single_pipe::*;
pub use valve::*;

use crate::pressure::PressureUnit;
use std::io::{Read, Write};

/// Pipe and coupling state common to every brake topology.
///
/// Line pressures are gauge psi on air brakes and absolute psi on vacuum
/// brakes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipeState {
    /// Brake pipe
    pub brake_line1_psi: f64,
    /// Main reservoir pipe
    pub brake_line2_psi: f64,
    /// Engine brake pipe
    pub brake_line3_psi: f64,
    /// Driver is bailing off the automatic brake on this locomotive
    pub bail_off: bool,
    pub handbrake_percent: f64,
    pub front_brake_hose_connected: bool,
    /// Front angle cock
    pub angle_cock_a_open: bool,
    /// Rear angle cock
    pub angle_cock_b_open: bool,
    pub bleed_off_valve_open: bool,
    /// Car is fitted with a main reservoir pipe
    pub two_pipes: bool,
}

/// Arguments of [BrakeSystem::initialize].  Pressures are gauge psi for air
/// brakes and inHg vacuum for vacuum brakes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrakeSetup {
    pub handbrake_on: bool,
    pub max_pressure: f64,
    pub full_serv_pressure: f64,
    pub immediate_release: bool,
    pub atmosphere_psi: f64,
}

impl Default for BrakeSetup {
    fn default() -> Self {
        Self {
            handbrake_on: false,
            max_pressure: 90.0,
            full_serv_pressure: 64.0,
            immediate_release: false,
            atmosphere_psi: pressure::ONE_ATMOSPHERE_PSI,
        }
    }
}

/// Train-wide inputs a car reads during its own update
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpdateContext {
    /// Electro-pneumatic demand fraction
    pub brake_line4: f64,
    pub atmosphere_psi: f64,
}

impl Default for UpdateContext {
    fn default() -> Self {
        Self {
            brake_line4: 0.0,
            atmosphere_psi: pressure::ONE_ATMOSPHERE_PSI,
        }
    }
}

impl From<&TrainBrakeCommand> for UpdateContext {
    fn from(command: &TrainBrakeCommand) -> Self {
        Self {
            brake_line4: command.ep_demand(),
            ..Default::default()
        }
    }
}

/// Result of one car update
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BrakeOutput {
    /// Force from the cylinder alone, before the handbrake floor
    pub pneumatic_force: si::Force,
    pub events: Vec<BrakeEvent>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, IsVariant)]
/// Retainer valve handle position
pub enum RetainerSetting {
    #[default]
    Exhaust,
    HighPressure,
    LowPressure,
    SlowDirect,
}

impl RetainerSetting {
    /// Cylinder pressure held by the retainer and the release rate through
    /// it, given the number of positions the fitted retainer has.  Positions
    /// the retainer lacks fall back to the nearest one it has.
    pub fn threshold_and_rate(self, positions: u8, max_release_rate: f64) -> (f64, f64) {
        let exhaust = (0.0, max_release_rate);
        let high_pressure = (20.0, (50.0 - 20.0) / 90.0);
        match self {
            RetainerSetting::Exhaust => exhaust,
            RetainerSetting::HighPressure if positions > 0 => high_pressure,
            RetainerSetting::LowPressure if positions > 3 => (10.0, (50.0 - 10.0) / 60.0),
            RetainerSetting::LowPressure if positions > 0 => high_pressure,
            RetainerSetting::SlowDirect => (0.0, (50.0 - 10.0) / 86.0),
            _ => exhaust,
        }
    }
}

/// Operations every brake topology provides
pub trait BrakeTrait {
    /// Seeds reservoirs and pipes for a train at rest
    fn initialize(&mut self, pipes: &mut PipeState, setup: &BrakeSetup, command: &TrainBrakeCommand);
    /// Seeds reservoirs and pipes for a train starting at speed, brakes released
    fn initialize_moving(
        &mut self,
        pipes: &mut PipeState,
        command: &TrainBrakeCommand,
        atmosphere_psi: f64,
    );
    /// Runs the local valve logic for `dt_s` seconds after propagation has
    /// refreshed the pipe pressures
    fn update(&mut self, pipes: &mut PipeState, ctx: &UpdateContext, dt_s: f64) -> BrakeOutput;
    /// Cylinder pressure driving the brake force
    fn cyl_psi(&self) -> f64;
    fn set_retainer(&mut self, setting: RetainerSetting);
    /// Caps reservoirs at the pressure a new control mode regulates to
    fn normalize_pressures(&mut self, pipes: &mut PipeState, max_pressure: f64, atmosphere_psi: f64);
    fn is_braking(&self) -> bool;
    fn max_handbrake_force(&self) -> si::Force;
    /// Converts a commanded line 1 value into the unit this topology carries
    fn internal_pressure(&self, pressure: f64, _atmosphere_psi: f64) -> f64 {
        pressure
    }
    /// One-line status
    fn status(&self, pipes: &PipeState, unit: PressureUnit, atmosphere_psi: f64) -> String;
    /// Model specific debug columns
    fn debug_columns(&self, atmosphere_psi: f64) -> Vec<String>;
}

/// Active brake topology of a car
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, From, IsVariant, TryInto)]
pub enum BrakeTopology {
    SinglePipe(AirSinglePipe),
    TwinPipe(AirTwinPipe),
    ElectroPneumatic(ElectroPneumatic),
    Vacuum(VacuumSinglePipe),
}

impl Default for BrakeTopology {
    fn default() -> Self {
        Self::SinglePipe(AirSinglePipe::default())
    }
}

impl Init for BrakeTopology {
    fn init(&mut self) -> Result<(), Error> {
        match self {
            Self::SinglePipe(air) => air.init(),
            Self::TwinPipe(twin) => twin.init(),
            Self::ElectroPneumatic(ep) => ep.init(),
            Self::Vacuum(vac) => vac.init(),
        }
    }
}

impl BrakeTopology {
    fn as_dyn(&self) -> &dyn BrakeTrait {
        match self {
            Self::SinglePipe(air) => air,
            Self::TwinPipe(twin) => twin,
            Self::ElectroPneumatic(ep) => ep,
            Self::Vacuum(vac) => vac,
        }
    }

    fn as_dyn_mut(&mut self) -> &mut dyn BrakeTrait {
        match self {
            Self::SinglePipe(air) => air,
            Self::TwinPipe(twin) => twin,
            Self::ElectroPneumatic(ep) => ep,
            Self::Vacuum(vac) => vac,
        }
    }

    /// Single-pipe air state shared by every air topology
    pub fn air(&self) -> Option<&AirSinglePipe> {
        match self {
            Self::SinglePipe(air) => Some(air),
            Self::TwinPipe(twin) => Some(&twin.air),
            Self::ElectroPneumatic(ep) => Some(&ep.twin.air),
            Self::Vacuum(_) => None,
        }
    }

    pub fn air_mut(&mut self) -> Option<&mut AirSinglePipe> {
        match self {
            Self::SinglePipe(air) => Some(air),
            Self::TwinPipe(twin) => Some(&mut twin.air),
            Self::ElectroPneumatic(ep) => Some(&mut ep.twin.air),
            Self::Vacuum(_) => None,
        }
    }

    /// Topology with default parameters for a brake system name such as
    /// `"Air_single_pipe"`, `"air_twin_pipe"`, `"ep"` or `"vacuum_single_pipe"`
    pub fn from_name(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        if name.starts_with("vacuum") {
            VacuumSinglePipe::default().into()
        } else if name == "ep" {
            ElectroPneumatic::default().into()
        } else if name == "air_twin_pipe" {
            AirTwinPipe::default().into()
        } else {
            AirSinglePipe::default().into()
        }
    }
}

impl BrakeTrait for BrakeTopology {
    fn initialize(&mut self, pipes: &mut PipeState, setup: &BrakeSetup, command: &TrainBrakeCommand) {
        self.as_dyn_mut().initialize(pipes, setup, command)
    }
    fn initialize_moving(&mut self, pipes: &mut PipeState, command: &TrainBrakeCommand, atm: f64) {
        self.as_dyn_mut().initialize_moving(pipes, command, atm)
    }
    fn update(&mut self, pipes: &mut PipeState, ctx: &UpdateContext, dt_s: f64) -> BrakeOutput {
        self.as_dyn_mut().update(pipes, ctx, dt_s)
    }
    fn cyl_psi(&self) -> f64 {
        self.as_dyn().cyl_psi()
    }
    fn set_retainer(&mut self, setting: RetainerSetting) {
        self.as_dyn_mut().set_retainer(setting)
    }
    fn normalize_pressures(&mut self, pipes: &mut PipeState, max_pressure: f64, atm: f64) {
        self.as_dyn_mut().normalize_pressures(pipes, max_pressure, atm)
    }
    fn is_braking(&self) -> bool {
        self.as_dyn().is_braking()
    }
    fn max_handbrake_force(&self) -> si::Force {
        self.as_dyn().max_handbrake_force()
    }
    fn internal_pressure(&self, pressure: f64, atm: f64) -> f64 {
        self.as_dyn().internal_pressure(pressure, atm)
    }
    fn status(&self, pipes: &PipeState, unit: PressureUnit, atm: f64) -> String {
        self.as_dyn().status(pipes, unit, atm)
    }
    fn debug_columns(&self, atm: f64) -> Vec<String> {
        self.as_dyn().debug_columns(atm)
    }
}

/// Minimum car length used for the brake pipe volume
pub const MIN_BRAKE_PIPE_LENGTH_M: f64 = 5.0;
/// Inner diameter of the brake pipe
pub const BRAKE_PIPE_DIAMETER_M: f64 = 0.032;

/// Brake pipe volume of a car of the given length
pub fn brake_pipe_volume(car_length: si::Length) -> si::Volume {
    let length_m = car_length.get::<si::meter>();
    let length_m = if length_m.is_finite() { length_m } else { 0.0 };
    let radius_m = BRAKE_PIPE_DIAMETER_M / 2.0;
    radius_m * radius_m * std::f64::consts::PI * MIN_BRAKE_PIPE_LENGTH_M.max(1.0 + length_m) * uc::M3
}

/// Brake equipment of one car: the active topology plus its pipe state
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrakeSystem {
    pub topology: BrakeTopology,
    #[serde(default)]
    pub pipes: PipeState,
    /// Brake pipe volume, derived from car length when unset
    #[serde(default)]
    pub brake_pipe_volume: Option<si::Volume>,
    /// Brake force computed by the latest update
    #[serde(skip)]
    pub force: si::Force,
}

impl Init for BrakeSystem {
    fn init(&mut self) -> Result<(), Error> {
        self.topology.init()?;
        if let Some(vol) = self.brake_pipe_volume {
            let mut errors = ValidationErrors::new();
            si_chk_num_gez_fin(&mut errors, &vol, "Brake pipe volume");
            errors.make_err()?;
        }
        let vol = self
            .brake_pipe_volume
            .unwrap_or_else(|| brake_pipe_volume(si::Length::ZERO));
        if let Some(air) = self.topology.air_mut() {
            air.init_ratios(vol);
        }
        self.pipes.handbrake_percent = clamp_pct(self.pipes.handbrake_percent);
        Ok(())
    }
}

impl SerdeAPI for BrakeSystem {}

impl From<BrakeTopology> for BrakeSystem {
    fn from(topology: BrakeTopology) -> Self {
        Self {
            topology,
            ..Default::default()
        }
    }
}

/// Mutable state written by [BrakeSystem::save], in a fixed field order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct SavedBrakeState {
    pipes: PipeState,
    model: SavedModelState,
}

impl Init for SavedBrakeState {}
impl SerdeAPI for SavedBrakeState {}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum SavedModelState {
    SinglePipe(AirBrakeState),
    TwinPipe(AirBrakeState),
    ElectroPneumatic(AirBrakeState, ValveState),
    Vacuum(VacuumBrakeState),
}

impl BrakeSystem {
    pub fn new(topology: BrakeTopology) -> anyhow::Result<Self> {
        let mut brake = Self::from(topology);
        brake.init()?;
        Ok(brake)
    }

    /// Sets the brake pipe volume from the car length unless configured
    /// explicitly, and resolves the volume ratios against it
    pub fn set_car_length(&mut self, car_length: si::Length) {
        let vol = *self
            .brake_pipe_volume
            .get_or_insert_with(|| brake_pipe_volume(car_length));
        if let Some(air) = self.topology.air_mut() {
            air.init_ratios(vol);
        }
    }

    pub fn is_vacuum(&self) -> bool {
        self.topology.is_vacuum()
    }

    pub fn initialize(
        &mut self,
        handbrake_on: bool,
        max_pressure: f64,
        full_serv_pressure: f64,
        immediate_release: bool,
        command: &TrainBrakeCommand,
    ) {
        self.initialize_with(
            &BrakeSetup {
                handbrake_on,
                max_pressure,
                full_serv_pressure,
                immediate_release,
                ..Default::default()
            },
            command,
        )
    }

    /// [BrakeSystem::initialize] with an explicit atmospheric reference
    pub fn initialize_with(&mut self, setup: &BrakeSetup, command: &TrainBrakeCommand) {
        self.topology.initialize(&mut self.pipes, setup, command);
        self.pipes.handbrake_percent =
            if setup.handbrake_on && self.topology.max_handbrake_force() > si::Force::ZERO {
                100.0
            } else {
                0.0
            };
        self.force = si::Force::ZERO;
    }

    pub fn initialize_moving(&mut self, command: &TrainBrakeCommand, atmosphere_psi: f64) {
        self.topology
            .initialize_moving(&mut self.pipes, command, atmosphere_psi);
        self.pipes.handbrake_percent = 0.0;
        self.force = si::Force::ZERO;
    }

    /// Runs the car's valve logic and returns the brake events raised
    pub fn update(&mut self, dt: si::Time, ctx: &UpdateContext) -> anyhow::Result<Vec<BrakeEvent>> {
        let dt_s = dt.as_seconds().with_context(|| format_dbg!())?;
        let out = self.topology.update(&mut self.pipes, ctx, dt_s);
        self.force = out.pneumatic_force.max(self.handbrake_force());
        Ok(out.events)
    }

    pub fn handbrake_force(&self) -> si::Force {
        self.topology.max_handbrake_force() * self.pipes.handbrake_percent / 100.0
    }

    pub fn set_handbrake_percent(&mut self, percent: f64) {
        self.pipes.handbrake_percent = if self.topology.max_handbrake_force() > si::Force::ZERO {
            clamp_pct(percent)
        } else {
            0.0
        };
    }

    pub fn handbrake_status(&self) -> bool {
        self.pipes.handbrake_percent > 0.0
    }

    pub fn set_retainer(&mut self, setting: RetainerSetting) {
        self.topology.set_retainer(setting)
    }

    pub fn cyl_pressure_psi(&self) -> f64 {
        self.topology.cyl_psi()
    }

    pub fn is_braking(&self) -> bool {
        self.topology.is_braking()
    }

    pub fn normalize_pressures(&mut self, max_pressure: f64, atmosphere_psi: f64) {
        self.topology
            .normalize_pressures(&mut self.pipes, max_pressure, atmosphere_psi)
    }

    /// Lowers the maximum cylinder pressure of air brakes to what a full
    /// application from `max_pressure_psi` can reach
    pub fn correct_max_cyl_pressure(&mut self, max_pressure_psi: f64) {
        if let Some(air) = self.topology.air_mut() {
            air.correct_max_cyl_pressure(max_pressure_psi);
        }
    }

    pub fn internal_pressure(&self, pressure: f64, atmosphere_psi: f64) -> f64 {
        self.topology.internal_pressure(pressure, atmosphere_psi)
    }

    pub fn status(&self, unit: PressureUnit, atmosphere_psi: f64) -> String {
        self.topology.status(&self.pipes, unit, atmosphere_psi)
    }

    /// Status of the whole brake with the end of train status appended when
    /// `last_car` is another car
    pub fn full_status(
        &self,
        last_car: Option<&BrakeSystem>,
        unit: PressureUnit,
        atmosphere_psi: f64,
    ) -> String {
        let mut s = self.status(unit, atmosphere_psi);
        if let Some(last) = last_car.filter(|last| !std::ptr::eq(*last, self)) {
            s.push_str(&format!(" EOT {}", last.status(unit, atmosphere_psi)));
        }
        if self.handbrake_status() {
            s.push_str(&format!(" Handbrake {:.0}%", self.pipes.handbrake_percent));
        }
        s
    }

    /// Model columns followed by handbrake, hose and angle cock columns
    pub fn debug_status(&self, atmosphere_psi: f64) -> Vec<String> {
        let mut columns = self.topology.debug_columns(atmosphere_psi);
        columns.push(if self.handbrake_status() {
            format!("{:.0}%", self.pipes.handbrake_percent)
        } else {
            String::new()
        });
        columns.push(if self.pipes.front_brake_hose_connected { "I" } else { "T" }.into());
        columns.push(format!(
            "A{} B{}",
            if self.pipes.angle_cock_a_open { "+" } else { "-" },
            if self.pipes.angle_cock_b_open { "+" } else { "-" },
        ));
        columns
    }

    fn saved_state(&self) -> SavedBrakeState {
        let model = match &self.topology {
            BrakeTopology::SinglePipe(air) => SavedModelState::SinglePipe(air.state.clone()),
            BrakeTopology::TwinPipe(twin) => SavedModelState::TwinPipe(twin.air.state.clone()),
            BrakeTopology::ElectroPneumatic(ep) => {
                SavedModelState::ElectroPneumatic(ep.twin.air.state.clone(), ep.ep_valve)
            }
            BrakeTopology::Vacuum(vac) => SavedModelState::Vacuum(vac.state.clone()),
        };
        SavedBrakeState {
            pipes: self.pipes.clone(),
            model,
        }
    }

    /// Writes exactly the mutable brake state
    pub fn save<W: Write>(&self, wtr: &mut W) -> anyhow::Result<()> {
        self.saved_state()
            .to_writer(wtr, "bin")
            .with_context(|| format_dbg!())
    }

    /// Reads state written by [BrakeSystem::save] for the same topology
    pub fn restore<R: Read>(&mut self, rdr: &mut R) -> anyhow::Result<()> {
        let saved =
            SavedBrakeState::from_reader(rdr, "bin", true).with_context(|| format_dbg!())?;
        match (&mut self.topology, saved.model) {
            (BrakeTopology::SinglePipe(air), SavedModelState::SinglePipe(state)) => {
                air.state = state
            }
            (BrakeTopology::TwinPipe(twin), SavedModelState::TwinPipe(state)) => {
                twin.air.state = state
            }
            (BrakeTopology::ElectroPneumatic(ep), SavedModelState::ElectroPneumatic(state, valve)) => {
                ep.twin.air.state = state;
                ep.ep_valve = valve;
            }
            (BrakeTopology::Vacuum(vac), SavedModelState::Vacuum(state)) => vac.state = state,
            (topology, model) => bail!(
                "{}\nsaved {model:?} does not match the {} brake",
                format_dbg!(),
                topology.name()
            ),
        }
        self.pipes = saved.pipes;
        Ok(())
    }
}

impl BrakeTopology {
    /// Short name used in messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::SinglePipe(_) => "air single pipe",
            Self::TwinPipe(_) => "air twin pipe",
            Self::ElectroPneumatic(_) => "electro-pneumatic",
            Self::Vacuum(_) => "vacuum",
        }
    }
}
