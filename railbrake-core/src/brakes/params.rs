use super::*;

/// Brake parameters of one car type as tabulated in a brake parameter CSV
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrakeCarParams {
    /// Unique user-defined identifier for the car type
    #[serde(alias = "Car Type")]
    pub car_type: String,
    /// Brake system name, e.g. `air_single_pipe`, `air_twin_pipe`, `ep` or
    /// `vacuum_single_pipe`
    #[serde(alias = "Brake System")]
    pub brake_system: String,
    /// Railcar length (between pulling-faces)
    #[serde(alias = "Length (m)")]
    pub length: si::Length,
    #[serde(alias = "Max Brake Force (N)")]
    pub max_brake_force: si::Force,
    #[serde(alias = "Max Handbrake Force (N)")]
    pub max_handbrake_force: si::Force,
    /// Max cylinder pressure for air brakes, max force pressure difference
    /// for vacuum brakes
    #[serde(alias = "Max Cylinder Pressure (psi)")]
    pub max_cyl_psi: f64,
    #[serde(alias = "Aux Cylinder Volume Ratio")]
    pub aux_cyl_volume_ratio: Option<f64>,
    #[serde(alias = "Aux Reservoir Volume (m^3)")]
    pub aux_res_volume: Option<si::Volume>,
    #[serde(alias = "Emergency Reservoir Volume (m^3)")]
    pub emerg_res_volume: Option<si::Volume>,
    #[serde(alias = "Max Release Rate (psi/s)")]
    pub max_release_rate_psi_per_sec: f64,
    #[serde(alias = "Max Application Rate (psi/s)")]
    pub max_application_rate_psi_per_sec: f64,
    #[serde(alias = "Max Aux Charging Rate (psi/s)")]
    pub max_aux_charging_rate_psi_per_sec: Option<f64>,
    #[serde(alias = "Emergency Reservoir Charging Rate (psi/s)")]
    pub emerg_res_charging_rate_psi_per_sec: Option<f64>,
    #[serde(alias = "Brake Valve")]
    pub brake_valve: Option<BrakeValveType>,
    #[serde(alias = "Retainer Positions")]
    pub retainer_positions: Option<u8>,
    /// Ejector time constant of vacuum braked cars driving the pipe
    #[serde(alias = "Release Time Factor (s)")]
    pub release_time_factor: Option<si::Time>,
}

pub type BrakeParamsMap = HashMap<String, BrakeCarParams>;

impl BrakeCarParams {
    fn air_params(&self) -> AirBrakeParams {
        let default = AirBrakeParams::default();
        AirBrakeParams {
            max_brake_force: self.max_brake_force,
            max_handbrake_force: self.max_handbrake_force,
            max_cyl_psi: self.max_cyl_psi,
            aux_cyl_volume_ratio: self
                .aux_cyl_volume_ratio
                .unwrap_or(default.aux_cyl_volume_ratio),
            aux_res_volume: self.aux_res_volume,
            emerg_res_volume: self.emerg_res_volume,
            max_release_rate_psi_per_sec: self.max_release_rate_psi_per_sec,
            max_application_rate_psi_per_sec: self.max_application_rate_psi_per_sec,
            max_aux_charging_rate_psi_per_sec: self
                .max_aux_charging_rate_psi_per_sec
                .unwrap_or(default.max_aux_charging_rate_psi_per_sec),
            emerg_res_charging_rate_psi_per_sec: self
                .emerg_res_charging_rate_psi_per_sec
                .unwrap_or(default.emerg_res_charging_rate_psi_per_sec),
            brake_valve: self.brake_valve.unwrap_or(default.brake_valve),
            retainer_positions: self.retainer_positions.unwrap_or(default.retainer_positions),
            mrp_aux_res_charging: default.mrp_aux_res_charging,
        }
    }

    fn vacuum_params(&self) -> VacuumBrakeParams {
        let default = VacuumBrakeParams::default();
        VacuumBrakeParams {
            max_brake_force: self.max_brake_force,
            max_handbrake_force: self.max_handbrake_force,
            max_force_pressure_psi: self.max_cyl_psi,
            max_release_rate_psi_per_sec: self.max_release_rate_psi_per_sec,
            max_application_rate_psi_per_sec: self.max_application_rate_psi_per_sec,
            release_time_factor: self.release_time_factor.unwrap_or(default.release_time_factor),
            ..default
        }
    }

    /// Builds and initializes the brake system this row describes
    pub fn to_brake_system(&self) -> anyhow::Result<BrakeSystem> {
        let topology: BrakeTopology = match BrakeTopology::from_name(&self.brake_system) {
            BrakeTopology::SinglePipe(_) => AirSinglePipe::new(self.air_params()).into(),
            BrakeTopology::TwinPipe(_) => AirTwinPipe::new(self.air_params()).into(),
            BrakeTopology::ElectroPneumatic(_) => ElectroPneumatic::new(self.air_params()).into(),
            BrakeTopology::Vacuum(_) => VacuumSinglePipe::new(self.vacuum_params()).into(),
        };
        let mut brake = BrakeSystem::from(topology);
        brake.set_car_length(self.length);
        brake
            .init()
            .with_context(|| format!("car type {:?}", self.car_type))?;
        brake.pipes.two_pipes = brake.topology.is_twin_pipe() || brake.topology.is_electro_pneumatic();
        Ok(brake)
    }
}

/// Reads a brake parameter table keyed by car type
pub fn import_brake_params<P: AsRef<Path>>(filename: P) -> anyhow::Result<BrakeParamsMap> {
    let file_read = File::open(filename.as_ref())
        .with_context(|| format!("Could not open file: {:?}", filename.as_ref()))?;
    let mut reader = csv::Reader::from_reader(file_read);
    let mut params_map = BrakeParamsMap::default();
    for result in reader.deserialize() {
        let params: BrakeCarParams = result?;
        params_map.insert(params.car_type.clone(), params);
    }
    Ok(params_map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brake_params_import() {
        let params = import_brake_params(Path::new("./src/brakes/test_brake_params.csv")).unwrap();
        assert_eq!(params.len(), 4);

        let freight = &params["Freight Wagon"];
        assert_eq!(freight.retainer_positions, Some(3));
        assert!(freight.aux_res_volume.is_none());
        let brake = freight.to_brake_system().unwrap();
        assert!(brake.topology.is_single_pipe());
        assert!(brake.brake_pipe_volume.is_some());
        let air = brake.topology.air().unwrap();
        assert_eq!(*air.ratios(), AirVolumeRatios::default());

        let coach = params["Coach"].to_brake_system().unwrap();
        assert!(coach.topology.is_twin_pipe());
        assert!(coach.pipes.two_pipes);
        let air = coach.topology.air().unwrap();
        assert_eq!(air.params.brake_valve, BrakeValveType::Distributor);
        assert!(air.ratios().aux_brake_line > 0.0);

        let emu = params["EMU Trailer"].to_brake_system().unwrap();
        assert!(emu.topology.is_electro_pneumatic());

        let vac = params["Vacuum Van"].to_brake_system().unwrap();
        assert!(vac.is_vacuum());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(import_brake_params("./src/brakes/does_not_exist.csv").is_err());
    }
}
