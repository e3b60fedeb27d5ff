use super::*;

/// Air supply and brake valve characteristics of a locomotive.
///
/// Only the lead locomotive's brake valve drives the brake pipe; every
/// locomotive in the lead consist contributes its main reservoir to the main
/// reservoir pipe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocoAirSupply {
    /// Main reservoir pressure, gauge psi
    pub main_res_psi: f64,
    pub main_res_volume: si::Volume,
    /// Compressor cut-out pressure
    pub max_main_res_psi: f64,
    /// Compressor charging rate of the main reservoir
    #[serde(default)]
    pub main_res_charging_rate_psi_per_sec: f64,
    /// Brake pipe charging rate of the driver's brake valve.  Rates above
    /// [crate::pipe::GRADIENT_DISABLED_CHARGING_RATE_PSI_PER_SEC] make the
    /// whole pipe follow the command instantly.
    pub brake_pipe_charging_rate_psi_per_sec: f64,
    /// Time constant of a service reduction at the brake valve
    pub brake_service_time_factor: si::Time,
    /// Time constant of an emergency reduction at the brake valve
    pub brake_emergency_time_factor: si::Time,
    /// Time constant of the flow between adjacent cars
    pub brake_pipe_time_factor: si::Time,
    #[serde(default)]
    pub brake_pipe_leak_psi_per_sec: f64,
    pub engine_brake_apply_rate_psi_per_sec: f64,
    pub engine_brake_release_rate_psi_per_sec: f64,
    /// Dynamic braking bails off the automatic brake
    #[serde(default)]
    pub dynamic_brake_auto_bail_off: bool,
}

impl Default for LocoAirSupply {
    fn default() -> Self {
        Self {
            main_res_psi: 130.0,
            main_res_volume: 0.3 * uc::M3,
            max_main_res_psi: 130.0,
            main_res_charging_rate_psi_per_sec: 0.4,
            brake_pipe_charging_rate_psi_per_sec: 21.0,
            brake_service_time_factor: 1.009 * uc::S,
            brake_emergency_time_factor: 0.1 * uc::S,
            brake_pipe_time_factor: 0.003 * uc::S,
            brake_pipe_leak_psi_per_sec: 0.0,
            engine_brake_apply_rate_psi_per_sec: 12.5,
            engine_brake_release_rate_psi_per_sec: 12.5,
            dynamic_brake_auto_bail_off: false,
        }
    }
}

impl LocoAirSupply {
    /// Ejector driven supply of a vacuum braked locomotive.  The charging
    /// rate is how fast the ejector destroys vacuum on application and the
    /// service time factor how fast it recreates it.  A vacuum braked lead
    /// car's own application rate and release time factor take precedence.
    pub fn vacuum() -> Self {
        Self {
            brake_pipe_charging_rate_psi_per_sec: 4.0,
            brake_service_time_factor: 1.009 * uc::S,
            brake_emergency_time_factor: 0.1 * uc::S,
            brake_pipe_time_factor: 0.003 * uc::S,
            ..Default::default()
        }
    }

    /// Runs the compressor for `dt_s` seconds
    pub fn charge_main_res(&mut self, dt_s: f64) {
        if self.main_res_psi < self.max_main_res_psi {
            self.main_res_psi = (self.main_res_psi
                + dt_s * self.main_res_charging_rate_psi_per_sec)
                .min(self.max_main_res_psi);
        }
    }

    pub(super) fn snapshot(&self) -> LocoSnapshot {
        LocoSnapshot {
            main_res_psi: self.main_res_psi,
            main_res_volume: self.main_res_volume,
        }
    }
}

impl Valid for LocoAirSupply {}

impl ObjState for LocoAirSupply {
    fn validate(&self) -> ValidationResults {
        let mut errors = ValidationErrors::new();
        chk_num_gez_fin(&mut errors, self.main_res_psi, "Main reservoir pressure");
        si_chk_num_gtz_fin(&mut errors, &self.main_res_volume, "Main reservoir volume");
        chk_num_gez_fin(&mut errors, self.max_main_res_psi, "Max main reservoir pressure");
        chk_num_gez_fin(
            &mut errors,
            self.main_res_charging_rate_psi_per_sec,
            "Main reservoir charging rate",
        );
        chk_num_gez_fin(
            &mut errors,
            self.brake_pipe_charging_rate_psi_per_sec,
            "Brake pipe charging rate",
        );
        si_chk_num_gtz_fin(
            &mut errors,
            &self.brake_service_time_factor,
            "Brake service time factor",
        );
        si_chk_num_gtz_fin(
            &mut errors,
            &self.brake_emergency_time_factor,
            "Brake emergency time factor",
        );
        si_chk_num_gtz_fin(&mut errors, &self.brake_pipe_time_factor, "Brake pipe time factor");
        chk_num_gez_fin(&mut errors, self.brake_pipe_leak_psi_per_sec, "Brake pipe leak rate");
        chk_num_gez_fin(
            &mut errors,
            self.engine_brake_apply_rate_psi_per_sec,
            "Engine brake apply rate",
        );
        chk_num_gez_fin(
            &mut errors,
            self.engine_brake_release_rate_psi_per_sec,
            "Engine brake release rate",
        );
        errors.make_err()
    }
}

impl Init for LocoAirSupply {
    fn init(&mut self) -> Result<(), Error> {
        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compressor_stops_at_cut_out() {
        let mut supply = LocoAirSupply {
            main_res_psi: 129.9,
            ..Default::default()
        };
        supply.charge_main_res(1.0);
        assert_eq!(supply.main_res_psi, 130.0);
        supply.charge_main_res(1.0);
        assert_eq!(supply.main_res_psi, 130.0);
    }

    #[test]
    fn test_validate() {
        assert!(LocoAirSupply::valid().validate().is_ok());
        assert!(LocoAirSupply::vacuum().validate().is_ok());
        let bad = LocoAirSupply {
            brake_pipe_time_factor: si::Time::ZERO,
            main_res_volume: si::Volume::ZERO,
            ..Default::default()
        };
        assert_eq!(bad.validate().unwrap_err().len(), 2);
    }
}
