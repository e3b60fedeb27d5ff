use super::*;

fn air_car(topology: BrakeTopology) -> BrakeSystem {
    let mut brake = BrakeSystem::new(topology).unwrap();
    brake.set_car_length(15.0 * uc::M);
    brake.pipes.two_pipes = brake.topology.is_twin_pipe() || brake.topology.is_electro_pneumatic();
    if brake.is_vacuum() {
        let command = TrainBrakeCommand {
            brake_line1_psi_or_inhg: 21.0,
            ..Default::default()
        };
        brake.initialize(false, 21.0, 21.0, true, &command);
    } else {
        let command = TrainBrakeCommand {
            brake_line1_psi_or_inhg: 90.0,
            brake_line2_psi: 130.0,
            ..Default::default()
        };
        brake.initialize(false, 90.0, 50.0, false, &command);
    }
    brake
}

fn all_topologies() -> Vec<BrakeTopology> {
    vec![
        AirSinglePipe::default().into(),
        AirTwinPipe::default().into(),
        ElectroPneumatic::default().into(),
        VacuumSinglePipe::default().into(),
    ]
}

fn dt() -> si::Time {
    0.1 * uc::S
}

#[test]
fn test_pinned_brake_pipe_applies_at_max_rate() {
    let mut brake = air_car(AirSinglePipe::default().into());
    let ctx = UpdateContext::default();
    let mut states = vec![];
    for _ in 0..100 {
        brake.pipes.brake_line1_psi = 50.0;
        brake.update(dt(), &ctx).unwrap();
        states.push(brake.topology.air().unwrap().state.triple_valve);
    }
    let air = brake.topology.air().unwrap();
    // aux and cylinder would equalize at 90 * 2.5 / 3.5
    let equilibrium = 90.0 * 2.5 / 3.5;
    assert!(air.state.auto_cyl_psi <= equilibrium);
    assert!(almost_eq(air.state.auto_cyl_psi, 9.0, Some(1e-6)));
    assert!(air.state.aux_res_psi > air.state.auto_cyl_psi);
    assert!(states.iter().all(|state| state.is_apply()));
}

#[test]
fn test_service_application_settles_to_lap() {
    let mut brake = air_car(AirSinglePipe::default().into());
    let ctx = UpdateContext::default();
    let mut events = vec![];
    for _ in 0..400 {
        brake.pipes.brake_line1_psi = 80.0;
        events.extend(brake.update(dt(), &ctx).unwrap());
    }
    let air = brake.topology.air().unwrap();
    assert_eq!(air.state.triple_valve, ValveState::Lap);
    assert!(almost_eq(brake.cyl_pressure_psi(), 25.0, Some(1e-6)));
    assert_eq!(events, vec![BrakeEvent::TrainBrakePressureIncrease]);
    assert!(brake.is_braking());
    assert!(brake.force > si::Force::ZERO);
}

#[test]
fn test_idempotent_at_equilibrium() {
    for topology in all_topologies() {
        let mut brake = air_car(topology);
        let before = brake.clone();
        brake.update(si::Time::ZERO, &UpdateContext::default()).unwrap();
        assert_eq!(brake.pipes, before.pipes, "{}", brake.topology.name());
        assert_eq!(brake.topology, before.topology, "{}", brake.topology.name());
    }
}

#[test]
fn test_pressures_stay_in_range() {
    // deterministic pseudo random brake pipe commands
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        (seed % 10_000) as f64 / 10_000.0
    };
    for topology in all_topologies() {
        let mut brake = air_car(topology);
        let max_bp = if brake.is_vacuum() {
            pressure::ONE_ATMOSPHERE_PSI
        } else {
            95.0
        };
        let ctx = UpdateContext {
            brake_line4: 0.5,
            ..Default::default()
        };
        for i in 0..3000 {
            if i % 50 == 0 {
                brake.pipes.brake_line1_psi = next() * max_bp;
                brake.pipes.brake_line2_psi = next() * 140.0;
                brake.pipes.brake_line3_psi = if next() > 0.8 { next() * 60.0 } else { 0.0 };
            }
            brake.update(dt(), &ctx).unwrap();
            assert!(brake.pipes.brake_line1_psi >= 0.0);
            assert!(brake.pipes.brake_line2_psi >= 0.0);
            assert!(brake.force >= si::Force::ZERO);
            if let Some(air) = brake.topology.air() {
                let s = &air.state;
                assert!(s.auto_cyl_psi >= 0.0 && s.auto_cyl_psi <= air.max_cyl_psi());
                assert!(s.aux_res_psi >= 0.0);
                assert!(s.emerg_res_psi >= 0.0);
                assert!(s.aux_res_psi.is_finite() && s.emerg_res_psi.is_finite());
            }
        }
    }
}

#[test]
fn test_negative_time_step_is_error() {
    let mut brake = air_car(AirSinglePipe::default().into());
    assert!(brake
        .update(-1.0 * uc::S, &UpdateContext::default())
        .is_err());
}

#[test]
fn test_handbrake_floors_force() {
    let params = AirBrakeParams {
        max_handbrake_force: 30.0 * uc::KN,
        ..Default::default()
    };
    let mut brake = air_car(AirSinglePipe::new(params).into());
    brake.set_handbrake_percent(150.0);
    assert_eq!(brake.pipes.handbrake_percent, 100.0);
    brake.set_handbrake_percent(50.0);
    brake.update(dt(), &UpdateContext::default()).unwrap();
    assert!(almost_eq_uom(&brake.force, &(15.0 * uc::KN), None));
    assert!(brake.full_status(None, PressureUnit::Psi, pressure::ONE_ATMOSPHERE_PSI)
        .contains("Handbrake 50%"));

    // handbrake_on only applies to cars fitted with one
    let mut unfitted = air_car(AirSinglePipe::default().into());
    unfitted.initialize(true, 90.0, 50.0, false, &TrainBrakeCommand::default());
    assert!(!unfitted.handbrake_status());
    unfitted.set_handbrake_percent(50.0);
    assert_eq!(unfitted.pipes.handbrake_percent, 0.0);
}

#[test]
fn test_retainer_settings() {
    use RetainerSetting::*;
    assert_eq!(Exhaust.threshold_and_rate(4, 1.86), (0.0, 1.86));
    assert_eq!(HighPressure.threshold_and_rate(3, 1.86), (20.0, 30.0 / 90.0));
    assert_eq!(LowPressure.threshold_and_rate(4, 1.86), (10.0, 40.0 / 60.0));
    assert_eq!(LowPressure.threshold_and_rate(3, 1.86), (20.0, 30.0 / 90.0));
    assert_eq!(LowPressure.threshold_and_rate(0, 1.86), (0.0, 1.86));
    assert_eq!(SlowDirect.threshold_and_rate(0, 1.86), (0.0, 40.0 / 86.0));
}

#[test]
fn test_save_restore_round_trip() {
    for topology in all_topologies() {
        let mut brake = air_car(topology.clone());
        brake.pipes.brake_line1_psi = 70.0;
        for _ in 0..20 {
            brake.update(dt(), &UpdateContext::default()).unwrap();
        }
        brake.pipes.angle_cock_b_open = true;
        let mut buf = vec![];
        brake.save(&mut buf).unwrap();

        let mut restored = air_car(topology);
        restored.restore(&mut buf.as_slice()).unwrap();
        assert_eq!(restored.pipes, brake.pipes);
        assert_eq!(restored.topology, brake.topology);
    }
}

#[test]
fn test_restore_into_other_topology_fails() {
    let topologies = all_topologies();
    for (i, saved_topology) in topologies.iter().enumerate() {
        let saved = air_car(saved_topology.clone());
        let mut buf = vec![];
        saved.save(&mut buf).unwrap();
        for other in topologies.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, t)| t) {
            let mut brake = air_car(other.clone());
            let before = brake.clone();
            assert!(
                brake.restore(&mut buf.as_slice()).is_err(),
                "{} restored into {}",
                saved_topology.name(),
                other.name()
            );
            assert_eq!(brake, before);
        }
    }
}

#[test]
fn test_restore_twin_pipe_into_single_pipe_fails() {
    let mut twin = air_car(AirTwinPipe::default().into());
    twin.pipes.brake_line1_psi = 70.0;
    twin.update(dt(), &UpdateContext::default()).unwrap();
    let mut buf = vec![];
    twin.save(&mut buf).unwrap();
    let mut single = air_car(AirSinglePipe::default().into());
    assert!(single.restore(&mut buf.as_slice()).is_err());
}

#[test]
fn test_topology_from_name() {
    assert!(BrakeTopology::from_name("Vacuum_single_pipe").is_vacuum());
    assert!(BrakeTopology::from_name("EP").is_electro_pneumatic());
    assert!(BrakeTopology::from_name("air_twin_pipe").is_twin_pipe());
    assert!(BrakeTopology::from_name("air_single_pipe").is_single_pipe());
    assert!(BrakeTopology::from_name("").is_single_pipe());
}

#[test]
fn test_internal_pressure() {
    let atm = pressure::ONE_ATMOSPHERE_PSI;
    let air = air_car(AirSinglePipe::default().into());
    assert_eq!(air.internal_pressure(72.0, atm), 72.0);
    let vac = air_car(VacuumSinglePipe::default().into());
    assert!(almost_eq(
        vac.internal_pressure(21.0, atm),
        pressure::vacuum_to_psia(21.0, atm),
        None
    ));
}

#[test]
fn test_status_strings() {
    let atm = pressure::ONE_ATMOSPHERE_PSI;
    let brake = air_car(AirTwinPipe::default().into());
    assert!(brake.status(PressureUnit::Psi, atm).contains("MRP"));
    let columns = brake.debug_status(atm);
    assert_eq!(columns.last().map(String::as_str), Some("A- B-"));
    let ep = air_car(ElectroPneumatic::default().into());
    assert!(ep.status(PressureUnit::Bar, atm).contains("EP"));
}

#[test]
fn test_normalize_pressures() {
    let mut brake = air_car(AirSinglePipe::default().into());
    brake.normalize_pressures(72.5, pressure::ONE_ATMOSPHERE_PSI);
    let air = brake.topology.air().unwrap();
    assert_eq!(brake.pipes.brake_line1_psi, 72.5);
    assert_eq!(air.state.aux_res_psi, 72.5);
    assert_eq!(air.state.emerg_res_psi, 72.5);
}

#[test]
fn test_config_round_trip() {
    let brake = air_car(AirTwinPipe::default().into());
    let yaml = brake.to_yaml().unwrap();
    let from_yaml = BrakeSystem::from_yaml(&yaml, false).unwrap();
    assert_eq!(from_yaml.topology, brake.topology);
    assert_eq!(from_yaml.pipes, brake.pipes);
}
