use super::*;

fn wagon(bp: f64) -> PipeSnapshot {
    PipeSnapshot {
        brake_line1_psi: bp,
        ..Default::default()
    }
}

fn loco(bp: f64) -> PipeSnapshot {
    PipeSnapshot {
        brake_line1_psi: bp,
        loco: Some(LocoSnapshot {
            main_res_psi: 130.0,
            main_res_volume: 0.3 * uc::M3,
        }),
        ..Default::default()
    }
}

/// Canonical coupling: inner hoses connected, inner cocks open, end cocks closed
fn couple(cars: &mut [PipeSnapshot]) {
    let n = cars.len();
    for (i, car) in cars.iter_mut().enumerate() {
        car.front_brake_hose_connected = i > 0;
        car.angle_cock_a_open = i > 0;
        car.angle_cock_b_open = i + 1 < n;
    }
}

fn command(bp: f64) -> TrainBrakeCommand {
    TrainBrakeCommand {
        brake_line1_psi_or_inhg: bp,
        ..Default::default()
    }
}

fn inputs<'a>(
    command: &'a TrainBrakeCommand,
    supply: &'a LocoAirSupply,
    engine_brake_state: ValveState,
) -> PropagationInputs<'a> {
    PropagationInputs {
        command,
        lead: Some(LeadLoco {
            idx: 0,
            supply,
            engine_brake_state,
        }),
        medium: PipeMedium::Air,
        atmosphere_psi: pressure::ONE_ATMOSPHERE_PSI,
    }
}

fn apply(cars: &mut [PipeSnapshot], outcome: &PropagationOutcome) {
    for (car, assignment) in cars.iter_mut().zip(&outcome.assignments) {
        car.brake_line1_psi = assignment.brake_line1_psi;
        car.brake_line2_psi = assignment.brake_line2_psi;
        car.brake_line3_psi = assignment.brake_line3_psi;
        if let (Some(loco), Some(mr)) = (car.loco.as_mut(), assignment.main_res_psi) {
            loco.main_res_psi = mr;
        }
    }
}

#[test]
fn test_uniform_without_lead() {
    let cars = vec![wagon(50.0), wagon(70.0), wagon(0.0)];
    let command = TrainBrakeCommand {
        brake_line1_psi_or_inhg: 90.0,
        brake_line2_psi: 120.0,
        brake_line3_psi: 30.0,
        ..Default::default()
    };
    let inputs = PropagationInputs {
        command: &command,
        lead: None,
        medium: PipeMedium::Air,
        atmosphere_psi: pressure::ONE_ATMOSPHERE_PSI,
    };
    let outcome = propagate_brake_pressure(&cars, &inputs, 0.1).unwrap();
    assert_eq!(outcome.assignments.len(), 3);
    for assignment in &outcome.assignments {
        assert_eq!(assignment.brake_line1_psi, 90.0);
        assert_eq!(assignment.brake_line2_psi, 120.0);
        assert_eq!(assignment.brake_line3_psi, 0.0);
        assert!(!assignment.bail_off);
    }
}

#[test]
fn test_gradient_disabled_snaps_to_command() {
    let mut cars = vec![loco(90.0), wagon(90.0), wagon(90.0)];
    couple(&mut cars);
    let supply = LocoAirSupply {
        brake_pipe_charging_rate_psi_per_sec: 2000.0,
        ..Default::default()
    };
    let command = command(64.0);
    let outcome =
        propagate_brake_pressure(&cars, &inputs(&command, &supply, ValveState::Lap), 0.01).unwrap();
    assert!(outcome
        .assignments
        .iter()
        .all(|assignment| assignment.brake_line1_psi == 64.0));
}

#[test]
fn test_steady_state_is_unchanged() {
    let mut cars = vec![loco(90.0), wagon(90.0), wagon(90.0), wagon(90.0)];
    couple(&mut cars);
    let supply = LocoAirSupply::default();
    let command = command(90.0);
    let outcome =
        propagate_brake_pressure(&cars, &inputs(&command, &supply, ValveState::Lap), 0.5).unwrap();
    for assignment in &outcome.assignments {
        assert_eq!(assignment.brake_line1_psi, 90.0);
    }
}

#[test]
fn test_reduction_travels_down_the_train() {
    let mut cars: Vec<PipeSnapshot> = std::iter::once(loco(90.0))
        .chain((0..9).map(|_| wagon(90.0)))
        .collect();
    couple(&mut cars);
    let supply = LocoAirSupply::default();
    let command = command(64.0);
    let inputs = inputs(&command, &supply, ValveState::Lap);
    for _ in 0..5 {
        let outcome = propagate_brake_pressure(&cars, &inputs, 0.1).unwrap();
        apply(&mut cars, &outcome);
    }
    // pressure falls at the lead first and never undershoots the command
    for pair in cars.windows(2) {
        assert!(pair[0].brake_line1_psi <= pair[1].brake_line1_psi + 1e-9);
    }
    assert!(cars[0].brake_line1_psi < 90.0);
    assert!(cars.iter().all(|car| car.brake_line1_psi >= 64.0 - 1e-9));
}

#[test]
fn test_broken_hose_leaks_without_recharge() {
    let mut cars = vec![loco(90.0), wagon(90.0)];
    couple(&mut cars);
    cars[1].front_brake_hose_connected = false;
    cars[1].angle_cock_a_open = true;
    let supply = LocoAirSupply::default();
    let command = command(90.0);
    let inputs = inputs(&command, &supply, ValveState::Lap);

    let mut prev = cars[1].brake_line1_psi;
    for _ in 0..50 {
        let outcome = propagate_brake_pressure(&cars, &inputs, 0.1).unwrap();
        apply(&mut cars, &outcome);
        let bp = cars[1].brake_line1_psi;
        assert!(bp <= prev, "{bp} > {prev}");
        assert!(bp >= 0.0);
        prev = bp;
    }
    assert!(prev < 1.0);
}

#[test]
fn test_open_rear_cock_vents_last_car() {
    let mut cars = vec![loco(90.0), wagon(90.0), wagon(90.0)];
    couple(&mut cars);
    cars[2].angle_cock_b_open = true;
    let supply = LocoAirSupply {
        brake_pipe_charging_rate_psi_per_sec: 0.0,
        ..Default::default()
    };
    let command = command(90.0);
    let outcome =
        propagate_brake_pressure(&cars, &inputs(&command, &supply, ValveState::Lap), 0.1).unwrap();
    let bp: Vec<f64> = outcome
        .assignments
        .iter()
        .map(|assignment| assignment.brake_line1_psi)
        .collect();
    assert!(bp[2] < bp[1] && bp[1] < bp[0]);
}

#[test]
fn test_leak_rate() {
    let mut cars = vec![loco(90.0), wagon(90.0)];
    couple(&mut cars);
    let supply = LocoAirSupply {
        brake_pipe_charging_rate_psi_per_sec: 0.0,
        brake_pipe_leak_psi_per_sec: 1.0,
        ..Default::default()
    };
    let command = command(90.0);
    let outcome =
        propagate_brake_pressure(&cars, &inputs(&command, &supply, ValveState::Lap), 1.0).unwrap();
    for assignment in &outcome.assignments {
        assert!(almost_eq(assignment.brake_line1_psi, 89.0, Some(1e-9)));
    }
}

#[test]
fn test_lead_charging_draws_main_reservoir() {
    let mut cars = vec![loco(70.0), wagon(70.0)];
    couple(&mut cars);
    let supply = LocoAirSupply::default();
    let command = command(90.0);
    let outcome =
        propagate_brake_pressure(&cars, &inputs(&command, &supply, ValveState::Lap), 0.5).unwrap();
    assert!(outcome.assignments[0].brake_line1_psi > 70.0);
    assert!(outcome.assignments[1].brake_line1_psi > 70.0);
    let mr = outcome.assignments[0].main_res_psi.unwrap();
    assert!(mr < 130.0);
}

#[test]
fn test_main_reservoir_pipe_pooled() {
    let mut cars = vec![loco(90.0), wagon(90.0), wagon(90.0), wagon(90.0)];
    couple(&mut cars);
    for (car, line2) in cars.iter_mut().zip([130.0, 100.0, 110.0, 120.0]) {
        car.two_pipes = true;
        car.brake_line2_psi = line2;
    }
    let vol = cars[0].brake_pipe_volume.get::<si::cubic_meter>();
    let mr_vol = 0.3;
    let expected = (vol * (130.0 + 100.0 + 110.0 + 120.0) + mr_vol * 130.0) / (4.0 * vol + mr_vol);

    let supply = LocoAirSupply::default();
    let command = command(90.0);
    let outcome =
        propagate_brake_pressure(&cars, &inputs(&command, &supply, ValveState::Lap), 0.1).unwrap();
    for assignment in &outcome.assignments {
        assert!(almost_eq(assignment.brake_line2_psi, expected, Some(1e-9)));
    }
    assert!(almost_eq(
        outcome.assignments[0].main_res_psi.unwrap(),
        expected,
        Some(1e-9)
    ));
    assert!(almost_eq(outcome.brake_line2_psi, expected, Some(1e-9)));
}

#[test]
fn test_open_main_reservoir_pipe_reads_zero() {
    let mut cars = vec![loco(90.0), wagon(90.0), wagon(90.0)];
    couple(&mut cars);
    for car in cars.iter_mut() {
        car.two_pipes = true;
        car.brake_line2_psi = 120.0;
    }
    cars[2].angle_cock_b_open = true;
    let supply = LocoAirSupply {
        brake_pipe_charging_rate_psi_per_sec: 0.0,
        ..Default::default()
    };
    let command = command(90.0);
    let outcome =
        propagate_brake_pressure(&cars, &inputs(&command, &supply, ValveState::Lap), 0.1).unwrap();
    assert!(outcome
        .assignments
        .iter()
        .all(|assignment| assignment.brake_line2_psi == 0.0));
    // the locomotive keeps its main reservoir
    assert_eq!(outcome.assignments[0].main_res_psi, None);
}

#[test]
fn test_single_pipe_wagons_have_no_main_reservoir_pipe() {
    let mut cars = vec![loco(90.0), wagon(90.0)];
    couple(&mut cars);
    cars[1].brake_line2_psi = 50.0;
    let supply = LocoAirSupply::default();
    let command = command(90.0);
    let outcome =
        propagate_brake_pressure(&cars, &inputs(&command, &supply, ValveState::Lap), 0.1).unwrap();
    assert_eq!(outcome.assignments[1].brake_line2_psi, 0.0);
    assert!(outcome.assignments[0].brake_line2_psi > 0.0);
}

#[test]
fn test_engine_brake_ramp_and_events() {
    let mut cars = vec![loco(90.0), loco(90.0), wagon(90.0)];
    couple(&mut cars);
    let supply = LocoAirSupply::default();
    let command = TrainBrakeCommand {
        brake_line3_psi: 50.0,
        ..command(90.0)
    };
    let outcome =
        propagate_brake_pressure(&cars, &inputs(&command, &supply, ValveState::Lap), 1.0).unwrap();
    // the apply rate is shared between the two locomotives
    assert!(almost_eq(outcome.assignments[0].brake_line3_psi, 6.25, None));
    assert!(almost_eq(outcome.assignments[1].brake_line3_psi, 6.25, None));
    assert_eq!(outcome.assignments[2].brake_line3_psi, 0.0);
    assert_eq!(outcome.engine_brake_state, ValveState::Apply);
    assert_eq!(outcome.events, vec![BrakeEvent::EngineBrakePressureIncrease]);

    // no repeated signal while the state holds
    apply(&mut cars, &outcome);
    let outcome = propagate_brake_pressure(
        &cars,
        &inputs(&command, &supply, outcome.engine_brake_state),
        1.0,
    )
    .unwrap();
    assert!(outcome.events.is_empty());

    apply(&mut cars, &outcome);
    let release = TrainBrakeCommand {
        brake_line3_psi: 0.0,
        ..command
    };
    let outcome = propagate_brake_pressure(
        &cars,
        &inputs(&release, &supply, outcome.engine_brake_state),
        10.0,
    )
    .unwrap();
    assert_eq!(outcome.assignments[0].brake_line3_psi, 0.0);
    assert_eq!(outcome.engine_brake_state, ValveState::Release);
    assert_eq!(outcome.events, vec![BrakeEvent::EngineBrakePressureDecrease]);
}

#[test]
fn test_bail_off_flags() {
    let mut cars = vec![loco(90.0), wagon(90.0)];
    couple(&mut cars);
    let dynamic = TrainBrakeCommand {
        dynamic_brake_percent: 40.0,
        ..command(90.0)
    };
    let supply = LocoAirSupply::default();
    let outcome =
        propagate_brake_pressure(&cars, &inputs(&dynamic, &supply, ValveState::Lap), 0.1).unwrap();
    assert!(!outcome.assignments[0].bail_off);

    let auto = LocoAirSupply {
        dynamic_brake_auto_bail_off: true,
        ..Default::default()
    };
    let outcome =
        propagate_brake_pressure(&cars, &inputs(&dynamic, &auto, ValveState::Lap), 0.1).unwrap();
    assert!(outcome.assignments[0].bail_off);
    assert!(!outcome.assignments[1].bail_off);

    let manual = TrainBrakeCommand {
        bail_off: true,
        ..command(90.0)
    };
    let outcome =
        propagate_brake_pressure(&cars, &inputs(&manual, &supply, ValveState::Lap), 0.1).unwrap();
    assert!(outcome.assignments[0].bail_off);
}

#[test]
fn test_vacuum_pipe_follows_ejector() {
    let atm = pressure::ONE_ATMOSPHERE_PSI;
    let released = pressure::vacuum_to_psia(21.0, atm);
    let mut cars = vec![loco(released), wagon(released), wagon(released)];
    couple(&mut cars);
    let supply = LocoAirSupply::vacuum();
    // driver destroys the vacuum to apply
    let command = command(0.0);
    let inputs = PropagationInputs {
        command: &command,
        lead: Some(LeadLoco {
            idx: 0,
            supply: &supply,
            engine_brake_state: ValveState::Lap,
        }),
        medium: PipeMedium::Vacuum,
        atmosphere_psi: atm,
    };
    let outcome = propagate_brake_pressure(&cars, &inputs, 1.0).unwrap();
    let bp: Vec<f64> = outcome
        .assignments
        .iter()
        .map(|assignment| assignment.brake_line1_psi)
        .collect();
    assert!(bp.iter().all(|p| *p > released && *p <= atm + 1e-9));
    assert!(bp[0] >= bp[2]);
    assert!(outcome
        .assignments
        .iter()
        .all(|assignment| assignment.brake_line3_psi == 0.0 && assignment.main_res_psi.is_none()));
}

fn vacuum_inputs<'a>(
    command: &'a TrainBrakeCommand,
    supply: &'a LocoAirSupply,
) -> PropagationInputs<'a> {
    PropagationInputs {
        medium: PipeMedium::Vacuum,
        ..inputs(command, supply, ValveState::Lap)
    }
}

#[test]
fn test_vacuum_lead_uses_its_own_valve_rates() {
    let atm = pressure::ONE_ATMOSPHERE_PSI;
    let released = pressure::vacuum_to_psia(21.0, atm);
    let supply = LocoAirSupply::vacuum();
    let rates = VacuumPipeRates {
        apply_charging_rate_psi_per_sec: 1.0,
        release_time_factor: 2.0 * uc::S,
    };

    // application admits air at the car's rate, not the supply's
    let apply_command = command(0.0);
    let mut cars = vec![loco(released)];
    couple(&mut cars);
    let by_supply = propagate_brake_pressure(&cars, &vacuum_inputs(&apply_command, &supply), 1.0)
        .unwrap()
        .assignments[0]
        .brake_line1_psi;
    assert!(almost_eq(by_supply, released + 4.0, Some(1e-9)));
    cars[0].vacuum = Some(rates);
    let by_car = propagate_brake_pressure(&cars, &vacuum_inputs(&apply_command, &supply), 1.0)
        .unwrap()
        .assignments[0]
        .brake_line1_psi;
    assert!(almost_eq(by_car, released + 1.0, Some(1e-9)));

    // release decays with the car's ejector time factor
    let release_command = command(21.0);
    cars[0].brake_line1_psi = atm;
    let bp = propagate_brake_pressure(&cars, &vacuum_inputs(&release_command, &supply), 0.1)
        .unwrap()
        .assignments[0]
        .brake_line1_psi;
    let n_steps = (0.2_f64 / 0.003).ceil();
    let expected = atm * (1.0 - 0.1 / n_steps / 2.0).powf(n_steps);
    assert!(almost_eq(bp, expected, Some(1e-9)));
    assert!(bp > released);
}

#[test]
fn test_find_lead_locomotives() {
    let cars = vec![wagon(90.0), loco(90.0), loco(90.0), loco(90.0), wagon(90.0), loco(90.0)];
    assert_eq!(find_lead_locomotives(&cars, 2), (1, 3));
    assert_eq!(find_lead_locomotives(&cars, 5), (5, 5));
}

#[test]
fn test_bad_inputs_are_errors() {
    let cars = vec![loco(90.0)];
    let supply = LocoAirSupply::default();
    let command = command(90.0);
    assert!(
        propagate_brake_pressure(&cars, &inputs(&command, &supply, ValveState::Lap), -0.1)
            .is_err()
    );
    let mut bad_lead = inputs(&command, &supply, ValveState::Lap);
    bad_lead.lead = Some(LeadLoco {
        idx: 3,
        supply: &supply,
        engine_brake_state: ValveState::Lap,
    });
    assert!(propagate_brake_pressure(&cars, &bad_lead, 0.1).is_err());
}
