//! Train-wide brake pipe propagation.
//!
//! [propagate_brake_pressure] reads an immutable snapshot of every car's
//! pipe state and returns the pressures to write back, so a train can run it
//! once per tick before any car updates its own valves.  Car order is front
//! to rear; angle cock A is the front cock and cock B the rear one.

use crate::brakes::{BrakeEvent, TrainBrakeCommand, ValveState};
use crate::imports::*;
use crate::train::LocoAirSupply;

#[cfg(test)]
mod tests;

/// Charging rates above this disable the pressure gradient: every car's
/// brake pipe snaps straight to the commanded pressure
pub const GRADIENT_DISABLED_CHARGING_RATE_PSI_PER_SEC: f64 = 1000.0;

/// Main reservoir of a locomotive
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocoSnapshot {
    pub main_res_psi: f64,
    pub main_res_volume: si::Volume,
}

/// Brake valve rates of a vacuum braked car
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VacuumPipeRates {
    /// Rate at which the driver's valve admits air to the pipe, psi/s
    pub apply_charging_rate_psi_per_sec: f64,
    /// Time constant of the ejector exhausting the pipe
    pub release_time_factor: si::Time,
}

/// Read-only view of one car's pipes and couplings
#[derive(Clone, Debug, PartialEq)]
pub struct PipeSnapshot {
    pub brake_line1_psi: f64,
    pub brake_line2_psi: f64,
    pub brake_line3_psi: f64,
    pub brake_pipe_volume: si::Volume,
    pub front_brake_hose_connected: bool,
    pub angle_cock_a_open: bool,
    pub angle_cock_b_open: bool,
    pub two_pipes: bool,
    /// Present on locomotives
    pub loco: Option<LocoSnapshot>,
    /// Present on vacuum braked cars; overrides the lead supply rates when
    /// this car drives a vacuum pipe
    pub vacuum: Option<VacuumPipeRates>,
}

impl Default for PipeSnapshot {
    fn default() -> Self {
        Self {
            brake_line1_psi: 0.0,
            brake_line2_psi: 0.0,
            brake_line3_psi: 0.0,
            brake_pipe_volume: crate::brakes::brake_pipe_volume(si::Length::ZERO),
            front_brake_hose_connected: true,
            angle_cock_a_open: true,
            angle_cock_b_open: true,
            two_pipes: false,
            loco: None,
            vacuum: None,
        }
    }
}

/// Gas carried by the brake pipe
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, IsVariant)]
pub enum PipeMedium {
    /// Compressed air, gauge psi
    #[default]
    Air,
    /// Vacuum, absolute psi
    Vacuum,
}

/// Lead locomotive driving the brake pipe
#[derive(Clone, Copy, Debug)]
pub struct LeadLoco<'a> {
    /// Index of the lead locomotive in the car list
    pub idx: usize,
    pub supply: &'a LocoAirSupply,
    /// Engine brake state after the previous propagation
    pub engine_brake_state: ValveState,
}

/// Train-wide inputs of one propagation call
#[derive(Clone, Copy, Debug)]
pub struct PropagationInputs<'a> {
    pub command: &'a TrainBrakeCommand,
    /// `None` when the train has no lead locomotive
    pub lead: Option<LeadLoco<'a>>,
    pub medium: PipeMedium,
    pub atmosphere_psi: f64,
}

/// Pressures to write back to one car
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipeAssignment {
    pub brake_line1_psi: f64,
    pub brake_line2_psi: f64,
    pub brake_line3_psi: f64,
    pub bail_off: bool,
    /// New main reservoir pressure, for locomotives whose reservoir changed
    pub main_res_psi: Option<f64>,
}

/// Result of [propagate_brake_pressure]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropagationOutcome {
    /// One entry per car, in car order
    pub assignments: Vec<PipeAssignment>,
    pub engine_brake_state: ValveState,
    /// Engine brake signals raised on the lead locomotive
    pub events: Vec<BrakeEvent>,
    /// Main reservoir pipe pressure seen by the lead locomotive
    pub brake_line2_psi: f64,
}

/// Index range of the locomotive consist around `lead_idx`, i.e. the
/// contiguous run of locomotives containing the lead
pub fn find_lead_locomotives(cars: &[PipeSnapshot], lead_idx: usize) -> (usize, usize) {
    let mut first = lead_idx;
    while first > 0 && cars[first - 1].loco.is_some() {
        first -= 1;
    }
    let mut last = lead_idx;
    while last + 1 < cars.len() && cars[last + 1].loco.is_some() {
        last += 1;
    }
    (first, last)
}

/// Whether gas flows between car `i - 1` and car `i`
fn connected(cars: &[PipeSnapshot], i: usize) -> bool {
    i > 0
        && cars[i].front_brake_hose_connected
        && cars[i].angle_cock_a_open
        && cars[i - 1].angle_cock_b_open
}

/// Front of car `i` is open to atmosphere
fn front_open(cars: &[PipeSnapshot], i: usize) -> bool {
    cars[i].angle_cock_a_open && (i == 0 || !cars[i].front_brake_hose_connected)
}

/// Rear of car `i` is open to atmosphere
fn rear_open(cars: &[PipeSnapshot], i: usize) -> bool {
    cars[i].angle_cock_b_open && (i + 1 == cars.len() || !cars[i + 1].front_brake_hose_connected)
}

fn seconds(time: si::Time) -> f64 {
    time.get::<si::second>()
}

/// Distributes the commanded brake pipe, main reservoir pipe and engine
/// brake pipe pressures along the train for `dt_s` seconds.
///
/// Without a lead locomotive every car simply receives the commanded
/// pressures.  Otherwise the brake pipe is integrated in sub-steps no longer
/// than half the pipe time factor: the lead drives its own pipe toward the
/// command, adjacent connected cars diffuse into each other and open ends
/// leak to atmosphere.  Main reservoir pipe pressure is pooled by volume
/// over each connected run of twin-pipe cars and locomotives, and the engine
/// brake pipe is ramped on the lead consist only.
pub fn propagate_brake_pressure(
    cars: &[PipeSnapshot],
    inputs: &PropagationInputs,
    dt_s: f64,
) -> anyhow::Result<PropagationOutcome> {
    ensure!(
        dt_s.is_finite() && dt_s >= 0.0,
        "{}\ntime step must be finite and non-negative",
        format_dbg!(dt_s)
    );
    let command = inputs.command;
    let (target, reference) = match inputs.medium {
        PipeMedium::Air => (command.brake_line1_psi_or_inhg.max(0.0), 0.0),
        PipeMedium::Vacuum => (
            pressure::vacuum_to_psia(command.brake_line1_psi_or_inhg, inputs.atmosphere_psi)
                .max(0.0),
            inputs.atmosphere_psi,
        ),
    };

    let lead = match inputs.lead {
        Some(lead) => lead,
        None => {
            #[cfg(feature = "logging")]
            log::debug!("no lead locomotive, setting uniform brake pipe pressures");
            return Ok(PropagationOutcome {
                assignments: cars
                    .iter()
                    .map(|_| PipeAssignment {
                        brake_line1_psi: target,
                        brake_line2_psi: command.brake_line2_psi.max(0.0),
                        ..Default::default()
                    })
                    .collect(),
                brake_line2_psi: command.brake_line2_psi.max(0.0),
                ..Default::default()
            });
        }
    };
    ensure!(
        lead.idx < cars.len(),
        "{}\nlead locomotive index out of range for {} cars",
        format_dbg!(lead.idx),
        cars.len()
    );

    let mut line1: Vec<f64> = cars.iter().map(|car| car.brake_line1_psi).collect();
    let mut main_res: Vec<Option<f64>> = cars
        .iter()
        .map(|car| car.loco.map(|loco| loco.main_res_psi))
        .collect();

    let supply = lead.supply;
    let ptf = seconds(supply.brake_pipe_time_factor);
    if supply.brake_pipe_charging_rate_psi_per_sec > GRADIENT_DISABLED_CHARGING_RATE_PSI_PER_SEC
        || ptf.is_nan()
        || ptf <= 0.0
    {
        line1.iter_mut().for_each(|p| *p = target);
    } else {
        let n_steps = ((dt_s * 2.0 / ptf).ceil() as usize).max(1);
        let dt = dt_s / n_steps as f64;
        let rates = match (inputs.medium, cars[lead.idx].vacuum) {
            (PipeMedium::Vacuum, Some(vacuum)) => LeadValveRates {
                charging_psi_per_sec: vacuum.apply_charging_rate_psi_per_sec,
                decay_factor_s: seconds(vacuum.release_time_factor),
            },
            _ => LeadValveRates {
                charging_psi_per_sec: supply.brake_pipe_charging_rate_psi_per_sec,
                decay_factor_s: seconds(if command.emergency {
                    supply.brake_emergency_time_factor
                } else {
                    supply.brake_service_time_factor
                }),
            },
        };
        let mut prev = line1.clone();
        for _ in 0..n_steps {
            drive_lead_pipe(
                &mut line1[lead.idx],
                &mut main_res[lead.idx],
                cars,
                &lead,
                inputs.medium,
                target,
                rates,
                dt,
            );

            // pairwise diffusion evaluated on pressures from the start of
            // the sub-step, open ends leak toward the reference
            prev.copy_from_slice(&line1);
            let k = dt / ptf;
            for i in 0..cars.len() {
                if connected(cars, i) {
                    let dp = k * (prev[i] - prev[i - 1]);
                    line1[i] -= dp;
                    line1[i - 1] += dp;
                }
                if front_open(cars, i) {
                    line1[i] -= k * (prev[i] - reference);
                }
                if rear_open(cars, i) {
                    line1[i] -= k * (prev[i] - reference);
                }
            }

            let leak = dt * supply.brake_pipe_leak_psi_per_sec;
            for p in line1.iter_mut() {
                if leak > 0.0 {
                    *p = if *p > reference {
                        (*p - leak).max(reference)
                    } else {
                        (*p + leak).min(reference)
                    };
                }
                *p = p.max(0.0);
            }
        }
    }

    let mut assignments: Vec<PipeAssignment> = line1
        .iter()
        .zip(cars)
        .map(|(p, car)| PipeAssignment {
            brake_line1_psi: *p,
            brake_line2_psi: car.brake_line2_psi,
            ..Default::default()
        })
        .collect();

    if inputs.medium.is_vacuum() {
        // vacuum trains carry no main reservoir or engine brake pipe
        return Ok(PropagationOutcome {
            assignments,
            engine_brake_state: lead.engine_brake_state,
            brake_line2_psi: cars[lead.idx].brake_line2_psi,
            ..Default::default()
        });
    }

    let (first, last) = find_lead_locomotives(cars, lead.idx);
    let brake_line2_psi = pool_main_reservoir_pipe(
        cars,
        &mut main_res,
        &mut assignments,
        (first, last),
        lead.idx,
    );
    let (engine_brake_state, events) =
        ramp_engine_brake_pipe(cars, &mut assignments, (first, last), &lead, command, dt_s);

    Ok(PropagationOutcome {
        assignments,
        engine_brake_state,
        events,
        brake_line2_psi,
    })
}

/// Brake valve rates driving the lead's own pipe
#[derive(Clone, Copy, Debug)]
struct LeadValveRates {
    charging_psi_per_sec: f64,
    decay_factor_s: f64,
}

/// One sub-step of the lead locomotive's brake valve: charge toward the
/// target from the main reservoir, or vent exponentially down to it
#[allow(clippy::too_many_arguments)]
fn drive_lead_pipe(
    bp: &mut f64,
    main_res: &mut Option<f64>,
    cars: &[PipeSnapshot],
    lead: &LeadLoco,
    medium: PipeMedium,
    target: f64,
    rates: LeadValveRates,
    dt: f64,
) {
    let supply = lead.supply;
    if *bp < target {
        let mut dp = (dt * rates.charging_psi_per_sec).min(target - *bp);
        if medium.is_air() {
            if let Some(mr) = main_res.as_mut() {
                dp = dp.min(*mr - *bp).max(0.0);
                let mr_volume = cars[lead.idx]
                    .loco
                    .map(|loco| loco.main_res_volume)
                    .unwrap_or(supply.main_res_volume);
                if mr_volume > si::Volume::ZERO {
                    *mr -= dp * (cars[lead.idx].brake_pipe_volume / mr_volume).get::<si::ratio>();
                    *mr = mr.max(0.0);
                }
            }
        }
        *bp += dp.max(0.0);
    } else if *bp > target && rates.decay_factor_s > 0.0 {
        *bp = (*bp * (1.0 - dt / rates.decay_factor_s)).max(target);
    }
}

/// Pools main reservoir pipe pressure over every connected run of twin-pipe
/// cars and lead consist locomotives.  Returns the pressure of the run
/// containing the lead.
fn pool_main_reservoir_pipe(
    cars: &[PipeSnapshot],
    main_res: &mut [Option<f64>],
    assignments: &mut [PipeAssignment],
    (first, last): (usize, usize),
    lead_idx: usize,
) -> f64 {
    let in_consist = |i: usize| (first..=last).contains(&i);
    let participates = |i: usize| in_consist(i) || cars[i].two_pipes;
    let linked = |i: usize| {
        participates(i)
            && participates(i - 1)
            && ((in_consist(i) && in_consist(i - 1)) || connected(cars, i))
    };

    let mut lead_line2 = 0.0;
    let mut start = 0;
    while start < cars.len() {
        if !participates(start) {
            assignments[start].brake_line2_psi = 0.0;
            start += 1;
            continue;
        }
        let mut end = start;
        while end + 1 < cars.len() && linked(end + 1) {
            end += 1;
        }

        let mut sumv = 0.0;
        let mut sumpv = 0.0;
        for i in start..=end {
            let vol = cars[i].brake_pipe_volume.get::<si::cubic_meter>();
            sumv += vol;
            sumpv += vol * cars[i].brake_line2_psi;
            if let (Some(loco), Some(mr)) = (cars[i].loco, main_res[i]) {
                let vol = loco.main_res_volume.get::<si::cubic_meter>();
                sumv += vol;
                sumpv += vol * mr;
            }
        }
        let pooled = if sumv > 0.0 { sumpv / sumv } else { 0.0 };
        let open = front_open(cars, start) || rear_open(cars, end);
        for i in start..=end {
            assignments[i].brake_line2_psi = if open { 0.0 } else { pooled };
            if !open && cars[i].loco.is_some() {
                main_res[i] = Some(pooled);
            }
        }
        if (start..=end).contains(&lead_idx) {
            lead_line2 = if open { 0.0 } else { pooled };
        }
        start = end + 1;
    }

    for (i, car) in cars.iter().enumerate() {
        if let Some(loco) = car.loco {
            if main_res[i] != Some(loco.main_res_psi) {
                assignments[i].main_res_psi = main_res[i];
            }
        }
    }
    lead_line2
}

/// Ramps the engine brake pipe of every lead consist locomotive toward the
/// commanded pressure; cars outside the consist get none
fn ramp_engine_brake_pipe(
    cars: &[PipeSnapshot],
    assignments: &mut [PipeAssignment],
    (first, last): (usize, usize),
    lead: &LeadLoco,
    command: &TrainBrakeCommand,
    dt_s: f64,
) -> (ValveState, Vec<BrakeEvent>) {
    let supply = lead.supply;
    let n_locos = (last - first + 1) as f64;
    let target = command.brake_line3_psi.max(0.0);
    let bail_off = command.bail_off
        || (supply.dynamic_brake_auto_bail_off && command.dynamic_brake_percent > 0.0);

    let mut state = lead.engine_brake_state;
    for (i, (car, assignment)) in cars.iter().zip(assignments.iter_mut()).enumerate() {
        if i < first || i > last {
            assignment.brake_line3_psi = 0.0;
            assignment.bail_off = false;
            continue;
        }
        let p = car.brake_line3_psi;
        let (p, car_state) = if p < target {
            let dp = dt_s * supply.engine_brake_apply_rate_psi_per_sec / n_locos;
            ((p + dp).min(target), ValveState::Apply)
        } else if p > target {
            let dp = dt_s * supply.engine_brake_release_rate_psi_per_sec / n_locos;
            ((p - dp).max(target), ValveState::Release)
        } else {
            (p, ValveState::Lap)
        };
        assignment.brake_line3_psi = p;
        assignment.bail_off = bail_off;
        if i == lead.idx {
            state = car_state;
        }
    }
    let events = state
        .engine_brake_event(lead.engine_brake_state)
        .into_iter()
        .collect();
    (state, events)
}
