//! Fleet-wide invariants checked over long seeded runs.

#![allow(
    clippy::unwrap_used,
    clippy::float_cmp,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use homewatt_core::assembler::assemble_snapshot;
use homewatt_core::config::{ApplianceSpec, default_fleet};
use homewatt_core::device::{DeviceParams, round2};
use homewatt_core::fleet::Fleet;
use homewatt_types::PowerStatus;

const TICKS: i64 = 3_000;

fn minute(m: i64) -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + TimeDelta::minutes(m)
}

#[test]
fn power_is_zero_exactly_when_off() {
    for seed in [1, 2, 3] {
        let mut fleet =
            Fleet::new(default_fleet(), DeviceParams::default(), seed, minute(0)).unwrap();
        for m in 1..=TICKS {
            for record in fleet.snapshot(minute(m)).records {
                assert_eq!(record.current_power == 0.0, !record.on, "{record:?}");
            }
        }
    }
}

#[test]
fn flips_respect_minimum_dwell() {
    let params = DeviceParams::default();
    let min_dwell = params.min_dwell;
    let mut fleet = Fleet::new(default_fleet(), params, 11, minute(0)).unwrap();
    let mut last_flip: HashMap<String, (bool, DateTime<Utc>)> = HashMap::new();

    for m in 1..=TICKS {
        for record in fleet.snapshot(minute(m)).records {
            let entry = last_flip
                .entry(record.id.to_string())
                .or_insert((false, minute(0)));
            if record.on != entry.0 {
                assert!(
                    record.last_state_change - entry.1 >= min_dwell,
                    "{} flipped too early at minute {m}",
                    record.id
                );
                *entry = (record.on, record.last_state_change);
            }
        }
    }
}

#[test]
fn anomalous_power_stays_in_band() {
    let params = DeviceParams {
        anomaly_probability: 0.3,
        ..DeviceParams::default()
    };
    let mut fleet = Fleet::new(default_fleet(), params, 5, minute(0)).unwrap();
    let mut seen = 0_u32;

    for m in 1..=TICKS {
        for record in fleet.snapshot(minute(m)).records {
            if record.anomaly {
                seen += 1;
                assert!(record.on);
                assert!(record.current_power >= round2(1.2 * record.max_power));
                assert!(record.current_power <= round2(1.5 * record.max_power));
            } else if record.on {
                assert!(record.current_power >= round2(0.5 * record.max_power));
                assert!(record.current_power <= round2(record.max_power));
            }
        }
    }
    assert!(seen > 0, "expected at least one anomaly over the run");
}

#[test]
fn summary_matches_records() {
    let mut fleet = Fleet::new(default_fleet(), DeviceParams::default(), 21, minute(0)).unwrap();
    for m in 1..=500 {
        let snapshot = fleet.snapshot(minute(m));
        let message = assemble_snapshot(&snapshot).unwrap();

        let raw_total: f64 = snapshot.records.iter().map(|r| r.current_power).sum();
        let active = snapshot.records.iter().filter(|r| r.on).count();
        let anomalous = snapshot.records.iter().filter(|r| r.anomaly).count();

        assert_eq!(message.summary.total_consumption, round2(raw_total));
        assert_eq!(message.summary.active_appliances, u32::try_from(active).unwrap());
        assert_eq!(message.summary.anomalies_detected, u32::try_from(anomalous).unwrap());
        for wire in &message.appliances {
            assert_eq!(wire.status == PowerStatus::On, wire.state);
        }
    }
}

#[test]
fn summary_agrees_with_emitted_entries() {
    for seed in 1..=5 {
        let mut fleet =
            Fleet::new(default_fleet(), DeviceParams::default(), seed, minute(0)).unwrap();
        for m in 1..=TICKS {
            let message = assemble_snapshot(&fleet.snapshot(minute(m))).unwrap();

            let power: f64 = message.appliances.iter().map(|a| a.current_power).sum();
            let cost: f64 = message.appliances.iter().map(|a| a.cost_per_hour).sum();
            assert_eq!(round2(power), message.summary.total_consumption, "seed {seed} minute {m}");
            assert_eq!(round2(cost), message.summary.total_cost_per_hour, "seed {seed} minute {m}");

            for wire in &message.appliances {
                assert_eq!(wire.current_power, round2(wire.current_power));
                assert_eq!(wire.cost_per_hour, round2(wire.current_power * 0.12 / 1000.0));
            }
        }
    }
}

#[test]
fn forced_anomaly_scenario() {
    let params = DeviceParams {
        switch_probability: 1.0,
        anomaly_probability: 1.0,
        ..DeviceParams::default()
    };
    let spec = ApplianceSpec::new("x", "Test Load", 100.0, "x.png");
    let mut fleet = Fleet::new(vec![spec], params, 3, minute(0)).unwrap();

    let snapshot = fleet.snapshot(minute(5));
    let record = &snapshot.records[0];
    assert!(record.on);
    assert!(record.anomaly);
    assert!((120.0..=150.0).contains(&record.current_power));

    let message = assemble_snapshot(&snapshot).unwrap();
    let wire = &message.appliances[0];
    assert_eq!(
        wire.cost_per_hour,
        round2(record.current_power * 0.12 / 1000.0)
    );
    assert_eq!(message.summary.anomalies_detected, 1);
}

#[test]
fn time_used_never_decreases() {
    let mut fleet = Fleet::new(default_fleet(), DeviceParams::default(), 8, minute(0)).unwrap();
    let mut previous = vec![0_u64; fleet.len()];
    for m in 1..=TICKS {
        let snapshot = fleet.snapshot(minute(m));
        for (slot, record) in previous.iter_mut().zip(&snapshot.records) {
            assert!(record.time_used >= *slot);
            if record.on {
                assert_eq!(record.time_used, *slot + 1);
            }
            *slot = record.time_used;
        }
    }
}
