//! Feature extraction from raw metric samples
//!
//! Merges the receive, transmit and error rate collections into one row
//! per device. Fields a device did not report resolve to zero, so a device
//! reporting traffic but no errors is kept. A NaN or infinite value also
//! reads as zero; only a sample with no value at all is ignored.

use crate::models::{DeviceKey, FeatureRecord, FeatureSnapshot, RawMetrics, RawSample};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Raw fields before totals are derived
#[derive(Debug, Default, Clone, Copy)]
struct PartialRecord {
    receive_bytes: f64,
    transmit_bytes: f64,
    rx_errors: f64,
    tx_errors: f64,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Receive,
    Transmit,
    RxErrors,
    TxErrors,
}

/// Build a snapshot stamped with the current time
pub fn build_snapshot(metrics: &RawMetrics) -> FeatureSnapshot {
    build_snapshot_at(metrics, Utc::now())
}

/// Build a snapshot stamped with `collected_at`
pub fn build_snapshot_at(metrics: &RawMetrics, collected_at: DateTime<Utc>) -> FeatureSnapshot {
    let mut partial: BTreeMap<DeviceKey, PartialRecord> = BTreeMap::new();

    merge(&mut partial, &metrics.receive, Field::Receive);
    merge(&mut partial, &metrics.transmit, Field::Transmit);
    merge(&mut partial, &metrics.rx_errors, Field::RxErrors);
    merge(&mut partial, &metrics.tx_errors, Field::TxErrors);

    let rows = partial
        .into_iter()
        .map(|(key, p)| {
            (
                key,
                FeatureRecord::new(p.receive_bytes, p.transmit_bytes, p.rx_errors, p.tx_errors),
            )
        })
        .collect();

    FeatureSnapshot::new(collected_at, rows)
}

fn merge(partial: &mut BTreeMap<DeviceKey, PartialRecord>, samples: &[RawSample], field: Field) {
    for sample in samples {
        let Some(value) = sample.feature_value() else {
            continue;
        };

        let record = partial.entry(sample.device_key()).or_default();
        match field {
            Field::Receive => record.receive_bytes = value,
            Field::Transmit => record.transmit_bytes = value,
            Field::RxErrors => record.rx_errors = value,
            Field::TxErrors => record.tx_errors = value,
        }
    }
}
