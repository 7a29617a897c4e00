use crate::tags::structures::{DataType, Quality, Reading, TagValue, Trend};
use rand::Rng;
use tracing::trace;

/// Lower bound for INT and REAL values.
pub const VALUE_MIN: f64 = 0.0;
/// Upper bound for INT and REAL values.
pub const VALUE_MAX: f64 = 100.0;
/// Starting point of a random walk with no previous value.
pub const WALK_ORIGIN: f64 = 50.0;

/// Full step width of the INT walk (each step is within ±5).
const INT_DELTA: f64 = 10.0;
/// Full step width of the REAL walk (each step is within ±2.5).
const REAL_DELTA: f64 = 5.0;
const BOOL_FLIP_PROBABILITY: f64 = 0.2;

/// Status words produced for STRING tags.
pub const STATUS_VOCABULARY: [&str; 5] = ["RUNNING", "STOPPED", "IDLE", "ERROR", "MAINTENANCE"];

/// Produce the next reading for a tag.
///
/// Quality is pure noise (90% good, 5% bad, 5% uncertain), drawn independently
/// of the value. Numeric types follow a clamped random walk from `previous`.
/// Never fails: unknown data types read as `0`.
pub fn synthesize<R: Rng + ?Sized>(
    rng: &mut R,
    data_type: DataType,
    address: &str,
    previous: Option<&TagValue>,
) -> Reading {
    let quality = draw_quality(rng);

    let (value, trend) = match data_type {
        DataType::Bool => {
            let value = match previous {
                Some(TagValue::Bool(prev)) => {
                    if rng.gen_bool(BOOL_FLIP_PROBABILITY) {
                        !*prev
                    } else {
                        *prev
                    }
                }
                _ => rng.gen_bool(0.5),
            };
            (TagValue::Bool(value), Trend::Stable)
        }
        DataType::Int => {
            let prev = previous.and_then(TagValue::as_f64);
            let next = walk(rng, prev, INT_DELTA).round();
            (TagValue::Int(next as i64), Trend::between(prev, Some(next)))
        }
        DataType::Real => {
            let prev = previous.and_then(TagValue::as_f64);
            let next = round2(walk(rng, prev, REAL_DELTA));
            (TagValue::Real(next), Trend::between(prev, Some(next)))
        }
        DataType::String => {
            let idx = rng.gen_range(0..STATUS_VOCABULARY.len());
            (TagValue::Text(STATUS_VOCABULARY[idx].to_string()), Trend::Stable)
        }
        DataType::Unknown => (TagValue::Int(0), Trend::Stable),
    };

    trace!(address, %data_type, %value, ?quality, ?trend, "synthesized reading");

    Reading {
        value,
        quality,
        trend,
    }
}

fn draw_quality<R: Rng + ?Sized>(rng: &mut R) -> Quality {
    let roll: f64 = rng.gen();
    if roll < 0.90 {
        Quality::Good
    } else if roll < 0.95 {
        Quality::Bad
    } else {
        Quality::Uncertain
    }
}

fn walk<R: Rng + ?Sized>(rng: &mut R, previous: Option<f64>, delta: f64) -> f64 {
    let base = previous.unwrap_or(WALK_ORIGIN);
    let half = delta / 2.0;
    let step = rng.gen_range(-half..=half);
    (base + step).clamp(VALUE_MIN, VALUE_MAX)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn real_values_have_two_decimals() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut prev = None;
        for _ in 0..200 {
            let reading = synthesize(&mut rng, DataType::Real, "DB1.DBD4", prev.as_ref());
            let v = reading.value.as_f64().unwrap();
            assert!(((v * 100.0).round() - v * 100.0).abs() < 1e-6);
            prev = Some(reading.value);
        }
    }

    #[test]
    fn walk_stays_in_range_from_out_of_range_previous() {
        let mut rng = StdRng::seed_from_u64(9);
        let high = TagValue::Real(1_000.0);
        let reading = synthesize(&mut rng, DataType::Real, "x", Some(&high));
        assert!(reading.value.as_f64().unwrap() <= VALUE_MAX);
        assert_eq!(reading.trend, Trend::Down);
    }
}
