use field_sim::tags::structures::{DataType, Quality, TagValue, Trend};
use field_sim::tags::synth::{synthesize, STATUS_VOCABULARY, VALUE_MAX, VALUE_MIN};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn numeric_values_stay_in_range() {
    let mut rng = StdRng::seed_from_u64(42);
    for data_type in [DataType::Int, DataType::Real] {
        let mut previous: Option<TagValue> = None;
        for _ in 0..5_000 {
            let reading = synthesize(&mut rng, data_type, "DB1.DBD0", previous.as_ref());
            let value = reading.value.as_f64().expect("numeric");
            assert!((VALUE_MIN..=VALUE_MAX).contains(&value), "{} out of range", value);
            previous = Some(reading.value);
        }
    }
}

#[test]
fn trend_follows_previous_value() {
    let mut rng = StdRng::seed_from_u64(7);
    for data_type in [DataType::Int, DataType::Real] {
        let first = synthesize(&mut rng, data_type, "MW0", None);
        assert_eq!(first.trend, Trend::Stable);

        let mut previous = first.value;
        for _ in 0..1_000 {
            let reading = synthesize(&mut rng, data_type, "MW0", Some(&previous));
            let (old, new) = (previous.as_f64().unwrap(), reading.value.as_f64().unwrap());
            let expected = if new > old {
                Trend::Up
            } else if new < old {
                Trend::Down
            } else {
                Trend::Stable
            };
            assert_eq!(reading.trend, expected);
            previous = reading.value;
        }
    }
}

#[test]
fn int_steps_are_bounded() {
    let mut rng = StdRng::seed_from_u64(11);
    let previous = TagValue::Int(50);
    for _ in 0..1_000 {
        let reading = synthesize(&mut rng, DataType::Int, "D100", Some(&previous));
        match reading.value {
            TagValue::Int(v) => assert!((45..=55).contains(&v)),
            other => panic!("expected Int, got {:?}", other),
        }
    }
}

#[test]
fn real_steps_are_bounded_and_rounded() {
    let mut rng = StdRng::seed_from_u64(12);
    let previous = TagValue::Real(50.0);
    for _ in 0..1_000 {
        let reading = synthesize(&mut rng, DataType::Real, "D100", Some(&previous));
        match reading.value {
            TagValue::Real(v) => {
                assert!((47.5..=52.5).contains(&v));
                assert!(((v * 100.0).round() - v * 100.0).abs() < 1e-9);
            }
            other => panic!("expected Real, got {:?}", other),
        }
    }
}

#[test]
fn non_numeric_previous_gives_stable_trend() {
    let mut rng = StdRng::seed_from_u64(5);
    let previous = TagValue::Text("RUNNING".to_string());
    let reading = synthesize(&mut rng, DataType::Real, "x", Some(&previous));
    assert_eq!(reading.trend, Trend::Stable);
    assert!(matches!(reading.value, TagValue::Real(_)));
}

#[test]
fn bool_flips_about_a_fifth_of_the_time() {
    let mut rng = StdRng::seed_from_u64(99);
    let previous = TagValue::Bool(true);
    let runs = 10_000;
    let flips = (0..runs)
        .filter(|_| synthesize(&mut rng, DataType::Bool, "Q0.0", Some(&previous)).value == TagValue::Bool(false))
        .count();
    let ratio = flips as f64 / runs as f64;
    assert!((0.15..0.25).contains(&ratio), "flip ratio {}", ratio);
}

#[test]
fn bool_without_previous_is_random() {
    let mut rng = StdRng::seed_from_u64(1);
    let trues = (0..1_000)
        .filter(|_| synthesize(&mut rng, DataType::Bool, "Q0.0", None).value == TagValue::Bool(true))
        .count();
    assert!((350..650).contains(&trues));
}

#[test]
fn strings_come_from_the_status_vocabulary() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..500 {
        let reading = synthesize(&mut rng, DataType::String, "Program:Main.State", None);
        assert_eq!(reading.trend, Trend::Stable);
        match reading.value {
            TagValue::Text(s) => assert!(STATUS_VOCABULARY.contains(&s.as_str())),
            other => panic!("expected Text, got {:?}", other),
        }
    }
}

#[test]
fn unknown_type_falls_back_to_zero() {
    let mut rng = StdRng::seed_from_u64(4);
    let previous = TagValue::Int(77);
    let reading = synthesize(&mut rng, DataType::Unknown, "???", Some(&previous));
    assert_eq!(reading.value, TagValue::Int(0));
    assert_eq!(reading.trend, Trend::Stable);
}

#[test]
fn quality_is_mostly_good() {
    let mut rng = StdRng::seed_from_u64(2024);
    let runs = 20_000;
    let mut good = 0;
    let mut bad = 0;
    let mut uncertain = 0;
    for _ in 0..runs {
        match synthesize(&mut rng, DataType::Int, "D0", None).quality {
            Quality::Good => good += 1,
            Quality::Bad => bad += 1,
            Quality::Uncertain => uncertain += 1,
        }
    }
    let share = |n: i32| n as f64 / runs as f64;
    assert!((0.87..0.93).contains(&share(good)));
    assert!((0.03..0.07).contains(&share(bad)));
    assert!((0.03..0.07).contains(&share(uncertain)));
}

#[test]
fn unknown_type_names_deserialize_to_unknown() {
    let parsed: DataType = serde_json::from_str("\"DWORD\"").unwrap();
    assert_eq!(parsed, DataType::Unknown);
    let parsed: DataType = serde_json::from_str("\"REAL\"").unwrap();
    assert_eq!(parsed, DataType::Real);
    assert_eq!("bool".parse::<DataType>().unwrap(), DataType::Bool);
}
