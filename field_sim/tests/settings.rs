use field_sim::config::settings::Settings;
use field_sim::tags::address::validate_address;
use field_sim::tags::structures::DataType;
use std::fs;
use std::path::PathBuf;

fn scratch_file(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("field_sim_settings_{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

#[test]
fn missing_file_falls_back_to_demo_plant() {
    let settings = Settings::load(&scratch_file("does_not_exist.toml")).unwrap();
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.plcs.len(), 2);
    assert_eq!(settings.tags.len(), 5);
    assert_eq!(settings.engine.update_interval_ms, 1_000);
    assert_eq!(settings.aggregator.throttle_ratio, 0.8);
}

#[test]
fn demo_tags_have_valid_addresses() {
    let settings = Settings::default();
    for tag in &settings.tags {
        let plc = settings.plc(&tag.plc_id).expect("demo tag points at a demo PLC");
        assert!(
            validate_address(&plc.brand, &tag.address),
            "{} is not a valid {} address",
            tag.address,
            plc.brand
        );
    }
}

#[test]
fn partial_file_keeps_defaults_for_the_rest() {
    let path = scratch_file("partial.toml");
    fs::write(
        &path,
        r#"
log_level = "debug"

[engine]
seed = 42

[[plcs]]
id = "plc-9"
name = "Boiler House"
brand = "Omron"

[[tags]]
tag_id = "B-1"
tag_name = "Boiler Level"
plc_id = "plc-9"
address = "D100"
data_type = "REAL"
unit = "%"
"#,
    )
    .unwrap();

    let settings = Settings::load(&path).unwrap();
    assert_eq!(settings.log_level, "debug");
    assert_eq!(settings.engine.seed, Some(42));
    assert_eq!(settings.engine.update_interval_ms, 1_000);
    assert_eq!(settings.gateway.handshake_delay_ms, 2_000);
    assert_eq!(settings.plcs.len(), 1);
    assert_eq!(settings.tags[0].data_type, DataType::Real);
    assert_eq!(settings.tags[0].unit.as_deref(), Some("%"));
    assert_eq!(settings.plc("plc-9").unwrap().brand, "Omron");
    assert!(settings.plc("plc-1").is_none());

    let spec = settings.tags[0].to_spec();
    assert_eq!(spec.tag_id, "B-1");
    assert_eq!(spec.plc_id, "plc-9");
}

#[test]
fn saved_settings_load_back() {
    let path = scratch_file("saved.toml");
    let mut settings = Settings::default();
    settings.engine.seed = Some(7);
    settings.aggregator.watch_tags = vec!["T-101".to_string()];
    settings.save(&path).unwrap();

    let loaded = Settings::load(&path).unwrap();
    assert_eq!(loaded.engine.seed, Some(7));
    assert_eq!(loaded.aggregator.watch_tags, vec!["T-101".to_string()]);
    assert_eq!(loaded.tags, settings.tags);
}
