use slideshow_engine::config::Configuration;
use slideshow_engine::timing::{CONSTANT_TIMING, TimingProvider};
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn parse_minimal_config_uses_defaults() {
    let yaml = r#"
photo-directories: ["/photos"]
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let cfg = cfg.validated().unwrap();
    assert_eq!(cfg.photo_directories, vec![PathBuf::from("/photos")]);
    assert!(cfg.weight_directories_equally);
    assert_eq!(cfg.max_in_memory, 120);
    assert_eq!(cfg.max_loading_at_once, 5);
    assert_eq!(cfg.image_size_min, 200);
    assert_eq!(cfg.timing_function, CONSTANT_TIMING);
    assert_eq!(cfg.timing_constant, "5000");
    assert_eq!(cfg.rescan_debounce, Duration::from_millis(500));
    assert!(cfg.shuffle_seed.is_none());
}

#[test]
fn parse_full_config() {
    let yaml = r#"
photo-directories: ["/a", "/b"]
weight-directories-equally: false
max-in-memory: 30
max-loading-at-once: 3
image-size-min: 64
fade-enabled: false
start-playing: false
timing-function: relaxed
timing-constant: "750"
timing-functions:
  relaxed:
    min: 2s
    max: 4s
shuffle-seed: 7
rescan-debounce: 2s
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let cfg = cfg.validated().unwrap();
    assert!(!cfg.weight_directories_equally);
    assert!(!cfg.start_playing);
    assert_eq!(cfg.shuffle_seed, Some(7));
    assert_eq!(cfg.rescan_debounce, Duration::from_secs(2));

    let delay = cfg.timing_functions.next_delay("relaxed").unwrap();
    assert!(delay >= Duration::from_secs(2) && delay <= Duration::from_secs(4));

    let settings = cfg.player_settings();
    assert_eq!(settings.max_in_memory, 30);
    assert_eq!(settings.max_loading_at_once, 3);
    assert_eq!(settings.image_size_min, 64);
    assert_eq!(settings.timing_function, "relaxed");
    assert_eq!(settings.timing_constant, "750");
    assert!(!settings.fade_enabled);
}

#[test]
fn numeric_timing_constant_is_kept_as_text() {
    let yaml = r#"
photo-directories: ["/p"]
timing-constant: 500
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.timing_constant, "500");

    let yaml = r#"
photo-directories: ["/p"]
timing-constant: abc
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.timing_constant, "abc");
    assert!(cfg.validated().is_ok(), "garbage constants fall back at runtime");
}

#[test]
fn unknown_fields_are_rejected() {
    let yaml = r#"
photo-directories: ["/p"]
max-in-memroy: 5
"#;
    assert!(serde_yaml::from_str::<Configuration>(yaml).is_err());
}

#[test]
fn zero_bounds_are_rejected() {
    for field in ["max-in-memory", "max-loading-at-once", "image-size-min"] {
        let yaml = format!("photo-directories: [\"/p\"]\n{field}: 0\n");
        let cfg: Configuration = serde_yaml::from_str(&yaml).unwrap();
        let err = cfg.validated().unwrap_err();
        assert!(
            err.to_string().contains(field),
            "unexpected error for {field}: {err}"
        );
    }
}

#[test]
fn missing_directories_are_rejected() {
    let cfg: Configuration = serde_yaml::from_str("max-in-memory: 3\n").unwrap();
    assert!(cfg.validated().is_err());
}

#[test]
fn unknown_timing_function_is_rejected() {
    let yaml = r#"
photo-directories: ["/p"]
timing-function: sprint
timing-functions:
  relaxed: { min: 1s, max: 2s }
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(err.to_string().contains("sprint"));
    assert!(err.to_string().contains("relaxed"));
}

#[test]
fn inverted_timing_range_is_rejected() {
    let yaml = r#"
photo-directories: ["/p"]
timing-functions:
  odd: { min: 5s, max: 1s }
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(format!("{err:#}").contains("odd"));
}

#[test]
fn load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slideshow.yaml");
    std::fs::write(&path, "photo-directories: [\"/p\"]\nmax-in-memory: 9\n").unwrap();
    let cfg = Configuration::from_yaml_file(&path).unwrap();
    assert_eq!(cfg.max_in_memory, 9);
}
