use std::fs;
use std::path::PathBuf;

use psychostair::config::{AppConfig, DimensionConfig};
use psychostair::core::grid::GridSpacing;

fn unique_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!(
        "psychostair_config_restore_{}_{}",
        name,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    path
}

#[test]
fn config_roundtrip_default_toml() {
    let default_cfg = AppConfig::default();
    let text = toml::to_string_pretty(&default_cfg).expect("serialize default");
    let parsed: AppConfig = toml::from_str(&text).expect("parse default");
    assert_eq!(parsed, default_cfg);
}

#[test]
fn config_load_custom_values() {
    let path = unique_path("custom.toml");
    let path_str = path.to_string_lossy().to_string();
    let mut custom = AppConfig::default();
    custom.estimator.target_probability = 0.8;
    custom.estimator.alpha.spacing = GridSpacing::Linear;
    custom.estimator.alpha.steps = 12;
    custom.estimator.dimensions = vec![DimensionConfig {
        name: "ecc_deg".into(),
        bins: vec![[0.0, 2.5], [2.5, 5.0], [5.0, 10.0]],
    }];
    custom.estimator.prior.gains = vec![0.4];
    custom.rate.ema_alpha = 0.2;
    custom.simulation.seed = 99;
    fs::write(&path, toml::to_string_pretty(&custom).unwrap()).unwrap();

    let cfg = AppConfig::load(&path_str).expect("load custom");
    assert_eq!(cfg, custom);
    let (est, ctl) = cfg.build().unwrap();
    assert_eq!(est.cell_count(), 3);
    assert_eq!(est.grid().alpha().len(), 12);
    assert_eq!(ctl.config().ema_alpha, 0.2);

    let _ = fs::remove_file(&path);
}

#[test]
fn empty_sections_take_defaults() {
    let cfg: AppConfig = toml::from_str("[estimator]\n[rate]\n[simulation]\n").unwrap();
    assert_eq!(cfg, AppConfig::default());
}
