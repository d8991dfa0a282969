// tests/ingest_config.rs
use geo_events::config::AppConfig;
use geo_events::ingest::config::{load_blacklist_default, load_blacklist_from, Blacklist};
use geo_events::Hashtag;
use std::{env, fs};

fn tag(s: &str) -> Hashtag {
    Hashtag::new(s).unwrap()
}

#[test]
fn parse_toml_and_json_paths() {
    let dir = tempfile::tempdir().unwrap();

    let p_toml = dir.path().join("blacklist.toml");
    fs::write(
        &p_toml,
        r##"
hashtags = [" #RT ", "", "follow", "FOLLOW"]
"##,
    )
    .unwrap();
    let v = load_blacklist_from(&p_toml).unwrap();
    assert_eq!(v, Blacklist::new(["rt", "follow"]));
    assert!(v.contains(&tag("Follow")));

    let p_json = dir.path().join("blacklist.json");
    fs::write(&p_json, r#"["ff"," iphone  ", ""]"#).unwrap();
    let vj = load_blacklist_from(&p_json).unwrap();
    assert_eq!(vj.len(), 2);
    assert!(vj.contains(&tag("iphone")));
}

#[test]
fn unreadable_formats_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("blacklist.txt");
    fs::write(&p, "rt, follow").unwrap();
    assert!(load_blacklist_from(&p).is_err());
    assert!(load_blacklist_from(&dir.path().join("missing.toml")).is_err());
}

#[test]
fn extension_decides_the_format() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("blacklist.json");
    fs::write(&p, r#"hashtags = ["rt"]"#).unwrap();
    assert!(load_blacklist_from(&p).is_err());

    let p = dir.path().join("blacklist.TOML");
    fs::write(&p, r#"hashtags = ["rt"]"#).unwrap();
    assert_eq!(load_blacklist_from(&p).unwrap(), Blacklist::new(["rt"]));
}

#[serial_test::serial]
#[test]
fn blacklist_default_uses_env_then_fallbacks() {
    // isolate CWD so the repo's own config/ is not read
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();

    env::remove_var("GEO_EVENTS_BLACKLIST_PATH");

    // 1) nothing configured: empty
    assert!(load_blacklist_default().unwrap().is_empty());

    // 2) JSON fallback in ./config/
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("blacklist.json"), r#"["json"]"#).unwrap();
    assert_eq!(load_blacklist_default().unwrap(), Blacklist::new(["json"]));

    // 3) TOML wins over JSON
    fs::write(cfg_dir.join("blacklist.toml"), r#"hashtags = ["toml"]"#).unwrap();
    assert_eq!(load_blacklist_default().unwrap(), Blacklist::new(["toml"]));

    // 4) env wins over both
    let p_env = tmp.path().join("custom.json");
    fs::write(&p_env, r#"["env"]"#).unwrap();
    env::set_var("GEO_EVENTS_BLACKLIST_PATH", p_env.display().to_string());
    assert_eq!(load_blacklist_default().unwrap(), Blacklist::new(["env"]));

    // 5) env pointing nowhere is an error, not a silent fallback
    env::set_var("GEO_EVENTS_BLACKLIST_PATH", tmp.path().join("nope.json"));
    assert!(load_blacklist_default().is_err());
    env::remove_var("GEO_EVENTS_BLACKLIST_PATH");

    env::set_current_dir(&old).unwrap();
}

#[serial_test::serial]
#[test]
fn app_config_default_uses_env_then_cwd_file() {
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    env::remove_var("GEO_EVENTS_CONFIG");

    assert_eq!(AppConfig::load_default().unwrap(), AppConfig::default());

    fs::create_dir_all(tmp.path().join("config")).unwrap();
    fs::write(
        tmp.path().join("config/geo_events.toml"),
        "[cluster]\nradius_km = 25.0\n",
    )
    .unwrap();
    assert_eq!(AppConfig::load_default().unwrap().cluster.radius_km, 25.0);

    let p_env = tmp.path().join("other.toml");
    fs::write(&p_env, "[retention]\nwindow_secs = 3600\n").unwrap();
    env::set_var("GEO_EVENTS_CONFIG", &p_env);
    let cfg = AppConfig::load_default().unwrap();
    assert_eq!(cfg.retention.window_secs, 3600);
    assert_eq!(cfg.cluster.radius_km, 50.0);
    assert_eq!(cfg.retention().window.as_secs(), 3600);

    env::set_var("GEO_EVENTS_CONFIG", tmp.path().join("missing.toml"));
    assert!(AppConfig::load_default().is_err());
    env::remove_var("GEO_EVENTS_CONFIG");

    env::set_current_dir(&old).unwrap();
}
