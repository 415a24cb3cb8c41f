use std::env;
use std::time::Duration;

use clap::Parser;
use hit_tracker::OfflineMode;
use hit_tracker::app::{Cli, Command, LogFormat};
use serial_test::serial;

const VARS: [&str; 6] = [
    "HIT_TRACKER_DOMAIN",
    "HIT_TRACKER_SITE",
    "HIT_TRACKER_SECURE",
    "HIT_TRACKER_OFFLINE_MODE",
    "HIT_TRACKER_REQUEST_TIMEOUT_MS",
    "HIT_TRACKER_LOG_FORMAT",
];

fn clear_env() {
    for var in VARS {
        unsafe {
            env::remove_var(var);
        }
    }
}

#[test]
#[serial]
fn test_environment_fills_settings() {
    clear_env();
    unsafe {
        env::set_var("HIT_TRACKER_DOMAIN", "xiti.com");
        env::set_var("HIT_TRACKER_SITE", "549808");
        env::set_var("HIT_TRACKER_SECURE", "false");
        env::set_var("HIT_TRACKER_OFFLINE_MODE", "never");
        env::set_var("HIT_TRACKER_REQUEST_TIMEOUT_MS", "1500");
        env::set_var("HIT_TRACKER_LOG_FORMAT", "json");
    }

    let cli = Cli::try_parse_from(["hit-tracker", "count"]).unwrap();
    clear_env();

    assert_eq!(cli.command, Command::Count);
    let config = cli.config.resolve().unwrap();
    assert_eq!(config.domain, "xiti.com");
    assert!(!config.secure);
    assert_eq!(config.offline_mode, OfflineMode::Never);
    assert_eq!(config.request_timeout, Duration::from_millis(1500));
    assert_eq!(config.log_format, LogFormat::Json);
}

#[test]
#[serial]
fn test_flags_override_environment() {
    clear_env();
    unsafe {
        env::set_var("HIT_TRACKER_DOMAIN", "env.example.com");
        env::set_var("HIT_TRACKER_SITE", "1");
    }

    let cli = Cli::try_parse_from(["hit-tracker", "--domain", "flag.example.com", "flush"]).unwrap();
    clear_env();

    assert_eq!(cli.config.domain, "flag.example.com");
    assert_eq!(cli.config.site, "1");
    assert!(cli.config.secure);
}

#[test]
#[serial]
fn test_missing_site_fails_resolution() {
    clear_env();
    let cli = Cli::try_parse_from(["hit-tracker", "--domain", "xiti.com", "list"]).unwrap();
    assert!(cli.config.resolve().is_err());
}

#[test]
#[serial]
fn test_unknown_offline_mode_is_rejected() {
    clear_env();
    let result = Cli::try_parse_from(["hit-tracker", "--offline-mode", "sometimes", "count"]);
    assert!(result.is_err());
}
