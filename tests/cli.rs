use clap::Parser;
use procwarden::cli::{CliArgs, LogLevel};
use procwarden::logging::resolve_filter;

#[test]
fn defaults_when_no_flags_given() {
    let args = CliArgs::parse_from(["procwarden"]);
    assert_eq!(args.config, "Procwarden.toml");
    assert!(!args.once);
    assert!(!args.dry_run);
    assert!(args.param.is_empty());
    assert!(args.log_level.is_none());
}

#[test]
fn params_may_look_like_flags() {
    let args = CliArgs::parse_from([
        "procwarden",
        "--config",
        "jboss.toml",
        "--param",
        "-c",
        "--param",
        "standalone-full.xml",
        "--once",
    ]);
    assert_eq!(args.config, "jboss.toml");
    assert_eq!(args.param, vec!["-c", "standalone-full.xml"]);
    assert!(args.once);
}

#[test]
fn log_level_flag_wins() {
    let args = CliArgs::parse_from(["procwarden", "--log-level", "debug"]);
    assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    assert_eq!(resolve_filter(args.log_level).to_string(), "debug");
}
