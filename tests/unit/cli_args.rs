use std::time::Duration;

use clap::Parser;
use minder_downloader::cli::{Cli, Commands, OutputFormat};
use minder_downloader::export::EmptyResultPolicy;
use minder_downloader::table::SchemaPolicy;

fn export_args(extra: &[&str]) -> minder_downloader::cli::ExportArgs {
    let mut argv = vec![
        "minder-downloader",
        "export",
        "--since",
        "2024-01-01",
        "--until",
        "2024-01-07",
        "--dataset",
        "raw_sleep_mat",
    ];
    argv.extend_from_slice(extra);
    match Cli::try_parse_from(argv).unwrap().command {
        Commands::Export(args) => args,
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn export_defaults_match_legacy_behaviour() {
    let args = export_args(&[]);
    let options = args.options();

    assert_eq!(options.concurrency, 1);
    assert_eq!(options.poll_policy.interval, Duration::from_secs(2));
    assert_eq!(options.fetch_policy.interval, Duration::from_secs(2));
    assert!(!options.poll_policy.is_bounded());
    assert!(!options.fetch_policy.is_bounded());
    assert_eq!(options.empty_result, EmptyResultPolicy::Terminal);
    assert_eq!(options.schema, SchemaPolicy::Union);
}

#[test]
fn export_flags_map_to_options() {
    let args = export_args(&[
        "--dataset",
        "raw_activity_pir",
        "--organization",
        "org-1",
        "--concurrency",
        "4",
        "--poll-interval",
        "0.5",
        "--max-poll-attempts",
        "10",
        "--max-fetch-attempts",
        "3",
        "--schema",
        "strict",
        "--keep-polling-on-empty",
    ]);
    let options = args.options();

    assert_eq!(args.datasets, vec!["raw_sleep_mat", "raw_activity_pir"]);
    assert_eq!(options.concurrency, 4);
    assert_eq!(options.poll_policy.interval, Duration::from_millis(500));
    assert_eq!(options.poll_policy.max_attempts, Some(10));
    assert_eq!(options.fetch_policy.max_attempts, Some(3));
    assert_eq!(options.schema, SchemaPolicy::Strict);
    assert_eq!(options.empty_result, EmptyResultPolicy::KeepPolling);

    let params = args.params().unwrap();
    assert_eq!(params.organizations, Some(vec!["org-1".to_string()]));
    assert_eq!(params.until.to_string(), "2024-01-07 23:59:59.999");
}

#[test]
fn invalid_values_are_rejected_by_the_parser() {
    let base = ["minder-downloader", "export", "--since", "2024-01-01", "--until", "2024-01-02"];
    assert!(Cli::try_parse_from(base).is_err(), "--dataset is required");

    for bad in [
        &["--concurrency", "0"][..],
        &["--concurrency", "64"][..],
        &["--poll-interval", "-1"][..],
        &["--max-fetch-attempts", "0"][..],
        &["--schema", "loose"][..],
    ] {
        let mut argv = base.to_vec();
        argv.extend_from_slice(&["--dataset", "raw_sleep_mat"]);
        argv.extend_from_slice(bad);
        assert!(Cli::try_parse_from(argv).is_err(), "{bad:?}");
    }
}

#[test]
fn bad_dates_surface_as_invalid_argument() {
    let mut args = export_args(&[]);
    args.since = "yesterday".to_string();
    assert!(args.params().is_err());
}

#[test]
fn global_flags_parse_on_any_subcommand() {
    let cli = Cli::try_parse_from([
        "minder-downloader",
        "datasets",
        "--domain",
        "raw",
        "--output-format",
        "json",
        "--config",
        "/tmp/info.yaml",
    ])
    .unwrap();
    assert_eq!(cli.output_format, OutputFormat::Json);
    assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/info.yaml")));
    assert!(matches!(cli.command, Commands::Datasets(ref cmd) if cmd.domain.as_deref() == Some("raw")));
}
