use super::*;

#[test]
fn parses_migrate_command() {
    let cli = Cli::try_parse_from(["secops-cli", "migrate"]).expect("expected valid cli args");
    assert!(matches!(cli.command, Some(Commands::Migrate)));
}

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["secops-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn parses_jobs_list_command() {
    let cli = Cli::try_parse_from(["secops-cli", "jobs", "list"]).expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Jobs {
            command: JobsCommands::List
        })
    ));
}

#[test]
fn parses_jobs_set_interval_command() {
    let cli = Cli::try_parse_from([
        "secops-cli",
        "jobs",
        "set-interval",
        "invoke_duo_integration_collect",
        "30",
    ])
    .expect("expected valid cli args");

    match cli.command {
        Some(Commands::Jobs {
            command: JobsCommands::SetInterval { job_id, minutes },
        }) => {
            assert_eq!(job_id, "invoke_duo_integration_collect");
            assert_eq!(minutes, 30);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn jobs_set_interval_rejects_non_numeric_minutes() {
    let result = Cli::try_parse_from([
        "secops-cli",
        "jobs",
        "set-interval",
        "invoke_duo_integration_collect",
        "soon",
    ]);
    assert!(result.is_err());
}

#[test]
fn parses_jobs_run_with_json_flag() {
    let cli = Cli::try_parse_from([
        "secops-cli",
        "jobs",
        "run",
        "invoke_duo_integration_collect",
        "--json",
    ])
    .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Jobs {
            command: JobsCommands::Run { json: true, .. }
        })
    ));
}

#[test]
fn parses_bindings_list_command() {
    let cli = Cli::try_parse_from(["secops-cli", "bindings", "list", "duo"])
        .expect("expected valid cli args");

    match cli.command {
        Some(Commands::Bindings {
            command: BindingsCommands::List { integration },
        }) => assert_eq!(integration, "duo"),
        other => panic!("unexpected command: {other:?}"),
    }
}
