mod cli;

use std::path::PathBuf;
use tfconfig::config::Config;
use tfconfig::diagnostic::Diagnostics;
use tfconfig::{LoadError, LoadSession};

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TFCONFIG_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let command_result = enter(&cli.directory).and_then(|()| match cli.command {
        cli::Command::Decode(decode_cli) => decode(decode_cli),
        cli::Command::Check(check_cli) => check(check_cli),
    });

    match command_result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            for error in e.chain() {
                eprintln!("{error}")
            }
            std::process::exit(1);
        }
    }
}

/// Each `-C` step is resolved relative to the previous one
fn enter(directories: &[PathBuf]) -> anyhow::Result<()> {
    use anyhow::Context;

    for directory in directories {
        let cwd = directory.canonicalize().with_context(|| {
            format!("Failed to resolve path for -C/--directory {}", directory.display())
        })?;
        std::env::set_current_dir(&cwd)
            .with_context(|| format!("Failed to set work directory to {}", cwd.display()))?;

        tracing::info!(directory=%cwd.display(), "Changed working directory");
    }
    Ok(())
}

/// Returns `false` when any file had errors
pub fn decode(cli: cli::DecodeCommand) -> anyhow::Result<bool> {
    let (config, clean) = load(&cli.input)?;

    match cli.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), &config)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), &config)?,
    };

    Ok(clean)
}

pub fn check(cli: cli::CheckCommand) -> anyhow::Result<bool> {
    let (_, clean) = load(&cli.input)?;
    Ok(clean)
}

/// Decode all input files into one configuration, diagnostics are printed as they come up
fn load(input: &cli::InputArgs) -> anyhow::Result<(Config, bool)> {
    let mut session = LoadSession::new();
    let mut config = Config::default();
    let mut clean = true;

    for path in &input.files {
        let diagnostics = match session.load_file(path) {
            Ok(document) => {
                let decoded = document.decode();
                let mut diagnostics = decoded.diagnostics;
                diagnostics.append(config.merge(decoded.config));
                diagnostics
            }
            Err(LoadError::Syntax(diagnostics)) => diagnostics,
            Err(err @ LoadError::Io { .. }) => return Err(err.into()),
        };

        clean &= !diagnostics.has_errors();
        report(&session, &diagnostics);
    }

    Ok((config, clean))
}

fn report(session: &LoadSession, diagnostics: &Diagnostics) {
    for diagnostic in diagnostics {
        eprintln!("{}", session.render(diagnostic));
    }
}
