use std::path::PathBuf;

use clap::Parser;
use cli::{Args, Commands, ConfigAction};
use dv_updater_config::config::{config_path, generate_default_config, set_config_path, Config};
use dv_updater_core::UpdaterResult;
use dv_updater_utils::system::platform;
use logging::setup_logging;
use tracing::error;

mod app;
mod cli;
mod logging;
mod server;
mod utils;

fn print_version() {
    let info = app::system_info();
    println!("dv-updater {}", info.app_version);
    println!("commit: {}", info.app_commit);
    println!("target: {}", platform());
}

async fn handle_cli() -> UpdaterResult<()> {
    let args = Args::parse();

    if args.no_color {
        utils::set_color(false);
    }

    if let Some(path) = &args.config {
        set_config_path(path);
    }

    // commands that must work without a valid config file
    let config = match &args.command {
        Commands::Version
        | Commands::Config {
            action: ConfigAction::Generate { .. },
        } => Config::default(),
        _ => Config::new()?,
    };

    setup_logging(&args, &config.log);

    match args.command {
        Commands::Start => app::start(config).await?,
        Commands::SelfUpdate => app::self_update(&config).await?,
        Commands::Version => print_version(),
        Commands::Config { action } => {
            match action {
                ConfigAction::Generate { output, force } => {
                    let path = output.map(PathBuf::from).unwrap_or_else(config_path);
                    generate_default_config(path, force)?;
                }
                ConfigAction::Show => {
                    println!("{}", config.to_toml()?);
                }
            }
        }
        Commands::Distro => {
            let distro = app::discover_distro()?;
            match serde_json::to_string_pretty(&distro) {
                Ok(json) => println!("{json}"),
                Err(err) => error!("unable to render distribution: {}", err),
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli().await {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}
