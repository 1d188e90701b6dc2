use anyhow::{Context, Result};
use clap::CommandFactory as _;

mod application_lifecycle;
mod client;
mod config;
mod daemon;
mod opts;
mod presenter;

fn main() {
    let opts: opts::Opt = opts::Opt::from_env();

    let log_level_filter = if opts.log_debug { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    if std::env::var("RUST_LOG").is_ok() {
        pretty_env_logger::init_timed();
    } else {
        pretty_env_logger::formatted_timed_builder()
            .filter(Some("pedal_indicator"), log_level_filter)
            .filter(Some("pedal_bus"), log_level_filter)
            .init();
    }

    if let opts::Action::ShellCompletions { shell } = opts.action {
        clap_complete::generate(shell, &mut opts::RawOpt::command(), "pedal-indicator", &mut std::io::stdout());
        return;
    }

    if let Err(err) = run(opts) {
        log::error!("{:?}", err);
        std::process::exit(1);
    }
}

fn run(opts: opts::Opt) -> Result<()> {
    let config = config::Config::load(opts.config_path.as_deref())?;
    let identity = config.identity(&opts.overrides).context("Invalid bus identity")?;
    log::debug!("Using {:?}", identity);

    match opts.action {
        opts::Action::ShellCompletions { .. } => unreachable!(),
        opts::Action::Daemon => daemon::initialize_daemon(identity),
        action => {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().context("Failed to initialize tokio runtime")?;
            rt.block_on(run_client(action, &identity))
        }
    }
}

async fn run_client(action: opts::Action, identity: &pedal_bus::BusIdentity) -> Result<()> {
    match action {
        opts::Action::Send { entries } => {
            let event = pedal_bus::KeyActionEvent::new(entries)?;
            client::send(identity, &event).await
        }
        opts::Action::Hello { name } => {
            println!("{}", client::hello(identity, &name).await?);
            Ok(())
        }
        opts::Action::Feature { enabled } => {
            let enabled = client::feature(identity, enabled).await?;
            println!("{}", if enabled { "on" } else { "off" });
            Ok(())
        }
        opts::Action::ShellCompletions { .. } | opts::Action::Daemon => unreachable!(),
    }
}
