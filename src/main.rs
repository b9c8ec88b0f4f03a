use std::process;

use cachemgr::{
    config::{self, Command},
    infra::{error::InfraError, telemetry},
    management::{ExposureGateway, ManagementError},
    manager::ManagerBuilder,
};
use thiserror::Error;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[derive(Debug, Error)]
enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("management call failed: {0}")]
    Management(#[from] ManagementError),
    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

fn main() {
    if let Err(error) = run() {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let manager = ManagerBuilder::from_settings(&settings).build()?;
    info!(object_name = %manager.object_name(), "Inspecting cache manager");

    let gateway = manager.gateway();
    let result = match cli_args.command.unwrap_or(Command::Inspect) {
        Command::Inspect => print_attributes(&gateway),
        Command::Describe => print_json(&gateway.describe()),
        Command::Attr(args) => {
            let value = gateway.get_attribute(&args.name)?;
            print_json(&value)
        }
        Command::Invoke(args) => {
            let arguments: Vec<&str> = args.args.iter().map(String::as_str).collect();
            gateway.invoke(&args.operation, &arguments)?;
            print_attributes(&gateway)
        }
    };

    manager.stop();
    result
}

fn print_attributes(gateway: &ExposureGateway) -> Result<(), AppError> {
    print_json(&gateway.attributes())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
