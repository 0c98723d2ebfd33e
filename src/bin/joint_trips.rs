use clap::Parser;
use rust_joint_trips::simulation::config::{CommandLineArgs, Config};
use rust_joint_trips::simulation::controller::JointTripsController;
use rust_joint_trips::simulation::logging;
use rust_joint_trips::simulation::scenario::Scenario;
use std::process::ExitCode;
use tracing::{error, info};

const DEFAULT_COUPLES: u32 = 100;

fn main() -> ExitCode {
    let args = CommandLineArgs::parse();
    let couples = args.couples.unwrap_or(DEFAULT_COUPLES) as usize;
    let config = Config::from(args);
    let _guards = logging::init_logging(&config);

    info!("Creating corridor scenario with {couples} driver/passenger couples");
    let result = Scenario::corridor_couples("corridor", couples, false)
        .and_then(|scenario| JointTripsController::new(config, scenario))
        .and_then(|mut controller| {
            let summary = controller.run_iteration()?;
            controller.write_output(&summary);
            Ok(summary)
        });

    match result {
        Ok(summary) => {
            info!(
                driver_legs = summary.driver_legs,
                passenger_legs = summary.passenger_legs,
                joint_plans = summary.joint_plans,
                timeouts = summary.simulation.synchronization_timeouts,
                "Run finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Run failed: {e}");
            ExitCode::FAILURE
        }
    }
}
