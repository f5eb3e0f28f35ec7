//! Scripted drive against the simulated chassis.
//!
//! Usage: `swerve-drive-app [CONFIG.json] [off|error|warn|info|debug|trace]`
//!
//! Runs forward, strafe, spin, a field-relative diagonal while spinning and a
//! stop, logs the pose along the way and prints the final telemetry as JSON.

use std::error::Error;
use std::str::FromStr;

use log::{LevelFilter, info, warn};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use drivecore::{CycleContext, DriveBus, PlantModel};
use drivetrain::{DrivetrainConfig, MovementCheck, SwerveDrive};
use plant::{PlantConfig, SimulatedDrivetrain};

const LOG_INTERVAL: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
enum Command {
    Drive { vx: f64, vy: f64, rot: f64, field_relative: bool },
    Stop,
}

struct Phase {
    name: &'static str,
    seconds: f64,
    command: Command,
}

fn script() -> Vec<Phase> {
    vec![
        Phase { name: "forward", seconds: 2.0, command: Command::Drive { vx: 1.5, vy: 0.0, rot: 0.0, field_relative: false } },
        Phase { name: "strafe", seconds: 2.0, command: Command::Drive { vx: 0.0, vy: 1.0, rot: 0.0, field_relative: false } },
        Phase { name: "spin", seconds: 2.0, command: Command::Drive { vx: 0.0, vy: 0.0, rot: 0.5, field_relative: false } },
        Phase {
            name: "field diagonal",
            seconds: 3.0,
            command: Command::Drive { vx: 1.0, vy: 1.0, rot: 0.25, field_relative: true },
        },
        Phase { name: "stop", seconds: 1.0, command: Command::Stop },
    ]
}

fn plant_config(config: &DrivetrainConfig) -> PlantConfig {
    PlantConfig {
        geometry: config.geometry.clone(),
        max_wheel_speed: config.max_speed,
        angle_offsets: config.angle_offsets,
        heading_convention: config.heading,
        ..PlantConfig::default()
    }
    .with_noise(0.002, 0.01, 0.001)
}

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let level = match args.get(1) {
        Some(level) => LevelFilter::from_str(level).map_err(|_| format!("unknown log level '{level}'"))?,
        None => LevelFilter::Info,
    };
    TermLogger::init(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)?;

    let config = match args.first() {
        Some(path) => {
            info!("Loading drivetrain config from {}", path);
            DrivetrainConfig::load(path)?
        }
        None => DrivetrainConfig::default(),
    };
    let period = config.period;

    let mut plant = SimulatedDrivetrain::new(plant_config(&config))?;
    let mut drive = SwerveDrive::new(config)?;
    let mut bus = DriveBus::default();
    plant.sense(&mut bus.sensors);

    let mut check = MovementCheck::default();
    let mut t = 0.0;
    let mut next_log = 0.0;

    for phase in script() {
        info!("Phase: {} ({} s)", phase.name, phase.seconds);
        match phase.command {
            Command::Drive { vx, vy, rot, field_relative } => drive.drive(vx, vy, rot, field_relative),
            Command::Stop => drive.stop(),
        }

        let cycles = (phase.seconds / period).round() as usize;
        for _ in 0..cycles {
            let ctx = CycleContext { dt: period, t };
            plant.step_plant(ctx, &mut bus);
            drive.periodic(ctx, &mut bus);
            if phase.name == "forward" {
                check.record(&drive);
            }

            t += period;
            if t >= next_log {
                let pose = drive.pose();
                let truth = plant.true_pose();
                info!(
                    "t={:.2} pose=({:.3}, {:.3}, {:.3}) error={:.4} m",
                    t,
                    pose.x,
                    pose.y,
                    pose.heading,
                    pose.distance_to(&truth)
                );
                next_log += LOG_INTERVAL;
            }
        }
    }

    if !check.report() {
        warn!("Movement check failed for {:?}", check.failures());
    }

    let telemetry = drive.telemetry().rounded();
    println!("{}", serde_json::to_string_pretty(&telemetry)?);
    Ok(())
}
