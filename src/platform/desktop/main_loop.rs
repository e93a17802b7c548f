use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    path::{Path, PathBuf},
    str::FromStr,
    time::{Duration, Instant},
};

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::{error, info, warn, LevelFilter};

use crate::{
    error::{Result, SimulationError},
    floating_type_mod::FT,
    init_fluid_sim, write_statistics, FluidSimulation, SceneConfig, SimulationParams,
};

use super::{
    driver::{load_scene_config_file, load_simulation_params_file, DriverControl},
    vtk_exporter::VtkExporter,
};

const CARGO_PKG_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
const CARGO_PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(50);
const PROGRESS_INTERVAL: usize = 100;

struct RunOptions {
    max_steps: Option<usize>,
    max_seconds: Option<FT>,
    vtk_output: Option<PathBuf>,
    export_every: usize,
    statistics_enabled: bool,
    statistics_path: Option<PathBuf>,
}

fn parse_value<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>> {
    matches
        .value_of(name)
        .map(|x| {
            x.parse::<T>()
                .map_err(|_| SimulationError::InvalidParameter(format!("invalid value '{}' for {}", x, name)))
        })
        .transpose()
}

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

pub fn start() -> Result<()> {
    let matches = App::new("SPH Fluid Simulation")
        .version(CARGO_PKG_VERSION)
        .author(CARGO_PKG_AUTHORS)
        .about(CARGO_PKG_DESCRIPTION)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("run")
                .about("Run simulation with given config")
                .after_help("While running, type `p` (pause/resume), `r` (restart) or `q` (quit) followed by enter.")
                .arg(
                    Arg::with_name("SIMULATION_CONFIG")
                        .help("Sets the simulation paramaters")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("SCENE_CONFIG")
                        .help("Scene setup")
                        .required(true)
                        .index(2),
                )
                .arg(
                    Arg::with_name("MAX_STEPS")
                        .long("max-steps")
                        .short("n")
                        .required(false)
                        .takes_value(true)
                        .help("Stop simulation after the given number of steps"),
                )
                .arg(
                    Arg::with_name("MAX_SECONDS")
                        .long("max-seconds")
                        .short("s")
                        .required(false)
                        .takes_value(true)
                        .help("Stop simulation after the given amount of simulated seconds"),
                )
                .arg(
                    Arg::with_name("OVERWRITE_CONFIG_FILE")
                        .long("overwrite-config-file")
                        .short("c")
                        .required(false)
                        .takes_value(true)
                        .help("Overwrite config"),
                )
                .arg(
                    Arg::with_name("VTK_OUTPUT")
                        .long("vtk-output")
                        .short("o")
                        .required(false)
                        .takes_value(true)
                        .help("Directory to write VTK frames to"),
                )
                .arg(
                    Arg::with_name("EXPORT_EVERY")
                        .long("export-every")
                        .short("e")
                        .takes_value(true)
                        .default_value("1")
                        .help("Export a VTK frame every N steps"),
                )
                .arg(
                    Arg::with_name("STATISTICS_ENABLED")
                        .help("Track performance of individual steps")
                        .short("p")
                        .long("statistics-enabled")
                        .takes_value(false),
                )
                .arg(
                    Arg::with_name("STATISTICS_PATH")
                        .long("statistics-path")
                        .short("w")
                        .required(false)
                        .takes_value(true)
                        .help("Where to write statistics to"),
                ),
        )
        .get_matches();

    init_logging(matches.occurrences_of("v"));

    if let Some(run_matches) = matches.subcommand_matches("run") {
        let parameter_file = run_matches
            .value_of("SIMULATION_CONFIG")
            .ok_or_else(|| SimulationError::InvalidParameter("missing simulation config".into()))?;
        let scene_file = run_matches
            .value_of("SCENE_CONFIG")
            .ok_or_else(|| SimulationError::InvalidParameter("missing scene config".into()))?;

        let simulation_params = load_simulation_params_file(
            Path::new(parameter_file),
            run_matches.value_of("OVERWRITE_CONFIG_FILE").map(Path::new),
        )?;
        info!("{:?}", simulation_params);

        let scene_config = load_scene_config_file(Path::new(scene_file))?;
        info!("{:?}", scene_config);

        let export_every: usize = parse_value(run_matches, "EXPORT_EVERY")?.unwrap_or(1);
        if export_every == 0 {
            return Err(SimulationError::InvalidParameter("--export-every must be at least 1".into()));
        }

        let options = RunOptions {
            max_steps: parse_value(run_matches, "MAX_STEPS")?,
            max_seconds: parse_value(run_matches, "MAX_SECONDS")?,
            vtk_output: run_matches.value_of("VTK_OUTPUT").map(PathBuf::from),
            export_every,
            statistics_enabled: run_matches.is_present("STATISTICS_ENABLED"),
            statistics_path: run_matches.value_of("STATISTICS_PATH").map(PathBuf::from),
        };

        let control = DriverControl::new();
        let _stdin_listener = control.spawn_stdin_listener();

        let fluid_simulation = fluid_main(&control, simulation_params, &scene_config, &options)?;

        if options.statistics_enabled {
            let s = write_statistics(&fluid_simulation);
            print!("{}", s);
            if let Some(statistics_path) = &options.statistics_path {
                std::fs::write(statistics_path, s)?;
            }
        }
    }

    Ok(())
}

fn new_simulation(
    simulation_params: SimulationParams,
    scene_config: &SceneConfig,
    options: &RunOptions,
) -> Result<FluidSimulation> {
    let mut fluid_simulation = init_fluid_sim(simulation_params, scene_config)?;
    fluid_simulation.enable_statistics(options.statistics_enabled);
    Ok(fluid_simulation)
}

fn fluid_main(
    control: &DriverControl,
    simulation_params: SimulationParams,
    scene_config: &SceneConfig,
    options: &RunOptions,
) -> Result<FluidSimulation> {
    let mut fluid_simulation = new_simulation(simulation_params, scene_config, options)?;

    let mut vtk_exporter = match &options.vtk_output {
        Some(folder) => Some(VtkExporter::new(folder, "sph-fluid")?),
        None => None,
    };

    let mut total_duration: Duration = Duration::from_nanos(0);
    let mut total_number_of_frames: u32 = 0;

    let mut failed_step: Option<usize> = None;

    loop {
        if control.is_cancelled() {
            break;
        }

        if control.take_restart() {
            fluid_simulation = new_simulation(simulation_params, scene_config, options)?;
            failed_step = None;
            info!("restarted simulation");
        }

        if control.take_toggle_pause() {
            fluid_simulation.toggle_pause();
        }

        if failed_step.is_some() || fluid_simulation.is_paused() {
            if control.is_input_closed() {
                warn!("simulation is halted and no more commands can arrive, stopping");
                break;
            }
            std::thread::sleep(PAUSE_POLL_INTERVAL);
            continue;
        }

        // perform the main loop
        let a = Instant::now();
        let step_result = catch_unwind(AssertUnwindSafe(|| {
            fluid_simulation.single_step();
        }));
        let b = Instant::now();

        if step_result.is_err() {
            let step = fluid_simulation.step_number() + 1;
            error!("simulation step {} failed, type `r` to restart or `q` to quit", step);
            failed_step = Some(step);
            continue;
        }

        total_duration += b - a;
        total_number_of_frames += 1;

        let step_number = fluid_simulation.step_number();
        if let Some(vtk_exporter) = &mut vtk_exporter {
            if step_number % options.export_every == 0 {
                vtk_exporter.add_snapshot(fluid_simulation.time, &fluid_simulation.particles)?;
            }
        }

        if step_number % PROGRESS_INTERVAL == 0 {
            info!(
                "{:05}: {} fluid particles {}msec ({}msec AVG)",
                step_number,
                fluid_simulation.num_fluid_particles(),
                (b - a).as_secs_f32() * 1000.,
                (total_duration / total_number_of_frames).as_secs_f32() * 1000.
            );
        }

        if let Some(max_steps) = options.max_steps {
            if step_number >= max_steps {
                break;
            }
        }

        if let Some(max_seconds) = options.max_seconds {
            if fluid_simulation.time >= max_seconds {
                break;
            }
        }
    }

    finish_run(fluid_simulation, failed_step)
}

/// A run that stopped on a failed step is an error, even after `q`.
fn finish_run(fluid_simulation: FluidSimulation, failed_step: Option<usize>) -> Result<FluidSimulation> {
    match failed_step {
        Some(step) => Err(SimulationError::StepFailed(step)),
        None => Ok(fluid_simulation),
    }
}
