use std::{
    collections::HashMap,
    io::BufRead,
    path::Path,
    sync::{Arc, Mutex},
    thread::JoinHandle,
};

use log::{info, warn};

use crate::{
    error::{Result, SimulationError},
    scene::SceneConfig,
    simulation_parameters::SimulationParams,
};

/// One line typed on stdin while the simulation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCommand {
    TogglePause,
    Restart,
    Quit,
}

impl DriverCommand {
    pub fn parse(line: &str) -> Option<DriverCommand> {
        match line.trim() {
            "p" | "pause" => Some(DriverCommand::TogglePause),
            "r" | "restart" => Some(DriverCommand::Restart),
            "q" | "quit" => Some(DriverCommand::Quit),
            _ => None,
        }
    }
}

fn take_flag(flag: &Mutex<bool>) -> bool {
    match flag.lock() {
        Ok(mut flag) => std::mem::replace(&mut *flag, false),
        Err(_) => false,
    }
}

fn read_flag(flag: &Mutex<bool>) -> bool {
    flag.lock().map(|flag| *flag).unwrap_or(false)
}

fn set_flag(flag: &Mutex<bool>) {
    if let Ok(mut flag) = flag.lock() {
        *flag = true;
    }
}

/**
 * Requests shared between the input thread and the simulation loop. The loop
 * polls them once per tick; a step in progress always runs to completion.
 */
#[derive(Clone, Default)]
pub struct DriverControl {
    cancel: Arc<Mutex<bool>>,
    restart: Arc<Mutex<bool>>,
    toggle_pause: Arc<Mutex<bool>>,
    input_closed: Arc<Mutex<bool>>,
}

impl DriverControl {
    pub fn new() -> DriverControl {
        DriverControl::default()
    }

    pub fn submit(&self, command: DriverCommand) {
        match command {
            DriverCommand::TogglePause => set_flag(&self.toggle_pause),
            DriverCommand::Restart => set_flag(&self.restart),
            DriverCommand::Quit => set_flag(&self.cancel),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        read_flag(&self.cancel)
    }

    pub fn take_restart(&self) -> bool {
        take_flag(&self.restart)
    }

    pub fn take_toggle_pause(&self) -> bool {
        take_flag(&self.toggle_pause)
    }

    /// No further commands can arrive once stdin reached EOF.
    pub fn is_input_closed(&self) -> bool {
        read_flag(&self.input_closed)
    }

    /** Reads commands line by line from stdin until EOF or `q`. */
    pub fn spawn_stdin_listener(&self) -> JoinHandle<()> {
        let control = self.clone();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!("stopped reading commands: {}", err);
                        break;
                    }
                };
                match DriverCommand::parse(&line) {
                    Some(command) => {
                        info!("received command {:?}", command);
                        control.submit(command);
                        if command == DriverCommand::Quit {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => warn!("unknown command '{}' (use p, r or q)", line.trim()),
                }
            }
            set_flag(&control.input_closed);
        })
    }
}

/**
 * Parses the simulation parameters. Every top-level key of the optional
 * overwrite file replaces the key of the same name in the parameter file.
 */
pub fn load_simulation_params(parameter_yaml: &str, overwrite_yaml: Option<&str>) -> Result<SimulationParams> {
    let mut simulation_params_serde: serde_yaml::Value = serde_yaml::from_str(parameter_yaml)?;

    if let Some(overwrite_yaml) = overwrite_yaml {
        let overwrite_config: HashMap<String, serde_yaml::Value> = serde_yaml::from_str(overwrite_yaml)?;
        let mapping = simulation_params_serde.as_mapping_mut().ok_or_else(|| {
            SimulationError::InvalidParameter("simulation parameter file is not a YAML mapping".into())
        })?;

        for (k, v) in overwrite_config.into_iter() {
            let entry = mapping
                .get_mut(&serde_yaml::Value::String(k.clone()))
                .ok_or_else(|| SimulationError::InvalidParameter(format!("not able to find attribute {}", k)))?;
            *entry = v;
        }
    }

    let simulation_params: SimulationParams = serde_yaml::from_value(simulation_params_serde)?;
    simulation_params.validate()?;
    Ok(simulation_params)
}

pub fn load_simulation_params_file(
    parameter_file: &Path,
    overwrite_file: Option<&Path>,
) -> Result<SimulationParams> {
    let params_yaml = std::fs::read_to_string(parameter_file)?;
    let overwrite_yaml = overwrite_file.map(std::fs::read_to_string).transpose()?;
    load_simulation_params(&params_yaml, overwrite_yaml.as_deref())
}

pub fn load_scene_config_file(scene_file: &Path) -> Result<SceneConfig> {
    let scene_yaml = std::fs::read_to_string(scene_file)?;
    let scene_config: SceneConfig = serde_yaml::from_str(&scene_yaml)?;
    scene_config.validate()?;
    Ok(scene_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: &str = include_str!("../../../configs/simulation.yaml");

    #[test]
    fn parses_commands() {
        assert_eq!(DriverCommand::parse("p\n"), Some(DriverCommand::TogglePause));
        assert_eq!(DriverCommand::parse(" r "), Some(DriverCommand::Restart));
        assert_eq!(DriverCommand::parse("quit"), Some(DriverCommand::Quit));
        assert_eq!(DriverCommand::parse("x"), None);
    }

    #[test]
    fn flags_are_consumed_once() {
        let control = DriverControl::new();
        assert!(!control.take_restart());

        control.submit(DriverCommand::Restart);
        control.submit(DriverCommand::TogglePause);
        assert!(control.clone().take_restart());
        assert!(!control.take_restart());
        assert!(control.take_toggle_pause());
        assert!(!control.is_cancelled());

        control.submit(DriverCommand::Quit);
        assert!(control.is_cancelled());
        assert!(control.is_cancelled());
    }

    #[test]
    fn overwrite_file_replaces_keys() {
        let params = load_simulation_params(PARAMS, Some("viscosity: 10.0\ntimestep_ms: 2.0\n")).unwrap();
        assert_eq!(params.viscosity, 10.);
        assert_eq!(params.timestep_ms, 2.);
        assert_eq!(params.stiffness, 1000.);
    }

    #[test]
    fn overwrite_with_unknown_key_is_an_error() {
        let result = load_simulation_params(PARAMS, Some("no_such_key: 1.0\n"));
        assert!(matches!(result, Err(SimulationError::InvalidParameter(_))));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(load_simulation_params(PARAMS, Some("timestep_ms: -7.0\n")).is_err());
        assert!(matches!(
            load_simulation_params("stiffness: [", None),
            Err(SimulationError::YamlError(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = load_scene_config_file(Path::new("/nonexistent/scene.yaml"));
        assert!(matches!(result, Err(SimulationError::IoError(_))));
    }
}
