//! Voltaic - circuit simulation from the command line.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug voltaic circuit.json --duration-ms 2000 --every 10
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use voltaic_core::{error::Result, CircuitDescription, Simulator};

/// Fixed-timestep circuit simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the circuit description file (.json)
    #[arg(value_name = "CIRCUIT_JSON")]
    circuit_file: PathBuf,

    /// Real time to simulate in milliseconds
    #[arg(short, long, default_value_t = 1000.0)]
    duration_ms: f64,

    /// Real time per advance call in milliseconds
    #[arg(short, long, default_value_t = 16.0)]
    frame_ms: f64,

    /// Override the simulation timestep (seconds)
    #[arg(long)]
    timestep: Option<f64>,

    /// Override simulated seconds per real second
    #[arg(long)]
    sim_time_per_sec: Option<f64>,

    /// Override the Newton-Raphson seed
    #[arg(long)]
    seed: Option<u64>,

    /// Print the state every N frames (0 prints only the final state)
    #[arg(short, long, default_value_t = 0)]
    every: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let mut description = CircuitDescription::from_file(&args.circuit_file)?;
    if let Some(timestep) = args.timestep {
        description.simulation.timestep = timestep;
    }
    if let Some(rate) = args.sim_time_per_sec {
        description.simulation.sim_time_per_sec = rate;
    }
    if let Some(seed) = args.seed {
        description.simulation.seed = seed;
    }
    if !(args.frame_ms > 0.0) {
        return Err(voltaic_core::SimError::invalid_simulation_param(
            "frame-ms must be > 0",
        ));
    }

    let mut sim = Simulator::new();
    sim.load_description(&description)?;
    if let Some(e) = sim.last_error() {
        eprintln!("error: {e}");
        return Ok(ExitCode::FAILURE);
    }
    sim.start();

    let frames = (args.duration_ms / args.frame_ms).ceil() as usize;
    let failed = drive(&mut sim, frames, args.frame_ms, |frame, sim| {
        if args.every > 0 && frame % args.every == 0 && frame != frames {
            print_state(sim);
        }
    });
    print_state(&sim);

    if failed {
        match sim.last_error() {
            Some(e) => eprintln!("error: {e}"),
            None => eprintln!("error: some ticks failed and were retried"),
        }
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Advance `frames` times, calling `on_frame` after each. Returns whether any
/// frame ended with an error, even if later frames recovered.
fn drive(
    sim: &mut Simulator,
    frames: usize,
    frame_ms: f64,
    mut on_frame: impl FnMut(usize, &mut Simulator),
) -> bool {
    let mut failed = false;
    for frame in 1..=frames {
        sim.advance(frame_ms);
        failed |= sim.last_error().is_some();
        on_frame(frame, sim);
    }
    failed
}

fn print_state(sim: &Simulator) {
    println!("t = {:.6e} s", sim.sim_time());
    println!(
        "{:<6} {:<12} {:<16} {:<36} currents (A)",
        "id", "name", "type", "voltages (V)"
    );
    for component in sim.graph().components() {
        let Some(state) = sim.component_state(component.id()) else {
            continue;
        };
        println!(
            "{:<6} {:<12} {:<16} {:<36} {}",
            component.id().to_string(),
            component.name(),
            component.kind(),
            format_values(&state.voltages),
            format_values(&state.currents)
        );
    }
    println!();
}

fn format_values(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{v:+.4e}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIVIDER: &str = r#"{"components": [
        { "id": 0, "type": "voltage_source", "nodes": [0, 1], "voltage": 5 },
        { "id": 1, "type": "resistor", "nodes": [1, 2], "resistance": 1000 },
        { "id": 2, "type": "resistor", "nodes": [2, 0], "resistance": 1000 }
    ]}"#;

    // Two sources forcing different voltages on one node
    const CONFLICT: &str = r#"{"components": [
        { "id": 0, "type": "voltage_source", "nodes": [0, 1], "voltage": 5 },
        { "id": 1, "type": "voltage_source", "nodes": [0, 1], "voltage": 3 },
        { "id": 2, "type": "resistor", "nodes": [1, 0], "resistance": 1000 }
    ]}"#;

    fn simulator(json: &str) -> Simulator {
        let mut sim = Simulator::new();
        sim.load_description(&CircuitDescription::from_json(json).unwrap())
            .unwrap();
        sim.start();
        sim
    }

    #[test]
    fn test_drive_clean_run() {
        let mut sim = simulator(DIVIDER);
        let mut seen = Vec::new();
        assert!(!drive(&mut sim, 3, 16.0, |frame, _| seen.push(frame)));
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_drive_remembers_failure_after_recovery() {
        let mut sim = simulator(CONFLICT);
        let divider = CircuitDescription::from_json(DIVIDER).unwrap();
        let failed = drive(&mut sim, 3, 16.0, |frame, sim| {
            if frame == 1 {
                sim.load_description(&divider).unwrap();
            }
        });
        assert!(sim.last_error().is_none());
        assert!(failed);
    }
}
