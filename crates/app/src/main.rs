//! `cellstack`: runs a constant-current discharge of a cell stack and writes
//! the trace to CSV. See `cellstack --help` for the flags.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use electrical::analysis::{simulate_battery_discharge, DischargeResult};
use electrical::{BoundPolicy, CellParameters};
use log::{info, warn, LevelFilter};
use serde::Serialize;
use simcore::IntegrationScheme;
use simplelog::{ColorChoice, CombinedLogger, Config, SharedLogger, TermLogger, TerminalMode, WriteLogger};

/// Built-in parameter sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Preset {
    /// 2.5 Ah lithium-ion 18650 cell
    #[value(name = "18650")]
    LithiumIon18650,
    /// 1 A·h linear 3.0 V to 4.2 V reference cell
    Linear,
}

#[derive(Debug, Clone, PartialEq, Parser)]
#[command(name = "cellstack", version, about = "Constant-current discharge of an equivalent-circuit cell stack")]
struct RunOptions {
    /// JSON parameter file, used instead of --preset
    #[arg(short, long, conflicts_with = "preset")]
    params: Option<PathBuf>,

    /// Built-in parameter set
    #[arg(long, value_enum, default_value_t = Preset::LithiumIon18650)]
    preset: Preset,

    /// Terminal current (A), positive discharges
    #[arg(short = 'i', long, default_value_t = 2.5, allow_negative_numbers = true)]
    current: f64,

    /// Simulated time (s)
    #[arg(short = 't', long, default_value_t = 7200.0)]
    duration: f64,

    /// Fixed step size (s)
    #[arg(long, default_value_t = 1.0)]
    dt: f64,

    /// Integration scheme: explicit_euler, trapezoidal or runge_kutta4
    #[arg(long, value_parser = parse_scheme)]
    scheme: Option<IntegrationScheme>,

    /// Log SOC bound violations instead of failing on them
    #[arg(long = "warn")]
    warn_only: bool,

    /// CSV trace output
    #[arg(long, default_value = "discharge.csv")]
    csv: PathBuf,

    /// Also write a trace-level log to this file
    #[arg(long = "log")]
    log_file: Option<PathBuf>,

    /// Debug-level terminal output
    #[arg(short, long)]
    verbose: bool,
}

/// Summary printed as JSON once the run ends.
#[derive(Debug, Serialize)]
struct RunSummary {
    rows: usize,
    final_time_s: f64,
    final_soc: f64,
    final_voltage: f64,
    delivered_energy_wh: f64,
    fault: Option<String>,
}

impl RunSummary {
    fn from_result(result: &DischargeResult) -> Self {
        RunSummary {
            rows: result.len(),
            final_time_s: result.times.last().copied().unwrap_or(0.0),
            final_soc: result.soc.last().copied().unwrap_or(f64::NAN),
            final_voltage: result.voltages.last().copied().unwrap_or(f64::NAN),
            delivered_energy_wh: result.delivered_energy_wh(),
            fault: result.fault.map(|f| f.to_string()),
        }
    }
}

/// Reads a scheme name through its serde representation.
fn parse_scheme(name: &str) -> Result<IntegrationScheme, String> {
    serde_json::from_value(serde_json::Value::String(name.to_string()))
        .map_err(|_| format!("unknown integration scheme '{name}'"))
}

fn load_params(opts: &RunOptions) -> Result<CellParameters, Box<dyn std::error::Error>> {
    let mut params = match &opts.params {
        Some(path) => CellParameters::from_json_file(path)?,
        None => match opts.preset {
            Preset::LithiumIon18650 => CellParameters::lithium_ion_18650(),
            Preset::Linear => CellParameters::linear_reference(),
        },
    };
    if let Some(scheme) = opts.scheme {
        params.integration = scheme;
    }
    if opts.warn_only {
        params.bound_policy = BoundPolicy::Warn;
    }
    Ok(params)
}

fn init_logging(opts: &RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let level = if opts.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let mut loggers: Vec<Box<dyn SharedLogger>> =
        vec![TermLogger::new(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)];
    if let Some(path) = &opts.log_file {
        loggers.push(WriteLogger::new(LevelFilter::Trace, Config::default(), File::create(path)?));
    }
    CombinedLogger::init(loggers)?;
    Ok(())
}

fn write_csv(path: &Path, result: &DischargeResult) -> std::io::Result<()> {
    let mut csv = BufWriter::new(File::create(path)?);
    writeln!(csv, "t,voltage,soc,power,heat")?;
    for i in 0..result.len() {
        writeln!(
            csv,
            "{:.6},{:.6},{:.9},{:.6},{:.6}",
            result.times[i], result.voltages[i], result.soc[i], result.power[i], result.heat_flow[i]
        )?;
    }
    csv.flush()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opts = RunOptions::parse();
    init_logging(&opts)?;

    let params = load_params(&opts)?;
    info!(
        "{}s{}p stack, {:.0} A·s, {:.3} Ohm; discharging at {} A for {} s (dt {} s, {:?})",
        params.ns,
        params.np,
        params.stack_capacity(),
        params.stack_resistance(),
        opts.current,
        opts.duration,
        opts.dt,
        params.integration
    );

    let result = simulate_battery_discharge(&params, opts.current, opts.duration, opts.dt)?;
    if let Some(fault) = &result.fault {
        warn!("{fault}");
    }

    write_csv(&opts.csv, &result)?;
    info!("wrote {} rows to {}", result.len(), opts.csv.display());

    let summary = RunSummary::from_result(&result);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
