use electrical::{BatteryCellModel, CellParameters, Excitation, LumpedThermalMass};
use simcore::SimContext;
use std::fs::File;
use std::io::Write;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 18650 cell in a 4s2p pack, sitting in 25 C air
    let mut params = CellParameters::lithium_ion_18650();
    params.ns = 4;
    params.np = 2;
    let pack = LumpedThermalMass::new(4.0 * 2.0 * 45.0, 0.8, 298.15)?;
    let mut model = BatteryCellModel::new(params)?.with_thermal_sink(Box::new(pack));

    // Sim settings
    let dt = 0.1;
    let t_end = 3.0 * 3600.0;
    let base_current = 2.0;
    let pulse_current = 10.0;
    let pulse_period = 60.0;
    let pulse_duration = 5.0;

    let mut csv = File::create("pulse_discharge_step.csv")?;
    writeln!(csv, "t,terminal_v,ocv,soc,current,heat_w,temperature_k")?;

    let mut t = 0.0;
    while t < t_end {
        let current = if t % pulse_period < pulse_duration { pulse_current } else { base_current };
        let out = match model.step(SimContext::new(dt, t), Excitation::Current(current)) {
            Ok(out) => out,
            Err(e) => {
                println!("stopped at t = {t:.1} s: {e}");
                break;
            }
        };

        writeln!(
            csv,
            "{:.3},{:.6},{:.6},{:.6},{:.3},{:.6},{:.4}",
            out.time, out.terminal.voltage, out.open_circuit_voltage, out.soc, out.terminal.current, out.heat_flow, out.temperature
        )?;

        t += dt;
    }

    println!("Wrote pulse_discharge_step.csv");
    Ok(())
}
