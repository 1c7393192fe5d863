use numpy::ndarray::Array2;
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::{EngineConfig, Thermostat};
use crate::core::vector::{Vector, DIM};
use crate::core::{Boundary, GasSide, MovingBoundary, PairPotential, Simulation};

fn py_err<E: ToString>(e: E) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn to_array(rows: impl ExactSizeIterator<Item = Vector>) -> Array2<f64> {
    let mut arr = Array2::<f64>::zeros((rows.len(), DIM));
    for (i, row) in rows.enumerate() {
        for k in 0..DIM {
            arr[[i, k]] = row[k];
        }
    }
    arr
}

fn from_array(arr: &PyReadonlyArray2<'_, f64>, n: usize, what: &str) -> PyResult<Vec<Vector>> {
    let arr = arr.as_array();
    if arr.shape() != [n, DIM] {
        return Err(py_err(format!(
            "{what} must have shape ({n}, {DIM}), got {:?}",
            arr.shape()
        )));
    }
    Ok((0..n)
        .map(|i| {
            let mut row = [0.0; DIM];
            for (k, x) in row.iter_mut().enumerate() {
                *x = arr[[i, k]];
            }
            row
        })
        .collect())
}

/// Python-facing wrapper around the hard-particle engine.
///
/// - __new__(num_particles, box_size, diameter=1.0, mass=1.0, temperature=1.0,
///   well_width=None, well_depth=1.0, periodic=True, seed=None)
/// - advance_to(time), step(), advance_events(n)
/// - get_positions() / get_velocities() -> np.ndarray (N, 3)
/// - set_positions(arr) / set_velocities(arr): re-predict every event
/// - set_isothermal(temperature, thermostat="andersen", interval=100)
#[pyclass(unsendable)]
pub struct HardSim {
    sim: Simulation,
}

#[pymethods]
impl HardSim {
    /// One-species gas at random non-overlapping positions with thermal velocities.
    ///
    /// `well_width` (lambda > 1) turns hard spheres into a square well of depth `well_depth`.
    /// `periodic=False` closes the box with hard walls.
    #[new]
    #[pyo3(signature = (num_particles, box_size, diameter=1.0, mass=1.0, temperature=1.0, well_width=None, well_depth=1.0, periodic=true, seed=None))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        num_particles: usize,
        box_size: Vec<f64>,
        diameter: f64,
        mass: f64,
        temperature: f64,
        well_width: Option<f64>,
        well_depth: f64,
        periodic: bool,
        seed: Option<u64>,
    ) -> PyResult<Self> {
        let size: Vector = box_size
            .try_into()
            .map_err(|_| py_err(format!("box_size must have length {DIM}")))?;
        let boundary = Boundary::new(size, [periodic; DIM]).map_err(py_err)?;
        let potential = match well_width {
            Some(lambda) => PairPotential::square_well(diameter, lambda, well_depth),
            None => PairPotential::hard_sphere(diameter),
        }
        .map_err(py_err)?;
        let config = EngineConfig {
            seed,
            ..EngineConfig::default()
        };
        let sim = Simulation::random_gas(config, boundary, num_particles, mass, potential, temperature)
            .map_err(py_err)?;
        Ok(Self { sim })
    }

    /// Current simulation time.
    fn time(&self) -> f64 {
        self.sim.current_time()
    }

    /// Advance to the given absolute time.
    fn advance_to(&mut self, target_time: f64) -> PyResult<()> {
        self.sim.advance_to(target_time).map_err(py_err)
    }

    fn step(&mut self) -> PyResult<()> {
        self.sim.step().map_err(py_err)
    }

    /// Process `n` events; returns how many were processed.
    fn advance_events(&mut self, n: usize) -> PyResult<usize> {
        self.sim.advance_events(n).map_err(py_err)
    }

    fn get_positions(&self, py: Python<'_>) -> PyResult<Py<PyArray2<f64>>> {
        let arr = to_array(self.sim.particles().iter().map(|p| p.r));
        Ok(arr.into_pyarray(py).to_owned().into())
    }

    fn get_velocities(&self, py: Python<'_>) -> PyResult<Py<PyArray2<f64>>> {
        let arr = to_array(self.sim.particles().iter().map(|p| p.v));
        Ok(arr.into_pyarray(py).to_owned().into())
    }

    /// Caller is responsible for a non-overlapping configuration.
    fn set_positions(&mut self, positions: PyReadonlyArray2<'_, f64>) -> PyResult<()> {
        let rows = from_array(&positions, self.sim.num_particles(), "positions")?;
        self.sim.set_positions(&rows).map_err(py_err)
    }

    fn set_velocities(&mut self, velocities: PyReadonlyArray2<'_, f64>) -> PyResult<()> {
        let rows = from_array(&velocities, self.sim.num_particles(), "velocities")?;
        self.sim.set_velocities(&rows).map_err(py_err)
    }

    /// Install a piston normal to `axis`. `mass=None` makes it stationary.
    #[pyo3(signature = (axis, position, pressure, mass=None, collision_radius=0.5, gas_below=true))]
    fn set_piston(
        &mut self,
        axis: usize,
        position: f64,
        pressure: f64,
        mass: Option<f64>,
        collision_radius: f64,
        gas_below: bool,
    ) -> PyResult<()> {
        let side = if gas_below { GasSide::Below } else { GasSide::Above };
        let piston = MovingBoundary::new(
            axis,
            position,
            mass.unwrap_or(f64::INFINITY),
            pressure,
            collision_radius,
            side,
        )
        .map_err(py_err)?;
        self.sim.set_piston(Some(piston)).map_err(py_err)
    }

    fn set_piston_pressure(&mut self, pressure: f64) -> PyResult<()> {
        self.sim.set_piston_pressure(pressure).map_err(py_err)
    }

    /// `(position, velocity)` of the piston, or None.
    fn get_piston_state(&self) -> Option<(f64, f64)> {
        self.sim.piston().map(|p| (p.position(), p.velocity()))
    }

    fn scale_velocities(&mut self, factor: f64) -> PyResult<()> {
        self.sim.scale_velocities(factor).map_err(py_err)
    }

    /// Couple to a heat bath. `thermostat` is "andersen", "andersen_single"
    /// or "velocity_scaling"; it fires every `interval` calls to `step()`.
    #[pyo3(signature = (temperature, thermostat="andersen", interval=100))]
    fn set_isothermal(&mut self, temperature: f64, thermostat: &str, interval: u32) -> PyResult<()> {
        let kind = match thermostat {
            "andersen" => Thermostat::Andersen,
            "andersen_single" => Thermostat::AndersenSingle,
            "velocity_scaling" => Thermostat::VelocityScaling,
            other => return Err(py_err(format!("unknown thermostat {other:?}"))),
        };
        self.sim.set_temperature(temperature).map_err(py_err)?;
        self.sim.set_thermostat(kind, interval).map_err(py_err)?;
        self.sim.set_isothermal(true).map_err(py_err)
    }

    fn set_adiabatic(&mut self) -> PyResult<()> {
        self.sim.set_isothermal(false).map_err(py_err)
    }

    fn kinetic_temperature(&self) -> f64 {
        self.sim.kinetic_temperature()
    }

    fn kinetic_energy(&self) -> f64 {
        self.sim.kinetic_energy()
    }

    fn potential_energy(&self) -> f64 {
        self.sim.potential_energy_of_system()
    }

    fn total_energy(&self) -> f64 {
        self.sim.total_energy()
    }
}

/// The hardmd Python module entry point.
#[pymodule]
fn hardmd(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<HardSim>()?;
    Ok(())
}
