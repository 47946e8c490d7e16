//! PyO3 wrapper for SimulationEngine
//!
//! # Example (from Python)
//!
//! ```python
//! from chip_simulator_core_rs import Engine
//!
//! engine = Engine({"time_scale": 0.01, "rng_seed": 12345})
//! engine.start(3, 4, 480.0)
//! while engine.is_running():
//!     print(engine.get_stats()["totalProcessed"])
//!     time.sleep(0.5)
//! ```

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use super::types::{parse_engine_config, stats_to_py};
use crate::orchestrator::{EngineConfig, SimulationEngine, SimulationError, StartOutcome};

fn to_py_err(err: SimulationError) -> PyErr {
    match err {
        SimulationError::InvalidConfig(_) | SimulationError::Serialization(_) => {
            PyValueError::new_err(err.to_string())
        }
        SimulationError::WorkerSpawn(_) => PyRuntimeError::new_err(err.to_string()),
    }
}

/// Python handle on a [`SimulationEngine`]
#[pyclass(name = "Engine")]
pub struct PyEngine {
    inner: SimulationEngine,
}

#[pymethods]
impl PyEngine {
    /// Create an idle engine; `config` keys are all optional
    ///
    /// Raises ValueError if a timing parameter is invalid.
    #[new]
    #[pyo3(signature = (config = None))]
    fn new(config: Option<&Bound<'_, PyDict>>) -> PyResult<Self> {
        let config = match config {
            Some(dict) => parse_engine_config(dict)?,
            None => EngineConfig::default(),
        };
        let inner = SimulationEngine::new(config).map_err(to_py_err)?;
        Ok(PyEngine { inner })
    }

    /// Start a run in the background
    ///
    /// Returns `False` if a run was already active.
    fn start(
        &self,
        py: Python<'_>,
        lines_count: usize,
        machines_per_line: usize,
        shift_duration_secs: f64,
    ) -> PyResult<bool> {
        let outcome = py
            .allow_threads(|| self.inner.start(lines_count, machines_per_line, shift_duration_secs))
            .map_err(to_py_err)?;
        Ok(outcome == StartOutcome::Started)
    }

    /// Stop the active run; blocks until every worker has exited
    fn stop(&self, py: Python<'_>) -> bool {
        py.allow_threads(|| self.inner.stop())
    }

    fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    fn get_stats<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let stats = py.allow_threads(|| self.inner.get_stats());
        stats_to_py(py, &stats)
    }

    /// Statistics serialized as JSON
    fn get_stats_json(&self) -> PyResult<String> {
        self.inner
            .get_stats()
            .to_json()
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    /// `{"runId": ..., "configHash": ...}` of the current or last run
    fn run_info<'py>(&self, py: Python<'py>) -> PyResult<Option<Bound<'py, PyDict>>> {
        let Some(info) = self.inner.run_info() else {
            return Ok(None);
        };
        let dict = PyDict::new_bound(py);
        dict.set_item("runId", info.run_id.to_string())?;
        dict.set_item("configHash", info.config_hash)?;
        dict.set_item("rngSeed", info.rng_seed)?;
        Ok(Some(dict))
    }
}
