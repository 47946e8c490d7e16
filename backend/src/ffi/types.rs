//! Type conversion utilities for FFI boundary
//!
//! Converts between Rust types and PyO3-compatible types (PyDict, PyList).

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::arrivals::DispatchPolicy;
use crate::orchestrator::{
    EngineConfig, LineStatistics, MachineStatistics, SimulationStatsResponse, Topology,
};
use crate::rng::Variate;

/// Extract an optional field from a Python dict
///
/// Missing keys and `None` values both yield `Ok(None)`.
fn extract_optional<'py, T>(dict: &Bound<'py, PyDict>, key: &str) -> PyResult<Option<T>>
where
    T: FromPyObject<'py>,
{
    match dict.get_item(key)? {
        Some(value) if !value.is_none() => value
            .extract::<T>()
            .map(Some)
            .map_err(|e| PyValueError::new_err(format!("Invalid '{}': {}", key, e))),
        _ => Ok(None),
    }
}

/// `(mean, deviation)` pairs to variates
fn extract_variates(dict: &Bound<'_, PyDict>, key: &str) -> PyResult<Option<Vec<Variate>>> {
    let pairs: Option<Vec<(f64, f64)>> = extract_optional(dict, key)?;
    Ok(pairs.map(|pairs| pairs.into_iter().map(Variate::from).collect()))
}

/// Build an [`EngineConfig`] from a Python dict
///
/// Every key is optional:
///
/// ```python
/// {
///     "arrival": (2.5, 0.5),
///     "service_times": [(12, 1), (13, 3), (7, 1), (8, 3)],
///     "transfer_times": [(2, 1), (1, 1), (3, 1)],
///     "dispatch": "round_robin",      # or "random", "smart"
///     "topology": "per_machine",      # or "per_line"
///     "time_scale": 0.01,
///     "poll_interval_ms": 50,
///     "rng_seed": 12345,
/// }
/// ```
pub fn parse_engine_config(dict: &Bound<'_, PyDict>) -> PyResult<EngineConfig> {
    let mut config = EngineConfig::default();

    if let Some((mean, deviation)) = extract_optional::<(f64, f64)>(dict, "arrival")? {
        config.arrival = Variate::new(mean, deviation);
    }
    if let Some(service) = extract_variates(dict, "service_times")? {
        config.service_times = service;
    }
    if let Some(transfer) = extract_variates(dict, "transfer_times")? {
        config.transfer_times = transfer;
    }
    if let Some(dispatch) = extract_optional::<String>(dict, "dispatch")? {
        config.dispatch = dispatch
            .parse::<DispatchPolicy>()
            .map_err(PyValueError::new_err)?;
    }
    if let Some(topology) = extract_optional::<String>(dict, "topology")? {
        config.topology = topology.parse::<Topology>().map_err(PyValueError::new_err)?;
    }
    if let Some(scale) = extract_optional(dict, "time_scale")? {
        config.time_scale = scale;
    }
    if let Some(poll) = extract_optional(dict, "poll_interval_ms")? {
        config.poll_interval_ms = poll;
    }
    config.rng_seed = extract_optional(dict, "rng_seed")?;

    Ok(config)
}

fn machine_to_py<'py>(py: Python<'py>, m: &MachineStatistics) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("machineIndex", m.machine_index)?;
    dict.set_item("utilization", m.utilization)?;
    dict.set_item("averageQueueTime", m.average_queue_time)?;
    dict.set_item("averageServiceTime", m.average_service_time)?;
    dict.set_item("maxQueueLength", m.max_queue_length)?;
    dict.set_item("processedCount", m.processed_count)?;
    Ok(dict)
}

fn line_to_py<'py>(py: Python<'py>, line: &LineStatistics) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("lineNumber", line.line_number)?;
    dict.set_item("completedCount", line.completed_count)?;
    dict.set_item("inQueueCount", line.in_queue_count)?;
    dict.set_item("inServiceCount", line.in_service_count)?;
    dict.set_item("inTransitCount", line.in_transit_count)?;

    let machines = PyList::empty_bound(py);
    for m in &line.machines {
        machines.append(machine_to_py(py, m)?)?;
    }
    dict.set_item("machines", machines)?;
    Ok(dict)
}

/// Statistics as a dict with the same camelCase keys as the JSON form
pub fn stats_to_py<'py>(
    py: Python<'py>,
    stats: &SimulationStatsResponse,
) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("totalArrived", stats.total_arrived)?;
    dict.set_item("totalProcessed", stats.total_processed)?;
    dict.set_item("totalUnprocessed", stats.total_unprocessed)?;
    dict.set_item("pendingCount", stats.pending_count)?;

    let lines = PyList::empty_bound(py);
    for line in &stats.lines {
        lines.append(line_to_py(py, line)?)?;
    }
    dict.set_item("lines", lines)?;
    Ok(dict)
}
