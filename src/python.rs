//! Python bindings (feature `python`)

use crate::core::{SceneInputs, SceneRetrieval};
use crate::io::{read_gas_table, read_momo_lut, RetrievalConfig};
use crate::types::AotError;
use numpy::{IntoPyArray, PyReadonlyArray2};
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::sync::Arc;

fn to_py_err(e: AotError) -> PyErr {
    match e {
        AotError::Io(_) => PyIOError::new_err(e.to_string()),
        AotError::Config(_) | AotError::InconsistentInputs(_) | AotError::Json(_) => {
            PyValueError::new_err(e.to_string())
        }
        _ => PyRuntimeError::new_err(e.to_string()),
    }
}

/// Retrieve AOT for a scene.
///
/// Returns a dict with `aot` and `aot_uncertainty` arrays, plus
/// `fit_residual` and `curvature` when diagnostics are enabled.
#[pyfunction]
#[pyo3(signature = (config_path, lut_path, geometry, channels, surface_pressure, ozone, valid, ndvi=None, gas_lut_path=None))]
#[allow(clippy::too_many_arguments)]
fn retrieve_aot<'py>(
    py: Python<'py>,
    config_path: &str,
    lut_path: &str,
    geometry: Vec<PyReadonlyArray2<'py, f32>>,
    channels: Vec<PyReadonlyArray2<'py, f32>>,
    surface_pressure: PyReadonlyArray2<'py, f32>,
    ozone: PyReadonlyArray2<'py, f32>,
    valid: PyReadonlyArray2<'py, bool>,
    ndvi: Option<PyReadonlyArray2<'py, f32>>,
    gas_lut_path: Option<&str>,
) -> PyResult<&'py PyDict> {
    let config = RetrievalConfig::from_json_file(config_path).map_err(to_py_err)?;
    let setup = Arc::new(config.validate().map_err(to_py_err)?);
    let mut lut = read_momo_lut(lut_path, setup.n_channels()).map_err(to_py_err)?;
    if let Some(path) = gas_lut_path {
        let gas = read_gas_table(path, setup.n_channels()).map_err(to_py_err)?;
        lut = lut.with_gas_table(gas).map_err(to_py_err)?;
    }

    let inputs = SceneInputs::new(
        geometry.iter().map(|a| a.as_array().to_owned()).collect(),
        channels.iter().map(|a| a.as_array().to_owned()).collect(),
        surface_pressure.as_array().to_owned(),
        ozone.as_array().to_owned(),
        ndvi.as_ref().map(|a| a.as_array().to_owned()),
        valid.as_array().to_owned(),
    )
    .map_err(to_py_err)?;

    let scene = SceneRetrieval::new(setup, Arc::new(lut)).map_err(to_py_err)?;
    let product = py.allow_threads(|| scene.run(&inputs)).map_err(to_py_err)?;

    let out = PyDict::new(py);
    out.set_item("aot", product.aot.into_pyarray(py))?;
    out.set_item("aot_uncertainty", product.aot_uncertainty.into_pyarray(py))?;
    if let Some(fit_residual) = product.fit_residual {
        out.set_item("fit_residual", fit_residual.into_pyarray(py))?;
    }
    if let Some(curvature) = product.curvature {
        out.set_item("curvature", curvature.into_pyarray(py))?;
    }
    Ok(out)
}

/// Python module definition
#[pymodule]
fn _aotinv(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(retrieve_aot, m)?)?;
    Ok(())
}
