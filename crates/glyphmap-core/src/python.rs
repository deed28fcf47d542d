//! Python extension module `_glyphmap_core`.
//!
//! Everything crosses the boundary as JSON text; definitions come from the
//! built-in catalog, so Python callers pick indexes, percepts and
//! normalizers by name.

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use pyo3::wrap_pyfunction;

use crate::encoding::catalog::Catalog;
use crate::evaluator::{classify_json_impl, evaluate_json_impl};

/// Evaluate a JSON node list against a JSON settings document and return
/// the report as JSON.
#[pyfunction]
fn evaluate_json(py: Python<'_>, nodes_json: &str, settings_json: &str) -> PyResult<String> {
    Ok(py.allow_threads(|| evaluate_json_impl(nodes_json, settings_json))?)
}

/// Node name → domain, as a JSON object.
#[pyfunction]
fn classify_json(nodes_json: &str, settings_json: &str) -> PyResult<String> {
    Ok(classify_json_impl(nodes_json, settings_json)?)
}

#[pyfunction]
fn catalog_names(py: Python<'_>) -> PyResult<PyObject> {
    let catalog = Catalog::builtin()?;
    let result = PyDict::new(py);
    result.set_item("normalizers", PyList::new(py, catalog.normalizer_names())?)?;
    result.set_item("indexes", PyList::new(py, catalog.index_names())?)?;
    result.set_item("percepts", PyList::new(py, catalog.percept_names())?)?;
    result.set_item("presets", PyList::new(py, catalog.preset_names())?)?;
    Ok(result.into())
}

#[pymodule]
fn _glyphmap_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("EXCLUDED_DOMAIN", crate::models::EXCLUDED_DOMAIN)?;
    m.add("DEFAULT_FALLBACK_DOMAIN", crate::models::DEFAULT_FALLBACK_DOMAIN)?;
    m.add(
        "RECOMMENDED_PRESET",
        crate::encoding::catalog::RECOMMENDED_PRESET,
    )?;

    m.add_function(wrap_pyfunction!(evaluate_json, m)?)?;
    m.add_function(wrap_pyfunction!(classify_json, m)?)?;
    m.add_function(wrap_pyfunction!(catalog_names, m)?)?;
    Ok(())
}
