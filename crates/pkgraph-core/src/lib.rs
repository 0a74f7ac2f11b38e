//! Package graph core: structure graph builder and metrics engine for Java
//! projects stored as a property graph.
//!
//! Given `Entity` nodes carrying Java source, a run derives the package
//! hierarchy, links classes to packages, resolves imports into class-level
//! edges, lifts them to package-level edges and scores every package for
//! importance and quality. The embedded SQLite store implements the graph
//! capability; the optional `python` feature builds the `_pkgraph_core`
//! extension module.

pub mod config;
pub mod errors;
pub mod indexer;
pub mod models;
pub mod query;
pub mod store;

#[cfg(test)]
mod test_support;

pub use config::PipelineConfig;
pub use errors::{GraphError, GraphResult};
pub use indexer::pipeline::{run_pipeline, run_pipeline_with, RunStage, RunSummary};
pub use store::{GraphStore, SqliteGraphStore};

// ---------------------------------------------------------------------------
// Top-level Python module: _pkgraph_core
// ---------------------------------------------------------------------------

#[cfg(feature = "python")]
#[pyo3::pymodule]
fn _pkgraph_core(m: &pyo3::Bound<'_, pyo3::types::PyModule>) -> pyo3::PyResult<()> {
    use pyo3::prelude::*;
    use pyo3::wrap_pyfunction;

    m.add("SCHEMA_VERSION", store::schema::SCHEMA_VERSION)?;
    m.add("DEFAULT_PLUGIN_ID", config::DEFAULT_PLUGIN_ID)?;

    // -- Pipeline -----------------------------------------------------------
    m.add_function(wrap_pyfunction!(indexer::pipeline::run_package_metrics, m)?)?;

    // -- Views ----------------------------------------------------------------
    m.add_function(wrap_pyfunction!(query::views::py_package_rank_graph, m)?)?;
    m.add_function(wrap_pyfunction!(query::views::py_class_import_graph, m)?)?;
    m.add_function(wrap_pyfunction!(query::views::py_package_structure, m)?)?;
    m.add_function(wrap_pyfunction!(query::long_classes::py_long_classes, m)?)?;

    Ok(())
}
