pub mod database;
pub mod graph;
pub mod schema;

pub use database::SqliteGraphStore;
pub use graph::{ensure_edge, prune_edges, GraphStore};
