//! Read-only views over an indexed project.

pub mod long_classes;
pub mod views;

pub use long_classes::{long_classes, LongClass, LongClassReport, DEFAULT_LONG_CLASS_THRESHOLD};
pub use views::{class_import_graph, package_rank_graph, package_structure, GraphView, ViewLink};
