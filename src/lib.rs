pub mod app;
pub mod cli;
pub mod config;
pub mod delta;
pub mod input;
pub mod k8s;
pub mod kind;
pub mod model;
pub mod query;
pub mod render;
pub mod sort;
pub mod table;
pub mod ui;
pub mod watch;
