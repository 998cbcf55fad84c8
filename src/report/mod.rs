//! JSON and gnuplot reports over committed statistics.

pub mod domain;
pub mod gnuplot;
pub mod service;

pub use domain::{Category, PlotOptions, ReportDoc, ReportOptions};
