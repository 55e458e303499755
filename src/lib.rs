//! Multi-resolution interval cache and controller for an interactive
//! time-series chart: cache previously fetched samples at whatever
//! resolution they were fetched at, serve immediate (possibly placeholder)
//! renders from the cache, and fetch only what is missing or too coarse
//! from a slow backend.

mod cache;
mod controller;
mod error;
mod interval_tree;
mod time;

pub use cache::{ChartCache, IntervalData};
pub use controller::{Backend, Controller, Tid, Ui};
pub use error::{Error, Result};
pub use interval_tree::{Interval, IntervalTree};
pub use time::{extrapolate, num_datapoints, resolution_for, roll_up, scale, Resolution};
