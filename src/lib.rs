//! Hour-by-hour battery dispatch planning for a home solar and battery
//! installation.
//!
//! The [`optimizer`] picks one [`domain::Strategy`] per hour by evaluating
//! every sequence against a price and energy forecast. The [`controller`]
//! runs it on a schedule, persists the plan and regulates the battery from it.

pub mod api;
pub mod config;
pub mod controller;
pub mod domain;
pub mod forecast;
pub mod optimizer;
pub mod repo;
pub mod simulation;
pub mod telemetry;
