#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub use demo_service_sdk::*;

pub mod service;
pub use service::{ConcatDemoService, register};
