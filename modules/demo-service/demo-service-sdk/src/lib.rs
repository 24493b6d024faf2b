#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Demo service SDK.
//!
//! Defines the `IDemoService` contract that the host provides and plugin modules consume.
//! The implementation lives in the `demo-service` crate; plugins depend on this crate only.
//!
//! # Public API
//!
//! - [`DemoService`]: the contract trait, registered in the service hub as `dyn DemoService`.
//! - [`QueryArgs`]: structured argument of [`DemoService::query`].
//! - The contract's operation table, enabling `plugkit::invoke` on `&dyn DemoService`.

pub mod api;
pub mod dispatch;
pub mod models;

pub use api::DemoService;
pub use models::QueryArgs;
