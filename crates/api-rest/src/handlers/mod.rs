//! HTTP handlers, grouped by resource.
//!
//! Handlers stay thin: extract, call one core service, convert the result into a response
//! body. Authorization and validation live in `chs-core`.

pub mod accounts;
pub mod outreach;
pub mod patients;
pub mod payments;
