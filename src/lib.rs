#![allow(clippy::uninlined_format_args)]
//! FluxFaaS 联邦网关：把多个独立的 FaaS provider 聚合为一个统一的 API。

pub mod config;
pub mod functions;
pub mod gateway;
pub mod logging;
pub mod routing;

#[cfg(test)]
pub(crate) mod testing;
