#![forbid(unsafe_code)]

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod epub;
pub mod errata;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod publish;
pub mod settings;
pub mod site;
pub mod store;
pub mod sync;
pub mod transport;
