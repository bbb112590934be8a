//! Data types shared between the sampler and its consumers

pub mod fields;
pub mod report;
