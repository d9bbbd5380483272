#![deny(dead_code)]
#![deny(unused_imports)]

pub mod assemble;
pub mod classify;
pub mod config;
pub mod data;
pub mod model;
pub mod poly;
pub mod predictor;
pub mod scorer;
pub mod standardize;
