//! Library components of the donor cohort CLI.

#![deny(unsafe_code)]

pub mod logging;
pub mod pipeline;
