//! Test utilities: in-memory mocks for the domain traits.

pub mod mocks;
