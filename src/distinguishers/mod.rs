pub mod correlation;
pub mod cpa;
