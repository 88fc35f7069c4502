//! Study Wizard
//!
//! Multi-step study creation for a decentralized clinical-trial platform:
//! a researcher's wallet signs four dependent transactions (escrow,
//! registry, criteria, milestones) and every confirmed step is extracted
//! from its receipt and recorded in an idempotent off-chain index.

pub mod audit;
pub mod chain;
pub mod cli;
pub mod config;
pub mod contracts;
pub mod orchestrator;
pub mod session;
pub mod storage;
pub mod types;
