//! Demand prioritization for municipal service requests.
//!
//! Open requests are scored from six weighted metrics, ordered
//! deterministically and bucketed into tiers. The same ranked backlog feeds a
//! simple queueing projection of how long it takes to clear.

pub mod capacity;
pub mod db;
pub mod engine;
pub mod extract;
pub mod models;
pub mod ranker;
pub mod report;
pub mod score;
pub mod sources;
pub mod weights;
