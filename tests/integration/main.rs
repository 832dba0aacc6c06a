//! Integration tests: mock repository and end-to-end slate simulation.

mod mock_repository;
mod simulation;
