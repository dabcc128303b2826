pub mod chunk_planner;
pub mod fetch_executor;
pub mod gap_detector;
pub mod orchestrator;
