pub mod hour_queries;
pub mod run_status_queries;
pub mod schema;
pub mod watermark_queries;
