mod chunk;
mod hour_record;
mod time_range;
mod watermark;

pub use chunk::{Chunk, ChunkStatus};
pub use hour_record::HourRecord;
pub use time_range::{is_hour_aligned, truncate_to_hour, TimeRange};
pub use watermark::Watermark;
