mod embedding;
mod job;
mod notification;
mod segment;

pub use embedding::*;
pub use job::*;
pub use notification::*;
pub use segment::*;
