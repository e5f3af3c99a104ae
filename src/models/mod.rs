pub mod checksum;
pub mod merged;
pub mod sensor;
pub mod slot;

pub use checksum::ChangeChecksum;
pub use merged::{ChunkResponse, MergedResponse};
pub use sensor::Sensor;
pub use slot::TimeSlot;
