//! Id Allocator Service
//!
//! Issues the lifecycle identifiers that every outbound order operation
//! carries. Ids are numeric, time-sortable, and unique across the whole
//! deployment without any coordination between processes:
//!
//! ```text
//! [ 13 digits unix ms ][ 2 digits worker ][ 4 digits sequence ]
//! ```
//!
//! Each process embeds its own worker id; concurrent processes can never
//! collide, and within one process a mutex-guarded cursor makes outputs
//! strictly increasing even when the wall clock runs backwards.

pub mod allocator;
pub mod clock;

pub use allocator::{
    decode, extract_timestamp, extract_worker_id, validate, AllocatorConfig, DecodedId,
    IdAllocator, ID_DIGITS, MAX_SEQUENCE, MAX_WORKER_ID,
};
pub use clock::{Clock, ManualClock, SystemClock};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
