//! Lifecycle-id allocation
//!
//! Produces globally-unique, time-sortable numeric identifiers without any
//! coordination between processes. Uniqueness comes from the id layout
//! alone:
//!
//! ```text
//! [ 13 digits unix ms ][ 2 digits worker ][ 4 digits sequence ]
//!   1708123456789         05                 0001
//! ```
//!
//! Ids are fixed at 19 digits, so lexicographic order equals numeric order
//! and every id fits in a `u64`. An optional short alphabetic tag may be
//! prefixed for human-readable id classes ("sl" + digits); the tag carries no
//! uniqueness and is ignored by ordering-sensitive consumers.
//!
//! Within one process outputs are strictly increasing. A clock that runs
//! backwards is absorbed by staying on the highest millisecond already
//! issued; a sequence window that fills up blocks the caller until the
//! clock moves on, bounded by a wait budget.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use tracing::{info, warn};

use types::errors::{AllocatorError, ValidationError};
use types::ids::{LifecycleId, MAX_TAG_LEN};

use crate::clock::{Clock, SystemClock};

/// Digits in the millisecond timestamp segment.
pub const TIMESTAMP_DIGITS: usize = 13;
/// Digits in the worker segment.
pub const WORKER_DIGITS: usize = 2;
/// Digits in the per-millisecond sequence segment.
pub const SEQUENCE_DIGITS: usize = 4;
/// Total digits in an untagged id.
pub const ID_DIGITS: usize = TIMESTAMP_DIGITS + WORKER_DIGITS + SEQUENCE_DIGITS;

/// Highest worker id expressible in the worker segment.
pub const MAX_WORKER_ID: u16 = 99;
/// Highest sequence value expressible in the sequence segment.
pub const MAX_SEQUENCE: u16 = 9_999;

const WAIT_POLL: Duration = Duration::from_micros(100);

/// Configuration for an id allocator instance.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Worker id embedded in every issued id. Must be unique per process
    /// across the deployment; range 0..=99.
    pub worker_id: u16,
    /// How long an allocation may wait for the clock to advance past an
    /// exhausted sequence window before failing.
    pub wait_budget_ms: u64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            worker_id: 0,
            wait_budget_ms: 200,
        }
    }
}

/// Mutable allocation cursor. One lock guards both fields so a millisecond
/// window and its sequence can never be observed out of step.
struct AllocatorState {
    /// Highest millisecond an id has been issued for.
    last_ms: i64,
    /// Next sequence value within `last_ms`.
    sequence: u16,
}

/// Coordination-free id allocator.
///
/// Thread-safe; clone-free sharing via `Arc`. Each process runs one
/// allocator per worker id.
pub struct IdAllocator {
    config: AllocatorConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<AllocatorState>,
    /// Total ids issued.
    allocated: AtomicU64,
    /// Allocations that had to wait out an exhausted sequence window.
    waits: AtomicU64,
}

impl IdAllocator {
    /// Create an allocator on the system clock.
    pub fn new(config: AllocatorConfig) -> Result<Self, AllocatorError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an allocator reading time from the given clock.
    pub fn with_clock(
        config: AllocatorConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AllocatorError> {
        if config.worker_id > MAX_WORKER_ID {
            return Err(ValidationError::WorkerIdOutOfRange {
                worker_id: config.worker_id,
                max: MAX_WORKER_ID,
            }
            .into());
        }

        info!(
            worker_id = config.worker_id,
            wait_budget_ms = config.wait_budget_ms,
            "IdAllocator initialized"
        );

        Ok(Self {
            config,
            clock,
            state: Mutex::new(AllocatorState {
                last_ms: 0,
                sequence: 0,
            }),
            allocated: AtomicU64::new(0),
            waits: AtomicU64::new(0),
        })
    }

    /// Allocate the next id.
    ///
    /// Blocks the calling allocation while the current millisecond's
    /// sequence window is exhausted; fails with
    /// [`AllocatorError::Exhausted`] if the clock does not advance within
    /// the configured wait budget.
    pub fn allocate(&self) -> Result<LifecycleId, AllocatorError> {
        let digits = self.next_digits()?;
        Ok(LifecycleId::parse(digits)?)
    }

    /// Allocate the next id with an alphabetic tag prefix.
    ///
    /// The tag must be 1..=4 ASCII letters; anything else would corrupt the
    /// fixed digit layout.
    pub fn allocate_tagged(&self, tag: &str) -> Result<LifecycleId, AllocatorError> {
        validate_tag(tag)?;
        let digits = self.next_digits()?;
        Ok(LifecycleId::parse(format!("{tag}{digits}"))?)
    }

    /// Total ids issued since creation.
    pub fn allocated_total(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Allocations that waited for the clock since creation.
    pub fn wait_events(&self) -> u64 {
        self.waits.load(Ordering::Relaxed)
    }

    fn next_digits(&self) -> Result<String, AllocatorError> {
        // The state lock is held across the wait: once the window is
        // exhausted every caller must wait for the same clock tick anyway.
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let wait_started = Instant::now();
        let mut waited = false;

        loop {
            let now = self.clock.now_millis().max(0);
            // Never move backwards: a regressing clock keeps issuing on the
            // highest millisecond already used.
            if now > state.last_ms {
                state.last_ms = now;
                state.sequence = 0;
            }

            if state.sequence <= MAX_SEQUENCE {
                let sequence = state.sequence;
                state.sequence += 1;
                self.allocated.fetch_add(1, Ordering::Relaxed);
                // 13 + 2 + 4 zero-padded digits
                return Ok(format!(
                    "{:013}{:02}{:04}",
                    state.last_ms, self.config.worker_id, sequence
                ));
            }

            if !waited {
                waited = true;
                self.waits.fetch_add(1, Ordering::Relaxed);
                warn!(
                    window_ms = state.last_ms,
                    worker_id = self.config.worker_id,
                    "sequence window exhausted; waiting for clock to advance"
                );
            }

            if wait_started.elapsed() >= Duration::from_millis(self.config.wait_budget_ms) {
                return Err(AllocatorError::Exhausted {
                    last_ms: state.last_ms,
                    now_ms: now,
                    budget_ms: self.config.wait_budget_ms,
                });
            }

            thread::sleep(WAIT_POLL);
        }
    }
}

/// Decoded segments of a lifecycle id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedId {
    pub tag: Option<String>,
    pub timestamp_ms: i64,
    pub worker_id: u16,
    pub sequence: u16,
}

impl DecodedId {
    /// Issue time as a UTC timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp_ms)
            .single()
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// Whether `id` is a well-formed lifecycle id (optional tag plus exactly
/// 19 digits).
pub fn validate(id: &str) -> bool {
    decode(id).is_ok()
}

/// Split an id into its tag, timestamp, worker, and sequence segments.
pub fn decode(id: &str) -> Result<DecodedId, ValidationError> {
    let parsed = LifecycleId::parse(id)?;
    let digits = parsed.digits();
    if digits.len() != ID_DIGITS {
        return Err(ValidationError::UnexpectedLength {
            id: id.to_string(),
            expected: ID_DIGITS,
            actual: digits.len(),
        });
    }

    let not_numeric = |_| ValidationError::NonNumeric { id: id.to_string() };
    let timestamp_ms: i64 = digits[..TIMESTAMP_DIGITS].parse().map_err(not_numeric)?;
    let worker_id: u16 = digits[TIMESTAMP_DIGITS..TIMESTAMP_DIGITS + WORKER_DIGITS]
        .parse()
        .map_err(not_numeric)?;
    let sequence: u16 = digits[TIMESTAMP_DIGITS + WORKER_DIGITS..]
        .parse()
        .map_err(not_numeric)?;

    let tag = parsed.tag();
    Ok(DecodedId {
        tag: (!tag.is_empty()).then(|| tag.to_string()),
        timestamp_ms,
        worker_id,
        sequence,
    })
}

/// Issue time embedded in `id`.
pub fn extract_timestamp(id: &str) -> Result<DateTime<Utc>, ValidationError> {
    Ok(decode(id)?.timestamp())
}

/// Worker id embedded in `id`.
pub fn extract_worker_id(id: &str) -> Result<u16, ValidationError> {
    Ok(decode(id)?.worker_id)
}

fn validate_tag(tag: &str) -> Result<(), ValidationError> {
    if tag.is_empty() {
        return Err(ValidationError::Empty);
    }
    if tag.len() > MAX_TAG_LEN {
        return Err(ValidationError::TagTooLong {
            tag: tag.to_string(),
        });
    }
    if !tag.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidTag {
            tag: tag.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const FROZEN_MS: i64 = 1_708_123_456_789;

    fn frozen_allocator(worker_id: u16) -> (Arc<ManualClock>, IdAllocator) {
        let clock = Arc::new(ManualClock::new(FROZEN_MS));
        let allocator = IdAllocator::with_clock(
            AllocatorConfig {
                worker_id,
                ..AllocatorConfig::default()
            },
            clock.clone(),
        )
        .unwrap();
        (clock, allocator)
    }

    #[test]
    fn test_allocate_produces_valid_ids() {
        let allocator = IdAllocator::new(AllocatorConfig::default()).unwrap();

        for _ in 0..5 {
            let id = allocator.allocate().unwrap();
            assert!(validate(id.as_str()));
            assert_eq!(id.as_str().len(), ID_DIGITS);
            // Every untagged id fits in a u64
            id.as_str().parse::<u64>().unwrap();
        }
        assert_eq!(allocator.allocated_total(), 5);
    }

    #[test]
    fn test_same_millisecond_ids_differ_only_in_sequence() {
        let (_clock, allocator) = frozen_allocator(5);

        let ids: Vec<LifecycleId> = (0..100).map(|_| allocator.allocate().unwrap()).collect();

        for (i, id) in ids.iter().enumerate() {
            let decoded = decode(id.as_str()).unwrap();
            assert_eq!(decoded.timestamp_ms, FROZEN_MS);
            assert_eq!(decoded.worker_id, 5);
            assert_eq!(decoded.sequence, i as u16);
        }

        // Strictly increasing numerically, and unique by construction
        for pair in ids.windows(2) {
            let a: u64 = pair[0].as_str().parse().unwrap();
            let b: u64 = pair[1].as_str().parse().unwrap();
            assert!(a < b);
        }
    }

    #[test]
    fn test_worker_id_embedded_in_digits() {
        let (_clock, allocator) = frozen_allocator(7);
        let id = allocator.allocate().unwrap();

        assert_eq!(&id.as_str()[TIMESTAMP_DIGITS..TIMESTAMP_DIGITS + WORKER_DIGITS], "07");
        assert_eq!(extract_worker_id(id.as_str()).unwrap(), 7);
    }

    #[test]
    fn test_worker_id_out_of_range_rejected() {
        let result = IdAllocator::new(AllocatorConfig {
            worker_id: 100,
            ..AllocatorConfig::default()
        });
        match result {
            Err(AllocatorError::Validation(ValidationError::WorkerIdOutOfRange {
                worker_id,
                max,
            })) => {
                assert_eq!(worker_id, 100);
                assert_eq!(max, MAX_WORKER_ID);
            }
            other => panic!("Expected WorkerIdOutOfRange, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_tagged_allocation() {
        let (_clock, allocator) = frozen_allocator(5);
        let id = allocator.allocate_tagged("sl").unwrap();

        assert!(id.as_str().starts_with("sl"));
        assert!(validate(id.as_str()));

        let decoded = decode(id.as_str()).unwrap();
        assert_eq!(decoded.tag.as_deref(), Some("sl"));
        assert_eq!(decoded.timestamp_ms, FROZEN_MS);
    }

    #[test]
    fn test_tag_validation() {
        let (_clock, allocator) = frozen_allocator(0);

        match allocator.allocate_tagged("") {
            Err(AllocatorError::Validation(ValidationError::Empty)) => {}
            other => panic!("Expected Empty, got {:?}", other),
        }
        match allocator.allocate_tagged("stops") {
            Err(AllocatorError::Validation(ValidationError::TagTooLong { tag })) => {
                assert_eq!(tag, "stops");
            }
            other => panic!("Expected TagTooLong, got {:?}", other),
        }
        match allocator.allocate_tagged("sl1") {
            Err(AllocatorError::Validation(ValidationError::InvalidTag { tag })) => {
                assert_eq!(tag, "sl1");
            }
            other => panic!("Expected InvalidTag, got {:?}", other),
        }
    }

    #[test]
    fn test_clock_regression_does_not_regress_ids() {
        let (clock, allocator) = frozen_allocator(5);

        let first = allocator.allocate().unwrap();
        clock.set(FROZEN_MS - 500);
        let second = allocator.allocate().unwrap();

        // Still issued on the highest millisecond seen
        assert_eq!(decode(second.as_str()).unwrap().timestamp_ms, FROZEN_MS);
        let a: u64 = first.as_str().parse().unwrap();
        let b: u64 = second.as_str().parse().unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_exhaustion_blocks_until_clock_advances() {
        let clock = Arc::new(ManualClock::new(FROZEN_MS));
        let allocator = Arc::new(
            IdAllocator::with_clock(
                AllocatorConfig {
                    worker_id: 3,
                    wait_budget_ms: 5_000,
                },
                clock.clone(),
            )
            .unwrap(),
        );

        // Burn the whole window for this millisecond
        for _ in 0..=MAX_SEQUENCE {
            allocator.allocate().unwrap();
        }

        let handle = {
            let allocator = allocator.clone();
            thread::spawn(move || allocator.allocate())
        };

        // Release the waiter once it is actually waiting
        while allocator.wait_events() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        clock.advance(1);

        let id = handle.join().unwrap().unwrap();
        let decoded = decode(id.as_str()).unwrap();
        assert_eq!(decoded.timestamp_ms, FROZEN_MS + 1);
        assert_eq!(decoded.sequence, 0);
        assert_eq!(allocator.wait_events(), 1);
    }

    #[test]
    fn test_exhaustion_fails_after_wait_budget() {
        let clock = Arc::new(ManualClock::new(FROZEN_MS));
        let allocator = IdAllocator::with_clock(
            AllocatorConfig {
                worker_id: 3,
                wait_budget_ms: 10,
            },
            clock,
        )
        .unwrap();

        for _ in 0..=MAX_SEQUENCE {
            allocator.allocate().unwrap();
        }

        match allocator.allocate() {
            Err(AllocatorError::Exhausted {
                last_ms,
                now_ms,
                budget_ms,
            }) => {
                assert_eq!(last_ms, FROZEN_MS);
                assert_eq!(now_ms, FROZEN_MS);
                assert_eq!(budget_ms, 10);
            }
            other => panic!("Expected Exhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_malformed() {
        assert!(!validate(""));
        assert!(!validate("123"));
        assert!(!validate("17081234567890500011")); // 20 digits
        assert!(!validate("170812345678905000")); // 18 digits
        assert!(!validate("17081234567890500x1"));
        assert!(!validate("stops1708123456789050001")); // 5-letter tag

        assert!(validate("1708123456789050001"));
        assert!(validate("sl1708123456789050001"));
        assert!(validate("TPCX1708123456789050001"));
    }

    #[test]
    fn test_decode_fields() {
        let decoded = decode("sl1708123456789057777").unwrap();
        assert_eq!(decoded.tag.as_deref(), Some("sl"));
        assert_eq!(decoded.timestamp_ms, 1_708_123_456_789);
        assert_eq!(decoded.worker_id, 5);
        assert_eq!(decoded.sequence, 7_777);
        assert_eq!(
            decoded.timestamp(),
            Utc.timestamp_millis_opt(1_708_123_456_789).unwrap()
        );
    }

    #[test]
    fn test_extract_timestamp() {
        let (_clock, allocator) = frozen_allocator(5);
        let id = allocator.allocate().unwrap();
        assert_eq!(
            extract_timestamp(id.as_str()).unwrap(),
            Utc.timestamp_millis_opt(FROZEN_MS).unwrap()
        );
    }
}
