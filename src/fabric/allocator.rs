//! Fabric Port Allocator
//!
//! Port ids are positive integers, assigned as one past the highest id
//! currently present. Ids are never recycled while a higher one exists.
//!
//! Reading the ids and creating the directory are two separate operations on
//! shared external state. [`PortAllocator::claim`] closes that window by
//! treating directory creation as the commit point and moving on to the next
//! id whenever another writer got there first.

use std::collections::BTreeSet;

use tracing::{debug, instrument, warn};

use crate::domain::ports::{NvmetStore, PortId};
use crate::error::{Error, Result};

/// Next free port id for a set of existing ids: `1` when empty, else `max + 1`.
///
/// Saturates at `u32::MAX`; the claim loop reports exhaustion instead.
pub fn allocate_next_port(existing: &BTreeSet<PortId>) -> PortId {
    match existing.iter().next_back() {
        Some(max) => PortId(max.get().saturating_add(1)),
        None => PortId(1),
    }
}

/// Claims port ids against a live target tree.
#[derive(Debug, Clone, Copy)]
pub struct PortAllocator {
    max_attempts: u32,
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(16)
    }
}

impl PortAllocator {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// The id the next claim would try first. Does not reserve anything.
    pub async fn peek(&self, store: &dyn NvmetStore) -> Result<PortId> {
        let existing = store.list_port_ids().await?;
        Ok(allocate_next_port(&existing))
    }

    /// Allocate an id and create its port directory.
    ///
    /// The id is computed once from the live tree, then incremented on every
    /// `PortAlreadyExists` until creation succeeds or the attempts run out.
    #[instrument(skip(self, store), fields(max_attempts = self.max_attempts))]
    pub async fn claim(&self, store: &dyn NvmetStore) -> Result<PortId> {
        let first = self.peek(store).await?;
        let mut candidate = first;

        for attempt in 1..=self.max_attempts {
            match store.create_port(candidate).await {
                Ok(()) => {
                    debug!(port_id = candidate.get(), attempt, "Claimed fabric port");
                    return Ok(candidate);
                }
                Err(Error::PortAlreadyExists { .. }) => {
                    warn!(
                        port_id = candidate.get(),
                        attempt, "Port id taken concurrently, trying next"
                    );
                    match candidate.get().checked_add(1) {
                        Some(next) => candidate = PortId(next),
                        None => break,
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::PortAllocationConflict {
            first: first.get(),
            attempts: self.max_attempts,
        })
    }
}
