//! Property-Based Tests for Fabric Allocation
//!
//! # Test Properties
//!
//! 1. **Freshness**: the allocated id is never one already present
//! 2. **Monotonicity**: the allocated id exceeds every existing id
//! 3. **Claim Safety**: a successful claim creates exactly one new port,
//!    even when some attempts lose a race

#![cfg(test)]

use std::collections::BTreeSet;

use proptest::prelude::*;

use super::allocator::{allocate_next_port, PortAllocator};
use crate::adapters::InMemoryNvmetStore;
use crate::domain::ports::{NvmetStore, PortId};
use crate::error::Error;

// =============================================================================
// Property Strategies
// =============================================================================

/// Existing port ids, sparse and unordered.
fn port_set_strategy() -> impl Strategy<Value = BTreeSet<PortId>> {
    prop::collection::btree_set(1u32..10_000, 0..32)
        .prop_map(|ids| ids.into_iter().map(PortId).collect())
}

// =============================================================================
// Allocation Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_next_port_is_fresh_and_above_all(existing in port_set_strategy()) {
        let next = allocate_next_port(&existing);

        prop_assert!(!existing.contains(&next));
        prop_assert!(existing.iter().all(|id| *id < next));
        prop_assert!(next.get() >= 1);
    }

    #[test]
    fn prop_next_port_is_deterministic(existing in port_set_strategy()) {
        prop_assert_eq!(allocate_next_port(&existing), allocate_next_port(&existing));
    }
}

// =============================================================================
// Claim Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_claim_creates_one_new_port(
        existing in port_set_strategy(),
        races in 0u32..6,
        attempts in 1u32..8,
    ) {
        let store = InMemoryNvmetStore::new();
        for id in &existing {
            store.insert_port(*id);
        }
        store.simulate_port_races(races);

        let result = tokio_test::block_on(PortAllocator::new(attempts).claim(&store));
        let after = tokio_test::block_on(store.list_port_ids()).unwrap();

        if races < attempts {
            let port = result.unwrap();
            prop_assert!(!existing.contains(&port));
            prop_assert!(after.contains(&port));
            prop_assert_eq!(
                port.get(),
                allocate_next_port(&existing).get() + races
            );
        } else {
            let is_conflict = matches!(result, Err(Error::PortAllocationConflict { .. }));
            prop_assert!(is_conflict);
        }
    }
}
