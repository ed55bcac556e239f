//! Tests for the storage layer
//!
//! These tests verify:
//! - Journal framing, sequencing and torn-tail recovery
//! - Local store transactions, conflicts and queries
//! - Durability across reopen
//! - The in-process cache store

mod journal_tests;

use pagedkv::{Entity, EntityKey, PropertyValue};

// =============================================================================
// Helper Functions
// =============================================================================

pub fn entity(kind: &str, name: &str, value: i64) -> Entity {
    Entity::new(EntityKey::new(kind, name)).with("value", PropertyValue::Int(value))
}
