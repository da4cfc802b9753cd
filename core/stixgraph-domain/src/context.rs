//! Edit-context registry and the RAII claim held by live subscriptions.

use crate::StixDomainEntityService;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use stixgraph_model::{EditContext, User};
use stixgraph_types::{EntityId, UserId};

/// Where edit contexts live. Calls are synchronous so a claim can be
/// released from `Drop`.
///
/// A `(entity, user)` context can be held by several claims at once, one per
/// open subscription of that user. It disappears when the last claim is
/// released or when it is cleared explicitly.
pub trait EditContextStore: Send + Sync {
    /// Creates or replaces the context of `(context.entity_id, context.user_id)`
    /// without touching its claims.
    fn set(&self, context: EditContext);

    /// Removes the context of `(entity_id, user_id)` whatever its claims.
    /// Returns whether one existed.
    fn clear(&self, entity_id: EntityId, user_id: UserId) -> bool;

    /// Adds a claim, creating the context from `context` if there is none.
    fn claim(&self, context: EditContext);

    /// Drops one claim. Returns whether that removed the context.
    fn release(&self, entity_id: EntityId, user_id: UserId) -> bool;

    /// Contexts on `entity_id`, ordered by user id.
    fn list(&self, entity_id: EntityId) -> Vec<EditContext>;
}

struct Slot {
    context: EditContext,
    claims: usize,
}

type Registry = HashMap<EntityId, BTreeMap<UserId, Slot>>;

/// Process-local registry.
#[derive(Default)]
pub struct InMemoryEditContexts {
    contexts: Mutex<Registry>,
}

impl InMemoryEditContexts {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn remove_slot(contexts: &mut Registry, entity_id: EntityId, user_id: UserId) -> Option<Slot> {
    let users = contexts.get_mut(&entity_id)?;
    let slot = users.remove(&user_id);
    if users.is_empty() {
        contexts.remove(&entity_id);
    }
    slot
}

impl EditContextStore for InMemoryEditContexts {
    fn set(&self, context: EditContext) {
        let mut contexts = self.lock();
        let users = contexts.entry(context.entity_id).or_default();
        match users.get_mut(&context.user_id) {
            Some(slot) => slot.context = context,
            None => {
                users.insert(context.user_id, Slot { context, claims: 0 });
            }
        }
    }

    fn clear(&self, entity_id: EntityId, user_id: UserId) -> bool {
        remove_slot(&mut self.lock(), entity_id, user_id).is_some()
    }

    fn claim(&self, context: EditContext) {
        self.lock()
            .entry(context.entity_id)
            .or_default()
            .entry(context.user_id)
            .or_insert(Slot { context, claims: 0 })
            .claims += 1;
    }

    fn release(&self, entity_id: EntityId, user_id: UserId) -> bool {
        let mut contexts = self.lock();
        let Some(slot) = contexts
            .get_mut(&entity_id)
            .and_then(|users| users.get_mut(&user_id))
        else {
            return false;
        };
        slot.claims = slot.claims.saturating_sub(1);
        if slot.claims > 0 {
            return false;
        }
        remove_slot(&mut contexts, entity_id, user_id).is_some()
    }

    fn list(&self, entity_id: EntityId) -> Vec<EditContext> {
        self.lock()
            .get(&entity_id)
            .map(|users| users.values().map(|slot| slot.context.clone()).collect())
            .unwrap_or_default()
    }
}

/// An edit-context claim. Dropping it releases the claim exactly once.
pub struct EditContextGuard {
    service: StixDomainEntityService,
    entity_id: EntityId,
    user: User,
}

impl EditContextGuard {
    pub(crate) fn new(service: StixDomainEntityService, entity_id: EntityId, user: User) -> Self {
        Self {
            service,
            entity_id,
            user,
        }
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn user_id(&self) -> UserId {
        self.user.id
    }
}

impl Drop for EditContextGuard {
    fn drop(&mut self) {
        self.service.release_context(&self.user, self.entity_id);
    }
}

impl std::fmt::Debug for EditContextGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditContextGuard")
            .field("entity_id", &self.entity_id)
            .field("user_id", &self.user.id)
            .finish()
    }
}
