use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{
    clock::{Clock, DynClock},
    reaper::{self, ReaperHandle, Sweep},
};

use super::{ResetToken, TokenError};

/// The maximum number of tokens a store holds by default.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// An in-memory, capacity-bounded store of reset tokens.
///
/// All state lives behind a single reader/writer lock. Reads share the lock and
/// every mutation takes it exclusively, including the whole
/// check-sweep-insert sequence in [`TokenStore::store`].
///
/// The store never evicts a live token to make room for a new one. When it is
/// full of unexpired tokens, new tokens are rejected.
pub struct TokenStore {
    capacity: usize,
    clock: DynClock,
    tokens: RwLock<HashMap<String, ResetToken>>,
}

impl TokenStore {
    /// Create a store holding at most [`DEFAULT_CAPACITY`] tokens.
    pub fn new(clock: DynClock) -> Self {
        Self::with_capacity(clock, DEFAULT_CAPACITY)
    }

    /// Create a store holding at most `capacity` tokens.
    ///
    /// # Arguments
    ///
    /// * `clock` - The time source used to decide which tokens have expired.
    /// * `capacity` - The maximum number of tokens held at once.
    pub fn with_capacity(clock: DynClock, capacity: usize) -> Self {
        Self {
            capacity,
            clock,
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a newly issued token.
    ///
    /// If the store is full, expired tokens are swept first. The sweep and the
    /// insert happen under one exclusive lock, so concurrent callers can never
    /// push the store past its capacity.
    ///
    /// # Returns
    ///
    /// * [`TokenError::DuplicateToken`] if the token string is already stored.
    ///   The existing entry is left untouched.
    /// * [`TokenError::CapacityExceeded`] if the store is still full after
    ///   sweeping expired tokens.
    pub fn store(&self, token: ResetToken) -> Result<(), TokenError> {
        let mut tokens = self.tokens.write();

        if tokens.contains_key(token.token()) {
            return Err(TokenError::DuplicateToken);
        }

        if tokens.len() >= self.capacity {
            let removed = remove_expired(&mut tokens, &*self.clock);
            debug!(removed, "Token store full, swept expired tokens.");

            if tokens.len() >= self.capacity {
                warn!(capacity = self.capacity, "Token store is full of live tokens.");

                return Err(TokenError::CapacityExceeded {
                    capacity: self.capacity,
                });
            }
        }

        tokens.insert(token.token().to_owned(), token);

        Ok(())
    }

    /// Retrieve a snapshot of a stored token.
    ///
    /// Expired and used tokens are returned like any other; it is up to the
    /// caller to check [`ResetToken::is_used`] and [`ResetToken::is_expired`].
    pub fn get(&self, token: &str) -> Result<ResetToken, TokenError> {
        self.tokens
            .read()
            .get(token)
            .cloned()
            .ok_or(TokenError::NotFound)
    }

    /// Flag a token as used.
    ///
    /// Marking an already used token again succeeds.
    pub fn mark_used(&self, token: &str) -> Result<(), TokenError> {
        match self.tokens.write().get_mut(token) {
            Some(entry) => {
                entry.mark_used();
                Ok(())
            }
            None => Err(TokenError::NotFound),
        }
    }

    /// Remove a token. Removing a token that isn't stored is a no-op.
    pub fn delete(&self, token: &str) {
        self.tokens.write().remove(token);
    }

    /// Remove every expired token.
    ///
    /// # Returns
    ///
    /// The number of tokens removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut tokens = self.tokens.write();

        remove_expired(&mut tokens, &*self.clock)
    }

    pub fn count(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_full(&self) -> bool {
        self.tokens.read().len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Start a background task that calls [`TokenStore::cleanup_expired`]
    /// every `every`.
    ///
    /// Only one cleanup task per store is needed.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn start_cleanup(self: &Arc<Self>, every: Duration) -> ReaperHandle {
        reaper::spawn(Arc::clone(self), every)
    }
}

impl Sweep for TokenStore {
    fn name(&self) -> &'static str {
        "reset_tokens"
    }

    fn sweep(&self) -> usize {
        self.cleanup_expired()
    }
}

fn remove_expired(tokens: &mut HashMap<String, ResetToken>, clock: &dyn Clock) -> usize {
    let now = clock.now();
    let before = tokens.len();

    tokens.retain(|_, token| !token.is_expired_at(now));

    before - tokens.len()
}
