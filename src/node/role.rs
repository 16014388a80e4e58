//! Role and lifecycle state
//!
//! A node is `none` until it explicitly serves, explicitly connects, or is
//! implicitly promoted to client by its first `queue()` call. Once server or
//! client, the role never changes again; attempts are refused as
//! configuration mistakes, not failures.
//!
//! `active` gates dequeuing (pause/resume), `alive` is overall liveness, and
//! `connected` tracks the client transport. The three flags are independent:
//! in particular, flipping `alive` never touches `connected`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    None,
    Client,
    Server,
}

pub struct Lifecycle {
    role: RwLock<Role>,
    active: AtomicBool,
    alive: AtomicBool,
    connected: AtomicBool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            role: RwLock::new(Role::None),
            active: AtomicBool::new(true),
            alive: AtomicBool::new(true),
            connected: AtomicBool::new(false),
        }
    }

    pub fn role(&self) -> Role {
        *self.role.read().unwrap()
    }

    /// Attempt the `none -> role` transition.
    ///
    /// Returns `Ok(true)` when the transition happened, `Ok(false)` when the
    /// node already holds that role (repeat calls are no-ops), and
    /// `Err(current)` when a different role is already set.
    pub fn try_set_role(&self, new_role: Role) -> Result<bool, Role> {
        let mut role = self.role.write().unwrap();
        if *role == new_role {
            Ok(false)
        } else if *role == Role::None {
            *role = new_role;
            Ok(true)
        } else {
            Err(*role)
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, value: bool) {
        self.active.store(value, Ordering::Release);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn set_alive(&self, value: bool) {
        self.alive.store(value, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn set_connected(&self, value: bool) {
        self.connected.store(value, Ordering::Release);
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
