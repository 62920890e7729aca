//! Identity provider contract and a local in-process provider.
//!
//! # Responsibility
//! - Expose the current owner and owner transitions to the sync engine.
//! - Keep sign-in mechanics outside the sync core.
//!
//! # Invariants
//! - Every transition is delivered to every live listener in order.
//! - `current_owner` reflects the last delivered transition.

use crate::model::board::OwnerId;
use log::info;
use std::cell::RefCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::mpsc::{self, Receiver, Sender};

/// Identity provider failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    NotSignedIn,
    Provider(String),
}

impl Display for IdentityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotSignedIn => write!(f, "no owner is signed in"),
            Self::Provider(message) => write!(f, "identity provider error: {message}"),
        }
    }
}

impl Error for IdentityError {}

/// Source of the owner partition key.
pub trait IdentityProvider {
    /// Currently signed-in owner, if any.
    fn current_owner(&self) -> Option<OwnerId>;
    /// Registers a listener for owner transitions (`None` = signed out).
    fn changes(&self) -> Receiver<Option<OwnerId>>;
    /// Ends the current sign-in.
    fn sign_out(&self) -> Result<(), IdentityError>;
}

/// In-process identity provider driven by explicit calls.
#[derive(Default)]
pub struct LocalIdentity {
    owner: RefCell<Option<OwnerId>>,
    listeners: RefCell<Vec<Sender<Option<OwnerId>>>>,
}

impl LocalIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(owner: OwnerId) -> Self {
        let identity = Self::new();
        *identity.owner.borrow_mut() = Some(owner);
        identity
    }

    /// Signs `owner` in, replacing any previous owner.
    pub fn sign_in(&self, owner: OwnerId) {
        info!("event=sign_in module=identity status=ok");
        self.transition(Some(owner));
    }

    fn transition(&self, owner: Option<OwnerId>) {
        *self.owner.borrow_mut() = owner.clone();
        self.listeners
            .borrow_mut()
            .retain(|listener| listener.send(owner.clone()).is_ok());
    }
}

impl IdentityProvider for LocalIdentity {
    fn current_owner(&self) -> Option<OwnerId> {
        self.owner.borrow().clone()
    }

    fn changes(&self) -> Receiver<Option<OwnerId>> {
        let (sender, receiver) = mpsc::channel();
        self.listeners.borrow_mut().push(sender);
        receiver
    }

    fn sign_out(&self) -> Result<(), IdentityError> {
        if self.owner.borrow().is_none() {
            return Err(IdentityError::NotSignedIn);
        }
        info!("event=sign_out module=identity status=ok");
        self.transition(None);
        Ok(())
    }
}
