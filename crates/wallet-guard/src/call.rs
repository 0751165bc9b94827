// Callee code and the frame it executes in
//
// A frame binds three addresses: `code` (whose logic runs), `this` (whose
// storage and identity are used) and `sender` (who is calling). A DirectCall
// runs the target in its own context. A ContextSharingCall runs the target's
// code with the caller's `this` and `sender`, so the callee can read and write
// the caller's storage.

use crate::{
    address::Address,
    ledger::{CallOrigin, CallRequest, Ledger},
    operation::OperationKind,
    registry::RegistryError,
};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("call reverted: {0}")]
    Reverted(String),

    #[error("sender {sender} is not authorized")]
    Unauthorized { sender: Address },

    #[error("call depth {0} exceeds the configured maximum")]
    DepthExceeded(usize),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("callee panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Code deployed at an address
pub trait CallTarget: Send + Sync {
    /// Execute against `frame`. Returning an error reverts every effect of this
    /// call, including nested calls it made.
    fn invoke(&self, frame: &mut CallFrame<'_>) -> Result<Vec<u8>, CallError>;

    fn name(&self) -> &str {
        "contract"
    }
}

/// Execution context handed to a `CallTarget`
pub struct CallFrame<'a> {
    pub(crate) ledger: &'a mut Ledger,
    pub(crate) sender: Address,
    pub(crate) this: Address,
    pub(crate) code: Address,
    pub(crate) value: u128,
    pub(crate) payload: Vec<u8>,
    pub(crate) depth: usize,
    pub(crate) max_depth: usize,
}

impl CallFrame<'_> {
    pub fn sender(&self) -> Address {
        self.sender
    }

    /// Address whose storage this frame reads and writes
    pub fn this(&self) -> Address {
        self.this
    }

    /// Address of the code being executed
    pub fn code(&self) -> Address {
        self.code
    }

    pub fn value(&self) -> u128 {
        self.value
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn load(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.ledger.state().load(&self.this, key).map(<[u8]>::to_vec)
    }

    pub fn store(&mut self, key: &[u8], value: Vec<u8>) {
        self.ledger.state_mut().store(self.this, key, value);
    }

    pub fn remove(&mut self, key: &[u8]) {
        self.ledger.state_mut().remove(self.this, key);
    }

    /// Issue a nested call from this frame
    ///
    /// A failed nested call has its own effects reverted; the error is returned
    /// to this frame, which may handle it or propagate it.
    pub fn call(
        &mut self,
        target: Address,
        value: u128,
        payload: Vec<u8>,
        operation: OperationKind,
    ) -> Result<Vec<u8>, CallError> {
        let request = CallRequest {
            origin: CallOrigin {
                this: self.this,
                sender: self.sender,
            },
            target,
            value,
            payload,
            operation,
        };
        self.ledger.dispatch(request, self.depth + 1, self.max_depth)
    }
}

impl fmt::Debug for CallFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallFrame")
            .field("sender", &self.sender)
            .field("this", &self.this)
            .field("code", &self.code)
            .field("value", &self.value)
            .field("payload_len", &self.payload.len())
            .field("depth", &self.depth)
            .finish()
    }
}
