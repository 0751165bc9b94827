//! Deployed guards and each wallet's active guard slot
//!
//! A wallet's active guard lives in the wallet's own storage under
//! [`GUARD_STORAGE_KEY`], so guard changes are journaled and roll back with the
//! attempt that made them. The registry resolves that address to a deployed
//! policy once per attempt.

use crate::{
    address::{Address, ADDRESS_LEN},
    events::WalletEvent,
    guards::{GuardFault, GuardPolicy},
    hooks::{ActiveGuard, GuardSnapshot},
    state::{JournaledState, StateError, StateView},
};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Storage slot holding a wallet's active guard address
pub const GUARD_STORAGE_KEY: &[u8] = b"wallet.guard.address";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no guard is deployed at {0}")]
    GuardNotDeployed(Address),

    #[error("a guard is already deployed at {0}")]
    AlreadyDeployed(Address),

    #[error("{0} is reserved and cannot hold a guard")]
    ReservedAddress(Address),
}

/// Directory of deployed guard policies
#[derive(Default, Clone)]
pub struct GuardRegistry {
    deployed: BTreeMap<Address, Arc<dyn GuardPolicy>>,
}

impl GuardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a policy available at `address`
    pub fn deploy(
        &mut self,
        address: Address,
        policy: Arc<dyn GuardPolicy>,
    ) -> Result<(), RegistryError> {
        if address.is_zero() {
            return Err(RegistryError::ReservedAddress(address));
        }
        if self.deployed.contains_key(&address) {
            return Err(RegistryError::AlreadyDeployed(address));
        }
        debug!(guard = %address, name = policy.name(), "guard deployed");
        self.deployed.insert(address, policy);
        Ok(())
    }

    pub fn is_deployed(&self, address: &Address) -> bool {
        self.deployed.contains_key(address)
    }

    pub fn resolve(&self, address: &Address) -> Option<Arc<dyn GuardPolicy>> {
        self.deployed.get(address).cloned()
    }

    /// Active guard address of `wallet`, if any
    pub fn get_guard(state: &StateView<'_>, wallet: &Address) -> Result<Option<Address>, StateError> {
        let Some(raw) = state.load(wallet, GUARD_STORAGE_KEY) else {
            return Ok(None);
        };
        let bytes: [u8; ADDRESS_LEN] = raw.try_into().map_err(|_| StateError::CorruptSlot {
            owner: *wallet,
            key: String::from_utf8_lossy(GUARD_STORAGE_KEY).into_owned(),
            len: raw.len(),
            expected: ADDRESS_LEN,
        })?;
        let address = Address::new(bytes);
        Ok((!address.is_zero()).then_some(address))
    }

    /// Replace or clear the active guard of `wallet`
    ///
    /// Reachable only through the wallet's self-call path. Takes effect for
    /// attempts started after the current one.
    pub(crate) fn set_guard(
        &self,
        state: &mut JournaledState,
        wallet: Address,
        guard: Option<Address>,
    ) -> Result<(), RegistryError> {
        let guard = guard.filter(|address| !address.is_zero());

        match guard {
            Some(address) => {
                if !self.is_deployed(&address) {
                    return Err(RegistryError::GuardNotDeployed(address));
                }
                state.store(wallet, GUARD_STORAGE_KEY, address.as_bytes().to_vec());
            }
            None => state.remove(wallet, GUARD_STORAGE_KEY),
        }

        info!(wallet = %wallet, guard = ?guard, "guard changed");
        state.emit(WalletEvent::ChangedGuard { wallet, guard });
        Ok(())
    }

    /// Read the active guard once and pin it for a whole attempt
    ///
    /// An address that does not resolve to a deployed guard is a fault, never
    /// an implicit "no guard".
    pub fn snapshot(&self, state: &StateView<'_>, wallet: &Address) -> Result<GuardSnapshot, GuardFault> {
        let address = Self::get_guard(state, wallet).map_err(|e| GuardFault::Failed(e.to_string()))?;
        let Some(address) = address else {
            return Ok(GuardSnapshot::none());
        };
        let policy = self
            .resolve(&address)
            .ok_or(GuardFault::Unresolved(address))?;
        Ok(GuardSnapshot::active(ActiveGuard { address, policy }))
    }
}

impl fmt::Debug for GuardRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardRegistry")
            .field("deployed", &self.deployed.keys().collect::<Vec<_>>())
            .finish()
    }
}
