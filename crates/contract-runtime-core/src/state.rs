//! State collaborator interfaces.
//!
//! The runtime never owns ledger state; it reaches it through these traits:
//! - [`BalanceManager`]: read and transfer balances
//! - [`ContractManager`]: contract-scoped key/value state, account bindings
//!   and bytecode storage
//!
//! [`InMemoryState`] is a `DashMap`-backed implementation for tests and the
//! local CLI.

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

use contract_runtime_common::{Address, ContractId, StateError};

/// Balance access.
#[async_trait]
pub trait BalanceManager: Send + Sync {
    /// Balance of `address`; zero for unknown accounts.
    async fn get_balance(&self, address: &Address) -> Result<u64, StateError>;

    /// Move `amount` from `from` to `to`.
    async fn transfer_balance(
        &self,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), StateError>;
}

/// Contract code and storage access.
#[async_trait]
pub trait ContractManager: Send + Sync {
    /// Read a key from the state scoped to `contract`.
    async fn get_state(&self, contract: &Address, key: &[u8])
    -> Result<Option<Vec<u8>>, StateError>;

    /// Write a key in the state scoped to `contract`.
    async fn put_state(
        &self,
        contract: &Address,
        key: &[u8],
        value: Vec<u8>,
    ) -> Result<(), StateError>;

    /// Delete a key from the state scoped to `contract`, returning whether it existed.
    async fn delete_state(&self, contract: &Address, key: &[u8]) -> Result<bool, StateError>;

    /// Contract id bound to `account`.
    async fn get_account_contract(&self, account: &Address) -> Result<ContractId, StateError>;

    /// Raw bytecode stored under `id`.
    async fn get_contract_bytes(&self, id: &ContractId) -> Result<Vec<u8>, StateError>;

    /// Create a new account bound to `id`.
    async fn new_account_with_contract(
        &self,
        id: &ContractId,
        creation_data: &[u8],
    ) -> Result<Address, StateError>;

    /// Bind `account` to `id`.
    async fn set_account_contract(
        &self,
        account: &Address,
        id: &ContractId,
    ) -> Result<(), StateError>;

    /// Store bytecode under `id`.
    async fn set_contract_bytes(&self, id: &ContractId, bytes: Vec<u8>)
    -> Result<(), StateError>;
}

/// The full state surface a call needs.
pub trait StateManager: BalanceManager + ContractManager {}

impl<T: BalanceManager + ContractManager> StateManager for T {}

/// In-memory state backend.
#[derive(Debug, Default)]
pub struct InMemoryState {
    balances: DashMap<Address, u64>,
    accounts: DashMap<Address, ContractId>,
    code: DashMap<ContractId, Vec<u8>>,
    storage: DashMap<(Address, Vec<u8>), Vec<u8>>,
    nonce: AtomicU64,
}

impl InMemoryState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the balance of `address`.
    pub fn set_balance(&self, address: Address, amount: u64) {
        self.balances.insert(address, amount);
    }

    /// Store `bytes` under `id` and bind `account` to it.
    pub fn deploy(&self, account: Address, id: ContractId, bytes: Vec<u8>) {
        self.code.insert(id.clone(), bytes);
        self.accounts.insert(account, id);
    }
}

#[async_trait]
impl BalanceManager for InMemoryState {
    async fn get_balance(&self, address: &Address) -> Result<u64, StateError> {
        Ok(self.balances.get(address).map_or(0, |b| *b))
    }

    async fn transfer_balance(
        &self,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), StateError> {
        if from == to {
            return Ok(());
        }
        {
            let mut sender = self.balances.entry(*from).or_insert(0);
            if *sender < amount {
                return Err(StateError::InsufficientBalance {
                    available: *sender,
                    requested: amount,
                });
            }
            *sender -= amount;
        }
        let credited = {
            let mut receiver = self.balances.entry(*to).or_insert(0);
            match receiver.checked_add(amount) {
                Some(total) => {
                    *receiver = total;
                    true
                }
                None => false,
            }
        };
        if !credited {
            // Receiver guard is released; put the debit back.
            let mut sender = self.balances.entry(*from).or_insert(0);
            *sender = sender.saturating_add(amount);
            return Err(StateError::Backend(format!("balance overflow for {to}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ContractManager for InMemoryState {
    async fn get_state(
        &self,
        contract: &Address,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StateError> {
        Ok(self
            .storage
            .get(&(*contract, key.to_vec()))
            .map(|v| v.clone()))
    }

    async fn put_state(
        &self,
        contract: &Address,
        key: &[u8],
        value: Vec<u8>,
    ) -> Result<(), StateError> {
        self.storage.insert((*contract, key.to_vec()), value);
        Ok(())
    }

    async fn delete_state(&self, contract: &Address, key: &[u8]) -> Result<bool, StateError> {
        Ok(self.storage.remove(&(*contract, key.to_vec())).is_some())
    }

    async fn get_account_contract(&self, account: &Address) -> Result<ContractId, StateError> {
        self.accounts
            .get(account)
            .map(|id| id.clone())
            .ok_or_else(|| StateError::AccountNotFound {
                address: account.to_string(),
            })
    }

    async fn get_contract_bytes(&self, id: &ContractId) -> Result<Vec<u8>, StateError> {
        self.code
            .get(id)
            .map(|bytes| bytes.clone())
            .ok_or_else(|| StateError::ContractNotFound {
                contract_id: id.to_string(),
            })
    }

    async fn new_account_with_contract(
        &self,
        id: &ContractId,
        creation_data: &[u8],
    ) -> Result<Address, StateError> {
        if !self.code.contains_key(id) {
            return Err(StateError::ContractNotFound {
                contract_id: id.to_string(),
            });
        }

        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha256::new();
        hasher.update(id.as_bytes());
        hasher.update(creation_data);
        hasher.update(nonce.to_le_bytes());
        let address = Address::from_parts(0, hasher.finalize().into());

        self.accounts.insert(address, id.clone());
        Ok(address)
    }

    async fn set_account_contract(
        &self,
        account: &Address,
        id: &ContractId,
    ) -> Result<(), StateError> {
        self.accounts.insert(*account, id.clone());
        Ok(())
    }

    async fn set_contract_bytes(
        &self,
        id: &ContractId,
        bytes: Vec<u8>,
    ) -> Result<(), StateError> {
        self.code.insert(id.clone(), bytes);
        Ok(())
    }
}
