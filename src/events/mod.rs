//! Contract event types and parsing
//!
//! Defines the events emitted by the matrix rollup contract.

use crate::contract::{ContractInterface, NEW_RECEIPT};
use crate::error::{SubmitterError, SubmitterResult};

use ethers::abi::Token;
use ethers::types::{Log, H256, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Events emitted by the rollup contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContractEvent {
    /// A multiplication request was recorded
    NewReceipt {
        request_id: U256,
        block_number: u64,
        tx_hash: H256,
    },

    /// Unknown event
    Unknown {
        topic: H256,
        block_number: u64,
        tx_hash: H256,
    },
}

impl ContractEvent {
    /// Get event name for metrics
    pub fn name(&self) -> &'static str {
        match self {
            ContractEvent::NewReceipt { .. } => "new_receipt",
            ContractEvent::Unknown { .. } => "unknown",
        }
    }

    pub fn block_number(&self) -> u64 {
        match self {
            ContractEvent::NewReceipt { block_number, .. } => *block_number,
            ContractEvent::Unknown { block_number, .. } => *block_number,
        }
    }

    /// Request id carried by the event, if any
    pub fn request_id(&self) -> Option<U256> {
        match self {
            ContractEvent::NewReceipt { request_id, .. } => Some(*request_id),
            ContractEvent::Unknown { .. } => None,
        }
    }
}

/// Event parser for the rollup contract
pub struct EventParser {
    contract: Arc<ContractInterface>,
    new_receipt_topic: H256,
}

impl EventParser {
    /// Create a new event parser
    pub fn new(contract: Arc<ContractInterface>) -> SubmitterResult<Self> {
        let new_receipt_topic = contract.event_topic(NEW_RECEIPT)?;
        Ok(Self {
            contract,
            new_receipt_topic,
        })
    }

    pub fn new_receipt_topic(&self) -> H256 {
        self.new_receipt_topic
    }

    /// Parse a log entry into a ContractEvent
    pub fn parse_log(&self, log: &Log) -> SubmitterResult<ContractEvent> {
        let block_number = log.block_number.map(|b| b.as_u64()).unwrap_or(0);
        let tx_hash = log.transaction_hash.unwrap_or_default();
        let topic = log.topics.first().copied().unwrap_or_default();

        if topic != self.new_receipt_topic {
            return Ok(ContractEvent::Unknown {
                topic,
                block_number,
                tx_hash,
            });
        }

        let params = self.contract.unpack(NEW_RECEIPT, log)?;
        let request_id = params
            .into_iter()
            .find(|(name, _)| name == "requestId")
            .and_then(|(_, value)| match value {
                Token::Uint(id) => Some(id),
                _ => None,
            })
            .ok_or_else(|| {
                SubmitterError::Contract("NewReceipt log without requestId".to_string())
            })?;

        Ok(ContractEvent::NewReceipt {
            request_id,
            block_number,
            tx_hash,
        })
    }
}
