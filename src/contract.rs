//! Typed access to the matrix rollup contract
//!
//! The contract address and ABI are explicit configuration handed to
//! [`ContractInterface`] at construction.

use crate::config::ChainConfig;
use crate::error::{SubmitterError, SubmitterResult};
use crate::matrix::{Matrix, DIM};

use ethers::abi::{parse_abi, Abi, RawLog, Token};
use ethers::types::{Address, Bytes, Log, H256, U256};
use std::path::Path;

/// Interface used when no ABI file is configured
pub const DEFAULT_ABI: &[&str] = &[
    "function getMatrices(uint256 requestId) view returns (uint256[3][3][2])",
    "function submitResult(bytes root, uint256[3][3] result, uint256 requestId)",
    "event NewReceipt(uint256 indexed requestId)",
];

pub const GET_MATRICES: &str = "getMatrices";
pub const SUBMIT_RESULT: &str = "submitResult";
pub const NEW_RECEIPT: &str = "NewReceipt";

/// ABI plus deployed address of the rollup contract
#[derive(Debug, Clone)]
pub struct ContractInterface {
    abi: Abi,
    address: Address,
}

impl ContractInterface {
    pub fn new(abi: Abi, address: Address) -> Self {
        Self { abi, address }
    }

    /// Contract with the built-in interface
    pub fn with_default_abi(address: Address) -> SubmitterResult<Self> {
        let abi = parse_abi(DEFAULT_ABI)
            .map_err(|e| SubmitterError::Contract(format!("Invalid built-in ABI: {}", e)))?;
        Ok(Self::new(abi, address))
    }

    /// Build from chain configuration, reading the ABI file if one is set
    pub fn from_config(config: &ChainConfig) -> SubmitterResult<Self> {
        let address: Address = config
            .contract_address
            .parse()
            .map_err(|e| SubmitterError::Config(format!("Invalid contract address: {}", e)))?;

        match &config.abi_path {
            Some(path) => Ok(Self::new(load_abi(Path::new(path))?, address)),
            None => Self::with_default_abi(address),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Encode a call to `method` with already-built tokens
    pub fn pack(&self, method: &str, args: &[Token]) -> SubmitterResult<Bytes> {
        let function = self
            .abi
            .function(method)
            .map_err(|e| SubmitterError::Contract(format!("Unknown method {}: {}", method, e)))?;
        function
            .encode_input(args)
            .map(Bytes::from)
            .map_err(|e| SubmitterError::Contract(format!("Failed to pack {}: {}", method, e)))
    }

    pub fn encode_get_matrices(&self, request_id: U256) -> SubmitterResult<Bytes> {
        self.pack(GET_MATRICES, &[Token::Uint(request_id)])
    }

    /// Decode the `getMatrices` return data into the two input matrices
    pub fn decode_matrices(&self, data: &[u8]) -> SubmitterResult<[Matrix; 2]> {
        let function = self
            .abi
            .function(GET_MATRICES)
            .map_err(|e| SubmitterError::Contract(e.to_string()))?;
        let tokens = function.decode_output(data).map_err(|e| {
            SubmitterError::Contract(format!("Failed to unpack {}: {}", GET_MATRICES, e))
        })?;

        let outer = match tokens.into_iter().next() {
            Some(Token::FixedArray(items)) if items.len() == 2 => items,
            other => {
                return Err(SubmitterError::Contract(format!(
                    "Unexpected {} output: {:?}",
                    GET_MATRICES, other
                )))
            }
        };

        let mut matrices = [[[U256::zero(); DIM]; DIM]; 2];
        for (slot, token) in matrices.iter_mut().zip(outer) {
            *slot = matrix_from_token(token)?;
        }
        Ok(matrices)
    }

    pub fn encode_submit_result(
        &self,
        root: H256,
        result: &Matrix,
        request_id: U256,
    ) -> SubmitterResult<Bytes> {
        self.pack(
            SUBMIT_RESULT,
            &[
                Token::Bytes(root.as_bytes().to_vec()),
                matrix_to_token(result),
                Token::Uint(request_id),
            ],
        )
    }

    /// Topic0 of a contract event
    pub fn event_topic(&self, event: &str) -> SubmitterResult<H256> {
        self.abi
            .event(event)
            .map(|e| e.signature())
            .map_err(|e| SubmitterError::Contract(format!("Unknown event {}: {}", event, e)))
    }

    /// Decode a log against a named event, returning its parameters in order
    pub fn unpack(&self, event: &str, log: &Log) -> SubmitterResult<Vec<(String, Token)>> {
        let abi_event = self
            .abi
            .event(event)
            .map_err(|e| SubmitterError::Contract(format!("Unknown event {}: {}", event, e)))?;
        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };
        let parsed = abi_event
            .parse_log(raw)
            .map_err(|e| SubmitterError::Contract(format!("Failed to unpack {}: {}", event, e)))?;
        Ok(parsed.params.into_iter().map(|p| (p.name, p.value)).collect())
    }
}

/// Load an ABI from either a bare JSON array or a Hardhat artifact
pub fn load_abi(path: &Path) -> SubmitterResult<Abi> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| SubmitterError::Config(format!("Error reading ABI file {:?}: {}", path, e)))?;
    let mut value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| SubmitterError::Config(format!("Invalid ABI JSON {:?}: {}", path, e)))?;

    if let Some(inner) = value.get_mut("abi") {
        value = inner.take();
    }

    serde_json::from_value(value)
        .map_err(|e| SubmitterError::Config(format!("Failed to parse contract ABI: {}", e)))
}

fn matrix_to_token(matrix: &Matrix) -> Token {
    Token::FixedArray(
        matrix
            .iter()
            .map(|row| Token::FixedArray(row.iter().map(|v| Token::Uint(*v)).collect()))
            .collect(),
    )
}

fn matrix_from_token(token: Token) -> SubmitterResult<Matrix> {
    let bad = || SubmitterError::Contract("Malformed uint256[3][3]".to_string());

    let rows = token.into_fixed_array().ok_or_else(bad)?;
    if rows.len() != DIM {
        return Err(bad());
    }

    let mut matrix = [[U256::zero(); DIM]; DIM];
    for (i, row) in rows.into_iter().enumerate() {
        let cells = row.into_fixed_array().ok_or_else(bad)?;
        if cells.len() != DIM {
            return Err(bad());
        }
        for (j, cell) in cells.into_iter().enumerate() {
            matrix[i][j] = cell.into_uint().ok_or_else(bad)?;
        }
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::from_u64;
    use ethers::abi::encode;
    use std::io::Write;

    fn contract() -> ContractInterface {
        ContractInterface::with_default_abi(Address::repeat_byte(0x11)).unwrap()
    }

    #[test]
    fn test_submit_result_selector() {
        let data = contract()
            .encode_submit_result(
                H256::repeat_byte(0xaa),
                &from_u64([[1, 2, 3], [4, 5, 6], [7, 8, 9]]),
                U256::from(7),
            )
            .unwrap();

        let selector = &ethers::utils::keccak256("submitResult(bytes,uint256[3][3],uint256)")[..4];
        assert_eq!(&data[..4], selector);
    }

    #[test]
    fn test_decode_matrices() {
        let a = from_u64([[1, 2, 3], [4, 5, 6], [7, 8, 9]]);
        let b = from_u64([[9, 8, 7], [6, 5, 4], [3, 2, 1]]);
        let output = encode(&[Token::FixedArray(vec![
            matrix_to_token(&a),
            matrix_to_token(&b),
        ])]);

        let [da, db] = contract().decode_matrices(&output).unwrap();
        assert_eq!(da, a);
        assert_eq!(db, b);
    }

    #[test]
    fn test_decode_matrices_rejects_garbage() {
        assert!(contract().decode_matrices(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_unpack_new_receipt() {
        let c = contract();
        let log = Log {
            address: c.address(),
            topics: vec![
                c.event_topic(NEW_RECEIPT).unwrap(),
                H256::from_low_u64_be(42),
            ],
            ..Default::default()
        };

        let params = c.unpack(NEW_RECEIPT, &log).unwrap();
        assert_eq!(params[0].0, "requestId");
        assert_eq!(params[0].1, Token::Uint(U256::from(42)));
    }

    #[test]
    fn test_load_abi_from_hardhat_artifact() {
        let artifact = r#"{
            "contractName": "Rollup",
            "abi": [{
                "type": "event",
                "name": "NewReceipt",
                "anonymous": false,
                "inputs": [{"name": "requestId", "type": "uint256", "indexed": true}]
            }]
        }"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(artifact.as_bytes()).unwrap();

        let abi = load_abi(file.path()).unwrap();
        let c = ContractInterface::new(abi, Address::zero());
        assert_eq!(
            c.event_topic(NEW_RECEIPT).unwrap(),
            H256::from(ethers::utils::keccak256("NewReceipt(uint256)"))
        );
    }
}
