//! Blob transaction construction and submission

mod assembler;
mod fees;
mod sender;
mod types;

pub use assembler::TransactionAssembler;
pub use fees::{FeeParameters, FeeResolver};
pub use sender::TransactionSender;
pub use types::{
    SerializedBlobTransaction, SignedBlobTransaction, TxStage, UnsignedBlobTransaction,
    BLOB_TX_TYPE,
};
