//! Providers Module - Chain Data Sources
//!
//! Jalur data: satu transport HTTP bersama, lalu satu adapter per jaringan.

pub mod adapter;
pub mod ethereum;
pub mod rpc;
pub mod sei;
pub mod solana;

pub use adapter::{AdapterRegistry, ChainAdapter};
pub use ethereum::EthereumAdapter;
pub use rpc::{HttpTransport, RestProvider, RpcProvider};
pub use sei::SeiAdapter;
pub use solana::SolanaAdapter;
