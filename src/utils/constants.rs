//! Constants Module - Single Source of Truth
//!
//! Semua konstanta, default konfigurasi, dan allow-list protokol
//! yang digunakan di seluruh aplikasi didefinisikan di sini.

use alloy_primitives::U256;
use serde::Serialize;

use crate::models::types::Chain;

// ============================================
// APPLICATION CONSTANTS
// ============================================

/// Application name
pub const APP_NAME: &str = "chainscore";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent for upstream HTTP requests
pub const USER_AGENT: &str = concat!("chainscore/", env!("CARGO_PKG_VERSION"));

// ============================================
// RPC / RETRY DEFAULTS
// ============================================

/// Per-attempt timeout for upstream calls (ms)
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 5_000;

/// Attempts per upstream call (first try included)
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 4;

/// Backoff base / cap (ms): 250 → 500 → 1000 ... capped at 4000
pub const DEFAULT_RETRY_BASE_MS: u64 = 250;
pub const DEFAULT_RETRY_MAX_MS: u64 = 4_000;

/// ±jitter applied to every backoff
pub const DEFAULT_RETRY_JITTER_PERCENT: u64 = 20;

/// Concurrent in-flight calls allowed per upstream host
pub const DEFAULT_CONCURRENCY_PER_HOST: usize = 8;

// ============================================
// CACHE / REQUEST DEFAULTS
// ============================================

/// Default cache TTL (seconds)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default cache capacity (entries)
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Overall request deadline (ms)
pub const DEFAULT_REQUEST_DEADLINE_MS: u64 = 25_000;

/// How often expired cache entries are swept (seconds)
pub const CACHE_CLEANUP_INTERVAL_SECS: u64 = 60;

// ============================================
// SCORING LIMITS
// ============================================

/// Largest share of the total weight any single factor may carry
pub const MAX_FACTOR_WEIGHT_SHARE: f64 = 0.5;

// ============================================
// DEFAULT ENDPOINTS
// ============================================

pub const DEFAULT_SEI_RPC_URL: &str = "https://evm-rpc.sei-apis.com";
pub const DEFAULT_SEI_EXPLORER_URL: &str = "https://sei.blockscout.com/api/v2";
pub const DEFAULT_SEI_REST_URL: &str = "https://rest.sei-apis.com";
pub const DEFAULT_SOLANA_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

// ============================================
// FETCH BOUNDS
// ============================================

/// Blockscout pages of transactions fetched per wallet (50 per page)
pub const SEI_MAX_TX_PAGES: usize = 4;

/// alchemy_getAssetTransfers maxCount for recent history
pub const ETH_MAX_TRANSFERS: u64 = 1_000;

/// ERC-20 contracts whose metadata (decimals, symbol) is looked up per wallet
pub const ETH_MAX_TOKEN_METADATA: usize = 25;

/// getSignaturesForAddress limit
pub const SOLANA_MAX_SIGNATURES: usize = 1_000;

/// Recent Solana transactions inspected for invoked programs
pub const SOLANA_MAX_TX_INSPECT: usize = 25;

/// Governance proposals considered on Sei
pub const SEI_MAX_PROPOSALS: usize = 200;

// ============================================
// CHAIN PRECOMPILES / PROGRAMS
// ============================================

/// Sei address precompile (EVM → bech32 association)
pub const SEI_ADDR_PRECOMPILE: &str = "0x0000000000000000000000000000000000001004";

/// Sei IBC precompile
pub const SEI_IBC_PRECOMPILE: &str = "0x0000000000000000000000000000000000001009";

/// Sei native decimals (usei → SEI)
pub const SEI_COSMOS_DECIMALS: i32 = 6;

/// Lido stETH on Ethereum mainnet
pub const LIDO_STETH: &str = "0xae7ab96520de3a18e5e111b5eaab095312d7fe84";

/// Solana stake program
pub const SOLANA_STAKE_PROGRAM: &str = "Stake11111111111111111111111111111111111111";

/// SPL token program
pub const SOLANA_TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Staker authority offset inside a stake account (enum tag u32 + rent reserve u64)
pub const SOLANA_STAKER_OFFSET: usize = 12;

pub const LAMPORTS_PER_SOL: f64 = 1e9;

// ============================================
// DEFI PROTOCOL ALLOW-LIST
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolCategory {
    Lending,
    Dex,
    Bridge,
}

/// Known protocol contract / program
#[derive(Debug, Clone)]
pub struct ProtocolInfo {
    pub name: &'static str,
    pub address: &'static str,
    pub category: ProtocolCategory,
}

/// Known protocol contracts per chain (addresses compared case-insensitively on EVM)
pub fn known_protocols(chain: Chain) -> Vec<ProtocolInfo> {
    use ProtocolCategory::*;
    match chain {
        Chain::Ethereum => vec![
            ProtocolInfo { name: "Aave V3", address: "0x87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2", category: Lending },
            ProtocolInfo { name: "Aave V2", address: "0x7d2768dE32b0b80b7a3454c06BdAc94A69DDc7A9", category: Lending },
            ProtocolInfo { name: "Compound V3 USDC", address: "0xc3d688B66703497DAA19211EEdff47f25384cdc3", category: Lending },
            ProtocolInfo { name: "Compound V2", address: "0x3d9819210A31b4961b30EF54bE2aeD79B9c9Cd3B", category: Lending },
            ProtocolInfo { name: "Uniswap V2", address: "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D", category: Dex },
            ProtocolInfo { name: "Uniswap V3", address: "0xE592427A0AEce92De3Edee1F18E0157C05861564", category: Dex },
            ProtocolInfo { name: "Uniswap V3 Router02", address: "0x68b3465833fb72A70ecDF485E0e4C7bD8665Fc45", category: Dex },
            ProtocolInfo { name: "Uniswap Universal Router", address: "0x3fC91A3afd70395Cd496C647d5a6CC9D4B2b7FAD", category: Dex },
            ProtocolInfo { name: "SushiSwap", address: "0xd9e1cE17f2641f24aE83637ab66a2cca9C378B9F", category: Dex },
            ProtocolInfo { name: "1inch V5", address: "0x1111111254EEB25477B68fb85Ed929f73A960582", category: Dex },
            ProtocolInfo { name: "Curve 3pool", address: "0xbEbc44782C7dB0a1A60Cb6fe97d0b483032FF1C7", category: Dex },
            ProtocolInfo { name: "Balancer Vault", address: "0xBA12222222228d8Ba445958a75a0704d566BF2C8", category: Dex },
            ProtocolInfo { name: "Arbitrum Inbox", address: "0x4Dbd4fc535Ac27206064B68FfCf827b0A60BAB3f", category: Bridge },
            ProtocolInfo { name: "Optimism Bridge", address: "0x99C9fc46f92E8a1c0deC1b1747d010903E884bE1", category: Bridge },
            ProtocolInfo { name: "Polygon PoS Bridge", address: "0xA0c68C638235ee32657e8f720a23ceC1bFc77C77", category: Bridge },
            ProtocolInfo { name: "Base Bridge", address: "0x3154Cf16ccdb4C6d922629664174b904d80F2C35", category: Bridge },
        ],
        Chain::Sei => vec![
            ProtocolInfo { name: "Sei IBC", address: SEI_IBC_PRECOMPILE, category: Bridge },
        ],
        Chain::Solana => vec![
            ProtocolInfo { name: "Jupiter", address: "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4", category: Dex },
            ProtocolInfo { name: "Raydium AMM", address: "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8", category: Dex },
            ProtocolInfo { name: "Raydium CLMM", address: "CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK", category: Dex },
            ProtocolInfo { name: "Orca Whirlpool", address: "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc", category: Dex },
            ProtocolInfo { name: "Solend", address: "So1endDq2YkqhipRh3WViPa8hdiSpxWy6z3Z6tMCpAo", category: Lending },
            ProtocolInfo { name: "Kamino Lend", address: "KLend2g3cP87fffoy8q1mQqGKjrxjC8boSyAYavgmjD", category: Lending },
            ProtocolInfo { name: "Wormhole Core", address: "worm2ZoG2kUd4vFXhvjh93UUH596ayRfgQ2MgjNMTth", category: Bridge },
            ProtocolInfo { name: "Wormhole Token Bridge", address: "wormDTUJ6AWPNvk59vGQbDvGJmqbDTdgWgAqcLBCgUb", category: Bridge },
        ],
    }
}

/// Function signatures that identify a DeFi interaction on EVM chains
/// when the contract itself is not on the address list.
pub const KNOWN_SIGNATURES: [(&str, ProtocolCategory); 14] = [
    // Aave-style pools
    ("supply(address,uint256,address,uint16)", ProtocolCategory::Lending),
    ("deposit(address,uint256,address,uint16)", ProtocolCategory::Lending),
    ("borrow(address,uint256,uint256,uint16,address)", ProtocolCategory::Lending),
    ("repay(address,uint256,uint256,address)", ProtocolCategory::Lending),
    // Uniswap-style routers
    ("swapExactTokensForTokens(uint256,uint256,address[],address,uint256)", ProtocolCategory::Dex),
    ("swapExactETHForTokens(uint256,address[],address,uint256)", ProtocolCategory::Dex),
    ("swapExactTokensForETH(uint256,uint256,address[],address,uint256)", ProtocolCategory::Dex),
    ("addLiquidity(address,address,uint256,uint256,uint256,uint256,address,uint256)", ProtocolCategory::Dex),
    ("exactInputSingle((address,address,uint24,address,uint256,uint256,uint256,uint160))", ProtocolCategory::Dex),
    ("exactInput((bytes,address,uint256,uint256,uint256))", ProtocolCategory::Dex),
    // OP-stack / Arbitrum bridges
    ("depositETH(uint32,bytes)", ProtocolCategory::Bridge),
    ("depositERC20(address,address,uint256,uint32,bytes)", ProtocolCategory::Bridge),
    ("bridgeETHTo(address,uint32,bytes)", ProtocolCategory::Bridge),
    ("depositEth()", ProtocolCategory::Bridge),
];

// ============================================
// TOKEN CLASSIFICATION
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetClass {
    Stablecoin,
    Bluechip,
    Other,
}

const STABLE_TOKENS: [&str; 5] = [
    // Ethereum: USDT, USDC, DAI
    "0xdac17f958d2ee523a2206206994597c13d831ec7",
    "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
    "0x6b175474e89094c44da98b954eedeac495271d0f",
    // Solana: USDC, USDT
    "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
    "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB",
];

const BLUECHIP_TOKENS: [&str; 6] = [
    // Ethereum: WETH, WBTC, stETH
    "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2",
    "0x2260fac5e5542a773aa44fbcfedf7c193bc2c599",
    LIDO_STETH,
    // Solana: wSOL, mSOL, JitoSOL
    "So11111111111111111111111111111111111111112",
    "mSoLzYCxHdYgdzU16g5QSh3i5K3z3KZK7ytfqcJm7So",
    "J1toso1uCk3RLmjorhTtrVwY9HJ7X8V9yYac6Y7kGCPn",
];

const STABLE_SYMBOLS: [&str; 8] = ["USDC", "USDT", "DAI", "USDC.N", "USDE", "FRAX", "PYUSD", "USDS"];

const BLUECHIP_SYMBOLS: [&str; 11] = [
    "ETH", "WETH", "WBTC", "BTC", "STETH", "WSTETH", "SOL", "WSOL", "SEI", "WSEI", "MSOL",
];

/// Classify a holding by contract/mint first, then by symbol
pub fn classify_asset(asset_id: &str, symbol: Option<&str>, is_native: bool) -> AssetClass {
    if is_native {
        return AssetClass::Bluechip;
    }
    let id = if asset_id.starts_with("0x") {
        asset_id.to_lowercase()
    } else {
        asset_id.to_string()
    };
    if STABLE_TOKENS.contains(&id.as_str()) {
        return AssetClass::Stablecoin;
    }
    if BLUECHIP_TOKENS.contains(&id.as_str()) {
        return AssetClass::Bluechip;
    }
    match symbol.map(|s| s.to_uppercase()) {
        Some(s) if STABLE_SYMBOLS.contains(&s.as_str()) => AssetClass::Stablecoin,
        Some(s) if BLUECHIP_SYMBOLS.contains(&s.as_str()) => AssetClass::Bluechip,
        _ => AssetClass::Other,
    }
}

// ============================================
// CONVERSIONS
// ============================================

/// Convert a base-unit integer to a whole-unit float
#[inline]
pub fn to_units(raw: U256, decimals: u8) -> f64 {
    let raw_u128: u128 = raw.try_into().unwrap_or(u128::MAX);
    raw_u128 as f64 / 10f64.powi(decimals as i32)
}

/// Parse a `0x`-prefixed quantity (eth_getBalance style)
pub fn parse_hex_quantity(value: &str) -> Option<U256> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.is_empty() {
        return Some(U256::ZERO);
    }
    U256::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_units() {
        let one_eth = U256::from(1_000_000_000_000_000_000u128);
        assert!((to_units(one_eth, 18) - 1.0).abs() < 1e-9);
        assert!((to_units(U256::from(1_500_000u64), 6) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_hex_quantity() {
        assert_eq!(parse_hex_quantity("0x0"), Some(U256::ZERO));
        assert_eq!(parse_hex_quantity("0x"), Some(U256::ZERO));
        assert_eq!(parse_hex_quantity("0xde0b6b3a7640000"), Some(U256::from(10u128.pow(18))));
        assert_eq!(parse_hex_quantity("0xzz"), None);
    }

    #[test]
    fn test_classify_asset() {
        assert_eq!(classify_asset("SEI", Some("SEI"), true), AssetClass::Bluechip);
        assert_eq!(
            classify_asset("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", None, false),
            AssetClass::Stablecoin
        );
        assert_eq!(
            classify_asset("0x1234000000000000000000000000000000000000", Some("usdc"), false),
            AssetClass::Stablecoin
        );
        assert_eq!(
            classify_asset("So11111111111111111111111111111111111111112", None, false),
            AssetClass::Bluechip
        );
        assert_eq!(classify_asset("0xabc", Some("PEPE"), false), AssetClass::Other);
    }

    #[test]
    fn test_every_chain_has_protocols() {
        for chain in Chain::ALL {
            assert!(!known_protocols(chain).is_empty(), "{} has no protocols", chain);
        }
    }
}
