use crate::model::job::Network;

/// Static per-network endpoint table (spec §4.C step 1, §6 "Upstream Feed
/// Adapter endpoints"). Grounded on the teacher's `deployments.rs`, which
/// keyed a fixed artifact (RPC URL, contract address) per chain instead of
/// discovering it at runtime — the same "small static table, no discovery"
/// posture, generalized from one field (an RPC URL) to a REST base URL.
#[derive(Debug, Clone, Copy)]
pub struct NetworkEndpoint {
    pub base_url: &'static str,
}

pub fn endpoint_for(network: Network) -> NetworkEndpoint {
    match network {
        Network::Mainnet => NetworkEndpoint { base_url: "https://explorer-api.chain-watch.internal" },
        Network::Testnet => NetworkEndpoint { base_url: "https://explorer-api-testnet.chain-watch.internal" },
        Network::Devnet => NetworkEndpoint { base_url: "https://explorer-api-devnet.chain-watch.internal" },
    }
}

pub const DEFAULT_LIMIT: u32 = 25;

/// The three wallet-transactions candidates tried in sequence (spec §4.C
/// step 2, §6). Token and NFT kinds have a single candidate each.
pub fn wallet_candidates(base_url: &str, addr: &str) -> Vec<String> {
    vec![
        format!("{base_url}/accounts/{addr}/transactions"),
        format!("{base_url}/accounts/evm/{addr}/transactions"),
        format!("{base_url}/contracts/evm/{addr}/transactions"),
    ]
}

pub fn token_transfers_url(base_url: &str, addr: &str, limit: u32) -> String {
    format!("{base_url}/transfers/evm/erc20?tokenHash={addr}&offset=0&limit={limit}")
}

pub fn nft_transfers_url(base_url: &str, addr: &str, limit: u32) -> String {
    format!("{base_url}/transfers/evm/erc721?tokenHash={addr}&offset=0&limit={limit}")
}

pub fn address_url(base_url: &str, addr: &str) -> String {
    format!("{base_url}/addresses/evm/{addr}")
}

pub fn token_holdings_url(base_url: &str, addr: &str) -> String {
    format!("{base_url}/addresses/evm/{addr}/tokens?type=ERC-20")
}

pub fn nft_holdings_url(base_url: &str, addr: &str) -> String {
    format!("{base_url}/addresses/evm/{addr}/tokens?type=ERC-721")
}
