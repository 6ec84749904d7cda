use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Method-signature -> category table (spec §4.D wallet merging). The first
/// 4 bytes of `keccak256(signature)` is a transaction's function selector;
/// we compute it with `ethers::utils::id`, the same helper the teacher's
/// `scanner.rs` uses to derive an event topic0 from its signature string.
static SELECTOR_TABLE: Lazy<HashMap<[u8; 4], &'static str>> = Lazy::new(|| {
    let entries: &[(&str, &str)] = &[
        ("transfer(address,uint256)", "ERC20_TRANSFER"),
        ("transferFrom(address,address,uint256)", "ERC20_TRANSFER_FROM"),
        ("approve(address,uint256)", "ERC20_APPROVE"),
        ("swapExactTokensForTokens(uint256,uint256,address[],address,uint256)", "UNISWAP_SWAP"),
        ("swapExactETHForTokens(uint256,address[],address,uint256)", "UNISWAP_SWAP"),
        ("swapExactTokensForETH(uint256,uint256,address[],address,uint256)", "UNISWAP_SWAP"),
        ("safeTransferFrom(address,address,uint256)", "NFT_SAFE_TRANSFER_FROM"),
        ("safeTransferFrom(address,address,uint256,bytes)", "NFT_SAFE_TRANSFER_FROM"),
        ("mint(address,uint256)", "NFT_MINT"),
        ("deposit()", "DEFI_DEPOSIT"),
        ("withdraw(uint256)", "DEFI_WITHDRAW"),
        ("multicall(bytes[])", "MULTICALL"),
    ];

    entries
        .iter()
        .map(|(sig, category)| {
            let selector = ethers::utils::id(*sig);
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&selector[0..4]);
            (bytes, *category)
        })
        .collect()
});

/// Categorizes a transaction's `data` field per spec §4.D:
/// "Unknown signatures → UNKNOWN_CONTRACT_INTERACTION; empty data →
/// NATIVE_TRANSFER if type=0 else SIMPLE_CONTRACT_CALL".
pub fn categorize(data: &[u8], tx_type: u64) -> &'static str {
    if data.is_empty() {
        return if tx_type == 0 { "NATIVE_TRANSFER" } else { "SIMPLE_CONTRACT_CALL" };
    }
    if data.len() < 4 {
        return "UNKNOWN_CONTRACT_INTERACTION";
    }
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&data[0..4]);
    SELECTOR_TABLE.get(&selector).copied().unwrap_or("UNKNOWN_CONTRACT_INTERACTION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_data_native_transfer() {
        assert_eq!(categorize(&[], 0), "NATIVE_TRANSFER");
        assert_eq!(categorize(&[], 2), "SIMPLE_CONTRACT_CALL");
    }

    #[test]
    fn erc20_transfer_selector() {
        let selector = ethers::utils::id("transfer(address,uint256)");
        assert_eq!(categorize(&selector[0..4], 2), "ERC20_TRANSFER");
    }

    #[test]
    fn unknown_selector() {
        assert_eq!(categorize(&[0xde, 0xad, 0xbe, 0xef], 2), "UNKNOWN_CONTRACT_INTERACTION");
    }
}
