use scid_core::ChainCode;

/// EVM (and placeholder non-EVM) chain ids with a known SCid chain code.
pub fn chain_code_for_chain_id(chain_id: u64) -> Option<ChainCode> {
    match chain_id {
        137 | 80001 => Some(ChainCode::Polygon),
        7000 | 7001 => Some(ChainCode::ZetaChain),
        1 => Some(ChainCode::Ethereum),
        8453 => Some(ChainCode::Base),
        101 => Some(ChainCode::Solana),
        56 => Some(ChainCode::Binance),
        43114 => Some(ChainCode::Avalanche),
        42161 => Some(ChainCode::Arbitrum),
        _ => None,
    }
}

/// Explicit code wins, then a known chain id, then Polygon.
pub fn resolve_chain(code: Option<ChainCode>, chain_id: Option<u64>) -> ChainCode {
    code.or_else(|| chain_id.and_then(chain_code_for_chain_id))
        .unwrap_or(ChainCode::Polygon)
}
