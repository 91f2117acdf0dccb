use scchain_data_structures::chain::ChainId;

/// Prefix of every key belonging to a chain
#[inline]
pub fn chain_prefix(chain_id: &ChainId) -> String {
    format!("chain-{}-", chain_id)
}

/// Function to create the solid state key of a chain
#[inline]
pub fn solid_state_key(chain_id: &ChainId) -> String {
    format!("{}solid-state", chain_prefix(chain_id))
}

/// Function to create the key of the block with the given index.
///
/// The index is zero padded so that blocks iterate in index order.
#[inline]
pub fn block_key(chain_id: &ChainId, index: u32) -> String {
    format!("{}block-{:010}", chain_prefix(chain_id), index)
}
