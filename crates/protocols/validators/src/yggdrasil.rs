//! Yggdrasil fund recall

use std::collections::BTreeSet;

use asgard_core::{
    memo, Asset, Chain, Coin, ConstantName, Error, NodeAccount, Result, TxId, TxOutItem,
    VaultStatus,
};
use asgard_store::{Keeper, TxOutStore};

/// Ask a node to send everything its yggdrasil vault holds back to the
/// most secure active asgard.
///
/// One zero-value RUNE item per funded chain is queued; the signer sweeps
/// the whole chain balance when it sees the `YGGDRASIL-` memo.
pub fn request_ygg_return(keeper: &mut Keeper, na: &NodeAccount) -> Result<()> {
    let ygg = match keeper.get_yggdrasil(na)? {
        Some(ygg) if ygg.has_funds() => ygg,
        _ => return Ok(()),
    };

    let active = keeper.get_asgard_vaults_by_status(VaultStatus::Active)?;
    let retiring = keeper.get_asgard_vaults_by_status(VaultStatus::Retiring)?;
    let chains: BTreeSet<Chain> = active
        .iter()
        .chain(retiring.iter())
        .flat_map(|v| v.chains.iter().copied())
        .collect();

    let signing_period = keeper.get_config_i64(ConstantName::SigningTransactionPeriod);
    let vault = keeper
        .get_most_secure(&active, signing_period)?
        .ok_or_else(|| Error::internal("unable to determine asgard vault"))?;

    let txout = TxOutStore::new();
    for chain in chains {
        if chain.is_thorchain() || !ygg.has_funds_for_chain(chain) {
            continue;
        }
        let mut item = TxOutItem::new(
            chain,
            vault.pub_key.address(chain)?,
            Coin::new(Asset::rune(), 0),
            TxId::blank(),
        )
        .with_memo(memo::yggdrasil_return(keeper.height()));
        item.vault_pub_key = Some(ygg.pub_key.clone());
        txout.unsafe_add_tx_out_item(keeper, item)?;
    }
    tracing::info!(node = %na.node_address, "requested yggdrasil fund return");
    Ok(())
}

/// Request a return from every funded yggdrasil vault
pub fn recall_ygg_funds(keeper: &mut Keeper) -> Result<()> {
    let vaults = keeper.get_vaults()?;
    for ygg in vaults.iter().filter(|v| v.is_yggdrasil() && v.has_funds()) {
        let Some(na) = keeper.get_node_account_by_pubkey(&ygg.pub_key)? else {
            tracing::error!(pub_key = %ygg.pub_key, "no node account for yggdrasil vault");
            continue;
        };
        request_ygg_return(keeper, &na)?;
    }
    Ok(())
}
