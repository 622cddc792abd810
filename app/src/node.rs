//! Block driver
//!
//! Owns the keeper and runs the per-block hooks in order: validator
//! begin-block, message delivery, then the swap queue and validator
//! end-block.

use amm::SwapQueue;
use asgard_core::{AppConfig, BlockHeight, ConstantValues, Event, Msg, MsgSwap, Result};
use asgard_store::Keeper;
use validators::{ValidatorManager, ValidatorUpdate};

use crate::dispatcher::{dispatch, HandlerResult};
use crate::genesis::Genesis;

/// What the consensus engine gets back from `end_block`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockResult {
    pub validator_updates: Vec<ValidatorUpdate>,
    pub events: Vec<Event>,
}

#[derive(Debug)]
pub struct AsgardApp {
    keeper: Keeper,
    validators: ValidatorManager,
    swap_queue: SwapQueue,
}

impl AsgardApp {
    pub fn new(constants: ConstantValues) -> Self {
        Self::with_keeper(Keeper::new(constants))
    }

    pub fn with_keeper(keeper: Keeper) -> Self {
        Self {
            keeper,
            validators: ValidatorManager::new(),
            swap_queue: SwapQueue::new(),
        }
    }

    /// Build from config, seeding state from the genesis file if one is set
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let mut app = Self::new(ConstantValues::new(config.environment));
        if let Some(path) = &config.genesis_path {
            Genesis::load(path)?.apply(&mut app.keeper)?;
        }
        tracing::info!(environment = %config.environment, "asgard app ready");
        Ok(app)
    }

    pub fn keeper(&self) -> &Keeper {
        &self.keeper
    }

    pub fn keeper_mut(&mut self) -> &mut Keeper {
        &mut self.keeper
    }

    /// Run churn scheduling for `height`; failures are logged, never fatal
    pub fn begin_block(&mut self, height: BlockHeight, existing_validators: Vec<String>) {
        self.keeper.set_height(height);
        if let Err(err) = self.validators.begin_block(&mut self.keeper, existing_validators) {
            tracing::error!(height, error = %err, "validator begin block failed");
        }
    }

    /// Swaps are queued for the end of the block; everything else runs now
    pub fn deliver(&mut self, msg: Msg) -> Result<HandlerResult> {
        match msg {
            Msg::Swap(swap) => {
                swap.validate_basic()?;
                let index = self.next_queue_index(&swap);
                self.keeper.set_swap_queue_item(&swap, index)?;
                tracing::debug!(tx = %swap.tx.id, index, "swap queued");
                Ok(HandlerResult::default())
            }
            other => dispatch(&mut self.keeper, &other),
        }
    }

    fn next_queue_index(&self, swap: &MsgSwap) -> u32 {
        self.keeper
            .get_swap_queue_items()
            .iter()
            .filter(|queued| queued.msg.tx.id == swap.tx.id)
            .map(|queued| queued.index + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn end_block(&mut self) -> BlockResult {
        let height = self.keeper.height();

        let mut handler = |k: &mut Keeper, m: &MsgSwap| dispatch(k, &Msg::Swap(m.clone())).map(|_| ());
        if let Err(err) = self.swap_queue.end_block(&mut self.keeper, &mut handler) {
            tracing::error!(height, error = %err, "swap queue end block failed");
        }

        let validator_updates = match self.validators.end_block(&mut self.keeper) {
            Ok(updates) => updates,
            Err(err) => {
                tracing::error!(height, error = %err, "validator end block failed");
                Vec::new()
            }
        };

        BlockResult {
            validator_updates,
            events: self.keeper.drain_events(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asgard_core::types::constants::{ASGARD_MODULE, ONE};
    use asgard_core::{Address, Asset, Chain, Coin, Environment, NodeStatus, Tx, TxId};
    use asgard_store::testing::{node_address, Fixture};

    fn btc() -> Asset {
        Asset::new(Chain::Btc, "BTC")
    }

    fn swap(id: u8, amount: u64) -> Msg {
        let tx = Tx {
            id: TxId::new(format!("{id:02x}").repeat(32)).unwrap(),
            chain: Some(Chain::Thor),
            from_address: Address::new("thor1sender"),
            to_address: Address::new("thor1vault"),
            coins: vec![Coin::new(Asset::rune(), amount)],
            gas: vec![],
            memo: "SWAP:BTC.BTC".into(),
        };
        Msg::Swap(MsgSwap::new(tx, btc(), Address::new("bc1dest"), 0, Address::new("thor1sender")))
    }

    #[test]
    fn test_genesis_block_activates_ready_nodes() {
        let mut f = Fixture::new();
        for name in ["node1", "node2", "node3", "node4"] {
            f.add_node(name, NodeStatus::Ready, 100 * ONE);
        }
        let mut app = AsgardApp::with_keeper(f.keeper);

        app.begin_block(1, vec![]);

        for name in ["node1", "node2", "node3", "node4"] {
            let na = app.keeper().get_node_account(&node_address(name)).unwrap().unwrap();
            assert_eq!(na.status, NodeStatus::Active);
        }
    }

    #[test]
    fn test_swaps_are_queued_then_executed() {
        let mut f = Fixture::new();
        f.add_pool(btc(), 1000 * ONE, 1000 * ONE);
        f.add_asgard(&["node1"], &[Coin::new(btc(), 10_000 * ONE)]);
        let mut app = AsgardApp::with_keeper(f.keeper);
        app.begin_block(2, vec![]);

        let result = app.deliver(swap(1, 100 * ONE)).unwrap();
        assert!(result.events.is_empty());
        // same tx twice lands on the next index
        app.deliver(swap(1, 100 * ONE)).unwrap();
        let indexes: Vec<u32> = app.keeper().get_swap_queue_items().iter().map(|q| q.index).collect();
        assert_eq!(indexes, vec![0, 1]);

        let result = app.end_block();
        assert!(app.keeper().get_swap_queue_items().is_empty());
        assert_eq!(result.events.iter().filter(|e| e.name() == "swap").count(), 2);
        assert!(app.keeper().events().is_empty());
        assert_eq!(app.keeper().get_pool(&btc()).unwrap().unwrap().balance_rune, 1200 * ONE);
    }

    #[test]
    fn test_swaps_run_when_validator_end_block_fails() {
        let mut f = Fixture::new();
        f.add_pool(btc(), 1000 * ONE, 1000 * ONE);
        // an active node with no active vault fails the validator hook
        f.add_node("node1", NodeStatus::Active, 100 * ONE);
        let mut app = AsgardApp::with_keeper(f.keeper);
        app.begin_block(2, vec!["cons-node1".into()]);

        let Msg::Swap(mut mint) = swap(4, 10 * ONE) else { unreachable!() };
        mint.target_asset = btc().to_synth();
        mint.destination = Address::new("noop");
        app.deliver(Msg::Swap(mint)).unwrap();

        let result = app.end_block();

        assert!(result.validator_updates.is_empty());
        assert!(app.keeper().get_swap_queue_items().is_empty());
        assert_eq!(result.events.iter().filter(|e| e.name() == "swap").count(), 1);
        assert_eq!(app.keeper().get_pool(&btc()).unwrap().unwrap().balance_rune, 1010 * ONE);
        assert!(app.keeper().get_module_balance(ASGARD_MODULE, &btc().to_synth()).unwrap() > 0);
        assert_eq!(app.keeper().checkpoint_depth(), 0);
    }

    #[test]
    fn test_invalid_swap_is_not_queued() {
        let mut app = AsgardApp::new(ConstantValues::new(Environment::Mocknet));
        app.begin_block(2, vec![]);
        let Msg::Swap(mut bad) = swap(3, ONE) else { unreachable!() };
        bad.tx.coins.clear();
        assert!(app.deliver(Msg::Swap(bad)).is_err());
        assert!(app.keeper().get_swap_queue_items().is_empty());
    }

    #[test]
    fn test_quiet_block() {
        let mut f = Fixture::new();
        f.add_node("node1", NodeStatus::Active, 100 * ONE);
        f.add_asgard(&["node1"], &[]);
        let mut app = AsgardApp::with_keeper(f.keeper);
        app.begin_block(2, vec!["cons-node1".into()]);
        let result = app.end_block();
        assert_eq!(result, BlockResult::default());
    }

    #[test]
    fn test_from_config_without_genesis() {
        let config = AppConfig {
            environment: Environment::Mocknet,
            ..AppConfig::default()
        };
        let app = AsgardApp::from_config(&config).unwrap();
        assert_eq!(app.keeper().get_config_i64(asgard_core::ConstantName::ChurnInterval), 60);
    }
}
