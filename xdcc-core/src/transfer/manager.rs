//! Per-bot transfer scheduling.
//!
//! Distinct files offered by one bot share one IRC presence at a time:
//! transfers are grouped by [`BotIdentity`] and each group runs strictly
//! sequentially, while separate bots proceed in parallel.

use crate::locator::BotIdentity;
use crate::transfer::TransferConfig;

/// Groups transfer configurations for scheduling.
pub struct TransferManager;

impl TransferManager {
    /// Splits configs into per-bot groups, bots ordered by first appearance
    /// and transfers within a group keeping their request order.
    #[must_use]
    pub fn group_by_bot(configs: Vec<TransferConfig>) -> Vec<Vec<TransferConfig>> {
        let mut groups: Vec<(BotIdentity, Vec<TransferConfig>)> = Vec::new();

        for config in configs {
            let bot = config.locator.bot();
            match groups.iter_mut().find(|(key, _)| *key == bot) {
                Some((_, group)) => group.push(config),
                None => groups.push((bot, vec![config])),
            }
        }

        groups.into_iter().map(|(_, group)| group).collect()
    }
}
