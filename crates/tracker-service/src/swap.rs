//! Swap inference from a transaction's pre/post token balance tables.
//!
//! Each balance owned by the wallet is compared with the entry for the same
//! (account index, mint) before the transaction. Decreases are tokens sent,
//! increases are tokens received, and the i-th sent entry is paired with the
//! i-th received entry. The pairing is positional: a transaction that moves
//! several tokens in each direction may pair them differently from how the
//! underlying program routed them.

use std::collections::HashMap;
use tracker_core::types::{BalanceChange, SwapEvent, TokenBalance};
use tracker_core::{Result, TokenDataProvider};

/// Split the wallet's balance deltas into (sent, received), in post-table order
pub fn balance_changes(
    wallet: &str,
    pre: &[TokenBalance],
    post: &[TokenBalance],
) -> (Vec<BalanceChange>, Vec<BalanceChange>) {
    let baseline: HashMap<(u32, &str), f64> = pre
        .iter()
        .map(|b| ((b.account_index, b.mint.as_str()), b.amount()))
        .collect();

    let mut sent = Vec::new();
    let mut received = Vec::new();
    for balance in post.iter().filter(|b| b.is_owned_by(wallet)) {
        let Some(before) = baseline.get(&(balance.account_index, balance.mint.as_str())) else {
            continue;
        };
        let delta = balance.amount() - before;
        if delta < 0.0 {
            sent.push(BalanceChange {
                mint: balance.mint.clone(),
                amount: -delta,
            });
        } else if delta > 0.0 {
            received.push(BalanceChange {
                mint: balance.mint.clone(),
                amount: delta,
            });
        }
    }
    (sent, received)
}

/// Pair sent and received changes and resolve their symbols.
/// Any symbol lookup failure fails the whole diff.
pub async fn diff_swaps(
    wallet: &str,
    pre: &[TokenBalance],
    post: &[TokenBalance],
    provider: &dyn TokenDataProvider,
) -> Result<Vec<SwapEvent>> {
    let (sent, received) = balance_changes(wallet, pre, post);
    if sent.is_empty() || received.is_empty() {
        return Ok(Vec::new());
    }

    let mut symbols = SymbolCache::new(provider);
    let mut events = Vec::with_capacity(sent.len().min(received.len()));
    for (out, into) in sent.into_iter().zip(received) {
        let sent_symbol = symbols.get(&out.mint).await?;
        let received_symbol = symbols.get(&into.mint).await?;
        events.push(SwapEvent {
            sent_mint: out.mint,
            sent_amount: out.amount,
            sent_symbol,
            received_mint: into.mint,
            received_amount: into.amount,
            received_symbol,
        });
    }
    Ok(events)
}

struct SymbolCache<'a> {
    provider: &'a dyn TokenDataProvider,
    resolved: HashMap<String, String>,
}

impl<'a> SymbolCache<'a> {
    fn new(provider: &'a dyn TokenDataProvider) -> Self {
        Self {
            provider,
            resolved: HashMap::new(),
        }
    }

    async fn get(&mut self, mint: &str) -> Result<String> {
        if let Some(symbol) = self.resolved.get(mint) {
            return Ok(symbol.clone());
        }
        let symbol = self.provider.name_and_symbol(mint).await?.symbol;
        self.resolved.insert(mint.to_string(), symbol.clone());
        Ok(symbol)
    }
}
