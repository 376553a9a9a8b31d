use serde::{Deserialize, Serialize};

/// UI-scaled token amount as returned by the RPC node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiTokenAmount {
    #[serde(default)]
    pub ui_amount: Option<f64>,
    #[serde(default)]
    pub ui_amount_string: Option<String>,
    #[serde(default)]
    pub decimals: u8,
}

impl UiTokenAmount {
    pub fn from_ui(amount: f64) -> Self {
        Self {
            ui_amount: Some(amount),
            ui_amount_string: Some(amount.to_string()),
            decimals: 0,
        }
    }

    /// Scaled amount, falling back to the string form when the float is null
    pub fn value(&self) -> f64 {
        self.ui_amount
            .or_else(|| {
                self.ui_amount_string
                    .as_deref()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or(0.0)
    }
}

/// One entry of a transaction's pre/post token balance table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub account_index: u32,
    pub mint: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub ui_token_amount: UiTokenAmount,
}

impl TokenBalance {
    pub fn new(account_index: u32, mint: &str, owner: &str, amount: f64) -> Self {
        Self {
            account_index,
            mint: mint.to_string(),
            owner: Some(owner.to_string()),
            ui_token_amount: UiTokenAmount::from_ui(amount),
        }
    }

    pub fn amount(&self) -> f64 {
        self.ui_token_amount.value()
    }

    pub fn is_owned_by(&self, wallet: &str) -> bool {
        self.owner.as_deref() == Some(wallet)
    }
}

/// The parts of a confirmed transaction the swap diff needs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionRecord {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    /// True when the transaction executed with an error
    pub failed: bool,
    /// Index 0 is the fee payer
    pub account_keys: Vec<String>,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
}

impl TransactionRecord {
    pub fn fee_payer(&self) -> Option<&str> {
        self.account_keys.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_balance_deserializes_rpc_shape() {
        let json = r#"{
            "accountIndex": 3,
            "mint": "So11111111111111111111111111111111111111112",
            "owner": "Wa11et",
            "programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
            "uiTokenAmount": {
                "amount": "1500000000",
                "decimals": 9,
                "uiAmount": 1.5,
                "uiAmountString": "1.5"
            }
        }"#;
        let balance: TokenBalance = serde_json::from_str(json).unwrap();
        assert_eq!(balance.account_index, 3);
        assert!(balance.is_owned_by("Wa11et"));
        assert_eq!(balance.amount(), 1.5);
    }

    #[test]
    fn test_ui_amount_falls_back_to_string() {
        let amount = UiTokenAmount {
            ui_amount: None,
            ui_amount_string: Some("42.25".to_string()),
            decimals: 2,
        };
        assert_eq!(amount.value(), 42.25);
        assert_eq!(UiTokenAmount::default().value(), 0.0);
    }
}
