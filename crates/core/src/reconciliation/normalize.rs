//! Normalization of untrusted feed rows.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use tally_shared::config::SignConvention;
use tally_shared::types::{AccountId, Currency, ProviderTransactionId, within_limit};

use super::types::{BankTransaction, NormalizedBankTransaction, RejectReason};

/// Converts a provider row into the ledger's shape and sign convention.
///
/// # Errors
///
/// Returns the reason the row cannot enter the ledger.
pub fn normalize(
    raw: &BankTransaction,
    account_id: AccountId,
    currency: Currency,
    convention: SignConvention,
) -> Result<NormalizedBankTransaction, RejectReason> {
    if raw.account_id != account_id {
        return Err(RejectReason::ForeignAccount);
    }
    let provider_transaction_id = ProviderTransactionId::parse(&raw.provider_transaction_id)
        .ok_or(RejectReason::MissingProviderId)?;
    if raw.amount.is_zero() {
        return Err(RejectReason::ZeroAmount);
    }
    if !within_limit(raw.amount) {
        return Err(RejectReason::AmountOutOfRange);
    }
    if !currency.accepts(raw.amount) {
        return Err(RejectReason::InvalidPrecision);
    }

    Ok(NormalizedBankTransaction {
        provider_transaction_id,
        date: raw.date,
        amount: to_ledger_sign(raw.amount, convention),
        payee: clean_payee(&raw.payee_or_merchant_name),
    })
}

/// Applies the provider sign convention.
#[must_use]
pub fn to_ledger_sign(amount: Decimal, convention: SignConvention) -> Decimal {
    match convention {
        SignConvention::PositiveIsDebit => -amount,
        SignConvention::NegativeIsDebit => amount,
    }
}

/// Trims and collapses internal whitespace.
#[must_use]
pub fn clean_payee(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase alphanumeric tokens of a payee, for similarity ranking.
#[must_use]
pub fn payee_tokens(payee: &str) -> BTreeSet<String> {
    payee
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn raw(account_id: AccountId, id: &str, amount: Decimal) -> BankTransaction {
        BankTransaction {
            provider_transaction_id: id.to_string(),
            account_id,
            date: NaiveDate::from_ymd_opt(2026, 1, 3).unwrap(),
            amount,
            payee_or_merchant_name: "  ACH   RENT CO ".to_string(),
        }
    }

    #[test]
    fn test_positive_is_debit_inverts() {
        let account = AccountId::new();
        let normalized = normalize(
            &raw(account, " ach-1 ", dec!(1200)),
            account,
            Currency::Usd,
            SignConvention::PositiveIsDebit,
        )
        .unwrap();

        assert_eq!(normalized.amount, dec!(-1200));
        assert_eq!(normalized.provider_transaction_id.as_str(), "ach-1");
        assert_eq!(normalized.payee, "ACH RENT CO");
    }

    #[test]
    fn test_negative_is_debit_keeps_sign() {
        let account = AccountId::new();
        let normalized = normalize(
            &raw(account, "ach-1", dec!(-1200)),
            account,
            Currency::Usd,
            SignConvention::NegativeIsDebit,
        )
        .unwrap();
        assert_eq!(normalized.amount, dec!(-1200));
    }

    #[rstest]
    #[case("ach-1", dec!(10), false, RejectReason::ForeignAccount)]
    #[case("   ", dec!(10), true, RejectReason::MissingProviderId)]
    #[case("ach-1", dec!(0.00), true, RejectReason::ZeroAmount)]
    #[case("ach-1", dec!(10.005), true, RejectReason::InvalidPrecision)]
    #[case("ach-1", dec!(50_000_000_000_000_000_000_000_000_000), true, RejectReason::AmountOutOfRange)]
    #[case("ach-1", dec!(-1_000_000_000_000_000.01), true, RejectReason::AmountOutOfRange)]
    fn test_rejections(
        #[case] id: &str,
        #[case] amount: Decimal,
        #[case] same_account: bool,
        #[case] expected: RejectReason,
    ) {
        let account = AccountId::new();
        let owner = if same_account { account } else { AccountId::new() };
        let result = normalize(
            &raw(owner, id, amount),
            account,
            Currency::Usd,
            SignConvention::default(),
        );
        assert_eq!(result, Err(expected));
    }

    #[test]
    fn test_payee_tokens() {
        let tokens = payee_tokens("ACH*RENT-Co. 0042");
        let expected: BTreeSet<String> = ["ach", "rent", "co", "0042"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(tokens, expected);
        assert!(payee_tokens("  ").is_empty());
    }
}
