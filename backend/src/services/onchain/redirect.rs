use bitcoin::{Address, Amount};

use crate::models::transaction::RedirectNotice;

/// Payments strictly above `threshold` go to `address` instead of the requested destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectPolicy {
    threshold: Amount,
    address: Address,
}

impl RedirectPolicy {
    pub fn new(threshold: Amount, address: Address) -> Self {
        Self { threshold, address }
    }

    pub fn threshold(&self) -> Amount {
        self.threshold
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn applies_to(&self, amount: Amount) -> bool {
        amount > self.threshold
    }
}

/// Final payment destination, plus a notice when the policy replaced it.
pub fn resolve_destination(
    policy: Option<&RedirectPolicy>,
    amount: Amount,
    requested: Address,
) -> (Address, Option<RedirectNotice>) {
    match policy {
        Some(policy) if policy.applies_to(amount) => {
            let notice = RedirectNotice {
                requested: requested.to_string(),
                applied: policy.address.to_string(),
                threshold_sats: policy.threshold.to_sat(),
            };
            (policy.address.clone(), Some(notice))
        }
        _ => (requested, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::onchain::signer::tests::test_key;

    fn policy() -> RedirectPolicy {
        RedirectPolicy::new(Amount::from_sat(100_000), test_key(7).address())
    }

    #[test]
    fn test_amount_above_threshold_is_redirected() {
        let requested = test_key(3).address();
        let (dest, notice) =
            resolve_destination(Some(&policy()), Amount::from_sat(150_000), requested.clone());

        assert_eq!(dest, test_key(7).address());
        let notice = notice.unwrap();
        assert_eq!(notice.requested, requested.to_string());
        assert_eq!(notice.threshold_sats, 100_000);
    }

    #[test]
    fn test_threshold_itself_is_not_redirected() {
        let requested = test_key(3).address();
        let (dest, notice) =
            resolve_destination(Some(&policy()), Amount::from_sat(100_000), requested.clone());
        assert_eq!(dest, requested);
        assert!(notice.is_none());
    }

    #[test]
    fn test_no_policy_keeps_destination() {
        let requested = test_key(3).address();
        let (dest, notice) = resolve_destination(None, Amount::from_sat(5_000_000), requested.clone());
        assert_eq!(dest, requested);
        assert!(notice.is_none());
    }
}
