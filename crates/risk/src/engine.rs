//! Fraud risk engine
//!
//! Evaluates every rule against a signal and sums the weights of the ones
//! that fire. There is no early exit: the decision always lists every
//! triggered rule. Evaluation is pure and deterministic.

use rust_decimal::Decimal;

use crate::config::RiskPolicy;
use crate::decision::{rules, RiskDecision, RuleHit, Verdict};
use crate::signal::RiskSignal;

/// Weighted-rule scorer for booking attempts
#[derive(Debug, Clone, Default)]
pub struct FraudRiskEngine {
    policy: RiskPolicy,
}

impl FraudRiskEngine {
    pub fn new(policy: RiskPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }

    /// Score one signal
    pub fn evaluate(&self, signal: &RiskSignal) -> RiskDecision {
        let p = &self.policy;
        let mut hits: Vec<RuleHit> = Vec::new();
        let mut hit = |code: &str, weight: u32| {
            tracing::debug!(rule = code, weight, "Risk rule triggered");
            hits.push(RuleHit {
                code: code.to_string(),
                weight,
            });
        };

        if signal.account_age_days() < p.new_account_days {
            hit(rules::NEW_ACCOUNT, p.new_account_weight);
        }
        if !signal.email_verified() {
            hit(rules::EMAIL_UNVERIFIED, p.email_unverified_weight);
        }
        if !signal.phone_verified() {
            hit(rules::PHONE_UNVERIFIED, p.phone_unverified_weight);
        }

        let bookings = signal.bookings_last_24h();
        if bookings > p.velocity_threshold {
            hit(rules::BOOKING_VELOCITY, p.velocity_weight);
        }
        if bookings > p.severe_velocity_threshold {
            hit(rules::BOOKING_VELOCITY_SEVERE, p.severe_velocity_weight);
        }

        let amount = signal.booking_amount().amount();
        let average = signal.average_user_amount().amount();
        if average > Decimal::ZERO {
            let spike = average
                .checked_mul(p.amount_spike_multiplier)
                .map_or(false, |limit| amount >= limit);
            if spike {
                hit(rules::AMOUNT_SPIKE, p.amount_spike_weight);
            }
        } else if amount > p.first_booking_threshold {
            hit(rules::FIRST_BOOKING_LARGE, p.first_booking_weight);
        }

        if signal.vpn_detected() {
            hit(rules::ANONYMIZING_NETWORK, p.anonymizer_weight);
        }

        let score = hits.iter().fold(0u32, |total, h| total.saturating_add(h.weight));
        let verdict = self.verdict_for(score);

        tracing::debug!(
            score,
            verdict = %verdict,
            rules = hits.len(),
            "Risk evaluation complete"
        );

        RiskDecision {
            score,
            verdict,
            rules_triggered: hits,
        }
    }

    /// Band a score: `[0, review)` allow, `[review, block)` review, `[block, ..)` block
    pub fn verdict_for(&self, score: u32) -> Verdict {
        if score >= self.policy.block_threshold {
            Verdict::Block
        } else if score >= self.policy.review_threshold {
            Verdict::Review
        } else {
            Verdict::Allow
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use trustdesk_core::Money;

    fn eur(amount: Decimal) -> Money {
        Money::new(amount, "EUR".parse().unwrap()).unwrap()
    }

    fn trusted() -> crate::RiskSignalBuilder {
        RiskSignal::builder()
            .account_age_days(400)
            .email_verified(true)
            .phone_verified(true)
            .bookings_last_24h(1)
            .booking_amount(eur(dec!(150)))
            .average_user_amount(eur(dec!(140)))
            .vpn_detected(false)
    }

    fn evaluate(builder: crate::RiskSignalBuilder) -> RiskDecision {
        FraudRiskEngine::default().evaluate(&builder.build().unwrap())
    }

    #[test]
    fn test_trusted_user_allowed() {
        let decision = evaluate(trusted());
        assert_eq!(decision.score, 0);
        assert_eq!(decision.verdict, Verdict::Allow);
        assert!(decision.rules_triggered.is_empty());
    }

    #[test]
    fn test_worst_case_blocked_at_120() {
        let decision = evaluate(
            RiskSignal::builder()
                .account_age_days(0)
                .email_verified(false)
                .phone_verified(false)
                .bookings_last_24h(9)
                .booking_amount(eur(dec!(500)))
                .average_user_amount(eur(dec!(100)))
                .vpn_detected(true),
        );

        assert_eq!(decision.score, 120);
        assert_eq!(decision.verdict, Verdict::Block);
        assert_eq!(
            decision.rule_codes(),
            vec![
                "NEW_ACCOUNT",
                "EMAIL_UNVERIFIED",
                "PHONE_UNVERIFIED",
                "BOOKING_VELOCITY",
                "BOOKING_VELOCITY_SEVERE",
                "AMOUNT_SPIKE",
                "ANONYMIZING_NETWORK",
            ]
        );
    }

    #[test]
    fn test_established_verified_account_allowed() {
        let decision = evaluate(
            RiskSignal::builder()
                .account_age_days(30)
                .email_verified(true)
                .phone_verified(true)
                .bookings_last_24h(1)
                .booking_amount(eur(dec!(100)))
                .average_user_amount(eur(dec!(100)))
                .vpn_detected(false),
        );

        assert_eq!(decision.score, 0);
        assert_eq!(decision.verdict, Verdict::Allow);
    }

    #[test]
    fn test_new_unverified_account_large_first_booking() {
        let decision = evaluate(
            trusted()
                .account_age_days(0)
                .email_verified(false)
                .booking_amount(eur(dec!(1500)))
                .average_user_amount(eur(dec!(0))),
        );
        // 25 + 15 + 10
        assert_eq!(decision.score, 50);
        assert_eq!(decision.verdict, Verdict::Review);
        assert!(decision.triggered(rules::FIRST_BOOKING_LARGE));
    }

    #[test]
    fn test_band_boundaries() {
        let engine = FraudRiskEngine::default();
        assert_eq!(engine.verdict_for(0), Verdict::Allow);
        assert_eq!(engine.verdict_for(39), Verdict::Allow);
        assert_eq!(engine.verdict_for(40), Verdict::Review);
        assert_eq!(engine.verdict_for(69), Verdict::Review);
        assert_eq!(engine.verdict_for(70), Verdict::Block);
        assert_eq!(engine.verdict_for(120), Verdict::Block);
    }

    #[test]
    fn test_exactly_review_threshold() {
        // 15 + 10 + 15
        let decision = evaluate(trusted().email_verified(false).phone_verified(false).vpn_detected(true));
        assert_eq!(decision.score, 40);
        assert_eq!(decision.verdict, Verdict::Review);
    }

    #[test]
    fn test_exactly_block_threshold() {
        // 25 + 15 + 10 + 20
        let decision = evaluate(
            trusted()
                .account_age_days(0)
                .email_verified(false)
                .phone_verified(false)
                .bookings_last_24h(4),
        );
        assert_eq!(decision.score, 70);
        assert_eq!(decision.verdict, Verdict::Block);
    }

    #[test]
    fn test_velocity_tiers() {
        let score = |n| evaluate(trusted().bookings_last_24h(n)).score;
        assert_eq!(score(3), 0);
        assert_eq!(score(4), 20);
        assert_eq!(score(8), 20);
        assert_eq!(score(9), 35);
    }

    #[test]
    fn test_amount_spike_boundary() {
        let at = evaluate(trusted().booking_amount(eur(dec!(300))).average_user_amount(eur(dec!(100))));
        assert!(at.triggered(rules::AMOUNT_SPIKE));
        assert_eq!(at.score, 20);

        let below = evaluate(trusted().booking_amount(eur(dec!(299.99))).average_user_amount(eur(dec!(100))));
        assert!(!below.triggered(rules::AMOUNT_SPIKE));
    }

    #[test]
    fn test_first_booking_threshold_is_strict() {
        let none = eur(dec!(0));
        let at = evaluate(trusted().booking_amount(eur(dec!(1000))).average_user_amount(none.clone()));
        assert_eq!(at.score, 0);

        let above = evaluate(trusted().booking_amount(eur(dec!(1000.01))).average_user_amount(none));
        assert_eq!(above.score, 10);
        assert!(above.triggered(rules::FIRST_BOOKING_LARGE));
    }

    #[test]
    fn test_spike_and_first_booking_exclusive() {
        let with_history = evaluate(trusted().booking_amount(eur(dec!(5000))).average_user_amount(eur(dec!(100))));
        assert!(with_history.triggered(rules::AMOUNT_SPIKE));
        assert!(!with_history.triggered(rules::FIRST_BOOKING_LARGE));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let engine = FraudRiskEngine::default();
        let signal = trusted().account_age_days(0).vpn_detected(true).build().unwrap();
        let first = engine.evaluate(&signal);
        for _ in 0..10 {
            assert_eq!(engine.evaluate(&signal), first);
        }
    }

    #[test]
    fn test_score_monotonic_in_amount() {
        let engine = FraudRiskEngine::default();
        for average in [dec!(0), dec!(50), dec!(400)] {
            let mut last = 0;
            for amount in [dec!(0), dec!(100), dec!(999), dec!(1000), dec!(1001), dec!(1500), dec!(10000)] {
                let signal = trusted()
                    .booking_amount(eur(amount))
                    .average_user_amount(eur(average))
                    .build()
                    .unwrap();
                let score = engine.evaluate(&signal).score;
                assert!(score >= last, "score dropped at amount {} avg {}", amount, average);
                last = score;
            }
        }
    }

    #[test]
    fn test_huge_weights_saturate_instead_of_overflowing() {
        let policy = RiskPolicy {
            anonymizer_weight: u32::MAX,
            new_account_weight: u32::MAX,
            ..RiskPolicy::default()
        };
        let engine = FraudRiskEngine::new(policy);
        let signal = trusted()
            .account_age_days(0)
            .email_verified(false)
            .vpn_detected(true)
            .build()
            .unwrap();

        let decision = engine.evaluate(&signal);
        assert_eq!(decision.score, u32::MAX);
        assert_eq!(decision.verdict, Verdict::Block);
    }

    #[test]
    fn test_custom_policy() {
        let policy = RiskPolicy {
            anonymizer_weight: 70,
            ..RiskPolicy::default()
        };
        let engine = FraudRiskEngine::new(policy);
        let decision = engine.evaluate(&trusted().vpn_detected(true).build().unwrap());
        assert_eq!(decision.verdict, Verdict::Block);
    }
}
