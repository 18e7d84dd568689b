//! Risk signals - the facts about one booking attempt
//!
//! A [`RiskSignal`] can only be obtained through [`RiskSignalBuilder::build`],
//! which rejects incomplete or inconsistent input. The builder is also the
//! JSON shape accepted at the boundary.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use trustdesk_core::{Money, TrustError, TrustResult};

/// Validated, immutable input to one risk evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskSignal {
    account_age_days: u32,
    email_verified: bool,
    phone_verified: bool,
    bookings_last_24h: u32,
    booking_amount: Money,
    average_user_amount: Money,
    vpn_detected: bool,
}

impl RiskSignal {
    pub fn builder() -> RiskSignalBuilder {
        RiskSignalBuilder::default()
    }

    pub fn account_age_days(&self) -> u32 {
        self.account_age_days
    }

    pub fn email_verified(&self) -> bool {
        self.email_verified
    }

    pub fn phone_verified(&self) -> bool {
        self.phone_verified
    }

    pub fn bookings_last_24h(&self) -> u32 {
        self.bookings_last_24h
    }

    pub fn booking_amount(&self) -> &Money {
        &self.booking_amount
    }

    /// Zero when the user has no booking history
    pub fn average_user_amount(&self) -> &Money {
        &self.average_user_amount
    }

    pub fn vpn_detected(&self) -> bool {
        self.vpn_detected
    }

    pub fn has_history(&self) -> bool {
        !self.average_user_amount.is_zero()
    }
}

/// Collects signal fields; every field is required by [`RiskSignalBuilder::build`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSignalBuilder {
    pub account_age_days: Option<i64>,
    pub email_verified: Option<bool>,
    pub phone_verified: Option<bool>,
    pub bookings_last_24h: Option<u32>,
    pub booking_amount: Option<Money>,
    pub average_user_amount: Option<Money>,
    pub vpn_detected: Option<bool>,
}

impl RiskSignalBuilder {
    pub fn account_age_days(mut self, days: i64) -> Self {
        self.account_age_days = Some(days);
        self
    }

    /// Derive the account age from its creation date
    pub fn account_created_on(self, created: NaiveDate, today: NaiveDate) -> Self {
        let days = (today - created).num_days();
        self.account_age_days(days)
    }

    pub fn email_verified(mut self, verified: bool) -> Self {
        self.email_verified = Some(verified);
        self
    }

    pub fn phone_verified(mut self, verified: bool) -> Self {
        self.phone_verified = Some(verified);
        self
    }

    pub fn bookings_last_24h(mut self, count: u32) -> Self {
        self.bookings_last_24h = Some(count);
        self
    }

    pub fn booking_amount(mut self, amount: Money) -> Self {
        self.booking_amount = Some(amount);
        self
    }

    pub fn average_user_amount(mut self, amount: Money) -> Self {
        self.average_user_amount = Some(amount);
        self
    }

    pub fn vpn_detected(mut self, detected: bool) -> Self {
        self.vpn_detected = Some(detected);
        self
    }

    pub fn build(self) -> TrustResult<RiskSignal> {
        let missing: Vec<&str> = [
            ("account_age_days", self.account_age_days.is_none()),
            ("email_verified", self.email_verified.is_none()),
            ("phone_verified", self.phone_verified.is_none()),
            ("bookings_last_24h", self.bookings_last_24h.is_none()),
            ("booking_amount", self.booking_amount.is_none()),
            ("average_user_amount", self.average_user_amount.is_none()),
            ("vpn_detected", self.vpn_detected.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        if !missing.is_empty() {
            return Err(TrustError::InvalidSignal(format!(
                "missing fields: {}",
                missing.join(", ")
            )));
        }

        let (
            Some(age),
            Some(email_verified),
            Some(phone_verified),
            Some(bookings_last_24h),
            Some(booking_amount),
            Some(average_user_amount),
            Some(vpn_detected),
        ) = (
            self.account_age_days,
            self.email_verified,
            self.phone_verified,
            self.bookings_last_24h,
            self.booking_amount,
            self.average_user_amount,
            self.vpn_detected,
        )
        else {
            return Err(TrustError::InvalidSignal("incomplete signal".to_string()));
        };

        let account_age_days = u32::try_from(age).map_err(|_| {
            TrustError::InvalidSignal(format!("account age must be non-negative, got {}", age))
        })?;

        for (name, money) in [
            ("booking_amount", &booking_amount),
            ("average_user_amount", &average_user_amount),
        ] {
            // Money built through `Money::new` is never negative, but
            // deserialized values skip that check.
            if money.amount() < Decimal::ZERO {
                return Err(TrustError::InvalidSignal(format!(
                    "{} must be non-negative, got {}",
                    name, money
                )));
            }
        }

        if booking_amount.currency() != average_user_amount.currency()
            && !average_user_amount.is_zero()
        {
            return Err(TrustError::InvalidSignal(format!(
                "currency mismatch: booking in {}, average in {}",
                booking_amount.currency(),
                average_user_amount.currency()
            )));
        }

        Ok(RiskSignal {
            account_age_days,
            email_verified,
            phone_verified,
            bookings_last_24h,
            booking_amount,
            average_user_amount,
            vpn_detected,
        })
    }
}
