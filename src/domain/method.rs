use {
    super::error::EngineError,
    super::id::ProviderKey,
    super::money::{Currency, MoneyAmount},
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    std::collections::BTreeSet,
};

/// Provider fee: `amount * percentage + fixed`, rounded to the minor unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Fraction of the amount, e.g. `0.029` for 2.9%.
    pub percentage: Decimal,
    #[serde(default)]
    pub fixed: MoneyAmount,
}

impl FeeSchedule {
    pub fn new(percentage: Decimal, fixed: MoneyAmount) -> Self {
        Self { percentage, fixed }
    }
}

/// A provider integration as configured by the administrative side.
/// Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    pub provider: ProviderKey,
    pub display_name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub sandbox: bool,
    pub currencies: BTreeSet<Currency>,
    /// ISO 3166-1 alpha-2 codes, stored upper-case.
    pub countries: BTreeSet<String>,
    pub min_amount: MoneyAmount,
    pub max_amount: MoneyAmount,
    pub fees: FeeSchedule,
}

fn enabled_by_default() -> bool {
    true
}

impl PaymentMethod {
    /// Checks the catalog entry itself; run once when the registry is built.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::Validation("payment method id is empty".into()));
        }
        if self.min_amount > self.max_amount {
            return Err(EngineError::Validation(format!(
                "payment method {}: min_amount {} exceeds max_amount {}",
                self.id, self.min_amount, self.max_amount
            )));
        }
        if self.fees.percentage.is_sign_negative() || self.fees.percentage >= Decimal::ONE {
            return Err(EngineError::Validation(format!(
                "payment method {}: fee percentage must be in [0, 1), got {}",
                self.id, self.fees.percentage
            )));
        }
        if self.currencies.is_empty() {
            return Err(EngineError::Validation(format!(
                "payment method {} supports no currencies",
                self.id
            )));
        }
        Ok(())
    }

    pub fn supports_currency(&self, currency: Currency) -> bool {
        self.currencies.contains(&currency)
    }

    pub fn supports_country(&self, country: &str) -> bool {
        self.countries.contains(&country.to_ascii_uppercase())
    }

    pub fn accepts_amount(&self, amount: MoneyAmount) -> bool {
        amount >= self.min_amount && amount <= self.max_amount
    }

    pub(crate) fn normalize(mut self) -> Self {
        self.countries = self
            .countries
            .into_iter()
            .map(|c| c.trim().to_ascii_uppercase())
            .collect();
        self
    }
}
