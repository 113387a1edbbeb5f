use {
    crate::domain::{
        error::EngineError,
        method::PaymentMethod,
        money::{Currency, MoneyAmount},
    },
    std::{collections::BTreeMap, path::Path},
};

/// Catalog of payment methods, built once at start-up and shared by
/// reference. Pure lookups only.
#[derive(Debug, Clone, Default)]
pub struct MethodRegistry {
    methods: BTreeMap<String, PaymentMethod>,
}

impl MethodRegistry {
    pub fn new(methods: impl IntoIterator<Item = PaymentMethod>) -> Result<Self, EngineError> {
        let mut map = BTreeMap::new();
        for method in methods {
            let method = method.normalize();
            method.validate()?;
            if map.contains_key(&method.id) {
                return Err(EngineError::Validation(format!(
                    "duplicate payment method id: {}",
                    method.id
                )));
            }
            map.insert(method.id.clone(), method);
        }
        Ok(Self { methods: map })
    }

    /// Loads a JSON array of payment methods.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|e| {
            EngineError::Validation(format!("reading {}: {e}", path.display()))
        })?;
        let methods: Vec<PaymentMethod> = serde_json::from_slice(&raw)?;
        let registry = Self::new(methods)?;
        tracing::info!(path = %path.display(), count = registry.methods.len(), "payment methods loaded");
        Ok(registry)
    }

    /// Enabled methods that support `currency` and `country` and, when
    /// given, accept `amount`.
    pub fn list_available(
        &self,
        amount: Option<MoneyAmount>,
        currency: Currency,
        country: &str,
    ) -> Vec<&PaymentMethod> {
        self.methods
            .values()
            .filter(|m| m.enabled)
            .filter(|m| amount.is_none_or(|a| m.accepts_amount(a)))
            .filter(|m| m.supports_currency(currency) && m.supports_country(country))
            .collect()
    }

    /// Resolves by id, disabled methods included. Callers must check
    /// `enabled` themselves.
    pub fn get(&self, method_id: &str) -> Result<&PaymentMethod, EngineError> {
        self.methods
            .get(method_id)
            .ok_or_else(|| EngineError::NotFound(format!("payment method {method_id}")))
    }

    /// The checks `createIntent` needs before anything is persisted.
    pub fn require_usable(
        &self,
        method_id: &str,
        amount: MoneyAmount,
        currency: Currency,
    ) -> Result<&PaymentMethod, EngineError> {
        let method = self
            .get(method_id)
            .map_err(|_| EngineError::Validation(format!("unknown payment method: {method_id}")))?;

        if !method.enabled {
            return Err(EngineError::Validation(format!(
                "payment method {method_id} is disabled"
            )));
        }
        if !method.supports_currency(currency) {
            return Err(EngineError::Validation(format!(
                "payment method {method_id} does not support {currency}"
            )));
        }
        if !method.accepts_amount(amount) {
            return Err(EngineError::Validation(format!(
                "amount {amount} outside [{}, {}] for payment method {method_id}",
                method.min_amount, method.max_amount
            )));
        }
        Ok(method)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{id::ProviderKey, method::FeeSchedule};
    use rust_decimal_macros::dec;

    fn method(id: &str, enabled: bool) -> PaymentMethod {
        PaymentMethod {
            id: id.into(),
            provider: ProviderKey::new("sandbox").unwrap(),
            display_name: id.into(),
            enabled,
            sandbox: true,
            currencies: [Currency::Usd].into(),
            countries: ["us".to_string()].into(),
            min_amount: MoneyAmount::new(100).unwrap(),
            max_amount: MoneyAmount::new(100_000).unwrap(),
            fees: FeeSchedule::new(dec!(0.029), MoneyAmount::new(30).unwrap()),
        }
    }

    #[test]
    fn list_available_filters_disabled_bounds_and_country() {
        let registry = MethodRegistry::new([method("card", true), method("off", false)]).unwrap();

        let all = registry.list_available(None, Currency::Usd, "US");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "card");

        assert!(registry.list_available(Some(MoneyAmount::new(50).unwrap()), Currency::Usd, "US").is_empty());
        assert!(registry.list_available(None, Currency::Eur, "US").is_empty());
        assert!(registry.list_available(None, Currency::Usd, "DE").is_empty());
    }

    #[test]
    fn get_returns_disabled_but_require_usable_rejects_it() {
        let registry = MethodRegistry::new([method("off", false)]).unwrap();
        assert!(!registry.get("off").unwrap().enabled);
        assert!(matches!(
            registry.require_usable("off", MoneyAmount::new(500).unwrap(), Currency::Usd),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(registry.get("nope"), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let mut bad = method("bad", true);
        bad.min_amount = MoneyAmount::new(1_000_000).unwrap();
        assert!(MethodRegistry::new([bad]).is_err());
    }
}
