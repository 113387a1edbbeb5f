use {
    crate::domain::{money::Currency, store::StatsRow},
    chrono::{DateTime, Utc},
    serde::Serialize,
    std::collections::BTreeMap,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub amount: i64,
    pub fee: i64,
    pub refunded: i64,
}

/// Amounts are never summed across currencies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub count: i64,
    pub totals: BTreeMap<Currency, Totals>,
}

impl Bucket {
    fn add(&mut self, row: &StatsRow) {
        self.count += row.count;
        let totals = self.totals.entry(row.currency).or_default();
        totals.amount += row.amount;
        totals.fee += row.fee;
        totals.refunded += row.refunded;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub window_days: i64,
    pub since: DateTime<Utc>,
    pub total: Bucket,
    pub by_status: BTreeMap<String, Bucket>,
    pub by_method: BTreeMap<String, Bucket>,
}

pub fn fold(window_days: i64, since: DateTime<Utc>, rows: Vec<StatsRow>) -> Stats {
    let mut stats = Stats {
        window_days,
        since,
        total: Bucket::default(),
        by_status: BTreeMap::new(),
        by_method: BTreeMap::new(),
    };

    for row in &rows {
        stats.total.add(row);
        stats
            .by_status
            .entry(row.status.as_str().to_string())
            .or_default()
            .add(row);
        stats
            .by_method
            .entry(row.method_id.clone())
            .or_default()
            .add(row);
    }

    stats
}
