//! The `demo` integration provider.
//!
//! Produces a deterministic household: four accounts, ninety days of
//! recurring transactions ending at an anchor date, and the SQL that backfills
//! balance history and a monthly budget for them. Everything is derived from
//! the anchor, so the same anchor always yields the same data.

use std::fmt::Write as _;

use chrono::{Datelike, Duration, NaiveDate, Utc};
use domain::{
    AccountIdMap, CoreError, DemoDataGenerator, IntegrationProvider, IntegrationSettings,
    ProviderAccount, ProviderSnapshot, ProviderTransaction, DEMO_PROVIDER,
};

/// Days of transactions and balance history generated before the anchor.
pub const HISTORY_DAYS: i64 = 90;

struct FixtureAccount {
    external_id: &'static str,
    name: &'static str,
    institution: &'static str,
    balance_cents: i64,
}

const ACCOUNTS: [FixtureAccount; 4] = [
    FixtureAccount {
        external_id: "demo-checking",
        name: "Everyday Checking",
        institution: "Demo Bank",
        balance_cents: 423_518,
    },
    FixtureAccount {
        external_id: "demo-savings",
        name: "High-Yield Savings",
        institution: "Demo Bank",
        balance_cents: 1_850_000,
    },
    FixtureAccount {
        external_id: "demo-credit",
        name: "Rewards Visa",
        institution: "Demo Card Co",
        balance_cents: -128_456,
    },
    FixtureAccount {
        external_id: "demo-brokerage",
        name: "Brokerage",
        institution: "Demo Invest",
        balance_cents: 5_231_040,
    },
];

/// A transaction repeating every `every_days`, first at `phase` days before the anchor.
struct Recurring {
    account: &'static str,
    key: &'static str,
    description: &'static str,
    every_days: i64,
    phase: i64,
    amount_cents: i64,
    /// Up to this many cents are subtracted, varying by day.
    jitter_cents: i64,
}

const RECURRING: [Recurring; 9] = [
    Recurring {
        account: "demo-checking",
        key: "payroll",
        description: "ACME Corp Payroll",
        every_days: 14,
        phase: 3,
        amount_cents: 285_000,
        jitter_cents: 0,
    },
    Recurring {
        account: "demo-checking",
        key: "rent",
        description: "Maple Street Apartments",
        every_days: 30,
        phase: 10,
        amount_cents: -180_000,
        jitter_cents: 0,
    },
    Recurring {
        account: "demo-checking",
        key: "grocery",
        description: "Green Basket Grocery",
        every_days: 4,
        phase: 1,
        amount_cents: -4_500,
        jitter_cents: 6_000,
    },
    Recurring {
        account: "demo-checking",
        key: "utility",
        description: "City Power & Water",
        every_days: 30,
        phase: 20,
        amount_cents: -9_800,
        jitter_cents: 4_000,
    },
    Recurring {
        account: "demo-checking",
        key: "transfer",
        description: "Transfer to Savings",
        every_days: 30,
        phase: 5,
        amount_cents: -50_000,
        jitter_cents: 0,
    },
    Recurring {
        account: "demo-savings",
        key: "transfer",
        description: "Transfer from Checking",
        every_days: 30,
        phase: 5,
        amount_cents: 50_000,
        jitter_cents: 0,
    },
    Recurring {
        account: "demo-credit",
        key: "coffee",
        description: "Corner Coffee",
        every_days: 2,
        phase: 0,
        amount_cents: -450,
        jitter_cents: 300,
    },
    Recurring {
        account: "demo-credit",
        key: "dining",
        description: "Noodle House",
        every_days: 6,
        phase: 2,
        amount_cents: -2_800,
        jitter_cents: 2_500,
    },
    Recurring {
        account: "demo-brokerage",
        key: "dividend",
        description: "Index Fund Dividend",
        every_days: 30,
        phase: 15,
        amount_cents: 4_210,
        jitter_cents: 0,
    },
];

const BUDGET: [(&str, &str, i64); 8] = [
    ("Salary", "income", 570_000),
    ("Housing", "expense", 180_000),
    ("Groceries", "expense", 60_000),
    ("Dining Out", "expense", 25_000),
    ("Utilities", "expense", 18_000),
    ("Transportation", "expense", 20_000),
    ("Entertainment", "expense", 12_000),
    ("Savings", "expense", 50_000),
];

/// Sample-data provider registered under the name `demo`.
#[derive(Clone, Copy, Debug)]
pub struct DemoProvider {
    anchor: NaiveDate,
}

impl DemoProvider {
    /// Generate data ending at `anchor`.
    pub fn new(anchor: NaiveDate) -> Self {
        Self { anchor }
    }

    /// Generate data ending today (UTC).
    pub fn today() -> Self {
        Self::new(Utc::now().date_naive())
    }

    pub fn anchor(&self) -> NaiveDate {
        self.anchor
    }

    /// The full fixture set a sync would return.
    pub fn snapshot(&self) -> ProviderSnapshot {
        let accounts = ACCOUNTS
            .iter()
            .map(|a| ProviderAccount {
                external_id: a.external_id.to_string(),
                name: a.name.to_string(),
                institution: Some(a.institution.to_string()),
                currency: "USD".to_string(),
                balance_cents: a.balance_cents,
            })
            .collect();

        let mut transactions = Vec::new();
        for offset in 0..HISTORY_DAYS {
            let posted = self.anchor - Duration::days(offset);
            for r in RECURRING.iter().filter(|r| occurs(r, offset)) {
                transactions.push(ProviderTransaction {
                    external_id: format!("{}-{}-{}", r.account, r.key, posted.format("%Y%m%d")),
                    account_external_id: r.account.to_string(),
                    posted,
                    amount_cents: amount_on(r, offset),
                    description: r.description.to_string(),
                });
            }
        }
        ProviderSnapshot {
            accounts,
            transactions,
        }
    }

    /// End-of-day balances for `account`, newest first, `HISTORY_DAYS + 1` entries.
    fn daily_balances(&self, account: &FixtureAccount) -> Vec<(NaiveDate, i64)> {
        let mut balance = account.balance_cents;
        let mut out = Vec::with_capacity(HISTORY_DAYS as usize + 1);
        for offset in 0..=HISTORY_DAYS {
            out.push((self.anchor - Duration::days(offset), balance));
            // Undo the day's activity to get the previous day's closing balance.
            balance -= RECURRING
                .iter()
                .filter(|r| r.account == account.external_id && occurs(r, offset))
                .map(|r| amount_on(r, offset))
                .sum::<i64>();
        }
        out
    }
}

fn occurs(r: &Recurring, offset: i64) -> bool {
    offset >= r.phase && (offset - r.phase) % r.every_days == 0
}

fn amount_on(r: &Recurring, offset: i64) -> i64 {
    if r.jitter_cents == 0 {
        return r.amount_cents;
    }
    r.amount_cents - (offset * 7_919) % r.jitter_cents
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl IntegrationProvider for DemoProvider {
    fn name(&self) -> &str {
        DEMO_PROVIDER
    }

    fn fetch(&self, _settings: &IntegrationSettings) -> Result<ProviderSnapshot, CoreError> {
        Ok(self.snapshot())
    }
}

impl DemoDataGenerator for DemoProvider {
    fn generate_demo_balance_history_sql(&self, account_id_map: &AccountIdMap) -> String {
        let mut sql = String::new();
        for (external_id, account_id) in account_id_map {
            let Some(account) = ACCOUNTS.iter().find(|a| a.external_id == external_id) else {
                continue;
            };
            let rows: Vec<String> = self
                .daily_balances(account)
                .into_iter()
                .map(|(date, cents)| {
                    format!(
                        "({}, '{}', {}, '{}')",
                        quote(account_id),
                        date.format("%Y-%m-%d"),
                        cents,
                        DEMO_PROVIDER
                    )
                })
                .collect();
            let _ = writeln!(
                sql,
                "INSERT OR REPLACE INTO balance_snapshots (account_id, snapshot_date, balance_cents, source) VALUES {};",
                rows.join(", ")
            );
        }
        sql
    }

    fn generate_demo_budget_sql(&self) -> String {
        let month = format!("{:04}-{:02}", self.anchor.year(), self.anchor.month());
        let rows: Vec<String> = BUDGET
            .iter()
            .map(|(category, kind, cents)| {
                format!("('{}', {}, '{}', {})", month, quote(category), kind, cents)
            })
            .collect();
        format!(
            "INSERT OR REPLACE INTO budget_categories (month, category, kind, expected_cents) VALUES {};\n",
            rows.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqliteStore;
    use domain::{DbService, SchemaInitializer};

    fn provider() -> DemoProvider {
        DemoProvider::new(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
    }

    #[test]
    fn snapshot_is_deterministic() {
        let a = provider().snapshot();
        let b = provider().snapshot();
        assert_eq!(a, b);
        assert_eq!(a.accounts.len(), 4);
        assert!(a.transactions.len() > 100);
        assert!(a
            .transactions
            .iter()
            .all(|t| t.posted <= provider().anchor()));
    }

    #[test]
    fn transaction_ids_are_unique() {
        let snapshot = provider().snapshot();
        let mut ids: Vec<_> = snapshot.transactions.iter().map(|t| &t.external_id).collect();
        let before = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let grocery = &RECURRING[2];
        for offset in 0..HISTORY_DAYS {
            let amount = amount_on(grocery, offset);
            assert!(amount <= grocery.amount_cents);
            assert!(amount > grocery.amount_cents - grocery.jitter_cents);
        }
    }

    #[test]
    fn balances_end_at_current_balance() {
        let p = provider();
        let balances = p.daily_balances(&ACCOUNTS[0]);
        assert_eq!(balances.len(), HISTORY_DAYS as usize + 1);
        assert_eq!(balances[0], (p.anchor(), ACCOUNTS[0].balance_cents));
    }

    #[test]
    fn balance_history_skips_unknown_accounts() {
        let mut map = AccountIdMap::new();
        map.insert("not-a-demo-account".into(), "x".into());
        assert!(provider().generate_demo_balance_history_sql(&map).is_empty());
    }

    #[test]
    fn ids_are_sql_quoted() {
        let mut map = AccountIdMap::new();
        map.insert("demo-savings".into(), "o'brien".into());
        let sql = provider().generate_demo_balance_history_sql(&map);
        assert!(sql.contains("('o''brien', '2024-03-15', 1850000, 'demo')"));
    }

    #[test]
    fn budget_targets_anchor_month() {
        let sql = provider().generate_demo_budget_sql();
        assert!(sql.contains("('2024-03', 'Salary', 'income', 570000)"));
        assert_eq!(sql.matches("'2024-03'").count(), BUDGET.len());
    }

    #[test]
    fn generated_sql_executes_against_schema() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("demo.db")).unwrap();
        store.ensure_initialized().unwrap();
        let p = provider();

        let mut map = AccountIdMap::new();
        map.insert("demo-checking".into(), "acct-1".into());
        map.insert("demo-credit".into(), "acct-2".into());
        store
            .execute_write_query(&p.generate_demo_balance_history_sql(&map))
            .unwrap();
        store.execute_write_query(&p.generate_demo_budget_sql()).unwrap();

        assert_eq!(
            store.count_rows("balance_snapshots").unwrap(),
            2 * (HISTORY_DAYS as u64 + 1)
        );
        assert_eq!(store.count_rows("budget_categories").unwrap(), BUDGET.len() as u64);
    }
}
