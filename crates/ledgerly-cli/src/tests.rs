//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::io::Write;

use clap::Parser;
use ledgerly_core::db::Database;
use ledgerly_core::models::{
    NewExpense, NewExpensePolicy, NewPerDiemRate, PolicyScope, RuleAction, RuleCriteria,
    TransactionStatus, TripStatus,
};
use ledgerly_core::{ExpenseDraft, PolicySubject};

use crate::cli::{Cli, Commands, RulesAction, TripsAction};
use crate::commands::{self, truncate};

const ORG: i64 = 1;

fn setup_test_db() -> Database {
    Database::in_memory().unwrap()
}

fn seed_rate(db: &Database) {
    db.upsert_per_diem_rate(&NewPerDiemRate {
        organization_id: ORG,
        location: "*".into(),
        country_code: "US".into(),
        lodging_rate: 150.0,
        mie_rate: 60.0,
    })
    .unwrap();
}

fn temp_file(content: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const STATEMENT: &str = "Transaction Date,Description,Amount\n\
                         03/04/2024,LYFT RIDE SAT 10PM,-18.40\n\
                         03/05/2024,HILTON GARDEN INN,-212.00\n\
                         03/05/2024,NETFLIX.COM,-15.49\n";

// ========== Argument Parsing Tests ==========

#[test]
fn test_parse_global_flags() {
    let cli = Cli::try_parse_from(["ledgerly", "--db", "x.db", "--org", "7", "-v", "status"])
        .unwrap();
    assert_eq!(cli.db.to_str(), Some("x.db"));
    assert_eq!(cli.org, Some(7));
    assert!(cli.verbose);
    assert!(matches!(cli.command, Commands::Status));
}

#[test]
fn test_parse_rules_add_repeatable_flags() {
    let cli = Cli::try_parse_from([
        "ledgerly",
        "rules",
        "add",
        "Rideshare",
        "--contains",
        "uber",
        "--contains",
        "lyft",
        "--category",
        "Ground Transportation",
        "--max",
        "150",
    ])
    .unwrap();

    match cli.command {
        Commands::Rules {
            action:
                Some(RulesAction::Add {
                    merchant_contains,
                    max,
                    priority,
                    ..
                }),
        } => {
            assert_eq!(merchant_contains, vec!["uber", "lyft"]);
            assert_eq!(max, Some(150.0));
            assert_eq!(priority, 100);
        }
        _ => panic!("expected rules add"),
    }
}

#[test]
fn test_parse_trip_meals() {
    let cli = Cli::try_parse_from([
        "ledgerly",
        "trips",
        "meals",
        "3",
        "2024-05-02",
        "--breakfast",
        "--dinner",
    ])
    .unwrap();

    match cli.command {
        Commands::Trips {
            action:
                Some(TripsAction::Meals {
                    id,
                    breakfast,
                    lunch,
                    dinner,
                    ..
                }),
        } => {
            assert_eq!(id, 3);
            assert!(breakfast && dinner && !lunch);
        }
        _ => panic!("expected trips meals"),
    }
}

#[test]
fn test_parse_per_diem_requires_rate() {
    assert!(Cli::try_parse_from(["ledgerly", "per-diem", "--breakfast"]).is_err());
}

// ========== Helper Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a much longer merchant", 10), "a much ...");
    // Multi-byte characters are not split
    assert_eq!(truncate("Café Crème Brûlée", 8), "Café ...");
}

#[test]
fn test_parse_date() {
    assert_eq!(
        commands::parse_date("2024-02-29").unwrap(),
        chrono::NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
    );
    assert!(commands::parse_date("02/29/2024").is_err());
}

#[test]
fn test_parse_rule_action() {
    assert_eq!(
        commands::parse_rule_action("set-category", Some("Meals")).unwrap(),
        RuleAction::SetCategory {
            category: "Meals".into()
        }
    );
    assert_eq!(
        commands::parse_rule_action("ignore", None).unwrap(),
        RuleAction::Ignore
    );
    assert!(commands::parse_rule_action("set_category", None).is_err());
    assert!(commands::parse_rule_action("explode", None).is_err());
}

// ========== Rates & Per-Diem Command Tests ==========

#[test]
fn test_cmd_rates_set_and_lookup() {
    let db = setup_test_db();
    commands::cmd_rates_set(&db, ORG, "Denver", "us", 199.0, 79.0).unwrap();

    let rate = db.find_per_diem_rate(ORG, "denver", "US").unwrap().unwrap();
    assert_eq!(rate.mie_rate, 79.0);

    assert!(commands::cmd_rates_lookup(&db, ORG, "Denver", "US").is_ok());
    assert!(commands::cmd_rates_lookup(&db, ORG, "Lyon", "FR").is_err());
    assert!(commands::cmd_rates_list(&db, ORG).is_ok());
}

#[test]
fn test_cmd_rates_delete_missing() {
    let db = setup_test_db();
    let result = commands::cmd_rates_delete(&db, 999);
    assert!(result.unwrap_err().to_string().contains("not found"));
}

#[test]
fn test_cmd_per_diem() {
    assert!(commands::cmd_per_diem(79.0, true, true, false, false).is_ok());
    assert!(commands::cmd_per_diem(-1.0, false, false, false, false).is_err());
}

// ========== Trip Command Tests ==========

#[test]
fn test_cmd_trips_lifecycle() {
    let db = setup_test_db();
    seed_rate(&db);

    commands::cmd_trips_create(
        &db, ORG, "dana", "Offsite", "Austin", "US", "2024-06-10", "2024-06-12",
    )
    .unwrap();

    let trips = db.list_travel_trips(ORG, None).unwrap();
    assert_eq!(trips.len(), 1);
    let id = trips[0].id;
    // 45 + 60 + 45
    assert_eq!(trips[0].total_per_diem, 150.0);

    commands::cmd_trips_meals(&db, id, "2024-06-11", false, false, true).unwrap();
    let trip = db.get_travel_trip(id).unwrap().unwrap();
    assert_eq!(trip.total_per_diem, 123.0);

    commands::cmd_trips_status(&db, id, "in_progress").unwrap();
    assert!(commands::cmd_trips_status(&db, id, "planned").is_err());
    commands::cmd_trips_status(&db, id, "completed").unwrap();

    // Completed trips are frozen
    assert!(commands::cmd_trips_meals(&db, id, "2024-06-11", true, false, false).is_err());
    assert_eq!(
        db.get_travel_trip(id).unwrap().unwrap().status,
        TripStatus::Completed
    );
    assert!(commands::cmd_trips_show(&db, id).is_ok());
    assert!(commands::cmd_trips_list(&db, ORG, Some("completed")).is_ok());
    assert!(commands::cmd_trips_list(&db, ORG, Some("lost")).is_err());
}

#[test]
fn test_cmd_trips_create_bad_date() {
    let db = setup_test_db();
    seed_rate(&db);
    let result = commands::cmd_trips_create(
        &db, ORG, "dana", "Offsite", "Austin", "US", "June 10", "2024-06-12",
    );
    assert!(result.unwrap_err().to_string().contains("YYYY-MM-DD"));
}

// ========== Rule Command Tests ==========

#[test]
fn test_cmd_rules_add_enable_disable() {
    let db = setup_test_db();
    let criteria = RuleCriteria {
        merchant_contains: vec!["netflix".into()],
        ..Default::default()
    };
    commands::cmd_rules_add(&db, ORG, "Personal streaming", "ignore", None, criteria, 5)
        .unwrap();

    let rules = db.list_transaction_rules(ORG, false).unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].action, RuleAction::Ignore);

    commands::cmd_rules_set_active(&db, rules[0].id, false).unwrap();
    assert!(db.list_transaction_rules(ORG, true).unwrap().is_empty());
    commands::cmd_rules_set_active(&db, rules[0].id, true).unwrap();
    assert_eq!(db.list_transaction_rules(ORG, true).unwrap().len(), 1);

    assert!(commands::cmd_rules_test(&db, ORG, "NETFLIX.COM", None, 15.49).is_ok());
    commands::cmd_rules_delete(&db, rules[0].id).unwrap();
    assert!(commands::cmd_rules_delete(&db, rules[0].id).is_err());
}

#[test]
fn test_cmd_rules_add_rejects_inverted_range() {
    let db = setup_test_db();
    let criteria = RuleCriteria {
        amount_min: Some(50.0),
        amount_max: Some(5.0),
        ..Default::default()
    };
    let result =
        commands::cmd_rules_add(&db, ORG, "Broken", "set_category", Some("Meals"), criteria, 1);
    assert!(result.is_err());
}

// ========== Import & Transaction Command Tests ==========

#[test]
fn test_cmd_import_applies_rules() {
    let db = setup_test_db();
    commands::cmd_rules_add(
        &db,
        ORG,
        "Rideshare",
        "set_category",
        Some("Ground Transportation"),
        RuleCriteria {
            merchant_contains: vec!["lyft".into()],
            ..Default::default()
        },
        10,
    )
    .unwrap();
    commands::cmd_rules_add(
        &db,
        ORG,
        "Streaming",
        "ignore",
        None,
        RuleCriteria {
            merchant_contains: vec!["netflix".into()],
            ..Default::default()
        },
        20,
    )
    .unwrap();

    let file = temp_file(STATEMENT, ".csv");
    commands::cmd_import(&db, ORG, file.path(), None, true).unwrap();

    assert_eq!(
        db.count_imported_transactions(ORG, Some(TransactionStatus::Matched))
            .unwrap(),
        1
    );
    assert_eq!(
        db.count_imported_transactions(ORG, Some(TransactionStatus::Ignored))
            .unwrap(),
        1
    );
    assert_eq!(
        db.count_imported_transactions(ORG, Some(TransactionStatus::New))
            .unwrap(),
        1
    );

    // Re-import is recorded as duplicates
    commands::cmd_import(&db, ORG, file.path(), Some("csv"), true).unwrap();
    assert_eq!(
        db.count_imported_transactions(ORG, Some(TransactionStatus::Duplicate))
            .unwrap(),
        3
    );
}

#[test]
fn test_cmd_import_without_rules_then_apply() {
    let db = setup_test_db();
    let file = temp_file(STATEMENT, ".csv");
    commands::cmd_import(&db, ORG, file.path(), None, false).unwrap();
    assert_eq!(
        db.count_imported_transactions(ORG, Some(TransactionStatus::New))
            .unwrap(),
        3
    );

    commands::cmd_rules_add(
        &db,
        ORG,
        "Hotels",
        "auto_create_expense",
        Some("Lodging"),
        RuleCriteria {
            merchant_contains: vec!["inn".into()],
            ..Default::default()
        },
        1,
    )
    .unwrap();
    commands::cmd_transactions_apply_rules(&db, ORG).unwrap();

    let matched = db
        .list_imported_transactions(ORG, Some(TransactionStatus::Matched), 10, 0)
        .unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].category.as_deref(), Some("Lodging"));

    // Once the rule is gone, reclassifying sends the hotel back to new
    let rule_id = db.list_transaction_rules(ORG, false).unwrap()[0].id;
    commands::cmd_rules_delete(&db, rule_id).unwrap();
    commands::cmd_transactions_reclassify(&db, matched[0].id).unwrap();
    let hotel = db.get_imported_transaction(matched[0].id).unwrap().unwrap();
    assert_eq!(hotel.status, TransactionStatus::New);
    assert_eq!(hotel.category, None);

    // New transactions have nothing to reset
    assert!(commands::cmd_transactions_reclassify(&db, hotel.id).is_err());
}

#[test]
fn test_cmd_import_unknown_format() {
    let db = setup_test_db();
    let file = temp_file(STATEMENT, ".csv");
    assert!(commands::cmd_import(&db, ORG, file.path(), Some("qif"), true).is_err());
}

#[test]
fn test_cmd_transactions_ignore_and_convert() {
    let db = setup_test_db();
    let file = temp_file(STATEMENT, ".csv");
    commands::cmd_import(&db, ORG, file.path(), None, false).unwrap();

    let txs = db
        .list_imported_transactions(ORG, Some(TransactionStatus::New), 10, 0)
        .unwrap();
    let hotel = txs
        .iter()
        .find(|t| t.description.contains("HILTON"))
        .unwrap();
    let streaming = txs
        .iter()
        .find(|t| t.description.contains("NETFLIX"))
        .unwrap();

    commands::cmd_transactions_ignore(&db, streaming.id).unwrap();
    let conn = db.conn().unwrap();
    let status: String = conn
        .query_row(
            "SELECT status FROM imported_transactions WHERE id = ?",
            rusqlite::params![streaming.id],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(status, "ignored");

    commands::cmd_transactions_convert(&db, hotel.id, "dana", Some("Lodging")).unwrap();
    let expenses = db.list_expenses(ORG, Some("dana"), 10, 0).unwrap();
    assert_eq!(expenses.len(), 1);
    assert_eq!(expenses[0].amount, 212.0);
    assert_eq!(expenses[0].transaction_id, Some(hotel.id));

    // Ignored transactions cannot be converted
    assert!(commands::cmd_transactions_convert(&db, streaming.id, "dana", None).is_err());
    assert!(commands::cmd_transactions_list(&db, ORG, Some("converted"), 20).is_ok());
}

// ========== Receipt Command Tests ==========

#[test]
fn test_cmd_receipts_add_and_attach() {
    let db = setup_test_db();
    let expense_id = db
        .create_expense(&NewExpense {
            organization_id: ORG,
            user_id: "dana".into(),
            date: chrono::NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            merchant: "Shell".into(),
            amount: 52.30,
            category: None,
            description: None,
            receipt_id: None,
            transaction_id: None,
        })
        .unwrap();

    let file = temp_file(
        "SHELL #4411\nUnleaded 12.1 gallons 48.55\nBottled water 3.75\nTOTAL 52.30\n",
        ".txt",
    );
    assert!(commands::cmd_receipts_extract(file.path()).is_ok());
    commands::cmd_receipts_add(&db, ORG, file.path(), Some(expense_id)).unwrap();

    let receipts = db.list_receipts(ORG, 10, 0).unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].expense_id, Some(expense_id));
    assert!(receipts[0].suggest_split);
    assert_eq!(
        db.get_expense(expense_id).unwrap().unwrap().receipt_id,
        Some(receipts[0].id)
    );
}

#[test]
fn test_cmd_receipts_empty_file() {
    let db = setup_test_db();
    let file = temp_file("  \n", ".txt");
    assert!(commands::cmd_receipts_extract(file.path()).is_err());
    assert!(commands::cmd_receipts_add(&db, ORG, file.path(), None).is_err());
}

// ========== Policy Command Tests ==========

#[test]
fn test_cmd_policies_add_and_check() {
    let db = setup_test_db();
    commands::cmd_policies_add(
        &db,
        &NewExpensePolicy {
            organization_id: ORG,
            name: "Company".into(),
            max_daily_total: Some(100.0),
            priority: 100,
            ..Default::default()
        },
    )
    .unwrap();
    commands::cmd_policies_add(
        &db,
        &NewExpensePolicy {
            organization_id: ORG,
            name: "Sales".into(),
            scope: Some(PolicyScope::Department),
            scope_value: Some("sales".into()),
            max_daily_total: Some(250.0),
            priority: 10,
            ..Default::default()
        },
    )
    .unwrap();
    assert!(commands::cmd_policies_list(&db, ORG).is_ok());

    let subject = PolicySubject {
        department: Some("Sales".into()),
        ..Default::default()
    };
    assert!(commands::cmd_policies_effective(&db, ORG, &subject).is_ok());

    let draft = ExpenseDraft {
        amount: 180.0,
        date: chrono::NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
        category: Some("Meals".into()),
        merchant: None,
        description: None,
        has_receipt: true,
        receipt_date: None,
    };
    let today = chrono::NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
    assert!(commands::cmd_policies_check(&db, ORG, "dana", &subject, &draft, today, 0.9).is_ok());

    let ids: Vec<i64> = db
        .list_expense_policies(ORG, false)
        .unwrap()
        .iter()
        .map(|p| p.id)
        .collect();
    commands::cmd_policies_delete(&db, ids[0]).unwrap();
    assert!(commands::cmd_policies_delete(&db, ids[0]).is_err());
}

#[test]
fn test_cmd_policies_add_scoped_without_value() {
    let db = setup_test_db();
    let result = commands::cmd_policies_add(
        &db,
        &NewExpensePolicy {
            organization_id: ORG,
            name: "Broken".into(),
            scope: Some(PolicyScope::User),
            max_amount: Some(10.0),
            ..Default::default()
        },
    );
    assert!(result.is_err());
}

// ========== Expense & Status Command Tests ==========

#[test]
fn test_cmd_expenses_list_empty() {
    let db = setup_test_db();
    assert!(commands::cmd_expenses_list(&db, ORG, None, 20).is_ok());
}

#[test]
fn test_cmd_init_and_status() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledgerly.db");
    commands::cmd_init(&path, true).unwrap();
    assert!(path.exists());
    assert!(commands::cmd_status(&path, ORG, true).is_ok());
}
