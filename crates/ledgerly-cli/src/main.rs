//! Ledgerly CLI - Business expense and travel management
//!
//! Usage:
//!   ledgerly init                       Initialize database
//!   ledgerly rates set Boston US ...    Maintain per-diem rates
//!   ledgerly import --file CSV          Import card/bank transactions
//!   ledgerly policies check 120.00      Check a draft expense against policy
//!   ledgerly serve --port 3000          Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;
use ledgerly_core::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let org = cli.org.unwrap_or(config.default_organization_id);

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Status => commands::cmd_status(&cli.db, org, cli.no_encrypt),
        Commands::Serve {
            port,
            host,
            no_auth,
        } => commands::cmd_serve(&cli.db, &host, port, no_auth, cli.no_encrypt, config).await,
        Commands::Rates { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(RatesAction::List) => commands::cmd_rates_list(&db, org),
                Some(RatesAction::Set {
                    location,
                    country,
                    lodging,
                    mie,
                }) => commands::cmd_rates_set(&db, org, &location, &country, lodging, mie),
                Some(RatesAction::Delete { id }) => commands::cmd_rates_delete(&db, id),
                Some(RatesAction::Lookup { location, country }) => {
                    commands::cmd_rates_lookup(&db, org, &location, &country)
                }
            }
        }
        Commands::PerDiem {
            rate,
            travel_day,
            breakfast,
            lunch,
            dinner,
        } => commands::cmd_per_diem(rate, travel_day, breakfast, lunch, dinner),
        Commands::Trips { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_trips_list(&db, org, None),
                Some(TripsAction::List { status }) => {
                    commands::cmd_trips_list(&db, org, status.as_deref())
                }
                Some(TripsAction::Create {
                    name,
                    location,
                    country,
                    start,
                    end,
                    user,
                }) => {
                    let user = user.unwrap_or_else(commands::current_user);
                    commands::cmd_trips_create(
                        &db, org, &user, &name, &location, &country, &start, &end,
                    )
                }
                Some(TripsAction::Show { id }) => commands::cmd_trips_show(&db, id),
                Some(TripsAction::Meals {
                    id,
                    date,
                    breakfast,
                    lunch,
                    dinner,
                }) => commands::cmd_trips_meals(&db, id, &date, breakfast, lunch, dinner),
                Some(TripsAction::Status { id, status }) => {
                    commands::cmd_trips_status(&db, id, &status)
                }
            }
        }
        Commands::Rules { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_rules_list(&db, org, false),
                Some(RulesAction::List { active }) => commands::cmd_rules_list(&db, org, active),
                Some(RulesAction::Add {
                    name,
                    action,
                    category,
                    merchant_contains,
                    merchant_exact,
                    categories,
                    min,
                    max,
                    priority,
                }) => {
                    let criteria = ledgerly_core::models::RuleCriteria {
                        merchant_contains,
                        merchant_exact,
                        categories,
                        amount_min: min,
                        amount_max: max,
                    };
                    commands::cmd_rules_add(
                        &db,
                        org,
                        &name,
                        &action,
                        category.as_deref(),
                        criteria,
                        priority,
                    )
                }
                Some(RulesAction::Delete { id }) => commands::cmd_rules_delete(&db, id),
                Some(RulesAction::Enable { id }) => commands::cmd_rules_set_active(&db, id, true),
                Some(RulesAction::Disable { id }) => {
                    commands::cmd_rules_set_active(&db, id, false)
                }
                Some(RulesAction::Test {
                    description,
                    amount,
                    merchant,
                }) => commands::cmd_rules_test(&db, org, &description, merchant.as_deref(), amount),
            }
        }
        Commands::Import {
            file,
            format,
            no_rules,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_import(&db, org, &file, format.as_deref(), !no_rules)
        }
        Commands::Transactions { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_transactions_list(&db, org, None, 20),
                Some(TransactionsAction::List { status, limit }) => {
                    commands::cmd_transactions_list(&db, org, status.as_deref(), limit)
                }
                Some(TransactionsAction::ApplyRules) => commands::cmd_transactions_apply_rules(&db, org),
                Some(TransactionsAction::Ignore { id }) => {
                    commands::cmd_transactions_ignore(&db, id)
                }
                Some(TransactionsAction::Reclassify { id }) => {
                    commands::cmd_transactions_reclassify(&db, id)
                }
                Some(TransactionsAction::Convert { id, user, category }) => {
                    let user = user.unwrap_or_else(commands::current_user);
                    commands::cmd_transactions_convert(&db, id, &user, category.as_deref())
                }
            }
        }
        Commands::Receipts { action } => match action {
            Some(ReceiptsAction::Extract { file }) => commands::cmd_receipts_extract(&file),
            Some(ReceiptsAction::Add { file, expense }) => {
                let db = commands::open_db(&cli.db, cli.no_encrypt)?;
                commands::cmd_receipts_add(&db, org, &file, expense)
            }
            None => {
                let db = commands::open_db(&cli.db, cli.no_encrypt)?;
                commands::cmd_receipts_list(&db, org, 20)
            }
            Some(ReceiptsAction::List { limit }) => {
                let db = commands::open_db(&cli.db, cli.no_encrypt)?;
                commands::cmd_receipts_list(&db, org, limit)
            }
        },
        Commands::Policies { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(PoliciesAction::List) => commands::cmd_policies_list(&db, org),
                Some(PoliciesAction::Add {
                    name,
                    scope,
                    value,
                    max_amount,
                    max_daily,
                    max_monthly,
                    max_receipt_age,
                    receipt_required,
                    description_required,
                    no_weekends,
                    priority,
                }) => {
                    let scope = scope
                        .parse()
                        .map_err(|e: String| anyhow::anyhow!(e))?;
                    let policy = ledgerly_core::models::NewExpensePolicy {
                        organization_id: org,
                        name,
                        scope: Some(scope),
                        scope_value: value,
                        max_amount,
                        max_daily_total: max_daily,
                        max_monthly_total: max_monthly,
                        max_receipt_age_days: max_receipt_age,
                        receipt_required: receipt_required.then_some(true),
                        description_required: description_required.then_some(true),
                        weekends_allowed: no_weekends.then_some(false),
                        priority,
                    };
                    commands::cmd_policies_add(&db, &policy)
                }
                Some(PoliciesAction::Delete { id }) => commands::cmd_policies_delete(&db, id),
                Some(PoliciesAction::Effective {
                    user,
                    role,
                    department,
                    category,
                }) => {
                    let subject = ledgerly_core::PolicySubject {
                        user_id: user,
                        role,
                        department,
                        category,
                    };
                    commands::cmd_policies_effective(&db, org, &subject)
                }
                Some(PoliciesAction::Check {
                    amount,
                    date,
                    category,
                    description,
                    receipt,
                    receipt_date,
                    user,
                    role,
                    department,
                }) => {
                    let today = chrono::Local::now().date_naive();
                    let draft = ledgerly_core::ExpenseDraft {
                        amount,
                        date: match date.as_deref() {
                            Some(d) => commands::parse_date(d)?,
                            None => today,
                        },
                        category,
                        merchant: None,
                        description,
                        has_receipt: receipt,
                        receipt_date: receipt_date
                            .as_deref()
                            .map(commands::parse_date)
                            .transpose()?,
                    };
                    let user = user.unwrap_or_else(commands::current_user);
                    let subject = ledgerly_core::PolicySubject {
                        user_id: Some(user.clone()),
                        role,
                        department,
                        category: draft.category.clone(),
                    };
                    commands::cmd_policies_check(
                        &db,
                        org,
                        &user,
                        &subject,
                        &draft,
                        today,
                        config.approaching_limit_ratio,
                    )
                }
            }
        }
        Commands::Expenses { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_expenses_list(&db, org, None, 20),
                Some(ExpensesAction::List { user, limit }) => {
                    commands::cmd_expenses_list(&db, org, user.as_deref(), limit)
                }
            }
        }
    }
}
