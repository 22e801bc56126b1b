use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{Layer, filter, layer::SubscriberExt, util::SubscriberInitExt};

use expense_tracker::{
    Alert, AlertType, Error, ExpenseForm, ExpenseId, ExpenseTracker, Period, SessionState,
    TrackerConfig,
    budget::parse_amount,
    config::{DEFAULT_CURRENCY_SYMBOL, DEFAULT_TIMEZONE},
    display::truncate_description,
    memory::{InMemoryIdentityProvider, InMemoryStore},
    view::{CategoryFilter, SortOrder},
};

type Tracker = ExpenseTracker<InMemoryIdentityProvider, InMemoryStore>;

/// An interactive expense tracker backed by in-memory accounts and storage.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The canonical timezone that decides the current budget month, e.g. "Africa/Addis_Ababa".
    #[arg(long, default_value = DEFAULT_TIMEZONE)]
    timezone: String,

    /// The currency symbol shown in front of amounts.
    #[arg(long, default_value = DEFAULT_CURRENCY_SYMBOL)]
    currency: String,

    /// File path to write debug logs to.
    #[arg(long, default_value = "debug.log")]
    log_file: PathBuf,
}

const HELP: &str = "\
Commands:
  signup <email>                          create an account
  verify <email>                          pretend to click the verification link
  refresh                                 check whether your email has been verified
  resend                                  send the verification email again
  signin <email>                          sign in
  signout                                 sign out
  reset <email>                           send a password reset email
  add <amount> <category> <date> <text>   add an expense, date as YYYY-MM-DD
  delete <id>                             delete an expense
  list                                    show expenses, totals and the budget
  filter <all|category>                   only show one category
  sort <newest|oldest|lowest|highest>     change the order of expenses
  budget <amount> [YYYY-MM]               set the budget for a month
  unbudget                                remove this month's budget
  export <path>                           save the shown expenses as CSV
  delete-account                          delete your account and all of its data
  help                                    show this message
  quit                                    exit";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(error) = setup_logging(&args.log_file) {
        print_error(format!(
            "Could not open the log file {:?}: {error}",
            args.log_file
        ));
        return ExitCode::FAILURE;
    }

    let config = TrackerConfig {
        local_timezone: args.timezone,
        currency_symbol: args.currency,
        ..Default::default()
    };

    let provider = Arc::new(InMemoryIdentityProvider::new(config.password_hash_cost));
    let store = Arc::new(InMemoryStore::new());
    let mut tracker = match ExpenseTracker::new(provider.clone(), store, config) {
        Ok(tracker) => tracker,
        Err(error) => {
            print_alert(&error.into_alert());
            return ExitCode::FAILURE;
        }
    };

    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tracker.sync().await;
        print_prompt(tracker.session_state());

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                print_error(format!("Could not read from stdin: {error}"));
                return ExitCode::FAILURE;
            }
        };

        match run_command(&mut tracker, &provider, line.trim()).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(error) => print_alert(&error.into_alert()),
        }
    }

    ExitCode::SUCCESS
}

fn setup_logging(log_path: &Path) -> Result<(), io::Error> {
    let stderr_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(io::stderr);

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let debug_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(
            stderr_log
                .with_filter(filter::LevelFilter::WARN)
                .and_then(debug_log)
                .with_filter(filter::LevelFilter::DEBUG),
        )
        .init();

    Ok(())
}

enum Flow {
    Continue,
    Quit,
}

async fn run_command(
    tracker: &mut Tracker,
    provider: &InMemoryIdentityProvider,
    line: &str,
) -> Result<Flow, Error> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match command {
        "" => {}
        "help" => println!("{HELP}"),
        "quit" | "exit" => return Ok(Flow::Quit),
        "signup" => {
            let Some(password) = prompt_new_password() else {
                return Ok(Flow::Continue);
            };
            let identity = tracker.sign_up(rest, &password).await?;
            print_alert(&Alert::success(
                "Account created",
                &format!(
                    "We sent a verification link to {}. Verify your email, then run `refresh`.",
                    identity.email
                ),
            ));
        }
        "verify" => {
            provider.confirm_email(rest)?;
            print_alert(&Alert::success("Email verified", "Run `refresh` to continue."));
        }
        "refresh" => {
            if tracker.refresh_verification().await? {
                print_alert(&Alert::success("Email verified", "Your expenses are loaded."));
            } else {
                print_alert(&Alert::warning(
                    "Email not verified yet",
                    "Check your inbox for the verification link.",
                ));
            }
        }
        "resend" => {
            tracker.resend_verification().await?;
            print_alert(&Alert::success("Verification email sent", ""));
        }
        "signin" => {
            let Some(password) = prompt_password("Password: ") else {
                return Ok(Flow::Continue);
            };
            let identity = tracker.sign_in(rest, &password).await?;
            print_alert(&Alert::success(
                "Signed in",
                &format!("Welcome back, {}.", identity.email),
            ));
        }
        "signout" => {
            tracker.sign_out().await;
            print_alert(&Alert::success("Signed out", ""));
        }
        "reset" => {
            tracker.reset_password(rest).await?;
            print_alert(&Alert::success(
                "Password reset email sent",
                "Check your inbox.",
            ));
        }
        "add" => {
            let mut fields = rest.splitn(4, ' ');
            let amount = fields.next().unwrap_or_default();
            let category = fields.next().unwrap_or_default();
            let date = fields.next().unwrap_or_default();
            let description = fields.next().unwrap_or_default();

            let form = ExpenseForm::new(amount, description, category, date);
            let added = tracker.add_expense(&form).await?;
            print_alert(&Alert::success("Expense added", &format!("ID {}", added.id)));

            if let Some(alert) = added.budget_alert {
                print_alert(&alert);
            }
        }
        "delete" => {
            tracker.delete_expense(&ExpenseId::new(rest)).await?;
            print_alert(&Alert::success("Expense deleted", ""));
        }
        "list" => {
            tracker.sync().await;
            print_view(tracker);
        }
        "filter" => {
            tracker.set_filter(rest.parse::<CategoryFilter>()?);
            print_view(tracker);
        }
        "sort" => {
            tracker.set_sort(rest.parse::<SortOrder>()?);
            print_view(tracker);
        }
        "budget" => {
            let (amount, period) = rest.split_once(' ').unwrap_or((rest, ""));
            let amount = parse_amount(amount)?;
            let budget = if period.trim().is_empty() {
                tracker.save_budget(amount).await?
            } else {
                tracker
                    .save_budget_for(period.parse::<Period>()?, amount)
                    .await?
            };
            print_alert(&Alert::success(
                "Budget saved",
                &format!(
                    "Budget for {} is {}.",
                    budget.period,
                    tracker.currency().format(budget.amount)
                ),
            ));
        }
        "unbudget" => {
            tracker.delete_budget().await?;
            print_alert(&Alert::success("Budget removed", ""));
        }
        "export" => {
            let text = tracker.export_csv()?;

            if rest.is_empty() {
                print_error("Enter a file path to export to.");
            } else if let Err(error) = tokio::fs::write(rest, text).await {
                print_error(format!("Could not write {rest}: {error}"));
            } else {
                print_alert(&Alert::success("Exported expenses", rest));
            }
        }
        "delete-account" => {
            let Some(password) = prompt_password("Confirm your password: ") else {
                return Ok(Flow::Continue);
            };
            tracker.delete_account(&password).await?;
            print_alert(&Alert::success(
                "Account deleted",
                "Your expenses, budgets and account have been deleted.",
            ));
        }
        other => print_error(format!("Unknown command \"{other}\", type `help` for a list.")),
    }

    Ok(Flow::Continue)
}

fn print_prompt(state: &SessionState) {
    let who = match state {
        SessionState::SignedOut | SessionState::Authenticating => "signed out".to_owned(),
        SessionState::SignedInUnverified(identity) => format!("{} (unverified)", identity.email),
        SessionState::SignedInVerified(identity) => identity.email.to_string(),
    };

    print!("[{who}] > ");
    // A prompt that fails to flush only delays the prompt text.
    let _ = io::stdout().flush();
}

fn print_view(tracker: &Tracker) {
    let view = tracker.view();
    let currency = tracker.currency();

    if view.visible.is_empty() {
        println!("No expenses to show.");
    } else {
        println!(
            "{:<10} {:<10} {:<15} {:>15}  Description",
            "ID", "Date", "Category", "Amount"
        );

        for expense in &view.visible {
            println!(
                "{:<10} {:<10} {:<15} {:>15}  {}",
                expense.id,
                expense.date,
                expense.category,
                currency.format(expense.amount),
                truncate_description(&expense.description)
            );
        }
    }

    println!();
    println!("Shown: {}", currency.format(view.visible_total));
    println!("Total: {}", currency.format(view.total));

    for (category, subtotal) in &view.by_category {
        println!("  {category:<15} {}", currency.format(*subtotal));
    }

    match tracker.budget() {
        Some(budget) => println!(
            "Monthly budget for {}: {}",
            budget.period,
            currency.format(budget.amount)
        ),
        None => println!("No budget set for {}.", tracker.current_period()),
    }
}

fn prompt_password(prompt: &str) -> Option<String> {
    match rpassword::prompt_password(prompt) {
        Ok(password) => Some(password),
        Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => None,
        Err(error) => {
            print_error(format!("Could not read password from stdin: {error}"));
            None
        }
    }
}

fn prompt_new_password() -> Option<String> {
    loop {
        let first_password = prompt_password("Enter a new password: ")?;
        let second_password = prompt_password("Enter the same password again: ")?;

        if first_password != second_password {
            print_error("Passwords must match, try again.");
            continue;
        }

        return Some(first_password);
    }
}

fn print_alert(alert: &Alert) {
    let colour = match alert.alert_type {
        AlertType::Success => "32",
        AlertType::Warning => "33",
        AlertType::Error => "31",
    };

    println!("\x1b[{colour};1m{alert}\x1b[0m");
}

fn print_error(error: impl ToString) {
    eprintln!(
        "\x1b[31;1m{}\x1b[0m",
        capitalise_first_char(&error.to_string())
    )
}

/// From https://crates.io/crates/capitalize
fn capitalise_first_char(string: &str) -> String {
    let mut chars = string.chars();
    let Some(first) = chars.next() else {
        return String::with_capacity(0);
    };
    first.to_uppercase().chain(chars).collect()
}
