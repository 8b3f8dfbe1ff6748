//! Command-line interface definition.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use loanbook_core::{Contact, LoanStatus, PaymentMethod, PaymentType, TracingOutputFormat};
use rust_decimal::Decimal;

/// loanbook - personal loans and interest payments in your own Google Sheet
#[derive(Debug, Parser)]
#[command(name = "loanbook")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "LOANBOOK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Layout of log lines on stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl From<LogFormat> for TracingOutputFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Compact => Self::Compact,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Json => Self::Json,
        }
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and out of Google
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Add, list and close loans
    Loan {
        #[command(subcommand)]
        action: LoanAction,
    },

    /// Record and list interest payments
    Payment {
        #[command(subcommand)]
        action: PaymentAction,
    },

    /// Recompute derived fields from the payment history
    Recompute {
        /// Only this loan; every loan when omitted
        loan_id: Option<String>,
    },

    /// Upgrade a spreadsheet created by an older version
    Migrate,

    /// Open the spreadsheet or attachment folder in the browser
    Open {
        #[command(subcommand)]
        target: OpenTarget,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum AuthAction {
    /// Sign in with Google in the browser
    Login {
        /// OAuth client ID (from Google Cloud Console)
        #[arg(long, env = "GOOGLE_CLIENT_ID")]
        client_id: Option<String>,

        /// OAuth client secret (from Google Cloud Console)
        #[arg(long, env = "GOOGLE_CLIENT_SECRET")]
        client_secret: Option<String>,

        /// Path to Google Cloud Console credentials JSON file
        ///
        /// The file downloaded from the OAuth 2.0 credentials page, as an
        /// alternative to passing the client id and secret separately.
        #[arg(long, env = "GOOGLE_CREDENTIALS_FILE")]
        credentials_file: Option<PathBuf>,

        /// Sign in again even if a session is saved
        #[arg(long, short)]
        force: bool,
    },

    /// Revoke the saved session and delete it
    Logout,

    /// Show who is signed in
    Status,
}

#[derive(Debug, Subcommand)]
pub enum LoanAction {
    /// Record a new loan
    Add {
        /// Borrower's name
        #[arg(long)]
        name: String,

        /// Principal lent
        #[arg(long)]
        amount: Decimal,

        /// Monthly interest rate in percent
        #[arg(long)]
        rate: Decimal,

        /// Date the money was given (YYYY-MM-DD), today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Free-form details
        #[arg(long, default_value = "")]
        details: String,

        /// Who introduced the borrower
        #[arg(long = "via", default_value = "")]
        referrer: String,

        /// A signed promissory note exists
        #[arg(long)]
        promissory_note: bool,

        /// Contact as NAME:RELATION:PHONE (can be repeated)
        #[arg(long = "contact", value_parser = parse_contact, action = clap::ArgAction::Append)]
        contacts: Vec<Contact>,

        /// File to upload with the loan, e.g. the note (can be repeated)
        #[arg(long = "attach", action = clap::ArgAction::Append)]
        attachments: Vec<PathBuf>,
    },

    /// List loans with portfolio totals
    List {
        /// Only loans with this status
        #[arg(long)]
        status: Option<LoanStatus>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show one loan and its payments
    Show {
        loan_id: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Mark a loan closed, or defaulted
    Close {
        loan_id: String,

        /// Borrower stopped paying
        #[arg(long)]
        defaulted: bool,

        /// Closure date (YYYY-MM-DD), today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Debug, Subcommand)]
pub enum PaymentAction {
    /// Record a payment and update its loan
    Add {
        /// Loan the payment is for
        #[arg(long, required_unless_present = "borrower")]
        loan: Option<String>,

        /// Borrower whose only loan the payment is for
        #[arg(long)]
        borrower: Option<String>,

        /// Amount received
        #[arg(long)]
        amount: Decimal,

        /// interest, principal or both
        #[arg(long = "type", default_value = "interest")]
        payment_type: PaymentType,

        /// upi, bank-transfer, cash or cheque
        #[arg(long, default_value = "upi")]
        method: PaymentMethod,

        /// Payment date (YYYY-MM-DD), today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Who received the money
        #[arg(long, default_value = "")]
        received_by: String,

        #[arg(long, default_value = "")]
        notes: String,

        /// Receipt to upload (can be repeated)
        #[arg(long = "attach", action = clap::ArgAction::Append)]
        attachments: Vec<PathBuf>,
    },

    /// List payments
    List {
        /// Only payments of this loan
        #[arg(long)]
        loan: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum OpenTarget {
    /// The ledger spreadsheet
    Sheet,
    /// The attachment folder
    Folder,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}

/// Parses `NAME:RELATION:PHONE`; relation and phone may be left out.
fn parse_contact(value: &str) -> Result<Contact, String> {
    let mut parts = value.splitn(3, ':').map(str::trim);
    let name = parts.next().unwrap_or_default();
    if name.is_empty() {
        return Err("contact needs a name, as NAME:RELATION:PHONE".to_string());
    }
    let relation = parts.next().unwrap_or_default();
    let phone = parts.next().unwrap_or_default();
    Ok(Contact::new(name, relation, phone))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn log_format_flag() {
        let cli = Cli::parse_from(["loanbook", "migrate"]);
        assert_eq!(cli.log_format, LogFormat::Compact);

        let cli = Cli::parse_from(["loanbook", "migrate", "--log-format", "json"]);
        assert_eq!(
            TracingOutputFormat::from(cli.log_format),
            TracingOutputFormat::Json
        );
        assert!(Cli::try_parse_from(["loanbook", "--log-format", "xml", "migrate"]).is_err());
    }

    #[test]
    fn contact_parsing() {
        let contact = parse_contact("Meena: sister :98450 12345").unwrap();
        assert_eq!(contact, Contact::new("Meena", "sister", "98450 12345"));
        assert_eq!(parse_contact("Raj").unwrap(), Contact::new("Raj", "", ""));
        assert!(parse_contact(" :wife:123").is_err());
    }

    #[test]
    fn loan_add_arguments() {
        let cli = Cli::parse_from([
            "loanbook",
            "loan",
            "add",
            "--name",
            "Anil",
            "--amount",
            "100000",
            "--rate",
            "1.5",
            "--date",
            "2024-01-15",
            "--contact",
            "Meena:sister:123",
            "--attach",
            "note.jpg",
        ]);
        match cli.command {
            Command::Loan {
                action:
                    LoanAction::Add {
                        name,
                        amount,
                        rate,
                        date,
                        contacts,
                        attachments,
                        ..
                    },
            } => {
                assert_eq!(name, "Anil");
                assert_eq!(amount, Decimal::from(100_000));
                assert_eq!(rate, Decimal::new(15, 1));
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15));
                assert_eq!(contacts.len(), 1);
                assert_eq!(attachments, vec![PathBuf::from("note.jpg")]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn payment_add_accepts_loose_labels() {
        let cli = Cli::parse_from([
            "loanbook",
            "payment",
            "add",
            "--loan",
            "LOAN-20240115-001",
            "--amount",
            "1500",
            "--type",
            "Both",
            "--method",
            "bank transfer",
        ]);
        match cli.command {
            Command::Payment {
                action:
                    PaymentAction::Add {
                        payment_type,
                        method,
                        ..
                    },
            } => {
                assert_eq!(payment_type, PaymentType::Both);
                assert_eq!(method, PaymentMethod::BankTransfer);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn payment_add_needs_a_loan_reference() {
        let result = Cli::try_parse_from(["loanbook", "payment", "add", "--amount", "10"]);
        assert!(result.is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["loanbook", "loan", "list", "--json", "-v"]);
        assert!(cli.debug);
    }
}
