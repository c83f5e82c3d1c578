use crate::batch::{run_accuracy_report, run_decide, AccuracyArgs, DecideArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use reconcile_ai::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Reconcile AI",
    about = "Confidence-scored invoice matching and transaction categorization",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Decide every transaction in a bank statement CSV and print the decisions as JSON
    Decide(DecideArgs),
    /// Print accuracy statistics and path weights from an accuracy log
    Accuracy(AccuracyArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Decide(args) => run_decide(args).await,
        Command::Accuracy(args) => run_accuracy_report(args),
    }
}
