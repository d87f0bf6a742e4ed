//! Bot commands

use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(
    rename_rule = "lowercase",
    description = "Yield Guardian commands:"
)]
pub enum Command {
    #[command(description = "Start the bot.")]
    Start,
    #[command(description = "Show this message.")]
    Help,
    #[command(description = "Overview of yield and budget.")]
    Status,
    #[command(description = "Detailed budget breakdown and projections.")]
    Budget,
    #[command(description = "Yield sources and accrual.")]
    Yield,
    #[command(description = "Maximum amount transferable now.")]
    Topup,
    #[command(description = "Check whether an amount fits the budget: /spend 12.50")]
    Spend(String),
    #[command(description = "Send an amount to the card: /transfer 12.50")]
    Transfer(String),
    #[command(description = "Show or change the spending mode: /mode balanced")]
    Mode(String),
    #[command(description = "Last transfers.")]
    History,
    #[command(description = "Export all transfers as CSV.")]
    Export,
}
