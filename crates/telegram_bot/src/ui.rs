use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use engine::{
    Binding, BudgetSnapshot, Decision, Eta, SpendingMode, TransferRecord, Usd, YieldSource,
};
use rust_decimal::Decimal;
use teloxide::{
    types::{InlineKeyboardButton, InlineKeyboardMarkup},
    utils::command::BotCommands,
};
use uuid::Uuid;

use crate::commands::Command;

const WEEK_DAYS: i64 = 7;
const MONTH_DAYS: i64 = 30;
const TENTH_OF_A_DAY: Decimal = Decimal::from_parts(1, 0, 0, false, 1);

pub(crate) fn render_help() -> String {
    let modes = SpendingMode::ALL
        .into_iter()
        .map(|mode| format!("{} {} {}%", mode_icon(mode), mode_label(mode), percent(mode)))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{}\n\nSpending modes:\n{modes}",
        Command::descriptions()
    )
}

pub(crate) fn render_welcome() -> String {
    format!(
        "🛡️ Yield Guardian\n\nYour principal stays put. Only part of the yield it earns can be spent, and never more than the card allows per period.\n\n{}",
        render_help()
    )
}

pub(crate) fn render_status(sources: &[YieldSource], snapshot: &BudgetSnapshot) -> String {
    let principal: Usd = sources.iter().map(|s| s.principal_usd).sum();
    format!(
        "🛡️ Status\n\n\
         Principal protected: {principal}\n\
         Yield accrued: {}\n\
         Yield spent: {}\n\
         Available budget: {}\n\
         Mode: {} ({}%)\n\
         Daily yield: {}",
        snapshot.accrued_yield_usd,
        snapshot.cumulative_withdrawn_usd,
        snapshot.max_available().truncate_cents(),
        mode_label(snapshot.mode),
        percent(snapshot.mode),
        snapshot.daily_yield_usd,
    )
}

pub(crate) fn render_budget(snapshot: &BudgetSnapshot, tz: Tz) -> String {
    let daily = snapshot.daily_spendable_usd();
    format!(
        "💰 Budget\n\n\
         Yield account\n\
         • Accrued: {}\n\
         • Spent: {}\n\
         • Net: {}\n\n\
         Spending budget\n\
         • Mode: {} ({}%)\n\
         • Ceiling: {}\n\
         • Reserved: {}\n\
         • Card allowance left: {} of {} (resets {})\n\
         • Available now: {}\n\n\
         Projections\n\
         • Daily: {daily}\n\
         • Weekly: {}\n\
         • Monthly: {}",
        snapshot.accrued_yield_usd,
        snapshot.cumulative_withdrawn_usd,
        snapshot.net_yield_usd(),
        mode_label(snapshot.mode),
        percent(snapshot.mode),
        snapshot.spendable_ceiling_usd.truncate_cents(),
        snapshot.reserved_usd,
        snapshot.external_limit_remaining_usd.truncate_cents(),
        snapshot.external_limit_amount_usd,
        format_time(snapshot.next_reset_at, tz),
        snapshot.max_available().truncate_cents(),
        daily.scale(Decimal::from(WEEK_DAYS)),
        daily.scale(Decimal::from(MONTH_DAYS)),
    )
}

pub(crate) fn render_yield(sources: &[YieldSource], as_of: DateTime<Utc>, tz: Tz) -> String {
    if sources.is_empty() {
        return "No yield sources configured.".to_string();
    }

    let mut text = String::from("📈 Yield sources\n");
    for source in sources {
        text.push_str(&format!(
            "\n{} ({})\n• Principal: {}\n• APY: {}%\n• Daily: {}\n• Accrued: {}\n• Since: {}\n",
            source.name,
            source.kind,
            source.principal_usd,
            source.apy_percent.normalize(),
            source.daily_yield(),
            source.accrued(as_of),
            format_time(source.accrual_start, tz),
        ));
        if let Some(address) = &source.protocol_address {
            text.push_str(&format!("• Address: {address}\n"));
        }
    }
    text
}

pub(crate) fn render_topup(snapshot: &BudgetSnapshot, tz: Tz) -> String {
    let available = snapshot.max_available().truncate_cents();
    let limited_by = match snapshot.binding() {
        Binding::YieldCeiling => "yield budget",
        Binding::ExternalLimit => "card allowance",
    };
    let mut text = format!("💳 Available to transfer: {available}\nLimited by: {limited_by}");
    if available.is_positive() {
        text.push_str(&format!("\n\nSend /transfer {} to top up.", plain(available)));
    } else if snapshot.binding() == Binding::ExternalLimit {
        text.push_str(&format!(
            "\n\nThe card allowance resets {}.",
            format_time(snapshot.next_reset_at, tz)
        ));
    }
    text
}

pub(crate) fn render_decision(decision: &Decision, tz: Tz) -> String {
    if decision.is_approved() {
        let mut text = format!(
            "✅ {} fits the budget.\nRemaining after spend: {}",
            decision.requested_usd,
            decision.remaining_after().truncate_cents()
        );
        if decision.within_rounding {
            text.push_str("\n(uses the last cent of the budget)");
        }
        text.push_str(&format!(
            "\n\nSend /transfer {} to move it to the card.",
            plain(decision.requested_usd)
        ));
        return text;
    }

    let available = decision.max_available_usd;
    if decision.within_rounding && available.truncate_base_units().is_positive() {
        let all = exact(available);
        return format!(
            "❌ {} is over the budget by less than the rounding margin.\nAvailable now: {all}\n\nTry /spend {all} to use all of it.",
            decision.requested_usd
        );
    }

    let mut text = format!(
        "❌ {} exceeds the budget by {}.\nAvailable now: {}",
        decision.requested_usd,
        decision.shortfall_usd,
        available.truncate_cents()
    );
    if let Some(eta) = decision.eta {
        text.push('\n');
        text.push_str(&format_eta(eta, tz));
    }
    if available.truncate_cents().is_positive() {
        text.push_str(&format!("\n\nTry /spend {} instead.", plain(available)));
    }
    text
}

pub(crate) fn render_transfer_prompt(
    decision: &Decision,
    destination: &str,
    nonce: Uuid,
) -> (String, InlineKeyboardMarkup) {
    let text = format!(
        "Transfer {} to {destination}?\nRemaining after transfer: {}",
        decision.requested_usd,
        decision.remaining_after().truncate_cents()
    );
    let kb = InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("✅ Confirm", format!("transfer:confirm:{nonce}")),
        InlineKeyboardButton::callback("✖️ Cancel", format!("transfer:cancel:{nonce}")),
    ]]);
    (text, kb)
}

pub(crate) fn render_transfer_done(record: &TransferRecord, decision: &Decision) -> String {
    let mut text = format!(
        "✅ Transfer complete\n\nAmount: {}\nRemaining budget: {}\nTransaction: {}",
        record.amount_usd,
        decision.remaining_after().truncate_cents(),
        record.tx_reference
    );
    if let Some(url) = &record.explorer_url {
        text.push_str(&format!("\n{url}"));
    }
    text
}

pub(crate) fn render_mode_picker(current: SpendingMode) -> (String, InlineKeyboardMarkup) {
    let rows = SpendingMode::ALL
        .into_iter()
        .map(|mode| {
            let marker = if mode == current { " ✓" } else { "" };
            vec![InlineKeyboardButton::callback(
                format!("{} {} {}%{marker}", mode_icon(mode), mode_label(mode), percent(mode)),
                format!("mode:set:{}", mode.code()),
            )]
        })
        .collect::<Vec<_>>();

    (
        format!(
            "Current mode: {} ({}% of yield spendable).\nChoose a spending mode:",
            mode_label(current),
            percent(current)
        ),
        InlineKeyboardMarkup::new(rows),
    )
}

pub(crate) fn render_mode_changed(mode: SpendingMode, snapshot: &BudgetSnapshot) -> String {
    format!(
        "{} Mode changed to {} ({}%).\nAvailable now: {}",
        mode_icon(mode),
        mode_label(mode),
        percent(mode),
        snapshot.max_available().truncate_cents()
    )
}

pub(crate) fn render_history(records: &[TransferRecord], tz: Tz) -> String {
    if records.is_empty() {
        return "No transfers yet.".to_string();
    }

    let mut text = String::from("🧾 Last transfers\n");
    for record in records {
        text.push_str(&format!(
            "\n{} • {} • {}",
            format_time(record.executed_at, tz),
            record.amount_usd,
            short_reference(&record.tx_reference)
        ));
    }
    text
}

pub(crate) fn format_eta(eta: Eta, tz: Tz) -> String {
    match eta {
        Eta::Days(days) if days < TENTH_OF_A_DAY => {
            "Wait less than 0.1 days (estimate, assumes constant APY).".to_string()
        }
        Eta::Days(days) => {
            let days = days.round_dp(1).normalize();
            let unit = if days == Decimal::ONE { "day" } else { "days" };
            format!("Wait about {days} {unit} (estimate, assumes constant APY).")
        }
        Eta::NextPeriodReset { at } => {
            format!("Card allowance used up, it resets {}.", format_time(at, tz))
        }
        Eta::Never => "The sources earn no yield, the budget will not grow.".to_string(),
        Eta::AboveAllowance => {
            "This is more than the card allows in a whole period.".to_string()
        }
    }
}

pub(crate) fn format_time(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%a %d %b %Y %H:%M %Z").to_string()
}

pub(crate) fn mode_label(mode: SpendingMode) -> &'static str {
    match mode {
        SpendingMode::Conservative => "Conservative",
        SpendingMode::Balanced => "Balanced",
        SpendingMode::Growth => "Growth",
    }
}

fn mode_icon(mode: SpendingMode) -> &'static str {
    match mode {
        SpendingMode::Conservative => "🐢",
        SpendingMode::Balanced => "⚖️",
        SpendingMode::Growth => "🚀",
    }
}

fn percent(mode: SpendingMode) -> Decimal {
    mode.spend_percent().normalize()
}

/// Amount as a user would type it back into a command. Truncated, so a
/// suggested amount never exceeds what it was derived from.
fn plain(amount: Usd) -> String {
    format!("{:.2}", amount.truncate_cents().amount())
}

/// Down to the last base unit.
fn exact(amount: Usd) -> String {
    amount.truncate_base_units().amount().normalize().to_string()
}

fn short_reference(reference: &str) -> String {
    if reference.chars().count() <= 14 {
        return reference.to_string();
    }
    let head: String = reference.chars().take(8).collect();
    let tail: String = reference
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{head}…{tail}")
}
