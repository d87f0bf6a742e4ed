//! Handler for /history and /export

use csv::Writer;
use engine::TransferRecord;
use serde::Serialize;
use teloxide::{
    RequestError, dispatching::UpdateHandler, dptree::case, prelude::*, types::InputFile,
};

use crate::{ConfigParameters, commands::Command, ui};

use super::user_message_for_engine_error;

const HISTORY_LEN: u64 = 10;

/// Build the schema for Export commands
pub(super) fn schema() -> UpdateHandler<RequestError> {
    dptree::entry()
        .branch(case![Command::History].endpoint(handle_history))
        .branch(case![Command::Export].endpoint(handle_export))
}

#[derive(Debug, Serialize)]
struct ExportRow {
    executed_at: String,
    amount_usd: String,
    amount_base_units: i64,
    destination: String,
    tx_reference: String,
    explorer_url: Option<String>,
    ceiling_usd: String,
    limit_remaining_usd: String,
    id: String,
}

impl ExportRow {
    fn new(record: TransferRecord) -> Result<Self, engine::EngineError> {
        Ok(Self {
            executed_at: record.executed_at.to_rfc3339(),
            amount_usd: record.amount_usd.amount().to_string(),
            amount_base_units: record.amount_usd.to_base_units()?,
            destination: record.destination,
            tx_reference: record.tx_reference,
            explorer_url: record.explorer_url,
            ceiling_usd: record.ceiling_usd.amount().to_string(),
            limit_remaining_usd: record.limit_remaining_usd.amount().to_string(),
            id: record.id.to_string(),
        })
    }
}

async fn handle_history(bot: Bot, cfg: ConfigParameters, msg: Message) -> ResponseResult<()> {
    let text = match cfg.engine.transfers(Some(HISTORY_LEN)).await {
        Ok(records) => ui::render_history(&records, cfg.timezone),
        Err(err) => {
            tracing::error!("failed to load transfers: {err}");
            user_message_for_engine_error(&err)
        }
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn handle_export(bot: Bot, cfg: ConfigParameters, msg: Message) -> ResponseResult<()> {
    let records = match cfg.engine.transfers(None).await {
        Ok(records) => records,
        Err(err) => {
            tracing::error!("failed to load transfers: {err}");
            bot.send_message(msg.chat.id, user_message_for_engine_error(&err))
                .await?;
            return Ok(());
        }
    };
    if records.is_empty() {
        bot.send_message(msg.chat.id, "No transfers to export.")
            .await?;
        return Ok(());
    }

    let data = match to_csv(records) {
        Ok(data) => data,
        Err(err) => {
            tracing::error!("failed to build export: {err}");
            bot.send_message(msg.chat.id, "Export failed.").await?;
            return Ok(());
        }
    };

    bot.send_document(
        msg.chat.id,
        InputFile::memory(data).file_name("transfers.csv"),
    )
    .await?;

    Ok(())
}

fn to_csv(records: Vec<TransferRecord>) -> Result<Vec<u8>, String> {
    let mut writer = Writer::from_writer(vec![]);
    for record in records {
        let row = ExportRow::new(record).map_err(|err| err.to_string())?;
        writer
            .serialize(row)
            .map_err(|err| format!("failed to serialize export row: {err}"))?;
    }
    writer
        .into_inner()
        .map_err(|err| format!("failed to finalize export: {err}"))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use engine::{TransferReceipt, Usd};
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn exports_one_line_per_transfer() {
        let record = TransferRecord::new(
            Usd::new(dec!(12.5)),
            "0xcard",
            TransferReceipt::new("0xabc").explorer_url("https://basescan.org/tx/0xabc"),
            Usd::new(dec!(80)),
            Usd::new(dec!(56)),
            Utc.with_ymd_and_hms(2026, 10, 19, 9, 30, 0).unwrap(),
        );
        let id = record.id;

        let csv = String::from_utf8(to_csv(vec![record]).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some(
                "executed_at,amount_usd,amount_base_units,destination,tx_reference,explorer_url,ceiling_usd,limit_remaining_usd,id"
            )
        );
        assert_eq!(
            lines.next().map(str::to_string),
            Some(format!(
                "2026-10-19T09:30:00+00:00,12.5,12500000,0xcard,0xabc,https://basescan.org/tx/0xabc,80,56,{id}"
            ))
        );
        assert_eq!(lines.next(), None);
    }
}
