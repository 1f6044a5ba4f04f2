//! Events command (show one aggregate's event log).

use aggstore_events::EventRecord;
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_output, print_single, OutputFormat};

use super::CommandContext;

/// Events command.
#[derive(Debug, Args)]
pub struct EventsCommand {
    /// Stream the aggregate lives in.
    stream: String,

    /// Aggregate id.
    aggregate_id: String,

    /// Only show events after this version.
    #[arg(long)]
    after: Option<i32>,
}

#[derive(Debug, Serialize, Tabled)]
struct EventRow {
    #[tabled(rename = "Version")]
    version: i32,

    #[tabled(rename = "Type")]
    event_type: String,

    #[tabled(rename = "Payload")]
    payload: String,

    #[tabled(rename = "Occurred At")]
    occurred_at: String,

    #[tabled(rename = "Principal")]
    principal_id: String,

    #[tabled(rename = "Correlation")]
    correlation_id: String,
}

impl From<&EventRecord> for EventRow {
    fn from(record: &EventRecord) -> Self {
        Self {
            version: record.version.value(),
            event_type: record.event_type.clone(),
            payload: record.payload.to_string(),
            occurred_at: record.timestamp.to_rfc3339(),
            principal_id: record.principal_id.clone(),
            correlation_id: record.correlation_id.clone(),
        }
    }
}

impl EventsCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let registry = ctx.registry(std::slice::from_ref(&self.stream)).await?;
        let log = registry.log(&self.stream)?;

        let after = self.after.unwrap_or(0);
        let records: Vec<EventRecord> = log
            .get_events(&self.aggregate_id, None)
            .await?
            .into_iter()
            .filter(|record| record.version.value() > after)
            .collect();

        match ctx.format {
            OutputFormat::Table => {
                let rows: Vec<EventRow> = records.iter().map(EventRow::from).collect();
                print_output(&rows, ctx.format);
            }
            OutputFormat::Json => print_single(&records, ctx.format),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use aggstore_events::EventContext;
    use aggstore_store::AggregateVersion;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_event_row_from_record() {
        let record = EventRecord::new(
            "acct-1",
            AggregateVersion::new(3).unwrap(),
            "deposit",
            json!(25),
            &EventContext::new("cor_1", "usr_1", "tnt_1"),
        );

        let row = EventRow::from(&record);
        assert_eq!(row.version, 3);
        assert_eq!(row.event_type, "deposit");
        assert_eq!(row.payload, "25");
        assert_eq!(row.principal_id, "usr_1");
    }
}
