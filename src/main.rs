//! Append a single `EchoRequest` row to a BigQuery table.
//!
//! ```bash
//! bigquery-append \
//!   --project-id my-project \
//!   --dataset-id echo_dataset \
//!   --table-id echorequest \
//!   --credentials clientsecret.json
//! ```
//!
//! The row is printed as JSON on stdout before it is written, followed by
//! `done` once the server acknowledged it. Logs go to stderr, filtered by
//! `RUST_LOG` (default `info`).
//!
//! With `--endpoint` the program talks plaintext to an emulator and sends the
//! fixed `--token` instead of exchanging service account credentials.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bigquery_append::record::EchoRequest;
use bigquery_append::{
    append_offset, ProtoData, StaticToken, StreamType, Table, TokenSource, WriteClient,
};

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
mod common;

#[derive(Parser, Debug)]
#[command(name = "bigquery-append", version, about = "Append one row to a BigQuery table through the Storage Write API")]
struct Args {
    /// Project owning the table
    #[arg(long, env = "BQ_PROJECT_ID", default_value = "foo")]
    project_id: String,

    /// Dataset of the table
    #[arg(long, env = "BQ_DATASET_ID", default_value = "echo_dataset")]
    dataset_id: String,

    /// Table to append to
    #[arg(long, env = "BQ_TABLE_ID", default_value = "echorequest")]
    table_id: String,

    /// Service account key file, required unless --endpoint is given
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Write stream type: committed, pending or buffered
    #[arg(long, env = "BQ_STREAM_TYPE", default_value = "committed")]
    stream_type: StreamType,

    /// Plaintext endpoint of a Storage Write API emulator
    #[arg(long, env = "BQ_STORAGE_ENDPOINT")]
    endpoint: Option<String>,

    /// Bearer token sent to the --endpoint emulator
    #[arg(long, env = "BQ_STORAGE_TOKEN", default_value = "emulator")]
    token: String,
}

impl Args {
    fn table(&self) -> Table {
        Table::new(&self.project_id, &self.dataset_id, &self.table_id)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => {
            println!("done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let row = EchoRequest::sample();
    println!("{}", row.to_json().context("encoding row as JSON")?);

    let table = args.table();

    if let Some(endpoint) = &args.endpoint {
        let client = WriteClient::with_endpoint(StaticToken::new(&args.token), endpoint)
            .await
            .context("NewBigQueryWriteClient")?;
        return append_one(client, &table, args.stream_type, row).await;
    }

    let credentials = args
        .credentials
        .as_ref()
        .context("--credentials or GOOGLE_APPLICATION_CREDENTIALS is required without --endpoint")?;
    let sa_key = yup_oauth2::read_service_account_key(credentials)
        .await
        .with_context(|| format!("reading service account key {}", credentials.display()))?;
    let auth = yup_oauth2::ServiceAccountAuthenticator::builder(sa_key)
        .build()
        .await
        .context("building authenticator")?;
    let client = WriteClient::new(auth)
        .await
        .context("NewBigQueryWriteClient")?;

    append_one(client, &table, args.stream_type, row).await
}

async fn append_one<A: TokenSource>(
    mut client: WriteClient<A>,
    table: &Table,
    stream_type: StreamType,
    row: EchoRequest,
) -> anyhow::Result<()> {
    let stream = client
        .create_write_stream(table, stream_type)
        .await
        .context("CreateWriteStream")?;
    tracing::info!(stream = %stream.name, "opened write stream");

    let rows = ProtoData::new(&[row]).context("ProtoData")?;
    let resp = client
        .append_rows(rows.into_request(&stream.name))
        .await
        .context("AppendRows")?;

    match stream_type {
        StreamType::Committed => {}
        StreamType::Buffered => {
            let offset = append_offset(&resp).unwrap_or(0);
            client
                .flush_rows(&stream.name, offset)
                .await
                .context("FlushRows")?;
        }
        StreamType::Pending => {
            let row_count = client
                .finalize_write_stream(&stream.name)
                .await
                .context("FinalizeWriteStream")?;
            client
                .batch_commit_write_streams(table, vec![stream.name.clone()])
                .await
                .context("BatchCommitWriteStreams")?;
            tracing::info!(row_count, "committed pending stream");
        }
    }

    Ok(())
}
