//! The main module of this crate.
//! # Example
//! To build a [`WriteClient`](WriteClient) you just need a [`TokenSource`](TokenSource),
//! for example an [`Authenticator`](yup_oauth2::authenticator::Authenticator) built from a service account:
//! ```rust
//! use bigquery_append::{record::EchoRequest, ProtoData, StreamType, Table, WriteClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1. Load the desired secret (here, a service account key)
//!     let sa_key = yup_oauth2::read_service_account_key("clientsecret.json")
//!         .await?;
//!
//!     // 2. Create an Authenticator
//!     let auth = yup_oauth2::ServiceAccountAuthenticator::builder(sa_key)
//!         .build()
//!         .await?;
//!
//!     // 3. Create a WriteClient and a write stream
//!     let mut client = WriteClient::new(auth).await?;
//!     let table = Table::new("my-project", "echo_dataset", "echorequest");
//!     let stream = client.create_write_stream(&table, StreamType::Committed).await?;
//!
//!     // 4. Append
//!     let rows = ProtoData::new(&[EchoRequest::sample()])?;
//!     client.append_rows(rows.into_request(&stream.name)).await?;
//!
//!     Ok(())
//! }
//! ```
use std::str::FromStr;

use yup_oauth2::authenticator::Authenticator;
use hyper::client::connect::Connect;

use tonic::transport::{Channel, ClientTlsConfig};
use tonic::Request;
use tonic::metadata::{Ascii, MetadataValue};

use futures::future::{BoxFuture, FutureExt};
use futures::stream;

use tracing::debug;

use crate::googleapis::big_query_write_client::BigQueryWriteClient;
use crate::googleapis::{
    append_rows_response::Response,
    write_stream,
    AppendRowsRequest,
    AppendRowsResponse,
    BatchCommitWriteStreamsRequest,
    BatchCommitWriteStreamsResponse,
    CreateWriteStreamRequest,
    FinalizeWriteStreamRequest,
    FlushRowsRequest,
    WriteStream,
};
use crate::Error;

static API_ENDPOINT: &'static str = "https://bigquerystorage.googleapis.com";
static API_DOMAIN: &'static str = "bigquerystorage.googleapis.com";
static API_SCOPE: &'static str = "https://www.googleapis.com/auth/bigquery";

/// A fully qualified BigQuery table. This requires a `project_id`, a `dataset_id`
/// and a `table_id`. Only alphanumerical and underscores are allowed for `dataset_id`
/// and `table_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    project_id: String,
    dataset_id: String,
    table_id: String,
}

impl Table {
    pub fn new(project_id: &str, dataset_id: &str, table_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            dataset_id: dataset_id.to_string(),
            table_id: table_id.to_string()
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "projects/{}/datasets/{}/tables/{}",
            self.project_id,
            self.dataset_id,
            self.table_id
        )
    }
}

/// How appended rows become visible. See [`write_stream::Type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// Rows are visible as soon as the append is acknowledged.
    Committed,
    /// Rows are visible once the stream is finalized and committed.
    Pending,
    /// Rows are visible up to the last flushed offset.
    Buffered,
}

impl Default for StreamType {
    fn default() -> Self {
        Self::Committed
    }
}

impl From<StreamType> for write_stream::Type {
    fn from(stream_type: StreamType) -> Self {
        match stream_type {
            StreamType::Committed => write_stream::Type::Committed,
            StreamType::Pending => write_stream::Type::Pending,
            StreamType::Buffered => write_stream::Type::Buffered,
        }
    }
}

impl FromStr for StreamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "committed" => Ok(Self::Committed),
            "pending" => Ok(Self::Pending),
            "buffered" => Ok(Self::Buffered),
            other => Err(format!(
                "unknown stream type `{}`, expected one of: committed, pending, buffered",
                other
            )),
        }
    }
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Committed => "committed",
            Self::Pending => "pending",
            Self::Buffered => "buffered",
        };
        f.write_str(name)
    }
}

/// Something that hands out OAuth2 bearer tokens for the BigQuery scope.
pub trait TokenSource {
    fn bearer_token(&self) -> BoxFuture<'_, Result<String, Error>>;
}

impl<C> TokenSource for Authenticator<C>
where
    C: Connect + Clone + Send + Sync + 'static
{
    fn bearer_token(&self) -> BoxFuture<'_, Result<String, Error>> {
        async move {
            let token = self.token(&[API_SCOPE]).await?;
            Ok(token.as_str().to_string())
        }.boxed()
    }
}

/// A token minted elsewhere, or a dummy one for emulators.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl TokenSource for StaticToken {
    fn bearer_token(&self) -> BoxFuture<'_, Result<String, Error>> {
        futures::future::ready(Ok(self.0.clone())).boxed()
    }
}

/// The main object of this crate.
pub struct WriteClient<A> {
    auth: A,
    big_query_write_client: BigQueryWriteClient<Channel>
}

impl<A> WriteClient<A>
where
    A: TokenSource
{
    /// Create a new client using `auth` as a token generator.
    pub async fn new(auth: A) -> Result<Self, Error> {
        let tls_config = ClientTlsConfig::new()
            .domain_name(API_DOMAIN);
        let channel = Channel::from_static(API_ENDPOINT)
            .tls_config(tls_config)?
            .connect()
            .await?;
        Ok(Self::with_channel(auth, channel))
    }

    /// Create a new client talking plaintext to `endpoint`, e.g. `http://localhost:9060`
    /// for a local emulator.
    pub async fn with_endpoint(auth: A, endpoint: &str) -> Result<Self, Error> {
        let channel = Channel::from_shared(endpoint.to_string())
            .map_err(|e| Error::invalid(format!("invalid endpoint `{}`: {}", endpoint, e)))?
            .connect()
            .await?;
        Ok(Self::with_channel(auth, channel))
    }

    /// Wrap an already configured channel.
    pub fn with_channel(auth: A, channel: Channel) -> Self {
        let big_query_write_client = BigQueryWriteClient::new(channel);
        Self { auth, big_query_write_client }
    }

    async fn new_request<D>(&self, t: D, params: &str) -> Result<Request<D>, Error> {
        let token = self.auth.bearer_token().await?;
        let bearer_token = format!("Bearer {}", token);
        let bearer_value: MetadataValue<Ascii> = bearer_token.parse()?;
        let mut req = Request::new(t);
        let meta = req.metadata_mut();
        meta.insert("authorization", bearer_value);
        meta.insert("x-goog-request-params", params.parse()?);
        Ok(req)
    }

    /// Create a write stream of type `stream_type` on `table`.
    pub async fn create_write_stream(
        &mut self,
        table: &Table,
        stream_type: StreamType
    ) -> Result<WriteStream, Error> {
        let req = CreateWriteStreamRequest {
            parent: table.to_string(),
            write_stream: Some(WriteStream {
                r#type: write_stream::Type::from(stream_type) as i32,
                ..Default::default()
            })
        };
        let params = format!("parent={}", req.parent);
        let wrapped = self.new_request(req, &params).await?;

        let write_stream = self.big_query_write_client
            .create_write_stream(wrapped)
            .await?
            .into_inner();
        debug!(stream = %write_stream.name, %stream_type, "created write stream");
        Ok(write_stream)
    }

    /// Open an `AppendRows` stream, send `req` as its only message and wait for
    /// the acknowledgement.
    ///
    /// The acknowledgement is checked: an error status carried inside the
    /// response, or any row error, fails the append.
    pub async fn append_rows(
        &mut self,
        req: AppendRowsRequest
    ) -> Result<AppendRowsResponse, Error> {
        let write_stream = req.write_stream.clone();
        let params = format!("write_stream={}", write_stream);
        let wrapped = self.new_request(stream::iter(vec![req]), &params).await?;

        let mut responses = self.big_query_write_client
            .append_rows(wrapped)
            .await?
            .into_inner();
        let resp = responses
            .message()
            .await?
            .ok_or_else(|| Error::invalid("append stream closed without a response"))?;

        check_append_response(&resp)?;
        debug!(stream = %write_stream, offset = ?append_offset(&resp), "rows appended");
        Ok(resp)
    }

    /// Finalize the write stream `name`, returning the number of rows it holds.
    pub async fn finalize_write_stream(&mut self, name: &str) -> Result<i64, Error> {
        let req = FinalizeWriteStreamRequest {
            name: name.to_string()
        };
        let params = format!("name={}", req.name);
        let wrapped = self.new_request(req, &params).await?;

        let row_count = self.big_query_write_client
            .finalize_write_stream(wrapped)
            .await?
            .into_inner()
            .row_count;
        debug!(stream = %name, row_count, "finalized write stream");
        Ok(row_count)
    }

    /// Make the rows of a `BUFFERED` stream visible up to and including `offset`.
    /// Returns the offset the server flushed to.
    pub async fn flush_rows(&mut self, write_stream: &str, offset: i64) -> Result<i64, Error> {
        let req = FlushRowsRequest {
            write_stream: write_stream.to_string(),
            offset: Some(offset)
        };
        let params = format!("write_stream={}", req.write_stream);
        let wrapped = self.new_request(req, &params).await?;

        let flushed = self.big_query_write_client
            .flush_rows(wrapped)
            .await?
            .into_inner()
            .offset;
        debug!(stream = %write_stream, flushed, "flushed rows");
        Ok(flushed)
    }

    /// Atomically commit finalized `PENDING` streams of `table`.
    pub async fn batch_commit_write_streams(
        &mut self,
        table: &Table,
        write_streams: Vec<String>
    ) -> Result<BatchCommitWriteStreamsResponse, Error> {
        let req = BatchCommitWriteStreamsRequest {
            parent: table.to_string(),
            write_streams
        };
        let params = format!("parent={}", req.parent);
        let wrapped = self.new_request(req, &params).await?;

        let resp = self.big_query_write_client
            .batch_commit_write_streams(wrapped)
            .await?
            .into_inner();

        if !resp.stream_errors.is_empty() {
            let errors: Vec<String> = resp.stream_errors
                .iter()
                .map(|e| format!("{}: {}", e.entity, e.error_message))
                .collect();
            return Err(Error::append(format!("commit failed: {}", errors.join("; "))));
        }

        debug!(%table, "committed write streams");
        Ok(resp)
    }
}

/// Offset at which the rows of a successful append were written, when the server reports one.
pub fn append_offset(resp: &AppendRowsResponse) -> Option<i64> {
    match &resp.response {
        Some(Response::AppendResult(result)) => result.offset,
        _ => None
    }
}

fn check_append_response(resp: &AppendRowsResponse) -> Result<(), Error> {
    if let Some(Response::Error(status)) = &resp.response {
        return Err(Error::append(format!(
            "append rejected with code {}: {}",
            status.code,
            status.message
        )));
    }

    if !resp.row_errors.is_empty() {
        let errors: Vec<String> = resp.row_errors
            .iter()
            .map(|e| format!("row {}: {}", e.index, e.message))
            .collect();
        return Err(Error::append(errors.join("; ")));
    }

    Ok(())
}
