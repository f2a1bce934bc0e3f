//! In-process `BigQueryWrite` server shared by the integration tests and the
//! binary's own tests.
#![allow(dead_code)]

use std::pin::Pin;
use std::sync::{Arc, Mutex};

use futures::stream::{self, Stream};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};

use bigquery_append::googleapis::append_rows_response::{self, AppendResult};
use bigquery_append::googleapis::big_query_write_server::{BigQueryWrite, BigQueryWriteServer};
use bigquery_append::googleapis::google::rpc;
use bigquery_append::googleapis::{
    AppendRowsRequest, AppendRowsResponse, BatchCommitWriteStreamsRequest,
    BatchCommitWriteStreamsResponse, CreateWriteStreamRequest, FinalizeWriteStreamRequest,
    FinalizeWriteStreamResponse, FlushRowsRequest, FlushRowsResponse, GetWriteStreamRequest,
    RowError, StorageError, WriteStream,
};
use bigquery_append::{StaticToken, Table, WriteClient};

pub const TOKEN: &str = "test-token";

/// How the mock answers `AppendRows`.
#[derive(Clone, Copy)]
pub enum Ack {
    Ok,
    InBandError,
    RowError,
    NoResponse,
    Reject,
}

#[derive(Default)]
pub struct Seen {
    pub appends: Vec<AppendRowsRequest>,
    pub authorization: Vec<String>,
    pub routing: Vec<String>,
    pub flushed: Vec<i64>,
    pub finalized: Vec<String>,
    pub committed: Vec<String>,
}

#[derive(Clone)]
pub struct MockWrite {
    pub ack: Ack,
    pub fail_commit: bool,
    pub seen: Arc<Mutex<Seen>>,
}

impl MockWrite {
    pub fn new(ack: Ack) -> Self {
        Self {
            ack,
            fail_commit: false,
            seen: Arc::new(Mutex::new(Seen::default())),
        }
    }

    fn record<T>(&self, req: &Request<T>) {
        let meta = req.metadata();
        let value = |key: &str| {
            meta.get(key)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        let mut seen = self.seen.lock().unwrap();
        seen.authorization.push(value("authorization"));
        seen.routing.push(value("x-goog-request-params"));
    }
}

type AppendStream = Pin<Box<dyn Stream<Item = Result<AppendRowsResponse, Status>> + Send>>;

#[tonic::async_trait]
impl BigQueryWrite for MockWrite {
    async fn create_write_stream(
        &self,
        request: Request<CreateWriteStreamRequest>,
    ) -> Result<Response<WriteStream>, Status> {
        self.record(&request);
        let req = request.into_inner();
        let write_stream = req.write_stream.unwrap_or_default();
        Ok(Response::new(WriteStream {
            name: format!("{}/streams/s0", req.parent),
            r#type: write_stream.r#type,
            ..Default::default()
        }))
    }

    type AppendRowsStream = AppendStream;

    async fn append_rows(
        &self,
        request: Request<Streaming<AppendRowsRequest>>,
    ) -> Result<Response<Self::AppendRowsStream>, Status> {
        self.record(&request);
        if let Ack::Reject = self.ack {
            return Err(Status::permission_denied("no write access"));
        }

        let mut inbound = request.into_inner();
        let req = inbound
            .message()
            .await?
            .ok_or_else(|| Status::invalid_argument("empty append stream"))?;
        let write_stream = req.write_stream.clone();
        self.seen.lock().unwrap().appends.push(req);

        let ack = |response| AppendRowsResponse {
            response: Some(response),
            write_stream: write_stream.clone(),
            ..Default::default()
        };
        let responses = match self.ack {
            Ack::Ok => vec![Ok(ack(append_rows_response::Response::AppendResult(
                AppendResult { offset: Some(0) },
            )))],
            Ack::InBandError => vec![Ok(ack(append_rows_response::Response::Error(
                rpc::Status {
                    code: 3,
                    message: "schema mismatch".to_string(),
                    details: vec![],
                },
            )))],
            Ack::RowError => vec![Ok(AppendRowsResponse {
                row_errors: vec![RowError {
                    index: 0,
                    code: 1,
                    message: "last_name is required".to_string(),
                }],
                ..Default::default()
            })],
            Ack::NoResponse | Ack::Reject => vec![],
        };
        Ok(Response::new(Box::pin(stream::iter(responses)) as AppendStream))
    }

    async fn get_write_stream(
        &self,
        request: Request<GetWriteStreamRequest>,
    ) -> Result<Response<WriteStream>, Status> {
        Ok(Response::new(WriteStream {
            name: request.into_inner().name,
            ..Default::default()
        }))
    }

    async fn finalize_write_stream(
        &self,
        request: Request<FinalizeWriteStreamRequest>,
    ) -> Result<Response<FinalizeWriteStreamResponse>, Status> {
        self.record(&request);
        let mut seen = self.seen.lock().unwrap();
        seen.finalized.push(request.into_inner().name);
        let row_count = seen.appends.len() as i64;
        Ok(Response::new(FinalizeWriteStreamResponse { row_count }))
    }

    async fn batch_commit_write_streams(
        &self,
        request: Request<BatchCommitWriteStreamsRequest>,
    ) -> Result<Response<BatchCommitWriteStreamsResponse>, Status> {
        self.record(&request);
        let req = request.into_inner();
        if self.fail_commit {
            let stream_errors = req
                .write_streams
                .iter()
                .map(|name| StorageError {
                    code: 5,
                    entity: name.clone(),
                    error_message: "stream not finalized".to_string(),
                })
                .collect();
            return Ok(Response::new(BatchCommitWriteStreamsResponse {
                stream_errors,
                ..Default::default()
            }));
        }
        self.seen.lock().unwrap().committed.extend(req.write_streams);
        Ok(Response::new(BatchCommitWriteStreamsResponse::default()))
    }

    async fn flush_rows(
        &self,
        request: Request<FlushRowsRequest>,
    ) -> Result<Response<FlushRowsResponse>, Status> {
        self.record(&request);
        let offset = request.into_inner().offset.unwrap_or_default();
        self.seen.lock().unwrap().flushed.push(offset);
        Ok(Response::new(FlushRowsResponse { offset }))
    }
}

/// Serve `mock` on an ephemeral local port and return its plaintext endpoint.
pub async fn serve(mock: MockWrite) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(
        Server::builder()
            .add_service(BigQueryWriteServer::new(mock))
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );
    format!("http://{}", addr)
}

pub async fn connect(mock: MockWrite) -> WriteClient<StaticToken> {
    let endpoint = serve(mock).await;
    WriteClient::with_endpoint(StaticToken::new(TOKEN), &endpoint)
        .await
        .unwrap()
}

pub fn table() -> Table {
    Table::new("foo", "echo_dataset", "echorequest")
}
