//! # bigquery-append
//! A thin wrapper around the write half of Google's [BigQuery Storage API](https://cloud.google.com/bigquery/docs/write-api)
//! that appends protobuf-encoded rows to a table over the `AppendRows` bidirectional stream.
//! Rows are described to the server by a self-contained descriptor, see [`ProtoRow`](schema::ProtoRow).

pub use yup_oauth2;

pub mod googleapis {
    pub mod google {
        pub mod rpc {
            tonic::include_proto!("google.rpc");
        }
        pub mod cloud {
            pub mod bigquery {
                pub mod storage {
                    pub mod v1 {
                        tonic::include_proto!("google.cloud.bigquery.storage.v1");
                    }
                }
            }
        }
    }

    pub use self::google::cloud::bigquery::storage::v1::*;
}

pub mod client;
pub use client::*;

pub mod record;
pub mod schema;
pub use schema::{ProtoData, ProtoRow};

macro_rules! errors {
    { $($id:ident($p:path),)* } => {
        /// Encompassing error enum for this crate.
        #[derive(Debug)]
        pub enum Error {
            $($id($p),)*
        }

        impl std::fmt::Display for Error {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        Self::$id(inner) => {
                            write!(f, "{}: {}", stringify!($id), inner)
                        },
                    )*
                }
            }
        }

        impl std::error::Error for Error { }

        $(
            impl From<$p> for Error {
                fn from(inner: $p) -> Self {
                    Self::$id(inner)
                }
            }
        )*
    };
}

errors! {
    Transport(tonic::transport::Error),
    Status(tonic::Status),
    MetadataEncoding(tonic::metadata::errors::InvalidMetadataValue),
    Auth(yup_oauth2::Error),
    Json(serde_json::Error),
    Invalid(InvalidResponse),
    Append(AppendError),
}

impl Error {
    pub(crate) fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::Invalid(InvalidResponse(msg.into()))
    }

    pub(crate) fn append<S: Into<String>>(msg: S) -> Self {
        Self::Append(AppendError(msg.into()))
    }
}

/// The server (or the caller) produced something this crate cannot work with.
#[derive(Debug)]
pub struct InvalidResponse(pub String);

impl std::fmt::Display for InvalidResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The server answered, but rejected the rows or the commit.
#[derive(Debug)]
pub struct AppendError(pub String);

impl std::fmt::Display for AppendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
