use prost::Message;
use prost_types::DescriptorProto;

use crate::googleapis::{
    append_rows_request::{self, Rows},
    AppendRowsRequest, ProtoRows, ProtoSchema,
};
use crate::Error;

/// A protobuf message that can be written as a table row.
///
/// The Write API decodes rows using only the descriptor sent along with them,
/// so [`descriptor`](ProtoRow::descriptor) must not reference any type that is
/// not nested inside the returned [`DescriptorProto`].
pub trait ProtoRow: Message {
    fn descriptor() -> DescriptorProto;
}

/// Serialized rows together with the schema they were written with.
#[derive(Debug, Clone)]
pub struct ProtoData {
    descriptor: DescriptorProto,
    serialized_rows: Vec<Vec<u8>>,
}

impl ProtoData {
    pub fn new<T: ProtoRow>(rows: &[T]) -> Result<Self, Error> {
        if rows.is_empty() {
            return Err(Error::invalid("cannot append an empty batch of rows"));
        }
        let serialized_rows = rows.iter().map(|row| row.encode_to_vec()).collect();
        Ok(Self {
            descriptor: T::descriptor(),
            serialized_rows,
        })
    }

    /// Build the `AppendRowsRequest` targeting `write_stream`.
    pub fn into_request(self, write_stream: &str) -> AppendRowsRequest {
        let proto_rows = append_rows_request::ProtoData {
            writer_schema: Some(ProtoSchema {
                proto_descriptor: Some(self.descriptor),
            }),
            rows: Some(ProtoRows {
                serialized_rows: self.serialized_rows,
            }),
        };

        AppendRowsRequest {
            write_stream: write_stream.to_string(),
            rows: Some(Rows::ProtoRows(proto_rows)),
            ..Default::default()
        }
    }
}
