//! The record appended by `bigquery-append`.
//!
//! `EchoRequest` maps one-to-one to a row of a table with the columns
//! `first_name STRING`, `middle_name STRUCT<name STRING>` and `last_name STRING`.
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto};
use serde::{Deserialize, Serialize};

use crate::schema::ProtoRow;
use crate::Error;

/// Package the record types were declared in. Nested types of the descriptor
/// are named after it so the descriptor stays self contained.
const PACKAGE: &str = "echo";

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoRequest {
    #[prost(string, tag = "1")]
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub first_name: String,
    #[prost(message, optional, tag = "2")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<Middle>,
    #[prost(string, tag = "3")]
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_name: String,
}

#[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
pub struct Middle {
    #[prost(string, tag = "1")]
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl EchoRequest {
    pub fn new(first_name: &str, middle_name: Option<&str>, last_name: &str) -> Self {
        Self {
            first_name: first_name.to_string(),
            middle_name: middle_name.map(|name| Middle { name: name.to_string() }),
            last_name: last_name.to_string(),
        }
    }

    /// The row written by the command line tool.
    pub fn sample() -> Self {
        Self::new("sal", Some("a"), "mander")
    }

    /// Canonical proto3 JSON form of the record, on a single line.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

fn qualified(name: &str) -> String {
    format!("{}_{}", PACKAGE, name)
}

fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

impl ProtoRow for Middle {
    fn descriptor() -> DescriptorProto {
        DescriptorProto {
            name: Some(qualified("Middle")),
            field: vec![field("name", 1, Type::String)],
            ..Default::default()
        }
    }
}

impl ProtoRow for EchoRequest {
    fn descriptor() -> DescriptorProto {
        let middle = Middle::descriptor();
        let middle_name = FieldDescriptorProto {
            type_name: middle.name.clone(),
            ..field("middle_name", 2, Type::Message)
        };

        DescriptorProto {
            name: Some(qualified("EchoRequest")),
            field: vec![
                field("first_name", 1, Type::String),
                middle_name,
                field("last_name", 3, Type::String),
            ],
            nested_type: vec![middle],
            ..Default::default()
        }
    }
}
