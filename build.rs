fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure().compile(
        &[
            "googleapis/google/rpc/status.proto",
            "googleapis/google/cloud/bigquery/storage/v1/protobuf.proto",
            "googleapis/google/cloud/bigquery/storage/v1/storage.proto",
            "googleapis/google/cloud/bigquery/storage/v1/stream.proto",
            "googleapis/google/cloud/bigquery/storage/v1/table.proto",
        ],
        &["googleapis"]
    )?;
    Ok(())
}
