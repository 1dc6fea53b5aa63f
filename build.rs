fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .type_attribute(".", "#[derive(serde::Serialize, serde::Deserialize)]")
        .bytes(["."])
        .compile_protos(&["proto/discovery.proto"], &["proto"])
        .unwrap_or_else(|e| panic!("protobuf compile error: {e}"));

    Ok(())
}
